use chrono::Utc;

use wfh_core::credentials::hash_password;
use wfh_core::domain::user::Role;

use crate::connection::DbPool;
use crate::repositories::{format_timestamp, RepositoryError};

/// Demo accounts, one per role. Passwords are only for local walkthroughs.
const DEMO_USERS: &[DemoUser] = &[
    DemoUser {
        username: "demo",
        password: "demo123",
        email: "demo@local",
        name: "Demo User",
        department: "DemoDept",
        role: Role::Applicant,
    },
    DemoUser {
        username: "section",
        password: "section123",
        email: "section@local",
        name: "Section Head",
        department: "DemoDept",
        role: Role::SectionHead,
    },
    DemoUser {
        username: "department",
        password: "department123",
        email: "department@local",
        name: "Department Head",
        department: "DemoDept",
        role: Role::DepartmentHead,
    },
];

struct DemoUser {
    username: &'static str,
    password: &'static str,
    email: &'static str,
    name: &'static str,
    department: &'static str,
    role: Role,
}

pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// Inserts missing demo accounts; existing usernames are left untouched.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let now = format_timestamp(Utc::now());
        let mut tx = pool.begin().await?;
        let mut users_seeded = Vec::with_capacity(DEMO_USERS.len());

        for user in DEMO_USERS {
            let inserted = sqlx::query(
                "INSERT INTO app_user (username, email, name, department, role, password_hash,
                                       created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(username) DO NOTHING",
            )
            .bind(user.username)
            .bind(user.email)
            .bind(user.name)
            .bind(user.department)
            .bind(user.role.as_str())
            .bind(hash_password(user.password))
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            users_seeded.push(SeededUser {
                username: user.username,
                password: user.password,
                role: user.role,
                created: inserted.rows_affected() == 1,
            });
        }

        tx.commit().await?;
        Ok(SeedResult { users_seeded })
    }

    /// Confirms every demo account exists with its expected role.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::with_capacity(DEMO_USERS.len());

        for user in DEMO_USERS {
            let role: Option<String> =
                sqlx::query_scalar("SELECT role FROM app_user WHERE username = ?")
                    .bind(user.username)
                    .fetch_optional(pool)
                    .await?;
            checks.push((user.username, role.as_deref() == Some(user.role.as_str())));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        for user in DEMO_USERS {
            sqlx::query("DELETE FROM app_user WHERE username = ?")
                .bind(user.username)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub users_seeded: Vec<SeededUser>,
}

impl SeedResult {
    pub fn created_count(&self) -> usize {
        self.users_seeded.iter().filter(|user| user.created).count()
    }
}

#[derive(Debug)]
pub struct SeededUser {
    pub username: &'static str,
    pub password: &'static str,
    pub role: Role,
    pub created: bool,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

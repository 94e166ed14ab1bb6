use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use wfh_core::domain::user::{Role, UserAccount};

use super::{format_timestamp, RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &SqliteRow) -> Result<UserAccount, RepositoryError> {
    let role: String = row.try_get("role")?;
    let role = Role::parse(&role)
        .ok_or_else(|| RepositoryError::Decode(format!("invalid user role: {role}")))?;

    Ok(UserAccount {
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        department: row.try_get("department")?,
        role,
        password_hash: row.try_get("password_hash")?,
    })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserAccount>, RepositoryError> {
        let row = sqlx::query(
            "SELECT username, email, name, department, role, password_hash
             FROM app_user WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn save(&self, user: UserAccount) -> Result<(), RepositoryError> {
        let now = format_timestamp(Utc::now());

        sqlx::query(
            "INSERT INTO app_user (username, email, name, department, role, password_hash,
                                   created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(username) DO UPDATE SET
                 email = excluded.email,
                 name = excluded.name,
                 department = excluded.department,
                 role = excluded.role,
                 password_hash = excluded.password_hash,
                 updated_at = excluded.updated_at",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.department)
        .bind(user.role.as_str())
        .bind(&user.password_hash)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Applicant,
    SectionHead,
    DepartmentHead,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applicant => "applicant",
            Self::SectionHead => "section_head",
            Self::DepartmentHead => "department_head",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "applicant" => Some(Self::Applicant),
            "section_head" => Some(Self::SectionHead),
            "department_head" => Some(Self::DepartmentHead),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A login-capable account. `password_hash` is produced by [`crate::credentials::hash_password`].
#[derive(Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub username: String,
    pub email: String,
    pub name: String,
    pub department: String,
    pub role: Role,
    pub password_hash: String,
}

impl fmt::Debug for UserAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserAccount")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("name", &self.name)
            .field("department", &self.department)
            .field("role", &self.role)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

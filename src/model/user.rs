use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Employee,
    Lead,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Employee => "employee",
            Role::Lead => "lead",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "employee" => Ok(Role::Employee),
            "lead" => Ok(Role::Lead),
            other => Err(Error::Validation(format!(
                "unknown role '{other}' (expected: employee, lead)"
            ))),
        }
    }

    /// Read a stored role; a missing or unknown value means employee.
    pub fn from_stored(s: Option<&str>) -> Self {
        s.and_then(|s| Role::parse(s).ok()).unwrap_or(Role::Employee)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub uid: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    /// Business identifier tasks are assigned against.
    pub employee_id: Option<String>,
    pub created_at: Option<String>,
}

/// Registration input.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewUser {
    pub uid: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub employee_id: String,
}

/// The resolved acting user. Passed explicitly to every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub uid: String,
    pub employee_id: String,
    pub role: Role,
    pub name: String,
}

impl Identity {
    pub fn is_lead(&self) -> bool {
        self.role == Role::Lead
    }

    pub fn is_employee(&self) -> bool {
        self.role == Role::Employee
    }
}

impl TryFrom<User> for Identity {
    type Error = Error;

    fn try_from(user: User) -> Result<Self> {
        let employee_id = user
            .employee_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| Error::Config(format!("employee ID is missing for user {}", user.uid)))?;
        Ok(Identity {
            uid: user.uid,
            employee_id,
            role: user.role,
            name: user.name,
        })
    }
}

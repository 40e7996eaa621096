use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Role carried by the authenticated principal.
///
/// This is the only representation of a role inside the service; the string
/// form returned by [`UserRole::as_str`] is what gets persisted and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    HrAdmin,
    HrStaff,
    Manager,
    Employee,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::HrAdmin => "HR_ADMIN",
            UserRole::HrStaff => "HR_STAFF",
            UserRole::Manager => "MANAGER",
            UserRole::Employee => "EMPLOYEE",
        }
    }

    /// Whether this role may run AI analyses over employee data.
    pub fn can_run_ai_analysis(&self) -> bool {
        matches!(self, UserRole::HrAdmin | UserRole::HrStaff)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for UserRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HR_ADMIN" => Ok(UserRole::HrAdmin),
            "HR_STAFF" => Ok(UserRole::HrStaff),
            "MANAGER" => Ok(UserRole::Manager),
            "EMPLOYEE" => Ok(UserRole::Employee),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

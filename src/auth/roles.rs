use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Role carried by every user and embedded in the session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Secretaria,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Secretaria => "secretaria",
            Self::User => "user",
        }
    }

    /// Roles that see every business and report rather than only their own.
    pub fn sees_everything(&self) -> bool {
        matches!(self, Self::Admin | Self::Secretaria)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "secretaria" => Ok(Self::Secretaria),
            "user" => Ok(Self::User),
            other => anyhow::bail!("unknown role {other:?}"),
        }
    }
}

/// Route allow-lists.
pub mod policy {
    use super::Role;

    pub const ANY: &[Role] = &[Role::Admin, Role::Secretaria, Role::User];
    pub const OWNER: &[Role] = &[Role::User];
    pub const REPORT_EDITORS: &[Role] = &[Role::Admin, Role::User];
}

/// Compares the caller's role against a route allow-list.
pub fn authorize(role: Role, allowed: &[Role]) -> Result<(), ApiError> {
    if allowed.contains(&role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays_roles() {
        for role in [Role::Admin, Role::Secretaria, Role::User] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn authorize_checks_allow_list() {
        assert!(authorize(Role::User, policy::OWNER).is_ok());
        assert!(matches!(
            authorize(Role::Secretaria, policy::OWNER),
            Err(ApiError::Forbidden(Role::Secretaria))
        ));
        assert!(authorize(Role::Secretaria, policy::ANY).is_ok());
        assert!(authorize(Role::Secretaria, policy::REPORT_EDITORS).is_err());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Role::Secretaria).unwrap(),
            "\"secretaria\""
        );
    }
}

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use crate::auth::roles::Role;
use crate::error::ApiError;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Request body for user registration. `taxId` + `businessName` optionally
/// create the user's business in the same call.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default, alias = "cuit")]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub business_name: Option<String>,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub password: String,
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

impl RegisterRequest {
    pub fn validate(&mut self) -> Result<(), ApiError> {
        self.email = normalize_email(&self.email);
        if !is_valid_email(&self.email) {
            return Err(ApiError::validation("Please add a valid email"));
        }
        validate_password(&self.password)?;
        match (&self.tax_id, &self.business_name) {
            (Some(_), None) | (None, Some(_)) => Err(ApiError::validation(
                "taxId and businessName must be provided together",
            )),
            _ => Ok(()),
        }
    }

    pub fn requested_role(&self) -> Role {
        self.role.unwrap_or(Role::User)
    }
}

impl LoginRequest {
    pub fn validate(&mut self) -> Result<(), ApiError> {
        self.email = normalize_email(&self.email);
        if self.email.is_empty() || self.password.is_empty() {
            return Err(ApiError::validation("Please provide an email and password"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(json: serde_json::Value) -> RegisterRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("benjamin@example.com"));
        assert!(!is_valid_email("benjamin@example"));
        assert!(!is_valid_email("no spaces@example.com"));
    }

    #[test]
    fn register_normalizes_and_accepts_cuit_alias() {
        let mut req = register(serde_json::json!({
            "email": "  Grupo1@Example.COM ",
            "password": "123456",
            "cuit": "402849029129",
            "businessName": "EDUCANDO S.A."
        }));
        req.validate().unwrap();
        assert_eq!(req.email, "grupo1@example.com");
        assert_eq!(req.tax_id.as_deref(), Some("402849029129"));
        assert_eq!(req.requested_role(), Role::User);
    }

    #[test]
    fn register_rejects_half_business_and_short_password() {
        let mut req = register(serde_json::json!({
            "email": "a@b.co", "password": "123456", "taxId": "1"
        }));
        assert!(matches!(req.validate(), Err(ApiError::Validation(_))));

        let mut req = register(serde_json::json!({"email": "a@b.co", "password": "123"}));
        assert!(matches!(req.validate(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn login_requires_both_fields() {
        let mut req: LoginRequest = serde_json::from_value(serde_json::json!({"email": "a@b.co"})).unwrap();
        assert!(matches!(req.validate(), Err(ApiError::Validation(_))));
    }
}

use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::roles::Role;

/// User record as returned by the store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub role: Role,
    pub business: Option<Uuid>,
    #[serde(skip_serializing)]
    pub reset_token: Option<ResetToken>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Pending password reset: SHA-256 digest of the emailed token plus its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetToken {
    pub token_hash: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Row shape of the `users` table.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub business_id: Option<Uuid>,
    pub reset_password_token: Option<String>,
    pub reset_password_expire: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        let reset_token = match (r.reset_password_token, r.reset_password_expire) {
            (Some(token_hash), Some(expires_at)) => Some(ResetToken {
                token_hash,
                expires_at,
            }),
            _ => None,
        };
        Ok(Self {
            id: r.id,
            email: r.email,
            password_hash: r.password_hash,
            role: r.role.parse()?,
            business: r.business_id,
            reset_token,
            created_at: r.created_at,
        })
    }
}

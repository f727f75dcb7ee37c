//! Credential store operations: registration, authentication, session
//! issuance and the forgot/reset password flow.

use lazy_static::lazy_static;
use rand::RngCore;
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};

use crate::{
    auth::{
        dto::{normalize_email, validate_password},
        password::{hash_password, verify_password},
        repo_types::{NewUser, ResetToken, User},
        roles::Role,
    },
    business::{
        repo_types::{Business, BusinessDraft},
        services::ensure_tax_id_free,
    },
    error::{ApiError, ApiResult},
    mail::Email,
    state::AppState,
    store::{BUSINESSES_TAX_ID_KEY, USERS_EMAIL_KEY},
};

const RESET_TOKEN_BYTES: usize = 20;

lazy_static! {
    // Verified against when the email is unknown so both failure paths hash once.
    static ref DUMMY_HASH: String = hash_password("not-a-real-password").unwrap_or_default();
}

pub async fn register(
    state: &AppState,
    email: &str,
    password: &str,
    role: Role,
) -> ApiResult<User> {
    register_with_business(state, email, password, role, None)
        .await
        .map(|(user, _)| user)
}

/// Creates the account and, when `business` is given, the business it owns in
/// a single store write. A conflict on either leaves nothing behind.
pub async fn register_with_business(
    state: &AppState,
    email: &str,
    password: &str,
    role: Role,
    business: Option<BusinessDraft>,
) -> ApiResult<(User, Option<Business>)> {
    let email = normalize_email(email);
    if state.store.find_user_by_email(&email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(ApiError::DuplicateEmail(email));
    }
    if let Some(draft) = &business {
        ensure_tax_id_free(state, &draft.tax_id).await?;
    }
    let tax_id = business.as_ref().map(|d| d.tax_id.clone());

    let password_hash = hash_password(password)?;
    let (user, business) = state
        .store
        .insert_user_with_business(
            NewUser {
                email: email.clone(),
                password_hash,
                role,
            },
            business,
        )
        .await
        .map_err(|e| {
            if e.violates(USERS_EMAIL_KEY) {
                ApiError::DuplicateEmail(email.clone())
            } else if e.violates(BUSINESSES_TAX_ID_KEY) {
                ApiError::DuplicateTaxId(tax_id.clone().unwrap_or_default())
            } else {
                e.into()
            }
        })?;

    info!(user_id = %user.id, email = %user.email, %role, "user registered");
    if let Some(b) = &business {
        info!(business_id = %b.id, user_id = %user.id, "business created");
    }
    Ok((user, business))
}

/// Unknown email and wrong password fail identically.
pub async fn authenticate(state: &AppState, email: &str, password: &str) -> ApiResult<User> {
    let email = normalize_email(email);
    let Some(user) = state.store.find_user_by_email(&email).await? else {
        let _ = verify_password(password, &DUMMY_HASH);
        warn!(%email, "login unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    info!(user_id = %user.id, "user logged in");
    Ok(user)
}

pub fn issue_session(state: &AppState, user: &User) -> ApiResult<String> {
    state.jwt.sign(user.id, user.role).map_err(|e| {
        error!(error = %e, user_id = %user.id, "jwt sign failed");
        ApiError::Unexpected(e)
    })
}

/// Stores the digest of a fresh reset token and emails the raw token.
/// A failed delivery clears the pending token again.
pub async fn request_password_reset(state: &AppState, email: &str) -> ApiResult<()> {
    let email = normalize_email(email);
    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or(ApiError::NoSuchUser)?;

    let raw_token = generate_reset_token();
    let expires_at =
        OffsetDateTime::now_utc() + Duration::minutes(state.config.reset_token_ttl_minutes);
    state
        .store
        .set_reset_token(
            user.id,
            Some(ResetToken {
                token_hash: digest_reset_token(&raw_token),
                expires_at,
            }),
        )
        .await?;

    let reset_url = format!(
        "{}/api/auth/resetpassword/{}",
        state.config.public_url, raw_token
    );
    let message = Email {
        to: user.email.clone(),
        subject: "Password Reset Token".into(),
        text: format!(
            "You are receiving this email because you requested a password reset. \
             Please follow this link:\n\n{reset_url}"
        ),
    };

    if let Err(e) = state.mailer.send(&message).await {
        error!(error = ?e, user_id = %user.id, "reset email delivery failed");
        state.store.set_reset_token(user.id, None).await?;
        return Err(ApiError::DeliveryFailed);
    }

    info!(user_id = %user.id, "password reset requested");
    Ok(())
}

pub async fn reset_password(
    state: &AppState,
    raw_token: &str,
    new_password: &str,
) -> ApiResult<User> {
    validate_password(new_password)?;

    let token_hash = digest_reset_token(raw_token);
    let user = state
        .store
        .find_user_by_reset_token(&token_hash, OffsetDateTime::now_utc())
        .await?
        .ok_or_else(|| {
            warn!("reset with unknown or expired token");
            ApiError::InvalidOrExpiredToken
        })?;

    let password_hash = hash_password(new_password)?;
    let user = state.store.update_password(user.id, &password_hash).await?;
    info!(user_id = %user.id, "password reset");
    Ok(user)
}

fn generate_reset_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub(crate) fn digest_reset_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

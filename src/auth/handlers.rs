use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest},
        extractors::{AuthUser, SESSION_COOKIE},
        repo_types::User,
        roles::Role,
        services,
    },
    business::{self, repo_types::BusinessDraft},
    config::AppConfig,
    error::{ApiError, ApiResult, Envelope},
    extract::ApiJson,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", get(logout))
        .route("/auth/me", get(get_me))
        .route("/auth/forgotpassword", post(forgot_password))
        .route("/auth/resetpassword/:reset_token", put(reset_password))
}

/// Public registration creates `user` accounts; any other role needs an admin session.
#[instrument(skip(state, caller, payload))]
pub async fn register(
    State(state): State<AppState>,
    caller: Option<AuthUser>,
    ApiJson(mut payload): ApiJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    payload.validate()?;

    let role = payload.requested_role();
    if role != Role::User {
        let caller = caller.ok_or(ApiError::Unauthenticated)?;
        caller.authorize(&[Role::Admin])?;
    }

    let draft = match (payload.tax_id.as_deref(), payload.business_name.as_deref()) {
        (Some(tax_id), Some(name)) => {
            let (tax_id, business_name) = business::dto::validate_new_business(tax_id, name)?;
            Some(BusinessDraft {
                tax_id,
                business_name,
            })
        }
        _ => None,
    };

    let (user, _) =
        services::register_with_business(&state, &payload.email, &payload.password, role, draft)
            .await?;
    session_response(&state, &user)
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(mut payload): ApiJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    payload.validate()?;
    let user = services::authenticate(&state, &payload.email, &payload.password).await?;
    session_response(&state, &user)
}

pub async fn logout() -> impl IntoResponse {
    let cookie = format!("{SESSION_COOKIE}=none; Path=/; Max-Age=10; HttpOnly");
    (
        [(header::SET_COOKIE, cookie)],
        Envelope::data(serde_json::json!({})),
    )
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    caller: AuthUser,
) -> ApiResult<Json<Envelope<User>>> {
    let user = state
        .store
        .find_user_by_id(caller.user_id)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %caller.user_id, "session user no longer exists");
            ApiError::Unauthenticated
        })?;
    Ok(Envelope::data(user))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ForgotPasswordRequest>,
) -> ApiResult<Json<Envelope<&'static str>>> {
    if payload.email.trim().is_empty() {
        return Err(ApiError::validation("Please provide an email"));
    }
    services::request_password_reset(&state, &payload.email).await?;
    Ok(Envelope::data("Email sent"))
}

#[instrument(skip(state, reset_token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(reset_token): Path<String>,
    ApiJson(payload): ApiJson<ResetPasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = services::reset_password(&state, &reset_token, &payload.password).await?;
    session_response(&state, &user)
}

/// Token in the body and in an HTTP-only cookie.
fn session_response(state: &AppState, user: &User) -> ApiResult<impl IntoResponse> {
    let token = services::issue_session(state, user)?;
    let cookie = session_cookie(&token, &state.config);
    info!(user_id = %user.id, role = %user.role, "session issued");
    Ok((
        [(header::SET_COOKIE, cookie)],
        Envelope::session(token, user.role),
    ))
}

pub(crate) fn session_cookie(token: &str, config: &AppConfig) -> String {
    let max_age = config.jwt.cookie_ttl_days.max(0) * 24 * 60 * 60;
    let mut cookie = format!("{SESSION_COOKIE}={token}; Path=/; Max-Age={max_age}; HttpOnly");
    if config.production {
        cookie.push_str("; Secure");
    }
    cookie
}

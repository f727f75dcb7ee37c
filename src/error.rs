use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::auth::roles::Role;
use crate::store::StoreError;

/// Every failure a handler can produce. `IntoResponse` below is the only place
/// where an error kind becomes a status code.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Not authorized to access this route")]
    Unauthenticated,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("No user in request")]
    MissingActor,
    #[error("User role {0} is not authorized to access this route")]
    Forbidden(Role),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("There is no user with that email")]
    NoSuchUser,
    #[error("No business linked to this user")]
    NoBusinessLinked,
    #[error("Invalid token")]
    InvalidOrExpiredToken,
    #[error("Email {0} is already registered")]
    DuplicateEmail(String),
    #[error("A business with tax id {0} already exists")]
    DuplicateTaxId(String),
    #[error("User already has a business")]
    BusinessAlreadyExists,
    #[error("A report for {month}/{year} already exists")]
    DuplicatePeriod { year: String, month: String },
    #[error("There was a problem while sending the email")]
    DeliveryFailed,
    #[error("Server Error")]
    Unexpected(#[source] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::NoBusinessLinked | Self::InvalidOrExpiredToken => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthenticated | Self::InvalidCredentials | Self::MissingActor => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) | Self::NoSuchUser => StatusCode::NOT_FOUND,
            Self::DuplicateEmail(_)
            | Self::DuplicateTaxId(_)
            | Self::BusinessAlreadyExists
            | Self::DuplicatePeriod { .. } => StatusCode::CONFLICT,
            Self::DeliveryFailed | Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::Unexpected(anyhow::Error::new(e))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::Unexpected(e)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::Unexpected(e) = &self {
            error!(error = ?e, "unexpected failure");
        }
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Success envelope: `{ success, data?, token?, role? }`.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl<T: Serialize> Envelope<T> {
    pub fn data(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            token: None,
            role: None,
        })
    }
}

impl Envelope<()> {
    pub fn session(token: String, role: Role) -> Json<Self> {
        Json(Self {
            success: true,
            data: None,
            token: Some(token),
            role: Some(role),
        })
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

//! Persistence seam. Handlers only see `dyn Store`; `PgStore` is the
//! production backend and `MemoryStore` backs local runs and tests.
//!
//! Uniqueness is a storage concern: both backends reject a second user with
//! the same email, a second business with the same tax id or owner, and a
//! second report for the same business and period. Violations surface as
//! [`StoreError::UniqueViolation`] carrying one of the constraint names below.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, ResetToken, User};
use crate::business::repo_types::{Business, BusinessDraft, BusinessFilter, NewBusiness};
use crate::reports::repo_types::{NewReport, Period, Report, ReportFilter, ReportPatch};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const USERS_EMAIL_KEY: &str = "users_email_key";
pub const BUSINESSES_TAX_ID_KEY: &str = "businesses_tax_id_key";
pub const BUSINESSES_USER_ID_KEY: &str = "businesses_user_id_key";
pub const REPORTS_BUSINESS_PERIOD_KEY: &str = "reports_business_period_key";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint {constraint} violated")]
    UniqueViolation { constraint: String },
    #[error("referenced {0} does not exist")]
    MissingReference(&'static str),
    #[error("store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn violates(&self, name: &str) -> bool {
        matches!(self, Self::UniqueViolation { constraint } if constraint == name)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Offset window used by list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

/// One page of results plus the size of the full filtered set.
#[derive(Debug, Clone)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_user(&self, new: NewUser) -> StoreResult<User> {
        self.insert_user_with_business(new, None)
            .await
            .map(|(user, _)| user)
    }
    /// Inserts the user and, when `business` is given, the business it owns.
    /// Either both rows are written or neither is.
    async fn insert_user_with_business(
        &self,
        new: NewUser,
        business: Option<BusinessDraft>,
    ) -> StoreResult<(User, Option<Business>)>;
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn set_reset_token(&self, user_id: Uuid, token: Option<ResetToken>) -> StoreResult<()>;
    /// User whose stored reset digest equals `token_hash` and whose expiry is after `now`.
    async fn find_user_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> StoreResult<Option<User>>;
    /// Replaces the password hash and clears any pending reset token.
    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> StoreResult<User>;

    /// Inserts the business and points the owner's back-reference at it, atomically.
    async fn insert_business(&self, new: NewBusiness) -> StoreResult<Business>;
    async fn find_business(&self, id: Uuid) -> StoreResult<Option<Business>>;
    async fn find_business_by_owner(&self, user_id: Uuid) -> StoreResult<Option<Business>>;
    async fn find_business_by_tax_id(&self, tax_id: &str) -> StoreResult<Option<Business>>;
    async fn list_businesses(&self, filter: BusinessFilter, page: Page)
        -> StoreResult<Paged<Business>>;

    /// Inserts the report and appends it to its business, atomically.
    async fn insert_report(&self, new: NewReport) -> StoreResult<Report>;
    async fn find_report(&self, id: Uuid) -> StoreResult<Option<Report>>;
    async fn find_report_by_period(
        &self,
        business_id: Uuid,
        period: &Period,
    ) -> StoreResult<Option<Report>>;
    async fn list_reports(&self, filter: ReportFilter, page: Page) -> StoreResult<Paged<Report>>;
    async fn update_report(&self, id: Uuid, patch: ReportPatch) -> StoreResult<Option<Report>>;

    async fn close(&self);
}

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Business record. `reports` holds report ids in insertion order.
#[derive(Debug, Clone)]
pub struct Business {
    pub id: Uuid,
    pub tax_id: String,
    pub business_name: String,
    pub user: Uuid,
    pub reports: Vec<Uuid>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewBusiness {
    pub tax_id: String,
    pub business_name: String,
    pub user_id: Uuid,
}

/// Business supplied together with a new account at registration.
#[derive(Debug, Clone)]
pub struct BusinessDraft {
    pub tax_id: String,
    pub business_name: String,
}

/// Listing filter; `owner` restricts the result to one user's business.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusinessFilter {
    pub owner: Option<Uuid>,
}

#[derive(Debug, FromRow)]
pub struct BusinessRow {
    pub id: Uuid,
    pub tax_id: String,
    pub business_name: String,
    pub user_id: Uuid,
    pub reports: Vec<Uuid>,
    pub created_at: OffsetDateTime,
}

impl From<BusinessRow> for Business {
    fn from(r: BusinessRow) -> Self {
        Self {
            id: r.id,
            tax_id: r.tax_id,
            business_name: r.business_name,
            user: r.user_id,
            reports: r.reports,
            created_at: r.created_at,
        }
    }
}

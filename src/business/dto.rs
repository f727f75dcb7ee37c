use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::User;
use crate::business::repo_types::Business;
use crate::error::ApiError;
use crate::listing::Ref;
use crate::reports::repo_types::Report;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBusinessRequest {
    #[serde(default, alias = "cuit")]
    pub tax_id: String,
    #[serde(default)]
    pub business_name: String,
}

/// Trims both fields and rejects blanks; returns `(tax_id, business_name)`.
pub fn validate_new_business(tax_id: &str, name: &str) -> Result<(String, String), ApiError> {
    let tax_id = tax_id.trim();
    let name = name.trim();
    if tax_id.is_empty() {
        return Err(ApiError::validation("Please add a taxId"));
    }
    if name.is_empty() {
        return Err(ApiError::validation("Please add a businessName"));
    }
    Ok((tax_id.to_string(), name.to_string()))
}

/// Business as returned by the API, with optionally expanded references.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessView {
    pub id: Uuid,
    pub tax_id: String,
    pub business_name: String,
    pub user: Ref<User>,
    pub reports: Vec<Ref<Report>>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Business> for BusinessView {
    fn from(b: Business) -> Self {
        Self {
            id: b.id,
            tax_id: b.tax_id,
            business_name: b.business_name,
            user: Ref::Id(b.user),
            reports: b.reports.into_iter().map(Ref::Id).collect(),
            created_at: b.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_requires_fields() {
        assert_eq!(
            validate_new_business(" 402849029129 ", " EDUCANDO S.A. ").unwrap(),
            ("402849029129".to_string(), "EDUCANDO S.A.".to_string())
        );
        assert!(validate_new_business("  ", "x").is_err());
        assert!(validate_new_business("1", "").is_err());
    }

    #[test]
    fn view_keeps_ids_unexpanded() {
        let report_id = Uuid::new_v4();
        let business = Business {
            id: Uuid::new_v4(),
            tax_id: "1".into(),
            business_name: "ACME".into(),
            user: Uuid::new_v4(),
            reports: vec![report_id],
            created_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_value(BusinessView::from(business.clone())).unwrap();
        assert_eq!(json["user"], business.user.to_string());
        assert_eq!(json["reports"][0], report_id.to_string());
        assert_eq!(json["taxId"], "1");
    }
}

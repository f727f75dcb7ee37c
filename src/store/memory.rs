use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    Page, Paged, Store, StoreError, StoreResult, BUSINESSES_TAX_ID_KEY, BUSINESSES_USER_ID_KEY,
    REPORTS_BUSINESS_PERIOD_KEY, USERS_EMAIL_KEY,
};
use crate::auth::repo_types::{NewUser, ResetToken, User};
use crate::business::repo_types::{Business, BusinessDraft, BusinessFilter, NewBusiness};
use crate::reports::repo_types::{
    NewReport, Period, Report, ReportFilter, ReportPatch, DEFAULT_DATE_LIMIT,
};

/// In-process store. Every operation runs under one lock, so check-then-write
/// sequences are atomic just like the constraint-backed postgres tables.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    businesses: HashMap<Uuid, Business>,
    business_order: Vec<Uuid>,
    reports: HashMap<Uuid, Report>,
    report_order: Vec<Uuid>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn unique(constraint: &str) -> StoreError {
    StoreError::UniqueViolation {
        constraint: constraint.to_string(),
    }
}

/// Newest-first window over `order`, keeping only ids accepted by `keep`.
fn page_newest_first<T: Clone>(
    order: &[Uuid],
    rows: &HashMap<Uuid, T>,
    keep: impl Fn(&T) -> bool,
    page: Page,
) -> Paged<T> {
    let matching: Vec<&T> = order
        .iter()
        .rev()
        .filter_map(|id| rows.get(id))
        .filter(|row| keep(row))
        .collect();
    let total = matching.len() as i64;
    let items = matching
        .into_iter()
        .skip(usize::try_from(page.offset).unwrap_or(0))
        .take(usize::try_from(page.limit).unwrap_or(0))
        .cloned()
        .collect();
    Paged { items, total }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user_with_business(
        &self,
        new: NewUser,
        business: Option<BusinessDraft>,
    ) -> StoreResult<(User, Option<Business>)> {
        let mut t = self.tables.lock().await;
        if t.users.values().any(|u| u.email == new.email) {
            return Err(unique(USERS_EMAIL_KEY));
        }
        if let Some(draft) = &business {
            if t.businesses.values().any(|b| b.tax_id == draft.tax_id) {
                return Err(unique(BUSINESSES_TAX_ID_KEY));
            }
        }

        let now = OffsetDateTime::now_utc();
        let mut user = User {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            business: None,
            reset_token: None,
            created_at: now,
        };
        let business = business.map(|draft| Business {
            id: Uuid::new_v4(),
            tax_id: draft.tax_id,
            business_name: draft.business_name,
            user: user.id,
            reports: Vec::new(),
            created_at: now,
        });
        if let Some(b) = &business {
            user.business = Some(b.id);
            t.businesses.insert(b.id, b.clone());
            t.business_order.push(b.id);
        }
        t.users.insert(user.id, user.clone());
        Ok((user, business))
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn set_reset_token(&self, user_id: Uuid, token: Option<ResetToken>) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        let user = t
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::MissingReference("user"))?;
        user.reset_token = token;
        Ok(())
    }

    async fn find_user_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> StoreResult<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t.users
            .values()
            .find(|u| {
                u.reset_token
                    .as_ref()
                    .is_some_and(|r| r.token_hash == token_hash && r.expires_at > now)
            })
            .cloned())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> StoreResult<User> {
        let mut t = self.tables.lock().await;
        let user = t
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::MissingReference("user"))?;
        user.password_hash = password_hash.to_string();
        user.reset_token = None;
        Ok(user.clone())
    }

    async fn insert_business(&self, new: NewBusiness) -> StoreResult<Business> {
        let mut t = self.tables.lock().await;
        if !t.users.contains_key(&new.user_id) {
            return Err(StoreError::MissingReference("user"));
        }
        if t.businesses.values().any(|b| b.tax_id == new.tax_id) {
            return Err(unique(BUSINESSES_TAX_ID_KEY));
        }
        if t.businesses.values().any(|b| b.user == new.user_id) {
            return Err(unique(BUSINESSES_USER_ID_KEY));
        }
        let business = Business {
            id: Uuid::new_v4(),
            tax_id: new.tax_id,
            business_name: new.business_name,
            user: new.user_id,
            reports: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
        };
        t.businesses.insert(business.id, business.clone());
        t.business_order.push(business.id);
        if let Some(owner) = t.users.get_mut(&new.user_id) {
            owner.business = Some(business.id);
        }
        Ok(business)
    }

    async fn find_business(&self, id: Uuid) -> StoreResult<Option<Business>> {
        Ok(self.tables.lock().await.businesses.get(&id).cloned())
    }

    async fn find_business_by_owner(&self, user_id: Uuid) -> StoreResult<Option<Business>> {
        let t = self.tables.lock().await;
        Ok(t.businesses.values().find(|b| b.user == user_id).cloned())
    }

    async fn find_business_by_tax_id(&self, tax_id: &str) -> StoreResult<Option<Business>> {
        let t = self.tables.lock().await;
        Ok(t.businesses.values().find(|b| b.tax_id == tax_id).cloned())
    }

    async fn list_businesses(
        &self,
        filter: BusinessFilter,
        page: Page,
    ) -> StoreResult<Paged<Business>> {
        let t = self.tables.lock().await;
        Ok(page_newest_first(
            &t.business_order,
            &t.businesses,
            |b| filter.owner.map_or(true, |owner| owner == b.user),
            page,
        ))
    }

    async fn insert_report(&self, new: NewReport) -> StoreResult<Report> {
        let mut t = self.tables.lock().await;
        if !t.businesses.contains_key(&new.business_id) {
            return Err(StoreError::MissingReference("business"));
        }
        if t
            .reports
            .values()
            .any(|r| r.business == new.business_id && r.period == new.period)
        {
            return Err(unique(REPORTS_BUSINESS_PERIOD_KEY));
        }
        let report = Report {
            id: Uuid::new_v4(),
            business: new.business_id,
            period: new.period,
            date_limit: DEFAULT_DATE_LIMIT,
            date_added: OffsetDateTime::now_utc(),
            products_list: new.products_list,
        };
        t.reports.insert(report.id, report.clone());
        t.report_order.push(report.id);
        if let Some(business) = t.businesses.get_mut(&report.business) {
            business.reports.push(report.id);
        }
        Ok(report)
    }

    async fn find_report(&self, id: Uuid) -> StoreResult<Option<Report>> {
        Ok(self.tables.lock().await.reports.get(&id).cloned())
    }

    async fn find_report_by_period(
        &self,
        business_id: Uuid,
        period: &Period,
    ) -> StoreResult<Option<Report>> {
        let t = self.tables.lock().await;
        Ok(t.reports
            .values()
            .find(|r| r.business == business_id && r.period == *period)
            .cloned())
    }

    async fn list_reports(&self, filter: ReportFilter, page: Page) -> StoreResult<Paged<Report>> {
        let t = self.tables.lock().await;
        Ok(page_newest_first(
            &t.report_order,
            &t.reports,
            |r| filter.matches(r),
            page,
        ))
    }

    async fn update_report(&self, id: Uuid, patch: ReportPatch) -> StoreResult<Option<Report>> {
        let mut t = self.tables.lock().await;
        let Some(current) = t.reports.get(&id).cloned() else {
            return Ok(None);
        };
        if let Some(period) = &patch.period {
            let taken = t.reports.values().any(|r| {
                r.id != id && r.business == current.business && r.period == *period
            });
            if taken {
                return Err(unique(REPORTS_BUSINESS_PERIOD_KEY));
            }
        }
        let Some(report) = t.reports.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(period) = patch.period {
            report.period = period;
        }
        if let Some(products) = patch.products_list {
            report.products_list = products;
        }
        Ok(Some(report.clone()))
    }

    async fn close(&self) {}
}

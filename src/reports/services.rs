use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    listing::PageRequest,
    reports::repo_types::{NewReport, Period, Product, Report, ReportFilter, ReportPatch},
    state::AppState,
    store::{Paged, StoreError, REPORTS_BUSINESS_PERIOD_KEY},
};

fn duplicate_period(e: StoreError, period: &Period) -> ApiError {
    if e.violates(REPORTS_BUSINESS_PERIOD_KEY) {
        ApiError::DuplicatePeriod {
            year: period.year.clone(),
            month: period.month.clone(),
        }
    } else {
        e.into()
    }
}

/// Resolves the business a new report belongs to: the one named in the
/// request if the actor owns it, otherwise the actor's own business.
async fn target_business(
    state: &AppState,
    actor: Uuid,
    requested: Option<Uuid>,
) -> ApiResult<Uuid> {
    match requested {
        Some(id) => {
            let business = state
                .store
                .find_business(id)
                .await?
                .ok_or(ApiError::NotFound("Business"))?;
            if business.user != actor {
                warn!(user_id = %actor, business_id = %id, "report for another user's business");
                return Err(ApiError::NotFound("Business"));
            }
            Ok(business.id)
        }
        None => state
            .store
            .find_business_by_owner(actor)
            .await?
            .map(|b| b.id)
            .ok_or(ApiError::NoBusinessLinked),
    }
}

pub async fn create(
    state: &AppState,
    actor: Option<Uuid>,
    business: Option<Uuid>,
    period: Period,
    products_list: Vec<Product>,
) -> ApiResult<Report> {
    let actor = actor.ok_or(ApiError::MissingActor)?;
    let business_id = target_business(state, actor, business).await?;

    if state
        .store
        .find_report_by_period(business_id, &period)
        .await?
        .is_some()
    {
        warn!(%business_id, year = %period.year, month = %period.month, "period already reported");
        return Err(ApiError::DuplicatePeriod {
            year: period.year,
            month: period.month,
        });
    }

    let report = state
        .store
        .insert_report(NewReport {
            business_id,
            period: period.clone(),
            products_list,
        })
        .await
        .map_err(|e| duplicate_period(e, &period))?;

    info!(report_id = %report.id, %business_id, "report created");
    Ok(report)
}

pub async fn get_all(
    state: &AppState,
    filter: ReportFilter,
    page: PageRequest,
) -> ApiResult<Paged<Report>> {
    Ok(state.store.list_reports(filter, page.window()).await?)
}

pub async fn get_by_id(state: &AppState, id: Uuid) -> ApiResult<Report> {
    state
        .store
        .find_report(id)
        .await?
        .ok_or(ApiError::NotFound("Report"))
}

pub async fn update(state: &AppState, id: Uuid, patch: ReportPatch) -> ApiResult<Report> {
    let period = patch.period.clone();
    let updated = state
        .store
        .update_report(id, patch)
        .await
        .map_err(|e| match &period {
            Some(p) => duplicate_period(e, p),
            None => e.into(),
        })?
        .ok_or(ApiError::NotFound("Report"))?;

    info!(report_id = %id, "report updated");
    Ok(updated)
}

/// True when `user_id` owns the business the report belongs to.
pub async fn owned_by(state: &AppState, report: &Report, user_id: Uuid) -> ApiResult<bool> {
    Ok(state
        .store
        .find_business(report.business)
        .await?
        .is_some_and(|b| b.user == user_id))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::{roles::Role, services::register};
    use crate::business;
    use crate::mail::LogMailer;

    fn period(year: &str, month: &str) -> Period {
        Period {
            year: year.into(),
            month: month.into(),
        }
    }

    async fn owner(state: &AppState, email: &str, tax_id: &str) -> (Uuid, Uuid) {
        let user = register(state, email, "123456", Role::User).await.unwrap().id;
        let b = business::services::create(state, Some(user), tax_id, "EDUCANDO S.A.")
            .await
            .unwrap();
        (user, b.id)
    }

    #[tokio::test]
    async fn create_uses_own_business() {
        let state = AppState::in_memory(Arc::new(LogMailer));
        let (user, business_id) = owner(&state, "a@b.co", "402849029129").await;

        let report = create(&state, Some(user), None, period("2021", "05"), vec![])
            .await
            .unwrap();
        assert_eq!(report.business, business_id);
        assert_eq!(report.date_limit, crate::reports::repo_types::DEFAULT_DATE_LIMIT);

        let business = state.store.find_business(business_id).await.unwrap().unwrap();
        assert_eq!(business.reports, vec![report.id]);
    }

    #[tokio::test]
    async fn same_period_twice_conflicts() {
        let state = AppState::in_memory(Arc::new(LogMailer));
        let (user, _) = owner(&state, "a@b.co", "1").await;
        create(&state, Some(user), None, period("2021", "05"), vec![])
            .await
            .unwrap();
        let err = create(&state, Some(user), None, period("2021", "05"), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::DuplicatePeriod { .. }));
        assert_eq!(err.to_string(), "A report for 05/2021 already exists");
    }

    #[tokio::test]
    async fn user_without_business_cannot_report() {
        let state = AppState::in_memory(Arc::new(LogMailer));
        let user = register(&state, "a@b.co", "123456", Role::User).await.unwrap().id;
        assert!(matches!(
            create(&state, Some(user), None, period("2021", "05"), vec![]).await,
            Err(ApiError::NoBusinessLinked)
        ));
        assert!(matches!(
            create(&state, None, None, period("2021", "05"), vec![]).await,
            Err(ApiError::MissingActor)
        ));
    }

    #[tokio::test]
    async fn foreign_business_is_hidden() {
        let state = AppState::in_memory(Arc::new(LogMailer));
        let (_, theirs) = owner(&state, "a@b.co", "1").await;
        let (me, _) = owner(&state, "b@b.co", "2").await;
        assert!(matches!(
            create(&state, Some(me), Some(theirs), period("2021", "05"), vec![]).await,
            Err(ApiError::NotFound("Business"))
        ));
    }

    #[tokio::test]
    async fn update_rejects_taken_period_and_missing_report() {
        let state = AppState::in_memory(Arc::new(LogMailer));
        let (user, _) = owner(&state, "a@b.co", "1").await;
        create(&state, Some(user), None, period("2021", "05"), vec![])
            .await
            .unwrap();
        let june = create(&state, Some(user), None, period("2021", "06"), vec![])
            .await
            .unwrap();

        let patch = ReportPatch {
            period: Some(period("2021", "05")),
            ..ReportPatch::default()
        };
        assert!(matches!(
            update(&state, june.id, patch.clone()).await,
            Err(ApiError::DuplicatePeriod { .. })
        ));
        assert!(matches!(
            update(&state, Uuid::new_v4(), patch).await,
            Err(ApiError::NotFound("Report"))
        ));

        let moved = update(
            &state,
            june.id,
            ReportPatch {
                period: Some(period("2021", "07")),
                ..ReportPatch::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(moved.period, period("2021", "07"));
        assert!(owned_by(&state, &moved, user).await.unwrap());
    }
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{
        extractors::AuthUser,
        roles::{policy, Role},
    },
    error::{ApiError, ApiResult, Envelope},
    extract::{parse_id, ApiJson, ApiQuery},
    listing::{ListQuery, Listing},
    reports::{
        dto::{normalize_products, CreateReportRequest, UpdateReportRequest},
        repo_types::{Period, Report, ReportFilter},
        services,
    },
    state::AppState,
    store::Paged,
};

pub fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/reports", get(list_reports).post(create_report))
        .route("/reports/:id", get(get_report).put(update_report))
}

/// Normalizes the optional `year`/`month` query filters the same way stored periods are.
fn period_filter(query: &ListQuery) -> ApiResult<(Option<String>, Option<String>)> {
    let year = query.year.as_deref().map(str::trim).filter(|y| !y.is_empty());
    let month = query.month.as_deref().map(str::trim).filter(|m| !m.is_empty());
    let probe = Period {
        year: year.unwrap_or("2000").to_string(),
        month: month.unwrap_or("1").to_string(),
    }
    .normalized()?;
    Ok((year.map(|_| probe.year.clone()), month.map(|_| probe.month)))
}

#[instrument(skip(state))]
pub async fn list_reports(
    State(state): State<AppState>,
    caller: AuthUser,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Json<Listing<Report>>> {
    caller.authorize(policy::ANY)?;
    let page = query.page_request()?;
    let (year, month) = period_filter(&query)?;

    let business = if caller.role.sees_everything() {
        query.business
    } else {
        match state.store.find_business_by_owner(caller.user_id).await? {
            Some(own) => Some(own.id),
            None => {
                return Ok(Json(Listing::new(
                    Paged {
                        items: Vec::new(),
                        total: 0,
                    },
                    page,
                )))
            }
        }
    };

    let filter = ReportFilter {
        business,
        year,
        month,
    };
    let paged = services::get_all(&state, filter, page).await?;
    Ok(Json(Listing::new(paged, page)))
}

#[instrument(skip(state, payload))]
pub async fn create_report(
    State(state): State<AppState>,
    caller: AuthUser,
    ApiJson(payload): ApiJson<CreateReportRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<Report>>)> {
    caller.authorize(policy::OWNER)?;
    let period = payload.period.normalized()?;
    let products = normalize_products(&payload.products_list)?;

    let report = services::create(
        &state,
        Some(caller.user_id),
        payload.business,
        period,
        products,
    )
    .await?;
    Ok((StatusCode::CREATED, Envelope::data(report)))
}

/// Loads a report, hiding reports of other businesses from plain users.
async fn visible_report(state: &AppState, caller: &AuthUser, id: &str) -> ApiResult<Report> {
    let id = parse_id(id)?;
    let report = services::get_by_id(state, id).await?;
    if caller.role == Role::User && !services::owned_by(state, &report, caller.user_id).await? {
        warn!(user_id = %caller.user_id, report_id = %id, "report of another business requested");
        return Err(ApiError::NotFound("Report"));
    }
    Ok(report)
}

#[instrument(skip(state))]
pub async fn get_report(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<Report>>> {
    caller.authorize(policy::ANY)?;
    let report = visible_report(&state, &caller, &id).await?;
    Ok(Envelope::data(report))
}

#[instrument(skip(state, payload))]
pub async fn update_report(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<UpdateReportRequest>,
) -> ApiResult<Json<Envelope<Report>>> {
    caller.authorize(policy::REPORT_EDITORS)?;
    let report = visible_report(&state, &caller, &id).await?;
    let patch = payload.into_patch()?;
    let updated = services::update(&state, report.id, patch).await?;
    Ok(Envelope::data(updated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(year: Option<&str>, month: Option<&str>) -> ListQuery {
        ListQuery {
            year: year.map(Into::into),
            month: month.map(Into::into),
            ..ListQuery::default()
        }
    }

    #[test]
    fn period_filter_normalizes() {
        assert_eq!(period_filter(&query(None, None)).unwrap(), (None, None));
        assert_eq!(
            period_filter(&query(Some(" 2021"), Some("5"))).unwrap(),
            (Some("2021".to_string()), Some("05".to_string()))
        );
        assert_eq!(
            period_filter(&query(None, Some("11"))).unwrap(),
            (None, Some("11".to_string()))
        );
        assert!(period_filter(&query(Some("21"), None)).is_err());
    }
}

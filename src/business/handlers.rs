use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{extractors::AuthUser, roles::policy},
    business::{
        dto::{validate_new_business, BusinessView, CreateBusinessRequest},
        repo_types::BusinessFilter,
        services::{self, POPULATE_FIELDS},
    },
    error::{ApiError, ApiResult, Envelope},
    extract::{parse_id, ApiJson, ApiQuery},
    listing::{ListQuery, Listing},
    state::AppState,
};

pub fn business_routes() -> Router<AppState> {
    Router::new()
        .route("/business", get(list_business).post(create_business))
        .route("/business/:id", get(get_business))
}

/// admin and secretaria see every business; a user sees only their own.
#[instrument(skip(state))]
pub async fn list_business(
    State(state): State<AppState>,
    caller: AuthUser,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Json<Listing<BusinessView>>> {
    caller.authorize(policy::ANY)?;
    let page = query.page_request()?;
    let populate = query.populate(POPULATE_FIELDS)?;

    let filter = BusinessFilter {
        owner: (!caller.role.sees_everything()).then_some(caller.user_id),
    };
    let paged = services::list_all(&state, filter, page, &populate).await?;
    Ok(Json(Listing::new(paged, page)))
}

#[instrument(skip(state, payload))]
pub async fn create_business(
    State(state): State<AppState>,
    caller: AuthUser,
    ApiJson(payload): ApiJson<CreateBusinessRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<BusinessView>>)> {
    caller.authorize(policy::OWNER)?;
    let (tax_id, name) = validate_new_business(&payload.tax_id, &payload.business_name)?;
    let business = services::create(&state, Some(caller.user_id), &tax_id, &name).await?;
    Ok((StatusCode::CREATED, Envelope::data(business.into())))
}

#[instrument(skip(state))]
pub async fn get_business(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Json<Envelope<BusinessView>>> {
    caller.authorize(policy::ANY)?;
    let id = parse_id(&id)?;
    let populate = query.populate(POPULATE_FIELDS)?;

    let business = services::get_by_id(&state, id).await?;
    if !caller.role.sees_everything() && business.user != caller.user_id {
        warn!(user_id = %caller.user_id, business_id = %id, "business of another user requested");
        return Err(ApiError::NotFound("Business"));
    }
    let view = services::expand(&state, business, &populate).await?;
    Ok(Envelope::data(view))
}

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    business::{
        dto::BusinessView,
        repo_types::{Business, BusinessFilter, NewBusiness},
    },
    error::{ApiError, ApiResult},
    listing::{PageRequest, Ref},
    state::AppState,
    store::{Paged, BUSINESSES_TAX_ID_KEY, BUSINESSES_USER_ID_KEY},
};

/// References `list_all` and `get_view` may expand.
pub const POPULATE_FIELDS: &[&str] = &["user", "reports"];

pub async fn ensure_tax_id_free(state: &AppState, tax_id: &str) -> ApiResult<()> {
    if state.store.find_business_by_tax_id(tax_id).await?.is_some() {
        warn!(%tax_id, "tax id already registered");
        return Err(ApiError::DuplicateTaxId(tax_id.to_string()));
    }
    Ok(())
}

/// Creates the actor's business and links the actor to it. The pre-checks give
/// friendly errors; the store's unique keys on tax id and owner decide races.
pub async fn create(
    state: &AppState,
    actor: Option<Uuid>,
    tax_id: &str,
    business_name: &str,
) -> ApiResult<Business> {
    let user_id = actor.ok_or(ApiError::MissingActor)?;

    if state.store.find_business_by_owner(user_id).await?.is_some() {
        warn!(%user_id, "user already owns a business");
        return Err(ApiError::BusinessAlreadyExists);
    }
    ensure_tax_id_free(state, tax_id).await?;

    let business = state
        .store
        .insert_business(NewBusiness {
            tax_id: tax_id.to_string(),
            business_name: business_name.to_string(),
            user_id,
        })
        .await
        .map_err(|e| {
            if e.violates(BUSINESSES_TAX_ID_KEY) {
                ApiError::DuplicateTaxId(tax_id.to_string())
            } else if e.violates(BUSINESSES_USER_ID_KEY) {
                ApiError::BusinessAlreadyExists
            } else {
                e.into()
            }
        })?;

    info!(business_id = %business.id, %user_id, "business created");
    Ok(business)
}

pub async fn get_by_id(state: &AppState, id: Uuid) -> ApiResult<Business> {
    state
        .store
        .find_business(id)
        .await?
        .ok_or(ApiError::NotFound("Business"))
}

pub async fn list_all(
    state: &AppState,
    filter: BusinessFilter,
    page: PageRequest,
    populate: &[String],
) -> ApiResult<Paged<BusinessView>> {
    let paged = state.store.list_businesses(filter, page.window()).await?;
    let mut items = Vec::with_capacity(paged.items.len());
    for business in paged.items {
        items.push(expand(state, business, populate).await?);
    }
    Ok(Paged {
        items,
        total: paged.total,
    })
}

/// Replaces bare ids with the referenced documents named in `populate`.
pub async fn expand(
    state: &AppState,
    business: Business,
    populate: &[String],
) -> ApiResult<BusinessView> {
    let mut view = BusinessView::from(business);

    if populate.iter().any(|f| f == "user") {
        if let Ref::Id(user_id) = view.user {
            if let Some(user) = state.store.find_user_by_id(user_id).await? {
                view.user = Ref::Populated(user);
            }
        }
    }

    if populate.iter().any(|f| f == "reports") {
        let mut reports = Vec::with_capacity(view.reports.len());
        for r in view.reports {
            reports.push(match r {
                Ref::Id(id) => match state.store.find_report(id).await? {
                    Some(report) => Ref::Populated(report),
                    None => Ref::Id(id),
                },
                populated => populated,
            });
        }
        view.reports = reports;
    }

    Ok(view)
}

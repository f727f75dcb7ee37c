//! Paging and population for list endpoints.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::store::{Page, Paged};

pub const DEFAULT_LIMIT: i64 = 25;
pub const MAX_LIMIT: i64 = 100;

/// Query string shared by list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub populate: Option<String>,
    pub year: Option<String>,
    pub month: Option<String>,
    pub business: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl ListQuery {
    pub fn page_request(&self) -> Result<PageRequest, ApiError> {
        let page = self.page.unwrap_or(1);
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if page < 1 {
            return Err(ApiError::validation("page must be 1 or greater"));
        }
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(ApiError::validation(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
        if (page - 1).checked_mul(limit).is_none() {
            return Err(ApiError::validation("page is out of range"));
        }
        Ok(PageRequest { page, limit })
    }

    /// Comma separated list of references to expand, checked against `allowed`.
    pub fn populate(&self, allowed: &[&str]) -> Result<Vec<String>, ApiError> {
        let Some(raw) = &self.populate else {
            return Ok(Vec::new());
        };
        raw.split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(|f| {
                if allowed.contains(&f) {
                    Ok(f.to_string())
                } else {
                    Err(ApiError::validation(format!("Cannot populate {f:?}")))
                }
            })
            .collect()
    }
}

impl PageRequest {
    pub fn window(&self) -> Page {
        Page {
            offset: (self.page - 1) * self.limit,
            limit: self.limit,
        }
    }
}

/// A reference that is either a bare id or the expanded document.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Ref<T> {
    Id(Uuid),
    Populated(T),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct PageLink {
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct Pagination {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<PageLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<PageLink>,
}

/// List envelope: `{ success, count, total, pagination, data }`.
#[derive(Debug, Serialize)]
pub struct Listing<T: Serialize> {
    pub success: bool,
    pub count: usize,
    pub total: i64,
    pub pagination: Pagination,
    pub data: Vec<T>,
}

impl<T: Serialize> Listing<T> {
    pub fn new(paged: Paged<T>, req: PageRequest) -> Self {
        let end = req.page.saturating_mul(req.limit);
        let pagination = Pagination {
            next: (end < paged.total).then(|| PageLink {
                page: req.page + 1,
                limit: req.limit,
            }),
            prev: (req.page > 1).then(|| PageLink {
                page: req.page - 1,
                limit: req.limit,
            }),
        };
        Self {
            success: true,
            count: paged.items.len(),
            total: paged.total,
            pagination,
            data: paged.items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(page: Option<i64>, limit: Option<i64>) -> ListQuery {
        ListQuery {
            page,
            limit,
            ..ListQuery::default()
        }
    }

    #[test]
    fn defaults_and_bounds() {
        let req = query(None, None).page_request().unwrap();
        assert_eq!(req, PageRequest { page: 1, limit: DEFAULT_LIMIT });
        assert_eq!(req.window(), Page { offset: 0, limit: DEFAULT_LIMIT });

        assert_eq!(
            query(Some(3), Some(10)).page_request().unwrap().window(),
            Page { offset: 20, limit: 10 }
        );
        assert!(query(Some(0), None).page_request().is_err());
        assert!(query(None, Some(MAX_LIMIT + 1)).page_request().is_err());
    }

    #[test]
    fn huge_page_is_rejected() {
        assert!(matches!(
            query(Some(i64::MAX), Some(2)).page_request(),
            Err(ApiError::Validation(_))
        ));
        let last = i64::MAX / 2 + 1;
        let req = query(Some(last), Some(2)).page_request().unwrap();
        assert_eq!(req.window().offset, (last - 1) * 2);

        let listing = Listing::new(Paged { items: vec![1], total: 3 }, PageRequest { page: last, limit: 2 });
        assert!(listing.pagination.next.is_none());

        let single = query(Some(i64::MAX), Some(1)).page_request().unwrap();
        let listing = Listing::new(Paged { items: Vec::<u8>::new(), total: 0 }, single);
        assert!(listing.pagination.next.is_none());
    }

    #[test]
    fn populate_checks_fields() {
        let q = ListQuery {
            populate: Some("user, reports".into()),
            ..ListQuery::default()
        };
        assert_eq!(q.populate(&["user", "reports"]).unwrap(), vec!["user", "reports"]);
        assert!(q.populate(&["user"]).is_err());
    }

    #[test]
    fn pagination_links() {
        let paged = Paged {
            items: vec![1, 2],
            total: 5,
        };
        let listing = Listing::new(paged, PageRequest { page: 2, limit: 2 });
        assert_eq!(listing.count, 2);
        assert_eq!(listing.pagination.next, Some(PageLink { page: 3, limit: 2 }));
        assert_eq!(listing.pagination.prev, Some(PageLink { page: 1, limit: 2 }));

        let last = Listing::new(Paged { items: vec![5], total: 5 }, PageRequest { page: 3, limit: 2 });
        assert!(last.pagination.next.is_none());
    }

    #[test]
    fn ref_serializes_untagged() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(Ref::<u8>::Id(id)).unwrap();
        assert_eq!(json, serde_json::json!(id.to_string()));
        assert_eq!(serde_json::to_value(Ref::Populated(7u8)).unwrap(), serde_json::json!(7));
    }
}

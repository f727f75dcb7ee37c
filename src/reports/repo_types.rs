use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

/// Days a business has to complete a report after it is opened.
pub const DEFAULT_DATE_LIMIT: i32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: String,
    pub month: String,
}

/// Line item of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub product_name: String,
    pub ean_code: String,
    pub price: f64,
    pub unit: String,
    pub quantity_produced: f64,
    pub quantity_sold: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: Uuid,
    pub business: Uuid,
    pub period: Period,
    pub date_limit: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub date_added: OffsetDateTime,
    pub products_list: Vec<Product>,
}

#[derive(Debug, Clone)]
pub struct NewReport {
    pub business_id: Uuid,
    pub period: Period,
    pub products_list: Vec<Product>,
}

/// Fields an update may replace; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct ReportPatch {
    pub period: Option<Period>,
    pub products_list: Option<Vec<Product>>,
}

#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub business: Option<Uuid>,
    pub year: Option<String>,
    pub month: Option<String>,
}

impl ReportFilter {
    pub fn matches(&self, report: &Report) -> bool {
        self.business.map_or(true, |b| b == report.business)
            && self.year.as_ref().map_or(true, |y| *y == report.period.year)
            && self.month.as_ref().map_or(true, |m| *m == report.period.month)
    }
}

#[derive(Debug, FromRow)]
pub struct ReportRow {
    pub id: Uuid,
    pub business_id: Uuid,
    pub period_year: String,
    pub period_month: String,
    pub date_limit: i32,
    pub date_added: OffsetDateTime,
    pub products_list: Json<Vec<Product>>,
}

impl From<ReportRow> for Report {
    fn from(r: ReportRow) -> Self {
        Self {
            id: r.id,
            business: r.business_id,
            period: Period {
                year: r.period_year,
                month: r.period_month,
            },
            date_limit: r.date_limit,
            date_added: r.date_added,
            products_list: r.products_list.0,
        }
    }
}

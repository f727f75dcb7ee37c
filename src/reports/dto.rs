use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::reports::repo_types::{Period, Product, ReportPatch};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReportRequest {
    /// Target business; defaults to the caller's own.
    #[serde(default)]
    pub business: Option<Uuid>,
    pub period: Period,
    #[serde(default)]
    pub products_list: Vec<Product>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReportRequest {
    #[serde(default)]
    pub period: Option<Period>,
    #[serde(default)]
    pub products_list: Option<Vec<Product>>,
}

impl Period {
    /// Trims both parts, requires a four digit year and pads the month to two digits.
    pub fn normalized(&self) -> Result<Period, ApiError> {
        lazy_static! {
            static ref YEAR_RE: Regex = Regex::new(r"^\d{4}$").unwrap();
            static ref MONTH_RE: Regex = Regex::new(r"^(0?[1-9]|1[0-2])$").unwrap();
        }
        let year = self.year.trim();
        let month = self.month.trim();
        if !YEAR_RE.is_match(year) {
            return Err(ApiError::validation(format!("Invalid period year {year:?}")));
        }
        if !MONTH_RE.is_match(month) {
            return Err(ApiError::validation(format!("Invalid period month {month:?}")));
        }
        Ok(Period {
            year: year.to_string(),
            month: format!("{month:0>2}"),
        })
    }
}

impl Product {
    pub fn normalized(&self) -> Result<Product, ApiError> {
        let text = |name: &str, value: &str| -> Result<String, ApiError> {
            let value = value.trim();
            if value.is_empty() {
                Err(ApiError::validation(format!("Product {name} is required")))
            } else {
                Ok(value.to_string())
            }
        };
        let amount = |name: &str, value: f64| -> Result<f64, ApiError> {
            if value.is_finite() && value >= 0.0 {
                Ok(value)
            } else {
                Err(ApiError::validation(format!(
                    "Product {name} must be a non-negative number"
                )))
            }
        };
        Ok(Product {
            product_name: text("productName", &self.product_name)?,
            ean_code: text("eanCode", &self.ean_code)?,
            price: amount("price", self.price)?,
            unit: text("unit", &self.unit)?,
            quantity_produced: amount("quantityProduced", self.quantity_produced)?,
            quantity_sold: amount("quantitySold", self.quantity_sold)?,
        })
    }
}

pub fn normalize_products(products: &[Product]) -> Result<Vec<Product>, ApiError> {
    products.iter().map(Product::normalized).collect()
}

impl UpdateReportRequest {
    pub fn into_patch(self) -> Result<ReportPatch, ApiError> {
        Ok(ReportPatch {
            period: self.period.as_ref().map(Period::normalized).transpose()?,
            products_list: self
                .products_list
                .as_deref()
                .map(normalize_products)
                .transpose()?,
        })
    }
}

//! Inventory record and its form projection

use chrono::Local;
use serde::{Deserialize, Serialize};

/// Timestamp format used for `updated_at`
const UPDATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local time formatted for `updated_at`
pub fn now_string() -> String {
    Local::now().format(UPDATED_AT_FORMAT).to_string()
}

/// Inventory entity, keyed by barcode
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Record {
    pub barcode: String,
    pub name: String,
    pub image: String,
    pub category: String,
    pub qty: i64,
    pub stock: Option<i64>,
    pub price: Option<f64>,
    pub note: String,
    /// `;`-separated tag list
    pub tags: String,
    pub updated_at: String,
}

impl Record {
    pub fn new(barcode: impl Into<String>, name: impl Into<String>) -> Self {
        Self { barcode: barcode.into(), name: name.into(), ..Default::default() }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_tags(mut self, tags: &str) -> Self {
        self.tags = tags.to_string();
        self
    }

    /// Trimmed, non-empty tags
    pub fn tag_list(&self) -> impl Iterator<Item = &str> {
        self.tags.split(';').map(str::trim).filter(|t| !t.is_empty())
    }
}

/// Values currently entered in the main form
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormData {
    pub barcode: String,
    pub name: String,
    pub image: String,
    pub category: String,
    pub qty: Option<i64>,
    pub stock: Option<i64>,
    pub price: Option<f64>,
    pub note: String,
    pub tags: String,
}

impl FormData {
    /// True when no field holds a value (no record is open)
    pub fn is_empty(&self) -> bool {
        self.barcode.trim().is_empty()
            && self.name.trim().is_empty()
            && self.image.trim().is_empty()
            && self.category.trim().is_empty()
            && self.qty.is_none()
            && self.stock.is_none()
            && self.price.is_none()
            && self.note.trim().is_empty()
            && self.tags.trim().is_empty()
    }

    /// Whether a required field is present
    ///
    /// Unknown field names are treated as present.
    pub fn has_field(&self, field: &str) -> bool {
        match field {
            "barcode" => !self.barcode.trim().is_empty(),
            "name" => !self.name.trim().is_empty(),
            "image" => !self.image.trim().is_empty(),
            "category" => !self.category.trim().is_empty(),
            "qty" => self.qty.is_some(),
            "stock" => self.stock.is_some(),
            "price" => self.price.is_some(),
            "note" => !self.note.trim().is_empty(),
            "tags" => !self.tags.trim().is_empty(),
            _ => true,
        }
    }

    /// Build the record to persist, stamped with the current time
    pub fn to_record(&self) -> Record {
        Record {
            barcode: self.barcode.trim().to_string(),
            name: self.name.trim().to_string(),
            image: self.image.trim().to_string(),
            category: self.category.trim().to_string(),
            qty: self.qty.unwrap_or(0),
            stock: self.stock,
            price: self.price,
            note: self.note.trim().to_string(),
            tags: self.tags.trim().to_string(),
            updated_at: now_string(),
        }
    }
}

impl From<&Record> for FormData {
    fn from(record: &Record) -> Self {
        Self {
            barcode: record.barcode.clone(),
            name: record.name.clone(),
            image: record.image.clone(),
            category: record.category.clone(),
            qty: Some(record.qty),
            stock: record.stock,
            price: record.price,
            note: record.note.clone(),
            tags: record.tags.clone(),
        }
    }
}

//! Product form backed by the inventory store
//!
//! A cloneable handle: the dispatcher owns one as its `FormCollaborator`
//! while the terminal host keeps another to apply typed edits.

use crate::domain::record::{FormData, Record};
use crate::infra::config::Config;
use crate::io::store::InventoryStore;
use crate::services::collaborators::{FormCollaborator, RecordStore};
use anyhow::Context;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct FormState {
    data: FormData,
    dirty: bool,
}

#[derive(Clone)]
pub struct InventoryForm {
    state: Arc<Mutex<FormState>>,
    store: InventoryStore,
    required_fields: Vec<String>,
    default_qty: i64,
}

impl InventoryForm {
    pub fn new(store: InventoryStore, required_fields: Vec<String>, default_qty: i64) -> Self {
        let state = FormState { data: blank(default_qty), dirty: false };
        Self { state: Arc::new(Mutex::new(state)), store, required_fields, default_qty }
    }

    pub fn from_config(store: InventoryStore, config: &Config) -> Self {
        Self::new(store, config.required_fields().to_vec(), config.default_qty())
    }

    /// Operator edit of a single field; marks the form dirty
    pub fn set_field(&self, field: &str, value: &str) -> anyhow::Result<()> {
        let value = value.trim();
        let mut state = self.state.lock();
        let data = &mut state.data;
        match field {
            "barcode" => data.barcode = value.to_string(),
            "name" => data.name = value.to_string(),
            "image" => data.image = value.to_string(),
            "category" => data.category = value.to_string(),
            "note" => data.note = value.to_string(),
            "tags" => data.tags = value.to_string(),
            "qty" => data.qty = parse_optional(value).context("qty must be a whole number")?,
            "stock" => data.stock = parse_optional(value).context("stock must be a whole number")?,
            "price" => data.price = parse_optional(value).context("price must be a number")?,
            other => anyhow::bail!("unknown form field '{}'", other),
        }
        state.dirty = true;
        debug!(field = %field, "form_field_edited");
        Ok(())
    }
}

fn blank(default_qty: i64) -> FormData {
    FormData { qty: Some(default_qty), ..Default::default() }
}

fn parse_optional<T: std::str::FromStr>(value: &str) -> anyhow::Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if value.is_empty() {
        return Ok(None);
    }
    Ok(Some(value.parse::<T>()?))
}

impl FormCollaborator for InventoryForm {
    fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    fn form_data(&self) -> FormData {
        self.state.lock().data.clone()
    }

    fn validate(&self, data: &FormData) -> Vec<String> {
        self.required_fields.iter().filter(|f| !data.has_field(f)).cloned().collect()
    }

    fn save(&mut self) -> anyhow::Result<bool> {
        let data = self.form_data();
        let missing = self.validate(&data);
        if !missing.is_empty() {
            debug!(missing = ?missing, "form_save_rejected");
            return Ok(false);
        }

        let record = self.store.upsert(data.to_record())?;
        let mut state = self.state.lock();
        state.data = FormData::from(&record);
        state.dirty = false;
        info!(barcode = %record.barcode, name = %record.name, "form_saved");
        Ok(true)
    }

    fn reset(&mut self) {
        let mut state = self.state.lock();
        state.data = blank(self.default_qty);
        state.dirty = false;
    }

    fn load_record(&mut self, record: &Record) {
        let mut state = self.state.lock();
        state.data = FormData::from(record);
        state.dirty = false;
    }

    fn barcode(&self) -> String {
        self.state.lock().data.barcode.clone()
    }

    /// Scanner writes do not count as operator edits
    fn set_barcode(&mut self, code: &str) {
        self.state.lock().data.barcode = code.to_string();
    }
}

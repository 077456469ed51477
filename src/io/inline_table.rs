//! Inline-editable inventory table
//!
//! Rows are identified by the barcode they were rendered with. Committing a
//! cell writes the value back into that record and stamps `updated_at`.

use crate::domain::record::{now_string, Record};
use crate::domain::types::{CellRef, BARCODE_FIELD};
use crate::io::store::InventoryStore;
use crate::services::collaborators::{CellEditor, RecordStore};
use anyhow::Context;
use tracing::info;

pub struct InlineTable {
    store: InventoryStore,
}

impl InlineTable {
    pub fn new(store: InventoryStore) -> Self {
        Self { store }
    }
}

/// Apply an edited cell value to a record
///
/// Text fields are trimmed. An unparsable quantity becomes 0 and an
/// unparsable stock or price is cleared.
fn apply_cell(record: &mut Record, field: &str, value: &str) -> anyhow::Result<()> {
    let value = value.trim();
    match field {
        "barcode" => record.barcode = value.to_string(),
        "name" => record.name = value.to_string(),
        "note" => record.note = value.to_string(),
        "category" => record.category = value.to_string(),
        "tags" => record.tags = value.to_string(),
        "qty" => record.qty = value.parse().unwrap_or(0),
        "stock" => record.stock = value.parse().ok(),
        "price" => record.price = value.parse().ok(),
        other => anyhow::bail!("column '{}' is not editable", other),
    }
    record.updated_at = now_string();
    Ok(())
}

impl CellEditor for InlineTable {
    fn commit_cell(&mut self, cell: &CellRef, value: &str) -> anyhow::Result<()> {
        let original = self
            .store
            .find_by_exact_code(&cell.row_key)?
            .into_iter()
            .next()
            .with_context(|| format!("row {} is no longer in the inventory", cell.row_key))?;

        let mut updated = original.clone();
        apply_cell(&mut updated, &cell.field, value)?;

        if cell.field == BARCODE_FIELD && updated.barcode != original.barcode {
            if updated.barcode.is_empty() {
                anyhow::bail!("barcode cell cannot be empty");
            }
            if !self.store.find_by_exact_code(&updated.barcode)?.is_empty() {
                anyhow::bail!("barcode {} already belongs to another record", updated.barcode);
            }
            self.store.delete_by_code(&original.barcode)?;
            if let Err(e) = self.store.upsert(updated.clone()) {
                self.store.upsert(original)?;
                return Err(e);
            }
        } else {
            self.store.upsert(updated.clone())?;
        }

        info!(row = %cell.row_key, field = %cell.field, barcode = %updated.barcode, "table_cell_committed");
        Ok(())
    }
}

//! In-memory inventory store with JSON snapshot persistence
//!
//! The store is a shared handle: clones see the same records, so the form,
//! the scan dispatcher and the sync worker can each hold one.

use crate::domain::record::Record;
use crate::services::collaborators::RecordStore;
use anyhow::Context;
use parking_lot::RwLock;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone, Default)]
pub struct InventoryStore {
    records: Arc<RwLock<Vec<Record>>>,
}

impl InventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<Record>) -> Self {
        Self { records: Arc::new(RwLock::new(records)) }
    }

    /// Load a JSON snapshot; a missing file yields an empty store
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "store_snapshot_missing");
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read store snapshot {}", path.display()))?;
        let records: Vec<Record> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse store snapshot {}", path.display()))?;

        info!(path = %path.display(), records = records.len(), "store_loaded");
        Ok(Self::with_records(records))
    }

    pub fn snapshot_json(&self) -> anyhow::Result<String> {
        let records = self.records.read();
        serde_json::to_string_pretty(&*records).context("Failed to serialize store snapshot")
    }

    /// Write the snapshot through a temp file so readers never see a torn file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<usize> {
        let path = path.as_ref();
        let json = self.snapshot_json()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json.as_bytes())
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to move snapshot into {}", path.display()))?;

        debug!(path = %path.display(), bytes = json.len(), "store_snapshot_written");
        Ok(json.len())
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl RecordStore for InventoryStore {
    fn find_by_exact_code(&self, code: &str) -> anyhow::Result<Vec<Record>> {
        let code = code.trim();
        Ok(self.records.read().iter().filter(|r| r.barcode.trim() == code).cloned().collect())
    }

    fn find_by_partial_code(&self, fragment: &str) -> anyhow::Result<Vec<Record>> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| !r.barcode.is_empty() && r.barcode.contains(fragment))
            .cloned()
            .collect())
    }

    fn upsert(&mut self, record: Record) -> anyhow::Result<Record> {
        if record.barcode.trim().is_empty() {
            anyhow::bail!("cannot store a record without barcode");
        }
        let mut records = self.records.write();
        let code = record.barcode.trim();
        match records.iter_mut().find(|r| r.barcode.trim() == code) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(record)
    }

    fn delete_by_code(&mut self, code: &str) -> anyhow::Result<bool> {
        let code = code.trim();
        let mut records = self.records.write();
        match records.iter().position(|r| r.barcode.trim() == code) {
            Some(idx) => {
                records.remove(idx);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn all(&self) -> anyhow::Result<Vec<Record>> {
        Ok(self.records.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InventoryStore {
        InventoryStore::with_records(vec![
            Record::new("4901234567894", "Green tea"),
            Record::new("999", "Dup A"),
            Record::new("999", "Dup B"),
            Record::new("", "No code"),
        ])
    }

    #[test]
    fn test_exact_match_tolerates_duplicates() {
        let store = store();
        assert_eq!(store.find_by_exact_code("999").unwrap().len(), 2);
        assert_eq!(store.find_by_exact_code(" 4901234567894 ").unwrap().len(), 1);
        assert!(store.find_by_exact_code("123").unwrap().is_empty());
    }

    #[test]
    fn test_partial_match_skips_blank_codes() {
        let store = store();
        let found = store.find_by_partial_code("12345").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Green tea");
        assert!(store.find_by_partial_code("").unwrap().is_empty());
    }

    #[test]
    fn test_upsert_replaces_first_match() {
        let mut store = store();
        store.upsert(Record::new("4901234567894", "Black tea")).unwrap();
        assert_eq!(store.len(), 4);
        assert_eq!(store.find_by_exact_code("4901234567894").unwrap()[0].name, "Black tea");

        store.upsert(Record::new("555", "New")).unwrap();
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn test_upsert_rejects_blank_barcode() {
        let mut store = InventoryStore::new();
        assert!(store.upsert(Record::new("  ", "x")).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_removes_one() {
        let mut store = store();
        assert!(store.delete_by_code("999").unwrap());
        assert_eq!(store.find_by_exact_code("999").unwrap().len(), 1);
        assert!(!store.delete_by_code("nope").unwrap());
    }

    #[test]
    fn test_clones_share_records() {
        let store = InventoryStore::new();
        let mut other = store.clone();
        other.upsert(Record::new("1234", "Shared")).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("inventory.json");

        store().save_to_file(&path).unwrap();
        let loaded = InventoryStore::load_from_file(&path).unwrap();

        assert_eq!(loaded.all().unwrap(), store().all().unwrap());
    }

    #[test]
    fn test_missing_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = InventoryStore::load_from_file(dir.path().join("none.json")).unwrap();
        assert!(loaded.is_empty());
    }
}

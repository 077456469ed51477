//! Category and tag lists derived from the inventory
//!
//! Rebuilt after saves and barcode renames so pickers offer what is
//! actually in stock.

use crate::domain::record::Record;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

/// A category or tag with the number of records using it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Default)]
struct CatalogLists {
    categories: Vec<CatalogEntry>,
    tags: Vec<CatalogEntry>,
}

#[derive(Clone, Default)]
pub struct CatalogIndex {
    lists: Arc<RwLock<CatalogLists>>,
}

impl CatalogIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace both lists from a full record set
    pub fn rebuild(&self, records: &[Record]) {
        let mut categories: FxHashMap<&str, usize> = FxHashMap::default();
        let mut tags: FxHashMap<&str, usize> = FxHashMap::default();

        for record in records {
            let category = record.category.trim();
            if !category.is_empty() {
                *categories.entry(category).or_default() += 1;
            }
            for tag in record.tag_list() {
                *tags.entry(tag).or_default() += 1;
            }
        }

        let categories = sorted(categories);
        let tags = sorted(tags);
        debug!(categories = categories.len(), tags = tags.len(), "catalog_rebuilt");

        let mut lists = self.lists.write();
        lists.categories = categories;
        lists.tags = tags;
    }

    pub fn categories(&self) -> Vec<CatalogEntry> {
        self.lists.read().categories.clone()
    }

    pub fn tags(&self) -> Vec<CatalogEntry> {
        self.lists.read().tags.clone()
    }
}

fn sorted(counts: FxHashMap<&str, usize>) -> Vec<CatalogEntry> {
    let mut entries: Vec<CatalogEntry> =
        counts.into_iter().map(|(name, count)| CatalogEntry { name: name.to_string(), count }).collect();
    entries.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()).then(a.name.cmp(&b.name)));
    entries
}

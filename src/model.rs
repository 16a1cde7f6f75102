//! Resident in-memory data model: `Stats`, `IdMap`, `SecondaryIndex`,
//! `Partition`, `Collection`.
//!
//! Re-architected from the source's single heterogeneous per-collection
//! mapping into typed fields, per the Design Notes in `SPEC_FULL.md` §9;
//! structurally grounded on `ironbase-core/src/collection_core/mod.rs`,
//! whose `CollectionCore` likewise groups storage, indexes, and stats under
//! one named struct instead of a loose map.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Document;

/// Per-collection monotone counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub inserted: u64,
    pub total: u64,
}

/// `_id` -> partition name, for O(1) document lookup.
pub type IdMap = HashMap<u64, String>;

/// field -> stringified value -> set of ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecondaryIndex {
    pub entries: HashMap<String, HashSet<u64>>,
}

impl SecondaryIndex {
    pub fn add(&mut self, value: &Value, id: u64) {
        self.entries.entry(stringify(value)).or_default().insert(id);
    }

    pub fn remove(&mut self, value: &Value, id: u64) {
        if let Some(set) = self.entries.get_mut(&stringify(value)) {
            set.remove(&id);
            if set.is_empty() {
                self.entries.remove(&stringify(value));
            }
        }
    }

    pub fn lookup(&self, value: &Value) -> Option<&HashSet<u64>> {
        self.entries.get(&stringify(value))
    }
}

/// Canonical stringification used as a secondary-index key.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// An ordered sequence of documents sharing a partition key.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub docs: Vec<Document>,
}

impl Partition {
    pub fn push(&mut self, doc: Document) {
        self.docs.push(doc);
    }

    pub fn remove_by_id(&mut self, id: u64) -> Option<Document> {
        let idx = self.docs.iter().position(|d| d.id == id)?;
        Some(self.docs.remove(idx))
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut Document> {
        self.docs.iter_mut().find(|d| d.id == id)
    }
}

/// A named container of partitions plus its bookkeeping metadata.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub stats: Stats,
    pub id_map: IdMap,
    pub secondary_indexes: HashMap<String, SecondaryIndex>,
    pub partitions: BTreeMap<String, Partition>,
}

impl Collection {
    /// Find the partition name holding `id`, trying the id map first and
    /// falling back to a full scan (used after manual edits / AOF replay
    /// races where the map might lag the partitions briefly).
    pub fn locate(&self, id: u64) -> Option<String> {
        if let Some(p) = self.id_map.get(&id) {
            if self
                .partitions
                .get(p)
                .map(|part| part.docs.iter().any(|d| d.id == id))
                .unwrap_or(false)
            {
                return Some(p.clone());
            }
        }
        self.partitions
            .iter()
            .find(|(_, part)| part.docs.iter().any(|d| d.id == id))
            .map(|(name, _)| name.clone())
    }

    pub fn get_document(&self, id: u64) -> Option<&Document> {
        let p = self.locate(id)?;
        self.partitions.get(&p)?.docs.iter().find(|d| d.id == id)
    }

    pub fn live_count(&self) -> u64 {
        self.partitions.values().map(|p| p.docs.len() as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn secondary_index_add_remove() {
        let mut idx = SecondaryIndex::default();
        idx.add(&json!("alice@example.com"), 1);
        assert!(idx.lookup(&json!("alice@example.com")).unwrap().contains(&1));
        idx.remove(&json!("alice@example.com"), 1);
        assert!(idx.lookup(&json!("alice@example.com")).is_none());
    }

    #[test]
    fn collection_locate_falls_back_to_scan() {
        let mut coll = Collection::default();
        let doc = Document::from_value(1, json!({"name": "A"})).unwrap();
        coll.partitions.entry("default".into()).or_default().push(doc);
        // id_map intentionally left empty to exercise the scan fallback
        assert_eq!(coll.locate(1), Some("default".to_string()));
    }

    proptest! {
        /// For any sequence of add/remove on a single key, the index entry
        /// exists iff the net number of adds exceeds removes (the universal
        /// secondary-index consistency invariant from the design notes,
        /// checked directly on the data structure rather than through a
        /// full running database).
        #[test]
        fn secondary_index_tracks_net_membership(ops in prop::collection::vec(any::<bool>(), 0..30)) {
            let mut idx = SecondaryIndex::default();
            let value = json!("x");
            let mut present = false;
            for add in ops {
                if add {
                    idx.add(&value, 1);
                    present = true;
                } else if present {
                    idx.remove(&value, 1);
                    present = false;
                }
            }
            prop_assert_eq!(idx.lookup(&value).is_some(), present);
        }
    }

    #[test]
    fn live_count_sums_partitions() {
        let mut coll = Collection::default();
        coll.partitions
            .entry("a".into())
            .or_default()
            .push(Document::from_value(1, json!({})).unwrap());
        coll.partitions
            .entry("b".into())
            .or_default()
            .push(Document::from_value(2, json!({})).unwrap());
        assert_eq!(coll.live_count(), 2);
    }
}

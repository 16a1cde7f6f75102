//! `dropIndex` (§4.12): remove a partition from a collection, purging its
//! documents from the id map and every secondary index.

use crate::database::{self, Database, State};
use crate::error::{Error, Result};
use crate::ops::mark_unit_dirty;

pub fn drop_index(db: &Database, state: &mut State, collection: &str, index: &str) -> Result<()> {
    database::ensure_collection_resident(db, state, collection)?;
    database::ensure_partition_resident(db, state, collection, index)?;

    let coll = state
        .collections
        .get_mut(collection)
        .ok_or_else(|| Error::collection_not_found(collection))?;
    let removed = coll
        .partitions
        .remove(index)
        .ok_or_else(|| Error::index_not_found(collection, index))?;

    coll.stats.total = coll.stats.total.saturating_sub(removed.docs.len() as u64);
    for doc in &removed.docs {
        coll.id_map.remove(&doc.id);
        for (field, idx) in coll.secondary_indexes.iter_mut() {
            if let Some(v) = doc.get(field) {
                idx.remove(v, doc.id);
            }
        }
    }

    mark_unit_dirty(state, &db.config.mode, collection, index);
    state.cache.forget(&crate::ops::unit_key(&db.config.mode, collection, index));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfigBuilder;
    use crate::ops::{create::create, IndexSpec};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn drop_index_purges_documents() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfigBuilder::new()
            .file(dir.path().join("db.json"))
            .build()
            .unwrap();
        let db = Database::open(config).unwrap();
        let mut state = db.state.lock();
        let default = IndexSpec::default_partition();
        create(&db, &mut state, "people", &default, json!({"name": "A"})).unwrap();
        drop_index(&db, &mut state, "people", "default").unwrap();
        let coll = state.collections.get("people").unwrap();
        assert_eq!(coll.stats.total, 0);
        assert!(coll.locate(1).is_none());
    }

    #[test]
    fn drop_index_purges_sharded_cache_key() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfigBuilder::new()
            .folder(dir.path())
            .sharding(true)
            .build()
            .unwrap();
        let db = Database::open(config).unwrap();
        let mut state = db.state.lock();
        let default = IndexSpec::default_partition();
        create(&db, &mut state, "people", &default, json!({"name": "A"})).unwrap();
        assert!(state.cache.contains("people::default"));
        drop_index(&db, &mut state, "people", "default").unwrap();
        assert!(!state.cache.contains("people::default"));
    }

    #[test]
    fn drop_index_missing_fails() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfigBuilder::new()
            .file(dir.path().join("db.json"))
            .build()
            .unwrap();
        let db = Database::open(config).unwrap();
        let mut state = db.state.lock();
        let err = drop_index(&db, &mut state, "people", "ghost").unwrap_err();
        assert!(matches!(err, Error::IndexNotFound { .. }));
    }
}

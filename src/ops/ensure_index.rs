//! `ensureIndex` (§4.14): create a secondary index on `field` and backfill
//! it from every existing document.

use crate::config::PersistenceMode;
use crate::database::{self, Database, State};
use crate::error::Result;
use crate::model::{Collection, SecondaryIndex};

pub fn ensure_index(db: &Database, state: &mut State, collection: &str, field: &str) -> Result<()> {
    database::ensure_collection_resident(db, state, collection)?;
    if let PersistenceMode::Sharded { root } = &db.config.mode {
        for name in database::discover_shard_partitions(root, collection)? {
            database::ensure_partition_resident(db, state, collection, &name)?;
        }
    }
    let coll = state.collections.entry(collection.to_string()).or_default();
    build_index(coll, field);
    Ok(())
}

/// Populate (or rebuild) the secondary index for `field` from the
/// partitions already resident in memory. Shared by the live operation and
/// AOF replay.
pub(crate) fn build_index(coll: &mut Collection, field: &str) {
    let mut index = SecondaryIndex::default();
    for partition in coll.partitions.values() {
        for doc in &partition.docs {
            if let Some(v) = doc.get(field) {
                index.add(v, doc.id);
            }
        }
    }
    coll.secondary_indexes.insert(field.to_string(), index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfigBuilder;
    use crate::ops::{create::create, IndexSpec};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn ensure_index_backfills_existing_docs() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfigBuilder::new()
            .file(dir.path().join("db.json"))
            .build()
            .unwrap();
        let db = Database::open(config).unwrap();
        let mut state = db.state.lock();
        let default = IndexSpec::default_partition();
        create(&db, &mut state, "users", &default, json!({"email": "a@b.com"})).unwrap();
        create(&db, &mut state, "users", &default, json!({"email": "c@d.com"})).unwrap();
        ensure_index(&db, &mut state, "users", "email").unwrap();
        let coll = state.collections.get("users").unwrap();
        let idx = coll.secondary_indexes.get("email").unwrap();
        assert!(idx.lookup(&json!("a@b.com")).unwrap().contains(&1));
        assert!(idx.lookup(&json!("c@d.com")).unwrap().contains(&2));
    }

    #[test]
    fn ensure_index_backfills_shards_not_yet_resident() {
        let dir = TempDir::new().unwrap();
        let by_email = |v: &serde_json::Value| {
            v.get("email").and_then(|e| e.as_str()).map(str::to_string).unwrap_or_default()
        };

        {
            let config = StoreConfigBuilder::new()
                .folder(dir.path())
                .sharding(true)
                .build()
                .unwrap();
            let db = Database::open(config).unwrap();
            let mut state = db.state.lock();
            let index = IndexSpec::Fn(&by_email);
            create(&db, &mut state, "users", &index, json!({"email": "a@b.com"})).unwrap();
            create(&db, &mut state, "users", &index, json!({"email": "c@d.com"})).unwrap();
            database::save_all_dirty(&db, &mut state).unwrap();
        }

        // A freshly opened sharded store only loads collection metadata, not
        // shard files; ensureIndex must still see every document.
        let config = StoreConfigBuilder::new()
            .folder(dir.path())
            .sharding(true)
            .build()
            .unwrap();
        let db = Database::open(config).unwrap();
        let mut state = db.state.lock();
        ensure_index(&db, &mut state, "users", "email").unwrap();
        let coll = state.collections.get("users").unwrap();
        let idx = coll.secondary_indexes.get("email").unwrap();
        assert!(idx.lookup(&json!("a@b.com")).unwrap().contains(&1));
        assert!(idx.lookup(&json!("c@d.com")).unwrap().contains(&2));
    }
}

//! `rewriteCollection` (§4.13): collect all live documents, replace the
//! collection with fresh stats, and re-insert everyone under freshly
//! minted ids. This intentionally breaks stable document identity across a
//! rewrite (see `DESIGN.md`, decision carried from `SPEC_FULL.md` §9).
//! Existing secondary indexes are carried over (as empty indexes on the
//! fresh collection, repopulated by the re-insertion loop) so `ensureIndex`
//! work isn't silently lost on the next rewrite.

use std::cmp::Ordering;

use serde_json::Value;

use crate::config::PersistenceMode;
use crate::database::{self, Database, State};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::model::Collection;
use crate::ops::{insert_materialized, mark_unit_dirty, IndexSpec};
use crate::paths;

pub fn rewrite_collection(
    db: &Database,
    state: &mut State,
    collection: &str,
    index: &IndexSpec,
    sort: Option<&dyn Fn(&Value, &Value) -> Ordering>,
) -> Result<Vec<(Document, String)>> {
    database::ensure_collection_resident(db, state, collection)?;
    if let PersistenceMode::Sharded { root } = &db.config.mode {
        for name in database::discover_shard_partitions(root, collection)? {
            database::ensure_partition_resident(db, state, collection, &name)?;
        }
    }

    let (mut docs, old_partition_names, indexed_fields): (Vec<Value>, Vec<String>, Vec<String>) = {
        let coll = state
            .collections
            .get(collection)
            .ok_or_else(|| Error::collection_not_found(collection))?;
        let docs = coll
            .partitions
            .values()
            .flat_map(|p| p.docs.iter().map(Document::to_value))
            .collect();
        let names = coll.partitions.keys().cloned().collect();
        let fields = coll.secondary_indexes.keys().cloned().collect();
        (docs, names, fields)
    };

    match sort {
        Some(cmp) => docs.sort_by(|a, b| cmp(a, b)),
        None => docs.sort_by_key(|d| d.get("_id").and_then(|v| v.as_u64()).unwrap_or(0)),
    }

    if let PersistenceMode::Sharded { root } = &db.config.mode {
        for name in &old_partition_names {
            let path = paths::shard_path(root, collection, name, db.config.compression);
            database::delete_file_best_effort(&path);
        }
    }

    let mut fresh = Collection::default();
    for field in &indexed_fields {
        fresh.secondary_indexes.insert(field.clone(), Default::default());
    }
    state.collections.insert(collection.to_string(), fresh);

    let mut assignments = Vec::with_capacity(docs.len());
    for mut doc_val in docs {
        if let Value::Object(ref mut map) = doc_val {
            map.remove("_id");
        }
        let partition = index.resolve(&doc_val);
        database::ensure_partition_resident(db, state, collection, &partition)?;
        let coll = state.collections.get_mut(collection).unwrap();
        let id = coll.stats.inserted + 1;
        let doc = Document::from_value(id, doc_val)?;
        insert_materialized(coll, &partition, doc.clone());
        mark_unit_dirty(state, &db.config.mode, collection, &partition);
        assignments.push((doc, partition));
    }

    for name in old_partition_names {
        mark_unit_dirty(state, &db.config.mode, collection, &name);
    }

    Ok(assignments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfigBuilder;
    use crate::ops::create_many::create_many;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn rewrite_remints_ids() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfigBuilder::new()
            .file(dir.path().join("db.json"))
            .build()
            .unwrap();
        let db = Database::open(config).unwrap();
        let mut state = db.state.lock();
        let default = IndexSpec::default_partition();
        create_many(
            &db,
            &mut state,
            "people",
            &default,
            vec![json!({"name": "A"}), json!({"name": "B"}), json!({"name": "C"})],
        )
        .unwrap();
        crate::ops::destroy::destroy(&db, &mut state, "people", 2).unwrap();

        let assignments = rewrite_collection(&db, &mut state, "people", &default, None).unwrap();
        assert_eq!(assignments.len(), 2);
        let coll = state.collections.get("people").unwrap();
        assert_eq!(coll.stats.inserted, 2);
        assert_eq!(coll.stats.total, 2);
        assert!(coll.get_document(1).is_some());
        assert!(coll.get_document(2).is_some());
    }

    #[test]
    fn rewrite_preserves_secondary_indexes() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfigBuilder::new()
            .file(dir.path().join("db.json"))
            .build()
            .unwrap();
        let db = Database::open(config).unwrap();
        let mut state = db.state.lock();
        let default = IndexSpec::default_partition();
        create_many(
            &db,
            &mut state,
            "people",
            &default,
            vec![json!({"email": "a@b.com"}), json!({"email": "c@d.com"})],
        )
        .unwrap();
        crate::ops::ensure_index::ensure_index(&db, &mut state, "people", "email").unwrap();

        rewrite_collection(&db, &mut state, "people", &default, None).unwrap();

        let coll = state.collections.get("people").unwrap();
        let idx = coll.secondary_indexes.get("email").unwrap();
        assert!(idx.lookup(&json!("a@b.com")).unwrap().contains(&1));
        assert!(idx.lookup(&json!("c@d.com")).unwrap().contains(&2));
    }
}

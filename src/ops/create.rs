//! `create` (§4.6): assign a fresh `_id`, append to the resolved
//! partition, update stats/id-map/secondary indexes.

use serde_json::Value;

use crate::database::{self, Database, State};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::ops::{insert_materialized, mark_unit_dirty, IndexSpec};

pub fn create(
    db: &Database,
    state: &mut State,
    collection: &str,
    index: &IndexSpec,
    data: Value,
) -> Result<(Document, String)> {
    if !data.is_object() {
        return Err(Error::validation("create requires an object as data"));
    }

    database::ensure_collection_resident(db, state, collection)?;
    let partition = index.resolve(&data);
    database::ensure_partition_resident(db, state, collection, &partition)?;

    let coll = state.collections.entry(collection.to_string()).or_default();
    let id = coll.stats.inserted + 1;
    let doc = Document::from_value(id, data)?;
    insert_materialized(coll, &partition, doc.clone());
    mark_unit_dirty(state, &db.config.mode, collection, &partition);

    Ok((doc, partition))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfigBuilder;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn create_assigns_monotone_ids() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfigBuilder::new()
            .file(dir.path().join("db.json"))
            .build()
            .unwrap();
        let db = Database::open(config).unwrap();
        let mut state = db.state.lock();
        let default = IndexSpec::default_partition();
        let (d1, p1) = create(&db, &mut state, "people", &default, json!({"name": "A"})).unwrap();
        let (d2, p2) = create(&db, &mut state, "people", &default, json!({"name": "B"})).unwrap();
        assert_eq!(d1.id, 1);
        assert_eq!(d2.id, 2);
        assert_eq!(p1, "default");
        assert_eq!(p2, "default");
        let coll = state.collections.get("people").unwrap();
        assert_eq!(coll.stats, crate::model::Stats { inserted: 2, total: 2 });
    }

    #[test]
    fn create_rejects_non_object_data() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfigBuilder::new()
            .file(dir.path().join("db.json"))
            .build()
            .unwrap();
        let db = Database::open(config).unwrap();
        let mut state = db.state.lock();
        let default = IndexSpec::default_partition();
        let err = create(&db, &mut state, "people", &default, json!("nope")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}

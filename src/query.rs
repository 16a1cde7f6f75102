//! `find`/`findMany` (§4.9): secondary-index point lookup fast path, plain
//! partition/collection scan fallback, sort, and populate (join).
//!
//! Grounded on `ironbase-core/src/query.rs` (JSON-filter matching) and
//! `ironbase-core/src/find_options.rs` (sort/options shape), scaled down to
//! this spec's default `_id`-ascending sort and single user comparator
//! instead of the teacher's multi-field MongoDB-style sort spec.

use std::cmp::Ordering;

use serde_json::Value;

use crate::config::PersistenceMode;
use crate::database::{self, Database, State};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::matcher::Matcher;

/// Options accepted by `findMany`.
pub struct FindOptions<'a> {
    pub sort: Option<&'a dyn Fn(&Value, &Value) -> Ordering>,
}

impl<'a> Default for FindOptions<'a> {
    fn default() -> Self {
        FindOptions { sort: None }
    }
}

/// A join rule: replace `field`'s value in the source document with the
/// full document it names in `collection` (matched against `_id` by
/// default, or another field via `on`).
pub struct PopulateRule {
    pub field: String,
    pub collection: String,
    pub on: Option<String>,
}

pub fn find(
    db: &Database,
    state: &mut State,
    collection: &str,
    partition: Option<&str>,
    filter: &Value,
    predicate: Option<&dyn Fn(&Document) -> bool>,
) -> Result<Option<Value>> {
    let matcher = Matcher::new(filter, predicate);
    let candidates = candidate_ids(db, state, collection, &matcher)?;

    if let Some(ids) = candidates {
        for id in ids {
            database::ensure_collection_resident(db, state, collection)?;
            if let Some(doc) = lookup_and_match(db, state, collection, id, &matcher)? {
                return Ok(Some(doc.to_value()));
            }
        }
        return Ok(None);
    }

    let names = partition_names_to_scan(db, state, collection, partition)?;
    for name in names {
        database::ensure_partition_resident(db, state, collection, &name)?;
        let coll = state
            .collections
            .get(collection)
            .ok_or_else(|| Error::collection_not_found(collection))?;
        if let Some(part) = coll.partitions.get(&name) {
            for doc in &part.docs {
                if matcher.matches(doc) {
                    return Ok(Some(doc.to_value()));
                }
            }
        }
    }
    Ok(None)
}

pub fn find_many(
    db: &Database,
    state: &mut State,
    collection: &str,
    partition: Option<&str>,
    filter: &Value,
    predicate: Option<&dyn Fn(&Document) -> bool>,
    options: &FindOptions,
    populate: &[PopulateRule],
) -> Result<Vec<Value>> {
    let matcher = Matcher::new(filter, predicate);
    let mut results = Vec::new();

    if let Some(ids) = candidate_ids(db, state, collection, &matcher)? {
        for id in ids {
            if let Some(doc) = lookup_and_match(db, state, collection, id, &matcher)? {
                results.push(doc);
            }
        }
    } else {
        let names = partition_names_to_scan(db, state, collection, partition)?;
        for name in names {
            database::ensure_partition_resident(db, state, collection, &name)?;
            let coll = state
                .collections
                .get(collection)
                .ok_or_else(|| Error::collection_not_found(collection))?;
            if let Some(part) = coll.partitions.get(&name) {
                for doc in &part.docs {
                    if matcher.matches(doc) {
                        results.push(doc.clone());
                    }
                }
            }
        }
    }

    let mut values: Vec<Value> = results.iter().map(Document::to_value).collect();
    match options.sort {
        Some(cmp) => values.sort_by(|a, b| cmp(a, b)),
        None => values.sort_by_key(|v| v.get("_id").and_then(|x| x.as_u64()).unwrap_or(0)),
    }

    for rule in populate {
        for value in values.iter_mut() {
            apply_populate(db, state, value, rule)?;
        }
    }

    Ok(values)
}

/// If `matcher`'s filter is a single indexed-field equality, return the
/// candidate `_id`s from the secondary index instead of scanning.
fn candidate_ids(
    db: &Database,
    state: &mut State,
    collection: &str,
    matcher: &Matcher,
) -> Result<Option<Vec<u64>>> {
    let (field, target) = match matcher.single_field_eq() {
        Some(pair) => pair,
        None => return Ok(None),
    };
    database::ensure_collection_resident(db, state, collection)?;
    let coll = match state.collections.get(collection) {
        Some(c) => c,
        None => return Ok(Some(Vec::new())),
    };
    let index = match coll.secondary_indexes.get(field) {
        Some(idx) => idx,
        None => return Ok(None),
    };
    let mut ids: Vec<u64> = index.lookup(target).map(|s| s.iter().copied().collect()).unwrap_or_default();
    ids.sort_unstable();
    Ok(Some(ids))
}

fn lookup_and_match(
    db: &Database,
    state: &mut State,
    collection: &str,
    id: u64,
    matcher: &Matcher,
) -> Result<Option<Document>> {
    let partition = {
        let coll = state
            .collections
            .get(collection)
            .ok_or_else(|| Error::collection_not_found(collection))?;
        coll.id_map.get(&id).cloned()
    };
    let partition = match partition {
        Some(p) => p,
        None => return Ok(None),
    };
    database::ensure_partition_resident(db, state, collection, &partition)?;
    let coll = state
        .collections
        .get(collection)
        .ok_or_else(|| Error::collection_not_found(collection))?;
    let doc = coll.get_document(id).cloned();
    Ok(doc.filter(|d| matcher.matches(d)))
}

fn partition_names_to_scan(
    db: &Database,
    state: &mut State,
    collection: &str,
    partition: Option<&str>,
) -> Result<Vec<String>> {
    if let Some(p) = partition {
        return Ok(vec![p.to_string()]);
    }
    database::ensure_collection_resident(db, state, collection)?;
    match &db.config.mode {
        PersistenceMode::Sharded { root } => database::discover_shard_partitions(root, collection),
        _ => Ok(state
            .collections
            .get(collection)
            .map(|c| c.partitions.keys().cloned().collect())
            .unwrap_or_default()),
    }
}

fn apply_populate(db: &Database, state: &mut State, value: &mut Value, rule: &PopulateRule) -> Result<()> {
    let obj = match value.as_object_mut() {
        Some(o) => o,
        None => return Ok(()),
    };
    let reference = match obj.get(&rule.field) {
        Some(v) => v.clone(),
        None => return Ok(()),
    };

    let joined = if rule.on.as_deref().unwrap_or("_id") == "_id" {
        match reference.as_u64() {
            Some(id) => lookup_by_id(db, state, &rule.collection, id)?,
            None => None,
        }
    } else {
        let on_field = rule.on.as_deref().unwrap_or("_id");
        let filter = serde_json::json!({ on_field: reference });
        find(db, state, &rule.collection, None, &filter, None)?
    };

    if let Some(joined) = joined {
        obj.insert(rule.field.clone(), joined);
    }
    Ok(())
}

fn lookup_by_id(db: &Database, state: &mut State, collection: &str, id: u64) -> Result<Option<Value>> {
    database::ensure_collection_resident(db, state, collection)?;
    let partition = match state.collections.get(collection).and_then(|c| c.id_map.get(&id)) {
        Some(p) => p.clone(),
        None => return Ok(None),
    };
    database::ensure_partition_resident(db, state, collection, &partition)?;
    Ok(state
        .collections
        .get(collection)
        .and_then(|c| c.get_document(id))
        .map(Document::to_value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfigBuilder;
    use crate::ops::create_many::create_many;
    use crate::ops::ensure_index::ensure_index;
    use crate::ops::IndexSpec;
    use serde_json::json;
    use tempfile::TempDir;

    fn open_db(dir: &TempDir) -> Database {
        let config = StoreConfigBuilder::new()
            .file(dir.path().join("db.json"))
            .build()
            .unwrap();
        Database::open(config).unwrap()
    }

    #[test]
    fn query_operators_gt_in_regex() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let mut state = db.state.lock();
        let default = IndexSpec::default_partition();
        create_many(
            &db,
            &mut state,
            "products",
            &default,
            vec![
                json!({"name": "Apple", "price": 10, "category": "fruit"}),
                json!({"name": "Bread", "price": 5, "category": "bakery"}),
                json!({"name": "Carrot", "price": 3, "category": "veg"}),
                json!({"name": "Wine", "price": 20, "category": "drink"}),
            ],
        )
        .unwrap();

        let gt = find_many(
            &db,
            &mut state,
            "products",
            None,
            &json!({"price": {"$gt": 8}}),
            None,
            &FindOptions::default(),
            &[],
        )
        .unwrap();
        assert_eq!(gt.len(), 2);

        let regex = find_many(
            &db,
            &mut state,
            "products",
            None,
            &json!({"name": {"$regex": "^C"}}),
            None,
            &FindOptions::default(),
            &[],
        )
        .unwrap();
        assert_eq!(regex.len(), 1);
        assert_eq!(regex[0]["name"], "Carrot");
    }

    #[test]
    fn secondary_index_point_lookup_tracks_updates() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let mut state = db.state.lock();
        let default = IndexSpec::default_partition();
        create_many(
            &db,
            &mut state,
            "users",
            &default,
            vec![json!({"email": "alice@example.com"}), json!({"email": "bob@example.com"})],
        )
        .unwrap();
        ensure_index(&db, &mut state, "users", "email").unwrap();

        let found = find(
            &db,
            &mut state,
            "users",
            None,
            &json!({"email": "alice@example.com"}),
            None,
        )
        .unwrap();
        assert!(found.is_some());

        crate::ops::update::update(
            &db,
            &mut state,
            "users",
            1,
            json!({"email": "alice2@example.com"}),
            None,
        )
        .unwrap();

        let stale = find(
            &db,
            &mut state,
            "users",
            None,
            &json!({"email": "alice@example.com"}),
            None,
        )
        .unwrap();
        assert!(stale.is_none());

        let fresh = find(
            &db,
            &mut state,
            "users",
            None,
            &json!({"email": "alice2@example.com"}),
            None,
        )
        .unwrap();
        assert!(fresh.is_some());
    }
}

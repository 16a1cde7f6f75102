//! Operation implementations: create, update, destroy, find/findMany (see
//! `query.rs`), createMany, dropCollection, dropIndex, rewriteCollection,
//! ensureIndex.
//!
//! Each mutating operation mutates `State` directly and is mirrored by a
//! `replay` arm that re-applies the *effect* recorded in an AOF line
//! (materialized document + resolved partition) rather than re-running the
//! caller's index-selector function, which cannot be serialized.

pub mod create;
pub mod create_many;
pub mod destroy;
pub mod drop_collection;
pub mod drop_index;
pub mod ensure_index;
pub mod rewrite;
pub mod update;

use serde_json::Value;

use crate::aof::AofRecord;
use crate::database::{mark_dirty, State};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::model::Collection;

/// How a document's partition is chosen on create/createMany, or
/// recomputed on update.
pub enum IndexSpec<'a> {
    Literal(String),
    Fn(&'a dyn Fn(&Value) -> String),
}

impl<'a> IndexSpec<'a> {
    pub fn default_partition() -> Self {
        IndexSpec::Literal("default".to_string())
    }

    pub fn resolve(&self, data: &Value) -> String {
        match self {
            IndexSpec::Literal(s) => s.clone(),
            IndexSpec::Fn(f) => f(data),
        }
    }
}

/// `update`'s `index` argument: a bare spec resets the partition outright;
/// the object form only carries `new` since the old partition is always
/// found through the id map regardless of what the caller claims `current`
/// is.
pub struct IndexUpdateSpec<'a> {
    pub new: IndexSpec<'a>,
}

/// Resident-unit key used by the LRU/dirty tracking.
pub(crate) fn unit_key(mode: &crate::config::PersistenceMode, collection: &str, partition: &str) -> String {
    match mode {
        crate::config::PersistenceMode::Sharded { .. } => format!("{collection}::{partition}"),
        _ => collection.to_string(),
    }
}

pub(crate) fn mark_unit_dirty(
    state: &mut State,
    mode: &crate::config::PersistenceMode,
    collection: &str,
    partition: &str,
) {
    mark_dirty(state, &unit_key(mode, collection, partition));
}

/// Insert an already-materialized document (id + partition already
/// decided) into the resident store, updating stats/id-map/secondary
/// indexes. Shared by live `create`/`createMany` and AOF replay.
pub(crate) fn insert_materialized(coll: &mut Collection, partition: &str, doc: Document) {
    let id = doc.id;
    for (field, idx) in coll.secondary_indexes.iter_mut() {
        if let Some(v) = doc.get(field) {
            idx.add(v, id);
        }
    }
    coll.stats.inserted = coll.stats.inserted.max(id);
    coll.stats.total += 1;
    coll.id_map.insert(id, partition.to_string());
    coll.partitions.entry(partition.to_string()).or_default().push(doc);
}

/// Remove a document by id from wherever it currently resides, updating
/// stats/id-map/secondary indexes. Returns the removed document and the
/// partition it was removed from.
pub(crate) fn remove_materialized(coll: &mut Collection, id: u64) -> Option<(Document, String)> {
    let partition = coll.locate(id)?;
    let doc = coll.partitions.get_mut(&partition)?.remove_by_id(id)?;
    coll.id_map.remove(&id);
    for (field, idx) in coll.secondary_indexes.iter_mut() {
        if let Some(v) = doc.get(field) {
            idx.remove(v, id);
        }
    }
    coll.stats.total = coll.stats.total.saturating_sub(1);
    Some((doc, partition))
}

/// Re-apply a recorded mutating operation during AOF replay.
pub fn replay(state: &mut State, record: &AofRecord) -> Result<()> {
    let instr = &record.instructions;
    match record.op.as_str() {
        "create" => replay_create(state, instr),
        "createMany" => replay_create_many(state, instr),
        "update" => replay_update(state, instr),
        "destroy" => replay_destroy(state, instr),
        "dropCollection" => replay_drop_collection(state, instr),
        "dropIndex" => replay_drop_index(state, instr),
        "rewriteCollection" => replay_rewrite(state, instr),
        "ensureIndex" => replay_ensure_index(state, instr),
        other => Err(Error::validation(format!("unknown AOF op: {other}"))),
    }
}

fn field_str<'a>(v: &'a Value, field: &str) -> Result<&'a str> {
    v.get(field)
        .and_then(|x| x.as_str())
        .ok_or_else(|| Error::validation(format!("AOF record missing field {field}")))
}

fn replay_create(state: &mut State, instr: &Value) -> Result<()> {
    let collection = field_str(instr, "collection")?;
    let partition = field_str(instr, "partition")?;
    let doc_value = instr
        .get("doc")
        .cloned()
        .ok_or_else(|| Error::validation("AOF create missing doc"))?;
    let id = doc_value
        .get("_id")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| Error::validation("AOF create doc missing _id"))?;
    let doc = Document::from_value(id, doc_value)?;
    let coll = state.collections.entry(collection.to_string()).or_default();
    insert_materialized(coll, partition, doc);
    Ok(())
}

fn replay_create_many(state: &mut State, instr: &Value) -> Result<()> {
    let collection = field_str(instr, "collection")?.to_string();
    let assignments = instr
        .get("assignments")
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::validation("AOF createMany missing assignments"))?;
    let coll = state.collections.entry(collection).or_default();
    for a in assignments {
        let partition = a
            .get("partition")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::validation("AOF createMany assignment missing partition"))?;
        let doc_value = a
            .get("doc")
            .cloned()
            .ok_or_else(|| Error::validation("AOF createMany assignment missing doc"))?;
        let id = doc_value
            .get("_id")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| Error::validation("AOF createMany doc missing _id"))?;
        insert_materialized(coll, partition, Document::from_value(id, doc_value)?);
    }
    Ok(())
}

fn replay_update(state: &mut State, instr: &Value) -> Result<()> {
    let collection = field_str(instr, "collection")?.to_string();
    let id = instr
        .get("_id")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| Error::validation("AOF update missing _id"))?;
    let partition = field_str(instr, "partition")?.to_string();
    let doc_value = instr
        .get("doc")
        .cloned()
        .ok_or_else(|| Error::validation("AOF update missing doc"))?;
    let coll = state
        .collections
        .get_mut(&collection)
        .ok_or_else(|| Error::collection_not_found(collection.clone()))?;
    remove_materialized(coll, id);
    insert_materialized(coll, &partition, Document::from_value(id, doc_value)?);
    Ok(())
}

fn replay_destroy(state: &mut State, instr: &Value) -> Result<()> {
    let collection = field_str(instr, "collection")?.to_string();
    let id = instr
        .get("_id")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| Error::validation("AOF destroy missing _id"))?;
    if let Some(coll) = state.collections.get_mut(&collection) {
        remove_materialized(coll, id);
    }
    Ok(())
}

fn replay_drop_collection(state: &mut State, instr: &Value) -> Result<()> {
    let collection = field_str(instr, "collection")?;
    state.collections.remove(collection);
    state.known_collections.remove(collection);
    Ok(())
}

fn replay_drop_index(state: &mut State, instr: &Value) -> Result<()> {
    let collection = field_str(instr, "collection")?;
    let index = field_str(instr, "index")?;
    if let Some(coll) = state.collections.get_mut(collection) {
        if let Some(removed) = coll.partitions.remove(index) {
            coll.stats.total = coll.stats.total.saturating_sub(removed.docs.len() as u64);
            for doc in &removed.docs {
                coll.id_map.remove(&doc.id);
                for (field, idx) in coll.secondary_indexes.iter_mut() {
                    if let Some(v) = doc.get(field) {
                        idx.remove(v, doc.id);
                    }
                }
            }
        }
    }
    Ok(())
}

fn replay_rewrite(state: &mut State, instr: &Value) -> Result<()> {
    let collection = field_str(instr, "collection")?.to_string();
    let assignments = instr
        .get("assignments")
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::validation("AOF rewriteCollection missing assignments"))?;
    let indexed_fields: Vec<String> = state
        .collections
        .get(&collection)
        .map(|c| c.secondary_indexes.keys().cloned().collect())
        .unwrap_or_default();
    let mut fresh = Collection::default();
    for field in indexed_fields {
        fresh.secondary_indexes.insert(field, Default::default());
    }
    for a in assignments {
        let partition = a
            .get("partition")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::validation("AOF rewrite assignment missing partition"))?;
        let doc_value = a
            .get("doc")
            .cloned()
            .ok_or_else(|| Error::validation("AOF rewrite assignment missing doc"))?;
        let id = doc_value
            .get("_id")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| Error::validation("AOF rewrite doc missing _id"))?;
        insert_materialized(&mut fresh, partition, Document::from_value(id, doc_value)?);
    }
    state.collections.insert(collection, fresh);
    Ok(())
}

fn replay_ensure_index(state: &mut State, instr: &Value) -> Result<()> {
    let collection = field_str(instr, "collection")?.to_string();
    let field = field_str(instr, "field")?.to_string();
    if let Some(coll) = state.collections.get_mut(&collection) {
        ensure_index::build_index(coll, &field);
    }
    Ok(())
}

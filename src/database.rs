//! Top-level `Database`: wires configuration, persistence mode, the
//! resident store, the LRU cache, and the transaction controller into the
//! public operation surface.
//!
//! Structurally grounded on `ironbase-core/src/database.rs`'s
//! `DatabaseCore<S>` (one struct owning storage + transaction state behind
//! a lock, exposing a flat method-per-operation API), generalized from the
//! teacher's storage-engine-generic design to this spec's three concrete
//! persistence modes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

use serde_json::Value;

use crate::aof::{self, AofRecord};
use crate::cache::{evict_with_persist, ResidentTracker};
use crate::codec;
use crate::config::{PersistenceMode, StoreConfig};
use crate::error::{Error, Result};
use crate::model::Collection;
use crate::paths;
use crate::{log_debug, log_info, log_warn};

/// Resident database state, guarded by the transaction controller's
/// serializing lock (see `transaction.rs`).
pub struct State {
    pub collections: HashMap<String, Collection>,
    /// Names of collections known to exist on disk even when not currently
    /// resident (folder/sharded modes only).
    pub known_collections: HashSet<String>,
    /// Dirty resident units: collection names (folder mode) or
    /// `"collection::partition"` keys (sharded mode).
    pub dirty: HashSet<String>,
    pub cache: ResidentTracker,
    pub pending: Vec<AofRecord>,
}

impl State {
    fn new(max_cache_size: usize) -> Self {
        State {
            collections: HashMap::new(),
            known_collections: HashSet::new(),
            dirty: HashSet::new(),
            cache: ResidentTracker::new(max_cache_size),
            pending: Vec::new(),
        }
    }
}

pub struct Database {
    pub(crate) config: StoreConfig,
    pub(crate) state: parking_lot::Mutex<State>,
}

impl Database {
    /// Open (or create) a database at the configured location, replaying
    /// the AOF in single-file mode as described in `SPEC_FULL.md` §4.4.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let mut state = State::new(config.max_cache_size);

        match &config.mode {
            PersistenceMode::SingleFile { .. } | PersistenceMode::Hooked { .. } => {
                load_single_file(&config, &mut state)?;
                if config.aof {
                    replay_aof(&config, &mut state)?;
                }
            }
            PersistenceMode::Folder { root } => {
                discover_folder_collections(root, &mut state)?;
            }
            PersistenceMode::Sharded { root } => {
                discover_folder_collections(root, &mut state)?;
            }
        }

        log_info!("database opened");
        Ok(Database {
            config,
            state: parking_lot::Mutex::new(state),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

fn load_single_file(config: &StoreConfig, state: &mut State) -> Result<()> {
    let text_value = match &config.mode {
        PersistenceMode::SingleFile { .. } => {
            let path = paths::single_file_path(&config.mode, config.compression).unwrap();
            if codec::exists(&path) {
                Some(codec::read_value(&path)?)
            } else {
                None
            }
        }
        PersistenceMode::Hooked { load, .. } => {
            let text = load()?;
            if text.trim().is_empty() {
                None
            } else {
                Some(serde_json::from_str(&text)?)
            }
        }
        _ => unreachable!(),
    };

    if let Some(Value::Object(map)) = text_value {
        for (name, doc) in map {
            let coll = deserialize_collection(&doc)?;
            state.collections.insert(name, coll);
        }
    }
    Ok(())
}

fn replay_aof(config: &StoreConfig, state: &mut State) -> Result<()> {
    let path = match paths::aof_path(&config.mode) {
        Some(p) => p,
        None => return Ok(()),
    };
    let records = aof::read_all(&path)?;
    for record in records {
        if let Err(e) = crate::ops::replay(state, &record) {
            log_warn!("skipping AOF record {}: {}", record.op, e);
        }
    }
    Ok(())
}

fn discover_folder_collections(root: &std::path::Path, state: &mut State) -> Result<()> {
    if !root.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                state.known_collections.insert(name.to_string());
            }
        } else if let Some(stem) = file_stem_without_gz(&path) {
            state.known_collections.insert(stem);
        }
    }
    Ok(())
}

fn file_stem_without_gz(path: &std::path::Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let name = name.strip_suffix(".gz").unwrap_or(name);
    name.strip_suffix(".json").map(|s| s.to_string())
}

/// Ensure `collection` is resident (loading it from disk if this is
/// folder/sharded mode and it is currently evicted), touching the LRU and
/// persisting+evicting a colder unit if this touch pushed residency over
/// budget.
pub fn ensure_collection_resident(db: &Database, state: &mut State, collection: &str) -> Result<()> {
    match &db.config.mode {
        PersistenceMode::SingleFile { .. } | PersistenceMode::Hooked { .. } => Ok(()),
        PersistenceMode::Folder { root } => {
            if !state.collections.contains_key(collection) {
                if state.known_collections.contains(collection) {
                    let path = paths::collection_path(root, collection, db.config.compression);
                    let value = codec::read_value(&path)?;
                    let coll = deserialize_collection(&value)?;
                    state.collections.insert(collection.to_string(), coll);
                } else {
                    state.collections.insert(collection.to_string(), Collection::default());
                    state.known_collections.insert(collection.to_string());
                }
            }
            touch_and_maybe_evict(db, state, collection)
        }
        PersistenceMode::Sharded { .. } => {
            if !state.collections.contains_key(collection) {
                state.collections.insert(collection.to_string(), Collection::default());
                state.known_collections.insert(collection.to_string());
                load_sharded_meta(db, state, collection)?;
            }
            Ok(())
        }
    }
}

fn load_sharded_meta(db: &Database, state: &mut State, collection: &str) -> Result<()> {
    let root = match &db.config.mode {
        PersistenceMode::Sharded { root } => root,
        _ => return Ok(()),
    };
    let meta_path = paths::meta_path(root, collection, db.config.compression);
    if codec::exists(&meta_path) {
        let value = codec::read_value(&meta_path)?;
        if let Some(coll) = state.collections.get_mut(collection) {
            apply_meta(coll, &value)?;
        }
    }
    Ok(())
}

/// Ensure a specific partition is resident in sharded mode; no-op for
/// other modes where the collection-level load already brought it in.
pub fn ensure_partition_resident(
    db: &Database,
    state: &mut State,
    collection: &str,
    partition: &str,
) -> Result<()> {
    ensure_collection_resident(db, state, collection)?;
    if let PersistenceMode::Sharded { root } = &db.config.mode {
        let has_partition = state
            .collections
            .get(collection)
            .map(|c| c.partitions.contains_key(partition))
            .unwrap_or(false);
        if !has_partition {
            let shard_path = paths::shard_path(root, collection, partition, db.config.compression);
            let part = if codec::exists(&shard_path) {
                let value = codec::read_value(&shard_path)?;
                deserialize_partition(&value)?
            } else {
                Default::default()
            };
            state
                .collections
                .get_mut(collection)
                .unwrap()
                .partitions
                .insert(partition.to_string(), part);
        }
        let key = format!("{collection}::{partition}");
        let evicted = touch_and_maybe_evict_key(db, state, &key)?;
        let _ = evicted;
    }
    Ok(())
}

fn touch_and_maybe_evict(db: &Database, state: &mut State, collection: &str) -> Result<()> {
    touch_and_maybe_evict_key(db, state, collection)
}

fn touch_and_maybe_evict_key(db: &Database, state: &mut State, key: &str) -> Result<()> {
    let evicted = state.cache.touch(key);
    if let Some(evicted_key) = evicted {
        if evicted_key != key {
            evict_unit(db, state, &evicted_key)?;
        }
    }
    Ok(())
}

/// Reload the whole database from its single-file backing store, used by
/// the transaction controller on rollback to discard in-memory mutations.
pub fn reload_single_file(db: &Database, state: &mut State) -> Result<()> {
    load_single_file(&db.config, state)
}

/// Public wrapper so the transaction controller can evict a specific
/// resident unit on rollback (folder/sharded modes).
pub fn evict_unit_public(db: &Database, state: &mut State, key: &str) -> Result<()> {
    evict_unit(db, state, key)
}

fn evict_unit(db: &Database, state: &mut State, key: &str) -> Result<()> {
    let dirty = state.dirty.contains(key);
    match &db.config.mode {
        PersistenceMode::Folder { root } => {
            if let Some(coll) = state.collections.get(key) {
                let value = serialize_collection(coll);
                let path = paths::collection_path(root, key, db.config.compression);
                evict_with_persist(key, dirty, || codec::write_value(&path, &value));
            }
            state.collections.remove(key);
            state.dirty.remove(key);
        }
        PersistenceMode::Sharded { root } => {
            if let Some((collection, partition)) = key.split_once("::") {
                if let Some(coll) = state.collections.get(collection) {
                    if let Some(part) = coll.partitions.get(partition) {
                        let value = crate::document::document_vec_to_value(&part.docs);
                        let path = paths::shard_path(root, collection, partition, db.config.compression);
                        evict_with_persist(key, dirty, || codec::write_value(&path, &value));
                    }
                }
                if let Some(coll) = state.collections.get_mut(collection) {
                    coll.partitions.remove(partition);
                }
            }
            state.dirty.remove(key);
        }
        _ => {}
    }
    log_debug!("evicted resident unit {key}");
    Ok(())
}

/// Mark a resident unit dirty so it gets saved on commit or before eviction.
pub fn mark_dirty(state: &mut State, key: &str) {
    state.dirty.insert(key.to_string());
}

/// Persist every dirty unit according to the configured mode, then clear
/// the dirty set. Used by the transaction controller on commit when AOF is
/// disabled.
pub fn save_all_dirty(db: &Database, state: &mut State) -> Result<()> {
    match &db.config.mode {
        PersistenceMode::SingleFile { .. } | PersistenceMode::Hooked { .. } => {
            save_whole_database(db, state)?;
        }
        PersistenceMode::Folder { root } => {
            let dirty: Vec<String> = state.dirty.iter().cloned().collect();
            for name in dirty {
                if let Some(coll) = state.collections.get(&name) {
                    let value = serialize_collection(coll);
                    let path = paths::collection_path(root, &name, db.config.compression);
                    codec::write_value(&path, &value)?;
                }
            }
        }
        PersistenceMode::Sharded { root } => {
            let dirty: Vec<String> = state.dirty.iter().cloned().collect();
            for key in dirty {
                if let Some((collection, partition)) = key.split_once("::") {
                    if let Some(coll) = state.collections.get(collection) {
                        if let Some(part) = coll.partitions.get(partition) {
                            let value = crate::document::document_vec_to_value(&part.docs);
                            let path =
                                paths::shard_path(root, collection, partition, db.config.compression);
                            codec::write_value(&path, &value)?;
                        }
                        let meta_value = serialize_meta(coll);
                        let meta_path = paths::meta_path(root, collection, db.config.compression);
                        codec::write_value(&meta_path, &meta_value)?;
                    }
                } else if let Some(coll) = state.collections.get(&key) {
                    let meta_value = serialize_meta(coll);
                    let meta_path = paths::meta_path(root, &key, db.config.compression);
                    codec::write_value(&meta_path, &meta_value)?;
                }
            }
        }
    }
    state.dirty.clear();
    Ok(())
}

pub fn save_whole_database(db: &Database, state: &mut State) -> Result<()> {
    let mut map = serde_json::Map::new();
    for (name, coll) in &state.collections {
        map.insert(name.clone(), serialize_collection(coll));
    }
    let value = Value::Object(map);
    match &db.config.mode {
        PersistenceMode::SingleFile { .. } => {
            let path = paths::single_file_path(&db.config.mode, db.config.compression).unwrap();
            codec::write_value(&path, &value)?;
        }
        PersistenceMode::Hooked { save, .. } => {
            save(&value.to_string())?;
        }
        _ => {}
    }
    Ok(())
}

/// Best-effort delete used where a missing or unremovable file should not
/// fail the calling operation (e.g. clearing stale shards during a rewrite).
pub fn delete_file_best_effort(path: &std::path::Path) {
    if let Err(e) = codec::remove_file(path) {
        log_warn!("could not remove {}: {}", path.display(), e);
    }
}

/// Delete a collection's on-disk presence entirely (dropCollection, §4.11).
pub fn delete_collection_from_disk(db: &Database, collection: &str) -> Result<()> {
    match &db.config.mode {
        PersistenceMode::Folder { root } => {
            let path = paths::collection_path(root, collection, db.config.compression);
            codec::remove_file(&path)?;
        }
        PersistenceMode::Sharded { root } => {
            let dir = paths::collection_dir(root, collection);
            codec::remove_dir_all(&dir)?;
        }
        _ => {}
    }
    Ok(())
}

// -- Serialization of the resident model to/from the on-disk document shape --

pub fn serialize_collection(coll: &Collection) -> Value {
    let mut map = serde_json::Map::new();
    map.insert("__stats".into(), serde_json::to_value(&coll.stats).unwrap());
    map.insert(
        "__id_map".into(),
        Value::Object(
            coll.id_map
                .iter()
                .map(|(id, part)| (id.to_string(), Value::String(part.clone())))
                .collect(),
        ),
    );
    map.insert(
        "__secondary_indexes".into(),
        serialize_secondary_indexes(coll),
    );
    for (name, part) in &coll.partitions {
        map.insert(name.clone(), crate::document::document_vec_to_value(&part.docs));
    }
    Value::Object(map)
}

fn serialize_meta(coll: &Collection) -> Value {
    let mut map = serde_json::Map::new();
    map.insert("__stats".into(), serde_json::to_value(&coll.stats).unwrap());
    map.insert(
        "__id_map".into(),
        Value::Object(
            coll.id_map
                .iter()
                .map(|(id, part)| (id.to_string(), Value::String(part.clone())))
                .collect(),
        ),
    );
    map.insert(
        "__secondary_indexes".into(),
        serialize_secondary_indexes(coll),
    );
    Value::Object(map)
}

fn serialize_secondary_indexes(coll: &Collection) -> Value {
    let mut out = serde_json::Map::new();
    for (field, idx) in &coll.secondary_indexes {
        let mut entries = serde_json::Map::new();
        for (val, ids) in &idx.entries {
            let mut ids: Vec<u64> = ids.iter().copied().collect();
            ids.sort_unstable();
            entries.insert(val.clone(), Value::Array(ids.into_iter().map(Value::from).collect()));
        }
        out.insert(field.clone(), Value::Object(entries));
    }
    Value::Object(out)
}

fn deserialize_collection(value: &Value) -> Result<Collection> {
    let obj = value
        .as_object()
        .ok_or_else(|| Error::validation("collection document must be an object"))?;
    let mut coll = Collection::default();
    apply_meta(&mut coll, value)?;
    for (key, val) in obj {
        if key.starts_with("__") {
            continue;
        }
        coll.partitions.insert(key.clone(), deserialize_partition(val)?);
    }
    Ok(coll)
}

fn apply_meta(coll: &mut Collection, value: &Value) -> Result<()> {
    let obj = match value.as_object() {
        Some(o) => o,
        None => return Ok(()),
    };
    if let Some(stats) = obj.get("__stats") {
        coll.stats = serde_json::from_value(stats.clone())?;
    }
    if let Some(Value::Object(map)) = obj.get("__id_map") {
        let mut id_map = HashMap::new();
        for (k, v) in map {
            if let (Ok(id), Some(part)) = (k.parse::<u64>(), v.as_str()) {
                id_map.insert(id, part.to_string());
            }
        }
        coll.id_map = id_map;
    }
    if let Some(Value::Object(indexes)) = obj.get("__secondary_indexes") {
        let mut out = HashMap::new();
        for (field, entries) in indexes {
            let mut idx = crate::model::SecondaryIndex::default();
            if let Value::Object(entries) = entries {
                for (val, ids) in entries {
                    let set: HashSet<u64> = ids
                        .as_array()
                        .map(|a| a.iter().filter_map(|v| v.as_u64()).collect())
                        .unwrap_or_default();
                    idx.entries.insert(val.clone(), set);
                }
            }
            out.insert(field.clone(), idx);
        }
        coll.secondary_indexes = out;
    }
    Ok(())
}

fn deserialize_partition(value: &Value) -> Result<crate::model::Partition> {
    let arr = value.as_array().cloned().unwrap_or_default();
    let mut part = crate::model::Partition::default();
    for doc_value in arr {
        let id = doc_value
            .get("_id")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| Error::validation("stored document missing _id"))?;
        let doc = crate::document::Document::from_value(id, doc_value)?;
        part.push(doc);
    }
    Ok(part)
}

/// Load every sharded partition file present on disk for `collection`
/// (used by a full scan that has no secondary-index narrowing available).
pub fn discover_shard_partitions(root: &std::path::Path, collection: &str) -> Result<Vec<String>> {
    let dir = paths::collection_dir(root, collection);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        let file_name = file_name.strip_suffix(".gz").unwrap_or(file_name);
        if let Some(stripped) = file_name
            .strip_prefix("shard_")
            .and_then(|s| s.strip_suffix(".json"))
        {
            names.push(stripped.to_string());
        }
    }
    Ok(names)
}

pub fn collections_snapshot(state: &State) -> BTreeMap<String, ()> {
    state.collections.keys().map(|k| (k.clone(), ())).collect()
}

pub fn root_path(mode: &PersistenceMode) -> Option<PathBuf> {
    match mode {
        PersistenceMode::Folder { root } | PersistenceMode::Sharded { root } => Some(root.clone()),
        _ => None,
    }
}

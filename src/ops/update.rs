//! `update` (§4.7): replace a document's body in place, optionally moving
//! it to a different partition, keeping secondary indexes consistent.

use serde_json::Value;

use crate::database::{self, Database, State};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::ops::{insert_materialized, mark_unit_dirty, remove_materialized, IndexUpdateSpec};

pub fn update(
    db: &Database,
    state: &mut State,
    collection: &str,
    id: u64,
    data: Value,
    index: Option<&IndexUpdateSpec>,
) -> Result<(Document, String)> {
    if !data.is_object() {
        return Err(Error::validation("update requires an object as data"));
    }

    database::ensure_collection_resident(db, state, collection)?;
    let old_partition = {
        let coll = state
            .collections
            .get(collection)
            .ok_or_else(|| Error::collection_not_found(collection))?;
        coll.locate(id)
            .ok_or_else(|| Error::document_not_found(collection, id))?
    };
    database::ensure_partition_resident(db, state, collection, &old_partition)?;

    let new_partition = match index {
        Some(spec) => spec.new.resolve(&data),
        None => old_partition.clone(),
    };
    if new_partition != old_partition {
        database::ensure_partition_resident(db, state, collection, &new_partition)?;
    }

    let new_doc = Document::from_value(id, data)?;

    let coll = state
        .collections
        .get_mut(collection)
        .ok_or_else(|| Error::collection_not_found(collection))?;
    remove_materialized(coll, id).ok_or_else(|| Error::document_not_found(collection, id))?;
    insert_materialized(coll, &new_partition, new_doc.clone());

    mark_unit_dirty(state, &db.config.mode, collection, &old_partition);
    if new_partition != old_partition {
        mark_unit_dirty(state, &db.config.mode, collection, &new_partition);
    }

    Ok((new_doc, new_partition))
}

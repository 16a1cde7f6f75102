//! `destroy` (§4.8): remove a document by id, decrementing `total` only —
//! `inserted` is never rewound.

use crate::database::{self, Database, State};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::ops::{mark_unit_dirty, remove_materialized};

pub fn destroy(db: &Database, state: &mut State, collection: &str, id: u64) -> Result<Document> {
    database::ensure_collection_resident(db, state, collection)?;
    let partition = {
        let coll = state
            .collections
            .get(collection)
            .ok_or_else(|| Error::collection_not_found(collection))?;
        coll.locate(id)
            .ok_or_else(|| Error::document_not_found(collection, id))?
    };
    database::ensure_partition_resident(db, state, collection, &partition)?;

    let coll = state
        .collections
        .get_mut(collection)
        .ok_or_else(|| Error::collection_not_found(collection))?;
    let (doc, partition) =
        remove_materialized(coll, id).ok_or_else(|| Error::document_not_found(collection, id))?;
    mark_unit_dirty(state, &db.config.mode, collection, &partition);
    Ok(doc)
}

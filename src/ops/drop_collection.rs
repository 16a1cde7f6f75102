//! `dropCollection` (§4.11): erase a collection from memory and disk.

use crate::database::{self, Database, State};
use crate::error::Result;

pub fn drop_collection(db: &Database, state: &mut State, collection: &str) -> Result<()> {
    state.collections.remove(collection);
    state.known_collections.remove(collection);
    state.dirty.retain(|k| k != collection && !k.starts_with(&format!("{collection}::")));
    state.cache.forget_collection(collection);
    database::delete_collection_from_disk(db, collection)?;
    Ok(())
}

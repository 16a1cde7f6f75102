//! `createMany` (§4.10): create every item with the same collection/index
//! rule, per-item partition when `index` is a function.

use serde_json::Value;

use crate::database::{Database, State};
use crate::document::Document;
use crate::error::Result;
use crate::ops::{create::create, IndexSpec};

pub fn create_many(
    db: &Database,
    state: &mut State,
    collection: &str,
    index: &IndexSpec,
    data: Vec<Value>,
) -> Result<Vec<(Document, String)>> {
    let mut out = Vec::with_capacity(data.len());
    for item in data {
        out.push(create(db, state, collection, index, item)?);
    }
    Ok(out)
}

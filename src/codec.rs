//! Streaming read/write through an optional gzip stage, with atomic
//! swap-on-write (`<path>.tmp` then rename).
//!
//! Grounded on the teacher's atomic-write discipline in
//! `ironbase-core/src/storage/file_storage.rs`; gzip streaming via `flate2`
//! is grounded cross-pack (`D2Lark-materialize`, `estuary-flow`).

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;

use crate::error::Result;

/// Read a JSON document from `path`, transparently gunzipping when the
/// filename ends in `.gz`.
pub fn read_value(path: &Path) -> Result<Value> {
    let raw = fs::read(path)?;
    let text = decompress_if_needed(path, raw)?;
    Ok(serde_json::from_slice(&text)?)
}

/// Write `value` to `path` atomically: serialize (optionally gzipped) to a
/// `.tmp` sibling, then rename over the target.
pub fn write_value(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec(value)?;
    let payload = compress_if_needed(path, bytes)?;

    let tmp_path = tmp_sibling(path);
    {
        let mut f = fs::File::create(&tmp_path)?;
        f.write_all(&payload)?;
        f.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn exists(path: &Path) -> bool {
    path.exists()
}

pub fn remove_file(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

pub fn remove_dir_all(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    Ok(())
}

fn tmp_sibling(path: &Path) -> std::path::PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".tmp");
    std::path::PathBuf::from(s)
}

fn is_gz(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

fn compress_if_needed(path: &Path, bytes: Vec<u8>) -> Result<Vec<u8>> {
    if is_gz(path) {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&bytes)?;
        Ok(encoder.finish()?)
    } else {
        Ok(bytes)
    }
}

fn decompress_if_needed(path: &Path, bytes: Vec<u8>) -> Result<Vec<u8>> {
    if is_gz(path) {
        let mut decoder = GzDecoder::new(&bytes[..]);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    } else {
        Ok(bytes)
    }
}

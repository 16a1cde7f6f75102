//! Append-only operation log.
//!
//! One JSON record per mutating operation, `{"op": "...", "instructions":
//! {...}}` per line. Replayed on load (single-file mode only, per
//! `SPEC_FULL.md` §4.4/§9). Individual line failures are logged and
//! skipped rather than aborting load, in the same "tolerate and continue"
//! spirit as the teacher's WAL/recovery replay.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::log_warn;

/// A single recorded mutating operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AofRecord {
    pub op: String,
    pub instructions: Value,
}

/// Append one record per line to the AOF file, creating it if absent.
pub fn append(path: &Path, records: &[AofRecord]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    for record in records {
        let line = serde_json::to_string(record)?;
        writeln!(f, "{line}")?;
    }
    f.sync_all()?;
    Ok(())
}

/// Read every record from the AOF file in order, logging and skipping any
/// line that fails to parse instead of failing the whole read.
pub fn read_all(path: &Path) -> Result<Vec<AofRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let f = fs::File::open(path)?;
    let reader = BufReader::new(f);
    let mut out = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AofRecord>(&line) {
            Ok(record) => out.push(record),
            Err(e) => log_warn!("skipping unreadable AOF line {lineno}: {e}"),
        }
    }
    Ok(out)
}

pub fn remove(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn append_and_read_all() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.aof");
        let records = vec![AofRecord {
            op: "create".into(),
            instructions: json!({"collection": "users", "data": {"name": "Bob"}}),
        }];
        append(&path, &records).unwrap();
        let read = read_all(&path).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].op, "create");
    }

    #[test]
    fn corrupt_line_is_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.aof");
        fs::write(&path, "{\"op\":\"create\",\"instructions\":{}}\nnot json\n").unwrap();
        let read = read_all(&path).unwrap();
        assert_eq!(read.len(), 1);
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.aof");
        assert!(read_all(&path).unwrap().is_empty());
    }
}

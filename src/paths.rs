//! Deterministic mapping from (mode, collection, partition) to a filesystem path.

use std::path::{Path, PathBuf};

use crate::config::PersistenceMode;

fn maybe_gz(path: PathBuf, compression: bool) -> PathBuf {
    if compression {
        let mut s = path.into_os_string();
        s.push(".gz");
        PathBuf::from(s)
    } else {
        path
    }
}

/// Path to the single-file database document.
pub fn single_file_path(mode: &PersistenceMode, compression: bool) -> Option<PathBuf> {
    match mode {
        PersistenceMode::SingleFile { path } => Some(maybe_gz(path.clone(), compression)),
        _ => None,
    }
}

/// Path to the AOF sibling file.
pub fn aof_path(mode: &PersistenceMode) -> Option<PathBuf> {
    match mode {
        PersistenceMode::SingleFile { path } => {
            let mut s = path.clone().into_os_string();
            s.push(".aof");
            Some(PathBuf::from(s))
        }
        PersistenceMode::Folder { root } => Some(root.join("log.aof")),
        PersistenceMode::Sharded { root } => Some(root.join("log.aof")),
        PersistenceMode::Hooked { .. } => None,
    }
}

/// Path to a whole collection file (folder mode only).
pub fn collection_path(root: &Path, collection: &str, compression: bool) -> PathBuf {
    maybe_gz(root.join(format!("{collection}.json")), compression)
}

/// Path to a collection's sharded directory.
pub fn collection_dir(root: &Path, collection: &str) -> PathBuf {
    root.join(collection)
}

/// Path to a collection's metadata file (sharded mode).
pub fn meta_path(root: &Path, collection: &str, compression: bool) -> PathBuf {
    maybe_gz(collection_dir(root, collection).join("meta.json"), compression)
}

/// Path to a single shard (partition file, sharded mode).
pub fn shard_path(root: &Path, collection: &str, partition: &str, compression: bool) -> PathBuf {
    maybe_gz(
        collection_dir(root, collection).join(format!("shard_{partition}.json")),
        compression,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_file_gz_suffix() {
        let mode = PersistenceMode::SingleFile { path: PathBuf::from("/tmp/db.json") };
        let p = single_file_path(&mode, true).unwrap();
        assert_eq!(p, PathBuf::from("/tmp/db.json.gz"));
    }

    #[test]
    fn shard_layout() {
        let root = PathBuf::from("/tmp/root");
        let p = shard_path(&root, "people", "default", false);
        assert_eq!(p, PathBuf::from("/tmp/root/people/shard_default.json"));
    }

    #[test]
    fn aof_sibling_for_single_file() {
        let mode = PersistenceMode::SingleFile { path: PathBuf::from("/tmp/db.json") };
        assert_eq!(aof_path(&mode).unwrap(), PathBuf::from("/tmp/db.json.aof"));
    }
}

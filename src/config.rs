//! Construction-time configuration.
//!
//! Mirrors the teacher's typed-options convention (`DurabilityMode`) rather
//! than a loose bag of positional arguments: every option from the external
//! interface table is validated once, at construction, instead of failing
//! lazily on first use.

use std::path::PathBuf;

use crate::error::{Error, Result};

pub type LoadHook = std::sync::Arc<dyn Fn() -> Result<String> + Send + Sync>;
pub type SaveHook = std::sync::Arc<dyn Fn(&str) -> Result<()> + Send + Sync>;

/// Where and how the database persists itself.
#[derive(Clone)]
pub enum PersistenceMode {
    /// Whole database as one document.
    SingleFile { path: PathBuf },
    /// One file per collection under a directory.
    Folder { root: PathBuf },
    /// One file per partition under a per-collection directory.
    Sharded { root: PathBuf },
    /// Single-file mode, but reads/writes go through user hooks instead of
    /// the filesystem.
    Hooked { load: LoadHook, save: SaveHook },
}

impl std::fmt::Debug for PersistenceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceMode::SingleFile { path } => {
                f.debug_struct("SingleFile").field("path", path).finish()
            }
            PersistenceMode::Folder { root } => f.debug_struct("Folder").field("root", root).finish(),
            PersistenceMode::Sharded { root } => {
                f.debug_struct("Sharded").field("root", root).finish()
            }
            PersistenceMode::Hooked { .. } => f.write_str("Hooked"),
        }
    }
}

/// Validated construction options for a [`crate::database::Database`].
#[derive(Clone)]
pub struct StoreConfig {
    pub mode: PersistenceMode,
    pub aof: bool,
    pub compression: bool,
    pub max_cache_size: usize,
}

/// Builder for [`StoreConfig`]; raises [`Error::Configuration`] at `build()`
/// time rather than deferring invalid combinations to first use.
#[derive(Default)]
pub struct StoreConfigBuilder {
    file: Option<PathBuf>,
    folder: Option<PathBuf>,
    hooks: Option<(LoadHook, SaveHook)>,
    aof: bool,
    compression: bool,
    sharding: bool,
    max_cache_size: usize,
}

impl StoreConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn folder(mut self, path: impl Into<PathBuf>) -> Self {
        self.folder = Some(path.into());
        self
    }

    pub fn hooks(mut self, load: LoadHook, save: SaveHook) -> Self {
        self.hooks = Some((load, save));
        self
    }

    pub fn aof(mut self, enabled: bool) -> Self {
        self.aof = enabled;
        self
    }

    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    pub fn sharding(mut self, enabled: bool) -> Self {
        self.sharding = enabled;
        self
    }

    pub fn max_cache_size(mut self, size: usize) -> Self {
        self.max_cache_size = size;
        self
    }

    pub fn build(self) -> Result<StoreConfig> {
        if self.sharding && self.folder.is_none() {
            return Err(Error::configuration("sharding requires folder mode"));
        }
        if self.hooks.is_some() && (self.folder.is_some() || self.sharding) {
            return Err(Error::configuration(
                "load/save hooks are only supported in single-file mode",
            ));
        }
        if self.hooks.is_some() && self.aof {
            return Err(Error::configuration(
                "the AOF log is file-path based and cannot be used with load/save hooks",
            ));
        }

        let mode = if let Some((load, save)) = self.hooks {
            PersistenceMode::Hooked { load, save }
        } else if let Some(root) = self.folder {
            if self.sharding {
                PersistenceMode::Sharded { root }
            } else {
                PersistenceMode::Folder { root }
            }
        } else {
            let path = self.file.unwrap_or_else(|| PathBuf::from("./sencillo.json"));
            PersistenceMode::SingleFile { path }
        };

        Ok(StoreConfig {
            mode,
            aof: self.aof,
            compression: self.compression,
            max_cache_size: self.max_cache_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sharding_requires_folder() {
        let err = StoreConfigBuilder::new().sharding(true).build().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn default_single_file_path() {
        let cfg = StoreConfigBuilder::new().build().unwrap();
        match cfg.mode {
            PersistenceMode::SingleFile { path } => {
                assert_eq!(path, PathBuf::from("./sencillo.json"))
            }
            _ => panic!("expected single-file mode"),
        }
    }

    #[test]
    fn hooks_reject_aof() {
        let err = StoreConfigBuilder::new()
            .hooks(
                std::sync::Arc::new(|| Ok(String::new())),
                std::sync::Arc::new(|_| Ok(())),
            )
            .aof(true)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn sharded_folder_ok() {
        let cfg = StoreConfigBuilder::new()
            .folder("/tmp/db")
            .sharding(true)
            .build()
            .unwrap();
        assert!(matches!(cfg.mode, PersistenceMode::Sharded { .. }));
    }
}

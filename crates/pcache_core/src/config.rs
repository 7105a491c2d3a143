//! Local store configuration.

use crate::record::ExtraFields;
use std::path::PathBuf;

/// Where a store keeps its record log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// One log file per workspace under this directory.
    Directory(PathBuf),
    /// Ephemeral in-memory log, discarded on `close()`.
    Memory,
}

/// Configuration for opening a [`crate::LocalStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Where the record log lives.
    pub location: StoreLocation,
    /// Whether to fsync after every frame (safer but slower).
    pub sync_on_write: bool,
    /// Extension fields kept in cached rows.
    pub extra_fields: ExtraFields,
}

impl StoreConfig {
    /// Stores the log under `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::Directory(dir.into()),
            ..Self::default()
        }
    }

    /// Keeps the log in memory.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Sets whether to fsync after every frame.
    #[must_use]
    pub fn with_sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the cached extension fields.
    #[must_use]
    pub fn with_extra_fields(mut self, extra_fields: ExtraFields) -> Self {
        self.extra_fields = extra_fields;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: StoreLocation::Memory,
            sync_on_write: true,
            extra_fields: ExtraFields::none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ExtraField;

    #[test]
    fn default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.location, StoreLocation::Memory);
        assert!(config.sync_on_write);
        assert_eq!(config.extra_fields, ExtraFields::none());
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::in_dir("/tmp/pcache")
            .with_sync_on_write(false)
            .with_extra_fields(ExtraFields::none().with(ExtraField::HealthId));

        assert_eq!(
            config.location,
            StoreLocation::Directory(PathBuf::from("/tmp/pcache"))
        );
        assert!(!config.sync_on_write);
        assert!(config.extra_fields.contains(ExtraField::HealthId));
    }
}

//! SDK-level configuration.

use pcache_core::{CacheError, CacheResult, StoreConfig};
use pcache_sync::DEFAULT_PAGE_SIZE;

/// Configuration for a [`crate::PatientCache`].
#[derive(Debug, Clone)]
pub struct SdkConfig {
    /// Workspace whose records are cached. Without one, nothing is cached.
    pub workspace_id: Option<String>,
    /// Whether searches are answered from the local cache.
    pub local_search: bool,
    /// Local store configuration.
    pub store: StoreConfig,
    /// Records requested per sync page.
    pub page_size: u32,
    /// Whether sync runs on a background worker.
    pub background: bool,
    /// Default field selection for remote searches.
    pub remote_fields: Option<Vec<String>>,
}

impl SdkConfig {
    /// Creates a configuration with local search enabled for `workspace_id`.
    pub fn for_workspace(workspace_id: impl Into<String>) -> Self {
        Self {
            workspace_id: Some(workspace_id.into()),
            local_search: true,
            ..Self::default()
        }
    }

    /// Sets whether local search is enabled.
    #[must_use]
    pub fn with_local_search(mut self, enabled: bool) -> Self {
        self.local_search = enabled;
        self
    }

    /// Sets the store configuration.
    #[must_use]
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Sets the sync page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets whether sync runs in the background.
    #[must_use]
    pub fn with_background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    /// Sets the default remote field selection.
    #[must_use]
    pub fn with_remote_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remote_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Returns the workspace id if it is usable.
    pub fn workspace(&self) -> Option<&str> {
        self.workspace_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }

    /// Returns true if searches may be answered locally.
    pub fn local_search_configured(&self) -> bool {
        self.local_search && self.workspace().is_some()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Configuration`] if local search is enabled
    /// without a workspace id, or the page size is zero.
    pub fn validate(&self) -> CacheResult<()> {
        if self.local_search && self.workspace().is_none() {
            return Err(CacheError::configuration(
                "local search requires a workspace id",
            ));
        }
        if self.page_size == 0 {
            return Err(CacheError::configuration("sync page size must be at least 1"));
        }
        Ok(())
    }
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            workspace_id: None,
            local_search: false,
            store: StoreConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
            background: true,
            remote_fields: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_remote_only() {
        let config = SdkConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.local_search_configured());
        assert_eq!(config.page_size, 1000);
        assert!(config.background);
    }

    #[test]
    fn local_search_needs_workspace() {
        let config = SdkConfig::default().with_local_search(true);
        assert!(matches!(
            config.validate(),
            Err(CacheError::Configuration { .. })
        ));

        let blank = SdkConfig::for_workspace("   ");
        assert!(blank.validate().is_err());
        assert!(blank.workspace().is_none());
    }

    #[test]
    fn builder_pattern() {
        let config = SdkConfig::for_workspace("clinic")
            .with_page_size(250)
            .with_background(false)
            .with_remote_fields(["uid", "fln"]);

        assert!(config.validate().is_ok());
        assert!(config.local_search_configured());
        assert_eq!(config.page_size, 250);
        assert_eq!(
            config.remote_fields,
            Some(vec!["uid".to_string(), "fln".to_string()])
        );
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let config = SdkConfig::for_workspace("clinic").with_page_size(0);
        assert!(config.validate().is_err());
    }
}

//! Access-layer configuration.
//!
//! [`DocStoreConfig`] carries the defaults applied when a request does not
//! set them explicitly. Values can be loaded from environment variables via
//! [`DocStoreConfig::from_env`].

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Access-layer configuration.
///
/// # Examples
///
/// ```
/// use docstore_core::config::DocStoreConfig;
///
/// let config = DocStoreConfig::default();
/// assert_eq!(config.page_size, 100);
/// assert!(config.warn_unused_placeholders);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct DocStoreConfig {
    /// Items read per page when a query or scan does not set a page size.
    #[builder(default = 100)]
    pub page_size: usize,

    /// Per-call timeout in milliseconds; `0` disables the timeout.
    #[builder(default = 30_000)]
    pub request_timeout_ms: u64,

    /// Whether unused name/value map entries produce a warning.
    #[builder(default = true)]
    pub warn_unused_placeholders: bool,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for DocStoreConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            request_timeout_ms: 30_000,
            warn_unused_placeholders: true,
            log_level: String::from("info"),
        }
    }
}

impl DocStoreConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DOCSTORE_PAGE_SIZE` | `100` |
    /// | `DOCSTORE_REQUEST_TIMEOUT_MS` | `30000` |
    /// | `DOCSTORE_WARN_UNUSED_PLACEHOLDERS` | `true` |
    /// | `LOG_LEVEL` | `info` |
    ///
    /// Unparseable numbers and a zero page size keep the default.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(n) = env_parse::<usize>("DOCSTORE_PAGE_SIZE").filter(|n| *n > 0) {
            config.page_size = n;
        }
        if let Some(ms) = env_parse::<u64>("DOCSTORE_REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = ms;
        }
        config.warn_unused_placeholders = env_bool(
            "DOCSTORE_WARN_UNUSED_PLACEHOLDERS",
            config.warn_unused_placeholders,
        );
        if let Ok(v) = env::var("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// The per-call timeout, if enabled.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key).map_or(default, |v| {
        matches!(v.as_str(), "1" | "true" | "yes" | "TRUE" | "YES")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_create_default_config() {
        let config = DocStoreConfig::default();
        assert_eq!(config.page_size, 100);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_should_build_with_typed_builder() {
        let config = DocStoreConfig::builder()
            .page_size(2)
            .request_timeout_ms(0)
            .warn_unused_placeholders(false)
            .build();
        assert_eq!(config.page_size, 2);
        assert_eq!(config.request_timeout(), None);
        assert!(!config.warn_unused_placeholders);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_should_load_from_env() {
        let config = DocStoreConfig::from_env();
        assert!(config.page_size > 0);
    }

    #[test]
    fn test_should_serialize_to_camel_case_json() {
        let json = serde_json::to_string(&DocStoreConfig::default()).unwrap();
        assert!(json.contains("\"pageSize\":100"));
        assert!(json.contains("\"warnUnusedPlaceholders\":true"));
    }
}

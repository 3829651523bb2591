use std::path::PathBuf;
use std::time::Duration;

use crate::source::DEFAULT_MIME_DB_URL;

mod env;

use env::{parse_disabled, parse_u64, read_non_empty_env};

pub const ENV_MIMEDB_URL: &str = "MIMEDB_URL";
pub const ENV_MIMEDB_TIMEOUT_MS: &str = "MIMEDB_TIMEOUT_MS";
pub const ENV_MIMEDB_CACHE_DIR: &str = "MIMEDB_CACHE_DIR";
pub const ENV_MIMEDB_CACHE_TTL_SECS: &str = "MIMEDB_CACHE_TTL_SECS";

/// One day.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeDbConfig {
    pub url: String,
    /// `None` leaves the database fetch unbounded.
    pub timeout: Option<Duration>,
    /// `None` disables the persistent cache.
    pub cache_dir: Option<PathBuf>,
    /// `None` defers to the cache's own default.
    pub cache_ttl: Option<Duration>,
}

impl Default for MimeDbConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_MIME_DB_URL.to_string(),
            timeout: None,
            cache_dir: None,
            cache_ttl: Some(DEFAULT_CACHE_TTL),
        }
    }
}

impl MimeDbConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            url: read_non_empty_env(ENV_MIMEDB_URL)
                .unwrap_or_else(|| DEFAULT_MIME_DB_URL.to_string()),
            timeout: resolve_timeout(read_non_empty_env(ENV_MIMEDB_TIMEOUT_MS).as_deref()),
            cache_dir: read_non_empty_env(ENV_MIMEDB_CACHE_DIR).map(PathBuf::from),
            cache_ttl: resolve_cache_ttl(read_non_empty_env(ENV_MIMEDB_CACHE_TTL_SECS).as_deref()),
        }
    }
}

#[must_use]
pub(crate) fn resolve_timeout(raw: Option<&str>) -> Option<Duration> {
    raw.and_then(parse_u64)
        .filter(|millis| *millis > 0)
        .map(Duration::from_millis)
}

#[must_use]
pub(crate) fn resolve_cache_ttl(raw: Option<&str>) -> Option<Duration> {
    if parse_disabled(raw) {
        return None;
    }
    Some(
        raw.and_then(parse_u64)
            .map_or(DEFAULT_CACHE_TTL, Duration::from_secs),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_requires_positive_millis() {
        assert_eq!(resolve_timeout(None), None);
        assert_eq!(resolve_timeout(Some("0")), None);
        assert_eq!(resolve_timeout(Some("soon")), None);
        assert_eq!(
            resolve_timeout(Some(" 2500 ")),
            Some(Duration::from_millis(2500))
        );
    }

    #[test]
    fn cache_ttl_defaults_to_one_day() {
        assert_eq!(resolve_cache_ttl(None), Some(DEFAULT_CACHE_TTL));
        assert_eq!(resolve_cache_ttl(Some("garbage")), Some(DEFAULT_CACHE_TTL));
        assert_eq!(resolve_cache_ttl(Some("90")), Some(Duration::from_secs(90)));
    }

    #[test]
    fn cache_ttl_off_tokens_defer_to_cache_default() {
        assert_eq!(resolve_cache_ttl(Some("0")), None);
        assert_eq!(resolve_cache_ttl(Some("OFF")), None);
        assert_eq!(resolve_cache_ttl(Some("none")), None);
    }

    #[test]
    fn default_config_points_at_jsdelivr_without_cache() {
        let config = MimeDbConfig::default();
        assert_eq!(config.url, DEFAULT_MIME_DB_URL);
        assert!(config.cache_dir.is_none());
        assert!(config.timeout.is_none());
    }
}

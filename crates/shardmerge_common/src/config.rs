use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MergeError, MergeResult};
use crate::types::DialectTag;

/// Merge engine configuration (the `[merge]` section of the proxy config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Max rows the memory merger may drain before aborting (0 = unlimited).
    pub max_rows_buffered: usize,
    /// Use the streaming group-by merger when GROUP BY and ORDER BY agree.
    /// When false every grouped query is merged in memory.
    pub stream_group_by: bool,
    /// Fractional digits kept when AVG divides an exact numeric sum.
    pub avg_scale: u8,
    /// Dialect assumed for LIMIT clauses that carry no explicit tag.
    pub default_dialect: DialectTag,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_rows_buffered: 1_000_000,
            stream_group_by: true,
            avg_scale: 4,
            default_dialect: DialectTag::Unknown,
        }
    }
}

impl MergeConfig {
    pub fn from_toml_str(content: &str) -> MergeResult<Self> {
        toml::from_str(content)
            .map_err(|e| MergeError::Configuration(format!("invalid merge config: {}", e)))
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> MergeResult<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config = Self::from_toml_str(&content)?;
                tracing::info!("Loaded merge config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("Merge config {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Whether `rows` exceeds the buffering limit.
    pub fn exceeds_buffer_limit(&self, rows: usize) -> bool {
        self.max_rows_buffered != 0 && rows > self.max_rows_buffered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MergeConfig::default();
        assert_eq!(config.max_rows_buffered, 1_000_000);
        assert!(config.stream_group_by);
        assert_eq!(config.avg_scale, 4);
        assert_eq!(config.default_dialect, DialectTag::Unknown);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = MergeConfig::from_toml_str(
            r#"
            max_rows_buffered = 10
            default_dialect = "rownum-pseudocolumn"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_rows_buffered, 10);
        assert_eq!(config.default_dialect, DialectTag::RownumPseudocolumn);
        assert!(config.stream_group_by);
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let err = MergeConfig::from_toml_str("max_rows_buffered = \"many\"").unwrap_err();
        assert!(matches!(err, MergeError::Configuration(_)));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = MergeConfig::load("/nonexistent/shardmerge/merge.toml").unwrap();
        assert_eq!(config, MergeConfig::default());
    }

    #[test]
    fn test_buffer_limit() {
        let mut config = MergeConfig::default();
        config.max_rows_buffered = 3;
        assert!(!config.exceeds_buffer_limit(3));
        assert!(config.exceeds_buffer_limit(4));
        config.max_rows_buffered = 0;
        assert!(!config.exceeds_buffer_limit(usize::MAX));
    }
}

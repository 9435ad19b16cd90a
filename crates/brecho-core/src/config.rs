//! Configuration types for Brecho.
//!
//! [`GlobalConfig`] is the user-level configuration stored in
//! `~/.brecho/config.yaml`. Every section is optional; a missing file means
//! defaults everywhere. The model-side sections reuse the canonical types
//! from `brecho-model`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use brecho_model::{EmbeddingConfig, OracleConfig, SpeechConfig};

use crate::constants::{BRECHO_HOME_DIR, GLOBAL_CONFIG_FILENAME, INDEX_DIR};
use crate::errors::BrechoError;
use crate::features::PoolingMode;

// ============================================================================
// GlobalConfig
// ============================================================================

/// Global (user-level) configuration for Brecho.
///
/// # Example YAML
///
/// ```yaml
/// embedding:
///   provider: clip
///   device: auto
/// index:
///   path: /var/lib/brecho/vectordb
///   backend: simple
/// oracle:
///   baseUrl: http://localhost:11434
///   model: gemma3:4b
/// speech:
///   enabled: true
///   url: http://localhost:8080
/// pipeline:
///   primaryTimeoutSecs: 300
///   neighborCount: 5
///   poolingMode: mean
/// server:
///   bind: 0.0.0.0:8000
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    /// Image embedding model.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Vector index location and backend.
    #[serde(default)]
    pub index: IndexConfig,

    /// Vision/text inference oracle.
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Optional speech-to-text collaborator.
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Intake pipeline budgets and knobs.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// HTTP gateway.
    #[serde(default)]
    pub server: ServerConfig,
}

impl GlobalConfig {
    /// Load the global configuration from the default location (`~/.brecho/config.yaml`).
    ///
    /// If the file does not exist, returns the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`BrechoError::InvalidGlobalConfig`] if the file exists but cannot be parsed.
    pub fn load_default() -> Result<Self, BrechoError> {
        match Self::default_path() {
            Some(path) => Self::from_path(&path),
            None => {
                tracing::debug!("Could not determine home directory, using default config");
                Ok(Self::default())
            }
        }
    }

    /// Load the global configuration from a specific path.
    ///
    /// If the file does not exist, returns the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`BrechoError::InvalidGlobalConfig`] if the file exists but cannot be parsed.
    /// Returns [`BrechoError::InvalidConfiguration`] if validation fails.
    pub fn from_path(path: &Path) -> Result<Self, BrechoError> {
        if !path.exists() {
            tracing::debug!(
                "Global config not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            BrechoError::InvalidGlobalConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            BrechoError::InvalidGlobalConfig(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        let warnings = config.validate()?;
        for warning in warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok(config)
    }

    /// Get the default global config directory (`~/.brecho`).
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(BRECHO_HOME_DIR))
    }

    /// Get the default global config file path (`~/.brecho/config.yaml`).
    pub fn default_path() -> Option<PathBuf> {
        Self::default_dir().map(|d| d.join(GLOBAL_CONFIG_FILENAME))
    }

    /// Render the configuration as YAML.
    pub fn to_yaml(&self) -> Result<String, BrechoError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration.
    ///
    /// Hard errors are returned as [`BrechoError::InvalidConfiguration`];
    /// soft issues come back as warning strings the caller should log.
    pub fn validate(&self) -> Result<Vec<String>, BrechoError> {
        let mut all_warnings = Vec::new();

        all_warnings.extend(self.index.validate()?);
        all_warnings.extend(self.pipeline.validate()?);
        all_warnings.extend(self.server.validate()?);

        if !self.oracle.base_url.starts_with("http://")
            && !self.oracle.base_url.starts_with("https://")
        {
            all_warnings.push(format!(
                "oracle.baseUrl '{}' has no http(s) scheme; requests will fail and intake will always fall back",
                self.oracle.base_url
            ));
        }

        if self.speech.enabled && self.speech.url.trim().is_empty() {
            all_warnings.push(
                "speech.enabled is true but speech.url is empty; audio clips will be ignored"
                    .to_string(),
            );
        }

        Ok(all_warnings)
    }
}

// ============================================================================
// IndexConfig
// ============================================================================

/// Location and backend of the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexConfig {
    /// Index directory. Defaults to `~/.brecho/vectordb`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Backend name ("simple" or "lancedb").
    #[serde(default = "default_index_backend")]
    pub backend: String,
}

fn default_index_backend() -> String {
    brecho_db::vector::DEFAULT_BACKEND.to_string()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: None,
            backend: default_index_backend(),
        }
    }
}

impl IndexConfig {
    /// The directory the index lives in.
    pub fn effective_path(&self) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None => GlobalConfig::default_dir()
                .unwrap_or_else(|| PathBuf::from(".").join(BRECHO_HOME_DIR))
                .join(INDEX_DIR),
        }
    }

    /// # Errors
    /// Returns an error if the backend is not compiled into this build.
    pub fn validate(&self) -> Result<Vec<String>, BrechoError> {
        let available = brecho_db::vector::available_backends();
        if !available.contains(&self.backend.as_str()) {
            return Err(BrechoError::InvalidConfiguration {
                message: format!("index.backend '{}' is not available", self.backend),
                hint: format!("Use one of: {}", available.join(", ")),
            });
        }
        Ok(Vec::new())
    }
}

// ============================================================================
// PipelineConfig
// ============================================================================

/// Budgets and knobs for the intake pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Per-call deadline for the multimodal analysis.
    #[serde(default = "default_primary_timeout_secs")]
    pub primary_timeout_secs: u64,

    /// Per-call deadline for the text-only fallback analysis.
    #[serde(default = "default_fallback_timeout_secs")]
    pub fallback_timeout_secs: u64,

    /// Per-call deadline for the price suggestion.
    #[serde(default = "default_price_timeout_secs")]
    pub price_timeout_secs: u64,

    /// Overall deadline for one intake request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Neighbors fetched for each intake.
    #[serde(default = "default_neighbor_count")]
    pub neighbor_count: usize,

    /// Neighbors handed to the fallback prompt.
    #[serde(default = "default_fallback_neighbor_count")]
    pub fallback_neighbor_count: usize,

    /// How views are pooled: "mean" or "max". Anything else means "mean".
    #[serde(default = "default_pooling_mode")]
    pub pooling_mode: String,

    /// Side of the square thumbnail visual descriptors are computed on.
    #[serde(default = "default_descriptor_thumbnail")]
    pub descriptor_thumbnail: u32,
}

fn default_primary_timeout_secs() -> u64 {
    300
}

fn default_fallback_timeout_secs() -> u64 {
    180
}

fn default_price_timeout_secs() -> u64 {
    180
}

fn default_request_timeout_secs() -> u64 {
    600
}

fn default_neighbor_count() -> usize {
    5
}

fn default_fallback_neighbor_count() -> usize {
    3
}

fn default_pooling_mode() -> String {
    "mean".to_string()
}

fn default_descriptor_thumbnail() -> u32 {
    100
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            primary_timeout_secs: default_primary_timeout_secs(),
            fallback_timeout_secs: default_fallback_timeout_secs(),
            price_timeout_secs: default_price_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            neighbor_count: default_neighbor_count(),
            fallback_neighbor_count: default_fallback_neighbor_count(),
            pooling_mode: default_pooling_mode(),
            descriptor_thumbnail: default_descriptor_thumbnail(),
        }
    }
}

impl PipelineConfig {
    pub fn pooling(&self) -> PoolingMode {
        PoolingMode::from_name(&self.pooling_mode)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validates the pipeline configuration.
    ///
    /// # Errors
    /// Returns an error for zero timeouts, a zero neighbor count or a zero
    /// descriptor thumbnail.
    ///
    /// # Warnings
    /// - unknown `poolingMode` (mean is used)
    /// - a per-call timeout longer than the request timeout
    /// - `fallbackNeighborCount > neighborCount`
    pub fn validate(&self) -> Result<Vec<String>, BrechoError> {
        let mut warnings = Vec::new();

        let timeouts = [
            ("primaryTimeoutSecs", self.primary_timeout_secs),
            ("fallbackTimeoutSecs", self.fallback_timeout_secs),
            ("priceTimeoutSecs", self.price_timeout_secs),
            ("requestTimeoutSecs", self.request_timeout_secs),
        ];
        for (name, secs) in timeouts {
            if secs == 0 {
                return Err(BrechoError::InvalidConfiguration {
                    message: format!("pipeline.{} cannot be 0", name),
                    hint: format!("Set {} to a number of seconds (reference: 180-600)", name),
                });
            }
        }

        if self.neighbor_count == 0 {
            return Err(BrechoError::InvalidConfiguration {
                message: "pipeline.neighborCount cannot be 0".to_string(),
                hint: "Set neighborCount to at least 1 (default: 5)".to_string(),
            });
        }

        if self.fallback_neighbor_count == 0 {
            return Err(BrechoError::InvalidConfiguration {
                message: "pipeline.fallbackNeighborCount cannot be 0".to_string(),
                hint: "Set fallbackNeighborCount to at least 1 (default: 3)".to_string(),
            });
        }

        if self.descriptor_thumbnail == 0 {
            return Err(BrechoError::InvalidConfiguration {
                message: "pipeline.descriptorThumbnail cannot be 0".to_string(),
                hint: "Set descriptorThumbnail to a pixel size (default: 100)".to_string(),
            });
        }

        let mode = self.pooling_mode.trim().to_lowercase();
        if mode != "mean" && mode != "max" {
            warnings.push(format!(
                "pipeline.poolingMode '{}' is not recognized; mean pooling is used",
                self.pooling_mode
            ));
        }

        for (name, secs) in &timeouts[..3] {
            if *secs > self.request_timeout_secs {
                warnings.push(format!(
                    "pipeline.{}={}s exceeds requestTimeoutSecs={}s; the call is cut short by the request deadline",
                    name, secs, self.request_timeout_secs
                ));
            }
        }

        if self.fallback_neighbor_count > self.neighbor_count {
            warnings.push(format!(
                "pipeline.fallbackNeighborCount={} > neighborCount={}; only {} neighbors will be available",
                self.fallback_neighbor_count, self.neighbor_count, self.neighbor_count
            ));
        }

        Ok(warnings)
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

/// HTTP gateway settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Maximum request body in megabytes (photos plus audio).
    #[serde(default = "default_max_body_mb")]
    pub max_body_mb: usize,
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_max_body_mb() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_mb: default_max_body_mb(),
        }
    }
}

impl ServerConfig {
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_mb.saturating_mul(1024 * 1024)
    }

    /// # Errors
    /// Returns an error if `maxBodyMb` is 0 or `bind` is not a socket address.
    pub fn validate(&self) -> Result<Vec<String>, BrechoError> {
        if self.max_body_mb == 0 {
            return Err(BrechoError::InvalidConfiguration {
                message: "server.maxBodyMb cannot be 0".to_string(),
                hint: "Set maxBodyMb large enough for a few photos (default: 64)".to_string(),
            });
        }

        if self.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(BrechoError::InvalidConfiguration {
                message: format!("server.bind '{}' is not a socket address", self.bind),
                hint: "Use host:port, e.g. 0.0.0.0:8000".to_string(),
            });
        }

        Ok(Vec::new())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use brecho_model::EmbeddingProviderKind;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_global_config_default() {
        let config = GlobalConfig::default();
        assert_eq!(config.pipeline.primary_timeout_secs, 300);
        assert_eq!(config.pipeline.fallback_timeout_secs, 180);
        assert_eq!(config.pipeline.request_timeout_secs, 600);
        assert_eq!(config.pipeline.neighbor_count, 5);
        assert_eq!(config.pipeline.fallback_neighbor_count, 3);
        assert_eq!(config.index.backend, "simple");
        assert_eq!(config.server.bind, "0.0.0.0:8000");
    }

    #[test]
    fn test_global_config_from_yaml() {
        let yaml = r#"
embedding:
  provider: histogram
index:
  path: /tmp/brecho-index
oracle:
  baseUrl: http://gpu-box:11434
  model: llava:13b
pipeline:
  primaryTimeoutSecs: 120
  poolingMode: max
"#;
        let config: GlobalConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::Histogram);
        assert_eq!(
            config.index.effective_path(),
            PathBuf::from("/tmp/brecho-index")
        );
        assert_eq!(config.oracle.model, "llava:13b");
        assert_eq!(config.pipeline.primary_timeout_secs, 120);
        assert_eq!(config.pipeline.fallback_timeout_secs, 180);
        assert_eq!(config.pipeline.pooling(), PoolingMode::Max);
    }

    #[test]
    fn test_global_config_missing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.yaml");
        let config = GlobalConfig::from_path(&path).unwrap();
        assert_eq!(config.pipeline, PipelineConfig::default());
    }

    #[test]
    fn test_global_config_invalid_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("invalid.yaml");
        std::fs::write(&path, "not: [valid: yaml").unwrap();
        let err = GlobalConfig::from_path(&path).unwrap_err();
        assert!(matches!(err, BrechoError::InvalidGlobalConfig(_)));
    }

    #[test]
    fn test_global_config_validate_default_is_valid() {
        let warnings = GlobalConfig::default().validate().unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn test_global_config_from_path_with_zero_timeout() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
pipeline:
  fallbackTimeoutSecs: 0
"#
        )
        .unwrap();

        let err = GlobalConfig::from_path(&path).unwrap_err();
        assert!(matches!(err, BrechoError::InvalidConfiguration { .. }));
        assert!(err.to_string().contains("fallbackTimeoutSecs"));
    }

    #[test]
    fn test_pipeline_validate_zero_neighbors() {
        let config = PipelineConfig {
            neighbor_count: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pipeline_validate_warnings() {
        let config = PipelineConfig {
            pooling_mode: "median".to_string(),
            primary_timeout_secs: 900,
            fallback_neighbor_count: 8,
            ..Default::default()
        };
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("mean pooling is used"));
        assert!(warnings[1].contains("primaryTimeoutSecs=900s"));
        assert!(warnings[2].contains("fallbackNeighborCount=8"));
        assert_eq!(config.pooling(), PoolingMode::Mean);
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let config = IndexConfig {
            path: None,
            backend: "chroma".to_string(),
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chroma"));
    }

    #[test]
    fn test_server_validate() {
        let bad_bind = ServerConfig {
            bind: "localhost".to_string(),
            ..Default::default()
        };
        assert!(bad_bind.validate().is_err());
        assert_eq!(ServerConfig::default().max_body_bytes(), 64 * 1024 * 1024);
    }

    #[test]
    fn test_soft_warnings_for_oracle_and_speech() {
        let mut config = GlobalConfig::default();
        config.oracle.base_url = "localhost:11434".to_string();
        config.speech.enabled = true;
        config.speech.url = String::new();
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_yaml_round_trip_uses_camel_case() {
        let yaml = GlobalConfig::default().to_yaml().unwrap();
        assert!(yaml.contains("primaryTimeoutSecs: 300"));
        assert!(yaml.contains("maxBodyMb: 64"));
    }
}

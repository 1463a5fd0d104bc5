use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::ingest::MAX_UPLOAD_BYTES;

pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read pipeline config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid pipeline config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("REMOTE_DIAGNOSIS_URL must be set when DIAGNOSIS_BACKEND=remote")]
    MissingRemoteUrl,
    #[error("Invalid remote diagnosis URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Simulated model latency, in milliseconds, drawn uniformly from `[min_ms, max_ms]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl LatencyRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub const fn none() -> Self {
        Self::new(0, 0)
    }

    pub fn sample(&self, unit: f64) -> Duration {
        let span = self.max_ms.saturating_sub(self.min_ms) as f64;
        Duration::from_millis(self.min_ms + (span * unit.clamp(0.0, 1.0)).round() as u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    pub loaded_model: LatencyRange,
    pub mock_model: LatencyRange,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            loaded_model: LatencyRange::new(1200, 2000),
            mock_model: LatencyRange::new(800, 1200),
        }
    }
}

impl LatencyConfig {
    pub fn disabled() -> Self {
        Self {
            loaded_model: LatencyRange::none(),
            mock_model: LatencyRange::none(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_upload_bytes: usize,
    pub latency: LatencyConfig,
    pub remote_timeout_secs: u64,
    /// Sessions untouched for this long are closed along with their images.
    pub session_ttl_secs: u64,
    /// Fixes every random source in the pipeline when set.
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: MAX_UPLOAD_BYTES,
            latency: LatencyConfig::default(),
            remote_timeout_secs: 30,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            seed: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(source)?;
        if config.max_upload_bytes == 0 || config.max_upload_bytes > MAX_UPLOAD_BYTES {
            return Err(ConfigError::InvalidValue {
                key: "max_upload_bytes",
                value: config.max_upload_bytes.to_string(),
            });
        }
        if config.session_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "session_ttl_secs",
                value: "0".to_string(),
            });
        }
        for (key, range) in [
            ("latency.loaded_model", config.latency.loaded_model),
            ("latency.mock_model", config.latency.mock_model),
        ] {
            if range.min_ms > range.max_ms {
                return Err(ConfigError::InvalidValue {
                    key,
                    value: format!("{}..{}", range.min_ms, range.max_ms),
                });
            }
        }
        Ok(config)
    }

    /// Loads the YAML file if it exists, falling back to defaults otherwise.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!(
                "No pipeline config at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&source)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendChoice {
    Local,
    Remote(Url),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    pub frontend_dir: String,
    pub model_path: Option<PathBuf>,
    pub backend: BackendChoice,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("BIND_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = lookup("PORT").unwrap_or_else(|| "8081".to_string());
        port.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
            key: "PORT",
            value: port.clone(),
        })?;

        let frontend_dir = lookup("FRONTEND_DIR").unwrap_or_else(|| {
            match lookup("CARGO_MANIFEST_DIR") {
                Some(manifest_dir) => format!("{}/../frontend/dist", manifest_dir),
                None => "/usr/src/app/frontend/dist".to_string(),
            }
        });

        let model_path = lookup("MODEL_PATH")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        let backend = match lookup("DIAGNOSIS_BACKEND")
            .unwrap_or_else(|| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "local" => BackendChoice::Local,
            "remote" => {
                let raw = lookup("REMOTE_DIAGNOSIS_URL").ok_or(ConfigError::MissingRemoteUrl)?;
                BackendChoice::Remote(Url::parse(&raw)?)
            }
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "DIAGNOSIS_BACKEND",
                    value: other.to_string(),
                });
            }
        };

        let pipeline_path = lookup("PIPELINE_CONFIG").map(PathBuf::from).unwrap_or_else(|| {
            match lookup("CARGO_MANIFEST_DIR") {
                Some(manifest_dir) => PathBuf::from(format!("{}/../config/pipeline.yaml", manifest_dir)),
                None => PathBuf::from("config/pipeline.yaml"),
            }
        });
        let pipeline = PipelineConfig::load(&pipeline_path)?;

        Ok(Self {
            bind_address: format!("{}:{}", host, port),
            frontend_dir,
            model_path,
            backend,
            pipeline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = AppConfig::from_lookup(lookup_from(&[(
            "PIPELINE_CONFIG",
            "/nonexistent/pipeline.yaml",
        )]))
        .unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:8081");
        assert_eq!(config.backend, BackendChoice::Local);
        assert!(config.model_path.is_none());
        assert_eq!(config.pipeline.max_upload_bytes, 10_485_760);
        assert_eq!(config.pipeline.session_ttl(), Duration::from_secs(1800));
    }

    #[test]
    fn remote_backend_requires_a_url() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("DIAGNOSIS_BACKEND", "remote"),
            ("PIPELINE_CONFIG", "/nonexistent/pipeline.yaml"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingRemoteUrl));

        let config = AppConfig::from_lookup(lookup_from(&[
            ("DIAGNOSIS_BACKEND", "Remote"),
            ("REMOTE_DIAGNOSIS_URL", "https://example.org/diagnose"),
            ("PIPELINE_CONFIG", "/nonexistent/pipeline.yaml"),
        ]))
        .unwrap();
        match config.backend {
            BackendChoice::Remote(url) => assert_eq!(url.path(), "/diagnose"),
            other => panic!("unexpected backend {:?}", other),
        }
    }

    #[test]
    fn rejects_bad_port_and_unknown_backend() {
        assert!(AppConfig::from_lookup(lookup_from(&[("PORT", "http")])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("DIAGNOSIS_BACKEND", "onnx")])).is_err());
    }

    #[test]
    fn pipeline_yaml_overrides_defaults() {
        let config = PipelineConfig::from_yaml(
            "max_upload_bytes: 1024\nlatency:\n  mock_model:\n    min_ms: 5\n    max_ms: 10\nseed: 7\n",
        )
        .unwrap();
        assert_eq!(config.max_upload_bytes, 1024);
        assert_eq!(config.latency.mock_model, LatencyRange::new(5, 10));
        assert_eq!(config.latency.loaded_model, LatencyRange::new(1200, 2000));
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn pipeline_yaml_rejects_inverted_latency() {
        let err = PipelineConfig::from_yaml("latency:\n  mock_model:\n    min_ms: 50\n    max_ms: 10\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "latency.mock_model", .. }));
    }

    #[test]
    fn pipeline_yaml_sets_session_ttl() {
        let config = PipelineConfig::from_yaml("session_ttl_secs: 120\n").unwrap();
        assert_eq!(config.session_ttl(), Duration::from_secs(120));

        let err = PipelineConfig::from_yaml("session_ttl_secs: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "session_ttl_secs", .. }));
    }

    #[test]
    fn latency_sample_stays_in_range() {
        let range = LatencyRange::new(800, 1200);
        assert_eq!(range.sample(0.0), Duration::from_millis(800));
        assert_eq!(range.sample(1.0), Duration::from_millis(1200));
        assert_eq!(range.sample(7.0), Duration::from_millis(1200));
    }
}

//! Configuration management for the fraud scoring service

use crate::types::alert::RiskLevelThresholds;
use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Which score provider backs the pipeline
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScoreBackendKind {
    /// Deterministic weighted-threshold rules
    #[default]
    Rules,
    /// External trained classifier (ONNX)
    Model,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub gate: GateConfig,
    pub detection: DetectionConfig,
    pub model: ModelConfig,
    pub bus: BusConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
        }
    }
}

/// Access-control gate configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// CIDR blocks always admitted
    pub whitelist: Vec<String>,
    /// CIDR blocks always refused (unless whitelisted)
    pub blacklist: Vec<String>,
    pub rate_limit: RateLimitConfig,
    /// CSV audit log path; decisions go to the tracing log when unset
    pub audit_log: Option<String>,
    /// Idle time after which a caller's rate window is evicted
    pub idle_ttl_seconds: u64,
    /// How often idle windows are swept
    pub sweep_interval_seconds: u64,
    /// Peers whose `X-Forwarded-For` header is honored. Every other peer
    /// is identified by its socket address.
    pub trusted_proxies: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            rate_limit: RateLimitConfig::default(),
            audit_log: None,
            idle_ttl_seconds: 600,
            sweep_interval_seconds: 60,
            trusted_proxies: Vec::new(),
        }
    }
}

/// Sliding-window budget
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    pub requests: usize,
    /// Window length in seconds
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: 100,
            window_seconds: 60,
        }
    }
}

/// Detection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Probability above which a transaction is flagged
    pub threshold: f64,
    /// Probability bands attached to every event
    pub score_bands: RiskLevelThresholds,
    pub provider: ScoreBackendKind,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            score_bands: RiskLevelThresholds::default(),
            provider: ScoreBackendKind::Rules,
        }
    }
}

/// Trained classifier configuration, used when `detection.provider = "model"`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// ONNX model file
    pub path: String,
    /// Input tensor name; the model's first input when unset
    pub input_name: Option<String>,
    /// Standard-scaler parameters the model was trained with
    pub scaler: Option<ScalerConfig>,
    /// Intra-op threads for ONNX inference
    pub threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: "models/classifier.onnx".to_string(),
            input_name: None,
            scaler: None,
            threads: 1,
        }
    }
}

/// Per-feature mean and scale, in feature-vector order
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ScalerConfig {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// Alert bus configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Buffered frames per subscriber
    pub channel_capacity: usize,
    /// Time a publish waits on a full subscriber before dropping it
    pub delivery_timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            delivery_timeout_ms: 1000,
        }
    }
}

/// Metrics reporting configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between summary log lines
    pub report_interval_seconds: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_seconds: 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load `config/config.toml` if present, then `FRAUD_SHIELD__*` overrides
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/config").required(false))
            .add_source(env_source())
            .build()
            .context("Failed to build configuration")?;

        Self::finish(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(env_source())
            .build()
            .context("Failed to build configuration")?;

        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self> {
        let mut app: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app.validate()?;
        Ok(app)
    }

    /// Reject unusable values and clamp the threshold into [0, 1]
    pub fn validate(&mut self) -> Result<()> {
        if !self.detection.threshold.is_finite() {
            bail!("detection.threshold must be a finite number");
        }
        self.detection.threshold = self.detection.threshold.clamp(0.0, 1.0);

        if self.gate.rate_limit.window_seconds == 0 {
            bail!("gate.rate_limit.window_seconds must be greater than zero");
        }
        if self.bus.channel_capacity == 0 {
            bail!("bus.channel_capacity must be greater than zero");
        }
        if let Some(scaler) = &self.model.scaler {
            if scaler.mean.len() != scaler.scale.len() {
                bail!(
                    "model.scaler mean has {} entries but scale has {}",
                    scaler.mean.len(),
                    scaler.scale.len()
                );
            }
        }
        Ok(())
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("FRAUD_SHIELD")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("gate.whitelist")
        .with_list_parse_key("gate.blacklist")
        .with_list_parse_key("gate.trusted_proxies")
}

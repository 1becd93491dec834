//! Configuration structures for the synthesis service.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{VcError, VcResult};

/// Lowest output sample rate a request may ask for.
pub const MIN_SAMPLE_RATE: u32 = 8_000;
/// Highest output sample rate a request may ask for.
pub const MAX_SAMPLE_RATE: u32 = 96_000;

/// Device type for computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// CPU computation.
    #[default]
    Cpu,
    /// CUDA GPU computation.
    Cuda,
}

impl DeviceType {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceType::Cpu => "cpu",
            DeviceType::Cuda => "cuda",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = VcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(DeviceType::Cpu),
            "cuda" | "gpu" => Ok(DeviceType::Cuda),
            other => Err(VcError::config(format!(
                "unknown device '{other}', expected cpu or cuda"
            ))),
        }
    }
}

/// Which synthesis model variant to load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFlavor {
    /// English-only model; `language_id` must be `en`.
    #[default]
    English,
    /// Multilingual model; `language_id` selects the language.
    Multilingual,
}

impl ModelFlavor {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelFlavor::English => "english",
            ModelFlavor::Multilingual => "multilingual",
        }
    }
}

impl fmt::Display for ModelFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFlavor {
    type Err = VcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "english" | "en" => Ok(ModelFlavor::English),
            "multilingual" | "multi" => Ok(ModelFlavor::Multilingual),
            other => Err(VcError::config(format!(
                "unknown model flavor '{other}', expected english or multilingual"
            ))),
        }
    }
}

/// Runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Directory holding one sub-directory per voice.
    #[serde(default = "default_voices_root")]
    pub voices_root: PathBuf,

    /// Scratch directory for engine intermediates.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Compute device.
    #[serde(default)]
    pub device: DeviceType,

    /// Output rate used when a request does not name one.
    #[serde(default = "default_sample_rate")]
    pub default_sample_rate: u32,

    /// Synthesis model variant.
    #[serde(default)]
    pub model_flavor: ModelFlavor,

    /// How long a voice listing may be served from memory.
    #[serde(default = "default_voice_cache_ttl_secs")]
    pub voice_cache_ttl_secs: u64,

    /// Construct every engine at startup instead of on first use.
    #[serde(default)]
    pub preload: bool,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_voices_root() -> PathBuf {
    PathBuf::from("voices")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".chattervc_cache")
}

fn default_sample_rate() -> u32 {
    24000
}

fn default_voice_cache_ttl_secs() -> u64 {
    5
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            voices_root: default_voices_root(),
            cache_dir: default_cache_dir(),
            device: DeviceType::default(),
            default_sample_rate: default_sample_rate(),
            model_flavor: ModelFlavor::default(),
            voice_cache_ttl_secs: default_voice_cache_ttl_secs(),
            preload: false,
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Check values that would otherwise fail on the first request.
    pub fn validate(&self) -> VcResult<()> {
        if self.default_sample_rate == 0 {
            return Err(VcError::config("default sample rate must be positive"));
        }
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.default_sample_rate) {
            return Err(VcError::config(format!(
                "default sample rate {} outside {MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE}",
                self.default_sample_rate
            )));
        }
        if self.voices_root.as_os_str().is_empty() {
            return Err(VcError::config("voices root must not be empty"));
        }
        Ok(())
    }

    /// Create the voices root and scratch directory if they are missing.
    pub fn ensure_dirs(&self) -> VcResult<()> {
        std::fs::create_dir_all(&self.voices_root)?;
        std::fs::create_dir_all(&self.cache_dir)?;
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (text, pretty or json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder and serve `/metrics`.
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

/// Server configuration (for vc-server).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address.
    #[serde(default = "default_server_host")]
    pub host: String,
    /// Server port.
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Grace period for in-flight requests on shutdown.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    /// Request body size limit in bytes.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    7779
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_max_body_size() -> usize {
    1024 * 1024 // 1 MB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            max_body_size: default_max_body_size(),
        }
    }
}

//! ChatterVC HTTP server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use vc_core::{LoggingConfig, RuntimeConfig, ServerConfig};
use vc_server::VcServer;

/// ChatterVC speech synthesis server
#[derive(Debug, Parser)]
#[command(name = "vc-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory with one subdirectory per voice
    #[arg(long, env = "VOICES_ROOT", default_value = "voices")]
    voices_root: PathBuf,

    /// Scratch directory for engine artifacts
    #[arg(long, env = "CHATTERVC_CACHE", default_value = ".chattervc_cache")]
    cache_dir: PathBuf,

    /// Compute device (cpu or cuda)
    #[arg(long, env = "CHATTERBOX_DEVICE", default_value = "cpu")]
    device: String,

    /// Default output sample rate
    #[arg(long, env = "CHATTERVC_SAMPLE_RATE", default_value_t = 24000)]
    sample_rate: u32,

    /// Synthesis model flavour (english or multilingual)
    #[arg(long, env = "CHATTERBOX_MODEL", default_value = "english")]
    model_flavor: String,

    /// Bind host
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Bind port
    #[arg(long, env = "PORT", default_value_t = 7779)]
    port: u16,

    /// How long a voice listing may be served before rescanning
    #[arg(long, env = "VOICE_CACHE_TTL_SECS", default_value_t = 5)]
    voice_cache_ttl_secs: u64,

    /// Load all engines before accepting requests
    #[arg(long, env = "CHATTERVC_PRELOAD")]
    preload: bool,

    /// Disable the Prometheus endpoint
    #[arg(long)]
    no_metrics: bool,

    /// Log level
    #[arg(short, long, env = "RUST_LOG", default_value = "info")]
    log_level: String,

    /// Log format (text or json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    log_format: String,
}

impl Args {
    fn runtime_config(&self) -> Result<RuntimeConfig> {
        let mut config = RuntimeConfig {
            voices_root: self.voices_root.clone(),
            cache_dir: self.cache_dir.clone(),
            device: self.device.parse().context("invalid --device")?,
            default_sample_rate: self.sample_rate,
            model_flavor: self.model_flavor.parse().context("invalid --model-flavor")?,
            voice_cache_ttl_secs: self.voice_cache_ttl_secs,
            preload: self.preload,
            logging: LoggingConfig {
                level: self.log_level.clone(),
                format: self.log_format.clone(),
            },
            ..RuntimeConfig::default()
        };
        config.metrics.enabled = !self.no_metrics;
        Ok(config)
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = args.runtime_config()?;
    runtime::logging::init(&config.logging).context("invalid logging configuration")?;

    config.validate().context("invalid configuration")?;
    config
        .ensure_dirs()
        .context("failed to create runtime directories")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %args.host,
        port = args.port,
        voices_root = %config.voices_root.display(),
        device = %config.device,
        flavor = %config.model_flavor,
        "Starting ChatterVC server"
    );

    let server =
        VcServer::from_config(args.server_config(), config).context("Failed to create server")?;
    server.run().await.context("Server failed")?;

    info!("Server shutdown complete");
    Ok(())
}

//! ChatterVC command-line interface.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use runtime::{ReferenceFactory, SynthesisPipeline};
use vc_core::{LoggingConfig, RuntimeConfig};

mod commands;

/// ChatterVC local tools
#[derive(Debug, Parser)]
#[command(name = "chattervc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Log format (json or text)
    #[arg(long, default_value = "text", global = true)]
    log_format: String,

    /// Directory with one subdirectory per voice
    #[arg(long, env = "VOICES_ROOT", default_value = "voices", global = true)]
    voices_root: PathBuf,

    /// Compute device (cpu or cuda)
    #[arg(long, env = "CHATTERBOX_DEVICE", default_value = "cpu", global = true)]
    device: String,

    /// Synthesis model flavour (english or multilingual)
    #[arg(long, env = "CHATTERBOX_MODEL", default_value = "english", global = true)]
    model_flavor: String,

    /// Default output sample rate
    #[arg(long, env = "CHATTERVC_SAMPLE_RATE", default_value_t = 24000, global = true)]
    sample_rate: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Time repeated synthesis requests after one warmup run
    Bench {
        /// Number of timed runs
        #[arg(short, long, default_value = "5")]
        n: usize,

        /// Text to synthesize
        #[arg(short, long, default_value = "Hello world")]
        text: String,

        /// Voice reference (name, voices/<name> or random)
        #[arg(short, long, default_value = "random")]
        voice: String,

        /// Model id
        #[arg(short, long, default_value = "chatterbox_rvc")]
        model: String,

        /// Output format
        #[arg(short, long, default_value = "wav")]
        format: String,

        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// List installed voices
    Voices,

    /// Synthesize text to an audio file
    Synth {
        /// Input text or file path (use @file.txt for file input)
        input: String,

        /// Output file path; the extension picks the format unless --format is given
        #[arg(short, long)]
        output: PathBuf,

        /// Voice reference (name, voices/<name> or random)
        #[arg(short, long, default_value = "random")]
        voice: String,

        /// Model id
        #[arg(short, long, default_value = "chatterbox")]
        model: String,

        /// Output format (wav, flac or ogg)
        #[arg(short, long)]
        format: Option<String>,

        /// Language id
        #[arg(long, default_value = "en")]
        lang: String,

        /// Conversion pitch shift in semitones
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        pitch: f64,
    },

    /// Show version and configuration info
    Info,
}

impl Cli {
    fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            format: self.log_format.clone(),
        }
    }

    fn runtime_config(&self) -> Result<RuntimeConfig> {
        let config = RuntimeConfig {
            voices_root: self.voices_root.clone(),
            device: self.device.parse().context("invalid --device")?,
            model_flavor: self.model_flavor.parse().context("invalid --model-flavor")?,
            default_sample_rate: self.sample_rate,
            logging: self.logging_config(),
            ..RuntimeConfig::default()
        };
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn pipeline(config: &RuntimeConfig) -> Arc<SynthesisPipeline> {
    let factory = Arc::new(ReferenceFactory::from_config(config));
    Arc::new(SynthesisPipeline::from_config(config, factory))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    runtime::logging::init(&cli.logging_config()).context("invalid logging configuration")?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting ChatterVC CLI");

    let config = cli.runtime_config()?;

    match cli.command {
        Commands::Bench {
            n,
            text,
            voice,
            model,
            format,
            json,
        } => {
            let options = commands::bench::BenchOptions {
                n,
                text,
                voice,
                model,
                format,
                json,
            };
            let pipeline = pipeline(&config);
            let rate = config.default_sample_rate;
            tokio::task::spawn_blocking(move || commands::bench::run(&pipeline, options, rate))
                .await
                .context("benchmark task failed")?
                .context("benchmark failed")?;
        }
        Commands::Voices => {
            commands::voices::run(&pipeline(&config)).context("listing voices failed")?;
        }
        Commands::Synth {
            input,
            output,
            voice,
            model,
            format,
            lang,
            pitch,
        } => {
            let options = commands::synth::SynthOptions {
                input,
                output,
                voice,
                model,
                format,
                lang,
                pitch,
            };
            commands::synth::run(pipeline(&config), options, config.default_sample_rate)
                .await
                .context("synthesis failed")?;
        }
        Commands::Info => {
            commands::info::run(&config);
        }
    }

    Ok(())
}

//! Info command implementation.

use vc_core::{ModelKind, RuntimeConfig};

/// Run the info command.
pub fn run(config: &RuntimeConfig) {
    println!("ChatterVC");
    println!("=========");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("  Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    println!();
    println!("Configuration:");
    println!("  Voices root:   {}", config.voices_root.display());
    println!("  Device:        {}", config.device);
    println!("  Model flavour: {}", config.model_flavor);
    println!("  Sample rate:   {} Hz", config.default_sample_rate);
    println!();
    println!("Models:");
    for model in ModelKind::ALL {
        let passes = if model.wants_conversion() {
            "synthesis + voice conversion"
        } else {
            "synthesis"
        };
        println!("  {:<16} {}", model.id(), passes);
    }
    println!();
    println!("Output formats: wav, flac, ogg");
}

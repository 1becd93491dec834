//! Voices command implementation.

use anyhow::Result;

use runtime::SynthesisPipeline;

/// Print every installed voice.
pub fn run(pipeline: &SynthesisPipeline) -> Result<()> {
    let registry = pipeline.registry();
    let voices = registry.list()?;

    println!("Voices root: {}", registry.root().display());
    if voices.is_empty() {
        println!("No voices installed.");
        return Ok(());
    }

    println!();
    println!("{:<24} {:<10} {:<8} PROMPT", "NAME", "CONVERSION", "INDEX");
    for voice in voices.iter() {
        println!(
            "{:<24} {:<10} {:<8} {}",
            voice.name(),
            if voice.has_conversion() { "yes" } else { "no" },
            if voice.conversion_index().is_some() { "yes" } else { "no" },
            voice.prompt_asset().display()
        );
    }
    println!();
    println!("{} voice(s); use `random` to pick one per request.", voices.len());
    Ok(())
}

//! Synthesis command implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::info;

use runtime::SynthesisPipeline;
use vc_core::{SpeechOptions, SynthesisResult};

/// Options for the synth command.
#[derive(Debug, Clone)]
pub struct SynthOptions {
    pub input: String,
    pub output: PathBuf,
    pub voice: String,
    pub model: String,
    pub format: Option<String>,
    pub lang: String,
    pub pitch: f64,
}

/// Format named by the output file's extension, if any.
fn format_from_path(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Run the synthesis command.
pub async fn run(
    pipeline: Arc<SynthesisPipeline>,
    options: SynthOptions,
    default_rate: u32,
) -> Result<SynthesisResult> {
    let start = Instant::now();

    // Get input text
    let text = if let Some(path) = options.input.strip_prefix('@') {
        info!(path = path, "Reading text from file");
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?
    } else {
        options.input.clone()
    };

    let format = options
        .format
        .clone()
        .or_else(|| format_from_path(&options.output))
        .unwrap_or_else(|| "wav".to_string());

    let request = SpeechOptions::new(&options.model, text, &options.voice)
        .with_format(format)
        .with_language(&options.lang)
        .with_pitch(options.pitch)
        .validate(default_rate)?;

    info!(
        chars = request.text().chars().count(),
        model = %request.model(),
        voice = %request.voice(),
        output = %options.output.display(),
        "Starting synthesis"
    );

    let synth_start = Instant::now();
    let result = pipeline.synthesize_async(request).await?;
    let synth_duration = synth_start.elapsed();

    std::fs::write(&options.output, &result.bytes)
        .with_context(|| format!("failed to write {}", options.output.display()))?;

    println!("Synthesis complete!");
    println!();
    println!("Voice:       {}", result.voice);
    println!("Model:       {}", result.model);
    println!(
        "Conversion:  {}",
        if result.conversion_applied { "applied" } else { "not applied" }
    );
    println!("Output:      {}", options.output.display());
    println!("Format:      {}", result.format.extension());
    println!(
        "Sample rate: {} Hz (source {} Hz)",
        result.sample_rate, result.source_sample_rate
    );
    println!("Size:        {} bytes", result.bytes.len());
    println!();
    println!("Performance:");
    println!("  Synthesis: {} ms", synth_duration.as_millis());
    println!("  Total:     {} ms", start.elapsed().as_millis());

    info!(output = %options.output.display(), bytes = result.bytes.len(), "Synthesis saved to file");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{pipeline, voices_root};
    use vc_core::OutputFormat;

    fn options(output: PathBuf) -> SynthOptions {
        SynthOptions {
            input: "Testing one two.".into(),
            output,
            voice: "voices/solo".into(),
            model: "chatterbox_rvc".into(),
            format: None,
            lang: "en".into(),
            pitch: -3.0,
        }
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(format_from_path(Path::new("a/b.FLAC")).as_deref(), Some("flac"));
        assert_eq!(format_from_path(Path::new("noext")), None);
    }

    #[tokio::test]
    async fn test_synth_writes_file_in_extension_format() {
        let dir = voices_root();
        let output = dir.path().join("out.flac");

        let result = run(pipeline(dir.path()), options(output.clone()), 24000)
            .await
            .unwrap();

        assert_eq!(result.format, OutputFormat::Flac);
        assert!(result.conversion_applied);
        let written = std::fs::read(&output).unwrap();
        assert_eq!(&written[..4], b"fLaC");
    }

    #[tokio::test]
    async fn test_synth_reads_text_from_file() {
        let dir = voices_root();
        let text_file = dir.path().join("input.txt");
        std::fs::write(&text_file, "Read from a file.").unwrap();

        let mut opts = options(dir.path().join("out.wav"));
        opts.input = format!("@{}", text_file.display());
        opts.model = "chatterbox".into();

        let result = run(pipeline(dir.path()), opts, 24000).await.unwrap();
        assert!(!result.conversion_applied);
        assert_eq!(result.format, OutputFormat::Wav);
    }

    #[tokio::test]
    async fn test_synth_rejects_mp3() {
        let dir = voices_root();
        let opts = options(dir.path().join("out.mp3"));
        assert!(run(pipeline(dir.path()), opts, 24000).await.is_err());
    }
}

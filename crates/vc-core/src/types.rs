//! Core data types for the synthesis pipeline.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VcError;

/// Prefix accepted in front of a voice name (`voices/<name>`).
pub const VOICE_ID_PREFIX: &str = "voices/";

/// Sentinel voice reference that picks an installed voice at random.
pub const RANDOM_VOICE: &str = "random";

/// Which passes a request runs. Mirrors the model ids exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    /// Speech synthesis only (`chatterbox`).
    #[serde(rename = "chatterbox")]
    SynthesisOnly,
    /// Speech synthesis followed by voice conversion (`chatterbox_rvc`).
    #[serde(rename = "chatterbox_rvc")]
    SynthesisWithConversion,
}

impl ModelKind {
    /// All model kinds, in the order they are advertised.
    pub const ALL: [ModelKind; 2] = [ModelKind::SynthesisOnly, ModelKind::SynthesisWithConversion];

    /// Client-facing model identifier.
    pub fn id(self) -> &'static str {
        match self {
            ModelKind::SynthesisOnly => "chatterbox",
            ModelKind::SynthesisWithConversion => "chatterbox_rvc",
        }
    }

    /// Whether this model asks for the conversion pass.
    pub fn wants_conversion(self) -> bool {
        matches!(self, ModelKind::SynthesisWithConversion)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ModelKind {
    type Err = VcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim().to_ascii_lowercase();
        ModelKind::ALL
            .into_iter()
            .find(|kind| kind.id() == id)
            .ok_or_else(|| {
                VcError::validation(format!(
                    "unknown model '{s}', expected one of: chatterbox, chatterbox_rvc"
                ))
            })
    }
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// RIFF/WAVE, 16-bit PCM.
    #[default]
    Wav,
    /// FLAC, 16-bit.
    Flac,
    /// Ogg Vorbis.
    Ogg,
}

impl OutputFormat {
    /// MIME type sent as `Content-Type`.
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Wav => "audio/wav",
            OutputFormat::Flac => "audio/flac",
            OutputFormat::Ogg => "audio/ogg",
        }
    }

    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Wav => "wav",
            OutputFormat::Flac => "flac",
            OutputFormat::Ogg => "ogg",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = VcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wav" => Ok(OutputFormat::Wav),
            "flac" => Ok(OutputFormat::Flac),
            "ogg" => Ok(OutputFormat::Ogg),
            "mp3" => Err(VcError::validation(
                "format 'mp3' is not supported, use wav|flac|ogg",
            )),
            _ => Err(VcError::validation(format!(
                "unsupported format '{s}', use wav|flac|ogg"
            ))),
        }
    }
}

/// An installed voice: a folder under the voices root holding a prompt asset
/// and, optionally, conversion assets.
///
/// Only the registry scan constructs these, and a record always carries a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceRecord {
    name: String,
    prompt_asset: PathBuf,
    conversion_model: Option<PathBuf>,
    conversion_index: Option<PathBuf>,
}

impl VoiceRecord {
    /// Create a voice with a prompt asset and no conversion assets.
    pub fn new(name: impl Into<String>, prompt_asset: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            prompt_asset: prompt_asset.into(),
            conversion_model: None,
            conversion_index: None,
        }
    }

    /// Attach conversion assets.
    pub fn with_conversion(mut self, model: impl Into<PathBuf>, index: Option<PathBuf>) -> Self {
        self.conversion_model = Some(model.into());
        self.conversion_index = index;
        self
    }

    /// Voice identity (folder name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Client-facing id, `voices/<name>`.
    pub fn id(&self) -> String {
        format!("{VOICE_ID_PREFIX}{}", self.name)
    }

    /// Reference audio used to condition synthesis.
    pub fn prompt_asset(&self) -> &Path {
        &self.prompt_asset
    }

    /// Conversion model weights, if the voice has them.
    pub fn conversion_model(&self) -> Option<&Path> {
        self.conversion_model.as_deref()
    }

    /// Conversion feature index, if the voice has one.
    pub fn conversion_index(&self) -> Option<&Path> {
        self.conversion_index.as_deref()
    }

    /// Whether a conversion engine can be built for this voice.
    pub fn has_conversion(&self) -> bool {
        self.conversion_model.is_some()
    }
}

/// A parsed client voice reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VoiceRef {
    /// A specific voice by (case-insensitive) name.
    ByName(String),
    /// Any installed voice, chosen uniformly at random.
    Random,
}

impl VoiceRef {
    /// Parse `my_voice`, `voices/my_voice` or `random`.
    pub fn parse(input: &str) -> Result<Self, VcError> {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case(RANDOM_VOICE) {
            return Ok(VoiceRef::Random);
        }

        let name = match trimmed.get(..VOICE_ID_PREFIX.len()) {
            Some(head) if head.eq_ignore_ascii_case(VOICE_ID_PREFIX) => {
                &trimmed[VOICE_ID_PREFIX.len()..]
            }
            _ => trimmed,
        };

        if name.is_empty() {
            return Err(VcError::validation("field 'voice' is empty"));
        }

        Ok(VoiceRef::ByName(name.to_string()))
    }
}

impl FromStr for VoiceRef {
    type Err = VcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VoiceRef::parse(s)
    }
}

impl fmt::Display for VoiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceRef::ByName(name) => f.write_str(name),
            VoiceRef::Random => f.write_str(RANDOM_VOICE),
        }
    }
}

/// Raw mono waveform produced by an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// PCM samples (f32, mono, nominally in [-1, 1]).
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a new buffer.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Number of sample frames.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Knobs passed to the synthesis engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisParams {
    /// Language id (honoured by the multilingual model).
    pub language_id: String,
    /// Classifier-free guidance weight, in [0, 1].
    pub cfg_weight: f32,
    /// Expressiveness, in [0, 1].
    pub exaggeration: f32,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            language_id: "en".to_string(),
            cfg_weight: 0.5,
            exaggeration: 0.5,
        }
    }
}

/// Pitch extraction algorithm requested from the conversion engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum F0Method {
    #[default]
    Rmvpe,
    Crepe,
    CrepeTiny,
    Fcpe,
    Harvest,
    Pm,
}

impl F0Method {
    /// Identifier as accepted on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            F0Method::Rmvpe => "rmvpe",
            F0Method::Crepe => "crepe",
            F0Method::CrepeTiny => "crepe-tiny",
            F0Method::Fcpe => "fcpe",
            F0Method::Harvest => "harvest",
            F0Method::Pm => "pm",
        }
    }
}

impl fmt::Display for F0Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for F0Method {
    type Err = VcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rmvpe" => Ok(F0Method::Rmvpe),
            "crepe" => Ok(F0Method::Crepe),
            "crepe-tiny" | "crepe_tiny" => Ok(F0Method::CrepeTiny),
            "fcpe" => Ok(F0Method::Fcpe),
            "harvest" => Ok(F0Method::Harvest),
            "pm" => Ok(F0Method::Pm),
            _ => Err(VcError::validation(format!(
                "unknown rvc_f0_method '{s}', expected one of: rmvpe, crepe, crepe-tiny, fcpe, harvest, pm"
            ))),
        }
    }
}

/// Knobs passed to the conversion engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionParams {
    /// Pitch shift in semitones.
    pub pitch: i32,
    /// Feature index influence, in [0, 1].
    pub index_rate: f32,
    /// Protection of voiceless consonants, in [0, 0.5].
    pub protect: f32,
    /// Pitch extraction algorithm.
    pub f0_method: F0Method,
    /// Loudness envelope mix, in [0, 1].
    pub volume_envelope: f32,
    /// Process the input in segments.
    pub split_audio: bool,
    /// Snap pitch to whole semitones.
    pub f0_autotune: bool,
    /// Gate residual noise after conversion.
    pub clean_audio: bool,
    /// Speaker id inside the conversion model.
    pub speaker_id: u32,
}

impl Default for ConversionParams {
    fn default() -> Self {
        Self {
            pitch: 0,
            index_rate: 0.75,
            protect: 0.33,
            f0_method: F0Method::Rmvpe,
            volume_envelope: 1.0,
            split_audio: false,
            f0_autotune: false,
            clean_audio: false,
            speaker_id: 0,
        }
    }
}

/// Encoded audio plus the metadata the transport reports.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    /// Encoded container bytes.
    pub bytes: Vec<u8>,
    /// Container format of `bytes`.
    pub format: OutputFormat,
    /// Whether the conversion pass was applied.
    pub conversion_applied: bool,
    /// Sample rate of the encoded audio.
    pub sample_rate: u32,
    /// Rate of the audio handed to post-processing: the converted buffer's
    /// rate when conversion applied, the synthesis engine's otherwise.
    pub source_sample_rate: u32,
    /// Name of the resolved voice.
    pub voice: String,
    /// Model that served the request.
    pub model: ModelKind,
}

//! Speech request body and its validation into an immutable [`SynthesisRequest`].
//!
//! Ratio knobs outside their interval are rejected. Numeric knobs with a
//! natural range (`sample_rate`, `rvc_pitch`) are clamped. Identifiers
//! (model, voice, f0 method, language) are never clamped.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};
use crate::error::{VcError, VcResult};
use crate::types::{
    ConversionParams, F0Method, ModelKind, OutputFormat, SynthesisParams, VoiceRef,
};

/// Longest accepted input, in characters.
pub const MAX_INPUT_CHARS: usize = 10_000;

/// Pitch shift bounds in semitones.
pub const MAX_PITCH_SHIFT: i32 = 24;

/// Body of `POST /v1/audio/speech`, as sent by the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechOptions {
    pub model: String,
    pub input: String,
    pub voice: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub sample_rate: Option<i64>,

    #[serde(default)]
    pub language_id: Option<String>,
    #[serde(default)]
    pub cfg_weight: Option<f32>,
    #[serde(default)]
    pub exaggeration: Option<f32>,

    #[serde(default)]
    pub rvc_pitch: Option<f64>,
    #[serde(default)]
    pub rvc_index_rate: Option<f32>,
    #[serde(default)]
    pub rvc_protect: Option<f32>,
    #[serde(default)]
    pub rvc_f0_method: Option<String>,
    #[serde(default)]
    pub rvc_volume_envelope: Option<f32>,
    #[serde(default)]
    pub rvc_split_audio: Option<bool>,
    #[serde(default)]
    pub rvc_f0_autotune: Option<bool>,
    #[serde(default)]
    pub rvc_clean_audio: Option<bool>,
    #[serde(default)]
    pub rvc_sid: Option<i64>,
}

impl SpeechOptions {
    /// Options with the three required fields set and every knob defaulted.
    pub fn new(
        model: impl Into<String>,
        input: impl Into<String>,
        voice: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            input: input.into(),
            voice: voice.into(),
            ..Self::default()
        }
    }

    /// Set the output format.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Set the output sample rate.
    pub fn with_sample_rate(mut self, sample_rate: i64) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Set the language id.
    pub fn with_language(mut self, language_id: impl Into<String>) -> Self {
        self.language_id = Some(language_id.into());
        self
    }

    /// Set the conversion pitch shift.
    pub fn with_pitch(mut self, semitones: f64) -> Self {
        self.rvc_pitch = Some(semitones);
        self
    }

    /// Validate the body. `default_rate` applies when no sample rate is given.
    pub fn validate(self, default_rate: u32) -> VcResult<SynthesisRequest> {
        let text = validate_text(&self.input)?;

        if self.model.trim().is_empty() {
            return Err(VcError::validation("field 'model' is required"));
        }
        let model: ModelKind = self.model.parse()?;

        if self.voice.trim().is_empty() {
            return Err(VcError::validation("field 'voice' is required"));
        }
        let voice = VoiceRef::parse(&self.voice)?;

        let format = match self.format.as_deref() {
            Some(f) => f.parse()?,
            None => OutputFormat::default(),
        };

        let sample_rate = match self.sample_rate {
            Some(rate) => clamp_sample_rate(rate)?,
            None => default_rate,
        };

        let defaults = SynthesisParams::default();
        let language_id = match self.language_id {
            Some(lang) => validate_language(&lang)?,
            None => defaults.language_id,
        };
        let synthesis = SynthesisParams {
            language_id,
            cfg_weight: unit_ratio("cfg_weight", self.cfg_weight, defaults.cfg_weight, 1.0)?,
            exaggeration: unit_ratio(
                "exaggeration",
                self.exaggeration,
                defaults.exaggeration,
                1.0,
            )?,
        };

        let defaults = ConversionParams::default();
        let pitch = match self.rvc_pitch {
            Some(p) if !p.is_finite() => {
                return Err(VcError::validation("rvc_pitch must be a finite number"));
            }
            Some(p) => (p.round() as i64).clamp(-MAX_PITCH_SHIFT as i64, MAX_PITCH_SHIFT as i64)
                as i32,
            None => defaults.pitch,
        };
        let f0_method = match self.rvc_f0_method.as_deref() {
            Some(m) => m.parse::<F0Method>()?,
            None => defaults.f0_method,
        };
        let speaker_id = match self.rvc_sid {
            Some(sid) if sid < 0 => {
                return Err(VcError::validation("rvc_sid must be non-negative"));
            }
            Some(sid) => u32::try_from(sid)
                .map_err(|_| VcError::validation("rvc_sid is out of range"))?,
            None => defaults.speaker_id,
        };
        let conversion = ConversionParams {
            pitch,
            index_rate: unit_ratio("rvc_index_rate", self.rvc_index_rate, defaults.index_rate, 1.0)?,
            protect: unit_ratio("rvc_protect", self.rvc_protect, defaults.protect, 0.5)?,
            f0_method,
            volume_envelope: unit_ratio(
                "rvc_volume_envelope",
                self.rvc_volume_envelope,
                defaults.volume_envelope,
                1.0,
            )?,
            split_audio: self.rvc_split_audio.unwrap_or(defaults.split_audio),
            f0_autotune: self.rvc_f0_autotune.unwrap_or(defaults.f0_autotune),
            clean_audio: self.rvc_clean_audio.unwrap_or(defaults.clean_audio),
            speaker_id,
        };

        Ok(SynthesisRequest {
            id: Uuid::new_v4(),
            text,
            model,
            voice,
            format,
            sample_rate,
            synthesis,
            conversion,
        })
    }
}

fn validate_text(input: &str) -> VcResult<String> {
    let text = input.trim();
    if text.is_empty() {
        return Err(VcError::validation("field 'input' is empty"));
    }
    let chars = text.chars().count();
    if chars > MAX_INPUT_CHARS {
        return Err(VcError::validation(format!(
            "field 'input' is too long ({chars} chars, max {MAX_INPUT_CHARS})"
        )));
    }
    Ok(text.to_string())
}

fn validate_language(lang: &str) -> VcResult<String> {
    let lang = lang.trim();
    let well_formed = (2..=8).contains(&lang.len())
        && lang.bytes().all(|b| b.is_ascii_lowercase() || b == b'-');
    if !well_formed {
        return Err(VcError::validation(format!("invalid language_id '{lang}'")));
    }
    Ok(lang.to_string())
}

fn clamp_sample_rate(rate: i64) -> VcResult<u32> {
    if rate <= 0 {
        return Err(VcError::validation("sample_rate must be positive"));
    }
    Ok(rate.clamp(MIN_SAMPLE_RATE as i64, MAX_SAMPLE_RATE as i64) as u32)
}

fn unit_ratio(field: &str, value: Option<f32>, default: f32, max: f32) -> VcResult<f32> {
    let Some(value) = value else {
        return Ok(default);
    };
    if !value.is_finite() {
        return Err(VcError::validation(format!("{field} must be a finite number")));
    }
    if !(0.0..=max).contains(&value) {
        return Err(VcError::validation(format!(
            "{field} must be within [0, {max}], got {value}"
        )));
    }
    Ok(value)
}

/// A validated request. Constructed once per call and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    id: Uuid,
    text: String,
    model: ModelKind,
    voice: VoiceRef,
    format: OutputFormat,
    sample_rate: u32,
    synthesis: SynthesisParams,
    conversion: ConversionParams,
}

impl SynthesisRequest {
    /// Request id, used as the tracing span key.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn model(&self) -> ModelKind {
        self.model
    }

    pub fn voice(&self) -> &VoiceRef {
        &self.voice
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Requested output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn synthesis(&self) -> &SynthesisParams {
        &self.synthesis
    }

    pub fn conversion(&self) -> &ConversionParams {
        &self.conversion
    }

    /// Copy of this request with different text, validated the same way.
    pub fn with_text(&self, text: &str) -> VcResult<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            text: validate_text(text)?,
            ..self.clone()
        })
    }

    /// Copy of this request pinned to another voice.
    pub fn with_voice(&self, voice: VoiceRef) -> Self {
        Self {
            id: Uuid::new_v4(),
            voice,
            ..self.clone()
        }
    }
}

//! Reference engines: deterministic signal-processing stand-ins for the
//! neural models, so the service runs and can be tested without weights.

use std::collections::HashMap;
use std::f32::consts::TAU;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use vc_core::{
    AudioBuffer, ConversionEngine, ConversionParams, DeviceType, EngineFactory, F0Method,
    ModelFlavor, RuntimeConfig, SynthesisEngine, SynthesisParams, VcError, VcResult, VoiceRecord,
};

use super::dsp;

/// Native rate of the reference synthesizer.
pub const REFERENCE_SAMPLE_RATE: u32 = 24000;

const DEFAULT_PITCH_HZ: f32 = 140.0;
const MIN_PITCH_HZ: f32 = 70.0;
const MAX_PITCH_HZ: f32 = 400.0;
const WORD_GAP_SECS: f32 = 0.05;
const PUNCT_PAUSE_SECS: f32 = 0.15;
const PEAK_CEILING: f32 = 0.95;

/// Builds the reference engines.
#[derive(Debug, Clone)]
pub struct ReferenceFactory {
    device: DeviceType,
    flavor: ModelFlavor,
}

impl ReferenceFactory {
    pub fn new(device: DeviceType, flavor: ModelFlavor) -> Self {
        Self { device, flavor }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.device, config.model_flavor)
    }

    fn check_device(&self, engine: &str) -> VcResult<()> {
        match self.device {
            DeviceType::Cpu => Ok(()),
            DeviceType::Cuda => Err(VcError::resource_load(
                engine,
                "reference engines run on cpu only",
            )),
        }
    }
}

impl EngineFactory for ReferenceFactory {
    fn load_synthesis(&self) -> VcResult<Box<dyn SynthesisEngine>> {
        self.check_device("synthesis engine")?;
        Ok(Box::new(ReferenceSynthesizer::new(self.flavor)))
    }

    fn load_conversion(&self, voice: &VoiceRecord) -> VcResult<Box<dyn ConversionEngine>> {
        self.check_device(&format!("conversion engine '{}'", voice.name()))?;
        Ok(Box::new(ReferenceConverter::load(voice)?))
    }
}

/// Pitch and level learned from a voice prompt.
#[derive(Debug, Clone, Copy, PartialEq)]
struct VoiceProfile {
    pitch_hz: f32,
    level: f32,
}

/// Renders one voiced tone per word, pitched and levelled after the prompt.
#[derive(Debug)]
pub struct ReferenceSynthesizer {
    flavor: ModelFlavor,
    profiles: HashMap<PathBuf, VoiceProfile>,
}

impl ReferenceSynthesizer {
    pub fn new(flavor: ModelFlavor) -> Self {
        Self {
            flavor,
            profiles: HashMap::new(),
        }
    }

    fn profile(&mut self, prompt: &Path) -> VcResult<VoiceProfile> {
        if let Some(profile) = self.profiles.get(prompt) {
            return Ok(*profile);
        }

        let audio = audio_post::decode_file(prompt).map_err(|e| {
            VcError::synthesis(format!("cannot read prompt {}: {e}", prompt.display()))
        })?;
        let pitch_hz = dsp::estimate_pitch(&audio.samples, audio.sample_rate, MIN_PITCH_HZ, MAX_PITCH_HZ)
            .unwrap_or(DEFAULT_PITCH_HZ);
        let level = dsp::rms(&audio.samples).clamp(0.05, 0.3);

        let profile = VoiceProfile { pitch_hz, level };
        debug!(prompt = %prompt.display(), pitch_hz, level, "voice profile");
        self.profiles.insert(prompt.to_path_buf(), profile);
        Ok(profile)
    }

    fn render_word(
        out: &mut Vec<f32>,
        word: &str,
        index: usize,
        profile: VoiceProfile,
        params: &SynthesisParams,
        amplitude: f32,
    ) {
        let rate = REFERENCE_SAMPLE_RATE as f32;
        let letters = word.chars().filter(|c| c.is_alphanumeric()).count().max(1);
        let secs = (0.06 * letters as f32 + 0.04).clamp(0.12, 0.6);
        let n = (secs * rate) as usize;

        // Word-level intonation plus a rise-fall inside the word, both scaled by exaggeration.
        let base = profile.pitch_hz * (1.0 + 0.08 * params.exaggeration * (index as f32 * 1.3).sin());
        let mut phase = 0.0f32;
        let mut word_samples = Vec::with_capacity(n);
        for i in 0..n {
            let t = i as f32 / n as f32;
            let f0 = base * (1.0 + 0.15 * params.exaggeration * (std::f32::consts::PI * t).sin());
            phase = (phase + TAU * f0 / rate) % TAU;
            let voiced: f32 = (1..=4).map(|h| (phase * h as f32).sin() / h as f32).sum();
            word_samples.push(voiced * amplitude);
        }
        dsp::apply_fades(&mut word_samples, (0.015 * rate) as usize);
        out.extend(word_samples);

        let mut gap = WORD_GAP_SECS;
        if word.ends_with(['.', ',', '!', '?', ';', ':']) {
            gap += PUNCT_PAUSE_SECS;
        }
        out.extend(std::iter::repeat_n(0.0, (gap * rate) as usize));
    }
}

impl SynthesisEngine for ReferenceSynthesizer {
    fn native_sample_rate(&self) -> u32 {
        REFERENCE_SAMPLE_RATE
    }

    fn synthesize(
        &mut self,
        text: &str,
        params: &SynthesisParams,
        prompt: &Path,
    ) -> VcResult<AudioBuffer> {
        if self.flavor == ModelFlavor::English && params.language_id != "en" {
            return Err(VcError::synthesis(format!(
                "language '{}' needs the multilingual model",
                params.language_id
            )));
        }

        let profile = self.profile(prompt)?;
        let amplitude =
            0.5 * (0.6 + 0.4 * params.cfg_weight) * (profile.level / 0.1).clamp(0.5, 1.5);

        let mut samples = Vec::new();
        for (i, word) in text.split_whitespace().enumerate() {
            Self::render_word(&mut samples, word, i, profile, params, amplitude);
        }
        if samples.is_empty() {
            return Err(VcError::synthesis("nothing to say"));
        }
        dsp::limit_peak(&mut samples, PEAK_CEILING);

        Ok(AudioBuffer::new(samples, REFERENCE_SAMPLE_RATE))
    }
}

/// Reference converter: pitch shift plus a timbre filter derived from the
/// model file.
#[derive(Debug)]
pub struct ReferenceConverter {
    voice: String,
    /// In [0, 1], from the model bytes. Sets filter brightness and detune.
    timbre: f32,
    index: Option<(PathBuf, f32)>,
}

impl ReferenceConverter {
    /// Load from the voice's model (and index, if any). An empty or
    /// unreadable model file is a load error.
    pub fn load(voice: &VoiceRecord) -> VcResult<Self> {
        let resource = format!("conversion engine '{}'", voice.name());
        let model = voice
            .conversion_model()
            .ok_or_else(|| VcError::resource_load(&resource, "voice has no conversion model"))?;

        let timbre = read_color(model).map_err(|reason| VcError::resource_load(&resource, reason))?;
        let index = match voice.conversion_index() {
            Some(path) => {
                let color =
                    read_color(path).map_err(|reason| VcError::resource_load(&resource, reason))?;
                Some((path.to_path_buf(), color))
            }
            None => None,
        };

        Ok(Self {
            voice: voice.name().to_string(),
            timbre,
            index,
        })
    }

    fn index_color(&self, index: &Path) -> VcResult<f32> {
        match &self.index {
            Some((path, color)) if path == index => Ok(*color),
            _ => read_color(index).map_err(VcError::conversion),
        }
    }

    fn grain(method: F0Method) -> usize {
        match method {
            F0Method::CrepeTiny | F0Method::Pm => 512,
            F0Method::Rmvpe | F0Method::Crepe | F0Method::Fcpe => 1024,
            F0Method::Harvest => 2048,
        }
    }

    fn convert_segment(
        &self,
        segment: &[f32],
        semitones: f32,
        params: &ConversionParams,
        index_color: Option<f32>,
    ) -> Vec<f32> {
        let shifted = dsp::pitch_shift(segment, semitones, Self::grain(params.f0_method));
        let toned = dsp::one_pole_lowpass(&shifted, 0.3 + 0.7 * self.timbre);

        match index_color {
            Some(color) => {
                let guided = dsp::one_pole_lowpass(&toned, 0.2 + 0.8 * color);
                toned
                    .iter()
                    .zip(&guided)
                    .map(|(t, g)| t + (g - t) * params.index_rate)
                    .collect()
            }
            None => toned,
        }
    }
}

/// Mean byte value of a file, in [0, 1].
fn read_color(path: &Path) -> Result<f32, String> {
    let bytes = fs::read(path).map_err(|e| format!("{}: {e}", path.display()))?;
    if bytes.is_empty() {
        return Err(format!("{} is empty", path.display()));
    }
    let sum: u64 = bytes.iter().map(|&b| u64::from(b)).sum();
    Ok(sum as f32 / bytes.len() as f32 / 255.0)
}

impl ConversionEngine for ReferenceConverter {
    fn convert(
        &mut self,
        audio: &AudioBuffer,
        params: &ConversionParams,
        index: Option<&Path>,
    ) -> VcResult<AudioBuffer> {
        if params.speaker_id > 0 {
            return Err(VcError::conversion(format!(
                "speaker id {} out of range for '{}' (1 speaker)",
                params.speaker_id, self.voice
            )));
        }
        if audio.is_empty() {
            return Err(VcError::conversion("empty input"));
        }

        let index_color = index.map(|path| self.index_color(path)).transpose()?;

        let detune = (self.timbre - 0.5) * 2.0;
        let mut semitones = params.pitch as f32 + detune;
        if params.f0_autotune {
            semitones = semitones.round();
        }

        let rate = audio.sample_rate as usize;
        let segment_len = if params.split_audio { rate.max(1) } else { audio.len() };
        let mut out: Vec<f32> = audio
            .samples
            .chunks(segment_len)
            .flat_map(|seg| self.convert_segment(seg, semitones, params, index_color))
            .collect();

        for (o, &src) in out.iter_mut().zip(&audio.samples) {
            if src.abs() < 0.02 {
                *o += (src - *o) * (params.protect * 2.0);
            }
        }

        let window = (rate / 50).max(1);
        dsp::match_envelope(&mut out, &audio.samples, window, params.volume_envelope);
        if params.clean_audio {
            dsp::noise_gate(&mut out, window, 0.01);
        }
        dsp::limit_peak(&mut out, PEAK_CEILING);

        Ok(AudioBuffer::new(out, audio.sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    fn write_prompt(path: &Path, freq: f32) {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for i in 0..16000 {
            let s = (TAU * freq * i as f32 / 16000.0).sin() * 0.3;
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn voice_with_model(dir: &Path, model: &[u8]) -> VoiceRecord {
        let prompt = dir.join("prompt.wav");
        write_prompt(&prompt, 180.0);
        let pth = dir.join("v.pth");
        fs::write(&pth, model).unwrap();
        VoiceRecord::new("v", prompt).with_conversion(pth, None)
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let prompt = dir.path().join("p.wav");
        write_prompt(&prompt, 180.0);

        let mut engine = ReferenceSynthesizer::new(ModelFlavor::English);
        let params = SynthesisParams::default();
        let a = engine.synthesize("Hello world.", &params, &prompt).unwrap();
        let b = engine.synthesize("Hello world.", &params, &prompt).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.sample_rate, REFERENCE_SAMPLE_RATE);
        assert!(a.samples.iter().all(|s| s.abs() <= PEAK_CEILING + 1e-6));
    }

    #[test]
    fn test_longer_text_is_longer() {
        let dir = tempfile::tempdir().unwrap();
        let prompt = dir.path().join("p.wav");
        write_prompt(&prompt, 180.0);

        let mut engine = ReferenceSynthesizer::new(ModelFlavor::English);
        let params = SynthesisParams::default();
        let short = engine.synthesize("Hi", &params, &prompt).unwrap();
        let long = engine
            .synthesize("Hi there, this is a longer sentence.", &params, &prompt)
            .unwrap();
        assert!(long.len() > short.len() * 3);
    }

    #[test]
    fn test_english_flavor_rejects_other_languages() {
        let dir = tempfile::tempdir().unwrap();
        let prompt = dir.path().join("p.wav");
        write_prompt(&prompt, 180.0);

        let params = SynthesisParams {
            language_id: "fr".into(),
            ..SynthesisParams::default()
        };
        let mut english = ReferenceSynthesizer::new(ModelFlavor::English);
        assert!(matches!(
            english.synthesize("Bonjour", &params, &prompt),
            Err(VcError::Synthesis(_))
        ));

        let mut multi = ReferenceSynthesizer::new(ModelFlavor::Multilingual);
        assert!(multi.synthesize("Bonjour", &params, &prompt).is_ok());
    }

    #[test]
    fn test_unreadable_prompt_is_synthesis_error() {
        let mut engine = ReferenceSynthesizer::new(ModelFlavor::English);
        let err = engine
            .synthesize("Hi", &SynthesisParams::default(), Path::new("/missing/p.wav"))
            .unwrap_err();
        assert!(matches!(err, VcError::Synthesis(_)));
    }

    #[test]
    fn test_empty_model_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let voice = voice_with_model(dir.path(), b"");
        let err = ReferenceConverter::load(&voice).unwrap_err();
        assert!(matches!(err, VcError::ResourceLoad { .. }));
    }

    #[test]
    fn test_cuda_device_fails_to_load() {
        let factory = ReferenceFactory::new(DeviceType::Cuda, ModelFlavor::English);
        assert!(matches!(
            factory.load_synthesis(),
            Err(VcError::ResourceLoad { .. })
        ));
    }

    #[test]
    fn test_conversion_keeps_length_and_rate() {
        let dir = tempfile::tempdir().unwrap();
        let voice = voice_with_model(dir.path(), &[128u8; 64]);
        let mut converter = ReferenceConverter::load(&voice).unwrap();

        let mut synth = ReferenceSynthesizer::new(ModelFlavor::English);
        let audio = synth
            .synthesize("Testing conversion", &SynthesisParams::default(), voice.prompt_asset())
            .unwrap();

        for split_audio in [false, true] {
            let params = ConversionParams {
                pitch: 3,
                split_audio,
                clean_audio: true,
                ..ConversionParams::default()
            };
            let converted = converter.convert(&audio, &params, None).unwrap();
            assert_eq!(converted.len(), audio.len());
            assert_eq!(converted.sample_rate, audio.sample_rate);
            assert_ne!(converted.samples, audio.samples);
        }
    }

    #[test]
    fn test_speaker_id_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let voice = voice_with_model(dir.path(), &[1u8; 8]);
        let mut converter = ReferenceConverter::load(&voice).unwrap();
        let params = ConversionParams {
            speaker_id: 1,
            ..ConversionParams::default()
        };
        let audio = AudioBuffer::new(vec![0.1; 100], 24000);
        assert!(matches!(
            converter.convert(&audio, &params, None),
            Err(VcError::Conversion(_))
        ));
    }

    #[test]
    fn test_missing_index_is_conversion_error() {
        let dir = tempfile::tempdir().unwrap();
        let voice = voice_with_model(dir.path(), &[1u8; 8]);
        let mut converter = ReferenceConverter::load(&voice).unwrap();
        let audio = AudioBuffer::new(vec![0.1; 100], 24000);
        let err = converter
            .convert(&audio, &ConversionParams::default(), Some(Path::new("/missing.index")))
            .unwrap_err();
        assert!(matches!(err, VcError::Conversion(_)));
    }
}

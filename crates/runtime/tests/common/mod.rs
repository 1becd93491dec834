//! Shared fixtures: a voices root on disk and engines that record what they do.

#![allow(dead_code)]

use std::collections::HashSet;
use std::f32::consts::TAU;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use hound::{SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;
use runtime::engines::{ReferenceConverter, ReferenceSynthesizer};
use runtime::{ResourceCache, SynthesisPipeline, VoiceRegistry};
use tempfile::TempDir;
use vc_core::{
    AudioBuffer, ConversionEngine, ConversionParams, EngineFactory, ModelFlavor, SpeechOptions,
    SynthesisEngine, SynthesisParams, SynthesisRequest, VcError, VcResult, VoiceRecord,
};

/// A conversion invocation: voice, start, end.
pub type Window = (String, Instant, Instant);

/// Everything the instrumented engines observe.
#[derive(Default)]
pub struct Recorder {
    pub synthesis_loads: AtomicUsize,
    pub conversion_loads: AtomicUsize,
    pub synthesis_calls: AtomicUsize,
    pub conversion_calls: AtomicUsize,
    pub windows: Mutex<Vec<Window>>,
    /// Start and end of every synthesis call, across all voices.
    pub synthesis_windows: Mutex<Vec<(Instant, Instant)>>,
    /// Voices whose conversion returns an error.
    pub failing: Mutex<HashSet<String>>,
    /// Voices whose conversion panics.
    pub panicking: Mutex<HashSet<String>>,
    /// Extra time spent inside each conversion call.
    pub conversion_delay: Mutex<Duration>,
    /// Extra time spent inside each synthesis call.
    pub synthesis_delay: Mutex<Duration>,
    /// Rate stamped on converted audio, when set.
    pub conversion_output_rate: Mutex<Option<u32>>,
}

impl Recorder {
    pub fn fail(&self, voice: &str) {
        self.failing.lock().insert(voice.to_string());
    }

    pub fn panic_on(&self, voice: &str) {
        self.panicking.lock().insert(voice.to_string());
    }

    pub fn set_conversion_delay(&self, delay: Duration) {
        *self.conversion_delay.lock() = delay;
    }

    pub fn set_conversion_output_rate(&self, rate: u32) {
        *self.conversion_output_rate.lock() = Some(rate);
    }

    pub fn set_synthesis_delay(&self, delay: Duration) {
        *self.synthesis_delay.lock() = delay;
    }

    pub fn synthesis_windows(&self) -> Vec<(Instant, Instant)> {
        let mut windows = self.synthesis_windows.lock().clone();
        windows.sort();
        windows
    }

    pub fn windows_for(&self, voice: &str) -> Vec<(Instant, Instant)> {
        let mut windows: Vec<_> = self
            .windows
            .lock()
            .iter()
            .filter(|(v, _, _)| v == voice)
            .map(|(_, start, end)| (*start, *end))
            .collect();
        windows.sort();
        windows
    }
}

/// Factory wrapping the reference engines with counters and fault injection.
pub struct InstrumentedFactory {
    pub recorder: Arc<Recorder>,
}

impl EngineFactory for InstrumentedFactory {
    fn load_synthesis(&self) -> VcResult<Box<dyn SynthesisEngine>> {
        self.recorder.synthesis_loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InstrumentedSynthesizer {
            inner: ReferenceSynthesizer::new(ModelFlavor::English),
            recorder: Arc::clone(&self.recorder),
        }))
    }

    fn load_conversion(&self, voice: &VoiceRecord) -> VcResult<Box<dyn ConversionEngine>> {
        self.recorder.conversion_loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InstrumentedConverter {
            voice: voice.name().to_string(),
            inner: ReferenceConverter::load(voice)?,
            recorder: Arc::clone(&self.recorder),
        }))
    }
}

struct InstrumentedSynthesizer {
    inner: ReferenceSynthesizer,
    recorder: Arc<Recorder>,
}

impl SynthesisEngine for InstrumentedSynthesizer {
    fn native_sample_rate(&self) -> u32 {
        self.inner.native_sample_rate()
    }

    fn synthesize(
        &mut self,
        text: &str,
        params: &SynthesisParams,
        prompt: &Path,
    ) -> VcResult<AudioBuffer> {
        let start = Instant::now();
        self.recorder.synthesis_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.recorder.synthesis_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let result = self.inner.synthesize(text, params, prompt);
        self.recorder
            .synthesis_windows
            .lock()
            .push((start, Instant::now()));
        result
    }
}

struct InstrumentedConverter {
    voice: String,
    inner: ReferenceConverter,
    recorder: Arc<Recorder>,
}

impl ConversionEngine for InstrumentedConverter {
    fn convert(
        &mut self,
        audio: &AudioBuffer,
        params: &ConversionParams,
        index: Option<&Path>,
    ) -> VcResult<AudioBuffer> {
        let start = Instant::now();
        self.recorder.conversion_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.recorder.conversion_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let result = if self.recorder.panicking.lock().contains(&self.voice) {
            panic!("injected panic in {}", self.voice);
        } else if self.recorder.failing.lock().contains(&self.voice) {
            Err(VcError::conversion(format!("injected failure in {}", self.voice)))
        } else {
            let rate = *self.recorder.conversion_output_rate.lock();
            self.inner
                .convert(audio, params, index)
                .map(|out| match rate {
                    Some(rate) => AudioBuffer::new(out.samples, rate),
                    None => out,
                })
        };

        self.recorder
            .windows
            .lock()
            .push((self.voice.clone(), start, Instant::now()));
        result
    }
}

/// Write a one-second 16 kHz sine prompt.
pub fn write_prompt(path: &Path, freq: f32) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
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

/// Voices root with:
/// - `plain`: prompt only
/// - `alice`: prompt + model
/// - `bob`: prompt + model + index
/// - `broken`: prompt + empty model
/// - `empty`: no prompt (must not be listed)
pub fn voices_root() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write_prompt(&root.join("plain/prompt.wav"), 150.0);

    write_prompt(&root.join("alice/ref.wav"), 210.0);
    fs::write(root.join("alice/alice.pth"), [40u8; 256]).unwrap();

    write_prompt(&root.join("bob/ref.wav"), 110.0);
    fs::write(root.join("bob/bob.pth"), [200u8; 256]).unwrap();
    fs::write(root.join("bob/added.index"), [90u8; 64]).unwrap();

    write_prompt(&root.join("broken/ref.wav"), 180.0);
    fs::write(root.join("broken/broken.pth"), b"").unwrap();

    fs::create_dir_all(root.join("empty")).unwrap();
    fs::write(root.join("empty/readme.txt"), "no prompt here").unwrap();

    dir
}

/// A pipeline over `root` with an instrumented factory.
pub fn pipeline(root: &Path) -> (Arc<SynthesisPipeline>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let factory = Arc::new(InstrumentedFactory {
        recorder: Arc::clone(&recorder),
    });
    let registry = Arc::new(VoiceRegistry::new(root, Duration::from_secs(60)));
    let cache = Arc::new(ResourceCache::new(factory));
    (Arc::new(SynthesisPipeline::new(registry, cache)), recorder)
}

/// A validated request with default knobs.
pub fn request(model: &str, voice: &str, text: &str) -> SynthesisRequest {
    SpeechOptions::new(model, text, voice).validate(24000).unwrap()
}

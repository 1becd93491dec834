//! Call contract of the compute engines.
//!
//! Engines are stateful and not safe to invoke concurrently, hence `&mut self`
//! on invocation. The resource cache owns every engine behind its own guard.

use std::path::Path;

use crate::error::VcResult;
use crate::types::{AudioBuffer, ConversionParams, SynthesisParams, VoiceRecord};

/// Turns text plus a voice prompt into a raw waveform.
pub trait SynthesisEngine: Send {
    /// Rate of every buffer this engine produces.
    fn native_sample_rate(&self) -> u32;

    /// Render `text` in the timbre of the prompt asset.
    fn synthesize(
        &mut self,
        text: &str,
        params: &SynthesisParams,
        prompt: &Path,
    ) -> VcResult<AudioBuffer>;
}

/// Re-renders a waveform in a target voice.
pub trait ConversionEngine: Send {
    /// Convert `audio`, optionally guided by a feature index.
    fn convert(
        &mut self,
        audio: &AudioBuffer,
        params: &ConversionParams,
        index: Option<&Path>,
    ) -> VcResult<AudioBuffer>;
}

/// Constructs engines. This is where real model back-ends (or test doubles)
/// plug into the runtime.
///
/// Construction may be slow; callers expect it to block.
pub trait EngineFactory: Send + Sync {
    /// Load the process-wide synthesis engine.
    fn load_synthesis(&self) -> VcResult<Box<dyn SynthesisEngine>>;

    /// Load the conversion engine for a voice that has a conversion model.
    fn load_conversion(&self, voice: &VoiceRecord) -> VcResult<Box<dyn ConversionEngine>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VcError;

    struct Silence;

    impl SynthesisEngine for Silence {
        fn native_sample_rate(&self) -> u32 {
            16000
        }

        fn synthesize(
            &mut self,
            text: &str,
            _params: &SynthesisParams,
            _prompt: &Path,
        ) -> VcResult<AudioBuffer> {
            Ok(AudioBuffer::new(vec![0.0; text.len() * 100], 16000))
        }
    }

    struct Broken;

    impl ConversionEngine for Broken {
        fn convert(
            &mut self,
            _audio: &AudioBuffer,
            _params: &ConversionParams,
            _index: Option<&Path>,
        ) -> VcResult<AudioBuffer> {
            Err(VcError::conversion("broken"))
        }
    }

    struct Factory;

    impl EngineFactory for Factory {
        fn load_synthesis(&self) -> VcResult<Box<dyn SynthesisEngine>> {
            Ok(Box::new(Silence))
        }

        fn load_conversion(&self, _voice: &VoiceRecord) -> VcResult<Box<dyn ConversionEngine>> {
            Ok(Box::new(Broken))
        }
    }

    #[test]
    fn test_engines_are_object_safe() {
        let factory: Box<dyn EngineFactory> = Box::new(Factory);
        let mut synth = factory.load_synthesis().unwrap();
        let audio = synth
            .synthesize("hi", &SynthesisParams::default(), Path::new("p.wav"))
            .unwrap();
        assert_eq!(audio.len(), 200);
        assert_eq!(synth.native_sample_rate(), 16000);

        let voice = VoiceRecord::new("a", "p.wav").with_conversion("a.pth", None);
        let mut conv = factory.load_conversion(&voice).unwrap();
        assert!(conv.convert(&audio, &ConversionParams::default(), None).is_err());
    }
}

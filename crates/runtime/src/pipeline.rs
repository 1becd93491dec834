//! Synthesis pipeline: resolve voice, synthesize, convert with fallback, encode.
//!
//! Per request: `Validated -> VoiceResolved -> SynthesisDone ->
//! ConversionAttempted{applied|fallback} -> Encoded -> Complete`. Nothing in
//! the conversion stage can fail the request.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument, warn};
use vc_core::{
    AudioBuffer, EngineFactory, RuntimeConfig, SynthesisRequest, SynthesisResult, VcError,
    VcResult, VoiceRecord,
};

use crate::cache::ResourceCache;
use crate::metrics::VcMetrics;
use crate::voices::VoiceRegistry;

/// Result of the optional conversion stage. Never an error.
#[derive(Debug, Clone)]
pub enum ConversionOutcome {
    /// Conversion ran and produced new audio.
    Applied(AudioBuffer),
    /// Conversion was not requested or the voice has no conversion model.
    Skipped(AudioBuffer),
    /// Conversion was attempted and failed; the synthesis output is kept.
    Fallback { audio: AudioBuffer, reason: String },
}

impl ConversionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ConversionOutcome::Applied(_))
    }

    /// The audio to post-process.
    pub fn into_audio(self) -> AudioBuffer {
        match self {
            ConversionOutcome::Applied(audio)
            | ConversionOutcome::Skipped(audio)
            | ConversionOutcome::Fallback { audio, .. } => audio,
        }
    }
}

/// The request-serving engine.
#[derive(Debug)]
pub struct SynthesisPipeline {
    registry: Arc<VoiceRegistry>,
    cache: Arc<ResourceCache>,
    metrics: VcMetrics,
}

impl SynthesisPipeline {
    pub fn new(registry: Arc<VoiceRegistry>, cache: Arc<ResourceCache>) -> Self {
        Self {
            registry,
            cache,
            metrics: VcMetrics::noop(),
        }
    }

    /// Build registry and cache from configuration.
    pub fn from_config(config: &RuntimeConfig, factory: Arc<dyn EngineFactory>) -> Self {
        let metrics = VcMetrics::default();
        let registry = VoiceRegistry::new(
            config.voices_root.clone(),
            std::time::Duration::from_secs(config.voice_cache_ttl_secs),
        );
        Self {
            registry: Arc::new(registry),
            cache: Arc::new(ResourceCache::with_metrics(factory, metrics)),
            metrics,
        }
    }

    pub fn registry(&self) -> &Arc<VoiceRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    /// Serve one request. Blocks on engine construction and guard acquisition.
    #[instrument(
        name = "synthesize",
        skip_all,
        fields(request_id = %request.id(), model = %request.model(), voice = %request.voice())
    )]
    pub fn synthesize(&self, request: &SynthesisRequest) -> VcResult<SynthesisResult> {
        self.metrics.request_received();
        let result = self.run(request);
        match &result {
            Ok(_) => self.metrics.request_completed(),
            Err(e) => {
                debug!(kind = e.kind(), error = %e, "request failed");
                self.metrics.request_failed(e.kind());
            }
        }
        result
    }

    /// Run [`Self::synthesize`] on the blocking pool.
    ///
    /// Dropping the returned future abandons the result, but the blocking
    /// task still runs to completion and releases its guards.
    pub async fn synthesize_async(
        self: &Arc<Self>,
        request: SynthesisRequest,
    ) -> VcResult<SynthesisResult> {
        let pipeline = Arc::clone(self);
        tokio::task::spawn_blocking(move || pipeline.synthesize(&request))
            .await
            .map_err(|e| VcError::internal(format!("synthesis task failed: {e}")))?
    }

    fn run(&self, request: &SynthesisRequest) -> VcResult<SynthesisResult> {
        let start = Instant::now();

        let voice = self.registry.resolve(request.voice())?;
        debug!(voice = voice.name(), has_conversion = voice.has_conversion(), "voice resolved");

        let audio = self.synthesize_raw(request, &voice)?;

        let outcome = self.convert(request, &voice, audio);
        let conversion_applied = outcome.is_applied();
        match &outcome {
            ConversionOutcome::Applied(_) => self.metrics.conversion_applied(),
            ConversionOutcome::Fallback { reason, .. } => {
                warn!(voice = voice.name(), reason = %reason, "conversion failed, returning unconverted audio");
                self.metrics.conversion_fallback();
            }
            ConversionOutcome::Skipped(_) => {}
        }
        let audio = outcome.into_audio();
        let duration = audio.duration_secs();
        let source_sample_rate = audio.sample_rate;

        let encode_start = Instant::now();
        let bytes = audio_post::process(&audio, request.sample_rate(), request.format())?;
        self.metrics
            .record_encode_latency(encode_start.elapsed().as_secs_f64() * 1000.0);

        let total = start.elapsed().as_secs_f64();
        self.metrics.record_total_latency(total * 1000.0);
        if duration > 0.0 {
            self.metrics.record_rtf(total / duration);
        }
        debug!(
            bytes = bytes.len(),
            audio_secs = duration,
            elapsed_ms = total * 1000.0,
            conversion_applied,
            "request complete"
        );

        Ok(SynthesisResult {
            bytes,
            format: request.format(),
            conversion_applied,
            sample_rate: request.sample_rate(),
            source_sample_rate,
            voice: voice.name().to_string(),
            model: request.model(),
        })
    }

    /// Mandatory stage. The synthesis guard is held for this call only.
    fn synthesize_raw(
        &self,
        request: &SynthesisRequest,
        voice: &VoiceRecord,
    ) -> VcResult<AudioBuffer> {
        let resource = self.cache.synthesis_engine()?;

        let start = Instant::now();
        let audio = resource
            .lock()
            .synthesize(request.text(), request.synthesis(), voice.prompt_asset())
            .map_err(|e| match e {
                VcError::Synthesis(_) => e,
                other => VcError::synthesis(other.to_string()),
            })?;
        self.metrics
            .record_synthesis_latency(start.elapsed().as_secs_f64() * 1000.0);

        if audio.is_empty() {
            return Err(VcError::synthesis("engine returned no audio"));
        }
        if audio.sample_rate == 0 {
            return Err(VcError::synthesis("engine returned audio without a sample rate"));
        }
        debug!(
            frames = audio.len(),
            sample_rate = audio.sample_rate,
            "synthesis done"
        );

        Ok(audio)
    }

    /// Optional stage. Every failure, including a panic inside the engine,
    /// becomes a fallback to `audio`.
    fn convert(
        &self,
        request: &SynthesisRequest,
        voice: &VoiceRecord,
        audio: AudioBuffer,
    ) -> ConversionOutcome {
        if !request.model().wants_conversion() || !voice.has_conversion() {
            return ConversionOutcome::Skipped(audio);
        }

        let resource = match self.cache.conversion_engine(voice) {
            Ok(Some(resource)) => resource,
            Ok(None) => return ConversionOutcome::Skipped(audio),
            Err(e) => {
                return ConversionOutcome::Fallback {
                    audio,
                    reason: e.to_string(),
                };
            }
        };

        let start = Instant::now();
        let result = {
            let mut engine = resource.lock();
            catch_unwind(AssertUnwindSafe(|| {
                engine.convert(&audio, request.conversion(), voice.conversion_index())
            }))
        };
        self.metrics
            .record_conversion_latency(start.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(Ok(converted)) if !converted.is_empty() && converted.sample_rate > 0 => {
                debug!(frames = converted.len(), "conversion applied");
                ConversionOutcome::Applied(converted)
            }
            Ok(Ok(_)) => ConversionOutcome::Fallback {
                audio,
                reason: "conversion engine returned no audio".to_string(),
            },
            Ok(Err(e)) => ConversionOutcome::Fallback {
                audio,
                reason: e.to_string(),
            },
            Err(panic) => ConversionOutcome::Fallback {
                audio,
                reason: format!("conversion engine panicked: {}", panic_message(&*panic)),
            },
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

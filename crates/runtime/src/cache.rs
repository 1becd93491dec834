//! Resource cache: lazily constructed, process-lifetime engines.
//!
//! One synthesis engine per process and one conversion engine per voice. Each
//! slot is a `OnceCell`, so concurrent first callers block on a single
//! construction, and a failed construction leaves the slot empty for the next
//! caller to retry. The presence map has its own shard locks; invocation
//! exclusivity comes from the guard inside each [`LoadedResource`].

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, MutexGuard};
use tracing::{info, warn};
use vc_core::{
    ConversionEngine, EngineFactory, SynthesisEngine, VcError, VcResult, VoiceRecord,
};

use crate::metrics::VcMetrics;

/// Key of the process-wide synthesis engine.
pub const SYNTHESIS_KEY: &str = "synthesis";

/// A cached engine plus the guard serializing its invocations.
pub struct LoadedResource<E: ?Sized> {
    key: String,
    engine: Mutex<Box<E>>,
}

impl<E: ?Sized> LoadedResource<E> {
    fn new(key: impl Into<String>, engine: Box<E>) -> Self {
        Self {
            key: key.into(),
            engine: Mutex::new(engine),
        }
    }

    /// Cache key (`synthesis` or the voice name).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Acquire exclusive use of the engine. Blocks while another caller holds it.
    pub fn lock(&self) -> MutexGuard<'_, Box<E>> {
        self.engine.lock()
    }
}

impl<E: ?Sized> std::fmt::Debug for LoadedResource<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedResource")
            .field("key", &self.key)
            .field("busy", &self.engine.is_locked())
            .finish()
    }
}

pub type SynthesisResource = LoadedResource<dyn SynthesisEngine>;
pub type ConversionResource = LoadedResource<dyn ConversionEngine>;

type Slot<T> = Arc<OnceCell<Arc<T>>>;

/// Owner of every loaded engine. No eviction: entries live until the cache
/// is dropped.
pub struct ResourceCache {
    factory: Arc<dyn EngineFactory>,
    synthesis: OnceCell<Arc<SynthesisResource>>,
    conversion: DashMap<String, Slot<ConversionResource>>,
    metrics: VcMetrics,
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("synthesis_loaded", &self.synthesis.get().is_some())
            .field("conversion_loaded", &self.conversion_count())
            .finish()
    }
}

impl ResourceCache {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self::with_metrics(factory, VcMetrics::noop())
    }

    pub fn with_metrics(factory: Arc<dyn EngineFactory>, metrics: VcMetrics) -> Self {
        Self {
            factory,
            synthesis: OnceCell::new(),
            conversion: DashMap::new(),
            metrics,
        }
    }

    /// The process-wide synthesis engine, constructed on first call.
    pub fn synthesis_engine(&self) -> VcResult<Arc<SynthesisResource>> {
        self.synthesis
            .get_or_try_init(|| {
                let engine = self.construct("synthesis", SYNTHESIS_KEY, || {
                    self.factory.load_synthesis()
                })?;
                Ok(Arc::new(LoadedResource::new(SYNTHESIS_KEY, engine)))
            })
            .cloned()
    }

    /// The conversion engine for `voice`, or `None` when the voice has no
    /// conversion model.
    pub fn conversion_engine(
        &self,
        voice: &VoiceRecord,
    ) -> VcResult<Option<Arc<ConversionResource>>> {
        if !voice.has_conversion() {
            return Ok(None);
        }

        let key = voice.name().to_string();
        // Clone the slot out so the shard lock is not held across construction.
        let slot = self.conversion.entry(key.clone()).or_default().clone();

        let resource = slot
            .get_or_try_init(|| {
                let engine = self.construct("conversion", &key, || {
                    self.factory.load_conversion(voice)
                })?;
                Ok::<_, VcError>(Arc::new(LoadedResource::new(key.as_str(), engine)))
            })?
            .clone();

        self.metrics.set_conversion_engines(self.conversion_count());
        Ok(Some(resource))
    }

    /// Whether the synthesis engine has been constructed.
    pub fn synthesis_loaded(&self) -> bool {
        self.synthesis.get().is_some()
    }

    /// Number of constructed conversion engines.
    pub fn conversion_count(&self) -> usize {
        self.conversion
            .iter()
            .filter(|slot| slot.value().get().is_some())
            .count()
    }

    fn construct<E: ?Sized>(
        &self,
        kind: &'static str,
        key: &str,
        load: impl FnOnce() -> VcResult<Box<E>>,
    ) -> VcResult<Box<E>> {
        let start = Instant::now();
        info!(engine = kind, key, "loading engine");

        match load() {
            Ok(engine) => {
                let ms = start.elapsed().as_secs_f64() * 1000.0;
                info!(engine = kind, key, elapsed_ms = ms, "engine loaded");
                self.metrics.engine_loaded(kind, ms);
                Ok(engine)
            }
            Err(e) => {
                // The slot stays empty; the next request retries.
                warn!(engine = kind, key, error = %e, "engine construction failed");
                self.metrics.engine_load_failed(kind);
                Err(match e {
                    VcError::ResourceLoad { .. } => e,
                    other => VcError::resource_load(format!("{kind} engine '{key}'"), other.to_string()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use vc_core::{AudioBuffer, ConversionParams, SynthesisParams};

    struct Silent;

    impl SynthesisEngine for Silent {
        fn native_sample_rate(&self) -> u32 {
            24000
        }

        fn synthesize(&mut self, _: &str, _: &SynthesisParams, _: &Path) -> VcResult<AudioBuffer> {
            Ok(AudioBuffer::new(vec![0.0; 240], 24000))
        }
    }

    struct Passthrough;

    impl ConversionEngine for Passthrough {
        fn convert(
            &mut self,
            audio: &AudioBuffer,
            _: &ConversionParams,
            _: Option<&Path>,
        ) -> VcResult<AudioBuffer> {
            Ok(audio.clone())
        }
    }

    #[derive(Default)]
    struct Counting {
        synthesis: AtomicUsize,
        conversion: AtomicUsize,
        fail_first: AtomicUsize,
    }

    impl EngineFactory for Counting {
        fn load_synthesis(&self) -> VcResult<Box<dyn SynthesisEngine>> {
            std::thread::sleep(Duration::from_millis(50));
            self.synthesis.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Silent))
        }

        fn load_conversion(&self, voice: &VoiceRecord) -> VcResult<Box<dyn ConversionEngine>> {
            self.conversion.fetch_add(1, Ordering::SeqCst);
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(VcError::internal(format!("{} is corrupt", voice.name())));
            }
            Ok(Box::new(Passthrough))
        }
    }

    fn voice(name: &str) -> VoiceRecord {
        VoiceRecord::new(name, "p.wav").with_conversion(format!("{name}.pth"), None)
    }

    #[test]
    fn test_concurrent_first_calls_construct_once() {
        let factory = Arc::new(Counting::default());
        let cache = Arc::new(ResourceCache::new(factory.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.synthesis_engine().unwrap())
            })
            .collect();
        let engines: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(factory.synthesis.load(Ordering::SeqCst), 1);
        assert!(engines.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert!(cache.synthesis_loaded());
    }

    #[test]
    fn test_voice_without_model_has_no_engine() {
        let factory = Arc::new(Counting::default());
        let cache = ResourceCache::new(factory.clone());
        let plain = VoiceRecord::new("plain", "p.wav");

        assert!(cache.conversion_engine(&plain).unwrap().is_none());
        assert_eq!(factory.conversion.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_conversion_engines_keyed_by_voice() {
        let factory = Arc::new(Counting::default());
        let cache = ResourceCache::new(factory.clone());

        let a1 = cache.conversion_engine(&voice("a")).unwrap().unwrap();
        let a2 = cache.conversion_engine(&voice("a")).unwrap().unwrap();
        let b = cache.conversion_engine(&voice("b")).unwrap().unwrap();

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
        assert_eq!(a1.key(), "a");
        assert_eq!(factory.conversion.load(Ordering::SeqCst), 2);
        assert_eq!(cache.conversion_count(), 2);
    }

    #[test]
    fn test_failed_construction_is_retryable() {
        let factory = Arc::new(Counting::default());
        factory.fail_first.store(1, Ordering::SeqCst);
        let cache = ResourceCache::new(factory.clone());

        let err = cache.conversion_engine(&voice("a")).unwrap_err();
        assert!(matches!(err, VcError::ResourceLoad { .. }));
        assert_eq!(cache.conversion_count(), 0);

        assert!(cache.conversion_engine(&voice("a")).unwrap().is_some());
        assert_eq!(factory.conversion.load(Ordering::SeqCst), 2);
        assert_eq!(cache.conversion_count(), 1);
    }

    #[test]
    fn test_guard_is_exclusive() {
        let cache = ResourceCache::new(Arc::new(Counting::default()));
        let engine = cache.synthesis_engine().unwrap();

        let guard = engine.lock();
        assert!(format!("{engine:?}").contains("busy: true"));
        drop(guard);
        assert!(format!("{engine:?}").contains("busy: false"));
    }
}

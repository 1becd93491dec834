//! HTTP handlers for the speech service.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::IntoResponse,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tracing::{info, instrument};
use vc_core::{ModelKind, RuntimeConfig, SpeechOptions, SynthesisResult, VcError, VoiceRecord};

use runtime::SynthesisPipeline;

use crate::error::ApiError;

const SERVICE_NAME: &str = "ChatterVC";

pub const HEADER_RVC_APPLIED: HeaderName = HeaderName::from_static("x-rvc-applied");
pub const HEADER_MODEL: HeaderName = HeaderName::from_static("x-model");
pub const HEADER_VOICE: HeaderName = HeaderName::from_static("x-voice");
pub const HEADER_SOURCE_RATE: HeaderName = HeaderName::from_static("x-chatterbox-sr");

/// Shared server state.
pub struct AppState {
    pub pipeline: Arc<SynthesisPipeline>,
    pub config: RuntimeConfig,
    /// Present when the Prometheus recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        pipeline: Arc<SynthesisPipeline>,
        config: RuntimeConfig,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            pipeline,
            config,
            metrics,
            start_time: Instant::now(),
        }
    }
}

#[derive(Serialize)]
struct InfoResponse {
    name: &'static str,
    version: &'static str,
    endpoints: [&'static str; 7],
    voices_root: String,
    device: &'static str,
    default_sample_rate: u32,
    models: Vec<&'static str>,
    uptime_secs: u64,
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
}

#[derive(Serialize)]
struct ModelEntry {
    id: &'static str,
}

#[derive(Serialize)]
struct AudioModelsResponse {
    models: Vec<ModelEntry>,
}

#[derive(Serialize)]
struct OpenAiModel {
    id: &'static str,
    object: &'static str,
    owned_by: &'static str,
}

#[derive(Serialize)]
struct OpenAiModelList {
    object: &'static str,
    data: Vec<OpenAiModel>,
}

#[derive(Debug, Serialize)]
struct VoiceEntry {
    id: String,
    name: String,
    has_conversion: bool,
}

impl From<&VoiceRecord> for VoiceEntry {
    fn from(voice: &VoiceRecord) -> Self {
        Self {
            id: voice.id(),
            name: voice.name().to_string(),
            has_conversion: voice.has_conversion(),
        }
    }
}

#[derive(Serialize)]
struct VoicesResponse {
    voices: Vec<VoiceEntry>,
}

/// Service info handler.
pub async fn info_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(InfoResponse {
        name: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        endpoints: [
            "GET /health",
            "GET /v1/models",
            "GET /v1/audio/models",
            "GET /v1/audio/voices",
            "POST /v1/audio/speech",
            "GET /metrics",
            "GET /",
        ],
        voices_root: state.config.voices_root.display().to_string(),
        device: state.config.device.as_str(),
        default_sample_rate: state.config.default_sample_rate,
        models: ModelKind::ALL.iter().map(|m| m.id()).collect(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Health check handler.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse { ok: true })
}

/// OpenAI-compatible model list.
pub async fn models_handler() -> impl IntoResponse {
    Json(OpenAiModelList {
        object: "list",
        data: ModelKind::ALL
            .iter()
            .map(|m| OpenAiModel {
                id: m.id(),
                object: "model",
                owned_by: "chattervc",
            })
            .collect(),
    })
}

pub async fn audio_models_handler() -> impl IntoResponse {
    Json(AudioModelsResponse {
        models: ModelKind::ALL
            .iter()
            .map(|m| ModelEntry { id: m.id() })
            .collect(),
    })
}

/// Installed voices, with the `random` pseudo-voice first.
pub async fn voices_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let pipeline = Arc::clone(&state.pipeline);
    let listed = tokio::task::spawn_blocking(move || pipeline.registry().list())
        .await
        .map_err(|e| VcError::internal(format!("voice scan task failed: {e}")))??;

    let mut voices = Vec::with_capacity(listed.len() + 1);
    voices.push(VoiceEntry {
        id: "random".to_string(),
        name: "Random".to_string(),
        has_conversion: false,
    });
    voices.extend(listed.iter().map(VoiceEntry::from));

    Ok(Json(VoicesResponse { voices }))
}

/// `POST /v1/audio/speech`: returns raw audio bytes.
#[instrument(skip_all)]
pub async fn speech_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SpeechOptions>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(options) = payload?;
    let request = options.validate(state.config.default_sample_rate)?;

    info!(
        request_id = %request.id(),
        model = %request.model(),
        voice = %request.voice(),
        chars = request.text().chars().count(),
        format = request.format().extension(),
        "Processing speech request"
    );

    let result = state.pipeline.synthesize_async(request).await?;
    Ok((StatusCode::OK, audio_headers(&result), result.bytes))
}

fn audio_headers(result: &SynthesisResult) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(result.format.mime_type()),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(
        HEADER_RVC_APPLIED,
        HeaderValue::from_static(if result.conversion_applied { "1" } else { "0" }),
    );
    headers.insert(HEADER_MODEL, HeaderValue::from_static(result.model.id()));
    if let Ok(voice) = HeaderValue::from_str(&result.voice) {
        headers.insert(HEADER_VOICE, voice);
    }
    headers.insert(HEADER_SOURCE_RATE, HeaderValue::from(result.source_sample_rate));
    headers
}

/// Prometheus exposition text.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "metrics disabled\n".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vc_core::OutputFormat;

    fn result(voice: &str, applied: bool) -> SynthesisResult {
        SynthesisResult {
            bytes: vec![1, 2, 3],
            format: OutputFormat::Flac,
            conversion_applied: applied,
            sample_rate: 48000,
            source_sample_rate: 40000,
            voice: voice.to_string(),
            model: ModelKind::SynthesisWithConversion,
        }
    }

    #[test]
    fn test_audio_headers() {
        let headers = audio_headers(&result("alice", true));
        assert_eq!(headers[header::CONTENT_TYPE], "audio/flac");
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");
        assert_eq!(headers[HEADER_RVC_APPLIED], "1");
        assert_eq!(headers[HEADER_MODEL], "chatterbox_rvc");
        assert_eq!(headers[HEADER_VOICE], "alice");
        assert_eq!(headers[HEADER_SOURCE_RATE], "40000");
    }

    #[test]
    fn test_unrepresentable_voice_header_is_skipped() {
        let headers = audio_headers(&result("bad\nname", false));
        assert_eq!(headers[HEADER_RVC_APPLIED], "0");
        assert!(headers.get(HEADER_VOICE).is_none());
    }
}

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use dressme_contracts::jobs::{JobHandle, OperationSnapshot};
use serde_json::Value;

use crate::config::{ImageOutputConfig, StudioConfig, VideoOutputConfig};
use crate::error::{StudioError, StudioResult};

mod dryrun;
mod gemini;

pub use dryrun::DryrunBackend;
pub use gemini::GeminiBackend;

/// One unit of a request or response: inline media or plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Inline { mime_type: String, data: String },
    Text(String),
}

impl ContentPart {
    pub fn inline(mime_type: impl Into<String>, data_base64: impl Into<String>) -> Self {
        Self::Inline {
            mime_type: mime_type.into(),
            data: data_base64.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRequest {
    pub model: String,
    pub parts: Vec<ContentPart>,
    pub image_output: Option<ImageOutputConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentResponse {
    pub parts: Vec<ContentPart>,
}

impl ContentResponse {
    /// Bytes of the first part carrying inline data, read as PNG.
    pub fn first_image_png(&self) -> StudioResult<Vec<u8>> {
        let data = self
            .parts
            .iter()
            .find_map(|part| match part {
                ContentPart::Inline { data, .. } if !data.is_empty() => Some(data),
                _ => None,
            })
            .ok_or(StudioError::NoImageProduced)?;
        BASE64
            .decode(data.as_bytes())
            .map_err(|err| StudioError::Other(anyhow::anyhow!("image base64 decode failed: {err}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRequest {
    pub model: String,
    pub prompt: String,
    pub image_mime_type: String,
    pub image_base64: String,
    pub output: VideoOutputConfig,
}

/// Hosted generation API as seen by the studio. Every call receives the
/// credential explicitly; backends never read it themselves.
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;
    fn generate_content(
        &self,
        api_key: &str,
        request: &ContentRequest,
    ) -> StudioResult<ContentResponse>;
    fn start_video(&self, api_key: &str, request: &VideoRequest) -> StudioResult<OperationSnapshot>;
    fn refresh_operation(&self, api_key: &str, handle: &JobHandle)
        -> StudioResult<OperationSnapshot>;
    fn download(&self, api_key: &str, locator: &str) -> StudioResult<Vec<u8>>;
}

#[derive(Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Box<dyn GenerationBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<B: GenerationBackend + 'static>(&mut self, backend: B) {
        self.backends
            .insert(backend.name().to_string(), Box::new(backend));
    }

    pub fn take(&mut self, name: &str) -> Option<Box<dyn GenerationBackend>> {
        self.backends.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }
}

pub fn default_backend_registry(config: &StudioConfig) -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    registry.register(GeminiBackend::new(config));
    registry.register(DryrunBackend::new());
    registry
}

/// Locator of the first generated video in a finished operation payload.
/// Accepts both the REST shape (`generateVideoResponse.generatedSamples`)
/// and the SDK shape (`generatedVideos`).
pub fn extract_video_locator(payload: &Value) -> Option<String> {
    let response = payload.get("response")?;
    let samples = response
        .get("generateVideoResponse")
        .and_then(|inner| inner.get("generatedSamples"))
        .or_else(|| response.get("generatedVideos"))
        .and_then(Value::as_array)?;
    samples
        .first()?
        .get("video")?
        .get("uri")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|uri| !uri.is_empty())
        .map(str::to_string)
}

/// Provider error message attached to a finished operation, if any.
pub fn extract_operation_error(payload: &Value) -> Option<String> {
    let error = payload.get("error")?;
    error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| Some(error.to_string()))
}

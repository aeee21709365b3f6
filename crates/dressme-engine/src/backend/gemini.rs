use std::time::Duration;

use dressme_contracts::jobs::{JobHandle, OperationSnapshot};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::{ContentPart, ContentRequest, ContentResponse, GenerationBackend, VideoRequest};
use crate::config::StudioConfig;
use crate::error::{StudioError, StudioResult};

/// REST client for the Gemini API (`generativelanguage.googleapis.com`).
/// The credential travels as the `key` query parameter on every call.
pub struct GeminiBackend {
    api_base: String,
    http: HttpClient,
    request_timeout: Duration,
}

impl GeminiBackend {
    pub fn new(config: &StudioConfig) -> Self {
        Self {
            api_base: config.api_base.trim().trim_end_matches('/').to_string(),
            http: HttpClient::new(),
            request_timeout: config.request_timeout,
        }
    }

    fn endpoint_for_model(&self, model: &str, method: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:{}", self.api_base, model_path, method)
    }

    fn operation_url(&self, handle: &JobHandle) -> String {
        format!("{}/{}", self.api_base, handle.as_str().trim_start_matches('/'))
    }

    fn post_json(&self, endpoint: &str, api_key: &str, payload: &Value) -> StudioResult<Value> {
        let response = self
            .http
            .post(endpoint)
            .query(&[("key", api_key)])
            .timeout(self.request_timeout)
            .json(payload)
            .send()
            .map_err(|err| StudioError::transport(format!("Gemini request failed ({endpoint}): {err}")))?;
        response_json_or_error("Gemini", response)
    }

    fn get_json(&self, url: &str, api_key: &str) -> StudioResult<Value> {
        let response = self
            .http
            .get(url)
            .query(&[("key", api_key)])
            .timeout(self.request_timeout)
            .send()
            .map_err(|err| StudioError::transport(format!("Gemini poll failed ({url}): {err}")))?;
        response_json_or_error("Gemini poll", response)
    }
}

impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_content(
        &self,
        api_key: &str,
        request: &ContentRequest,
    ) -> StudioResult<ContentResponse> {
        let endpoint = self.endpoint_for_model(&request.model, "generateContent");
        debug!(model = %request.model, parts = request.parts.len(), "gemini generateContent");
        let payload = content_payload(request);
        let response_payload = self.post_json(&endpoint, api_key, &payload)?;
        Ok(parse_content_response(&response_payload))
    }

    fn start_video(&self, api_key: &str, request: &VideoRequest) -> StudioResult<OperationSnapshot> {
        let endpoint = self.endpoint_for_model(&request.model, "predictLongRunning");
        debug!(model = %request.model, "gemini predictLongRunning");
        let payload = video_payload(request);
        let response_payload = self.post_json(&endpoint, api_key, &payload)?;
        parse_operation(response_payload, None)
    }

    fn refresh_operation(
        &self,
        api_key: &str,
        handle: &JobHandle,
    ) -> StudioResult<OperationSnapshot> {
        let url = self.operation_url(handle);
        let payload = self.get_json(&url, api_key)?;
        parse_operation(payload, Some(handle))
    }

    fn download(&self, api_key: &str, locator: &str) -> StudioResult<Vec<u8>> {
        let response = self
            .http
            .get(locator)
            .query(&[("key", api_key)])
            .send()
            .map_err(|err| StudioError::transport(format!("video download failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(status_error("video download", status.as_u16(), body));
        }
        let bytes = response
            .bytes()
            .map_err(|err| StudioError::transport(format!("video download read failed: {err}")))?;
        Ok(bytes.to_vec())
    }
}

fn content_payload(request: &ContentRequest) -> Value {
    let parts: Vec<Value> = request
        .parts
        .iter()
        .map(|part| match part {
            ContentPart::Inline { mime_type, data } => json!({
                "inlineData": {
                    "mimeType": mime_type,
                    "data": data,
                }
            }),
            ContentPart::Text(text) => json!({ "text": text }),
        })
        .collect();

    let mut payload = Map::new();
    payload.insert(
        "contents".to_string(),
        json!([{ "role": "user", "parts": parts }]),
    );
    if let Some(image_output) = request.image_output.as_ref() {
        payload.insert(
            "generationConfig".to_string(),
            json!({
                "responseModalities": ["TEXT", "IMAGE"],
                "imageConfig": {
                    "aspectRatio": image_output.aspect_ratio,
                    "imageSize": image_output.image_size,
                }
            }),
        );
    }
    Value::Object(payload)
}

fn video_payload(request: &VideoRequest) -> Value {
    json!({
        "instances": [{
            "prompt": request.prompt,
            "image": {
                "bytesBase64Encoded": request.image_base64,
                "mimeType": request.image_mime_type,
            }
        }],
        "parameters": {
            "sampleCount": request.output.count,
            "resolution": request.output.resolution,
            "aspectRatio": request.output.aspect_ratio,
        }
    })
}

fn parse_content_response(payload: &Value) -> ContentResponse {
    let parts = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let parts = parts
        .iter()
        .filter_map(|part| {
            if let Some(inline) = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
            {
                let data = inline.get("data").and_then(Value::as_str)?;
                let mime_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .unwrap_or("image/png");
                return Some(ContentPart::inline(mime_type, data));
            }
            part.get("text")
                .and_then(Value::as_str)
                .map(ContentPart::text)
        })
        .collect();
    ContentResponse { parts }
}

/// Reads an operation resource. A response without `name` keeps the handle
/// that was queried.
fn parse_operation(payload: Value, queried: Option<&JobHandle>) -> StudioResult<OperationSnapshot> {
    let handle = payload
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(JobHandle::new)
        .or_else(|| queried.cloned())
        .ok_or_else(|| {
            StudioError::Other(anyhow::anyhow!("Gemini operation response has no name"))
        })?;
    let done = payload.get("done").and_then(Value::as_bool).unwrap_or(false);
    Ok(OperationSnapshot {
        handle,
        done,
        payload,
    })
}

fn response_json_or_error(label: &str, response: HttpResponse) -> StudioResult<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .map_err(|err| StudioError::transport(format!("{label} response body read failed: {err}")))?;
    if !status.is_success() {
        return Err(status_error(label, code, body));
    }
    serde_json::from_str(&body)
        .map_err(|err| StudioError::Other(anyhow::anyhow!("{label} returned invalid JSON payload: {err}")))
}

fn status_error(label: &str, code: u16, body: String) -> StudioError {
    let body = truncate_text(&body, 512);
    if code == 401 || code == 403 || (code == 400 && body.contains("API_KEY_INVALID")) {
        warn!(code, "{label} rejected the credential");
        return StudioError::ProviderRejected { status: code, body };
    }
    StudioError::ProviderFailed { status: code, body }
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

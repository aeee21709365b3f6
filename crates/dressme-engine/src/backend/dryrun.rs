use std::collections::BTreeMap;
use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use dressme_contracts::jobs::{JobHandle, OperationSnapshot};
use image::{DynamicImage, Rgb, RgbImage};
use serde_json::json;
use sha2::{Digest, Sha256};

use super::{ContentPart, ContentRequest, ContentResponse, GenerationBackend, VideoRequest};
use crate::config::ImageOutputConfig;
use crate::error::{StudioError, StudioResult};
use crate::normalize::encode_png;

const LOCATOR_PREFIX: &str = "dryrun://videos/";

/// Offline backend. Images are solid PNGs coloured from the request text;
/// video jobs stay pending for `pending_polls` refreshes, rotating their
/// handle each time, then finish with a `dryrun://` locator. Finished jobs
/// leave the operation table.
pub struct DryrunBackend {
    pending_polls: u32,
    operations: Mutex<BTreeMap<String, DryrunOperation>>,
}

struct DryrunOperation {
    remaining: u32,
    generation: u32,
    prompt: String,
}

impl Default for DryrunBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DryrunBackend {
    pub fn new() -> Self {
        Self::with_pending_polls(2)
    }

    pub fn with_pending_polls(pending_polls: u32) -> Self {
        Self {
            pending_polls,
            operations: Mutex::new(BTreeMap::new()),
        }
    }

    #[cfg(test)]
    fn open_operations(&self) -> usize {
        self.operations.lock().map(|ops| ops.len()).unwrap_or_default()
    }

    fn lock_operations(
        &self,
    ) -> StudioResult<std::sync::MutexGuard<'_, BTreeMap<String, DryrunOperation>>> {
        self.operations
            .lock()
            .map_err(|_| StudioError::Other(anyhow::anyhow!("dryrun operation table poisoned")))
    }
}

impl GenerationBackend for DryrunBackend {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate_content(
        &self,
        _api_key: &str,
        request: &ContentRequest,
    ) -> StudioResult<ContentResponse> {
        let text = request
            .parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::Inline { .. } => None,
            })
            .collect::<Vec<&str>>()
            .join("\n");
        let Some(image_output) = request.image_output.as_ref() else {
            return Ok(ContentResponse {
                parts: vec![ContentPart::text("ok")],
            });
        };
        let (width, height) = dims_for(image_output);
        let (r, g, b) = color_from_text(&text);
        let png = encode_png(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            Rgb([r, g, b]),
        )))?;
        Ok(ContentResponse {
            parts: vec![ContentPart::inline("image/png", BASE64.encode(png))],
        })
    }

    fn start_video(&self, _api_key: &str, request: &VideoRequest) -> StudioResult<OperationSnapshot> {
        let id = short_id(&format!("{}|{}", request.prompt, request.image_base64));
        let mut operations = self.lock_operations()?;
        operations.insert(
            id.clone(),
            DryrunOperation {
                remaining: self.pending_polls,
                generation: 0,
                prompt: request.prompt.clone(),
            },
        );
        Ok(OperationSnapshot::pending(operation_handle(&id, 0)))
    }

    fn refresh_operation(
        &self,
        _api_key: &str,
        handle: &JobHandle,
    ) -> StudioResult<OperationSnapshot> {
        let (id, generation) = parse_operation_handle(handle).ok_or_else(|| {
            StudioError::ProviderFailed {
                status: 404,
                body: format!("unknown operation {handle}"),
            }
        })?;
        let mut operations = self.lock_operations()?;
        let operation = operations
            .get_mut(&id)
            .filter(|operation| operation.generation == generation)
            .ok_or_else(|| StudioError::ProviderFailed {
                status: 404,
                body: format!("stale or unknown operation {handle}"),
            })?;

        operation.generation += 1;
        let next = operation_handle(&id, operation.generation);
        if operation.remaining > 0 {
            operation.remaining -= 1;
            return Ok(OperationSnapshot::pending(next));
        }
        let prompt = std::mem::take(&mut operation.prompt);
        operations.remove(&id);
        let locator = format!("{LOCATOR_PREFIX}{id}");
        Ok(OperationSnapshot {
            handle: next,
            done: true,
            payload: json!({
                "done": true,
                "response": {"generateVideoResponse": {"generatedSamples": [
                    {"video": {"uri": locator}}
                ]}},
                "prompt": prompt,
            }),
        })
    }

    fn download(&self, _api_key: &str, locator: &str) -> StudioResult<Vec<u8>> {
        let Some(id) = locator.strip_prefix(LOCATOR_PREFIX) else {
            return Err(StudioError::ProviderFailed {
                status: 404,
                body: format!("unknown locator {locator}"),
            });
        };
        let mut bytes = b"\0\0\0\x18ftypmp42".to_vec();
        bytes.extend_from_slice(id.as_bytes());
        Ok(bytes)
    }
}

fn operation_handle(id: &str, generation: u32) -> JobHandle {
    JobHandle::new(format!("dryrun/operations/{id}.{generation}"))
}

fn parse_operation_handle(handle: &JobHandle) -> Option<(String, u32)> {
    let tail = handle.as_str().strip_prefix("dryrun/operations/")?;
    let (id, generation) = tail.rsplit_once('.')?;
    Some((id.to_string(), generation.parse().ok()?))
}

fn dims_for(output: &ImageOutputConfig) -> (u32, u32) {
    let longest = match output.image_size.trim().to_ascii_uppercase().as_str() {
        "2K" => 2048,
        "4K" => 4096,
        _ => 1024,
    };
    let (w, h) = output
        .aspect_ratio
        .split_once(':')
        .and_then(|(w, h)| Some((w.trim().parse::<u32>().ok()?, h.trim().parse::<u32>().ok()?)))
        .filter(|(w, h)| *w > 0 && *h > 0)
        .unwrap_or((1, 1));
    if w >= h {
        (longest, (longest * h / w).max(1))
    } else {
        ((longest * w / h).max(1), longest)
    }
}

fn color_from_text(text: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

fn short_id(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..6])
}

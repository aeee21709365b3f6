use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dressme_contracts::credentials::CredentialStore;
use dressme_contracts::events::{EventPayload, EventWriter, SessionEvent};
use dressme_contracts::media::{CanonicalMime, GeneratedImage, SourceFile, Slot, UploadedImage};
use dressme_contracts::models::{Capability, ModelSelector};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::backend::{ContentPart, ContentRequest, GenerationBackend, VideoRequest};
use crate::config::{StudioConfig, DEFAULT_VIDEO_PROMPT};
use crate::error::{StudioError, StudioResult};
use crate::jobs::{JobKind, JobRegistry};
use crate::normalize::ImageNormalizer;
use crate::poller::{fetch_asset, OperationPoller, Pacer, ThreadPacer};

const MODEL_LABEL: &str = "This is the image of the MODEL (the person).";
const TOP_LABEL: &str = "This is the TOP garment (clothing).";
const BOTTOM_LABEL: &str = "This is the BOTTOM garment (clothing).";
const LOOK_INSTRUCTION: &str = "Create a realistic, high-quality fashion image (full-body photograph).
Dress the provided MODEL in the provided TOP garment and BOTTOM garment.
Keep the model's facial and body features as close to the original as possible.
Fit the clothes so they sit naturally on the model's body.
If a garment (top or bottom) is missing, choose something neutral and stylish that completes the look.
The result must look like a professional fashion photo.";

/// Snapshot of the session for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudioStatus {
    pub provider: String,
    pub has_credential: bool,
    pub filled_slots: Vec<Slot>,
    pub has_look: bool,
    pub video: Option<PathBuf>,
    pub active_job: Option<JobKind>,
    pub image_model: String,
    pub edit_model: String,
    pub video_model: String,
}

/// One user session: input slots, the current look, and the last video.
///
/// Every provider call reads the credential first and fails with
/// `MissingCredential` before touching the network when none is stored.
/// Generation calls hold the shared job slot for their whole duration.
pub struct Studio {
    config: StudioConfig,
    backend: Box<dyn GenerationBackend>,
    credentials: Arc<dyn CredentialStore>,
    normalizer: ImageNormalizer,
    poller: OperationPoller,
    events: EventWriter,
    jobs: Arc<JobRegistry>,
    out_dir: PathBuf,
    slots: HashMap<Slot, UploadedImage>,
    current: Option<GeneratedImage>,
    video: Option<PathBuf>,
}

impl Studio {
    pub fn new(
        config: StudioConfig,
        backend: Box<dyn GenerationBackend>,
        credentials: Arc<dyn CredentialStore>,
        events: EventWriter,
        out_dir: impl Into<PathBuf>,
    ) -> StudioResult<Self> {
        let mut config = config;
        let selector = ModelSelector::new(None, backend.name());
        config.image_model = select_model(&selector, &config.image_model, Capability::Image)?;
        config.edit_model = select_model(&selector, &config.edit_model, Capability::Edit)?;
        config.video_model = select_model(&selector, &config.video_model, Capability::Video)?;
        config.validation_model =
            select_model(&selector, &config.validation_model, Capability::Text)?;

        let out_dir = out_dir.into();
        fs::create_dir_all(&out_dir)?;
        Ok(Self {
            poller: OperationPoller::new(config.poll),
            config,
            backend,
            credentials,
            normalizer: ImageNormalizer::new(),
            events,
            jobs: JobRegistry::new(),
            out_dir,
            slots: HashMap::new(),
            current: None,
            video: None,
        })
    }

    pub fn with_normalizer(mut self, normalizer: ImageNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_job_registry(mut self, jobs: Arc<JobRegistry>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn job_registry(&self) -> Arc<JobRegistry> {
        Arc::clone(&self.jobs)
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn status(&self) -> StudioStatus {
        StudioStatus {
            provider: self.backend.name().to_string(),
            has_credential: self.credentials.get().is_some(),
            filled_slots: Slot::ALL
                .into_iter()
                .filter(|slot| self.slots.contains_key(slot))
                .collect(),
            has_look: self.current.is_some(),
            video: self.video.clone(),
            active_job: self.jobs.active(),
            image_model: self.config.image_model.clone(),
            edit_model: self.config.edit_model.clone(),
            video_model: self.config.video_model.clone(),
        }
    }

    pub fn slot(&self, slot: Slot) -> Option<&UploadedImage> {
        self.slots.get(&slot)
    }

    pub fn current_look(&self) -> Option<&GeneratedImage> {
        self.current.as_ref()
    }

    pub fn video(&self) -> Option<&Path> {
        self.video.as_deref()
    }

    /// A look needs the model photo and at least one garment.
    pub fn can_generate(&self) -> bool {
        self.slots.contains_key(&Slot::Model)
            && (self.slots.contains_key(&Slot::Top) || self.slots.contains_key(&Slot::Bottom))
    }

    /// Selects the look model. Background edits switch along with it when
    /// the new model can also edit.
    pub fn set_image_model(&mut self, requested: &str) -> StudioResult<String> {
        let selector = ModelSelector::new(None, self.backend.name());
        let model = select_model(&selector, requested, Capability::Image)?;
        if selector.registry.ensure(&model, Capability::Edit).is_some() {
            self.config.edit_model = model.clone();
        }
        self.config.image_model = model.clone();
        Ok(model)
    }

    pub fn set_video_model(&mut self, requested: &str) -> StudioResult<String> {
        let selector = ModelSelector::new(None, self.backend.name());
        self.config.video_model = select_model(&selector, requested, Capability::Video)?;
        Ok(self.config.video_model.clone())
    }

    /// Normalizes `source` and places it in `slot`, replacing what was there.
    /// On failure the slot keeps its previous image.
    pub fn upload(&mut self, slot: Slot, source: SourceFile) -> StudioResult<&UploadedImage> {
        let name = source.name.clone();
        let declared = source.declared_type.clone();
        let image = match self.normalizer.normalize(source) {
            Ok(image) => image,
            Err(err) => {
                self.record_failure("upload", &err);
                return Err(err);
            }
        };
        self.emit(
            SessionEvent::ImageUploaded,
            json!({
                "slot": slot,
                "name": name,
                "declared_type": declared,
                "mime_type": image.mime_type(),
                "converted": image.was_converted(),
                "dimensions": image.dimensions().map(|(w, h)| json!([w, h])),
            }),
        )?;
        self.slots.insert(slot, image);
        Ok(&self.slots[&slot])
    }

    pub fn upload_path(&mut self, slot: Slot, path: &Path) -> StudioResult<&UploadedImage> {
        let source = SourceFile::from_path(path)?;
        self.upload(slot, source)
    }

    pub fn set_slot(&mut self, slot: Slot, image: UploadedImage) {
        self.slots.insert(slot, image);
    }

    pub fn clear_slot(&mut self, slot: Slot) -> StudioResult<bool> {
        let removed = self.slots.remove(&slot).is_some();
        if removed {
            self.emit(SessionEvent::SlotCleared, json!({ "slot": slot }))?;
        }
        Ok(removed)
    }

    /// Loads an existing PNG as the current look, e.g. to edit or animate a
    /// look saved by an earlier session.
    pub fn load_look(&mut self, path: &Path) -> StudioResult<()> {
        let image = self.normalizer.normalize_path(path)?;
        if image.mime_type() != CanonicalMime::Png {
            return Err(StudioError::unsupported(format!(
                "{} (a look must be PNG)",
                image.mime_type()
            )));
        }
        let png = image.canonical_bytes()?;
        self.current = Some(GeneratedImage::new(png));
        self.video = None;
        Ok(())
    }

    pub fn generate_look(&mut self) -> StudioResult<&GeneratedImage> {
        let _job = self.jobs.claim(JobKind::Look)?;
        let api_key = self.credential()?;
        let Some(model) = self.slots.get(&Slot::Model) else {
            return Err(StudioError::IncompleteOutfit);
        };
        let top = self.slots.get(&Slot::Top);
        let bottom = self.slots.get(&Slot::Bottom);
        if top.is_none() && bottom.is_none() {
            return Err(StudioError::IncompleteOutfit);
        }

        let mut parts = vec![inline_part(model), ContentPart::text(MODEL_LABEL)];
        if let Some(top) = top {
            parts.push(inline_part(top));
            parts.push(ContentPart::text(TOP_LABEL));
        }
        if let Some(bottom) = bottom {
            parts.push(inline_part(bottom));
            parts.push(ContentPart::text(BOTTOM_LABEL));
        }
        parts.push(ContentPart::text(LOOK_INSTRUCTION));

        let request = ContentRequest {
            model: self.config.image_model.clone(),
            parts,
            image_output: Some(self.config.image_output.clone()),
        };
        let png = match self
            .backend
            .generate_content(&api_key, &request)
            .and_then(|response| response.first_image_png())
        {
            Ok(png) => png,
            Err(err) => {
                self.record_failure("generate_look", &err);
                return Err(err);
            }
        };

        info!(bytes = png.len(), model = %request.model, "look generated");
        self.emit(
            SessionEvent::LookGenerated,
            json!({
                "model": request.model,
                "garments": request.parts.len() / 2 - 1,
                "bytes": png.len(),
            }),
        )?;
        self.video = None;
        Ok(self.current.insert(GeneratedImage::new(png)))
    }

    /// Regenerates the current look with a new background. The prior look
    /// is kept when the edit fails.
    pub fn edit_background(&mut self, prompt: &str) -> StudioResult<&GeneratedImage> {
        let prompt = prompt.trim();
        let _job = self.jobs.claim(JobKind::Background)?;
        let api_key = self.credential()?;
        let Some(current) = self.current.as_ref() else {
            return Err(StudioError::NoCurrentImage);
        };
        if prompt.is_empty() {
            return Err(StudioError::EmptyPrompt);
        }

        let instruction = format!(
            "Change the background or setting of this image based on the following description: \"{prompt}\". Keep the model and the clothes unchanged. Keep the {} aspect ratio.",
            self.config.image_output.aspect_ratio
        );
        let request = ContentRequest {
            model: self.config.edit_model.clone(),
            parts: vec![
                ContentPart::inline(CanonicalMime::Png.as_str(), current.encoded()),
                ContentPart::text(instruction),
            ],
            image_output: Some(self.config.image_output.clone()),
        };
        let png = match self
            .backend
            .generate_content(&api_key, &request)
            .and_then(|response| response.first_image_png())
        {
            Ok(png) => png,
            Err(err) => {
                self.record_failure("edit_background", &err);
                return Err(err);
            }
        };

        self.emit(
            SessionEvent::BackgroundEdited,
            json!({ "prompt": prompt, "bytes": png.len() }),
        )?;
        self.video = None;
        Ok(self.current.insert(GeneratedImage::new(png)))
    }

    pub fn generate_video(&mut self, prompt: Option<&str>) -> StudioResult<PathBuf> {
        let mut pacer = ThreadPacer::default();
        self.generate_video_with(prompt, &mut pacer)
    }

    /// Starts a video job seeded with the current look, polls it to
    /// completion and saves the result under the output directory.
    pub fn generate_video_with<P: Pacer>(
        &mut self,
        prompt: Option<&str>,
        pacer: &mut P,
    ) -> StudioResult<PathBuf> {
        let _job = self.jobs.claim(JobKind::Video)?;
        let api_key = self.credential()?;
        let Some(current) = self.current.as_ref() else {
            return Err(StudioError::NoCurrentImage);
        };
        let prompt = prompt
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_VIDEO_PROMPT)
            .to_string();

        let request = VideoRequest {
            model: self.config.video_model.clone(),
            prompt: prompt.clone(),
            image_mime_type: CanonicalMime::Png.as_str().to_string(),
            image_base64: current.encoded(),
            output: self.config.video_output.clone(),
        };

        let result = self.run_video_job(&api_key, &request, pacer);
        match result {
            Ok(path) => {
                self.emit(
                    SessionEvent::VideoReady,
                    json!({ "prompt": prompt, "path": path.to_string_lossy() }),
                )?;
                self.video = Some(path.clone());
                Ok(path)
            }
            Err(err) => {
                self.record_failure("generate_video", &err);
                Err(err)
            }
        }
    }

    fn run_video_job<P: Pacer>(
        &self,
        api_key: &str,
        request: &VideoRequest,
        pacer: &mut P,
    ) -> StudioResult<PathBuf> {
        let started = self.backend.start_video(api_key, request)?;
        self.emit(
            SessionEvent::VideoStarted,
            json!({ "model": request.model, "handle": started.handle.as_str() }),
        )?;
        let job = self
            .poller
            .wait_on(self.backend.as_ref(), api_key, started, pacer)?;
        fetch_asset(
            self.backend.as_ref(),
            api_key,
            &job,
            &self.out_dir,
            &format!("video-{}", file_stamp()),
        )
    }

    pub fn save_look(&self) -> StudioResult<PathBuf> {
        let current = self.current.as_ref().ok_or(StudioError::NoCurrentImage)?;
        let path = self.out_dir.join(format!("look-{}.png", file_stamp()));
        fs::write(&path, current.bytes())?;
        self.emit(SessionEvent::LookSaved, json!({ "path": path.to_string_lossy() }))?;
        Ok(path)
    }

    /// Sends one lightweight text request with `key`. Any failure counts
    /// as an invalid key.
    pub fn validate_credential(&self, key: &str) -> bool {
        let key = key.trim();
        if key.is_empty() {
            return false;
        }
        let request = ContentRequest {
            model: self.config.validation_model.clone(),
            parts: vec![ContentPart::text("test")],
            image_output: None,
        };
        match self.backend.generate_content(key, &request) {
            Ok(_) => true,
            Err(err) => {
                warn!(error = %err, "API key validation failed");
                false
            }
        }
    }

    /// Validates `key` and stores it when the provider accepts it.
    pub fn login(&self, key: &str) -> StudioResult<bool> {
        if !self.validate_credential(key) {
            self.emit(SessionEvent::CredentialRejected, json!({}))?;
            return Ok(false);
        }
        self.credentials.set(key)?;
        self.emit(SessionEvent::CredentialStored, json!({}))?;
        Ok(true)
    }

    /// Forgets the credential and every input and output of the session.
    pub fn logout(&mut self) -> StudioResult<()> {
        self.credentials.remove()?;
        self.slots.clear();
        self.current = None;
        self.video = None;
        self.emit(SessionEvent::LoggedOut, json!({}))?;
        Ok(())
    }

    #[cfg(test)]
    fn load_look_bytes_for_test(&mut self, png: Vec<u8>) {
        self.current = Some(GeneratedImage::new(png));
    }

    fn credential(&self) -> StudioResult<String> {
        self.credentials.get().ok_or(StudioError::MissingCredential)
    }

    fn emit(&self, event: SessionEvent, payload: Value) -> StudioResult<()> {
        let payload: EventPayload = payload.as_object().cloned().unwrap_or_default();
        self.events.emit(event, payload)?;
        Ok(())
    }

    fn record_failure(&self, action: &str, err: &StudioError) {
        warn!(action, error = %err, "studio action failed");
        let logged = self.emit(
            SessionEvent::ActionFailed,
            json!({
                "action": action,
                "error": err.to_string(),
                "message": err.user_message(),
            }),
        );
        if let Err(log_err) = logged {
            warn!(action, error = %log_err, "could not record failure in the event log");
        }
    }
}

fn inline_part(image: &UploadedImage) -> ContentPart {
    ContentPart::inline(image.mime_type().as_str(), image.encoded())
}

fn select_model(
    selector: &ModelSelector,
    requested: &str,
    capability: Capability,
) -> StudioResult<String> {
    let selection = selector
        .select(Some(requested), capability)
        .map_err(|reason| StudioError::Other(anyhow::anyhow!(reason)))?;
    if let Some(reason) = selection.fallback_reason.as_deref() {
        warn!(%reason, model = %selection.model.name, "model fallback");
    }
    Ok(selection.model.name)
}

fn file_stamp() -> String {
    chrono::Utc::now().format("%Y%m%d-%H%M%S%3f").to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use dressme_contracts::credentials::{CredentialStore, MemoryCredentialStore};
    use dressme_contracts::events::{read_events, EventWriter};
    use dressme_contracts::jobs::{JobHandle, OperationSnapshot};
    use dressme_contracts::media::{CanonicalMime, SourceFile, Slot};
    use serde_json::{json, Value};

    use super::Studio;
    use crate::backend::{
        ContentPart, ContentRequest, ContentResponse, DryrunBackend, GenerationBackend,
        VideoRequest,
    };
    use crate::config::StudioConfig;
    use crate::error::{StudioError, StudioResult};
    use crate::jobs::JobKind;
    use crate::poller::Pacer;

    #[derive(Default)]
    struct RecordingPacer {
        pauses: Vec<Duration>,
    }

    impl Pacer for RecordingPacer {
        fn pause(&mut self, delay: Duration) {
            self.pauses.push(delay);
        }

        fn elapsed(&self) -> Duration {
            self.pauses.iter().sum()
        }
    }

    /// Backend double that counts calls and replays scripted results.
    #[derive(Default)]
    struct ScriptedBackend {
        calls: Arc<AtomicUsize>,
        content: Mutex<Vec<StudioResult<ContentResponse>>>,
        operations: Mutex<Vec<OperationSnapshot>>,
        requests: Arc<Mutex<Vec<ContentRequest>>>,
        queried: Arc<Mutex<Vec<String>>>,
    }

    impl GenerationBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "gemini"
        }

        fn generate_content(
            &self,
            _api_key: &str,
            request: &ContentRequest,
        ) -> StudioResult<ContentResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            self.content
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(image_response(&[7, 7, 7])))
        }

        fn start_video(
            &self,
            _api_key: &str,
            _request: &VideoRequest,
        ) -> StudioResult<OperationSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(OperationSnapshot::pending(JobHandle::new("ops/0")))
        }

        fn refresh_operation(
            &self,
            _api_key: &str,
            handle: &JobHandle,
        ) -> StudioResult<OperationSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queried.lock().unwrap().push(handle.as_str().to_string());
            self.operations
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| StudioError::transport("no scripted operation"))
        }

        fn download(&self, _api_key: &str, locator: &str) -> StudioResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(locator, "https://files/video-1");
            Ok(b"mp4-bytes".to_vec())
        }
    }

    fn image_response(bytes: &[u8]) -> ContentResponse {
        ContentResponse {
            parts: vec![ContentPart::inline("image/png", BASE64.encode(bytes))],
        }
    }

    fn png_source(name: &str) -> SourceFile {
        SourceFile::new(Some(name.to_string()), "image/png", name.as_bytes().to_vec())
    }

    fn studio_with(
        backend: ScriptedBackend,
        key: Option<&str>,
        dir: &std::path::Path,
    ) -> anyhow::Result<Studio> {
        let credentials: Arc<dyn CredentialStore> = Arc::new(match key {
            Some(key) => MemoryCredentialStore::with_key(key),
            None => MemoryCredentialStore::new(),
        });
        Ok(Studio::new(
            StudioConfig::default(),
            Box::new(backend),
            credentials,
            EventWriter::new(dir.join("events.jsonl"), "test-session"),
            dir.join("out"),
        )?)
    }

    fn event_types(dir: &std::path::Path) -> anyhow::Result<Vec<String>> {
        Ok(read_events(&dir.join("events.jsonl"))?
            .into_iter()
            .filter_map(|row| row.get("type").and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    #[test]
    fn missing_credential_fails_before_any_call() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let backend = ScriptedBackend::default();
        let calls = Arc::clone(&backend.calls);
        let mut studio = studio_with(backend, None, temp.path())?;
        studio.upload(Slot::Model, png_source("model"))?;
        studio.upload(Slot::Top, png_source("top"))?;

        assert!(matches!(
            studio.generate_look(),
            Err(StudioError::MissingCredential)
        ));
        assert!(matches!(
            studio.edit_background("beach"),
            Err(StudioError::MissingCredential)
        ));
        let mut pacer = RecordingPacer::default();
        assert!(matches!(
            studio.generate_video_with(None, &mut pacer),
            Err(StudioError::MissingCredential)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn look_requires_model_and_one_garment() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut studio = studio_with(ScriptedBackend::default(), Some("k"), temp.path())?;
        studio.upload(Slot::Top, png_source("top"))?;
        assert!(!studio.can_generate());
        assert!(matches!(
            studio.generate_look(),
            Err(StudioError::IncompleteOutfit)
        ));

        studio.upload(Slot::Model, png_source("model"))?;
        assert!(studio.can_generate());
        studio.clear_slot(Slot::Top)?;
        assert!(matches!(
            studio.generate_look(),
            Err(StudioError::IncompleteOutfit)
        ));
        Ok(())
    }

    #[test]
    fn look_request_orders_parts_like_the_form() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let backend = ScriptedBackend::default();
        let requests = Arc::clone(&backend.requests);
        let mut studio = studio_with(backend, Some("k"), temp.path())?;
        studio.upload(Slot::Model, png_source("model"))?;
        studio.upload(Slot::Bottom, png_source("bottom"))?;

        let look = studio.generate_look()?;
        assert_eq!(look.bytes(), &[7, 7, 7]);

        let sent = requests.lock().unwrap();
        let parts = &sent[0].parts;
        assert_eq!(parts.len(), 5);
        assert_eq!(
            parts[0],
            ContentPart::inline("image/png", BASE64.encode("model"))
        );
        assert_eq!(parts[1], ContentPart::text(super::MODEL_LABEL));
        assert_eq!(
            parts[2],
            ContentPart::inline("image/png", BASE64.encode("bottom"))
        );
        assert_eq!(parts[3], ContentPart::text(super::BOTTOM_LABEL));
        assert_eq!(parts[4], ContentPart::text(super::LOOK_INSTRUCTION));
        assert_eq!(
            sent[0].image_output.as_ref().map(|o| o.aspect_ratio.as_str()),
            Some("9:16")
        );
        Ok(())
    }

    #[test]
    fn failed_background_edit_keeps_previous_look() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let backend = ScriptedBackend::default();
        backend.content.lock().unwrap().push(Ok(ContentResponse {
            parts: vec![ContentPart::text("no image for you")],
        }));
        let mut studio = studio_with(backend, Some("k"), temp.path())?;
        studio.set_slot(
            Slot::Model,
            crate::normalize::ImageNormalizer::new().normalize(png_source("m"))?,
        );

        assert!(matches!(
            studio.edit_background("beach"),
            Err(StudioError::NoCurrentImage)
        ));

        studio.load_look_bytes_for_test(vec![1, 2, 3]);
        assert!(matches!(
            studio.edit_background("   "),
            Err(StudioError::EmptyPrompt)
        ));
        assert!(matches!(
            studio.edit_background("at the beach"),
            Err(StudioError::NoImageProduced)
        ));
        assert_eq!(
            studio.current_look().map(|look| look.bytes().to_vec()),
            Some(vec![1, 2, 3])
        );

        let edited = studio.edit_background("at the beach")?;
        assert_eq!(edited.bytes(), &[7, 7, 7]);
        assert!(event_types(temp.path())?.contains(&"action_failed".to_string()));
        Ok(())
    }

    #[test]
    fn video_polls_rotated_handles_and_saves_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let backend = ScriptedBackend::default();
        let queried = Arc::clone(&backend.queried);
        {
            let mut ops = backend.operations.lock().unwrap();
            ops.push(OperationSnapshot {
                handle: JobHandle::new("ops/3"),
                done: true,
                payload: json!({"response": {"generatedVideos": [
                    {"video": {"uri": "https://files/video-1"}}
                ]}}),
            });
            ops.push(OperationSnapshot::pending(JobHandle::new("ops/2")));
            ops.push(OperationSnapshot::pending(JobHandle::new("ops/1")));
        }
        let mut studio = studio_with(backend, Some("k"), temp.path())?;
        studio.load_look_bytes_for_test(vec![1, 2, 3]);

        let mut pacer = RecordingPacer::default();
        let path = studio.generate_video_with(None, &mut pacer)?;

        assert_eq!(queried.lock().unwrap().as_slice(), ["ops/0", "ops/1", "ops/2"]);
        assert_eq!(pacer.pauses.len(), 3);
        assert_eq!(std::fs::read(&path)?, b"mp4-bytes");
        assert!(path.starts_with(temp.path().join("out")));
        assert_eq!(studio.video(), Some(path.as_path()));

        let types = event_types(temp.path())?;
        assert!(types.contains(&"video_started".to_string()));
        assert!(types.contains(&"video_ready".to_string()));
        Ok(())
    }

    #[test]
    fn concurrent_submission_is_rejected() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut studio = studio_with(ScriptedBackend::default(), Some("k"), temp.path())?;
        studio.upload(Slot::Model, png_source("model"))?;
        studio.upload(Slot::Top, png_source("top"))?;

        let registry = studio.job_registry();
        let held = registry.claim(JobKind::Video)?;
        assert!(matches!(
            studio.generate_look(),
            Err(StudioError::JobAlreadyRunning("video"))
        ));
        drop(held);
        studio.generate_look()?;
        assert_eq!(registry.active(), None);
        Ok(())
    }

    #[test]
    fn new_look_clears_previous_video_and_logout_clears_all() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let credentials = Arc::new(MemoryCredentialStore::with_key("k"));
        let mut studio = Studio::new(
            StudioConfig {
                poll: crate::config::PollConfig {
                    interval: Duration::ZERO,
                    timeout: None,
                },
                ..StudioConfig::default()
            },
            Box::new(DryrunBackend::with_pending_polls(1)),
            credentials.clone(),
            EventWriter::disabled("s"),
            temp.path(),
        )?;
        assert_eq!(studio.config().image_model, "dryrun-image-1");

        studio.upload(Slot::Model, png_source("model"))?;
        studio.upload(Slot::Top, png_source("top"))?;
        studio.generate_look()?;
        studio.generate_video(Some("twirl"))?;
        assert!(studio.video().is_some());

        studio.generate_look()?;
        assert!(studio.video().is_none());

        let saved = studio.save_look()?;
        assert!(saved.exists());

        studio.logout()?;
        assert!(credentials.get().is_none());
        let status = studio.status();
        assert!(status.filled_slots.is_empty());
        assert!(!status.has_look);
        assert!(!status.has_credential);
        Ok(())
    }

    #[test]
    fn upload_converts_and_rejects() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut studio = studio_with(ScriptedBackend::default(), Some("k"), temp.path())?;
        assert!(matches!(
            studio.upload(Slot::Top, SourceFile::new(None, "text/plain", vec![1])),
            Err(StudioError::UnsupportedFormat(_))
        ));
        assert!(studio.slot(Slot::Top).is_none());

        let mut webp = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(image::RgbaImage::new(8, 6))
            .write_to(&mut webp, image::ImageFormat::WebP)?;
        let uploaded = studio.upload(
            Slot::Top,
            SourceFile::new(None, "image/webp", webp.into_inner()),
        )?;
        assert_eq!(uploaded.mime_type(), CanonicalMime::Png);
        assert_eq!(uploaded.dimensions(), Some((8, 6)));
        Ok(())
    }

    #[test]
    fn background_edit_uses_an_edit_capable_model() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let backend = ScriptedBackend::default();
        let requests = Arc::clone(&backend.requests);
        let mut studio = Studio::new(
            StudioConfig {
                edit_model: "veo-3.1-fast-generate-preview".to_string(),
                ..StudioConfig::default()
            },
            Box::new(backend),
            Arc::new(MemoryCredentialStore::with_key("k")),
            EventWriter::disabled("s"),
            temp.path(),
        )?;
        assert_eq!(studio.status().edit_model, "gemini-3-pro-image-preview");

        studio.load_look_bytes_for_test(vec![1, 2, 3]);
        studio.edit_background("in a garden")?;
        assert_eq!(studio.set_image_model("gemini-2.5-flash-image")?, "gemini-2.5-flash-image");
        studio.edit_background("on a rooftop")?;

        let models: Vec<String> = requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.model.clone())
            .collect();
        assert_eq!(models, ["gemini-3-pro-image-preview", "gemini-2.5-flash-image"]);
        Ok(())
    }

    #[test]
    fn failure_surfaces_when_event_log_is_unwritable() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, b"not a directory")?;
        let mut studio = Studio::new(
            StudioConfig::default(),
            Box::new(ScriptedBackend::default()),
            Arc::new(MemoryCredentialStore::with_key("k")),
            EventWriter::new(blocker.join("events.jsonl"), "s"),
            temp.path().join("out"),
        )?;

        assert!(matches!(
            studio.upload(Slot::Top, SourceFile::new(None, "text/plain", vec![1])),
            Err(StudioError::UnsupportedFormat(_))
        ));
        Ok(())
    }

    #[test]
    fn login_stores_only_valid_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let backend = ScriptedBackend::default();
        backend.content.lock().unwrap().push(Err(StudioError::ProviderRejected {
            status: 400,
            body: "API_KEY_INVALID".to_string(),
        }));
        let studio = studio_with(backend, None, temp.path())?;

        assert!(!studio.login("bad-key")?);
        assert!(!studio.status().has_credential);
        assert!(!studio.login("   ")?);
        assert!(studio.login("good-key")?);
        assert!(studio.status().has_credential);
        Ok(())
    }
}

use std::env;
use std::time::Duration;

use dressme_contracts::models::{
    DEFAULT_IMAGE_MODEL, DEFAULT_VALIDATION_MODEL, DEFAULT_VIDEO_MODEL,
};
use tracing::warn;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_VIDEO_PROMPT: &str = "A model posing fashionably, slow motion, elegant movement";

const POLL_INTERVAL_RANGE_SECS: (f64, f64) = (0.5, 60.0);
const POLL_TIMEOUT_RANGE_SECS: (f64, f64) = (10.0, 3600.0);
const REQUEST_TIMEOUT_RANGE_SECS: (f64, f64) = (5.0, 600.0);

/// Output framing shared by look generation and background edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOutputConfig {
    pub aspect_ratio: String,
    pub image_size: String,
}

impl Default for ImageOutputConfig {
    fn default() -> Self {
        Self {
            aspect_ratio: "9:16".to_string(),
            image_size: "1K".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoOutputConfig {
    pub count: u32,
    pub resolution: String,
    pub aspect_ratio: String,
}

impl Default for VideoOutputConfig {
    fn default() -> Self {
        Self {
            count: 1,
            resolution: "720p".to_string(),
            aspect_ratio: "9:16".to_string(),
        }
    }
}

/// Delay between status queries and the optional overall deadline. No
/// deadline means the poller waits until the provider reports done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudioConfig {
    pub api_base: String,
    pub image_model: String,
    /// Model for background edits; follows `image_model` unless set apart.
    pub edit_model: String,
    pub video_model: String,
    pub validation_model: String,
    pub image_output: ImageOutputConfig,
    pub video_output: VideoOutputConfig,
    pub poll: PollConfig,
    pub request_timeout: Duration,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            edit_model: DEFAULT_IMAGE_MODEL.to_string(),
            video_model: DEFAULT_VIDEO_MODEL.to_string(),
            validation_model: DEFAULT_VALIDATION_MODEL.to_string(),
            image_output: ImageOutputConfig::default(),
            video_output: VideoOutputConfig::default(),
            poll: PollConfig::default(),
            request_timeout: Duration::from_secs(90),
        }
    }
}

impl StudioConfig {
    /// Defaults overridden by `GEMINI_API_BASE` and the `DRESSME_*` variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(base) = non_empty_env("GEMINI_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(model) = non_empty_env("DRESSME_IMAGE_MODEL") {
            config.edit_model = model.clone();
            config.image_model = model;
        }
        if let Some(model) = non_empty_env("DRESSME_EDIT_MODEL") {
            config.edit_model = model;
        }
        if let Some(model) = non_empty_env("DRESSME_VIDEO_MODEL") {
            config.video_model = model;
        }
        if let Some(model) = non_empty_env("DRESSME_VALIDATION_MODEL") {
            config.validation_model = model;
        }
        if let Some(secs) = env_seconds("DRESSME_POLL_INTERVAL_SECS", POLL_INTERVAL_RANGE_SECS) {
            config.poll.interval = secs;
        }
        if let Some(secs) = env_seconds("DRESSME_POLL_TIMEOUT_SECS", POLL_TIMEOUT_RANGE_SECS) {
            config.poll.timeout = Some(secs);
        }
        if let Some(secs) =
            env_seconds("DRESSME_REQUEST_TIMEOUT_SECS", REQUEST_TIMEOUT_RANGE_SECS)
        {
            config.request_timeout = secs;
        }
        config
    }
}

pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_seconds(key: &str, range: (f64, f64)) -> Option<Duration> {
    let raw = non_empty_env(key)?;
    let parsed = parse_seconds(&raw, range);
    if parsed.is_none() {
        warn!(key, value = %raw, "ignoring invalid duration");
    }
    parsed
}

/// Positive seconds clamped into `range`. Zero, negative and non-numeric
/// values are rejected.
fn parse_seconds(raw: &str, (min, max): (f64, f64)) -> Option<Duration> {
    let value: f64 = raw.trim().parse().ok()?;
    if value.is_nan() || value <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(value.clamp(min, max)).ok()
}

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

const RESERVED_KEYS: [&str; 3] = ["type", "session_id", "ts"];

/// Milestones of a studio session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    ImageUploaded,
    SlotCleared,
    LookGenerated,
    BackgroundEdited,
    VideoStarted,
    VideoReady,
    LookSaved,
    ActionFailed,
    CredentialStored,
    CredentialRejected,
    LoggedOut,
}

impl SessionEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionEvent::ImageUploaded => "image_uploaded",
            SessionEvent::SlotCleared => "slot_cleared",
            SessionEvent::LookGenerated => "look_generated",
            SessionEvent::BackgroundEdited => "background_edited",
            SessionEvent::VideoStarted => "video_started",
            SessionEvent::VideoReady => "video_ready",
            SessionEvent::LookSaved => "look_saved",
            SessionEvent::ActionFailed => "action_failed",
            SessionEvent::CredentialStored => "credential_stored",
            SessionEvent::CredentialRejected => "credential_rejected",
            SessionEvent::LoggedOut => "logged_out",
        }
    }
}

/// Session log, one JSON object per line. `type`, `session_id` and `ts`
/// are owned by the writer; payload keys with those names are dropped.
/// A disabled writer builds rows without persisting them.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<Sink>,
}

#[derive(Debug)]
struct Sink {
    path: Option<PathBuf>,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self::with_sink(Some(path.into()), session_id.into())
    }

    pub fn disabled(session_id: impl Into<String>) -> Self {
        Self::with_sink(None, session_id.into())
    }

    fn with_sink(path: Option<PathBuf>, session_id: String) -> Self {
        Self {
            inner: Arc::new(Sink {
                path,
                session_id,
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event: SessionEvent, payload: EventPayload) -> anyhow::Result<Value> {
        let mut row = Map::new();
        row.insert("type".to_string(), Value::String(event.as_str().to_string()));
        row.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        row.insert("ts".to_string(), Value::String(now_utc_iso()));
        row.extend(
            payload
                .into_iter()
                .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str())),
        );
        let row = Value::Object(row);

        if let Some(path) = self.inner.path.as_deref() {
            self.append(path, &row)
                .with_context(|| format!("failed to append to {}", path.display()))?;
        }
        Ok(row)
    }

    fn append(&self, path: &Path, row: &Value) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(row)?;
        line.push('\n');
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?
            .write_all(line.as_bytes())?;
        Ok(())
    }
}

/// Reads back a session log. Blank lines are skipped.
pub fn read_events(path: &Path) -> anyhow::Result<Vec<Value>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{} line {}: invalid event", path.display(), index + 1))
        })
        .collect()
}

pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};

const API_KEY_FIELD: &str = "api_key";

/// Holder of the single API credential. Blank values read back as absent.
pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Option<String>;
    fn set(&self, key: &str) -> anyhow::Result<()>;
    fn remove(&self) -> anyhow::Result<()>;
}

/// Credential persisted as `{"api_key": "..."}` in a JSON file. Other keys in
/// the file are preserved on write.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Option<String> {
        read_json_object(&self.path)?
            .get(API_KEY_FIELD)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn set(&self, key: &str) -> anyhow::Result<()> {
        let trimmed = key.trim();
        if trimmed.is_empty() {
            anyhow::bail!("refusing to store an empty API key");
        }
        let mut on_disk = read_json_object(&self.path).unwrap_or_default();
        on_disk.insert(API_KEY_FIELD.to_string(), Value::String(trimmed.to_string()));
        write_json_object(&self.path, &on_disk)
    }

    fn remove(&self) -> anyhow::Result<()> {
        let Some(mut on_disk) = read_json_object(&self.path) else {
            return Ok(());
        };
        if on_disk.remove(API_KEY_FIELD).is_none() {
            return Ok(());
        }
        write_json_object(&self.path, &on_disk)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    key: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: &str) -> Self {
        Self {
            key: Mutex::new(Some(key.to_string())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Option<String> {
        let guard = self.key.lock().ok()?;
        guard
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn set(&self, key: &str) -> anyhow::Result<()> {
        let trimmed = key.trim();
        if trimmed.is_empty() {
            anyhow::bail!("refusing to store an empty API key");
        }
        let mut guard = self
            .key
            .lock()
            .map_err(|_| anyhow::anyhow!("credential store lock poisoned"))?;
        *guard = Some(trimmed.to_string());
        Ok(())
    }

    fn remove(&self) -> anyhow::Result<()> {
        let mut guard = self
            .key
            .lock()
            .map_err(|_| anyhow::anyhow!("credential store lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}

fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed.as_object().cloned()
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )?;
    Ok(())
}

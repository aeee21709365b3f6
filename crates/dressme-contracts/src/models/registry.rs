use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";
pub const DEFAULT_VIDEO_MODEL: &str = "veo-3.1-fast-generate-preview";
pub const DEFAULT_VALIDATION_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Text,
    Image,
    Edit,
    Video,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Text => "text",
            Capability::Image => "image",
            Capability::Edit => "edit",
            Capability::Video => "video",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<Capability>,
}

impl ModelSpec {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    /// Models offering `capability`, narrowed to `provider` when given.
    pub fn by_capability(&self, capability: Capability, provider: Option<&str>) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .filter(|model| provider.map_or(true, |name| model.provider == name))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: Capability) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, provider: &str, capabilities: &[Capability]| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                provider: provider.to_string(),
                capabilities: capabilities.to_vec(),
            },
        );
    };

    insert(
        DEFAULT_IMAGE_MODEL,
        "gemini",
        &[Capability::Image, Capability::Edit],
    );
    insert(
        "gemini-2.5-flash-image",
        "gemini",
        &[Capability::Image, Capability::Edit],
    );
    insert(DEFAULT_VIDEO_MODEL, "gemini", &[Capability::Video]);
    insert("veo-3.1-generate-preview", "gemini", &[Capability::Video]);
    insert(DEFAULT_VALIDATION_MODEL, "gemini", &[Capability::Text]);
    insert(
        "dryrun-image-1",
        "dryrun",
        &[Capability::Image, Capability::Edit],
    );
    insert("dryrun-video-1", "dryrun", &[Capability::Video]);
    insert("dryrun-text-1", "dryrun", &[Capability::Text]);

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_capability() {
        let registry = ModelRegistry::new(None);
        for capability in [
            Capability::Text,
            Capability::Image,
            Capability::Edit,
            Capability::Video,
        ] {
            assert!(!registry.by_capability(capability, Some("gemini")).is_empty());
            assert!(!registry.by_capability(capability, Some("dryrun")).is_empty());
        }
    }

    #[test]
    fn ensure_checks_capability() {
        let registry = ModelRegistry::new(None);
        assert!(registry.ensure(DEFAULT_VIDEO_MODEL, Capability::Video).is_some());
        assert!(registry.ensure(DEFAULT_VIDEO_MODEL, Capability::Image).is_none());
        assert!(registry.ensure("missing", Capability::Image).is_none());
    }
}

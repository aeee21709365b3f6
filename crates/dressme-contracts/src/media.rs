use std::fmt;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Content type used when nothing better is known about a file.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Encodings the generation API accepts as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CanonicalMime {
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/jpeg")]
    Jpeg,
}

impl CanonicalMime {
    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalMime::Png => "image/png",
            CanonicalMime::Jpeg => "image/jpeg",
        }
    }
}

impl fmt::Display for CanonicalMime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encodings that must be re-encoded as PNG before upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvertibleMime {
    Gif,
    Webp,
    Avif,
    Heic,
    Heif,
}

impl ConvertibleMime {
    pub fn as_str(self) -> &'static str {
        match self {
            ConvertibleMime::Gif => "image/gif",
            ConvertibleMime::Webp => "image/webp",
            ConvertibleMime::Avif => "image/avif",
            ConvertibleMime::Heic => "image/heic",
            ConvertibleMime::Heif => "image/heif",
        }
    }
}

impl fmt::Display for ConvertibleMime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeClass {
    Accepted(CanonicalMime),
    NeedsConversion(ConvertibleMime),
    Unsupported,
}

/// Lower-cases a declared content type and strips `;` parameters.
pub fn normalize_content_type(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn classify_content_type(raw: &str) -> MimeClass {
    let normalized = normalize_content_type(raw);
    if !normalized.starts_with("image/") {
        return MimeClass::Unsupported;
    }
    match normalized.as_str() {
        "image/png" => MimeClass::Accepted(CanonicalMime::Png),
        "image/jpeg" | "image/jpg" | "image/pjpeg" => MimeClass::Accepted(CanonicalMime::Jpeg),
        "image/gif" => MimeClass::NeedsConversion(ConvertibleMime::Gif),
        "image/webp" => MimeClass::NeedsConversion(ConvertibleMime::Webp),
        "image/avif" => MimeClass::NeedsConversion(ConvertibleMime::Avif),
        "image/heic" => MimeClass::NeedsConversion(ConvertibleMime::Heic),
        "image/heif" => MimeClass::NeedsConversion(ConvertibleMime::Heif),
        _ => MimeClass::Unsupported,
    }
}

/// Content type a picker would declare for `path`, judged by extension.
pub fn declared_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "heic" => "image/heic",
        "heif" => "image/heif",
        _ => OCTET_STREAM,
    }
}

pub fn data_uri(mime: &str, payload_base64: &str) -> String {
    format!("data:{mime};base64,{payload_base64}")
}

/// The file exactly as the user supplied it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: Option<String>,
    pub declared_type: String,
    pub bytes: Arc<[u8]>,
}

impl SourceFile {
    pub fn new(name: Option<String>, declared_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name,
            declared_type: declared_type.into(),
            bytes: Arc::from(bytes),
        }
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|err| anyhow::anyhow!("failed reading {}: {err}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .map(str::to_string);
        Ok(Self::new(name, declared_type_for_path(path), bytes))
    }
}

/// An image ready for transmission. Only built from canonical bytes, so the
/// MIME type is always one the generation API accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    source: SourceFile,
    preview_uri: String,
    encoded: String,
    mime_type: CanonicalMime,
    dimensions: Option<(u32, u32)>,
}

impl UploadedImage {
    pub fn from_canonical_bytes(
        source: SourceFile,
        mime_type: CanonicalMime,
        canonical: &[u8],
        dimensions: Option<(u32, u32)>,
    ) -> Self {
        let encoded = BASE64.encode(canonical);
        let preview_uri = data_uri(mime_type.as_str(), &encoded);
        Self {
            source,
            preview_uri,
            encoded,
            mime_type,
            dimensions,
        }
    }

    pub fn source(&self) -> &SourceFile {
        &self.source
    }

    pub fn preview_uri(&self) -> &str {
        &self.preview_uri
    }

    /// Base64 of the canonical encoding.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    pub fn canonical_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(BASE64.decode(self.encoded.as_bytes())?)
    }

    pub fn mime_type(&self) -> CanonicalMime {
        self.mime_type
    }

    /// Known only when the normalizer decoded the source.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    pub fn was_converted(&self) -> bool {
        !matches!(
            classify_content_type(&self.source.declared_type),
            MimeClass::Accepted(_)
        )
    }
}

/// Input positions of a look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Model,
    Top,
    Bottom,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::Model, Slot::Top, Slot::Bottom];

    pub fn as_str(self) -> &'static str {
        match self {
            Slot::Model => "model",
            Slot::Top => "top",
            Slot::Bottom => "bottom",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "model" | "person" => Some(Slot::Model),
            "top" | "upper" => Some(Slot::Top),
            "bottom" | "lower" => Some(Slot::Bottom),
            _ => None,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PNG bytes of the current look.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    png: Arc<[u8]>,
}

impl GeneratedImage {
    pub fn new(png: Vec<u8>) -> Self {
        Self {
            png: Arc::from(png),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.png
    }

    pub fn encoded(&self) -> String {
        BASE64.encode(&self.png)
    }

    pub fn data_uri(&self) -> String {
        data_uri(CanonicalMime::Png.as_str(), &self.encoded())
    }
}

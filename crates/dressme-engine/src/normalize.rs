use std::path::Path;

use dressme_contracts::media::{
    classify_content_type, normalize_content_type, CanonicalMime, ConvertibleMime, MimeClass,
    SourceFile, UploadedImage,
};
use image::codecs::png::PngEncoder;
use image::{ColorType, DynamicImage, ImageFormat};
use tracing::debug;

use crate::error::{StudioError, StudioResult};

/// Turns raw bytes of a convertible encoding into pixels.
pub trait PixelDecoder: Send + Sync {
    fn decode(&self, mime: ConvertibleMime, bytes: &[u8]) -> Result<DynamicImage, String>;
}

/// Default decoder. GIF and WebP go through `image`; AVIF needs the `avif`
/// cargo feature and HEIC/HEIF need the `heif` feature (libheif).
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateDecoder;

impl PixelDecoder for ImageCrateDecoder {
    fn decode(&self, mime: ConvertibleMime, bytes: &[u8]) -> Result<DynamicImage, String> {
        let format = match mime {
            ConvertibleMime::Gif => ImageFormat::Gif,
            ConvertibleMime::Webp => ImageFormat::WebP,
            ConvertibleMime::Avif => avif_format()?,
            ConvertibleMime::Heic | ConvertibleMime::Heif => return decode_heif(bytes),
        };
        image::load_from_memory_with_format(bytes, format).map_err(|err| err.to_string())
    }
}

#[cfg(feature = "avif")]
fn avif_format() -> Result<ImageFormat, String> {
    Ok(ImageFormat::Avif)
}

#[cfg(not(feature = "avif"))]
fn avif_format() -> Result<ImageFormat, String> {
    Err("no decoder available (build with the `avif` feature)".to_string())
}

#[cfg(feature = "heif")]
fn decode_heif(bytes: &[u8]) -> Result<DynamicImage, String> {
    crate::heif::decode(bytes)
}

#[cfg(not(feature = "heif"))]
fn decode_heif(_bytes: &[u8]) -> Result<DynamicImage, String> {
    Err("no decoder available (build with the `heif` feature)".to_string())
}

/// Produces upload-ready images: PNG and JPEG pass through untouched, the
/// convertible encodings are re-encoded as PNG at native size.
pub struct ImageNormalizer {
    decoder: Box<dyn PixelDecoder>,
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageNormalizer {
    pub fn new() -> Self {
        Self::with_decoder(ImageCrateDecoder)
    }

    pub fn with_decoder<D: PixelDecoder + 'static>(decoder: D) -> Self {
        Self {
            decoder: Box::new(decoder),
        }
    }

    pub fn normalize(&self, source: SourceFile) -> StudioResult<UploadedImage> {
        match classify_content_type(&source.declared_type) {
            MimeClass::Accepted(mime) => {
                let bytes = source.bytes.clone();
                Ok(UploadedImage::from_canonical_bytes(source, mime, &bytes, None))
            }
            MimeClass::NeedsConversion(mime) => self.convert(source, mime),
            MimeClass::Unsupported => {
                let declared = normalize_content_type(&source.declared_type);
                Err(StudioError::unsupported(if declared.is_empty() {
                    "no content type".to_string()
                } else {
                    declared
                }))
            }
        }
    }

    pub fn normalize_path(&self, path: &Path) -> StudioResult<UploadedImage> {
        let source = SourceFile::from_path(path)?;
        self.normalize(source)
    }

    fn convert(&self, source: SourceFile, mime: ConvertibleMime) -> StudioResult<UploadedImage> {
        let decoded = self
            .decoder
            .decode(mime, &source.bytes)
            .map_err(|err| StudioError::conversion(format!("{mime}: {err}")))?;
        let (width, height) = (decoded.width(), decoded.height());
        if width == 0 || height == 0 {
            return Err(StudioError::conversion(format!("{mime}: empty image")));
        }
        let png = encode_png(decoded)?;
        debug!(
            from = mime.as_str(),
            width,
            height,
            png_bytes = png.len(),
            "converted upload to png"
        );
        Ok(UploadedImage::from_canonical_bytes(
            source,
            CanonicalMime::Png,
            &png,
            Some((width, height)),
        ))
    }
}

/// Encodes the full surface as PNG. Float surfaces are narrowed to 8-bit
/// RGBA first since PNG has no float sample type.
pub fn encode_png(image: DynamicImage) -> StudioResult<Vec<u8>> {
    let image = match image.color() {
        ColorType::Rgb32F | ColorType::Rgba32F => DynamicImage::ImageRgba8(image.to_rgba8()),
        _ => image,
    };
    let mut out = Vec::new();
    image
        .write_with_encoder(PngEncoder::new(&mut out))
        .map_err(|err| StudioError::conversion(format!("png encode: {err}")))?;
    Ok(out)
}

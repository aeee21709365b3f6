//! HEIC/HEIF decoding through libheif.

use image::{DynamicImage, RgbaImage};
use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

/// Decodes the primary image of a HEIF container into RGBA pixels.
pub(crate) fn decode(bytes: &[u8]) -> Result<DynamicImage, String> {
    let lib = LibHeif::new();
    let context = HeifContext::read_from_bytes(bytes).map_err(|err| err.to_string())?;
    let handle = context
        .primary_image_handle()
        .map_err(|err| err.to_string())?;
    let decoded = lib
        .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgba), None)
        .map_err(|err| err.to_string())?;

    let planes = decoded.planes();
    let plane = planes
        .interleaved
        .ok_or_else(|| "decoded image has no interleaved plane".to_string())?;
    let (width, height) = (plane.width, plane.height);
    let row_len = width as usize * 4;
    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in plane.data.chunks(plane.stride).take(height as usize) {
        pixels.extend_from_slice(row.get(..row_len).ok_or("short pixel row")?);
    }
    RgbaImage::from_raw(width, height, pixels)
        .map(DynamicImage::ImageRgba8)
        .ok_or_else(|| "pixel plane does not match image size".to_string())
}

#[cfg(test)]
mod tests {
    use dressme_contracts::media::{CanonicalMime, SourceFile};
    use libheif_rs::{Channel, ColorSpace, CompressionFormat, HeifContext, Image, LibHeif, RgbChroma};

    use crate::error::StudioError;
    use crate::normalize::ImageNormalizer;

    #[test]
    fn heic_upload_becomes_png_with_same_dimensions() -> anyhow::Result<()> {
        let lib = LibHeif::new();
        // libheif builds without an HEVC encoder cannot produce a fixture.
        let Ok(mut encoder) = lib.encoder_for_format(CompressionFormat::Hevc) else {
            return Ok(());
        };
        let mut image = Image::new(64, 48, ColorSpace::Rgb(RgbChroma::C444))?;
        for channel in [Channel::R, Channel::G, Channel::B] {
            image.create_plane(channel, 64, 48, 8)?;
        }
        let planes = image.planes_mut();
        for plane in [planes.r, planes.g, planes.b].into_iter().flatten() {
            plane.data.fill(140);
        }
        let mut context = HeifContext::new()?;
        context.encode_image(&image, &mut encoder, None)?;
        let bytes = context.write_to_bytes()?;

        let uploaded =
            ImageNormalizer::new().normalize(SourceFile::new(None, "image/heic", bytes))?;
        assert_eq!(uploaded.mime_type(), CanonicalMime::Png);
        assert_eq!(uploaded.dimensions(), Some((64, 48)));
        assert!(uploaded.was_converted());
        Ok(())
    }

    #[test]
    fn corrupt_heif_fails_conversion() {
        let result = ImageNormalizer::new().normalize(SourceFile::new(
            None,
            "image/heif",
            b"\0\0\0\x18ftypheic garbage".to_vec(),
        ));
        match result {
            Err(StudioError::ConversionFailed(detail)) => {
                assert!(detail.starts_with("image/heif"));
                assert!(!detail.contains("feature"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

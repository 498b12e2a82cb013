//! PNG data-URI codec.
//!
//! Clients submit photos as `data:image/png;base64,<payload>` text frames.
//! Only PNG is accepted; the decoded raster is re-encoded as PNG before it is
//! stored, so stored images are always well-formed regardless of encoder quirks
//! on the client.

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat};
use tracing::trace;

use narrator_core::error::{NarratorError, Result};

/// Everything before the first comma of an accepted submission.
pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64";

/// A successfully decoded photo.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    image: DynamicImage,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Re-encode as PNG.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        self.image
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(|e| NarratorError::Storage(format!("PNG re-encode failed: {e}")))?;
        Ok(buf.into_inner())
    }
}

/// Decode a `data:image/png;base64,...` submission.
///
/// Fails with [`NarratorError::Format`] when the prefix is wrong, the payload is
/// not valid base64, or the bytes are not a PNG image.
pub fn decode_data_uri(data: &str) -> Result<DecodedImage> {
    let (prefix, payload) = data
        .split_once(',')
        .ok_or_else(|| NarratorError::Format("not a data URI".into()))?;

    if prefix != PNG_DATA_URI_PREFIX {
        return Err(NarratorError::Format(format!(
            "unsupported data URI prefix '{}'",
            truncate(prefix, 64)
        )));
    }

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| NarratorError::Format(format!("invalid base64 payload: {e}")))?;

    let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
        .map_err(|e| NarratorError::Format(format!("not a PNG image: {e}")))?;

    trace!(
        width = image.width(),
        height = image.height(),
        bytes = bytes.len(),
        "Decoded PNG submission"
    );
    Ok(DecodedImage { image })
}

/// Wrap PNG bytes in the data-URI form clients submit.
pub fn to_data_uri(png: &[u8]) -> String {
    format!("{PNG_DATA_URI_PREFIX},{}", STANDARD.encode(png))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn solid_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_decode_valid_png() {
        let uri = to_data_uri(&solid_png(10, 10, [200, 30, 30]));
        let decoded = decode_data_uri(&uri).unwrap();
        assert_eq!(decoded.width(), 10);
        assert_eq!(decoded.height(), 10);
    }

    #[test]
    fn test_reencode_preserves_pixels() {
        let original = solid_png(7, 3, [1, 2, 3]);
        let decoded = decode_data_uri(&to_data_uri(&original)).unwrap();
        let reencoded = decoded.encode_png().unwrap();

        let again = image::load_from_memory_with_format(&reencoded, ImageFormat::Png).unwrap();
        assert_eq!(again.width(), 7);
        assert_eq!(again.height(), 3);
        assert_eq!(again.to_rgb8(), decoded.image().to_rgb8());
        assert_eq!(again.to_rgb8().get_pixel(6, 2), &Rgb([1, 2, 3]));
    }

    #[test]
    fn test_rejects_missing_comma() {
        let err = decode_data_uri("not-an-image").unwrap_err();
        assert!(matches!(err, NarratorError::Format(_)));
    }

    #[test]
    fn test_rejects_other_prefixes() {
        let payload = STANDARD.encode(solid_png(2, 2, [0, 0, 0]));
        for prefix in [
            "data:image/jpeg;base64",
            "data:image/PNG;base64",
            " data:image/png;base64",
            "data:image/png",
        ] {
            let err = decode_data_uri(&format!("{prefix},{payload}")).unwrap_err();
            assert!(matches!(err, NarratorError::Format(_)), "prefix {prefix:?}");
        }
    }

    #[test]
    fn test_rejects_bad_base64() {
        let err = decode_data_uri("data:image/png;base64,@@not base64@@").unwrap_err();
        assert!(matches!(err, NarratorError::Format(_)));
    }

    #[test]
    fn test_rejects_non_image_bytes() {
        let uri = format!(
            "data:image/png;base64,{}",
            STANDARD.encode(b"definitely not a png")
        );
        let err = decode_data_uri(&uri).unwrap_err();
        assert!(matches!(err, NarratorError::Format(_)));
    }

    #[test]
    fn test_rejects_empty_payload() {
        let err = decode_data_uri("data:image/png;base64,").unwrap_err();
        assert!(matches!(err, NarratorError::Format(_)));
    }
}

//! Independent QR readers used to check rendered symbols in tests.

use image::{DynamicImage, GrayImage, Luma};
use rxing::common::{GlobalHistogramBinarizer, HybridBinarizer};
use rxing::{
    BarcodeFormat, Binarizer, BinaryBitmap, DecodeHints, Luma8LuminanceSource, MultiFormatReader, Reader,
    RXingResultMetadataType, RXingResultMetadataValue,
};
use std::collections::HashSet;

use crate::matrix::Matrix;
use crate::types::ErrorCorrectionLevel;

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub content: String,
    pub level: Option<ErrorCorrectionLevel>,
    /// Only rqrr reports the version.
    pub version: Option<usize>,
}

fn rxing_hints() -> DecodeHints {
    DecodeHints {
        AlsoInverted: Some(true),
        TryHarder: Some(true),
        PossibleFormats: Some(HashSet::from([BarcodeFormat::QR_CODE])),
        ..DecodeHints::default()
    }
}

fn decode_rxing_with<B, F>(luma_data: &[u8], width: u32, height: u32, make_binarizer: F) -> Option<Decoded>
where
    B: Binarizer + 'static,
    F: FnOnce(Luma8LuminanceSource) -> B + Send + 'static,
{
    let luma = luma_data.to_vec();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
        let source = Luma8LuminanceSource::new(luma, width, height);
        let mut bitmap = BinaryBitmap::new(make_binarizer(source));
        MultiFormatReader::default().decode_with_hints(&mut bitmap, &rxing_hints())
    }));
    let r = result.ok()?.ok()?;

    let level = r
        .getRXingResultMetadata()
        .get(&RXingResultMetadataType::ERROR_CORRECTION_LEVEL)
        .and_then(|v| match v {
            RXingResultMetadataValue::ErrorCorrectionLevel(s) => s.parse().ok(),
            _ => None,
        });

    Some(Decoded {
        content: r.getText().to_string(),
        level,
        version: None,
    })
}

/// rqrr reports the raw format-info level bits.
fn rqrr_level(level: u16) -> Option<ErrorCorrectionLevel> {
    ErrorCorrectionLevel::from_format_bits(u32::from(level))
}

pub fn decode_rqrr(luma: GrayImage) -> Option<Decoded> {
    let mut prepared = rqrr::PreparedImage::prepare(luma);
    let grids = prepared.detect_grids();
    let (meta, content) = grids.first()?.decode().ok()?;
    Some(Decoded {
        content,
        level: rqrr_level(meta.ecc_level),
        version: Some(meta.version.0),
    })
}

/// rxing hybrid, rxing global histogram, rqrr, then rqrr on the inverted image.
pub fn try_decode(img: &DynamicImage) -> Option<Decoded> {
    let luma = img.to_luma8();
    let (width, height) = luma.dimensions();
    let luma_data = luma.as_raw().clone();

    decode_rxing_with(&luma_data, width, height, HybridBinarizer::new)
        .or_else(|| decode_rxing_with(&luma_data, width, height, GlobalHistogramBinarizer::new))
        .or_else(|| decode_rqrr(luma.clone()))
        .or_else(|| {
            let inverted = GrayImage::from_fn(width, height, |x, y| Luma([255 - luma.get_pixel(x, y)[0]]));
            decode_rqrr(inverted)
        })
}

pub fn decode_bytes(image_bytes: &[u8]) -> Option<Decoded> {
    try_decode(&image::load_from_memory(image_bytes).ok()?)
}

/// Plain black-on-white rendering of a matrix with a four-module quiet zone.
pub fn matrix_image(matrix: &Matrix, scale: u32) -> GrayImage {
    let quiet = 4;
    let side = (matrix.size() as u32 + 2 * quiet) * scale;
    GrayImage::from_fn(side, side, |px, py| {
        let (mx, my) = ((px / scale) as isize - quiet as isize, (py / scale) as isize - quiet as isize);
        if matrix.is_dark_at(mx, my) { Luma([0]) } else { Luma([255]) }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_qr() -> DynamicImage {
        let code = qrcode::QrCode::new(b"https://example.com").unwrap();
        DynamicImage::ImageLuma8(code.render::<Luma<u8>>().build())
    }

    #[test]
    fn reads_reference_symbol() {
        let decoded = try_decode(&reference_qr()).unwrap();
        assert_eq!(decoded.content, "https://example.com");
    }

    #[test]
    fn rqrr_reports_version_and_level() {
        let decoded = decode_rqrr(reference_qr().to_luma8()).unwrap();
        assert_eq!(decoded.content, "https://example.com");
        assert!(decoded.version.is_some());
        assert!(decoded.level.is_some());
    }

    #[test]
    fn rqrr_level_mapping() {
        assert_eq!(rqrr_level(0), Some(ErrorCorrectionLevel::M));
        assert_eq!(rqrr_level(1), Some(ErrorCorrectionLevel::L));
        assert_eq!(rqrr_level(2), Some(ErrorCorrectionLevel::H));
        assert_eq!(rqrr_level(3), Some(ErrorCorrectionLevel::Q));
    }

    #[test]
    fn blank_image_does_not_decode() {
        assert!(try_decode(&DynamicImage::new_luma8(100, 100)).is_none());
        assert!(decode_bytes(b"not an image at all").is_none());
    }
}

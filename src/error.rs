use thiserror::Error;

use crate::types::{ErrorCorrectionLevel, ExportFormat, Mode, OutputBackend};

#[derive(Debug, Error)]
pub enum QrStyleError {
    #[error("Data too long: {needed_bits} bits needed, version {version} at level {level} holds {capacity_bits}")]
    CapacityExceeded {
        needed_bits: usize,
        capacity_bits: usize,
        version: u8,
        level: ErrorCorrectionLevel,
    },

    #[error("Character {character:?} cannot be encoded in {mode} mode")]
    InvalidCharacterForMode { character: char, mode: Mode },

    #[error("Unsupported version {0}: must be within 1..=40")]
    UnsupportedVersion(u8),

    #[error("Image too large: {reason}")]
    ImageTooLarge { reason: String },

    #[error("{backend} output cannot be exported as {format}")]
    UnsupportedOutputFormat {
        backend: OutputBackend,
        format: ExportFormat,
    },

    #[error("Failed to load image: {0}")]
    ImageLoad(String),

    #[error("Invalid SVG: {0}")]
    InvalidSvg(String),

    #[error("Failed to rasterize SVG")]
    RenderFailed,

    #[error("Image too large: {width}x{height} exceeds maximum {max_dimension}x{max_dimension}")]
    DimensionsTooLarge {
        width: u32,
        height: u32,
        max_dimension: u32,
    },

    #[error("Failed to encode {format}: {message}")]
    Encode { format: ExportFormat, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, QrStyleError>;

//! Mode selection and serialization of the payload into data codewords.

use tracing::debug;

use crate::error::{QrStyleError, Result};
use crate::tables::Version;
use crate::types::{ErrorCorrectionLevel, Mode, QrOptions};

pub const ALPHANUMERIC_CHARSET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ $%*+-./:";

const PAD_BYTES: [u32; 2] = [0xEC, 0x11];

/// Growable MSB-first bit sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitBuffer(Vec<bool>);

impl BitBuffer {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn append_bits(&mut self, value: u32, len: usize) {
        debug_assert!(len <= 31 && value >> len == 0, "value {value} does not fit {len} bits");
        self.0.extend((0..len).rev().map(|i| (value >> i) & 1 != 0));
    }

    pub fn extend(&mut self, other: &BitBuffer) {
        self.0.extend_from_slice(&other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn bits(&self) -> &[bool] {
        &self.0
    }

    /// Reads `len` bits starting at `start` as an unsigned integer.
    pub fn read(&self, start: usize, len: usize) -> u32 {
        self.0[start..start + len]
            .iter()
            .fold(0, |acc, &bit| acc << 1 | u32::from(bit))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0
            .chunks(8)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .fold(0u8, |byte, (i, &bit)| byte | u8::from(bit) << (7 - i))
            })
            .collect()
    }
}

/// Payload characters serialized in one mode, without header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub mode: Mode,
    pub num_chars: usize,
    pub data: BitBuffer,
}

impl Segment {
    /// Bits taken by the segment at `version`, header included. `None` when the
    /// character count overflows the count indicator.
    pub fn total_bits(&self, version: Version) -> Option<usize> {
        let cc_bits = version.char_count_bits(self.mode);
        if self.num_chars >= 1 << cc_bits {
            return None;
        }
        Some(4 + cc_bits + self.data.len())
    }
}

fn mode_indicator(mode: Mode) -> u32 {
    match mode {
        Mode::Numeric => 0b0001,
        Mode::Alphanumeric => 0b0010,
        Mode::Byte => 0b0100,
        Mode::Kanji => 0b1000,
    }
}

pub fn is_numeric(text: &str) -> bool {
    text.chars().all(|c| c.is_ascii_digit())
}

pub fn is_alphanumeric(text: &str) -> bool {
    text.chars().all(|c| ALPHANUMERIC_CHARSET.contains(c))
}

/// Cheapest mode able to carry every character of `text`. Kanji is never picked here.
pub fn select_mode(text: &str) -> Mode {
    if is_numeric(text) {
        Mode::Numeric
    } else if is_alphanumeric(text) {
        Mode::Alphanumeric
    } else {
        Mode::Byte
    }
}

pub fn make_segment(text: &str, mode: Mode) -> Result<Segment> {
    match mode {
        Mode::Numeric => make_numeric(text),
        Mode::Alphanumeric => make_alphanumeric(text),
        Mode::Byte => Ok(make_bytes(text.as_bytes())),
        Mode::Kanji => make_kanji(text),
    }
}

fn make_numeric(text: &str) -> Result<Segment> {
    let mut data = BitBuffer::new();
    let mut accum = 0u32;
    let mut count = 0usize;
    for c in text.chars() {
        let digit = c.to_digit(10).filter(|_| c.is_ascii_digit()).ok_or(
            QrStyleError::InvalidCharacterForMode { character: c, mode: Mode::Numeric },
        )?;
        accum = accum * 10 + digit;
        count += 1;
        if count == 3 {
            data.append_bits(accum, 10);
            accum = 0;
            count = 0;
        }
    }
    if count > 0 {
        data.append_bits(accum, count * 3 + 1);
    }
    Ok(Segment { mode: Mode::Numeric, num_chars: text.len(), data })
}

fn make_alphanumeric(text: &str) -> Result<Segment> {
    let mut data = BitBuffer::new();
    let mut accum = 0u32;
    let mut count = 0usize;
    let mut num_chars = 0usize;
    for c in text.chars() {
        let value = ALPHANUMERIC_CHARSET.find(c).ok_or(QrStyleError::InvalidCharacterForMode {
            character: c,
            mode: Mode::Alphanumeric,
        })?;
        accum = accum * 45 + value as u32;
        count += 1;
        num_chars += 1;
        if count == 2 {
            data.append_bits(accum, 11);
            accum = 0;
            count = 0;
        }
    }
    if count > 0 {
        data.append_bits(accum, 6);
    }
    Ok(Segment { mode: Mode::Alphanumeric, num_chars, data })
}

fn make_bytes(bytes: &[u8]) -> Segment {
    let mut data = BitBuffer::new();
    for &b in bytes {
        data.append_bits(u32::from(b), 8);
    }
    Segment { mode: Mode::Byte, num_chars: bytes.len(), data }
}

/// Shift JIS double-byte code of `c`, restricted to the two ranges kanji mode covers.
fn shift_jis_code(c: char) -> Option<u32> {
    let mut utf8 = [0u8; 4];
    let (bytes, _, unmappable) = encoding_rs::SHIFT_JIS.encode(c.encode_utf8(&mut utf8));
    if unmappable || bytes.len() != 2 {
        return None;
    }
    let code = u32::from(bytes[0]) << 8 | u32::from(bytes[1]);
    matches!(code, 0x8140..=0x9FFC | 0xE040..=0xEBBF).then_some(code)
}

fn make_kanji(text: &str) -> Result<Segment> {
    let mut data = BitBuffer::new();
    let mut num_chars = 0usize;
    for c in text.chars() {
        let code = shift_jis_code(c)
            .ok_or(QrStyleError::InvalidCharacterForMode { character: c, mode: Mode::Kanji })?;
        let offset = if code <= 0x9FFC { code - 0x8140 } else { code - 0xC140 };
        data.append_bits((offset >> 8) * 0xC0 + (offset & 0xFF), 13);
        num_chars += 1;
    }
    Ok(Segment { mode: Mode::Kanji, num_chars, data })
}

/// Payload serialized and padded to the full data capacity of `version`.
#[derive(Debug, Clone)]
pub struct EncodedData {
    pub version: Version,
    pub level: ErrorCorrectionLevel,
    pub mode: Mode,
    /// Bits used by header and payload, before terminator and padding.
    pub payload_bits: usize,
    pub bits: BitBuffer,
}

impl EncodedData {
    pub fn codewords(&self) -> Vec<u8> {
        self.bits.to_bytes()
    }
}

/// Picks the mode and the smallest fitting version, then builds the padded bit stream.
pub fn encode(text: &str, options: &QrOptions) -> Result<EncodedData> {
    let level = options.error_correction_level;
    let mode = options.mode.unwrap_or_else(|| select_mode(text));
    let segment = make_segment(text, mode)?;

    let (first, last) = match options.version {
        Some(forced) => {
            let version = Version::new(forced)?;
            (version, version)
        }
        None => (Version::MIN, Version::MAX),
    };

    let mut version = first;
    let payload_bits = loop {
        let capacity_bits = version.data_capacity_bits(level);
        let used = segment.total_bits(version);
        match used {
            Some(bits) if bits <= capacity_bits => break bits,
            _ => match version.next().filter(|next| *next <= last) {
                Some(next) => version = next,
                None => {
                    return Err(QrStyleError::CapacityExceeded {
                        needed_bits: used.unwrap_or(usize::MAX),
                        capacity_bits,
                        version: version.value(),
                        level,
                    });
                }
            },
        }
    };

    let capacity_bits = version.data_capacity_bits(level);
    let mut bits = BitBuffer::new();
    bits.append_bits(mode_indicator(mode), 4);
    bits.append_bits(segment.num_chars as u32, version.char_count_bits(mode));
    bits.extend(&segment.data);
    debug_assert_eq!(bits.len(), payload_bits);

    let terminator = (capacity_bits - bits.len()).min(4);
    bits.append_bits(0, terminator);
    let boundary = bits.len().wrapping_neg() & 7;
    bits.append_bits(0, boundary);
    for &pad in PAD_BYTES.iter().cycle() {
        if bits.len() >= capacity_bits {
            break;
        }
        bits.append_bits(pad, 8);
    }
    debug_assert_eq!(bits.len(), capacity_bits);

    debug!(%mode, %version, %level, payload_bits, capacity_bits, "encoded payload");

    Ok(EncodedData { version, level, mode, payload_bits, bits })
}

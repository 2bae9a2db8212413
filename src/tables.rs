//! Static per-version symbol data: block structure, module counts and capacities.

use crate::error::{QrStyleError, Result};
use crate::types::{ErrorCorrectionLevel, Mode};

/// Symbol version, 1 through 40.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u8);

impl Version {
    pub const MIN: Version = Version(1);
    pub const MAX: Version = Version(40);

    pub fn new(value: u8) -> Result<Self> {
        if (Self::MIN.0..=Self::MAX.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(QrStyleError::UnsupportedVersion(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Modules per side.
    pub fn size(self) -> usize {
        17 + 4 * usize::from(self.0)
    }

    pub(crate) fn next(self) -> Option<Self> {
        (self < Self::MAX).then(|| Self(self.0 + 1))
    }

    pub fn ec_codewords_per_block(self, level: ErrorCorrectionLevel) -> usize {
        ECC_CODEWORDS_PER_BLOCK[level.ordinal()][usize::from(self.0)] as usize
    }

    pub fn num_blocks(self, level: ErrorCorrectionLevel) -> usize {
        NUM_ERROR_CORRECTION_BLOCKS[level.ordinal()][usize::from(self.0)] as usize
    }

    /// Modules left for codewords once every function pattern is drawn,
    /// remainder bits included.
    pub fn raw_data_modules(self) -> usize {
        let ver = usize::from(self.0);
        let mut result = (16 * ver + 128) * ver + 64;
        if ver >= 2 {
            let num_align = ver / 7 + 2;
            result -= (25 * num_align - 10) * num_align - 55;
            if ver >= 7 {
                result -= 36;
            }
        }
        result
    }

    pub fn total_codewords(self) -> usize {
        self.raw_data_modules() / 8
    }

    pub fn data_codewords(self, level: ErrorCorrectionLevel) -> usize {
        self.total_codewords() - self.ec_codewords_per_block(level) * self.num_blocks(level)
    }

    pub fn data_capacity_bits(self, level: ErrorCorrectionLevel) -> usize {
        self.data_codewords(level) * 8
    }

    /// Centers of the alignment patterns along one axis, ascending.
    pub fn alignment_positions(self) -> Vec<usize> {
        let ver = usize::from(self.0);
        if ver == 1 {
            return Vec::new();
        }
        let num_align = ver / 7 + 2;
        let step = if ver == 32 {
            26
        } else {
            (ver * 4 + num_align * 2 + 1) / (num_align * 2 - 2) * 2
        };
        let size = self.size();
        let mut positions: Vec<usize> = (0..num_align - 1).map(|i| size - 7 - i * step).collect();
        positions.push(6);
        positions.reverse();
        positions
    }

    /// Width of the character count indicator.
    pub fn char_count_bits(self, mode: Mode) -> usize {
        let column = match self.0 {
            1..=9 => 0,
            10..=26 => 1,
            _ => 2,
        };
        let widths = match mode {
            Mode::Numeric => [10, 12, 14],
            Mode::Alphanumeric => [9, 11, 13],
            Mode::Byte => [8, 16, 16],
            Mode::Kanji => [8, 10, 12],
        };
        widths[column]
    }

    /// Largest number of characters of `mode` that fit under `level`.
    pub fn char_capacity(self, mode: Mode, level: ErrorCorrectionLevel) -> usize {
        let available = self
            .data_capacity_bits(level)
            .saturating_sub(4 + self.char_count_bits(mode));
        let by_bits = match mode {
            Mode::Numeric => {
                let groups = available / 10 * 3;
                groups
                    + match available % 10 {
                        7..=9 => 2,
                        4..=6 => 1,
                        _ => 0,
                    }
            }
            Mode::Alphanumeric => available / 11 * 2 + usize::from(available % 11 >= 6),
            Mode::Byte => available / 8,
            Mode::Kanji => available / 13,
        };
        by_bits.min((1 << self.char_count_bits(mode)) - 1)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

static ECC_CODEWORDS_PER_BLOCK: [[i8; 41]; 4] = [
    [-1,  7, 10, 15, 20, 26, 18, 20, 24, 30, 18, 20, 24, 26, 30, 22, 24, 28, 30, 28, 28, 28, 28, 30, 30, 26, 28, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30],
    [-1, 10, 16, 26, 18, 24, 16, 18, 22, 22, 26, 30, 22, 22, 24, 24, 28, 28, 26, 26, 26, 26, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28],
    [-1, 13, 22, 18, 26, 18, 24, 18, 22, 20, 24, 28, 26, 24, 20, 30, 24, 28, 28, 26, 30, 28, 30, 30, 30, 30, 28, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30],
    [-1, 17, 28, 22, 16, 22, 28, 26, 26, 24, 28, 24, 28, 22, 24, 24, 30, 28, 28, 26, 28, 30, 24, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30],
];

static NUM_ERROR_CORRECTION_BLOCKS: [[i8; 41]; 4] = [
    [-1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 4,  4,  4,  4,  4,  6,  6,  6,  6,  7,  8,  8,  9,  9, 10, 12, 12, 12, 13, 14, 15, 16, 17, 18, 19, 19, 20, 21, 22, 24, 25],
    [-1, 1, 1, 1, 2, 2, 4, 4, 4, 5, 5,  5,  8,  9,  9, 10, 10, 11, 13, 14, 16, 17, 17, 18, 20, 21, 23, 25, 26, 28, 29, 31, 33, 35, 37, 38, 40, 43, 45, 47, 49],
    [-1, 1, 1, 2, 2, 4, 4, 6, 6, 8, 8,  8, 10, 12, 16, 12, 17, 16, 18, 21, 20, 23, 23, 25, 27, 29, 34, 34, 35, 38, 40, 43, 45, 48, 51, 53, 56, 59, 62, 65, 68],
    [-1, 1, 1, 2, 4, 4, 4, 5, 6, 8, 8, 11, 11, 16, 16, 18, 16, 19, 21, 25, 25, 25, 34, 30, 32, 35, 37, 40, 42, 45, 48, 51, 54, 57, 60, 63, 66, 70, 74, 77, 81],
];

//! Module matrix: function patterns, codeword placement, masking and format/version info.
//!
//! Coordinates are `(x, y)` with `x` the column and `y` the row, origin top-left.

use tracing::{debug, trace};

use crate::ecc;
use crate::encoder::EncodedData;
use crate::error::{QrStyleError, Result};
use crate::tables::Version;
use crate::types::ErrorCorrectionLevel;

const PENALTY_N1: i32 = 3;
const PENALTY_N2: i32 = 3;
const PENALTY_N3: i32 = 40;
const PENALTY_N4: i32 = 10;

const FORMAT_GENERATOR: u32 = 0x537;
const FORMAT_MASK: u32 = 0x5412;
const VERSION_GENERATOR: u32 = 0x1F25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleRole {
    Finder,
    Separator,
    Timing,
    Alignment,
    FormatInfo,
    VersionInfo,
    Data,
}

impl ModuleRole {
    /// Everything but data cells is fixed by the standard.
    pub fn is_reserved(self) -> bool {
        self != Self::Data
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    version: Version,
    level: ErrorCorrectionLevel,
    size: usize,
    mask: u8,
    dark: Vec<bool>,
    roles: Vec<ModuleRole>,
}

impl Matrix {
    /// Builds the final symbol for already encoded data.
    pub fn build(encoded: &EncodedData, forced_mask: Option<u8>) -> Result<Self> {
        let codewords = ecc::add_ecc_and_interleave(&encoded.codewords(), encoded.version, encoded.level);
        Self::from_codewords(encoded.version, encoded.level, &codewords, forced_mask)
    }

    /// Lays out interleaved codewords (data followed by parity) and masks them.
    pub fn from_codewords(
        version: Version,
        level: ErrorCorrectionLevel,
        codewords: &[u8],
        forced_mask: Option<u8>,
    ) -> Result<Self> {
        if let Some(mask) = forced_mask.filter(|&m| m > 7) {
            return Err(QrStyleError::Config(format!("mask pattern {mask} is outside 0..=7")));
        }
        assert_eq!(codewords.len(), version.total_codewords(), "codeword count for version {version}");

        let mut matrix = Self::with_function_patterns(version, level);
        matrix.place_codewords(codewords);

        let mask = match forced_mask {
            Some(mask) => mask,
            None => matrix.select_mask(),
        };
        matrix.apply_mask(mask);
        matrix.draw_format_bits(mask);
        matrix.mask = mask;
        debug!(%version, %level, mask, size = matrix.size, "built matrix");
        Ok(matrix)
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn level(&self) -> ErrorCorrectionLevel {
        self.level
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn mask(&self) -> u8 {
        self.mask
    }

    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        self.dark[y * self.size + x]
    }

    pub fn role(&self, x: usize, y: usize) -> ModuleRole {
        self.roles[y * self.size + x]
    }

    /// Dark test that treats everything outside the symbol as light.
    pub fn is_dark_at(&self, x: isize, y: isize) -> bool {
        let size = self.size as isize;
        (0..size).contains(&x) && (0..size).contains(&y) && self.is_dark(x as usize, y as usize)
    }

    fn with_function_patterns(version: Version, level: ErrorCorrectionLevel) -> Self {
        let size = version.size();
        let mut matrix = Self {
            version,
            level,
            size,
            mask: 0,
            dark: vec![false; size * size],
            roles: vec![ModuleRole::Data; size * size],
        };
        matrix.draw_function_patterns();
        matrix
    }

    fn set_function(&mut self, x: usize, y: usize, dark: bool, role: ModuleRole) {
        let idx = y * self.size + x;
        self.dark[idx] = dark;
        self.roles[idx] = role;
    }

    fn draw_function_patterns(&mut self) {
        let size = self.size;
        for i in 0..size {
            self.set_function(6, i, i % 2 == 0, ModuleRole::Timing);
            self.set_function(i, 6, i % 2 == 0, ModuleRole::Timing);
        }

        self.draw_finder_pattern(3, 3);
        self.draw_finder_pattern(size - 4, 3);
        self.draw_finder_pattern(3, size - 4);

        let positions = self.version.alignment_positions();
        let last = positions.len().saturating_sub(1);
        for (i, &x) in positions.iter().enumerate() {
            for (j, &y) in positions.iter().enumerate() {
                let on_finder = (i == 0 && j == 0) || (i == 0 && j == last) || (i == last && j == 0);
                if !on_finder {
                    self.draw_alignment_pattern(x, y);
                }
            }
        }

        // Reserve the format area; the real bits are written once the mask is known.
        self.draw_format_bits(0);
        self.draw_version();
    }

    fn draw_finder_pattern(&mut self, cx: usize, cy: usize) {
        let size = self.size as isize;
        for dy in -4isize..=4 {
            for dx in -4isize..=4 {
                let x = cx as isize + dx;
                let y = cy as isize + dy;
                if !(0..size).contains(&x) || !(0..size).contains(&y) {
                    continue;
                }
                let dist = dx.abs().max(dy.abs());
                let role = if dist == 4 { ModuleRole::Separator } else { ModuleRole::Finder };
                self.set_function(x as usize, y as usize, dist != 2 && dist != 4, role);
            }
        }
    }

    fn draw_alignment_pattern(&mut self, cx: usize, cy: usize) {
        for dy in -2isize..=2 {
            for dx in -2isize..=2 {
                let x = (cx as isize + dx) as usize;
                let y = (cy as isize + dy) as usize;
                self.set_function(x, y, dx.abs().max(dy.abs()) != 1, ModuleRole::Alignment);
            }
        }
    }

    fn draw_format_bits(&mut self, mask: u8) {
        let bits = format_bits(self.level, mask);
        let bit = |i: usize| (bits >> i) & 1 != 0;
        let role = ModuleRole::FormatInfo;
        let size = self.size;

        for i in 0..6 {
            self.set_function(8, i, bit(i), role);
        }
        self.set_function(8, 7, bit(6), role);
        self.set_function(8, 8, bit(7), role);
        self.set_function(7, 8, bit(8), role);
        for i in 9..15 {
            self.set_function(14 - i, 8, bit(i), role);
        }

        for i in 0..8 {
            self.set_function(size - 1 - i, 8, bit(i), role);
        }
        for i in 8..15 {
            self.set_function(8, size - 15 + i, bit(i), role);
        }
        self.set_function(8, size - 8, true, role);
    }

    fn draw_version(&mut self) {
        let Some(bits) = version_bits(self.version) else { return };
        for i in 0..18 {
            let dark = (bits >> i) & 1 != 0;
            let a = self.size - 11 + i % 3;
            let b = i / 3;
            self.set_function(a, b, dark, ModuleRole::VersionInfo);
            self.set_function(b, a, dark, ModuleRole::VersionInfo);
        }
    }

    /// Zig-zag over column pairs from the right edge, skipping the vertical timing column.
    /// Remainder bits stay light.
    fn place_codewords(&mut self, codewords: &[u8]) {
        let size = self.size;
        let total_bits = codewords.len() * 8;
        let mut i = 0;
        let mut right = size as isize - 1;
        while right >= 1 {
            if right == 6 {
                right = 5;
            }
            let upward = (right + 1) & 2 == 0;
            for vert in 0..size {
                let y = if upward { size - 1 - vert } else { vert };
                for j in 0..2 {
                    let x = right as usize - j;
                    let idx = y * size + x;
                    if self.roles[idx] == ModuleRole::Data && i < total_bits {
                        self.dark[idx] = (codewords[i >> 3] >> (7 - (i & 7))) & 1 != 0;
                        i += 1;
                    }
                }
            }
            right -= 2;
        }
        assert_eq!(i, total_bits, "codeword placement overflowed the data region");
    }

    fn apply_mask(&mut self, mask: u8) {
        let size = self.size;
        for y in 0..size {
            for x in 0..size {
                let idx = y * size + x;
                if self.roles[idx] == ModuleRole::Data && mask_bit(mask, x, y) {
                    self.dark[idx] = !self.dark[idx];
                }
            }
        }
    }

    /// Lowest penalty wins; ties resolve to the lowest pattern index.
    fn select_mask(&mut self) -> u8 {
        let mut best = (i32::MAX, 0u8);
        for mask in 0..8u8 {
            self.apply_mask(mask);
            self.draw_format_bits(mask);
            let penalty = self.penalty_score();
            trace!(mask, penalty, "mask candidate");
            if penalty < best.0 {
                best = (penalty, mask);
            }
            self.apply_mask(mask);
        }
        best.1
    }

    /// Total of the four penalty rules for the current module colors.
    pub fn penalty_score(&self) -> i32 {
        let size = self.size;
        let mut result = 0;

        for horizontal in [true, false] {
            for a in 0..size {
                let at = |b: usize| if horizontal { self.is_dark(b, a) } else { self.is_dark(a, b) };
                let mut run_color = false;
                let mut run_len = 0i32;
                let mut history = FinderPenalty::new(size as i32);
                for b in 0..size {
                    if at(b) == run_color {
                        run_len += 1;
                        if run_len == 5 {
                            result += PENALTY_N1;
                        } else if run_len > 5 {
                            result += 1;
                        }
                    } else {
                        history.add_history(run_len);
                        if !run_color {
                            result += history.count_patterns() * PENALTY_N3;
                        }
                        run_color = at(b);
                        run_len = 1;
                    }
                }
                result += history.terminate_and_count(run_color, run_len) * PENALTY_N3;
            }
        }

        for y in 0..size - 1 {
            for x in 0..size - 1 {
                let color = self.is_dark(x, y);
                if color == self.is_dark(x + 1, y)
                    && color == self.is_dark(x, y + 1)
                    && color == self.is_dark(x + 1, y + 1)
                {
                    result += PENALTY_N2;
                }
            }
        }

        let dark = self.dark.iter().filter(|&&d| d).count() as i32;
        let total = (size * size) as i32;
        // Smallest k with |dark/total - 1/2| <= (k + 1) / 20.
        let k = ((dark * 20 - total * 10).abs() + total - 1) / total - 1;
        result += k * PENALTY_N4;
        result
    }
}

/// Whether mask pattern `mask` inverts the module at column `x`, row `y`.
pub fn mask_bit(mask: u8, x: usize, y: usize) -> bool {
    match mask {
        0 => (x + y) % 2 == 0,
        1 => y % 2 == 0,
        2 => x % 3 == 0,
        3 => (x + y) % 3 == 0,
        4 => (x / 3 + y / 2) % 2 == 0,
        5 => x * y % 2 + x * y % 3 == 0,
        6 => (x * y % 2 + x * y % 3) % 2 == 0,
        7 => ((x + y) % 2 + x * y % 3) % 2 == 0,
        _ => unreachable!("mask pattern {mask} out of range"),
    }
}

/// 15-bit format word: level and mask, BCH(15,5) parity, fixed XOR mask.
pub fn format_bits(level: ErrorCorrectionLevel, mask: u8) -> u32 {
    let data = level.format_bits() << 3 | u32::from(mask);
    let mut rem = data;
    for _ in 0..10 {
        rem = (rem << 1) ^ ((rem >> 9) * FORMAT_GENERATOR);
    }
    (data << 10 | rem) ^ FORMAT_MASK
}

/// 18-bit version word with BCH(18,6) parity; only versions 7 and up carry one.
pub fn version_bits(version: Version) -> Option<u32> {
    if version.value() < 7 {
        return None;
    }
    let data = u32::from(version.value());
    let mut rem = data;
    for _ in 0..12 {
        rem = (rem << 1) ^ ((rem >> 11) * VERSION_GENERATOR);
    }
    Some(data << 12 | rem)
}

/// Run-length history for rule N3 (1:1:3:1:1 with four light modules on a side).
struct FinderPenalty {
    size: i32,
    run_history: [i32; 7],
}

impl FinderPenalty {
    fn new(size: i32) -> Self {
        Self { size, run_history: [0; 7] }
    }

    fn add_history(&mut self, mut run_len: i32) {
        if self.run_history[0] == 0 {
            // Light border before the first run.
            run_len += self.size;
        }
        self.run_history.copy_within(0..6, 1);
        self.run_history[0] = run_len;
    }

    fn count_patterns(&self) -> i32 {
        let rh = &self.run_history;
        let n = rh[1];
        let core = n > 0 && rh[2] == n && rh[3] == n * 3 && rh[4] == n && rh[5] == n;
        i32::from(core && rh[0] >= n * 4 && rh[6] >= n) + i32::from(core && rh[6] >= n * 4 && rh[0] >= n)
    }

    fn terminate_and_count(mut self, run_color: bool, mut run_len: i32) -> i32 {
        if run_color {
            self.add_history(run_len);
            run_len = 0;
        }
        run_len += self.size;
        self.add_history(run_len);
        self.count_patterns()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder;
    use crate::types::{Mode, QrOptions};

    fn build(text: &str, level: ErrorCorrectionLevel, version: Option<u8>) -> Matrix {
        let options = QrOptions { version, error_correction_level: level, ..QrOptions::default() };
        Matrix::build(&encoder::encode(text, &options).unwrap(), None).unwrap()
    }

    fn hamming(a: u32, b: u32) -> u32 {
        (a ^ b).count_ones()
    }

    /// Nearest valid format word to what is read from one copy.
    fn decode_format(word: u32) -> (ErrorCorrectionLevel, u8) {
        let (level, mask) = (0..4u32)
            .flat_map(|l| (0..8u8).map(move |m| (l, m)))
            .filter_map(|(l, m)| ErrorCorrectionLevel::from_format_bits(l).map(|level| (level, m)))
            .min_by_key(|&(level, mask)| hamming(format_bits(level, mask), word))
            .unwrap();
        (level, mask)
    }

    fn read_format_copies(m: &Matrix) -> (u32, u32) {
        let size = m.size();
        let mut first = 0u32;
        let mut second = 0u32;
        let put = |word: &mut u32, i: usize, dark: bool| *word |= u32::from(dark) << i;
        for i in 0..6 {
            put(&mut first, i, m.is_dark(8, i));
        }
        put(&mut first, 6, m.is_dark(8, 7));
        put(&mut first, 7, m.is_dark(8, 8));
        put(&mut first, 8, m.is_dark(7, 8));
        for i in 9..15 {
            put(&mut first, i, m.is_dark(14 - i, 8));
        }
        for i in 0..8 {
            put(&mut second, i, m.is_dark(size - 1 - i, 8));
        }
        for i in 8..15 {
            put(&mut second, i, m.is_dark(8, size - 15 + i));
        }
        (first, second)
    }

    fn read_version_copies(m: &Matrix) -> (u32, u32) {
        let size = m.size();
        let mut upper_right = 0u32;
        let mut lower_left = 0u32;
        for i in 0..18 {
            let a = size - 11 + i % 3;
            let b = i / 3;
            upper_right |= u32::from(m.is_dark(a, b)) << i;
            lower_left |= u32::from(m.is_dark(b, a)) << i;
        }
        (upper_right, lower_left)
    }

    #[test]
    fn format_words_match_standard_table() {
        assert_eq!(format_bits(ErrorCorrectionLevel::L, 0), 0b111011111000100);
        assert_eq!(format_bits(ErrorCorrectionLevel::M, 0), 0b101010000010010);
        assert_eq!(format_bits(ErrorCorrectionLevel::H, 7), 0b000100000111011);
    }

    #[test]
    fn version_words_match_standard_table() {
        let v = |n| Version::new(n).unwrap();
        assert_eq!(version_bits(v(6)), None);
        assert_eq!(version_bits(v(7)), Some(0x07C94));
        assert_eq!(version_bits(v(20)), Some(0x149A6));
        assert_eq!(version_bits(v(40)), Some(0x28C69));
    }

    #[test]
    fn dimension_follows_version() {
        let m = build("HELLO", ErrorCorrectionLevel::M, Some(1));
        assert_eq!(m.size(), 21);
        let m = build("HELLO", ErrorCorrectionLevel::M, Some(10));
        assert_eq!(m.size(), 57);
    }

    #[test]
    fn finder_patterns_in_three_corners() {
        let m = build("finder", ErrorCorrectionLevel::L, None);
        let size = m.size();
        for (ox, oy) in [(0, 0), (size - 7, 0), (0, size - 7)] {
            for dy in 0..7 {
                for dx in 0..7 {
                    let ring = (dx as isize - 3).abs().max((dy as isize - 3).abs());
                    assert_eq!(m.is_dark(ox + dx, oy + dy), ring != 2, "finder at ({ox},{oy}) cell ({dx},{dy})");
                    assert_eq!(m.role(ox + dx, oy + dy), ModuleRole::Finder);
                }
            }
        }
        assert_eq!(m.role(7, 0), ModuleRole::Separator);
        assert!(!m.is_dark(7, 7));
        assert_eq!(m.role(size - 8, 7), ModuleRole::Separator);
    }

    #[test]
    fn timing_patterns_alternate() {
        let m = build("timing", ErrorCorrectionLevel::Q, Some(3));
        for i in 8..m.size() - 8 {
            assert_eq!(m.is_dark(i, 6), i % 2 == 0);
            assert_eq!(m.is_dark(6, i), i % 2 == 0);
            assert_eq!(m.role(i, 6), ModuleRole::Timing);
        }
    }

    #[test]
    fn dark_module_always_set() {
        for version in [1, 7, 21] {
            let m = build("dark", ErrorCorrectionLevel::H, Some(version));
            assert!(m.is_dark(8, m.size() - 8));
        }
    }

    #[test]
    fn data_region_matches_raw_module_count() {
        for v in 1..=40 {
            let version = Version::new(v).unwrap();
            let m = Matrix::with_function_patterns(version, ErrorCorrectionLevel::L);
            let data = m.roles.iter().filter(|&&r| r == ModuleRole::Data).count();
            assert_eq!(data, version.raw_data_modules(), "version {v}");
        }
    }

    #[test]
    fn masking_leaves_reserved_modules_alone() {
        let version = Version::new(8).unwrap();
        let base = Matrix::with_function_patterns(version, ErrorCorrectionLevel::M);
        for mask in 0..8 {
            let mut masked = base.clone();
            masked.apply_mask(mask);
            for idx in 0..base.dark.len() {
                if base.roles[idx].is_reserved() {
                    assert_eq!(base.dark[idx], masked.dark[idx], "mask {mask} touched reserved cell {idx}");
                }
            }
        }
    }

    #[test]
    fn mask_selection_is_deterministic() {
        let first = build("https://example.com/deterministic", ErrorCorrectionLevel::M, None);
        for _ in 0..3 {
            let again = build("https://example.com/deterministic", ErrorCorrectionLevel::M, None);
            assert_eq!(again.mask(), first.mask());
            assert_eq!(again, first);
        }
    }

    #[test]
    fn chosen_mask_has_minimum_penalty() {
        let encoded = encoder::encode("penalty check 12345", &QrOptions::default()).unwrap();
        let chosen = Matrix::build(&encoded, None).unwrap();
        for mask in 0..8 {
            let forced = Matrix::build(&encoded, Some(mask)).unwrap();
            let penalty = forced.penalty_score();
            assert!(
                chosen.penalty_score() < penalty || (chosen.penalty_score() == penalty && chosen.mask() <= mask),
                "mask {mask} scores {penalty}, chosen {} scores {}",
                chosen.mask(),
                chosen.penalty_score()
            );
        }
    }

    #[test]
    fn forced_mask_is_used() {
        let encoded = encoder::encode("forced", &QrOptions::default()).unwrap();
        assert_eq!(Matrix::build(&encoded, Some(5)).unwrap().mask(), 5);
        assert!(matches!(Matrix::build(&encoded, Some(8)), Err(QrStyleError::Config(_))));
    }

    #[test]
    fn format_info_decodes_to_written_values() {
        for level in ErrorCorrectionLevel::ALL {
            let m = build("format info", level, None);
            let (first, second) = read_format_copies(&m);
            assert_eq!(first, second);
            assert_eq!(decode_format(first), (level, m.mask()));
            assert_eq!(first, format_bits(level, m.mask()));
        }
    }

    #[test]
    fn version_info_decodes_to_written_version() {
        for v in [7, 15, 32, 40] {
            let m = build("version info", ErrorCorrectionLevel::L, Some(v));
            let (upper_right, lower_left) = read_version_copies(&m);
            assert_eq!(upper_right, lower_left);
            assert_eq!(upper_right >> 12, u32::from(v));
            let nearest = (7..=40u8)
                .min_by_key(|&n| hamming(version_bits(Version::new(n).unwrap()).unwrap(), upper_right))
                .unwrap();
            assert_eq!(nearest, v);
        }
    }

    #[test]
    fn hello_matrix_shape() {
        let options = QrOptions {
            version: Some(1),
            mode: Some(Mode::Alphanumeric),
            error_correction_level: ErrorCorrectionLevel::M,
            mask: None,
        };
        let m = Matrix::build(&encoder::encode("HELLO", &options).unwrap(), None).unwrap();
        assert_eq!(m.size(), 21);
        assert_eq!(m.level(), ErrorCorrectionLevel::M);
        assert!(m.mask() < 8);
    }

    #[test]
    fn out_of_bounds_reads_are_light() {
        let m = build("edge", ErrorCorrectionLevel::L, None);
        assert!(!m.is_dark_at(-1, 0));
        assert!(!m.is_dark_at(0, m.size() as isize));
        assert!(m.is_dark_at(0, 0));
    }
}

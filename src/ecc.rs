//! Reed–Solomon parity over GF(256) and block interleaving.

use crate::tables::Version;
use crate::types::ErrorCorrectionLevel;

/// Field multiplication modulo x^8 + x^4 + x^3 + x^2 + 1 (Russian peasant).
pub fn gf_multiply(x: u8, y: u8) -> u8 {
    let mut z: u8 = 0;
    for i in (0..8).rev() {
        z = (z << 1) ^ ((z >> 7) * 0x1D);
        z ^= ((y >> i) & 1) * x;
    }
    z
}

/// Coefficients of the monic generator polynomial of `degree`, highest power first,
/// leading 1 omitted.
pub fn generator_polynomial(degree: usize) -> Vec<u8> {
    assert!((1..=255).contains(&degree), "degree {degree} out of range");
    let mut result = vec![0u8; degree - 1];
    result.push(1);
    let mut root: u8 = 1;
    for _ in 0..degree {
        for j in 0..degree {
            result[j] = gf_multiply(result[j], root);
            if j + 1 < result.len() {
                result[j] ^= result[j + 1];
            }
        }
        root = gf_multiply(root, 0x02);
    }
    result
}

/// Remainder of `data · x^n` divided by the generator; these are the parity bytes.
pub fn parity(data: &[u8], generator: &[u8]) -> Vec<u8> {
    let mut result = vec![0u8; generator.len()];
    for &b in data {
        let factor = b ^ result.remove(0);
        result.push(0);
        for (x, &y) in result.iter_mut().zip(generator) {
            *x ^= gf_multiply(y, factor);
        }
    }
    result
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodewordBlock {
    pub data: Vec<u8>,
    pub ec: Vec<u8>,
}

/// Splits data codewords into the standard blocks (short ones first) and computes parity.
pub fn split_blocks(data: &[u8], version: Version, level: ErrorCorrectionLevel) -> Vec<CodewordBlock> {
    assert_eq!(data.len(), version.data_codewords(level), "data length does not match version {version}");
    let num_blocks = version.num_blocks(level);
    let ec_len = version.ec_codewords_per_block(level);
    let total = version.total_codewords();
    let num_short = num_blocks - total % num_blocks;
    let short_data_len = total / num_blocks - ec_len;
    let generator = generator_polynomial(ec_len);

    let mut blocks = Vec::with_capacity(num_blocks);
    let mut offset = 0;
    for i in 0..num_blocks {
        let len = short_data_len + usize::from(i >= num_short);
        let chunk = &data[offset..offset + len];
        offset += len;
        blocks.push(CodewordBlock {
            data: chunk.to_vec(),
            ec: parity(chunk, &generator),
        });
    }
    blocks
}

/// Round-robin across blocks: all data bytes column by column, then all parity bytes.
pub fn interleave(blocks: &[CodewordBlock]) -> Vec<u8> {
    let max_data = blocks.iter().map(|b| b.data.len()).max().unwrap_or(0);
    let max_ec = blocks.iter().map(|b| b.ec.len()).max().unwrap_or(0);
    let mut result = Vec::with_capacity(blocks.iter().map(|b| b.data.len() + b.ec.len()).sum());
    for i in 0..max_data {
        result.extend(blocks.iter().filter_map(|b| b.data.get(i)));
    }
    for i in 0..max_ec {
        result.extend(blocks.iter().filter_map(|b| b.ec.get(i)));
    }
    result
}

/// Final codeword sequence for placement.
pub fn add_ecc_and_interleave(data: &[u8], version: Version, level: ErrorCorrectionLevel) -> Vec<u8> {
    let result = interleave(&split_blocks(data, version, level));
    debug_assert_eq!(result.len(), version.total_codewords());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gf_pow2(exp: usize) -> u8 {
        (0..exp).fold(1u8, |acc, _| gf_multiply(acc, 2))
    }

    /// Evaluates the codeword polynomial (highest power first) at `x`.
    fn evaluate(codeword: &[u8], x: u8) -> u8 {
        codeword.iter().fold(0u8, |acc, &c| gf_multiply(acc, x) ^ c)
    }

    #[test]
    fn multiply_known_products() {
        assert_eq!(gf_multiply(0, 0x53), 0);
        assert_eq!(gf_multiply(1, 0x53), 0x53);
        assert_eq!(gf_multiply(2, 0x80), 0x1D);
        assert_eq!(gf_pow2(255), 1);
        assert_eq!(gf_pow2(8), 0x1D);
    }

    #[test]
    fn generator_degree_7() {
        // x^7 + α^87 x^6 + α^229 x^5 + α^146 x^4 + α^149 x^3 + α^238 x^2 + α^102 x + α^21
        let expected: Vec<u8> = [87, 229, 146, 149, 238, 102, 21].iter().map(|&e| gf_pow2(e)).collect();
        assert_eq!(generator_polynomial(7), expected);
    }

    #[test]
    fn hello_world_parity() {
        // 1-M "HELLO WORLD" example from the standard.
        let data = [
            0x20, 0x5B, 0x0B, 0x78, 0xD1, 0x72, 0xDC, 0x4D, 0x43, 0x40, 0xEC, 0x11, 0xEC, 0x11, 0xEC, 0x11,
        ];
        let ec = parity(&data, &generator_polynomial(10));
        assert_eq!(ec, vec![0xC4, 0x23, 0x27, 0x77, 0xEB, 0xD7, 0xE7, 0xE2, 0x5D, 0x17]);
    }

    #[test]
    fn syndromes_vanish_for_every_block() {
        for (version, level) in [(1, ErrorCorrectionLevel::H), (5, ErrorCorrectionLevel::Q), (13, ErrorCorrectionLevel::M)] {
            let version = Version::new(version).unwrap();
            let data: Vec<u8> = (0..version.data_codewords(level)).map(|i| (i * 37 + 11) as u8).collect();
            for block in split_blocks(&data, version, level) {
                let codeword: Vec<u8> = block.data.iter().chain(&block.ec).copied().collect();
                for i in 0..block.ec.len() {
                    assert_eq!(evaluate(&codeword, gf_pow2(i)), 0, "syndrome {i} at version {version} {level}");
                }
            }
        }
    }

    #[test]
    fn parity_matches_qrcode_crate() {
        let data: Vec<u8> = (0u8..44).map(|b| b.wrapping_mul(91)).collect();
        for ec_len in [7, 10, 18, 26, 30] {
            let ours = parity(&data, &generator_polynomial(ec_len));
            let theirs = qrcode::ec::create_error_correction_code(&data, ec_len);
            assert_eq!(ours, theirs, "ec length {ec_len}");
        }
    }

    #[test]
    fn block_split_5q() {
        // 5-Q: two blocks of 15 data codewords followed by two of 16.
        let version = Version::new(5).unwrap();
        let level = ErrorCorrectionLevel::Q;
        let data: Vec<u8> = (0..62).collect();
        let blocks = split_blocks(&data, version, level);
        let lens: Vec<usize> = blocks.iter().map(|b| b.data.len()).collect();
        assert_eq!(lens, vec![15, 15, 16, 16]);
        assert!(blocks.iter().all(|b| b.ec.len() == 18));
        assert_eq!(blocks[2].data[0], 30);
    }

    #[test]
    fn interleave_round_robin() {
        let version = Version::new(5).unwrap();
        let level = ErrorCorrectionLevel::Q;
        let data: Vec<u8> = (0..62).collect();
        let blocks = split_blocks(&data, version, level);
        let out = interleave(&blocks);
        assert_eq!(out.len(), version.total_codewords());
        assert_eq!(&out[..4], &[0, 15, 30, 46]);
        // Only the long blocks carry a 16th data byte.
        assert_eq!(&out[56..62], &[14, 29, 44, 60, 45, 61]);
        assert_eq!(out[62], blocks[0].ec[0]);
        assert_eq!(out[65], blocks[3].ec[0]);
        assert_eq!(*out.last().unwrap(), blocks[3].ec[17]);
    }

    #[test]
    fn single_block_is_identity() {
        let version = Version::new(1).unwrap();
        let level = ErrorCorrectionLevel::M;
        let data: Vec<u8> = (0..16).collect();
        let out = add_ecc_and_interleave(&data, version, level);
        assert_eq!(&out[..16], data.as_slice());
        assert_eq!(out.len(), 26);
    }
}

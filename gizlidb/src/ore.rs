//! Order-revealing encryption (Lewi–Wu block construction).
//!
//! A plaintext is split into fixed-width blocks, most significant first.
//! Two ciphertext halves are produced:
//!
//! - the **left** term is deterministic. For every block it holds a PRF tag
//!   of the block's prefix and its permuted block value (`PRF_SIZE + 1` bytes
//!   per block). Two left terms of equal plaintexts are identical, which is
//!   the extra leakage that reduced-security mode opts into.
//! - the **right** term is randomised by a nonce. For every block it stores
//!   a masked comparison result (a trit) for every possible block value,
//!   packed five trits per byte.
//!
//! Comparing a left term of `x` against a right term of `y` reveals only
//! the ordering of `x` and `y` (and the index of the first differing block);
//! no key is needed, so storage backends can evaluate comparisons directly.

use std::cmp::Ordering;

use crate::error::Error;
use chacha20poly1305::aead::{rand_core::RngCore, OsRng};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretVec};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Size of the random nonce leading every right term.
pub const NONCE_SIZE: usize = 16;

/// Size of the PRF tag stored per left block.
pub const PRF_SIZE: usize = 16;

/// Size of one left block: PRF tag plus permuted block value.
pub const LEFT_BLOCK_SIZE: usize = PRF_SIZE + 1;

const TRITS_PER_BYTE: usize = 5;

/// Shape of the plaintext domain: `blocks` blocks of `bits` bits each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OreDomain {
    blocks: usize,
    bits: u32,
}

impl OreDomain {
    /// 64-bit integers.
    pub const U64: Self = Self::new(8, 8);
    /// 32-bit integers.
    pub const U32: Self = Self::new(4, 8);
    /// 16-bit integers (years).
    pub const U16: Self = Self::new(2, 8);
    /// Booleans.
    pub const BIT: Self = Self::new(1, 1);
    /// Months 1..=12.
    pub const MONTH: Self = Self::new(1, 4);
    /// Days 1..=31.
    pub const DAY: Self = Self::new(1, 5);

    /// Creates a domain of `blocks` blocks with `bits` bits each.
    ///
    /// # Panics
    ///
    /// Panics (at compile time for constants) unless `1 <= bits <= 8` and
    /// the domain fits in 64 bits.
    #[must_use]
    pub const fn new(blocks: usize, bits: u32) -> Self {
        assert!(bits >= 1 && bits <= 8, "block width must be between 1 and 8 bits");
        assert!(blocks >= 1, "at least one block is required");
        Self { blocks, bits }
    }

    /// A domain of `len` whole bytes, used for text prefixes.
    ///
    /// # Panics
    ///
    /// Panics if `len` is zero.
    #[must_use]
    pub const fn bytes(len: usize) -> Self {
        Self::new(len, 8)
    }

    /// Number of blocks.
    #[must_use]
    pub const fn blocks(self) -> usize {
        self.blocks
    }

    /// Number of distinct values per block.
    #[must_use]
    pub const fn width(self) -> usize {
        1 << self.bits
    }

    /// Length in bytes of a left term.
    #[must_use]
    pub const fn left_len(self) -> usize {
        self.blocks * LEFT_BLOCK_SIZE
    }

    /// Length in bytes of a right term.
    #[must_use]
    pub const fn right_len(self) -> usize {
        NONCE_SIZE + self.blocks * self.right_block_len()
    }

    const fn right_block_len(self) -> usize {
        self.width().div_ceil(TRITS_PER_BYTE)
    }

    /// Splits a number into block values, most significant block first.
    fn split(self, value: u64) -> Vec<u8> {
        let mask = (1u64 << self.bits) - 1;
        (0..self.blocks)
            .map(|i| {
                let shift = self.bits as usize * (self.blocks - 1 - i);
                // Safe cast: masked to at most 8 bits
                #[allow(clippy::cast_possible_truncation)]
                let block = ((value >> shift) & mask) as u8;
                block
            })
            .collect()
    }
}

/// Keyed ORE cipher for one field component.
pub struct OreCipher {
    prf_key: SecretVec<u8>,
    prp_key: SecretVec<u8>,
}

impl OreCipher {
    /// Creates a cipher from its PRF and permutation keys.
    #[must_use]
    pub const fn new(prf_key: SecretVec<u8>, prp_key: SecretVec<u8>) -> Self {
        Self { prf_key, prp_key }
    }

    /// Produces the deterministic left term of `value`.
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyDerivation` if a PRF cannot be keyed.
    pub fn encrypt_left(&self, domain: OreDomain, value: u64) -> Result<Vec<u8>, Error> {
        let blocks = domain.split(value);
        let mut out = Vec::with_capacity(domain.left_len());

        for (i, &block) in blocks.iter().enumerate() {
            let prefix = &blocks[..i];
            let permutation = self.permutation(domain, i, prefix)?;
            let permuted = permutation[usize::from(block)];
            out.extend_from_slice(&self.block_tag(i, prefix, permuted)?);
            out.push(permuted);
        }

        Ok(out)
    }

    /// Produces a randomised right term of `value`.
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyDerivation` if a PRF cannot be keyed.
    pub fn encrypt_right(&self, domain: OreDomain, value: u64) -> Result<Vec<u8>, Error> {
        let blocks = domain.split(value);
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let mut out = Vec::with_capacity(domain.right_len());
        out.extend_from_slice(&nonce);

        for (i, &block) in blocks.iter().enumerate() {
            let prefix = &blocks[..i];
            let inverse = invert(&self.permutation(domain, i, prefix)?);
            let mut trits = Vec::with_capacity(domain.width());

            for (slot, &original) in inverse.iter().enumerate() {
                // Safe cast: slots are below the block width (<= 256)
                #[allow(clippy::cast_possible_truncation)]
                let tag = self.block_tag(i, prefix, slot as u8)?;
                trits.push((comparison_code(original, block) + mask(&tag, &nonce)) % 3);
            }

            pack_trits(&trits, &mut out);
        }

        Ok(out)
    }

    fn block_tag(&self, index: usize, prefix: &[u8], block: u8) -> Result<[u8; PRF_SIZE], Error> {
        let mut mac = HmacSha256::new_from_slice(self.prf_key.expose_secret())
            .map_err(|_| Error::KeyDerivation)?;
        mac.update(&(index as u64).to_be_bytes());
        mac.update(prefix);
        mac.update(&[block]);

        let mut tag = [0u8; PRF_SIZE];
        tag.copy_from_slice(&mac.finalize().into_bytes()[..PRF_SIZE]);
        Ok(tag)
    }

    /// Keyed permutation of one block's values, seeded by the block prefix.
    fn permutation(
        &self,
        domain: OreDomain,
        index: usize,
        prefix: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let mut mac = HmacSha256::new_from_slice(self.prp_key.expose_secret())
            .map_err(|_| Error::KeyDerivation)?;
        mac.update(&(index as u64).to_be_bytes());
        mac.update(prefix);
        let seed = mac.finalize().into_bytes();

        let mut stream = KeyStream::new(&seed)?;
        // Safe cast: block width is at most 256
        #[allow(clippy::cast_possible_truncation)]
        let mut values: Vec<u8> = (0..domain.width()).map(|v| v as u8).collect();

        // Fisher-Yates
        for i in (1..values.len()).rev() {
            let j = usize::from(stream.next_u16()) % (i + 1);
            values.swap(i, j);
        }

        Ok(values)
    }
}

/// Compares a left term of `x` against a right term of `y`.
///
/// Returns the ordering of `x` relative to `y`.
///
/// # Errors
///
/// Returns `Error::Envelope` if either term does not match `domain`.
pub fn compare(domain: OreDomain, left: &[u8], right: &[u8]) -> Result<Ordering, Error> {
    if left.len() != domain.left_len() {
        return Err(Error::Envelope(format!(
            "left ORE term has {} bytes, expected {}",
            left.len(),
            domain.left_len()
        )));
    }
    if right.len() != domain.right_len() {
        return Err(Error::Envelope(format!(
            "right ORE term has {} bytes, expected {}",
            right.len(),
            domain.right_len()
        )));
    }

    let (nonce, body) = right.split_at(NONCE_SIZE);
    let block_len = domain.right_block_len();

    for (i, entry) in left.chunks_exact(LEFT_BLOCK_SIZE).enumerate() {
        let (tag, permuted) = entry.split_at(PRF_SIZE);
        let slot = usize::from(permuted[0]);
        if slot >= domain.width() {
            return Err(Error::Envelope("left ORE term block out of domain".to_string()));
        }

        let packed = &body[i * block_len..(i + 1) * block_len];
        let trit = unpack_trit(packed, slot);
        match (trit + 3 - mask(tag, nonce)) % 3 {
            0 => continue,
            1 => return Ok(Ordering::Less),
            _ => return Ok(Ordering::Greater),
        }
    }

    Ok(Ordering::Equal)
}

/// Domain of a byte-block right term of unknown length.
///
/// # Errors
///
/// Returns `Error::Envelope` if the length is not a whole number of blocks.
pub fn byte_domain_of_right(right: &[u8]) -> Result<OreDomain, Error> {
    let per_block = OreDomain::bytes(1).right_block_len();
    let body = right.len().saturating_sub(NONCE_SIZE);
    if body == 0 || body % per_block != 0 {
        return Err(Error::Envelope(format!("right ORE term has invalid length {}", right.len())));
    }
    Ok(OreDomain::bytes(body / per_block))
}

/// 0 when equal, 1 when `a < b`, 2 when `a > b`.
fn comparison_code(a: u8, b: u8) -> u8 {
    match a.cmp(&b) {
        Ordering::Equal => 0,
        Ordering::Less => 1,
        Ordering::Greater => 2,
    }
}

fn mask(tag: &[u8], nonce: &[u8]) -> u8 {
    let digest = Sha256::new().chain_update(tag).chain_update(nonce).finalize();
    digest[0] % 3
}

fn invert(permutation: &[u8]) -> Vec<u8> {
    let mut inverse = vec![0u8; permutation.len()];
    for (value, &slot) in permutation.iter().enumerate() {
        // Safe cast: values are below the block width (<= 256)
        #[allow(clippy::cast_possible_truncation)]
        let value = value as u8;
        inverse[usize::from(slot)] = value;
    }
    inverse
}

fn pack_trits(trits: &[u8], out: &mut Vec<u8>) {
    for chunk in trits.chunks(TRITS_PER_BYTE) {
        let byte = chunk.iter().rev().fold(0u8, |acc, &t| acc * 3 + t);
        out.push(byte);
    }
}

fn unpack_trit(packed: &[u8], index: usize) -> u8 {
    let mut byte = packed[index / TRITS_PER_BYTE];
    for _ in 0..index % TRITS_PER_BYTE {
        byte /= 3;
    }
    byte % 3
}

/// Deterministic byte stream used to drive the permutation shuffle.
struct KeyStream {
    mac: HmacSha256,
    counter: u64,
    buffer: Vec<u8>,
}

impl KeyStream {
    fn new(seed: &[u8]) -> Result<Self, Error> {
        let mac = HmacSha256::new_from_slice(seed).map_err(|_| Error::KeyDerivation)?;
        Ok(Self { mac, counter: 0, buffer: Vec::new() })
    }

    fn next_u16(&mut self) -> u16 {
        if self.buffer.len() < 2 {
            let mut mac = self.mac.clone();
            mac.update(&self.counter.to_be_bytes());
            self.counter += 1;
            self.buffer = mac.finalize().into_bytes().to_vec();
        }
        let value = u16::from_be_bytes([self.buffer[0], self.buffer[1]]);
        self.buffer.drain(..2);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cipher() -> OreCipher {
        OreCipher::new(SecretVec::new(vec![1u8; 32]), SecretVec::new(vec![2u8; 32]))
    }

    fn ord(domain: OreDomain, x: u64, y: u64) -> Ordering {
        let c = cipher();
        let left = c.encrypt_left(domain, x).unwrap();
        let right = c.encrypt_right(domain, y).unwrap();
        compare(domain, &left, &right).unwrap()
    }

    #[test]
    fn test_term_lengths() {
        assert_eq!(OreDomain::U64.left_len(), 136);
        assert_eq!(OreDomain::U64.right_len(), 432);
        assert_eq!(OreDomain::BIT.left_len(), 17);
        assert_eq!(OreDomain::BIT.right_len(), 17);
        assert_eq!(OreDomain::U16.left_len(), 34);
        assert_eq!(OreDomain::MONTH.right_len(), 20);
        assert_eq!(OreDomain::DAY.right_len(), 23);

        let c = cipher();
        assert_eq!(c.encrypt_left(OreDomain::U64, 42).unwrap().len(), 136);
        assert_eq!(c.encrypt_right(OreDomain::U64, 42).unwrap().len(), 432);
    }

    #[test]
    fn test_split_msb_first() {
        assert_eq!(OreDomain::U16.split(0x0102), vec![1, 2]);
        assert_eq!(OreDomain::BIT.split(1), vec![1]);
        assert_eq!(OreDomain::DAY.split(31), vec![31]);
    }

    #[test]
    fn test_compare_basic() {
        assert_eq!(ord(OreDomain::U64, 5, 5), Ordering::Equal);
        assert_eq!(ord(OreDomain::U64, 4, 5), Ordering::Less);
        assert_eq!(ord(OreDomain::U64, 6, 5), Ordering::Greater);
        assert_eq!(ord(OreDomain::U64, 0, u64::MAX), Ordering::Less);
        assert_eq!(ord(OreDomain::BIT, 1, 0), Ordering::Greater);
    }

    #[test]
    fn test_left_is_deterministic_right_is_not() {
        let c = cipher();
        assert_eq!(
            c.encrypt_left(OreDomain::U32, 99).unwrap(),
            c.encrypt_left(OreDomain::U32, 99).unwrap()
        );
        assert_ne!(
            c.encrypt_right(OreDomain::U32, 99).unwrap(),
            c.encrypt_right(OreDomain::U32, 99).unwrap()
        );
    }

    #[test]
    fn test_different_keys_do_not_compare() {
        let a = cipher();
        let b = OreCipher::new(SecretVec::new(vec![3u8; 32]), SecretVec::new(vec![4u8; 32]));

        let mismatches = (0..32u64)
            .filter(|&v| {
                let left = a.encrypt_left(OreDomain::U64, v).unwrap();
                let right = b.encrypt_right(OreDomain::U64, v).unwrap();
                compare(OreDomain::U64, &left, &right).unwrap() != Ordering::Equal
            })
            .count();

        assert!(mismatches > 0);
    }

    #[test]
    fn test_compare_rejects_wrong_lengths() {
        let c = cipher();
        let left = c.encrypt_left(OreDomain::U32, 1).unwrap();
        let right = c.encrypt_right(OreDomain::U64, 1).unwrap();

        assert!(matches!(compare(OreDomain::U32, &left, &right), Err(Error::Envelope(_))));
    }

    #[test]
    fn test_trit_packing() {
        let trits = [2, 1, 0, 2, 2, 1, 1];
        let mut packed = Vec::new();
        pack_trits(&trits, &mut packed);

        assert_eq!(packed.len(), 2);
        for (i, &t) in trits.iter().enumerate() {
            assert_eq!(unpack_trit(&packed, i), t);
        }
    }

    #[test]
    fn test_byte_domain_of_right() {
        let right = cipher().encrypt_right(OreDomain::bytes(3), 7).unwrap();
        assert_eq!(byte_domain_of_right(&right).unwrap(), OreDomain::bytes(3));
        assert!(byte_domain_of_right(&right[..20]).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_compare_matches_plaintext_order(x in any::<u64>(), y in any::<u64>()) {
            prop_assert_eq!(ord(OreDomain::U64, x, y), x.cmp(&y));
        }

        #[test]
        fn prop_compare_small_domain(x in 1u64..=31, y in 1u64..=31) {
            prop_assert_eq!(ord(OreDomain::DAY, x, y), x.cmp(&y));
        }
    }
}

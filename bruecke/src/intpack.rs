//! Arbitrary-width integer packing.
//!
//! Converts an arbitrary-precision integer to and from a caller-supplied
//! array of fixed-width words under caller-selected word order, byte order,
//! sign convention and nail bits. Validation always precedes conversion;
//! the codec never allocates the output buffer.

use crate::error::BridgeError;

/// Emit the most significant word first.
pub const PACK_MSWORD_FIRST: u32 = 1 << 0;
/// Emit the least significant word first.
pub const PACK_LSWORD_FIRST: u32 = 1 << 1;
/// Big-endian bytes within each word.
pub const PACK_MSBYTE_FIRST: u32 = 1 << 2;
/// Little-endian bytes within each word.
pub const PACK_LSBYTE_FIRST: u32 = 1 << 3;
/// Bytes within each word follow the machine's endianness.
pub const PACK_NATIVE_BYTE_ORDER: u32 = 1 << 4;
/// Two's complement for negative values (otherwise sign-magnitude).
pub const PACK_2COMP: u32 = 1 << 5;

/// Upper bound on `wordsize`, keeping per-word payloads within one u64.
pub const MAX_WORDSIZE: usize = 8;

/// Sign + little-endian u64 limbs. The arbitrary-precision carrier for the
/// codec and the bridge's integer entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigInt {
    /// -1, 0 or 1. Zero iff `limbs` is empty.
    pub sign: i8,
    pub limbs: Vec<u64>,
}

impl BigInt {
    pub fn zero() -> Self {
        Self { sign: 0, limbs: Vec::new() }
    }

    pub fn from_i64(value: i64) -> Self {
        if value == 0 {
            return Self::zero();
        }
        let sign = if value < 0 { -1 } else { 1 };
        Self { sign, limbs: vec![value.unsigned_abs()] }
    }

    pub fn from_sign_limbs(sign: i8, limbs: &[u64]) -> Self {
        let mut out = Self { sign, limbs: limbs.to_vec() };
        out.normalize();
        out
    }

    /// Drop leading zero limbs; zero magnitude forces sign 0.
    pub fn normalize(&mut self) {
        let mut len = self.limbs.len();
        while len > 0 && self.limbs[len - 1] == 0 {
            len -= 1;
        }
        self.limbs.truncate(len);
        if len == 0 {
            self.sign = 0;
        } else if self.sign == 0 {
            self.sign = 1;
        }
    }

    pub fn is_zero(&self) -> bool {
        self.sign == 0
    }

    /// Bits needed for the magnitude; 0 for zero.
    pub fn bit_len(&self) -> usize {
        match self.limbs.last() {
            Some(&top) => {
                debug_assert_ne!(top, 0, "not normalized");
                self.limbs.len() * 64 - top.leading_zeros() as usize
            }
            None => 0,
        }
    }

    pub fn to_i64(&self) -> Option<i64> {
        match (self.sign, self.limbs.len()) {
            (0, _) => Some(0),
            (1, 1) => {
                let limb = self.limbs[0];
                (limb <= i64::MAX as u64).then_some(limb as i64)
            }
            (-1, 1) => {
                let limb = self.limbs[0];
                if limb == 1 << 63 {
                    Some(i64::MIN)
                } else if limb < 1 << 63 {
                    Some(-(limb as i64))
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

// ── Bit helpers ───────────────────────────────────────────────────────

#[inline(always)]
fn low_mask(count: u32) -> u64 {
    if count >= 64 { u64::MAX } else { (1u64 << count) - 1 }
}

/// Read `count` (1..=64) bits starting at bit `start` of a little-endian
/// limb vector; bits past the end read as zero.
fn get_bits(limbs: &[u64], start: usize, count: u32) -> u64 {
    let word = start / 64;
    let off = (start % 64) as u32;
    let lo = limbs.get(word).copied().unwrap_or(0) >> off;
    let out = if off + count > 64 {
        lo | (limbs.get(word + 1).copied().unwrap_or(0) << (64 - off))
    } else {
        lo
    };
    out & low_mask(count)
}

/// Or `count` (1..=64) bits of `value` into the vector at bit `start`.
fn set_bits(limbs: &mut [u64], start: usize, count: u32, value: u64) {
    debug_assert_eq!(value & !low_mask(count), 0);
    let word = start / 64;
    let off = (start % 64) as u32;
    limbs[word] |= value << off;
    if off > 0 && off + count > 64 {
        limbs[word + 1] |= value >> (64 - off);
    }
}

fn get_bit(limbs: &[u64], bit: usize) -> bool {
    get_bits(limbs, bit, 1) != 0
}

/// `(2^total_bits - (x mod 2^total_bits)) mod 2^total_bits` as limbs.
fn two_complement(limbs: &[u64], total_bits: usize) -> Vec<u64> {
    let words = total_bits.div_ceil(64);
    let mut out = vec![0u64; words];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = !limbs.get(i).copied().unwrap_or(0);
    }
    let mut carry = 1u128;
    for slot in out.iter_mut() {
        let sum = *slot as u128 + carry;
        *slot = sum as u64;
        carry = sum >> 64;
    }
    let top_bits = (total_bits % 64) as u32;
    if top_bits != 0
        && let Some(top) = out.last_mut()
    {
        *top &= low_mask(top_bits);
    }
    out
}

// ── Validation ────────────────────────────────────────────────────────

struct Layout {
    msword_first: bool,
    msbyte_first: bool,
    bits_per_word: usize,
    total_bits: usize,
}

fn validate(
    numwords: usize,
    wordsize: usize,
    nails: usize,
    flags: u32,
) -> Result<Layout, BridgeError> {
    if wordsize == 0 {
        return Err(BridgeError::Argument { message: "invalid wordsize: 0" });
    }
    if wordsize > MAX_WORDSIZE {
        return Err(BridgeError::Argument { message: "too big wordsize" });
    }
    if nails >= wordsize * 8 {
        return Err(BridgeError::Argument { message: "too big nails" });
    }
    if numwords.checked_mul(wordsize).is_none() {
        return Err(BridgeError::Argument { message: "too big numwords * wordsize" });
    }

    let msword = flags & PACK_MSWORD_FIRST != 0;
    let lsword = flags & PACK_LSWORD_FIRST != 0;
    let msword_first = match (msword, lsword) {
        (true, true) => {
            return Err(BridgeError::Argument { message: "conflicting word order flags" });
        }
        (true, false) => true,
        (false, true) => false,
        (false, false) if numwords > 1 => {
            return Err(BridgeError::Argument {
                message: "word order flag required for multiple words",
            });
        }
        (false, false) => false,
    };

    let byte_flags = [
        flags & PACK_MSBYTE_FIRST != 0,
        flags & PACK_LSBYTE_FIRST != 0,
        flags & PACK_NATIVE_BYTE_ORDER != 0,
    ];
    let msbyte_first = match byte_flags {
        [true, false, false] => true,
        [false, true, false] => false,
        [false, false, true] => cfg!(target_endian = "big"),
        [false, false, false] => {
            return Err(BridgeError::Argument { message: "byte order flag required" });
        }
        _ => {
            return Err(BridgeError::Argument { message: "conflicting byte order flags" });
        }
    };

    let bits_per_word = wordsize * 8 - nails;
    let total_bits = numwords
        .checked_mul(bits_per_word)
        .ok_or(BridgeError::Argument { message: "too big numwords * wordsize" })?;
    Ok(Layout { msword_first, msbyte_first, bits_per_word, total_bits })
}

// ── Pack / unpack ─────────────────────────────────────────────────────

/// Pack `value` into `words` (`numwords * wordsize` bytes, caller-owned).
///
/// Returns the sign code: `0` for zero, `sign * 1` when the magnitude fit,
/// `sign * 2` when it was truncated (low-order bits are written regardless,
/// so the caller can keep the wrapped residue but must be told).
pub fn pack(
    value: &BigInt,
    words: &mut [u8],
    numwords: usize,
    wordsize: usize,
    nails: usize,
    flags: u32,
) -> Result<i8, BridgeError> {
    let layout = validate(numwords, wordsize, nails, flags)?;
    if words.len() != numwords * wordsize {
        return Err(BridgeError::Argument {
            message: "pack buffer length must equal numwords * wordsize",
        });
    }

    let twocomp_negative = flags & PACK_2COMP != 0 && value.sign < 0;
    let complemented;
    let source: &[u64] = if twocomp_negative {
        complemented = two_complement(&value.limbs, layout.total_bits);
        &complemented
    } else {
        &value.limbs
    };

    for wi in 0..numwords {
        let payload = get_bits(source, wi * layout.bits_per_word, layout.bits_per_word as u32);
        let dest_word = if layout.msword_first { numwords - 1 - wi } else { wi };
        let base = dest_word * wordsize;
        for b in 0..wordsize {
            let byte = (payload >> (8 * b)) as u8;
            let pos = if layout.msbyte_first { base + wordsize - 1 - b } else { base + b };
            words[pos] = byte;
        }
    }

    if value.sign == 0 {
        return Ok(0);
    }
    let fits = value.bit_len() <= layout.total_bits;
    Ok(value.sign * if fits { 1 } else { 2 })
}

/// Unpack `words` back into an arbitrary-precision integer under the same
/// layout flags. With [`PACK_2COMP`] the payload is interpreted as two's
/// complement signed; otherwise as an unsigned magnitude.
pub fn unpack(
    words: &[u8],
    numwords: usize,
    wordsize: usize,
    nails: usize,
    flags: u32,
) -> Result<BigInt, BridgeError> {
    let layout = validate(numwords, wordsize, nails, flags)?;
    if words.len() != numwords * wordsize {
        return Err(BridgeError::Argument {
            message: "unpack buffer length must equal numwords * wordsize",
        });
    }

    let mut limbs = vec![0u64; layout.total_bits.div_ceil(64)];
    for wi in 0..numwords {
        let src_word = if layout.msword_first { numwords - 1 - wi } else { wi };
        let base = src_word * wordsize;
        let mut payload = 0u64;
        for b in 0..wordsize {
            let pos = if layout.msbyte_first { base + wordsize - 1 - b } else { base + b };
            payload |= (words[pos] as u64) << (8 * b);
        }
        payload &= low_mask(layout.bits_per_word as u32);
        set_bits(&mut limbs, wi * layout.bits_per_word, layout.bits_per_word as u32, payload);
    }

    let negative = flags & PACK_2COMP != 0
        && layout.total_bits > 0
        && get_bit(&limbs, layout.total_bits - 1);
    if negative {
        limbs = two_complement(&limbs, layout.total_bits);
    }
    let mut out = BigInt { sign: if negative { -1 } else { 1 }, limbs };
    out.normalize();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LSF: u32 = PACK_LSWORD_FIRST | PACK_LSBYTE_FIRST;
    const MSF: u32 = PACK_MSWORD_FIRST | PACK_MSBYTE_FIRST;

    // ── BigInt ─────────────────────────────────────────────────────

    #[test]
    fn bigint_i64_round_trip() {
        for &n in &[0i64, 1, -1, 300, -300, i64::MAX, i64::MIN] {
            let big = BigInt::from_i64(n);
            assert_eq!(big.to_i64(), Some(n), "{n}");
        }
    }

    #[test]
    fn bigint_normalization_strips_zero_limbs() {
        let big = BigInt::from_sign_limbs(1, &[5, 0, 0]);
        assert_eq!(big.limbs, vec![5]);
        let zero = BigInt::from_sign_limbs(1, &[0, 0]);
        assert!(zero.is_zero());
        assert_eq!(zero.sign, 0);
    }

    #[test]
    fn bigint_bit_len() {
        assert_eq!(BigInt::zero().bit_len(), 0);
        assert_eq!(BigInt::from_i64(1).bit_len(), 1);
        assert_eq!(BigInt::from_i64(255).bit_len(), 8);
        assert_eq!(BigInt::from_i64(256).bit_len(), 9);
        assert_eq!(BigInt::from_sign_limbs(1, &[0, 1]).bit_len(), 65);
    }

    // ── Validation ─────────────────────────────────────────────────

    #[test]
    fn validation_rejects_bad_parameters() {
        let big = BigInt::from_i64(1);
        let mut buf = [0u8; 8];
        let argument = |r: Result<i8, BridgeError>| {
            assert!(matches!(r, Err(BridgeError::Argument { .. })), "{r:?}");
        };
        argument(pack(&big, &mut buf[..0], 0, 0, 0, LSF));
        argument(pack(&big, &mut buf, 1, 9, 0, LSF));
        argument(pack(&big, &mut buf[..1], 1, 1, 8, LSF));
        // Missing byte order.
        argument(pack(&big, &mut buf[..1], 1, 1, 0, PACK_LSWORD_FIRST));
        // Missing word order with more than one word.
        argument(pack(&big, &mut buf[..2], 2, 1, 0, PACK_LSBYTE_FIRST));
        // Conflicting orders.
        argument(pack(&big, &mut buf[..1], 1, 1, 0, LSF | PACK_MSWORD_FIRST));
        argument(pack(&big, &mut buf[..1], 1, 1, 0, LSF | PACK_MSBYTE_FIRST));
        // Size computation overflow.
        argument(pack(&big, &mut buf, usize::MAX, 8, 0, LSF));
        // Wrong buffer length.
        argument(pack(&big, &mut buf, 1, 1, 0, LSF));
    }

    #[test]
    fn single_word_needs_no_word_order() {
        let mut buf = [0u8; 1];
        let code = pack(&BigInt::from_i64(7), &mut buf, 1, 1, 0, PACK_LSBYTE_FIRST)
            .expect("single word packs");
        assert_eq!(buf, [7]);
        assert_eq!(code, 1);
    }

    // ── Scenario B and truncation ──────────────────────────────────

    #[test]
    fn truncated_pack_reports_sign_code_two() {
        let mut buf = [0u8; 1];
        let code = pack(&BigInt::from_i64(300), &mut buf, 1, 1, 0, LSF).expect("packs");
        assert_eq!(buf, [44], "300 mod 256");
        assert_eq!(code, 2, "300 needs two bytes");
    }

    #[test]
    fn zero_packs_with_sign_code_zero() {
        let mut buf = [0xFFu8; 2];
        let code = pack(&BigInt::zero(), &mut buf, 2, 1, 0, LSF).expect("packs");
        assert_eq!(buf, [0, 0]);
        assert_eq!(code, 0);
    }

    #[test]
    fn negative_truncation_keeps_the_sign() {
        let mut buf = [0u8; 1];
        let code = pack(&BigInt::from_i64(-300), &mut buf, 1, 1, 0, LSF).expect("packs");
        assert_eq!(buf, [44], "sign-magnitude writes the magnitude residue");
        assert_eq!(code, -2);
    }

    // ── Order composition ──────────────────────────────────────────

    #[test]
    fn word_and_byte_order_compose_independently() {
        let value = BigInt::from_i64(0x0102030405060708);
        let mut buf = [0u8; 8];

        pack(&value, &mut buf, 2, 4, 0, PACK_LSWORD_FIRST | PACK_LSBYTE_FIRST).unwrap();
        assert_eq!(buf, [8, 7, 6, 5, 4, 3, 2, 1]);

        pack(&value, &mut buf, 2, 4, 0, PACK_MSWORD_FIRST | PACK_MSBYTE_FIRST).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);

        pack(&value, &mut buf, 2, 4, 0, PACK_MSWORD_FIRST | PACK_LSBYTE_FIRST).unwrap();
        assert_eq!(buf, [4, 3, 2, 1, 8, 7, 6, 5]);

        pack(&value, &mut buf, 2, 4, 0, PACK_LSWORD_FIRST | PACK_MSBYTE_FIRST).unwrap();
        assert_eq!(buf, [5, 6, 7, 8, 1, 2, 3, 4]);
    }

    #[test]
    fn native_byte_order_matches_the_machine() {
        let value = BigInt::from_i64(0x0102);
        let mut buf = [0u8; 2];
        pack(&value, &mut buf, 1, 2, 0, PACK_NATIVE_BYTE_ORDER).unwrap();
        assert_eq!(u16::from_ne_bytes(buf), 0x0102);
    }

    // ── Nails ──────────────────────────────────────────────────────

    #[test]
    fn nails_reserve_high_bits_per_word() {
        // 300 = 0b1_0010_1100 in 7-bit groups: 0b0101100 (44), 0b10 (2).
        let value = BigInt::from_i64(300);
        let mut buf = [0u8; 2];
        let code = pack(&value, &mut buf, 2, 1, 1, LSF).expect("packs");
        assert_eq!(buf, [44, 2]);
        assert_eq!(code, 1, "two 7-bit words hold 9 bits");
        assert_eq!(unpack(&buf, 2, 1, 1, LSF).expect("unpacks"), value);
    }

    // ── Two's complement ───────────────────────────────────────────

    #[test]
    fn twos_complement_pack_of_minus_one_is_all_ones() {
        let mut buf = [0u8; 2];
        let code =
            pack(&BigInt::from_i64(-1), &mut buf, 2, 1, 0, LSF | PACK_2COMP).expect("packs");
        assert_eq!(buf, [0xFF, 0xFF]);
        assert_eq!(code, -1);
    }

    #[test]
    fn twos_complement_unpack_reads_the_sign_bit() {
        let out = unpack(&[0xFF, 0xFF], 2, 1, 0, LSF | PACK_2COMP).expect("unpacks");
        assert_eq!(out, BigInt::from_i64(-1));

        let out = unpack(&[0x2C, 0xFE], 2, 1, 0, LSF | PACK_2COMP).expect("unpacks");
        assert_eq!(out, BigInt::from_i64(-468), "0xFE2C as signed 16-bit");

        let out = unpack(&[0x7F], 1, 1, 0, LSF | PACK_2COMP).expect("unpacks");
        assert_eq!(out, BigInt::from_i64(127), "high bit clear stays positive");
    }

    #[test]
    fn unsigned_unpack_ignores_the_sign_bit() {
        let out = unpack(&[0xFF, 0xFF], 2, 1, 0, LSF).expect("unpacks");
        assert_eq!(out, BigInt::from_i64(0xFFFF));
    }

    // ── Round trips ────────────────────────────────────────────────

    #[test]
    fn round_trips_across_the_i64_range_and_beyond() {
        let mut samples: Vec<BigInt> = [
            0i64, 1, -1, 255, 256, 300, -300, i64::MAX, i64::MIN,
        ]
        .iter()
        .map(|&n| BigInt::from_i64(n))
        .collect();
        // 2^64 and a value needing more than 8 words at wordsize 1.
        samples.push(BigInt::from_sign_limbs(1, &[0, 1]));
        samples.push(BigInt::from_sign_limbs(-1, &[0xDEAD_BEEF_F00D_CAFE, 0xFEDC]));

        for value in &samples {
            for flags in [LSF, MSF] {
                let numwords = 12;
                let mut buf = vec![0u8; numwords];
                let code = pack(value, &mut buf, numwords, 1, 0, flags).expect("packs");
                assert_eq!(code, value.sign, "{value:?} fits in 12 bytes");
                // Unsigned unpack keeps only the magnitude.
                let mut expect = value.clone();
                expect.sign = expect.sign.abs();
                let got = unpack(&buf, numwords, 1, 0, flags).expect("unpacks");
                assert_eq!(got, expect, "{value:?} under {flags:#x}");
            }
        }
    }

    #[test]
    fn twos_complement_round_trip_preserves_sign() {
        for n in [-1i64, -2, -127, -128, -300, -65535, i64::MIN + 1] {
            let value = BigInt::from_i64(n);
            let mut buf = vec![0u8; 9];
            pack(&value, &mut buf, 9, 1, 0, LSF | PACK_2COMP).expect("packs");
            let back = unpack(&buf, 9, 1, 0, LSF | PACK_2COMP).expect("unpacks");
            assert_eq!(back, value, "{n}");
        }
    }

    #[test]
    fn wide_words_round_trip() {
        let value = BigInt::from_sign_limbs(1, &[0x0123_4567_89AB_CDEF, 0x11, 0x22]);
        let mut buf = vec![0u8; 3 * 8];
        let code = pack(&value, &mut buf, 3, 8, 0, MSF).expect("packs");
        assert_eq!(code, 1);
        assert_eq!(unpack(&buf, 3, 8, 0, MSF).expect("unpacks"), value);
    }
}

//! DNA alphabet encoding.
//!
//! Two-bit packing used by the rolling hash window:
//! A -> 00, C -> 01, G -> 11, T -> 10. The complement of a base is its
//! encoding XOR 0b10, so reverse complements reduce to bit arithmetic.

use crate::error::{CdbgError, Result};

/// Encode a single nucleotide to 2 bits, or `None` for a non-ACGT byte.
#[inline]
pub const fn encode_base(base: u8) -> Option<u8> {
    match base {
        b'A' | b'a' => Some(0b00),
        b'C' | b'c' => Some(0b01),
        b'G' | b'g' => Some(0b11),
        b'T' | b't' => Some(0b10),
        _ => None,
    }
}

/// Decode a 2-bit value to an uppercase nucleotide.
#[inline]
pub const fn decode_base(bits: u8) -> u8 {
    match bits & 0b11 {
        0b00 => b'A',
        0b01 => b'C',
        0b11 => b'G',
        _ => b'T',
    }
}

/// Complement of an encoded base: A(00) <-> T(10), C(01) <-> G(11).
#[inline]
pub const fn complement_bits(bits: u8) -> u8 {
    bits ^ 0b10
}

/// Complement of a nucleotide symbol.
#[inline]
pub const fn complement_symbol(base: u8) -> u8 {
    match base {
        b'A' | b'a' => b'T',
        b'T' | b't' => b'A',
        b'C' | b'c' => b'G',
        _ => b'C',
    }
}

/// Reverse complement of a DNA byte string. Assumes a validated sequence.
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement_symbol(b)).collect()
}

/// Check that every byte of `seq` is a valid nucleotide.
///
/// # Errors
/// Returns `BadAlphabet` naming the first offending byte and its position.
pub fn validate(seq: &[u8]) -> Result<()> {
    for (pos, &base) in seq.iter().enumerate() {
        if encode_base(base).is_none() {
            return Err(CdbgError::BadAlphabet { base, pos });
        }
    }
    Ok(())
}

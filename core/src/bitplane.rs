//! Bit-plane encoding of integer arrays.
//!
//! # What is a Bit-Plane?
//!
//! Take 64 consecutive W-bit integers and transpose their bits: word *k* of
//! the resulting W-word **plane group** holds bit *k* of every integer, one
//! integer per bit-lane. A dot product over two encoded arrays then becomes
//! a weighted sum of `popcount(lhs_plane & rhs_plane)` terms — worthwhile on
//! hardware where population count is cheaper than a native multiply.
//!
//! # Layout invariant
//!
//! For element `i` with bit `j` set, the encoder sets bit `i % 64` of word
//! `(i / 64) * W + j`. The output is `ceil(size * W / 64)` words, padded up
//! to a multiple of [`PLANE_GROUP_WORDS`] with zeros. The padding is what
//! lets the per-unit program consume whole plane groups regardless of how a
//! chunked scatter splits the array: with `W = 32` every 32-word boundary is
//! a group boundary, so any 32-word-aligned chunk — including the padded
//! tail — is a whole number of groups. Zero lanes contribute nothing to any
//! popcount, so padding never changes the reduction.
//!
//! Decoding is never performed: the popcount reduction directly replaces
//! the arithmetic result, and correctness is established by comparing that
//! final scalar against a host multiply-accumulate.

/// Word granularity of the encoder's output padding, equal to the plane
/// count of the 32-bit element width the popcount program is built for.
pub const PLANE_GROUP_WORDS: usize = 32;

use crate::plan::align_up;

/// Encoded length in 64-bit words for `elems` elements of `width_bits` bits.
pub fn encoded_len(elems: usize, width_bits: usize) -> usize {
    align_up((elems * width_bits).div_ceil(64), PLANE_GROUP_WORDS)
}

/// Transposes an integer array into bit-plane layout.
pub fn encode<T>(src: &[T]) -> Vec<u64>
where
    T: Copy + Into<u64>,
{
    let width = std::mem::size_of::<T>() * 8;
    let mut dest = vec![0u64; encoded_len(src.len(), width)];

    for (i, &value) in src.iter().enumerate() {
        let group_base = (i / 64) * width;
        let lane = (i % 64) as u32;
        let bits: u64 = value.into();
        for (j, word) in dest[group_base..group_base + width].iter_mut().enumerate() {
            *word |= ((bits >> j) & 1) << lane;
        }
    }
    dest
}

//! Byte-level encoding for collective payloads.
//!
//! Typed slices go on the wire as their native bytes (`bytemuck`); ranks are
//! assumed to share one memory layout. Reduction counters are the exception:
//! they are always little-endian `u64`.

use crate::mesh_error::MeshPartitionError;
use bytemuck::Pod;
use static_assertions::const_assert_eq;
use std::mem::size_of;

/// Width in bytes of one reduction slot.
pub const COUNT_WIDTH: usize = size_of::<u64>();

const_assert_eq!(COUNT_WIDTH, 8);

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

/// Copy received bytes into a freshly allocated typed vector.
///
/// Received buffers carry no alignment guarantee, so this always copies.
pub fn collect_from_bytes<T: Pod>(bytes: &[u8]) -> Result<Vec<T>, MeshPartitionError> {
    let width = size_of::<T>();
    if width == 0 {
        return Ok(Vec::new());
    }
    if bytes.len() % width != 0 {
        return Err(MeshPartitionError::LengthMismatch {
            operation: "decode payload",
            expected: bytes.len() - bytes.len() % width,
            found: bytes.len(),
        });
    }
    let mut out = vec![T::zeroed(); bytes.len() / width];
    bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(bytes);
    Ok(out)
}

pub fn expect_exact_len(
    operation: &'static str,
    actual: usize,
    expected: usize,
) -> Result<(), MeshPartitionError> {
    if actual == expected {
        Ok(())
    } else {
        Err(MeshPartitionError::LengthMismatch {
            operation,
            expected,
            found: actual,
        })
    }
}

pub fn encode_counts(vals: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vals.len() * COUNT_WIDTH);
    for v in vals {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Decode little-endian counters; a short buffer decodes as many as it holds.
pub fn decode_counts(bytes: &[u8]) -> impl Iterator<Item = u64> + '_ {
    bytes.chunks_exact(COUNT_WIDTH).map(|chunk| {
        let mut raw = [0u8; COUNT_WIDTH];
        raw.copy_from_slice(chunk);
        u64::from_le_bytes(raw)
    })
}

/// Convert byte counts of a typed payload (`counts[r] * width`).
pub fn byte_counts(counts: &[usize], width: usize) -> Vec<usize> {
    counts.iter().map(|c| c * width).collect()
}

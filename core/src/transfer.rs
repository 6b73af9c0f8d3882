//! Chunk-span math and preconditions of the transfer protocol.
//!
//! # Scatter, Broadcast, Gather
//!
//! Three movement patterns cover every operand:
//!
//! - **Scatter** splits a host buffer into `ceil(total / chunk)` contiguous
//!   chunks and sends chunk *i* to unit *i*; only the last chunk may be
//!   short, and the receiving unit learns its exact element count through a
//!   separately conveyed parameter.
//! - **Broadcast** copies identical bytes to every unit — shared read-only
//!   operands. The plain form rounds the size up to the 8-byte transfer
//!   boundary (zero padded); the *exact* form does not and is meant for
//!   small fixed-size parameter records.
//! - **Gather** is the inverse of scatter, reassembling unit-ordered chunks
//!   into one contiguous host buffer under the same remainder rule.
//!
//! The primitives themselves live on [`UnitPool`](crate::pool::UnitPool);
//! this module owns the span arithmetic and the precondition checks that
//! keep malformed sizes, offsets and alignments from ever reaching a unit.

use std::ops::Range;

use crate::error::TransferError;
use crate::plan::TRANSFER_ALIGN;

/// Transfer and launch mode.
///
/// Asynchronous operations return immediately and are only guaranteed
/// complete after a pool-wide synchronization; synchronous operations flush
/// everything queued before them, so mixed sequences stay ordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Sync,
    Async,
}

/// Splits `total_bytes` into per-unit byte ranges of `chunk_bytes` each,
/// yielding `(rank, range)` pairs. The final range may be short.
pub(crate) fn chunk_spans(
    chunk_bytes: usize,
    total_bytes: usize,
) -> impl Iterator<Item = (usize, Range<usize>)> {
    let chunks = total_bytes.div_ceil(chunk_bytes);
    (0..chunks).map(move |rank| {
        let start = rank * chunk_bytes;
        (rank, start..(start + chunk_bytes).min(total_bytes))
    })
}

/// Checks the 8-byte alignment of a bulk-tier offset.
pub(crate) fn check_offset(offset: usize) -> Result<(), TransferError> {
    if offset % TRANSFER_ALIGN != 0 {
        return Err(TransferError::MisalignedOffset(offset));
    }
    Ok(())
}

/// Checks a nominal chunk byte size: non-zero and 8-byte aligned.
pub(crate) fn check_chunk(chunk_bytes: usize) -> Result<(), TransferError> {
    if chunk_bytes == 0 {
        return Err(TransferError::EmptyChunk);
    }
    if chunk_bytes % TRANSFER_ALIGN != 0 {
        return Err(TransferError::MisalignedChunk(chunk_bytes));
    }
    Ok(())
}

/// Checks that a per-unit region fits the bulk capacity.
pub(crate) fn check_bounds(
    offset: usize,
    len: usize,
    capacity: usize,
) -> Result<(), TransferError> {
    if offset + len > capacity {
        return Err(TransferError::OutOfBounds {
            offset,
            len,
            capacity,
        });
    }
    Ok(())
}

//! Error taxonomy of the engine.
//!
//! Four failure families, with different recovery stories:
//!
//! - [`EngineError::Allocation`] is recoverable — the caller may retry with
//!   fewer units or report upward.
//! - [`EngineError::ProgramLoad`] is fatal for the pool it was issued on.
//! - [`TransferError`] is a caller bug (malformed size, alignment or offset)
//!   caught by the transfer protocol's own precondition checks before any
//!   byte moves.
//! - [`EngineError::LaunchFault`] is fatal for the launch: no partial-result
//!   salvage is attempted and only an aggregate failure is reported.

use thiserror::Error;

use shardblas_kernels::KernelError;

/// Transfer-protocol precondition violations.
#[derive(Error, Debug)]
pub enum TransferError {
    /// An offset into the bulk tier missed the 8-byte transfer boundary.
    #[error("offset {0} is not aligned to the 8-byte transfer boundary")]
    MisalignedOffset(usize),
    /// A nominal chunk byte size missed the 8-byte transfer boundary.
    #[error("nominal chunk of {0} bytes is not aligned to the 8-byte transfer boundary")]
    MisalignedChunk(usize),
    /// A scatter or gather was issued with a zero-sized chunk.
    #[error("chunk size must be non-zero")]
    EmptyChunk,
    /// A transfer would run past the unit's bulk capacity.
    #[error("transfer of {len} bytes at offset {offset} exceeds the {capacity}-byte unit capacity")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },
    /// The data splits into more chunks than the pool has units.
    #[error("data splits into {chunks} chunks for a pool of {units} units")]
    ChunkCount { chunks: usize, units: usize },
    /// A destination buffer does not match the transfer size.
    #[error("destination holds {got} elements, transfer needs {expected}")]
    SizeMismatch { expected: usize, got: usize },
    /// A read referenced a symbol no program has written.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
    /// A deferred-gather ticket does not belong to this pool.
    #[error("no gathered data for this ticket")]
    UnknownTicket,
}

/// Top-level error type of the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Fewer units were available than requested; allocation is
    /// all-or-nothing.
    #[error("unit allocation failed: requested {requested}, available {available}")]
    Allocation { requested: usize, available: usize },
    /// The program name resolved to no image.
    #[error("unknown program image: {0}")]
    ProgramLoad(String),
    /// A transfer precondition was violated.
    #[error(transparent)]
    Transfer(#[from] TransferError),
    /// One or more units faulted during a launch.
    #[error("launch fault on {failed_units} unit(s): {first}")]
    LaunchFault {
        failed_units: usize,
        #[source]
        first: KernelError,
    },
    /// Even the minimum per-unit workload exceeds the unit memory budget.
    #[error("minimum per-unit workload of {required} bytes exceeds the {budget}-byte memory budget")]
    CapacityExceeded { required: usize, budget: usize },
}

pub type Result<T> = std::result::Result<T, EngineError>;

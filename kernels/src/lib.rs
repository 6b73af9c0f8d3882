//! # shardblas-kernels
//!
//! The per-unit worker programs of the `shardblas` engine.
//!
//! # What is a Program?
//!
//! A **program** is the piece of code that runs on a single compute unit
//! during a launch. Every unit in a pool runs the same program against its
//! own slice of the problem: a dot-product program reduces its local element
//! range to one partial sum, a matrix-vector program computes its local block
//! of output rows, and so on. The host never calls into a program directly —
//! it stages arguments into the unit's memory, triggers a launch, and reads
//! results back out.
//!
//! A program sees exactly one unit's [`UnitMemory`]: the bulk heap that the
//! host filled via scatter/broadcast, plus the named variable slots that
//! carry parameter blocks in and partial results out. Within a unit, work is
//! split across worker threads by [`worker_spans`]; each worker produces a
//! partial value and the partials are folded only after every span has
//! completed, so no two workers ever race on a shared scalar.
//!
//! This crate is freestanding: the engine depends on it, never the reverse.
//! [`KernelElem`] mirrors the engine's element trait to keep it that way.

use std::fmt::Debug;
use std::sync::Arc;

use bytemuck::Pod;
use num_traits::{Num, NumAssign};
use thiserror::Error;

pub mod dot;
pub mod gemv;
pub mod memory;
pub mod popcount;
pub mod reduce;
pub mod span;

pub use gemv::GemvArgs;
pub use memory::{UnitMemory, BULK};
pub use span::{worker_span, worker_spans};

/// Error type for program execution and unit memory access.
///
/// A program returning an error is a **fault**: the engine treats it as fatal
/// for the whole launch and does not attempt partial-result salvage.
#[derive(Error, Debug)]
pub enum KernelError {
    /// A read referenced a symbol that was never written.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
    /// A heap access fell outside the unit's bulk capacity.
    #[error("access of {len} bytes at offset {offset} is out of bounds (capacity {capacity})")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },
    /// A typed view of a byte region was not aligned for the element type.
    #[error("heap region at offset {offset} is misaligned for {type_name}")]
    Misaligned {
        offset: usize,
        type_name: &'static str,
    },
    /// A required parameter was missing or shorter than the program expects.
    #[error("missing parameter: {0}")]
    MissingParam(String),
    /// A parameter value violates the program's contract.
    #[error("bad parameter: {0}")]
    BadParam(&'static str),
}

pub type Result<T> = std::result::Result<T, KernelError>;

/// Trait bound for scalars a program can operate on.
///
/// Mirrors the engine's element trait; `Pod` is required because every value
/// crosses the host/unit boundary as raw bytes.
pub trait KernelElem:
    Num + NumAssign + Copy + Clone + Debug + Send + Sync + Pod + PartialOrd
{
}

impl<T> KernelElem for T where
    T: Num + NumAssign + Copy + Clone + Debug + Send + Sync + Pod + PartialOrd
{
}

/// Execution environment a unit provides to its program.
#[derive(Clone, Copy, Debug)]
pub struct ExecEnv {
    /// Number of worker threads on the unit.
    pub workers: usize,
}

/// A compiled program image, keyed by name in the [`lookup`] registry.
pub trait Program: Send + Sync {
    /// The registry name of this program.
    fn name(&self) -> &'static str;

    /// Executes the program against one unit's memory.
    ///
    /// An `Err` is a launch fault for the whole pool.
    fn run(&self, mem: &mut UnitMemory, env: &ExecEnv) -> Result<()>;
}

/// Symbol names shared between the host-side drivers and the programs.
///
/// Symbol naming and parameter-block layout are the compatibility contract at
/// the host/unit boundary: a mismatch is silent corruption, not a checked
/// error.
pub mod symbols {
    /// Per-unit element (or word) count of the local input range.
    pub const COUNT: &str = "count";
    /// Byte offset of the second operand within the bulk heap.
    pub const RHS_OFFSET: &str = "rhs_offset";
    /// Per-unit partial result of a reduction program.
    pub const RESULT: &str = "result";
    /// Packed parameter block of the matrix-vector programs.
    pub const ARGS: &str = "args";
    /// Per-unit partial maximum / broadcast global maximum.
    pub const MAX: &str = "max";
    /// Per-unit partial sum.
    pub const SUM: &str = "sum";
    /// Broadcast global divisor.
    pub const DIVISOR: &str = "divisor";
}

/// Registry names of all program images.
pub mod programs {
    pub use crate::dot::{DOT_F32, DOT_I32, DOT_U32};
    pub use crate::gemv::{GEMV_F32, GEMV_I32, GEMV_I8};
    pub use crate::popcount::DOT_PLANES_U32;
    pub use crate::reduce::{VEC_DIV_F32, VEC_EXP_SUM_F32, VEC_MAX_F32};
}

/// Resolves a program name to its image.
///
/// Returns `None` for unknown names; the engine surfaces that as a program
/// load error.
pub fn lookup(name: &str) -> Option<Arc<dyn Program>> {
    match name {
        dot::DOT_U32 => Some(Arc::new(dot::DotProgram::<u32, u64>::new(dot::DOT_U32))),
        dot::DOT_I32 => Some(Arc::new(dot::DotProgram::<i32, i64>::new(dot::DOT_I32))),
        dot::DOT_F32 => Some(Arc::new(dot::DotProgram::<f32, f32>::new(dot::DOT_F32))),
        popcount::DOT_PLANES_U32 => Some(Arc::new(popcount::PlaneDotProgram)),
        gemv::GEMV_F32 => Some(Arc::new(gemv::GemvProgram::<f32, f32>::new(gemv::GEMV_F32))),
        gemv::GEMV_I32 => Some(Arc::new(gemv::GemvProgram::<i32, i32>::new(gemv::GEMV_I32))),
        gemv::GEMV_I8 => Some(Arc::new(gemv::GemvProgram::<i8, i32>::new(gemv::GEMV_I8))),
        reduce::VEC_MAX_F32 => Some(Arc::new(reduce::VecMaxProgram)),
        reduce::VEC_EXP_SUM_F32 => Some(Arc::new(reduce::VecExpSumProgram)),
        reduce::VEC_DIV_F32 => Some(Arc::new(reduce::VecDivProgram)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_programs() {
        for name in [
            programs::DOT_U32,
            programs::DOT_I32,
            programs::DOT_F32,
            programs::DOT_PLANES_U32,
            programs::GEMV_F32,
            programs::GEMV_I32,
            programs::GEMV_I8,
            programs::VEC_MAX_F32,
            programs::VEC_EXP_SUM_F32,
            programs::VEC_DIV_F32,
        ] {
            let program = lookup(name).unwrap();
            assert_eq!(program.name(), name);
        }
    }

    #[test]
    fn test_lookup_unknown_program() {
        assert!(lookup("no_such_program").is_none());
    }
}

//! Dot-product drivers: plain multiply-accumulate and bit-plane popcount.

use num_traits::Zero;
use tracing::debug;

use shardblas_kernels::{programs, symbols};

use crate::bitplane::{self, PLANE_GROUP_WORDS};
use crate::elem::EngineElem;
use crate::error::Result;
use crate::pipeline::Combine;
use crate::plan::plan_chunks;
use crate::pool::{UnitFleet, UnitPool};
use crate::transfer::Mode;

/// Element types the plain dot-product driver accepts, with their widened
/// accumulator type and per-unit program.
pub trait DotElement: EngineElem + Into<Self::Acc> {
    type Acc: EngineElem;
    const PROGRAM: &'static str;
}

impl DotElement for u32 {
    type Acc = u64;
    const PROGRAM: &'static str = programs::DOT_U32;
}

impl DotElement for i32 {
    type Acc = i64;
    const PROGRAM: &'static str = programs::DOT_I32;
}

impl DotElement for f32 {
    type Acc = f32;
    const PROGRAM: &'static str = programs::DOT_F32;
}

/// Largest per-unit chunk that keeps `resident` equally-sized operands
/// co-resident in one unit's bulk tier, in 2-element granularity.
pub(crate) fn max_chunk_elems<T>(capacity: usize, resident: usize) -> usize {
    let elems = capacity / (resident * std::mem::size_of::<T>());
    (elems & !1).max(2)
}

/// Computes the dot product of two equal-length vectors across the fleet.
///
/// Elements are partitioned by count, both operand ranges co-resident per
/// unit; each unit reduces its range to one widened partial sum and the host
/// combines by addition.
pub fn dot<T: DotElement, F: UnitFleet>(fleet: &F, a: &[T], b: &[T]) -> Result<T::Acc> {
    assert_eq!(a.len(), b.len(), "dot operands must have equal length");
    if a.is_empty() {
        return Ok(<T::Acc>::zero());
    }

    let plan = plan_chunks(a.len(), max_chunk_elems::<T>(fleet.unit_capacity(), 2), 2);
    debug!(
        units = plan.unit_count,
        chunk = plan.chunk,
        tail = plan.tail,
        "dot launch plan"
    );

    let mut pool = UnitPool::acquire(fleet, plan.unit_count as usize)?;
    pool.load(T::PROGRAM)?;

    pool.broadcast_exact(symbols::COUNT, 0, &(plan.chunk as u64), Mode::Async)?;
    if plan.tail != plan.chunk {
        let last = pool.unit_count() - 1;
        pool.broadcast_exact_at(last, symbols::COUNT, 0, &(plan.tail as u64), Mode::Async)?;
    }

    let rhs_offset = pool.scatter_packed(0, a, plan.chunk, Mode::Async)?;
    pool.scatter_packed(rhs_offset, b, plan.chunk, Mode::Async)?;
    pool.broadcast_exact(symbols::RHS_OFFSET, 0, &(rhs_offset as u64), Mode::Async)?;

    pool.launch(Mode::Sync)?;

    let mut partials = vec![<T::Acc>::zero(); pool.unit_count()];
    pool.copy_each(symbols::RESULT, &mut partials)?;
    Ok(Combine::Sum.fold(&partials))
}

/// Per-unit word budget of the bit-plane driver; whole plane groups, kept
/// small enough to spread encoded operands across several units.
const MAX_PLANE_CHUNK_WORDS: usize = 8 * 1024;

/// Computes an exact `u32` dot product via bit-plane encoding and popcount
/// reduction.
///
/// Both operands are transposed into plane groups on the host, scattered in
/// group-aligned chunks, and reduced per unit as a convolution of plane
/// popcounts; the host combines partial sums by addition. The result equals
/// the plain multiply-accumulate exactly.
pub fn dot_planes<F: UnitFleet>(fleet: &F, a: &[u32], b: &[u32]) -> Result<u64> {
    assert_eq!(a.len(), b.len(), "dot operands must have equal length");
    if a.is_empty() {
        return Ok(0);
    }

    let lhs = bitplane::encode(a);
    let rhs = bitplane::encode(b);

    let capacity_words = (fleet.unit_capacity() / (2 * 8)) & !(PLANE_GROUP_WORDS - 1);
    let max_chunk = MAX_PLANE_CHUNK_WORDS
        .min(capacity_words)
        .max(PLANE_GROUP_WORDS);
    let plan = plan_chunks(lhs.len(), max_chunk, PLANE_GROUP_WORDS);
    debug!(
        units = plan.unit_count,
        chunk_words = plan.chunk,
        tail_words = plan.tail,
        "bit-plane dot launch plan"
    );

    let mut pool = UnitPool::acquire(fleet, plan.unit_count as usize)?;
    pool.load(programs::DOT_PLANES_U32)?;

    pool.broadcast_exact(symbols::COUNT, 0, &(plan.chunk as u64), Mode::Async)?;
    if plan.tail != plan.chunk {
        let last = pool.unit_count() - 1;
        pool.broadcast_exact_at(last, symbols::COUNT, 0, &(plan.tail as u64), Mode::Async)?;
    }

    let rhs_offset = pool.scatter_packed(0, &lhs, plan.chunk, Mode::Async)?;
    pool.scatter_packed(rhs_offset, &rhs, plan.chunk, Mode::Async)?;
    pool.broadcast_exact(symbols::RHS_OFFSET, 0, &(rhs_offset as u64), Mode::Async)?;

    pool.launch(Mode::Sync)?;

    let mut partials = vec![0u64; pool.unit_count()];
    pool.copy_each(symbols::RESULT, &mut partials)?;
    Ok(Combine::Sum.fold(&partials))
}

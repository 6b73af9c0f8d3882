//! Softmax driver: a three-phase tree reduction over one partitioning.
//!
//! The vector is scattered once, in contiguous per-unit ranges of 2-element
//! granularity with the remainder folded into the last unit's range, and
//! then transformed in place by three sequential launches:
//!
//! 1. **max** — each unit reduces its range to a local maximum; the host
//!    combines to the global maximum.
//! 2. **exp_and_sum** — the global maximum is broadcast; each unit rewrites
//!    its range to `exp(x - max)` and reduces to a local sum; the host
//!    combines to the global sum. Subtracting the maximum first keeps every
//!    exponent non-positive, which is what makes the computation stable for
//!    large inputs.
//! 3. **divide** — the global sum is broadcast; each unit normalizes its
//!    range in place.
//!
//! Phases cannot be reordered or overlapped: each one's broadcast parameter
//! is the previous one's combined result.

use tracing::debug;

use shardblas_kernels::{programs, symbols};

use crate::drivers::dot::max_chunk_elems;
use crate::error::Result;
use crate::pipeline::{run_phases, Combine, Phase};
use crate::plan::plan_chunks;
use crate::pool::{UnitFleet, UnitPool};
use crate::transfer::Mode;

/// Computes the softmax of `input` into `output`.
///
/// The output sums to 1 within floating-point tolerance and is invariant
/// under adding a constant to every input element.
pub fn softmax<F: UnitFleet>(fleet: &F, input: &[f32], output: &mut [f32]) -> Result<()> {
    assert_eq!(input.len(), output.len(), "softmax buffers must match");
    if input.is_empty() {
        return Ok(());
    }

    let plan = plan_chunks(
        input.len(),
        max_chunk_elems::<f32>(fleet.unit_capacity(), 1),
        2,
    );
    debug!(
        units = plan.unit_count,
        chunk = plan.chunk,
        tail = plan.tail,
        "softmax launch plan"
    );

    let mut pool = UnitPool::acquire(fleet, plan.unit_count as usize)?;
    pool.load(programs::VEC_MAX_F32)?;

    pool.broadcast_exact(symbols::COUNT, 0, &(plan.chunk as u64), Mode::Async)?;
    if plan.tail != plan.chunk {
        let last = pool.unit_count() - 1;
        pool.broadcast_exact_at(last, symbols::COUNT, 0, &(plan.tail as u64), Mode::Async)?;
    }
    pool.scatter_packed(0, input, plan.chunk, Mode::Async)?;

    let phases = [
        Phase::<f32>::new(
            programs::VEC_MAX_F32,
            None,
            Some((symbols::MAX, Combine::Max)),
        ),
        Phase::new(
            programs::VEC_EXP_SUM_F32,
            Some(symbols::MAX),
            Some((symbols::SUM, Combine::Sum)),
        ),
        Phase::new(programs::VEC_DIV_F32, Some(symbols::DIVISOR), None),
    ];
    run_phases(&mut pool, &phases, None)?;

    pool.gather_packed(0, output, plan.chunk)?;
    Ok(())
}

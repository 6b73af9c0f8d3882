//! Population-count dot-product program over bit-plane-encoded operands.
//!
//! The operands arrive as 32-word **plane groups**: word *k* of a group
//! holds bit *k* of each of 64 consecutive integers, one bit-lane per
//! integer. A dot product then decomposes by bit weight: for every pair of
//! planes `(j, k)`, `popcount(lhs[j] & rhs[k])` counts the element positions
//! contributing `2^(j+k)`, so the group's dot product is a convolution of
//! plane popcounts. This replaces per-element multiplies entirely.
//!
//! The per-unit word count must be a whole number of plane groups; the
//! host-side encoder pads every operand to a 32-word multiple to keep that
//! invariant for any chunking.

use rayon::prelude::*;

use crate::memory::typed;
use crate::{symbols, ExecEnv, KernelError, Program, Result, UnitMemory};

pub const DOT_PLANES_U32: &str = "dot_planes_u32";

/// Bit width of the encoded elements, and the word count of one plane group.
pub const PLANES: usize = 32;

/// Popcount-convolution dot product over local plane-group ranges.
pub struct PlaneDotProgram;

fn group_dot(lhs: &[u64], rhs: &[u64]) -> u64 {
    let mut dp = 0u64;
    for exp in 0..=(2 * (PLANES - 1)) {
        let lo = exp.saturating_sub(PLANES - 1);
        let hi = exp.min(PLANES - 1);
        let mut part = 0u64;
        for j in lo..=hi {
            part += (lhs[j] & rhs[exp - j]).count_ones() as u64;
        }
        dp += part << exp;
    }
    dp
}

impl Program for PlaneDotProgram {
    fn name(&self) -> &'static str {
        DOT_PLANES_U32
    }

    fn run(&self, mem: &mut UnitMemory, env: &ExecEnv) -> Result<()> {
        let count = mem.var::<u64>(symbols::COUNT)? as usize;
        let rhs_offset = mem.var::<u64>(symbols::RHS_OFFSET)? as usize;
        if count % PLANES != 0 {
            return Err(KernelError::BadParam(
                "plane word count must be a whole number of plane groups",
            ));
        }

        let lhs: &[u64] = typed(mem.heap_range(0, count * 8)?)?;
        let rhs: &[u64] = typed(mem.heap_range(rhs_offset, count * 8)?)?;

        let groups = count / PLANES;
        let spans: Vec<_> = crate::worker_spans(groups, env.workers, 1).collect();
        let partials: Vec<u64> = spans
            .into_par_iter()
            .map(|r| {
                r.map(|g| {
                    let base = g * PLANES;
                    group_dot(&lhs[base..base + PLANES], &rhs[base..base + PLANES])
                })
                .sum()
            })
            .collect();

        mem.set_var(symbols::RESULT, partials.iter().sum::<u64>());
        Ok(())
    }
}

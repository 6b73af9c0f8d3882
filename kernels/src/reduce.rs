//! Vector reduction programs for the multi-phase softmax pipeline.
//!
//! Three programs share one heap layout: the unit's local element range at
//! offset 0, with its length in [`symbols::COUNT`](crate::symbols::COUNT).
//!
//! - [`VecMaxProgram`] reduces the range to its maximum.
//! - [`VecExpSumProgram`] rewrites every element to `exp(x - max)` in place
//!   and reduces to the local sum; `max` arrives broadcast from the previous
//!   phase's host-side combine.
//! - [`VecDivProgram`] divides the (already exponentiated) range by the
//!   broadcast global divisor in place.
//!
//! Worker spans use 2-element granularity to match the transfer alignment of
//! 4-byte scalars.

use rayon::prelude::*;

use crate::memory::typed_mut;
use crate::{symbols, ExecEnv, Program, Result, UnitMemory};

pub const VEC_MAX_F32: &str = "vec_max_f32";
pub const VEC_EXP_SUM_F32: &str = "vec_exp_sum_f32";
pub const VEC_DIV_F32: &str = "vec_div_f32";

fn local_range<'a>(mem: &'a mut UnitMemory) -> Result<(&'a mut [f32], usize)> {
    let count = mem.var::<u64>(symbols::COUNT)? as usize;
    let bytes = count * std::mem::size_of::<f32>();
    if bytes > mem.capacity() {
        return Err(crate::KernelError::OutOfBounds {
            offset: 0,
            len: bytes,
            capacity: mem.capacity(),
        });
    }
    let heap = mem.heap_bytes_mut();
    Ok((typed_mut(&mut heap[..bytes])?, count))
}

/// Local maximum of the unit's element range.
pub struct VecMaxProgram;

impl Program for VecMaxProgram {
    fn name(&self) -> &'static str {
        VEC_MAX_F32
    }

    fn run(&self, mem: &mut UnitMemory, env: &ExecEnv) -> Result<()> {
        let workers = env.workers;
        let (data, count) = local_range(mem)?;
        let span = crate::worker_span(count, workers, 2).max(2);
        let partials: Vec<f32> = data
            .par_chunks(span)
            .map(|chunk| chunk.iter().copied().fold(f32::NEG_INFINITY, f32::max))
            .collect();
        let max = partials.into_iter().fold(f32::NEG_INFINITY, f32::max);
        mem.set_var(symbols::MAX, max);
        Ok(())
    }
}

/// In-place `exp(x - max)` plus local sum.
pub struct VecExpSumProgram;

impl Program for VecExpSumProgram {
    fn name(&self) -> &'static str {
        VEC_EXP_SUM_F32
    }

    fn run(&self, mem: &mut UnitMemory, env: &ExecEnv) -> Result<()> {
        let max = mem.var::<f32>(symbols::MAX)?;
        let workers = env.workers;
        let (data, count) = local_range(mem)?;
        let span = crate::worker_span(count, workers, 2).max(2);
        let partials: Vec<f32> = data
            .par_chunks_mut(span)
            .map(|chunk| {
                chunk
                    .iter_mut()
                    .map(|x| {
                        *x = (*x - max).exp();
                        *x
                    })
                    .sum::<f32>()
            })
            .collect();
        let sum = partials.into_iter().sum::<f32>();
        mem.set_var(symbols::SUM, sum);
        Ok(())
    }
}

/// In-place division by the broadcast global divisor.
pub struct VecDivProgram;

impl Program for VecDivProgram {
    fn name(&self) -> &'static str {
        VEC_DIV_F32
    }

    fn run(&self, mem: &mut UnitMemory, env: &ExecEnv) -> Result<()> {
        let divisor = mem.var::<f32>(symbols::DIVISOR)?;
        let workers = env.workers;
        let (data, count) = local_range(mem)?;
        let span = crate::worker_span(count, workers, 2).max(2);
        data.par_chunks_mut(span).for_each(|chunk| {
            for x in chunk {
                *x /= divisor;
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::BULK;

    fn stage(values: &[f32]) -> UnitMemory {
        let mut mem = UnitMemory::new(4096);
        mem.write(BULK, 0, bytemuck::cast_slice(values)).unwrap();
        mem.set_var(symbols::COUNT, values.len() as u64);
        mem
    }

    fn read_range(mem: &UnitMemory, count: usize) -> Vec<f32> {
        let mut out = vec![0f32; count];
        mem.read(BULK, 0, bytemuck::cast_slice_mut(&mut out)).unwrap();
        out
    }

    #[test]
    fn test_max_of_all_negative_range() {
        let mut mem = stage(&[-5.0, -2.5, -9.0]);
        VecMaxProgram.run(&mut mem, &ExecEnv { workers: 2 }).unwrap();
        assert_eq!(mem.var::<f32>(symbols::MAX).unwrap(), -2.5);
    }

    #[test]
    fn test_exp_sum_rewrites_in_place() {
        let mut mem = stage(&[1.0, 0.0, 1.0, 0.0]);
        mem.set_var(symbols::MAX, 1.0f32);
        VecExpSumProgram
            .run(&mut mem, &ExecEnv { workers: 2 })
            .unwrap();

        let e = (-1.0f32).exp();
        let range = read_range(&mem, 4);
        assert!((range[0] - 1.0).abs() < 1e-6);
        assert!((range[1] - e).abs() < 1e-6);
        let sum = mem.var::<f32>(symbols::SUM).unwrap();
        assert!((sum - (2.0 + 2.0 * e)).abs() < 1e-5);
    }

    #[test]
    fn test_divide_in_place() {
        let mut mem = stage(&[2.0, 4.0, 8.0]);
        mem.set_var(symbols::DIVISOR, 2.0f32);
        VecDivProgram.run(&mut mem, &ExecEnv { workers: 4 }).unwrap();
        assert_eq!(read_range(&mem, 3), vec![1.0, 2.0, 4.0]);
    }
}

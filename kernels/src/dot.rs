//! Multiply-accumulate dot-product program.
//!
//! Each unit holds its local ranges of the two operands in the bulk heap:
//! the left-hand range at offset 0 and the right-hand range at the byte
//! offset carried by [`symbols::RHS_OFFSET`](crate::symbols::RHS_OFFSET).
//! Products are widened into the accumulator type before summing, so the
//! integer variants are exact; the per-unit partial sum goes out through
//! [`symbols::RESULT`](crate::symbols::RESULT).

use std::marker::PhantomData;

use rayon::prelude::*;

use crate::memory::typed;
use crate::{symbols, ExecEnv, KernelElem, Program, Result, UnitMemory};

pub const DOT_U32: &str = "dot_u32";
pub const DOT_I32: &str = "dot_i32";
pub const DOT_F32: &str = "dot_f32";

/// Dot product of two local element ranges, generic over the element type
/// `T` and the widened accumulator type `A`.
pub struct DotProgram<T, A> {
    name: &'static str,
    _marker: PhantomData<fn() -> (T, A)>,
}

impl<T, A> DotProgram<T, A> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }
}

impl<T, A> Program for DotProgram<T, A>
where
    T: KernelElem + Into<A>,
    A: KernelElem,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn run(&self, mem: &mut UnitMemory, env: &ExecEnv) -> Result<()> {
        let count = mem.var::<u64>(symbols::COUNT)? as usize;
        let rhs_offset = mem.var::<u64>(symbols::RHS_OFFSET)? as usize;
        let elem = std::mem::size_of::<T>();

        let lhs: &[T] = typed(mem.heap_range(0, count * elem)?)?;
        let rhs: &[T] = typed(mem.heap_range(rhs_offset, count * elem)?)?;

        let spans: Vec<_> = crate::worker_spans(count, env.workers, 2).collect();
        let partials: Vec<A> = spans
            .into_par_iter()
            .map(|r| {
                lhs[r.clone()]
                    .iter()
                    .zip(&rhs[r])
                    .fold(A::zero(), |acc, (&a, &b)| {
                        acc + Into::<A>::into(a) * Into::<A>::into(b)
                    })
            })
            .collect();

        let total = partials.into_iter().fold(A::zero(), |acc, p| acc + p);
        mem.set_var(symbols::RESULT, total);
        Ok(())
    }
}

//! Row-block matrix-vector program: `y = alpha * A * x + beta * y`.
//!
//! Each unit holds a block of `rows_per_unit` matrix rows, the full input
//! vector, and its block of the output vector, packed into the bulk heap in
//! that order at 8-byte-aligned offsets:
//!
//! ```text
//! A block  @ 0
//! x        @ align8(rows_per_unit * row_width * size_of::<In>())
//! y block  @ x_offset + align8(row_width * size_of::<In>())
//! ```
//!
//! The program recomputes the same offsets from the parameter block the host
//! broadcast; the layout is part of the host/unit contract. Rows are split
//! across workers in 2-row granularity so each worker's output block stays
//! on the 8-byte boundary. `beta` is applied at runtime: when it is zero the
//! resident `y` block is ignored rather than read.

use std::marker::PhantomData;

use bytemuck::{Pod, Zeroable};
use rayon::prelude::*;

use crate::memory::{typed, typed_mut};
use crate::{symbols, ExecEnv, KernelElem, KernelError, Program, Result, UnitMemory};

pub const GEMV_F32: &str = "gemv_f32";
pub const GEMV_I32: &str = "gemv_i32";
pub const GEMV_I8: &str = "gemv_i8";

/// Packed per-launch parameter block of the matrix-vector programs.
///
/// Broadcast exactly, so the layout here must match what the host driver
/// stages byte for byte.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct GemvArgs<A> {
    pub rows_per_unit: u32,
    pub row_width: u32,
    pub alpha: A,
    pub beta: A,
}

// Concrete Pod instantiations: both layouts are 16 bytes with no padding.
unsafe impl Zeroable for GemvArgs<f32> {}
unsafe impl Pod for GemvArgs<f32> {}
unsafe impl Zeroable for GemvArgs<i32> {}
unsafe impl Pod for GemvArgs<i32> {}

fn align8(value: usize) -> usize {
    (value + 7) & !7
}

/// Matrix-vector product over a local row block, generic over the input
/// element type `In` and the accumulator/output type `A`.
pub struct GemvProgram<In, A> {
    name: &'static str,
    _marker: PhantomData<fn() -> (In, A)>,
}

impl<In, A> GemvProgram<In, A> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }
}

impl<In, A> Program for GemvProgram<In, A>
where
    In: KernelElem + Into<A>,
    A: KernelElem,
    GemvArgs<A>: Pod,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn run(&self, mem: &mut UnitMemory, env: &ExecEnv) -> Result<()> {
        let args = mem.var::<GemvArgs<A>>(symbols::ARGS)?;
        let rows = args.rows_per_unit as usize;
        let width = args.row_width as usize;
        if rows == 0 || width == 0 {
            return Err(KernelError::BadParam("rows_per_unit and row_width must be non-zero"));
        }

        let in_size = std::mem::size_of::<In>();
        let out_size = std::mem::size_of::<A>();
        let a_bytes = rows * width * in_size;
        let x_offset = align8(a_bytes);
        let y_offset = x_offset + align8(width * in_size);
        let y_bytes = rows * out_size;
        if y_offset + y_bytes > mem.capacity() {
            return Err(KernelError::OutOfBounds {
                offset: y_offset,
                len: y_bytes,
                capacity: mem.capacity(),
            });
        }

        let heap = mem.heap_bytes_mut();
        let (head, tail) = heap.split_at_mut(y_offset);
        let a: &[In] = typed(&head[..a_bytes])?;
        let x: &[In] = typed(&head[x_offset..x_offset + width * in_size])?;
        let y: &mut [A] = typed_mut(&mut tail[..y_bytes])?;

        let span = crate::worker_span(rows, env.workers, 2);
        y.par_chunks_mut(span).enumerate().for_each(|(w, block)| {
            let first_row = w * span;
            for (i, out) in block.iter_mut().enumerate() {
                let row = first_row + i;
                let a_row = &a[row * width..(row + 1) * width];
                let acc = a_row
                    .iter()
                    .zip(x)
                    .fold(A::zero(), |acc, (&m, &v)| {
                        acc + Into::<A>::into(m) * Into::<A>::into(v)
                    });
                *out = if args.beta != A::zero() {
                    args.alpha * acc + args.beta * *out
                } else {
                    args.alpha * acc
                };
            }
        });

        Ok(())
    }
}

//! One-shot matrix-vector driver.

use crate::drivers::resident::{GemvElement, ResidentMatrix};
use crate::error::Result;
use crate::pool::UnitFleet;

use bytemuck::Pod;
use shardblas_kernels::GemvArgs;

/// Computes `y = alpha * A * x + beta * y` for a row-major `m × n` matrix.
///
/// A is scattered by row blocks, `x` broadcast to every unit and the `y`
/// blocks scattered in when `beta` is non-zero; each unit computes its block
/// locally and the blocks are gathered back into `y`. The pool is acquired
/// for this one product and released before returning, on success and error
/// paths alike.
pub fn gemv<T, F>(
    fleet: &F,
    m: u32,
    n: u32,
    a: &[T],
    x: &[T],
    y: &mut [T::Out],
    alpha: T::Out,
    beta: T::Out,
) -> Result<()>
where
    T: GemvElement,
    F: UnitFleet,
    GemvArgs<T::Out>: Pod,
{
    let mut resident = ResidentMatrix::new(fleet, a, m, n, alpha, beta)?;
    resident.multiply(x, y)
}

//! A matrix kept resident across repeated multiplies.
//!
//! Scattering a large matrix dominates the cost of a single matrix-vector
//! product, so callers that multiply the same matrix by many vectors pay it
//! once: [`ResidentMatrix::new`] plans the tiling, acquires a pool, scatters
//! the row blocks and broadcasts the parameter block, and every subsequent
//! [`ResidentMatrix::multiply`] only moves the input vector in and the
//! output block back out. The one-shot [`gemv`](crate::drivers::gemv::gemv)
//! driver and the matrix-matrix replica pool are both thin layers over this
//! type.

use tracing::debug;

use shardblas_kernels::{programs, symbols, GemvArgs};

use bytemuck::Pod;

use num_traits::Zero;

use crate::elem::EngineElem;
use crate::error::Result;
use crate::plan::{align_up, plan_row_tiles, TilePlan, TRANSFER_ALIGN};
use crate::pool::{UnitBackend, UnitFleet, UnitPool};
use crate::transfer::Mode;

/// Element types the matrix-vector drivers accept, with their
/// accumulator/output type and per-unit program.
pub trait GemvElement: EngineElem + Into<Self::Out> {
    type Out: EngineElem;
    const PROGRAM: &'static str;
}

impl GemvElement for f32 {
    type Out = f32;
    const PROGRAM: &'static str = programs::GEMV_F32;
}

impl GemvElement for i32 {
    type Out = i32;
    const PROGRAM: &'static str = programs::GEMV_I32;
}

impl GemvElement for i8 {
    type Out = i32;
    const PROGRAM: &'static str = programs::GEMV_I8;
}

/// Default number of units to spread one matrix over, capped by fleet
/// availability.
const REQUESTED_UNITS: u32 = 64;

/// Minimum row granularity: each worker's output block must land on the
/// 8-byte transfer boundary, and a unit's row-block byte size must stay
/// 8-aligned for any row width (which matters for 1-byte input elements).
fn min_row_granularity<In, Out>(workers: usize) -> u32 {
    let rows_per_worker = (TRANSFER_ALIGN / std::mem::size_of::<Out>()).max(1);
    let in_align = (TRANSFER_ALIGN / std::mem::size_of::<In>().min(TRANSFER_ALIGN)).max(1);
    align_up(workers * rows_per_worker, in_align) as u32
}

/// A row-major `rows × cols` matrix scattered across an acquired pool,
/// ready for repeated `y = alpha * A * x + beta * y` products.
pub struct ResidentMatrix<T: GemvElement, B: UnitBackend> {
    pool: UnitPool<B>,
    plan: TilePlan,
    rows: u32,
    cols: u32,
    beta: T::Out,
    x_offset: usize,
    y_offset: usize,
    _marker: std::marker::PhantomData<T>,
}

impl<T, B> ResidentMatrix<T, B>
where
    T: GemvElement,
    B: UnitBackend,
    GemvArgs<T::Out>: Pod,
{
    /// Plans, acquires and populates a pool with the matrix `a` and the
    /// scalar parameters; blocks until the matrix is fully transferred.
    pub fn new<F: UnitFleet<Backend = B>>(
        fleet: &F,
        a: &[T],
        rows: u32,
        cols: u32,
        alpha: T::Out,
        beta: T::Out,
    ) -> Result<Self> {
        assert_eq!(
            a.len(),
            rows as usize * cols as usize,
            "matrix buffer does not match its shape"
        );

        let requested = (fleet.available() as u32).min(REQUESTED_UNITS).max(1);
        let plan = plan_row_tiles(
            rows,
            cols,
            requested,
            std::mem::size_of::<T>(),
            fleet.unit_capacity(),
            min_row_granularity::<T, T::Out>(fleet.worker_count()),
        )?;
        debug!(
            units = plan.unit_count,
            rows_per_unit = plan.rows_per_unit,
            "resident matrix plan"
        );

        let mut pool = UnitPool::acquire(fleet, plan.unit_count as usize)?;
        pool.load(T::PROGRAM)?;

        let args = GemvArgs {
            rows_per_unit: plan.rows_per_unit,
            row_width: cols,
            alpha,
            beta,
        };
        pool.broadcast_exact(symbols::ARGS, 0, &args, Mode::Async)?;

        let tile_elems = plan.rows_per_unit as usize * cols as usize;
        let x_offset = pool.scatter_packed(0, a, tile_elems, Mode::Async)?;
        let y_offset = x_offset + align_up(cols as usize * std::mem::size_of::<T>(), TRANSFER_ALIGN);
        pool.synchronize()?;

        Ok(Self {
            pool,
            plan,
            rows,
            cols,
            beta,
            x_offset,
            y_offset,
            _marker: std::marker::PhantomData,
        })
    }

    /// Matrix row count.
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Matrix column count.
    pub fn cols(&self) -> u32 {
        self.cols
    }

    /// Units the matrix is resident on.
    pub fn unit_count(&self) -> usize {
        self.pool.unit_count()
    }

    /// Computes `y = alpha * A * x + beta * y` against the resident matrix.
    ///
    /// `x` is broadcast to every unit; the resident `y` blocks are scattered
    /// in first when `beta` is non-zero, and gathered back out either way.
    /// Each unit computes its row block entirely locally — there is no
    /// cross-unit dependency within the launch.
    pub fn multiply(&mut self, x: &[T], y: &mut [T::Out]) -> Result<()> {
        assert_eq!(x.len(), self.cols as usize, "input vector length");
        assert_eq!(y.len(), self.rows as usize, "output vector length");

        let next = self.pool.broadcast_packed(self.x_offset, x, Mode::Async)?;
        debug_assert_eq!(next, self.y_offset);

        let block_rows = self.plan.rows_per_unit as usize;
        if self.beta != <T::Out>::zero() {
            self.pool
                .scatter_packed(self.y_offset, y, block_rows, Mode::Async)?;
        }

        self.pool.launch(Mode::Async)?;
        self.pool.synchronize()?;
        self.pool.gather_packed(self.y_offset, y, block_rows)?;
        Ok(())
    }

    /// Returns the pool's units to the fleet. Dropping the value does the
    /// same.
    pub fn release(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_row_granularity_four_byte_elements() {
        // 16 workers, 4-byte outputs: 2 rows per worker.
        assert_eq!(min_row_granularity::<f32, f32>(16), 32);
        assert_eq!(min_row_granularity::<i32, i32>(16), 32);
    }

    #[test]
    fn test_min_row_granularity_byte_inputs() {
        // 1-byte inputs force 8-row alignment even for tiny worker counts.
        assert_eq!(min_row_granularity::<i8, i32>(2), 8);
    }
}

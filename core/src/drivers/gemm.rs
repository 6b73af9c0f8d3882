//! Matrix-matrix driver: repeated matrix-vector over a replica pool.
//!
//! `C = alpha * A * B + beta * C` decomposes into one matrix-vector product
//! per column of B. One pool can only run one launch at a time, so when
//! columns outnumber pools the driver builds a **bounded worker pool**: as
//! many [`ResidentMatrix`] replicas of A as the fleet will grant (at least
//! one, at most one per column), each driven by its own host thread.
//! Columns are submitted through a channel, workers pull the next column as
//! soon as their previous launch completes — transfer of one column overlaps
//! compute of the others — and a single end-of-batch join collects every
//! result before `C` is written. `C` stays untouched unless the whole batch
//! succeeds.
//!
//! All matrices are column-major; A is transposed to row-major once before
//! replication so that units receive contiguous row blocks.

use crossbeam::channel::unbounded;
use num_traits::Zero;
use std::thread;
use tracing::debug;

use bytemuck::Pod;
use shardblas_kernels::GemvArgs;

use crate::drivers::resident::{GemvElement, ResidentMatrix};
use crate::elem::EngineElem;
use crate::error::{EngineError, Result};
use crate::pool::UnitFleet;

/// Transposes a column-major `rows × cols` matrix into row-major layout.
fn transpose_col_major<T: EngineElem>(src: &[T], rows: u32, cols: u32) -> Vec<T> {
    let (rows, cols) = (rows as usize, cols as usize);
    let mut out = vec![T::zero(); rows * cols];
    for col in 0..cols {
        for row in 0..rows {
            out[row * cols + col] = src[col * rows + row];
        }
    }
    out
}

/// Computes `C = alpha * A * B + beta * C` for column-major matrices
/// `A (m × k)`, `B (k × n)`, `C (m × n)`.
pub fn gemm<T, F>(
    fleet: &F,
    m: u32,
    k: u32,
    n: u32,
    a: &[T],
    b: &[T],
    c: &mut [T::Out],
    alpha: T::Out,
    beta: T::Out,
) -> Result<()>
where
    T: GemvElement,
    F: UnitFleet,
    GemvArgs<T::Out>: Pod,
{
    assert_eq!(a.len(), m as usize * k as usize, "A buffer shape");
    assert_eq!(b.len(), k as usize * n as usize, "B buffer shape");
    assert_eq!(c.len(), m as usize * n as usize, "C buffer shape");
    if n == 0 {
        return Ok(());
    }

    let a_rm = transpose_col_major(a, m, k);
    let (m, k, n) = (m as usize, k as usize, n as usize);

    // Grow the replica pool until the fleet runs dry or every column has
    // its own replica. The first replica must succeed; after that an
    // allocation failure just bounds the pool.
    let mut replicas = Vec::new();
    while replicas.len() < n {
        match ResidentMatrix::<T, F::Backend>::new(fleet, &a_rm, m as u32, k as u32, alpha, beta) {
            Ok(replica) => replicas.push(replica),
            Err(EngineError::Allocation { .. }) if !replicas.is_empty() => break,
            Err(err) => return Err(err),
        }
    }
    debug!(
        replicas = replicas.len(),
        columns = n,
        "gemm replica worker pool"
    );

    let (job_tx, job_rx) = unbounded::<(usize, Vec<T::Out>)>();
    let (res_tx, res_rx) = unbounded::<(usize, Result<Vec<T::Out>>)>();

    for col in 0..n {
        let y = if beta != <T::Out>::zero() {
            c[col * m..(col + 1) * m].to_vec()
        } else {
            vec![<T::Out>::zero(); m]
        };
        job_tx.send((col, y)).unwrap();
    }
    drop(job_tx);

    let results: Vec<(usize, Result<Vec<T::Out>>)> = thread::scope(|s| {
        for mut replica in replicas {
            let job_rx = job_rx.clone();
            let res_tx = res_tx.clone();
            s.spawn(move || {
                for (col, mut y) in job_rx.iter() {
                    let x = &b[col * k..(col + 1) * k];
                    let outcome = replica.multiply(x, &mut y).map(|()| y);
                    let faulted = outcome.is_err();
                    res_tx.send((col, outcome)).unwrap();
                    if faulted {
                        break;
                    }
                }
            });
        }
        drop(res_tx);
        drop(job_rx);
        res_rx.iter().collect()
    });

    let mut columns: Vec<Option<Vec<T::Out>>> = vec![None; n];
    for (col, outcome) in results {
        columns[col] = Some(outcome?);
    }
    for (col, column) in columns.into_iter().enumerate() {
        // Every column is present once no worker reported a fault.
        if let Some(column) = column {
            c[col * m..(col + 1) * m].copy_from_slice(&column);
        }
    }
    Ok(())
}

//! # shardblas
//!
//! `shardblas` distributes dense numeric workloads — dot products,
//! matrix-vector and matrix-matrix products, vector reductions such as
//! softmax — across a fleet of small, memory-constrained, independently
//! addressable compute units.
//!
//! # How a Launch Works
//!
//! A single logical tensor operation becomes:
//!
//! 1. A **plan** ([`plan`]): how many units, how much work each receives,
//!    respecting per-unit memory capacity and the 8-byte transfer alignment.
//! 2. **Transfers** ([`transfer`], [`pool`]): partitioned inputs scattered
//!    chunk-per-unit, shared operands broadcast, parameter blocks broadcast
//!    exactly; uneven remainders ride in the last unit's chunk.
//! 3. A **launch** ([`pool::UnitPool`]): every unit executes the same
//!    program against its local slice, data-parallel, no cross-unit
//!    communication.
//! 4. A **combine**: per-unit partial results are gathered and folded on
//!    the host (sum, max), or a sharded output tensor is reassembled.
//!
//! Dependent phases — like softmax's global-max, then global-sum, then
//! normalize — sequence complete launches through [`pipeline`], each phase
//! parameterized by the previous phase's combined scalar.
//!
//! The hardware itself sits behind the [`pool::UnitFleet`] and
//! [`pool::UnitBackend`] traits; [`pool::CpuFleet`] is the in-process
//! implementation the tests and benches run against.
//!
//! ## Example
//!
//! ```rust
//! use shardblas::pool::{CpuFleet, FleetConfig};
//!
//! let fleet = CpuFleet::new(FleetConfig::default().with_units(8));
//! let a: Vec<u32> = (0..1024).collect();
//! let b: Vec<u32> = (0..1024).rev().collect();
//!
//! let result = shardblas::dot(&fleet, &a, &b).unwrap();
//! let reference: u64 = a.iter().zip(&b).map(|(&x, &y)| x as u64 * y as u64).sum();
//! assert_eq!(result, reference);
//! ```

pub mod bitplane;
pub mod drivers;
pub mod elem;
pub mod error;
pub mod pipeline;
pub mod plan;
pub mod pool;
pub mod transfer;

pub use drivers::{dot, dot_planes, gemm, gemv, softmax, DotElement, GemvElement, ResidentMatrix};
pub use elem::EngineElem;
pub use error::{EngineError, Result, TransferError};
pub use pipeline::{run_phases, Combine, Phase};
pub use plan::{align_up, plan_chunks, plan_row_tiles, ChunkPlan, TilePlan, TRANSFER_ALIGN};
pub use pool::{CpuFleet, FleetConfig, UnitBackend, UnitFleet, UnitPool};
pub use transfer::Mode;

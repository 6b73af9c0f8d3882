//! Collaborator interfaces of the pool layer.
//!
//! The engine does not own compute hardware. Two seams separate it from
//! whatever does:
//!
//! - [`UnitFleet`] is the pool-management layer: it hands out sets of units
//!   all-or-nothing and takes them back on release.
//! - [`UnitBackend`] is the transport and execution layer: raw byte-range
//!   reads and writes into a unit's memory keyed by unit rank, program
//!   binding, and the launch trigger.
//!
//! Every transfer primitive and every driver is written against these traits
//! only. [`CpuFleet`](super::CpuFleet) is the in-process implementation used
//! for development and tests; a hardware SDK binding would implement the
//! same pair.

use crate::error::Result;

/// An acquired set of compute units: transport plus execution.
///
/// Returned by [`UnitFleet::acquire`]; dropping it returns the units to the
/// fleet. Not safe for concurrent use from multiple host threads — every
/// method takes `&mut self`, and whichever thread drives the backend owns
/// its staged state.
pub trait UnitBackend: Send {
    /// Number of units in this set.
    fn unit_count(&self) -> usize;

    /// Bulk-tier capacity of each unit, in bytes.
    fn capacity(&self) -> usize;

    /// Worker threads per unit.
    fn worker_count(&self) -> usize;

    /// Binds the named program image to every unit.
    fn load(&mut self, program: &str) -> Result<()>;

    /// Writes bytes into one unit's memory at `symbol` + `offset`.
    fn write(&mut self, rank: usize, symbol: &str, offset: usize, bytes: &[u8]) -> Result<()>;

    /// Reads bytes from one unit's memory at `symbol` + `offset`.
    fn read(&mut self, rank: usize, symbol: &str, offset: usize, out: &mut [u8]) -> Result<()>;

    /// Executes the bound program on every unit, returning when all have
    /// completed or faulted.
    fn run(&mut self) -> Result<()>;
}

/// A fleet of compute units that pools are acquired from.
pub trait UnitFleet {
    type Backend: UnitBackend;

    /// Acquires exactly `units` units, all-or-nothing.
    ///
    /// # Errors
    ///
    /// [`EngineError::Allocation`](crate::EngineError::Allocation) when fewer
    /// than `units` are available; nothing is taken in that case.
    fn acquire(&self, units: usize) -> Result<Self::Backend>;

    /// Units currently available for acquisition.
    fn available(&self) -> usize;

    /// Bulk-tier capacity of each unit, in bytes.
    fn unit_capacity(&self) -> usize;

    /// Worker threads per unit.
    fn worker_count(&self) -> usize;
}

//! In-process fleet of compute units.
//!
//! `CpuFleet` models the unit fleet entirely on the host: each unit is a
//! [`UnitMemory`] and a launch executes the bound registry program across
//! all units data-parallel with `rayon`. Nothing about the engine above this
//! file knows the difference between this and a hardware binding, which is
//! the point — every driver and every test runs against the same seams a
//! real transport would implement.
//!
//! Acquisition is all-or-nothing against a shared availability counter, and
//! dropping a backend returns its units, so leak checks reduce to watching
//! [`CpuFleet::available`].

use std::sync::{Arc, Mutex};

use rayon::prelude::*;

use shardblas_kernels::{lookup, ExecEnv, KernelError, Program, UnitMemory};

use crate::error::{EngineError, Result, TransferError};
use crate::pool::backend::{UnitBackend, UnitFleet};

/// Shape of an in-process fleet.
#[derive(Clone, Copy, Debug)]
pub struct FleetConfig {
    /// Total units in the fleet.
    pub units: usize,
    /// Bulk-tier capacity of each unit, in bytes.
    pub unit_capacity: usize,
    /// Worker threads per unit.
    pub workers: usize,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            units: 64,
            unit_capacity: 64 * 1024 * 1024,
            workers: 16,
        }
    }
}

impl FleetConfig {
    pub fn with_units(mut self, units: usize) -> Self {
        self.units = units;
        self
    }

    pub fn with_unit_capacity(mut self, bytes: usize) -> Self {
        self.unit_capacity = bytes;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

struct FleetState {
    config: FleetConfig,
    available: Mutex<usize>,
}

/// An in-process fleet of compute units.
///
/// Cloning is cheap and clones share the same availability counter.
#[derive(Clone)]
pub struct CpuFleet {
    state: Arc<FleetState>,
}

impl CpuFleet {
    pub fn new(config: FleetConfig) -> Self {
        Self {
            state: Arc::new(FleetState {
                available: Mutex::new(config.units),
                config,
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(FleetConfig::default())
    }
}

impl UnitFleet for CpuFleet {
    type Backend = CpuBackend;

    fn acquire(&self, units: usize) -> Result<CpuBackend> {
        debug_assert!(units > 0, "cannot acquire an empty pool");
        let mut available = self.state.available.lock().unwrap();
        if *available < units {
            return Err(EngineError::Allocation {
                requested: units,
                available: *available,
            });
        }
        *available -= units;
        drop(available);

        let capacity = self.state.config.unit_capacity;
        Ok(CpuBackend {
            fleet: Arc::clone(&self.state),
            units: (0..units).map(|_| UnitMemory::new(capacity)).collect(),
            program: None,
        })
    }

    fn available(&self) -> usize {
        *self.state.available.lock().unwrap()
    }

    fn unit_capacity(&self) -> usize {
        self.state.config.unit_capacity
    }

    fn worker_count(&self) -> usize {
        self.state.config.workers
    }
}

/// An acquired set of in-process units.
pub struct CpuBackend {
    fleet: Arc<FleetState>,
    units: Vec<UnitMemory>,
    program: Option<Arc<dyn Program>>,
}

impl std::fmt::Debug for CpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuBackend")
            .field("units", &self.units.len())
            .finish_non_exhaustive()
    }
}

impl Drop for CpuBackend {
    fn drop(&mut self) {
        *self.fleet.available.lock().unwrap() += self.units.len();
    }
}

fn memory_error(err: KernelError) -> EngineError {
    match err {
        KernelError::OutOfBounds {
            offset,
            len,
            capacity,
        } => TransferError::OutOfBounds {
            offset,
            len,
            capacity,
        }
        .into(),
        KernelError::UnknownSymbol(name) => TransferError::UnknownSymbol(name).into(),
        other => EngineError::LaunchFault {
            failed_units: 1,
            first: other,
        },
    }
}

impl UnitBackend for CpuBackend {
    fn unit_count(&self) -> usize {
        self.units.len()
    }

    fn capacity(&self) -> usize {
        self.fleet.config.unit_capacity
    }

    fn worker_count(&self) -> usize {
        self.fleet.config.workers
    }

    fn load(&mut self, program: &str) -> Result<()> {
        let image = lookup(program).ok_or_else(|| EngineError::ProgramLoad(program.to_string()))?;
        self.program = Some(image);
        Ok(())
    }

    fn write(&mut self, rank: usize, symbol: &str, offset: usize, bytes: &[u8]) -> Result<()> {
        debug_assert!(rank < self.units.len());
        self.units[rank]
            .write(symbol, offset, bytes)
            .map_err(memory_error)
    }

    fn read(&mut self, rank: usize, symbol: &str, offset: usize, out: &mut [u8]) -> Result<()> {
        debug_assert!(rank < self.units.len());
        self.units[rank]
            .read(symbol, offset, out)
            .map_err(memory_error)
    }

    fn run(&mut self) -> Result<()> {
        let program = self
            .program
            .clone()
            .ok_or_else(|| EngineError::ProgramLoad("no program bound".to_string()))?;
        let env = ExecEnv {
            workers: self.fleet.config.workers,
        };

        let faults: Vec<KernelError> = self
            .units
            .par_iter_mut()
            .filter_map(|mem| program.run(mem, &env).err())
            .collect();

        let failed_units = faults.len();
        if let Some(first) = faults.into_iter().next() {
            return Err(EngineError::LaunchFault {
                failed_units,
                first,
            });
        }
        Ok(())
    }
}

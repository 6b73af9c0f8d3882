//! The unit pool handle.
//!
//! # Lifecycle
//!
//! A [`UnitPool`] owns an acquired set of compute units and the program
//! bound to them, and walks the state machine
//!
//! ```text
//! Acquired → Programmed → { Armed → Launched → Synchronized }* → Released
//! ```
//!
//! Acquisition is all-or-nothing. A pool is bound to exactly one program at
//! a time; rebinding requires reloading. Argument staging may happen any
//! number of times before a launch. Release happens exactly once on every
//! exit path — explicitly via [`UnitPool::release`] or implicitly on drop —
//! which is the one resource-safety invariant every driver must uphold.
//!
//! # Synchronous and asynchronous operation
//!
//! Writes and launches accept a [`Mode`]. Asynchronous operations enqueue
//! into a pool-wide FIFO and are only guaranteed complete after
//! [`UnitPool::synchronize`]; any synchronous call flushes the queue first,
//! so mixed sequences execute in issue order. Readback is either synchronous
//! ([`UnitPool::gather`], [`UnitPool::copy_each`]) or deferred
//! ([`UnitPool::gather_deferred`]), in which case the bytes land in a
//! pool-owned staging buffer at synchronization time and are claimed with a
//! [`ReadTicket`]. Claiming a deferred gather that was queued behind a
//! launch which has not been synchronized is a caller bug, not a supported
//! pattern.

use std::collections::VecDeque;

use bytemuck::Pod;
use tracing::{debug, trace};

use shardblas_kernels::BULK;

use crate::elem::EngineElem;
use crate::error::{Result, TransferError};
use crate::plan::{align_up, TRANSFER_ALIGN};
use crate::transfer::{check_bounds, check_chunk, check_offset, chunk_spans, Mode};

pub mod backend;
pub mod cpu;

pub use backend::{UnitBackend, UnitFleet};
pub use cpu::{CpuBackend, CpuFleet, FleetConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PoolState {
    Acquired,
    Programmed,
    Armed,
    Launched,
    Synchronized,
}

enum QueuedOp {
    Broadcast {
        symbol: String,
        offset: usize,
        bytes: Vec<u8>,
    },
    WriteAt {
        rank: usize,
        symbol: String,
        offset: usize,
        bytes: Vec<u8>,
    },
    Scatter {
        symbol: String,
        offset: usize,
        bytes: Vec<u8>,
        chunk_bytes: usize,
    },
    Launch,
    Gather {
        ticket: u64,
        symbol: String,
        offset: usize,
        len_bytes: usize,
        chunk_bytes: usize,
    },
}

/// Claim on a deferred gather; redeemed with [`UnitPool::take_gathered`].
#[derive(Debug)]
pub struct ReadTicket {
    id: u64,
}

/// An acquired set of compute units with a bound program and staged
/// arguments.
///
/// Not safe for concurrent use from multiple host threads: the bound program
/// and staged argument queue are mutable state owned by whichever thread
/// drives the pool.
pub struct UnitPool<B: UnitBackend> {
    backend: B,
    state: PoolState,
    program: Option<String>,
    queue: VecDeque<QueuedOp>,
    gathered: Vec<(u64, Vec<u8>)>,
    next_ticket: u64,
}

impl<B: UnitBackend> std::fmt::Debug for UnitPool<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitPool")
            .field("program", &self.program)
            .field("next_ticket", &self.next_ticket)
            .finish_non_exhaustive()
    }
}

impl<B: UnitBackend> UnitPool<B> {
    /// Acquires exactly `units` units from the fleet, all-or-nothing.
    pub fn acquire<F: UnitFleet<Backend = B>>(fleet: &F, units: usize) -> Result<Self> {
        let backend = fleet.acquire(units)?;
        debug!(units, "acquired unit pool");
        Ok(Self {
            backend,
            state: PoolState::Acquired,
            program: None,
            queue: VecDeque::new(),
            gathered: Vec::new(),
            next_ticket: 0,
        })
    }

    /// Number of units in the pool.
    pub fn unit_count(&self) -> usize {
        self.backend.unit_count()
    }

    /// Bulk-tier capacity of each unit, in bytes.
    pub fn capacity(&self) -> usize {
        self.backend.capacity()
    }

    /// Worker threads per unit.
    pub fn worker_count(&self) -> usize {
        self.backend.worker_count()
    }

    /// Binds a program image to every unit in the pool.
    ///
    /// Rebinding a different program flushes outstanding work first; loading
    /// the already-bound program is a no-op.
    pub fn load(&mut self, program: &str) -> Result<()> {
        if self.program.as_deref() == Some(program) {
            return Ok(());
        }
        self.flush()?;
        self.backend.load(program)?;
        debug!(program, "bound program to pool");
        self.program = Some(program.to_string());
        self.state = PoolState::Programmed;
        Ok(())
    }

    /// Broadcasts a buffer to every unit, size rounded up to the 8-byte
    /// transfer boundary with zero padding.
    pub fn broadcast<T: EngineElem>(
        &mut self,
        symbol: &str,
        offset: usize,
        data: &[T],
        mode: Mode,
    ) -> Result<()> {
        self.ensure_programmed();
        let mut bytes = bytemuck::cast_slice(data).to_vec();
        bytes.resize(align_up(bytes.len(), TRANSFER_ALIGN), 0);
        self.check_region(symbol, offset, bytes.len())?;
        trace!(symbol, offset, len = bytes.len(), "staging broadcast");
        self.push(
            QueuedOp::Broadcast {
                symbol: symbol.to_string(),
                offset,
                bytes,
            },
            mode,
        )
    }

    /// Broadcasts a fixed-size record to every unit without size rounding.
    pub fn broadcast_exact<T: Pod>(
        &mut self,
        symbol: &str,
        offset: usize,
        value: &T,
        mode: Mode,
    ) -> Result<()> {
        self.ensure_programmed();
        let bytes = bytemuck::bytes_of(value).to_vec();
        self.check_region(symbol, offset, bytes.len())?;
        trace!(symbol, offset, len = bytes.len(), "staging broadcast_exact");
        self.push(
            QueuedOp::Broadcast {
                symbol: symbol.to_string(),
                offset,
                bytes,
            },
            mode,
        )
    }

    /// Overrides a fixed-size record on a single unit.
    ///
    /// This is how the last unit of a chunked scatter learns its exact
    /// element count when the total does not divide evenly.
    pub fn broadcast_exact_at<T: Pod>(
        &mut self,
        rank: usize,
        symbol: &str,
        offset: usize,
        value: &T,
        mode: Mode,
    ) -> Result<()> {
        self.ensure_programmed();
        let bytes = bytemuck::bytes_of(value).to_vec();
        self.check_region(symbol, offset, bytes.len())?;
        trace!(rank, symbol, offset, "staging per-unit override");
        self.push(
            QueuedOp::WriteAt {
                rank,
                symbol: symbol.to_string(),
                offset,
                bytes,
            },
            mode,
        )
    }

    /// Scatters a buffer in `chunk_elems`-element chunks, chunk *i* to unit
    /// *i*. The final chunk may be short.
    pub fn scatter<T: EngineElem>(
        &mut self,
        symbol: &str,
        offset: usize,
        data: &[T],
        chunk_elems: usize,
        mode: Mode,
    ) -> Result<()> {
        self.ensure_programmed();
        let chunk_bytes = chunk_elems * std::mem::size_of::<T>();
        let bytes = bytemuck::cast_slice(data).to_vec();
        self.check_sharded(symbol, offset, chunk_bytes, bytes.len())?;
        trace!(
            symbol,
            offset,
            chunk_bytes,
            total = bytes.len(),
            "staging scatter"
        );
        self.push(
            QueuedOp::Scatter {
                symbol: symbol.to_string(),
                offset,
                bytes,
                chunk_bytes,
            },
            mode,
        )
    }

    /// Gathers a sharded buffer back, chunk *i* from unit *i*. Synchronous:
    /// flushes all staged work first.
    pub fn gather<T: EngineElem>(
        &mut self,
        symbol: &str,
        offset: usize,
        out: &mut [T],
        chunk_elems: usize,
    ) -> Result<()> {
        self.flush()?;
        let chunk_bytes = chunk_elems * std::mem::size_of::<T>();
        let out_bytes: &mut [u8] = bytemuck::cast_slice_mut(out);
        self.check_sharded(symbol, offset, chunk_bytes, out_bytes.len())?;
        for (rank, span) in chunk_spans(chunk_bytes, out_bytes.len()) {
            self.backend
                .read(rank, symbol, offset, &mut out_bytes[span])?;
        }
        Ok(())
    }

    /// Stages an asynchronous gather of `len` elements into a pool-owned
    /// buffer; the result is claimed with [`UnitPool::take_gathered`] after
    /// synchronization.
    pub fn gather_deferred<T: EngineElem>(
        &mut self,
        symbol: &str,
        offset: usize,
        len: usize,
        chunk_elems: usize,
    ) -> Result<ReadTicket> {
        let elem = std::mem::size_of::<T>();
        let chunk_bytes = chunk_elems * elem;
        let len_bytes = len * elem;
        self.check_sharded(symbol, offset, chunk_bytes, len_bytes)?;
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        trace!(symbol, offset, len_bytes, ticket, "staging deferred gather");
        self.queue.push_back(QueuedOp::Gather {
            ticket,
            symbol: symbol.to_string(),
            offset,
            len_bytes,
            chunk_bytes,
        });
        Ok(ReadTicket { id: ticket })
    }

    /// Claims the result of a deferred gather, flushing outstanding work if
    /// it has not completed yet.
    pub fn take_gathered<T: EngineElem>(&mut self, ticket: ReadTicket) -> Result<Vec<T>> {
        self.flush()?;
        let index = self
            .gathered
            .iter()
            .position(|(id, _)| *id == ticket.id)
            .ok_or(TransferError::UnknownTicket)?;
        let (_, bytes) = self.gathered.swap_remove(index);
        let mut out = vec![T::zero(); bytes.len() / std::mem::size_of::<T>()];
        bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(&bytes);
        Ok(out)
    }

    /// Reads one fixed-size record per unit into consecutive host slots
    /// indexed by unit rank. Synchronous.
    pub fn copy_each<T: Pod>(&mut self, symbol: &str, out: &mut [T]) -> Result<()> {
        self.flush()?;
        if out.len() != self.unit_count() {
            return Err(TransferError::SizeMismatch {
                expected: self.unit_count(),
                got: out.len(),
            }
            .into());
        }
        let elem = std::mem::size_of::<T>();
        let out_bytes: &mut [u8] = bytemuck::cast_slice_mut(out);
        for rank in 0..out_bytes.len() / elem {
            self.backend
                .read(rank, symbol, 0, &mut out_bytes[rank * elem..(rank + 1) * elem])?;
        }
        Ok(())
    }

    /// Scatter into the bulk heap at a running offset; returns the next free
    /// 8-byte-aligned offset.
    pub fn scatter_packed<T: EngineElem>(
        &mut self,
        offset: usize,
        data: &[T],
        chunk_elems: usize,
        mode: Mode,
    ) -> Result<usize> {
        self.scatter(BULK, offset, data, chunk_elems, mode)?;
        Ok(offset + align_up(chunk_elems * std::mem::size_of::<T>(), TRANSFER_ALIGN))
    }

    /// Broadcast into the bulk heap at a running offset; returns the next
    /// free 8-byte-aligned offset.
    pub fn broadcast_packed<T: EngineElem>(
        &mut self,
        offset: usize,
        data: &[T],
        mode: Mode,
    ) -> Result<usize> {
        self.broadcast(BULK, offset, data, mode)?;
        Ok(offset + align_up(std::mem::size_of_val(data), TRANSFER_ALIGN))
    }

    /// Gather from the bulk heap at a running offset; returns the next free
    /// 8-byte-aligned offset.
    pub fn gather_packed<T: EngineElem>(
        &mut self,
        offset: usize,
        out: &mut [T],
        chunk_elems: usize,
    ) -> Result<usize> {
        self.gather(BULK, offset, out, chunk_elems)?;
        Ok(offset + align_up(chunk_elems * std::mem::size_of::<T>(), TRANSFER_ALIGN))
    }

    /// Triggers all units to execute the bound program against the staged
    /// arguments.
    ///
    /// Synchronous launches block until every unit reports completion or
    /// fault; asynchronous launches require a later
    /// [`UnitPool::synchronize`].
    pub fn launch(&mut self, mode: Mode) -> Result<()> {
        assert!(
            self.state != PoolState::Acquired,
            "load a program before launching the pool"
        );
        debug!(?mode, units = self.unit_count(), "launching pool");
        self.state = PoolState::Launched;
        self.push(QueuedOp::Launch, mode)
    }

    /// Blocks until all outstanding asynchronous operations on this pool
    /// have completed, surfacing any launch fault.
    pub fn synchronize(&mut self) -> Result<()> {
        self.flush()?;
        self.state = PoolState::Synchronized;
        Ok(())
    }

    /// Returns the units to the fleet.
    ///
    /// Dropping the pool has the same effect; taking `self` by value makes a
    /// double release unrepresentable.
    pub fn release(self) {
        debug!(units = self.unit_count(), "releasing unit pool");
    }

    fn ensure_programmed(&mut self) {
        assert!(
            self.state != PoolState::Acquired,
            "load a program before staging arguments"
        );
        self.state = PoolState::Armed;
    }

    /// Alignment and bounds preconditions for an every-unit-identical
    /// region. Variable slots are unconstrained; only the bulk tier has
    /// alignment and capacity.
    fn check_region(&self, symbol: &str, offset: usize, len: usize) -> Result<()> {
        if symbol == BULK {
            check_offset(offset)?;
            check_bounds(offset, len, self.capacity())?;
        }
        Ok(())
    }

    /// Preconditions for a sharded (scatter/gather) transfer.
    fn check_sharded(
        &self,
        symbol: &str,
        offset: usize,
        chunk_bytes: usize,
        total_bytes: usize,
    ) -> Result<()> {
        check_chunk(chunk_bytes)?;
        let chunks = total_bytes.div_ceil(chunk_bytes);
        if chunks > self.unit_count() {
            return Err(TransferError::ChunkCount {
                chunks,
                units: self.unit_count(),
            }
            .into());
        }
        if symbol == BULK {
            check_offset(offset)?;
            check_bounds(offset, chunk_bytes, self.capacity())?;
        }
        Ok(())
    }

    fn push(&mut self, op: QueuedOp, mode: Mode) -> Result<()> {
        self.queue.push_back(op);
        if mode == Mode::Sync {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        while let Some(op) = self.queue.pop_front() {
            self.execute(op)?;
        }
        Ok(())
    }

    fn execute(&mut self, op: QueuedOp) -> Result<()> {
        match op {
            QueuedOp::Broadcast {
                symbol,
                offset,
                bytes,
            } => {
                for rank in 0..self.backend.unit_count() {
                    self.backend.write(rank, &symbol, offset, &bytes)?;
                }
            }
            QueuedOp::WriteAt {
                rank,
                symbol,
                offset,
                bytes,
            } => {
                self.backend.write(rank, &symbol, offset, &bytes)?;
            }
            QueuedOp::Scatter {
                symbol,
                offset,
                bytes,
                chunk_bytes,
            } => {
                for (rank, span) in chunk_spans(chunk_bytes, bytes.len()) {
                    self.backend.write(rank, &symbol, offset, &bytes[span])?;
                }
            }
            QueuedOp::Launch => {
                self.backend.run()?;
            }
            QueuedOp::Gather {
                ticket,
                symbol,
                offset,
                len_bytes,
                chunk_bytes,
            } => {
                let mut buf = vec![0u8; len_bytes];
                for (rank, span) in chunk_spans(chunk_bytes, len_bytes) {
                    self.backend.read(rank, &symbol, offset, &mut buf[span])?;
                }
                self.gathered.push((ticket, buf));
            }
        }
        Ok(())
    }
}

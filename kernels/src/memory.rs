//! Per-unit memory model.
//!
//! # The Two Tiers, Seen From the Host
//!
//! Each compute unit owns a large, slow **bulk** tier and a small, fast
//! scratch tier. Only the bulk tier is host-addressable: scatter, broadcast
//! and gather all move bytes between host buffers and the bulk heap. The
//! scratch tier belongs to the worker threads and never appears in this
//! model — programs simply read and write the bulk heap directly.
//!
//! Besides the heap, a unit exposes small **named variable slots**. They
//! carry fixed-size parameter blocks in (an element count, an `alpha`/`beta`
//! record) and per-unit partial results out (a local sum, a local maximum).
//! The heap is addressed through the distinguished [`BULK`] symbol; every
//! other symbol is a variable slot.
//!
//! The heap is backed by 8-byte words so that typed views of 8-aligned
//! regions are always valid — the same alignment rule the transfer protocol
//! enforces on the host side.

use bytemuck::Pod;
use std::collections::HashMap;

use crate::{KernelError, Result};

/// Symbol name of the bulk-tier heap.
pub const BULK: &str = "bulk";

/// One compute unit's host-visible memory: the bulk heap plus variable slots.
#[derive(Debug, Clone)]
pub struct UnitMemory {
    heap: Vec<u64>,
    capacity: usize,
    vars: HashMap<String, Vec<u8>>,
}

impl UnitMemory {
    /// Creates a unit memory with the given bulk capacity in bytes.
    ///
    /// The capacity is rounded down to a whole number of 8-byte words.
    pub fn new(capacity_bytes: usize) -> Self {
        let words = capacity_bytes / 8;
        Self {
            heap: vec![0u64; words],
            capacity: words * 8,
            vars: HashMap::new(),
        }
    }

    /// Bulk-tier capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Writes bytes to a symbol at the given offset.
    ///
    /// Heap writes are bounds-checked against the bulk capacity; variable
    /// slots grow to fit.
    pub fn write(&mut self, symbol: &str, offset: usize, bytes: &[u8]) -> Result<()> {
        if symbol == BULK {
            let end = self.checked_end(offset, bytes.len())?;
            self.heap_bytes_mut()[offset..end].copy_from_slice(bytes);
        } else {
            let slot = self.vars.entry(symbol.to_string()).or_default();
            if slot.len() < offset + bytes.len() {
                slot.resize(offset + bytes.len(), 0);
            }
            slot[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
        Ok(())
    }

    /// Reads bytes from a symbol at the given offset.
    pub fn read(&self, symbol: &str, offset: usize, out: &mut [u8]) -> Result<()> {
        if symbol == BULK {
            let end = self.checked_end(offset, out.len())?;
            out.copy_from_slice(&self.heap_bytes()[offset..end]);
        } else {
            let slot = self
                .vars
                .get(symbol)
                .ok_or_else(|| KernelError::UnknownSymbol(symbol.to_string()))?;
            if slot.len() < offset + out.len() {
                return Err(KernelError::OutOfBounds {
                    offset,
                    len: out.len(),
                    capacity: slot.len(),
                });
            }
            out.copy_from_slice(&slot[offset..offset + out.len()]);
        }
        Ok(())
    }

    /// Reads a `Pod` value from a variable slot.
    pub fn var<T: Pod>(&self, name: &str) -> Result<T> {
        let slot = self
            .vars
            .get(name)
            .ok_or_else(|| KernelError::MissingParam(name.to_string()))?;
        if slot.len() < std::mem::size_of::<T>() {
            return Err(KernelError::MissingParam(name.to_string()));
        }
        Ok(bytemuck::pod_read_unaligned(
            &slot[..std::mem::size_of::<T>()],
        ))
    }

    /// Writes a `Pod` value into a variable slot, replacing its contents.
    pub fn set_var<T: Pod>(&mut self, name: &str, value: T) {
        self.vars
            .insert(name.to_string(), bytemuck::bytes_of(&value).to_vec());
    }

    /// The whole bulk heap as bytes.
    pub fn heap_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.heap)
    }

    /// The whole bulk heap as mutable bytes.
    pub fn heap_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.heap)
    }

    /// A bounds-checked byte range of the heap.
    pub fn heap_range(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let end = self.checked_end(offset, len)?;
        Ok(&self.heap_bytes()[offset..end])
    }

    fn checked_end(&self, offset: usize, len: usize) -> Result<usize> {
        let end = offset.checked_add(len).unwrap_or(usize::MAX);
        if end > self.capacity {
            return Err(KernelError::OutOfBounds {
                offset,
                len,
                capacity: self.capacity,
            });
        }
        Ok(end)
    }
}

/// Views a byte region as a slice of `T`.
pub fn typed<T: Pod>(bytes: &[u8]) -> Result<&[T]> {
    bytemuck::try_cast_slice(bytes).map_err(|_| KernelError::Misaligned {
        offset: 0,
        type_name: std::any::type_name::<T>(),
    })
}

/// Views a mutable byte region as a mutable slice of `T`.
pub fn typed_mut<T: Pod>(bytes: &mut [u8]) -> Result<&mut [T]> {
    bytemuck::try_cast_slice_mut(bytes).map_err(|_| KernelError::Misaligned {
        offset: 0,
        type_name: std::any::type_name::<T>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_rounds_down() {
        let mem = UnitMemory::new(21);
        assert_eq!(mem.capacity(), 16);
    }

    #[test]
    fn test_heap_write_read_roundtrip() {
        let mut mem = UnitMemory::new(64);
        mem.write(BULK, 8, &[1, 2, 3, 4]).unwrap();
        let mut out = [0u8; 4];
        mem.read(BULK, 8, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn test_heap_write_out_of_bounds() {
        let mut mem = UnitMemory::new(16);
        let err = mem.write(BULK, 8, &[0u8; 16]).unwrap_err();
        assert!(matches!(err, KernelError::OutOfBounds { .. }));
    }

    #[test]
    fn test_var_roundtrip() {
        let mut mem = UnitMemory::new(16);
        mem.set_var("count", 42u64);
        assert_eq!(mem.var::<u64>("count").unwrap(), 42);
    }

    #[test]
    fn test_var_missing() {
        let mem = UnitMemory::new(16);
        let err = mem.var::<u64>("count").unwrap_err();
        assert!(matches!(err, KernelError::MissingParam(_)));
    }

    #[test]
    fn test_var_write_via_symbol() {
        let mut mem = UnitMemory::new(16);
        mem.write("count", 0, &7u64.to_le_bytes()).unwrap();
        assert_eq!(mem.var::<u64>("count").unwrap(), 7);
    }

    #[test]
    fn test_read_unknown_symbol() {
        let mem = UnitMemory::new(16);
        let mut out = [0u8; 4];
        let err = mem.read("nope", 0, &mut out).unwrap_err();
        assert!(matches!(err, KernelError::UnknownSymbol(_)));
    }

    #[test]
    fn test_typed_views() {
        let mut mem = UnitMemory::new(32);
        mem.write(BULK, 0, bytemuck::cast_slice(&[1.0f32, 2.0, 3.0, 4.0]))
            .unwrap();
        let floats: &[f32] = typed(mem.heap_range(0, 16).unwrap()).unwrap();
        assert_eq!(floats, &[1.0, 2.0, 3.0, 4.0]);
    }
}

//! Enclave memory: physical memory handed out by the driver and the
//! untrusted shared memory
//
// SPDX-License-Identifier: MIT
// Copyright (C) 2022-2025 VTT Technical Research Centre of Finland Ltd

use log::trace;

use edge::edge::EdgeCall;
use edge::params::PAGE_SIZE;

use crate::Error;
use crate::monitor::PhysRegion;

/* RISC-V definitions: */
const RISCV_PGSHIFT: u32 = 12;

/// Number of address bits within a page
pub(crate) const PAGE_BITS: u32 = RISCV_PGSHIFT;

pub(crate) fn is_aligned(addr: u64, align: u64) -> bool {
    (addr & (align - 1)) == 0
}

pub(crate) fn round_up(n: u64, b: u32) -> u64 {
    if n == 0 {
        return 0;
    }
    (((n - 1) >> b) + 1) << b
}

pub(crate) fn round_down(n: u64, b: u32) -> u64 {
    n & !((1u64 << b) - 1)
}

pub(crate) fn ceil(n: u64, d: u64) -> u64 {
    n / d + (n % d != 0) as u64
}

/// Contiguous physical memory available for enclaves
///
/// First fit allocator over a sorted free list. Allocations are placed on
/// page boundaries, power of two sized ones on their natural alignment so
/// that they fit a single PMP register.
pub(crate) struct PhysMemory {
    free: Vec<PhysRegion>,
}

impl PhysMemory {

    pub(crate) fn new(base: u64, size: u64) -> Self {
        Self{free: vec![PhysRegion{paddr: base, size: size}]}
    }

    /// Allocate 'size' bytes
    ///
    /// The size of the returned region is exactly 'size', even when it is
    /// not a multiple of the page size. A zero sized region is returned
    /// without taking any memory.
    pub(crate) fn alloc(&mut self, size: u64) -> Result<PhysRegion, Error> {
        let span = round_up(size, PAGE_BITS);
        if span == 0 {
            let paddr = self.free.first().map(|r| r.paddr).unwrap_or(0);
            return Ok(PhysRegion{paddr: paddr, size: 0});
        }

        let align = if span.is_power_of_two() { span } else { PAGE_SIZE };

        for i in 0 .. self.free.len() {
            let block = self.free[i];
            let start = round_up(block.paddr, align.trailing_zeros());
            let end   = block.paddr + block.size;
            if start < block.paddr || start > end || end - start < span {
                continue;
            }

            let head = PhysRegion{paddr: block.paddr, size: start - block.paddr};
            let tail = PhysRegion{paddr: start + span, size: end - start - span};
            self.free.remove(i);
            for part in [tail, head] {
                if part.size > 0 {
                    self.free.insert(i, part);
                }
            }

            trace!("Allocated {:#x} bytes at {:#x}", span, start);
            return Ok(PhysRegion{paddr: start, size: size});
        }

        Err(Error::OutOfMemory)
    }

    /// Return a region obtained from alloc()
    pub(crate) fn free(&mut self, region: PhysRegion) {
        let span = round_up(region.size, PAGE_BITS);
        if span == 0 {
            return;
        }

        let pos = self.free
            .iter()
            .position(|r| r.paddr > region.paddr)
            .unwrap_or(self.free.len());
        self.free.insert(pos, PhysRegion{paddr: region.paddr, size: span});

        // Merge with the neighbours
        if pos + 1 < self.free.len()
            && self.free[pos].paddr + self.free[pos].size == self.free[pos + 1].paddr {
            self.free[pos].size += self.free[pos + 1].size;
            self.free.remove(pos + 1);
        }
        if pos > 0
            && self.free[pos - 1].paddr + self.free[pos - 1].size == self.free[pos].paddr {
            self.free[pos - 1].size += self.free[pos].size;
            self.free.remove(pos);
        }

        trace!("Released {:#x} bytes at {:#x}", span, region.paddr);
    }

    #[cfg(test)]
    fn available(&self) -> u64 {
        self.free.iter().map(|r| r.size).sum()
    }
}

/// Untrusted shared memory of an enclave
///
/// The only memory both the host and the enclave can access. The edge call
/// header lives at its beginning.
pub struct SharedMemory {
    /// Physical region given to the monitor
    region: PhysRegion,
    /// Address of the memory in the enclave address space
    vaddr:  u64,
    /// Contents
    buffer: Vec<u8>,
}

impl SharedMemory {

    pub(crate) fn new(region: PhysRegion, vaddr: u64) -> Result<Self, Error> {
        let size = usize::try_from(region.size).map_err(|_| Error::OutOfMemory)?;
        Ok(Self{region: region,
                vaddr:  vaddr,
                buffer: vec![0u8; size]})
    }

    pub fn paddr(&self) -> u64 {
        self.region.paddr
    }

    pub fn vaddr(&self) -> u64 {
        self.vaddr
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Read the edge call header
    pub fn edge_call(&self) -> Result<EdgeCall, Error> {
        EdgeCall::from_bytes(&self.buffer)
    }

    pub(crate) fn region(&self) -> PhysRegion {
        self.region
    }
}

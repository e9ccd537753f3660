//! PMP region table of the security monitor
//!
//! Region definitions are backed by the hardware PMP registers of a core.
//! A naturally aligned power-of-two region (NAPOT) uses one register. Any
//! other region uses top-of-range (TOR) encoding, which needs two adjacent
//! registers unless the region starts at address zero in the top register.
//!
//! The table is a shared resource of the core. The monitor holds its lock for
//! the whole duration of a privileged call, so table edits never interleave.
//
// SPDX-License-Identifier: MIT
// Copyright (C) 2022-2025 VTT Technical Research Centre of Finland Ltd

use log::{debug, trace};

use edge::params::PAGE_SIZE;
use edge::status::PmpError;

/// Number of hardware PMP registers
pub const PMP_N_REG: usize = 8;
/// Maximum number of region definitions
pub const PMP_MAX_N_REGION: usize = 16;

/// No access
pub const PMP_NO_PERM:  u8 = 0;
/// Read, write and execute
pub const PMP_ALL_PERM: u8 = 0x7;

/// Size value covering the entire address space (with base zero)
pub const PMP_FULL_SIZE: u64 = u64::MAX;

/// Region identifier
pub type RegionId = usize;

/// Register placement of a region
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Priority {
    /// Any free register
    Any,
    /// The first (highest priority) register
    Top,
    /// The last (lowest priority) register
    Bottom,
}

/// Address matching mode of a region
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AddrMode {
    Napot,
    Tor,
}

#[derive(Copy, Clone, Debug)]
struct Region {
    base:          u64,
    size:          u64,
    mode:          AddrMode,
    /// Index of the (first) register used by the region
    reg_idx:       usize,
    /// Number of registers used
    reg_count:     usize,
    allow_overlap: bool,
    /// Permission applied on all harts, if any
    perm:          Option<u8>,
}

impl Region {
    fn end(&self) -> u128 {
        if self.size == PMP_FULL_SIZE && self.base == 0 {
            return 1u128 << 64;
        }
        self.base as u128 + self.size as u128
    }
}

/// The PMP region table of one core
pub struct PmpTable {
    regions:    [Option<Region>; PMP_MAX_N_REGION],
    reg_bitmap: u32,
}

impl Default for PmpTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PmpTable {

    pub const fn new() -> Self {
        Self{regions: [None; PMP_MAX_N_REGION], reg_bitmap: 0}
    }

    /// Reserve a new region
    ///
    /// # Input
    /// * 'base' is the physical base address, page aligned
    /// * 'size' is the region size in bytes, a multiple of the page size, or
    ///   `PMP_FULL_SIZE` together with base zero for the whole address space
    /// * 'prio' selects the register placement
    /// * 'allow_overlap' lets the region overlap, and be overlapped by, other
    ///   regions
    ///
    /// # Return
    ///
    /// Ok(RegionId) if the region was reserved, otherwise the PMP error code

    pub fn reserve(&mut self,
                   base:          u64,
                   size:          u64,
                   prio:          Priority,
                   allow_overlap: bool)
                   -> Result<RegionId, PmpError> {

        if size == 0 {
            return Err(PmpError::RegionSizeInvalid);
        }

        let full = size == PMP_FULL_SIZE && base == 0;
        if !full && size % PAGE_SIZE != 0 {
            return Err(PmpError::RegionNotPageGranularity);
        }

        if base % PAGE_SIZE != 0 {
            return Err(PmpError::RegionNotAligned);
        }

        if !full && (base as u128 + size as u128) > (1u128 << 64) {
            return Err(PmpError::RegionSizeInvalid);
        }

        if !allow_overlap && self.detect_overlap(base, size) {
            return Err(PmpError::RegionOverlap);
        }

        let napot = full || (size.is_power_of_two() && base & (size - 1) == 0);
        let mode  = if napot { AddrMode::Napot } else { AddrMode::Tor };

        if mode == AddrMode::Tor && prio != Priority::Any
            && !(prio == Priority::Top && base == 0) {
            return Err(PmpError::RegionImpossibleTor);
        }

        let region_idx = self.free_region_idx().ok_or(PmpError::RegionMaxReached)?;
        let (reg_idx, reg_count) = match (mode, prio) {
            (AddrMode::Napot, Priority::Any) => {
                (self.free_reg_idx().ok_or(PmpError::RegionMaxReached)?, 1)
            },
            (AddrMode::Napot, Priority::Top) => (self.take_fixed(0)?, 1),
            (AddrMode::Napot, Priority::Bottom) => (self.take_fixed(PMP_N_REG - 1)?, 1),
            (AddrMode::Tor, Priority::Top) => (self.take_fixed(0)?, 1),
            (AddrMode::Tor, _) => {
                (self.free_conseq_reg_idx().ok_or(PmpError::RegionMaxReached)?, 2)
            },
        };

        for i in reg_idx .. reg_idx + reg_count {
            self.reg_bitmap |= 1 << i;
        }

        self.regions[region_idx] = Some(Region{base:          base,
                                               size:          size,
                                               mode:          mode,
                                               reg_idx:       reg_idx,
                                               reg_count:     reg_count,
                                               allow_overlap: allow_overlap,
                                               perm:          None});

        debug!("PMP region {} reserved: {:#x} + {:#x} ({:?}, register {})",
               region_idx, base, size, mode, reg_idx);
        Ok(region_idx)
    }

    /// Release a region and its registers
    pub fn free(&mut self, id: RegionId) -> Result<(), PmpError> {
        let region = self.region(id)?;
        for i in region.reg_idx .. region.reg_idx + region.reg_count {
            self.reg_bitmap &= !(1 << i);
        }
        self.regions[id] = None;
        debug!("PMP region {} freed", id);
        Ok(())
    }

    /// Apply 'perm' to the region on all harts
    pub fn set_global(&mut self, id: RegionId, perm: u8) -> Result<(), PmpError> {
        self.region(id)?;
        if let Some(region) = self.regions[id].as_mut() {
            region.perm = Some(perm);
        }
        trace!("PMP region {} permission set to {:#x}", id, perm);
        Ok(())
    }

    /// Clear the permission of the region on all harts
    pub fn unset_global(&mut self, id: RegionId) -> Result<(), PmpError> {
        self.region(id)?;
        if let Some(region) = self.regions[id].as_mut() {
            region.perm = None;
        }
        Ok(())
    }

    pub fn perm(&self, id: RegionId) -> Result<Option<u8>, PmpError> {
        Ok(self.region(id)?.perm)
    }

    pub fn addr(&self, id: RegionId) -> Result<u64, PmpError> {
        Ok(self.region(id)?.base)
    }

    pub fn size(&self, id: RegionId) -> Result<u64, PmpError> {
        Ok(self.region(id)?.size)
    }

    pub fn mode(&self, id: RegionId) -> Result<AddrMode, PmpError> {
        Ok(self.region(id)?.mode)
    }

    /// Number of hardware registers in use
    pub fn registers_used(&self) -> u32 {
        self.reg_bitmap.count_ones()
    }

    /// True if [base, base + size) overlaps a region that does not allow
    /// overlapping
    pub fn detect_overlap(&self, base: u64, size: u64) -> bool {
        let start = base as u128;
        let end   = start + size as u128;
        self.regions
            .iter()
            .flatten()
            .filter(|r| !r.allow_overlap)
            .any(|r| (r.base as u128) < end && r.end() > start)
    }

    fn region(&self, id: RegionId) -> Result<Region, PmpError> {
        self.regions
            .get(id)
            .copied()
            .flatten()
            .ok_or(PmpError::RegionInvalid)
    }

    fn free_region_idx(&self) -> Option<usize> {
        self.regions.iter().position(|r| r.is_none())
    }

    fn free_reg_idx(&self) -> Option<usize> {
        (0 .. PMP_N_REG).find(|i| self.reg_bitmap & (1 << i) == 0)
    }

    fn free_conseq_reg_idx(&self) -> Option<usize> {
        (0 .. PMP_N_REG - 1).find(|i| self.reg_bitmap & (0b11 << i) == 0)
    }

    fn take_fixed(&self, idx: usize) -> Result<usize, PmpError> {
        if self.reg_bitmap & (1 << idx) != 0 {
            return Err(PmpError::RegionMaxReached);
        }
        Ok(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: u64 = 0x8000_0000;

    #[test]
    fn size_checks() {
        let mut table = PmpTable::new();
        assert_eq!(table.reserve(BASE, 0, Priority::Any, false),
                   Err(PmpError::RegionSizeInvalid));
        assert_eq!(table.reserve(BASE, 0x1800, Priority::Any, false),
                   Err(PmpError::RegionNotPageGranularity));
        assert_eq!(table.reserve(BASE + 0x10, 0x1000, Priority::Any, false),
                   Err(PmpError::RegionNotAligned));
        assert_eq!(table.registers_used(), 0);
    }

    #[test]
    fn napot_and_tor() {
        let mut table = PmpTable::new();
        let napot = table.reserve(BASE, 0x4000, Priority::Any, false).unwrap();
        assert_eq!(table.mode(napot), Ok(AddrMode::Napot));
        assert_eq!(table.registers_used(), 1);

        // Not a power of two
        let tor = table.reserve(BASE + 0x10000, 0x3000, Priority::Any, false).unwrap();
        assert_eq!(table.mode(tor), Ok(AddrMode::Tor));
        assert_eq!(table.registers_used(), 3);

        // Power of two, but not aligned to its size
        let tor = table.reserve(BASE + 0x21000, 0x2000, Priority::Any, false).unwrap();
        assert_eq!(table.mode(tor), Ok(AddrMode::Tor));
        assert_eq!(table.addr(tor), Ok(BASE + 0x21000));
        assert_eq!(table.size(tor), Ok(0x2000));

        table.free(tor).unwrap();
        assert_eq!(table.registers_used(), 3);
        assert_eq!(table.free(tor), Err(PmpError::RegionInvalid));
    }

    #[test]
    fn overlap() {
        let mut table = PmpTable::new();
        table.reserve(BASE, 0x4000, Priority::Any, false).unwrap();
        assert_eq!(table.reserve(BASE + 0x3000, 0x2000, Priority::Any, false),
                   Err(PmpError::RegionOverlap));
        assert!(table.reserve(BASE + 0x3000, 0x2000, Priority::Any, true).is_ok());
        assert!(table.reserve(BASE + 0x4000, 0x1000, Priority::Any, false).is_ok());

        // A region spanning everything does not block others if it allows it
        table.reserve(0, PMP_FULL_SIZE, Priority::Bottom, true).unwrap();
        assert!(table.reserve(BASE + 0x8000, 0x1000, Priority::Any, false).is_ok());
    }

    #[test]
    fn register_exhaustion() {
        let mut table = PmpTable::new();
        for i in 0 .. PMP_N_REG as u64 {
            table.reserve(BASE + i * 0x1000, 0x1000, Priority::Any, false).unwrap();
        }
        assert_eq!(table.reserve(BASE + 0x100000, 0x1000, Priority::Any, false),
                   Err(PmpError::RegionMaxReached));
    }

    #[test]
    fn tor_needs_adjacent_registers() {
        let mut table = PmpTable::new();
        // Occupy every other register
        let mut ids = Vec::new();
        for i in 0 .. PMP_N_REG as u64 {
            ids.push(table.reserve(BASE + i * 0x1000, 0x1000, Priority::Any, false).unwrap());
        }
        for id in ids.iter().step_by(2) {
            table.free(*id).unwrap();
        }
        assert_eq!(table.registers_used(), 4);
        assert_eq!(table.reserve(BASE + 0x100000, 0x3000, Priority::Any, false),
                   Err(PmpError::RegionMaxReached));
    }

    #[test]
    fn fixed_priorities() {
        let mut table = PmpTable::new();
        assert!(table.reserve(BASE, 0x1000, Priority::Top, false).is_ok());
        assert_eq!(table.reserve(BASE + 0x1000, 0x1000, Priority::Top, false),
                   Err(PmpError::RegionMaxReached));
        assert_eq!(table.reserve(BASE + 0x10000, 0x3000, Priority::Bottom, false),
                   Err(PmpError::RegionImpossibleTor));
        assert!(table.reserve(BASE + 0x10000, 0x4000, Priority::Bottom, false).is_ok());
    }

    #[test]
    fn permissions() {
        let mut table = PmpTable::new();
        let id = table.reserve(BASE, 0x1000, Priority::Any, false).unwrap();
        assert_eq!(table.perm(id), Ok(None));
        table.set_global(id, PMP_NO_PERM).unwrap();
        assert_eq!(table.perm(id), Ok(Some(PMP_NO_PERM)));
        table.unset_global(id).unwrap();
        assert_eq!(table.perm(id), Ok(None));
        assert_eq!(table.set_global(PMP_MAX_N_REGION, PMP_ALL_PERM),
                   Err(PmpError::RegionInvalid));
    }
}

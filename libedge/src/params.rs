//! Parameters for enclave creation
//!
//! The default memory layout of an enclave depends on the word width of the
//! target. The layout is selected once per process from the build target and
//! never re-evaluated afterwards.
//
// SPDX-License-Identifier: MIT
// Copyright (C) 2022-2025 VTT Technical Research Centre of Finland Ltd

use core::ops::Range;

use log::debug;
use spin::Once;

use crate::Error;

/// Size of a page in bytes
pub const PAGE_SIZE: u64 = 4096;

/// Default size of the untrusted shared memory in bytes
pub const DEFAULT_UNTRUSTED_SIZE: u64 = 8192;

/// Default memory layout of a target
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Defaults {
    /// Size of the enclave free memory in bytes
    pub free_mem_size:  u64,
    /// Size of the untrusted shared memory in bytes
    pub untrusted_size: u64,
    /// Size of the enclave stack in bytes
    pub stack_size:     u64,
    /// Virtual address of the top of the stack
    pub stack_start:    u64,
    /// Virtual address where the untrusted shared memory is mapped
    pub untrusted_ptr:  u64,
}

/// Target profiles
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Profile {
    /// 64-bit RISC-V (Sv39)
    Rv64,
    /// 32-bit RISC-V (Sv32)
    Rv32,
    /// Builds for other hosts, used for testing. Mirrors Rv64
    HostTest,
}

const RV64_DEFAULTS: Defaults = Defaults {
    free_mem_size:  1024 * 1024,
    untrusted_size: DEFAULT_UNTRUSTED_SIZE,
    stack_size:     1024 * 16,
    stack_start:    0x0000000040000000,
    untrusted_ptr:  0xffffffff80000000,
};

const RV32_DEFAULTS: Defaults = Defaults {
    free_mem_size:  1024 * 512,
    untrusted_size: DEFAULT_UNTRUSTED_SIZE,
    stack_size:     1024 * 8,
    stack_start:    0x40000000,
    untrusted_ptr:  0x80000000,
};

/* Sv39 virtual addresses are sign-extended from bit 38 */
const SV39_LOW:  Range<u128> = 0 .. (1 << 38);
const SV39_HIGH: Range<u128> = ((1 << 64) - (1 << 38)) .. (1 << 64);
const SV32:      Range<u128> = 0 .. (1 << 32);

impl Profile {

    /// Profile of the current build target
    pub fn native() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(target_arch = "riscv64")] {
                Profile::Rv64
            } else if #[cfg(target_arch = "riscv32")] {
                Profile::Rv32
            } else {
                Profile::HostTest
            }
        }
    }

    pub fn defaults(&self) -> Defaults {
        match self {
            Profile::Rv64 | Profile::HostTest => RV64_DEFAULTS,
            Profile::Rv32                     => RV32_DEFAULTS,
        }
    }

    /// True if the whole range [start, end) is a valid virtual address range
    fn contains(&self, start: u128, end: u128) -> bool {
        if start >= end {
            return false;
        }

        let inside = |r: &Range<u128>| start >= r.start && end <= r.end;
        match self {
            Profile::Rv64 | Profile::HostTest => inside(&SV39_LOW) || inside(&SV39_HIGH),
            Profile::Rv32                     => inside(&SV32),
        }
    }
}

/// Process wide configuration
#[derive(Debug)]
pub struct Config {
    profile:  Profile,
    defaults: Defaults,
}

impl Config {
    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }
}

static CONFIG: Once<Config> = Once::new();

/// Configuration of this process
///
/// Selected from the build target on first use.
pub fn config() -> &'static Config {
    CONFIG.call_once(|| {
        let profile = Profile::native();
        debug!("Selected enclave parameter profile {:?}", profile);
        Config{profile: profile, defaults: profile.defaults()}
    })
}

/// Enclave creation parameters
///
/// The untrusted shared memory size and the free memory size can be changed
/// before the enclave is created. Stack and address placement are fixed by the
/// profile.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Params {
    profile:        Profile,
    untrusted_size: u64,
    freemem_size:   u64,
}

impl Default for Params {
    fn default() -> Self {
        Self::new()
    }
}

impl Params {

    /// Create parameters with the defaults of the current process
    pub fn new() -> Self {
        Self::with_profile(config().profile())
    }

    /// Create parameters with the defaults of the given profile
    pub fn with_profile(profile: Profile) -> Self {
        let defaults = profile.defaults();
        Self{profile:        profile,
             untrusted_size: defaults.untrusted_size,
             freemem_size:   defaults.free_mem_size}
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Set the untrusted shared memory size in bytes. Not validated.
    pub fn set_untrusted_size(&mut self, size: u64) {
        self.untrusted_size = size;
    }

    /// Set the free memory size in bytes. Not validated.
    pub fn set_free_mem_size(&mut self, size: u64) {
        self.freemem_size = size;
    }

    pub fn untrusted_size(&self) -> u64 {
        self.untrusted_size
    }

    pub fn free_mem_size(&self) -> u64 {
        self.freemem_size
    }

    pub fn stack_size(&self) -> u64 {
        self.profile.defaults().stack_size
    }

    pub fn stack_start(&self) -> u64 {
        self.profile.defaults().stack_start
    }

    pub fn untrusted_ptr(&self) -> u64 {
        self.profile.defaults().untrusted_ptr
    }

    /// Set the untrusted shared memory size in bytes
    ///
    /// # Return
    ///
    /// Ok() if the size was accepted, Error::InvalidSize if the size is zero
    /// or not page-aligned, Error::BadArgument if the shared memory would
    /// run past the address space of the profile and Error::Overlap if it
    /// would overlap the stack. The parameters are unchanged on error.

    pub fn try_set_untrusted_size(&mut self, size: u64) -> Result<(), Error> {
        check_size(size)?;
        let mut next = *self;
        next.untrusted_size = size;
        next.check_layout()?;
        *self = next;
        Ok(())
    }

    /// Set the free memory size in bytes
    ///
    /// # Return
    ///
    /// Ok() if the size was accepted, Error::InvalidSize if the size is zero
    /// or not page-aligned. The parameters are unchanged on error.

    pub fn try_set_free_mem_size(&mut self, size: u64) -> Result<(), Error> {
        check_size(size)?;
        self.freemem_size = size;
        Ok(())
    }

    /// Validate the complete parameter set
    pub fn validate(&self) -> Result<(), Error> {
        check_size(self.untrusted_size)?;
        check_size(self.freemem_size)?;
        check_size(self.stack_size())?;
        self.check_layout()
    }

    /// Virtual address range of the stack
    pub fn stack_range(&self) -> Range<u128> {
        let top = self.stack_start() as u128;
        top.saturating_sub(self.stack_size() as u128) .. top
    }

    /// Virtual address range of the untrusted shared memory
    pub fn untrusted_range(&self) -> Range<u128> {
        let base = self.untrusted_ptr() as u128;
        base .. base + self.untrusted_size as u128
    }

    fn check_layout(&self) -> Result<(), Error> {
        let stack  = self.stack_range();
        let shared = self.untrusted_range();

        // The built-in profiles place the shared memory above the stack
        if stack.start < shared.end && shared.start < stack.end {
            return Err(Error::Overlap);
        }

        if (self.stack_size() as u128) > (self.stack_start() as u128)
            || !self.profile.contains(stack.start, stack.end) {
            return Err(Error::BadArgument);
        }

        if !self.profile.contains(shared.start, shared.end) {
            return Err(Error::BadArgument);
        }

        Ok(())
    }
}

fn check_size(size: u64) -> Result<(), Error> {
    if size == 0 || size % PAGE_SIZE != 0 {
        return Err(Error::InvalidSize);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rv64_defaults() {
        let params = Params::with_profile(Profile::Rv64);
        assert_eq!(params.untrusted_size(), 8192);
        assert_eq!(params.free_mem_size(),  1048576);
        assert_eq!(params.stack_size(),     16384);
        assert_eq!(params.stack_start(),    0x40000000);
        assert_eq!(params.untrusted_ptr(),  0xffffffff80000000);
        assert_eq!(Profile::HostTest.defaults(), Profile::Rv64.defaults());
    }

    #[test]
    fn rv32_defaults() {
        let params = Params::with_profile(Profile::Rv32);
        assert_eq!(params.untrusted_size(), 8192);
        assert_eq!(params.free_mem_size(),  524288);
        assert_eq!(params.stack_size(),     8192);
        assert_eq!(params.untrusted_ptr(),  0x80000000);
    }

    #[test]
    fn config_is_stable() {
        let first = config() as *const Config;
        assert_eq!(first, config() as *const Config);
        assert_eq!(config().profile(), Profile::native());
        assert_eq!(Params::new().profile(), Profile::native());
    }

    #[test]
    fn setters_round_trip_without_clamping() {
        let mut params = Params::new();
        for (u, f) in [(0, 0), (1, 3), (4096, 8192), (u64::MAX, 12345)] {
            params.set_untrusted_size(u);
            params.set_free_mem_size(f);
            assert_eq!(params.untrusted_size(), u);
            assert_eq!(params.free_mem_size(),  f);
        }
    }

    #[test]
    fn hardened_setters() {
        let mut params = Params::with_profile(Profile::Rv64);
        assert_eq!(params.try_set_free_mem_size(0),    Err(Error::InvalidSize));
        assert_eq!(params.try_set_free_mem_size(4097), Err(Error::InvalidSize));
        assert_eq!(params.free_mem_size(), 1048576);
        assert_eq!(params.try_set_free_mem_size(2 * PAGE_SIZE), Ok(()));
        assert_eq!(params.free_mem_size(), 8192);

        assert_eq!(params.try_set_untrusted_size(100), Err(Error::InvalidSize));
        assert_eq!(params.try_set_untrusted_size(16 * PAGE_SIZE), Ok(()));
        // Runs past the end of the address space
        assert_eq!(params.try_set_untrusted_size(1 << 40), Err(Error::BadArgument));
        assert_eq!(params.untrusted_size(), 16 * PAGE_SIZE);
        assert_eq!(params.validate(), Ok(()));
    }

    #[test]
    fn rv32_untrusted_out_of_range() {
        // 0x80000000 + 2 GiB runs up to the end of the Sv32 space,
        // anything larger falls out of it
        let mut params = Params::with_profile(Profile::Rv32);
        assert_eq!(params.try_set_untrusted_size(0x80000000), Ok(()));
        assert_eq!(params.try_set_untrusted_size(0x80001000), Err(Error::BadArgument));
        assert_eq!(params.validate(), Ok(()));
    }

    #[test]
    fn validate_reports_unvalidated_values() {
        let mut params = Params::new();
        assert_eq!(params.validate(), Ok(()));
        params.set_free_mem_size(1000);
        assert_eq!(params.validate(), Err(Error::InvalidSize));
    }
}

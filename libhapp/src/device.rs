//! Keystone device API
//!
//! The device stands between host applications and the security monitor the
//! same way the Keystone driver does: it hands out physical memory for the
//! enclaves and forwards their lifecycle calls to the monitor.
//
// SPDX-License-Identifier: MIT
// Copyright (C) 2022-2025 VTT Technical Research Centre of Finland Ltd

use std::sync::Arc;

use log::{debug, info};
use spin::Mutex;

use crate::Error;
use crate::memory::PhysMemory;
use crate::monitor::{Monitor, PhysRegion, SMM_BASE, SMM_SIZE};

/// Base address of the memory given to enclaves
pub const DEVICE_MEMORY_BASE: u64 = SMM_BASE + 0x1000_0000;
/// Size of the memory given to enclaves
pub const DEVICE_MEMORY_SIZE: u64 = 0x1000_0000;

/// A handle to the enclave device
///
/// The device is shared by all enclaves of the host.
pub struct Device {
    monitor: Monitor,
    memory:  Mutex<PhysMemory>,
}

impl Device {

    /// Open a device with a generic security monitor
    pub fn open() -> Result<Arc<Self>, Error> {
        Self::with_monitor(Monitor::new())
    }

    /// Open a device using the given security monitor
    ///
    /// The monitor is initialized if needed.
    pub fn with_monitor(monitor: Monitor) -> Result<Arc<Self>, Error> {
        monitor.init()?;

        // The enclave memory must not cover the monitor itself
        debug_assert!(DEVICE_MEMORY_BASE >= SMM_BASE + SMM_SIZE);

        info!("Device opened: {:#x} bytes of enclave memory at {:#x}",
              DEVICE_MEMORY_SIZE, DEVICE_MEMORY_BASE);
        Ok(Arc::new(Self{monitor: monitor,
                         memory:  Mutex::new(PhysMemory::new(DEVICE_MEMORY_BASE,
                                                             DEVICE_MEMORY_SIZE))}))
    }

    /// The security monitor behind the device
    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// Reserve physical memory for an enclave
    pub(crate) fn alloc(&self, size: u64) -> Result<PhysRegion, Error> {
        let region = self.memory.lock().alloc(size)?;
        debug!("Reserved {:#x} bytes at {:#x}", region.size, region.paddr);
        Ok(region)
    }

    /// Release physical memory
    pub(crate) fn free(&self, region: PhysRegion) {
        self.memory.lock().free(region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_round_trip() {
        let _ = env_logger::builder().is_test(true).try_init();
        let device = Device::open().unwrap();
        let a = device.alloc(0x3000).unwrap();
        assert!(a.paddr >= DEVICE_MEMORY_BASE);
        device.free(a);
        assert_eq!(device.alloc(0x3000).unwrap(), a);
    }
}

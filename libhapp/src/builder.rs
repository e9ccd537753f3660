//! A builder pattern API for building Keystone enclaves
//
// SPDX-License-Identifier: MIT
// Copyright (C) 2022-2025 VTT Technical Research Centre of Finland Ltd

use log::debug;
use sha3::Sha3_512;
use sha3::Digest;

use edge::Params;
use edge::params::PAGE_SIZE;

use crate::Error;
use crate::attestation::Hash;
use crate::device::Device;
use crate::memory::ceil;
use crate::monitor::{CreateArgs, PhysRegion, RuntimeParams};

/// A binary image loaded into the enclave private memory
#[derive(Clone, Debug)]
struct Image {
    bytes: Vec<u8>,
    entry: u64,
}

impl Image {
    fn pages(&self) -> u64 {
        ceil(self.bytes.len() as u64, PAGE_SIZE)
    }
}

/// Enclave builder
pub struct Builder {
    /// Enclave runtime image
    runtime: Option<Image>,
    /// Enclave application image
    app:     Option<Image>,
    /// Memory parameters
    params:  Params,
}

/// Builder output
pub struct Output {
    /// Arguments for the security monitor
    pub args: CreateArgs,
    /// Expected measurement of the enclave
    pub hash: Hash,
}

impl Builder {

    /// Pages reserved for page tables and runtime bookkeeping
    pub(crate) const OVERHEAD_PAGES: u64 = 15; // A magic number inherited from Keystone code

    /// Create a new enclave builder

    pub fn new(params: Params) -> Self {
        Self { runtime: None,
               app:     None,
               params:  params }
    }

    /// Add a new binary to be loaded
    ///
    /// # Input
    /// * 'bytes' is the binary image
    /// * 'entry' is the virtual address of its entry point
    /// * 'runtime' should be set to 'true' if the binary represents the enclave
    ///             runtime
    ///
    /// # Return
    ///
    /// Ok() in case of success, otherwise an error value

    pub fn add(&mut self, bytes: &[u8], entry: u64, runtime: bool) -> Result<(), Error> {
        if bytes.is_empty() {
            return Err(Error::BadArgument);
        }

        let image = Image{bytes: bytes.to_vec(), entry: entry};
        if runtime {
            self.runtime = Some(image);
        } else {
            self.app = Some(image);
        }
        Ok(())
    }

    /// Memory parameters of the enclave
    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    fn images(&self) -> Result<(&Image, &Image), Error> {
        match (&self.runtime, &self.app) {
            (Some(ert), Some(app)) => Ok((ert, app)),
            _                      => Err(Error::BadState),
        }
    }

    /// Digest of the loaded pages
    fn image_hash(&self, ert: &Image, app: &Image) -> Hash {
        let mut hash = Sha3_512::new();
        for image in [ert, app] {
            hash.update(&image.pages().to_le_bytes());
            hash.update(&image.bytes);
            let padding = (image.pages() * PAGE_SIZE) as usize - image.bytes.len();
            hash.update(&vec![0u8; padding]);
        }
        hash.update(&self.params.stack_start().to_le_bytes());
        hash.update(&self.params.stack_size().to_le_bytes());

        let mut raw = [0u8; Hash::LENGTH];
        raw.copy_from_slice(&hash.finalize());
        Hash::wrap(raw)
    }

    /// Build an enclave using the parameters loaded into the builder
    ///
    /// The operation accepts an optional device. If it is supplied, enclave
    /// memory is reserved from the device. Otherwise, the builder only
    /// simulates the layout and calculates the measurement. This can be used,
    /// e.g., to calculate a reference value for attestation.
    ///
    /// The free memory size is passed to the monitor as is. Sizes that are not
    /// page aligned are rejected by the monitor, not here.
    ///
    /// # Input
    /// * 'device' is an optional device
    ///
    /// # Return
    ///
    /// Ok(Output) containing the monitor arguments of the new enclave if
    /// the operation succeeded, othewise an error value

    pub fn build(&self, device: Option<&Device>) -> Result<Output, Error> {

        let (ert, app) = self.images()?;
        let stack_pages = ceil(self.params.stack_size(), PAGE_SIZE);
        let min_pages = ert.pages() + app.pages() + stack_pages + Self::OVERHEAD_PAGES;

        let epm_size = min_pages
            .checked_mul(PAGE_SIZE)
            .and_then(|size| size.checked_add(self.params.free_mem_size()))
            .ok_or(Error::InvalidSize)?;
        let utm_size = self.params.untrusted_size();

        let (epm, utm) = match device {
            Some(dev) => {
                let epm = dev.alloc(epm_size)?;
                match dev.alloc(utm_size) {
                    Ok(utm)  => (epm, utm),
                    Err(err) => {
                        dev.free(epm);
                        return Err(err);
                    },
                }
            },
            None => (PhysRegion{paddr: 0, size: epm_size},
                     PhysRegion{paddr: epm_size, size: utm_size}),
        };

        let params = RuntimeParams{runtime_entry:  ert.entry,
                                   user_entry:     app.entry,
                                   untrusted_ptr:  self.params.untrusted_ptr(),
                                   untrusted_size: utm_size};

        let args = CreateArgs{epm_region:     epm,
                              utm_region:     utm,
                              runtime_paddr:  epm.paddr,
                              user_paddr:     epm.paddr + ert.pages() * PAGE_SIZE,
                              free_paddr:     epm.paddr + min_pages * PAGE_SIZE,
                              free_requested: self.params.free_mem_size(),
                              params:         params,
                              image_hash:     self.image_hash(ert, app)};

        debug!("Enclave layout: {} pages + {:#x} bytes free memory, {:#x} bytes shared",
               min_pages, self.params.free_mem_size(), utm_size);

        Ok(Output{args: args,
                  hash: args.measurement()})
    }
}

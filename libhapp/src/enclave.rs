//! The main interface to running enclave applications.
//
// SPDX-License-Identifier: MIT
// Copyright (C) 2022-2025 VTT Technical Research Centre of Finland Ltd

use std::sync::Arc;

use log::{debug, error, info, warn};

use edge::status::{EnclaveError, StatusCode};

use crate::Error;
use crate::attestation::Hash;
use crate::builder::Builder;
use crate::device::Device;
use crate::internal::dispatcher::Dispatcher;
use crate::memory::SharedMemory;
use crate::monitor::{Eid, EnclaveState, PhysRegion, StopReason};
use crate::ocall::Listener;
use crate::runtime::{Runtime, Trap};

/// An enclave instance
pub struct Enclave<'a> {
    /// Enclave device
    device:     Arc<Device>,
    /// Runtime executing inside the enclave
    runtime:    Box<dyn Runtime + 'a>,
    /// Call dispatcher
    dispatcher: Dispatcher<'a>,
    /// Identifier given by the monitor, if created
    eid:        Option<Eid>,
    /// Enclave private memory
    epm:        Option<PhysRegion>,
    /// Untrusted shared memory
    shared:     Option<SharedMemory>,
    /// Hash of the enclave calculated by the builder (not secure)
    hash:       Option<Hash>,
    /// Set once the enclave has been destroyed
    destroyed:  bool,
}

impl <'a>Enclave<'a> {

    /// Create a new enclave.
    ///
    /// The created enclave is uninitialized. It must initialized with an
    /// application by calling the Enclave.build() function before it can be
    /// used.
    ///
    /// # Inputs
    ///
    /// * 'device' is the enclave device
    ///
    /// * 'runtime' is the runtime that will execute in the enclave
    ///

    pub fn new(device: Arc<Device>, runtime: Box<dyn Runtime + 'a>) -> Self {
        Self{device:     device,
             runtime:    runtime,
             dispatcher: Dispatcher::new(),
             eid:        None,
             epm:        None,
             shared:     None,
             hash:       None,
             destroyed:  false}
    }

    /// Initialize an enclave.
    ///
    /// Enclave memory is reserved and the enclave is created by the security
    /// monitor. On failure nothing is left reserved and the enclave stays
    /// uninitialized.
    ///
    /// # Inputs
    ///
    /// * 'builder' is a enclave Builder initialized with the enclave
    ///   application's parameters.
    ///
    /// # Returns
    ///
    /// A Result with Ok() in case the operation succeeds, or an error code
    /// otherwise. Errors of the monitor are returned as Error::Monitor.
    ///

    pub fn build(&mut self, builder: &Builder) -> Result<(), Error> {
        if self.eid.is_some() || self.destroyed {
            return Err(Error::BadState);
        }

        let output = builder.build(Some(self.device.as_ref()))?;
        let args   = output.args;

        let eid = match self.device.monitor().create_enclave(&args) {
            Ok(eid)   => eid,
            Err(code) => {
                warn!("Enclave creation failed: {}", code);
                self.device.free(args.utm_region);
                self.device.free(args.epm_region);
                return Err(code.into());
            },
        };

        let shared = match SharedMemory::new(args.utm_region, args.params.untrusted_ptr) {
            Ok(shared) => shared,
            Err(err)   => {
                let _ = self.device.monitor().destroy_enclave(eid);
                self.device.free(args.utm_region);
                self.device.free(args.epm_region);
                return Err(err);
            },
        };

        info!("Enclave {} built", eid);
        self.eid    = Some(eid);
        self.epm    = Some(args.epm_region);
        self.shared = Some(shared);
        self.hash   = Some(output.hash);
        Ok(())
    }

    /// Register new ocall listener.
    ///
    /// The listener will be notified on each ocall with the matching
    /// 'cid' when the enclave application is executed.
    ///
    /// # Inputs
    ///
    /// * 'cid' is the numeric call ID of the ocall, below MAX_OCALL.
    ///
    /// * 'cb' is the listener object.
    ///
    /// # Returns
    ///
    /// A Result containing Ok() value if the registration succeeded, or
    /// an Error code otherwise.
    ///

    pub fn register_ocall(&mut self,
                          cid: u32,
                          cb: &'a dyn Listener)
                          -> Result<(), Error> {

        self.dispatcher.register_ocall(cid, cb)
    }

    /// Identifier of the enclave, if created
    pub fn eid(&self) -> Option<Eid> {
        self.eid
    }

    /// Lifecycle state of the enclave
    pub fn state(&self) -> EnclaveState {
        match self.eid {
            None if self.destroyed => EnclaveState::Destroyed,
            None                   => EnclaveState::Uninitialized,
            Some(eid)              => self.device.monitor()
                                         .state(eid)
                                         .unwrap_or(EnclaveState::Destroyed),
        }
    }

    /// Untrusted shared memory of the enclave
    pub fn shared_memory(&self) -> Option<&SharedMemory> {
        self.shared.as_ref()
    }

    /// Run the enclave.
    ///
    /// This call will block the current thread until the enclave terminates.
    ///
    /// # Returns
    ///
    /// A Result containing the value returned by the enclave in case the
    /// the enclave was executed successfully, or an error code othersize.
    ///

    pub fn run(&mut self) -> Result<u64, Error> {
        let eid = self.eid.ok_or(Error::BadState)?;
        self.enter(eid, |device| device.monitor().run_enclave(eid))
    }

    /// Resume a stopped enclave.
    ///
    /// Like run(), but for an enclave left interrupted.
    ///

    pub fn resume(&mut self) -> Result<u64, Error> {
        let eid = self.eid.ok_or(Error::BadState)?;
        self.enter(eid, |device| device.monitor().resume_enclave(eid))
    }

    fn enter<F>(&mut self, eid: Eid, start: F) -> Result<u64, Error>
        where F: FnOnce(&Device) -> Result<(), StatusCode> {

        let rv = start(self.device.as_ref())
            .map_err(Error::from)
            .and_then(|_| self.run_internal(eid));

        if rv.is_err() {
            self.reap(eid);
        }
        rv
    }

    fn run_internal(&mut self, eid: Eid) -> Result<u64, Error> {
        let shared  = self.shared.as_mut().ok_or(Error::BadState)?;
        let monitor = self.device.monitor();

        loop {
            match self.runtime.step(shared.as_mut_slice()) {
                Trap::Exit(value) => {
                    monitor.exit_enclave(eid, value)?;
                    return Ok(value);
                },
                Trap::EdgeCall(request) if request.call.is_terminal() => {
                    let value = request.args[0] as u64;
                    monitor.exit_enclave(eid, value)?;
                    return Ok(value);
                },
                Trap::EdgeCall(request) => {
                    // Control signal, the enclave waits for the host
                    monitor.stop_enclave(eid, StopReason::EdgeCall)?;
                    self.dispatcher.dispatch(monitor, eid, request.call,
                                             shared.as_mut_slice())?;
                    monitor.resume_enclave(eid)?;
                },
                Trap::Interrupt => {
                    monitor.stop_enclave(eid, StopReason::Interrupt)?;
                    debug!("Enclave {} interrupted", eid);
                    monitor.resume_enclave(eid)?;
                },
            }
        }
    }

    /// Forget an enclave the monitor has destroyed on its own
    fn reap(&mut self, eid: Eid) {
        if self.device.monitor().state(eid) == Err(StatusCode::Enclave(EnclaveError::InvalidId)) {
            warn!("Enclave {} was destroyed by the monitor", eid);
            self.release();
        }
    }

    fn release(&mut self) {
        if let Some(shared) = self.shared.take() {
            self.device.free(shared.region());
        }
        if let Some(epm) = self.epm.take() {
            self.device.free(epm);
        }
        self.eid       = None;
        self.destroyed = true;
    }

    /// Destroy the enclave.
    ///
    /// A running enclave is taken off its hart. All enclave memory is released.
    ///

    pub fn destroy(&mut self) -> Result<(), Error> {
        let eid = match self.eid {
            Some(eid) => eid,
            None      => return Ok(()),
        };

        match self.device.monitor().force_destroy(eid) {
            Ok(()) => (),
            // Already gone
            Err(StatusCode::Enclave(EnclaveError::InvalidId)) => (),
            Err(code) => return Err(code.into()),
        }

        self.release();
        Ok(())
    }

    /// Return hash value of enclave's presentation.
    ///
    /// The hash is computed by the builder and matches the measurement
    /// computed by the security monitor. However, this value is computed in
    /// the host application. It MUST not be used as evidence on enclave
    /// integrity. Enclave attestation features are designed for this purpose.
    ///

    pub fn hash(&self) -> Option<Hash> {
        self.hash
    }

    /// Measurement of the enclave recorded by the security monitor
    pub fn measurement(&self) -> Result<Hash, Error> {
        let eid = self.eid.ok_or(Error::BadState)?;
        Ok(self.device.monitor().measurement(eid)?)
    }
}

impl <'a>Drop for Enclave<'a> {
    fn drop(&mut self) {
        if let Err(err) = self.destroy() {
            error!("Failed to destroy enclave: {}", err);
        }
    }
}

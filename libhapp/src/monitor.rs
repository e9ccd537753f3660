//! A software model of the Keystone security monitor
//!
//! The monitor owns the PMP region table and the enclave metadata, and is the
//! only party that changes the lifecycle state of an enclave:
//!
//! ```text
//!  (uninitialized) --create--> Created --run--> Running --exit--> Exited
//!                                                 |  ^
//!                                            stop |  | resume
//!                                                 v  |
//!                                              Interrupted
//!
//!  Created | Interrupted | Exited --destroy--> (destroyed, id invalid)
//! ```
//!
//! Every call is answered with a status code. All calls are serialized by a
//! single lock, i.e., only one privileged call is in flight at a time.
//!
//! Host threads play the role of harts: a running enclave is bound to the
//! thread that ran or resumed it until it stops or exits.
//
// SPDX-License-Identifier: MIT
// Copyright (C) 2022-2025 VTT Technical Research Centre of Finland Ltd

use std::thread::{self, ThreadId};

use log::{debug, info, warn};
use sha3::{Digest, Sha3_512};
use spin::Mutex;

use edge::attestation::{NONCE_MAX_LENGTH, SEALING_KEY_LENGTH, SEALING_RESPONSE_LENGTH};
use edge::status::{EnclaveError, PmpError, Recovery, StatusCode};

use crate::attestation::{Evidence, Hash, PublicKey, Signature};
use crate::internal::ed25519::KeyPair;
use crate::pmp::{PmpTable, Priority, RegionId};
use crate::pmp::{PMP_ALL_PERM, PMP_FULL_SIZE, PMP_NO_PERM};

/// Maximum number of enclaves
pub const NUM_ENCL: usize = 16;

/// Physical base address of the security monitor memory
pub const SMM_BASE: u64 = 0x8000_0000;
/// Size of the security monitor memory
pub const SMM_SIZE: u64 = 0x20_0000;

/// Security monitor SBI function identifiers
pub mod sbi {
    // 2000-2999 are called by host
    pub const CREATE_ENCLAVE:  usize = 2001;
    pub const DESTROY_ENCLAVE: usize = 2002;
    pub const RUN_ENCLAVE:     usize = 2003;
    pub const RESUME_ENCLAVE:  usize = 2005;

    // 3000-3999 are called by enclave
    pub const RANDOM:          usize = 3001;
    pub const ATTEST_ENCLAVE:  usize = 3002;
    pub const GET_SEALING_KEY: usize = 3003;
    pub const STOP_ENCLAVE:    usize = 3004;
    pub const EXIT_ENCLAVE:    usize = 3006;

    /// Retired function identifiers
    pub const RETIRED: [usize; 2] = [2004, 3005];

    pub(crate) const SUPPORTED: [usize; 9] = [
        CREATE_ENCLAVE, DESTROY_ENCLAVE, RUN_ENCLAVE, RESUME_ENCLAVE,
        RANDOM, ATTEST_ENCLAVE, GET_SEALING_KEY, STOP_ENCLAVE, EXIT_ENCLAVE,
    ];
}

/// Enclave identifier
pub type Eid = usize;

/// Why a running enclave stopped
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StopReason {
    /// Timer interrupt, or the host forcing the enclave off the hart
    Interrupt,
    /// The enclave has an edge call for the host
    EdgeCall,
}

/// Lifecycle state of an enclave
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EnclaveState {
    /// Not created yet, or creation failed
    Uninitialized,
    /// Created and measured, never run
    Created,
    /// Executing on a hart
    Running,
    /// Stopped and waiting to be resumed
    Interrupted(StopReason),
    /// Terminated with the given value
    Exited(u64),
    /// Destroyed, its identifier is no longer valid
    Destroyed,
}

impl EnclaveState {
    pub fn is_resumable(&self) -> bool {
        matches!(self, EnclaveState::Interrupted(_))
    }
}

/// A physical memory region
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PhysRegion {
    pub paddr: u64,
    pub size:  u64,
}

/// Enclave runtime parameters (virtual addresses)
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RuntimeParams {
    /// Runtime entry point
    pub runtime_entry:  u64,
    /// Enclave application entry point
    pub user_entry:     u64,
    /// Untrusted shared memory base address
    pub untrusted_ptr:  u64,
    /// Untrusted shared memory size in bytes
    pub untrusted_size: u64,
}

impl RuntimeParams {
    fn to_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        let words = [self.runtime_entry, self.user_entry,
                     self.untrusted_ptr, self.untrusted_size];
        for (chunk, word) in out.chunks_exact_mut(8).zip(words.iter()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }
}

/// Arguments of the enclave creation call
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CreateArgs {
    /// Enclave private memory
    pub epm_region:     PhysRegion,
    /// Untrusted shared memory
    pub utm_region:     PhysRegion,
    /// Physical address of the runtime image inside the EPM
    pub runtime_paddr:  u64,
    /// Physical address of the application image inside the EPM
    pub user_paddr:     u64,
    /// Physical address of the first free page inside the EPM
    pub free_paddr:     u64,
    /// Free memory requested by the host in bytes
    pub free_requested: u64,
    /// Runtime parameters
    pub params:         RuntimeParams,
    /// Digest of the pages loaded into the EPM
    pub image_hash:     Hash,
}

impl CreateArgs {

    /// Check the layout of the physical addresses
    ///
    /// Both regions must be non-empty, must not wrap around the address space
    /// and must be disjoint. Runtime, user and free memory must lie in the
    /// EPM in this order.
    pub fn is_valid(&self) -> bool {
        let epm_start = self.epm_region.paddr as u128;
        let epm_end   = epm_start + self.epm_region.size as u128;
        let utm_start = self.utm_region.paddr as u128;
        let utm_end   = utm_start + self.utm_region.size as u128;

        if self.epm_region.size == 0 || self.utm_region.size == 0 {
            return false;
        }

        // Overflow of the physical address space
        if epm_end > (1u128 << 64) || utm_end > (1u128 << 64) {
            return false;
        }

        if utm_start < epm_end && epm_start < utm_end {
            return false;
        }

        let runtime = self.runtime_paddr as u128;
        let user    = self.user_paddr as u128;
        let free    = self.free_paddr as u128;

        if runtime < epm_start || runtime >= epm_end {
            return false;
        }

        if user < epm_start || user >= epm_end {
            return false;
        }

        // free == epm_end if there is no free memory
        if free < epm_start || free > epm_end {
            return false;
        }

        runtime <= user && user <= free
    }

    /// Measurement of an enclave created with these arguments
    ///
    /// Physical placement is not measured.
    pub fn measurement(&self) -> Hash {
        let mut hash = Sha3_512::new();
        hash.update(&self.params.to_bytes());
        hash.update(&self.epm_region.size.to_le_bytes());
        hash.update(&self.utm_region.size.to_le_bytes());
        hash.update(&self.user_paddr.wrapping_sub(self.runtime_paddr).to_le_bytes());
        hash.update(&self.free_paddr.wrapping_sub(self.runtime_paddr).to_le_bytes());
        hash.update(&self.free_requested.to_le_bytes());
        hash.update(self.image_hash.as_bytes());

        let mut raw = [0u8; Hash::LENGTH];
        raw.copy_from_slice(&hash.finalize());
        Hash::wrap(raw)
    }
}

/// Platform specific hooks of the monitor
///
/// The default implementations accept everything.
pub trait Platform: Send + Sync {

    /// Number of enclave slots, at most NUM_ENCL
    fn max_enclaves(&self) -> usize {
        NUM_ENCL
    }

    /// Called when the regions of a new enclave have been reserved
    fn create_enclave(&self, _eid: Eid) -> Result<(), StatusCode> {
        Ok(())
    }

    /// Validate enclave memory and page tables before it is scheduled
    ///
    /// Should return NotAccessible or IllegalPte on failure.
    fn validate_memory(&self, _eid: Eid) -> Result<(), EnclaveError> {
        Ok(())
    }

    /// Check that the enclave state is not stale or replayed
    ///
    /// Should return NotFresh on failure.
    fn check_freshness(&self, _eid: Eid) -> Result<(), EnclaveError> {
        Ok(())
    }
}

/// Platform without any extra checks
pub struct GenericPlatform;

impl Platform for GenericPlatform {}

struct EnclaveRecord {
    state:  EnclaveState,
    epm:    RegionId,
    utm:    RegionId,
    hash:   Hash,
    params: RuntimeParams,
    hart:   Option<ThreadId>,
}

struct Inner {
    initialized: bool,
    pmp:         PmpTable,
    enclaves:    [Option<EnclaveRecord>; NUM_ENCL],
}

impl Inner {
    fn enclave(&mut self, eid: Eid) -> Result<&mut EnclaveRecord, StatusCode> {
        self.enclaves
            .get_mut(eid)
            .and_then(|e| e.as_mut())
            .ok_or(StatusCode::Enclave(EnclaveError::InvalidId))
    }

    /// Is the calling hart executing an enclave
    fn in_enclave_context(&self) -> bool {
        let me = thread::current().id();
        self.enclaves
            .iter()
            .flatten()
            .any(|e| e.state == EnclaveState::Running && e.hart == Some(me))
    }

    fn release(&mut self, eid: Eid) {
        if let Some(record) = self.enclaves.get_mut(eid).and_then(|e| e.take()) {
            for region in [record.epm, record.utm] {
                let _ = self.pmp.unset_global(region);
                let _ = self.pmp.free(region);
            }
        }
    }
}

/// The security monitor
pub struct Monitor {
    inner:        Mutex<Inner>,
    platform:     Box<dyn Platform>,
    device_key:   KeyPair,
    sm_key:       KeyPair,
    sm_hash:      Hash,
    sm_signature: Signature,
}

fn encl(e: EnclaveError) -> StatusCode {
    StatusCode::Enclave(e)
}

impl Monitor {

    /// Create a monitor for the generic platform
    ///
    /// The monitor must be initialized with init() before it accepts calls.
    pub fn new() -> Self {
        Self::with_platform(Box::new(GenericPlatform))
    }

    pub fn with_platform(platform: Box<dyn Platform>) -> Self {
        let device_key = KeyPair::generate();
        let sm_key     = KeyPair::generate();

        let mut hash = Sha3_512::new();
        hash.update(b"keystone-sm");
        hash.update(env!("CARGO_PKG_VERSION").as_bytes());
        let mut raw = [0u8; Hash::LENGTH];
        raw.copy_from_slice(&hash.finalize());
        let sm_hash = Hash::wrap(raw);

        let mut report = Vec::with_capacity(Hash::LENGTH + PublicKey::LENGTH);
        report.extend_from_slice(sm_hash.as_bytes());
        report.extend_from_slice(sm_key.public_key().as_bytes());
        let sm_signature = device_key.sign(&report);

        const NONE: Option<EnclaveRecord> = None;
        Self{inner:        Mutex::new(Inner{initialized: false,
                                            pmp:         PmpTable::new(),
                                            enclaves:    [NONE; NUM_ENCL]}),
             platform:     platform,
             device_key:   device_key,
             sm_key:       sm_key,
             sm_hash:      sm_hash,
             sm_signature: sm_signature}
    }

    /// Initialize the monitor
    ///
    /// Protects the monitor's own memory and opens the rest of the physical
    /// memory to the host.
    pub fn init(&self) -> Result<(), StatusCode> {
        let mut inner = self.inner.lock();
        if inner.initialized {
            return Ok(());
        }

        let sm = inner.pmp.reserve(SMM_BASE, SMM_SIZE, Priority::Top, false)?;
        inner.pmp.set_global(sm, PMP_NO_PERM)?;
        let os = inner.pmp.reserve(0, PMP_FULL_SIZE, Priority::Bottom, true)?;
        inner.pmp.set_global(os, PMP_ALL_PERM)?;

        inner.initialized = true;
        info!("Security monitor initialized");
        Ok(())
    }

    /// Check whether an SBI function identifier is served
    pub fn legacy_call(&self, fid: usize) -> Result<(), StatusCode> {
        if sbi::SUPPORTED.contains(&fid) {
            Ok(())
        } else if sbi::RETIRED.contains(&fid) {
            Err(encl(EnclaveError::Deprecated))
        } else {
            Err(encl(EnclaveError::NotImplemented))
        }
    }

    /// Measurement of the security monitor
    pub fn sm_hash(&self) -> Hash {
        self.sm_hash
    }

    /// Public key of the device root of trust
    pub fn device_public_key(&self) -> PublicKey {
        self.device_key.public_key()
    }

    /// Create a new enclave
    ///
    /// # Input
    /// * 'args' describes the memory regions and runtime parameters
    ///
    /// # Return
    ///
    /// Ok(Eid) for the new enclave, otherwise a status code. Nothing is left
    /// behind on failure.

    pub fn create_enclave(&self, args: &CreateArgs) -> Result<Eid, StatusCode> {
        let mut inner = self.inner.lock();
        if !inner.initialized {
            return Err(encl(EnclaveError::NotInitialized));
        }

        if inner.in_enclave_context() {
            return Err(encl(EnclaveError::SbiProhibited));
        }

        if !args.is_valid() {
            return Err(encl(EnclaveError::IllegalArgument));
        }

        let eid = inner.enclaves
            .iter()
            .take(self.platform.max_enclaves())
            .position(|e| e.is_none())
            .ok_or(encl(EnclaveError::NoFreeResource))?;

        let epm = inner.pmp.reserve(args.epm_region.paddr, args.epm_region.size,
                                    Priority::Any, false)?;
        let utm = match inner.pmp.reserve(args.utm_region.paddr,
                                          args.utm_region.size,
                                          Priority::Any, false) {
            Ok(utm)  => utm,
            Err(err) => {
                let _ = inner.pmp.free(epm);
                return Err(err.into());
            },
        };

        if let Err(err) = inner.pmp.set_global(epm, PMP_NO_PERM) {
            let _ = inner.pmp.free(utm);
            let _ = inner.pmp.free(epm);
            return Err(err.into());
        }

        inner.enclaves[eid] = Some(EnclaveRecord{state:  EnclaveState::Created,
                                                 epm:    epm,
                                                 utm:    utm,
                                                 hash:   args.measurement(),
                                                 params: args.params,
                                                 hart:   None});

        if let Err(err) = self.platform.create_enclave(eid) {
            inner.release(eid);
            return Err(err);
        }

        info!("Enclave {} created: EPM {:#x} + {:#x}, UTM {:#x} + {:#x}",
              eid, args.epm_region.paddr, args.epm_region.size,
              args.utm_region.paddr, args.utm_region.size);
        Ok(eid)
    }

    /// Start a created enclave
    pub fn run_enclave(&self, eid: Eid) -> Result<(), StatusCode> {
        let mut inner = self.inner.lock();
        let state = inner.enclave(eid)?.state;
        if state != EnclaveState::Created {
            return Err(encl(EnclaveError::NotRunnable));
        }

        if inner.in_enclave_context() {
            return Err(encl(EnclaveError::SbiProhibited));
        }

        self.schedule(&mut inner, eid)
    }

    /// Resume an interrupted enclave
    pub fn resume_enclave(&self, eid: Eid) -> Result<(), StatusCode> {
        let mut inner = self.inner.lock();
        let state = inner.enclave(eid)?.state;
        if !state.is_resumable() {
            return Err(encl(EnclaveError::NotResumable));
        }

        if inner.in_enclave_context() {
            return Err(encl(EnclaveError::SbiProhibited));
        }

        self.schedule(&mut inner, eid)
    }

    fn schedule(&self, inner: &mut Inner, eid: Eid) -> Result<(), StatusCode> {
        let (epm, utm) = {
            let record = inner.enclave(eid)?;
            (record.epm, record.utm)
        };

        // Both regions must still be in place
        if inner.pmp.perm(epm) != Ok(Some(PMP_NO_PERM)) || inner.pmp.addr(utm).is_err() {
            return Err(encl(EnclaveError::NotAccessible));
        }

        let checked = self.platform.validate_memory(eid)
            .and_then(|_| self.platform.check_freshness(eid));

        if let Err(err) = checked {
            let code = encl(err);
            if code.recovery() == Recovery::Fatal {
                warn!("Enclave {} failed integrity check ({}), destroying", eid, code);
                inner.release(eid);
            }
            return Err(code);
        }

        let record = inner.enclave(eid)?;
        record.state = EnclaveState::Running;
        record.hart  = Some(thread::current().id());
        debug!("Enclave {} running", eid);
        Ok(())
    }

    /// Stop a running enclave and return control to the host
    ///
    /// # Return
    ///
    /// Ok(code) with the control signal for the host: Interrupted or
    /// EdgeCallHost. Err(NotRunning) if the enclave is not running.

    pub fn stop_enclave(&self, eid: Eid, reason: StopReason) -> Result<StatusCode, StatusCode> {
        let mut inner = self.inner.lock();
        let record = inner.enclave(eid)?;
        if record.state != EnclaveState::Running {
            return Err(encl(EnclaveError::NotRunning));
        }

        record.state = EnclaveState::Interrupted(reason);
        record.hart  = None;
        debug!("Enclave {} stopped: {:?}", eid, reason);
        Ok(match reason {
            StopReason::Interrupt => encl(EnclaveError::Interrupted),
            StopReason::EdgeCall  => encl(EnclaveError::EdgeCallHost),
        })
    }

    /// Terminate a running enclave
    pub fn exit_enclave(&self, eid: Eid, value: u64) -> Result<(), StatusCode> {
        let mut inner = self.inner.lock();
        let record = inner.enclave(eid)?;
        if record.state != EnclaveState::Running {
            return Err(encl(EnclaveError::NotRunning));
        }

        record.state = EnclaveState::Exited(value);
        record.hart  = None;
        info!("Enclave {} exited with {:#x}", eid, value);
        Ok(())
    }

    /// Destroy an enclave that is not running
    ///
    /// Releases its PMP regions. The identifier becomes invalid.
    pub fn destroy_enclave(&self, eid: Eid) -> Result<(), StatusCode> {
        let mut inner = self.inner.lock();
        if inner.in_enclave_context() {
            return Err(encl(EnclaveError::SbiProhibited));
        }

        if inner.enclave(eid)?.state == EnclaveState::Running {
            return Err(encl(EnclaveError::NotDestroyable));
        }

        inner.release(eid);
        info!("Enclave {} destroyed", eid);
        Ok(())
    }

    /// Destroy an enclave regardless of its state
    ///
    /// A running enclave is taken off its hart and released at once.
    pub fn force_destroy(&self, eid: Eid) -> Result<(), StatusCode> {
        let mut inner = self.inner.lock();
        if inner.enclave(eid)?.state == EnclaveState::Running {
            warn!("Enclave {} interrupted for destruction", eid);
        }

        inner.release(eid);
        info!("Enclave {} destroyed", eid);
        Ok(())
    }

    /// Current state of an enclave
    pub fn state(&self, eid: Eid) -> Result<EnclaveState, StatusCode> {
        Ok(self.inner.lock().enclave(eid)?.state)
    }

    /// Measurement of an enclave
    pub fn measurement(&self, eid: Eid) -> Result<Hash, StatusCode> {
        Ok(self.inner.lock().enclave(eid)?.hash)
    }

    /// Runtime parameters of an enclave
    pub fn runtime_params(&self, eid: Eid) -> Result<RuntimeParams, StatusCode> {
        Ok(self.inner.lock().enclave(eid)?.params)
    }

    /// Services of the enclave context are available to a running enclave
    /// and, through the host, to an enclave parked in an edge call
    fn enclave_context(&self, eid: Eid) -> Result<Hash, StatusCode> {
        let mut inner = self.inner.lock();
        let record = inner.enclave(eid)?;
        match record.state {
            EnclaveState::Running |
            EnclaveState::Interrupted(StopReason::EdgeCall) => Ok(record.hash),
            _ => Err(encl(EnclaveError::SbiProhibited)),
        }
    }

    /// Produce an attestation report for an enclave
    ///
    /// # Input
    /// * 'eid' is the calling enclave
    /// * 'nonce' is included in the report, at most NONCE_MAX_LENGTH bytes

    pub fn attest_enclave(&self, eid: Eid, nonce: &[u8]) -> Result<Evidence, StatusCode> {
        let hash = self.enclave_context(eid)?;
        if nonce.len() > NONCE_MAX_LENGTH {
            return Err(encl(EnclaveError::IllegalArgument));
        }

        let dev_pkey = self.device_key.public_key();
        Evidence::build(&hash, nonce, &self.sm_hash, &self.sm_signature,
                        &self.sm_key, &dev_pkey)
            .map_err(|_| encl(EnclaveError::IllegalArgument))
    }

    /// Derive a sealing key for an enclave
    ///
    /// The key depends on the device, the enclave measurement and 'ident'.
    ///
    /// # Return
    ///
    /// The key (SEALING_KEY_LENGTH bytes) followed by the monitor's signature
    /// of the key.

    pub fn get_sealing_key(&self, eid: Eid, ident: &[u8])
                           -> Result<[u8; SEALING_RESPONSE_LENGTH], StatusCode> {
        let hash = self.enclave_context(eid)?;

        let mut out = [0u8; SEALING_RESPONSE_LENGTH];
        for (i, chunk) in out[.. SEALING_KEY_LENGTH].chunks_mut(Hash::LENGTH).enumerate() {
            let mut kdf = Sha3_512::new();
            kdf.update(self.sm_key.sign(b"sealing-key").as_bytes());
            kdf.update(hash.as_bytes());
            kdf.update(ident);
            kdf.update(&[i as u8]);
            chunk.copy_from_slice(&kdf.finalize()[.. chunk.len()]);
        }

        let signature = self.sm_key.sign(&out[.. SEALING_KEY_LENGTH]);
        out[SEALING_KEY_LENGTH ..].copy_from_slice(signature.as_bytes());
        debug!("Sealing key derived for enclave {}", eid);
        Ok(out)
    }

    /// Public key of the monitor's attestation key
    pub fn public_key(&self) -> PublicKey {
        self.sm_key.public_key()
    }

    #[cfg(test)]
    pub(crate) fn pmp_registers_used(&self) -> u32 {
        self.inner.lock().pmp.registers_used()
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn args(base: u64, free: u64) -> CreateArgs {
        CreateArgs{epm_region:     PhysRegion{paddr: base, size: 0x10000 + free},
                   utm_region:     PhysRegion{paddr: base + 0x100_0000, size: 0x2000},
                   runtime_paddr:  base,
                   user_paddr:     base + 0x4000,
                   free_paddr:     base + 0x10000,
                   free_requested: free,
                   params:         RuntimeParams::default(),
                   image_hash:     Hash::wrap([0u8; Hash::LENGTH])}
    }

    fn monitor() -> Monitor {
        let _ = env_logger::builder().is_test(true).try_init();
        let monitor = Monitor::new();
        monitor.init().unwrap();
        monitor
    }

    #[test]
    fn test_is_create_args_valid() {
        let mut args = args(0x4000, 0);
        args.epm_region = PhysRegion{paddr: 0x4000, size: 0x2000};
        args.utm_region = PhysRegion{paddr: 0x8000, size: 0x2000};
        args.runtime_paddr = 0x4000;
        args.user_paddr = 0x5000;
        args.free_paddr = 0x6000;
        assert!(args.is_valid());

        // false if utm is empty
        args.utm_region.size = 0;
        assert!(!args.is_valid());
        args.utm_region.size = 0x2000;

        // false if utm overflows
        args.utm_region.paddr = !0xfff;
        assert!(!args.is_valid());

        // false if utm lies inside the epm
        args.epm_region.size = 0x4000;
        args.utm_region = PhysRegion{paddr: 0x6000, size: 0x1000};
        assert!(!args.is_valid());

        // false if utm overlaps the start of the epm
        args.utm_region = PhysRegion{paddr: 0x3000, size: 0x2000};
        assert!(!args.is_valid());
        args.epm_region.size = 0x2000;
        args.utm_region = PhysRegion{paddr: 0x8000, size: 0x2000};
        assert!(args.is_valid());

        // false if runtime is not within the epm
        args.runtime_paddr = 0x3000;
        assert!(!args.is_valid());
        args.runtime_paddr = 0x4000;

        // false if user is not within the epm
        args.user_paddr = 0x7000;
        assert!(!args.is_valid());
        args.user_paddr = 0x5000;

        // false if free is not within the epm
        args.free_paddr = 0x7000;
        assert!(!args.is_valid());
        args.free_paddr = 0x6000;

        // false if runtime > user
        args.runtime_paddr = 0x5f00;
        assert!(!args.is_valid());
        args.runtime_paddr = 0x4000;

        // false if user > free
        args.free_paddr = 0x4500;
        assert!(!args.is_valid());
        args.free_paddr = 0x6000;

        // false if epm overflows
        args.epm_region.size = !0;
        assert!(!args.is_valid());
    }

    #[test]
    fn not_initialized() {
        let monitor = Monitor::new();
        assert_eq!(monitor.create_enclave(&args(0x9000_0000, 0x1000)),
                   Err(encl(EnclaveError::NotInitialized)));
    }

    #[test]
    fn lifecycle() {
        let monitor = monitor();
        let eid = monitor.create_enclave(&args(0x9000_0000, 0x1000)).unwrap();
        assert_eq!(monitor.state(eid), Ok(EnclaveState::Created));
        assert_eq!(monitor.resume_enclave(eid), Err(encl(EnclaveError::NotResumable)));

        monitor.run_enclave(eid).unwrap();
        assert_eq!(monitor.run_enclave(eid), Err(encl(EnclaveError::NotRunnable)));
        // This thread is the hart running the enclave
        assert_eq!(monitor.destroy_enclave(eid), Err(encl(EnclaveError::SbiProhibited)));
        assert_eq!(monitor.create_enclave(&args(0xa000_0000, 0x1000)),
                   Err(encl(EnclaveError::SbiProhibited)));

        assert_eq!(monitor.stop_enclave(eid, StopReason::EdgeCall),
                   Ok(encl(EnclaveError::EdgeCallHost)));
        assert!(monitor.state(eid).unwrap().is_resumable());
        assert_eq!(monitor.stop_enclave(eid, StopReason::Interrupt),
                   Err(encl(EnclaveError::NotRunning)));

        monitor.resume_enclave(eid).unwrap();
        monitor.exit_enclave(eid, 7).unwrap();
        assert_eq!(monitor.state(eid), Ok(EnclaveState::Exited(7)));
        assert_eq!(monitor.resume_enclave(eid), Err(encl(EnclaveError::NotResumable)));
        assert_eq!(monitor.state(eid), Ok(EnclaveState::Exited(7)));

        monitor.destroy_enclave(eid).unwrap();
        let invalid = Err(encl(EnclaveError::InvalidId));
        assert_eq!(monitor.state(eid), invalid);
        assert_eq!(monitor.run_enclave(eid), invalid.map(|_| ()));
        assert_eq!(monitor.destroy_enclave(eid), invalid.map(|_| ()));
    }

    #[test]
    fn regions_are_released() {
        let monitor = monitor();
        let before = monitor.pmp_registers_used();
        let eid = monitor.create_enclave(&args(0x9000_0000, 0x1000)).unwrap();
        assert!(monitor.pmp_registers_used() > before);
        monitor.destroy_enclave(eid).unwrap();
        assert_eq!(monitor.pmp_registers_used(), before);

        // Same memory can be used again
        assert!(monitor.create_enclave(&args(0x9000_0000, 0x1000)).is_ok());
    }

    #[test]
    fn failed_creation_leaves_nothing() {
        let monitor = monitor();
        let before = monitor.pmp_registers_used();
        assert_eq!(monitor.create_enclave(&args(0x9000_0000, 0x1234)),
                   Err(StatusCode::Pmp(PmpError::RegionNotPageGranularity)));

        // UTM overlaps the monitor memory
        let mut bad = args(0x9000_0000, 0x1000);
        bad.utm_region.paddr = SMM_BASE;
        assert_eq!(monitor.create_enclave(&bad),
                   Err(StatusCode::Pmp(PmpError::RegionOverlap)));
        assert_eq!(monitor.pmp_registers_used(), before);

        let mut bad = args(0x9000_0000, 0x1000);
        bad.free_paddr = 0;
        assert_eq!(monitor.create_enclave(&bad),
                   Err(encl(EnclaveError::IllegalArgument)));
    }

    #[test]
    fn enclave_slots_run_out() {
        let monitor = monitor();
        // EPM of each enclave: 0x10000 (TOR) -> use power of two sizes to
        // save registers: 0x1000 EPM + 0x1000 UTM
        let mut eids = Vec::new();
        let mut base = 0x9000_0000u64;
        let result = loop {
            let mut a = args(base, 0);
            a.epm_region.size = 0x1000;
            a.user_paddr = base;
            a.free_paddr = base + 0x1000;
            a.utm_region = PhysRegion{paddr: base + 0x1000, size: 0x1000};
            base += 0x10_0000;
            match monitor.create_enclave(&a) {
                Ok(eid)  => eids.push(eid),
                Err(err) => break err,
            }
        };

        // Registers run out before the slots do
        assert_eq!(result, StatusCode::Pmp(PmpError::RegionMaxReached));
        assert_eq!(result.recovery(), Recovery::Retry);

        // Reclaiming resources makes room again
        monitor.destroy_enclave(eids[0]).unwrap();
        let mut a = args(0xa000_0000, 0);
        a.epm_region.size = 0x1000;
        a.user_paddr = 0xa000_0000;
        a.free_paddr = 0xa000_1000;
        a.utm_region = PhysRegion{paddr: 0xa000_1000, size: 0x1000};
        assert!(monitor.create_enclave(&a).is_ok());
    }

    #[test]
    fn function_identifiers() {
        let monitor = monitor();
        assert_eq!(monitor.legacy_call(sbi::RUN_ENCLAVE), Ok(()));
        assert_eq!(monitor.legacy_call(2004), Err(encl(EnclaveError::Deprecated)));
        assert_eq!(monitor.legacy_call(4242), Err(encl(EnclaveError::NotImplemented)));
    }

    #[test]
    fn enclave_services_need_a_running_enclave() {
        let monitor = monitor();
        let eid = monitor.create_enclave(&args(0x9000_0000, 0x1000)).unwrap();
        assert_eq!(monitor.attest_enclave(eid, b"n").err(),
                   Some(encl(EnclaveError::SbiProhibited)));
        assert_eq!(monitor.get_sealing_key(eid, b"id").err(),
                   Some(encl(EnclaveError::SbiProhibited)));

        monitor.run_enclave(eid).unwrap();
        let evidence = monitor.attest_enclave(eid, b"n").unwrap();
        assert_eq!(evidence.enclave().hash(), monitor.measurement(eid).unwrap());
        assert_eq!(monitor.attest_enclave(eid, &[0u8; NONCE_MAX_LENGTH + 1]).err(),
                   Some(encl(EnclaveError::IllegalArgument)));

        let a = monitor.get_sealing_key(eid, b"id").unwrap();
        let b = monitor.get_sealing_key(eid, b"id").unwrap();
        let c = monitor.get_sealing_key(eid, b"other").unwrap();
        assert_eq!(a[..], b[..]);
        assert_ne!(a[.. SEALING_KEY_LENGTH], c[.. SEALING_KEY_LENGTH]);
        let signature = Signature::from_bytes(&a[SEALING_KEY_LENGTH ..]).unwrap();
        assert!(monitor.public_key().verify(&a[.. SEALING_KEY_LENGTH], &signature));

        // Served on behalf of an enclave waiting for the host
        monitor.stop_enclave(eid, StopReason::EdgeCall).unwrap();
        assert!(monitor.get_sealing_key(eid, b"id").is_ok());
        monitor.resume_enclave(eid).unwrap();
        monitor.stop_enclave(eid, StopReason::Interrupt).unwrap();
        assert_eq!(monitor.attest_enclave(eid, b"n").err(),
                   Some(encl(EnclaveError::SbiProhibited)));
    }

    #[test]
    fn running_on_another_hart() {
        let monitor = Arc::new(monitor());
        let eid = monitor.create_enclave(&args(0x9000_0000, 0x1000)).unwrap();

        let hart = monitor.clone();
        thread::spawn(move || hart.run_enclave(eid)).join().unwrap().unwrap();

        assert_eq!(monitor.destroy_enclave(eid), Err(encl(EnclaveError::NotDestroyable)));
        assert!(monitor.create_enclave(&args(0xa000_0000, 0x1000)).is_ok());
    }

    #[test]
    fn one_enclave_per_hart() {
        let monitor = monitor();
        let a = monitor.create_enclave(&args(0x9000_0000, 0x1000)).unwrap();
        let b = monitor.create_enclave(&args(0xa000_0000, 0x1000)).unwrap();

        monitor.run_enclave(a).unwrap();
        assert_eq!(monitor.run_enclave(b), Err(encl(EnclaveError::SbiProhibited)));
        assert_eq!(monitor.state(b), Ok(EnclaveState::Created));

        monitor.stop_enclave(a, StopReason::Interrupt).unwrap();
        monitor.run_enclave(b).unwrap();
        assert_eq!(monitor.resume_enclave(a), Err(encl(EnclaveError::SbiProhibited)));
        assert_eq!(monitor.state(a), Ok(EnclaveState::Interrupted(StopReason::Interrupt)));

        monitor.exit_enclave(b, 0).unwrap();
        monitor.resume_enclave(a).unwrap();
        assert_eq!(monitor.state(a), Ok(EnclaveState::Running));
    }

    #[test]
    fn bad_shared_region_is_an_illegal_argument() {
        let monitor = monitor();
        let before = monitor.pmp_registers_used();
        let mut empty = args(0x9000_0000, 0x1000);
        empty.utm_region.size = 0;
        assert_eq!(monitor.create_enclave(&empty),
                   Err(encl(EnclaveError::IllegalArgument)));

        let mut inside = args(0x9000_0000, 0x1000);
        inside.utm_region.paddr = 0x9000_8000;
        assert_eq!(monitor.create_enclave(&inside),
                   Err(encl(EnclaveError::IllegalArgument)));
        assert_eq!(monitor.pmp_registers_used(), before);
    }

    struct Tampered {
        stale: Arc<AtomicBool>,
    }

    impl Platform for Tampered {
        fn check_freshness(&self, _eid: Eid) -> Result<(), EnclaveError> {
            if self.stale.load(Ordering::SeqCst) {
                Err(EnclaveError::NotFresh)
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn integrity_failure_destroys_enclave() {
        let stale = Arc::new(AtomicBool::new(false));
        let monitor = Monitor::with_platform(Box::new(Tampered{stale: stale.clone()}));
        monitor.init().unwrap();

        let eid = monitor.create_enclave(&args(0x9000_0000, 0x1000)).unwrap();
        monitor.run_enclave(eid).unwrap();
        monitor.stop_enclave(eid, StopReason::Interrupt).unwrap();

        stale.store(true, Ordering::SeqCst);
        assert_eq!(monitor.resume_enclave(eid), Err(encl(EnclaveError::NotFresh)));
        assert_eq!(monitor.state(eid), Err(encl(EnclaveError::InvalidId)));
    }

    #[test]
    fn forced_destroy() {
        let monitor = monitor();
        let before = monitor.pmp_registers_used();
        let eid = monitor.create_enclave(&args(0x9000_0000, 0x1000)).unwrap();
        monitor.run_enclave(eid).unwrap();
        monitor.force_destroy(eid).unwrap();
        assert_eq!(monitor.state(eid), Err(encl(EnclaveError::InvalidId)));
        assert_eq!(monitor.pmp_registers_used(), before);

        // The hart is free again
        let eid = monitor.create_enclave(&args(0x9000_0000, 0x1000)).unwrap();
        monitor.run_enclave(eid).unwrap();
    }
}

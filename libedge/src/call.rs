//! Runtime call numbers used between the enclave runtime and the host
//!
//! The enclave runtime requests host services by trapping with one of these
//! identifiers. Identifiers 1000-1099 are service requests and 1100 onwards is
//! the terminal band. Identifiers between the highest assigned service request
//! and the exit call are reserved.
//
// SPDX-License-Identifier: MIT
// Copyright (C) 2022-2025 VTT Technical Research Centre of Finland Ltd

use core::ops::Range;

use crate::status::{EnclaveError, StatusCode};

/// Identifiers of service requests
pub const SERVICE_BAND: Range<u32> = 1000 .. 1100;

/// First identifier of the terminal band
pub const TERMINAL_BAND_START: u32 = 1100;

/// Number of argument registers carried by a request
pub const REQUEST_ARGS: usize = 5;

/// Runtime call identifiers
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum RuntimeCall {
    /// Generic dispatch of an unidentified request
    Unknown         = 1000,
    /// Call to a handler registered by the host application
    OCall           = 1001,
    /// Copy data out of the untrusted shared memory
    SharedCopy      = 1002,
    /// Request an attestation report from the security monitor
    AttestEnclave   = 1003,
    /// Request a sealing key derived from the enclave measurement
    GetSealingKey   = 1004,
    /// Enclave terminates. The enclave must not be resumed afterwards
    Exit            = 1101,
}

/// Numeric band of a runtime call
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CallBand {
    Service,
    Terminal,
}

impl RuntimeCall {

    /// Every runtime call, in wire order
    pub const ALL: [RuntimeCall; 6] = [
        RuntimeCall::Unknown,
        RuntimeCall::OCall,
        RuntimeCall::SharedCopy,
        RuntimeCall::AttestEnclave,
        RuntimeCall::GetSealingKey,
        RuntimeCall::Exit,
    ];

    /// Decode a call identifier
    ///
    /// Unassigned identifiers, including the reserved gap, are a protocol
    /// violation reported as `EnclaveError::UnknownError`.

    pub fn from_u32(value: u32) -> Result<Self, StatusCode> {
        Self::ALL
            .iter()
            .copied()
            .find(|call| call.as_wire() == value)
            .ok_or(StatusCode::Enclave(EnclaveError::UnknownError))
    }

    /// Wire value of the call
    pub fn as_wire(self) -> u32 {
        return self as u32;
    }

    pub fn band(self) -> CallBand {
        if SERVICE_BAND.contains(&self.as_wire()) {
            CallBand::Service
        } else {
            CallBand::Terminal
        }
    }

    /// True if the enclave may not be resumed after this call
    pub fn is_terminal(self) -> bool {
        self.band() == CallBand::Terminal
    }
}

impl TryFrom<u32> for RuntimeCall {
    type Error = StatusCode;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        RuntimeCall::from_u32(value)
    }
}

/// A runtime call request as issued by the enclave
///
/// Requests follow the runtime system call convention: the call identifier is
/// passed in register a7 and the arguments in registers a0-a4.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Request {
    /// Call identifier
    pub call: RuntimeCall,
    /// Argument registers a0-a4
    pub args: [usize; REQUEST_ARGS],
}

impl Request {

    pub fn new(call: RuntimeCall, args: [usize; REQUEST_ARGS]) -> Self {
        Self{call: call, args: args}
    }

    /// Encode as (a7, [a0 .. a4]) register values
    pub fn registers(&self) -> (usize, [usize; REQUEST_ARGS]) {
        (self.call.as_wire() as usize, self.args)
    }

    /// Decode from trapped register values
    pub fn decode(a7: usize, args: [usize; REQUEST_ARGS]) -> Result<Self, StatusCode> {
        let id = u32::try_from(a7)
            .map_err(|_| StatusCode::Enclave(EnclaveError::UnknownError))?;
        let call = RuntimeCall::from_u32(id)?;
        Ok(Self::new(call, args))
    }
}

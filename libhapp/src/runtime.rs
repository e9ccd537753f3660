//! Interface to the enclave runtime
//!
//! The runtime executes on the hart when the host runs or resumes an enclave
//! and keeps executing until it traps. The host serves the trap and resumes
//! the runtime, which then finds the response in the untrusted shared memory.
//
// SPDX-License-Identifier: MIT
// Copyright (C) 2022-2025 VTT Technical Research Centre of Finland Ltd

use edge::call::{Request, RuntimeCall, REQUEST_ARGS};
use edge::edge::EdgeCall;

use crate::Error;

/// Why the runtime returned control
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Trap {
    /// The runtime needs the host. Details are in the edge call header at the
    /// beginning of the untrusted shared memory
    EdgeCall(Request),
    /// Timer interrupt
    Interrupt,
    /// The runtime terminated with a value
    Exit(u64),
}

/// An enclave runtime
pub trait Runtime {

    /// Execute until the next trap
    ///
    /// # Input
    /// * 'shared' is the untrusted shared memory of the enclave
    fn step(&mut self, shared: &mut [u8]) -> Trap;
}

/// Write an edge call request to the untrusted shared memory
///
/// The payload is placed right after the header.
///
/// # Input
/// * 'shared' is the untrusted shared memory
/// * 'call' is the runtime call
/// * 'arg' is the call specific argument, e.g., the user call identifier
/// * 'payload' is the request payload
///
/// # Return
///
/// The trap to raise, or Error::OutOfMemory if the request does not fit.

pub fn prepare_call(shared:  &mut [u8],
                    call:    RuntimeCall,
                    arg:     u64,
                    payload: &[u8])
                    -> Result<Trap, Error> {

    let end = EdgeCall::SIZE + payload.len();
    if end > shared.len() {
        return Err(Error::OutOfMemory);
    }

    let header = EdgeCall::new(call.as_wire(), arg,
                               EdgeCall::SIZE as u64, payload.len() as u64);
    header.store(shared)?;
    shared[EdgeCall::SIZE .. end].copy_from_slice(payload);
    Ok(Trap::EdgeCall(Request::new(call, [0; REQUEST_ARGS])))
}

/// Edge call notifying the host of termination
///
/// The value travels in the first argument register and is as wide as a
/// register of the hart. Trap::Exit carries a full 64-bit value.
pub fn exit_call(value: usize) -> Trap {
    let mut args = [0; REQUEST_ARGS];
    args[0] = value;
    Trap::EdgeCall(Request::new(RuntimeCall::Exit, args))
}

/// Read the host response to the last edge call
///
/// # Return
///
/// The status value and the response payload
pub fn response(shared: &[u8]) -> Result<(u64, &[u8]), Error> {
    let header = EdgeCall::from_bytes(shared)?;
    let offset = header.ret.offset as usize;
    let size   = header.ret.size as usize;
    if offset > shared.len() || shared.len() - offset < size {
        return Err(Error::BadFormat);
    }

    Ok((header.ret.status, &shared[offset .. offset + size]))
}

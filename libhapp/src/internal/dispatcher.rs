//! Edge call dispatcher
//
// SPDX-License-Identifier: MIT
// Copyright (C) 2022-2025 VTT Technical Research Centre of Finland Ltd

use log::{debug, warn};

use edge::call::RuntimeCall;
use edge::edge::EdgeCall;
use edge::status::{EnclaveError, StatusCode};

use crate::{Error, Status};
use crate::monitor::{Eid, Monitor};
use crate::ocall::{Listener, OCall, MAX_OCALL};

const WORD: usize = core::mem::size_of::<u64>();

fn status(value: Status) -> u64 {
    Status::as_u32(value) as u64
}

fn protocol_error() -> u64 {
    StatusCode::Enclave(EnclaveError::UnknownError).code()
}

pub(crate) struct Dispatcher<'a> {
    /// A table mapping call indetifiers to Listeners
    table: [Option<&'a dyn Listener>; MAX_OCALL as usize]
}

impl <'a>Dispatcher<'a> {

    pub(crate) fn new() -> Self {
        Self{table: [None; MAX_OCALL as usize]}
    }

    /// Serve the edge call in 'shared' on behalf of enclave 'eid'
    ///
    /// # Input
    /// * 'expected' is the call the enclave trapped with. RuntimeCall::Unknown
    ///   lets the header decide.
    ///
    /// # Return
    ///
    /// Ok(()) when the header has been updated with a response. Errors are
    /// reported to the enclave in the header; Err is returned only if there
    /// is no header to write to.

    pub(crate) fn dispatch(&self,
                           monitor:  &Monitor,
                           eid:      Eid,
                           expected: RuntimeCall,
                           shared:   &mut [u8])
                           -> Result<(), Error> {

        let mut edge_call = EdgeCall::from_bytes(shared)?;
        edge_call.ret = Default::default();
        let rv = self.dispatch_internal(monitor, eid, expected, &mut edge_call, shared);
        edge_call.ret.status = rv;
        edge_call.store(shared)
    }

    fn dispatch_internal(&self,
                         monitor:   &Monitor,
                         eid:       Eid,
                         expected:  RuntimeCall,
                         edge_call: &mut EdgeCall,
                         shared:    &mut [u8])
                         -> u64 {

        let cid = match u32::try_from(edge_call.cid)
            .map_err(|_| ())
            .and_then(|cid| RuntimeCall::from_u32(cid).map_err(|_| ())) {
            Ok(cid) => cid,
            Err(_)  => {
                warn!("Enclave {}: unknown edge call {}", eid, edge_call.cid);
                return protocol_error();
            },
        };

        if expected != RuntimeCall::Unknown && expected != cid {
            warn!("Enclave {}: edge call {} does not match trap {}",
                  eid, cid.as_wire(), expected.as_wire());
            return protocol_error();
        }

        let size = shared.len() as u64;
        if edge_call.offset < EdgeCall::SIZE as u64 || edge_call.offset > size {
            return status(Status::BadOffset);
        }

        if size - edge_call.offset < edge_call.size {
            return status(Status::BadOffset);
        }

        debug!("Enclave {}: edge call {:?}", eid, cid);

        let mut ctx = OCall::wrap(edge_call, shared);
        let rv = match cid {
            RuntimeCall::OCall         => self.on_ocall(&mut ctx),
            RuntimeCall::SharedCopy    => on_shared_copy(&mut ctx),
            RuntimeCall::AttestEnclave => {
                let nonce = ctx.request().to_vec();
                match monitor.attest_enclave(eid, &nonce) {
                    Ok(evidence) => status(ctx.respond(evidence.as_bytes())),
                    Err(code)    => code.code(),
                }
            },
            RuntimeCall::GetSealingKey => {
                let ident = ctx.request().to_vec();
                match monitor.get_sealing_key(eid, &ident) {
                    Ok(key)   => status(ctx.respond(&key)),
                    Err(code) => code.code(),
                }
            },
            // Exit never needs the host and generic dispatch has no handler
            RuntimeCall::Exit | RuntimeCall::Unknown => protocol_error(),
        };

        ctx.finalize(rv);
        rv
    }

    fn on_ocall(&self, ctx: &mut OCall) -> u64 {
        let listener = ctx.cid()
            .and_then(|cid| self.table.get(cid as usize).copied().flatten());
        match listener {
            Some(listener) => status(listener.on_ocall(ctx)),
            None           => status(Status::BadCallID),
        }
    }

    pub(crate) fn register_ocall(&mut self,
                                 cid: u32,
                                 cb:  &'a dyn Listener)
                                 -> Result<(), Error> {

        if cid as usize >= self.table.len() {
            return Err(Error::BadArgument);
        }

        self.table[cid as usize] = Some(cb);
        Ok(())
    }
}

/// Copy a range of the shared memory to the response
///
/// The request holds the offset and the length of the range as two little
/// endian words.
fn on_shared_copy(ctx: &mut OCall) -> u64 {
    let request = ctx.request();
    if request.len() != 2 * WORD {
        return status(Status::Error);
    }

    let mut words = [0u64; 2];
    for (word, chunk) in words.iter_mut().zip(request.chunks_exact(WORD)) {
        let mut raw = [0u8; WORD];
        raw.copy_from_slice(chunk);
        *word = u64::from_le_bytes(raw);
    }

    let (offset, length) = (words[0], words[1]);
    let total = ctx.buffer_len() as u64;
    if offset > total || total - offset < length {
        return status(Status::BadOffset);
    }

    let data = ctx.shared(offset as usize, length as usize).to_vec();
    status(ctx.respond(&data))
}

//! OCall API for serving ocalls from the enclave application
//
// SPDX-License-Identifier: MIT
// Copyright (C) 2022-2025 VTT Technical Research Centre of Finland Ltd

use edge::edge::EdgeCall;

use crate::Status;

/// Number of user call identifiers
pub const MAX_OCALL: u32 = 32;

const ALIGN: usize = core::mem::size_of::<u64>();

/// Listener for ocalls from the enclave
pub trait Listener {

    /// This callback is called on each ocall dispatched to the listener
    ///
    /// # Input
    /// * 'ctx' is the call contenxt describing the call
    ///
    /// # Return
    ///
    /// Status value sent to the enclave application

    fn on_ocall(&self, ctx: &mut OCall) -> Status;
}

/// OCall context
///
/// The request payload is where the enclave put it. The response is written
/// right after it in the untrusted shared memory.
pub struct OCall<'a> {
    /// Keystone edge call context
    ctx:     &'a mut EdgeCall,
    /// Untrusted shared memory
    buffer:  &'a mut [u8],
    /// Offset of the response payload
    res_off: usize,
    /// Response payload length in bytes
    res_len: usize,
}

impl<'a> OCall<'a> {

    /// Wrap an edge call as OCall
    ///
    /// The request must have been checked to be within 'buffer'.
    pub(crate) fn wrap(ctx: &'a mut EdgeCall, buffer: &'a mut [u8]) -> Self {
        let end = (ctx.offset + ctx.size) as usize;
        let res_off = core::cmp::min((end + ALIGN - 1) / ALIGN * ALIGN, buffer.len());
        Self{ctx:     ctx,
             buffer:  buffer,
             res_off: res_off,
             res_len: 0}
    }

    /// Get user call identifier
    ///
    /// None if the identifier in the edge call does not fit in 32 bits.
    pub fn cid(&self) -> Option<u32> {
        u32::try_from(self.ctx.arg).ok()
    }

    /// Get request payload as a byte slice
    ///
    /// The slice belongs to the untrusted shared memory
    pub fn request(&self) -> &[u8] {
        let offset = self.ctx.offset as usize;
        &self.buffer[offset .. offset + self.request_length()]
    }

    /// Get request length in bytes
    pub fn request_length(&self) -> usize {
        self.ctx.size as usize
    }

    /// Get mutable byte slice of the respose buffer
    ///
    /// The slice belongs to the untrusted shared memory
    pub fn response(&mut self) -> &mut [u8] {
        &mut self.buffer[self.res_off ..]
    }

    /// Set length of the response payload in bytes
    ///
    /// If not set, payload size is zero bytes
    pub fn response_length(&mut self, length: usize) -> bool {
        if self.res_off + length > self.buffer.len() {
            return false;
        }

        self.res_len = length;
        true
    }

    /// Copy 'data' to the response buffer
    pub fn respond(&mut self, data: &[u8]) -> Status {
        if !self.response_length(data.len()) {
            return Status::ShortBuffer;
        }

        self.response()[.. data.len()].copy_from_slice(data);
        Status::Success
    }

    pub(crate) fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// A range of the whole untrusted shared memory
    pub(crate) fn shared(&self, offset: usize, length: usize) -> &[u8] {
        &self.buffer[offset .. offset + length]
    }

    /// Finalize call response in the edge call header
    pub(crate) fn finalize(&mut self, status: u64) {
        self.ctx.ret.status = status;
        self.ctx.ret.offset = self.res_off as u64;
        self.ctx.ret.size   = self.res_len as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_and_response() {
        let mut buffer = [0u8; 128];
        buffer[EdgeCall::SIZE .. EdgeCall::SIZE + 3].copy_from_slice(b"abc");
        let mut call = EdgeCall::new(1001, 4, EdgeCall::SIZE as u64, 3);

        let mut ctx = OCall::wrap(&mut call, &mut buffer);
        assert_eq!(ctx.cid(), Some(4));
        assert_eq!(ctx.request(), b"abc");
        assert_eq!(ctx.respond(b"hello"), Status::Success);
        assert_eq!(ctx.respond(&[0u8; 128]), Status::ShortBuffer);
        ctx.finalize(0);

        assert_eq!(call.ret.offset, 64);
        assert_eq!(call.ret.size, 5);
        assert_eq!(&buffer[64 .. 69], b"hello");
    }
}

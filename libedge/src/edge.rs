//! Edge call control structure in the untrusted shared memory
//!
//! The enclave writes an `EdgeCall` to the beginning of the untrusted shared
//! memory before trapping to the host. The host reads it, serves the call,
//! fills in the return part and resumes the enclave. Request and response
//! payloads are stored in the same shared memory, after the header.
//
// SPDX-License-Identifier: MIT
// Copyright (C) 2022-2025 VTT Technical Research Centre of Finland Ltd

use crate::Error;

const WORD: usize = core::mem::size_of::<u64>();

/// Return part of an edge call
#[derive(Default, Copy, Clone, Debug, Eq, PartialEq)]
#[repr(C)]
pub struct EdgeReturn {
    /// Call status (`Status` or a monitor `StatusCode` value)
    pub status: u64,
    /// Offset of the response payload from the beginning of the
    /// untrusted shared memory
    pub offset: u64,
    /// Size of the response payload in bytes
    pub size:   u64,
}

/// Edge call header
#[derive(Default, Copy, Clone, Debug, Eq, PartialEq)]
#[repr(C)]
pub struct EdgeCall {
    /// Runtime call identifier
    pub cid:    u64,
    /// Call specific argument, e.g., user call identifier of an ocall
    pub arg:    u64,
    /// Offset of the request payload from the beginning of the
    /// untrusted shared memory
    pub offset: u64,
    /// Size of the request payload in bytes
    pub size:   u64,
    /// Return information written by the host
    pub ret:    EdgeReturn,
}

impl EdgeCall {

    /// Size of the header in bytes
    pub const SIZE: usize = 7 * WORD;

    pub fn new(cid: u32, arg: u64, offset: u64, size: u64) -> Self {
        Self{cid:    cid as u64,
             arg:    arg,
             offset: offset,
             size:   size,
             ret:    EdgeReturn::default()}
    }

    /// Serialize header to raw byte format (little endian)
    pub fn to_bytes(&self) -> [u8; EdgeCall::SIZE] {
        let words = [self.cid, self.arg, self.offset, self.size,
                     self.ret.status, self.ret.offset, self.ret.size];
        let mut out = [0u8; EdgeCall::SIZE];
        for (chunk, word) in out.chunks_exact_mut(WORD).zip(words.iter()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Deserialize header from raw byte format
    ///
    /// Only the first `EdgeCall::SIZE` bytes are read.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < EdgeCall::SIZE {
            return Err(Error::BadFormat);
        }

        let mut words = [0u64; 7];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(WORD)) {
            let mut raw = [0u8; WORD];
            raw.copy_from_slice(chunk);
            *word = u64::from_le_bytes(raw);
        }

        Ok(Self{cid:    words[0],
                arg:    words[1],
                offset: words[2],
                size:   words[3],
                ret:    EdgeReturn{status: words[4],
                                   offset: words[5],
                                   size:   words[6]}})
    }

    /// Write the header to the beginning of 'to'
    pub fn store(&self, to: &mut [u8]) -> Result<(), Error> {
        if to.len() < EdgeCall::SIZE {
            return Err(Error::OutOfMemory);
        }
        to[.. EdgeCall::SIZE].copy_from_slice(&self.to_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        assert_eq!(EdgeCall::SIZE, core::mem::size_of::<EdgeCall>());

        let mut call = EdgeCall::new(1004, 7, EdgeCall::SIZE as u64, 16);
        call.ret.status = 100011;
        let bytes = call.to_bytes();
        // Call identifier is the first word
        assert_eq!(&bytes[.. 8], &1004u64.to_le_bytes());
        assert_eq!(&bytes[32 .. 40], &100011u64.to_le_bytes());
        assert_eq!(EdgeCall::from_bytes(&bytes), Ok(call));
    }

    #[test]
    fn short_buffers() {
        assert_eq!(EdgeCall::from_bytes(&[0u8; 8]), Err(Error::BadFormat));
        let mut small = [0u8; 10];
        assert_eq!(EdgeCall::default().store(&mut small), Err(Error::OutOfMemory));
    }
}

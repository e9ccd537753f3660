//! Error and status values shared by the enclave and host libraries
//
// SPDX-License-Identifier: MIT
// Copyright (C) 2022-2025 VTT Technical Research Centre of Finland Ltd

use core::fmt;

use crate::status::StatusCode;

/// Library level errors
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// An argument was out of range or otherwise malformed
    BadArgument,
    /// The object is not in a state where the operation is allowed
    BadState,
    /// A memory region size is zero or not a multiple of the page size
    InvalidSize,
    /// A memory region would overlap another configured region
    Overlap,
    /// Input could not be parsed
    BadFormat,
    /// Memory or buffer space ran out
    OutOfMemory,
    /// The enclave broke the edge call protocol
    Protocol,
    /// The security monitor rejected the operation
    Monitor(StatusCode),
    /// Operation is not supported
    NotImplemented,
}

impl Error {
    /// Status code reported by the security monitor, if any
    pub fn status_code(&self) -> Option<StatusCode> {
        match *self {
            Error::Monitor(code) => Some(code),
            _                    => None,
        }
    }
}

impl From<StatusCode> for Error {
    fn from(code: StatusCode) -> Self {
        Error::Monitor(code)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Monitor(code) => write!(f, "security monitor error: {}", code),
            other                => fmt::Debug::fmt(other, f),
        }
    }
}

/// Status of a call crossing the enclave boundary
///
/// Carried in the return slot of the shared edge call structure when the host
/// answers an out-call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum Status {
    /// Call completed
    Success       = 0,
    /// Generic failure reported by the handler
    Error         = 1,
    /// No handler is registered for the call identifier
    BadCallID     = 2,
    /// Payload offset or size points outside the shared memory
    BadOffset     = 3,
    /// Response does not fit into the buffer
    ShortBuffer   = 4,
    /// A pointer or length argument is invalid
    BadPointer    = 5,
    /// The other end has stopped serving calls
    Done          = 6,
    /// The call was interrupted
    Interrupted   = 7,
    /// Failure inside the SDK itself
    InternalError = 8,
    /// Unrecognized status value
    Unknown       = 0xffff,
}

impl Status {
    pub fn as_u32(value: Status) -> u32 {
        return value as u32;
    }

    /// Decode a status value received over the boundary
    pub fn from_u32(value: u32) -> Status {
        return match value {
            0 => Status::Success,
            1 => Status::Error,
            2 => Status::BadCallID,
            3 => Status::BadOffset,
            4 => Status::ShortBuffer,
            5 => Status::BadPointer,
            6 => Status::Done,
            7 => Status::Interrupted,
            8 => Status::InternalError,
            _ => Status::Unknown,
        };
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::EnclaveError;

    #[test]
    fn status_values_survive_the_boundary() {
        for status in [Status::Success, Status::Error, Status::BadCallID,
                       Status::BadOffset, Status::ShortBuffer,
                       Status::BadPointer, Status::Done, Status::Interrupted,
                       Status::InternalError] {
            assert_eq!(Status::from_u32(Status::as_u32(status)), status);
        }
        assert_eq!(Status::from_u32(42), Status::Unknown);
    }

    #[test]
    fn monitor_errors_keep_their_code() {
        let error = Error::from(StatusCode::from(EnclaveError::InvalidId));
        assert_eq!(error.status_code().map(|c| c.code()), Some(100001));
        assert_eq!(Error::BadState.status_code(), None);
    }
}

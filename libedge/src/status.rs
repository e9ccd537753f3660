//! Status codes returned by the security monitor
//!
//! The monitor answers every privileged call with a single numeric value.
//! Zero is success. Non-zero values fall into two disjoint bands: enclave
//! lifecycle errors and PMP region management errors. A caller can tell the
//! category of a code from its numeric range alone.
//
// SPDX-License-Identifier: MIT
// Copyright (C) 2022-2025 VTT Technical Research Centre of Finland Ltd

use core::fmt;
use core::ops::RangeInclusive;

/// Wire value of a successful call, shared by both categories
pub const SUCCESS: u64 = 0;

/// First value of the enclave lifecycle band
pub const ENCLAVE_BASE: u64 = 100000;

/// Values reserved for PMP region management errors
pub const PMP_BAND: RangeInclusive<u64> = 100020 ..= 100026;

/// Enclave lifecycle errors
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum EnclaveError {
    UnknownError     = 100000,
    InvalidId        = 100001,
    Interrupted      = 100002,
    PmpFailure       = 100003,
    NotRunnable      = 100004,
    NotDestroyable   = 100005,
    RegionOverlaps   = 100006,
    NotAccessible    = 100007,
    IllegalArgument  = 100008,
    NotRunning       = 100009,
    NotResumable     = 100010,
    /// Not a failure: the enclave stopped to hand an edge call to the host
    EdgeCallHost     = 100011,
    NotInitialized   = 100012,
    NoFreeResource   = 100013,
    SbiProhibited    = 100014,
    IllegalPte       = 100015,
    NotFresh         = 100016,
    Deprecated       = 100099,
    NotImplemented   = 100100,
}

impl EnclaveError {
    /// Every enclave error, in wire order
    pub const ALL: [EnclaveError; 19] = [
        EnclaveError::UnknownError,   EnclaveError::InvalidId,
        EnclaveError::Interrupted,    EnclaveError::PmpFailure,
        EnclaveError::NotRunnable,    EnclaveError::NotDestroyable,
        EnclaveError::RegionOverlaps, EnclaveError::NotAccessible,
        EnclaveError::IllegalArgument, EnclaveError::NotRunning,
        EnclaveError::NotResumable,   EnclaveError::EdgeCallHost,
        EnclaveError::NotInitialized, EnclaveError::NoFreeResource,
        EnclaveError::SbiProhibited,  EnclaveError::IllegalPte,
        EnclaveError::NotFresh,       EnclaveError::Deprecated,
        EnclaveError::NotImplemented,
    ];

    pub fn code(self) -> u64 {
        return self as u32 as u64;
    }

    pub fn from_code(code: u64) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.code() == code)
    }

    fn name(self) -> &'static str {
        match self {
            EnclaveError::UnknownError    => "SBI_ERR_SM_ENCLAVE_UNKNOWN_ERROR",
            EnclaveError::InvalidId       => "SBI_ERR_SM_ENCLAVE_INVALID_ID",
            EnclaveError::Interrupted     => "SBI_ERR_SM_ENCLAVE_INTERRUPTED",
            EnclaveError::PmpFailure      => "SBI_ERR_SM_ENCLAVE_PMP_FAILURE",
            EnclaveError::NotRunnable     => "SBI_ERR_SM_ENCLAVE_NOT_RUNNABLE",
            EnclaveError::NotDestroyable  => "SBI_ERR_SM_ENCLAVE_NOT_DESTROYABLE",
            EnclaveError::RegionOverlaps  => "SBI_ERR_SM_ENCLAVE_REGION_OVERLAPS",
            EnclaveError::NotAccessible   => "SBI_ERR_SM_ENCLAVE_NOT_ACCESSIBLE",
            EnclaveError::IllegalArgument => "SBI_ERR_SM_ENCLAVE_ILLEGAL_ARGUMENT",
            EnclaveError::NotRunning      => "SBI_ERR_SM_ENCLAVE_NOT_RUNNING",
            EnclaveError::NotResumable    => "SBI_ERR_SM_ENCLAVE_NOT_RESUMABLE",
            EnclaveError::EdgeCallHost    => "SBI_ERR_SM_ENCLAVE_EDGE_CALL_HOST",
            EnclaveError::NotInitialized  => "SBI_ERR_SM_ENCLAVE_NOT_INITIALIZED",
            EnclaveError::NoFreeResource  => "SBI_ERR_SM_ENCLAVE_NO_FREE_RESOURCE",
            EnclaveError::SbiProhibited   => "SBI_ERR_SM_ENCLAVE_SBI_PROHIBITED",
            EnclaveError::IllegalPte      => "SBI_ERR_SM_ENCLAVE_ILLEGAL_PTE",
            EnclaveError::NotFresh        => "SBI_ERR_SM_ENCLAVE_NOT_FRESH",
            EnclaveError::Deprecated      => "SBI_ERR_SM_DEPRECATED",
            EnclaveError::NotImplemented  => "SBI_ERR_SM_NOT_IMPLEMENTED",
        }
    }
}

/// PMP region management errors
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum PmpError {
    RegionSizeInvalid         = 100020,
    RegionNotPageGranularity  = 100021,
    RegionNotAligned          = 100022,
    RegionMaxReached          = 100023,
    RegionInvalid             = 100024,
    RegionOverlap             = 100025,
    RegionImpossibleTor       = 100026,
}

impl PmpError {
    /// Every PMP error, in wire order
    pub const ALL: [PmpError; 7] = [
        PmpError::RegionSizeInvalid,
        PmpError::RegionNotPageGranularity,
        PmpError::RegionNotAligned,
        PmpError::RegionMaxReached,
        PmpError::RegionInvalid,
        PmpError::RegionOverlap,
        PmpError::RegionImpossibleTor,
    ];

    pub fn code(self) -> u64 {
        return self as u32 as u64;
    }

    pub fn from_code(code: u64) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.code() == code)
    }

    fn name(self) -> &'static str {
        match self {
            PmpError::RegionSizeInvalid        => "SBI_ERR_SM_PMP_REGION_SIZE_INVALID",
            PmpError::RegionNotPageGranularity => "SBI_ERR_SM_PMP_REGION_NOT_PAGE_GRANULARITY",
            PmpError::RegionNotAligned         => "SBI_ERR_SM_PMP_REGION_NOT_ALIGNED",
            PmpError::RegionMaxReached         => "SBI_ERR_SM_PMP_REGION_MAX_REACHED",
            PmpError::RegionInvalid            => "SBI_ERR_SM_PMP_REGION_INVALID",
            PmpError::RegionOverlap            => "SBI_ERR_SM_PMP_REGION_OVERLAP",
            PmpError::RegionImpossibleTor      => "SBI_ERR_SM_PMP_REGION_IMPOSSIBLE_TOR",
        }
    }
}

/// Category of a status code
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Category {
    /// Enclave lifecycle
    Enclave,
    /// PMP region management
    Pmp,
}

/// What a caller should do after receiving a status code
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Recovery {
    /// Nothing, the call succeeded
    Success,
    /// Not an error: hand control to the host and resume afterwards
    Control,
    /// Resources ran out. Retry after the host reclaims some
    Retry,
    /// The caller violated a precondition
    CallerError,
    /// Integrity violation. The enclave instance must be destroyed
    Fatal,
    /// Anything else
    Other,
}

/// A status code returned by a security monitor call
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum StatusCode {
    Success,
    Enclave(EnclaveError),
    Pmp(PmpError),
}

impl StatusCode {

    /// Numeric value of the code on the wire
    pub fn code(&self) -> u64 {
        match *self {
            StatusCode::Success    => SUCCESS,
            StatusCode::Enclave(e) => e.code(),
            StatusCode::Pmp(e)     => e.code(),
        }
    }

    /// Decode a numeric value returned by the monitor
    ///
    /// Values that are not assigned to any code decode as
    /// `EnclaveError::UnknownError`, so decoding never fails.

    pub fn from_code(code: u64) -> Self {
        if code == SUCCESS {
            return StatusCode::Success;
        }

        if PMP_BAND.contains(&code) {
            if let Some(e) = PmpError::from_code(code) {
                return StatusCode::Pmp(e);
            }
        }

        match EnclaveError::from_code(code) {
            Some(e) => StatusCode::Enclave(e),
            None    => StatusCode::Enclave(EnclaveError::UnknownError),
        }
    }

    /// Category of a raw code, decided by numeric range only
    pub fn category_of(code: u64) -> Category {
        if PMP_BAND.contains(&code) {
            Category::Pmp
        } else {
            Category::Enclave
        }
    }

    pub fn category(&self) -> Category {
        Self::category_of(self.code())
    }

    pub fn is_success(&self) -> bool {
        *self == StatusCode::Success
    }

    /// Convert to a Result, Success mapping to Ok(())
    pub fn into_result(self) -> Result<(), StatusCode> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Classify the code by what the caller should do about it
    pub fn recovery(&self) -> Recovery {
        match *self {
            StatusCode::Success => Recovery::Success,
            StatusCode::Enclave(e) => match e {
                EnclaveError::EdgeCallHost
                    | EnclaveError::Interrupted    => Recovery::Control,
                EnclaveError::NoFreeResource       => Recovery::Retry,
                EnclaveError::NotRunnable
                    | EnclaveError::NotResumable
                    | EnclaveError::NotDestroyable
                    | EnclaveError::InvalidId      => Recovery::CallerError,
                EnclaveError::IllegalPte
                    | EnclaveError::NotFresh       => Recovery::Fatal,
                _                                  => Recovery::Other,
            },
            StatusCode::Pmp(e) => match e {
                PmpError::RegionMaxReached => Recovery::Retry,
                PmpError::RegionOverlap    => Recovery::Fatal,
                _                          => Recovery::Other,
            },
        }
    }
}

impl From<EnclaveError> for StatusCode {
    fn from(e: EnclaveError) -> Self {
        StatusCode::Enclave(e)
    }
}

impl From<PmpError> for StatusCode {
    fn from(e: PmpError) -> Self {
        StatusCode::Pmp(e)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            StatusCode::Success    => "SBI_ERR_SM_ENCLAVE_SUCCESS",
            StatusCode::Enclave(e) => e.name(),
            StatusCode::Pmp(e)     => e.name(),
        };
        write!(f, "{} ({})", name, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_are_pinned() {
        assert_eq!(EnclaveError::UnknownError.code(),   100000);
        assert_eq!(EnclaveError::InvalidId.code(),      100001);
        assert_eq!(EnclaveError::EdgeCallHost.code(),   100011);
        assert_eq!(EnclaveError::NotFresh.code(),       100016);
        assert_eq!(EnclaveError::Deprecated.code(),     100099);
        assert_eq!(EnclaveError::NotImplemented.code(), 100100);
        assert_eq!(PmpError::RegionSizeInvalid.code(),  100020);
        assert_eq!(PmpError::RegionImpossibleTor.code(), 100026);
        assert_eq!(StatusCode::Success.code(), 0);
    }

    #[test]
    fn families_are_disjoint() {
        for e in EnclaveError::ALL {
            assert!(PmpError::from_code(e.code()).is_none());
            assert_eq!(StatusCode::category_of(e.code()), Category::Enclave);
        }

        for p in PmpError::ALL {
            assert!(EnclaveError::from_code(p.code()).is_none());
            assert_eq!(StatusCode::category_of(p.code()), Category::Pmp);
        }

        // Enclave codes are contiguous up to 100016
        for (i, e) in EnclaveError::ALL[.. 17].iter().enumerate() {
            assert_eq!(e.code(), ENCLAVE_BASE + i as u64);
        }
    }

    #[test]
    fn decoding_is_total() {
        for e in EnclaveError::ALL {
            assert_eq!(StatusCode::from_code(e.code()), StatusCode::Enclave(e));
        }
        for p in PmpError::ALL {
            assert_eq!(StatusCode::from_code(p.code()), StatusCode::Pmp(p));
        }
        assert_eq!(StatusCode::from_code(0), StatusCode::Success);
        assert_eq!(StatusCode::from_code(100050),
                   StatusCode::Enclave(EnclaveError::UnknownError));
        assert_eq!(StatusCode::from_code(7),
                   StatusCode::Enclave(EnclaveError::UnknownError));
    }

    #[test]
    fn recovery_classes() {
        let c = |e: EnclaveError| StatusCode::from(e).recovery();
        assert_eq!(c(EnclaveError::NoFreeResource), Recovery::Retry);
        assert_eq!(c(EnclaveError::NotResumable),   Recovery::CallerError);
        assert_eq!(c(EnclaveError::IllegalPte),     Recovery::Fatal);
        assert_eq!(c(EnclaveError::EdgeCallHost),   Recovery::Control);
        assert_eq!(StatusCode::from(PmpError::RegionMaxReached).recovery(),
                   Recovery::Retry);
        assert_eq!(StatusCode::from(PmpError::RegionOverlap).recovery(),
                   Recovery::Fatal);
        assert_eq!(StatusCode::Success.recovery(), Recovery::Success);
    }

    #[test]
    fn into_result() {
        assert_eq!(StatusCode::Success.into_result(), Ok(()));
        let err = StatusCode::from(EnclaveError::InvalidId);
        assert_eq!(err.into_result(), Err(err));
    }
}

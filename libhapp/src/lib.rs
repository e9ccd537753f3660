//! A crate for building Keystone host applications
//!
//! Enclaves are built from memory parameters and runtime images, created by
//! a software model of the Keystone security monitor and run on the calling
//! thread. Edge calls from the enclave are served by the host between runs.
//
// SPDX-License-Identifier: MIT
// Copyright (C) 2022-2025 VTT Technical Research Centre of Finland Ltd

extern crate std;

mod internal;
mod memory;

/* Public interface */
pub mod attestation;
pub mod builder;
pub mod device;
pub mod enclave;
pub mod monitor;
pub mod ocall;
pub mod pmp;
pub mod runtime;

pub use enclave::Enclave      as Enclave;
pub use memory::SharedMemory  as SharedMemory;
pub use ::edge::Status        as Status;
pub use ::edge::Error         as Error;
pub use ::edge::Params        as Params;
pub use ::edge::StatusCode    as StatusCode;

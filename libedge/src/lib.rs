//! A common interface description for the enclave runtime, the host
//! application and the security monitor.
//!
//! Everything in this crate is part of the binary contract between the three
//! parties. Numeric values defined here must never be renumbered.
//
// SPDX-License-Identifier: MIT
// Copyright (C) 2022-2025 VTT Technical Research Centre of Finland Ltd

#![cfg_attr(not(test), no_std)]

extern crate core;

pub mod attestation;
pub mod call;
pub mod edge;
pub mod params;
pub mod status;

mod error;

pub use error::Error;
pub use error::Status;
pub use params::Params;
pub use status::StatusCode;

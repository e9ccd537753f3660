//! Definitions for attestation and sealing parameters
//
// SPDX-License-Identifier: MIT
// Copyright (C) 2022-2025 VTT Technical Research Centre of Finland Ltd


/// Maximum length of caller-specified nonce in bytes
pub const NONCE_MAX_LENGTH: usize = 1024; /* This comes from Keystone */

/// Maximum length of the attestation report in bytes.
pub const REPORT_MAX_LENGTH: usize = 2048; /* This comes from Keystone */

/// Length of the enclave measurement (SHA3-512) in bytes
pub const HASH_LENGTH: usize = 64;

/// Length of a sealing key in bytes
pub const SEALING_KEY_LENGTH: usize = 128;

/// Length of the signature following the sealing key in bytes
pub const SEALING_SIGNATURE_LENGTH: usize = 64;

/// Total length of a sealing key response
pub const SEALING_RESPONSE_LENGTH: usize = SEALING_KEY_LENGTH + SEALING_SIGNATURE_LENGTH;

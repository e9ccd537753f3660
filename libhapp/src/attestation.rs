//! An API for producing and verifying Keystone attestation reports.
//
// SPDX-License-Identifier: MIT
// Copyright (C) 2022-2025 VTT Technical Research Centre of Finland Ltd

use std::fmt;

pub use crate::internal::ed25519::PublicKey;
pub use crate::internal::ed25519::Signature;

pub use edge::attestation::{NONCE_MAX_LENGTH};
pub use edge::attestation::{REPORT_MAX_LENGTH};

use crate::Error;
use crate::internal::ed25519::KeyPair;

/* Attestation report, as passed to the host:
 *
 * -- Enclave report --
 *       64 bytes: integrity hash:
 *        8 bytes: data (nonce) length
 * 0 - 1024 bytes: data (nonce), real size is indicated by data length
 *       64 bytes: signature (hash, data length, data up to data length),
 *                 using SM pubkey
 * -- SM Report --
 *       64 bytes: integrity hash
 *       32 bytes: public key (SM)
 *       64 bytes: signature (hash, public key), using device public key
 * -- Device public key --
 *       32 bytes: public key
 */

const HASH_SIZE: usize = Hash::LENGTH;
const PKEY_SIZE: usize = PublicKey::LENGTH;
const SIGN_SIZE: usize = Signature::LENGTH;
const DLEN_SIZE: usize = std::mem::size_of::<u64>();

const ENC_OFFSET:             usize = 0;
const ENC_HASH_OFFSET:        usize = 0;
const ENC_DATA_LENGTH_OFFSET: usize = ENC_HASH_OFFSET + HASH_SIZE;
const ENC_DATA_OFFSET:        usize = ENC_DATA_LENGTH_OFFSET + DLEN_SIZE;
// const ENC_SIGN_OFFSET depends on DATA_LENGTH
const ENC_MIN_SIZE:           usize = ENC_DATA_OFFSET + SIGN_SIZE;

const SM_HASH_OFFSET: usize = 0;
const SM_PKEY_OFFSET: usize = SM_HASH_OFFSET + HASH_SIZE;
const SM_SIGN_OFFSET: usize = SM_PKEY_OFFSET + PKEY_SIZE;
const SM_TOTAL_SIZE:  usize = SM_SIGN_OFFSET + SIGN_SIZE;

const DEV_PKEY_OFFSET: usize = 0;
const DEV_TOTAL_SIZE:  usize = DEV_PKEY_OFFSET + PKEY_SIZE;

/// Attestation status codes
#[derive(Eq, PartialEq, Debug)]
pub enum AttestationResult {
    // Success
    Success = 0,
    /// The hash of the enclave didn't match given reference metric
    InvalidEnclaveHash,
    /// The user-specified nonce didn't match given reference metric
    InvalidUserData,
    /// The hash of the Secure Monitor didn't match given reference metric
    InvalidSecureMonitorHash,
    /// The key used to sign the Secure Monitor part of the report was incorrect
    InvalidDeviceKey,
    /// The signature of the Secure Monitor part of the report was incorrect
    InvalidSecureMonitorSignature,
    /// The signature of the enclave part of the report was incorrect
    InvalidEnclaveSignature
}

impl fmt::Display for AttestationResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An object representing integrity hash
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Hash([u8; Hash::LENGTH]);

impl Hash {
    pub const LENGTH: usize = edge::attestation::HASH_LENGTH;

    pub(crate) fn wrap(raw: [u8; Hash::LENGTH]) -> Self {
        Hash(raw)
    }

    /// Convert the Hash to a byte array.
    pub fn to_bytes(&self) -> [u8; Hash::LENGTH] {
        return self.0;
    }

    /// Get the Hash as a slice to the byte array.
    pub fn as_bytes<'a>(&'a self) -> &'a [u8; Hash::LENGTH] {
        return &self.0
    }

    /// Create new Hash from a slice of bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Hash, Error> {
        if bytes.len() != Hash::LENGTH {
            return Err(Error::BadFormat);
        }

        let mut raw: [u8; Hash::LENGTH] = [0u8; Hash::LENGTH];
        raw.copy_from_slice(&bytes[.. Hash::LENGTH]);

        return Ok(Hash(raw));
    }
}

/// Reference integrity metrics for a single enclave
pub struct ReferenceValues {
    /// Enclave hash
    enc_hash: Hash,
    /// Security Monitor hash
    sm_hash:  Hash,
    /// Device public key
    dev_pkey: PublicKey,
}

impl ReferenceValues {

    /// Create a new set of reference values
    ///
    /// # Input
    /// * 'enc_hash' is the hash of the enclave
    /// * 'sm_hash' is the hash of the Secure Monitor
    /// * 'dev_pkey' is the public key corresponding to device's private key
    ///
    /// # Return
    ///
    /// A new ReferenceValues object describing expected attestation report.

    pub fn new(enc: &Hash, sm: &Hash, pkey: &PublicKey) -> Self {
        return Self{enc_hash: *enc,
                    sm_hash:  *sm,
                    dev_pkey: *pkey};
    }

    /// Verify if an attestation evidence (report) matches given reference
    /// values
    ///
    /// # Input
    /// * 'evidence' is the attestation evidence to verify
    /// * 'nonce' is the user-specified used in attestation to guarantee
    ///           freshness of the evidence. It should match the nonce sent
    ///           to the enclave to generate the evidence.
    ///
    /// # Return
    ///
    /// A status code describing the result

    pub fn verify(&self, evidence: &Evidence, nonce: &[u8]) -> AttestationResult {

        if evidence.device_public_key() != self.dev_pkey {
            return AttestationResult::InvalidDeviceKey;
        }

        // The security monitor report must be signed with the device key
        let srep = evidence.security_monitor();
        if !self.dev_pkey.verify(srep.report(), &srep.signature()) {
            return AttestationResult::InvalidSecureMonitorSignature;
        }

        if srep.hash() != self.sm_hash {
            return AttestationResult::InvalidSecureMonitorHash;
        }

        // The enclave report must be signed by the security monitor
        let erep = evidence.enclave();
        if !srep.public_key().verify(erep.report(), &erep.signature()) {
            return AttestationResult::InvalidEnclaveSignature;
        }

        if erep.data() != nonce {
            return AttestationResult::InvalidUserData;
        }

        if erep.hash() != self.enc_hash {
            return AttestationResult::InvalidEnclaveHash;
        }

        return AttestationResult::Success;
    }
}

/// Attestation evidence
#[derive(Clone, Debug)]
pub struct Evidence {
    /// Raw attestation report
    raw: Vec<u8>,
    /// Byte offset into the beginning of security monitor report
    soffs: usize,
    /// Byte offset into the beginning of device identifier
    doffs: usize,
}

fn read_le_u64(slice: &[u8]) -> u64 {
    let mut bytes = [0u8; DLEN_SIZE];
    bytes.copy_from_slice(&slice[.. DLEN_SIZE]);
    u64::from_le_bytes(bytes)
}

impl Evidence {

    /// Produce a signed report for an enclave
    ///
    /// # Input
    /// * 'enc_hash' is the measurement of the enclave
    /// * 'nonce' is the caller-specified data included in the report
    /// * 'sm_hash' is the measurement of the security monitor
    /// * 'sm_sign' is the device signature over the security monitor report
    /// * 'sm_key' is the attestation key of the security monitor
    /// * 'dev_pkey' is the public key of the device
    ///
    /// # Return
    ///
    /// The evidence or Error::BadArgument if the nonce is too long

    pub(crate) fn build(enc_hash: &Hash,
                        nonce:    &[u8],
                        sm_hash:  &Hash,
                        sm_sign:  &Signature,
                        sm_key:   &KeyPair,
                        dev_pkey: &PublicKey)
                        -> Result<Self, Error> {

        if nonce.len() > NONCE_MAX_LENGTH {
            return Err(Error::BadArgument);
        }

        let mut raw = Vec::with_capacity(ENC_MIN_SIZE + nonce.len()
                                         + SM_TOTAL_SIZE + DEV_TOTAL_SIZE);
        raw.extend_from_slice(enc_hash.as_bytes());
        raw.extend_from_slice(&(nonce.len() as u64).to_le_bytes());
        raw.extend_from_slice(nonce);
        let signature = sm_key.sign(&raw);
        raw.extend_from_slice(signature.as_bytes());

        raw.extend_from_slice(sm_hash.as_bytes());
        raw.extend_from_slice(sm_key.public_key().as_bytes());
        raw.extend_from_slice(sm_sign.as_bytes());
        raw.extend_from_slice(dev_pkey.as_bytes());

        Self::from_bytes(&raw)
    }

    /// Get enclave part of the report
    pub fn enclave<'a>(&'a self) -> EnclaveReport<'a> {
        return EnclaveReport(&self.raw[ENC_OFFSET .. self.soffs]);
    }

    /// Get Secure Monitor part of the report
    pub fn security_monitor<'a>(&'a self) -> SecurityMonitorReport<'a> {
        return SecurityMonitorReport(&self.raw[self.soffs .. self.doffs]);
    }

    /// Get the public key of the device
    pub fn device_public_key(&self) -> PublicKey {
        let offset = self.doffs + DEV_PKEY_OFFSET;
        let mut raw = [0u8; PKEY_SIZE];
        raw.copy_from_slice(&self.raw[offset .. offset + PKEY_SIZE]);
        PublicKey::from_raw(raw)
    }

    /// Get the Evidence as a slice to the byte array.
    pub fn as_bytes(&self) -> &[u8] {
        return self.raw.as_slice();
    }

    /// Create new Evidence from a slice of bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Evidence, Error> {

        /* Check that the data is at least of the minimum size of the report: */
        let min_length = ENC_MIN_SIZE + SM_TOTAL_SIZE + DEV_TOTAL_SIZE;
        if bytes.len() < min_length {
            return Err(Error::BadFormat);
        }

        /* Extract user data (nonce) length:*/
        let length = read_le_u64(&bytes[ENC_OFFSET + ENC_DATA_LENGTH_OFFSET
                                        ..
                                        ENC_OFFSET + ENC_DATA_OFFSET]) as usize;

        if length > NONCE_MAX_LENGTH {
            return Err(Error::BadFormat);
        }

        /* Final check for data size: */
        if bytes.len() != min_length + length {
            return Err(Error::BadFormat);
        }

        let s_offset = ENC_OFFSET + ENC_MIN_SIZE + length;
        let d_offset = s_offset + SM_TOTAL_SIZE;

        return Ok(Evidence{raw:   bytes.to_vec(),
                           soffs: s_offset,
                           doffs: d_offset});
    }
}

/// The enclave portion of Keystone attestation report
pub struct EnclaveReport<'a>(&'a[u8]);

impl <'a> EnclaveReport<'a> {

    /// Get length of the report data in bytes
    pub fn data_length(&self) -> usize {
        return read_le_u64(&self.0[ENC_DATA_LENGTH_OFFSET
                                   ..
                                   ENC_DATA_OFFSET]) as usize;
    }

    /// Get byte slice containing the report data (nonce)
    pub fn data(&self) -> &[u8] {
        let offset = ENC_DATA_OFFSET;
        let length = self.data_length();
        return &self.0[offset .. offset + length];
    }

    /// Get hash of the enclave
    pub fn hash(&self) -> Hash {
        let mut raw = [0u8; HASH_SIZE];
        raw.copy_from_slice(&self.0[ENC_HASH_OFFSET .. ENC_HASH_OFFSET + HASH_SIZE]);
        return Hash(raw);
    }

    /// Get byte slice containing the signed part of the report
    pub fn report(&self) -> &[u8] {
        let length = ENC_DATA_OFFSET + self.data_length();
        return &self.0[.. length];
    }

    /// Get signature of the report
    ///
    /// The report is signed using Secure Monitor's attestation key
    pub fn signature(&self) -> Signature {
        let offset = ENC_DATA_OFFSET + self.data_length();
        let mut raw = [0u8; SIGN_SIZE];
        raw.copy_from_slice(&self.0[offset .. offset + SIGN_SIZE]);
        return Signature::from_raw(raw);
    }
}

/// The Security Monitor portion of a Keystone attestation report
pub struct SecurityMonitorReport<'a>(&'a[u8]);

impl <'a> SecurityMonitorReport<'a> {

    /// Get hash of the Secure Monitor
    pub fn hash(&self) -> Hash {
        let mut raw = [0u8; HASH_SIZE];
        raw.copy_from_slice(&self.0[SM_HASH_OFFSET .. SM_HASH_OFFSET + HASH_SIZE]);
        return Hash(raw);
    }

    /// Get public portion of the attestation key of the Secure Monitor
    pub fn public_key(&self) -> PublicKey {
        let mut raw = [0u8; PKEY_SIZE];
        raw.copy_from_slice(&self.0[SM_PKEY_OFFSET .. SM_PKEY_OFFSET + PKEY_SIZE]);
        return PublicKey::from_raw(raw);
    }

    /// Get byte slice containing the signed part of the report
    pub fn report(&self) -> &[u8] {
        return &self.0[.. SM_SIGN_OFFSET];
    }

    /// Get signature of the report
    ///
    /// The report is signed using device's attestation key
    pub fn signature(&self) -> Signature {
        let mut raw = [0u8; SIGN_SIZE];
        raw.copy_from_slice(&self.0[SM_SIGN_OFFSET .. SM_SIGN_OFFSET + SIGN_SIZE]);
        return Signature::from_raw(raw);
    }
}

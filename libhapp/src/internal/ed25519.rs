//! A minimalistic implementation of ed25519 with SHA-3 hash.
//!
//! This API aims to mimic that of the other crypto APIs so that it could be
//! changed to some other library. The main reason for having this
//! implementation is that no Rust library for ed25519 with SHA-3 (not SHA-2)
//! could be found. Signing is needed by the security monitor model, which
//! signs attestation reports and sealing keys the same way Keystone does.
//
// SPDX-License-Identifier: MIT
// Copyright (C) 2022-2025 VTT Technical Research Centre of Finland Ltd

use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::edwards::CompressedEdwardsY;
use curve25519_dalek::scalar::Scalar;

use rand::RngCore;

use sha3::Sha3_512;
use sha3::Digest;

use crate::Error;

/// A public key
///
/// Currently only supports ed25519 elliptic curve keys.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PublicKey {
    /// Raw public key
    raw: [u8; PublicKey::LENGTH],
}

impl PublicKey {

    /// Size of a public key in bytes.
    pub const LENGTH: usize = 32;

    /// Convert the public key to a byte array.
    pub fn to_bytes(&self) -> [u8; PublicKey::LENGTH] {
        return self.raw;
    }

    /// Get the public key as slice to the byte array.
    pub fn as_bytes<'a>(&'a self) -> &'a [u8; PublicKey::LENGTH] {
        return &self.raw
    }

    pub(crate) fn from_raw(raw: [u8; PublicKey::LENGTH]) -> Self {
        PublicKey{raw: raw}
    }

    /// Create new PublicKey from a slice of bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<PublicKey, Error> {
        if bytes.len() != PublicKey::LENGTH {
            return Err(Error::BadFormat);
        }

        let mut raw: [u8; PublicKey::LENGTH] = [0u8; PublicKey::LENGTH];
        raw.copy_from_slice(&bytes[.. PublicKey::LENGTH]);

        Ok(PublicKey{raw: raw})
    }

    /// Verify a 'signature' of a 'msg' using a PublicKey
    ///
    /// # Inputs:
    ///
    /// * 'msg' is the signed data
    ///
    /// * 'signature' is the signature to verify.
    ///
    /// # Returns
    ///
    /// Returns 'true' or 'false' depending if the verification succeeds or not

    #[allow(non_snake_case)]
    pub fn verify(&self, msg: &[u8], signature: &Signature) -> bool
    {
        let sig_r = compressed_point_from_bytes(&signature.as_bytes()[.. 32]);
        let sig_s = match scalar_from_bytes(&signature.as_bytes()[32 ..]) {
            Some(s) => s,
            None    => return false,
        };
        let sig_A = match point_from_bytes(&self.as_bytes()[.. 32]) {
            Some(a) => a,
            None    => return false,
        };
        let sig_R = match sig_r.decompress() {
            Some(x) => x,
            None    => return false,
        };

        if sig_R.is_small_order() || sig_A.is_small_order() {
            return false;
        }

        let mut h = Sha3_512::new();
        h.update(sig_r.as_bytes());
        h.update(self.as_bytes());
        h.update(&msg);

        let k = Scalar::from_hash(h);
        let R = EdwardsPoint::vartime_double_scalar_mul_basepoint(&k, &(-sig_A), &sig_s);

        return R == sig_R;
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
/// An ed25519 signature
pub struct Signature {
    /// Raw signature
    raw: [u8; Signature::LENGTH],
}

impl Signature {

    /// Size of a signature in bytes.
    pub const LENGTH: usize = 64;

    /// Convert the Signature to a byte array.
    pub fn to_bytes(&self) -> [u8; Signature::LENGTH] {
        return self.raw;
    }

    /// Get the Signature as a slice to the byte array.
    pub fn as_bytes<'a>(&'a self) -> &'a [u8; Signature::LENGTH] {
        return &self.raw
    }

    pub(crate) fn from_raw(raw: [u8; Signature::LENGTH]) -> Self {
        Signature{raw: raw}
    }

    /// Create new Signature from a slice of bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Signature, Error> {
        if bytes.len() != Signature::LENGTH {
            return Err(Error::BadFormat);
        }

        let mut raw: [u8; Signature::LENGTH] = [0u8; Signature::LENGTH];
        raw.copy_from_slice(&bytes[.. Signature::LENGTH]);

        Ok(Signature{raw: raw})
    }
}

/// An ed25519 signing key and its public key
pub(crate) struct KeyPair {
    /// Clamped secret scalar
    secret: Scalar,
    /// Second half of the expanded seed, used to derive nonces
    prefix: [u8; 32],
    /// Public key
    public: PublicKey,
}

impl KeyPair {

    /// Generate a key pair from fresh randomness
    pub(crate) fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    /// Derive a key pair deterministically from a 32-byte seed
    pub(crate) fn from_seed(seed: &[u8; 32]) -> Self {
        let expanded = Sha3_512::digest(seed);

        let mut lower = [0u8; 32];
        let mut prefix = [0u8; 32];
        lower.copy_from_slice(&expanded[.. 32]);
        prefix.copy_from_slice(&expanded[32 ..]);

        lower[0]  &= 248;
        lower[31] &= 127;
        lower[31] |= 64;

        let secret = Scalar::from_bits(lower);
        let point  = &secret * &ED25519_BASEPOINT_TABLE;
        let public = PublicKey{raw: point.compress().to_bytes()};

        Self{secret: secret, prefix: prefix, public: public}
    }

    pub(crate) fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Sign 'msg'
    #[allow(non_snake_case)]
    pub(crate) fn sign(&self, msg: &[u8]) -> Signature {
        let mut h = Sha3_512::new();
        h.update(&self.prefix);
        h.update(msg);
        let r = Scalar::from_hash(h);
        let R = (&r * &ED25519_BASEPOINT_TABLE).compress();

        let mut h = Sha3_512::new();
        h.update(R.as_bytes());
        h.update(self.public.as_bytes());
        h.update(msg);
        let k = Scalar::from_hash(h);
        let s = &(&k * &self.secret) + &r;

        let mut raw = [0u8; Signature::LENGTH];
        raw[.. 32].copy_from_slice(R.as_bytes());
        raw[32 ..].copy_from_slice(s.as_bytes());
        Signature{raw: raw}
    }
}

fn compressed_point_from_bytes(bytes: &[u8]) -> CompressedEdwardsY {
    let mut raw = [0u8; 32];
    raw.copy_from_slice(&bytes[.. 32]);
    CompressedEdwardsY(raw)
}

fn point_from_bytes(bytes: &[u8]) -> Option<EdwardsPoint> {
    compressed_point_from_bytes(&bytes[.. 32]).decompress()
}

fn scalar_from_bytes(bytes: &[u8]) -> Option<Scalar> {
    if bytes[31] & 224 != 0 {
        return None;
    }

    let mut raw = [0u8; 32];
    raw.copy_from_slice(&bytes[.. 32]);
    Some(Scalar::from_bits(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let pair = KeyPair::from_seed(&[7u8; 32]);
        let sig  = pair.sign(b"enclave report");
        assert!(pair.public_key().verify(b"enclave report", &sig));
        assert!(!pair.public_key().verify(b"enclave rep0rt", &sig));

        let other = KeyPair::generate();
        assert!(!other.public_key().verify(b"enclave report", &sig));
    }

    #[test]
    fn deterministic_signatures() {
        let a = KeyPair::from_seed(&[1u8; 32]);
        let b = KeyPair::from_seed(&[1u8; 32]);
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.sign(b"x"), b.sign(b"x"));
    }

    #[test]
    fn malformed_inputs() {
        assert_eq!(PublicKey::from_bytes(&[0u8; 31]), Err(Error::BadFormat));
        assert_eq!(Signature::from_bytes(&[0u8; 65]), Err(Error::BadFormat));

        let pair = KeyPair::from_seed(&[3u8; 32]);
        let mut raw = pair.sign(b"m").to_bytes();
        raw[63] |= 0xe0;
        let bad = Signature::from_bytes(&raw).unwrap();
        assert!(!pair.public_key().verify(b"m", &bad));
    }
}

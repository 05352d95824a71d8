//! Package signature capabilities.
//!
//! The engine signs the serialized header + metadata + component table
//! and verifies it at load time. Key management lives outside the core;
//! these traits are the whole surface the engine consumes. The shipped
//! implementations cover `SignMethod::Rsa` (PKCS#1 v1.5 over SHA-256)
//! and the degenerate `SignMethod::None` pair.

use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::info::SignMethod;
use crate::{Error, Result};

/// Signing capability supplied to `create_package`.
pub trait PkgSigner {
    fn method(&self) -> SignMethod;
    /// Exact length of the signature this signer emits. Recorded in the
    /// package header before the signature itself is produced.
    fn signature_len(&self) -> usize;
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Verification capability supplied to `load_package`.
pub trait PkgVerifier {
    fn method(&self) -> SignMethod;
    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()>;
}

pub struct RsaSigner {
    key: RsaPrivateKey,
}

impl RsaSigner {
    pub fn new(key: RsaPrivateKey) -> Self {
        Self { key }
    }
}

impl PkgSigner for RsaSigner {
    fn method(&self) -> SignMethod {
        SignMethod::Rsa
    }

    fn signature_len(&self) -> usize {
        self.key.size()
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let hashed = Sha256::digest(data);
        self.key
            .sign(Pkcs1v15Sign::new::<Sha256>(), &hashed)
            .map_err(|err| Error::SignatureInvalid(format!("rsa sign failed: {err}")))
    }
}

pub struct RsaVerifier {
    key: RsaPublicKey,
}

impl RsaVerifier {
    pub fn new(key: RsaPublicKey) -> Self {
        Self { key }
    }
}

impl PkgVerifier for RsaVerifier {
    fn method(&self) -> SignMethod {
        SignMethod::Rsa
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        let hashed = Sha256::digest(data);
        self.key
            .verify(Pkcs1v15Sign::new::<Sha256>(), &hashed, signature)
            .map_err(|_| Error::SignatureInvalid("rsa verification failed".to_string()))
    }
}

/// Signer for unsigned packages; emits an empty signature block.
pub struct NullSigner;

impl PkgSigner for NullSigner {
    fn method(&self) -> SignMethod {
        SignMethod::None
    }

    fn signature_len(&self) -> usize {
        0
    }

    fn sign(&self, _data: &[u8]) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Verifier counterpart of `NullSigner`. Accepts only an empty signature
/// block; a package that claims any other sign method never reaches it.
pub struct NullVerifier;

impl PkgVerifier for NullVerifier {
    fn method(&self) -> SignMethod {
        SignMethod::None
    }

    fn verify(&self, _data: &[u8], signature: &[u8]) -> Result<()> {
        if signature.is_empty() {
            Ok(())
        } else {
            Err(Error::SignatureInvalid(
                "unsigned package carries a signature block".to_string(),
            ))
        }
    }
}

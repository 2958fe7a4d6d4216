//! Password hashing and verification using Argon2id.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("invalid Argon2 parameters: {0}")]
    InvalidParams(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),

    /// The stored record cannot be interpreted. This is a data integrity
    /// problem, not a wrong password.
    #[error("stored password hash is corrupt: {0}")]
    CorruptRecord(String),
}

/// A stored password hash in PHC string format.
///
/// The string carries the algorithm tag, cost parameters, salt and digest, so
/// a record stays verifiable after the hasher's defaults change.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHashRecord(String);

impl PasswordHashRecord {
    /// Wrap a value read back from storage. Validity is checked on verify.
    pub fn from_stored(phc: impl Into<String>) -> Self {
        Self(phc.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for PasswordHashRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("PasswordHashRecord(<redacted>)")
    }
}

/// One-way, salted password hasher.
///
/// Hashing is CPU-bound; async callers should run it on a blocking
/// thread.
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default()),
        }
    }
}

impl CredentialHasher {
    /// Hasher with the Argon2 crate's recommended defaults (19 MiB, 2 passes).
    pub fn new() -> Self {
        Self::default()
    }

    /// Hasher with explicit cost parameters.
    pub fn with_params(
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> Result<Self, CredentialError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| CredentialError::InvalidParams(e.to_string()))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash `plaintext` with a fresh random salt.
    pub fn hash(&self, plaintext: &str) -> Result<PasswordHashRecord, CredentialError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| CredentialError::Hashing(e.to_string()))?;

        Ok(PasswordHashRecord(hash.to_string()))
    }

    /// Check `plaintext` against a stored record.
    ///
    /// The digest comparison inside Argon2 is constant-time. A record that
    /// does not parse, or names an unsupported algorithm, is reported as
    /// [`CredentialError::CorruptRecord`] rather than as a mismatch.
    pub fn verify(
        &self,
        plaintext: &str,
        record: &PasswordHashRecord,
    ) -> Result<bool, CredentialError> {
        let parsed = PasswordHash::new(record.as_str())
            .map_err(|e| CredentialError::CorruptRecord(e.to_string()))?;

        match self.argon2.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(CredentialError::CorruptRecord(e.to_string())),
        }
    }
}

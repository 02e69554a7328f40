//! Stored password records and their verification.
//!
//! Two families are accepted:
//!
//! - scrypt records, `scrypt$<salt>$<key>` or the legacy `<salt>:<key>`,
//!   both hex-encoded. The salt text itself is fed to scrypt, the cost is
//!   fixed at `N = 2^14, r = 8, p = 1` and the derived key is as long as
//!   the stored one.
//! - PHC strings produced by Argon2 (`$argon2id$...`).

use crate::{AuthError, Result};
use argon2::{
    password_hash::{self, PasswordHash, PasswordVerifier},
    Argon2,
};
use rand::RngCore;

/// scrypt `log2(N)`.
pub const SCRYPT_LOG_N: u8 = 14;
/// scrypt block size.
pub const SCRYPT_R: u32 = 8;
/// scrypt parallelism.
pub const SCRYPT_P: u32 = 1;
/// Salt length, in bytes, for newly hashed passwords.
pub const SALT_LEN: usize = 16;
/// Derived key length, in bytes, for newly hashed passwords.
pub const KEY_LEN: usize = 64;

const SCRYPT_PREFIX: &str = "scrypt$";

/// A well-formed record no secret is expected to match. Checked in place of
/// a missing account so unknown identifiers cost one full derivation.
pub const DUMMY_RECORD: &str = concat!(
    "scrypt$",
    "7f3a9c2e5b1d4068a2c4e6f8091b3d5f",
    "$",
    "6a1f0c9e8d7b5a4f3e2d1c0b9a8f7e6d5c4b3a29180f7e6d5c4b3a2918070615",
    "f4e3d2c1b0a9f8e7d6c5b4a3928170f6e5d4c3b2a1908f7e6d5c4b3a2f1e0d9c",
);

/// Compares two byte strings without exiting early.
///
/// Every byte of the longer input is visited and a length mismatch is folded
/// into the accumulator, so timing depends only on the longer length.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let len = a.len().max(b.len());
    let mut diff = a.len() ^ b.len();
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= usize::from(x ^ y);
    }
    diff == 0
}

/// A parsed password record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordRecord<'a> {
    /// scrypt record: hex salt text and decoded key.
    Scrypt {
        /// Salt as stored (hex text).
        salt: &'a str,
        /// Expected derived key.
        key: Vec<u8>,
    },
    /// Argon2 PHC string.
    Argon2(&'a str),
}

impl<'a> PasswordRecord<'a> {
    /// Parses a stored record.
    pub fn parse(stored: &'a str) -> Result<Self> {
        if stored.starts_with("$argon2") {
            return Ok(Self::Argon2(stored));
        }

        let (salt, key) = match stored.strip_prefix(SCRYPT_PREFIX) {
            Some(rest) => rest.split_once('$'),
            None => stored.split_once(':'),
        }
        .ok_or_else(|| AuthError::InvalidHash("unrecognised record format".into()))?;

        if salt.is_empty() || !salt.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AuthError::InvalidHash("salt is not hex".into()));
        }
        let key = hex::decode(key).map_err(|e| AuthError::InvalidHash(e.to_string()))?;
        if key.is_empty() {
            return Err(AuthError::InvalidHash("empty derived key".into()));
        }
        Ok(Self::Scrypt { salt, key })
    }
}

fn derive(secret: &str, salt: &str, len: usize) -> Result<Vec<u8>> {
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, len)
        .map_err(|e| AuthError::InvalidHash(e.to_string()))?;
    let mut out = vec![0u8; len];
    scrypt::scrypt(secret.as_bytes(), salt.as_bytes(), &params, &mut out)
        .map_err(|e| AuthError::Hashing(e.to_string()))?;
    Ok(out)
}

/// Hashes `secret` into a new `scrypt$<salt>$<key>` record.
pub fn hash_password(secret: &str) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let salt = hex::encode(salt);
    let key = derive(secret, &salt, KEY_LEN)?;
    Ok(format!("{}{}${}", SCRYPT_PREFIX, salt, hex::encode(key)))
}

/// Checks `secret` against a stored record.
///
/// `Ok(false)` means the password is wrong; errors mean the record could
/// not be used at all.
pub fn verify_password(secret: &str, stored: &str) -> Result<bool> {
    match PasswordRecord::parse(stored)? {
        PasswordRecord::Scrypt { salt, key } => {
            let derived = derive(secret, salt, key.len())?;
            Ok(constant_time_eq(&derived, &key))
        }
        PasswordRecord::Argon2(phc) => {
            let parsed =
                PasswordHash::new(phc).map_err(|e| AuthError::InvalidHash(e.to_string()))?;
            match Argon2::default().verify_password(secret.as_bytes(), &parsed) {
                Ok(()) => Ok(true),
                Err(password_hash::Error::Password) => Ok(false),
                Err(e) => Err(AuthError::Hashing(e.to_string())),
            }
        }
    }
}

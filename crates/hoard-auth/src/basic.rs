//! `Authorization: Basic` header decoding.

use crate::{AuthError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;

/// Identifier and secret carried by a Basic authorization header.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    /// Account identifier (the username).
    pub identifier: String,
    /// The password or token.
    pub secret: String,
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("identifier", &self.identifier)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl BasicCredentials {
    /// Decodes a header value of the form `Basic <base64(id:secret)>`.
    ///
    /// The scheme is matched case-insensitively. The decoded text is split
    /// on the first `:`, so secrets may contain colons. Both halves must be
    /// non-empty.
    pub fn parse(header: &str) -> Result<Self> {
        let header = header.trim();
        let (scheme, encoded) = header
            .split_once(' ')
            .ok_or_else(|| AuthError::InvalidHeader("missing scheme".into()))?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return Err(AuthError::InvalidHeader(format!(
                "unsupported scheme: {}",
                scheme
            )));
        }

        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| AuthError::InvalidHeader(e.to_string()))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| AuthError::InvalidHeader("credentials are not UTF-8".into()))?;

        let (identifier, secret) = decoded
            .split_once(':')
            .ok_or_else(|| AuthError::InvalidHeader("missing ':' separator".into()))?;
        if identifier.is_empty() || secret.is_empty() {
            return Err(AuthError::InvalidHeader("empty identifier or secret".into()));
        }

        Ok(Self {
            identifier: identifier.to_string(),
            secret: secret.to_string(),
        })
    }

    /// Encodes the credentials back into a header value.
    pub fn to_header(&self) -> String {
        let raw = format!("{}:{}", self.identifier, self.secret);
        format!("Basic {}", STANDARD.encode(raw))
    }
}

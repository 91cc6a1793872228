//! Encoded token wire format
//!
//! An encoded token is four standard, padded base64 segments joined by `.`:
//!
//! ```text
//! <salt>.<iv>.<tag>.<ciphertext>
//! ```
//!
//! The token carries no version discriminator. The KDF and cipher parameters
//! are fixed, so any change to them needs a new format rather than a new
//! parameter value.

use crate::cipher::{EncryptionOutput, TokenError};
use crate::types::{Ciphertext, Iv, Salt, Tag};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between token segments
pub const SEGMENT_SEPARATOR: char = '.';

/// Number of segments in an encoded token
pub const SEGMENT_COUNT: usize = 4;

/// A validated `salt.iv.tag.ciphertext` token
///
/// Only constructible from an [`EncryptionOutput`] or by parsing a string
/// whose segments decode to the right lengths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EncodedToken(String);

impl EncodedToken {
    /// Validate `token` without decrypting it
    pub fn parse(token: &str) -> Result<Self, TokenError> {
        EncryptionOutput::decode(token)?;
        Ok(EncodedToken(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Decode into its binary components
    pub fn decode(&self) -> Result<EncryptionOutput, TokenError> {
        EncryptionOutput::decode(&self.0)
    }
}

impl fmt::Display for EncodedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EncodedToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for EncodedToken {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EncodedToken {
    type Error = TokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        EncryptionOutput::decode(&value)?;
        Ok(EncodedToken(value))
    }
}

impl From<EncodedToken> for String {
    fn from(token: EncodedToken) -> Self {
        token.0
    }
}

fn decode_segment(segment: &'static str, encoded: &str) -> Result<Vec<u8>, TokenError> {
    BASE64
        .decode(encoded)
        .map_err(|source| TokenError::Base64 { segment, source })
}

impl EncryptionOutput {
    /// Encode as `salt.iv.tag.ciphertext`
    pub fn encode(&self) -> EncodedToken {
        let encoded = [
            BASE64.encode(self.salt().as_slice()),
            BASE64.encode(self.iv().as_slice()),
            BASE64.encode(self.tag().as_slice()),
            BASE64.encode(self.ciphertext().as_slice()),
        ]
        .join(".");
        EncodedToken(encoded)
    }

    /// Strictly decode a `salt.iv.tag.ciphertext` string
    ///
    /// Fails on a wrong segment count or invalid base64 (decoding errors) and
    /// on a salt, IV or tag of the wrong length (validation errors).
    pub fn decode(encoded: &str) -> Result<Self, TokenError> {
        let parts: Vec<&str> = encoded.split(SEGMENT_SEPARATOR).collect();
        let &[salt, iv, tag, ciphertext] = parts.as_slice() else {
            return Err(TokenError::SegmentCount { found: parts.len() });
        };

        let salt = Salt::from_slice(&decode_segment("salt", salt)?)
            .map_err(TokenError::Validation)?;
        let iv = Iv::from_slice(&decode_segment("IV", iv)?).map_err(TokenError::Validation)?;
        let tag = Tag::from_slice(&decode_segment("tag", tag)?).map_err(TokenError::Validation)?;
        let ciphertext = Ciphertext::new(decode_segment("ciphertext", ciphertext)?);

        Ok(EncryptionOutput::new(salt, iv, tag, ciphertext))
    }
}

//! Byte-role newtypes for the token scheme
//!
//! Salts, IVs, tags, keys and payloads all share the same representation but
//! must never be interchanged. Each role gets its own type whose constructor
//! is the only validated entry point. Key material and plaintext zeroize on
//! drop.

use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// PBKDF2 salt length (128 bits)
pub const SALT_LENGTH: usize = 16;

/// AES-GCM IV length (96 bits)
pub const IV_LENGTH: usize = 12;

/// AES-GCM authentication tag length (128 bits)
pub const TAG_LENGTH: usize = 16;

/// AES-256 key length (256 bits)
pub const KEY_LENGTH: usize = 32;

/// Byte-role construction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ByteRoleError {
    #[error("Invalid {role} length: expected {expected}, got {got}")]
    InvalidLength {
        role: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Passphrase must not be empty")]
    EmptyPassphrase,
}

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr, $role:literal) => {
        $(#[$meta])*
        pub struct $name(pub(crate) [u8; $len]);

        impl $name {
            /// Length of this role in bytes
            pub const LENGTH: usize = $len;

            /// Create from a slice, rejecting any other length
            pub fn from_slice(bytes: &[u8]) -> Result<Self, ByteRoleError> {
                let array: [u8; $len] =
                    bytes.try_into().map_err(|_| ByteRoleError::InvalidLength {
                        role: $role,
                        expected: $len,
                        got: bytes.len(),
                    })?;
                Ok(Self(array))
            }

            pub fn as_slice(&self) -> &[u8] {
                &self.0
            }

            #[allow(dead_code)]
            pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
                &mut self.0
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = ByteRoleError;

            fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
                Self::from_slice(bytes)
            }
        }

        impl TryFrom<Vec<u8>> for $name {
            type Error = ByteRoleError;

            fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
                Self::from_slice(&bytes)
            }
        }
    };
}

fixed_bytes!(
    /// PBKDF2 salt (16 bytes)
    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    Salt,
    SALT_LENGTH,
    "salt"
);

fixed_bytes!(
    /// AES-GCM initialization vector (12 bytes)
    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    Iv,
    IV_LENGTH,
    "IV"
);

fixed_bytes!(
    /// AES-GCM authentication tag (16 bytes)
    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    Tag,
    TAG_LENGTH,
    "tag"
);

fixed_bytes!(
    /// AES-256 key derived from a passphrase (32 bytes), zeroized on drop
    #[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
    SymmetricKey,
    KEY_LENGTH,
    "symmetric key"
);

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey([REDACTED])")
    }
}

/// Passphrase bytes (the embed secret), zeroized on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Passphrase(Vec<u8>);

impl Passphrase {
    /// Create a passphrase; any non-empty byte string is accepted
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, ByteRoleError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(ByteRoleError::EmptyPassphrase);
        }
        Ok(Passphrase(bytes))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Passphrase([REDACTED])")
    }
}

/// AES-GCM ciphertext without the tag
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ciphertext(Vec<u8>);

impl Ciphertext {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Ciphertext(bytes.into())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Recovered or to-be-encrypted secret, zeroized on drop
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct Plaintext(Vec<u8>);

impl Plaintext {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Plaintext(bytes.into())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }

    /// Take the bytes out, leaving an empty buffer behind to be zeroized
    pub fn into_vec(mut self) -> Vec<u8> {
        std::mem::take(&mut self.0)
    }
}

impl std::fmt::Debug for Plaintext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Plaintext([REDACTED; {}])", self.0.len())
    }
}

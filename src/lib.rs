//! Token encryption and signed URLs for embedded dashboards
//!
//! Two independent primitives:
//!
//! - [`TokenCipher`]: PBKDF2-HMAC-SHA256 + AES-256-GCM encryption of a secret
//!   (typically an OAuth token) under the embed secret, encoded as
//!   `salt.iv.tag.ciphertext` in standard base64.
//! - [`UrlSigner`]: HMAC-SHA256 signing of embed parameters into a URL whose
//!   nonce and timestamp make every signature unique. [`SignedUrl`] verifies
//!   them on the relying side.
//!
//! # Example
//!
//! ```no_run
//! # fn example() -> Result<(), embed_crypto::EmbedError> {
//! let token = embed_crypto::encrypt("my fake embed secret", "hello, world!")?;
//! let secret = embed_crypto::decrypt("my fake embed secret", token.as_str())?;
//! assert_eq!(secret, "hello, world!");
//! # Ok(())
//! # }
//! ```

pub mod cipher;
pub mod config;
pub mod error;
pub mod hmac;
pub mod kdf;
pub mod prelude;
pub mod signer;
pub mod token;
pub mod types;
pub mod verify;

pub use cipher::{
    decrypt, decrypt_bytes, encrypt, encrypt_bytes, EncryptionOutput, TokenCipher, TokenError,
};
pub use config::{ConfigError, EmbedConfig};
pub use error::{EmbedError, ErrorKind};
pub use signer::{sign, EmbedParams, EmbedParamsBuilder, SignError, SigningContext, UrlSigner};
pub use token::EncodedToken;
pub use types::{ByteRoleError, Ciphertext, Iv, Passphrase, Plaintext, Salt, SymmetricKey, Tag};
pub use verify::{verify_signed_url, SignedUrl};

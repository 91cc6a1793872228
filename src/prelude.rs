//! Prelude
//!
//! ```rust
//! use embed_crypto::prelude::*;
//!
//! # fn example() -> Result<(), EmbedError> {
//! let config = EmbedConfig::new("embed secret", "client-id");
//! let signer = UrlSigner::new(&config)?;
//! let params = EmbedParams::builder()
//!     .email("user@example.com")
//!     .external_user_team("team")
//!     .external_user_id("42")
//!     .build()?;
//! let url = signer.sign_url("https://app.example.com/embed", &params)?;
//! SignedUrl::parse(&url)?.verify("embed secret")?;
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub use crate::cipher::{EncryptionOutput, TokenCipher, TokenError};
pub use crate::config::{ConfigError, EmbedConfig};
pub use crate::error::{EmbedError, ErrorKind};
pub use crate::signer::{EmbedParams, SignError, SigningContext, UrlSigner};
pub use crate::token::EncodedToken;
pub use crate::verify::SignedUrl;

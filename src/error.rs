//! Unified error type for the embed-crypto public API
//!
//! Internal modules keep their domain-specific errors for precise handling.
//! This unified type provides a single error for SDK consumers that mix token
//! encryption, URL signing and configuration loading.
//!
//! # Example
//!
//! ```no_run
//! use embed_crypto::{EmbedError, ErrorKind};
//!
//! fn load_secret(embed_secret: &str, token: &str) -> Result<String, EmbedError> {
//!     Ok(embed_crypto::decrypt(embed_secret, token)?)
//! }
//!
//! match load_secret("embed secret", "not-a-token") {
//!     Err(e) if e.kind() == ErrorKind::Decoding => eprintln!("bad token: {e}"),
//!     _ => {}
//! }
//! ```

use thiserror::Error;

/// Error taxonomy shared by every operation
///
/// - **Configuration**: the embed secret, client id or base URL is absent or unusable
/// - **Decoding**: input is not in the expected wire format (segment count, base64, hex)
/// - **Validation**: input is well formed but has the wrong shape or value
/// - **Authentication**: an AEAD tag or HMAC signature did not verify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Decoding,
    Validation,
    Authentication,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Decoding => "decoding",
            ErrorKind::Validation => "validation",
            ErrorKind::Authentication => "authentication",
        };
        f.write_str(name)
    }
}

/// Unified error type for all embed-crypto operations
#[derive(Debug, Error)]
pub enum EmbedError {
    /// Token encryption or decryption error
    #[error("Token error: {0}")]
    Token(#[from] crate::cipher::TokenError),

    /// URL signing or verification error
    #[error("Signing error: {0}")]
    Sign(#[from] crate::signer::SignError),

    /// Configuration loading error
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl EmbedError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Token(e) => e.kind(),
            Self::Sign(e) => e.kind(),
            Self::Config(_) => ErrorKind::Configuration,
        }
    }

    /// Always false: the same inputs fail the same way every time.
    ///
    /// Retrying only makes sense with different inputs, such as a freshly
    /// issued token.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Returns a suggestion for resolving this error
    pub fn suggestion(&self) -> Option<&str> {
        match self.kind() {
            ErrorKind::Configuration => {
                Some("Set EMBED_SECRET and EMBED_CLIENT_ID, or provide them in the config file")
            }
            ErrorKind::Decoding => {
                Some("Pass the token or URL exactly as it was issued, without re-encoding it")
            }
            ErrorKind::Authentication => {
                Some("Check that the same embed secret was used to produce this value")
            }
            ErrorKind::Validation => None,
        }
    }

    /// Returns true if this is a missing or invalid configuration error
    pub fn is_configuration_error(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    /// Returns true if a tag or signature failed to verify
    pub fn is_authentication_error(&self) -> bool {
        self.kind() == ErrorKind::Authentication
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::TokenError;
    use crate::signer::SignError;

    #[test]
    fn test_error_categories() {
        let auth_err = EmbedError::Token(TokenError::Authentication);
        assert_eq!(auth_err.kind(), ErrorKind::Authentication);
        assert!(auth_err.is_authentication_error());
        assert!(!auth_err.is_configuration_error());

        let config_err = EmbedError::Sign(SignError::MissingClientId);
        assert!(config_err.is_configuration_error());

        let decode_err = EmbedError::Token(TokenError::SegmentCount { found: 3 });
        assert_eq!(decode_err.kind(), ErrorKind::Decoding);
        assert!(!decode_err.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = EmbedError::Token(TokenError::Authentication);
        let msg = err.to_string();
        assert!(msg.contains("Token error"));
        assert!(err.suggestion().is_some());
    }
}

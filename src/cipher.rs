//! Token encryption
//!
//! AES-256-GCM under a key stretched from the embed secret with PBKDF2. Each
//! encryption draws a fresh salt and IV; the tag is kept detached so it can be
//! carried as its own token segment.

use crate::error::ErrorKind;
use crate::kdf::{derive_key_with_iterations, generate_salt, PBKDF2_ITERATIONS};
use crate::token::EncodedToken;
use crate::types::{ByteRoleError, Ciphertext, Iv, Passphrase, Plaintext, Salt, SymmetricKey, Tag};
use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Embed secret is missing")]
    MissingEmbedSecret,

    #[error("Expected 4 components in encoded token, found {found}")]
    SegmentCount { found: usize },

    #[error("Token {segment} is not valid base64: {source}")]
    Base64 {
        segment: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Invalid token component: {0}")]
    Validation(ByteRoleError),

    #[error("Plaintext is too large to encrypt")]
    PlaintextTooLarge,

    #[error("Token authentication failed")]
    Authentication,

    #[error("Decrypted secret is not valid UTF-8")]
    InvalidUtf8,
}

impl TokenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingEmbedSecret => ErrorKind::Configuration,
            Self::SegmentCount { .. } | Self::Base64 { .. } => ErrorKind::Decoding,
            Self::Validation(_) | Self::PlaintextTooLarge | Self::InvalidUtf8 => {
                ErrorKind::Validation
            }
            Self::Authentication => ErrorKind::Authentication,
        }
    }
}

/// Salt, IV, tag and ciphertext produced by one passphrase encryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionOutput {
    salt: Salt,
    iv: Iv,
    tag: Tag,
    ciphertext: Ciphertext,
}

impl EncryptionOutput {
    pub fn new(salt: Salt, iv: Iv, tag: Tag, ciphertext: Ciphertext) -> Self {
        Self {
            salt,
            iv,
            tag,
            ciphertext,
        }
    }

    pub fn salt(&self) -> &Salt {
        &self.salt
    }

    pub fn iv(&self) -> &Iv {
        &self.iv
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn ciphertext(&self) -> &Ciphertext {
        &self.ciphertext
    }
}

/// Output of AES-256-GCM under an already derived key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEncryptionOutput {
    pub iv: Iv,
    pub tag: Tag,
    pub ciphertext: Ciphertext,
}

fn create_cipher(key: &SymmetricKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()))
}

/// Generate a random 96-bit IV
pub fn generate_iv() -> Iv {
    let mut iv = Iv::default();
    OsRng.fill_bytes(iv.as_mut_slice());
    iv
}

/// Encrypt under `key` with a fresh IV, returning the detached tag
pub fn encrypt_with_key(
    key: &SymmetricKey,
    plaintext: &Plaintext,
) -> Result<KeyEncryptionOutput, TokenError> {
    let iv = generate_iv();
    let mut buffer = plaintext.as_slice().to_vec();
    let tag = create_cipher(key)
        .encrypt_in_place_detached(Nonce::from_slice(iv.as_slice()), b"", &mut buffer)
        .map_err(|_| TokenError::PlaintextTooLarge)?;

    Ok(KeyEncryptionOutput {
        iv,
        tag: Tag::from_slice(tag.as_slice()).map_err(TokenError::Validation)?,
        ciphertext: Ciphertext::new(buffer),
    })
}

/// Decrypt and authenticate; nothing is returned unless the tag verifies
pub fn decrypt_with_key(
    key: &SymmetricKey,
    iv: &Iv,
    tag: &Tag,
    ciphertext: &Ciphertext,
) -> Result<Plaintext, TokenError> {
    let mut buffer = Plaintext::new(ciphertext.as_slice());
    create_cipher(key)
        .decrypt_in_place_detached(
            Nonce::from_slice(iv.as_slice()),
            b"",
            buffer.as_mut_slice(),
            aes_gcm::Tag::from_slice(tag.as_slice()),
        )
        .map_err(|_| TokenError::Authentication)?;
    Ok(buffer)
}

/// Derive a key from a fresh salt and encrypt `plaintext` under it
pub fn encrypt_with_passphrase(
    passphrase: &Passphrase,
    plaintext: &Plaintext,
) -> Result<EncryptionOutput, TokenError> {
    encrypt_with_passphrase_iterations(passphrase, plaintext, PBKDF2_ITERATIONS)
}

/// Re-derive the key from the output's salt and decrypt
pub fn decrypt_with_passphrase(
    passphrase: &Passphrase,
    output: &EncryptionOutput,
) -> Result<Plaintext, TokenError> {
    decrypt_with_passphrase_iterations(passphrase, output, PBKDF2_ITERATIONS)
}

fn encrypt_with_passphrase_iterations(
    passphrase: &Passphrase,
    plaintext: &Plaintext,
    iterations: u32,
) -> Result<EncryptionOutput, TokenError> {
    let salt = generate_salt();
    let key = derive_key_with_iterations(passphrase, &salt, iterations);
    let KeyEncryptionOutput {
        iv,
        tag,
        ciphertext,
    } = encrypt_with_key(&key, plaintext)?;
    Ok(EncryptionOutput::new(salt, iv, tag, ciphertext))
}

fn decrypt_with_passphrase_iterations(
    passphrase: &Passphrase,
    output: &EncryptionOutput,
    iterations: u32,
) -> Result<Plaintext, TokenError> {
    let key = derive_key_with_iterations(passphrase, output.salt(), iterations);
    decrypt_with_key(&key, output.iv(), output.tag(), output.ciphertext())
}

/// Passphrase-based token encryption bound to one embed secret
///
/// The embed secret is stretched with PBKDF2 on every call using a fresh
/// salt, so the cipher holds no derived key material between calls.
///
/// # Example
///
/// ```no_run
/// use embed_crypto::TokenCipher;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let cipher = TokenCipher::new("my fake embed secret")?;
/// let token = cipher.encrypt("hello, world!")?;
/// assert_eq!(cipher.decrypt(token.as_str())?, "hello, world!");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TokenCipher {
    passphrase: Passphrase,
    iterations: u32,
}

impl TokenCipher {
    pub fn new(embed_secret: &str) -> Result<Self, TokenError> {
        let passphrase =
            Passphrase::new(embed_secret).map_err(|_| TokenError::MissingEmbedSecret)?;
        Ok(Self {
            passphrase,
            iterations: PBKDF2_ITERATIONS,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_iterations(embed_secret: &str, iterations: u32) -> Self {
        Self {
            passphrase: Passphrase::new(embed_secret).unwrap(),
            iterations,
        }
    }

    /// Encrypt a UTF-8 secret into an encoded token
    pub fn encrypt(&self, secret: &str) -> Result<EncodedToken, TokenError> {
        self.encrypt_bytes(secret.as_bytes())
    }

    /// Encrypt an arbitrary byte secret into an encoded token
    pub fn encrypt_bytes(&self, secret: &[u8]) -> Result<EncodedToken, TokenError> {
        let plaintext = Plaintext::new(secret);
        let output =
            encrypt_with_passphrase_iterations(&self.passphrase, &plaintext, self.iterations)?;
        debug!(ciphertext_len = output.ciphertext().len(), "encrypted token");
        Ok(output.encode())
    }

    /// Decrypt a token produced by [`TokenCipher::encrypt`]
    pub fn decrypt(&self, token: &str) -> Result<String, TokenError> {
        let plaintext = self.decrypt_plaintext(token)?;
        String::from_utf8(plaintext.into_vec()).map_err(|_| TokenError::InvalidUtf8)
    }

    /// Decrypt a token and return the raw secret bytes
    pub fn decrypt_bytes(&self, token: &str) -> Result<Vec<u8>, TokenError> {
        Ok(self.decrypt_plaintext(token)?.into_vec())
    }

    fn decrypt_plaintext(&self, token: &str) -> Result<Plaintext, TokenError> {
        let output = EncryptionOutput::decode(token)?;
        decrypt_with_passphrase_iterations(&self.passphrase, &output, self.iterations).map_err(
            |e| {
                debug!("token failed authentication");
                e
            },
        )
    }
}

/// Encrypt `secret` under `embed_secret`
pub fn encrypt(embed_secret: &str, secret: &str) -> Result<EncodedToken, TokenError> {
    TokenCipher::new(embed_secret)?.encrypt(secret)
}

/// Encrypt a binary `secret` under `embed_secret`
pub fn encrypt_bytes(embed_secret: &str, secret: &[u8]) -> Result<EncodedToken, TokenError> {
    TokenCipher::new(embed_secret)?.encrypt_bytes(secret)
}

/// Decrypt `token` with `embed_secret`
pub fn decrypt(embed_secret: &str, token: &str) -> Result<String, TokenError> {
    TokenCipher::new(embed_secret)?.decrypt(token)
}

/// Decrypt `token` with `embed_secret`, returning raw bytes
pub fn decrypt_bytes(embed_secret: &str, token: &str) -> Result<Vec<u8>, TokenError> {
    TokenCipher::new(embed_secret)?.decrypt_bytes(token)
}

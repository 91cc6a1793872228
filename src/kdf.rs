//! Passphrase key derivation
//!
//! PBKDF2-HMAC-SHA256 with 600,000 iterations and a 128-bit salt, following
//! the NIST SP 800-132 and OWASP password storage recommendations. The output
//! is a 256-bit key for AES-256-GCM.
//!
//! These parameters are part of the token format. Changing any of them makes
//! previously issued tokens undecryptable.

use crate::types::{Passphrase, Salt, SymmetricKey};
use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;

/// PBKDF2 iteration count
pub const PBKDF2_ITERATIONS: u32 = 600_000;

/// Derive the AES-256 key for a passphrase and salt
pub fn derive_key(passphrase: &Passphrase, salt: &Salt) -> SymmetricKey {
    derive_key_with_iterations(passphrase, salt, PBKDF2_ITERATIONS)
}

pub(crate) fn derive_key_with_iterations(
    passphrase: &Passphrase,
    salt: &Salt,
    iterations: u32,
) -> SymmetricKey {
    let mut key = SymmetricKey::default();
    pbkdf2_hmac::<Sha256>(
        passphrase.as_slice(),
        salt.as_slice(),
        iterations,
        key.as_mut_slice(),
    );
    key
}

/// Generate a random 128-bit salt
pub fn generate_salt() -> Salt {
    let mut salt = Salt::default();
    OsRng.fill_bytes(salt.as_mut_slice());
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pbkdf2_sha256_matches_rfc7914_vector() {
        // PBKDF2-HMAC-SHA256 test vector from RFC 7914 section 11
        // The RFC vector uses a 4-byte salt, so call pbkdf2 directly for it
        let mut out = [0u8; 64];
        pbkdf2_hmac::<Sha256>(b"passwd", b"salt", 1, &mut out);
        assert_eq!(
            hex::encode(&out[..32]),
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
        );
    }

    #[test]
    fn test_derive_key_is_deterministic() {
        let passphrase = Passphrase::new("my fake embed secret").unwrap();
        let salt = Salt::from_slice(&[9u8; 16]).unwrap();

        let a = derive_key_with_iterations(&passphrase, &salt, 1_000);
        let b = derive_key_with_iterations(&passphrase, &salt, 1_000);
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_derive_key_depends_on_salt_and_passphrase() {
        let passphrase = Passphrase::new("secret").unwrap();
        let other = Passphrase::new("secret2").unwrap();
        let salt = Salt::from_slice(&[1u8; 16]).unwrap();
        let salt2 = Salt::from_slice(&[2u8; 16]).unwrap();

        let base = derive_key_with_iterations(&passphrase, &salt, 1_000);
        assert_ne!(
            base.as_slice(),
            derive_key_with_iterations(&passphrase, &salt2, 1_000).as_slice()
        );
        assert_ne!(
            base.as_slice(),
            derive_key_with_iterations(&other, &salt, 1_000).as_slice()
        );
    }

    #[test]
    fn test_generate_salt() {
        let salt1 = generate_salt();
        let salt2 = generate_salt();
        // Salts should be different (with overwhelming probability)
        assert_ne!(salt1, salt2);
        assert_eq!(salt1.as_slice().len(), 16);
    }
}

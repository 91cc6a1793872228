//! HMAC operations with constant-time verification
//!
//! HMAC-SHA256 over the canonical embed URL, hex encoded. Verification uses
//! constant-time comparison to avoid leaking signature prefixes through
//! timing.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum HmacError {
    #[error("HMAC initialization failed")]
    InitFailed,

    #[error("HMAC verification failed")]
    VerificationFailed,
}

/// Calculate HMAC-SHA256 over data
pub fn calculate_hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, HmacError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| HmacError::InitFailed)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Calculate the lowercase hex HMAC-SHA256 signature of `message`
pub fn calculate_signature(key: &[u8], message: &str) -> Result<String, HmacError> {
    let mac = calculate_hmac(key, message.as_bytes())?;
    Ok(hex::encode(mac))
}

/// Verify a raw signature against `message` in constant time
pub fn verify_signature(key: &[u8], message: &str, expected: &[u8]) -> Result<(), HmacError> {
    let calculated = calculate_hmac(key, message.as_bytes())?;

    if calculated.ct_eq(expected).into() {
        Ok(())
    } else {
        Err(HmacError::VerificationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_hmac() {
        let key = b"test_key_32_bytes_long_for_hmac!";
        let data = b"test data";

        let result = calculate_hmac(key, data).unwrap();
        assert_eq!(result.len(), 32); // SHA-256 output is 32 bytes
    }

    #[test]
    fn test_rfc4231_case_2() {
        let signature = calculate_signature(b"Jefe", "what do ya want for nothing?").unwrap();
        assert_eq!(
            signature,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_signature_roundtrip() {
        let key = b"embed secret";
        let message = "https://example.com/embed?%3Amode=userbacked";

        let signature = calculate_signature(key, message).unwrap();
        assert_eq!(signature.len(), 64);
        let expected = hex::decode(&signature).unwrap();
        assert!(verify_signature(key, message, &expected).is_ok());
    }

    #[test]
    fn test_constant_time_verification() {
        let key = b"embed secret";
        let message = "payload";
        let signature = calculate_hmac(key, message.as_bytes()).unwrap();

        // Wrong signature (differs in first byte)
        let mut wrong = signature.clone();
        wrong[0] ^= 1;
        assert!(matches!(
            verify_signature(key, message, &wrong),
            Err(HmacError::VerificationFailed)
        ));

        // Wrong signature (differs in last byte)
        let mut wrong = signature.clone();
        wrong[31] ^= 1;
        assert!(verify_signature(key, message, &wrong).is_err());

        // Truncated signature
        assert!(verify_signature(key, message, &signature[..31]).is_err());
    }
}

//! Verification of signed embed URLs
//!
//! The relying-party half of [`crate::signer`]. The signature covers the
//! exact bytes before `&%3Asignature=`, so no re-serialization happens here.

use crate::hmac::{verify_signature, HmacError};
use crate::signer::{SignError, PARAM_CLIENT_ID, PARAM_NONCE, PARAM_SIGNATURE, PARAM_TIME};
use chrono::Utc;
use tracing::{debug, warn};
use url::form_urlencoded;

/// A signed URL split into its signed part and signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    unsigned: String,
    signature: Vec<u8>,
    params: Vec<(String, String)>,
}

fn signature_marker() -> String {
    let encoded: String = form_urlencoded::byte_serialize(PARAM_SIGNATURE.as_bytes()).collect();
    format!("&{encoded}=")
}

impl SignedUrl {
    /// Split a signed URL; the signature must be the last parameter
    pub fn parse(url: &str) -> Result<Self, SignError> {
        let marker = signature_marker();
        let index = url.rfind(&marker).ok_or(SignError::MissingSignature)?;
        let (unsigned, rest) = url.split_at(index);
        let signature = hex::decode(&rest[marker.len()..])
            .map_err(SignError::InvalidSignatureEncoding)?;

        let query = unsigned
            .split_once('?')
            .map(|(_, query)| query)
            .ok_or(SignError::MissingSignature)?;
        let params = form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();

        Ok(Self {
            unsigned: unsigned.to_string(),
            signature,
            params,
        })
    }

    /// The exact string the signature was computed over
    pub fn unsigned(&self) -> &str {
        &self.unsigned
    }

    /// First value of a decoded parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Decoded parameters in URL order, without the signature
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn nonce(&self) -> Option<&str> {
        self.param(PARAM_NONCE)
    }

    pub fn client_id(&self) -> Option<&str> {
        self.param(PARAM_CLIENT_ID)
    }

    /// Signing time in Unix seconds
    pub fn timestamp(&self) -> Result<i64, SignError> {
        self.param(PARAM_TIME)
            .and_then(|t| t.parse().ok())
            .ok_or(SignError::InvalidTimestamp)
    }

    /// Recompute the HMAC and compare in constant time
    pub fn verify(&self, embed_secret: &str) -> Result<(), SignError> {
        if embed_secret.is_empty() {
            return Err(SignError::MissingEmbedSecret);
        }
        verify_signature(embed_secret.as_bytes(), &self.unsigned, &self.signature).map_err(
            |e| match e {
                HmacError::VerificationFailed => {
                    debug!(nonce = ?self.nonce(), "embed URL signature mismatch");
                    SignError::SignatureMismatch
                }
                other => SignError::Hmac(other),
            },
        )
    }

    /// Reject a timestamp more than `max_age` seconds away from `now`
    pub fn check_freshness(&self, now: i64, max_age: i64) -> Result<(), SignError> {
        let time = self.timestamp()?;
        let age = now.checked_sub(time).ok_or(SignError::InvalidTimestamp)?;
        if age > max_age {
            return Err(SignError::Expired { age, max_age });
        }
        let skew = age.checked_neg().ok_or(SignError::InvalidTimestamp)?;
        if skew > max_age {
            warn!(skew, "embed URL timestamp is in the future; check clock sync");
            return Err(SignError::NotYetValid { skew });
        }
        Ok(())
    }
}

/// Parse, authenticate and freshness-check a signed URL against the clock
pub fn verify_signed_url(
    url: &str,
    embed_secret: &str,
    max_age: i64,
) -> Result<SignedUrl, SignError> {
    let signed = SignedUrl::parse(url)?;
    signed.verify(embed_secret)?;
    signed.check_freshness(Utc::now().timestamp(), max_age)?;
    Ok(signed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::signer::{EmbedParams, SigningContext, UrlSigner};

    const BASE_URL: &str = "https://app.example.com/org/workbook/abc";
    const SECRET: &str = "embed secret";

    fn signed_at(time: i64) -> String {
        let params = EmbedParams::builder()
            .email("embed-sdk@example.com")
            .external_user_team("Embed-SDK-Team")
            .external_user_id("123")
            .build()
            .unwrap();
        UrlSigner::from_parts(SECRET, "client-1")
            .unwrap()
            .sign_with_context(BASE_URL, &params, &SigningContext::new("nonce-1", time))
            .unwrap()
    }

    #[test]
    fn test_parse_and_verify() {
        let signed = SignedUrl::parse(&signed_at(1_700_000_000)).unwrap();
        assert!(signed.verify(SECRET).is_ok());
        assert_eq!(signed.nonce(), Some("nonce-1"));
        assert_eq!(signed.client_id(), Some("client-1"));
        assert_eq!(signed.timestamp().unwrap(), 1_700_000_000);
        assert_eq!(signed.param(":email"), Some("embed-sdk@example.com"));
        assert!(signed.params().iter().all(|(n, _)| n != PARAM_SIGNATURE));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let signed = SignedUrl::parse(&signed_at(1_700_000_000)).unwrap();
        let err = signed.verify("other secret").unwrap_err();
        assert!(matches!(err, SignError::SignatureMismatch));
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[test]
    fn test_missing_and_malformed_signature() {
        assert!(matches!(
            SignedUrl::parse(&format!("{BASE_URL}?%3Amode=userbacked")),
            Err(SignError::MissingSignature)
        ));
        assert!(matches!(
            SignedUrl::parse(&format!("{BASE_URL}?%3Amode=userbacked&%3Asignature=zz")),
            Err(SignError::InvalidSignatureEncoding(_))
        ));
    }

    #[test]
    fn test_freshness_window() {
        let signed = SignedUrl::parse(&signed_at(1_000)).unwrap();
        assert!(signed.check_freshness(1_100, 300).is_ok());
        assert!(matches!(
            signed.check_freshness(2_000, 300),
            Err(SignError::Expired { age: 1_000, .. })
        ));
        assert!(matches!(
            signed.check_freshness(500, 300),
            Err(SignError::NotYetValid { skew: 500 })
        ));
    }

    #[test]
    fn test_freshness_rejects_out_of_range_timestamps() {
        let signed = SignedUrl::parse(&signed_at(i64::MIN)).unwrap();
        assert!(signed.verify(SECRET).is_ok());
        assert!(matches!(
            signed.check_freshness(1_700_000_000, 300),
            Err(SignError::InvalidTimestamp)
        ));

        let signed = SignedUrl::parse(&signed_at(i64::MAX)).unwrap();
        assert!(matches!(
            signed.check_freshness(1_700_000_000, 300),
            Err(SignError::NotYetValid { .. })
        ));
        assert!(matches!(
            signed.check_freshness(-2, 300),
            Err(SignError::InvalidTimestamp)
        ));
    }

    #[test]
    fn test_verify_signed_url_with_current_time() {
        let url = signed_at(Utc::now().timestamp());
        assert!(verify_signed_url(&url, SECRET, 60).is_ok());

        let stale = signed_at(Utc::now().timestamp() - 3_600);
        assert!(matches!(
            verify_signed_url(&stale, SECRET, 60),
            Err(SignError::Expired { .. })
        ));
    }
}

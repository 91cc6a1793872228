//! Common test utilities for embed-crypto integration tests
//!
//! Shared fixtures so the token and signed URL tests agree on inputs.

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

pub use embed_crypto::{EmbedParams, SigningContext, UrlSigner};

/// Embed secret used throughout the tests
pub const EMBED_SECRET: &str = "my fake embed secret";

/// Client id used throughout the tests
pub const CLIENT_ID: &str = "test-client-id";

/// Dashboard URL used as the signing base
pub const BASE_URL: &str = "https://app.example.com/embed-org/workbook/quarterly-abc123";

/// Plaintext for encryption round trips
pub const TEST_PLAINTEXT: &str = "hello, world!";

/// Embed parameters matching a typical user-backed viewer session
pub fn viewer_params() -> EmbedParams {
    EmbedParams::builder()
        .email("embed-sdk@example.com")
        .external_user_team("Embed-SDK-Team")
        .account_type("viewer")
        .session_length(36_000)
        .external_user_id("123")
        .build()
        .unwrap()
}

pub fn test_signer() -> UrlSigner {
    UrlSigner::from_parts(EMBED_SECRET, CLIENT_ID).unwrap()
}

/// Split an encoded token into its decoded segments
pub fn decode_segments(token: &str) -> Vec<Vec<u8>> {
    token.split('.').map(|s| BASE64.decode(s).unwrap()).collect()
}

/// Join raw segments back into an encoded token
pub fn encode_segments(segments: &[Vec<u8>]) -> String {
    segments
        .iter()
        .map(|s| BASE64.encode(s))
        .collect::<Vec<_>>()
        .join(".")
}

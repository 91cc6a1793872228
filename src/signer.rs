//! Signed embed URLs
//!
//! The embed parameters, a fresh nonce and the current time are serialized as
//! an `application/x-www-form-urlencoded` query in a fixed order, appended to
//! the base URL, and signed with HMAC-SHA256 keyed by the embed secret. The
//! hex signature is appended as the final `:signature` parameter.
//!
//! ```text
//! <base>?%3Amode=...&%3Anonce=<uuid>&%3Atime=<secs>&...&%3Asignature=<hex>
//! ```
//!
//! The relying party must reproduce the query byte for byte, so the order of
//! [`EmbedParams::canonical_pairs`] is part of the format.

use crate::config::EmbedConfig;
use crate::error::ErrorKind;
use crate::hmac::{calculate_signature, HmacError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::form_urlencoded;
use uuid::Uuid;
use zeroize::Zeroizing;

pub const PARAM_MODE: &str = ":mode";
pub const PARAM_EMAIL: &str = ":email";
pub const PARAM_EXTERNAL_USER_TEAM: &str = ":external_user_team";
pub const PARAM_ACCOUNT_TYPE: &str = ":account_type";
pub const PARAM_NONCE: &str = ":nonce";
pub const PARAM_TIME: &str = ":time";
pub const PARAM_SESSION_LENGTH: &str = ":session_length";
pub const PARAM_CLIENT_ID: &str = ":client_id";
pub const PARAM_EXTERNAL_USER_ID: &str = ":external_user_id";
pub const PARAM_SIGNATURE: &str = ":signature";

/// Parameter names the signer controls; extra parameters may not reuse them
pub const RESERVED_PARAMS: [&str; 10] = [
    PARAM_MODE,
    PARAM_EMAIL,
    PARAM_EXTERNAL_USER_TEAM,
    PARAM_ACCOUNT_TYPE,
    PARAM_NONCE,
    PARAM_TIME,
    PARAM_SESSION_LENGTH,
    PARAM_CLIENT_ID,
    PARAM_EXTERNAL_USER_ID,
    PARAM_SIGNATURE,
];

pub const DEFAULT_MODE: &str = "userbacked";
pub const DEFAULT_ACCOUNT_TYPE: &str = "viewer";

/// Ten hours
pub const DEFAULT_SESSION_LENGTH: u64 = 36_000;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("Embed secret is missing")]
    MissingEmbedSecret,

    #[error("Embed client id is missing")]
    MissingClientId,

    #[error("No base URL was given and none is configured")]
    MissingBaseUrl,

    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Missing required embed parameter: {name}")]
    MissingParameter { name: &'static str },

    #[error("Parameter name '{name}' is reserved")]
    ReservedParameter { name: String },

    #[error("URL has no :signature parameter")]
    MissingSignature,

    #[error("Signature is not valid hex: {0}")]
    InvalidSignatureEncoding(hex::FromHexError),

    #[error("Signature does not match")]
    SignatureMismatch,

    #[error("URL has no valid :time parameter")]
    InvalidTimestamp,

    #[error("Signed URL is {age}s old, older than the allowed {max_age}s")]
    Expired { age: i64, max_age: i64 },

    #[error("Signed URL is dated {skew}s in the future")]
    NotYetValid { skew: i64 },

    #[error("HMAC error: {0}")]
    Hmac(#[from] HmacError),
}

impl SignError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingEmbedSecret
            | Self::MissingClientId
            | Self::MissingBaseUrl
            | Self::InvalidBaseUrl { .. }
            | Self::Hmac(HmacError::InitFailed) => ErrorKind::Configuration,
            Self::MissingSignature | Self::InvalidSignatureEncoding(_) => ErrorKind::Decoding,
            Self::MissingParameter { .. }
            | Self::ReservedParameter { .. }
            | Self::InvalidTimestamp
            | Self::Expired { .. }
            | Self::NotYetValid { .. } => ErrorKind::Validation,
            Self::SignatureMismatch | Self::Hmac(HmacError::VerificationFailed) => {
                ErrorKind::Authentication
            }
        }
    }
}

/// Per-user embed parameters
///
/// The client id, nonce and time are supplied by the signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedParams {
    #[serde(default = "default_mode")]
    pub mode: String,
    pub email: String,
    pub external_user_team: String,
    #[serde(default = "default_account_type")]
    pub account_type: String,
    #[serde(default = "default_session_length")]
    pub session_length: u64,
    pub external_user_id: String,
    /// Additional parameters, signed after the reserved ones in this order
    #[serde(default)]
    pub extra: Vec<(String, String)>,
}

fn default_mode() -> String {
    DEFAULT_MODE.to_string()
}

fn default_account_type() -> String {
    DEFAULT_ACCOUNT_TYPE.to_string()
}

fn default_session_length() -> u64 {
    DEFAULT_SESSION_LENGTH
}

impl EmbedParams {
    pub fn builder() -> EmbedParamsBuilder {
        EmbedParamsBuilder::default()
    }

    /// Name/value pairs in signing order, without the signature
    pub fn canonical_pairs(
        &self,
        client_id: &str,
        context: &SigningContext,
    ) -> Vec<(String, String)> {
        let mut pairs = vec![
            (PARAM_MODE.to_string(), self.mode.clone()),
            (PARAM_EMAIL.to_string(), self.email.clone()),
            (
                PARAM_EXTERNAL_USER_TEAM.to_string(),
                self.external_user_team.clone(),
            ),
            (PARAM_ACCOUNT_TYPE.to_string(), self.account_type.clone()),
            (PARAM_NONCE.to_string(), context.nonce.clone()),
            (PARAM_TIME.to_string(), context.time.to_string()),
            (
                PARAM_SESSION_LENGTH.to_string(),
                self.session_length.to_string(),
            ),
            (PARAM_CLIENT_ID.to_string(), client_id.to_string()),
            (
                PARAM_EXTERNAL_USER_ID.to_string(),
                self.external_user_id.clone(),
            ),
        ];
        pairs.extend(self.extra.iter().cloned());
        pairs
    }

    /// Check required fields and extra parameter names
    ///
    /// Parameters deserialized with serde skip the builder, so signing
    /// validates again.
    pub fn validate(&self) -> Result<(), SignError> {
        for (value, name) in [
            (&self.email, "email"),
            (&self.external_user_team, "external_user_team"),
            (&self.external_user_id, "external_user_id"),
        ] {
            if value.is_empty() {
                return Err(SignError::MissingParameter { name });
            }
        }
        self.check_extra()
    }

    fn check_extra(&self) -> Result<(), SignError> {
        for (name, _) in &self.extra {
            if RESERVED_PARAMS.contains(&name.as_str()) {
                return Err(SignError::ReservedParameter { name: name.clone() });
            }
        }
        Ok(())
    }
}

/// Builder for [`EmbedParams`]
#[derive(Debug, Default)]
pub struct EmbedParamsBuilder {
    mode: Option<String>,
    email: Option<String>,
    external_user_team: Option<String>,
    account_type: Option<String>,
    session_length: Option<u64>,
    external_user_id: Option<String>,
    extra: Vec<(String, String)>,
}

impl EmbedParamsBuilder {
    #[must_use]
    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn external_user_team(mut self, team: impl Into<String>) -> Self {
        self.external_user_team = Some(team.into());
        self
    }

    #[must_use]
    pub fn account_type(mut self, account_type: impl Into<String>) -> Self {
        self.account_type = Some(account_type.into());
        self
    }

    /// Session length in seconds
    #[must_use]
    pub fn session_length(mut self, seconds: u64) -> Self {
        self.session_length = Some(seconds);
        self
    }

    #[must_use]
    pub fn external_user_id(mut self, id: impl Into<String>) -> Self {
        self.external_user_id = Some(id.into());
        self
    }

    /// Add a parameter signed after the reserved ones
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }

    /// Build the parameters
    ///
    /// Email, external user team and external user id are required. Mode,
    /// account type and session length fall back to their defaults.
    pub fn build(self) -> Result<EmbedParams, SignError> {
        let params = EmbedParams {
            mode: self.mode.unwrap_or_else(default_mode),
            email: required(self.email, "email")?,
            external_user_team: required(self.external_user_team, "external_user_team")?,
            account_type: self.account_type.unwrap_or_else(default_account_type),
            session_length: self.session_length.unwrap_or(DEFAULT_SESSION_LENGTH),
            external_user_id: required(self.external_user_id, "external_user_id")?,
            extra: self.extra,
        };
        params.validate()?;
        Ok(params)
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, SignError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(SignError::MissingParameter { name })
}

/// Nonce and timestamp of one signing call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningContext {
    pub nonce: String,
    /// Unix time in seconds
    pub time: i64,
}

impl SigningContext {
    pub fn new(nonce: impl Into<String>, time: i64) -> Self {
        Self {
            nonce: nonce.into(),
            time,
        }
    }

    /// A random UUID v4 nonce and the current time
    pub fn fresh() -> Self {
        Self {
            nonce: Uuid::new_v4().to_string(),
            time: Utc::now().timestamp(),
        }
    }
}

/// Check that `base_url` can have an embed query appended to it
pub fn validate_base_url(base_url: &str) -> Result<(), SignError> {
    let invalid = |reason: &str| SignError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason: reason.to_string(),
    };

    let parsed = url::Url::parse(base_url).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if base_url.contains('?') {
        return Err(invalid("already has a query string"));
    }
    if parsed.fragment().is_some() {
        return Err(invalid("must not have a fragment"));
    }
    Ok(())
}

/// Form-urlencode pairs exactly as `URLSearchParams` does
pub(crate) fn serialize_query<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = &'a (String, String)>,
{
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (name, value) in pairs {
        serializer.append_pair(name, value);
    }
    serializer.finish()
}

/// Signs embed URLs with a shared embed secret
///
/// All settings come from the [`EmbedConfig`] it was built with, including
/// the default base URL, so tests can point it anywhere without global state.
///
/// # Example
///
/// ```
/// use embed_crypto::{EmbedConfig, EmbedParams, SigningContext, UrlSigner};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = EmbedConfig::new("embed secret", "client-id")
///     .with_base_url("https://app.example.com/org/workbook/abc");
/// let signer = UrlSigner::new(&config)?;
///
/// let params = EmbedParams::builder()
///     .email("embed-user@example.com")
///     .external_user_team("Embed-Team")
///     .external_user_id("123")
///     .build()?;
///
/// let url = signer.sign(&params)?;
/// assert!(url.contains("%3Asignature="));
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
#[derive(Clone)]
pub struct UrlSigner {
    embed_secret: Zeroizing<String>,
    client_id: String,
    base_url: Option<String>,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("embed_secret", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl UrlSigner {
    /// Create a signer from configuration
    ///
    /// Fails if the embed secret or client id is empty, or the configured
    /// base URL is unusable.
    pub fn new(config: &EmbedConfig) -> Result<Self, SignError> {
        let mut signer = Self::from_parts(config.embed_secret.as_str(), &config.client_id)?;
        if let Some(base_url) = &config.base_url {
            validate_base_url(base_url)?;
            signer.base_url = Some(base_url.clone());
        }
        Ok(signer)
    }

    /// Create a signer without a default base URL
    pub fn from_parts(embed_secret: &str, client_id: &str) -> Result<Self, SignError> {
        if embed_secret.is_empty() {
            return Err(SignError::MissingEmbedSecret);
        }
        if client_id.is_empty() {
            return Err(SignError::MissingClientId);
        }
        Ok(Self {
            embed_secret: Zeroizing::new(embed_secret.to_string()),
            client_id: client_id.to_string(),
            base_url: None,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Sign against the configured base URL
    pub fn sign(&self, params: &EmbedParams) -> Result<String, SignError> {
        let base_url = self.base_url.as_deref().ok_or(SignError::MissingBaseUrl)?;
        self.sign_url(base_url, params)
    }

    /// Sign against `base_url` with a fresh nonce and the current time
    pub fn sign_url(&self, base_url: &str, params: &EmbedParams) -> Result<String, SignError> {
        self.sign_with_context(base_url, params, &SigningContext::fresh())
    }

    /// Sign with an explicit nonce and time; the output is deterministic
    pub fn sign_with_context(
        &self,
        base_url: &str,
        params: &EmbedParams,
        context: &SigningContext,
    ) -> Result<String, SignError> {
        validate_base_url(base_url)?;
        params.validate()?;

        let pairs = params.canonical_pairs(&self.client_id, context);
        let unsigned = format!("{}?{}", base_url, serialize_query(&pairs));
        let signature = calculate_signature(self.embed_secret.as_bytes(), &unsigned)?;

        debug!(nonce = %context.nonce, time = context.time, "signed embed URL");

        let signature_pair = [(PARAM_SIGNATURE.to_string(), signature)];
        Ok(format!("{}&{}", unsigned, serialize_query(&signature_pair)))
    }
}

/// Sign `params` for `base_url` in one call
pub fn sign(
    base_url: &str,
    embed_secret: &str,
    client_id: &str,
    params: &EmbedParams,
) -> Result<String, SignError> {
    UrlSigner::from_parts(embed_secret, client_id)?.sign_url(base_url, params)
}

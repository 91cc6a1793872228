//! JSON-RPC 2.0 server on stdio for embed token encryption and URL signing.
//!
//! Reads one JSON request per line and writes one response per line. The
//! embed secret and client id come from `EMBED_SECRET` and `EMBED_CLIENT_ID`,
//! or from the JSON file named by `EMBED_CONFIG`.

use embed_crypto::{
    verify_signed_url, EmbedConfig, EmbedError, EmbedParams, ErrorKind, TokenCipher, UrlSigner,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const ENV_CONFIG_PATH: &str = "EMBED_CONFIG";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_AGE: i64 = 300;

const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const SERVER_ERROR: i32 = -32000;

#[derive(Deserialize, Serialize, Clone, Debug)]
struct RpcRequest {
    jsonrpc: String,
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Serialize, Debug)]
struct RpcResponse {
    jsonrpc: String,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Serialize, Debug)]
struct RpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

#[derive(Deserialize, Debug)]
struct EncryptParams {
    secret: String,
}

#[derive(Deserialize, Debug)]
struct DecryptParams {
    token: String,
}

#[derive(Deserialize, Debug)]
struct SignParams {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(flatten)]
    params: EmbedParams,
}

#[derive(Deserialize, Debug)]
struct VerifyParams {
    url: String,
    #[serde(default)]
    max_age: Option<i64>,
}

/// Shared state built once from configuration
struct ServerState {
    config: EmbedConfig,
    cipher: TokenCipher,
    signer: UrlSigner,
}

impl ServerState {
    fn new(config: EmbedConfig) -> Result<Self, EmbedError> {
        let cipher = TokenCipher::new(&config.embed_secret)?;
        let signer = UrlSigner::new(&config)?;
        Ok(Self {
            config,
            cipher,
            signer,
        })
    }
}

fn load_config() -> Result<EmbedConfig, EmbedError> {
    match std::env::var(ENV_CONFIG_PATH) {
        Ok(path) => Ok(EmbedConfig::from_file(path)?),
        Err(_) => Ok(EmbedConfig::from_env()?),
    }
}

fn create_error_response(id: Value, code: i32, message: String) -> RpcResponse {
    error!("Responding with error: code={}, message={}", code, message);
    RpcResponse {
        jsonrpc: "2.0".to_string(),
        id,
        result: None,
        error: Some(RpcError {
            code,
            message,
            data: None,
        }),
    }
}

fn create_success_response(id: Value, result: Value) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0".to_string(),
        id,
        result: Some(result),
        error: None,
    }
}

/// Application error codes, one per error kind
fn error_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Configuration => -32001,
        ErrorKind::Decoding => -32002,
        ErrorKind::Validation => -32003,
        ErrorKind::Authentication => -32004,
    }
}

fn create_embed_error_response(id: Value, err: EmbedError) -> RpcResponse {
    let mut response = create_error_response(id, error_code(err.kind()), err.to_string());
    if let Some(error) = response.error.as_mut() {
        error.data = Some(json!({
            "kind": err.kind().to_string(),
            "suggestion": err.suggestion(),
        }));
    }
    response
}

fn parse_params<T: serde::de::DeserializeOwned>(
    id: &Value,
    params: Value,
) -> Result<T, RpcResponse> {
    serde_json::from_value(params).map_err(|e| {
        create_error_response(id.clone(), INVALID_PARAMS, format!("Invalid params: {}", e))
    })
}

/// Run CPU-bound key derivation off the async workers
async fn run_blocking<F>(id: Value, task: F) -> RpcResponse
where
    F: FnOnce() -> Result<Value, EmbedError> + Send + 'static,
{
    match tokio::task::spawn_blocking(task).await {
        Ok(Ok(result)) => create_success_response(id, result),
        Ok(Err(e)) => create_embed_error_response(id, e),
        Err(e) => create_error_response(id, SERVER_ERROR, format!("Worker failed: {}", e)),
    }
}

fn help() -> Value {
    json!({
        "message": "Embed server: token encryption and signed embed URLs over JSON-RPC 2.0.",
        "commands": {
            "help": { "description": "Displays this help message.", "params": {} },
            "token/encrypt": {
                "description": "Encrypts a secret under the embed secret.",
                "params": { "secret": "string" }
            },
            "token/decrypt": {
                "description": "Decrypts a token produced by token/encrypt.",
                "params": { "token": "string" }
            },
            "url/sign": {
                "description": "Signs embed parameters into a URL.",
                "params": {
                    "base_url": "string (optional, defaults to EMBED_BASE_URL)",
                    "email": "string",
                    "external_user_team": "string",
                    "external_user_id": "string",
                    "account_type": "string (optional)",
                    "mode": "string (optional)",
                    "session_length": "integer seconds (optional)",
                    "extra": "array of [name, value] (optional)"
                }
            },
            "url/verify": {
                "description": "Verifies a signed URL's signature and freshness.",
                "params": { "url": "string", "max_age": "integer seconds (optional)" }
            }
        }
    })
}

type ResponseFuture = Pin<Box<dyn Future<Output = RpcResponse> + Send>>;

fn process_request(state: Arc<ServerState>, req: RpcRequest) -> ResponseFuture {
    Box::pin(async move {
        debug!("Processing request: id={:?}, method='{}'", req.id, req.method);

        if req.jsonrpc != "2.0" {
            return create_error_response(
                req.id,
                INVALID_REQUEST,
                "Invalid Request: jsonrpc must be \"2.0\"".to_string(),
            );
        }

        let id = req.id;
        match req.method.as_str() {
            "help" => create_success_response(id, help()),

            "token/encrypt" => {
                let params: EncryptParams = match parse_params(&id, req.params) {
                    Ok(p) => p,
                    Err(resp) => return resp,
                };
                run_blocking(id, move || {
                    let token = state.cipher.encrypt(&params.secret)?;
                    Ok(json!({ "token": token }))
                })
                .await
            }

            "token/decrypt" => {
                let params: DecryptParams = match parse_params(&id, req.params) {
                    Ok(p) => p,
                    Err(resp) => return resp,
                };
                run_blocking(id, move || {
                    let secret = state.cipher.decrypt(&params.token)?;
                    Ok(json!({ "secret": secret }))
                })
                .await
            }

            "url/sign" => {
                let params: SignParams = match parse_params(&id, req.params) {
                    Ok(p) => p,
                    Err(resp) => return resp,
                };
                let signed = match params.base_url.as_deref() {
                    Some(base_url) => state.signer.sign_url(base_url, &params.params),
                    None => state.signer.sign(&params.params),
                };
                match signed {
                    Ok(url) => create_success_response(id, json!({ "url": url })),
                    Err(e) => create_embed_error_response(id, e.into()),
                }
            }

            "url/verify" => {
                let params: VerifyParams = match parse_params(&id, req.params) {
                    Ok(p) => p,
                    Err(resp) => return resp,
                };
                let max_age = params.max_age.unwrap_or(DEFAULT_MAX_AGE);
                match verify_signed_url(&params.url, &state.config.embed_secret, max_age) {
                    Ok(signed) => create_success_response(
                        id,
                        json!({
                            "valid": true,
                            "nonce": signed.nonce(),
                            "time": signed.timestamp().ok(),
                        }),
                    ),
                    Err(e) => create_embed_error_response(id, e.into()),
                }
            }

            other => {
                warn!("Unknown method: {}", other);
                create_error_response(id, METHOD_NOT_FOUND, format!("Method not found: {}", other))
            }
        }
    })
}

async fn write_response<W>(stdout: &mut W, response: &RpcResponse)
where
    W: AsyncWrite + Unpin,
{
    let resp_str = serde_json::to_string(response).unwrap_or_else(|e| {
        json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": { "code": SERVER_ERROR, "message": format!("Serialization error: {}", e) }
        })
        .to_string()
    });
    if let Err(e) = stdout.write_all(format!("{}\r\n", resp_str).as_bytes()).await {
        error!("Failed to write response for ID {:?}: {}", response.id, e);
    } else if let Err(e) = stdout.flush().await {
        error!("Failed to flush stdout for ID {:?}: {}", response.id, e);
    }
}

/// Handle one input line, returning the response to send if any
async fn handle_line(state: &Arc<ServerState>, line: &str) -> Option<RpcResponse> {
    let parsed: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            return Some(create_error_response(
                Value::Null,
                PARSE_ERROR,
                format!("Parse error: {}", e),
            ))
        }
    };

    // Notifications get no response
    if parsed.get("id").map_or(true, Value::is_null) {
        match parsed.get("method").and_then(Value::as_str) {
            Some(method) => info!("Received notification: {}", method),
            None => warn!("Received notification without method field"),
        }
        return None;
    }

    let id = parsed.get("id").cloned().unwrap_or(Value::Null);
    let req: RpcRequest = match serde_json::from_value(parsed) {
        Ok(r) => r,
        Err(e) => {
            return Some(create_error_response(
                id,
                INVALID_REQUEST,
                format!("Invalid Request: {}", e),
            ))
        }
    };

    let method = req.method.clone();
    match tokio::time::timeout(REQUEST_TIMEOUT, process_request(Arc::clone(state), req)).await {
        Ok(response) => Some(response),
        Err(_) => {
            error!(
                "Request processing timed out after {:?} for Method '{}', ID {:?}",
                REQUEST_TIMEOUT, method, id
            );
            Some(create_error_response(
                id,
                SERVER_ERROR,
                format!("Request timed out for method '{}'", method),
            ))
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let state = match load_config().and_then(ServerState::new) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Fatal: {}", e);
            if let Some(suggestion) = e.suggestion() {
                error!("{}", suggestion);
            }
            std::process::exit(1);
        }
    };

    info!(client_id = %state.signer.client_id(), "Starting embed server on stdio...");
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut line_buffer = String::new();

    let ready = json!({"jsonrpc": "2.0", "method": "server/ready", "params": {"status": "ready"}});
    if let Err(e) = stdout.write_all(format!("{}\r\n", ready).as_bytes()).await {
        error!("Fatal: Failed to write ready message: {}", e);
        return;
    }
    if let Err(e) = stdout.flush().await {
        error!("Fatal: Failed to flush after ready message: {}", e);
        return;
    }

    loop {
        line_buffer.clear();
        match reader.read_line(&mut line_buffer).await {
            Ok(0) => {
                info!("Stdin closed (EOF). Exiting server.");
                break;
            }
            Ok(_) => {
                let trimmed = line_buffer.trim();
                if trimmed.is_empty() {
                    continue;
                }
                debug!("<<< Received line ({} bytes)", trimmed.len());
                if let Some(response) = handle_line(&state, trimmed).await {
                    write_response(&mut stdout, &response).await;
                }
            }
            Err(e) => {
                error!("Error reading from stdin: {}. Exiting.", e);
                break;
            }
        }
    }
    info!("Embed server shutting down.");
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMBED_SECRET: &str = "my fake embed secret";
    const BASE_URL: &str = "https://app.example.com/embed-org/workbook/abc";

    fn test_state() -> Arc<ServerState> {
        let config = EmbedConfig::new(EMBED_SECRET, "client-1").with_base_url(BASE_URL);
        Arc::new(ServerState::new(config).unwrap())
    }

    fn request(method: &str, params: Value) -> RpcRequest {
        RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: json!(1),
            method: method.to_string(),
            params,
        }
    }

    fn sign_params() -> Value {
        json!({
            "email": "embed-sdk@example.com",
            "external_user_team": "Embed-SDK-Team",
            "external_user_id": "123"
        })
    }

    #[tokio::test]
    async fn test_token_roundtrip() {
        let state = test_state();
        let encrypted = process_request(
            state.clone(),
            request("token/encrypt", json!({"secret": "hello, world!"})),
        )
        .await;
        let token = encrypted.result.unwrap()["token"].as_str().unwrap().to_string();

        let decrypted =
            process_request(state, request("token/decrypt", json!({"token": token}))).await;
        assert_eq!(decrypted.result.unwrap()["secret"], "hello, world!");
    }

    #[tokio::test]
    async fn test_malformed_token_maps_to_decoding_code() {
        let response = process_request(
            test_state(),
            request("token/decrypt", json!({"token": "only.three.parts"})),
        )
        .await;
        let error = response.error.unwrap();
        assert_eq!(error.code, error_code(ErrorKind::Decoding));
        assert_eq!(error.data.unwrap()["kind"], "decoding");
    }

    #[tokio::test]
    async fn test_sign_then_verify() {
        let state = test_state();
        let signed = process_request(state.clone(), request("url/sign", sign_params())).await;
        let url = signed.result.unwrap()["url"].as_str().unwrap().to_string();
        assert!(url.starts_with(BASE_URL));

        let verified = process_request(state, request("url/verify", json!({"url": url}))).await;
        assert_eq!(verified.result.unwrap()["valid"], true);
    }

    #[tokio::test]
    async fn test_tampered_url_is_rejected() {
        let state = test_state();
        let signed = process_request(state.clone(), request("url/sign", sign_params())).await;
        let url = signed.result.unwrap()["url"].as_str().unwrap().to_string();
        let tampered = url.replace("account_type=viewer", "account_type=editor");

        let response =
            process_request(state, request("url/verify", json!({"url": tampered}))).await;
        assert_eq!(
            response.error.unwrap().code,
            error_code(ErrorKind::Authentication)
        );
    }

    #[tokio::test]
    async fn test_sign_rejects_empty_identity_fields() {
        let response = process_request(
            test_state(),
            request(
                "url/sign",
                json!({"email": "", "external_user_team": "", "external_user_id": ""}),
            ),
        )
        .await;
        assert!(response.result.is_none());
        assert_eq!(
            response.error.unwrap().code,
            error_code(ErrorKind::Validation)
        );
    }

    #[tokio::test]
    async fn test_invalid_params_and_unknown_method() {
        let state = test_state();
        let response = process_request(state.clone(), request("url/sign", json!({}))).await;
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);

        let response = process_request(state, request("url/unsign", json!({}))).await;
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_handle_line_skips_notifications() {
        let state = test_state();
        assert!(handle_line(&state, r#"{"jsonrpc":"2.0","method":"initialized"}"#)
            .await
            .is_none());

        let response = handle_line(&state, "{not json").await.unwrap();
        assert_eq!(response.error.unwrap().code, PARSE_ERROR);

        let response = handle_line(&state, r#"{"jsonrpc":"2.0","id":7,"method":"help"}"#)
            .await
            .unwrap();
        assert_eq!(response.id, json!(7));
        assert!(response.result.unwrap()["commands"]["url/sign"].is_object());
    }
}

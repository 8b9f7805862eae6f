//! Request signing for the KuCoin REST API (KC-API-KEY-VERSION 2)

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::common::errors::{DetectorError, Result};
use crate::config::types::ApiCredentials;

type HmacSha256 = Hmac<Sha256>;

/// Version of the key scheme the headers are produced for
pub const KEY_VERSION: &str = "2";

fn hmac_base64(secret: &str, message: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| DetectorError::Authentication(format!("Failed to create HMAC: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Sign `timestamp + METHOD + endpoint + body`
///
/// # Arguments
/// * `secret` - API secret as issued by the venue
/// * `timestamp_ms` - Unix timestamp in milliseconds
/// * `method` - HTTP method (GET, POST, etc.)
/// * `endpoint` - Path including the query string
/// * `body` - Request body (empty string for GET requests)
pub fn sign_request(
    secret: &str,
    timestamp_ms: i64,
    method: &str,
    endpoint: &str,
    body: &str,
) -> Result<String> {
    let message = format!("{}{}{}{}", timestamp_ms, method.to_uppercase(), endpoint, body);
    hmac_base64(secret, &message)
}

/// Version 2 keys send the passphrase signed with the secret
pub fn sign_passphrase(secret: &str, passphrase: &str) -> Result<String> {
    hmac_base64(secret, passphrase)
}

/// Generate authentication headers for one request
pub fn generate_auth_headers(
    credentials: &ApiCredentials,
    method: &str,
    endpoint: &str,
    body: &str,
) -> Result<AuthHeaders> {
    let timestamp = chrono::Utc::now().timestamp_millis();
    let signature = sign_request(&credentials.api_secret, timestamp, method, endpoint, body)?;
    let passphrase = sign_passphrase(&credentials.api_secret, &credentials.passphrase)?;

    Ok(AuthHeaders {
        api_key: credentials.api_key.clone(),
        signature,
        timestamp,
        passphrase,
    })
}

/// Authentication headers for API requests
#[derive(Debug, Clone)]
pub struct AuthHeaders {
    pub api_key: String,
    pub signature: String,
    pub timestamp: i64,
    /// Signed passphrase
    pub passphrase: String,
}

impl AuthHeaders {
    /// Add authentication headers to a reqwest RequestBuilder
    pub fn apply_to_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("KC-API-KEY", &self.api_key)
            .header("KC-API-SIGN", &self.signature)
            .header("KC-API-TIMESTAMP", self.timestamp.to_string())
            .header("KC-API-PASSPHRASE", &self.passphrase)
            .header("KC-API-KEY-VERSION", KEY_VERSION)
    }
}

//! AWS Signature Version 4 request signing.
//!
//! Pure and stateless: callers supply the timestamp, so signing the same
//! inputs twice yields the same signature. Header ordering, casing, and
//! the canonical request layout must match the SigV4 specification
//! exactly; any deviation is rejected by the backend with no partial
//! credit.

use crate::llm::credentials::AwsCredentials;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Headers an adapter must attach to the signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub authorization: String,
    pub amz_date: String,
    pub content_sha256: String,
    /// Present only when signing with temporary credentials.
    pub security_token: Option<String>,
}

/// Sign a POST request for the given service endpoint.
///
/// `path` is the canonical URI (already percent-encoded as it will be
/// sent); the query string is empty for all endpoints this crate calls.
pub fn sign_post(
    credentials: &AwsCredentials,
    host: &str,
    path: &str,
    region: &str,
    service: &str,
    body: &[u8],
    timestamp: DateTime<Utc>,
) -> SignedHeaders {
    let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = timestamp.format("%Y%m%d").to_string();

    let content_hash = sha256_hex(body);

    // Canonical headers: lowercase names, sorted, newline-terminated.
    // The session token header participates only when a token is present.
    let (canonical_headers, signed_headers) = match credentials.session_token.as_deref() {
        Some(token) => (
            format!(
                "host:{host}\nx-amz-content-sha256:{content_hash}\nx-amz-date:{amz_date}\nx-amz-security-token:{token}\n"
            ),
            "host;x-amz-content-sha256;x-amz-date;x-amz-security-token",
        ),
        None => (
            format!("host:{host}\nx-amz-content-sha256:{content_hash}\nx-amz-date:{amz_date}\n"),
            "host;x-amz-content-sha256;x-amz-date",
        ),
    };

    let canonical_request = [
        "POST",
        path,
        "", // query string
        &canonical_headers,
        signed_headers,
        &content_hash,
    ]
    .join("\n");

    let credential_scope = format!("{date_stamp}/{region}/{service}/aws4_request");
    let string_to_sign = [
        ALGORITHM,
        &amz_date,
        &credential_scope,
        &sha256_hex(canonical_request.as_bytes()),
    ]
    .join("\n");

    let signing_key = derive_signing_key(&credentials.secret_key, &date_stamp, region, service);
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    let authorization = format!(
        "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
        credentials.access_key
    );

    SignedHeaders {
        authorization,
        amz_date,
        content_sha256: content_hash,
        security_token: credentials.session_token.clone(),
    }
}

/// Derive the signing key by chaining HMAC-SHA256 over the secret key,
/// date stamp, region, service name, and the literal request suffix.
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_secret = format!("AWS4{secret_key}");
    let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

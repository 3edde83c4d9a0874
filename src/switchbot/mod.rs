pub mod models;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use tracing::{debug, error, warn};
use uuid::Uuid;

use self::models::{ApiResponse, DeviceList, DeviceStatus};

type HmacSha256 = Hmac<Sha256>;

/// Hard deadline for a single HTTP attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// SwitchBot API v1.1 client.
///
/// Every request carries a fresh time-nonce-HMAC signature. Transport-level
/// failures on the status fetch are retried with exponential backoff;
/// application-level errors in the response envelope are terminal.
#[derive(Debug, Clone)]
pub struct SwitchBotClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    base_url: String,
    token: String,
    secret: String,
    max_retries: u32,
}

impl SwitchBotClient {
    pub fn new(base_url: &str, token: &str, secret: &str, max_retries: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                http: Client::new(),
                base_url: base_url.trim_end_matches('/').to_owned(),
                token: token.to_owned(),
                secret: secret.to_owned(),
                max_retries: max_retries.max(1),
            }),
        }
    }

    /// GET `{base}/devices/{id}/status` with retry.
    ///
    /// `Ok(None)` means the API answered with a non-success status code or
    /// an empty body; terminal, never retried. `Err` means transport-level
    /// failure after exhausting all attempts.
    pub async fn get_device_status(&self, device_id: &str) -> Result<Option<DeviceStatus>> {
        let url = format!("{}/devices/{}/status", self.inner.base_url, device_id);
        retry_with_backoff(self.inner.max_retries, |attempt| {
            let url = url.as_str();
            async move {
                debug!(device_id, attempt, url, "Fetching device status");
                self.request::<DeviceStatus>(url).await
            }
        })
        .await
    }

    /// GET `{base}/devices`. A single attempt; failures propagate
    /// immediately with no retry.
    pub async fn get_device_list(&self) -> Result<Option<DeviceList>> {
        let url = format!("{}/devices", self.inner.base_url);
        debug!(url = %url, "Fetching device list");
        self.request::<DeviceList>(&url).await
    }

    /// One signed GET attempt. Transport failures surface as `Err` (the
    /// retryable class); an application-level error code is logged and
    /// mapped to `Ok(None)`.
    async fn request<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        let headers = to_header_map(build_auth_headers(&self.inner.token, &self.inner.secret))?;

        let envelope = self
            .inner
            .http
            .get(url)
            .headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("SwitchBot request failed")?
            .error_for_status()
            .context("SwitchBot endpoint returned error status")?
            .json::<ApiResponse<T>>()
            .await
            .context("Failed to deserialize SwitchBot response")?;

        if envelope.is_success() {
            Ok(envelope.body)
        } else {
            error!(
                status_code = envelope.status_code,
                message = %envelope.message,
                "SwitchBot API returned an error"
            );
            Ok(None)
        }
    }
}

/// Runs `op` up to `max_attempts` times, sleeping `2^attempt` seconds
/// (starting at 1 s) between failures. The error from the final attempt is
/// propagated.
async fn retry_with_backoff<T, F, Fut>(max_attempts: u32, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(e);
                }
                let delay = Duration::from_secs(1u64 << (attempt - 1));
                warn!(
                    attempt,
                    max_attempts,
                    delay_secs = delay.as_secs(),
                    error = %e,
                    "Request failed; backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Signing helpers
// ---------------------------------------------------------------------------

/// Deterministic signing inputs used by tests.
#[derive(Debug)]
struct SigningContext<'a> {
    token: &'a str,
    secret: &'a str,
    /// 13-digit Unix timestamp in milliseconds
    t: &'a str,
    nonce: &'a str,
}

/// Build the SwitchBot v1.1 signed request headers.
///
/// `sign = base64(HMAC-SHA256(secret, token || t || nonce))`. Every call
/// draws a fresh nonce and timestamp, so signatures are never reused or
/// cached.
fn build_auth_headers(token: &str, secret: &str) -> HashMap<String, String> {
    let t = chrono::Utc::now().timestamp_millis().to_string();
    let nonce = Uuid::new_v4().to_string();
    build_auth_headers_inner(&SigningContext {
        token,
        secret,
        t: &t,
        nonce: &nonce,
    })
}

/// Inner implementation that accepts an explicit `SigningContext` so that
/// unit tests can inject deterministic timestamp and nonce values.
fn build_auth_headers_inner(ctx: &SigningContext<'_>) -> HashMap<String, String> {
    let string_to_sign = format!("{}{}{}", ctx.token, ctx.t, ctx.nonce);

    let sign = {
        let mut mac = HmacSha256::new_from_slice(ctx.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(string_to_sign.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    };

    let mut headers = HashMap::new();
    headers.insert("Authorization".to_owned(), ctx.token.to_owned());
    headers.insert("Content-Type".to_owned(), "application/json".to_owned());
    headers.insert("charset".to_owned(), "utf8".to_owned());
    headers.insert("t".to_owned(), ctx.t.to_owned());
    headers.insert("sign".to_owned(), sign);
    headers.insert("nonce".to_owned(), ctx.nonce.to_owned());
    headers
}

/// Convert our string `HashMap` into a `reqwest::header::HeaderMap`.
fn to_header_map(map: HashMap<String, String>) -> Result<reqwest::header::HeaderMap> {
    let mut header_map = reqwest::header::HeaderMap::new();
    for (k, v) in map {
        let name = reqwest::header::HeaderName::from_bytes(k.as_bytes())
            .with_context(|| format!("invalid header name: {k}"))?;
        let value = reqwest::header::HeaderValue::from_str(&v)
            .with_context(|| format!("invalid header value for {k}"))?;
        header_map.insert(name, value);
    }
    Ok(header_map)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use anyhow::anyhow;

    use super::*;

    const TOKEN: &str = "test-token-0123456789abcdef";
    const SECRET: &str = "test-secret-fedcba9876543210";
    const T: &str = "1717200000000";
    const NONCE: &str = "5138cc3a-9033-d698-5692-3fd07b491173";

    fn hmac_base64(secret: &str, message: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(message.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn sign_matches_manual_computation() {
        let headers = build_auth_headers_inner(&SigningContext {
            token: TOKEN,
            secret: SECRET,
            t: T,
            nonce: NONCE,
        });

        let expected = hmac_base64(SECRET, &format!("{TOKEN}{T}{NONCE}"));
        assert_eq!(headers["sign"], expected);
        assert_eq!(headers["Authorization"], TOKEN);
        assert_eq!(headers["t"], T);
        assert_eq!(headers["nonce"], NONCE);
        assert_eq!(headers["Content-Type"], "application/json");
        assert_eq!(headers["charset"], "utf8");
    }

    #[test]
    fn sign_is_base64_of_a_sha256_digest() {
        let headers = build_auth_headers_inner(&SigningContext {
            token: TOKEN,
            secret: SECRET,
            t: T,
            nonce: NONCE,
        });
        let decoded = BASE64.decode(headers["sign"].as_bytes()).unwrap();
        assert_eq!(decoded.len(), 32, "HMAC-SHA256 digest is 32 bytes");
    }

    #[test]
    fn secret_never_appears_in_headers() {
        let headers = build_auth_headers(TOKEN, SECRET);
        assert!(headers.values().all(|v| !v.contains(SECRET)));
    }

    #[test]
    fn successive_calls_produce_fresh_nonce_and_sign() {
        // Both calls land within the same millisecond often enough that
        // uniqueness must come from the nonce alone.
        let first = build_auth_headers(TOKEN, SECRET);
        let second = build_auth_headers(TOKEN, SECRET);
        assert_ne!(first["nonce"], second["nonce"]);
        assert_ne!(first["sign"], second["sign"]);
    }

    #[test]
    fn to_header_map_converts_correctly() {
        let mut map = HashMap::new();
        map.insert("Authorization".to_owned(), "abc".to_owned());
        map.insert("nonce".to_owned(), "DEF123".to_owned());

        let hm = to_header_map(map).expect("should convert");
        assert_eq!(hm["authorization"], "abc");
        assert_eq!(hm["nonce"], "DEF123");
    }

    #[tokio::test(start_paused = true)]
    async fn retry_recovers_after_transient_failures_with_backoff() {
        let attempts = Cell::new(0u32);
        let start = tokio::time::Instant::now();

        let result = retry_with_backoff(3, |_| {
            let n = attempts.get() + 1;
            attempts.set(n);
            async move {
                if n < 3 {
                    Err(anyhow!("connection reset"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.get(), 3);
        // 1 s after the first failure, 2 s after the second.
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_propagates_the_final_error_after_exhaustion() {
        let attempts = Cell::new(0u32);

        let result: Result<()> = retry_with_backoff(3, |_| {
            attempts.set(attempts.get() + 1);
            async { Err(anyhow!("timed out")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_outcome_is_never_retried() {
        // An application-level API error maps to Ok(None), which the retry
        // loop treats as a result, not a failure.
        let attempts = Cell::new(0u32);
        let start = tokio::time::Instant::now();

        let result = retry_with_backoff(3, |_| {
            attempts.set(attempts.get() + 1);
            async { Ok(None::<DeviceStatus>) }
        })
        .await;

        assert!(result.unwrap().is_none());
        assert_eq!(attempts.get(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}

//! HTTP retry helpers for transient errors.
//!
//! Map requests sit on the interactive path, so retries are few and short:
//! a user who keeps panning supersedes the request anyway. Only transient
//! failures are retried (timeouts, connection resets, HTTP 429 and 5xx).

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::ApiError;

/// Maximum number of retry attempts for transient HTTP errors.
///
/// With the backoff below (250ms, 500ms) the total wait before giving up
/// is 750ms.
const MAX_RETRIES: u32 = 2;

/// Delay before the first retry; doubled on each further attempt.
const BASE_DELAY_MS: u64 = 250;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 300;

/// Sends the request built by `build_request` and decodes the JSON body.
///
/// The closure is called once per attempt since builders are consumed by
/// `.send()`.
///
/// # Errors
///
/// Returns [`ApiError`] if the request fails after all retries, the server
/// answers with a non-retryable status, or the body is not valid JSON for
/// `T`.
pub async fn send_json<T, F>(build_request: F) -> Result<T, ApiError>
where
    T: DeserializeOwned,
    F: Fn() -> reqwest::RequestBuilder + Send + Sync,
{
    let response = send_inner(&build_request, MAX_RETRIES).await?;
    let url = response.url().to_string();
    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|e| {
        let preview = if text.len() > BODY_PREVIEW_LEN {
            let end = (0..=BODY_PREVIEW_LEN)
                .rev()
                .find(|&i| text.is_char_boundary(i))
                .unwrap_or(0);
            format!("{}...", &text[..end])
        } else {
            text.clone()
        };
        log::error!(
            "JSON parse failed.\n  \
             url: {url}\n  \
             received: {} bytes\n  \
             parse error: {e}\n  \
             body preview: {preview}",
            text.len(),
        );
        ApiError::Json(e)
    })
}

async fn send_inner<F>(build_request: &F, max_retries: u32) -> Result<reqwest::Response, ApiError>
where
    F: Fn() -> reqwest::RequestBuilder + Send + Sync,
{
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            let delay = Duration::from_millis(BASE_DELAY_MS << (attempt - 1));
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < max_retries {
                    log::warn!("  transient error: {e}");
                    attempt += 1;
                    continue;
                }
                return Err(ApiError::Http(e));
            }
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                if is_retryable_status(status) && attempt < max_retries {
                    log::warn!("  HTTP {status} from {}", response.url());
                    attempt += 1;
                    continue;
                }

                return Err(ApiError::Status {
                    status: status.as_u16(),
                    url: response.url().to_string(),
                });
            }
        }
    }
}

/// 429 and 5xx are worth another attempt; other 4xx are permanent.
fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

//! Shared HTTP client construction. Every adapter that speaks HTTP builds
//! its client through here rather than repeating the timeout/size-cap
//! configuration, matching the one-client-built-once pattern both the
//! kubeowler client and the cldbar Claude provider use.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

pub fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("request cancelled")]
    Cancelled,
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
}

/// Races `req.send()` against `ctx`, the same cancellable-suspension-point
/// pattern `utils::subprocess::run` applies to child processes.
pub async fn send_cancellable(req: reqwest::RequestBuilder, ctx: &CancellationToken) -> Result<reqwest::Response, HttpError> {
    tokio::select! {
        _ = ctx.cancelled() => Err(HttpError::Cancelled),
        result = req.send() => Ok(result?),
    }
}

/// Reads a response body, refusing to buffer more than `MAX_RESPONSE_BYTES`.
pub async fn capped_text(resp: reqwest::Response) -> Result<String, reqwest::Error> {
    let bytes = resp.bytes().await?;
    let capped = if bytes.len() > MAX_RESPONSE_BYTES {
        &bytes[..MAX_RESPONSE_BYTES]
    } else {
        &bytes[..]
    };
    Ok(String::from_utf8_lossy(capped).into_owned())
}

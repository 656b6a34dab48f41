//! Remote compression API
//!
//! Two steps: the image is POSTed to `<url>/shrink` with basic auth, the
//! service answers with a `Location` header, and the compressed file is then
//! downloaded from that location. Upload and download have separate
//! timeouts. Outages are retried with exponential backoff before the call
//! gives up with `ThirdPartyUnavailable`.

use super::Compresser;
use crate::errors::{AppError, AppResult, ErrorKind};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode, header};
use std::time::Duration;
use tracing::{debug, warn};

const BASE_BACKOFF: Duration = Duration::from_millis(200);
const API_USER: &str = "api";

pub struct ShrinkCompresser {
    client: Client,
    base_url: String,
    key: String,
    retries: u32,
    upload_timeout: Duration,
    download_timeout: Duration,
}

impl ShrinkCompresser {
    pub fn new(
        url: &str,
        key: &str,
        retries: u32,
        upload_timeout: Duration,
        download_timeout: Duration,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("picrank/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            retries,
            upload_timeout,
            download_timeout,
        })
    }

    async fn upload(&self, bytes: Bytes) -> AppResult<String> {
        let response = self
            .client
            .post(format!("{}/shrink", self.base_url))
            .basic_auth(API_USER, Some(&self.key))
            .timeout(self.upload_timeout)
            .body(bytes)
            .send()
            .await
            .map_err(unavailable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::new(
                classify(status),
                format!("shrink upload answered {status}"),
            ));
        }

        response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::new(
                    ErrorKind::ThirdPartyUnavailable,
                    "shrink upload answered without a Location header",
                )
            })
    }

    async fn download(&self, location: &str) -> AppResult<Bytes> {
        let response = self
            .client
            .get(location)
            .basic_auth(API_USER, Some(&self.key))
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(unavailable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::new(
                classify(status),
                format!("shrink download answered {status}"),
            ));
        }
        response.bytes().await.map_err(unavailable)
    }

    async fn attempt(&self, bytes: Bytes) -> AppResult<Bytes> {
        let location = self.upload(bytes).await?;
        self.download(&location).await
    }
}

fn unavailable(err: reqwest::Error) -> AppError {
    AppError::new(ErrorKind::ThirdPartyUnavailable, err.to_string())
}

fn classify(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNSUPPORTED_MEDIA_TYPE => ErrorKind::NotImage,
        _ => ErrorKind::ThirdPartyUnavailable,
    }
}

/// Delay before retry number `attempt` (1-based)
fn backoff(attempt: u32) -> Duration {
    BASE_BACKOFF.saturating_mul(1u32 << attempt.saturating_sub(1).min(10))
}

#[async_trait]
impl Compresser for ShrinkCompresser {
    async fn compress(&self, bytes: Bytes) -> AppResult<Bytes> {
        let size = bytes.len();
        let mut attempt = 0;
        loop {
            match self.attempt(bytes.clone()).await {
                Ok(out) => {
                    debug!(before = size, after = out.len(), attempt, "Image shrunk");
                    return Ok(out);
                }
                Err(err) if err.is(ErrorKind::ThirdPartyUnavailable) && attempt < self.retries => {
                    attempt += 1;
                    let delay = backoff(attempt);
                    warn!("Shrink attempt {} failed, retrying in {:?}: {}", attempt, delay, err);
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// An empty upload is answered with 400 when the key is accepted
    async fn health(&self) -> AppResult<()> {
        let response = self
            .client
            .post(format!("{}/shrink", self.base_url))
            .basic_auth(API_USER, Some(&self.key))
            .timeout(self.upload_timeout)
            .send()
            .await
            .map_err(|e| AppError::new(ErrorKind::BadHealthCompressor, e.to_string()))?;

        match response.status() {
            StatusCode::BAD_REQUEST => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(AppError::new(
                ErrorKind::BadHealthCompressor,
                format!("shrink health answered {status}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff(1), Duration::from_millis(200));
        assert_eq!(backoff(2), Duration::from_millis(400));
        assert_eq!(backoff(3), Duration::from_millis(800));
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(classify(StatusCode::BAD_REQUEST), ErrorKind::NotImage);
        assert_eq!(classify(StatusCode::UNSUPPORTED_MEDIA_TYPE), ErrorKind::NotImage);
        assert_eq!(classify(StatusCode::UNAUTHORIZED), ErrorKind::ThirdPartyUnavailable);
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS), ErrorKind::ThirdPartyUnavailable);
        assert_eq!(classify(StatusCode::SERVICE_UNAVAILABLE), ErrorKind::ThirdPartyUnavailable);
    }

    #[tokio::test]
    async fn test_retries_exhaust_into_unavailable() {
        let compresser = ShrinkCompresser::new(
            "http://127.0.0.1:9",
            "key",
            1,
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();
        let err = compresser.compress(Bytes::from_static(b"img")).await.unwrap_err();
        assert!(err.is(ErrorKind::ThirdPartyUnavailable));
    }
}

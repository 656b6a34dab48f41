//! External HTTP image service
//!
//! The file is POSTed as-is to `<url>/compress` and the response body is the
//! compressed image. `<url>/health` answers the health probe.

use super::Compresser;
use crate::errors::{AppError, AppResult, ErrorKind};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode, header};
use std::time::Duration;
use tracing::{debug, warn};

pub struct ImaginaryCompresser {
    client: Client,
    base_url: String,
}

impl ImaginaryCompresser {
    pub fn new(url: &str, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("picrank/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
        })
    }
}

/// Client errors mean the service refused the content, anything else is an
/// outage
fn classify(status: StatusCode) -> ErrorKind {
    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        ErrorKind::NotImage
    } else {
        ErrorKind::ThirdPartyUnavailable
    }
}

#[async_trait]
impl Compresser for ImaginaryCompresser {
    async fn compress(&self, bytes: Bytes) -> AppResult<Bytes> {
        let size = bytes.len();
        let response = self
            .client
            .post(format!("{}/compress", self.base_url))
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| {
                warn!("Image service request failed: {}", e);
                AppError::new(ErrorKind::ThirdPartyUnavailable, e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::new(
                classify(status),
                format!("image service answered {status}"),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::new(ErrorKind::ThirdPartyUnavailable, e.to_string()))?;
        debug!(before = size, after = body.len(), "Image compressed remotely");
        Ok(body)
    }

    async fn health(&self) -> AppResult<()> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| AppError::new(ErrorKind::BadHealthCompressor, e.to_string()))?;
        if !response.status().is_success() {
            return Err(AppError::new(
                ErrorKind::BadHealthCompressor,
                format!("image service health answered {}", response.status()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(classify(StatusCode::BAD_REQUEST), ErrorKind::NotImage);
        assert_eq!(classify(StatusCode::UNSUPPORTED_MEDIA_TYPE), ErrorKind::NotImage);
        assert_eq!(
            classify(StatusCode::TOO_MANY_REQUESTS),
            ErrorKind::ThirdPartyUnavailable
        );
        assert_eq!(
            classify(StatusCode::BAD_GATEWAY),
            ErrorKind::ThirdPartyUnavailable
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        // Nothing listens on the discard port
        let compresser =
            ImaginaryCompresser::new("http://127.0.0.1:9/", Duration::from_secs(2)).unwrap();
        let err = compresser
            .compress(Bytes::from_static(b"img"))
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::ThirdPartyUnavailable));
        assert!(compresser.health().await.unwrap_err().is(ErrorKind::BadHealthCompressor));
    }
}

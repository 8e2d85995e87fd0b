use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::ResourceTransfer;
use super::error::TransferError;
use super::types::{DownloadRequest, UploadRequest};

/// HTTP client for the resource-transfer gateway.
///
/// The gateway performs the actual object transfer; a 2xx response means the
/// resource was fetched or pushed. Repeating a request for the same object
/// is idempotent on the gateway side, which is what makes these calls safe
/// to retry.
pub struct HttpTransferClient {
    client: Client,
    base_url: String,
}

impl HttpTransferClient {
    /// Create a client pointing at the given gateway base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransferError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn post_json<B: serde::Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<(), TransferError> {
        let url = format!("{}/{endpoint}", self.base_url.trim_end_matches('/'));
        let response = self.client.post(&url).json(body).send().await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(TransferError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(TransferError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl ResourceTransfer for HttpTransferClient {
    async fn download(&self, token: &str, key: &str) -> Result<(), TransferError> {
        let req = DownloadRequest {
            token: token.to_string(),
            key: key.to_string(),
        };
        self.post_json("v1/download", &req).await
    }

    async fn upload(
        &self,
        token: &str,
        local_key: &str,
        remote_url: &str,
    ) -> Result<(), TransferError> {
        let req = UploadRequest {
            token: token.to_string(),
            local_key: local_key.to_string(),
            remote_url: remote_url.to_string(),
        };
        self.post_json("v1/upload", &req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn download_posts_token_and_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/download"))
            .and(body_partial_json(json!({"token": "tok", "key": "a"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpTransferClient::new(server.uri()).unwrap();
        client.download("tok", "a").await.unwrap();
    }

    #[tokio::test]
    async fn upload_posts_local_key_and_destination() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/upload"))
            .and(body_partial_json(json!({
                "token": "tok",
                "local_key": "artifact-1",
                "remote_url": "out1"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpTransferClient::new(server.uri()).unwrap();
        client.upload("tok", "artifact-1", "out1").await.unwrap();
    }

    #[tokio::test]
    async fn rate_limit_maps_to_rate_limited_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/download"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3"))
            .mount(&server)
            .await;

        let client = HttpTransferClient::new(server.uri()).unwrap();
        let err = client.download("tok", "a").await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::RateLimited {
                retry_after_ms: 3000
            }
        ));
    }

    #[tokio::test]
    async fn server_error_maps_to_api_error_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/download"))
            .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
            .mount(&server)
            .await;

        let client = HttpTransferClient::new(server.uri()).unwrap();
        let err = client.download("tok", "a").await.unwrap_err();
        match err {
            TransferError::Api { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "backend unavailable");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn client_error_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/upload"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
            .mount(&server)
            .await;

        let client = HttpTransferClient::new(server.uri()).unwrap();
        let err = client.upload("bad", "artifact-1", "out1").await.unwrap_err();
        assert!(matches!(err, TransferError::Api { status: 401, .. }));
    }
}

//! Client for the content-addressed storage collaborator.
//!
//! Uploads go through a bridge endpoint that returns the blob's CID;
//! downloads go through a public CID gateway. Both are external
//! services consumed as-is. Transfers made through this crate are
//! pipeline-internal data transport, not paid provider requests.

use agora_types::{AgoraError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// A blob fetched from the storage gateway.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Upload/download contract of the storage collaborator. Stateless per
/// call; safe to share across concurrent tasks.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Upload bytes; returns the content address.
    async fn upload(&self, bytes: Vec<u8>, file_name: &str, content_type: &str)
        -> Result<String>;

    /// Download a blob by content address.
    async fn download(&self, cid: &str) -> Result<StoredBlob>;
}

/// HTTP implementation against a storage bridge (uploads) and a CID
/// gateway (downloads).
pub struct HttpStorageClient {
    bridge_url: String,
    gateway_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct UploadResponse {
    cid: String,
}

impl HttpStorageClient {
    pub fn new(bridge_url: String, gateway_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgoraError::StorageCallFailed(e.to_string()))?;
        Ok(Self {
            bridge_url,
            gateway_url,
            client,
        })
    }

    fn map_err(e: reqwest::Error) -> AgoraError {
        if e.is_timeout() {
            AgoraError::Timeout(format!("storage: {}", e))
        } else {
            AgoraError::StorageCallFailed(e.to_string())
        }
    }
}

#[async_trait]
impl StorageClient for HttpStorageClient {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        content_type: &str,
    ) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)
            .map_err(|e| AgoraError::StorageCallFailed(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/upload", self.bridge_url))
            .multipart(form)
            .send()
            .await
            .map_err(Self::map_err)?
            .error_for_status()
            .map_err(Self::map_err)?;

        let resp: UploadResponse = response.json().await.map_err(Self::map_err)?;
        debug!(cid = %resp.cid, "Blob uploaded");
        Ok(resp.cid)
    }

    #[instrument(skip(self))]
    async fn download(&self, cid: &str) -> Result<StoredBlob> {
        let response = self
            .client
            .get(format!("{}/ipfs/{}", self.gateway_url, cid))
            .send()
            .await
            .map_err(Self::map_err)?
            .error_for_status()
            .map_err(Self::map_err)?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = response.bytes().await.map_err(Self::map_err)?.to_vec();
        debug!(cid, size = data.len(), %content_type, "Blob downloaded");
        Ok(StoredBlob { data, content_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_upload_returns_cid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "cid": "bafyinput" })),
            )
            .mount(&server)
            .await;

        let client = HttpStorageClient::new(
            server.uri(),
            server.uri(),
            Duration::from_secs(2),
        )
        .unwrap();
        let cid = client
            .upload(b"a,b\n1,2\n".to_vec(), "data.csv", "text/csv")
            .await
            .unwrap();
        assert_eq!(cid, "bafyinput");
    }

    #[tokio::test]
    async fn test_download_preserves_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ipfs/bafycard"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(r#"{"payTo":"0xabc","endpoints":{}}"#, "application/json"),
            )
            .mount(&server)
            .await;

        let client = HttpStorageClient::new(
            server.uri(),
            server.uri(),
            Duration::from_secs(2),
        )
        .unwrap();
        let blob = client.download("bafycard").await.unwrap();
        assert_eq!(blob.content_type, "application/json");
        assert!(!blob.data.is_empty());
    }

    #[tokio::test]
    async fn test_download_missing_is_storage_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ipfs/bafymissing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpStorageClient::new(
            server.uri(),
            server.uri(),
            Duration::from_secs(2),
        )
        .unwrap();
        let err = client.download("bafymissing").await.unwrap_err();
        assert!(matches!(err, AgoraError::StorageCallFailed(_)));
    }
}

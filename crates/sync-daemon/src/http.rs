//! HTTP implementation of [`RemoteGateway`] using reqwest.
//!
//! Endpoints (relative to the configured server URL):
//! - `GET  /api/documents/sync?lastSyncAt=..` - changes since a cursor
//! - `POST /api/documents/sync` - apply an operation batch
//! - `POST /api/documents/{id}/images/upload` - multipart image upload
//! - `POST /api/auth/sync-token` - exchange credentials for a token

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use std::time::Duration;
use sync_core::gateway::{GatewayError, RemoteGateway, Result};
use sync_core::model::{ChangeSet, Operation};
use sync_core::protocol::{
    ApplyRequest, ApplyResponse, ChangesResponse, TokenRequest, TokenResponse, UploadResponse,
};
use tracing::debug;

/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const SYNC_PATH: &str = "/api/documents/sync";
const TOKEN_PATH: &str = "/api/auth/sync-token";

/// Remote gateway talking to the document server.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpGateway {
    /// Create a gateway for `server_url` authenticating with `token`.
    pub fn new(server_url: &str, token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: normalize_base_url(server_url)?,
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        if self.token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.token)
        }
    }
}

fn build_client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(transport)
}

/// Validate a server URL and strip any trailing slash.
pub fn normalize_base_url(server_url: &str) -> Result<String> {
    let trimmed = server_url.trim().trim_end_matches('/');
    let url = Url::parse(trimmed).map_err(|e| {
        GatewayError::Transport(format!("Invalid server URL {:?}: {}", server_url, e))
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(GatewayError::Transport(format!(
            "Server URL must start with http:// or https://, got {:?}",
            server_url
        )));
    }
    Ok(trimmed.to_string())
}

fn transport(e: reqwest::Error) -> GatewayError {
    if e.is_decode() {
        GatewayError::Decode(e.to_string())
    } else {
        GatewayError::Transport(e.to_string())
    }
}

/// Turn a non-2xx response into [`GatewayError::Status`].
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response.bytes().await.map_err(transport)?;
    serde_json::from_slice(&bytes).map_err(|e| GatewayError::Decode(e.to_string()))
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn fetch_changes(&self, cursor: Option<&str>) -> Result<ChangeSet> {
        let mut request = self.client.get(self.url(SYNC_PATH));
        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            request = request.query(&[("lastSyncAt", cursor)]);
        }
        let response = self.authorized(request).send().await.map_err(transport)?;
        let changes: ChangesResponse = decode(check(response).await?).await?;
        debug!(
            "GET {}: {} folder(s), {} document(s)",
            SYNC_PATH,
            changes.folders.len(),
            changes.documents.len()
        );
        Ok(changes.into())
    }

    async fn apply_operations(&self, operations: &[Operation]) -> Result<String> {
        let request = self
            .client
            .post(self.url(SYNC_PATH))
            .json(&ApplyRequest::new(operations));
        let response = self.authorized(request).send().await.map_err(transport)?;
        let applied: ApplyResponse = decode(check(response).await?).await?;
        debug!("POST {}: {} operation(s)", SYNC_PATH, operations.len());
        Ok(applied.last_sync_at)
    }

    async fn upload_blob(&self, owner_id: &str, filename: &str, bytes: Vec<u8>) -> Result<String> {
        let path = format!("/api/documents/{}/images/upload", owner_id);
        let form = Form::new().part("file", Part::bytes(bytes).file_name(filename.to_string()));
        let request = self.client.post(self.url(&path)).multipart(form);
        let response = self.authorized(request).send().await.map_err(transport)?;
        let uploaded: UploadResponse = decode(check(response).await?).await?;
        debug!("Uploaded {} for {}", filename, owner_id);
        Ok(uploaded.url)
    }

    async fn download_blob(&self, url: &str) -> Result<Vec<u8>> {
        // Blob URLs are public; the bearer token stays with the server.
        let response = self.client.get(url).send().await.map_err(transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(GatewayError::BlobNotFound(url.to_string()));
        }
        let bytes = check(response).await?.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }
}

/// Exchange email and password for a sync token.
pub async fn request_token(server_url: &str, email: &str, password: &str) -> Result<String> {
    let base_url = normalize_base_url(server_url)?;
    let body = TokenRequest {
        email: email.to_string(),
        password: password.to_string(),
    };
    let response = build_client()?
        .post(format!("{}{}", base_url, TOKEN_PATH))
        .json(&body)
        .send()
        .await
        .map_err(transport)?;
    let issued: TokenResponse = decode(check(response).await?).await?;
    if issued.token.is_empty() {
        return Err(GatewayError::Decode("Server returned an empty token".into()));
    }
    Ok(issued.token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        assert_eq!(
            normalize_base_url("https://app.example.com/").unwrap(),
            "https://app.example.com"
        );
        assert_eq!(
            normalize_base_url(" http://localhost:3000 ").unwrap(),
            "http://localhost:3000"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(normalize_base_url("not a url").is_err());
        assert!(normalize_base_url("ftp://example.com").is_err());
    }

    #[test]
    fn test_endpoint_urls() {
        let gateway = HttpGateway::new("https://app.example.com/", "token").unwrap();
        assert_eq!(
            gateway.url(SYNC_PATH),
            "https://app.example.com/api/documents/sync"
        );
    }
}

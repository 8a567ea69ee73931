//! Google Cloud Storage adapter over the JSON API.
//!
//! Authentication is the caller environment's job: pass a ready OAuth2
//! access token (e.g. from workload identity) with
//! [`GcsObjectStore::with_bearer_token`]. Downloads are streamed to disk so a
//! large artifact never sits in memory; segment uploads are bounded in size
//! by construction and are sent in one request.
//!
//! Staged objects are returned as `gs://` URIs; the inference adapter hands
//! them to providers as `https://storage.googleapis.com/<bucket>/<object>`,
//! so the provider needs read access to the staging bucket.

use super::{GcsUri, ObjectStore};
use crate::error::StorageError;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

const DEFAULT_API_BASE: &str = "https://storage.googleapis.com";

/// An [`ObjectStore`] whose staging area is one GCS bucket.
#[derive(Debug, Clone)]
pub struct GcsObjectStore {
    client: Client,
    bucket: String,
    token: Option<String>,
    api_base: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    items: Vec<ListItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    name: String,
}

impl GcsObjectStore {
    /// Store staging into `bucket`, with a per-request timeout.
    pub fn new(bucket: impl Into<String>, request_timeout: Duration) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| StorageError::Request {
                target: "client".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            bucket: bucket.into(),
            token: None,
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Point at a different API endpoint (emulators, tests).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn url(&self, segments: &[&str]) -> Result<Url, StorageError> {
        let mut url = Url::parse(&self.api_base).map_err(|e| StorageError::InvalidUri {
            uri: self.api_base.clone(),
            reason: e.to_string(),
        })?;
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidUri {
                uri: self.api_base.clone(),
                reason: "API base cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn object_url(&self, bucket: &str, object: &str) -> Result<Url, StorageError> {
        self.url(&["storage", "v1", "b", bucket, "o", object])
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder, target: &str) -> Result<reqwest::Response, StorageError> {
        let response = self
            .authorized(req)
            .send()
            .await
            .map_err(|e| StorageError::Request {
                target: target.to_string(),
                reason: e.to_string(),
            })?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound {
                uri: target.to_string(),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Http {
                status: status.as_u16(),
                target: target.to_string(),
                message,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn download(&self, uri: &str, dest: &Path) -> Result<(), StorageError> {
        let location = GcsUri::parse(uri)?;
        let mut url = self.object_url(&location.bucket, &location.object)?;
        url.query_pairs_mut().append_pair("alt", "media");

        info!("Downloading {}", uri);
        let response = self.send(self.client.get(url), uri).await?;

        let io = |source| StorageError::Io {
            path: dest.to_path_buf(),
            source,
        };
        let mut file = tokio::fs::File::create(dest).await.map_err(io)?;
        let mut body = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| StorageError::Request {
                target: uri.to_string(),
                reason: e.to_string(),
            })?;
            file.write_all(&chunk).await.map_err(io)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io)?;
        debug!("Downloaded {} bytes to {}", written, dest.display());
        Ok(())
    }

    async fn upload(&self, src: &Path, key: &str, content_type: &str) -> Result<String, StorageError> {
        let bytes = tokio::fs::read(src).await.map_err(|source| StorageError::Io {
            path: src.to_path_buf(),
            source,
        })?;
        let mut url = self.url(&["upload", "storage", "v1", "b", &self.bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", key);

        let req = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);
        self.send(req, key).await?;
        Ok(GcsUri {
            bucket: self.bucket.clone(),
            object: key.to_string(),
        }
        .to_string())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let url = self.object_url(&self.bucket, key)?;
        match self.send(self.client.delete(url), key).await {
            Ok(_) | Err(StorageError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = self.url(&["storage", "v1", "b", &self.bucket, "o"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("prefix", prefix).append_pair("fields", "items(name),nextPageToken");
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }
            let response = self.send(self.client.get(url), prefix).await?;
            let body = response.bytes().await.map_err(|e| StorageError::Request {
                target: prefix.to_string(),
                reason: e.to_string(),
            })?;
            let page: ListPage = serde_json::from_slice(&body).map_err(|e| StorageError::Request {
                target: prefix.to_string(),
                reason: format!("unreadable listing: {e}"),
            })?;
            keys.extend(page.items.into_iter().map(|item| item.name));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> GcsObjectStore {
        GcsObjectStore::new("staging", Duration::from_secs(5))
            .unwrap()
            .with_api_base(server.uri())
            .with_bearer_token("test-token")
    }

    #[tokio::test]
    async fn upload_returns_gs_uri() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/storage/v1/b/staging/o"))
            .and(query_param("uploadType", "media"))
            .and(query_param("name", "tmp_chunks/run/a.pdf"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"name":"tmp_chunks/run/a.pdf"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.pdf");
        tokio::fs::write(&src, b"%PDF-1.7").await.unwrap();

        let uri = store(&server)
            .upload(&src, "tmp_chunks/run/a.pdf", "application/pdf")
            .await
            .unwrap();
        assert_eq!(uri, "gs://staging/tmp_chunks/run/a.pdf");
    }

    #[tokio::test]
    async fn delete_treats_404_as_done() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path_regex(r"^/storage/v1/b/staging/o/.+$"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        store(&server).delete("tmp_chunks/run/gone.pdf").await.unwrap();
    }

    #[tokio::test]
    async fn delete_surfaces_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(503).set_body_string("backend busy"))
            .mount(&server)
            .await;

        let err = store(&server).delete("k.pdf").await.unwrap_err();
        assert!(matches!(err, StorageError::Http { status: 503, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn list_follows_page_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/staging/o"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"items":[{"name":"tmp/c"}]}"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/staging/o"))
            .and(query_param("prefix", "tmp/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"items":[{"name":"tmp/a"},{"name":"tmp/b"}],"nextPageToken":"p2"}"#),
            )
            .mount(&server)
            .await;

        let keys = store(&server).list("tmp/").await.unwrap();
        assert_eq!(keys, vec!["tmp/a", "tmp/b", "tmp/c"]);
    }

    #[tokio::test]
    async fn list_empty_bucket() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/staging/o"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;
        assert!(store(&server).list("tmp/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn download_streams_to_disk() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/storage/v1/b/decks/o/.+$"))
            .and(query_param("alt", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 body".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("input.pdf");
        store(&server)
            .download("gs://decks/inbox/acme.pdf", &dest)
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"%PDF-1.4 body");
    }

    #[tokio::test]
    async fn download_missing_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let err = store(&server)
            .download("gs://decks/missing.pdf", &dir.path().join("x.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }
}

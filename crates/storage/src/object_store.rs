//! Remote object storage for photo and PDF binaries.
//!
//! [`HttpObjectStore`] talks to a storage REST endpoint of the form
//! `{base_url}/object/{bucket}/{path}` with bearer authentication.
//! [`MemoryObjectStore`] keeps objects in process for tests and demos.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;

use continuity_core::EntityId;

use crate::error::StorageError;

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Object path of a photo binary.
pub fn photo_path(project_id: EntityId, photo_id: EntityId) -> String {
    format!("projects/{project_id}/photos/{photo_id}.jpg")
}

/// Object path of a document PDF; `kind` is e.g. `schedules`.
pub fn document_path(project_id: EntityId, kind: &str, document_id: EntityId) -> String {
    format!("projects/{project_id}/{kind}/{document_id}.pdf")
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` at `path`, replacing any existing object.
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<(), StorageError>;

    async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError>;
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    access_token: Option<String>,
}

impl HttpObjectStore {
    /// * `base_url` - Storage API root, e.g. `https://host/storage/v1`.
    pub fn new(base_url: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, bucket)
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/object/{}/{}", self.base_url, self.bucket, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    /// Map non-2xx responses into [`StorageError`]s.
    async fn ensure_success(
        path: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StorageError::AuthRequired),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(path.to_string())),
            _ => {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<unreadable body>".to_string());
                Err(StorageError::Http {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let size = bytes.len();
        let request = self
            .client
            .post(self.object_url(path))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes);
        let response = self.authorize(request).send().await?;
        Self::ensure_success(path, response).await?;
        tracing::debug!(path, size, "Uploaded object");
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let request = self.client.get(self.object_url(path));
        let response = self.authorize(request).send().await?;
        let response = Self::ensure_success(path, response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryObjects {
    objects: HashMap<String, Vec<u8>>,
    unreachable: bool,
    uploads: usize,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    inner: Mutex<MemoryObjects>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lock().objects.contains_key(path)
    }

    /// Total number of successful uploads.
    pub fn upload_count(&self) -> usize {
        self.lock().uploads
    }

    /// Place an object directly, as another client would have.
    pub fn insert(&self, path: &str, bytes: Vec<u8>) {
        self.lock().objects.insert(path.to_string(), bytes);
    }

    fn lock(&self) -> MutexGuard<'_, MemoryObjects> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if inner.unreachable {
            return Err(StorageError::Unreachable(path.to_string()));
        }
        inner.objects.insert(path.to_string(), bytes);
        inner.uploads += 1;
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let inner = self.lock();
        if inner.unreachable {
            return Err(StorageError::Unreachable(path.to_string()));
        }
        inner
            .objects
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn photo_path_layout() {
        let project = uuid::Uuid::nil();
        let photo = uuid::Uuid::from_u128(1);
        assert_eq!(
            photo_path(project, photo),
            format!("projects/{project}/photos/{photo}.jpg")
        );
    }

    #[test]
    fn object_url_trims_trailing_slash() {
        let store = HttpObjectStore::new("http://localhost:5000/storage/v1/", "continuity");
        assert_eq!(
            store.object_url("projects/p/photos/a.jpg"),
            "http://localhost:5000/storage/v1/object/continuity/projects/p/photos/a.jpg"
        );
    }

    #[tokio::test]
    async fn memory_store_round_trips_and_reports_missing() {
        let store = MemoryObjectStore::new();
        store.upload("a/b.jpg", vec![1, 2, 3], JPEG_CONTENT_TYPE).await.unwrap();
        assert_eq!(store.download("a/b.jpg").await.unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            store.download("a/missing.jpg").await,
            Err(StorageError::NotFound(_))
        ));
        assert_eq!(store.upload_count(), 1);
    }

    #[tokio::test]
    async fn unreachable_memory_store_is_retryable() {
        let store = MemoryObjectStore::new();
        store.set_unreachable(true);
        let err = store.upload("a.jpg", vec![], JPEG_CONTENT_TYPE).await.unwrap_err();
        assert!(err.is_retryable());
    }
}

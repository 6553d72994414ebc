//! State shared by the pull, push and realtime engines of one session.

use std::future::Future;
use std::sync::Arc;

use continuity_core::model::PhotoAngle;
use continuity_core::EntityId;
use continuity_db::RowStore;
use continuity_storage::{ObjectStore, PhotoBlobCache};

use crate::baseline::Baselines;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::inflight::InFlight;
use crate::status::StatusHandle;
use crate::store::LocalStore;

pub struct SyncContext {
    pub rows: Arc<dyn RowStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub cache: PhotoBlobCache,
    pub store: Arc<LocalStore>,
    pub baselines: Arc<Baselines>,
    pub status: StatusHandle,
    pub in_flight: InFlight,
    pub config: SyncConfig,
}

impl SyncContext {
    /// Run one backend call under the request timeout.
    pub async fn call<T, E>(&self, fut: impl Future<Output = Result<T, E>>) -> Result<T, SyncError>
    where
        E: Into<SyncError>,
    {
        bounded(self.config.request_timeout, fut).await
    }

    /// Download `path` into the blob cache unless a valid copy of `id` is
    /// already there. Returns whether anything was downloaded.
    pub async fn cache_remote_photo(
        &self,
        id: EntityId,
        angle: PhotoAngle,
        path: &str,
    ) -> Result<bool, SyncError> {
        if self.cache.contains(id).await {
            return Ok(false);
        }
        let bytes = self.call(self.objects.download(path)).await?;
        self.cache.put(id, &bytes, angle).await?;
        Ok(true)
    }
}

pub(crate) async fn bounded<T, E>(
    timeout: std::time::Duration,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, SyncError>
where
    E: Into<SyncError>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(SyncError::timed_out(timeout)),
    }
}

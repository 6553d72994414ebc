//! On-disk photo blob cache.
//!
//! One directory per photo id:
//!
//! ```text
//! <root>/<photo-id>/full.bin    original bytes
//! <root>/<photo-id>/thumb.jpg   200x200 JPEG, absent if the blob did not decode
//! <root>/<photo-id>/meta.json   CacheMeta
//! ```
//!
//! Every file is written to a temp name and renamed into place, and
//! `meta.json` is written last, so a reader never observes a half-written
//! entry. Photo ids are immutable: once an entry exists its bytes are never
//! replaced. Entries that fail to parse or whose digest does not match are
//! treated as absent.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use continuity_core::hashing::sha256_hex;
use continuity_core::model::PhotoAngle;
use continuity_core::{EntityId, Timestamp};

use crate::error::StorageError;
use crate::thumbnail::make_thumbnail_async;

const BLOB_FILE: &str = "full.bin";
const THUMB_FILE: &str = "thumb.jpg";
const META_FILE: &str = "meta.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub id: EntityId,
    pub angle: PhotoAngle,
    pub sha256: String,
    pub size: u64,
    pub cached_at: Timestamp,
    #[serde(default)]
    pub has_thumbnail: bool,
}

#[derive(Debug, Clone)]
pub struct CachedPhoto {
    pub meta: CacheMeta,
    pub blob: Vec<u8>,
    pub thumbnail: Option<Vec<u8>>,
}

/// What a `put` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// A new entry was written.
    Stored,
    /// The entry existed; only its angle changed.
    AngleUpdated,
    /// The entry existed with the same angle.
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct PhotoBlobCache {
    root: PathBuf,
}

impl PhotoBlobCache {
    /// Open (and create if needed) a cache rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, id: EntityId) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// Read a full entry, verifying its digest.
    pub async fn get(&self, id: EntityId) -> Option<CachedPhoto> {
        let (meta, blob) = self.read_verified(id).await?;

        let thumbnail = if meta.has_thumbnail {
            tokio::fs::read(self.entry_dir(id).join(THUMB_FILE)).await.ok()
        } else {
            None
        };

        Some(CachedPhoto {
            meta,
            blob,
            thumbnail,
        })
    }

    /// Read only the thumbnail of an entry.
    pub async fn get_thumbnail(&self, id: EntityId) -> Option<Vec<u8>> {
        let meta = self.read_meta(id).await?;
        if !meta.has_thumbnail {
            return None;
        }
        tokio::fs::read(self.entry_dir(id).join(THUMB_FILE)).await.ok()
    }

    /// An entry whose blob matches its recorded digest.
    pub async fn contains(&self, id: EntityId) -> bool {
        self.read_verified(id).await.is_some()
    }

    /// Store `blob` under `id`, generating its thumbnail.
    ///
    /// If a valid entry already exists the bytes are left alone and only
    /// the recorded angle may change. A blob that does not decode as an
    /// image is still cached, without a thumbnail.
    pub async fn put(
        &self,
        id: EntityId,
        blob: &[u8],
        angle: PhotoAngle,
    ) -> Result<PutOutcome, StorageError> {
        if let Some(outcome) = self.update_existing(id, angle).await? {
            return Ok(outcome);
        }

        let thumbnail = match make_thumbnail_async(blob.to_vec()).await {
            Ok(thumb) => Some(thumb),
            Err(e) => {
                tracing::warn!(photo_id = %id, error = %e, "Thumbnail generation failed");
                None
            }
        };
        self.write_entry(id, blob, thumbnail.as_deref(), angle).await?;
        Ok(PutOutcome::Stored)
    }

    /// Store `blob` with a thumbnail the caller already produced.
    pub async fn put_with_thumbnail(
        &self,
        id: EntityId,
        blob: &[u8],
        thumbnail: &[u8],
        angle: PhotoAngle,
    ) -> Result<PutOutcome, StorageError> {
        if let Some(outcome) = self.update_existing(id, angle).await? {
            return Ok(outcome);
        }
        self.write_entry(id, blob, Some(thumbnail), angle).await?;
        Ok(PutOutcome::Stored)
    }

    /// Remove an entry. Returns whether anything was there.
    pub async fn delete(&self, id: EntityId) -> Result<bool, StorageError> {
        match tokio::fs::remove_dir_all(self.entry_dir(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    // ---- private helpers ----

    /// Metadata and blob of an entry that passes the integrity check.
    async fn read_verified(&self, id: EntityId) -> Option<(CacheMeta, Vec<u8>)> {
        let meta = self.read_meta(id).await?;
        let blob = match tokio::fs::read(self.entry_dir(id).join(BLOB_FILE)).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(photo_id = %id, error = %e, "Cached blob unreadable");
                return None;
            }
        };
        if blob.len() as u64 != meta.size || sha256_hex(&blob) != meta.sha256 {
            tracing::warn!(photo_id = %id, "Cached blob failed integrity check");
            return None;
        }
        Some((meta, blob))
    }

    async fn read_meta(&self, id: EntityId) -> Option<CacheMeta> {
        let path = self.entry_dir(id).join(META_FILE);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(photo_id = %id, error = %e, "Cache metadata unreadable");
                return None;
            }
        };
        match serde_json::from_str::<CacheMeta>(&text) {
            Ok(meta) if meta.id == id => Some(meta),
            Ok(_) => {
                tracing::warn!(photo_id = %id, "Cache metadata belongs to another photo");
                None
            }
            Err(e) => {
                tracing::warn!(photo_id = %id, error = %e, "Cache metadata malformed");
                None
            }
        }
    }

    /// For an already valid entry, rewrite the angle if it differs.
    async fn update_existing(
        &self,
        id: EntityId,
        angle: PhotoAngle,
    ) -> Result<Option<PutOutcome>, StorageError> {
        let Some((mut meta, _)) = self.read_verified(id).await else {
            return Ok(None);
        };
        if meta.angle == angle {
            return Ok(Some(PutOutcome::Unchanged));
        }
        meta.angle = angle;
        self.write_meta(id, &meta).await?;
        tracing::debug!(photo_id = %id, angle = angle.as_str(), "Updated cached photo angle");
        Ok(Some(PutOutcome::AngleUpdated))
    }

    async fn write_entry(
        &self,
        id: EntityId,
        blob: &[u8],
        thumbnail: Option<&[u8]>,
        angle: PhotoAngle,
    ) -> Result<(), StorageError> {
        let dir = self.entry_dir(id);
        tokio::fs::create_dir_all(&dir).await?;

        write_atomic(&dir.join(BLOB_FILE), blob).await?;
        if let Some(thumb) = thumbnail {
            write_atomic(&dir.join(THUMB_FILE), thumb).await?;
        }

        let meta = CacheMeta {
            id,
            angle,
            sha256: sha256_hex(blob),
            size: blob.len() as u64,
            cached_at: Utc::now(),
            has_thumbnail: thumbnail.is_some(),
        };
        self.write_meta(id, &meta).await?;
        tracing::debug!(photo_id = %id, size = meta.size, "Cached photo");
        Ok(())
    }

    async fn write_meta(&self, id: EntityId, meta: &CacheMeta) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(meta)
            .map_err(|e| StorageError::Io(std::io::Error::new(ErrorKind::InvalidData, e)))?;
        write_atomic(&self.entry_dir(id).join(META_FILE), &bytes).await
    }
}

/// Write `bytes` to a unique temp file beside `path`, then rename it over
/// `path`.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

//! Photo blob cache: storage layout, immutability, integrity.

use std::io::Cursor;

use assert_matches::assert_matches;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};

use continuity_core::model::PhotoAngle;
use continuity_storage::{PhotoBlobCache, PutOutcome};

fn jpeg(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let img = ImageBuffer::from_pixel(width, height, Rgb([shade, 90, 30]));
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
        .unwrap();
    out
}

async fn open() -> (tempfile::TempDir, PhotoBlobCache) {
    let dir = tempfile::tempdir().unwrap();
    let cache = PhotoBlobCache::open(dir.path().join("photos")).await.unwrap();
    (dir, cache)
}

// ---------------------------------------------------------------------------
// Put / get
// ---------------------------------------------------------------------------

#[tokio::test]
async fn put_stores_blob_thumbnail_and_metadata() {
    let (_dir, cache) = open().await;
    let id = uuid::Uuid::new_v4();
    let blob = jpeg(800, 600, 10);

    let outcome = cache.put(id, &blob, PhotoAngle::Front).await.unwrap();
    assert_eq!(outcome, PutOutcome::Stored);

    let cached = cache.get(id).await.unwrap();
    assert_eq!(cached.blob, blob);
    assert_eq!(cached.meta.angle, PhotoAngle::Front);
    assert_eq!(cached.meta.size, blob.len() as u64);
    assert!(cached.meta.has_thumbnail);

    let thumb = cached.thumbnail.unwrap();
    let decoded = image::load_from_memory(&thumb).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (200, 200));

    let entry = cache.root().join(id.to_string());
    assert!(entry.join("full.bin").exists());
    assert!(entry.join("thumb.jpg").exists());
    assert!(entry.join("meta.json").exists());
}

#[tokio::test]
async fn missing_entry_is_absent() {
    let (_dir, cache) = open().await;
    let id = uuid::Uuid::new_v4();
    assert!(cache.get(id).await.is_none());
    assert!(!cache.contains(id).await);
    assert!(cache.get_thumbnail(id).await.is_none());
}

#[tokio::test]
async fn second_put_keeps_bytes_and_updates_angle() {
    let (_dir, cache) = open().await;
    let id = uuid::Uuid::new_v4();
    let original = jpeg(100, 100, 10);
    cache.put(id, &original, PhotoAngle::Front).await.unwrap();

    let outcome = cache.put(id, &jpeg(100, 100, 250), PhotoAngle::Left).await.unwrap();
    assert_eq!(outcome, PutOutcome::AngleUpdated);

    let cached = cache.get(id).await.unwrap();
    assert_eq!(cached.blob, original);
    assert_eq!(cached.meta.angle, PhotoAngle::Left);

    let again = cache.put(id, &original, PhotoAngle::Left).await.unwrap();
    assert_eq!(again, PutOutcome::Unchanged);
}

#[tokio::test]
async fn undecodable_blob_is_cached_without_thumbnail() {
    let (_dir, cache) = open().await;
    let id = uuid::Uuid::new_v4();
    cache.put(id, b"raw sensor dump", PhotoAngle::Back).await.unwrap();

    let cached = cache.get(id).await.unwrap();
    assert_eq!(cached.blob, b"raw sensor dump");
    assert!(cached.thumbnail.is_none());
    assert!(!cached.meta.has_thumbnail);
}

#[tokio::test]
async fn put_with_thumbnail_uses_the_given_thumbnail() {
    let (_dir, cache) = open().await;
    let id = uuid::Uuid::new_v4();
    let thumb = jpeg(200, 200, 99);
    cache
        .put_with_thumbnail(id, &jpeg(640, 480, 1), &thumb, PhotoAngle::Right)
        .await
        .unwrap();
    assert_eq!(cache.get_thumbnail(id).await.unwrap(), thumb);
}

// ---------------------------------------------------------------------------
// Integrity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tampered_blob_is_treated_as_absent() {
    let (_dir, cache) = open().await;
    let id = uuid::Uuid::new_v4();
    let blob = jpeg(64, 64, 10);
    cache.put(id, &blob, PhotoAngle::Front).await.unwrap();

    let mut tampered = blob.clone();
    let last = tampered.len() - 1;
    tampered[last] ^= 0xFF;
    std::fs::write(cache.root().join(id.to_string()).join("full.bin"), &tampered).unwrap();

    assert!(cache.get(id).await.is_none());
    assert!(!cache.contains(id).await);

    // Same size, wrong digest: a fresh put replaces the bytes.
    let outcome = cache.put(id, &blob, PhotoAngle::Front).await.unwrap();
    assert_eq!(outcome, PutOutcome::Stored);
    assert_eq!(cache.get(id).await.unwrap().blob, blob);
}

#[tokio::test]
async fn malformed_metadata_is_treated_as_absent_and_overwritten() {
    let (_dir, cache) = open().await;
    let id = uuid::Uuid::new_v4();
    let blob = jpeg(64, 64, 10);
    cache.put(id, &blob, PhotoAngle::Front).await.unwrap();
    std::fs::write(cache.root().join(id.to_string()).join("meta.json"), "{ not json").unwrap();

    assert!(cache.get(id).await.is_none());
    assert!(!cache.contains(id).await);

    let outcome = cache.put(id, &blob, PhotoAngle::Front).await.unwrap();
    assert_eq!(outcome, PutOutcome::Stored);
    assert!(cache.get(id).await.is_some());
}

#[tokio::test]
async fn delete_removes_the_entry() {
    let (_dir, cache) = open().await;
    let id = uuid::Uuid::new_v4();
    cache.put(id, &jpeg(32, 32, 1), PhotoAngle::Front).await.unwrap();

    assert_matches!(cache.delete(id).await, Ok(true));
    assert!(cache.get(id).await.is_none());
    assert_matches!(cache.delete(id).await, Ok(false));
}

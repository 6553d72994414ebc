//! Binary storage for the continuity sync engine: the on-disk photo blob
//! cache with thumbnails, and the object store photos and PDFs upload to.

pub mod cache;
pub mod error;
pub mod object_store;
pub mod thumbnail;

pub use cache::{CacheMeta, CachedPhoto, PhotoBlobCache, PutOutcome};
pub use error::StorageError;
pub use object_store::{document_path, photo_path, HttpObjectStore, MemoryObjectStore, ObjectStore};

//! Domain model for the continuity sync engine.
//!
//! Zero internal dependencies: the row store, realtime transport, photo
//! cache and sync engine all build on these types.

pub mod category;
pub mod error;
pub mod hashing;
pub mod model;
pub mod tables;
pub mod types;

pub use category::SyncCategory;
pub use error::CoreError;
pub use tables::Table;
pub use types::{EntityId, Timestamp};

//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. [`PgRowStore`](crate::PgRowStore)
//! composes them behind the [`RowStore`](crate::RowStore) trait.

pub mod capture_repo;
pub mod character_repo;
pub mod document_repo;
pub mod junction_repo;
pub mod look_repo;
pub mod photo_repo;
pub mod project_repo;
pub mod scene_repo;

pub use capture_repo::CaptureRepo;
pub use character_repo::CharacterRepo;
pub use document_repo::{CallSheetRepo, ScheduleRepo, ScriptUploadRepo};
pub use junction_repo::{LookSceneRepo, SceneCharacterRepo};
pub use look_repo::LookRepo;
pub use photo_repo::PhotoRepo;
pub use project_repo::ProjectRepo;
pub use scene_repo::SceneRepo;

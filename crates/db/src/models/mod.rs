//! Backend row shapes.
//!
//! Each struct matches one table's columns as selected by the repositories
//! (server-maintained `created_at` / `updated_at` are not part of the
//! shapes the client exchanges). JSON columns stay `serde_json::Value`
//! here; the sync engine's mappers decode them into typed fields and fail
//! loudly on unexpected shapes.

pub mod capture;
pub mod change;
pub mod character;
pub mod document;
pub mod junction;
pub mod look;
pub mod photo;
pub mod project;
pub mod scene;

pub use capture::CaptureRow;
pub use change::{ChangeKind, RowChange};
pub use character::CharacterRow;
pub use document::{CallSheetRow, ScheduleRow, ScriptUploadRow};
pub use junction::{LookSceneRow, SceneCharacterRow};
pub use look::LookRow;
pub use photo::PhotoRow;
pub use project::ProjectRow;
pub use scene::SceneRow;

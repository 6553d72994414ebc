//! Local aggregate shapes held by each client.
//!
//! These are the shapes the UI edits. The backend row shapes live in
//! `continuity-db`; the sync engine's mapper layer translates between them.

pub mod capture;
pub mod character;
pub mod document;
pub mod look;
pub mod photo;
pub mod project;
pub mod scene;

pub use capture::{
    CaptureKey, CapturePhotos, ContinuityEvent, ContinuityFlags, SceneCapture, SfxDetails,
};
pub use character::Character;
pub use document::{Attachment, CallSheet, CastMember, Schedule, ScheduleDay, ScriptUpload};
pub use look::{HairDetails, Look, MakeupDetails};
pub use photo::{Photo, PhotoAngle};
pub use project::{CaptureMap, ProjectState};
pub use scene::{Amendment, FilmingStatus, Scene, SceneLocalFields};

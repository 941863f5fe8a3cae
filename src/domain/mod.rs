//! Domain layer - Pure business logic.

pub mod event;
pub mod identity;
pub mod validation;

pub use event::{StoredFile, UploadEvent, UploadSource};
pub use validation::{ValidationError, Validator};

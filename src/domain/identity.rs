//! Identifier generation for uploads.
//!
//! The stored artifact and the upload event get separate random identifiers so
//! that the same file can later be announced again under a new event identity.

use uuid::Uuid;

/// Storage filename for a new artifact: a fresh UUIDv4 followed by `extension`.
pub fn new_storage_filename(extension: &str) -> String {
    format!("{}{}", Uuid::new_v4(), extension)
}

pub fn new_video_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_storage_filename_keeps_extension() {
        let name = new_storage_filename(".webm");
        assert!(name.ends_with(".webm"));
        let stem = name.trim_end_matches(".webm");
        assert!(Uuid::parse_str(stem).is_ok());
    }

    #[test]
    fn test_storage_filenames_do_not_collide() {
        let names: HashSet<String> = (0..10_000).map(|_| new_storage_filename(".mp4")).collect();
        assert_eq!(names.len(), 10_000);
    }

    #[test]
    fn test_video_id_is_independent_of_filename() {
        let filename = new_storage_filename(".mp4");
        let video_id = new_video_id();
        assert!(!filename.starts_with(&video_id));
        assert!(Uuid::parse_str(&video_id).is_ok());
    }
}

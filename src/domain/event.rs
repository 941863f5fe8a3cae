use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which entry point received the upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadSource {
    Api,
    Gui,
}

impl fmt::Display for UploadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadSource::Api => write!(f, "api"),
            UploadSource::Gui => write!(f, "gui"),
        }
    }
}

/// A file that has been completely written to the upload directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Generated name: identifier + original extension
    pub filename: String,
    /// Location inside the upload directory
    pub path: PathBuf,
    /// Bytes written
    pub size: u64,
    /// Lowercased extension with leading dot
    pub extension: String,
}

/// Message published on the bus once an upload is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEvent {
    pub video_id: String,
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: u64,
    pub file_extension: String,
    pub upload_timestamp: DateTime<Utc>,
    pub upload_source: UploadSource,
}

impl UploadEvent {
    pub fn new(
        video_id: String,
        original_filename: &str,
        stored: &StoredFile,
        source: UploadSource,
    ) -> Self {
        Self {
            video_id,
            filename: stored.filename.clone(),
            original_filename: original_filename.to_string(),
            file_path: stored.path.to_string_lossy().to_string(),
            file_size: stored.size,
            file_extension: stored.extension.clone(),
            upload_timestamp: Utc::now(),
            upload_source: source,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn sample_event() -> UploadEvent {
        let stored = StoredFile {
            filename: "0d9f3c52-7c1e-4a43-9c0b-1f4f6f0b1d2e.mp4".to_string(),
            path: PathBuf::from("uploads/0d9f3c52-7c1e-4a43-9c0b-1f4f6f0b1d2e.mp4"),
            size: 10,
            extension: ".mp4".to_string(),
        };
        UploadEvent::new(
            "5a4c3d2e-1f0a-4b9c-8d7e-6f5a4b3c2d1e".to_string(),
            "clip.mp4",
            &stored,
            UploadSource::Api,
        )
    }

    #[test]
    fn test_event_round_trip() {
        let event = sample_event();
        let decoded = UploadEvent::from_json(&event.to_json().unwrap()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_event_wire_shape() {
        let event = sample_event();
        let value: Value = serde_json::from_slice(&event.to_json().unwrap()).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object.len(), 8);
        assert_eq!(object["upload_source"], "api");
        assert_eq!(object["file_size"], 10);
        assert_eq!(object["file_extension"], ".mp4");
        assert_eq!(
            object["file_path"],
            "uploads/0d9f3c52-7c1e-4a43-9c0b-1f4f6f0b1d2e.mp4"
        );
        let timestamp = object["upload_timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[test]
    fn test_event_missing_field_is_rejected() {
        let payload = br#"{"video_id":"x","filename":"y.mp4"}"#;
        assert!(UploadEvent::from_json(payload).is_err());
    }

    #[test]
    fn test_unknown_source_is_rejected() {
        let mut value = serde_json::to_value(sample_event()).unwrap();
        value["upload_source"] = Value::from("ftp");
        assert!(serde_json::from_value::<UploadEvent>(value).is_err());
    }
}

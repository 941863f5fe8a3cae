//! Upload validation: extension allow-list and size ceiling.

use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

/// Video container extensions accepted when no allow-list is configured.
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 7] =
    [".mp4", ".avi", ".mov", ".mkv", ".webm", ".flv", ".wmv"];

/// Default ceiling in gigabytes.
pub const DEFAULT_MAX_FILE_SIZE_GB: u64 = 3;

const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid file format. Allowed formats: {}", allowed.join(", "))]
    InvalidExtension { extension: String, allowed: Vec<String> },

    #[error(
        "File size exceeds {limit_gb}GB. Current size: {:.2}GB",
        *actual as f64 / BYTES_PER_GB as f64
    )]
    FileTooLarge { actual: u64, limit: u64, limit_gb: u64 },

    #[error("No file provided")]
    MissingFile,
}

/// Decides whether an upload may be stored. Holds no state beyond its rules.
#[derive(Debug, Clone)]
pub struct Validator {
    allowed: BTreeSet<String>,
    max_size_gb: u64,
}

impl Validator {
    pub fn new<I, S>(allowed: I, max_size_gb: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = allowed
            .into_iter()
            .filter_map(|ext| normalize_extension(ext.as_ref()))
            .collect();
        Self {
            allowed,
            max_size_gb,
        }
    }

    /// Maximum accepted size in bytes.
    pub fn max_bytes(&self) -> u64 {
        self.max_size_gb.saturating_mul(BYTES_PER_GB)
    }

    pub fn max_size_gb(&self) -> u64 {
        self.max_size_gb
    }

    pub fn allowed_extensions(&self) -> Vec<String> {
        self.allowed.iter().cloned().collect()
    }

    /// Returns the lowercased extension (with its leading dot) when it is allowed.
    pub fn check_extension(&self, filename: &str) -> Result<String, ValidationError> {
        let extension = extension_of(filename);
        if !self.allowed.contains(&extension) {
            return Err(ValidationError::InvalidExtension {
                extension,
                allowed: self.allowed_extensions(),
            });
        }
        Ok(extension)
    }

    /// `size` must come from the bytes actually received.
    pub fn check_size(&self, size: u64) -> Result<u64, ValidationError> {
        if size > self.max_bytes() {
            return Err(ValidationError::FileTooLarge {
                actual: size,
                limit: self.max_bytes(),
                limit_gb: self.max_size_gb,
            });
        }
        Ok(size)
    }

    /// Extension first, then size.
    pub fn validate(&self, filename: &str, size: u64) -> Result<(String, u64), ValidationError> {
        let extension = self.check_extension(filename)?;
        let size = self.check_size(size)?;
        Ok((extension, size))
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_EXTENSIONS, DEFAULT_MAX_FILE_SIZE_GB)
    }
}

/// Extension of the final path component, lowercased, with a leading dot.
/// Empty when the name has none (including dotfiles such as `.mp4`).
pub fn extension_of(filename: &str) -> String {
    // Browsers on Windows may send the full client path.
    let base = filename.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(filename);
    Path::new(base)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

fn normalize_extension(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    Some(format!(".{}", trimmed.to_lowercase()))
}

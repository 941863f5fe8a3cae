use crate::domain::{StoredFile, ValidationError, Validator};
use bytes::Bytes;
use axum::BoxError;
use futures::{Stream, TryStreamExt};
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to read upload body: {0}")]
    Stream(String),
    /// The body grew past what the validator accepts
    #[error(transparent)]
    Rejected(#[from] ValidationError),
    #[error("refusing to overwrite {}", .0.display())]
    AlreadyExists(PathBuf),
    #[error("invalid file name: {0}")]
    InvalidName(String),
}

/// Upload directory on the local filesystem.
///
/// Bytes are staged in a hidden `.part` file next to their destination and
/// renamed into place only once complete, so a stored name never refers to a
/// partial file. Staging files are removed when a write fails or is dropped.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create the upload directory if needed. Safe to call repeatedly.
    pub async fn init(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    /// Write `stream` to `filename`, aborting as soon as the running byte count
    /// fails `validator`'s size check. Returns after the data is synced to disk.
    pub async fn store<S, E>(
        &self,
        stream: S,
        filename: &str,
        extension: &str,
        validator: &Validator,
    ) -> Result<StoredFile, StorageError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<BoxError>,
    {
        check_plain_name(filename)?;

        let staging = tempfile::Builder::new()
            .prefix(".upload-")
            .suffix(".part")
            .tempfile_in(&self.root)?;
        let mut writer = BufWriter::new(File::from_std(staging.as_file().try_clone()?));

        let stream = stream.map_err(|err| StorageError::Stream(err.into().to_string()));
        futures::pin_mut!(stream);

        let mut written: u64 = 0;
        while let Some(chunk) = stream.try_next().await? {
            written += chunk.len() as u64;
            validator.check_size(written)?;
            writer.write_all(&chunk).await?;
        }
        writer.flush().await?;
        writer.get_ref().sync_all().await?;
        drop(writer);

        let path = self.path_for(filename);
        staging.persist_noclobber(&path).map_err(|err| {
            if err.error.kind() == io::ErrorKind::AlreadyExists {
                StorageError::AlreadyExists(path.clone())
            } else {
                StorageError::Io(err.error)
            }
        })?;

        Ok(StoredFile {
            filename: filename.to_string(),
            path,
            size: written,
            extension: extension.to_string(),
        })
    }

    /// Open a stored file for reading. `Ok(None)` when it does not exist.
    pub async fn open(&self, filename: &str) -> Result<Option<(File, u64)>, StorageError> {
        check_plain_name(filename)?;
        let path = self.path_for(filename);
        match File::open(&path).await {
            Ok(file) => {
                let metadata = file.metadata().await?;
                if !metadata.is_file() {
                    return Ok(None);
                }
                Ok(Some((file, metadata.len())))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Accept only a single, visible path component.
fn check_plain_name(filename: &str) -> Result<(), StorageError> {
    let mut components = Path::new(filename).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !plain || filename.starts_with('.') || filename.contains('\\') {
        return Err(StorageError::InvalidName(filename.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::fs;
    use tempfile::tempdir;

    type E = std::io::Error;

    fn validator() -> Validator {
        Validator::default()
    }

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, E>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok::<Bytes, E>(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    fn entries(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("uploads");
        LocalStorage::init(&root).await.unwrap();
        LocalStorage::init(&root).await.unwrap();
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_store_writes_all_chunks() {
        let temp_dir = tempdir().unwrap();
        let storage = LocalStorage::init(temp_dir.path()).await.unwrap();

        let stored = storage
            .store(chunks(&["Hello, ", "world!"]), "abc.mp4", ".mp4", &validator())
            .await
            .unwrap();

        assert_eq!(stored.size, 13);
        assert_eq!(stored.path, temp_dir.path().join("abc.mp4"));
        assert_eq!(fs::read_to_string(&stored.path).unwrap(), "Hello, world!");
        assert_eq!(entries(temp_dir.path()), vec!["abc.mp4".to_string()]);
    }

    #[tokio::test]
    async fn test_store_over_limit_leaves_nothing() {
        let temp_dir = tempdir().unwrap();
        let storage = LocalStorage::init(temp_dir.path()).await.unwrap();

        let no_content = Validator::new([".mp4"], 0);
        let result = storage
            .store(chunks(&["", "12345", "67890"]), "big.mp4", ".mp4", &no_content)
            .await;

        match result {
            Err(StorageError::Rejected(ValidationError::FileTooLarge { actual, limit, .. })) => {
                assert_eq!(actual, 5);
                assert_eq!(limit, 0);
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert!(entries(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_store_stream_error_leaves_nothing() {
        let temp_dir = tempdir().unwrap();
        let storage = LocalStorage::init(temp_dir.path()).await.unwrap();

        let failing = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err("connection reset"),
        ]);
        let result = storage.store(failing, "cut.mp4", ".mp4", &validator()).await;

        match result {
            Err(StorageError::Stream(message)) => assert_eq!(message, "connection reset"),
            other => panic!("unexpected result {:?}", other),
        }
        assert!(entries(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_store_never_overwrites() {
        let temp_dir = tempdir().unwrap();
        let storage = LocalStorage::init(temp_dir.path()).await.unwrap();
        fs::write(temp_dir.path().join("taken.mp4"), b"original").unwrap();

        let result = storage
            .store(chunks(&["replacement"]), "taken.mp4", ".mp4", &validator())
            .await;

        assert!(matches!(result, Err(StorageError::AlreadyExists(_))));
        assert_eq!(
            fs::read(temp_dir.path().join("taken.mp4")).unwrap(),
            b"original"
        );
        assert_eq!(entries(temp_dir.path()), vec!["taken.mp4".to_string()]);
    }

    #[tokio::test]
    async fn test_store_fails_when_directory_is_gone() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("uploads");
        let storage = LocalStorage::init(&root).await.unwrap();
        fs::remove_dir(&root).unwrap();

        let result = storage.store(chunks(&["data"]), "lost.mp4", ".mp4", &validator()).await;

        assert!(matches!(result, Err(StorageError::Io(_))));
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_open_existing_and_missing() {
        let temp_dir = tempdir().unwrap();
        let storage = LocalStorage::init(temp_dir.path()).await.unwrap();
        storage
            .store(chunks(&["0123456789"]), "clip.mp4", ".mp4", &validator())
            .await
            .unwrap();

        let (_, len) = storage.open("clip.mp4").await.unwrap().unwrap();
        assert_eq!(len, 10);
        assert!(storage.open("other.mp4").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_rejects_non_plain_names() {
        let temp_dir = tempdir().unwrap();
        let storage = LocalStorage::init(temp_dir.path()).await.unwrap();

        for name in ["../etc/passwd", "a/b.mp4", "..", ".upload-x.part", "", "/abs.mp4", "a\\b.mp4"] {
            assert!(
                matches!(storage.open(name).await, Err(StorageError::InvalidName(_))),
                "{} should be rejected",
                name
            );
        }
    }
}

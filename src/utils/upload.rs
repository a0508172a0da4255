use std::path::PathBuf;

use async_trait::async_trait;
use axum::body::Bytes;
use mime::Mime;

use crate::error::{AppError, AppResult};

/// Descriptor of a file written by a [`FileStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub filename: String,
    pub path: PathBuf,
    pub size: usize,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn store(&self, filename: &str, contents: Bytes) -> AppResult<StoredFile>;
}

pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn store(&self, filename: &str, contents: Bytes) -> AppResult<StoredFile> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create upload dir: {}", e)))?;

        let path = self.root.join(filename);
        tokio::fs::write(&path, &contents)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to store upload: {}", e)))?;

        Ok(StoredFile {
            filename: filename.to_string(),
            path,
            size: contents.len(),
        })
    }
}

/// File extension for an uploaded image, from its content type
/// (`image/jpeg` -> `jpeg`). Anything that is not an image is rejected.
pub fn image_extension(content_type: Option<&str>) -> AppResult<String> {
    let not_an_image =
        || AppError::BadRequest("Not an image! Please upload only images.".to_string());

    let parsed: Mime = content_type
        .and_then(|ct| ct.parse::<Mime>().ok())
        .filter(|ct| ct.type_() == mime::IMAGE)
        .ok_or_else(not_an_image)?;

    let subtype = parsed.subtype().as_str();
    if subtype.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Ok(subtype.to_ascii_lowercase());
    }

    // Structured subtypes such as `svg+xml`
    mime_guess::get_mime_extensions(&parsed)
        .and_then(|extensions| extensions.first())
        .map(|extension| extension.to_string())
        .ok_or_else(not_an_image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_extension() {
        assert_eq!(image_extension(Some("image/jpeg")).unwrap(), "jpeg");
        assert_eq!(image_extension(Some("image/PNG")).unwrap(), "png");
        assert!(image_extension(Some("application/pdf")).is_err());
        assert_eq!(image_extension(Some("image/webp; q=0.8")).unwrap(), "webp");
        assert_eq!(image_extension(Some("image/svg+xml")).unwrap(), "svg");
        assert!(image_extension(Some("text/plain")).is_err());
        assert!(image_extension(Some("image")).is_err());
        assert!(image_extension(None).is_err());
    }

    #[tokio::test]
    async fn test_local_store_writes_file() {
        let root = std::env::temp_dir().join(format!("uploads-{}", uuid::Uuid::new_v4()));
        let store = LocalFileStore::new(&root);

        let stored = store
            .store("user-1-1700000000000.jpeg", Bytes::from_static(b"jpeg-bytes"))
            .await
            .unwrap();

        assert_eq!(stored.size, 10);
        assert_eq!(tokio::fs::read(&stored.path).await.unwrap(), b"jpeg-bytes");

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }
}

//! Uploaded files: base64 data URIs in, relative paths under the media root out.

use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use color_eyre::{eyre::WrapErr, Result};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("Expected a base64 data URI such as `data:image/png;base64,...`.")]
    NotADataUri,
    #[error("The base64 payload could not be decoded.")]
    InvalidBase64,
    #[error("The submitted file is empty.")]
    Empty,
    #[error("Upload a valid image. The file you uploaded was either not an image or a corrupted image.")]
    NotAnImage,
}

/// A decoded `data:<mime>;base64,<payload>` upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl DataUri {
    pub fn parse(raw: &str) -> Result<Self, UploadError> {
        let rest = raw.trim().strip_prefix("data:").ok_or(UploadError::NotADataUri)?;
        let (mime, payload) = rest
            .split_once(";base64,")
            .ok_or(UploadError::NotADataUri)?;

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|_| UploadError::InvalidBase64)?;
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }

        Ok(Self {
            mime: mime.to_ascii_lowercase(),
            bytes,
        })
    }

    pub fn parse_image(raw: &str) -> Result<Self, UploadError> {
        let upload = Self::parse(raw)?;
        if !upload.mime.starts_with("image/") {
            return Err(UploadError::NotAnImage);
        }

        Ok(upload)
    }

    pub fn extension(&self) -> &str {
        let subtype = self.mime.split('/').nth(1).filter(|s| {
            !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
        });
        let known = mime_guess::get_mime_extensions_str(&self.mime).unwrap_or_default();

        match subtype {
            Some(subtype) if known.contains(&subtype) => subtype,
            _ => known.first().copied().or(subtype).unwrap_or("bin"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Writes the upload under `dir` with a fresh name and returns its path
    /// relative to the media root.
    #[tracing::instrument(skip(self, upload), fields(mime = %upload.mime), err)]
    pub async fn save(&self, dir: &str, upload: &DataUri) -> Result<String> {
        let relative = format!("{dir}/{}.{}", Uuid::new_v4(), upload.extension());
        let full = self.root.join(&relative);

        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .wrap_err_with(|| format!("Couldn't create media dir {}", parent.display()))?;
        }
        tokio::fs::write(&full, &upload.bytes)
            .await
            .wrap_err_with(|| format!("Couldn't write media file {}", full.display()))?;

        Ok(relative)
    }

    /// Best-effort removal of stored files; a missing file is not an error.
    pub async fn remove_all<'a>(&self, paths: impl IntoIterator<Item = &'a String>) {
        for path in paths {
            if path.contains("..") {
                tracing::warn!(path = %path, "Refusing to remove media path outside the root");
                continue;
            }

            match tokio::fs::remove_file(self.root.join(path)).await {
                Ok(()) => tracing::debug!(path = %path, "Removed media file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path, error = %e, "Couldn't remove media file"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_image_data_uri() {
        let upload = DataUri::parse_image("data:image/PNG;base64,aGVsbG8=").unwrap();

        assert_eq!(upload.mime, "image/png");
        assert_eq!(upload.bytes, b"hello");
        assert_eq!(upload.extension(), "png");
    }

    #[test]
    fn test_rejects_malformed_uploads() {
        assert_eq!(DataUri::parse("aGVsbG8="), Err(UploadError::NotADataUri));
        assert_eq!(
            DataUri::parse("data:image/png;base64,***"),
            Err(UploadError::InvalidBase64)
        );
        assert_eq!(DataUri::parse("data:image/png;base64,"), Err(UploadError::Empty));
        assert_eq!(
            DataUri::parse_image("data:video/mp4;base64,aGVsbG8="),
            Err(UploadError::NotAnImage)
        );
    }

    #[tokio::test]
    async fn test_saves_and_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().to_path_buf());
        let upload = DataUri::parse("data:video/mp4;base64,aGVsbG8=").unwrap();

        let path = store.save("recipes/videos", &upload).await.unwrap();
        assert!(path.starts_with("recipes/videos/"));
        assert!(path.ends_with(".mp4"));
        assert_eq!(std::fs::read(dir.path().join(&path)).unwrap(), b"hello");

        store.remove_all([&path]).await;
        assert!(!dir.path().join(&path).exists());

        // Already gone
        store.remove_all([&path]).await;
    }
}

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use uuid::Uuid;

use crate::{
    constants::IMAGE_TYPES,
    error::{Error, HtmlError},
};

const RECIPE_IMAGE_DIR: &str = "recipes";

/// Decoded image upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

impl ImagePayload {
    /// Decodes `data:image/<type>;base64,<payload>` (the header is optional).
    /// The file type is taken from the decoded bytes, not from the header.
    pub fn from_data_url(value: &str) -> Result<Self, String> {
        let payload = match value.split_once(";base64,") {
            Some((_header, payload)) => payload,
            None => value,
        };

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|_| String::from("Upload a valid base64 encoded image"))?;

        let extension = IMAGE_TYPES
            .iter()
            .find(|(_, magic)| bytes.starts_with(magic))
            .map(|(extension, _)| *extension)
            .ok_or_else(|| String::from("Unsupported image type; use jpeg, png or gif"))?;

        Ok(Self { bytes, extension })
    }
}

/// Stores uploaded files under a media root and serves them from a URL prefix.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    base_url: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.to_owned(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persists the image and returns its public URL.
    pub async fn store(&self, image: &ImagePayload) -> Result<String, Error> {
        let dir = self.root.join(RECIPE_IMAGE_DIR);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            log::error!("Could not create {}: {e}", dir.display());
            HtmlError::InternalServerError.new("Could not store image")
        })?;

        let name = format!("{}.{}", Uuid::new_v4(), image.extension);
        tokio::fs::write(dir.join(&name), &image.bytes)
            .await
            .map_err(|e| {
                log::error!("Could not write {name}: {e}");
                HtmlError::InternalServerError.new("Could not store image")
            })?;

        Ok(format!("{}{RECIPE_IMAGE_DIR}/{name}", self.base_url))
    }

    /// Removes a file previously returned by [`FsBlobStore::store`].
    /// URLs outside of this store are ignored.
    pub async fn remove(&self, url: &str) {
        let Some(relative) = self.relative_path(url) else {
            return;
        };

        if let Err(e) = tokio::fs::remove_file(self.root.join(&relative)).await {
            log::warn!("Could not remove {}: {e}", relative.display());
        }
    }

    fn relative_path(&self, url: &str) -> Option<PathBuf> {
        let relative = url.strip_prefix(&self.base_url)?;
        let (dir, name) = relative.split_once('/')?;

        if dir != RECIPE_IMAGE_DIR || name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return None;
        }

        Some(Path::new(dir).join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn data_url(bytes: &[u8]) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(bytes))
    }

    #[test]
    fn decodes_data_url() {
        let image = ImagePayload::from_data_url(&data_url(PNG)).unwrap();
        assert_eq!(image.extension, "png");
        assert_eq!(image.bytes, PNG);
    }

    #[test]
    fn header_is_optional() {
        let image = ImagePayload::from_data_url(&STANDARD.encode(b"GIF89a....")).unwrap();
        assert_eq!(image.extension, "gif");
    }

    #[test]
    fn rejects_bad_payloads() {
        assert!(ImagePayload::from_data_url("data:image/png;base64,@@@").is_err());
        assert!(ImagePayload::from_data_url(&data_url(b"plain text")).is_err());
    }

    #[tokio::test]
    async fn stores_and_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), "/media/");
        let image = ImagePayload::from_data_url(&data_url(PNG)).unwrap();

        let url = store.store(&image).await.unwrap();
        assert!(url.starts_with("/media/recipes/"));
        assert!(url.ends_with(".png"));

        let path = dir.path().join(url.trim_start_matches("/media/"));
        assert_eq!(std::fs::read(&path).unwrap(), PNG);

        store.remove(&url).await;
        assert!(!path.exists());
    }

    #[test]
    fn foreign_urls_are_not_resolved() {
        let store = FsBlobStore::new("/srv/media", "/media/");
        assert!(store.relative_path("/media/recipes/../../etc/passwd").is_none());
        assert!(store.relative_path("https://cdn.example.com/x.png").is_none());
        assert_eq!(
            store.relative_path("/media/recipes/a.png"),
            Some(PathBuf::from("recipes/a.png"))
        );
    }
}

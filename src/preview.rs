use std::{
    collections::HashMap,
    fmt,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use bytes::Bytes;
use image::ImageFormat;
use uuid::Uuid;

use crate::error::{DoctorError, Result};

const PREVIEW_SCHEME: &str = "blob:plant-doctor/";

/// An image the user picked for diagnosis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    name: String,
    mime_type: &'static str,
    content: Bytes,
}

impl SelectedFile {
    /// Accepts PNG and JPEG images only.
    ///
    /// The format is sniffed from the content first; the file extension is only
    /// consulted when the bytes are not recognizable.
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Result<Self> {
        let name = name.into();
        let content = content.into();

        let format = image::guess_format(&content)
            .or_else(|_| ImageFormat::from_path(&name))
            .map_err(|_| DoctorError::UnsupportedFile(name.clone()))?;

        match format {
            ImageFormat::Png | ImageFormat::Jpeg => Ok(SelectedFile {
                mime_type: format.to_mime_type(),
                name,
                content,
            }),
            _ => Err(DoctorError::UnsupportedFile(name)),
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::new(name, content)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }
}

/// Handle to a selected image, usable wherever an image source is expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewUrl(String);

impl PreviewUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PreviewUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry of live preview handles, comparable to a browser's object URLs.
///
/// Handles stay resolvable until revoked. Cloning shares the same registry.
#[derive(Debug, Clone, Default)]
pub struct PreviewStore {
    entries: Arc<Mutex<HashMap<PreviewUrl, Bytes>>>,
}

impl PreviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, file: &SelectedFile) -> PreviewUrl {
        let url = PreviewUrl(format!("{PREVIEW_SCHEME}{}", Uuid::new_v4()));
        self.entries().insert(url.clone(), file.content().clone());
        url
    }

    /// Returns whether the handle was still live.
    pub fn revoke(&self, url: &PreviewUrl) -> bool {
        self.entries().remove(url).is_some()
    }

    pub fn resolve(&self, url: &PreviewUrl) -> Option<Bytes> {
        self.entries().get(url).cloned()
    }

    pub fn live_count(&self) -> usize {
        self.entries().len()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<PreviewUrl, Bytes>> {
        // the map holds no invariants a panicking writer could break
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

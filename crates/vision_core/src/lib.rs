use std::{fmt, path::Path};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{AuthState, MAX_IMAGE_BYTES},
    protocol::{GenerateTextRequest, GenerateTextResponse, UploadOptions, UploadResponse},
};
use tokio::io::AsyncReadExt;

mod analyzer;
pub mod config;
mod http_backend;
pub mod preview;

pub use analyzer::{
    build_prompt, Activity, AnalyzerError, AnalyzerEvent, AnalyzerOptions, ImageAnalyzer, Notice,
    NoticeLevel, SelectedImage, ViewPhase, ViewSnapshot, WorkspacePhase, DEFAULT_ANALYSIS_PROMPT,
    DETAILED_ANALYSIS_SUFFIX,
};
pub use http_backend::HttpBackend;

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_UPLOAD_PREFIX: &str = "uploads";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

pub type AuthCallback = Box<dyn Fn(AuthState) + Send + Sync + 'static>;

/// Registration returned by [`AuthProvider::on_auth_state_changed`].
///
/// The callback stays registered until [`AuthSubscription::unsubscribe`] is
/// called or the value is dropped.
pub struct AuthSubscription {
    release: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl AuthSubscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for AuthSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSubscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Delivers the current state right away and every change after that.
    fn on_auth_state_changed(&self, callback: AuthCallback) -> AuthSubscription;
    async fn login(&self) -> Result<()>;
    async fn logout(&self) -> Result<()>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(
        &self,
        file: &ImageFile,
        destination_path: &str,
        options: UploadOptions,
    ) -> Result<UploadResponse>;
}

#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn generate_text(&self, request: GenerateTextRequest) -> Result<GenerateTextResponse>;
}

pub trait ClipboardWriter: Send + Sync {
    fn write_text(&self, text: &str) -> Result<()>;
}

pub struct MissingClipboard;

impl ClipboardWriter for MissingClipboard {
    fn write_text(&self, _text: &str) -> Result<()> {
        Err(anyhow!("no clipboard available in this environment"))
    }
}

/// An image picked by the user, held in memory until it is uploaded.
#[derive(Clone)]
pub struct ImageFile {
    pub name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, mime_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type,
            bytes,
        }
    }

    /// Reads an image from disk. Files over [`MAX_IMAGE_BYTES`] are refused from their
    /// metadata, before any byte is read.
    pub async fn from_path(path: &Path) -> Result<Self, AnalyzerError> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                AnalyzerError::Unreadable(anyhow!("'{}' does not name a file", path.display()))
            })?;
        let unreadable = |err: std::io::Error| {
            AnalyzerError::Unreadable(
                anyhow::Error::new(err)
                    .context(format!("failed to read image '{}'", path.display())),
            )
        };
        let file = tokio::fs::File::open(path).await.map_err(unreadable)?;
        let size = file.metadata().await.map_err(unreadable)?.len();
        if size > MAX_IMAGE_BYTES {
            return Err(AnalyzerError::ImageTooLarge {
                size,
                limit: MAX_IMAGE_BYTES,
            });
        }

        // The file may grow between the metadata call and the read.
        let mut bytes = Vec::with_capacity(size as usize);
        file.take(MAX_IMAGE_BYTES + 1)
            .read_to_end(&mut bytes)
            .await
            .map_err(unreadable)?;
        if bytes.len() as u64 > MAX_IMAGE_BYTES {
            return Err(AnalyzerError::ImageTooLarge {
                size: bytes.len() as u64,
                limit: MAX_IMAGE_BYTES,
            });
        }

        let mime_type = mime_guess::from_path(path)
            .first()
            .map(|mime| mime.essence_str().to_string());
        Ok(Self {
            name,
            mime_type,
            bytes,
        })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn content_type(&self) -> String {
        self.mime_type
            .clone()
            .or_else(|| {
                mime_guess::from_path(&self.name)
                    .first()
                    .map(|mime| mime.essence_str().to_string())
            })
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string())
    }

    pub fn is_image(&self) -> bool {
        self.content_type().starts_with("image/")
    }
}

impl fmt::Debug for ImageFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

//! Staging of inbound files in local scratch space before they are handed to
//! the media host.
//!
//! Every staged file is owned by a [`StagedFile`] guard. The forward path
//! deletes it once the media host has answered, and the guard's `Drop`
//! covers cancelled requests and failed writes.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use bytes::Bytes;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    storage::MediaHost,
};

/// A file as it arrived in a multipart request.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub file_name: Option<String>,
    pub content_type: String,
    pub body: Bytes,
}

/// A file sitting in scratch storage. Removed by [`StagedFile::discard`], or
/// on drop if it was never discarded.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    content_type: String,
}

fn remove_scratch(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "scratch file removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "scratch file cleanup failed"),
    }
}

impl StagedFile {
    /// Takes ownership of an existing file on disk.
    pub fn adopt(path: PathBuf, content_type: impl Into<String>) -> Self {
        Self {
            path,
            content_type: content_type.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Gives up ownership without deleting the file.
    pub fn release(mut self) -> (PathBuf, String) {
        (
            std::mem::take(&mut self.path),
            std::mem::take(&mut self.content_type),
        )
    }

    /// Deletes the file without blocking the runtime.
    pub async fn discard(mut self) {
        let path = std::mem::take(&mut self.path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "scratch file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "scratch file cleanup failed"),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_scratch(&path));
            }
            Err(_) => remove_scratch(&path),
        }
    }
}

/// Maps anything outside `[A-Za-z0-9._-]` to `_` and caps the length.
pub(crate) fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    // keep the tail so the extension survives
    let skip = trimmed.chars().count().saturating_sub(64);
    let mut out: String = trimmed.chars().skip(skip).collect();
    if out.is_empty() {
        out.push_str("upload");
    }
    out
}

pub struct UploadStager {
    scratch_dir: PathBuf,
    media: Arc<dyn MediaHost>,
}

impl UploadStager {
    pub async fn new(scratch_dir: PathBuf, media: Arc<dyn MediaHost>) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&scratch_dir)
            .await
            .with_context(|| format!("create scratch dir {}", scratch_dir.display()))?;
        Ok(Self { scratch_dir, media })
    }

    /// Assumes `scratch_dir` already exists.
    #[cfg(test)]
    pub fn with_dir(scratch_dir: PathBuf, media: Arc<dyn MediaHost>) -> Self {
        Self { scratch_dir, media }
    }

    #[cfg(test)]
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Writes the file under a generated name in scratch storage.
    pub async fn stage(&self, file: IncomingFile) -> AppResult<StagedFile> {
        let name = format!(
            "{}-{}",
            Uuid::new_v4(),
            sanitize_file_name(file.file_name.as_deref().unwrap_or(""))
        );
        let path = self.scratch_dir.join(name);
        // Guard first so a partial write is cleaned up too.
        let staged = StagedFile::adopt(path, file.content_type);
        tokio::fs::write(staged.path(), &file.body)
            .await
            .map_err(|e| AppError::Upload(format!("could not stage file: {e}")))?;
        debug!(path = %staged.path().display(), bytes = file.body.len(), "file staged");
        Ok(staged)
    }

    /// Hands a staged file to the media host; the scratch copy is gone once this returns.
    #[instrument(skip(self, staged), fields(path = %staged.path().display()))]
    pub async fn forward(&self, staged: StagedFile) -> AppResult<String> {
        let stored = self
            .media
            .store_file(staged.path(), staged.content_type())
            .await;
        staged.discard().await;
        let url = stored.map_err(|e| AppError::Upload(format!("{e:#}")))?;
        info!(%url, "file forwarded to media host");
        Ok(url)
    }

    pub async fn upload(&self, file: IncomingFile) -> AppResult<String> {
        let (path, content_type) = self.stage(file).await?.release();
        self.upload_local_file(Some(&path), &content_type)
            .await?
            .ok_or_else(|| AppError::Upload("staged file disappeared".into()))
    }

    /// Same as [`Self::upload`] but an absent file is not an error.
    pub async fn upload_optional(&self, file: Option<IncomingFile>) -> AppResult<Option<String>> {
        match file {
            Some(f) => self.upload(f).await.map(Some),
            None => Ok(None),
        }
    }

    /// Forwards a file that is already on local disk and removes it afterwards.
    /// A missing path, or one that does not exist, yields `Ok(None)`.
    pub async fn upload_local_file(
        &self,
        path: Option<&Path>,
        content_type: &str,
    ) -> AppResult<Option<String>> {
        let Some(path) = path else {
            return Ok(None);
        };
        let staged = StagedFile::adopt(path.to_path_buf(), content_type);
        if !tokio::fs::try_exists(staged.path()).await.unwrap_or(false) {
            debug!(path = %path.display(), "nothing to upload");
            return Ok(None);
        }
        self.forward(staged).await.map(Some)
    }
}

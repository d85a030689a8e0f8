//! Storage for uploaded cafe images.
//!
//! Client filenames are reduced to a safe ASCII basename, then prefixed with
//! a random hex id so two uploads never collide. Only png/jpg/jpeg files are
//! kept. Stored images are referenced as `uploads/<file>` and served from
//! the upload directory under `/uploads`.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

pub const PUBLIC_PREFIX: &str = "uploads";
const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reduce a client-supplied filename to a safe basename.
/// Returns `None` when nothing usable is left.
pub fn secure_filename(raw: &str) -> Option<String> {
    let basename = raw.rsplit(['/', '\\']).next().unwrap_or_default();

    let mut cleaned = String::with_capacity(basename.len());
    for ch in basename.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
            cleaned.push(ch);
        } else if ch.is_whitespace() && !cleaned.ends_with('_') {
            cleaned.push('_');
        }
    }

    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn is_allowed_image(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store one image. Disallowed or unnamed files are skipped with `Ok(None)`.
    pub async fn save(
        &self,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<Option<String>, UploadError> {
        let Some(filename) = secure_filename(original_name) else {
            debug!(original = %original_name, "upload skipped: unusable filename");
            return Ok(None);
        };
        if !is_allowed_image(&filename) {
            warn!(filename = %filename, "upload skipped: extension not allowed");
            return Ok(None);
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let unique = format!("{}_{filename}", uuid::Uuid::new_v4().simple());
        tokio::fs::write(self.dir.join(&unique), bytes).await?;
        debug!(file = %unique, size = bytes.len(), "upload stored");

        Ok(Some(format!("{PUBLIC_PREFIX}/{unique}")))
    }

    /// Delete images stored by [`UploadStore::save`], given their comma-joined paths.
    /// Failures are logged; paths outside the upload directory are ignored.
    pub async fn discard(&self, joined: &str) {
        for path in joined.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let Some(name) = path
                .strip_prefix(PUBLIC_PREFIX)
                .and_then(|rest| rest.strip_prefix('/'))
                .filter(|name| secure_filename(name).as_deref() == Some(*name))
            else {
                warn!(path = %path, "refusing to discard foreign upload path");
                continue;
            };
            match tokio::fs::remove_file(self.dir.join(name)).await {
                Ok(()) => debug!(file = %name, "upload discarded"),
                Err(err) => warn!(file = %name, error = %err, "failed to discard upload"),
            }
        }
    }
}

//! Multipart form reading and image storage under the uploads directory.

use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartError};
use std::collections::HashMap;
use std::path::Path;

pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// Subdirectory for post images.
pub const POST_IMAGES: &str = "posts";
/// Subdirectory for profile pictures.
pub const PROFILE_PICTURES: &str = "profile_pictures";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Invalid file type. Please upload PNG, JPG, JPEG, or GIF files only.")]
    UnsupportedType,

    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Bytes,
}

/// Text fields and files of a multipart form. Empty file inputs are dropped.
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, UploadedFile>,
}

impl MultipartForm {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.as_str())
    }

    /// Trimmed field value, `None` when missing or blank.
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.text(name).map(str::trim).filter(|s| !s.is_empty())
    }
}

pub async fn read_multipart(mut multipart: Multipart) -> Result<MultipartForm, UploadError> {
    let mut form = MultipartForm::default();
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let bytes = field.bytes().await?;
                if !file_name.is_empty() && !bytes.is_empty() {
                    form.files.insert(name, UploadedFile { file_name, bytes });
                }
            }
            None => {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
    }
    Ok(form)
}

pub fn allowed_file(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Reduce a client-supplied name to a safe ASCII file name.
pub fn secure_filename(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Stored name: sanitised stem, unix timestamp, original extension.
pub fn stored_name(file_name: &str, timestamp: i64) -> Option<String> {
    let safe = secure_filename(file_name);
    let (stem, ext) = safe.rsplit_once('.')?;
    let stem = if stem.is_empty() { "upload" } else { stem };
    Some(format!("{}_{}.{}", stem, timestamp, ext.to_ascii_lowercase()))
}

/// Write an uploaded image into `root/subdir` and return the stored file
/// name.
pub async fn save_image(
    root: &Path,
    subdir: &str,
    file: &UploadedFile,
) -> Result<String, UploadError> {
    if !allowed_file(&file.file_name) {
        return Err(UploadError::UnsupportedType);
    }
    let name = stored_name(&file.file_name, chrono::Utc::now().timestamp())
        .ok_or(UploadError::UnsupportedType)?;

    let dir = root.join(subdir);
    tokio::fs::create_dir_all(&dir).await?;

    // Same name within the same second: prefix a counter.
    let mut candidate = name.clone();
    let mut n = 1;
    while tokio::fs::try_exists(dir.join(&candidate)).await? {
        candidate = format!("{}_{}", n, name);
        n += 1;
    }

    tokio::fs::write(dir.join(&candidate), &file.bytes).await?;
    tracing::info!(file = %candidate, dir = %dir.display(), bytes = file.bytes.len(), "Upload stored");
    Ok(candidate)
}

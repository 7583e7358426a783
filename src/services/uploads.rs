use std::collections::HashMap;
use std::path::{Path, PathBuf};

use actix_multipart::{Field, Multipart};
use futures_util::TryStreamExt;
use log::warn;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};

/// Which upload slot a multipart form feeds. Each kind has its own field
/// name, directory and file budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    FarmImages,
    Avatar,
}

impl UploadKind {
    pub fn field_name(&self) -> &'static str {
        match self {
            UploadKind::FarmImages => "farmImages",
            UploadKind::Avatar => "avatar",
        }
    }

    pub fn subdir(&self) -> &'static str {
        match self {
            UploadKind::FarmImages => "farms",
            UploadKind::Avatar => "avatars",
        }
    }

    pub fn max_files(&self) -> usize {
        match self {
            UploadKind::FarmImages => 5,
            UploadKind::Avatar => 1,
        }
    }

    pub fn dir(&self, config: &Config) -> PathBuf {
        config.uploads.dir.join(self.subdir())
    }
}

/// An image written to disk while draining a form.
#[derive(Debug, Clone)]
pub struct SavedFile {
    pub filename: String,
    pub path: PathBuf,
    /// Stored on documents and served by the static file handler.
    pub url_path: String,
}

#[derive(Debug, Default)]
pub struct UploadForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<SavedFile>,
}

impl UploadForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Decodes a field that arrives as a JSON string, the way nested values
    /// travel inside a multipart form.
    pub fn json_field<T: serde::de::DeserializeOwned>(
        &self,
        name: &str,
        message: &str,
    ) -> ApiResult<Option<T>> {
        match self.field(name) {
            Some(raw) => serde_json::from_str(raw)
                .map(Some)
                .map_err(|_| ApiError::validation(message.to_string())),
            None => Ok(None),
        }
    }
}

fn extension_for(essence: &str) -> Option<&'static str> {
    match essence {
        "image/jpeg" => Some(".jpg"),
        "image/png" => Some(".png"),
        "image/webp" => Some(".webp"),
        _ => None,
    }
}

fn unique_name(kind: UploadKind, ext: &str) -> String {
    format!("{}-{}{}", kind.field_name(), Uuid::new_v4(), ext)
}

/// Drains a multipart payload into text fields and stored image files.
/// On any rejection the files written so far are removed before returning,
/// so a failed request leaves no orphans behind.
pub async fn collect_form(mut payload: Multipart, config: &Config, kind: UploadKind) -> ApiResult<UploadForm> {
    let mut form = UploadForm::default();
    if let Err(err) = drain(&mut payload, config, kind, &mut form).await {
        cleanup_files(&form.files).await;
        return Err(err);
    }
    Ok(form)
}

async fn drain(
    payload: &mut Multipart,
    config: &Config,
    kind: UploadKind,
    form: &mut UploadForm,
) -> ApiResult<()> {
    while let Some(mut field) = next_field(payload).await? {
        let name = field.name().to_string();
        let is_file = field
            .content_disposition()
            .get_filename()
            .map(|f| !f.is_empty())
            .unwrap_or(false);

        if !is_file {
            let bytes = read_capped(&mut field, config.uploads.max_file_size).await?;
            let value = String::from_utf8(bytes)
                .map_err(|_| ApiError::validation(format!("Field '{}' is not valid UTF-8", name)))?;
            form.fields.insert(name, value);
            continue;
        }

        if name != kind.field_name() {
            return Err(ApiError::validation(format!("Unexpected file field: {}", name)));
        }
        if form.files.len() >= kind.max_files() {
            return Err(ApiError::validation(format!(
                "Too many files. Maximum {} allowed.",
                kind.max_files()
            )));
        }

        let essence = field.content_type().map(|m| m.essence_str().to_string()).unwrap_or_default();
        let ext = extension_for(&essence).ok_or_else(|| {
            ApiError::validation("Invalid file type. Only JPEG, PNG, and WebP images are allowed.")
        })?;

        let bytes = read_capped(&mut field, config.uploads.max_file_size).await?;
        let filename = unique_name(kind, ext);
        let path = kind.dir(config).join(&filename);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|err| ApiError::internal(format!("Failed to store upload: {}", err)))?;

        form.files.push(SavedFile {
            url_path: format!("/uploads/{}/{}", kind.subdir(), filename),
            filename,
            path,
        });
    }
    Ok(())
}

async fn next_field(payload: &mut Multipart) -> ApiResult<Option<Field>> {
    payload
        .try_next()
        .await
        .map_err(|err| ApiError::validation(format!("Malformed upload: {}", err)))
}

async fn read_capped(field: &mut Field, cap: usize) -> ApiResult<Vec<u8>> {
    let mut data = Vec::new();
    while let Some(chunk) = field
        .try_next()
        .await
        .map_err(|err| ApiError::validation(format!("Malformed upload: {}", err)))?
    {
        if data.len() + chunk.len() > cap {
            return Err(ApiError::validation(format!(
                "File too large. Maximum size is {}MB.",
                cap / (1024 * 1024)
            )));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

/// Best effort removal. A response must not fail because an image file is
/// already gone, so problems other than NotFound only get logged.
pub async fn remove_file(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!("failed to remove upload {}: {}", path.display(), err);
        }
    }
}

pub async fn cleanup_files(files: &[SavedFile]) {
    for file in files {
        remove_file(&file.path).await;
    }
}

/// Maps a stored `/uploads/...` url path back to its location on disk.
/// Anything outside the upload tree resolves to `None`.
pub fn stored_file_path(upload_dir: &Path, url_path: &str) -> Option<PathBuf> {
    let rel = url_path.strip_prefix("/uploads/")?;
    if rel.is_empty() || rel.split('/').any(|part| part == "..") {
        return None;
    }
    Some(upload_dir.join(rel))
}

/// Absolute form of a stored url path. Urls that are already absolute pass
/// through untouched.
pub fn absolute_url(base_url: &str, url_path: &str) -> String {
    if url_path.starts_with("http://") || url_path.starts_with("https://") {
        return url_path.to_string();
    }
    format!("{}{}", base_url.trim_end_matches('/'), url_path)
}

pub fn ensure_upload_dirs(config: &Config) -> std::io::Result<()> {
    std::fs::create_dir_all(UploadKind::FarmImages.dir(config))?;
    std::fs::create_dir_all(UploadKind::Avatar.dir(config))?;
    Ok(())
}

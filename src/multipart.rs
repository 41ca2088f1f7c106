use std::collections::HashMap;

use axum::extract::Multipart;
use tracing::warn;

use crate::{error::AppError, media::TempUpload};

/// A multipart body with its file parts spooled to temp files.
#[derive(Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, TempUpload>,
}

impl MultipartForm {
    pub async fn read(mut mp: Multipart, tmp_dir: &str) -> Result<Self, AppError> {
        let mut form = Self::default();
        loop {
            let field = match mp.next_field().await {
                Ok(Some(f)) => f,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "malformed multipart body");
                    return Err(AppError::Validation("Malformed multipart body".into()));
                }
            };
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if let Some(file_name) = field.file_name().map(str::to_string) {
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| "application/octet-stream".into());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Could not read {}: {}", name, e)))?;
                if data.is_empty() {
                    continue;
                }
                let upload =
                    TempUpload::spool(tmp_dir.into(), data, content_type, Some(file_name)).await?;
                form.files.insert(name, upload);
            } else {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Could not read {}: {}", name, e)))?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    /// Text field value, or an empty string when absent.
    pub fn text(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    pub fn take_file(&mut self, name: &str) -> Option<TempUpload> {
        self.files.remove(name)
    }
}

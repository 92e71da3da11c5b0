//! Multipart form collection for upload and edit endpoints

use std::collections::HashMap;

use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;

use crate::error::{ApiError, ApiResult};

/// File part of a multipart form
#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

fn form_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("The uploaded file is too large.".to_string())
    } else {
        ApiError::BadRequest(format!("Malformed form data: {}", err))
    }
}

/// Text fields and files of a multipart request
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl FormData {
    /// Read every part; file inputs submitted without a file are skipped
    pub async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = FormData::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(form_error)?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(form_error)?;
                    if !filename.is_empty() && !bytes.is_empty() {
                        form.files.insert(
                            name,
                            UploadedFile {
                                filename,
                                content_type,
                                bytes: bytes.to_vec(),
                            },
                        );
                    }
                }
                None => {
                    let text = field
                        .text()
                        .await
                        .map_err(form_error)?;
                    form.fields.insert(name, text);
                }
            }
        }
        Ok(form)
    }

    /// Raw text value ("" when absent)
    pub fn text(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    /// Trimmed value, `None` when absent or blank
    pub fn non_blank(&self, name: &str) -> Option<&str> {
        Some(self.text(name).trim()).filter(|v| !v.is_empty())
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }

    #[cfg(test)]
    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_accessors() {
        let form = FormData::default()
            .with_field("subject", "  HCI  ")
            .with_field("content", "   ");
        assert_eq!(form.text("subject"), "  HCI  ");
        assert_eq!(form.non_blank("subject"), Some("HCI"));
        assert_eq!(form.non_blank("content"), None);
        assert_eq!(form.text("missing"), "");
    }
}

//! Public types for media transfer.

use std::path::PathBuf;

use serde::Deserialize;

/// A file fetched from the media store and saved locally.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedMedia {
    /// Where the body was written.
    pub path: PathBuf,
    /// `Content-Type` of the response, `application/octet-stream` if absent.
    pub mime_type: String,
    /// Filename from `Content-Disposition`; empty when the store sent none.
    pub original_name: String,
}

/// Upload response body. Stores answer with either field.
#[derive(Debug, Deserialize)]
pub(crate) struct UploadResponse {
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl UploadResponse {
    /// Returns the identifier to reference the upload by, preferring `file_id`.
    pub(crate) fn into_identifier(self) -> Option<String> {
        self.file_id
            .filter(|s| !s.is_empty())
            .or(self.file_name.filter(|s| !s.is_empty()))
    }
}

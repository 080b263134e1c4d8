//! HTTP media client.
//!
//! Talks to two endpoints of the media store:
//! - `POST {server}/upload/file` (multipart field `file`) -> `{file_id | file_name}`
//! - `GET {server}/download/file?file_path=..` -> raw body + `Content-Type`

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use percent_encoding::percent_decode_str;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use tracing::{debug, info};

use crate::error::MediaError;
use crate::types::{DownloadedMedia, UploadResponse};

/// Boxed future returned by [`MediaTransfer`] methods.
pub type MediaFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, MediaError>> + Send + 'a>>;

const DEFAULT_MIME: &str = "application/octet-stream";

/// Abstract media store.
///
/// The gateway depends on this trait so tests can substitute a recorder.
pub trait MediaTransfer: Send + Sync {
    /// Uploads a local file and returns the store's identifier for it.
    fn upload<'a>(
        &'a self,
        server_url: &'a str,
        local_path: &'a Path,
        user_id: &'a str,
    ) -> MediaFuture<'a, String>;

    /// Downloads a stored file into the local inbound directory.
    fn download<'a>(
        &'a self,
        server_url: &'a str,
        file_path: &'a str,
        user_id: &'a str,
    ) -> MediaFuture<'a, DownloadedMedia>;
}

/// `reqwest`-backed media store client.
pub struct MediaClient {
    http: reqwest::Client,
    inbound_dir: PathBuf,
}

impl MediaClient {
    /// Creates a client that saves downloads under `inbound_dir`.
    pub fn new(http: reqwest::Client, inbound_dir: impl Into<PathBuf>) -> Self {
        Self {
            http,
            inbound_dir: inbound_dir.into(),
        }
    }

    /// Directory downloaded files are written to.
    pub fn inbound_dir(&self) -> &Path {
        &self.inbound_dir
    }

    /// Uploads `local_path` and returns the identifier from the response.
    pub async fn upload_file(
        &self,
        server_url: &str,
        local_path: &Path,
        user_id: &str,
    ) -> Result<String, MediaError> {
        let base = normalize_server_url(server_url)?;

        let data = match tokio::fs::read(local_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MediaError::NotFound(local_path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();

        info!(file = %file_name, size = data.len(), "uploading media");

        let part = reqwest::multipart::Part::bytes(data)
            .file_name(file_name)
            .mime_str(DEFAULT_MIME)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .http
            .post(format!("{base}/upload/file"))
            .query(&[("user_id", user_id)])
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(MediaError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(body = %body, "upload response");
        let parsed: UploadResponse = serde_json::from_str(&body)?;
        parsed.into_identifier().ok_or(MediaError::EmptyResponse)
    }

    /// Downloads `file_path` from the store and saves it locally.
    pub async fn download_file(
        &self,
        server_url: &str,
        file_path: &str,
        user_id: &str,
    ) -> Result<DownloadedMedia, MediaError> {
        let base = normalize_server_url(server_url)?;
        let url = format!("{base}/download/file");
        debug!(url = %url, file_path, "downloading media");

        let resp = self
            .http
            .get(&url)
            .query(&[("user_id", user_id), ("file_path", file_path)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MediaError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mime_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_MIME)
            .to_string();

        let original_name = resp
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_disposition_filename)
            .unwrap_or_default();

        let data = resp.bytes().await?;

        let millis = chrono::Utc::now().timestamp_millis();
        let local_name = if original_name.is_empty() {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            format!("{millis}_{}.{}", &suffix[..6], extension_for(&mime_type))
        } else {
            format!("{millis}_{original_name}")
        };

        tokio::fs::create_dir_all(&self.inbound_dir).await?;
        let path = self.inbound_dir.join(local_name);
        tokio::fs::write(&path, &data).await?;

        debug!(path = %path.display(), size = data.len(), "media saved");

        Ok(DownloadedMedia {
            path,
            mime_type,
            original_name,
        })
    }
}

impl MediaTransfer for MediaClient {
    fn upload<'a>(
        &'a self,
        server_url: &'a str,
        local_path: &'a Path,
        user_id: &'a str,
    ) -> MediaFuture<'a, String> {
        Box::pin(self.upload_file(server_url, local_path, user_id))
    }

    fn download<'a>(
        &'a self,
        server_url: &'a str,
        file_path: &'a str,
        user_id: &'a str,
    ) -> MediaFuture<'a, DownloadedMedia> {
        Box::pin(self.download_file(server_url, file_path, user_id))
    }
}

/// Trims trailing slashes and prepends `http://` when no scheme is present.
pub fn normalize_server_url(server_url: &str) -> Result<String, MediaError> {
    let trimmed = server_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(MediaError::InvalidRequest("server URL is empty".into()));
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("http://{trimmed}"))
    }
}

/// Extracts the filename from a `Content-Disposition` header value.
///
/// Prefers the RFC 5987 `filename*=UTF-8''...` form, then `filename=`
/// (quoted or bare). Directory components are dropped.
pub fn parse_content_disposition_filename(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in value.split(';').map(str::trim) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let raw = raw.trim();
                let encoded = raw.rsplit_once('\'').map(|(_, v)| v).unwrap_or(raw);
                extended = percent_decode_str(encoded.trim_matches('"'))
                    .decode_utf8()
                    .ok()
                    .map(|s| s.into_owned());
            }
            "filename" => {
                plain = Some(raw.trim().trim_matches(|c| c == '"' || c == '\'').to_string());
            }
            _ => {}
        }
    }

    extended
        .or(plain)
        .map(|name| base_name(&name).to_string())
        .filter(|name| !name.is_empty() && name != "." && name != "..")
}

fn base_name(name: &str) -> &str {
    name.rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(name)
        .trim()
}

/// Derives a file extension from a MIME type (`image/png; q=1` -> `png`).
pub fn extension_for(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .and_then(|essence| essence.split_once('/'))
        .map(|(_, sub)| sub.split('+').next().unwrap_or(sub).trim())
        .filter(|sub| {
            !sub.is_empty()
                && sub
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        })
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "bin".into())
}

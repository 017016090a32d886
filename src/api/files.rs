use reqwest::Method;
use serde_json::json;
use std::path::Path;
use tracing::info;

use super::models::{DownloadUrl, FileInfo, UploadRequest, UploadUrl};
use super::ApiClient;
use crate::error::{ApiError, AppError};
use crate::Result;

/// Link a recipient can open to fetch a shared file.
pub fn share_link(origin: &str, key: &str) -> String {
    let mut url = format!("{}/files", origin.trim_end_matches('/'));
    url.push_str("?downloadKey=");
    url.push_str(&url::form_urlencoded::byte_serialize(key.as_bytes()).collect::<String>());
    url
}

impl ApiClient {
    /// Asks the backend for a presigned upload URL. Leaving `key` empty lets
    /// the server pick one.
    pub async fn request_upload(&self, request: &UploadRequest) -> Result<UploadUrl> {
        self.post("/files", request).await
    }

    /// Uploads raw bytes straight to a presigned object-store URL.
    pub async fn put_signed(&self, signed_url: &str, bytes: Vec<u8>) -> Result<()> {
        let response = self
            .http()
            .put(signed_url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: if body.trim().is_empty() {
                    status.canonical_reason().unwrap_or("upload failed").to_string()
                } else {
                    body
                },
            }
            .into());
        }
        Ok(())
    }

    pub async fn download_url(&self, key: &str) -> Result<DownloadUrl> {
        self.get_query("/files/download", &[("key", key)]).await
    }

    pub async fn file_info(&self, key: &str) -> Result<FileInfo> {
        self.get_query("/files", &[("key", key)]).await
    }

    pub async fn delete_file(&self, key: &str) -> Result<()> {
        let builder = self
            .request(Method::DELETE, "/files")?
            .json(&json!({ "key": key }));
        self.execute(builder).await
    }

    /// Requests a presigned URL and uploads the file at `path` to it.
    /// Returns the key the file can be downloaded with.
    pub async fn upload_file(
        &self,
        path: &Path,
        key: Option<String>,
        max_download: u32,
    ) -> Result<String> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::ValidationError(format!("not a file: {}", path.display())))?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        let key = key.filter(|k| !k.trim().is_empty());

        let UploadUrl { key, signed_url } = self
            .request_upload(&UploadRequest {
                name: name.clone(),
                key,
                max_download,
            })
            .await?;

        let size = bytes.len();
        self.put_signed(&signed_url, bytes).await?;
        info!(%name, %key, size, "file uploaded");
        Ok(key)
    }

    /// Resolves the presigned download URL for `key` and saves the body to `dest`.
    pub async fn download_file(&self, key: &str, dest: &Path) -> Result<u64> {
        let DownloadUrl { signed_url } = self.download_url(key).await?;

        let response = self.http().get(&signed_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("download failed").to_string(),
            }
            .into());
        }
        let bytes = response.bytes().await?;
        tokio::fs::write(dest, &bytes).await?;
        info!(%key, dest = %dest.display(), size = bytes.len(), "file downloaded");
        Ok(bytes.len() as u64)
    }
}

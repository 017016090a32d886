//! REST client for the homepage backend.
//!
//! Every endpoint answers with an [`ApiResponse`] envelope. The helpers here
//! turn transport failures, non-2xx statuses and non-zero envelope codes into
//! [`ApiError`]s so callers only ever see the payload or an error.

mod auth;
mod feedback;
mod files;
pub mod models;
mod projects;
mod rooms;
pub mod validation;

pub use files::share_link;
pub use models::*;
pub use rooms::RoomService;

#[cfg(test)]
pub use rooms::MockRoomService;

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::config::ApiConfig;
use crate::error::{ApiError, AppError};
use crate::storage::{self, LocalStore};
use crate::Result;

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    store: Arc<LocalStore>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, store: Arc<LocalStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::ConfigError(format!("failed to build HTTP client: {}", e)))?;

        // A trailing slash keeps `Url::join` from dropping the last path segment.
        let mut base = config.base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)?;

        Ok(Self { http, base_url, store })
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.endpoint(path)?;
        debug!(%method, %url, "api request");
        let builder = self.http.request(method, url);
        Ok(match self.store.get(storage::TOKEN) {
            Some(token) if !token.is_empty() => builder.bearer_auth(token),
            _ => builder,
        })
    }

    /// Plain client without the bearer token, for presigned object-store URLs.
    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) async fn send_envelope<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<ApiResponse<T>> {
        let response = builder.send().await?;
        decode_envelope(response).await
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let builder = self.request(Method::GET, path)?;
        self.send_envelope(builder).await?.into_data()
    }

    pub(crate) async fn get_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let builder = self.request(Method::GET, path)?.query(query);
        self.send_envelope(builder).await?.into_data()
    }

    pub(crate) async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let builder = self.request(Method::POST, path)?.json(body);
        self.send_envelope(builder).await?.into_data()
    }

    /// Sends a request whose envelope carries no meaningful `data`.
    pub(crate) async fn execute(&self, builder: RequestBuilder) -> Result<()> {
        self.send_envelope::<serde_json::Value>(builder)
            .await?
            .ensure_ok()
    }
}

impl<T> ApiResponse<T> {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }

    pub fn ensure_ok(self) -> Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(ApiError::Business {
                code: self.code,
                message: non_empty_or(self.message, "request failed"),
            }
            .into())
        }
    }

    pub fn into_data(self) -> Result<T> {
        if !self.is_ok() {
            return Err(ApiError::Business {
                code: self.code,
                message: non_empty_or(self.message, "request failed"),
            }
            .into());
        }
        self.data.ok_or_else(|| ApiError::MissingData.into())
    }
}

fn non_empty_or(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

async fn decode_envelope<T: DeserializeOwned>(response: Response) -> Result<ApiResponse<T>> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ApiResponse<serde_json::Value>>(&body)
            .ok()
            .map(|env| env.message)
            .filter(|m| !m.trim().is_empty())
            .or_else(|| Some(body.trim().to_string()).filter(|b| !b.is_empty()))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        warn!(status = status.as_u16(), %message, "api request failed");
        return Err(ApiError::Status {
            status: status.as_u16(),
            message,
        }
        .into());
    }

    serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()).into())
}

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Response};
use serde_json::Value;
use tracing::{debug, error, info};

use super::sse::{ChatEvent, SseDecoder};
use crate::api::{ApiClient, ChatRequest};
use crate::error::{ApiError, AppError, StreamError};
use crate::Result;

const EVENT_STREAM: &str = "text/event-stream";
const NON_SSE: &str = "non-SSE response";

/// Receives a streamed assistant reply. Exactly one of `on_finished` and
/// `on_error` is called per request.
pub trait ChatStreamHandler {
    fn on_event(&mut self, event: ChatEvent);
    fn on_finished(&mut self);
    fn on_error(&mut self, error: &AppError);
}

impl ApiClient {
    /// Sends `request` to the assistant and streams the reply into `handler`.
    pub async fn ai_chat<H>(&self, request: &ChatRequest, handler: &mut H) -> Result<()>
    where
        H: ChatStreamHandler + ?Sized,
    {
        match self.stream_ai_chat(request, handler).await {
            Ok(()) => {
                handler.on_finished();
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "assistant chat failed");
                handler.on_error(&e);
                Err(e)
            }
        }
    }

    async fn stream_ai_chat<H>(&self, request: &ChatRequest, handler: &mut H) -> Result<()>
    where
        H: ChatStreamHandler + ?Sized,
    {
        let mut response = self
            .request(Method::POST, "/aichat")?
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(http_failure(response).await.into());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();
        if !content_type.contains(EVENT_STREAM) {
            return Err(StreamError::NotEventStream(non_sse_message(response).await).into());
        }

        info!("assistant stream opened");
        let mut decoder = SseDecoder::new();
        let mut count = 0usize;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| StreamError::Read(e.to_string()))?
        {
            for event in decoder.push(&chunk) {
                count += 1;
                handler.on_event(event);
            }
        }
        for event in decoder.finish() {
            count += 1;
            handler.on_event(event);
        }
        debug!(events = count, "assistant stream finished");
        Ok(())
    }
}

/// `message`, then `error`, then the body itself, then the status reason.
async fn http_failure(response: Response) -> ApiError {
    let status = response.status();
    let reason = status.canonical_reason().unwrap_or("request failed").to_string();
    let body = response.text().await.unwrap_or_default();

    let message = match serde_json::from_str::<Value>(&body) {
        Ok(json) => json_field(&json, "message")
            .or_else(|| json_field(&json, "error"))
            .unwrap_or_else(|| json.to_string()),
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => reason,
    };
    ApiError::Status {
        status: status.as_u16(),
        message,
    }
}

async fn non_sse_message(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<Value>(&body) {
        Ok(json) => json_field(&json, "message")
            .or_else(|| json_field(&json, "error"))
            .or_else(|| match json.get("code") {
                Some(code) if !code.is_null() && code != &Value::from(0) => {
                    Some(format!("code={}", code))
                }
                _ => None,
            })
            .unwrap_or_else(|| NON_SSE.to_string()),
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => NON_SSE.to_string(),
    }
}

fn json_field(json: &Value, key: &str) -> Option<String> {
    match json.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::String(_) | Value::Null => None,
        other => Some(other.to_string()),
    }
}

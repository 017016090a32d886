use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("API error: {0}")]
    ApiError(#[from] ApiError),

    #[error("Chat error: {0}")]
    ChatError(#[from] ChatError),

    #[error("Stream error: {0}")]
    StreamError(#[from] StreamError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Message suitable for a notification body: the innermost description
    /// without the family prefix.
    pub fn user_message(&self) -> String {
        match self {
            AppError::ApiError(e) => e.user_message(),
            AppError::ChatError(e) => e.to_string(),
            AppError::StreamError(e) => e.to_string(),
            AppError::StorageError(e) => e.to_string(),
            AppError::ConfigError(m) | AppError::ValidationError(m) | AppError::InternalError(m) => {
                m.clone()
            }
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AppError::ApiError(ApiError::Decode(err.to_string()))
        } else {
            AppError::ApiError(ApiError::Transport(err.to_string()))
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ApiError(ApiError::Decode(err.to_string()))
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        AppError::ConfigError(format!("invalid URL: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        AppError::ChatError(ChatError::Connection(err.to_string()))
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request rejected (code {code}): {message}")]
    Business { code: i64, message: String },

    #[error("response carried no data")]
    MissingData,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { message, .. } | ApiError::Business { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("WebSocket base URL is not configured")]
    MissingBaseUrl,

    #[error("WebSocket connection is not established")]
    NotConnected,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Message sending failed: {0}")]
    Send(String),

    #[error("Invalid message format: {0}")]
    InvalidFormat(String),
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("{0}")]
    NotEventStream(String),

    #[error("stream read failed: {0}")]
    Read(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O failure: {0}")]
    Io(String),

    #[error("store file is corrupt: {0}")]
    Corrupt(String),

    #[error("{0}")]
    Crypto(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::InternalError(_)));

        let config_err = config::ConfigError::NotFound(String::from("key not found"));
        let app_err: AppError = config_err.into();
        assert!(matches!(app_err, AppError::ConfigError(_)));

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let app_err: AppError = json_err.into();
        assert!(matches!(app_err, AppError::ApiError(ApiError::Decode(_))));

        let url_err = url::Url::parse("not a url").unwrap_err();
        let app_err: AppError = url_err.into();
        assert!(matches!(app_err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_error_display() {
        let err = AppError::ValidationError("title is required".to_string());
        assert_eq!(err.to_string(), "Validation error: title is required");

        let err = AppError::ChatError(ChatError::NotConnected);
        assert_eq!(
            err.to_string(),
            "Chat error: WebSocket connection is not established"
        );

        let err = AppError::ApiError(ApiError::Status {
            status: 404,
            message: "room does not exist".into(),
        });
        assert_eq!(err.to_string(), "API error: HTTP 404: room does not exist");
    }

    #[test]
    fn test_user_message_strips_prefixes() {
        let err = AppError::ApiError(ApiError::Business {
            code: 1001,
            message: "username taken".into(),
        });
        assert_eq!(err.user_message(), "username taken");

        let err = AppError::ValidationError("content must be 10-1000 characters".into());
        assert_eq!(err.user_message(), "content must be 10-1000 characters");
    }

    #[test]
    fn test_api_error_status() {
        let err = ApiError::Status { status: 503, message: "down".into() };
        assert_eq!(err.status(), Some(503));
        assert_eq!(ApiError::MissingData.status(), None);
    }
}

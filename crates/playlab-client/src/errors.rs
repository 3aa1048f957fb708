/// Errors returned by every public client operation.
///
/// Nothing in the client retries: a failed request surfaces here immediately.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaylabError {
    /// Missing or rejected credentials (HTTP 401).
    #[error("authentication error: {0}")]
    Authentication(String),
    /// Caller input the API or the client refused (HTTP 400, bad ids, bad paths).
    #[error("validation error: {0}")]
    Validation(String),
    /// Any other transport or HTTP failure.
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status when a response was received.
        status: Option<u16>,
        /// Raw error body as returned by the server.
        body: Option<String>,
        /// Text accumulated before a streaming call failed, for diagnostics only.
        partial: Option<String>,
    },
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

impl PlaylabError {
    /// Creates an API error without status or body.
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
            status: None,
            body: None,
            partial: None,
        }
    }

    /// Maps a non-success HTTP response to the matching error kind.
    ///
    /// The message comes from the `error` field of a JSON body, then the raw
    /// body text, then `"Unknown error"`.
    pub fn from_status(status: u16, raw_body: &str) -> Self {
        let message = match serde_json::from_str::<ErrorBody>(raw_body) {
            Ok(ErrorBody { error: Some(error) }) => error,
            Ok(ErrorBody { error: None }) => "Unknown error".to_string(),
            Err(_) if raw_body.trim().is_empty() => "Unknown error".to_string(),
            Err(_) => raw_body.to_string(),
        };
        match status {
            401 => Self::Authentication(message),
            400 => Self::Validation(message),
            _ => Self::Api {
                message,
                status: Some(status),
                body: Some(raw_body.to_string()),
                partial: None,
            },
        }
    }

    /// Attaches the text received before a stream failed.
    pub fn with_partial(self, text: impl Into<String>) -> Self {
        match self {
            Self::Api {
                message,
                status,
                body,
                ..
            } => Self::Api {
                message,
                status,
                body,
                partial: Some(text.into()),
            },
            other => other,
        }
    }

    /// Prefixes the message of an API error; other kinds pass through untouched.
    pub fn context(self, prefix: &str) -> Self {
        match self {
            Self::Api {
                message,
                status,
                body,
                partial,
            } => Self::Api {
                message: format!("{prefix}: {message}"),
                status,
                body,
                partial,
            },
            other => other,
        }
    }

    /// Returns the HTTP status carried by an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => *status,
            Self::Authentication(_) => Some(401),
            Self::Validation(_) => None,
        }
    }

    /// Returns text received before a streaming call failed, if any.
    pub fn partial_text(&self) -> Option<&str> {
        match self {
            Self::Api { partial, .. } => partial.as_deref(),
            _ => None,
        }
    }
}

use reqwest::blocking::Response;
use reqwest::StatusCode;
use serde_json::Value;

/// Failure category of a request, used by callers to decide what to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NetworkUnreachable,
    AuthorizationExpired,
    PermissionDenied,
    Validation,
    NotFound,
    Conflict,
    RateLimited,
    ServerError,
    Unknown,
}

impl ErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ErrorKind::Validation,
            401 => ErrorKind::AuthorizationExpired,
            403 => ErrorKind::PermissionDenied,
            404 => ErrorKind::NotFound,
            409 => ErrorKind::Conflict,
            429 => ErrorKind::RateLimited,
            500..=599 => ErrorKind::ServerError,
            _ => ErrorKind::Unknown,
        }
    }

    /// Only an expired session is recoverable, and only once per request.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ErrorKind::AuthorizationExpired)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("network unreachable: {0}")]
    Network(#[source] reqwest::Error),
    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),
    #[error("api error {status}: {}", message.as_deref().unwrap_or("no message"))]
    Status {
        status: StatusCode,
        message: Option<String>,
        body: String,
    },
    #[error("session expired and could not be refreshed")]
    SessionExpired {
        #[source]
        refresh: Box<ApiError>,
    },
    #[error("decode response: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err)
        } else if err.is_builder() {
            ApiError::InvalidRequest(err.to_string())
        } else {
            ApiError::Network(err)
        }
    }

    pub(crate) fn from_response(resp: Response) -> Self {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        ApiError::Status {
            status,
            message: server_message(&body),
            body,
        }
    }

    /// HTTP status of the failure, when a response was received.
    ///
    /// A failed session refresh reports 401 so callers can keep branching on
    /// the status of the request they issued.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(status.as_u16()),
            ApiError::SessionExpired { .. } => Some(StatusCode::UNAUTHORIZED.as_u16()),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network(_) | ApiError::Timeout(_) => ErrorKind::NetworkUnreachable,
            ApiError::SessionExpired { .. } => ErrorKind::AuthorizationExpired,
            ApiError::Status { status, .. } => ErrorKind::from_status(status.as_u16()),
            ApiError::Decode(_) | ApiError::InvalidRequest(_) => ErrorKind::Unknown,
        }
    }

    /// Message supplied by the server in the error body, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED.as_u16())
    }
}

fn server_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    parsed
        .get("message")
        .and_then(message_text)
        .or_else(|| parsed.get("error").and_then(message_text))
}

/// Validation failures arrive as a list of messages, everything else as a
/// single string.
fn message_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

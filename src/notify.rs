use std::fmt;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::{ApiError, ErrorKind};

/// User-facing message raised for a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    NetworkUnreachable,
    LoginRequired,
    Validation(Option<String>),
    PermissionDenied(Option<String>),
    NotFound,
    Conflict(Option<String>),
    RateLimited,
    ServerError,
    Unknown,
}

impl Notice {
    pub fn for_error(err: &ApiError) -> Self {
        let server = err.server_message().map(str::to_string);
        match err.kind() {
            ErrorKind::NetworkUnreachable => Notice::NetworkUnreachable,
            ErrorKind::AuthorizationExpired => Notice::LoginRequired,
            ErrorKind::Validation => Notice::Validation(server),
            ErrorKind::PermissionDenied => Notice::PermissionDenied(server),
            ErrorKind::NotFound => Notice::NotFound,
            ErrorKind::Conflict => Notice::Conflict(server),
            ErrorKind::RateLimited => Notice::RateLimited,
            ErrorKind::ServerError => Notice::ServerError,
            ErrorKind::Unknown => Notice::Unknown,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Notice::NetworkUnreachable => "Please check your network connection.".into(),
            Notice::LoginRequired => "Please sign in to continue.".into(),
            Notice::Validation(msg) => msg.clone().unwrap_or_else(|| "Invalid request.".into()),
            Notice::PermissionDenied(msg) => msg
                .clone()
                .unwrap_or_else(|| "You do not have permission to do that.".into()),
            Notice::NotFound => "The requested resource could not be found.".into(),
            Notice::Conflict(msg) => msg.clone().unwrap_or_else(|| "This data already exists.".into()),
            Notice::RateLimited => "Too many requests. Please try again shortly.".into(),
            Notice::ServerError => "A server error occurred. Please try again shortly.".into(),
            Notice::Unknown => "An unknown error occurred.".into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Emits notices as log events.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        tracing::warn!(?notice, "{}", notice);
    }
}

/// Forwards notices to whoever owns the receiving end, typically a UI thread.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: Sender<Notice>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, Receiver<Notice>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: Notice) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.tx.send(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn status(code: u16, message: Option<&str>) -> ApiError {
        ApiError::Status {
            status: StatusCode::from_u16(code).unwrap(),
            message: message.map(str::to_string),
            body: String::new(),
        }
    }

    #[test]
    fn server_message_wins_for_validation_and_conflict() {
        let notice = Notice::for_error(&status(400, Some("title is required")));
        assert_eq!(notice.message(), "title is required");

        let notice = Notice::for_error(&status(409, None));
        assert_eq!(notice, Notice::Conflict(None));
        assert_eq!(notice.message(), "This data already exists.");
    }

    #[test]
    fn fixed_messages_ignore_server_text() {
        let notice = Notice::for_error(&status(404, Some("article 9 missing")));
        assert_eq!(notice, Notice::NotFound);
        assert_eq!(Notice::for_error(&status(429, None)), Notice::RateLimited);
        assert_eq!(Notice::for_error(&status(503, None)), Notice::ServerError);
        assert_eq!(Notice::for_error(&status(418, None)), Notice::Unknown);
    }

    #[test]
    fn channel_notifier_delivers_in_order() {
        let (notifier, rx) = ChannelNotifier::new();
        notifier.notify(Notice::NotFound);
        notifier.notify(Notice::RateLimited);
        assert_eq!(rx.try_recv().unwrap(), Notice::NotFound);
        assert_eq!(rx.try_recv().unwrap(), Notice::RateLimited);
        assert!(rx.try_recv().is_err());
    }
}

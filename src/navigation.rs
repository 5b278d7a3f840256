use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};

pub const LOGIN_PATH: &str = "/login";
pub const REDIRECT_DELAY: Duration = Duration::from_millis(1500);

/// Where the user currently is, and how to send them elsewhere.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;
    fn navigate(&self, path: &str);
}

/// In-memory location that remembers every navigation.
#[derive(Debug, Default)]
pub struct Location {
    path: RwLock<String>,
    history: Mutex<Vec<String>>,
}

impl Location {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: RwLock::new(path.into()),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn set_path(&self, path: impl Into<String>) {
        *self.path.write() = path.into();
    }

    pub fn history(&self) -> Vec<String> {
        self.history.lock().clone()
    }
}

impl Navigator for Location {
    fn current_path(&self) -> String {
        self.path.read().clone()
    }

    fn navigate(&self, path: &str) {
        self.history.lock().push(path.to_string());
        *self.path.write() = path.to_string();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedirectPolicy {
    pub protected_prefixes: Vec<String>,
    pub login_path: String,
    pub delay: Duration,
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self {
            protected_prefixes: default_protected_prefixes(),
            login_path: LOGIN_PATH.to_string(),
            delay: REDIRECT_DELAY,
        }
    }
}

pub fn default_protected_prefixes() -> Vec<String> {
    vec![
        "/profile".into(),
        "/products/new".into(),
        "/articles/new".into(),
    ]
}

impl RedirectPolicy {
    pub fn is_protected(&self, path: &str) -> bool {
        self.protected_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && path.starts_with(prefix.as_str()))
    }

    /// Sends the navigator to the login page after `delay`, unless cancelled
    /// first. Returns `None` when the current location is not protected.
    pub fn schedule(&self, navigator: Arc<dyn Navigator>) -> Option<ScheduledRedirect> {
        let from = navigator.current_path();
        if !self.is_protected(&from) {
            return None;
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let delay = self.delay;
        let target = self.login_path.clone();
        tracing::info!(%from, to = %target, ?delay, "scheduling login redirect");

        let thread = thread::spawn(move || match stop_rx.recv_timeout(delay) {
            Err(RecvTimeoutError::Timeout) => navigator.navigate(&target),
            // Cancelled explicitly, or the owner went away.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
        });

        Some(ScheduledRedirect {
            stop: stop_tx,
            thread: Some(thread),
        })
    }
}

/// Handle to a pending redirect. Dropping it cancels the redirect.
pub struct ScheduledRedirect {
    stop: Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ScheduledRedirect {
    pub fn cancel(mut self) {
        let _ = self.stop.try_send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    /// Blocks until the redirect has fired or been cancelled.
    pub fn wait(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread
            .as_ref()
            .map(|thread| thread.is_finished())
            .unwrap_or(true)
    }
}

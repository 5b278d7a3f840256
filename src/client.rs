use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::error::ApiError;
use crate::navigation::{Navigator, RedirectPolicy, ScheduledRedirect};
use crate::notify::{LogNotifier, Notice, Notifier};

pub const DEFAULT_BASE_URL: &str = "http://localhost:4000";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const REFRESH_PATH: &str = "/auth/refresh";

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    pub user_agent: String,
    pub timeout: Option<Duration>,
    pub refresh_path: Option<String>,
    pub redirect: RedirectPolicy,
}

/// A single outbound call. Kept intact so it can be replayed verbatim after a
/// session refresh.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Body,
}

#[derive(Debug, Clone)]
enum Body {
    Empty,
    Json(Value),
    Multipart(Vec<FilePart>),
}

#[derive(Debug, Clone)]
struct FilePart {
    field: String,
    file_name: String,
    mime: String,
    bytes: Vec<u8>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn params(mut self, params: Vec<(String, String)>) -> Self {
        self.query.extend(params);
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|err| ApiError::InvalidRequest(format!("encode body: {err}")))?;
        self.body = Body::Json(value);
        Ok(self)
    }

    pub fn file(
        mut self,
        field: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        let part = FilePart {
            field: field.into(),
            file_name: file_name.into(),
            mime: mime.into(),
            bytes,
        };
        match &mut self.body {
            Body::Multipart(parts) => parts.push(part),
            _ => self.body = Body::Multipart(vec![part]),
        }
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Progress of the one-shot refresh protocol for one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshState {
    #[default]
    NotRefreshed,
    Refreshing,
    Replaying,
}

/// Markers owned by one in-flight request: whether it already refreshed the
/// session and whether the user was already told about its failure.
#[derive(Debug, Default)]
struct Attempt {
    refresh: RefreshState,
    notified: bool,
}

impl Attempt {
    fn begin_refresh(&mut self) -> bool {
        if self.refresh != RefreshState::NotRefreshed {
            return false;
        }
        self.refresh = RefreshState::Refreshing;
        true
    }

    fn refreshed(&mut self) {
        self.refresh = RefreshState::Replaying;
    }

    fn claim_notice(&mut self) -> bool {
        !std::mem::replace(&mut self.notified, true)
    }
}

pub struct Client {
    http: HttpClient,
    base_url: String,
    refresh_path: String,
    redirect: RedirectPolicy,
    notifier: Arc<dyn Notifier>,
    navigator: Option<Arc<dyn Navigator>>,
    pending_redirect: Mutex<Option<ScheduledRedirect>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("market client user agent required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Url::parse(&base).with_context(|| format!("invalid api base url {base:?}"))?;

        let http = HttpClient::builder()
            .timeout(config.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .cookie_store(true)
            .user_agent(config.user_agent.clone())
            .build()
            .context("build http client")?;

        Ok(Client {
            http,
            base_url: base.trim_end_matches('/').to_string(),
            refresh_path: config
                .refresh_path
                .unwrap_or_else(|| REFRESH_PATH.to_string()),
            redirect: config.redirect,
            notifier: Arc::new(LogNotifier),
            navigator: None,
            pending_redirect: Mutex::new(None),
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issues `request`, refreshing the session and replaying the request at
    /// most once when the server answers 401.
    pub fn execute(&self, request: &Request) -> Result<Response, ApiError> {
        let mut attempt = Attempt::default();
        loop {
            let err = match self.send(request) {
                Ok(resp) => return Ok(resp),
                Err(err) => err,
            };

            if err.kind().is_recoverable() && attempt.begin_refresh() {
                match self.refresh_session() {
                    Ok(()) => {
                        attempt.refreshed();
                        tracing::debug!(path = %request.path, "session refreshed, replaying request");
                        continue;
                    }
                    Err(refresh_err) => {
                        tracing::warn!(path = %request.path, error = %refresh_err, "session refresh failed");
                        let err = ApiError::SessionExpired {
                            refresh: Box::new(refresh_err),
                        };
                        self.report(&err, &mut attempt);
                        self.redirect_if_protected();
                        return Err(err);
                    }
                }
            }

            self.report(&err, &mut attempt);
            return Err(err);
        }
    }

    pub fn fetch<T: DeserializeOwned>(&self, request: &Request) -> Result<T, ApiError> {
        let resp = self.execute(request)?;
        let decoded = resp
            .bytes()
            .map_err(ApiError::from_transport)
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(ApiError::Decode));
        // A body that cannot be read or decoded is a terminal failure of its
        // own; execute() raised no notice for it.
        decoded.map_err(|err| {
            tracing::warn!(path = %request.path, error = %err, "unreadable response body");
            self.notifier.notify(Notice::for_error(&err));
            err
        })
    }

    pub fn submit(&self, request: &Request) -> Result<(), ApiError> {
        self.execute(request).map(|_| ())
    }

    fn refresh_session(&self) -> Result<(), ApiError> {
        let refresh = Request::post(self.refresh_path.clone()).json(&serde_json::json!({}))?;
        self.send(&refresh).map(|_| ())
    }

    fn send(&self, request: &Request) -> Result<Response, ApiError> {
        let url = self.url_for(request)?;
        let mut req = self.http.request(request.method.clone(), url);
        req = match &request.body {
            Body::Empty => req,
            Body::Json(value) => req.json(value),
            Body::Multipart(parts) => req.multipart(build_form(parts)?),
        };

        tracing::debug!(method = %request.method, path = %request.path, "sending request");
        let resp = req.send().map_err(ApiError::from_transport)?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(ApiError::from_response(resp))
        }
    }

    fn url_for(&self, request: &Request) -> Result<Url, ApiError> {
        let raw = format!("{}{}", self.base_url, request.path);
        let mut url = Url::parse(&raw)
            .map_err(|err| ApiError::InvalidRequest(format!("{raw}: {err}")))?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &request.query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    fn report(&self, err: &ApiError, attempt: &mut Attempt) {
        if attempt.claim_notice() {
            self.notifier.notify(Notice::for_error(err));
        }
    }

    fn redirect_if_protected(&self) {
        let Some(navigator) = self.navigator.clone() else {
            return;
        };
        if let Some(scheduled) = self.redirect.schedule(navigator) {
            // A newer redirect supersedes one that is still waiting.
            let previous = self.pending_redirect.lock().replace(scheduled);
            if let Some(previous) = previous {
                previous.cancel();
            }
        }
    }

    /// Blocks until a scheduled login redirect, if any, has fired.
    pub fn wait_for_redirect(&self) {
        let pending = self.pending_redirect.lock().take();
        if let Some(pending) = pending {
            pending.wait();
        }
    }
}

fn build_form(parts: &[FilePart]) -> Result<Form, ApiError> {
    let mut form = Form::new();
    for part in parts {
        let file = Part::bytes(part.bytes.clone())
            .file_name(part.file_name.clone())
            .mime_str(&part.mime)
            .map_err(|err| ApiError::InvalidRequest(format!("mime {}: {err}", part.mime)))?;
        form = form.part(part.field.clone(), file);
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_is_granted_once() {
        let mut attempt = Attempt::default();
        assert_eq!(attempt.refresh, RefreshState::NotRefreshed);
        assert!(attempt.begin_refresh());
        assert_eq!(attempt.refresh, RefreshState::Refreshing);
        assert!(!attempt.begin_refresh());
        attempt.refreshed();
        assert_eq!(attempt.refresh, RefreshState::Replaying);
        assert!(!attempt.begin_refresh());
    }

    #[test]
    fn notice_is_claimed_once() {
        let mut attempt = Attempt::default();
        assert!(attempt.claim_notice());
        assert!(!attempt.claim_notice());
    }

    #[test]
    fn rejects_blank_user_agent() {
        let err = Client::new(ClientConfig::default()).err().unwrap();
        assert!(err.to_string().contains("user agent"));
    }

    #[test]
    fn builds_urls_under_base_path() {
        let client = Client::new(ClientConfig {
            base_url: Some("http://api.local:4000/v1/".into()),
            user_agent: "market-test".into(),
            ..ClientConfig::default()
        })
        .unwrap();
        let request = Request::get("/articles/3/comments")
            .query("limit", 10)
            .query("cursor", "a b&c");
        let url = client.url_for(&request).unwrap();
        assert_eq!(
            url.as_str(),
            "http://api.local:4000/v1/articles/3/comments?limit=10&cursor=a+b%26c"
        );
    }

    #[test]
    fn file_parts_accumulate() {
        let request = Request::post("/api/images")
            .file("images", "a.png", "image/png", vec![1])
            .file("images", "b.png", "image/png", vec![2]);
        match &request.body {
            Body::Multipart(parts) => assert_eq!(parts.len(), 2),
            other => panic!("unexpected body {other:?}"),
        }
    }
}

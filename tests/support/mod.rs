#![allow(dead_code)]

use std::io::Read;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use serde_json::Value;
use tiny_http::{Header, Response, Server};

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub url: String,
    pub body: Vec<u8>,
    pub cookie: Option<String>,
    pub content_type: Option<String>,
}

impl Recorded {
    pub fn path(&self) -> &str {
        self.url.split('?').next().unwrap_or(&self.url)
    }

    pub fn query(&self) -> Option<&str> {
        self.url.split_once('?').map(|(_, query)| query)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub struct Reply {
    status: u16,
    body: String,
    headers: Vec<(String, String)>,
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: body.to_string(),
            headers: vec![("Content-Type".into(), "application/json".into())],
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            headers: Vec::new(),
        }
    }

    pub fn set_cookie(mut self, cookie: &str) -> Self {
        self.headers.push(("Set-Cookie".into(), cookie.into()));
        self
    }
}

/// Scripted HTTP backend on an ephemeral local port. Requests are handled one
/// at a time, in arrival order.
pub struct MockServer {
    server: Arc<Server>,
    url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl MockServer {
    pub fn start<F>(mut handler: F) -> Self
    where
        F: FnMut(&Recorded) -> Reply + Send + 'static,
    {
        let server = Arc::new(Server::http("127.0.0.1:0").expect("bind mock server"));
        let url = format!("http://{}", server.server_addr());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let thread = {
            let server = server.clone();
            let requests = requests.clone();
            thread::spawn(move || {
                for mut request in server.incoming_requests() {
                    let mut body = Vec::new();
                    let _ = request.as_reader().read_to_end(&mut body);
                    let header = |name: &'static str| {
                        request
                            .headers()
                            .iter()
                            .find(|h| h.field.equiv(name))
                            .map(|h| h.value.as_str().to_string())
                    };
                    let recorded = Recorded {
                        method: request.method().to_string(),
                        url: request.url().to_string(),
                        body,
                        cookie: header("Cookie"),
                        content_type: header("Content-Type"),
                    };
                    requests.lock().push(recorded.clone());

                    let reply = handler(&recorded);
                    let mut response =
                        Response::from_string(reply.body).with_status_code(reply.status);
                    for (name, value) in reply.headers {
                        let header = Header::from_bytes(name.as_bytes(), value.as_bytes())
                            .expect("valid header");
                        response = response.with_header(header);
                    }
                    let _ = request.respond(response);
                }
            })
        };

        Self {
            server,
            url,
            requests,
            thread: Some(thread),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().clone()
    }

    pub fn hits(&self, method: &str, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method && r.path() == path)
            .count()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

pub fn comment(id: i64, content: &str) -> Value {
    serde_json::json!({
        "id": id,
        "content": content,
        "createdAt": "2024-05-01T09:00:00.000Z",
        "updatedAt": "2024-05-01T09:00:00.000Z",
        "userId": 2,
        "user": { "id": 2, "nickname": "neighbor" }
    })
}

pub fn user() -> Value {
    serde_json::json!({
        "id": 2,
        "email": "neighbor@example.com",
        "nickname": "neighbor",
        "image": null,
        "createdAt": "2024-05-01T09:00:00Z",
        "updatedAt": "2024-05-01T09:00:00Z"
    })
}

//! Blocking HTTP seam shared by the service clients.
//!
//! Clients build an [`HttpRequest`] and hand it to an [`HttpTransport`].
//! Production code uses [`UreqTransport`]; tests substitute in-process fakes.

use crate::core::error::ServiceError;
use serde::de::DeserializeOwned;
use std::io::Read;
use std::time::Duration;

/// Largest response body read into memory.
const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Body,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Body::Empty,
            timeout,
        }
    }

    pub fn post(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(url, timeout)
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_string(), value.into()));
        self
    }

    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        self.body = Body::Form(fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect());
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Body::Json(body);
        self
    }

    /// Value of a form field or query parameter, for fakes and logging.
    pub fn param(&self, key: &str) -> Option<&str> {
        let form = match &self.body {
            Body::Form(fields) => fields.as_slice(),
            _ => &[],
        };
        self.query
            .iter()
            .chain(form.iter())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub url: String,
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn json<T: DeserializeOwned>(&self, provider: &str) -> Result<T, ServiceError> {
        serde_json::from_slice(&self.body).map_err(|e| ServiceError::Decode {
            provider: provider.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends one request and returns the successful response. Non-2xx answers
/// are reported as [`ServiceError::Status`].
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ServiceError>;
}

/// [`HttpTransport`] backed by a shared `ureq` agent.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(concat!("universal_toolkit/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ServiceError> {
        let mut call = self
            .agent
            .request(request.method.as_str(), &request.url)
            .timeout(request.timeout);
        for (k, v) in &request.query {
            call = call.query(k, v);
        }
        for (k, v) in &request.headers {
            call = call.set(k, v);
        }
        let response = match &request.body {
            Body::Empty => call.call()?,
            Body::Form(fields) => {
                let pairs: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
                call.send_form(&pairs)?
            }
            Body::Json(value) => call.send_json(value.clone())?,
        };
        let url = response.get_url().to_string();
        let status = response.status();
        let mut body = Vec::new();
        response
            .into_reader()
            .take(MAX_BODY_BYTES)
            .read_to_end(&mut body)
            .map_err(|e| ServiceError::Transport {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        Ok(HttpResponse { url, status, body })
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted transport for service tests.

    use super::*;
    use parking_lot::Mutex;

    type Handler = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse, ServiceError> + Send + Sync>;

    /// Answers every request with a closure and records what was sent.
    pub struct FakeTransport {
        handler: Handler,
        pub sent: Mutex<Vec<HttpRequest>>,
    }

    impl FakeTransport {
        pub fn new(handler: impl Fn(&HttpRequest) -> Result<HttpResponse, ServiceError> + Send + Sync + 'static) -> Self {
            Self {
                handler: Box::new(handler),
                sent: Mutex::new(Vec::new()),
            }
        }

        pub fn urls(&self) -> Vec<String> {
            self.sent.lock().iter().map(|r| r.url.clone()).collect()
        }
    }

    impl HttpTransport for FakeTransport {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ServiceError> {
            self.sent.lock().push(request.clone());
            (self.handler)(request)
        }
    }

    pub fn ok_json(url: &str, value: serde_json::Value) -> Result<HttpResponse, ServiceError> {
        Ok(HttpResponse {
            url: url.to_string(),
            status: 200,
            body: value.to_string().into_bytes(),
        })
    }

    pub fn status(url: &str, status: u16) -> Result<HttpResponse, ServiceError> {
        Err(ServiceError::Status {
            url: url.to_string(),
            status,
            body: String::new(),
        })
    }
}

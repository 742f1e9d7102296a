//! HTTP transport seam.
//!
//! `HttpTransport` keeps the client testable without a network. `UreqTransport` is the
//! production implementation. Non-2xx statuses come back as responses, not errors; the
//! client decides what a status means.

use std::io::Read;
use std::time::Duration;

use anyhow::{Context, Result};

use super::multipart::MultipartForm;
use crate::error::LocalizeError;

const MAX_RESPONSE_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    Empty,
    Multipart(MultipartForm),
}

#[derive(Clone, Debug, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Body,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self {
            status,
            body: value.to_string().into_bytes(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parses a 2xx body, mapping other statuses and bad JSON to transport errors.
    pub fn into_json<T: serde::de::DeserializeOwned>(self, what: &str) -> Result<T> {
        if !self.is_success() {
            let snippet: String = String::from_utf8_lossy(&self.body).chars().take(200).collect();
            return Err(LocalizeError::Transport {
                status: Some(self.status),
                message: format!("{} failed: {}", what, snippet),
            }
            .into());
        }
        serde_json::from_slice(&self.body).map_err(|e| {
            LocalizeError::transport(format!("{} returned invalid JSON: {}", what, e)).into()
        })
    }
}

pub trait HttpTransport: Send {
    /// Errors only on connection-level failures.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Blocking HTTPS transport on `ureq`.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl HttpTransport for UreqTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut call = self.agent.request(request.method.as_str(), &request.url);
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }
        let result = match &request.body {
            Body::Empty => call.call(),
            Body::Multipart(form) => {
                let (content_type, bytes) = form.encode();
                call.set("Content-Type", &content_type).send_bytes(&bytes)
            }
        };
        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(err)) => {
                return Err(LocalizeError::transport(format!(
                    "{} {}: {}",
                    request.method.as_str(),
                    request.url,
                    err
                ))
                .into())
            }
        };
        let status = response.status();
        let mut body = Vec::new();
        response
            .into_reader()
            .take(MAX_RESPONSE_BYTES)
            .read_to_end(&mut body)
            .with_context(|| format!("read response from {}", request.url))?;
        Ok(HttpResponse { status, body })
    }
}

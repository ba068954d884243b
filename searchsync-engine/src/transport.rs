//! Transport layer abstraction.
//!
//! The engine never talks to the network directly: every request goes
//! through a [`Transport`], and only the retry executor calls it. The
//! production implementation is [`ReqwestTransport`]; tests use
//! [`mock::ScriptedTransport`] or their own implementations.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

const JSON: &str = "application/json";
const NDJSON: &str = "application/x-ndjson";

/// HTTP verbs used against the search engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl Method {
    /// Upper-case verb.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// One request to the search engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
    pub content_type: Option<&'static str>,
}

impl HttpRequest {
    /// A request without a body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
            content_type: None,
        }
    }

    /// `GET url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// `DELETE url`.
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    /// A request carrying a JSON body.
    pub fn json(method: Method, url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            content_type: Some(JSON),
            ..Self::new(method, url)
        }
    }

    /// `POST url` carrying newline-delimited JSON.
    pub fn ndjson(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            content_type: Some(NDJSON),
            ..Self::new(Method::Post, url)
        }
    }
}

impl fmt::Display for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)?;
        if let Some(body) = &self.body {
            write!(f, " ({} byte body)", body.len())?;
        }
        Ok(())
    }
}

/// A reply as received, before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReply {
    pub status: u16,
    pub body: String,
}

impl RawReply {
    /// Creates a raw reply.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The peer reset the connection.
    ConnectionReset,
    /// The connection broke while writing.
    BrokenPipe,
    /// Anything else (refused, DNS, TLS, timeout, ...).
    Other,
}

impl TransportErrorKind {
    /// Classifies an I/O error kind.
    pub fn from_io(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                Self::ConnectionReset
            }
            io::ErrorKind::BrokenPipe => Self::BrokenPipe,
            _ => Self::Other,
        }
    }

    /// Walks an error's source chain looking for a reset or broken pipe.
    pub fn classify(err: &(dyn StdError + 'static)) -> Self {
        let mut current = Some(err);
        while let Some(e) = current {
            if let Some(io_err) = e.downcast_ref::<io::Error>() {
                let kind = Self::from_io(io_err.kind());
                if kind != Self::Other {
                    return kind;
                }
            }
            // hyper reports a reset mid-response this way
            if e.to_string().contains("connection closed before message completed") {
                return Self::ConnectionReset;
            }
            current = e.source();
        }
        Self::Other
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionReset => f.write_str("connection reset"),
            Self::BrokenPipe => f.write_str("broken pipe"),
            Self::Other => f.write_str("transport error"),
        }
    }
}

/// A request that never produced a reply.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    /// Creates a transport error.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns true for the failure classes worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::ConnectionReset | TransportErrorKind::BrokenPipe
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = TransportErrorKind::classify(&err);
        Self::new(kind, err.to_string())
    }
}

/// Sends one request and returns the raw reply.
///
/// Implementations must not retry; the retry executor owns that policy.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<RawReply, TransportError>;
}

/// HTTP transport over `reqwest`.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport with the given per-request timeout.
    ///
    /// Idle connections are not pooled, so a retried request always opens a
    /// fresh connection instead of reusing one the server may have reset.
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()
            .expect("failed to create HTTP client");

        Self { client }
    }

    /// Wraps an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<RawReply, TransportError> {
        let mut builder = self
            .client
            .request(request.method.into(), request.url.as_str());

        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, request.content_type.unwrap_or(JSON))
                .body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(RawReply { status, body })
    }
}

/// A scripted transport for testing.
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// One scripted outcome.
    #[derive(Debug, Clone)]
    pub enum Scripted {
        Reply(RawReply),
        Fail(TransportError),
    }

    /// Replays scripted outcomes in order and records every request.
    ///
    /// Once the script runs dry the fallback reply is used; without a
    /// fallback the request fails with [`TransportErrorKind::Other`].
    #[derive(Debug, Default)]
    pub struct ScriptedTransport {
        script: Mutex<VecDeque<Scripted>>,
        fallback: Option<RawReply>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        /// Creates an empty script.
        pub fn new() -> Self {
            Self::default()
        }

        /// Sets the reply used after the script runs out.
        pub fn with_fallback(mut self, status: u16, body: impl Into<String>) -> Self {
            self.fallback = Some(RawReply::new(status, body));
            self
        }

        /// Queues a reply.
        pub fn push_reply(&self, status: u16, body: impl Into<String>) {
            self.script
                .lock()
                .unwrap()
                .push_back(Scripted::Reply(RawReply::new(status, body)));
        }

        /// Queues a `200` JSON reply.
        pub fn push_json(&self, body: serde_json::Value) {
            self.push_reply(200, body.to_string());
        }

        /// Queues a transport failure.
        pub fn push_failure(&self, kind: TransportErrorKind) {
            self.script
                .lock()
                .unwrap()
                .push_back(Scripted::Fail(TransportError::new(kind, "scripted failure")));
        }

        /// All requests received so far.
        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }

        /// Number of requests received so far.
        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: &HttpRequest) -> Result<RawReply, TransportError> {
            self.requests.lock().unwrap().push(request.clone());

            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Scripted::Reply(reply)) => Ok(reply),
                Some(Scripted::Fail(err)) => Err(err),
                None => self.fallback.clone().ok_or_else(|| {
                    TransportError::new(TransportErrorKind::Other, "script exhausted")
                }),
            }
        }
    }
}

//! Minimal JSON-over-HTTP/1 client on hyper.
//!
//! One TCP connection per request; the whole exchange (connect, handshake,
//! request, body) is bounded by a single timeout.

use std::time::Duration;

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{AgentError, AgentResult};

const USER_AGENT_VALUE: &str = "gamegrid/0.1";

/// Status and collected body of a response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> AgentResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| AgentError::Decode(e.to_string()))
    }

    /// Turn a non-2xx response into `AgentError::Status`.
    pub fn error_for_status(self, operation: &str) -> AgentResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(AgentError::Status {
                operation: operation.to_string(),
                status: self.status.as_u16(),
                body: self.text(),
            })
        }
    }
}

/// `host:port` plus an optional path prefix, parsed from a base URL such as
/// `http://tunnels.internal:9000/v1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub authority: String,
    pub prefix: String,
}

impl Endpoint {
    pub fn parse(base_url: &str) -> AgentResult<Self> {
        let uri: Uri = base_url
            .parse()
            .map_err(|e| AgentError::Request(format!("invalid url {base_url}: {e}")))?;
        if let Some(scheme) = uri.scheme_str() {
            if scheme != "http" {
                return Err(AgentError::Request(format!(
                    "unsupported scheme {scheme} in {base_url}"
                )));
            }
        }
        let authority = uri
            .authority()
            .ok_or_else(|| AgentError::Request(format!("missing host in {base_url}")))?;
        let authority = match authority.port_u16() {
            Some(_) => authority.to_string(),
            None => format!("{}:80", authority.host()),
        };
        Ok(Self {
            authority,
            prefix: uri.path().trim_end_matches('/').to_string(),
        })
    }

    pub fn path(&self, path: &str) -> String {
        format!("{}{path}", self.prefix)
    }
}

#[derive(Debug, Clone)]
pub struct JsonClient {
    timeout: Duration,
}

impl JsonClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn get(&self, address: &str, path: &str, bearer: Option<&str>) -> AgentResult<HttpResponse> {
        self.send(Method::GET, address, path, None, bearer).await
    }

    pub async fn delete(&self, address: &str, path: &str) -> AgentResult<HttpResponse> {
        self.send(Method::DELETE, address, path, None, None).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        address: &str,
        path: &str,
        body: &T,
    ) -> AgentResult<HttpResponse> {
        let body = serde_json::to_vec(body).map_err(|e| AgentError::Request(e.to_string()))?;
        self.send(Method::POST, address, path, Some(body), None).await
    }

    /// Perform one request against `address` (`host:port`).
    pub async fn send(
        &self,
        method: Method,
        address: &str,
        path: &str,
        body: Option<Vec<u8>>,
        bearer: Option<&str>,
    ) -> AgentResult<HttpResponse> {
        let uri = format!("http://{address}{path}");
        let operation = format!("{method} {path}");

        let exchange = async {
            let unreachable = |e: &dyn std::fmt::Display| AgentError::Unreachable {
                address: address.to_string(),
                reason: e.to_string(),
            };

            let stream = tokio::net::TcpStream::connect(address)
                .await
                .map_err(|e| unreachable(&e))?;
            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| unreachable(&e))?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    debug!(error = %e, "agent connection closed with error");
                }
            });

            let mut builder = http::Request::builder()
                .method(method.clone())
                .uri(&uri)
                .header(HOST, address)
                .header(USER_AGENT, USER_AGENT_VALUE);
            if body.is_some() {
                builder = builder.header(CONTENT_TYPE, "application/json");
            }
            if let Some(token) = bearer {
                builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
            }
            let request = builder
                .body(Full::new(Bytes::from(body.unwrap_or_default())))
                .map_err(|e| AgentError::Request(e.to_string()))?;

            let response = sender
                .send_request(request)
                .await
                .map_err(|e| unreachable(&e))?;
            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| AgentError::Decode(e.to_string()))?
                .to_bytes();
            debug!(%uri, %status, "agent call complete");
            Ok(HttpResponse { status, body })
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                debug!(%uri, "agent call timed out");
                Err(AgentError::Timeout {
                    operation,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }
}

//! HTTP transport seam
//!
//! Every component talks to the hub through [`HubTransport`], so host and
//! route negotiation can be exercised without a network:
//! - [`HttpTransport`] (reqwest)
//! - `MockTransport` (scripted responses, tests only)

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{HubError, Result};

/// HTTP verbs the client needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

/// One outgoing request
#[derive(Debug, Clone, PartialEq)]
pub struct HubRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
    pub bearer: Option<String>,
    pub timeout: Duration,
}

impl HubRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
            bearer: None,
            timeout,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value, timeout: Duration) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
            bearer: None,
            timeout,
        }
    }

    /// Attach a bearer token when one is configured
    pub fn with_bearer(mut self, token: Option<&str>) -> Self {
        self.bearer = token.map(str::to_string);
        self
    }
}

/// Status and raw body of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubResponse {
    pub status: u16,
    pub body: String,
}

impl HubResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Stand-in for a request that produced no response
    pub fn no_response(reason: impl Into<String>) -> Self {
        Self::new(0, reason)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parsed body, if it is valid JSON
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }

    /// Parsed body, or the raw text as a JSON string
    pub fn body_value(&self) -> Value {
        self.json()
            .unwrap_or_else(|| Value::String(self.body.clone()))
    }
}

/// Trait for hub transports
///
/// Implementations own connection handling and per-request timeouts. A
/// request that gets any HTTP response must return `Ok`, whatever its status.
#[async_trait]
pub trait HubTransport: Send + Sync {
    async fn send(&self, request: HubRequest) -> Result<HubResponse>;

    /// Send, folding transport failures into a status-0 response
    async fn send_lenient(&self, request: HubRequest) -> HubResponse {
        let url = request.url.clone();
        match self.send(request).await {
            Ok(response) => response,
            Err(e) => {
                debug!("No response from {}: {}", url, e);
                HubResponse::no_response(e.to_string())
            }
        }
    }
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("hubreg/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HubError::Transport {
                url: String::new(),
                reason: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HubTransport for HttpTransport {
    async fn send(&self, request: HubRequest) -> Result<HubResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        }
        .timeout(request.timeout);

        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let to_transport_error = |e: reqwest::Error| HubError::Transport {
            url: request.url.clone(),
            reason: e.to_string(),
        };

        let response = builder.send().await.map_err(to_transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(to_transport_error)?;

        debug!("{:?} {} -> HTTP {}", request.method, request.url, status);
        Ok(HubResponse { status, body })
    }
}

/// Scripted transport for tests
///
/// Responses are queued per (method, url). The last queued response for a
/// route is sticky; unknown routes fail like a refused connection.
#[cfg(test)]
pub struct MockTransport {
    routes: std::sync::Mutex<
        std::collections::HashMap<(Method, String), std::collections::VecDeque<HubResponse>>,
    >,
    calls: std::sync::Mutex<Vec<HubRequest>>,
}

#[cfg(test)]
impl MockTransport {
    pub fn new() -> Self {
        Self {
            routes: std::sync::Mutex::new(std::collections::HashMap::new()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn on(self, method: Method, url: &str, status: u16, body: &str) -> Self {
        self.routes
            .lock()
            .unwrap()
            .entry((method, url.to_string()))
            .or_default()
            .push_back(HubResponse::new(status, body));
        self
    }

    pub fn calls(&self) -> Vec<HubRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.url == url)
            .count()
    }
}

#[cfg(test)]
#[async_trait]
impl HubTransport for MockTransport {
    async fn send(&self, request: HubRequest) -> Result<HubResponse> {
        self.calls.lock().unwrap().push(request.clone());

        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(&(request.method, request.url.clone())) {
            Some(queue) if queue.len() > 1 => Ok(queue.pop_front().unwrap()),
            Some(queue) if !queue.is_empty() => Ok(queue[0].clone()),
            _ => Err(HubError::Transport {
                url: request.url,
                reason: "connection refused".to_string(),
            }),
        }
    }
}

//! Readiness polling and optional pre-flight checks
//!
//! Health is polled on a fixed interval across the locator's candidate
//! origins until one answers or the deadline passes. Two extra checks can
//! follow once the hub is up:
//!
//! - a deep health query asking the hub to verify its storage. Its result is
//!   reported but never fails readiness.
//! - a token check that posts an empty body to the remotes endpoint. Any
//!   "route exists" status proves the token was honored; anything else is an
//!   [`HubError::Auth`].

use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::error::{HubError, Result};
use crate::hub::{
    candidate_bases, first_healthy, is_healthy, normalize_base, route_exists, Endpoint, HubSession,
};
use crate::transport::{HubRequest, HubTransport};

/// Shortest pause between polls
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Result of a successful wait
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Readiness {
    pub origin: String,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Poll candidate health endpoints until one is healthy or `timeout` elapses
///
/// One attempt probes every candidate in order. No attempt starts after the
/// deadline.
pub async fn wait_for_ready(
    transport: &dyn HubTransport,
    candidates: &[String],
    timeout: Duration,
    interval: Duration,
    probe_timeout: Duration,
) -> Result<Readiness> {
    let started = Instant::now();
    let deadline = started + timeout;
    let interval = interval.max(MIN_INTERVAL);
    let mut attempts = 0;

    loop {
        attempts += 1;
        let (origin, last_status) = first_healthy(transport, candidates, probe_timeout).await;

        if let Some(origin) = origin {
            let elapsed = started.elapsed();
            info!("Hub ready at {} after {} attempts", origin, attempts);
            return Ok(Readiness {
                origin,
                attempts,
                elapsed,
            });
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(HubError::Timeout {
                timeout,
                attempts,
                last_status,
            });
        }

        debug!(
            "Hub not ready (attempt {}, last status {}); polling again",
            attempts, last_status
        );
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

/// Outcome of the deep health query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DependencyStatus {
    Healthy,
    Degraded { http_status: u16, body: String },
    Unreachable { reason: String },
}

impl fmt::Display for DependencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyStatus::Healthy => write!(f, "healthy"),
            DependencyStatus::Degraded { http_status, .. } => {
                write!(f, "degraded (HTTP {http_status})")
            }
            DependencyStatus::Unreachable { reason } => write!(f, "unreachable ({reason})"),
        }
    }
}

/// Ask the hub to check its dependencies; informational only
pub async fn check_dependencies(
    transport: &dyn HubTransport,
    session: &HubSession,
    timeout: Duration,
) -> DependencyStatus {
    let url = session.url(Endpoint::HealthDeep);
    let response = transport
        .send_lenient(HubRequest::get(&url, timeout))
        .await;

    let status = match response.status {
        0 => DependencyStatus::Unreachable {
            reason: response.body,
        },
        code if is_healthy(code) => DependencyStatus::Healthy,
        code => DependencyStatus::Degraded {
            http_status: code,
            body: response.body,
        },
    };

    if status != DependencyStatus::Healthy {
        warn!("Dependency check at {} reported {}", url, status);
    }
    status
}

/// Confirm the hub honors `token` without changing any state
///
/// Returns the accepted status.
pub async fn verify_token(
    transport: &dyn HubTransport,
    session: &HubSession,
    token: &str,
    timeout: Duration,
) -> Result<u16> {
    let url = session.url(Endpoint::Remotes);
    let response = transport
        .send_lenient(HubRequest::post_json(&url, json!({}), timeout).with_bearer(Some(token)))
        .await;
    debug!("Token probe {} -> HTTP {}", url, response.status);

    if route_exists(response.status) {
        Ok(response.status)
    } else {
        Err(HubError::Auth {
            url,
            status: response.status,
            body: response.body,
        })
    }
}

/// Knobs for [`check_readiness`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadinessOptions {
    pub timeout: Duration,
    pub interval: Duration,
    /// Also run the deep dependency check
    pub deep: bool,
}

impl Default for ReadinessOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            interval: Duration::from_secs(2),
            deep: false,
        }
    }
}

/// Everything learned by a readiness check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadinessReport {
    pub session: HubSession,
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub dependencies: Option<DependencyStatus>,
    /// Status returned to the token probe, when a token is configured
    pub token_status: Option<u16>,
}

/// Wait for the hub, negotiate the session, then run the optional checks
pub async fn check_readiness(
    transport: &dyn HubTransport,
    config: &HubConfig,
    options: ReadinessOptions,
) -> Result<ReadinessReport> {
    let candidates = candidate_bases(&normalize_base(&config.hub_base)?);
    let ready = wait_for_ready(
        transport,
        &candidates,
        options.timeout,
        options.interval,
        config.probe_timeout(),
    )
    .await?;

    let session = HubSession::from_origin(transport, ready.origin, config).await?;

    let dependencies = if options.deep {
        Some(check_dependencies(transport, &session, config.probe_timeout()).await)
    } else {
        None
    };

    let token_status = match config.token.as_deref() {
        Some(token) => Some(verify_token(transport, &session, token, config.probe_timeout()).await?),
        None => None,
    };

    Ok(ReadinessReport {
        session,
        attempts: ready.attempts,
        elapsed_ms: ready.elapsed.as_millis() as u64,
        dependencies,
        token_status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::RouteStyle;
    use crate::transport::{Method, MockTransport};
    use pretty_assertions::assert_eq;

    fn candidates() -> Vec<String> {
        vec!["http://hub".to_string(), "http://hub/api".to_string()]
    }

    #[tokio::test]
    async fn test_ready_after_a_few_polls() {
        let transport = MockTransport::new()
            .on(Method::Get, "http://hub/health", 503, "")
            .on(Method::Get, "http://hub/health", 503, "")
            .on(Method::Get, "http://hub/health", 200, "{}")
            .on(Method::Get, "http://hub/api/health", 404, "");

        let ready = wait_for_ready(
            &transport,
            &candidates(),
            Duration::from_secs(5),
            Duration::from_millis(10),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert_eq!(ready.origin, "http://hub");
        assert_eq!(ready.attempts, 3);
    }

    #[tokio::test]
    async fn test_never_ready_times_out() {
        let transport = MockTransport::new()
            .on(Method::Get, "http://hub/health", 503, "")
            .on(Method::Get, "http://hub/api/health", 502, "");

        let err = wait_for_ready(
            &transport,
            &candidates(),
            Duration::from_millis(60),
            Duration::from_millis(10),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();

        assert_eq!(err.exit_code(), 1);
        match err {
            HubError::Timeout {
                timeout,
                attempts,
                last_status,
            } => {
                assert_eq!(timeout, Duration::from_millis(60));
                assert!(attempts >= 2);
                assert_eq!(last_status, 502);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.count(Method::Post, "http://hub/remotes"), 0);
    }

    #[tokio::test]
    async fn test_dependency_check_is_informational() {
        let session = HubSession::new("http://hub", RouteStyle::Root);

        let healthy = MockTransport::new().on(
            Method::Get,
            "http://hub/health?check_db=true",
            200,
            r#"{"db": "ok"}"#,
        );
        assert_eq!(
            check_dependencies(&healthy, &session, Duration::from_secs(1)).await,
            DependencyStatus::Healthy
        );

        let degraded = MockTransport::new().on(
            Method::Get,
            "http://hub/health?check_db=true",
            503,
            "db down",
        );
        assert_eq!(
            check_dependencies(&degraded, &session, Duration::from_secs(1)).await,
            DependencyStatus::Degraded {
                http_status: 503,
                body: "db down".to_string()
            }
        );

        let silent = MockTransport::new();
        assert!(matches!(
            check_dependencies(&silent, &session, Duration::from_secs(1)).await,
            DependencyStatus::Unreachable { .. }
        ));
    }

    #[tokio::test]
    async fn test_verify_token_accepts_route_exists_statuses() {
        let session = HubSession::new("http://hub", RouteStyle::Catalog);
        let transport =
            MockTransport::new().on(Method::Post, "http://hub/catalog/remotes", 422, "bad body");

        let status = verify_token(&transport, &session, "secret", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(status, 422);

        let sent = transport.calls();
        assert_eq!(sent[0].bearer.as_deref(), Some("secret"));
        assert_eq!(sent[0].body, Some(json!({})));
    }

    #[tokio::test]
    async fn test_verify_token_rejection_is_auth_error() {
        let session = HubSession::new("http://hub", RouteStyle::Root);
        let transport = MockTransport::new().on(Method::Post, "http://hub/remotes", 404, "nope");

        let err = verify_token(&transport, &session, "secret", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            HubError::Auth {
                url: "http://hub/remotes".to_string(),
                status: 404,
                body: "nope".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_check_readiness_runs_optional_checks() {
        let transport = MockTransport::new()
            .on(Method::Get, "http://hub/health", 200, "{}")
            .on(Method::Get, "http://hub/remotes", 401, "")
            .on(Method::Get, "http://hub/catalog/remotes", 404, "")
            .on(Method::Get, "http://hub/health?check_db=true", 200, "{}")
            .on(Method::Post, "http://hub/remotes", 401, "");

        let config = HubConfig {
            hub_base: "http://hub/".to_string(),
            token: Some("secret".to_string()),
            ..HubConfig::default()
        };
        let options = ReadinessOptions {
            timeout: Duration::from_secs(1),
            interval: Duration::from_millis(10),
            deep: true,
        };

        let report = check_readiness(&transport, &config, options).await.unwrap();
        assert_eq!(report.session, HubSession::new("http://hub", RouteStyle::Root));
        assert_eq!(report.attempts, 1);
        assert_eq!(report.dependencies, Some(DependencyStatus::Healthy));
        assert_eq!(report.token_status, Some(401));
    }
}

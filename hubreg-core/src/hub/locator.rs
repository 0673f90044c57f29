//! Hub address normalization and origin discovery

use std::time::Duration;
use tracing::debug;

use crate::error::{HubError, Result};
use crate::transport::{HubRequest, HubTransport};

/// Loopback address substituted for the wildcard bind address
const LOOPBACK: &str = "127.0.0.1";

/// Health statuses that count as "up"
pub fn is_healthy(status: u16) -> bool {
    matches!(status, 200 | 204)
}

/// Normalize a user-supplied hub address into a scheme-qualified origin
///
/// Strips carriage returns and trailing slashes, defaults the scheme to
/// `http://`, and rewrites a `0.0.0.0` bind address to loopback.
pub fn normalize_base(raw: &str) -> Result<String> {
    let cleaned: String = raw.chars().filter(|c| *c != '\r').collect();
    let trimmed = cleaned.trim().trim_end_matches('/');

    if trimmed.is_empty() {
        return Err(HubError::Usage("Hub address is empty".to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let mut url = url::Url::parse(&with_scheme)
        .map_err(|e| HubError::Usage(format!("Invalid hub address '{trimmed}': {e}")))?;

    if url.host_str() == Some("0.0.0.0") {
        url.set_host(Some(LOOPBACK))
            .map_err(|e| HubError::Usage(format!("Invalid hub address '{trimmed}': {e}")))?;
    }

    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Ordered, de-duplicated list of origins worth probing
///
/// The address as given, the address without a trailing `/api`, and that
/// root with `/api` appended.
pub fn candidate_bases(normalized: &str) -> Vec<String> {
    let root = normalized.strip_suffix("/api").unwrap_or(normalized);
    let mut candidates: Vec<String> = Vec::with_capacity(3);

    for candidate in [normalized.to_string(), root.to_string(), format!("{root}/api")] {
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }

    candidates
}

/// Probe each candidate's health endpoint in order
///
/// Returns the first candidate that reports healthy, or `None` together with
/// the last status seen (0 when nothing answered).
pub async fn first_healthy(
    transport: &dyn HubTransport,
    candidates: &[String],
    timeout: Duration,
) -> (Option<String>, u16) {
    let mut last_status = 0;

    for candidate in candidates {
        let url = format!("{candidate}/health");
        let response = transport
            .send_lenient(HubRequest::get(&url, timeout))
            .await;
        debug!("Health probe {} -> HTTP {}", url, response.status);

        if is_healthy(response.status) {
            return (Some(candidate.clone()), response.status);
        }
        last_status = response.status;
    }

    (None, last_status)
}

/// Resolve the session origin in a single pass over the candidates
pub async fn locate(
    transport: &dyn HubTransport,
    raw_base: &str,
    timeout: Duration,
) -> Result<String> {
    let candidates = candidate_bases(&normalize_base(raw_base)?);

    match first_healthy(transport, &candidates, timeout).await {
        (Some(origin), _) => {
            debug!("Hub origin resolved to {}", origin);
            Ok(origin)
        }
        (None, _) => Err(HubError::Connectivity { candidates }),
    }
}

//! Hub client error types with clear, actionable messages

use std::time::Duration;
use thiserror::Error;

use crate::uid::UidError;

/// Result alias used throughout the core
pub type Result<T, E = HubError> = std::result::Result<T, E>;

/// Errors raised while locating a hub or registering with it
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HubError {
    /// No candidate origin answered its health endpoint
    #[error("No reachable hub. Tried health checks on:\n  {}\n\nCheck the hub address (--hub or HUB_BASE) and that the service is running.", candidates.join("\n  "))]
    Connectivity { candidates: Vec<String> },

    /// Neither route convention is mounted at the origin
    #[error("Hub at {origin} exposes neither /remotes (HTTP {root_status}) nor /catalog/remotes (HTTP {catalog_status})")]
    RouteDetection {
        origin: String,
        root_status: u16,
        catalog_status: u16,
    },

    /// The authenticated probe came back outside the accepted status set
    #[error("Bearer token was not accepted by {url}: HTTP {status}\n{body}")]
    Auth { url: String, status: u16, body: String },

    /// A document was unreachable, not JSON, or of an unrecognized shape
    #[error("Invalid document at {url}: {reason}")]
    Format { url: String, reason: String },

    /// The requested entity could not be resolved to a manifest
    #[error("Not found: {0}")]
    NotFound(String),

    /// Health never reported ready before the deadline
    #[error("Hub did not become ready within {timeout:?} after {attempts} attempts (last status {last_status})")]
    Timeout {
        timeout: Duration,
        attempts: u32,
        last_status: u16,
    },

    /// Add-remote returned a status outside the accepted set
    #[error("Adding remote failed: HTTP {status}\n{body}")]
    RemoteStep { status: u16, body: String },

    /// Ingest never reported a successful result
    #[error("Ingest failed after {attempts} attempts: HTTP {status}\n{body}")]
    Ingest {
        status: u16,
        body: String,
        attempts: u32,
    },

    /// Install (by UID or direct) did not succeed
    #[error("Install failed after {attempts} attempts: HTTP {status}\n{body}")]
    Install {
        status: u16,
        body: String,
        attempts: u32,
    },

    /// Entity UID could not be parsed
    #[error(transparent)]
    InvalidUid(#[from] UidError),

    /// The request never produced an HTTP response
    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// Bad or missing arguments
    #[error("{0}")]
    Usage(String),
}

impl HubError {
    /// Process exit code for this error: 2 for usage problems, 1 for operational failures
    pub fn exit_code(&self) -> i32 {
        match self {
            HubError::Usage(_) | HubError::InvalidUid(_) => 2,
            _ => 1,
        }
    }

    /// Shorthand for a format error
    pub fn format(url: impl Into<String>, reason: impl Into<String>) -> Self {
        HubError::Format {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Failures that mean the hub itself is missing or misconfigured
    pub fn is_topology(&self) -> bool {
        matches!(
            self,
            HubError::Connectivity { .. } | HubError::RouteDetection { .. }
        )
    }
}

//! Hub session negotiation
//!
//! A run starts by turning a loosely specified hub address into a
//! [`HubSession`]: the origin that answered its health check plus the route
//! style its catalog endpoints use. The session is built once and every
//! later call reads endpoints from it.
//!
//! ```text
//! raw address ──normalize──► candidates ──/health──► origin
//!                                                      │
//!                                 /remotes vs /catalog/remotes
//!                                                      ▼
//!                                                 HubSession
//! ```

mod locator;
mod route;

pub use locator::{candidate_bases, first_healthy, is_healthy, locate, normalize_base};
pub use route::{detect_route_style, route_exists, select_style, RouteStyle};

use serde::Serialize;
use tracing::info;

use crate::config::HubConfig;
use crate::error::Result;
use crate::transport::HubTransport;

/// Catalog endpoints reachable through a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Health with the storage dependency check requested
    HealthDeep,
    Remotes,
    Ingest,
    Install,
}

/// Resolved origin and route style, fixed for the whole run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HubSession {
    origin: String,
    route_style: RouteStyle,
}

impl HubSession {
    pub fn new(origin: impl Into<String>, route_style: RouteStyle) -> Self {
        Self {
            origin: origin.into(),
            route_style,
        }
    }

    /// Locate the hub in one pass and detect its route style
    pub async fn establish(transport: &dyn HubTransport, config: &HubConfig) -> Result<Self> {
        let origin = locate(transport, &config.hub_base, config.probe_timeout()).await?;
        Self::from_origin(transport, origin, config).await
    }

    /// Detect the route style for an origin already known to be healthy
    pub async fn from_origin(
        transport: &dyn HubTransport,
        origin: String,
        config: &HubConfig,
    ) -> Result<Self> {
        let route_style = detect_route_style(
            transport,
            &origin,
            config.token.as_deref(),
            config.probe_timeout(),
        )
        .await?;

        info!("Hub session: {} ({} routes)", origin, route_style);
        Ok(Self {
            origin,
            route_style,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn route_style(&self) -> RouteStyle {
        self.route_style
    }

    /// Absolute URL of an endpoint
    pub fn url(&self, endpoint: Endpoint) -> String {
        let path = match endpoint {
            Endpoint::HealthDeep => "/health?check_db=true",
            Endpoint::Remotes => self.route_style.remotes_path(),
            Endpoint::Ingest => self.route_style.ingest_path(),
            Endpoint::Install => self.route_style.install_path(),
        };
        format!("{}{}", self.origin, path)
    }
}

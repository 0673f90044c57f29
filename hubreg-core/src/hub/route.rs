//! Route style detection
//!
//! Catalog deployments mount their endpoints either at the API root
//! (`/remotes`, `/ingest`) or under `/catalog`. Install always lives at
//! `/catalog/install`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::error::{HubError, Result};
use crate::transport::{HubRequest, HubTransport};

/// Where the catalog endpoints are mounted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteStyle {
    Root,
    Catalog,
}

impl RouteStyle {
    pub fn remotes_path(self) -> &'static str {
        match self {
            RouteStyle::Root => "/remotes",
            RouteStyle::Catalog => "/catalog/remotes",
        }
    }

    pub fn ingest_path(self) -> &'static str {
        match self {
            RouteStyle::Root => "/ingest",
            RouteStyle::Catalog => "/catalog/ingest",
        }
    }

    pub fn install_path(self) -> &'static str {
        "/catalog/install"
    }
}

impl fmt::Display for RouteStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteStyle::Root => write!(f, "root"),
            RouteStyle::Catalog => write!(f, "catalog"),
        }
    }
}

/// Statuses showing a route is mounted, even if it rejected the request
pub fn route_exists(status: u16) -> bool {
    (200..300).contains(&status) || matches!(status, 401 | 403 | 405 | 415 | 422)
}

/// Pick a style from the two probe statuses; root wins ties
pub fn select_style(origin: &str, root_status: u16, catalog_status: u16) -> Result<RouteStyle> {
    if route_exists(root_status) {
        Ok(RouteStyle::Root)
    } else if route_exists(catalog_status) {
        Ok(RouteStyle::Catalog)
    } else {
        Err(HubError::RouteDetection {
            origin: origin.to_string(),
            root_status,
            catalog_status,
        })
    }
}

/// Probe both remotes paths and select the route style
pub async fn detect_route_style(
    transport: &dyn HubTransport,
    origin: &str,
    token: Option<&str>,
    timeout: Duration,
) -> Result<RouteStyle> {
    let mut statuses = [0u16; 2];

    for (slot, style) in [RouteStyle::Root, RouteStyle::Catalog].iter().enumerate() {
        let url = format!("{origin}{}", style.remotes_path());
        let response = transport
            .send_lenient(HubRequest::get(&url, timeout).with_bearer(token))
            .await;
        debug!("Route probe {} -> HTTP {}", url, response.status);
        statuses[slot] = response.status;
    }

    select_style(origin, statuses[0], statuses[1])
}

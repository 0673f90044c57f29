//! Test helpers shared by the integration tests
//!
//! Each test starts its own wiremock server playing the hub and the static
//! host serving index and manifest documents.

use hubreg_core::HubConfig;
use serde_json::{json, Value};
use std::sync::Once;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Initialize logging for tests (only once per test run)
static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

pub const UID: &str = "mcp_server:hello-sse-server@0.1.0";

pub fn manifest_body() -> Value {
    json!({
        "type": "mcp_server",
        "id": "hello-sse-server",
        "version": "0.1.0",
        "name": "Hello SSE Server"
    })
}

/// Config pointing at the mock hub with zero retry delays
pub fn config_for(server: &MockServer) -> HubConfig {
    let mut config = HubConfig {
        hub_base: server.uri(),
        probe_timeout_secs: 2,
        transfer_timeout_secs: 5,
        ..HubConfig::default()
    };
    config.retry.initial_delay_secs = 0;
    config
}

/// Healthy root-style hub
pub async fn mount_root_hub(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/remotes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

/// ItemList index with one manifest, both served by `server`
pub async fn mount_item_index(server: &MockServer) -> String {
    let manifest_url = format!("{}/matrix/hello.manifest.json", server.uri());

    Mock::given(method("GET"))
        .and(path("/matrix/index.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"manifest_url": manifest_url}],
            "meta": {"format": "matrix-hub-index", "version": 1}
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/matrix/hello.manifest.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest_body()))
        .mount(server)
        .await;

    format!("{}/matrix/index.json", server.uri())
}

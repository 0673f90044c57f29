//! Registration workflow
//!
//! A run walks a small state machine:
//!
//! ```text
//! ADD_REMOTE ──ok──► INGEST ──ok──► INSTALL ──ok──► DONE
//!     │                │               │
//!   fatal          exhausted        exhausted
//!     ▼                ▼               ▼
//!  FAILED ◄──fail── DIRECT_INSTALL ◄───┘
//!                      │
//!                      └──ok──► DONE
//! ```
//!
//! A plan without an index URL starts at `DIRECT_INSTALL`. Add-remote is
//! idempotent: 409 and 412 mean the index is already registered. Ingest and
//! install are retried with the configured [`RetryPolicy`]; exhausting
//! either falls back to posting a manifest inline. Only a failed fallback
//! (or a rejected add-remote) fails the run.

use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::error::{HubError, Result};
use crate::hub::{Endpoint, HubSession, RouteStyle};
use crate::index::{derive_index_url, IndexResolver, IndexShape};
use crate::manifest::{Manifest, ManifestRef};
use crate::retry::{retry_until, Attempted, RetryPolicy};
use crate::transport::{HubRequest, HubResponse, HubTransport};
use crate::uid::EntityUid;

/// Calls that produce an outcome record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    AddRemote,
    Ingest,
    Install,
    DirectInstall,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::AddRemote => "Add remote",
            Stage::Ingest => "Ingest",
            Stage::Install => "Install",
            Stage::DirectInstall => "Direct install",
        }
    }
}

/// Workflow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationState {
    AddRemote,
    Ingest,
    Install,
    DirectInstall,
    Done,
    Failed,
}

impl RegistrationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RegistrationState::Done | RegistrationState::Failed)
    }
}

/// Record of one stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationOutcome {
    pub stage: Stage,
    /// HTTP status of the last attempt; 0 when nothing answered
    pub status: u16,
    /// Response body, as JSON when it parses and as a string otherwise
    pub body: Value,
    pub ok: bool,
    pub attempts: u32,
}

impl RegistrationOutcome {
    fn from_attempts(stage: Stage, attempted: Attempted<HubResponse>) -> Self {
        Self {
            stage,
            status: attempted.value.status,
            body: attempted.value.body_value(),
            ok: attempted.succeeded,
            attempts: attempted.attempts,
        }
    }

    /// Body rendered for error messages
    pub fn body_text(&self) -> String {
        match &self.body {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// Add-remote statuses that count as registered
pub fn add_remote_accepted(status: u16) -> bool {
    (200..300).contains(&status) || matches!(status, 409 | 412)
}

/// Whether an ingest response reports at least one successful result
///
/// Results are accepted when `ok` is true or `status` is `"ok"`/`"success"`.
pub fn ingest_succeeded(status: u16, body: &Value) -> bool {
    if !(200..300).contains(&status) {
        return false;
    }

    body.get("results")
        .and_then(Value::as_array)
        .is_some_and(|results| {
            results.iter().any(|result| {
                result.get("ok").and_then(Value::as_bool) == Some(true)
                    || matches!(
                        result.get("status").and_then(Value::as_str),
                        Some("ok") | Some("success")
                    )
            })
        })
}

/// What a run should register and install
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationPlan {
    index_url: Option<String>,
    manifest: Option<ManifestRef>,
    uid: Option<EntityUid>,
}

impl RegistrationPlan {
    /// Validate the combination of inputs
    ///
    /// An index or a manifest is required. Installing from an index alone
    /// also needs a UID; with a manifest the UID can come from the manifest.
    pub fn new(
        index_url: Option<String>,
        manifest: Option<ManifestRef>,
        uid: Option<EntityUid>,
    ) -> Result<Self> {
        match (&index_url, &manifest, &uid) {
            (None, None, _) => Err(HubError::Usage(
                "Provide an index URL or a manifest to register".to_string(),
            )),
            (Some(_), None, None) => Err(HubError::Usage(
                "An entity UID (type:id@version) is required to install from an index".to_string(),
            )),
            _ => Ok(Self {
                index_url,
                manifest,
                uid,
            }),
        }
    }

    pub fn index_url(&self) -> Option<&str> {
        self.index_url.as_deref()
    }

    pub fn uid(&self) -> Option<&EntityUid> {
        self.uid.as_ref()
    }

    /// Where the state machine starts
    pub fn initial_state(&self) -> RegistrationState {
        if self.index_url.is_some() {
            RegistrationState::AddRemote
        } else {
            RegistrationState::DirectInstall
        }
    }
}

/// Final state of a run with every stage outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationReport {
    pub state: RegistrationState,
    pub uid: Option<EntityUid>,
    pub outcomes: Vec<RegistrationOutcome>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<HubError>,
}

impl RegistrationReport {
    pub fn is_done(&self) -> bool {
        self.state == RegistrationState::Done
    }

    /// Outcome of the last call made for `stage`
    pub fn outcome(&self, stage: Stage) -> Option<&RegistrationOutcome> {
        self.outcomes.iter().rev().find(|outcome| outcome.stage == stage)
    }

    /// Convert into a `Result`, surfacing the failure that ended the run
    pub fn into_result(self) -> Result<Self> {
        match (&self.state, &self.error) {
            (RegistrationState::Done, _) => Ok(self),
            (_, Some(error)) => Err(error.clone()),
            (state, None) => Err(HubError::Usage(format!(
                "Registration stopped in state {state:?}"
            ))),
        }
    }
}

fn serialize_error<S: Serializer>(
    error: &Option<HubError>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    error.as_ref().map(ToString::to_string).serialize(serializer)
}

/// Result of probing a remote index connection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReport {
    pub origin: String,
    pub route_style: RouteStyle,
    pub index_url: String,
    /// Whether the index URL was guessed from a manifest URL
    pub derived: bool,
    pub shape: IndexShape,
    pub entries: usize,
    pub add_remote: RegistrationOutcome,
}

/// Drives registration calls against one hub session
pub struct Registrar<'a> {
    transport: &'a dyn HubTransport,
    session: &'a HubSession,
    token: Option<String>,
    retry: RetryPolicy,
    timeout: Duration,
    install_target: String,
}

impl<'a> Registrar<'a> {
    pub fn new(transport: &'a dyn HubTransport, session: &'a HubSession) -> Self {
        let defaults = HubConfig::default();
        Self {
            transport,
            session,
            token: None,
            retry: RetryPolicy::default(),
            timeout: defaults.transfer_timeout(),
            install_target: defaults.install_target,
        }
    }

    /// Token, retry policy, timeout and install target taken from `config`
    pub fn from_config(
        transport: &'a dyn HubTransport,
        session: &'a HubSession,
        config: &HubConfig,
    ) -> Self {
        Self {
            transport,
            session,
            token: config.token.clone(),
            retry: config.retry_policy(),
            timeout: config.transfer_timeout(),
            install_target: config.install_target.clone(),
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_install_target(mut self, target: impl Into<String>) -> Self {
        self.install_target = target.into();
        self
    }

    fn resolver(&self) -> IndexResolver<'a> {
        IndexResolver::new(self.transport, self.timeout)
    }

    async fn post(&self, endpoint: Endpoint, body: Value) -> HubResponse {
        let request = HubRequest::post_json(self.session.url(endpoint), body, self.timeout)
            .with_bearer(self.token.as_deref());
        self.transport.send_lenient(request).await
    }

    /// Register `index_url` with the hub (single attempt)
    pub async fn add_remote(&self, index_url: &str) -> RegistrationOutcome {
        let attempted = retry_until(
            &RetryPolicy::once(),
            Stage::AddRemote.label(),
            |_| self.post(Endpoint::Remotes, json!({ "url": index_url })),
            |response| add_remote_accepted(response.status),
        )
        .await;

        let outcome = RegistrationOutcome::from_attempts(Stage::AddRemote, attempted);
        match outcome.status {
            409 | 412 => info!("Remote {} already registered (HTTP {})", index_url, outcome.status),
            status if outcome.ok => info!("Remote {} registered (HTTP {})", index_url, status),
            status => warn!("Adding remote {} failed (HTTP {})", index_url, status),
        }
        outcome
    }

    /// Ask the hub to pull `index_url`, retrying until a result succeeds
    pub async fn ingest(&self, index_url: &str) -> RegistrationOutcome {
        let attempted = retry_until(
            &self.retry,
            Stage::Ingest.label(),
            |_| self.post(Endpoint::Ingest, json!({ "url": index_url })),
            |response| ingest_succeeded(response.status, &response.body_value()),
        )
        .await;

        RegistrationOutcome::from_attempts(Stage::Ingest, attempted)
    }

    /// Install an already ingested entity by UID
    pub async fn install(&self, uid: &EntityUid) -> RegistrationOutcome {
        let body = json!({ "id": uid.to_string(), "target": self.install_target });
        let attempted = retry_until(
            &self.retry,
            Stage::Install.label(),
            |_| self.post(Endpoint::Install, body.clone()),
            HubResponse::is_success,
        )
        .await;

        RegistrationOutcome::from_attempts(Stage::Install, attempted)
    }

    /// Install by posting the manifest inline (single attempt)
    pub async fn direct_install(&self, manifest: &Manifest) -> RegistrationOutcome {
        let body = json!({ "target": self.install_target, "manifest": manifest });
        let attempted = retry_until(
            &RetryPolicy::once(),
            Stage::DirectInstall.label(),
            |_| self.post(Endpoint::Install, body.clone()),
            HubResponse::is_success,
        )
        .await;

        RegistrationOutcome::from_attempts(Stage::DirectInstall, attempted)
    }

    /// Obtain the manifest to install directly
    ///
    /// An explicit manifest wins; otherwise the UID is looked up in the index.
    async fn resolve_manifest(
        &self,
        plan: &RegistrationPlan,
        uid: Option<&EntityUid>,
    ) -> Result<Manifest> {
        let resolver = self.resolver();

        if let Some(manifest) = &plan.manifest {
            return manifest.clone().resolve(&resolver).await;
        }

        match (plan.index_url(), uid) {
            (Some(index_url), Some(uid)) => {
                let document = resolver.fetch_and_classify(index_url).await?;
                resolver.resolve_by_uid(&document, uid).await
            }
            _ => Err(HubError::Usage(
                "Direct install needs a manifest, or an index URL and an entity UID".to_string(),
            )),
        }
    }

    /// Run the full workflow for `plan`
    pub async fn run(&self, plan: &RegistrationPlan) -> RegistrationReport {
        let mut report = RegistrationReport {
            state: plan.initial_state(),
            uid: plan.uid().cloned(),
            outcomes: Vec::new(),
            error: None,
        };
        let mut manifest: Option<Manifest> = None;

        while !report.state.is_terminal() {
            debug!("Registration state {:?}", report.state);

            report.state = match (report.state, plan.index_url()) {
                (RegistrationState::AddRemote, Some(index_url)) => {
                    let outcome = self.add_remote(index_url).await;
                    let next = if outcome.ok {
                        RegistrationState::Ingest
                    } else {
                        report.error = Some(HubError::RemoteStep {
                            status: outcome.status,
                            body: outcome.body_text(),
                        });
                        RegistrationState::Failed
                    };
                    report.outcomes.push(outcome);
                    next
                }

                (RegistrationState::Ingest, Some(index_url)) => {
                    let outcome = self.ingest(index_url).await;
                    let next = if outcome.ok {
                        info!("Ingested {} in {} attempts", index_url, outcome.attempts);
                        RegistrationState::Install
                    } else {
                        let error = HubError::Ingest {
                            status: outcome.status,
                            body: outcome.body_text(),
                            attempts: outcome.attempts,
                        };
                        warn!("{}; falling back to direct install", error);
                        RegistrationState::DirectInstall
                    };
                    report.outcomes.push(outcome);
                    next
                }

                (RegistrationState::Install, _) => {
                    if report.uid.is_none() {
                        match self.resolve_manifest(plan, None).await {
                            Ok(resolved) => {
                                report.uid = resolved.uid();
                                manifest = Some(resolved);
                            }
                            Err(e) => warn!("Could not read manifest for its UID: {}", e),
                        }
                    }

                    match report.uid.clone() {
                        Some(uid) => {
                            let outcome = self.install(&uid).await;
                            let next = if outcome.ok {
                                info!("Installed {} (HTTP {})", uid, outcome.status);
                                RegistrationState::Done
                            } else {
                                warn!(
                                    "Install of {} failed after {} attempts (HTTP {}); falling back to direct install",
                                    uid, outcome.attempts, outcome.status
                                );
                                RegistrationState::DirectInstall
                            };
                            report.outcomes.push(outcome);
                            next
                        }
                        None => {
                            warn!("No entity UID known; installing the manifest directly");
                            RegistrationState::DirectInstall
                        }
                    }
                }

                (RegistrationState::DirectInstall, _) => {
                    let resolved = match manifest.take() {
                        Some(cached) => Ok(cached),
                        None => self.resolve_manifest(plan, report.uid.as_ref()).await,
                    };

                    match resolved {
                        Ok(resolved) => {
                            if report.uid.is_none() {
                                report.uid = resolved.uid();
                            }
                            let outcome = self.direct_install(&resolved).await;
                            let next = if outcome.ok {
                                info!("Direct install succeeded (HTTP {})", outcome.status);
                                RegistrationState::Done
                            } else {
                                report.error = Some(HubError::Install {
                                    status: outcome.status,
                                    body: outcome.body_text(),
                                    attempts: outcome.attempts,
                                });
                                RegistrationState::Failed
                            };
                            report.outcomes.push(outcome);
                            next
                        }
                        Err(e) => {
                            report.error = Some(e);
                            RegistrationState::Failed
                        }
                    }
                }

                // Index stages are only entered when the plan has an index.
                (_, None) => RegistrationState::DirectInstall,

                (terminal, _) => terminal,
            };
        }

        if let Some(error) = &report.error {
            warn!("Registration failed: {}", error);
        }
        report
    }

    /// Check that the hub can reach a remote index without ingesting it
    ///
    /// Resolves the index (deriving it from `manifest_url` when needed),
    /// classifies it, then registers it with an idempotent add-remote.
    pub async fn probe(
        &self,
        index_url: Option<&str>,
        manifest_url: Option<&str>,
    ) -> Result<ProbeReport> {
        let (index_url, derived) = match (index_url, manifest_url) {
            (Some(index_url), _) => (index_url.to_string(), false),
            (None, Some(manifest_url)) => (derive_index_url(manifest_url)?, true),
            (None, None) => {
                return Err(HubError::Usage(
                    "Provide an index URL or a manifest URL to probe".to_string(),
                ))
            }
        };

        if derived {
            info!("Using derived index {}", index_url);
        }

        let document = self.resolver().fetch_and_classify(&index_url).await?;
        if !document.shape().is_primary() {
            warn!(
                "Index {} is an {}; hubs may not ingest this shape",
                index_url,
                document.shape()
            );
        }

        let add_remote = self.add_remote(&index_url).await;
        if !add_remote.ok {
            return Err(HubError::RemoteStep {
                status: add_remote.status,
                body: add_remote.body_text(),
            });
        }

        Ok(ProbeReport {
            origin: self.session.origin().to_string(),
            route_style: self.session.route_style(),
            index_url,
            derived,
            shape: document.shape(),
            entries: document.len(),
            add_remote,
        })
    }
}

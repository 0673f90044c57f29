//! Registration and probe commands
//!
//! `register` runs the full add-remote / ingest / install workflow and
//! prints one row per stage. `probe` only checks that the index is readable
//! and that the hub accepts it as a remote.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};
use tracing::info;

use hubreg_core::hub::{candidate_bases, normalize_base};
use hubreg_core::readiness::wait_for_ready;
use hubreg_core::registration::RegistrationOutcome;
use hubreg_core::{
    HttpTransport, HubConfig, HubError, HubSession, Manifest, ManifestRef, ProbeReport, Registrar,
    RegistrationPlan, RegistrationReport,
};

/// Poll interval used by `register --wait`
const WAIT_INTERVAL: Duration = Duration::from_secs(2);

/// Widest body excerpt shown in the outcome table
const BODY_PREVIEW_CHARS: usize = 60;

#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Remote index URL to register and ingest
    #[clap(long)]
    index: Option<String>,

    /// Manifest URL to install directly when ingest is unavailable
    #[clap(long, conflicts_with = "manifest_file")]
    manifest: Option<String>,

    /// Local manifest file to install directly when ingest is unavailable
    #[clap(long)]
    manifest_file: Option<PathBuf>,

    /// Entity to install (type:id@version)
    #[clap(long)]
    entity: Option<String>,

    /// Install target passed to the hub
    #[clap(long)]
    target: Option<String>,

    /// Wait up to SECS for the hub to become healthy before registering
    #[clap(long, value_name = "SECS")]
    wait: Option<u64>,

    /// Output the report as JSON
    #[clap(long)]
    json: bool,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Remote index URL to probe
    #[clap(long)]
    index: Option<String>,

    /// Manifest URL; its sibling index.json is probed when --index is absent
    #[clap(long)]
    manifest: Option<String>,

    /// Output the report as JSON
    #[clap(long)]
    json: bool,
}

impl RegisterArgs {
    pub async fn execute(self, mut config: HubConfig) -> Result<()> {
        if let Some(index) = self.index {
            config.index_url = Some(index);
        }
        if let Some(manifest) = self.manifest {
            config.manifest_url = Some(manifest);
        }
        if let Some(entity) = self.entity {
            config.entity_uid = Some(entity);
        }

        // Validate inputs before touching the network
        let manifest = match (&self.manifest_file, &config.manifest_url) {
            (Some(path), _) => Some(ManifestRef::Inline(read_manifest_file(path)?.into_value())),
            (None, Some(url)) => Some(ManifestRef::Url(url.clone())),
            (None, None) => None,
        };
        let plan = RegistrationPlan::new(config.index_url.clone(), manifest, config.entity_uid()?)?;

        let transport = HttpTransport::new()?;
        let session = match self.wait {
            Some(secs) => {
                let candidates = candidate_bases(&normalize_base(&config.hub_base)?);
                let ready = wait_for_ready(
                    &transport,
                    &candidates,
                    Duration::from_secs(secs),
                    WAIT_INTERVAL,
                    config.probe_timeout(),
                )
                .await?;
                HubSession::from_origin(&transport, ready.origin, &config).await?
            }
            None => HubSession::establish(&transport, &config).await?,
        };

        let mut registrar = Registrar::from_config(&transport, &session, &config);
        if let Some(target) = self.target {
            registrar = registrar.with_install_target(target);
        }
        let report = registrar.run(&plan).await;

        if self.json {
            let output = serde_json::json!({ "session": session, "report": report });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print_registration(&session, &report);
        }

        report.into_result()?;
        Ok(())
    }
}

impl ProbeArgs {
    pub async fn execute(self, mut config: HubConfig) -> Result<()> {
        if let Some(index) = self.index {
            config.index_url = Some(index);
        }
        if let Some(manifest) = self.manifest {
            config.manifest_url = Some(manifest);
        }
        if config.index_url.is_none() && config.manifest_url.is_none() {
            return Err(HubError::Usage(
                "Provide --index or --manifest to probe".to_string(),
            )
            .into());
        }

        let transport = HttpTransport::new()?;
        let session = HubSession::establish(&transport, &config).await?;

        let report = Registrar::from_config(&transport, &session, &config)
            .probe(config.index_url.as_deref(), config.manifest_url.as_deref())
            .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_probe(&report);
        }

        Ok(())
    }
}

/// Read and check a local manifest file
fn read_manifest_file(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| HubError::Usage(format!("Failed to read manifest {}: {e}", path.display())))?;

    Manifest::from_json(&content, &path.display().to_string())
        .with_context(|| format!("Manifest file {} is not usable", path.display()))
}

/// Table row for stage outcomes
#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Stage")]
    stage: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "OK")]
    ok: String,
    #[tabled(rename = "Attempts")]
    attempts: u32,
    #[tabled(rename = "Response")]
    body: String,
}

impl From<&RegistrationOutcome> for OutcomeRow {
    fn from(outcome: &RegistrationOutcome) -> Self {
        let status = if outcome.status == 0 {
            "no response".to_string()
        } else {
            outcome.status.to_string()
        };

        Self {
            stage: outcome.stage.label().to_string(),
            status,
            ok: if outcome.ok { "yes" } else { "no" }.to_string(),
            attempts: outcome.attempts,
            body: preview(&outcome.body_text()),
        }
    }
}

fn preview(text: &str) -> String {
    let single_line = text.replace(['\n', '\r'], " ");
    if single_line.chars().count() > BODY_PREVIEW_CHARS {
        let cut: String = single_line.chars().take(BODY_PREVIEW_CHARS - 3).collect();
        format!("{cut}...")
    } else {
        single_line
    }
}

fn outcome_table(outcomes: &[RegistrationOutcome]) -> String {
    let rows: Vec<OutcomeRow> = outcomes.iter().map(OutcomeRow::from).collect();
    Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string()
}

fn print_registration(session: &HubSession, report: &RegistrationReport) {
    println!("Hub:    {} ({} routes)", session.origin(), session.route_style());
    if let Some(uid) = &report.uid {
        println!("Entity: {uid}");
    }
    println!();

    if !report.outcomes.is_empty() {
        println!("{}", outcome_table(&report.outcomes));
        println!();
    }

    if report.is_done() {
        info!("Registration complete");
        println!("Registration complete.");
    } else {
        println!("Registration failed in state {:?}.", report.state);
    }
}

fn print_probe(report: &ProbeReport) {
    println!("Hub:    {} ({} routes)", report.origin, report.route_style);
    let derived = if report.derived { " (derived)" } else { "" };
    println!("Index:  {}{}", report.index_url, derived);
    println!("Shape:  {} with {} entries", report.shape, report.entries);
    println!();
    println!("{}", outcome_table(std::slice::from_ref(&report.add_remote)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubreg_core::registration::Stage;
    use serde_json::json;

    #[test]
    fn test_preview_truncates_long_bodies() {
        let long = "x".repeat(100);
        let shown = preview(&long);
        assert_eq!(shown.chars().count(), BODY_PREVIEW_CHARS);
        assert!(shown.ends_with("..."));

        assert_eq!(preview("line one\nline two"), "line one line two");
    }

    #[test]
    fn test_outcome_row_marks_missing_response() {
        let outcome = RegistrationOutcome {
            stage: Stage::Ingest,
            status: 0,
            body: json!("connection refused"),
            ok: false,
            attempts: 3,
        };

        let row = OutcomeRow::from(&outcome);
        assert_eq!(row.stage, "Ingest");
        assert_eq!(row.status, "no response");
        assert_eq!(row.ok, "no");
        assert_eq!(row.body, "connection refused");
    }
}

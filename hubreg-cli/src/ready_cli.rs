//! Readiness command

use anyhow::Result;
use clap::Args;
use std::time::Duration;

use hubreg_core::readiness::DependencyStatus;
use hubreg_core::{check_readiness, HttpTransport, HubConfig, ReadinessOptions, ReadinessReport};

#[derive(Args, Debug)]
pub struct ReadyArgs {
    /// Give up after this many seconds
    #[clap(long, default_value = "60", value_name = "SECS")]
    timeout: u64,

    /// Seconds between health polls
    #[clap(long, default_value = "2", value_name = "SECS")]
    interval: u64,

    /// Also ask the hub to check its storage (informational)
    #[clap(long)]
    deep: bool,

    /// Output the report as JSON
    #[clap(long)]
    json: bool,
}

impl ReadyArgs {
    fn options(&self) -> ReadinessOptions {
        ReadinessOptions {
            timeout: Duration::from_secs(self.timeout),
            interval: Duration::from_secs(self.interval),
            deep: self.deep,
        }
    }

    pub async fn execute(self, config: HubConfig) -> Result<()> {
        let transport = HttpTransport::new()?;
        let report = check_readiness(&transport, &config, self.options()).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_readiness(&report);
        }

        Ok(())
    }
}

fn print_readiness(report: &ReadinessReport) {
    println!(
        "Hub ready at {} ({} routes) after {} attempt(s), {} ms",
        report.session.origin(),
        report.session.route_style(),
        report.attempts,
        report.elapsed_ms
    );

    match &report.dependencies {
        Some(status @ DependencyStatus::Degraded { body, .. }) if !body.is_empty() => {
            println!("Dependencies: {status}\n  {body}")
        }
        Some(status) => println!("Dependencies: {status}"),
        None => {}
    }

    if let Some(status) = report.token_status {
        println!("Token accepted (HTTP {status})");
    }
}

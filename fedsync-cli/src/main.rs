//! fedsync: set up and verify a federation of sharing instances.
//!
//! Usage:
//!   fedsync --config federation.toml setup
//!   fedsync --root ./misps --insecure verify --scenario simple_sync
//!   fedsync --config federation.toml export --output ./creds
//!
//! `setup` provisions every instance, links the hub and spokes and writes the
//! credential exports. `verify` does the same, waits for the workers and
//! runs the propagation scenarios. `export` only refreshes the credentials.

use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use fedsync_client::{MispConfig, MispConnector};
use fedsync_topology::{Federation, FederationConfig, export_credentials};
use fedsync_verify::{ScenarioKind, SettlePolicy, run_scenarios};
use serde::Deserialize;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "fedsync")]
#[command(about = "Federation sync-topology setup and verification")]
struct Args {
    /// Federation TOML file
    #[arg(short, long, conflicts_with = "root")]
    config: Option<PathBuf>,

    /// Directory holding one sub-directory per instance
    #[arg(long)]
    root: Option<PathBuf>,

    /// Sub-directory of the hub under --root
    #[arg(long, default_value = "misp-central")]
    hub_dir: String,

    /// Name prefix of the spoke sub-directories under --root
    #[arg(long, default_value = "misp")]
    spoke_prefix: String,

    /// Accept self-signed certificates (with --root)
    #[arg(long)]
    insecure: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision every instance, build the topology and export credentials
    Setup,

    /// Set up, wait for the workers, then run the propagation scenarios
    Verify {
        /// Scenario to run, repeatable (default: all)
        #[arg(short, long = "scenario", value_parser = parse_scenario)]
        scenarios: Vec<ScenarioKind>,

        /// Write the run summary as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Write auth.json and auth.csv for every user
    Export {
        /// Output directory (default: output_dir of the config)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn parse_scenario(name: &str) -> Result<ScenarioKind, String> {
    name.parse().map_err(|e: fedsync_verify::VerifyError| e.to_string())
}

/// Parts of the federation file that belong to the verifier.
#[derive(Debug, Default, Deserialize)]
struct VerifierSection {
    #[serde(default)]
    settle: SettlePolicy,
}

/// Resolved run settings.
struct Settings {
    federation: FederationConfig,
    settle: SettlePolicy,
}

impl Args {
    fn settings(&self) -> Result<Settings> {
        if let Some(path) = &self.config {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            return parse_settings(&contents)
                .with_context(|| format!("Invalid federation file {}", path.display()));
        }
        let Some(root) = &self.root else {
            bail!("either --config or --root is required");
        };
        let federation =
            FederationConfig::discover(root, &self.hub_dir, &self.spoke_prefix, !self.insecure)
                .with_context(|| format!("Failed to discover instances under {}", root.display()))?;
        Ok(Settings {
            federation,
            settle: SettlePolicy::default(),
        })
    }
}

fn parse_settings(contents: &str) -> Result<Settings> {
    let federation = FederationConfig::from_toml_str(contents)?;
    let verifier: VerifierSection = toml::from_str(contents)?;
    Ok(Settings {
        federation,
        settle: verifier.settle,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let settings = args.settings()?;
    let connector = MispConnector::new(&MispConfig {
        verify_tls: settings.federation.secure_connection,
        ..MispConfig::default()
    })
    .context("Failed to build HTTP client")?;
    let connector = Arc::new(connector);

    info!(
        "Federation: hub {} with {} spokes",
        settings.federation.hub,
        settings.federation.spokes().count()
    );

    match args.command {
        Command::Setup => {
            let federation = Federation::setup(&settings.federation, connector)
                .await
                .context("Setup failed")?;
            export(&federation, &settings.federation.output_dir).await?;
        }
        Command::Verify { scenarios, report } => {
            let mut federation = Federation::setup(&settings.federation, connector)
                .await
                .context("Setup failed")?;
            federation
                .wait_until_ready(&settings.federation.readiness)
                .await
                .context("Instances did not become ready")?;

            let selection = if scenarios.is_empty() {
                ScenarioKind::ALL.to_vec()
            } else {
                scenarios
            };
            let summary = run_scenarios(&selection, &mut federation, &settings.settle).await;

            if let Some(path) = report {
                let json = serde_json::to_string_pretty(&summary)?;
                fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Report written to {}", path.display());
            }
            for failure in summary.failures() {
                warn!(
                    "{} stopped after {}: {:?}",
                    failure.name,
                    failure.furthest_state(),
                    failure.outcome
                );
            }
            if !summary.all_passed() {
                bail!(
                    "{} of {} scenarios failed",
                    summary.reports.len() - summary.passed_count(),
                    summary.reports.len()
                );
            }
        }
        Command::Export { output } => {
            let federation = Federation::provision(&settings.federation, connector)
                .await
                .context("Provisioning failed")?;
            let dir = output.unwrap_or_else(|| settings.federation.output_dir.clone());
            export(&federation, &dir).await?;
        }
    }

    Ok(())
}

async fn export(federation: &Federation, dir: &std::path::Path) -> Result<()> {
    let credentials = export_credentials(federation, dir)
        .await
        .with_context(|| format!("Failed to export credentials to {}", dir.display()))?;
    for credential in &credentials {
        println!(
            "{}\t{}\t{}\t{}",
            credential.url, credential.login, credential.authkey, credential.password
        );
    }
    info!("Exported {} credentials to {}", credentials.len(), dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEDERATION: &str = r#"
secure_connection = false
hub = "Hub org"

[settle]
max_attempts = 4

[[instances]]
admin_orgname = "Hub org"
baseurl = "https://hub.local"
admin_key = "hub-key"
email_site_admin = "hub@site-admin.local"
email_orgadmin = "hub@org-admin.local"
email_user = "hub@user.local"
"#;

    #[test]
    fn settle_section_is_read_next_to_the_federation() {
        let settings = parse_settings(FEDERATION).unwrap();
        assert_eq!(settings.federation.hub, "Hub org");
        assert!(!settings.federation.secure_connection);
        assert_eq!(settings.settle.max_attempts, 4);
        assert_eq!(settings.settle.initial_delay_ms, SettlePolicy::default().initial_delay_ms);
    }

    #[test]
    fn missing_settle_section_uses_defaults() {
        let contents = FEDERATION.replace("[settle]\nmax_attempts = 4\n", "");
        let settings = parse_settings(&contents).unwrap();
        assert_eq!(settings.settle, SettlePolicy::default());
    }

    #[test]
    fn verify_accepts_repeated_scenarios() {
        let args = Args::try_parse_from([
            "fedsync",
            "--config",
            "f.toml",
            "verify",
            "--scenario",
            "simple_sync",
            "-s",
            "sharing_group",
        ])
        .unwrap();
        match args.command {
            Command::Verify { scenarios, report } => {
                assert_eq!(scenarios, vec![ScenarioKind::SimpleSync, ScenarioKind::SharingGroup]);
                assert!(report.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unknown_scenario_is_rejected() {
        let result = Args::try_parse_from(["fedsync", "--config", "f.toml", "verify", "-s", "nope"]);
        assert!(result.is_err());
    }

    #[test]
    fn config_and_root_conflict() {
        let result =
            Args::try_parse_from(["fedsync", "--config", "f.toml", "--root", "misps", "setup"]);
        assert!(result.is_err());
    }

    #[test]
    fn discovery_reads_instance_directories() {
        let root = tempfile::tempdir().unwrap();
        for (dir, org) in [("misp-central", "Hub org"), ("misp01", "First org")] {
            let path = root.path().join(dir);
            fs::create_dir(&path).unwrap();
            let config = serde_json::json!({
                "admin_orgname": org,
                "baseurl": format!("https://{dir}.local"),
                "admin_key": format!("{dir}-key"),
                "email_site_admin": format!("{dir}@site-admin.local"),
                "email_orgadmin": format!("{dir}@org-admin.local"),
                "email_user": format!("{dir}@user.local"),
            });
            fs::write(path.join("config.json"), config.to_string()).unwrap();
        }
        let root_arg = root.path().to_str().unwrap();
        let args =
            Args::try_parse_from(["fedsync", "--root", root_arg, "--insecure", "setup"]).unwrap();

        let settings = args.settings().unwrap();
        assert_eq!(settings.federation.hub, "Hub org");
        assert!(!settings.federation.secure_connection);
        let spokes: Vec<&str> = settings.federation.spokes().map(|s| s.name()).collect();
        assert_eq!(spokes, vec!["First org"]);
    }
}

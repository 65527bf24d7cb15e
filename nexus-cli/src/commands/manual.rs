//! `nexus manual` — generated paste-in payload for a target.

use anyhow::{Context, Result};
use clap::Args;

use nexus_core::registry;
use nexus_daemon::{daemon_running, request_manual};
use nexus_sync::manual_config;

use super::super::TargetArg;

/// Arguments for `nexus manual`.
#[derive(Args, Debug)]
pub struct ManualArgs {
    /// Target to generate the payload for (e.g. warp).
    pub target: TargetArg,
}

impl ManualArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let target = self.target.0;

        let payload = if daemon_running(&home) {
            let value = request_manual(&home, target.to_string())
                .with_context(|| format!("manual config via daemon failed for {target}"))?;
            value
                .get("config")
                .and_then(|v| v.as_str())
                .context("daemon returned an unexpected manual payload")?
                .to_string()
        } else {
            let registry_doc = registry::load_at(&home)
                .context("failed to load registry — run `nexus init` first")?;
            manual_config(&registry_doc.servers_for_target(target))
        };

        // Hints go to stderr so stdout stays pipeable JSON.
        eprintln!("Paste into {}'s MCP settings:", target.display_name());
        println!("{payload}");
        if let Some(docs) = target.docs_url() {
            eprintln!("Setup guide: {docs}");
        }
        Ok(())
    }
}

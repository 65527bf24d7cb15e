//! `nexus status` — merged detection and sync visibility.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use nexus_core::registry;
use nexus_detector::detect_all_at;
use nexus_sync::{merged_view_at, status::format_age as compact_age, SyncSignal, TargetStatus};

use super::super::TargetArg;

/// Arguments for `nexus status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Show a single target.
    #[arg(long)]
    pub target: Option<TargetArg>,

    /// Print JSON instead of the table.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;

        let registry_doc =
            registry::load_at(&home).context("failed to load registry — run `nexus init` first")?;
        let detected = detect_all_at(&home);
        let mut statuses = merged_view_at(&home, &registry_doc, &detected);
        if let Some(filter) = self.target.as_ref() {
            statuses.retain(|s| s.target == filter.0);
        }

        if self.json {
            print_json(&statuses)?;
            return Ok(());
        }

        print_table(&statuses);
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusReportJson {
    summary: StatusSummaryJson,
    targets: Vec<TargetStatusJson>,
}

#[derive(Serialize)]
struct StatusSummaryJson {
    targets: usize,
    installed: usize,
    drifted: usize,
    failed: usize,
}

#[derive(Serialize)]
struct TargetStatusJson {
    target: String,
    display_name: String,
    installed: bool,
    config_path: String,
    config_exists: bool,
    server_count: usize,
    sync_enabled: bool,
    signal: SyncSignal,
    detail: String,
    last_sync_at: Option<String>,
    last_sync_age: String,
    last_error: Option<String>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "target")]
    target: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "servers")]
    servers: usize,
    #[tabled(rename = "sync")]
    sync: String,
    #[tabled(rename = "last sync")]
    last_sync: String,
    #[tabled(rename = "detail")]
    detail: String,
}

fn print_json(statuses: &[TargetStatus]) -> Result<()> {
    let payload = StatusReportJson {
        summary: StatusSummaryJson {
            targets: statuses.len(),
            installed: statuses.iter().filter(|s| s.installed).count(),
            drifted: count_signal(statuses, SyncSignal::Drifted),
            failed: count_signal(statuses, SyncSignal::Failed),
        },
        targets: statuses
            .iter()
            .map(|status| TargetStatusJson {
                target: status.target.to_string(),
                display_name: status.target.display_name().to_string(),
                installed: status.installed,
                config_path: status.config_path.display().to_string(),
                config_exists: status.config_exists,
                server_count: status.server_count,
                sync_enabled: status.sync_enabled,
                signal: status.signal(),
                detail: detail_for(status),
                last_sync_at: status.last_sync.map(|t| t.to_rfc3339()),
                last_sync_age: format_age(status.last_sync),
                last_error: status.last_error.clone(),
            })
            .collect(),
    };
    let rendered =
        serde_json::to_string_pretty(&payload).context("failed to render status JSON")?;
    println!("{rendered}");
    Ok(())
}

fn print_table(statuses: &[TargetStatus]) {
    let installed = statuses.iter().filter(|s| s.installed).count();
    let drifted = count_signal(statuses, SyncSignal::Drifted);
    let failed = count_signal(statuses, SyncSignal::Failed);

    println!(
        "Nexus v{} | {} targets | {} installed | {} drifted",
        env!("CARGO_PKG_VERSION"),
        statuses.len(),
        installed,
        drifted,
    );

    if statuses.is_empty() {
        println!("No targets matched.");
        return;
    }

    let separator = "■".repeat(72).bright_black().to_string();
    println!("{separator}");
    println!(
        "Indicators: {} SYNCED  {} DRIFTED  {} FAILED  {} NEVER SYNCED  {} DISABLED  {} MANUAL",
        signal_indicator(SyncSignal::Synced),
        signal_indicator(SyncSignal::Drifted),
        signal_indicator(SyncSignal::Failed),
        signal_indicator(SyncSignal::NeverSynced),
        signal_indicator(SyncSignal::Disabled),
        signal_indicator(SyncSignal::Manual),
    );
    println!("{separator}");

    let rows: Vec<StatusTableRow> = statuses
        .iter()
        .map(|status| StatusTableRow {
            target: status.target.to_string(),
            state: signal_label(status.signal()).to_string(),
            servers: status.server_count,
            sync: if status.sync_enabled { "on" } else { "off" }.to_string(),
            last_sync: format_age(status.last_sync),
            detail: detail_for(status),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    println!("{separator}");

    if drifted + failed > 0 {
        println!("Run 'nexus sync --all' to restore drifted or failed targets.");
    }
}

fn count_signal(statuses: &[TargetStatus], signal: SyncSignal) -> usize {
    statuses.iter().filter(|s| s.signal() == signal).count()
}

fn signal_label(signal: SyncSignal) -> &'static str {
    match signal {
        SyncSignal::Manual => "MANUAL",
        SyncSignal::Disabled => "DISABLED",
        SyncSignal::Drifted => "DRIFTED",
        SyncSignal::Failed => "FAILED",
        SyncSignal::NeverSynced => "NEVER SYNCED",
        SyncSignal::Synced => "SYNCED",
    }
}

fn signal_indicator(signal: SyncSignal) -> String {
    match signal {
        SyncSignal::Manual => "■".blue().bold().to_string(),
        SyncSignal::Disabled => "■".bright_black().bold().to_string(),
        SyncSignal::Drifted => "■".red().bold().to_string(),
        SyncSignal::Failed => "■".magenta().bold().to_string(),
        SyncSignal::NeverSynced => "■".yellow().bold().to_string(),
        SyncSignal::Synced => "■".green().bold().to_string(),
    }
}

fn detail_for(status: &TargetStatus) -> String {
    if let Some(err) = &status.detection_error {
        return format!("config unreadable: {err}");
    }
    match status.signal() {
        SyncSignal::Manual => format!("paste-in config (nexus manual {})", status.target),
        SyncSignal::Disabled => "sync disabled".to_string(),
        SyncSignal::Drifted => "config changed outside nexus".to_string(),
        SyncSignal::Failed => status
            .last_error
            .clone()
            .unwrap_or_else(|| "last sync failed".to_string()),
        SyncSignal::NeverSynced if !status.installed => "not installed".to_string(),
        SyncSignal::NeverSynced => "never synced".to_string(),
        SyncSignal::Synced => "up to date".to_string(),
    }
}

fn format_age(last_sync: Option<DateTime<Utc>>) -> String {
    match last_sync {
        None => "never".to_string(),
        Some(at) => format!("{} ago", compact_age(at)),
    }
}

//! CLI command implementations

pub mod binding;
pub mod credential;
pub mod revoke;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};
use opshub_access::{AccessService, KubeConnector, RequestScope};
use opshub_ledger::SqliteLedger;
use serde::Serialize;
use tracing::debug;

use crate::directory::{CliConfig, StaticDirectory};
use crate::Result;

/// How results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// A cluster and a user on it
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Managed cluster id
    #[arg(long)]
    pub cluster: u64,

    /// Platform user id
    #[arg(long, short = 'u')]
    pub user: u64,
}

/// Everything a command needs
pub struct Context {
    pub service: AccessService,
    pub scope: RequestScope,
    pub actor: u64,
    pub output: OutputFormat,
}

impl Context {
    /// Open the ledger and wire the access service over the static directory
    pub fn build(
        config: CliConfig,
        timeout: Duration,
        actor: u64,
        output: OutputFormat,
    ) -> Result<Self> {
        let CliConfig {
            access,
            clusters,
            users,
        } = config;
        debug!(
            ledger = %access.ledger.path.display(),
            clusters = clusters.len(),
            users = users.len(),
            "opening access service"
        );
        let directory = Arc::new(StaticDirectory::new(clusters, users));
        let ledger = Arc::new(SqliteLedger::open(&access.ledger.path)?);
        let connector = Arc::new(KubeConnector::new(&access.client));
        let service = AccessService::new(access, directory.clone(), directory, ledger, connector);

        Ok(Self {
            service,
            scope: RequestScope::with_timeout(timeout),
            actor,
            output,
        })
    }

    /// Print `value` as JSON, or fall back to `table` for table output
    pub fn emit<T: Serialize>(&self, value: &T, table: impl FnOnce(&T)) -> Result<()> {
        match self.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Table => table(value),
        }
        Ok(())
    }
}

/// Format a timestamp as a human-readable age (e.g., "2d", "5h", "30m", "15s")
pub fn format_age(timestamp: &DateTime<Utc>) -> String {
    let duration = Utc::now().signed_duration_since(*timestamp);

    let total_secs = duration.num_seconds();
    if total_secs < 0 {
        return "0s".to_string();
    }

    let days = duration.num_days();
    if days > 0 {
        return format!("{}d", days);
    }
    let hours = duration.num_hours();
    if hours > 0 {
        return format!("{}h", hours);
    }
    let minutes = duration.num_minutes();
    if minutes > 0 {
        return format!("{}m", minutes);
    }
    format!("{}s", total_secs)
}

/// Render rows as a column-aligned table
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let num_cols = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(num_cols) {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let mut out = table_line(headers.iter().copied(), &widths);
    for row in rows {
        out.push('\n');
        out.push_str(&table_line(row.iter().map(String::as_str), &widths));
    }
    out
}

fn table_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(c, width)| format!("{:<width$}", c, width = *width))
        .collect();
    padded.join("  ").trim_end().to_string()
}

/// Print rows as a column-aligned table with headers
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    println!("{}", render_table(headers, rows));
}

/// Namespace column value, "-" for cluster scope
pub fn namespace_cell(namespace: &str) -> String {
    if namespace.is_empty() {
        "-".to_string()
    } else {
        namespace.to_string()
    }
}

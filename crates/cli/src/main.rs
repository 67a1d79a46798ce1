//! Anomaly CLI
//!
//! Queries a running anomaly server for detected anomalies, summaries,
//! the anomaly type catalogue and detector health.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{anomalies, status};

/// Anomaly detection CLI
#[derive(Parser)]
#[command(name = "anomalyctl")]
#[command(author, version, about = "CLI for the fleet anomaly detection engine", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via ANOMALY_API_URL env var)
    #[arg(long, env = "ANOMALY_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List anomalies detected over a lookback window
    List {
        /// Hours of recent data to analyze (1-168, and below the baseline hours)
        #[arg(long, short)]
        lookback_hours: Option<u32>,

        /// Only show this severity (LOW, MEDIUM, HIGH)
        #[arg(long, short)]
        severity: Option<String>,

        /// Only show this anomaly type (e.g. cpu_spike)
        #[arg(long = "type", short)]
        anomaly_type: Option<String>,
    },

    /// Show anomaly counts by type and severity
    Summary {
        /// Hours of data to summarize (1-720, and below the baseline hours)
        #[arg(long)]
        hours: Option<u32>,
    },

    /// List the anomaly types and their thresholds
    Types,

    /// Show detector health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::List {
            lookback_hours,
            severity,
            anomaly_type,
        } => {
            anomalies::list_anomalies(&client, lookback_hours, severity, anomaly_type, cli.format)
                .await?;
        }
        Commands::Summary { hours } => {
            anomalies::show_summary(&client, hours, cli.format).await?;
        }
        Commands::Types => {
            anomalies::show_types(&client, cli.format).await?;
        }
        Commands::Health => {
            status::show_health(&client, cli.format).await?;
        }
    }

    Ok(())
}

//! Anomaly query commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_confidence, color_severity, format_timestamp, print_info, print_json, print_success,
    truncate, OutputFormat,
};

const DESCRIPTION_WIDTH: usize = 60;

/// Row for the anomalies table
#[derive(Tabled)]
struct AnomalyRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Type")]
    anomaly_type: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Description")]
    description: String,
}

/// Row for the anomaly types table
#[derive(Tabled)]
struct TypeRow {
    #[tabled(rename = "Type")]
    anomaly_type: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Threshold")]
    threshold: String,
}

/// Row for count breakdowns
#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Count")]
    count: usize,
}

/// List anomalies detected over the lookback window
pub async fn list_anomalies(
    client: &ApiClient,
    lookback_hours: Option<u32>,
    severity: Option<String>,
    anomaly_type: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let anomalies = client
        .list_anomalies(lookback_hours, severity, anomaly_type)
        .await?;

    match format {
        OutputFormat::Json => print_json(&anomalies)?,
        OutputFormat::Table => {
            if anomalies.is_empty() {
                print_success("No anomalies detected");
                return Ok(());
            }

            let rows: Vec<AnomalyRow> = anomalies
                .iter()
                .map(|a| AnomalyRow {
                    severity: color_severity(&a.severity),
                    anomaly_type: a.anomaly_type.clone(),
                    resource: a.affected_resource.clone().unwrap_or_default(),
                    confidence: color_confidence(a.confidence),
                    timestamp: format_timestamp(&a.timestamp),
                    description: truncate(&a.description, DESCRIPTION_WIDTH),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} anomalies", anomalies.len());
        }
    }

    Ok(())
}

/// Show anomaly counts by type and severity
pub async fn show_summary(client: &ApiClient, hours: Option<u32>, format: OutputFormat) -> Result<()> {
    let summary = client.summary(hours).await?;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            println!("{}", "Anomaly Summary".bold());
            println!("{}", "=".repeat(60));
            println!(
                "Generated:  {}",
                format_timestamp(&summary.generated_at).cyan()
            );
            println!("Total:      {}", summary.total_anomalies.to_string().bold());
            println!();

            if summary.total_anomalies == 0 {
                print_success("No anomalies detected");
                return Ok(());
            }

            let severity_rows: Vec<CountRow> = summary
                .by_severity
                .iter()
                .map(|(severity, count)| CountRow {
                    name: color_severity(severity),
                    count: *count,
                })
                .collect();
            println!("{}", "By severity".bold());
            println!(
                "{}",
                tabled::Table::new(severity_rows).with(tabled::settings::Style::rounded())
            );

            let type_rows: Vec<CountRow> = summary
                .by_type
                .iter()
                .map(|(anomaly_type, count)| CountRow {
                    name: anomaly_type.clone(),
                    count: *count,
                })
                .collect();
            println!("\n{}", "By type".bold());
            println!(
                "{}",
                tabled::Table::new(type_rows).with(tabled::settings::Style::rounded())
            );

            if !summary.affected_resources.is_empty() {
                println!();
                print_info(&format!(
                    "Affected resources: {}",
                    summary.affected_resources.join(", ")
                ));
            }

            if !summary.recent_anomalies.is_empty() {
                println!("\n{}", "Most severe".bold());
                for anomaly in &summary.recent_anomalies {
                    println!(
                        "  {} {} {}",
                        color_severity(&anomaly.severity),
                        format_timestamp(&anomaly.timestamp).dimmed(),
                        anomaly.description
                    );
                }
            }
        }
    }

    Ok(())
}

/// Show the anomaly types the engine can report
pub async fn show_types(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let catalog = client.anomaly_types().await?;

    match format {
        OutputFormat::Json => print_json(&catalog)?,
        OutputFormat::Table => {
            let rows: Vec<TypeRow> = catalog
                .anomaly_types
                .iter()
                .map(|t| TypeRow {
                    anomaly_type: t.anomaly_type.clone(),
                    description: t.description.clone(),
                    threshold: t.threshold.clone(),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);

            println!("\n{}", "Severity levels".bold());
            for level in &catalog.severity_levels {
                println!(
                    "  {:<8} {}",
                    color_severity(&level.severity),
                    level.description
                );
            }
        }
    }

    Ok(())
}

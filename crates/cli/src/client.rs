//! HTTP client for the anomaly server

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// Client for the anomaly query API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// GET `path` with query parameters; `None` values are left out
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, Option<String>)],
    ) -> Result<T> {
        let mut url = self.base_url.join(path).context("Invalid path")?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                if let Some(value) = value {
                    pairs.append_pair(key, value);
                }
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn list_anomalies(
        &self,
        lookback_hours: Option<u32>,
        severity: Option<String>,
        anomaly_type: Option<String>,
    ) -> Result<Vec<Anomaly>> {
        self.get(
            "anomalies",
            &[
                ("lookback_hours", lookback_hours.map(|h| h.to_string())),
                ("severity", severity),
                ("type", anomaly_type),
            ],
        )
        .await
    }

    pub async fn summary(&self, hours: Option<u32>) -> Result<AnomalySummary> {
        self.get("anomalies/summary", &[("hours", hours.map(|h| h.to_string()))])
            .await
    }

    pub async fn anomaly_types(&self) -> Result<AnomalyCatalog> {
        self.get("anomalies/types", &[]).await
    }

    pub async fn health(&self) -> Result<HealthStatus> {
        // /healthz answers 503 with a body when unhealthy
        let url = self.base_url.join("healthz").context("Invalid path")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        response.json().await.context("Failed to parse response")
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub anomaly_type: String,
    pub severity: String,
    pub timestamp: String,
    pub description: String,
    pub details: serde_json::Value,
    pub affected_resource: Option<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyDigest {
    #[serde(rename = "type")]
    pub anomaly_type: String,
    pub severity: String,
    pub timestamp: String,
    pub description: String,
    pub affected_resource: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub total_anomalies: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    pub affected_resources: Vec<String>,
    pub recent_anomalies: Vec<AnomalyDigest>,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyTypeInfo {
    #[serde(rename = "type")]
    pub anomaly_type: String,
    pub description: String,
    pub severity_levels: Vec<String>,
    pub threshold: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityLevelInfo {
    pub severity: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyCatalog {
    pub anomaly_types: Vec<AnomalyTypeInfo>,
    pub severity_levels: Vec<SeverityLevelInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

//! Request bursts from a single public IPv4 address
//!
//! Addresses are extracted from log message text. Private (10/8, 172.16/12,
//! 192.168/16) and loopback (127/8) addresses are ignored.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use super::RULE_CONFIDENCE;
use crate::models::{Anomaly, AnomalyDetails, AnomalyType, IpBurstDetails, LogEntry, Severity};
use crate::thresholds::AnomalyThresholds;

/// Request count above which a burst is graded HIGH
pub const HIGH_BURST_COUNT: usize = 500;

const SECONDS_PER_HOUR: f64 = 3600.0;

fn ipv4_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b").expect("IPv4 pattern is valid")
    })
}

/// True for addresses that never count towards a burst
pub fn is_internal(addr: &Ipv4Addr) -> bool {
    addr.is_private() || addr.is_loopback()
}

/// Public IPv4 addresses mentioned in a message
///
/// Dotted quads with out-of-range octets are skipped.
pub fn public_addresses(message: &str) -> impl Iterator<Item = Ipv4Addr> + '_ {
    ipv4_pattern()
        .find_iter(message)
        .filter_map(|m| m.as_str().parse::<Ipv4Addr>().ok())
        .filter(|addr| !is_internal(addr))
}

/// Timestamps seen for one address
struct Sightings {
    count: usize,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl Sightings {
    fn new(ts: DateTime<Utc>) -> Self {
        Self {
            count: 1,
            first_seen: ts,
            last_seen: ts,
        }
    }

    fn record(&mut self, ts: DateTime<Utc>) {
        self.count += 1;
        self.first_seen = self.first_seen.min(ts);
        self.last_seen = self.last_seen.max(ts);
    }
}

/// Detects addresses whose request count exceeds the configured threshold
pub struct IpBurstDetector<'a> {
    thresholds: &'a AnomalyThresholds,
}

impl<'a> IpBurstDetector<'a> {
    pub fn new(thresholds: &'a AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    /// Scan logs and return one anomaly per bursting address, ordered by address
    pub fn detect(&self, logs: &[LogEntry]) -> Vec<Anomaly> {
        let mut by_address: BTreeMap<Ipv4Addr, Sightings> = BTreeMap::new();

        for log in logs {
            for addr in public_addresses(&log.message) {
                by_address
                    .entry(addr)
                    .and_modify(|s| s.record(log.timestamp))
                    .or_insert_with(|| Sightings::new(log.timestamp));
            }
        }

        by_address
            .into_iter()
            .filter(|(_, s)| s.count > self.thresholds.ip_request_threshold)
            .map(|(addr, s)| burst_anomaly(addr, s))
            .collect()
    }
}

fn burst_anomaly(addr: Ipv4Addr, sightings: Sightings) -> Anomaly {
    let span_hours =
        (sightings.last_seen - sightings.first_seen).num_seconds() as f64 / SECONDS_PER_HOUR;
    let requests_per_hour = sightings.count as f64 / span_hours.max(1.0);

    let severity = if sightings.count > HIGH_BURST_COUNT {
        Severity::High
    } else {
        Severity::Medium
    };

    Anomaly {
        anomaly_type: AnomalyType::IpRequestSpike,
        severity,
        timestamp: sightings.last_seen,
        description: format!(
            "High request volume from IP {}: {} requests",
            addr, sightings.count
        ),
        details: AnomalyDetails::IpBurst(IpBurstDetails {
            ip_address: addr.to_string(),
            count: sightings.count,
            requests_per_hour,
            time_span_hours: span_hours,
            first_seen: sightings.first_seen,
            last_seen: sightings.last_seen,
        }),
        affected_resource: Some(format!("ip_{}", addr)),
        confidence: RULE_CONFIDENCE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> DateTime<Utc> {
        "2024-05-01T11:00:00Z".parse().unwrap()
    }

    fn log(message: &str, offset_secs: i64) -> LogEntry {
        LogEntry {
            resource: "nginx".to_string(),
            message: message.to_string(),
            timestamp: start() + chrono::Duration::seconds(offset_secs),
        }
    }

    #[test]
    fn test_internal_addresses() {
        for internal in ["10.1.2.3", "172.16.0.1", "172.31.255.255", "192.168.1.5", "127.0.0.1"] {
            assert!(is_internal(&internal.parse().unwrap()), "{internal}");
        }
        for public in ["172.32.0.1", "8.8.8.8", "203.0.113.9", "11.0.0.1"] {
            assert!(!is_internal(&public.parse().unwrap()), "{public}");
        }
    }

    #[test]
    fn test_extracts_public_addresses_only() {
        let found: Vec<Ipv4Addr> =
            public_addresses("proxy 10.0.0.2 forwarded 198.51.100.7 via 999.1.1.1 and 127.0.0.1")
                .collect();
        assert_eq!(found, vec!["198.51.100.7".parse::<Ipv4Addr>().unwrap()]);
    }

    #[test]
    fn test_private_burst_is_ignored() {
        let thresholds = AnomalyThresholds::default();
        let logs: Vec<LogEntry> = (0..30)
            .map(|i| log(&"GET / from 192.168.1.5 ".repeat(5), i * 10))
            .collect();

        assert!(IpBurstDetector::new(&thresholds).detect(&logs).is_empty());
    }

    #[test]
    fn test_public_burst_within_an_hour() {
        let thresholds = AnomalyThresholds::default();
        let logs: Vec<LogEntry> = (0..120)
            .map(|i| log("203.0.113.9 - - \"GET /login HTTP/1.1\" 200", i * 25))
            .collect();

        let anomalies = IpBurstDetector::new(&thresholds).detect(&logs);
        assert_eq!(anomalies.len(), 1);

        let anomaly = &anomalies[0];
        assert_eq!(anomaly.anomaly_type, AnomalyType::IpRequestSpike);
        assert_eq!(anomaly.severity, Severity::Medium);
        assert_eq!(anomaly.affected_resource.as_deref(), Some("ip_203.0.113.9"));
        assert_eq!(anomaly.timestamp, start() + chrono::Duration::seconds(119 * 25));
        match &anomaly.details {
            AnomalyDetails::IpBurst(d) => {
                assert_eq!(d.count, 120);
                assert!((d.requests_per_hour - 120.0).abs() < 1e-9);
                assert!(d.time_span_hours < 1.0);
            }
            other => panic!("unexpected details: {other:?}"),
        }
    }

    #[test]
    fn test_large_burst_is_high_and_rate_uses_span() {
        let thresholds = AnomalyThresholds::default();
        let logs: Vec<LogEntry> = (0..600)
            .map(|i| log("client=8.8.4.4", i * 36))
            .collect();

        let anomalies = IpBurstDetector::new(&thresholds).detect(&logs);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].severity, Severity::High);
        match &anomalies[0].details {
            AnomalyDetails::IpBurst(d) => {
                // 599 * 36s = 5.99h
                assert!((d.time_span_hours - 5.99).abs() < 1e-9);
                assert!((d.requests_per_hour - 600.0 / 5.99).abs() < 1e-9);
            }
            other => panic!("unexpected details: {other:?}"),
        }
    }

    #[test]
    fn test_at_threshold_is_not_a_burst() {
        let thresholds = AnomalyThresholds::default();
        let logs: Vec<LogEntry> = (0..thresholds.ip_request_threshold as i64)
            .map(|i| log("8.8.8.8", i))
            .collect();

        assert!(IpBurstDetector::new(&thresholds).detect(&logs).is_empty());
    }
}

//! Data model types.

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::probe::ProbeOutcome;

/// A target configuration was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid configuration: {0}")]
pub struct InvalidConfig(pub String);

/// Untyped target input, as received from the environment or the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Identifier; the URL is used when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub url: String,
    pub interval_secs: f64,
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

/// A monitored URL and its polling configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Target {
    pub id: String,
    pub url: String,
    pub interval: Duration,
    pub duration: Option<Duration>,
    pub created_at: DateTime<Utc>,
}

impl Target {
    /// Validate a spec into a target.
    pub fn from_spec(spec: TargetSpec) -> Result<Self, InvalidConfig> {
        let url = normalize_url(&spec.url)?;

        let interval = positive_secs(spec.interval_secs)
            .ok_or_else(|| InvalidConfig(format!("interval for {} must be positive", url)))?;

        let duration = match spec.duration_secs {
            Some(secs) => Some(
                positive_secs(secs)
                    .ok_or_else(|| InvalidConfig(format!("duration for {} must be positive", url)))?,
            ),
            None => None,
        };

        let id = match spec.id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => url.clone(),
        };

        Ok(Self {
            id,
            url,
            interval,
            duration,
            created_at: Utc::now(),
        })
    }

    /// Validate a batch, rejecting empty input and duplicate identifiers.
    pub fn from_specs(specs: Vec<TargetSpec>) -> Result<Vec<Self>, InvalidConfig> {
        if specs.is_empty() {
            return Err(InvalidConfig("no targets given".to_string()));
        }

        let mut targets: Vec<Self> = Vec::with_capacity(specs.len());
        for spec in specs {
            let target = Self::from_spec(spec)?;
            if targets.iter().any(|t| t.id == target.id) {
                return Err(InvalidConfig(format!("duplicate target {}", target.id)));
            }
            targets.push(target);
        }
        Ok(targets)
    }
}

fn positive_secs(secs: f64) -> Option<Duration> {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

/// Trim the URL, default to `http://` and require an http(s) URL with a host.
fn normalize_url(raw: &str) -> Result<String, InvalidConfig> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(InvalidConfig("url must not be empty".to_string()));
    }

    let url = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };

    let parsed = Url::parse(&url).map_err(|e| InvalidConfig(format!("bad url {}: {}", raw, e)))?;
    if parsed.host_str().is_none() {
        return Err(InvalidConfig(format!("url {} has no host", raw)));
    }

    Ok(url)
}

/// One probe result for one target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    /// 1-based, per run.
    pub sequence: u64,
    /// Seconds; 0 when the request failed.
    pub latency_secs: f64,
    pub status_code: Option<u16>,
    pub status_name: &'static str,
    /// Seconds since the target's run began.
    pub elapsed_secs: f64,
}

impl Sample {
    pub fn from_outcome(sequence: u64, outcome: &ProbeOutcome, elapsed: Duration) -> Self {
        Self {
            sequence,
            latency_secs: outcome.latency.as_secs_f64(),
            status_code: outcome.status,
            status_name: outcome.status_name(),
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }
}

/// Samples collected for one target during its current run.
#[derive(Debug, Clone, Serialize)]
pub struct TargetHistory {
    /// URL being watched; unknown for histories created by a bare append.
    pub url: Option<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub samples: Vec<Sample>,
}

impl TargetHistory {
    pub fn new() -> Self {
        Self {
            url: None,
            started_at: Utc::now(),
            elapsed_secs: 0.0,
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.elapsed_secs = sample.elapsed_secs;
        self.samples.push(sample);
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for TargetHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of every target's history.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub targets: BTreeMap<String, TargetHistory>,
}

impl Snapshot {
    pub fn get(&self, id: &str) -> Option<&TargetHistory> {
        self.targets.get(id)
    }
}

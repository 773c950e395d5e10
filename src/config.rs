//! Configuration module for urlwatch.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::path::PathBuf;

use crate::store::TargetSpec;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the API server (default: 8080)
    pub http_port: u16,
    /// Raw target list, one URL or `name=url` per entry
    pub targets: Vec<String>,
    /// Seconds between probes of one target (default: 2.0)
    pub ping_interval: f64,
    /// Per-target monitoring duration in seconds; unlimited when unset
    pub duration: Option<f64>,
    /// Directory receiving CSV exports at shutdown
    pub export_dir: Option<PathBuf>,
    /// Start monitoring the configured targets at boot (default: true)
    pub autostart: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            targets: Vec::new(),
            ping_interval: 2.0,
            duration: None,
            export_dir: None,
            autostart: true,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `URLWATCH_HTTP_PORT`: HTTP port (default: 8080)
    /// - `URLWATCH_TARGETS`: URLs separated by newlines or commas
    /// - `URLWATCH_PING_INTERVAL`: seconds between probes (default: 2.0)
    /// - `URLWATCH_DURATION`: seconds to monitor each target (default: unlimited)
    /// - `URLWATCH_EXPORT_DIR`: write CSV exports here on shutdown
    /// - `URLWATCH_AUTOSTART`: start monitoring at boot (default: true)
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(port) = lookup("URLWATCH_HTTP_PORT").and_then(|v| v.trim().parse().ok()) {
            cfg.http_port = port;
        }

        if let Some(raw) = lookup("URLWATCH_TARGETS") {
            cfg.targets = split_targets(&raw);
        }

        if let Some(interval) = lookup("URLWATCH_PING_INTERVAL").and_then(|v| v.trim().parse().ok()) {
            cfg.ping_interval = interval;
        }

        if let Some(duration) = lookup("URLWATCH_DURATION").and_then(|v| v.trim().parse().ok()) {
            cfg.duration = Some(duration);
        }

        if let Some(dir) = lookup("URLWATCH_EXPORT_DIR").filter(|v| !v.trim().is_empty()) {
            cfg.export_dir = Some(PathBuf::from(dir.trim()));
        }

        if let Some(autostart) = lookup("URLWATCH_AUTOSTART") {
            match autostart.trim().to_ascii_lowercase().as_str() {
                "0" | "false" | "no" | "off" => cfg.autostart = false,
                "1" | "true" | "yes" | "on" => cfg.autostart = true,
                _ => {}
            }
        }

        cfg
    }

    /// Target specs for every configured entry, sharing the configured
    /// interval and duration.
    pub fn target_specs(&self) -> Vec<TargetSpec> {
        self.targets
            .iter()
            .map(|entry| {
                let (id, url) = match entry.split_once('=') {
                    Some((name, url)) if is_target_name(name) => {
                        (Some(name.trim().to_string()), url.trim().to_string())
                    }
                    _ => (None, entry.clone()),
                };
                TargetSpec {
                    id,
                    url,
                    interval_secs: self.ping_interval,
                    duration_secs: self.duration,
                }
            })
            .collect()
    }
}

/// A `name=` prefix is only a label when it cannot be part of a URL.
fn is_target_name(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ' '))
}

fn split_targets(raw: &str) -> Vec<String> {
    raw.split(['\n', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

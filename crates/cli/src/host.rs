//! Host snapshot and identifier redaction for `hostprobe.json`

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub const REDACTED_HOST: &str = "<redacted-host>";
pub const REDACTED_USER: &str = "<redacted-user>";

/// 主机快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostSnapshot {
    #[serde(with = "contracts::serde_utc_millis")]
    pub collected_at_utc: DateTime<Utc>,
    pub labops_version: String,
    pub os: String,
    pub os_family: String,
    pub arch: String,
    pub cpu_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ram_mb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// `LABOPS_*` variables that were set
    pub labops_env: BTreeMap<String, String>,
    pub redacted: bool,
}

fn cpu_count() -> u32 {
    std::thread::available_parallelism()
        .map(|p| p.get() as u32)
        .unwrap_or(1)
}

fn total_ram_mb() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
        meminfo
            .lines()
            .find(|line| line.starts_with("MemTotal:"))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|kb| kb.parse::<u64>().ok())
            .map(|kb| kb / 1024)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

impl HostSnapshot {
    /// Snapshot of the current process environment
    pub fn collect(now: DateTime<Utc>) -> Self {
        let vars: Vec<(String, String)> = std::env::vars().collect();
        let lookup = |key: &str| vars.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone());
        Self::collect_with(now, lookup, vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Snapshot from an explicit variable source
    pub fn collect_with<'a, F, I>(now: DateTime<Utc>, lookup: F, vars: I) -> Self
    where
        F: Fn(&str) -> Option<String>,
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let labops_env: BTreeMap<String, String> = vars
            .into_iter()
            .filter(|(k, _)| k.starts_with("LABOPS_"))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Self {
            collected_at_utc: now,
            labops_version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
            os_family: std::env::consts::FAMILY.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpu_count: cpu_count(),
            ram_mb: total_ram_mb(),
            hostname: lookup("HOSTNAME").filter(|v| !v.is_empty()),
            user: lookup("USER").filter(|v| !v.is_empty()),
            labops_env,
            redacted: false,
        }
    }

    /// Replace host and user identifiers everywhere in the snapshot
    pub fn redact(mut self, redactor: &Redactor) -> Self {
        self.hostname = self.hostname.map(|_| REDACTED_HOST.to_string());
        self.user = self.user.map(|_| REDACTED_USER.to_string());
        for value in self.labops_env.values_mut() {
            *value = redactor.redact(value);
        }
        self.redacted = true;
        self
    }
}

/// 标识符脱敏
///
/// Built from `HOSTNAME` and `USER`; empty or single-character identifiers
/// are ignored so common substrings are not mangled.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    rules: Vec<(String, &'static str)>,
}

impl Redactor {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut rules = Vec::new();
        for (var, replacement) in [("HOSTNAME", REDACTED_HOST), ("USER", REDACTED_USER)] {
            if let Some(value) = lookup(var).map(|v| v.trim().to_string()) {
                if value.chars().count() > 1 {
                    rules.push((value, replacement));
                }
            }
        }
        // longest identifier first
        rules.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { rules }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn redact(&self, text: &str) -> String {
        self.rules
            .iter()
            .fold(text.to_string(), |acc, (needle, replacement)| {
                acc.replace(needle.as_str(), replacement)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn lookup(key: &str) -> Option<String> {
        match key {
            "HOSTNAME" => Some("lab-bench-07".into()),
            "USER" => Some("alice".into()),
            _ => None,
        }
    }

    #[test]
    fn test_collect_picks_labops_vars() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let vars = [
            ("LABOPS_REAL_DEVICE_FIXTURE", "/home/alice/real.csv"),
            ("PATH", "/usr/bin"),
        ];
        let snapshot = HostSnapshot::collect_with(now, lookup, vars);
        assert_eq!(snapshot.hostname.as_deref(), Some("lab-bench-07"));
        assert_eq!(snapshot.labops_env.len(), 1);
        assert!(snapshot.cpu_count >= 1);
        assert!(!snapshot.redacted);
    }

    #[test]
    fn test_redaction_covers_identifiers() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let vars = [("LABOPS_REAL_DEVICE_FIXTURE", "/home/alice/lab-bench-07.csv")];
        let redactor = Redactor::from_lookup(lookup);
        let snapshot = HostSnapshot::collect_with(now, lookup, vars).redact(&redactor);

        assert_eq!(snapshot.hostname.as_deref(), Some(REDACTED_HOST));
        assert_eq!(snapshot.user.as_deref(), Some(REDACTED_USER));
        assert_eq!(
            snapshot.labops_env["LABOPS_REAL_DEVICE_FIXTURE"],
            "/home/<redacted-user>/<redacted-host>.csv"
        );

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains("alice"));
        assert!(json.contains("\"redacted\":true"));
    }

    #[test]
    fn test_short_identifiers_ignored() {
        let redactor = Redactor::from_lookup(|key| (key == "USER").then(|| "a".to_string()));
        assert_eq!(redactor.redact("camera"), "camera");
    }
}

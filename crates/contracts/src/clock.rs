//! CaptureClock - steady/wall anchor pair
//!
//! The capture loop measures cadence on the monotonic clock so NTP jumps or
//! suspend/resume cannot distort intervals; reports need wall time. One anchor
//! pair maps the former onto the latter with a fixed affine offset.

use std::time::Instant;

use chrono::{DateTime, TimeDelta, Utc};

/// Dual steady/wall anchor
///
/// Constructed once per session. `to_wall` never re-anchors.
#[derive(Debug, Clone, Copy)]
pub struct CaptureClock {
    wall_anchor: DateTime<Utc>,
    steady_anchor: Instant,
}

impl CaptureClock {
    /// Anchor both clocks at the current instant
    pub fn new() -> Self {
        Self::anchored(Utc::now(), Instant::now())
    }

    /// Anchor at an explicit pair (deterministic tests)
    pub fn anchored(wall_anchor: DateTime<Utc>, steady_anchor: Instant) -> Self {
        Self {
            wall_anchor,
            steady_anchor,
        }
    }

    /// Re-anchor at the current instant. Only valid before a session starts.
    pub fn reset_to_now(&mut self) {
        self.wall_anchor = Utc::now();
        self.steady_anchor = Instant::now();
    }

    pub fn now_steady(&self) -> Instant {
        Instant::now()
    }

    pub fn now_wall(&self) -> DateTime<Utc> {
        self.to_wall(Instant::now())
    }

    pub fn wall_anchor(&self) -> DateTime<Utc> {
        self.wall_anchor
    }

    pub fn steady_anchor(&self) -> Instant {
        self.steady_anchor
    }

    /// `wall_anchor + (steady_ts - steady_anchor)`
    pub fn to_wall(&self, steady_ts: Instant) -> DateTime<Utc> {
        match steady_ts.checked_duration_since(self.steady_anchor) {
            Some(ahead) => {
                let delta = TimeDelta::from_std(ahead).unwrap_or(TimeDelta::MAX);
                self.wall_anchor
                    .checked_add_signed(delta)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC)
            }
            None => {
                let behind = self.steady_anchor.duration_since(steady_ts);
                let delta = TimeDelta::from_std(behind).unwrap_or(TimeDelta::MAX);
                self.wall_anchor
                    .checked_sub_signed(delta)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC)
            }
        }
    }
}

impl Default for CaptureClock {
    fn default() -> Self {
        Self::new()
    }
}

/// `%Y-%m-%dT%H:%M:%S.<mmm>Z`
pub fn format_utc_millis(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Serde adapter writing timestamps with millisecond precision and trailing `Z`
pub mod serde_utc_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_utc_millis(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }

    /// Same format for optional timestamps
    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => serializer.serialize_str(&super::super::format_utc_millis(ts)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw = Option::<String>::deserialize(deserializer)?;
            raw.map(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map(|ts| ts.with_timezone(&Utc))
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
        }
    }
}

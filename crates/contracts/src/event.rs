//! Event timeline contracts
//!
//! The taxonomy is fixed. Each event kind has a typed envelope so payload keys
//! cannot drift between call sites.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::{ApplyMode, FrameOutcome, FrameSample};

/// Event type taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    RunStarted,
    ConfigApplied,
    ConfigUnsupported,
    ConfigAdjusted,
    StreamStarted,
    FrameReceived,
    FrameDropped,
    FrameTimeout,
    FrameIncomplete,
    StreamStopped,
    DeviceDisconnected,
    TransportAnomaly,
    Info,
    Warning,
    Error,
}

impl EventType {
    pub const ALL: [EventType; 15] = [
        Self::RunStarted,
        Self::ConfigApplied,
        Self::ConfigUnsupported,
        Self::ConfigAdjusted,
        Self::StreamStarted,
        Self::FrameReceived,
        Self::FrameDropped,
        Self::FrameTimeout,
        Self::FrameIncomplete,
        Self::StreamStopped,
        Self::DeviceDisconnected,
        Self::TransportAnomaly,
        Self::Info,
        Self::Warning,
        Self::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RunStarted => "run_started",
            Self::ConfigApplied => "CONFIG_APPLIED",
            Self::ConfigUnsupported => "CONFIG_UNSUPPORTED",
            Self::ConfigAdjusted => "CONFIG_ADJUSTED",
            Self::StreamStarted => "STREAM_STARTED",
            Self::FrameReceived => "FRAME_RECEIVED",
            Self::FrameDropped => "FRAME_DROPPED",
            Self::FrameTimeout => "FRAME_TIMEOUT",
            Self::FrameIncomplete => "FRAME_INCOMPLETE",
            Self::StreamStopped => "STREAM_STOPPED",
            Self::DeviceDisconnected => "DEVICE_DISCONNECTED",
            Self::TransportAnomaly => "TRANSPORT_ANOMALY",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.as_str() == value)
    }

    pub fn for_outcome(outcome: FrameOutcome) -> Self {
        match outcome {
            FrameOutcome::Received => Self::FrameReceived,
            FrameOutcome::Dropped => Self::FrameDropped,
            FrameOutcome::Timeout => Self::FrameTimeout,
            FrameOutcome::Incomplete => Self::FrameIncomplete,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Ordered string payload
///
/// Keys serialize in insertion order. Re-inserting a key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPayload(Vec<(String, String)>);

impl EventPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn with_opt(mut self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        if let Some(value) = value {
            self.insert(key, value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Serialize for EventPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// One line of `events.jsonl`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    #[serde(with = "crate::clock::serde_utc_millis")]
    pub ts_utc: DateTime<Utc>,

    #[serde(rename = "type")]
    pub event_type: EventType,

    pub payload: EventPayload,
}

/// Typed event envelope
pub trait TypedEvent {
    fn event_type(&self) -> EventType;

    fn payload(&self) -> EventPayload;

    fn to_event(&self, ts_utc: DateTime<Utc>) -> Event {
        Event {
            ts_utc,
            event_type: self.event_type(),
            payload: self.payload(),
        }
    }
}

fn fixed3(value: f64) -> String {
    format!("{value:.3}")
}

/// `run_started`
#[derive(Debug, Clone)]
pub struct RunStartedEvent {
    pub run_id: String,
    pub scenario_id: String,
    pub scenario_path: String,
    pub backend: String,
    pub out_dir: String,
    pub seed: u64,
    pub duration_ms: u64,
}

impl TypedEvent for RunStartedEvent {
    fn event_type(&self) -> EventType {
        EventType::RunStarted
    }

    fn payload(&self) -> EventPayload {
        EventPayload::new()
            .with("run_id", &self.run_id)
            .with("scenario_id", &self.scenario_id)
            .with("scenario_path", &self.scenario_path)
            .with("backend", &self.backend)
            .with("out_dir", &self.out_dir)
            .with("seed", self.seed.to_string())
            .with("duration_ms", self.duration_ms.to_string())
    }
}

/// `STREAM_STARTED`
#[derive(Debug, Clone)]
pub struct StreamStartedEvent {
    pub run_id: String,
    pub scenario_id: String,
    pub backend: String,
    pub duration_ms: u64,
    pub fps: f64,
    pub seed: u64,
    pub soak_mode: bool,
    pub resume: bool,
}

impl TypedEvent for StreamStartedEvent {
    fn event_type(&self) -> EventType {
        EventType::StreamStarted
    }

    fn payload(&self) -> EventPayload {
        EventPayload::new()
            .with("run_id", &self.run_id)
            .with("scenario_id", &self.scenario_id)
            .with("backend", &self.backend)
            .with("duration_ms", self.duration_ms.to_string())
            .with("fps", fixed3(self.fps))
            .with("seed", self.seed.to_string())
            .with("soak_mode", self.soak_mode.to_string())
            .with("resume", self.resume.to_string())
    }
}

/// `FRAME_RECEIVED` / `FRAME_DROPPED` / `FRAME_TIMEOUT` / `FRAME_INCOMPLETE`
#[derive(Debug, Clone)]
pub struct FrameOutcomeEvent {
    pub outcome: FrameOutcome,
    pub frame_id: u64,
    pub size_bytes: u32,
    pub dropped: bool,
    pub reason: Option<String>,
}

impl FrameOutcomeEvent {
    pub const DEFAULT_DROP_REASON: &'static str = "backend_marked_dropped";

    pub fn from_sample(sample: &FrameSample) -> Self {
        Self {
            outcome: sample.outcome,
            frame_id: sample.frame_id,
            size_bytes: sample.size_bytes,
            dropped: sample.dropped,
            reason: None,
        }
    }
}

impl TypedEvent for FrameOutcomeEvent {
    fn event_type(&self) -> EventType {
        EventType::for_outcome(self.outcome)
    }

    fn payload(&self) -> EventPayload {
        let reason = match (&self.reason, self.outcome) {
            (Some(reason), _) => Some(reason.clone()),
            (None, FrameOutcome::Dropped) => Some(Self::DEFAULT_DROP_REASON.to_string()),
            (None, _) => None,
        };

        EventPayload::new()
            .with("outcome", self.outcome.as_str())
            .with("frame_id", self.frame_id.to_string())
            .with("size_bytes", self.size_bytes.to_string())
            .with("dropped", self.dropped.to_string())
            .with_opt("reason", reason)
    }
}

/// `CONFIG_APPLIED` / `CONFIG_UNSUPPORTED` / `CONFIG_ADJUSTED`
#[derive(Debug, Clone)]
pub enum ConfigStatusEvent {
    Applied {
        apply_mode: ApplyMode,
        applied_params: Vec<(String, String)>,
    },
    Unsupported {
        apply_mode: ApplyMode,
        generic_key: String,
        requested_value: String,
        reason: String,
        node_name: Option<String>,
    },
    Adjusted {
        apply_mode: ApplyMode,
        generic_key: String,
        requested_value: String,
        applied_value: String,
        reason: String,
        node_name: Option<String>,
    },
}

impl TypedEvent for ConfigStatusEvent {
    fn event_type(&self) -> EventType {
        match self {
            Self::Applied { .. } => EventType::ConfigApplied,
            Self::Unsupported { .. } => EventType::ConfigUnsupported,
            Self::Adjusted { .. } => EventType::ConfigAdjusted,
        }
    }

    fn payload(&self) -> EventPayload {
        match self {
            Self::Applied {
                apply_mode,
                applied_params,
            } => {
                let mut payload = EventPayload::new().with("apply_mode", apply_mode.as_str());
                for (key, value) in applied_params {
                    payload.insert(format!("param.{key}"), value);
                }
                payload
            }
            Self::Unsupported {
                apply_mode,
                generic_key,
                requested_value,
                reason,
                node_name,
            } => EventPayload::new()
                .with("apply_mode", apply_mode.as_str())
                .with("generic_key", generic_key)
                .with("requested_value", requested_value)
                .with("reason", reason)
                .with_opt("node_name", node_name.as_deref()),
            Self::Adjusted {
                apply_mode,
                generic_key,
                requested_value,
                applied_value,
                reason,
                node_name,
            } => EventPayload::new()
                .with("apply_mode", apply_mode.as_str())
                .with("generic_key", generic_key)
                .with("requested_value", requested_value)
                .with("applied_value", applied_value)
                .with("reason", reason)
                .with_opt("node_name", node_name.as_deref()),
        }
    }
}

/// `STREAM_STOPPED`
#[derive(Debug, Clone)]
pub struct StreamStoppedEvent {
    pub run_id: String,
    /// `completed`, `interrupted` or `failed`
    pub reason: String,
    pub frames_total: u64,
    pub received_frames_total: u64,
    pub dropped_frames_total: u64,
    pub stream_duration_ms: u64,
}

impl TypedEvent for StreamStoppedEvent {
    fn event_type(&self) -> EventType {
        EventType::StreamStopped
    }

    fn payload(&self) -> EventPayload {
        EventPayload::new()
            .with("run_id", &self.run_id)
            .with("reason", &self.reason)
            .with("frames_total", self.frames_total.to_string())
            .with("received_frames_total", self.received_frames_total.to_string())
            .with("dropped_frames_total", self.dropped_frames_total.to_string())
            .with("stream_duration_ms", self.stream_duration_ms.to_string())
    }
}

/// `DEVICE_DISCONNECTED`, emitted once per incident before reconnect attempts
#[derive(Debug, Clone)]
pub struct DeviceDisconnectedEvent {
    pub run_id: String,
    pub error_code: String,
    pub error: String,
    pub disconnect_count: u64,
    pub reconnect_attempts_used: u32,
    pub reconnect_attempts_remaining: u32,
}

impl TypedEvent for DeviceDisconnectedEvent {
    fn event_type(&self) -> EventType {
        EventType::DeviceDisconnected
    }

    fn payload(&self) -> EventPayload {
        EventPayload::new()
            .with("run_id", &self.run_id)
            .with("error_code", &self.error_code)
            .with("error", &self.error)
            .with("disconnect_count", self.disconnect_count.to_string())
            .with(
                "reconnect_attempts_used",
                self.reconnect_attempts_used.to_string(),
            )
            .with(
                "reconnect_attempts_remaining",
                self.reconnect_attempts_remaining.to_string(),
            )
    }
}

/// `TRANSPORT_ANOMALY`
#[derive(Debug, Clone, PartialEq)]
pub struct TransportAnomalyEvent {
    pub heuristic_id: String,
    pub counter: String,
    pub observed_value: f64,
    pub threshold: f64,
    pub summary: String,
}

impl TypedEvent for TransportAnomalyEvent {
    fn event_type(&self) -> EventType {
        EventType::TransportAnomaly
    }

    fn payload(&self) -> EventPayload {
        EventPayload::new()
            .with("heuristic_id", &self.heuristic_id)
            .with("counter", &self.counter)
            .with("observed_value", fixed3(self.observed_value))
            .with("threshold", fixed3(self.threshold))
            .with("summary", &self.summary)
    }
}

/// Severity of a free-form notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// `info` / `warning` / `error`
#[derive(Debug, Clone)]
pub struct NoticeEvent {
    pub severity: Severity,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl NoticeEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }
}

impl TypedEvent for NoticeEvent {
    fn event_type(&self) -> EventType {
        match self.severity {
            Severity::Info => EventType::Info,
            Severity::Warning => EventType::Warning,
            Severity::Error => EventType::Error,
        }
    }

    fn payload(&self) -> EventPayload {
        let mut payload = EventPayload::new().with("message", &self.message);
        for (key, value) in &self.fields {
            payload.insert(key.clone(), value.clone());
        }
        payload
    }
}

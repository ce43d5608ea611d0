//! # Contracts
//!
//! Frozen interface contracts (ICD), defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Capture cadence is measured on the monotonic clock (`std::time::Instant`)
//! - Every reported timestamp is wall time (`DateTime<Utc>`), derived through a
//!   per-session [`CaptureClock`] anchor pair
//! - `frame_id` is strictly increasing within a session and across reconnects

mod backend;
mod clock;
mod device;
mod error;
mod event;
mod frame;
mod report;
mod scenario;

pub use backend::{BackendError, CameraBackend, LocalCameraBackend, ParamApplied};
pub use clock::{format_utc_millis, serde_utc_millis, CaptureClock};
pub use device::{DeviceInfo, DeviceSelector, ResolvedDevice, WebcamDevice};
pub use error::ContractError;
pub use event::{
    ConfigStatusEvent, DeviceDisconnectedEvent, Event, EventPayload, EventType,
    FrameOutcomeEvent, NoticeEvent, RunStartedEvent, Severity, StreamStartedEvent,
    StreamStoppedEvent, TransportAnomalyEvent, TypedEvent,
};
pub use frame::{AcquisitionResult, FrameOutcome, FrameSample};
pub use report::{FpsReport, PercentileStats, RollingSample};
pub use scenario::{
    ApplyMode, CameraKnobs, CuratedKnob, ReconnectSettings, Roi, ScenarioModel, SimFaults,
    Thresholds, WebcamHints, DEFAULT_DURATION_MS, DEFAULT_FPS, DEFAULT_RECONNECT_ATTEMPTS,
    DEFAULT_ROLLING_WINDOW_MS,
};

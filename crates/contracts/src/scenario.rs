//! ScenarioModel - runtime view of a scenario file
//!
//! Every field is optional. The runtime extraction treats unknown or ill-typed
//! fields as unset; strict schema enforcement belongs to the validator.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_DURATION_MS: u64 = 1000;
pub const DEFAULT_ROLLING_WINDOW_MS: u64 = 200;
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 3;
pub const DEFAULT_FPS: f64 = 30.0;

/// Runtime scenario model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioModel {
    pub scenario_id: Option<String>,
    pub description: Option<String>,
    /// Backend name (`sim`, `real`, `real_stub`, `webcam`)
    pub backend: Option<String>,
    pub duration_ms: Option<u64>,
    pub rolling_window_ms: Option<u64>,
    pub soak_mode: Option<bool>,
    pub apply_mode: Option<ApplyMode>,
    pub device_selector: Option<String>,
    pub camera: CameraKnobs,
    pub sim_faults: SimFaults,
    pub thresholds: Thresholds,
    pub webcam: WebcamHints,
    pub reconnect: ReconnectSettings,
}

impl ScenarioModel {
    pub fn scenario_id(&self) -> &str {
        self.scenario_id.as_deref().unwrap_or("unnamed")
    }

    pub fn backend(&self) -> &str {
        self.backend.as_deref().unwrap_or("sim")
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms.unwrap_or(DEFAULT_DURATION_MS))
    }

    pub fn rolling_window(&self) -> Duration {
        Duration::from_millis(
            self.rolling_window_ms
                .filter(|ms| *ms > 0)
                .unwrap_or(DEFAULT_ROLLING_WINDOW_MS),
        )
    }

    pub fn seed(&self) -> u64 {
        self.sim_faults.seed.unwrap_or(0)
    }

    pub fn apply_mode(&self) -> ApplyMode {
        self.apply_mode.unwrap_or_default()
    }

    pub fn max_reconnect_attempts(&self) -> u32 {
        self.reconnect
            .max_attempts
            .unwrap_or(DEFAULT_RECONNECT_ATTEMPTS)
    }

    /// Frame rate the run is configured for, if the scenario names one
    pub fn configured_fps(&self) -> Option<f64> {
        self.camera
            .fps
            .or(self.webcam.requested_fps)
            .filter(|fps| *fps > 0.0)
    }

    /// Curated knobs the scenario requests, in curated order
    ///
    /// Webcam hints fill frame rate and ROI size when the camera section
    /// leaves them unset.
    pub fn requested_knobs(&self, include_webcam_hints: bool) -> Vec<(CuratedKnob, String)> {
        let mut knobs = self.camera.requested();
        if include_webcam_hints {
            let hinted = [
                (CuratedKnob::FrameRate, self.webcam.requested_fps.map(knob_number)),
                (
                    CuratedKnob::RoiWidth,
                    self.webcam.requested_width.map(|v| v.to_string()),
                ),
                (
                    CuratedKnob::RoiHeight,
                    self.webcam.requested_height.map(|v| v.to_string()),
                ),
            ];
            for (knob, value) in hinted {
                if let Some(value) = value {
                    if !knobs.iter().any(|(k, _)| *k == knob) {
                        knobs.push((knob, value));
                    }
                }
            }
            knobs.sort_by_key(|(knob, _)| knob.position());
        }
        knobs
    }
}

/// 参数下发模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMode {
    /// 任一参数不支持即失败
    Strict,
    /// 记录不支持的参数并继续
    #[default]
    BestEffort,
}

impl ApplyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::BestEffort => "best_effort",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "strict" => Some(Self::Strict),
            "best_effort" => Some(Self::BestEffort),
            _ => None,
        }
    }
}

/// Camera knobs requested by the scenario
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CameraKnobs {
    pub fps: Option<f64>,
    pub exposure_us: Option<f64>,
    pub gain_db: Option<f64>,
    pub trigger_mode: Option<String>,
    pub trigger_source: Option<String>,
    pub trigger_activation: Option<String>,
    pub roi: Roi,
    pub packet_size_bytes: Option<u32>,
    pub inter_packet_delay_us: Option<u32>,
}

impl CameraKnobs {
    /// Requested knobs rendered to their wire values
    pub fn requested(&self) -> Vec<(CuratedKnob, String)> {
        let candidates = [
            (CuratedKnob::FrameRate, self.fps.map(knob_number)),
            (CuratedKnob::Exposure, self.exposure_us.map(knob_number)),
            (CuratedKnob::Gain, self.gain_db.map(knob_number)),
            (CuratedKnob::TriggerMode, self.trigger_mode.clone()),
            (CuratedKnob::TriggerSource, self.trigger_source.clone()),
            (CuratedKnob::TriggerActivation, self.trigger_activation.clone()),
            (CuratedKnob::RoiWidth, self.roi.width.map(|v| v.to_string())),
            (CuratedKnob::RoiHeight, self.roi.height.map(|v| v.to_string())),
            (CuratedKnob::RoiOffsetX, self.roi.offset_x.map(|v| v.to_string())),
            (CuratedKnob::RoiOffsetY, self.roi.offset_y.map(|v| v.to_string())),
            (
                CuratedKnob::PacketSizeBytes,
                self.packet_size_bytes.map(|v| v.to_string()),
            ),
            (
                CuratedKnob::InterPacketDelayUs,
                self.inter_packet_delay_us.map(|v| v.to_string()),
            ),
        ];

        candidates
            .into_iter()
            .filter_map(|(knob, value)| value.map(|value| (knob, value)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Roi {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub offset_x: Option<u32>,
    pub offset_y: Option<u32>,
}

/// Faults injected by the sim backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimFaults {
    pub seed: Option<u64>,
    pub jitter_us: Option<u64>,
    pub drop_every_n: Option<u32>,
    pub drop_percent: Option<u32>,
    pub burst_drop: Option<u32>,
    pub timeout_percent: Option<u32>,
    pub incomplete_percent: Option<u32>,
    /// Stream offset at which one disconnect incident fires
    pub disconnect_at_ms: Option<u64>,
    /// Connect attempts that fail after a disconnect
    pub reconnect_failures: Option<u32>,
    /// Raw detail returned by every connect attempt
    pub connect_error: Option<String>,
}

/// Declared pass/fail thresholds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Thresholds {
    pub min_avg_fps: Option<f64>,
    pub max_drop_rate_percent: Option<f64>,
    pub max_inter_frame_interval_p95_us: Option<f64>,
    pub max_inter_frame_jitter_p95_us: Option<f64>,
    pub max_disconnect_count: Option<u64>,
}

impl Thresholds {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebcamHints {
    pub requested_width: Option<u32>,
    pub requested_height: Option<u32>,
    pub requested_fps: Option<f64>,
    pub pixel_format: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconnectSettings {
    /// Reconnect attempts allowed across the whole run
    pub max_attempts: Option<u32>,
}

/// Curated camera knobs reported in config verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CuratedKnob {
    FrameRate,
    Exposure,
    Gain,
    TriggerMode,
    TriggerSource,
    TriggerActivation,
    RoiWidth,
    RoiHeight,
    RoiOffsetX,
    RoiOffsetY,
    PacketSizeBytes,
    InterPacketDelayUs,
}

impl CuratedKnob {
    pub const ALL: [CuratedKnob; 12] = [
        Self::FrameRate,
        Self::Exposure,
        Self::Gain,
        Self::TriggerMode,
        Self::TriggerSource,
        Self::TriggerActivation,
        Self::RoiWidth,
        Self::RoiHeight,
        Self::RoiOffsetX,
        Self::RoiOffsetY,
        Self::PacketSizeBytes,
        Self::InterPacketDelayUs,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::FrameRate => "frame_rate",
            Self::Exposure => "exposure",
            Self::Gain => "gain",
            Self::TriggerMode => "trigger_mode",
            Self::TriggerSource => "trigger_source",
            Self::TriggerActivation => "trigger_activation",
            Self::RoiWidth => "roi_width",
            Self::RoiHeight => "roi_height",
            Self::RoiOffsetX => "roi_offset_x",
            Self::RoiOffsetY => "roi_offset_y",
            Self::PacketSizeBytes => "packet_size_bytes",
            Self::InterPacketDelayUs => "inter_packet_delay_us",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|knob| knob.key() == key)
    }

    /// Packet knobs only exist on GigE transports
    pub fn gige_only(self) -> bool {
        matches!(self, Self::PacketSizeBytes | Self::InterPacketDelayUs)
    }

    fn position(self) -> usize {
        Self::ALL
            .iter()
            .position(|knob| *knob == self)
            .unwrap_or(usize::MAX)
    }
}

impl std::fmt::Display for CuratedKnob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Integral values print without a fractional part
fn knob_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let model = ScenarioModel::default();
        assert_eq!(model.duration(), Duration::from_millis(1000));
        assert_eq!(model.rolling_window(), Duration::from_millis(200));
        assert_eq!(model.backend(), "sim");
        assert_eq!(model.apply_mode(), ApplyMode::BestEffort);
        assert_eq!(model.max_reconnect_attempts(), 3);
        assert_eq!(model.configured_fps(), None);
    }

    #[test]
    fn test_requested_knobs_in_curated_order() {
        let camera = CameraKnobs {
            fps: Some(30.0),
            gain_db: Some(2.5),
            roi: Roi {
                width: Some(640),
                ..Default::default()
            },
            trigger_mode: Some("on".to_string()),
            ..Default::default()
        };
        let knobs = camera.requested();
        let keys: Vec<&str> = knobs.iter().map(|(k, _)| k.key()).collect();
        assert_eq!(keys, vec!["frame_rate", "gain", "trigger_mode", "roi_width"]);
        assert_eq!(knobs[0].1, "30");
        assert_eq!(knobs[1].1, "2.5");
    }

    #[test]
    fn test_webcam_hints_fill_gaps() {
        let model = ScenarioModel {
            camera: CameraKnobs {
                fps: Some(15.0),
                ..Default::default()
            },
            webcam: WebcamHints {
                requested_fps: Some(60.0),
                requested_width: Some(1280),
                ..Default::default()
            },
            ..Default::default()
        };
        let knobs = model.requested_knobs(true);
        assert_eq!(
            knobs,
            vec![
                (CuratedKnob::FrameRate, "15".to_string()),
                (CuratedKnob::RoiWidth, "1280".to_string()),
            ]
        );
        assert_eq!(model.requested_knobs(false).len(), 1);
    }

    #[test]
    fn test_knob_keys_round_trip() {
        for knob in CuratedKnob::ALL {
            assert_eq!(CuratedKnob::from_key(knob.key()), Some(knob));
        }
        assert!(CuratedKnob::PacketSizeBytes.gige_only());
        assert!(!CuratedKnob::Gain.gige_only());
    }
}

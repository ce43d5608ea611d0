//! 仿真后端
//!
//! Deterministic placeholder stream driven by the scenario's `sim_faults`.

use std::collections::BTreeMap;
use std::time::Duration;

use contracts::{
    BackendError, CameraBackend, CaptureClock, CuratedKnob, FrameSample, ParamApplied,
    ScenarioModel, SimFaults, DEFAULT_FPS,
};
use tracing::{debug, info, instrument, warn};

use crate::script::ScriptStep;
use crate::synth::{FrameSynth, Pacing};

pub const DEFAULT_ROI_WIDTH: u32 = 640;
pub const DEFAULT_ROI_HEIGHT: u32 = 480;

const DISCONNECT_DETAIL: &str = "device disconnected during acquisition";
const RECONNECT_FAILURE_DETAIL: &str = "connection lost: simulated device not reachable";

/// 仿真相机
pub struct SimBackend {
    synth: FrameSynth,
    faults: SimFaults,
    roi_width: u32,
    roi_height: u32,
    params: BTreeMap<String, String>,
    connected: bool,
    running: bool,
    /// Stream offset of the one scheduled disconnect, consumed when it fires
    disconnect_at: Option<Duration>,
    disconnect_pending: bool,
    connect_failures_left: u32,
}

impl SimBackend {
    pub fn from_scenario(scenario: &ScenarioModel, clock: CaptureClock, pacing: Pacing) -> Self {
        let fps = scenario.configured_fps().unwrap_or(DEFAULT_FPS);
        let roi_width = scenario
            .camera
            .roi
            .width
            .filter(|w| *w > 0)
            .unwrap_or(DEFAULT_ROI_WIDTH);
        let roi_height = scenario
            .camera
            .roi
            .height
            .filter(|h| *h > 0)
            .unwrap_or(DEFAULT_ROI_HEIGHT);
        let faults = scenario.sim_faults.clone();

        Self {
            synth: FrameSynth::new(clock, pacing, fps, roi_width.saturating_mul(roi_height), faults.clone()),
            disconnect_at: faults.disconnect_at_ms.map(Duration::from_millis),
            faults,
            roi_width,
            roi_height,
            params: BTreeMap::new(),
            connected: false,
            running: false,
            disconnect_pending: false,
            connect_failures_left: 0,
        }
    }

    /// Replay a fixed script; no faults are injected on top
    pub fn scripted(clock: CaptureClock, pacing: Pacing, period: Duration, steps: &[ScriptStep]) -> Self {
        Self {
            synth: FrameSynth::scripted(clock, pacing, period, steps),
            faults: SimFaults::default(),
            roi_width: DEFAULT_ROI_WIDTH,
            roi_height: DEFAULT_ROI_HEIGHT,
            params: BTreeMap::new(),
            connected: false,
            running: false,
            disconnect_at: None,
            disconnect_pending: false,
            connect_failures_left: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn update_frame_bytes(&mut self) {
        self.synth
            .set_frame_bytes(self.roi_width.saturating_mul(self.roi_height));
    }
}

pub(crate) fn parse_positive_f64(key: &str, value: &str) -> Result<f64, BackendError> {
    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
        Ok(_) => Err(BackendError::device(format!(
            "invalid value '{value}' for {key}: must be > 0"
        ))),
        Err(_) => Err(BackendError::device(format!(
            "invalid value '{value}' for {key}: type mismatch"
        ))),
    }
}

pub(crate) fn parse_positive_u32(key: &str, value: &str) -> Result<u32, BackendError> {
    match value.trim().parse::<u32>() {
        Ok(v) if v > 0 => Ok(v),
        Ok(_) => Err(BackendError::device(format!(
            "invalid value '{value}' for {key}: must be > 0"
        ))),
        Err(_) => Err(BackendError::device(format!(
            "invalid value '{value}' for {key}: type mismatch"
        ))),
    }
}

impl CameraBackend for SimBackend {
    fn name(&self) -> &str {
        "sim"
    }

    #[instrument(name = "sim_connect", skip(self))]
    async fn connect(&mut self) -> Result<(), BackendError> {
        if self.connected {
            return Err(BackendError::already_connected());
        }
        if let Some(detail) = self.faults.connect_error.as_deref() {
            warn!(detail, "injected connect error");
            return Err(BackendError::device(detail));
        }
        if self.connect_failures_left > 0 {
            self.connect_failures_left -= 1;
            debug!(left = self.connect_failures_left, "injected reconnect failure");
            return Err(BackendError::device(RECONNECT_FAILURE_DETAIL));
        }
        self.connected = true;
        debug!("sim device connected");
        Ok(())
    }

    async fn start(&mut self) -> Result<(), BackendError> {
        if !self.connected {
            return Err(BackendError::not_connected());
        }
        if self.running {
            return Err(BackendError::already_running());
        }
        self.synth.begin();
        self.running = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), BackendError> {
        self.running = false;
        Ok(())
    }

    fn set_param(&mut self, key: &str, value: &str) -> Result<ParamApplied, BackendError> {
        let knob = CuratedKnob::from_key(key)
            .ok_or_else(|| BackendError::unsupported(key, "unknown parameter"))?;
        if knob.gige_only() {
            return Err(BackendError::unsupported(key, "sim backend has no GigE transport"));
        }

        match knob {
            CuratedKnob::FrameRate => {
                let fps = parse_positive_f64(key, value)?;
                self.synth.set_fps(fps)?;
            }
            CuratedKnob::RoiWidth => {
                self.roi_width = parse_positive_u32(key, value)?;
                self.update_frame_bytes();
            }
            CuratedKnob::RoiHeight => {
                self.roi_height = parse_positive_u32(key, value)?;
                self.update_frame_bytes();
            }
            _ => {}
        }

        self.params.insert(key.to_string(), value.to_string());
        Ok(ParamApplied::exact(key, value))
    }

    fn dump_config(&self) -> BTreeMap<String, String> {
        let mut config = self.params.clone();
        config.insert("backend".into(), "sim".into());
        config.insert("frame_rate".into(), format!("{:.3}", self.synth.fps()));
        config.insert("roi_width".into(), self.roi_width.to_string());
        config.insert("roi_height".into(), self.roi_height.to_string());
        config.insert("seed".into(), self.faults.seed.unwrap_or(0).to_string());
        config
    }

    async fn pull_frames(&mut self, duration: Duration) -> Result<Vec<FrameSample>, BackendError> {
        if self.disconnect_pending {
            self.disconnect_pending = false;
            self.connected = false;
            self.running = false;
            self.connect_failures_left = self.faults.reconnect_failures.unwrap_or(0);
            warn!(detail = DISCONNECT_DETAIL, "injected disconnect");
            return Err(BackendError::device(DISCONNECT_DETAIL));
        }
        if !self.running {
            return Err(BackendError::not_running());
        }

        let start = self.synth.elapsed();
        let end = start + duration;

        let frames = match self.disconnect_at {
            Some(at) if at < end => {
                self.disconnect_at = None;
                self.disconnect_pending = true;
                let frames = self.synth.produce(at.max(start));
                self.synth.skip_to(end);
                info!(at_ms = at.as_millis() as u64, "link down until next pull");
                frames
            }
            _ => self.synth.produce(end),
        };

        self.synth.advance_to(end);
        self.synth.pace().await;
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use contracts::FrameOutcome;
    use std::time::Instant;

    fn clock() -> CaptureClock {
        CaptureClock::anchored(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(), Instant::now())
    }

    fn scenario(faults: SimFaults) -> ScenarioModel {
        let mut scenario = ScenarioModel::default();
        scenario.camera.fps = Some(10.0);
        scenario.sim_faults = faults;
        scenario
    }

    #[tokio::test]
    async fn test_lifecycle_state_errors() {
        let mut sim = SimBackend::from_scenario(&scenario(SimFaults::default()), clock(), Pacing::Virtual);
        let err = sim.start().await.unwrap_err();
        assert!(err.detail().contains("stream is stopped"));
        assert!(sim.pull_frames(Duration::from_millis(100)).await.is_err());

        sim.connect().await.unwrap();
        assert_eq!(sim.connect().await.unwrap_err(), BackendError::already_connected());
        sim.start().await.unwrap();
        assert_eq!(sim.start().await.unwrap_err(), BackendError::already_running());
        sim.stop().await.unwrap();
        sim.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_pull_in_chunks_is_continuous() {
        let mut sim = SimBackend::from_scenario(&scenario(SimFaults::default()), clock(), Pacing::Virtual);
        sim.connect().await.unwrap();
        sim.start().await.unwrap();
        let mut frames = sim.pull_frames(Duration::from_millis(250)).await.unwrap();
        frames.extend(sim.pull_frames(Duration::from_millis(750)).await.unwrap());
        assert_eq!(frames.len(), 10);
        let ids: Vec<u64> = frames.iter().map(|f| f.frame_id).collect();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
        assert!(frames.iter().all(|f| f.size_bytes == 640 * 480));
    }

    #[tokio::test]
    async fn test_disconnect_then_reconnect_failures() {
        let faults = SimFaults {
            disconnect_at_ms: Some(300),
            reconnect_failures: Some(1),
            ..Default::default()
        };
        let mut sim = SimBackend::from_scenario(&scenario(faults), clock(), Pacing::Virtual);
        sim.connect().await.unwrap();
        sim.start().await.unwrap();

        let frames = sim.pull_frames(Duration::from_millis(500)).await.unwrap();
        assert_eq!(frames.len(), 3);

        let err = sim.pull_frames(Duration::from_millis(500)).await.unwrap_err();
        assert_eq!(err.detail(), DISCONNECT_DETAIL);
        assert!(!sim.is_connected());

        assert!(sim.connect().await.unwrap_err().detail().contains("connection lost"));
        sim.connect().await.unwrap();
        sim.start().await.unwrap();

        let resumed = sim.pull_frames(Duration::from_millis(500)).await.unwrap();
        assert_eq!(resumed.len(), 5);
        assert_eq!(resumed[0].frame_id, 4);
        assert_eq!(resumed[0].timestamp.timestamp_millis(), 1_700_000_000_500);
    }

    #[tokio::test]
    async fn test_connect_error_fails_every_time() {
        let faults = SimFaults {
            connect_error: Some("camera busy".into()),
            ..Default::default()
        };
        let mut sim = SimBackend::from_scenario(&scenario(faults), clock(), Pacing::Virtual);
        for _ in 0..3 {
            assert_eq!(sim.connect().await.unwrap_err().detail(), "camera busy");
        }
    }

    #[test]
    fn test_set_param() {
        let mut sim = SimBackend::from_scenario(&scenario(SimFaults::default()), clock(), Pacing::Virtual);
        assert!(!sim.set_param("frame_rate", "25").unwrap().is_adjusted());
        assert_eq!(sim.dump_config()["frame_rate"], "25.000");
        sim.set_param("roi_width", "100").unwrap();
        assert_eq!(sim.dump_config()["roi_width"], "100");
        assert!(matches!(
            sim.set_param("packet_size_bytes", "1500"),
            Err(BackendError::Unsupported { .. })
        ));
        assert!(sim.set_param("frame_rate", "fast").unwrap_err().detail().contains("type mismatch"));
    }

    #[tokio::test]
    async fn test_tiny_fps_does_not_take_down_the_stream() {
        let mut scenario = scenario(SimFaults::default());
        scenario.camera.fps = Some(1e-20);
        let mut sim = SimBackend::from_scenario(&scenario, clock(), Pacing::Virtual);
        assert_eq!(sim.dump_config()["frame_rate"], "30.000");

        let err = sim.set_param("frame_rate", "1e-20").unwrap_err();
        assert!(err.detail().contains("invalid frame rate"), "{err}");

        sim.connect().await.unwrap();
        sim.start().await.unwrap();
        let frames = sim.pull_frames(Duration::from_millis(100)).await.unwrap();
        assert!((3..=4).contains(&frames.len()), "{}", frames.len());
    }

    #[tokio::test]
    async fn test_scripted_replay() {
        let steps = [ScriptStep::received(4000), ScriptStep::timeout()];
        let mut sim = SimBackend::scripted(clock(), Pacing::Virtual, Duration::from_millis(100), &steps);
        sim.connect().await.unwrap();
        sim.start().await.unwrap();
        let frames = sim.pull_frames(Duration::from_secs(1)).await.unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].outcome, FrameOutcome::Timeout);
    }
}

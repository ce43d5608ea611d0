//! Webcam 后端
//!
//! Only frame rate and frame size are negotiable; everything else is
//! reported unsupported.

use std::collections::BTreeMap;
use std::time::Duration;

use contracts::{
    BackendError, CameraBackend, CaptureClock, CuratedKnob, FrameSample, ParamApplied, SimFaults,
    WebcamDevice,
};
use tracing::{debug, instrument};

use crate::sim::{parse_positive_f64, parse_positive_u32, DEFAULT_ROI_HEIGHT, DEFAULT_ROI_WIDTH};
use crate::synth::{FrameSynth, Pacing};

const MAX_WEBCAM_FPS: f64 = 120.0;

pub struct WebcamBackend {
    device: WebcamDevice,
    synth: FrameSynth,
    width: u32,
    height: u32,
    connected: bool,
    running: bool,
}

impl WebcamBackend {
    pub fn new(device: WebcamDevice, clock: CaptureClock, pacing: Pacing) -> Self {
        Self {
            device,
            synth: FrameSynth::new(
                clock,
                pacing,
                30.0,
                DEFAULT_ROI_WIDTH * DEFAULT_ROI_HEIGHT,
                SimFaults::default(),
            ),
            width: DEFAULT_ROI_WIDTH,
            height: DEFAULT_ROI_HEIGHT,
            connected: false,
            running: false,
        }
    }

    pub fn device(&self) -> &WebcamDevice {
        &self.device
    }
}

impl CameraBackend for WebcamBackend {
    fn name(&self) -> &str {
        "webcam"
    }

    #[instrument(name = "webcam_connect", skip(self), fields(device_id = %self.device.device_id))]
    async fn connect(&mut self) -> Result<(), BackendError> {
        if self.connected {
            return Err(BackendError::already_connected());
        }
        self.connected = true;
        debug!(name = %self.device.friendly_name, "webcam opened");
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
        match CuratedKnob::from_key(key) {
            Some(CuratedKnob::FrameRate) => {
                let requested = parse_positive_f64(key, value)?;
                let applied = requested.min(MAX_WEBCAM_FPS);
                self.synth.set_fps(applied)?;
                let mut result = ParamApplied::exact(key, value);
                if applied != requested {
                    result.applied_value = format!("{applied}");
                    result.adjusted_reason = Some(format!("webcam frame rate capped at {MAX_WEBCAM_FPS}"));
                }
                Ok(result)
            }
            Some(CuratedKnob::RoiWidth) => {
                self.width = parse_positive_u32(key, value)?;
                self.synth.set_frame_bytes(self.width.saturating_mul(self.height));
                Ok(ParamApplied::exact(key, value))
            }
            Some(CuratedKnob::RoiHeight) => {
                self.height = parse_positive_u32(key, value)?;
                self.synth.set_frame_bytes(self.width.saturating_mul(self.height));
                Ok(ParamApplied::exact(key, value))
            }
            _ => Err(BackendError::unsupported(key, "not exposed by webcam capture")),
        }
    }

    fn dump_config(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("backend".to_string(), "webcam".to_string()),
            ("device.id".to_string(), self.device.device_id.clone()),
            ("device.name".to_string(), self.device.friendly_name.clone()),
            ("frame_rate".to_string(), format!("{:.3}", self.synth.fps())),
            ("roi_width".to_string(), self.width.to_string()),
            ("roi_height".to_string(), self.height.to_string()),
        ])
    }

    async fn pull_frames(&mut self, duration: Duration) -> Result<Vec<FrameSample>, BackendError> {
        if !self.running {
            return Err(BackendError::not_running());
        }
        let end = self.synth.elapsed() + duration;
        let frames = self.synth.produce(end);
        self.synth.advance_to(end);
        self.synth.pace().await;
        Ok(frames)
    }
}

//! 工业相机 SDK 适配桩
//!
//! Stands in for the vendor adapter: maps curated knobs to GenICam-style nodes,
//! clamps and snaps values the way a camera would, and streams fault-free
//! placeholder frames.

use std::collections::BTreeMap;
use std::time::Duration;

use contracts::{
    BackendError, CameraBackend, CaptureClock, CuratedKnob, DeviceInfo, FrameSample, ParamApplied,
    SimFaults,
};
use tracing::{debug, info, instrument, warn};

use crate::sdk_context::{SdkContext, SdkContextGuard};
use crate::synth::{FrameSynth, Pacing};

#[derive(Debug, Clone, Copy)]
enum NodeRange {
    Float { min: f64, max: f64 },
    Int { min: i64, max: i64, step: i64 },
    Enum(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
struct NodeSpec {
    knob: CuratedKnob,
    node: &'static str,
    range: NodeRange,
    default: &'static str,
}

const NODE_MAP: [NodeSpec; 12] = [
    NodeSpec {
        knob: CuratedKnob::FrameRate,
        node: "AcquisitionFrameRate",
        range: NodeRange::Float { min: 1.0, max: 240.0 },
        default: "30",
    },
    NodeSpec {
        knob: CuratedKnob::Exposure,
        node: "ExposureTime",
        range: NodeRange::Float { min: 10.0, max: 1_000_000.0 },
        default: "10000",
    },
    NodeSpec {
        knob: CuratedKnob::Gain,
        node: "Gain",
        range: NodeRange::Float { min: 0.0, max: 48.0 },
        default: "0",
    },
    NodeSpec {
        knob: CuratedKnob::TriggerMode,
        node: "TriggerMode",
        range: NodeRange::Enum(&["Off", "On"]),
        default: "Off",
    },
    NodeSpec {
        knob: CuratedKnob::TriggerSource,
        node: "TriggerSource",
        range: NodeRange::Enum(&["Software", "Line0", "Line1", "Line2"]),
        default: "Software",
    },
    NodeSpec {
        knob: CuratedKnob::TriggerActivation,
        node: "TriggerActivation",
        range: NodeRange::Enum(&["RisingEdge", "FallingEdge"]),
        default: "RisingEdge",
    },
    NodeSpec {
        knob: CuratedKnob::RoiWidth,
        node: "Width",
        range: NodeRange::Int { min: 8, max: 4096, step: 8 },
        default: "640",
    },
    NodeSpec {
        knob: CuratedKnob::RoiHeight,
        node: "Height",
        range: NodeRange::Int { min: 4, max: 3072, step: 4 },
        default: "480",
    },
    NodeSpec {
        knob: CuratedKnob::RoiOffsetX,
        node: "OffsetX",
        range: NodeRange::Int { min: 0, max: 4088, step: 8 },
        default: "0",
    },
    NodeSpec {
        knob: CuratedKnob::RoiOffsetY,
        node: "OffsetY",
        range: NodeRange::Int { min: 0, max: 3068, step: 4 },
        default: "0",
    },
    NodeSpec {
        knob: CuratedKnob::PacketSizeBytes,
        node: "GevSCPSPacketSize",
        range: NodeRange::Int { min: 576, max: 9000, step: 1 },
        default: "1500",
    },
    NodeSpec {
        knob: CuratedKnob::InterPacketDelayUs,
        node: "GevSCPD",
        range: NodeRange::Int { min: 0, max: 100_000, step: 1 },
        default: "0",
    },
];

fn node_spec(knob: CuratedKnob) -> Option<&'static NodeSpec> {
    NODE_MAP.iter().find(|spec| spec.knob == knob)
}

/// Vendor node name a curated knob maps to
pub fn node_name(knob: CuratedKnob) -> Option<&'static str> {
    node_spec(knob).map(|spec| spec.node)
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn type_mismatch(key: &str, value: &str, expected: &str) -> BackendError {
    BackendError::device(format!(
        "invalid value '{value}' for {key}: type mismatch (expected {expected})"
    ))
}

/// (applied, adjusted_reason)
fn coerce(key: &str, value: &str, range: NodeRange) -> Result<(String, Option<String>), BackendError> {
    let trimmed = value.trim();
    match range {
        NodeRange::Float { min, max } => {
            let requested = trimmed
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| type_mismatch(key, value, "number"))?;
            let applied = requested.clamp(min, max);
            let reason = (applied != requested).then(|| {
                format!(
                    "clamped to range [{}, {}]",
                    format_number(min),
                    format_number(max)
                )
            });
            Ok((format_number(applied), reason))
        }
        NodeRange::Int { min, max, step } => {
            let requested = trimmed
                .parse::<i64>()
                .map_err(|_| type_mismatch(key, value, "integer"))?;
            let clamped = requested.clamp(min, max);
            let snapped = clamped - clamped.rem_euclid(step);
            let reason = if clamped != requested {
                Some(format!("clamped to range [{min}, {max}]"))
            } else if snapped != clamped {
                Some(format!("snapped down to a multiple of {step}"))
            } else {
                None
            };
            Ok((snapped.to_string(), reason))
        }
        NodeRange::Enum(choices) => choices
            .iter()
            .find(|choice| choice.eq_ignore_ascii_case(trimmed))
            .map(|choice| {
                let reason = (*choice != trimmed).then(|| format!("normalized to '{choice}'"));
                (choice.to_string(), reason)
            })
            .ok_or_else(|| {
                BackendError::device(format!(
                    "invalid value '{value}' for {key}: must be one of {}",
                    choices.join(", ")
                ))
            }),
    }
}

/// 相机适配桩
pub struct RealStubBackend {
    device: DeviceInfo,
    sdk: SdkContext,
    guard: Option<SdkContextGuard>,
    nodes: BTreeMap<&'static str, String>,
    synth: FrameSynth,
    connected: bool,
    running: bool,
}

impl RealStubBackend {
    pub fn new(device: DeviceInfo, clock: CaptureClock, pacing: Pacing, sdk: SdkContext) -> Self {
        let nodes = NODE_MAP
            .iter()
            .filter(|spec| device.is_gige() || !spec.knob.gige_only())
            .map(|spec| (spec.node, spec.default.to_string()))
            .collect();
        let mut backend = Self {
            device,
            sdk,
            guard: None,
            nodes,
            synth: FrameSynth::new(clock, pacing, 30.0, 0, SimFaults::default()),
            connected: false,
            running: false,
        };
        backend.sync_stream_shape();
        backend
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    fn node_u32(&self, node: &str) -> u32 {
        self.nodes
            .get(node)
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0)
    }

    fn sync_stream_shape(&mut self) {
        let fps = self
            .nodes
            .get("AcquisitionFrameRate")
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| *v > 0.0)
            .unwrap_or(30.0);
        if let Err(e) = self.synth.set_fps(fps) {
            warn!(fps, error = %e, "frame rate node unusable, keeping the previous period");
        }
        let bytes = self.node_u32("Width").saturating_mul(self.node_u32("Height"));
        self.synth.set_frame_bytes(bytes);
    }
}

impl CameraBackend for RealStubBackend {
    fn name(&self) -> &str {
        "real_stub"
    }

    #[instrument(name = "real_stub_connect", skip(self), fields(serial = %self.device.serial))]
    async fn connect(&mut self) -> Result<(), BackendError> {
        if self.connected {
            return Err(BackendError::already_connected());
        }
        if self.guard.is_none() {
            self.guard = Some(self.sdk.acquire());
        }
        self.connected = true;
        info!(model = %self.device.model, transport = %self.device.transport, "device opened");
        Ok(())
    }

    async fn start(&mut self) -> Result<(), BackendError> {
        if !self.connected {
            return Err(BackendError::not_connected());
        }
        if self.running {
            return Err(BackendError::already_running());
        }
        self.sync_stream_shape();
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
            .ok_or_else(|| BackendError::unsupported(key, "no node mapping for parameter"))?;
        let spec = node_spec(knob)
            .ok_or_else(|| BackendError::unsupported(key, "no node mapping for parameter"))?;
        if knob.gige_only() && !self.device.is_gige() {
            return Err(BackendError::unsupported(
                key,
                format!("{} requires a GigE transport (device transport: {})", spec.node, self.device.transport),
            ));
        }
        if self.running {
            return Err(BackendError::already_running());
        }

        let (applied, adjusted_reason) = coerce(key, value, spec.range)?;
        debug!(key, node = spec.node, requested = value, applied = %applied, "node written");
        self.nodes.insert(spec.node, applied.clone());

        Ok(ParamApplied {
            generic_key: key.to_string(),
            node_name: Some(spec.node.to_string()),
            requested_value: value.to_string(),
            applied_value: applied,
            adjusted_reason,
        })
    }

    fn dump_config(&self) -> BTreeMap<String, String> {
        let mut config: BTreeMap<String, String> = NODE_MAP
            .iter()
            .filter_map(|spec| {
                self.nodes
                    .get(spec.node)
                    .map(|value| (spec.knob.key().to_string(), value.clone()))
            })
            .collect();
        config.insert("backend".into(), "real_stub".into());
        config.insert("device.model".into(), self.device.model.clone());
        config.insert("device.serial".into(), self.device.serial.clone());
        config.insert("device.transport".into(), self.device.transport.clone());
        config
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn device(transport: &str) -> DeviceInfo {
        DeviceInfo {
            model: "Blackfly S".into(),
            serial: "SN1".into(),
            user_id: "cam-a".into(),
            transport: transport.into(),
            ip: None,
            firmware: None,
        }
    }

    fn backend(transport: &str, sdk: &SdkContext) -> RealStubBackend {
        RealStubBackend::new(device(transport), CaptureClock::anchored(chrono::Utc::now(), Instant::now()), Pacing::Virtual, sdk.clone())
    }

    #[test]
    fn test_exact_and_clamped_values() {
        let sdk = SdkContext::new();
        let mut cam = backend("GigE", &sdk);

        let exact = cam.set_param("exposure", "5000").unwrap();
        assert_eq!(exact.node_name.as_deref(), Some("ExposureTime"));
        assert!(!exact.is_adjusted());

        let clamped = cam.set_param("gain", "60").unwrap();
        assert_eq!(clamped.applied_value, "48");
        assert_eq!(clamped.adjusted_reason.as_deref(), Some("clamped to range [0, 48]"));

        let snapped = cam.set_param("roi_width", "1001").unwrap();
        assert_eq!(snapped.applied_value, "1000");
        assert!(snapped.adjusted_reason.unwrap().contains("multiple of 8"));

        let trigger = cam.set_param("trigger_mode", "on").unwrap();
        assert_eq!(trigger.applied_value, "On");

        assert_eq!(cam.dump_config()["gain"], "48");
    }

    #[test]
    fn test_invalid_values() {
        let sdk = SdkContext::new();
        let mut cam = backend("GigE", &sdk);
        assert!(cam.set_param("gain", "loud").unwrap_err().detail().contains("type mismatch"));
        assert!(cam.set_param("trigger_source", "Line9").unwrap_err().detail().contains("must be one of"));
    }

    #[test]
    fn test_packet_knobs_need_gige() {
        let sdk = SdkContext::new();
        let mut usb = backend("USB3", &sdk);
        let err = usb.set_param("packet_size_bytes", "9000").unwrap_err();
        assert!(matches!(err, BackendError::Unsupported { .. }));
        assert!(!usb.dump_config().contains_key("packet_size_bytes"));

        let mut gige = backend("GigE", &sdk);
        assert_eq!(gige.set_param("packet_size_bytes", "9000").unwrap().applied_value, "9000");
    }

    #[tokio::test]
    async fn test_sdk_context_held_until_drop() {
        let sdk = SdkContext::new();
        let mut cam = backend("USB3", &sdk);
        cam.connect().await.unwrap();
        cam.start().await.unwrap();
        let frames = cam.pull_frames(Duration::from_millis(90)).await.unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].size_bytes, 640 * 480);
        assert_eq!(sdk.ref_count(), 1);
        drop(cam);
        assert_eq!(sdk.ref_count(), 0);
        assert_eq!(sdk.shutdown_count(), 1);
    }
}

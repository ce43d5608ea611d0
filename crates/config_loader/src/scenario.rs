//! 运行时场景提取
//!
//! Lenient: unknown keys are ignored and ill-typed values are treated as unset.
//! The validator module is the strict gate.

use serde_json::{Map, Value};

use contracts::{
    ApplyMode, CameraKnobs, ReconnectSettings, Roi, ScenarioModel, SimFaults, Thresholds,
    WebcamHints,
};

/// Build the runtime model from a parsed document
///
/// A non-object root yields an all-default model.
pub fn extract(root: &Value) -> ScenarioModel {
    let Some(obj) = root.as_object() else {
        return ScenarioModel::default();
    };

    ScenarioModel {
        scenario_id: string(obj, "scenario_id"),
        description: string(obj, "description"),
        backend: string(obj, "backend"),
        duration_ms: uint(obj, "duration_ms"),
        rolling_window_ms: uint(obj, "rolling_window_ms"),
        soak_mode: obj.get("soak_mode").and_then(Value::as_bool),
        apply_mode: string(obj, "apply_mode").and_then(|mode| ApplyMode::parse(&mode)),
        device_selector: string(obj, "device_selector"),
        camera: section(obj, "camera").map(camera).unwrap_or_default(),
        sim_faults: section(obj, "sim_faults").map(sim_faults).unwrap_or_default(),
        thresholds: section(obj, "thresholds").map(thresholds).unwrap_or_default(),
        webcam: section(obj, "webcam").map(webcam).unwrap_or_default(),
        reconnect: ReconnectSettings {
            max_attempts: section(obj, "reconnect").and_then(|r| uint32(r, "max_attempts")),
        },
    }
}

fn camera(obj: &Map<String, Value>) -> CameraKnobs {
    CameraKnobs {
        fps: number(obj, "fps"),
        exposure_us: number(obj, "exposure_us"),
        gain_db: number(obj, "gain_db"),
        trigger_mode: string(obj, "trigger_mode"),
        trigger_source: string(obj, "trigger_source"),
        trigger_activation: string(obj, "trigger_activation"),
        roi: section(obj, "roi")
            .map(|roi| Roi {
                width: uint32(roi, "width"),
                height: uint32(roi, "height"),
                offset_x: uint32(roi, "offset_x"),
                offset_y: uint32(roi, "offset_y"),
            })
            .unwrap_or_default(),
        packet_size_bytes: uint32(obj, "packet_size_bytes"),
        inter_packet_delay_us: uint32(obj, "inter_packet_delay_us"),
    }
}

fn sim_faults(obj: &Map<String, Value>) -> SimFaults {
    SimFaults {
        seed: uint(obj, "seed"),
        jitter_us: uint(obj, "jitter_us"),
        drop_every_n: uint32(obj, "drop_every_n"),
        drop_percent: uint32(obj, "drop_percent"),
        burst_drop: uint32(obj, "burst_drop"),
        timeout_percent: uint32(obj, "timeout_percent"),
        incomplete_percent: uint32(obj, "incomplete_percent"),
        disconnect_at_ms: uint(obj, "disconnect_at_ms"),
        reconnect_failures: uint32(obj, "reconnect_failures"),
        connect_error: string(obj, "connect_error"),
    }
}

fn thresholds(obj: &Map<String, Value>) -> Thresholds {
    Thresholds {
        min_avg_fps: number(obj, "min_avg_fps"),
        max_drop_rate_percent: number(obj, "max_drop_rate_percent"),
        max_inter_frame_interval_p95_us: number(obj, "max_inter_frame_interval_p95_us"),
        max_inter_frame_jitter_p95_us: number(obj, "max_inter_frame_jitter_p95_us"),
        max_disconnect_count: uint(obj, "max_disconnect_count"),
    }
}

fn webcam(obj: &Map<String, Value>) -> WebcamHints {
    WebcamHints {
        requested_width: uint32(obj, "requested_width"),
        requested_height: uint32(obj, "requested_height"),
        requested_fps: number(obj, "requested_fps"),
        pixel_format: string(obj, "pixel_format"),
    }
}

fn section<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    obj.get(key).and_then(Value::as_object)
}

fn string(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn number(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    obj.get(key).and_then(Value::as_f64).filter(|v| v.is_finite())
}

/// Non-negative integer; integral floats such as `30.0` are accepted
fn uint(obj: &Map<String, Value>, key: &str) -> Option<u64> {
    let value = obj.get(key)?;
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.fract() == 0.0 && *v >= 0.0 && *v <= u64::MAX as f64)
            .map(|v| v as u64)
    })
}

fn uint32(obj: &Map<String, Value>, key: &str) -> Option<u32> {
    uint(obj, key).and_then(|v| u32::try_from(v).ok())
}

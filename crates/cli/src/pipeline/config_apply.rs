//! 参数下发与校验
//!
//! Pushes the scenario's curated knobs through `set_param`, emits one config
//! event per outcome and builds the `config_verify.json` model.

use backends::{node_name, BackendKind};
use chrono::{DateTime, Utc};
use bundle::{ConfigVerify, EventEmitter, KnobStatus};
use contracts::{
    ApplyMode, BackendError, CameraBackend, ConfigStatusEvent, CuratedKnob, ResolvedDevice,
    ScenarioModel,
};
use tracing::{info, instrument, warn};

use crate::error::Result;

fn node_for(kind: BackendKind, knob: CuratedKnob) -> Option<String> {
    match kind {
        BackendKind::RealStub | BackendKind::Real => node_name(knob).map(str::to_string),
        BackendKind::Sim | BackendKind::Webcam => None,
    }
}

/// Apply every requested knob
///
/// Unsupported knobs are recorded, never fatal here; strict mode is enforced
/// by the caller through [`strict_violation`].
#[instrument(
    name = "config_apply",
    skip(backend, scenario, device, emitter),
    fields(backend = %kind, apply_mode = scenario.apply_mode().as_str())
)]
pub fn apply_config<B: CameraBackend>(
    backend: &mut B,
    scenario: &ScenarioModel,
    kind: BackendKind,
    device: Option<&ResolvedDevice>,
    emitter: &mut EventEmitter,
    ts: DateTime<Utc>,
) -> Result<ConfigVerify> {
    let apply_mode = scenario.apply_mode();
    let mut verify = ConfigVerify::new(kind.as_str(), apply_mode, device.cloned());
    let mut exact = Vec::new();

    for (knob, value) in scenario.requested_knobs(kind == BackendKind::Webcam) {
        match backend.set_param(knob.key(), &value) {
            Ok(applied) if applied.is_adjusted() => {
                let reason = applied.adjusted_reason.clone().unwrap_or_default();
                info!(
                    knob = knob.key(),
                    requested = %applied.requested_value,
                    applied = %applied.applied_value,
                    reason = %reason,
                    "config adjusted"
                );
                emitter.emit_typed(
                    ts,
                    &ConfigStatusEvent::Adjusted {
                        apply_mode,
                        generic_key: knob.key().to_string(),
                        requested_value: applied.requested_value.clone(),
                        applied_value: applied.applied_value.clone(),
                        reason,
                        node_name: applied.node_name.clone(),
                    },
                )?;
                verify.record_applied(knob, &applied);
            }
            Ok(applied) => {
                exact.push((knob.key().to_string(), applied.applied_value.clone()));
                verify.record_applied(knob, &applied);
            }
            Err(err) => {
                let reason = match err {
                    BackendError::Unsupported { reason, .. } => reason,
                    other => other.detail(),
                };
                let node = node_for(kind, knob);
                warn!(knob = knob.key(), requested = %value, reason = %reason, "config unsupported");
                emitter.emit_typed(
                    ts,
                    &ConfigStatusEvent::Unsupported {
                        apply_mode,
                        generic_key: knob.key().to_string(),
                        requested_value: value.clone(),
                        reason: reason.clone(),
                        node_name: node.clone(),
                    },
                )?;
                verify.record_unsupported(knob, node, value, reason);
            }
        }
    }

    if !exact.is_empty() {
        emitter.emit_typed(
            ts,
            &ConfigStatusEvent::Applied {
                apply_mode,
                applied_params: exact,
            },
        )?;
    }

    let readback = backend.dump_config();
    verify.finish(|knob| (node_for(kind, knob), readback.get(knob.key()).cloned()));

    info!(
        applied = verify.applied_count,
        adjusted = verify.adjusted_count,
        unsupported = verify.unsupported_count,
        "config verification ready"
    );
    Ok(verify)
}

/// Raw failure detail when strict mode forbids the verification result
pub fn strict_violation(verify: &ConfigVerify) -> Option<String> {
    if verify.apply_mode != ApplyMode::Strict || !verify.has_unsupported() {
        return None;
    }
    let keys: Vec<&str> = verify
        .knobs
        .iter()
        .filter(|k| k.status == KnobStatus::Unsupported)
        .map(|k| k.key.key())
        .collect();
    Some(format!(
        "invalid config under strict apply_mode: unsupported {}",
        keys.join(", ")
    ))
}

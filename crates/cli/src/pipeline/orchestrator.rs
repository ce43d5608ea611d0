//! Run orchestrator - drives one scenario run into a sealed evidence bundle.
//!
//! Order of work:
//! 1. load + validate the scenario, resolve the backend kind
//! 2. create `<out>/<run_id>/`, write `run.json`, `scenario.json`, `hostprobe.json`
//! 3. resolve the device, connect, apply config (real_stub / webcam), start
//! 4. pull frames in rolling-window chunks, reconnecting on disconnects
//! 5. stop, compute metrics, write the remaining artifacts, manifest and zip
//!
//! Failures before step 2 are returned as errors. Once the bundle directory
//! exists every run ends with a sealed bundle; the failure travels in
//! [`RunOutcome::failure`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use backends::{Backend, BackendFactory, BackendKind, Pacing, REAL_DISABLED_REASON};
use bundle::{
    write_bundle_zip, write_config_report, write_config_verify, write_json_atomic,
    write_manifest, write_metrics_csv, write_metrics_json, write_run_json, write_scenario_copy,
    write_summary, BundleError, BundleRegistry, EventEmitter, RunInfo, RunStatus, RunSummary,
    HOST_SNAPSHOT_FILE, SCHEMA_VERSION,
};
use chrono::{DateTime, Utc};
use config_loader::{
    parse_device_selector, LoadedScenario, ScenarioLoader, SelectorFlavor, KNOWN_BACKENDS,
};
use contracts::{
    BackendError, CameraBackend, CaptureClock, DeviceDisconnectedEvent, DeviceSelector,
    FpsReport, FrameOutcome, FrameOutcomeEvent, FrameSample, NoticeEvent, ResolvedDevice,
    RunStartedEvent, StreamStartedEvent, StreamStoppedEvent, TransportAnomalyEvent, TypedEvent,
};
use lifecycle::{
    classify, execute_reconnect, is_likely_disconnect, remaining, StreamEvent, StreamState,
    StreamStateMachine, RECONNECT_EXHAUSTED,
};
use metrics_engine::{compute_fps_report, detect_anomalies, evaluate_thresholds, SessionWindow};
use rand::Rng;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::config_apply::{apply_config, strict_violation};
use crate::error::{CliError, Result};
use crate::host::{HostSnapshot, Redactor};

/// Options for one `run` invocation
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub scenario_path: PathBuf,
    /// Parent directory; the bundle lands in `<out_root>/<run_id>/`
    pub out_root: PathBuf,
    /// Overrides the scenario's `device_selector`
    pub device: Option<String>,
    /// Overrides the scenario's `backend`
    pub backend: Option<String>,
    pub redact: bool,
    pub zip: bool,
}

impl RunOptions {
    pub fn new(scenario_path: impl Into<PathBuf>, out_root: impl Into<PathBuf>) -> Self {
        Self {
            scenario_path: scenario_path.into(),
            out_root: out_root.into(),
            device: None,
            backend: None,
            redact: false,
            zip: true,
        }
    }
}

/// Result of a run whose bundle was created
#[derive(Debug)]
pub struct RunOutcome {
    pub run: RunInfo,
    pub bundle_dir: PathBuf,
    pub zip_path: Option<PathBuf>,
    pub report: Option<FpsReport>,
    pub anomalies: Vec<String>,
    pub threshold_failures: Vec<String>,
    pub failure: Option<CliError>,
}

impl RunOutcome {
    pub fn run_id(&self) -> &str {
        &self.run.run_id
    }

    /// Collapse into the process result
    ///
    /// Threshold violations fail the run unless explicitly allowed.
    pub fn into_result(mut self, allow_threshold_violations: bool) -> Result<Self> {
        if let Some(failure) = self.failure.take() {
            return Err(failure);
        }
        if !allow_threshold_violations {
            if let Some(first) = self.threshold_failures.first() {
                return Err(CliError::ThresholdsViolated {
                    count: self.threshold_failures.len(),
                    first: first.clone(),
                });
            }
        }
        Ok(self)
    }
}

/// Cooperative stop request, raised from the signal handler
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run orchestrator
pub struct Orchestrator {
    factory: BackendFactory,
    clock: Option<CaptureClock>,
    stop: StopFlag,
}

impl Orchestrator {
    pub fn new(factory: BackendFactory) -> Self {
        Self {
            factory,
            clock: None,
            stop: StopFlag::new(),
        }
    }

    /// Pin the capture clock (deterministic tests); otherwise anchored per run
    pub fn with_clock(mut self, clock: CaptureClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Execute one scenario run
    ///
    /// # Errors
    /// Scenario invalid, backend not available, invalid device selector or a
    /// failure to create the bundle directory. Later failures are reported in
    /// the returned [`RunOutcome`].
    pub async fn run(&self, options: &RunOptions) -> Result<RunOutcome> {
        let scenario = ScenarioLoader::load_validated(&options.scenario_path)?;

        let backend_name = options
            .backend
            .clone()
            .unwrap_or_else(|| scenario.model.backend().to_string());
        let kind = BackendKind::parse(&backend_name).ok_or_else(|| {
            CliError::scenario_invalid(format!(
                "unknown backend '{backend_name}', expected one of {}",
                KNOWN_BACKENDS.join(", ")
            ))
        })?;
        if kind == BackendKind::Real {
            return Err(CliError::backend_not_available(kind.as_str(), REAL_DISABLED_REASON));
        }

        let selector = parse_selector(
            kind,
            options
                .device
                .as_deref()
                .or(scenario.model.device_selector.as_deref()),
        )?;

        let clock = self.clock.unwrap_or_else(CaptureClock::new);
        let created_at = clock.now_wall();
        let run_id = new_run_id(created_at);
        let bundle_dir = options.out_root.join(&run_id);
        std::fs::create_dir_all(&bundle_dir)
            .map_err(|e| BundleError::write(&bundle_dir, e.to_string()))?;

        let model = &scenario.model;
        let info = RunInfo {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: run_id.clone(),
            scenario_id: model.scenario_id().to_string(),
            scenario_path: options.scenario_path.display().to_string(),
            backend: kind.as_str().to_string(),
            seed: model.seed(),
            duration_ms: duration_ms(model.duration()),
            rolling_window_ms: duration_ms(model.rolling_window()),
            out_dir: bundle_dir.display().to_string(),
            created_at_utc: created_at,
            stream_started_at_utc: None,
            finished_at_utc: None,
            status: RunStatus::Running,
            error: None,
            device: None,
            disconnect_count: 0,
            reconnect_attempts_used: 0,
        };

        let span = info_span!("run", run_id = %run_id, backend = kind.as_str());
        let run = RunContext {
            factory: &self.factory,
            stop: &self.stop,
            options,
            emitter: EventEmitter::for_bundle(&bundle_dir),
            scenario,
            kind,
            selector,
            clock,
            bundle_dir,
            info,
        };
        run.execute().instrument(span).await
    }
}

fn parse_selector(kind: BackendKind, text: Option<&str>) -> Result<Option<DeviceSelector>> {
    let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
        return Ok(None);
    };
    let flavor = match kind {
        BackendKind::Webcam => SelectorFlavor::Webcam,
        BackendKind::Real | BackendKind::RealStub => SelectorFlavor::Real,
        BackendKind::Sim => {
            warn!(selector = text, "device selector ignored by the sim backend");
            return Ok(None);
        }
    };
    Ok(Some(parse_device_selector(text, flavor)?))
}

/// `run-<epoch_ms>-<6 hex>`
fn new_run_id(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::rng().random_range(0..0x0100_0000);
    format!("run-{}-{suffix:06x}", now.timestamp_millis())
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn backend_failure(kind: BackendKind, operation: &str, err: BackendError) -> CliError {
    match err {
        BackendError::NotAvailable { reason } => CliError::backend_not_available(kind.as_str(), reason),
        other => CliError::connect_failed(operation, &other.detail()),
    }
}

fn transition(machine: &mut StreamStateMachine, event: StreamEvent) -> Result<()> {
    machine
        .apply(event)
        .map(|_| ())
        .map_err(|e| CliError::run_failed(e.to_string()))
}

/// Frames and counters gathered while streaming
#[derive(Debug, Default)]
struct StreamProgress {
    samples: Vec<FrameSample>,
    streamed: Duration,
    /// Wall time the session window starts at
    origin: Option<DateTime<Utc>>,
    interrupted: bool,
    disconnects: u64,
    attempts_used: u32,
}

impl StreamProgress {
    fn stop_reason(&self, failed: bool) -> &'static str {
        if failed {
            "failed"
        } else if self.interrupted {
            "interrupted"
        } else {
            "completed"
        }
    }
}

/// State of one run in flight
struct RunContext<'a> {
    factory: &'a BackendFactory,
    stop: &'a StopFlag,
    options: &'a RunOptions,
    emitter: EventEmitter,
    scenario: LoadedScenario,
    kind: BackendKind,
    selector: Option<DeviceSelector>,
    clock: CaptureClock,
    bundle_dir: PathBuf,
    info: RunInfo,
}

impl RunContext<'_> {
    async fn execute(mut self) -> Result<RunOutcome> {
        info!(
            scenario_id = %self.info.scenario_id,
            bundle_dir = %self.bundle_dir.display(),
            "run started"
        );
        self.prepare_bundle()?;

        let mut progress = StreamProgress::default();
        let failure = self.stream(&mut progress).await.err();
        self.finish(progress, failure)
    }

    fn emit<E: TypedEvent>(&mut self, event: &E) -> Result<()> {
        let ts = self.clock.now_wall();
        self.emitter.emit_typed(ts, event)?;
        Ok(())
    }

    fn prepare_bundle(&mut self) -> Result<()> {
        write_run_json(&self.bundle_dir, &self.info)?;

        let started = RunStartedEvent {
            run_id: self.info.run_id.clone(),
            scenario_id: self.info.scenario_id.clone(),
            scenario_path: self.info.scenario_path.clone(),
            backend: self.info.backend.clone(),
            out_dir: self.info.out_dir.clone(),
            seed: self.info.seed,
            duration_ms: self.info.duration_ms,
        };
        self.emit(&started)?;

        write_scenario_copy(&self.bundle_dir, &self.scenario.source)?;

        let mut snapshot = HostSnapshot::collect(self.clock.now_wall());
        if self.options.redact {
            snapshot = snapshot.redact(&Redactor::from_env());
        }
        write_json_atomic(&self.bundle_dir.join(HOST_SNAPSHOT_FILE), &snapshot)?;
        Ok(())
    }

    fn stream_started_event(&self, resume: bool) -> StreamStartedEvent {
        let model = &self.scenario.model;
        StreamStartedEvent {
            run_id: self.info.run_id.clone(),
            scenario_id: self.info.scenario_id.clone(),
            backend: self.info.backend.clone(),
            duration_ms: self.info.duration_ms,
            fps: model.configured_fps().unwrap_or(contracts::DEFAULT_FPS),
            seed: self.info.seed,
            soak_mode: model.soak_mode.unwrap_or(false),
            resume,
        }
    }

    fn resolve_device(&mut self) -> Result<Option<ResolvedDevice>> {
        let device = self
            .factory
            .resolve_device(self.kind, self.selector.as_ref())
            .map_err(|e| backend_failure(self.kind, "resolve_device", e))?;

        if let Some(device) = &device {
            let notice = match device {
                ResolvedDevice::Real { info, index } => NoticeEvent::info("device resolved")
                    .field("device.model", &info.model)
                    .field("device.serial", &info.serial)
                    .field("device.user_id", &info.user_id)
                    .field("device.transport", &info.transport)
                    .field("device.index", index.to_string()),
                ResolvedDevice::Webcam { device, index } => NoticeEvent::info("device resolved")
                    .field("device.id", &device.device_id)
                    .field("device.name", &device.friendly_name)
                    .field("device.index", index.to_string()),
            };
            self.emit(&notice)?;
            self.info.device = Some(device.clone());
            write_run_json(&self.bundle_dir, &self.info)?;
        }
        Ok(device)
    }

    /// Wall time the capture session starts at
    fn session_origin(&self) -> DateTime<Utc> {
        match self.factory.pacing() {
            Pacing::Virtual => self.clock.wall_anchor(),
            Pacing::RealTime => self.clock.to_wall(Instant::now()),
        }
    }

    async fn stream(&mut self, progress: &mut StreamProgress) -> Result<()> {
        let device = self.resolve_device()?;
        let mut backend = self
            .factory
            .create(self.kind, &self.scenario.model, device.as_ref(), self.clock)
            .map_err(|e| backend_failure(self.kind, "create", e))?;
        let mut machine = StreamStateMachine::new();

        backend
            .connect()
            .await
            .map_err(|e| CliError::connect_failed("connect", &e.detail()))?;
        transition(&mut machine, StreamEvent::ConnectOk)?;

        if matches!(self.kind, BackendKind::RealStub | BackendKind::Webcam) {
            let ts = self.clock.now_wall();
            let verify = apply_config(
                &mut backend,
                &self.scenario.model,
                self.kind,
                device.as_ref(),
                &mut self.emitter,
                ts,
            )?;
            write_config_verify(&self.bundle_dir, &verify)?;
            write_config_report(&self.bundle_dir, &verify)?;

            if let Some(detail) = strict_violation(&verify) {
                transition(&mut machine, StreamEvent::Teardown)?;
                return Err(CliError::connect_failed("apply_config", &detail));
            }
        }

        let origin = self.session_origin();
        backend
            .start()
            .await
            .map_err(|e| CliError::connect_failed("start", &e.detail()))?;
        transition(&mut machine, StreamEvent::StartOk)?;

        progress.origin = Some(origin);
        self.info.stream_started_at_utc = Some(self.clock.now_wall());
        write_run_json(&self.bundle_dir, &self.info)?;
        let started = self.stream_started_event(false);
        self.emit(&started)?;

        let failure = self.pull_loop(&mut backend, &mut machine, progress).await?;

        if machine.state() == StreamState::Streaming {
            match backend.stop().await {
                Ok(()) => transition(&mut machine, StreamEvent::StopOk)?,
                Err(e) => warn!(error = %e.detail(), "stop failed"),
            }
        }
        if machine.state() != StreamState::Failed {
            transition(&mut machine, StreamEvent::Teardown)?;
        }

        let received = progress
            .samples
            .iter()
            .filter(|s| s.outcome == FrameOutcome::Received)
            .count() as u64;
        let stopped = StreamStoppedEvent {
            run_id: self.info.run_id.clone(),
            reason: progress.stop_reason(failure.is_some()).to_string(),
            frames_total: progress.samples.len() as u64,
            received_frames_total: received,
            dropped_frames_total: progress.samples.len() as u64 - received,
            stream_duration_ms: duration_ms(progress.streamed),
        };
        self.emit(&stopped)?;
        info!(
            reason = %stopped.reason,
            frames_total = stopped.frames_total,
            disconnects = progress.disconnects,
            "stream stopped"
        );

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Pull frames until the duration is covered
    ///
    /// Returns the stream failure, if any; `Err` only for bundle write errors.
    async fn pull_loop(
        &mut self,
        backend: &mut Backend,
        machine: &mut StreamStateMachine,
        progress: &mut StreamProgress,
    ) -> Result<Option<CliError>> {
        let total = self.scenario.model.duration();
        let chunk_len = self.scenario.model.rolling_window();

        while progress.streamed < total {
            if self.stop.is_raised() {
                warn!(streamed_ms = duration_ms(progress.streamed), "stop requested, ending stream");
                progress.interrupted = true;
                break;
            }

            let chunk = chunk_len.min(total - progress.streamed);
            match backend.pull_frames(chunk).await {
                Ok(frames) => {
                    for sample in &frames {
                        self.emitter
                            .emit_typed(sample.timestamp, &FrameOutcomeEvent::from_sample(sample))?;
                    }
                    observability::record_frames(&frames);
                    debug!(frames = frames.len(), chunk_ms = duration_ms(chunk), "chunk pulled");
                    progress.samples.extend(frames);
                    progress.streamed += chunk;
                }
                Err(e) => {
                    let detail = e.detail();
                    if !is_likely_disconnect(&detail) {
                        let classified = classify("pull_frames", &detail);
                        error!(error_code = classified.stable_code(), error = %classified.detail, "acquisition failed");
                        return Ok(Some(CliError::run_failed(classified.formatted())));
                    }
                    if let Some(err) = self.recover(backend, machine, progress, &detail).await? {
                        return Ok(Some(err));
                    }
                }
            }
        }
        Ok(None)
    }

    /// One disconnect incident: event, then the reconnect budget
    async fn recover(
        &mut self,
        backend: &mut Backend,
        machine: &mut StreamStateMachine,
        progress: &mut StreamProgress,
        detail: &str,
    ) -> Result<Option<CliError>> {
        transition(machine, StreamEvent::DisconnectDetected)?;
        progress.disconnects += 1;
        observability::record_disconnect();

        let budget = remaining(self.scenario.model.max_reconnect_attempts(), progress.attempts_used);
        let classified = classify("pull_frames", detail);
        warn!(
            error_code = classified.stable_code(),
            disconnect_count = progress.disconnects,
            reconnect_attempts_remaining = budget,
            "device disconnected"
        );
        self.emit(&DeviceDisconnectedEvent {
            run_id: self.info.run_id.clone(),
            error_code: classified.stable_code().to_string(),
            error: classified.detail.clone(),
            disconnect_count: progress.disconnects,
            reconnect_attempts_used: progress.attempts_used,
            reconnect_attempts_remaining: budget,
        })?;

        let outcome = execute_reconnect(backend, budget, progress.attempts_used).await;
        progress.attempts_used = outcome.attempts_used_total;

        if outcome.reconnected {
            transition(machine, StreamEvent::ReconnectOk)?;
            let resumed = self.stream_started_event(true);
            self.emit(&resumed)?;
            return Ok(None);
        }

        transition(machine, StreamEvent::ReconnectExhausted)?;
        let line = match outcome.last_error {
            Some(line) if line != RECONNECT_EXHAUSTED => line,
            _ => classify("reconnect", &format!("{RECONNECT_EXHAUSTED} after: {detail}")).formatted(),
        };
        error!(error = %line, attempts_used = progress.attempts_used, "reconnect budget exhausted");
        Ok(Some(CliError::run_failed(line)))
    }

    fn finish(mut self, progress: StreamProgress, failure: Option<CliError>) -> Result<RunOutcome> {
        let status = match (&failure, progress.interrupted) {
            (Some(_), _) => RunStatus::Failed,
            (None, true) => RunStatus::Interrupted,
            (None, false) => RunStatus::Completed,
        };

        if let Some(err) = &failure {
            error!(error_code = %err.code(), error = %err, "run failed");
            let notice = NoticeEvent::error(err.to_string()).field("error_code", err.code());
            self.emit(&notice)?;
        }

        let mut report = None;
        let mut anomalies = Vec::new();
        let mut threshold_failures = Vec::new();
        if let Some(origin) = progress.origin {
            let model = &self.scenario.model;
            let window = SessionWindow {
                start: origin,
                total_duration: progress.streamed,
                rolling_window: model.rolling_window(),
            };
            let fps = compute_fps_report(&progress.samples, &window);
            write_metrics_json(&self.bundle_dir, &fps)?;
            write_metrics_csv(&self.bundle_dir, &fps)?;

            threshold_failures = evaluate_thresholds(&fps, &model.thresholds, progress.disconnects);
            let detected = detect_anomalies(&fps, model.configured_fps(), &threshold_failures);
            for finding in &detected.findings {
                self.emit(&TransportAnomalyEvent {
                    heuristic_id: finding.heuristic.id().to_string(),
                    counter: finding.counter.to_string(),
                    observed_value: finding.observed_value,
                    threshold: finding.threshold,
                    summary: finding.summary.clone(),
                })?;
            }
            anomalies = detected.anomalies;
            report = Some(fps);
        }

        self.info.status = status;
        self.info.finished_at_utc = Some(self.clock.now_wall());
        self.info.error = failure.as_ref().map(CliError::stderr_line);
        self.info.disconnect_count = progress.disconnects;
        self.info.reconnect_attempts_used = progress.attempts_used;
        write_run_json(&self.bundle_dir, &self.info)?;

        write_summary(
            &self.bundle_dir,
            &RunSummary {
                run: &self.info,
                report: report.as_ref(),
                anomalies: &anomalies,
                threshold_failures: &threshold_failures,
            },
        )?;

        observability::record_run_finished(status.as_str(), report.as_ref().map(|r| r.avg_fps));

        let manifest = write_manifest(&BundleRegistry::for_run(&self.bundle_dir))?;
        let zip_path = if self.options.zip {
            Some(write_bundle_zip(&self.bundle_dir)?.path)
        } else {
            None
        };

        info!(
            status = status.as_str(),
            manifest_entries = manifest.files.len(),
            zip = ?zip_path,
            "bundle sealed"
        );

        Ok(RunOutcome {
            run: self.info,
            bundle_dir: self.bundle_dir,
            zip_path,
            report,
            anomalies,
            threshold_failures,
            failure,
        })
    }
}

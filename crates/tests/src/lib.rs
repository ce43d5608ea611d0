//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 跨 crate 场景 (脚本帧 -> 指标, 重连策略, ZIP 归档)
//! - 编排器端到端运行 (sim / real_stub, 虚拟时钟, 临时目录)

#[cfg(test)]
mod support {
    use std::fs;
    use std::path::{Path, PathBuf};

    use backends::{BackendEnvironment, BackendFactory, Pacing, SdkContext};
    use labops_cli::{Orchestrator, RunOptions};
    use serde_json::Value;
    use tempfile::TempDir;

    pub fn factory(env: BackendEnvironment) -> BackendFactory {
        BackendFactory::new(env)
            .with_pacing(Pacing::Virtual)
            .with_sdk_context(SdkContext::new())
    }

    pub fn orchestrator() -> Orchestrator {
        Orchestrator::new(factory(BackendEnvironment::default()))
    }

    pub fn write_scenario(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("scenario.json");
        fs::write(&path, body).unwrap();
        path
    }

    pub fn options(dir: &TempDir, scenario: &Path) -> RunOptions {
        RunOptions::new(scenario, dir.path().join("out"))
    }

    pub fn events(bundle_dir: &Path) -> Vec<Value> {
        fs::read_to_string(bundle_dir.join(bundle::EVENTS_FILE))
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    pub fn event_types(events: &[Value]) -> Vec<String> {
        events
            .iter()
            .map(|e| e["type"].as_str().unwrap().to_string())
            .collect()
    }

    pub fn read_json(path: &Path) -> Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    fn u16_at(bytes: &[u8], at: usize) -> usize {
        u16::from_le_bytes([bytes[at], bytes[at + 1]]) as usize
    }

    fn u32_at(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    /// Minimal store-only reader: (name, method, crc, payload) per central entry
    pub fn read_zip(bytes: &[u8]) -> Vec<(String, usize, u32, Vec<u8>)> {
        let eocd = bytes.len() - 22;
        assert_eq!(u32_at(bytes, eocd), 0x0605_4b50);
        let count = u16_at(bytes, eocd + 10);
        let mut at = u32_at(bytes, eocd + 16) as usize;

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            assert_eq!(u32_at(bytes, at), 0x0201_4b50);
            let method = u16_at(bytes, at + 10);
            let crc = u32_at(bytes, at + 16);
            let size = u32_at(bytes, at + 20) as usize;
            assert_eq!(size, u32_at(bytes, at + 24) as usize);
            let name_len = u16_at(bytes, at + 28);
            let extra_len = u16_at(bytes, at + 30);
            let comment_len = u16_at(bytes, at + 32);
            let local = u32_at(bytes, at + 42) as usize;
            let name = String::from_utf8(bytes[at + 46..at + 46 + name_len].to_vec()).unwrap();

            assert_eq!(&bytes[local..local + 4], b"PK\x03\x04");
            let data = local + 30 + u16_at(bytes, local + 26) + u16_at(bytes, local + 28);
            entries.push((name, method, crc, bytes[data..data + size].to_vec()));

            at += 46 + name_len + extra_len + comment_len;
        }
        entries
    }
}

#[cfg(test)]
mod scenario_tests {
    use std::collections::{BTreeMap, VecDeque};
    use std::fs;
    use std::time::{Duration, Instant};

    use backends::{render_script, Pacing, ScriptStep, SimBackend};
    use chrono::{TimeZone, Utc};
    use contracts::{
        BackendError, CameraBackend, CaptureClock, FrameSample, ParamApplied, ScenarioModel,
        SimFaults,
    };
    use lifecycle::{classify, collapse_whitespace, execute_reconnect};
    use metrics_engine::{compute_fps_report, SessionWindow};
    use tempfile::TempDir;

    use crate::support::read_zip;

    /// Scripted drops flow through the metrics engine with the expected counters
    #[test]
    fn test_scripted_drops() {
        let steady = Instant::now();
        let wall = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let clock = CaptureClock::anchored(wall, steady);
        let steps = [
            ScriptStep::received(4000),
            ScriptStep::timeout(),
            ScriptStep::incomplete(700),
            ScriptStep::received(4096).with_stall(3),
            ScriptStep::received(2048),
            ScriptStep::timeout(),
        ];
        let samples = render_script(&clock, steady, Duration::from_millis(100), &steps, 0);

        let gap = samples[3].timestamp - samples[2].timestamp;
        assert!(gap >= chrono::Duration::milliseconds(400));

        let report = compute_fps_report(
            &samples,
            &SessionWindow {
                start: wall,
                total_duration: Duration::from_secs(1),
                rolling_window: Duration::from_millis(200),
            },
        );
        assert_eq!(report.frames_total, 6);
        assert_eq!(report.received_frames_total, 3);
        assert_eq!(report.timeout_frames_total, 2);
        assert_eq!(report.incomplete_frames_total, 1);
        assert_eq!(report.dropped_generic_frames_total, 0);
        assert_eq!(report.dropped_frames_total, 3);
        assert!((report.drop_rate_percent - 50.0).abs() < 1e-9);
        assert!(report.counters_consistent());
    }

    struct ScriptedBackend {
        connect_results: VecDeque<Result<(), BackendError>>,
        start_results: VecDeque<Result<(), BackendError>>,
        connect_calls: u32,
        start_calls: u32,
        stop_calls: u32,
    }

    impl CameraBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn connect(&mut self) -> Result<(), BackendError> {
            self.connect_calls += 1;
            self.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn start(&mut self) -> Result<(), BackendError> {
            self.start_calls += 1;
            self.start_results.pop_front().unwrap_or(Ok(()))
        }

        async fn stop(&mut self) -> Result<(), BackendError> {
            self.stop_calls += 1;
            Ok(())
        }

        fn set_param(&mut self, key: &str, value: &str) -> Result<ParamApplied, BackendError> {
            Ok(ParamApplied::exact(key, value))
        }

        fn dump_config(&self) -> BTreeMap<String, String> {
            BTreeMap::new()
        }

        async fn pull_frames(&mut self, _duration: Duration) -> Result<Vec<FrameSample>, BackendError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_reconnect_success_accounting() {
        let mut backend = ScriptedBackend {
            connect_results: VecDeque::from([Err(BackendError::device("link down"))]),
            start_results: VecDeque::from([Err(BackendError::device("acquisition start timeout"))]),
            connect_calls: 0,
            start_calls: 0,
            stop_calls: 0,
        };

        let outcome = execute_reconnect(&mut backend, 3, 1).await;
        assert!(outcome.reconnected);
        assert_eq!(outcome.attempts_used_total, 4);
        assert!(outcome.last_error.is_none());
        assert_eq!(
            (backend.connect_calls, backend.start_calls, backend.stop_calls),
            (3, 2, 1)
        );
    }

    /// Exhaustion against the sim backend's injected connect error
    #[tokio::test]
    async fn test_reconnect_exhaustion_on_sim() {
        let clock = CaptureClock::new();
        let scenario = ScenarioModel {
            sim_faults: SimFaults {
                connect_error: Some("device disconnected during acquisition".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut sim = SimBackend::from_scenario(&scenario, clock, Pacing::Virtual);

        let outcome = execute_reconnect(&mut sim, 2, 0).await;
        assert!(!outcome.reconnected);
        assert_eq!(outcome.attempts_used_total, 2);
        assert!(outcome
            .last_error
            .unwrap()
            .contains("REAL_DEVICE_DISCONNECTED"));
    }

    #[test]
    fn test_zip_determinism_on_bundle_tree() {
        let root = TempDir::new().unwrap();
        let bundle_dir = root.path().join("run-42");
        fs::create_dir_all(bundle_dir.join("sub")).unwrap();
        fs::write(bundle_dir.join("a.txt"), "alpha").unwrap();
        fs::write(bundle_dir.join("sub/b.txt"), "bravo").unwrap();
        fs::write(bundle_dir.join("sub/a.txt"), "sub-alpha").unwrap();

        let first = bundle::write_bundle_zip(&bundle_dir).unwrap();
        let first_bytes = fs::read(&first.path).unwrap();
        let second = bundle::write_bundle_zip(&bundle_dir).unwrap();
        let second_bytes = fs::read(&second.path).unwrap();

        assert_eq!(first.path, root.path().join("run-42.zip"));
        assert_eq!(&first_bytes[..4], b"PK\x03\x04");
        assert_eq!(first_bytes, second_bytes);

        let entries = read_zip(&first_bytes);
        let names: Vec<&str> = entries.iter().map(|(name, ..)| name.as_str()).collect();
        assert_eq!(names, vec!["run-42/a.txt", "run-42/sub/a.txt", "run-42/sub/b.txt"]);
        for (name, method, crc, data) in &entries {
            assert_eq!(*method, 0, "{name} must be stored");
            assert_eq!(*crc, bundle::crc32(data));
        }
        assert_eq!(entries[1].3, b"sub-alpha");
    }

    #[test]
    fn test_error_classifier_line() {
        let classified = classify("connect", "Permission denied while opening camera");
        assert_eq!(classified.stable_code(), "REAL_ACCESS_DENIED");
        assert!(classified
            .formatted()
            .starts_with("REAL_ACCESS_DENIED: Access denied during connect"));

        let raw = "  device\tdisconnected \n during   acquisition ";
        assert_eq!(classify("pull_frames", &collapse_whitespace(raw)), classify("pull_frames", raw));
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::fs;

    use backends::BackendEnvironment;
    use bundle::{
        CONFIG_REPORT_FILE, CONFIG_VERIFY_FILE, HOST_SNAPSHOT_FILE, MANIFEST_FILE,
        METRICS_CSV_FILE, METRICS_JSON_FILE, RUN_FILE, SCENARIO_FILE, SUMMARY_FILE,
    };
    use labops_cli::{exit_code, Orchestrator, RunOptions};
    use tempfile::TempDir;

    use crate::support::{
        event_types, events, factory, options, orchestrator, read_json, read_zip, write_scenario,
    };

    const BASELINE: &str = r#"{
  "scenario_id": "sim_baseline",
  "backend": "sim",
  "duration_ms": 1000,
  "camera": { "fps": 30 },
  "sim_faults": { "seed": 7 }
}"#;

    /// sim 后端完整跑一遍并封包
    #[tokio::test]
    async fn test_sim_run_seals_bundle() {
        let dir = TempDir::new().unwrap();
        let scenario = write_scenario(&dir, BASELINE);

        let outcome = orchestrator().run(&options(&dir, &scenario)).await.unwrap();
        assert!(outcome.failure.is_none());
        assert_eq!(outcome.run.status.as_str(), "completed");

        let bundle_dir = &outcome.bundle_dir;
        for file in [
            SCENARIO_FILE,
            HOST_SNAPSHOT_FILE,
            RUN_FILE,
            bundle::EVENTS_FILE,
            METRICS_JSON_FILE,
            METRICS_CSV_FILE,
            SUMMARY_FILE,
            MANIFEST_FILE,
        ] {
            assert!(bundle_dir.join(file).is_file(), "missing {file}");
        }
        // sim runs carry no config verification
        assert!(!bundle_dir.join(CONFIG_VERIFY_FILE).exists());
        assert_eq!(fs::read_to_string(bundle_dir.join(SCENARIO_FILE)).unwrap(), BASELINE);

        let report = outcome.report.as_ref().unwrap();
        assert!(report.frames_total >= 29 && report.frames_total <= 31);
        assert_eq!(report.rolling_samples.len(), 5);
        assert!(report.counters_consistent());

        let all = events(bundle_dir);
        let types = event_types(&all);
        assert_eq!(types[0], "run_started");
        assert_eq!(all[0]["payload"]["run_id"], outcome.run_id());
        assert!(types.contains(&"STREAM_STARTED".to_string()));
        assert_eq!(types.last().map(String::as_str), Some("STREAM_STOPPED"));
        let frames = types.iter().filter(|t| t.starts_with("FRAME_")).count() as u64;
        assert_eq!(frames, report.frames_total);

        let run = read_json(&bundle_dir.join(RUN_FILE));
        assert_eq!(run["status"], "completed");
        assert_eq!(run["schema_version"], "1.0");
        assert!(run["finished_at_utc"].as_str().unwrap().ends_with('Z'));

        let manifest = read_json(&bundle_dir.join(MANIFEST_FILE));
        let paths: Vec<&str> = manifest["files"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["path"].as_str().unwrap())
            .collect();
        assert_eq!(&paths[..4], &[SCENARIO_FILE, HOST_SNAPSHOT_FILE, RUN_FILE, bundle::EVENTS_FILE]);
        assert!(!paths.contains(&MANIFEST_FILE));

        let zip_path = outcome.zip_path.as_ref().unwrap();
        assert_eq!(zip_path, &dir.path().join("out").join(format!("{}.zip", outcome.run_id())));
        let entries = read_zip(&fs::read(zip_path).unwrap());
        assert!(entries
            .iter()
            .any(|(name, ..)| name == &format!("{}/{MANIFEST_FILE}", outcome.run_id())));
    }

    #[tokio::test]
    async fn test_disconnect_recovers_within_budget() {
        let dir = TempDir::new().unwrap();
        let scenario = write_scenario(
            &dir,
            r#"{
  "scenario_id": "sim_flaky_link",
  "backend": "sim",
  "duration_ms": 1000,
  "camera": { "fps": 30 },
  "sim_faults": { "disconnect_at_ms": 300, "reconnect_failures": 1 },
  "reconnect": { "max_attempts": 3 }
}"#,
        );

        let outcome = orchestrator().run(&options(&dir, &scenario)).await.unwrap();
        assert!(outcome.failure.is_none());
        assert_eq!(outcome.run.disconnect_count, 1);
        assert_eq!(outcome.run.reconnect_attempts_used, 2);

        let all = events(&outcome.bundle_dir);
        let disconnected = all
            .iter()
            .find(|e| e["type"] == "DEVICE_DISCONNECTED")
            .unwrap();
        assert_eq!(disconnected["payload"]["error_code"], "REAL_DEVICE_DISCONNECTED");
        assert_eq!(disconnected["payload"]["reconnect_attempts_remaining"], "3");

        let resumed: Vec<_> = all
            .iter()
            .filter(|e| e["type"] == "STREAM_STARTED")
            .map(|e| e["payload"]["resume"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(resumed, vec!["false", "true"]);

        let report = outcome.report.as_ref().unwrap();
        assert!(report.frames_total < 30);
    }

    #[tokio::test]
    async fn test_reconnect_exhaustion_fails_but_seals() {
        let dir = TempDir::new().unwrap();
        let scenario = write_scenario(
            &dir,
            r#"{
  "scenario_id": "sim_dead_link",
  "backend": "sim",
  "duration_ms": 1000,
  "sim_faults": { "disconnect_at_ms": 300, "reconnect_failures": 10 },
  "reconnect": { "max_attempts": 2 }
}"#,
        );

        let outcome = orchestrator().run(&options(&dir, &scenario)).await.unwrap();
        let bundle_dir = outcome.bundle_dir.clone();
        assert_eq!(outcome.run.status.as_str(), "failed");
        assert_eq!(outcome.run.reconnect_attempts_used, 2);
        assert!(outcome
            .run
            .error
            .as_deref()
            .unwrap()
            .starts_with("REAL_DEVICE_DISCONNECTED:"));
        assert!(bundle_dir.join(MANIFEST_FILE).is_file());

        let all = events(&bundle_dir);
        let stopped = all.iter().find(|e| e["type"] == "STREAM_STOPPED").unwrap();
        assert_eq!(stopped["payload"]["reason"], "failed");
        let failure = all.iter().find(|e| e["type"] == "error").unwrap();
        assert_eq!(failure["payload"]["error_code"], "REAL_DEVICE_DISCONNECTED");

        let err = outcome.into_result(false).unwrap_err();
        assert_eq!(err.exit_code(), exit_code::FAILURE);
        assert_eq!(err.code(), "REAL_DEVICE_DISCONNECTED");
    }

    #[tokio::test]
    async fn test_threshold_violation_exit_code() {
        let dir = TempDir::new().unwrap();
        let scenario = write_scenario(
            &dir,
            r#"{
  "scenario_id": "sim_too_slow",
  "backend": "sim",
  "duration_ms": 1000,
  "camera": { "fps": 10 },
  "thresholds": { "min_avg_fps": 25 }
}"#,
        );

        let outcome = orchestrator().run(&options(&dir, &scenario)).await.unwrap();
        assert_eq!(outcome.threshold_failures.len(), 1);
        let summary = fs::read_to_string(outcome.bundle_dir.join(SUMMARY_FILE)).unwrap();
        assert!(summary.contains("FAIL"));

        let err = outcome.into_result(false).unwrap_err();
        assert_eq!(err.exit_code(), exit_code::THRESHOLD_VIOLATED);

        let allowed = orchestrator()
            .run(&options(&dir, &scenario))
            .await
            .unwrap()
            .into_result(true);
        assert!(allowed.is_ok());
    }

    #[tokio::test]
    async fn test_real_backend_not_available_before_bundle() {
        let dir = TempDir::new().unwrap();
        let scenario = write_scenario(&dir, r#"{"scenario_id":"real_cam","backend":"real"}"#);

        let err = orchestrator().run(&options(&dir, &scenario)).await.unwrap_err();
        assert_eq!(err.exit_code(), exit_code::BACKEND_NOT_AVAILABLE);
        assert!(err.stderr_line().contains("real backend disabled at build time"));
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_invalid_scenario_exit_code() {
        let dir = TempDir::new().unwrap();
        let scenario = write_scenario(&dir, r#"{"backend":"sim","duration_ms":0}"#);

        let err = orchestrator().run(&options(&dir, &scenario)).await.unwrap_err();
        assert_eq!(err.exit_code(), exit_code::SCENARIO_INVALID);
        assert!(err.stderr_line().starts_with("SCENARIO_INVALID: "));
    }

    #[tokio::test]
    async fn test_tiny_fps_is_rejected_before_the_run() {
        let dir = TempDir::new().unwrap();
        let scenario = write_scenario(&dir, r#"{"camera":{"fps":1e-20},"duration_ms":1000}"#);

        let err = orchestrator().run(&options(&dir, &scenario)).await.unwrap_err();
        assert_eq!(err.exit_code(), exit_code::SCENARIO_INVALID);
        assert!(err.stderr_line().contains("camera.fps"), "{}", err.stderr_line());
        assert!(!dir.path().join("out").exists());
    }

    fn real_stub_orchestrator(dir: &TempDir) -> Orchestrator {
        let fixture = dir.path().join("devices.csv");
        fs::write(&fixture, "BFS-U3,SN100,bench-usb,USB3\nBFS-PGE,SN200,bench-gige,GigE\n").unwrap();
        Orchestrator::new(factory(BackendEnvironment {
            real_device_fixture: Some(fixture),
            ..Default::default()
        }))
    }

    const STUB_PACKET: &str = r#"{
  "scenario_id": "stub_packet",
  "backend": "real_stub",
  "duration_ms": 400,
  "apply_mode": "strict",
  "device_selector": "serial:SN100",
  "camera": { "fps": 30, "exposure_us": 5, "packet_size_bytes": 9000 }
}"#;

    #[tokio::test]
    async fn test_real_stub_strict_rejects_unsupported_knob() {
        let dir = TempDir::new().unwrap();
        let scenario = write_scenario(&dir, STUB_PACKET);

        let outcome = real_stub_orchestrator(&dir)
            .run(&options(&dir, &scenario))
            .await
            .unwrap();
        assert_eq!(outcome.run.status.as_str(), "failed");
        assert!(outcome.report.is_none());

        let verify = read_json(&outcome.bundle_dir.join(CONFIG_VERIFY_FILE));
        assert_eq!(verify["unsupported_count"], 1);
        assert_eq!(verify["device"]["kind"], "real");
        assert!(outcome.bundle_dir.join(CONFIG_REPORT_FILE).is_file());

        let manifest = read_json(&outcome.bundle_dir.join(MANIFEST_FILE));
        assert_eq!(manifest["schema_version"], "1.0");
        assert_eq!(manifest["files"].as_array().unwrap().len(), 7);

        let err = outcome.into_result(false).unwrap_err();
        assert_eq!(err.exit_code(), exit_code::BACKEND_CONNECT_FAILED);
        assert_eq!(err.code(), "REAL_INVALID_CONFIG");
    }

    #[tokio::test]
    async fn test_real_stub_best_effort_on_gige() {
        let dir = TempDir::new().unwrap();
        let scenario = write_scenario(
            &dir,
            &STUB_PACKET
                .replace("\"strict\"", "\"best_effort\"")
                .replace("serial:SN100", "serial:SN200"),
        );

        let outcome = real_stub_orchestrator(&dir)
            .run(&options(&dir, &scenario))
            .await
            .unwrap();
        assert!(outcome.failure.is_none());

        let verify = read_json(&outcome.bundle_dir.join(CONFIG_VERIFY_FILE));
        assert_eq!(verify["unsupported_count"], 0);
        assert_eq!(verify["adjusted_count"], 1);

        let types = event_types(&events(&outcome.bundle_dir));
        let config: Vec<&str> = types
            .iter()
            .map(String::as_str)
            .filter(|t| t.starts_with("CONFIG_"))
            .collect();
        assert_eq!(config, vec!["CONFIG_ADJUSTED", "CONFIG_APPLIED"]);
        assert!(outcome.run.device.is_some());
    }

    #[tokio::test]
    async fn test_stop_flag_interrupts_run() {
        let dir = TempDir::new().unwrap();
        let scenario = write_scenario(&dir, BASELINE);
        let orchestrator = orchestrator();
        orchestrator.stop_flag().raise();

        let mut opts: RunOptions = options(&dir, &scenario);
        opts.zip = false;
        let outcome = orchestrator.run(&opts).await.unwrap();

        assert_eq!(outcome.run.status.as_str(), "interrupted");
        assert!(outcome.zip_path.is_none());
        assert_eq!(outcome.report.as_ref().unwrap().frames_total, 0);

        let summary = fs::read_to_string(outcome.bundle_dir.join(SUMMARY_FILE)).unwrap();
        assert!(summary.contains("INCOMPLETE"));
        assert!(outcome.into_result(false).is_ok());
    }

    #[tokio::test]
    async fn test_redacted_host_snapshot() {
        let dir = TempDir::new().unwrap();
        let scenario = write_scenario(&dir, BASELINE);
        let mut opts = options(&dir, &scenario);
        opts.redact = true;
        opts.zip = false;

        let outcome = orchestrator().run(&opts).await.unwrap();
        let snapshot = read_json(&outcome.bundle_dir.join(HOST_SNAPSHOT_FILE));
        assert_eq!(snapshot["redacted"], true);
        if let Some(host) = snapshot.get("hostname") {
            assert_eq!(host, labops_cli::host::REDACTED_HOST);
        }
    }
}

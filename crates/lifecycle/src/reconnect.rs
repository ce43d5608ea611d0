//! 断线重连策略
//!
//! 每次断线事件分配一个有界的尝试预算；尝试次数在每次尝试之前累加。

use contracts::CameraBackend;
use tracing::{debug, info, instrument, warn};

use crate::classifier::classify;

pub const RECONNECT_EXHAUSTED: &str = "reconnect attempts exhausted";

const DISCONNECT_MARKERS: [&str; 3] = ["disconnect", "connection lost", "link down"];

pub fn is_likely_disconnect(text: &str) -> bool {
    let lowered = text.to_lowercase();
    DISCONNECT_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// 剩余预算 (饱和)
pub fn remaining(limit: u32, used: u32) -> u32 {
    limit.saturating_sub(used)
}

/// 重连结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectOutcome {
    pub reconnected: bool,
    pub attempts_used_total: u32,
    /// Formatted classifier line of the last failure; `None` on success
    pub last_error: Option<String>,
}

/// 执行一次断线事件的重连
///
/// Loops up to `max_attempts` times running `connect` then `start`. A start
/// failure after a successful connect triggers a best-effort `stop`.
#[instrument(name = "reconnect", skip(backend), fields(backend = backend.name()))]
pub async fn execute_reconnect<B: CameraBackend>(
    backend: &mut B,
    max_attempts: u32,
    attempts_used_total: u32,
) -> ReconnectOutcome {
    let mut used = attempts_used_total;
    let mut last_error: Option<String> = None;

    for attempt in 1..=max_attempts {
        used += 1;

        let failure = match backend.connect().await {
            Err(e) => Some(classify("connect", &e.detail())),
            Ok(()) => match backend.start().await {
                Ok(()) => None,
                Err(e) => {
                    if let Err(stop_err) = backend.stop().await {
                        debug!(error = %stop_err, "best-effort stop after failed start");
                    }
                    Some(classify("start", &e.detail()))
                }
            },
        };

        match failure {
            None => {
                observability::record_reconnect_attempt(true);
                info!(
                    attempt,
                    attempts_used_total = used,
                    max_attempts_for_disconnect = max_attempts,
                    error_code = "",
                    error_action = "",
                    error = "",
                    "reconnect succeeded"
                );
                return ReconnectOutcome {
                    reconnected: true,
                    attempts_used_total: used,
                    last_error: None,
                };
            }
            Some(classified) => {
                observability::record_reconnect_attempt(false);
                warn!(
                    attempt,
                    attempts_used_total = used,
                    max_attempts_for_disconnect = max_attempts,
                    error_code = classified.stable_code(),
                    error_action = %classified.actionable_message,
                    error = %classified.detail,
                    "reconnect attempt failed"
                );
                last_error = Some(classified.formatted());
            }
        }
    }

    ReconnectOutcome {
        reconnected: false,
        attempts_used_total: used,
        last_error: Some(last_error.unwrap_or_else(|| RECONNECT_EXHAUSTED.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{BackendError, FrameSample, ParamApplied};
    use std::collections::{BTreeMap, VecDeque};
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Replays scripted connect/start results and counts calls
    #[derive(Default)]
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

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_success_and_failure_lines_share_fields() {
        let sink = Capture::default();
        let writer = sink.clone();
        let subscriber = tracing_subscriber::fmt()
            .event_format(observability::LogfmtFormat)
            .fmt_fields(observability::LogfmtFields)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut backend = ScriptedBackend {
            connect_results: VecDeque::from([Err(BackendError::device("connection lost")), Ok(())]),
            ..Default::default()
        };
        assert!(execute_reconnect(&mut backend, 2, 0).await.reconnected);

        let output = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2, "got: {output}");
        for key in ["attempt=", "attempts_used_total=", "max_attempts_for_disconnect=", "error_code=", "error_action=", "error="] {
            assert!(lines.iter().all(|line| line.contains(key)), "missing {key}: {output}");
        }
        assert!(lines[0].contains("reconnect attempt failed"));
        assert!(lines[1].contains(r#"msg="reconnect succeeded""#), "got: {}", lines[1]);
        assert!(lines[1].contains(r#"error_code="" error_action="" error="""#), "got: {}", lines[1]);
    }

    #[test]
    fn test_disconnect_predicate() {
        assert!(is_likely_disconnect("Device DISCONNECTED during acquisition"));
        assert!(is_likely_disconnect("connection lost"));
        assert!(is_likely_disconnect("link down on port 2"));
        assert!(!is_likely_disconnect("frame timeout"));
    }

    #[test]
    fn test_remaining_saturates() {
        assert_eq!(remaining(3, 1), 2);
        assert_eq!(remaining(3, 3), 0);
        assert_eq!(remaining(3, 7), 0);
    }

    #[tokio::test]
    async fn test_reconnect_success_after_failures() {
        let mut backend = ScriptedBackend {
            connect_results: VecDeque::from([Err(BackendError::device("connection lost")), Ok(())]),
            start_results: VecDeque::from([Err(BackendError::device("start timed out")), Ok(())]),
            ..Default::default()
        };
        let outcome = execute_reconnect(&mut backend, 3, 1).await;
        assert!(outcome.reconnected);
        assert_eq!(outcome.attempts_used_total, 4);
        assert_eq!(outcome.last_error, None);
        assert_eq!(backend.connect_calls, 3);
        assert_eq!(backend.start_calls, 2);
        assert_eq!(backend.stop_calls, 1);
    }

    #[tokio::test]
    async fn test_reconnect_exhaustion() {
        let mut backend = ScriptedBackend {
            connect_results: VecDeque::from([
                Err(BackendError::device("device disconnected during acquisition")),
                Err(BackendError::device("device disconnected during acquisition")),
            ]),
            ..Default::default()
        };
        let outcome = execute_reconnect(&mut backend, 2, 0).await;
        assert!(!outcome.reconnected);
        assert_eq!(outcome.attempts_used_total, 2);
        assert!(outcome.last_error.unwrap().contains("REAL_DEVICE_DISCONNECTED"));
        assert_eq!(backend.start_calls, 0);
    }

    #[tokio::test]
    async fn test_zero_budget_returns_sentinel() {
        let mut backend = ScriptedBackend::default();
        let outcome = execute_reconnect(&mut backend, 0, 3).await;
        assert!(!outcome.reconnected);
        assert_eq!(outcome.attempts_used_total, 3);
        assert_eq!(outcome.last_error.as_deref(), Some(RECONNECT_EXHAUSTED));
        assert_eq!(backend.connect_calls, 0);
    }
}

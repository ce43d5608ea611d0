//! # Metrics Engine
//!
//! 帧统计与异常检测。
//!
//! - FPS / 帧间隔 / 抖动 百分位统计
//! - 非重叠滚动窗口采样
//! - 阈值判定
//! - 异常启发式 (resend spike, jitter cliff, periodic stall)
//!
//! All functions are pure over the collected sample vector.

mod anomaly;
mod fps;
mod thresholds;

pub use anomaly::{
    detect_anomalies, detect_jitter_cliff, detect_periodic_stall, detect_resend_spike,
    AnomalyFinding, AnomalyReport, Heuristic, MAX_ANOMALIES,
};
pub use fps::{
    compute_fps_report, jitter_us, percentile, percentile_stats, received_intervals_us,
    rolling_samples, SessionWindow,
};
pub use thresholds::evaluate_thresholds;

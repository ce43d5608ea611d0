//! FrameSample - backend 输出
//!
//! 单次采集结果的类型化记录，以及原始采集结果到帧结果的分类。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 帧传输结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameOutcome {
    Received,
    Dropped,
    Timeout,
    Incomplete,
}

impl FrameOutcome {
    /// Wire name used in events and CSV output
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Dropped => "dropped",
            Self::Timeout => "timeout",
            Self::Incomplete => "incomplete",
        }
    }

    /// Anything other than `received` counts as a dropped frame
    pub fn is_dropped(self) -> bool {
        !matches!(self, Self::Received)
    }
}

impl std::fmt::Display for FrameOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 原始采集结果
///
/// Backend 内部的采集结果，尚未归类。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionResult {
    /// 完整帧
    Complete { size_bytes: u32 },
    /// 部分载荷 (缺包)
    Partial { size_bytes: u32 },
    /// 等待超时，无载荷
    TimedOut,
    /// backend 主动丢弃
    Discarded,
}

/// 帧采样记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSample {
    /// 会话内严格递增
    pub frame_id: u64,

    /// 墙钟时间 (由 CaptureClock 从单调时钟换算)
    #[serde(with = "crate::clock::serde_utc_millis")]
    pub timestamp: DateTime<Utc>,

    /// 载荷字节数
    pub size_bytes: u32,

    /// 是否视为丢帧
    pub dropped: bool,

    /// 帧结果
    pub outcome: FrameOutcome,
}

impl FrameSample {
    /// 将原始采集结果归类为帧记录
    ///
    /// A `Complete` result with an empty payload cannot be `received`, so it is
    /// classified as `incomplete`.
    pub fn classify(frame_id: u64, timestamp: DateTime<Utc>, result: AcquisitionResult) -> Self {
        let (outcome, size_bytes) = match result {
            AcquisitionResult::Complete { size_bytes } if size_bytes > 0 => {
                (FrameOutcome::Received, size_bytes)
            }
            AcquisitionResult::Complete { size_bytes } => (FrameOutcome::Incomplete, size_bytes),
            AcquisitionResult::Partial { size_bytes } => (FrameOutcome::Incomplete, size_bytes),
            AcquisitionResult::TimedOut => (FrameOutcome::Timeout, 0),
            AcquisitionResult::Discarded => (FrameOutcome::Dropped, 0),
        };

        Self {
            frame_id,
            timestamp,
            size_bytes,
            dropped: outcome.is_dropped(),
            outcome,
        }
    }

    pub fn received(frame_id: u64, timestamp: DateTime<Utc>, size_bytes: u32) -> Self {
        Self::classify(frame_id, timestamp, AcquisitionResult::Complete { size_bytes })
    }

    pub fn incomplete(frame_id: u64, timestamp: DateTime<Utc>, size_bytes: u32) -> Self {
        Self::classify(frame_id, timestamp, AcquisitionResult::Partial { size_bytes })
    }

    pub fn timeout(frame_id: u64, timestamp: DateTime<Utc>) -> Self {
        Self::classify(frame_id, timestamp, AcquisitionResult::TimedOut)
    }

    pub fn dropped(frame_id: u64, timestamp: DateTime<Utc>) -> Self {
        Self::classify(frame_id, timestamp, AcquisitionResult::Discarded)
    }

    /// Check the outcome/dropped/size invariants of a single sample
    pub fn is_consistent(&self) -> bool {
        match self.outcome {
            FrameOutcome::Received => !self.dropped && self.size_bytes > 0,
            FrameOutcome::Timeout => self.dropped && self.size_bytes == 0,
            FrameOutcome::Incomplete | FrameOutcome::Dropped => self.dropped,
        }
    }
}

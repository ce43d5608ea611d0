//! Scripted capture
//!
//! A script is a list of acquisition results. Each step advances
//! `1 + stall_periods` periods before its timestamp, so a stall shows up as a
//! gap in the timeline.

use std::time::{Duration, Instant};

use contracts::{AcquisitionResult, CaptureClock, FrameSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptStep {
    pub result: AcquisitionResult,
    pub stall_periods: u32,
}

impl ScriptStep {
    pub fn received(size_bytes: u32) -> Self {
        Self::new(AcquisitionResult::Complete { size_bytes })
    }

    pub fn incomplete(size_bytes: u32) -> Self {
        Self::new(AcquisitionResult::Partial { size_bytes })
    }

    pub fn timeout() -> Self {
        Self::new(AcquisitionResult::TimedOut)
    }

    pub fn dropped() -> Self {
        Self::new(AcquisitionResult::Discarded)
    }

    pub fn with_stall(mut self, periods: u32) -> Self {
        self.stall_periods = periods;
        self
    }

    fn new(result: AcquisitionResult) -> Self {
        Self {
            result,
            stall_periods: 0,
        }
    }
}

/// Stream offsets of each step, saturating at `Duration::MAX`
pub fn script_offsets(period: Duration, steps: &[ScriptStep]) -> Vec<(Duration, AcquisitionResult)> {
    let mut offset = Duration::ZERO;
    steps
        .iter()
        .map(|step| {
            let periods = step.stall_periods.saturating_add(1);
            offset = offset.saturating_add(period.saturating_mul(periods));
            (offset, step.result)
        })
        .collect()
}

/// Render a script into samples anchored at `origin`
///
/// Frame ids start at `first_frame_id` and increase by one per step. Rendering
/// stops at the first step whose instant is not representable.
pub fn render_script(
    clock: &CaptureClock,
    origin: Instant,
    period: Duration,
    steps: &[ScriptStep],
    first_frame_id: u64,
) -> Vec<FrameSample> {
    script_offsets(period, steps)
        .into_iter()
        .zip(first_frame_id..)
        .map_while(|((offset, result), frame_id)| {
            let at = origin.checked_add(offset)?;
            Some(FrameSample::classify(frame_id, clock.to_wall(at), result))
        })
        .collect()
}

//! Placeholder frame synthesis shared by every backend
//!
//! Frames are laid out on a stream timeline measured from the first `start`.
//! Under [`Pacing::Virtual`] the timeline is pure arithmetic; under
//! [`Pacing::RealTime`] each pull also waits until the steady clock has
//! caught up with the timeline.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use contracts::{AcquisitionResult, BackendError, CaptureClock, FrameSample, SimFaults, DEFAULT_FPS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use crate::script::{script_offsets, ScriptStep};

/// How `pull_frames` relates to real time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    /// Sleep until the pulled window has elapsed
    #[default]
    RealTime,
    /// Return immediately; timestamps still follow the timeline
    Virtual,
}

/// Frame period for `fps`, `None` when the rate has no representable period
pub(crate) fn period_for(fps: f64) -> Option<Duration> {
    if !fps.is_finite() || fps <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / fps)
        .ok()
        .filter(|period| !period.is_zero())
}

fn default_period() -> Duration {
    Duration::from_nanos((1e9 / DEFAULT_FPS) as u64)
}

pub(crate) struct FrameSynth {
    clock: CaptureClock,
    pacing: Pacing,
    period: Duration,
    frame_bytes: u32,
    faults: SimFaults,
    rng: StdRng,
    origin: Option<Instant>,
    elapsed: Duration,
    next_nominal: Duration,
    last_offset: Duration,
    next_frame_id: u64,
    slot: u64,
    burst_remaining: u32,
    script: Option<VecDeque<(Duration, AcquisitionResult)>>,
}

impl FrameSynth {
    pub fn new(clock: CaptureClock, pacing: Pacing, fps: f64, frame_bytes: u32, faults: SimFaults) -> Self {
        let seed = faults.seed.unwrap_or(0);
        let period = period_for(fps).unwrap_or_else(|| {
            warn!(fps, fallback_fps = DEFAULT_FPS, "unusable frame rate, using the default");
            default_period()
        });
        Self {
            clock,
            pacing,
            period,
            frame_bytes,
            faults,
            rng: StdRng::seed_from_u64(seed),
            origin: None,
            elapsed: Duration::ZERO,
            next_nominal: Duration::ZERO,
            last_offset: Duration::ZERO,
            next_frame_id: 1,
            slot: 0,
            burst_remaining: 0,
            script: None,
        }
    }

    /// Replay a fixed script instead of synthesizing frames
    pub fn scripted(clock: CaptureClock, pacing: Pacing, period: Duration, steps: &[ScriptStep]) -> Self {
        let mut synth = Self::new(clock, pacing, 1.0, 0, SimFaults::default());
        synth.period = period;
        synth.script = Some(script_offsets(period, steps).into());
        synth
    }

    pub fn set_fps(&mut self, fps: f64) -> Result<(), BackendError> {
        self.period = period_for(fps).ok_or_else(|| {
            BackendError::device(format!("invalid frame rate {fps}: out of range"))
        })?;
        Ok(())
    }

    pub fn fps(&self) -> f64 {
        1.0 / self.period.as_secs_f64()
    }

    pub fn set_frame_bytes(&mut self, bytes: u32) {
        self.frame_bytes = bytes;
    }

    /// Fix the timeline origin on the first start; later starts resume it
    pub fn begin(&mut self) {
        if self.origin.is_none() {
            self.origin = Some(match self.pacing {
                Pacing::Virtual => self.clock.steady_anchor(),
                Pacing::RealTime => Instant::now(),
            });
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Emit every frame whose offset is before `window_end`
    pub fn produce(&mut self, window_end: Duration) -> Vec<FrameSample> {
        let mut frames = Vec::new();

        if let Some(script) = self.script.as_mut() {
            let mut due = Vec::new();
            while let Some((offset, result)) = script.front().copied() {
                if offset >= window_end {
                    break;
                }
                script.pop_front();
                due.push((offset, result));
            }
            for (offset, result) in due {
                frames.push(self.emit(offset, result));
            }
            return frames;
        }

        while self.next_nominal < window_end {
            let nominal = self.next_nominal;
            self.next_nominal += self.period;
            let offset = self.jittered(nominal);
            let result = self.decide();
            frames.push(self.emit(offset, result));
        }
        frames
    }

    /// Skip frame slots before `window_end` without emitting (link down)
    pub fn skip_to(&mut self, window_end: Duration) {
        if let Some(script) = self.script.as_mut() {
            while script.front().is_some_and(|(offset, _)| *offset < window_end) {
                script.pop_front();
            }
            return;
        }
        while self.next_nominal < window_end {
            self.next_nominal += self.period;
        }
    }

    pub fn advance_to(&mut self, end: Duration) {
        self.elapsed = end;
    }

    /// Under real-time pacing, wait until the timeline position has elapsed
    pub async fn pace(&self) {
        if self.pacing != Pacing::RealTime {
            return;
        }
        if let Some(origin) = self.origin {
            tokio::time::sleep_until(tokio::time::Instant::from_std(origin + self.elapsed)).await;
        }
    }

    fn emit(&mut self, offset: Duration, result: AcquisitionResult) -> FrameSample {
        let origin = self.origin.unwrap_or_else(|| self.clock.steady_anchor());
        let frame_id = self.next_frame_id;
        self.next_frame_id += 1;
        FrameSample::classify(frame_id, self.clock.to_wall(origin + offset), result)
    }

    /// Uniform jitter, never earlier than the previous frame
    fn jittered(&mut self, nominal: Duration) -> Duration {
        let jitter_us = self.faults.jitter_us.unwrap_or(0);
        let offset = if jitter_us == 0 {
            nominal
        } else {
            let span = jitter_us as i64;
            let delta = self.rng.random_range(-span..=span);
            if delta >= 0 {
                nominal + Duration::from_micros(delta as u64)
            } else {
                nominal.saturating_sub(Duration::from_micros(delta.unsigned_abs()))
            }
        };
        let offset = offset.max(self.last_offset);
        self.last_offset = offset;
        offset
    }

    fn roll(&mut self, percent: Option<u32>) -> bool {
        match percent {
            Some(p) if p > 0 => self.rng.random_range(0..100u32) < p,
            _ => false,
        }
    }

    fn decide(&mut self) -> AcquisitionResult {
        self.slot += 1;

        if self.burst_remaining > 0 {
            self.burst_remaining -= 1;
            return AcquisitionResult::Discarded;
        }

        let periodic = self
            .faults
            .drop_every_n
            .is_some_and(|n| n > 0 && self.slot % u64::from(n) == 0);
        if periodic || self.roll(self.faults.drop_percent) {
            self.burst_remaining = self.faults.burst_drop.unwrap_or(0);
            return AcquisitionResult::Discarded;
        }

        if self.roll(self.faults.timeout_percent) {
            return AcquisitionResult::TimedOut;
        }

        if self.roll(self.faults.incomplete_percent) {
            return AcquisitionResult::Partial {
                size_bytes: self.frame_bytes / 2,
            };
        }

        AcquisitionResult::Complete {
            size_bytes: self.frame_bytes,
        }
    }
}

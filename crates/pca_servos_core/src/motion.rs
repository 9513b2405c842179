//!Time based linear interpolation of servo moves.
//!
//!The interpolator only does the arithmetic. Something else has to call `step` periodically and write the
//!positions it returns.
use std::time::Duration;

use tokio::time::Instant;

use crate::CHANNEL_COUNT;

///Longest move a target will take. Longer durations are cut down to this.
pub const MAX_MOVE_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

///A move of one channel from where it was to `target_position`, arriving at `target_time`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionTarget {
    pub start_position: f64,
    pub start_time: Instant,
    pub target_position: f64,
    pub target_time: Instant,
}

///Interpolated position of a target at some instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    pub position: f64,
    ///The target has been reached. `position` is then exactly the target position.
    pub done: bool,
}

///One channel's output from `MotionInterpolator::step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionStep {
    pub channel: u8,
    pub position: f64,
    pub done: bool,
}

impl MotionTarget {
    ///`duration` is capped at `MAX_MOVE_DURATION`.
    pub fn new(
        start_position: f64,
        target_position: f64,
        start_time: Instant,
        duration: Duration,
    ) -> Self {
        Self {
            start_position,
            start_time,
            target_position,
            target_time: start_time
                .checked_add(duration.min(MAX_MOVE_DURATION))
                .unwrap_or(start_time),
        }
    }

    pub fn sample(&self, now: Instant) -> MotionSample {
        let total = self.target_time.saturating_duration_since(self.start_time);
        let elapsed = now.saturating_duration_since(self.start_time);

        //a zero length move just jumps
        let fraction = if total.is_zero() {
            1.0
        } else {
            elapsed.as_secs_f64() / total.as_secs_f64()
        };

        let posn = (self.target_position - self.start_position) * fraction + self.start_position;

        let done = fraction >= 1.0
            || if self.target_position > self.start_position {
                posn >= self.target_position
            } else {
                posn <= self.target_position
            };

        if done {
            MotionSample {
                position: self.target_position,
                done: true,
            }
        } else {
            MotionSample {
                position: posn,
                done: false,
            }
        }
    }
}

///At most one active target per channel. Only channels with an unfinished move hold a target.
#[derive(Debug, Clone, Default)]
pub struct MotionInterpolator {
    targets: [Option<MotionTarget>; CHANNEL_COUNT],
}

impl MotionInterpolator {
    pub fn new() -> Self {
        Self::default()
    }

    ///Sets the target for channel index `idx`, replacing any move already in progress.
    pub fn insert(&mut self, idx: usize, target: MotionTarget) {
        if let Some(slot) = self.targets.get_mut(idx) {
            *slot = Some(target);
        }
    }

    ///Drops the move on `idx`, returning it if there was one.
    pub fn cancel(&mut self, idx: usize) -> Option<MotionTarget> {
        self.targets.get_mut(idx).and_then(|slot| slot.take())
    }

    pub fn clear(&mut self) {
        self.targets = [None; CHANNEL_COUNT];
    }

    pub fn get(&self, idx: usize) -> Option<&MotionTarget> {
        self.targets.get(idx).and_then(|slot| slot.as_ref())
    }

    pub fn is_moving(&self, idx: usize) -> bool {
        self.get(idx).is_some()
    }

    pub fn is_idle(&self) -> bool {
        self.targets.iter().all(|slot| slot.is_none())
    }

    pub fn active_count(&self) -> usize {
        self.targets.iter().filter(|slot| slot.is_some()).count()
    }

    ///Samples every active target at `now`, in channel order. Targets that are reached are removed.
    pub fn step(&mut self, now: Instant) -> Vec<MotionStep> {
        let mut steps = Vec::with_capacity(self.active_count());
        for (idx, slot) in self.targets.iter_mut().enumerate() {
            if let Some(target) = slot {
                let sample = target.sample(now);
                if sample.done {
                    *slot = None;
                }
                steps.push(MotionStep {
                    channel: idx as u8,
                    position: sample.position,
                    done: sample.done,
                });
            }
        }
        steps
    }
}

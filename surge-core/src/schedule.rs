use std::time::Duration;

use crate::config::Stage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// Desired virtual-user count over time. Starts at an implicit level of 0 and interpolates
/// linearly inside each stage.
#[derive(Debug, Clone)]
pub struct RampSchedule {
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

impl RampSchedule {
    pub fn new(stages: Vec<Stage>) -> Self {
        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for s in &stages {
            acc = acc.saturating_add(s.duration);
            cumulative_ends.push(acc);
        }

        Self {
            stages,
            cumulative_ends,
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    // First stage whose end is at or after `elapsed`. Zero-length stages ending exactly at
    // `elapsed` are skipped over only once time moves past them.
    fn stage_index(&self, elapsed: Duration) -> usize {
        self.cumulative_ends.partition_point(|end| *end < elapsed)
    }

    fn stage_start(&self, idx: usize) -> Duration {
        idx.checked_sub(1)
            .and_then(|prev| self.cumulative_ends.get(prev).copied())
            .unwrap_or(Duration::ZERO)
    }

    fn start_target(&self, idx: usize) -> u64 {
        idx.checked_sub(1)
            .and_then(|prev| self.stages.get(prev))
            .map_or(0, |s| s.target)
    }

    /// Desired concurrency `elapsed` after the start of the run (floored).
    pub fn target_at(&self, elapsed: Duration) -> u64 {
        let Some(last) = self.stages.last() else {
            return 0;
        };

        if elapsed > self.total_duration() {
            return last.target;
        }

        let idx = self.stage_index(elapsed);
        let Some(stage) = self.stages.get(idx) else {
            return last.target;
        };

        let stage_start = self.stage_start(idx);
        let stage_elapsed = elapsed.saturating_sub(stage_start);
        let start_target = self.start_target(idx);
        let end_target = stage.target;

        if stage.duration.is_zero() {
            return end_target;
        }

        let start_i = start_target as i128;
        let delta = end_target as i128 - start_i;

        let num = stage_elapsed.as_nanos() as i128;
        let den = (stage.duration.as_nanos() as i128).max(1);

        let cur = start_i + delta.saturating_mul(num).div_euclid(den);
        cur.clamp(0, u64::MAX as i128) as u64
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        if self.stages.is_empty() {
            return None;
        }

        let clamped = elapsed.min(self.total_duration());
        let idx = self
            .stage_index(clamped)
            .min(self.stages.len().saturating_sub(1));

        let stage = self.stages.get(idx)?;
        let stage_elapsed = clamped.saturating_sub(self.stage_start(idx));
        let stage_remaining = stage.duration.saturating_sub(stage_elapsed);

        Some(StageSnapshot {
            index: idx,
            count: self.stages.len(),
            stage_elapsed,
            stage_remaining,
            start_target: self.start_target(idx),
            end_target: stage.target,
            current_target: self.target_at(clamped),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn default_profile() -> RampSchedule {
        RampSchedule::new(vec![
            Stage::new(secs(10), 50),
            Stage::new(secs(30), 50),
            Stage::new(secs(10), 0),
        ])
    }

    #[test]
    fn empty_schedule_is_immediately_done() {
        let s = RampSchedule::new(Vec::new());
        assert_eq!(s.total_duration(), Duration::ZERO);
        assert!(s.is_done(Duration::ZERO));
        assert_eq!(s.target_at(secs(5)), 0);
        assert!(s.stage_snapshot_at(Duration::ZERO).is_none());
    }

    #[test]
    fn interpolates_between_stage_boundaries() {
        let s = default_profile();
        assert_eq!(s.target_at(Duration::ZERO), 0);
        assert_eq!(s.target_at(secs(5)), 25);
        assert_eq!(s.target_at(Duration::from_millis(2_500)), 12);
        assert_eq!(s.target_at(secs(10)), 50);
        assert_eq!(s.target_at(secs(25)), 50);
        assert_eq!(s.target_at(secs(45)), 25);
        assert_eq!(s.target_at(secs(50)), 0);
        assert_eq!(s.target_at(secs(60)), 0);
    }

    #[test]
    fn interpolation_stays_within_one_of_exact_value() {
        let s = default_profile();
        for ms in (1..50_000u64).step_by(37) {
            let t = Duration::from_millis(ms);
            let exact = if ms <= 10_000 {
                50.0 * ms as f64 / 10_000.0
            } else if ms <= 40_000 {
                50.0
            } else {
                50.0 - 50.0 * (ms - 40_000) as f64 / 10_000.0
            };
            let got = s.target_at(t) as f64;
            assert!((got - exact).abs() <= 1.0, "t={ms}ms got={got} exact={exact}");
        }
    }

    #[test]
    fn zero_duration_stage_is_an_instant_jump() {
        let s = RampSchedule::new(vec![
            Stage::new(secs(10), 10),
            Stage::new(Duration::ZERO, 40),
            Stage::new(secs(10), 40),
        ]);
        assert_eq!(s.target_at(secs(10)), 10);
        assert_eq!(s.target_at(secs(10) + Duration::from_millis(1)), 40);
        assert_eq!(s.target_at(secs(15)), 40);

        let leading = RampSchedule::new(vec![Stage::new(Duration::ZERO, 7)]);
        assert_eq!(leading.target_at(Duration::ZERO), 7);
        assert!(leading.is_done(Duration::ZERO));
    }

    #[test]
    fn stage_snapshot_reports_progress() {
        let s = default_profile();

        let snap = s
            .stage_snapshot_at(secs(12))
            .unwrap_or_else(|| panic!("expected snapshot"));
        assert_eq!(snap.index, 1);
        assert_eq!(snap.count, 3);
        assert_eq!(snap.stage_elapsed, secs(2));
        assert_eq!(snap.stage_remaining, secs(28));
        assert_eq!(snap.start_target, 50);
        assert_eq!(snap.end_target, 50);
        assert_eq!(snap.current_target, 50);

        let end = s
            .stage_snapshot_at(secs(100))
            .unwrap_or_else(|| panic!("expected snapshot"));
        assert_eq!(end.index, 2);
        assert_eq!(end.stage_remaining, Duration::ZERO);
        assert_eq!(end.current_target, 0);
    }
}

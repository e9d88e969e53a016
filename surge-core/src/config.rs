use std::time::Duration;

use crate::error::{Error, Result};
use crate::thresholds::parse_threshold_expr;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_MAX_VUS: u64 = 1_000;
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(30);
pub const DEFAULT_CONTROL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_THRESHOLD_INTERVAL: Duration = Duration::from_secs(1);
/// Upper bound for every configured duration, including the total length of the stages.
pub const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Linear transition of the desired number of virtual users toward `target` over `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum ThresholdTiming {
    /// Evaluated once over the final snapshots.
    #[default]
    EndOfRun,
    /// Also evaluated every `threshold_interval` while the run is in progress.
    Continuous,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdConfig {
    pub metric: String,
    pub expression: String,
    pub timing: ThresholdTiming,
    /// Cancel the run as soon as a continuous evaluation fails.
    pub abort_on_fail: bool,
}

impl ThresholdConfig {
    pub fn new(metric: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            expression: expression.into(),
            timing: ThresholdTiming::EndOfRun,
            abort_on_fail: false,
        }
    }

    #[must_use]
    pub fn continuous(mut self, abort_on_fail: bool) -> Self {
        self.timing = ThresholdTiming::Continuous;
        self.abort_on_fail = abort_on_fail;
        self
    }
}

/// How a threshold that could not be evaluated affects the overall verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum IndeterminatePolicy {
    #[default]
    Fail,
    Pass,
}

/// Immutable description of one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub scenario_name: String,
    pub stages: Vec<Stage>,
    pub thresholds: Vec<ThresholdConfig>,
    pub base_url: String,
    pub max_vus: u64,
    pub drain_grace: Duration,
    pub control_interval: Duration,
    pub threshold_interval: Duration,
    pub indeterminate: IndeterminatePolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            scenario_name: "default".to_string(),
            stages: Vec::new(),
            thresholds: Vec::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_vus: DEFAULT_MAX_VUS,
            drain_grace: DEFAULT_DRAIN_GRACE,
            control_interval: DEFAULT_CONTROL_INTERVAL,
            threshold_interval: DEFAULT_THRESHOLD_INTERVAL,
            indeterminate: IndeterminatePolicy::Fail,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.scenario_name.trim().is_empty() {
            return Err(Error::InvalidScenarioName);
        }
        if self.max_vus == 0 {
            return Err(Error::InvalidMaxVus);
        }
        if self.control_interval.is_zero() {
            return Err(Error::InvalidInterval("control_interval"));
        }
        if self.threshold_interval.is_zero() {
            return Err(Error::InvalidInterval("threshold_interval"));
        }

        for (field, value) in [
            ("control_interval", self.control_interval),
            ("threshold_interval", self.threshold_interval),
            ("drain_grace", self.drain_grace),
            ("stages", self.total_duration()),
        ] {
            if value > MAX_DURATION {
                return Err(Error::DurationTooLong {
                    field,
                    max: MAX_DURATION,
                });
            }
        }

        let parsed = url::Url::parse(&self.base_url)
            .map_err(|_| Error::InvalidBaseUrl(self.base_url.clone()))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(Error::InvalidBaseUrl(self.base_url.clone()));
        }

        for t in &self.thresholds {
            parse_threshold_expr(&t.expression).map_err(|error| Error::InvalidThreshold {
                metric: t.metric.clone(),
                expression: t.expression.clone(),
                error,
            })?;
        }

        Ok(())
    }

    pub fn total_duration(&self) -> Duration {
        self.stages
            .iter()
            .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration))
    }

    /// Highest stage target, before clamping to `max_vus`.
    pub fn peak_target(&self) -> u64 {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = RunConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.total_duration(), Duration::ZERO);
        assert_eq!(cfg.peak_target(), 0);
    }

    #[test]
    fn validate_rejects_bad_inputs() {
        let cfg = RunConfig {
            max_vus: 0,
            ..RunConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::InvalidMaxVus)));

        let cfg = RunConfig {
            base_url: "localhost:8080".to_string(),
            ..RunConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::InvalidBaseUrl(_))));

        let cfg = RunConfig {
            control_interval: Duration::ZERO,
            ..RunConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(Error::InvalidInterval("control_interval"))
        ));

        let cfg = RunConfig {
            drain_grace: Duration::from_secs(u64::MAX),
            ..RunConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(Error::DurationTooLong {
                field: "drain_grace",
                ..
            })
        ));

        let cfg = RunConfig {
            stages: vec![
                Stage::new(MAX_DURATION, 1),
                Stage::new(Duration::from_secs(1), 0),
            ],
            ..RunConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(Error::DurationTooLong { field: "stages", .. })
        ));

        let cfg = RunConfig {
            thresholds: vec![ThresholdConfig::new("http_req_duration", "")],
            ..RunConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(Error::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn totals_follow_stages() {
        let cfg = RunConfig {
            stages: vec![
                Stage::new(Duration::from_secs(10), 50),
                Stage::new(Duration::from_secs(30), 50),
                Stage::new(Duration::from_secs(10), 0),
            ],
            ..RunConfig::default()
        };
        assert_eq!(cfg.total_duration(), Duration::from_secs(50));
        assert_eq!(cfg.peak_target(), 50);
    }

    #[test]
    fn threshold_timing_parses_kebab_case() {
        assert_eq!(
            "end-of-run".parse::<ThresholdTiming>().ok(),
            Some(ThresholdTiming::EndOfRun)
        );
        let t = ThresholdConfig::new("checks", "rate>0.9").continuous(true);
        assert_eq!(t.timing, ThresholdTiming::Continuous);
        assert!(t.abort_on_fail);
    }
}

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;
use surge_core::{IndeterminatePolicy, RunConfig, Stage, ThresholdConfig};

use crate::cli::ConfigArgs;
use crate::librarian::Credentials;

pub const DEFAULT_SCENARIO: &str = "librarian";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Top-level run file.
///
/// ```yaml
/// stages:
///   - { duration: 10s, target: 50 }
/// thresholds:
///   http_req_duration: ["p(95)<2000"]
///   http_req_failed:
///     - threshold: rate<0.05
///       abortOnFail: true
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RunFileYaml {
    /// Scenario name (metrics `scenario` tag).
    pub scenario: Option<String>,
    pub base_url: Option<String>,

    #[serde(rename = "maxVUs")]
    pub max_vus: Option<u64>,

    pub drain_grace: Option<YamlDuration>,
    pub control_interval: Option<YamlDuration>,
    pub threshold_interval: Option<YamlDuration>,
    pub request_timeout: Option<YamlDuration>,

    /// `fail` (default) or `pass`.
    pub indeterminate: Option<String>,

    pub credentials: Option<Credentials>,

    // Missing keeps the built-in profile; an explicit empty list runs nothing.
    pub stages: Option<Vec<StageYaml>>,
    pub thresholds: Option<BTreeMap<String, ThresholdExprYaml>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct StageYaml {
    pub duration: YamlDuration,
    pub target: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdExprYaml {
    One(String),
    Many(Vec<ThresholdEntryYaml>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdEntryYaml {
    Plain(String),
    Detailed(DetailedThresholdYaml),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct DetailedThresholdYaml {
    pub threshold: String,
    #[serde(default)]
    pub abort_on_fail: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|secs| YamlDuration(Duration::from_secs(secs)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom("duration must be a non-negative, finite number"));
                }
                Duration::try_from_secs_f64(v)
                    .map(YamlDuration)
                    .map_err(|err| E::custom(format!("duration out of range: {err}")))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let v = v.trim();
                if v.starts_with('-') {
                    return Err(E::custom("duration must not be negative"));
                }
                humantime::parse_duration(v)
                    .map(YamlDuration)
                    .map_err(E::custom)
            }
        }

        deserializer.deserialize_any(V)
    }
}

/// Everything the `run` command needs, resolved from defaults, the YAML file and CLI flags.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedConfig {
    pub run: RunConfig,
    pub request_timeout: Duration,
    pub credentials: Credentials,
}

/// The original librarian load profile: 10s ramp to 50, 30s hold, 10s ramp down.
pub(crate) fn default_stages() -> Vec<Stage> {
    vec![
        Stage::new(Duration::from_secs(10), 50),
        Stage::new(Duration::from_secs(30), 50),
        Stage::new(Duration::from_secs(10), 0),
    ]
}

pub(crate) fn default_thresholds() -> Vec<ThresholdConfig> {
    vec![
        ThresholdConfig::new("http_req_duration", "p(95)<2000"),
        ThresholdConfig::new("http_req_failed", "rate<0.05"),
    ]
}

pub(crate) async fn load_run_file(path: &Path) -> anyhow::Result<RunFileYaml> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read run config: {}", path.display()))?;
    parse_run_file(&bytes).with_context(|| format!("failed to parse YAML: {}", path.display()))
}

pub(crate) fn parse_run_file(bytes: &[u8]) -> anyhow::Result<RunFileYaml> {
    // An empty document means "all defaults".
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(RunFileYaml::default());
    }
    Ok(serde_yaml::from_slice(bytes)?)
}

fn thresholds_from_yaml(map: BTreeMap<String, ThresholdExprYaml>) -> Vec<ThresholdConfig> {
    let mut out = Vec::new();
    for (metric, expr) in map {
        match expr {
            ThresholdExprYaml::One(e) => out.push(ThresholdConfig::new(metric, e)),
            ThresholdExprYaml::Many(entries) => {
                for entry in entries {
                    out.push(match entry {
                        ThresholdEntryYaml::Plain(e) => ThresholdConfig::new(metric.clone(), e),
                        ThresholdEntryYaml::Detailed(d) if d.abort_on_fail => {
                            ThresholdConfig::new(metric.clone(), d.threshold).continuous(true)
                        }
                        ThresholdEntryYaml::Detailed(d) => {
                            ThresholdConfig::new(metric.clone(), d.threshold)
                        }
                    });
                }
            }
        }
    }
    out
}

/// Applies `file` over the defaults, then the CLI overrides, and validates the result.
pub(crate) fn resolve(file: RunFileYaml, args: &ConfigArgs) -> anyhow::Result<ResolvedConfig> {
    let RunFileYaml {
        scenario,
        base_url,
        max_vus,
        drain_grace,
        control_interval,
        threshold_interval,
        request_timeout,
        indeterminate,
        credentials,
        stages,
        thresholds,
    } = file;

    let defaults = RunConfig::default();

    let indeterminate = match indeterminate {
        Some(raw) => raw
            .trim()
            .parse::<IndeterminatePolicy>()
            .map_err(|_| anyhow::anyhow!("invalid `indeterminate` value '{raw}' (expected fail or pass)"))?,
        None => IndeterminatePolicy::default(),
    };

    let run = RunConfig {
        scenario_name: scenario.unwrap_or_else(|| DEFAULT_SCENARIO.to_string()),
        stages: stages.map_or_else(default_stages, |stages| {
            stages
                .into_iter()
                .map(|s| Stage::new(s.duration.into_inner(), s.target))
                .collect()
        }),
        thresholds: thresholds.map_or_else(default_thresholds, thresholds_from_yaml),
        base_url: args
            .base_url
            .clone()
            .or(base_url)
            .unwrap_or(defaults.base_url),
        max_vus: args.max_vus.or(max_vus).unwrap_or(defaults.max_vus),
        drain_grace: args
            .drain_grace
            .or(drain_grace.map(YamlDuration::into_inner))
            .unwrap_or(defaults.drain_grace),
        control_interval: control_interval.map_or(defaults.control_interval, YamlDuration::into_inner),
        threshold_interval: threshold_interval
            .map_or(defaults.threshold_interval, YamlDuration::into_inner),
        indeterminate,
    };

    run.validate()?;

    Ok(ResolvedConfig {
        run,
        request_timeout: args
            .request_timeout
            .or(request_timeout.map(YamlDuration::into_inner))
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        credentials: credentials.unwrap_or_default(),
    })
}

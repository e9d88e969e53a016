//! Load engine: ramp scheduling, virtual users, scenario execution and threshold
//! evaluation over a shared [`surge_metrics::Registry`].

mod config;
mod controller;
mod error;
mod iteration_metrics;
mod metrics_context;
mod progress;
mod request_metrics;
mod runner;
mod schedule;
mod scheduler;
mod summary;
mod thresholds;
mod thresholds_eval;
mod vu;

pub use config::{
    DEFAULT_BASE_URL, DEFAULT_CONTROL_INTERVAL, DEFAULT_DRAIN_GRACE, DEFAULT_MAX_VUS,
    DEFAULT_THRESHOLD_INTERVAL, IndeterminatePolicy, MAX_DURATION, RunConfig, Stage,
    ThresholdConfig, ThresholdTiming,
};
pub use controller::{Controller, ControllerHandle, RunState};
pub use error::{Error, Result};
pub use iteration_metrics::IterationOutcome;
pub use metrics_context::MetricsContext;
pub use progress::{ProgressFn, ProgressUpdate, StageProgress};
pub use runner::{
    CANCELLED_REASON, IterationContext, IterationError, RunContext, Scenario,
};
pub use schedule::{RampSchedule, StageSnapshot};
pub use summary::{CheckSummary, MetricSummary, RunResult};
pub use thresholds::{ThresholdAgg, ThresholdExpr, ThresholdOp, parse_threshold_expr};
pub use thresholds_eval::{
    CompiledThreshold, RegistryAt, SnapshotProvider, ThresholdStatus, ThresholdVerdict,
    compile_thresholds, evaluate_threshold, evaluate_thresholds, overall_passed,
};

/// Names of the built-in metrics.
pub mod metric_names {
    pub use crate::iteration_metrics::{
        CHECKS, ITERATION_DURATION, ITERATIONS, ITERATIONS_ABORTED, SCHEDULER_LAG, VUS, VUS_MAX,
    };
    pub use crate::request_metrics::{
        DATA_RECEIVED, DATA_SENT, HTTP_REQ_DURATION, HTTP_REQ_ERRORS, HTTP_REQ_FAILED, HTTP_REQS,
    };
}

pub use surge_http::{HttpExchange, HttpExecutor, HttpRequest};

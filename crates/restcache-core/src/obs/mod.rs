//! Observability: planner metrics and sink abstractions.
//!
//! The planner never touches counters directly; every event flows through
//! [`MetricsEvent`] and the active [`MetricsSink`].

pub(crate) mod metrics;
pub(crate) mod sink;


// re-exports
pub use metrics::{EventOps, EventReport, EventState, TableCounters, TableSummary};
pub use sink::{
    MetricsEvent, MetricsSink, ScheduleKind, metrics_report, metrics_reset_all, with_metrics_sink,
};

//! Metrics sink boundary.
//!
//! This module is the only bridge between planner logic and the
//! thread-local metrics state.
use crate::{mutate::OperationKind, obs::metrics};
use std::{cell::RefCell, rc::Rc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn MetricsSink>>> = RefCell::new(None);
}

///
/// ScheduleKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScheduleKind {
    Upsert,
    Delete,
    Revalidate,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent<'a> {
    MutateStart {
        kind: OperationKind,
        table: &'a str,
    },
    /// `planned` counts every scheduled mutation, including those a failed
    /// join never applied.
    MutateFinish {
        kind: OperationKind,
        table: &'a str,
        planned: u64,
        failed: bool,
    },
    KeyScanned {
        decoded: bool,
    },
    Scheduled {
        kind: ScheduleKind,
        table: &'a str,
    },
    DeleteMissingPrimaryKey {
        table: &'a str,
    },
    MalformedQuery {
        table: &'a str,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent<'_>);
}

///
/// GlobalMetricsSink
///
/// Default sink that writes into the thread-local metrics state.
/// Acts as the concrete sink when no scoped override is installed.
///

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent<'_>) {
        match event {
            MetricsEvent::MutateStart { kind, table } => {
                metrics::with_state_mut(|m| {
                    match kind {
                        OperationKind::Upsert => {
                            m.ops.upsert_calls = m.ops.upsert_calls.saturating_add(1);
                        }
                        OperationKind::Delete => {
                            m.ops.delete_calls = m.ops.delete_calls.saturating_add(1);
                        }
                    }

                    let entry = m.tables.entry(table.to_string()).or_default();
                    entry.mutate_calls = entry.mutate_calls.saturating_add(1);
                });
            }

            MetricsEvent::MutateFinish {
                kind: _,
                table,
                planned,
                failed,
            } => {
                metrics::with_state_mut(|m| {
                    m.ops.mutations_planned = m.ops.mutations_planned.saturating_add(planned);
                    if failed {
                        m.ops.mutate_failures = m.ops.mutate_failures.saturating_add(1);
                    }

                    let entry = m.tables.entry(table.to_string()).or_default();
                    entry.mutations_planned = entry.mutations_planned.saturating_add(planned);
                });
            }

            MetricsEvent::KeyScanned { decoded } => {
                metrics::with_state_mut(|m| {
                    m.ops.keys_scanned = m.ops.keys_scanned.saturating_add(1);
                    if !decoded {
                        m.ops.keys_undecodable = m.ops.keys_undecodable.saturating_add(1);
                    }
                });
            }

            MetricsEvent::Scheduled { kind, table } => {
                metrics::with_state_mut(|m| {
                    let entry = m.tables.entry(table.to_string()).or_default();
                    match kind {
                        ScheduleKind::Upsert => {
                            m.ops.upserts_scheduled = m.ops.upserts_scheduled.saturating_add(1);
                            entry.upserts = entry.upserts.saturating_add(1);
                        }
                        ScheduleKind::Delete => {
                            m.ops.deletes_scheduled = m.ops.deletes_scheduled.saturating_add(1);
                            entry.deletes = entry.deletes.saturating_add(1);
                        }
                        ScheduleKind::Revalidate => {
                            m.ops.revalidations_scheduled =
                                m.ops.revalidations_scheduled.saturating_add(1);
                            entry.revalidations = entry.revalidations.saturating_add(1);
                        }
                    }
                });
            }

            MetricsEvent::DeleteMissingPrimaryKey { table } => {
                metrics::with_state_mut(|m| {
                    m.ops.deletes_missing_pk = m.ops.deletes_missing_pk.saturating_add(1);
                    let entry = m.tables.entry(table.to_string()).or_default();
                    entry.deletes_missing_pk = entry.deletes_missing_pk.saturating_add(1);
                });
            }

            MetricsEvent::MalformedQuery { table } => {
                metrics::with_state_mut(|m| {
                    m.ops.malformed_queries = m.ops.malformed_queries.saturating_add(1);
                    let entry = m.tables.entry(table.to_string()).or_default();
                    entry.malformed_queries = entry.malformed_queries.saturating_add(1);
                });
            }
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent<'_>) {
    let sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the current metrics state.
#[must_use]
pub fn metrics_report() -> metrics::EventReport {
    metrics::report()
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override on this thread.
///
/// The previous sink is restored on every exit, including unwinding.
pub fn with_metrics_sink<T>(sink: Rc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Rc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let prev = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = prev;
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}

use serde::{Deserialize, Serialize};
use std::{cell::RefCell, collections::BTreeMap};

///
/// EventState
/// Ephemeral, in-memory counters for planner activity on this thread.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub tables: BTreeMap<String, TableCounters>,
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Planner entrypoints
    pub upsert_calls: u64,
    pub delete_calls: u64,
    pub mutate_failures: u64,

    // Key scan
    pub keys_scanned: u64,
    pub keys_undecodable: u64,
    pub malformed_queries: u64,

    // Scheduled work
    pub upserts_scheduled: u64,
    pub deletes_scheduled: u64,
    pub revalidations_scheduled: u64,
    pub deletes_missing_pk: u64,
    pub mutations_planned: u64,
}

///
/// TableCounters
/// Counters keyed by the table of the key that was touched, or of the
/// operation for call-level counters.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TableCounters {
    pub mutate_calls: u64,
    pub mutations_planned: u64,
    pub upserts: u64,
    pub deletes: u64,
    pub revalidations: u64,
    pub deletes_missing_pk: u64,
    pub malformed_queries: u64,
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&m.borrow()))
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

/// Reset all counters.
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

///
/// EventReport
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    pub counters: EventState,
    pub table_counters: Vec<TableSummary>,
}

///
/// TableSummary
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TableSummary {
    pub table: String,
    pub mutate_calls: u64,
    pub mutations_planned: u64,
    pub upserts: u64,
    pub deletes: u64,
    pub revalidations: u64,
    pub avg_mutations_per_call: f64,
}

/// Build a report from the in-memory counters.
#[must_use]
#[expect(clippy::cast_precision_loss)]
pub(crate) fn report() -> EventReport {
    let snap = with_state(Clone::clone);

    let table_counters = snap
        .tables
        .iter()
        .map(|(table, c)| TableSummary {
            table: table.clone(),
            mutate_calls: c.mutate_calls,
            mutations_planned: c.mutations_planned,
            upserts: c.upserts,
            deletes: c.deletes,
            revalidations: c.revalidations,
            avg_mutations_per_call: if c.mutate_calls > 0 {
                c.mutations_planned as f64 / c.mutate_calls as f64
            } else {
                0.0
            },
        })
        .collect();

    EventReport {
        counters: snap,
        table_counters,
    }
}

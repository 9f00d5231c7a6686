use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};

use autopilot_core_types::FlowOutcome;

#[derive(Default)]
struct Counters {
    dispatched: AtomicU64,
    unrouted: AtomicU64,
    scheduled: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    aborted: AtomicU64,
    suppressed: AtomicU64,
}

static COUNTERS: Lazy<Counters> = Lazy::new(Counters::default);

fn increment(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn record_dispatched() {
    increment(&COUNTERS.dispatched);
}

pub fn record_unrouted() {
    increment(&COUNTERS.unrouted);
}

pub fn record_scheduled() {
    increment(&COUNTERS.scheduled);
}

pub fn record_started() {
    increment(&COUNTERS.started);
}

/// Scheduled or queued start dropped because a newer navigation arrived first.
pub fn record_suppressed() {
    increment(&COUNTERS.suppressed);
}

pub fn record_outcome(outcome: FlowOutcome) {
    match outcome {
        FlowOutcome::Completed | FlowOutcome::CompletedPartial => increment(&COUNTERS.completed),
        FlowOutcome::Failed => increment(&COUNTERS.failed),
        FlowOutcome::Aborted => increment(&COUNTERS.aborted),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchedulerMetricsSnapshot {
    pub dispatched: u64,
    pub unrouted: u64,
    pub scheduled: u64,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub aborted: u64,
    pub suppressed: u64,
}

pub fn snapshot() -> SchedulerMetricsSnapshot {
    SchedulerMetricsSnapshot {
        dispatched: COUNTERS.dispatched.load(Ordering::Relaxed),
        unrouted: COUNTERS.unrouted.load(Ordering::Relaxed),
        scheduled: COUNTERS.scheduled.load(Ordering::Relaxed),
        started: COUNTERS.started.load(Ordering::Relaxed),
        completed: COUNTERS.completed.load(Ordering::Relaxed),
        failed: COUNTERS.failed.load(Ordering::Relaxed),
        aborted: COUNTERS.aborted.load(Ordering::Relaxed),
        suppressed: COUNTERS.suppressed.load(Ordering::Relaxed),
    }
}

//! Opt-in operator timing.
//!
//! Set `FLOWMATCH_PROFILE` before the first timed operation to enable it; the
//! variable is read once per process. When disabled, timers are `None` and
//! recording is a no-op.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Accumulated operator timings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryProfileSnapshot {
    /// Nanoseconds spent producing `(v0, v1)` prefixes.
    pub scan_ns: u64,
    /// Scan polls.
    pub scan_count: u64,
    /// Nanoseconds spent intersecting neighbor lists for later stages.
    pub extend_ns: u64,
    /// Prefixes extended.
    pub extend_count: u64,
    /// Nanoseconds spent resolving edge ids.
    pub resolve_ns: u64,
    /// Vertex tuples resolved to edges.
    pub resolve_count: u64,
    /// Nanoseconds spent evaluating predicates.
    pub filter_ns: u64,
    /// Rows checked against predicates.
    pub filter_count: u64,
    /// Nanoseconds spent appending rows to sinks.
    pub sink_ns: u64,
    /// Rows appended.
    pub sink_count: u64,
}

#[derive(Clone, Copy)]
pub(crate) enum QueryProfileKind {
    Scan = 0,
    Extend = 1,
    EdgeIdResolver = 2,
    Filter = 3,
    Sink = 4,
}

const OPERATORS: usize = 5;

#[derive(Default)]
struct OperatorTotals {
    nanos: [AtomicU64; OPERATORS],
    calls: [AtomicU64; OPERATORS],
}

impl OperatorTotals {
    fn read(&self, kind: QueryProfileKind, reset: bool) -> (u64, u64) {
        let slot = kind as usize;
        if reset {
            (
                self.nanos[slot].swap(0, Ordering::Relaxed),
                self.calls[slot].swap(0, Ordering::Relaxed),
            )
        } else {
            (
                self.nanos[slot].load(Ordering::Relaxed),
                self.calls[slot].load(Ordering::Relaxed),
            )
        }
    }
}

static ENABLED: OnceLock<bool> = OnceLock::new();
static TOTALS: OnceLock<OperatorTotals> = OnceLock::new();

fn totals() -> Option<&'static OperatorTotals> {
    let enabled = *ENABLED.get_or_init(|| std::env::var_os("FLOWMATCH_PROFILE").is_some());
    enabled.then(|| TOTALS.get_or_init(OperatorTotals::default))
}

pub(crate) fn profile_timer() -> Option<Instant> {
    totals().map(|_| Instant::now())
}

pub(crate) fn record_profile_timer(kind: QueryProfileKind, start: Option<Instant>) {
    let (Some(start), Some(totals)) = (start, totals()) else {
        return;
    };
    let elapsed = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);
    totals.nanos[kind as usize].fetch_add(elapsed, Ordering::Relaxed);
    totals.calls[kind as usize].fetch_add(1, Ordering::Relaxed);
}

/// Reads the operator totals, optionally resetting them. `None` when
/// profiling is disabled.
pub fn profile_snapshot(reset: bool) -> Option<QueryProfileSnapshot> {
    let totals = totals()?;
    let (scan_ns, scan_count) = totals.read(QueryProfileKind::Scan, reset);
    let (extend_ns, extend_count) = totals.read(QueryProfileKind::Extend, reset);
    let (resolve_ns, resolve_count) = totals.read(QueryProfileKind::EdgeIdResolver, reset);
    let (filter_ns, filter_count) = totals.read(QueryProfileKind::Filter, reset);
    let (sink_ns, sink_count) = totals.read(QueryProfileKind::Sink, reset);
    Some(QueryProfileSnapshot {
        scan_ns,
        scan_count,
        extend_ns,
        extend_count,
        resolve_ns,
        resolve_count,
        filter_ns,
        filter_count,
        sink_ns,
        sink_count,
    })
}

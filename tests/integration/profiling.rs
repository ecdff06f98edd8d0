#![allow(clippy::all)]

// Profiling is switched on by an environment variable read once per process,
// so this binary holds a single test.

use flowmatch::{
    profile_snapshot, query::ast::EdgeSpec, Engine, EngineConfig, QueryBuilder,
    QueryProfileSnapshot,
};

#[test]
fn operator_timers_count_their_own_work() {
    std::env::set_var("FLOWMATCH_PROFILE", "1");
    let engine = Engine::new(EngineConfig::quiet());
    engine
        .create_edges(&[
            EdgeSpec::new(1, 2),
            EdgeSpec::new(2, 3),
            EdgeSpec::new(2, 4),
            EdgeSpec::new(5, 6),
        ])
        .unwrap();
    assert!(profile_snapshot(true).is_some());

    let path = QueryBuilder::new()
        .edge("a", "b", None)
        .edge("b", "c", None)
        .build()
        .unwrap();
    let rows = engine.match_once(&path).unwrap();
    assert_eq!(rows.len(), 2);

    let QueryProfileSnapshot {
        scan_count,
        extend_count,
        resolve_count,
        filter_count,
        sink_count,
        ..
    } = profile_snapshot(true).unwrap();
    // Four two-vertex prefixes, each intersected once; the scan is polled one
    // extra time to learn it is exhausted.
    assert_eq!(extend_count, 4);
    assert_eq!(scan_count, extend_count + 1);
    assert_eq!(resolve_count, 2);
    assert_eq!(sink_count, 2);
    assert_eq!(filter_count, 0);
}

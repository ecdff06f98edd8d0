#![allow(clippy::all)]

use std::collections::BTreeMap;
use std::sync::Arc;

use flowmatch::{
    query::{ast::Pattern, QueryBuilder},
    sink::InMemorySink,
    storage::GraphVersion,
    EdgeChange, Engine, EngineConfig, MatchKind, MatchRow,
};
use flowmatch::query::ast::{EdgeKey, EdgeSpec};
use parking_lot::Mutex;
use proptest::prelude::*;

type Counts = BTreeMap<(Vec<u64>, Vec<u64>), i64>;

const EDGE_TYPES: [&str; 2] = ["X", "Y"];

fn pattern(choice: usize) -> Pattern {
    typed_pattern(choice, &[None])
}

fn typed_pattern(choice: usize, types: &[Option<&str>]) -> Pattern {
    let ty = |idx: usize| types[idx % types.len()];
    let builder = QueryBuilder::new();
    let builder = match choice {
        0 => builder
            .edge("a", "b", ty(0))
            .edge("b", "c", ty(1))
            .edge("c", "a", ty(2)),
        1 => builder.edge("a", "b", ty(0)).edge("b", "c", ty(1)),
        2 => builder
            .edge("a", "b", ty(0))
            .edge("b", "a", ty(1))
            .edge("a", "c", ty(2)),
        _ => builder.edge("a", "b", ty(0)).edge("c", "d", ty(1)),
    };
    builder.build().unwrap()
}

fn key(row: &MatchRow) -> (Vec<u64>, Vec<u64>) {
    (
        row.vertices.iter().map(|v| v.0).collect(),
        row.edges.iter().map(|e| e.0).collect(),
    )
}

fn recomputed(engine: &Engine, pattern: &Pattern) -> Counts {
    engine
        .match_once(pattern)
        .unwrap()
        .iter()
        .map(|row| (key(row), 1))
        .collect()
}

fn arb_change() -> impl Strategy<Value = EdgeChange> {
    (any::<bool>(), 0u64..5, 0u64..5).prop_map(|(add, from, to)| {
        if add {
            EdgeChange::Create(EdgeSpec::new(from, to))
        } else {
            EdgeChange::Delete(EdgeKey::new(from, to, None))
        }
    })
}

fn arb_typed_change() -> impl Strategy<Value = EdgeChange> {
    (any::<bool>(), 0u64..4, 0u64..4, 0usize..2).prop_map(|(add, from, to, ty)| {
        let ty = EDGE_TYPES[ty];
        if add {
            EdgeChange::Create(EdgeSpec::new(from, to).typed(ty))
        } else {
            EdgeChange::Delete(EdgeKey::new(from, to, Some(ty)))
        }
    })
}

// Applies every batch and checks that the reported deltas, summed up, equal a
// fresh one-time match after each commit.
fn check_maintenance(pattern: &Pattern, batches: &[Vec<EdgeChange>]) -> Result<(), TestCaseError> {
    let engine = Engine::new(EngineConfig::quiet());
    // Deletes only resolve known type names.
    for ty in EDGE_TYPES {
        engine.types().element_type(Some(ty));
    }
    let sink = Arc::new(Mutex::new(InMemorySink::new()));
    engine.register_continuous_with_sink(pattern, sink.clone()).unwrap();

    let mut maintained = Counts::new();
    for batch in batches {
        let summary = engine.apply_changes(batch).unwrap();
        let rows = sink.lock().take();
        prop_assert_eq!(summary.emerged + summary.deleted, rows.len());
        for (kind, row) in rows {
            let delta = match kind {
                MatchKind::Emerged => 1,
                MatchKind::Deleted => -1,
                MatchKind::Matched => unreachable!("delta queries never report MATCHED"),
            };
            *maintained.entry(key(&row)).or_insert(0) += delta;
        }
        maintained.retain(|_, count| *count != 0);
        prop_assert_eq!(&maintained, &recomputed(&engine, pattern));
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_deltas_track_recomputation(
        choice in 0usize..4,
        batches in prop::collection::vec(prop::collection::vec(arb_change(), 1..8), 1..8),
    ) {
        check_maintenance(&pattern(choice), &batches)?;
    }

    #[test]
    fn prop_mixed_type_deltas_track_recomputation(
        choice in 0usize..4,
        typed in prop::collection::vec(prop::option::of(0usize..2), 1..4),
        batches in prop::collection::vec(prop::collection::vec(arb_typed_change(), 1..8), 1..8),
    ) {
        let rel_types: Vec<Option<&str>> = typed.iter().map(|t| t.map(|t| EDGE_TYPES[t])).collect();
        check_maintenance(&typed_pattern(choice, &rel_types), &batches)?;
    }
}

#[test]
fn parallel_edge_under_a_wildcard_is_its_own_match() {
    let engine = Engine::new(EngineConfig::quiet());
    let sink = Arc::new(Mutex::new(InMemorySink::new()));
    let pattern = QueryBuilder::new().edge("a", "b", None).build().unwrap();
    engine.create_edges(&[EdgeSpec::new(1, 2).typed("X")]).unwrap();
    engine.register_continuous_with_sink(&pattern, sink.clone()).unwrap();
    let before = engine.match_once(&pattern).unwrap();
    assert_eq!(before.len(), 1);

    let summary = engine.create_edges(&[EdgeSpec::new(1, 2).typed("Y")]).unwrap();
    let after = engine.match_once(&pattern).unwrap();
    assert_eq!(after.len(), 2);
    assert_eq!((summary.emerged, summary.deleted), (1, 0));
    let emerged = sink.lock().take();
    assert_eq!(emerged.len(), 1);
    assert!(!before.contains(&emerged[0].1));
    assert!(after.contains(&emerged[0].1));

    engine.delete_edges(&[EdgeKey::new(1, 2, Some("X"))]).unwrap();
    let deleted = sink.lock().take();
    assert_eq!(deleted, vec![(MatchKind::Deleted, before[0].clone())]);
    assert_eq!(engine.match_once(&pattern).unwrap(), vec![emerged[0].1.clone()]);
}

#[test]
fn add_and_delete_in_one_batch_reports_both() {
    let engine = Engine::new(EngineConfig::quiet());
    let sink = Arc::new(Mutex::new(InMemorySink::new()));
    let pattern = QueryBuilder::new().edge("a", "b", None).build().unwrap();
    engine.register_continuous_with_sink(&pattern, sink.clone()).unwrap();

    let summary = engine
        .apply_changes(&[
            EdgeChange::Create(EdgeSpec::new(1, 2)),
            EdgeChange::Delete(EdgeKey::new(1, 2, None)),
        ])
        .unwrap();
    assert_eq!((summary.emerged, summary.deleted), (1, 1));
    assert_eq!(
        (summary.finalize.promoted, summary.finalize.removed, summary.finalize.touched),
        (0, 0, 1)
    );
    let rows = sink.lock().take();
    let kinds: Vec<MatchKind> = rows.iter().map(|(kind, _)| *kind).collect();
    assert_eq!(kinds, vec![MatchKind::Emerged, MatchKind::Deleted]);
    assert_eq!(rows[0].1, rows[1].1);
    assert!(engine.match_once(&pattern).unwrap().is_empty());
}

#[test]
fn emerged_edges_become_permanent_matches() {
    let engine = Engine::new(EngineConfig::quiet());
    let sink = Arc::new(Mutex::new(InMemorySink::new()));
    let pattern = QueryBuilder::new()
        .edge("a", "b", Some("KNOWS"))
        .edge("b", "c", Some("KNOWS"))
        .build()
        .unwrap();
    engine.register_continuous_with_sink(&pattern, sink.clone()).unwrap();

    engine
        .create_edges(&[EdgeSpec::new(1, 2).typed("KNOWS"), EdgeSpec::new(2, 3).typed("KNOWS")])
        .unwrap();
    let emerged = sink.lock().take();
    assert_eq!(emerged.len(), 1);
    assert_eq!(emerged[0].0, MatchKind::Emerged);

    let graph = engine.graph();
    assert_eq!(graph.read().edge_count(GraphVersion::Permanent), 2);
    assert!(!graph.read().has_pending_changes());
    let permanent = engine.match_once(&pattern).unwrap();
    assert_eq!(permanent, vec![emerged[0].1.clone()]);

    // A later batch that touches an unrelated edge reports nothing.
    engine
        .create_edges(&[EdgeSpec::new(7, 8).typed("OTHER")])
        .unwrap();
    assert!(sink.lock().is_empty());

    engine.delete_edges(&[EdgeKey::new(2, 3, Some("KNOWS"))]).unwrap();
    let deleted = sink.lock().take();
    assert_eq!(deleted, vec![(MatchKind::Deleted, emerged[0].1.clone())]);
}

#[test]
fn readding_a_deleted_edge_cancels_out() {
    let engine = Engine::new(EngineConfig::quiet());
    let sink = Arc::new(Mutex::new(InMemorySink::new()));
    let pattern = QueryBuilder::new().edge("a", "b", None).build().unwrap();
    engine.create_edges(&[EdgeSpec::new(1, 2)]).unwrap();
    engine.register_continuous_with_sink(&pattern, sink.clone()).unwrap();

    let summary = engine
        .apply_changes(&[
            EdgeChange::Delete(EdgeKey::new(1, 2, None)),
            EdgeChange::Create(EdgeSpec::new(1, 2)),
        ])
        .unwrap();
    assert_eq!((summary.emerged, summary.deleted), (1, 1));
    assert_eq!(engine.match_once(&pattern).unwrap().len(), 1);
}

#![allow(clippy::all)]

use std::collections::BTreeSet;
use std::sync::Arc;

use flowmatch::{
    query::{
        ast::{ComparisonOp, Pattern, PropertyRef},
        executor, OneTimeMatchPlanner, QueryBuilder,
    },
    storage::{catalog::TypeStore, Direction, GraphOptions, GraphVersion, PropValue, VersionedGraph},
    types::{FlowError, Result, VertexId},
};
use proptest::prelude::*;

const EDGE_TYPES: [&str; 2] = ["T0", "T1"];

fn permanent_graph(types: &TypeStore, edges: &[(u64, u64, usize)]) -> VersionedGraph {
    let mut graph = VersionedGraph::new(GraphOptions::new());
    for &(src, dst, ty) in edges {
        let ty = types.element_type(Some(EDGE_TYPES[ty]));
        graph
            .add_edge(VertexId(src), VertexId(dst), ty, std::iter::empty())
            .unwrap();
    }
    graph.finalize_changes();
    graph
}

fn run(types: &Arc<TypeStore>, graph: &VersionedGraph, pattern: &Pattern) -> Result<Vec<Vec<VertexId>>> {
    let plan = OneTimeMatchPlanner::new(Arc::clone(types)).plan_pattern(pattern)?;
    let mut rows: Vec<Vec<VertexId>> = executor::collect(&plan, graph)?
        .into_iter()
        .map(|row| row.vertices)
        .collect();
    rows.sort();
    Ok(rows)
}

// Every assignment of pattern variables to graph vertices that satisfies all
// relations, in pattern variable order, repeated once per combination of
// matching edges.
fn brute_force(types: &TypeStore, graph: &VersionedGraph, pattern: &Pattern) -> Vec<Vec<VertexId>> {
    let names = pattern.variable_names();
    let domain = graph.vertices();
    let mut out = Vec::new();
    let mut assignment = vec![VertexId(0); names.len()];
    fn walk(
        depth: usize,
        names: &[String],
        domain: &[VertexId],
        assignment: &mut Vec<VertexId>,
        combinations: &dyn Fn(&[VertexId]) -> usize,
        out: &mut Vec<Vec<VertexId>>,
    ) {
        if depth == names.len() {
            for _ in 0..combinations(assignment.as_slice()) {
                out.push(assignment.clone());
            }
            return;
        }
        for v in domain {
            assignment[depth] = *v;
            walk(depth + 1, names, domain, assignment, combinations, out);
        }
    }
    let position = |name: &str| names.iter().position(|n| n == name).unwrap();
    let combinations = |assignment: &[VertexId]| {
        pattern
            .relations
            .iter()
            .map(|rel| {
                let ty = types.type_id_or_insert(rel.rel_type.as_deref());
                let from = assignment[position(&rel.from)];
                let to = assignment[position(&rel.to)];
                let linked = graph
                    .neighbors(from, Direction::Forward, GraphVersion::Permanent, ty)
                    .contains(&to);
                let edges = graph.edges_between(from, to, ty, GraphVersion::Permanent).len();
                assert_eq!(linked, edges > 0);
                edges
            })
            .product::<usize>()
    };
    walk(0, &names, &domain, &mut assignment, &combinations, &mut out);
    out.sort();
    out
}

fn shape(choice: usize, types: &[Option<&str>]) -> Pattern {
    let ty = |idx: usize| types[idx % types.len()];
    let builder = QueryBuilder::new();
    let builder = match choice {
        0 => builder
            .edge("a", "b", ty(0))
            .edge("b", "c", ty(1))
            .edge("c", "a", ty(2)),
        1 => builder.edge("a", "b", ty(0)).edge("b", "c", ty(1)),
        2 => builder
            .edge("h", "x", ty(0))
            .edge("h", "y", ty(1))
            .edge("z", "h", ty(2)),
        3 => builder
            .edge("a", "b", ty(0))
            .edge("b", "c", ty(1))
            .edge("c", "d", ty(2))
            .edge("d", "a", ty(3)),
        4 => builder.edge("a", "b", ty(0)).edge("c", "d", ty(1)),
        _ => builder
            .edge("a", "b", ty(0))
            .edge("b", "a", ty(1))
            .edge("b", "c", ty(2)),
    };
    builder.build().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_one_time_match_equals_brute_force(
        edges in prop::collection::vec((0u64..6, 0u64..6, 0usize..2), 0..24),
        choice in 0usize..6,
        typed in prop::collection::vec(prop::option::of(0usize..2), 1..4),
    ) {
        let types = Arc::new(TypeStore::new());
        let graph = permanent_graph(&types, &edges);
        let rel_types: Vec<Option<&str>> = typed.iter().map(|t| t.map(|t| EDGE_TYPES[t])).collect();
        let pattern = shape(choice, &rel_types);
        let expected = brute_force(&types, &graph, &pattern);
        let actual = run(&types, &graph, &pattern).unwrap();
        prop_assert_eq!(actual, expected);

        let plan = OneTimeMatchPlanner::new(Arc::clone(&types)).plan_pattern(&pattern).unwrap();
        let rows = executor::collect(&plan, &graph).unwrap();
        let distinct: BTreeSet<_> = rows.iter().map(|row| (row.vertices.clone(), row.edges.clone())).collect();
        prop_assert_eq!(distinct.len(), rows.len(), "duplicate rows");
    }
}

#[test]
fn typed_vertices_restrict_candidates() -> Result<()> {
    let types = Arc::new(TypeStore::new());
    let person = types.type_id_or_insert(Some("Person"));
    let city = types.type_id_or_insert(Some("City"));
    let lives = types.element_type(Some("LIVES_IN"));
    let mut graph = VersionedGraph::new(GraphOptions::new());
    graph.upsert_vertex(VertexId(1), person, std::iter::empty())?;
    graph.upsert_vertex(VertexId(2), person, std::iter::empty())?;
    graph.upsert_vertex(VertexId(10), city, std::iter::empty())?;
    graph.upsert_vertex(VertexId(3), city, std::iter::empty())?;
    graph.add_edge(VertexId(1), VertexId(10), lives, std::iter::empty())?;
    graph.add_edge(VertexId(2), VertexId(10), lives, std::iter::empty())?;
    graph.add_edge(VertexId(3), VertexId(10), lives, std::iter::empty())?;
    graph.finalize_changes();

    let pattern = QueryBuilder::new()
        .edge("p:Person", "c:City", Some("LIVES_IN"))
        .build()?;
    let rows = run(&types, &graph, &pattern)?;
    assert_eq!(
        rows,
        vec![vec![VertexId(1), VertexId(10)], vec![VertexId(2), VertexId(10)]]
    );
    Ok(())
}

#[test]
fn rows_report_edges_in_declaration_order() -> Result<()> {
    let types = Arc::new(TypeStore::new());
    let ty = types.element_type(None);
    let mut graph = VersionedGraph::new(GraphOptions::new());
    let ab = graph.add_edge(VertexId(1), VertexId(2), ty, std::iter::empty())?;
    let bc = graph.add_edge(VertexId(2), VertexId(3), ty, std::iter::empty())?;
    graph.finalize_changes();

    // Declared c-side first so the planner's order differs from declaration.
    let pattern = QueryBuilder::new()
        .edge("b", "c", None)
        .edge("a", "b", None)
        .build()?;
    let plan = OneTimeMatchPlanner::new(Arc::clone(&types)).plan_pattern(&pattern)?;
    let rows = executor::collect(&plan, &graph)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].vertices, vec![VertexId(2), VertexId(3), VertexId(1)]);
    assert_eq!(rows[0].edges, vec![bc, ab]);
    Ok(())
}

#[test]
fn predicates_filter_rows() -> Result<()> {
    let types = Arc::new(TypeStore::new());
    let ty = types.element_type(None);
    let age = types.prop_id_or_insert("age");
    let weight = types.prop_id_or_insert("weight");
    let mut graph = VersionedGraph::new(GraphOptions::new());
    graph.upsert_vertex(VertexId(1), None, [(age, PropValue::Int(40))])?;
    graph.upsert_vertex(VertexId(2), None, [(age, PropValue::Int(20))])?;
    graph.upsert_vertex(VertexId(3), None, [(age, PropValue::Float(35.5))])?;
    graph.add_edge(VertexId(1), VertexId(2), ty, [(weight, PropValue::Int(5))])?;
    graph.add_edge(VertexId(2), VertexId(3), ty, [(weight, PropValue::Int(50))])?;
    graph.add_edge(VertexId(3), VertexId(1), ty, std::iter::empty())?;
    graph.finalize_changes();

    let older_target = QueryBuilder::new()
        .named_edge("r", "a", "b", None)
        .where_prop("b", "age", ComparisonOp::Gt, 30i64)
        .build()?;
    assert_eq!(
        run(&types, &graph, &older_target)?,
        vec![vec![VertexId(2), VertexId(3)], vec![VertexId(3), VertexId(1)]]
    );

    // Missing properties never satisfy a comparison.
    let heavy = QueryBuilder::new()
        .named_edge("r", "a", "b", None)
        .where_prop("r", "weight", ComparisonOp::Ne, 5i64)
        .build()?;
    assert_eq!(run(&types, &graph, &heavy)?, vec![vec![VertexId(2), VertexId(3)]]);

    let younger_source = QueryBuilder::new()
        .edge("a", "b", None)
        .where_prop("a", "age", ComparisonOp::Lt, PropertyRef::new("b", "age"))
        .build()?;
    assert_eq!(
        run(&types, &graph, &younger_source)?,
        vec![vec![VertexId(2), VertexId(3)], vec![VertexId(3), VertexId(1)]]
    );
    Ok(())
}

#[test]
fn invalid_patterns_are_rejected() {
    let self_loop = QueryBuilder::new().edge("a", "a", None).build();
    assert!(matches!(self_loop, Err(FlowError::Plan(_))));
    let unknown = QueryBuilder::new()
        .edge("a", "b", None)
        .where_prop("z", "age", ComparisonOp::Eq, 1i64)
        .build();
    assert!(matches!(unknown, Err(FlowError::Plan(_))));
}

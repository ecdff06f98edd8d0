#![allow(clippy::all)]

use std::sync::Arc;

use flowmatch::{
    query::{
        physical::{Direction, EdgeIntersectionRule, GraphVersion},
        ast::Pattern,
        ContinuousMatchPlanner, ContinuousMatchQueryPlan, QueryBuilder,
    },
    sink::{shared, InMemorySink},
    storage::catalog::TypeStore,
    types::{Result, TypeId},
};

use GraphVersion::{DiffMinus, DiffPlus, Merged, Permanent};

fn rule(prefix: usize, direction: Direction, version: GraphVersion, ty: Option<TypeId>) -> EdgeIntersectionRule {
    EdgeIntersectionRule::new(prefix, direction, version, ty)
}

fn plan(types: &Arc<TypeStore>, pattern: &Pattern) -> Result<ContinuousMatchQueryPlan> {
    ContinuousMatchPlanner::new(Arc::clone(types)).plan_pattern(pattern, shared(InMemorySink::new()))
}

fn triangle(types: [Option<&str>; 3]) -> Result<Pattern> {
    Ok(QueryBuilder::new()
        .edge("a", "b", types[0])
        .edge("b", "c", types[1])
        .edge("c", "a", types[2])
        .build()?)
}

#[test]
fn triangle_delta_queries() -> Result<()> {
    let types = Arc::new(TypeStore::new());
    let plan = plan(&types, &triangle([None; 3])?)?;
    assert_eq!(plan.len(), 6);
    assert_eq!(plan.relation_names, vec!["0_anon_rel", "1_anon_rel", "2_anon_rel"]);
    assert_eq!(plan.variable_names, vec!["a", "b", "c"]);

    use Direction::{Backward, Forward};
    let expected_later: [Vec<EdgeIntersectionRule>; 3] = [
        // diff a->b: both other relations still PERMANENT.
        vec![rule(0, Backward, Permanent, None), rule(1, Forward, Permanent, None)],
        // diff b->c over order b, c, a: a->b already MERGED.
        vec![rule(0, Backward, Merged, None), rule(1, Forward, Permanent, None)],
        // diff c->a over order c, a, b: both others MERGED.
        vec![rule(0, Backward, Merged, None), rule(1, Forward, Merged, None)],
    ];
    let expected_orders = [["a", "b", "c"], ["b", "c", "a"], ["c", "a", "b"]];
    let expected_columns = [vec![0, 1, 2], vec![2, 0, 1], vec![1, 2, 0]];

    for (idx, delta) in plan.delta_queries.iter().enumerate() {
        let diff = idx / 2;
        let polarity = if idx % 2 == 0 { DiffPlus } else { DiffMinus };
        assert_eq!(delta.diff_relation, diff);
        assert_eq!(delta.polarity, polarity);
        assert_eq!(delta.plan.ordered_variables, expected_orders[diff]);
        assert_eq!(
            delta.plan.stages,
            vec![vec![rule(0, Forward, polarity, None)], expected_later[diff].clone()],
            "delta {idx}"
        );
        assert_eq!(delta.plan.tail.vertex_columns, expected_columns[diff]);
        let versions: Vec<GraphVersion> = delta.plan.tail.edges.iter().map(|e| e.version).collect();
        let mut want = [Merged, Merged, Merged];
        for (rel, slot) in want.iter_mut().enumerate() {
            if rel == diff {
                *slot = polarity;
            } else if rel > diff {
                *slot = Permanent;
            }
        }
        assert_eq!(versions, want);
    }
    Ok(())
}

#[test]
fn typed_triangle_rules_carry_relation_types() -> Result<()> {
    let types = Arc::new(TypeStore::new());
    let pattern = triangle([Some("KNOWS"), Some("WORKS_WITH"), Some("LIKES")])?;
    let plan = plan(&types, &pattern)?;
    let knows = types.type_id(Some("KNOWS"))?;
    let works = types.type_id(Some("WORKS_WITH"))?;
    let likes = types.type_id(Some("LIKES"))?;

    use Direction::{Backward, Forward};
    let first = &plan.delta_queries[0].plan;
    assert_eq!(
        first.stages,
        vec![
            vec![rule(0, Forward, DiffPlus, knows)],
            vec![rule(0, Backward, Permanent, likes), rule(1, Forward, Permanent, works)],
        ]
    );
    let last = &plan.delta_queries[5].plan;
    assert_eq!(
        last.stages,
        vec![
            vec![rule(0, Forward, DiffMinus, likes)],
            vec![rule(0, Backward, Merged, works), rule(1, Forward, Merged, knows)],
        ]
    );
    let text = plan.explain().to_string();
    assert!(text.contains("DIFF_MINUS"));
    assert!(text.starts_with("plan_hash="));
    Ok(())
}

#[test]
fn parallel_typed_relations_share_the_first_stage() -> Result<()> {
    let types = Arc::new(TypeStore::new());
    let pattern = QueryBuilder::new()
        .edge("a", "b", Some("FOLLOWS"))
        .edge("a", "b", Some("LIKES"))
        .edge("b", "a", Some("LIKES"))
        .edge("b", "c", None)
        .edge("c", "b", None)
        .edge("c", "a", Some("FOLLOWS"))
        .build()?;
    let plan = plan(&types, &pattern)?;
    assert_eq!(plan.len(), 12);
    let follows = types.type_id(Some("FOLLOWS"))?;
    let likes = types.type_id(Some("LIKES"))?;

    use Direction::{Backward, Forward};
    // Per diff relation: variable order, stage 0 after the diff rule, stage 1.
    let expected: [(&[&str], Vec<EdgeIntersectionRule>, Vec<EdgeIntersectionRule>); 6] = [
        (
            &["a", "b", "c"],
            vec![rule(0, Forward, Permanent, likes), rule(0, Backward, Permanent, likes)],
            vec![
                rule(0, Backward, Permanent, follows),
                rule(1, Forward, Permanent, None),
                rule(1, Backward, Permanent, None),
            ],
        ),
        (
            &["a", "b", "c"],
            vec![rule(0, Forward, Merged, follows), rule(0, Backward, Permanent, likes)],
            vec![
                rule(0, Backward, Permanent, follows),
                rule(1, Forward, Permanent, None),
                rule(1, Backward, Permanent, None),
            ],
        ),
        (
            &["b", "a", "c"],
            vec![rule(0, Backward, Merged, follows), rule(0, Backward, Merged, likes)],
            vec![
                rule(0, Forward, Permanent, None),
                rule(0, Backward, Permanent, None),
                rule(1, Backward, Permanent, follows),
            ],
        ),
        (
            &["b", "c", "a"],
            vec![rule(0, Backward, Permanent, None)],
            vec![
                rule(0, Backward, Merged, follows),
                rule(0, Backward, Merged, likes),
                rule(0, Forward, Merged, likes),
                rule(1, Forward, Permanent, follows),
            ],
        ),
        (
            &["c", "b", "a"],
            vec![rule(0, Backward, Merged, None)],
            vec![
                rule(0, Forward, Permanent, follows),
                rule(1, Backward, Merged, follows),
                rule(1, Backward, Merged, likes),
                rule(1, Forward, Merged, likes),
            ],
        ),
        (
            &["c", "a", "b"],
            vec![],
            vec![
                rule(0, Backward, Merged, None),
                rule(0, Forward, Merged, None),
                rule(1, Forward, Merged, follows),
                rule(1, Forward, Merged, likes),
                rule(1, Backward, Merged, likes),
            ],
        ),
    ];

    for (idx, delta) in plan.delta_queries.iter().enumerate() {
        let diff = idx / 2;
        let polarity = if idx % 2 == 0 { DiffPlus } else { DiffMinus };
        let (order, colocated, extend) = &expected[diff];
        assert_eq!(delta.diff_relation, diff);
        assert_eq!(delta.polarity, polarity);
        assert_eq!(delta.plan.ordered_variables, *order, "delta {idx}");
        let diff_type = types.type_id(pattern.relations[diff].rel_type.as_deref())?;
        let mut first = vec![rule(0, Forward, polarity, diff_type)];
        first.extend(colocated.iter().cloned());
        assert_eq!(delta.plan.stages, vec![first, extend.clone()], "delta {idx}");
    }
    Ok(())
}

#[test]
fn every_delta_reads_exactly_one_diff() -> Result<()> {
    let types = Arc::new(TypeStore::new());
    let pattern = QueryBuilder::new()
        .edge("a", "b", None)
        .edge("b", "c", None)
        .edge("c", "d", None)
        .edge("d", "a", None)
        .edge("a", "c", None)
        .build()?;
    let plan = plan(&types, &pattern)?;
    assert_eq!(plan.len(), 2 * pattern.relations.len());
    for delta in &plan.delta_queries {
        let rel = &pattern.relations[delta.diff_relation];
        assert_eq!(delta.plan.ordered_variables[..2], [rel.from.clone(), rel.to.clone()]);
        assert_eq!(delta.plan.scan_version(), delta.polarity);
        let diff_rules = delta
            .plan
            .stages
            .iter()
            .flatten()
            .filter(|rule| rule.version.is_diff())
            .count();
        assert_eq!(diff_rules, 1);
        for (pos, stage) in delta.plan.stages.iter().enumerate() {
            assert!(!stage.is_empty(), "connected pattern has no empty stage");
            assert!(stage.iter().all(|rule| rule.prefix_index <= pos));
        }
    }
    Ok(())
}

#[test]
fn planning_is_deterministic() -> Result<()> {
    let pattern = QueryBuilder::new()
        .edge("x", "y", Some("A"))
        .edge("y", "z", Some("B"))
        .edge("z", "w", None)
        .edge("w", "x", Some("A"))
        .build()?;
    let types = Arc::new(TypeStore::new());
    let first = plan(&types, &pattern)?;
    let second = plan(&types, &pattern)?;
    assert_eq!(first.delta_queries, second.delta_queries);
    assert_eq!(first.explain().plan_hash, second.explain().plan_hash);
    Ok(())
}

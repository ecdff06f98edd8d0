//! Greedy variable-ordering heuristic.
//!
//! The first variable is the one with the highest degree. Each following
//! variable is the candidate adjacent to the ordered prefix that maximises
//! `(ordered neighbors, degree)`; names break remaining ties so the order is
//! a pure function of the query graph. Disconnected components are ordered
//! one after another by re-seeding.

use std::collections::BTreeSet;

use crate::query::graph::QueryGraph;

/// Orders every variable of `graph`.
pub fn order_variables(graph: &QueryGraph) -> Vec<String> {
    complete_order(graph, Vec::new())
}

/// Extends a forced prefix to a full order.
pub fn complete_order(graph: &QueryGraph, mut ordered: Vec<String>) -> Vec<String> {
    let mut remaining: BTreeSet<&str> = graph
        .variables()
        .filter(|var| !ordered.iter().any(|done| done == var))
        .collect();
    while !remaining.is_empty() {
        let next = next_adjacent(graph, &ordered, &remaining)
            .or_else(|| seed(graph, &remaining));
        let Some(next) = next else {
            break;
        };
        remaining.remove(next);
        ordered.push(next.to_owned());
    }
    ordered
}

// Highest degree first; `remaining` iterates in name order so the first
// maximum is the smallest name.
fn seed<'a>(graph: &QueryGraph, remaining: &BTreeSet<&'a str>) -> Option<&'a str> {
    let mut best: Option<(&str, usize)> = None;
    for &var in remaining {
        let degree = graph.degree(var);
        if best.map_or(true, |(_, best_degree)| degree > best_degree) {
            best = Some((var, degree));
        }
    }
    best.map(|(var, _)| var)
}

fn next_adjacent<'a>(
    graph: &QueryGraph,
    ordered: &[String],
    remaining: &BTreeSet<&'a str>,
) -> Option<&'a str> {
    let mut best: Option<(&str, (usize, usize))> = None;
    for &var in remaining {
        let covered = ordered
            .iter()
            .filter(|done| graph.is_adjacent(var, done))
            .count();
        if covered == 0 {
            continue;
        }
        let score = (covered, graph.degree(var));
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((var, score));
        }
    }
    best.map(|(var, _)| var)
}

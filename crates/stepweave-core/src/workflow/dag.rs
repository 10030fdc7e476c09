//! Static cycle analysis over the step graph.
//!
//! Uses `petgraph` to model the successor edges the engine can follow. An
//! edge is *unconditional* when it is the only way out of a step (first
//! `next_steps` entry, or first parallel member of a group without a
//! successor) and *conditional* when it comes from a condition case or
//! default. A cycle made purely of unconditional edges can never exit; a
//! cycle through a condition may, so it is only reported.

use std::collections::HashMap;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use stepweave_types::workflow::WorkflowDefinition;

/// Whether an edge is always taken or depends on data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Unconditional,
    Conditional,
}

/// Cycles found in a definition, each as a list of step ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub unconditional: Vec<Vec<String>>,
    pub conditional: Vec<Vec<String>>,
}

/// Build the successor graph. Unknown targets are skipped; referential
/// integrity is checked separately by validation.
pub fn build_successor_graph(def: &WorkflowDefinition) -> DiGraph<&str, EdgeKind> {
    let mut graph = DiGraph::<&str, EdgeKind>::new();
    let index: HashMap<&str, NodeIndex> = def
        .steps
        .iter()
        .map(|s| (s.id.as_str(), graph.add_node(s.id.as_str())))
        .collect();

    for step in &def.steps {
        let from = index[step.id.as_str()];
        let mut link = |to: &str, kind: EdgeKind| {
            if let Some(&target) = index.get(to) {
                graph.update_edge(from, target, kind);
            }
        };

        if let Some(condition) = &step.condition {
            for case in &condition.cases {
                link(case.next_step.as_str(), EdgeKind::Conditional);
            }
            if !condition.default.is_empty() {
                link(condition.default.as_str(), EdgeKind::Conditional);
            }
        } else if let Some(next) = step.next_steps.first() {
            link(next.as_str(), EdgeKind::Unconditional);
        } else if let Some(first) = step.parallel_members().and_then(|m| m.first()) {
            link(first.as_str(), EdgeKind::Unconditional);
        }
    }

    graph
}

/// Find every strongly connected component that forms a cycle.
pub fn find_cycles(def: &WorkflowDefinition) -> CycleReport {
    let graph = build_successor_graph(def);
    let unconditional_only = graph.filter_map(
        |_, id| Some(*id),
        |_, kind| (*kind == EdgeKind::Unconditional).then_some(*kind),
    );

    let unconditional = cyclic_components(&unconditional_only);
    let conditional = cyclic_components(&graph)
        .into_iter()
        .filter(|cycle| !unconditional.iter().any(|u| same_members(u, cycle)))
        .collect();

    CycleReport {
        unconditional,
        conditional,
    }
}

fn cyclic_components(graph: &DiGraph<&str, EdgeKind>) -> Vec<Vec<String>> {
    tarjan_scc(graph)
        .into_iter()
        .filter(|component| {
            component.len() > 1 || graph.find_edge(component[0], component[0]).is_some()
        })
        .map(|component| {
            let mut ids: Vec<String> = component.iter().map(|&n| graph[n].to_string()).collect();
            ids.sort();
            ids
        })
        .collect()
}

fn same_members(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().all(|id| b.contains(id))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn def(json: &str) -> WorkflowDefinition {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_linear_chain_has_no_cycles() {
        let d = def(r#"{"start_step":"a","steps":[
            {"id":"a","type":"script","script":"x","next_steps":["b"]},
            {"id":"b","type":"script","script":"y"}]}"#);
        assert_eq!(find_cycles(&d), CycleReport::default());
    }

    #[test]
    fn test_self_loop_is_unconditional_cycle() {
        let d = def(r#"{"start_step":"a","steps":[
            {"id":"a","type":"script","script":"x","next_steps":["a"]}]}"#);
        let report = find_cycles(&d);
        assert_eq!(report.unconditional, vec![vec!["a".to_string()]]);
        assert!(report.conditional.is_empty());
    }

    #[test]
    fn test_only_first_next_step_is_an_edge() {
        let d = def(r#"{"start_step":"a","steps":[
            {"id":"a","type":"script","script":"x","next_steps":["b","a"]},
            {"id":"b","type":"script","script":"y"}]}"#);
        assert_eq!(find_cycles(&d), CycleReport::default());
    }

    #[test]
    fn test_condition_overrides_next_steps() {
        let d = def(r#"{"start_step":"a","steps":[
            {"id":"a","type":"script","script":"x","next_steps":["a"],
             "condition":{"type":"if","expression":"go","cases":[{"value":true,"next_step":"b"}]}},
            {"id":"b","type":"script","script":"y"}]}"#);
        assert_eq!(find_cycles(&d), CycleReport::default());
    }

    #[test]
    fn test_parallel_anchor_edge() {
        let d = def(r#"{"start_step":"g","steps":[
            {"id":"g","type":"parallel","parallel":["m"]},
            {"id":"m","type":"script","script":"x","next_steps":["g"]}]}"#);
        let report = find_cycles(&d);
        assert_eq!(report.unconditional.len(), 1);
    }

    #[test]
    fn test_mixed_cycle_is_conditional() {
        let d = def(r#"{"start_step":"a","steps":[
            {"id":"a","type":"script","script":"x","next_steps":["b"]},
            {"id":"b","type":"condition","condition":{"type":"switch","expression":"s",
             "cases":[{"value":"again","next_step":"a"}],"default":""}}]}"#);
        let report = find_cycles(&d);
        assert!(report.unconditional.is_empty());
        assert_eq!(
            report.conditional,
            vec![vec!["a".to_string(), "b".to_string()]]
        );
    }
}

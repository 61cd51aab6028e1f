//! End-to-end scenarios through the public API.

use graphable_core::{Attributes, Direction, Graph, GraphConfig, GraphError, GraphErrorCode, Node};
use serde_json::json;

fn refs(nodes: &[Node<&'static str>]) -> Vec<&'static str> {
    nodes.iter().map(|n| *n.reference()).collect()
}

fn chain() -> (Graph<&'static str>, [Node<&'static str>; 3]) {
    let nodes = [Node::new("A"), Node::new("B"), Node::new("C")];
    let mut graph = Graph::new();
    graph
        .add_edge(&nodes[0], &nodes[1], Attributes::new())
        .expect("A→B");
    graph
        .add_edge(&nodes[1], &nodes[2], Attributes::new())
        .expect("B→C");
    (graph, nodes)
}

#[test]
fn chain_orders_and_rejects_closing_edge() {
    let (mut graph, [a, _b, c]) = chain();
    assert_eq!(refs(&graph.topological_order().expect("order")), vec!["A", "B", "C"]);

    let before = graph.checksum();
    let err = graph.add_edge(&c, &a, Attributes::new()).expect_err("rejected");
    assert_eq!(err.code(), GraphErrorCode::CycleDetected);
    assert_eq!(err.to_string(), "dependency cycle: C -> A -> B -> C");
    assert_eq!(graph.checksum(), before);
    assert_eq!(graph.edge_count(), 2);
}

#[test]
fn chain_critical_path() {
    let (graph, [a, b, c]) = chain();
    a.set_duration(2.0).expect("A");
    b.set_duration(3.0).expect("B");
    c.set_duration(1.0).expect("C");

    let report = graph.cpm_analysis().expect("cpm");
    let times: Vec<(f64, f64)> = [&a, &b, &c]
        .iter()
        .map(|n| {
            let t = report.timing(n).expect("timing");
            (t.earliest_start, t.earliest_finish)
        })
        .collect();
    assert_eq!(times, vec![(0.0, 2.0), (2.0, 5.0), (5.0, 6.0)]);
    assert!(report.iter().all(|(_, t)| t.slack.abs() < 1e-9));
    assert_eq!(refs(&graph.critical_path().expect("path")), vec!["A", "B", "C"]);
}

#[test]
fn diff_reports_added_node_and_edge() {
    let a = Node::new("A");
    let b = Node::new("B");
    let mut g1 = Graph::new();
    g1.add_edge(&a, &b, Attributes::new()).expect("A→B");

    let c = Node::new("C");
    let mut g2 = Graph::from_nodes([&a, &b]);
    g2.add_edge(&b, &c, Attributes::new()).expect("B→C");

    let diff = g1.diff(&g2);
    assert_eq!(diff.added_nodes, vec!["C"]);
    assert_eq!(diff.added_edges, vec![("B", "C")]);
    assert!(diff.removed_nodes.is_empty());
    assert!(diff.removed_edges.is_empty());
}

#[test]
fn shared_nodes_scope_per_graph() {
    // One node set, two graphs with different membership.
    let (full, [a, b, c]) = chain();
    let partial = Graph::from_nodes([&a, &c]);

    assert_eq!(full.edge_count(), 2);
    assert_eq!(partial.edge_count(), 0, "A→B→C passes through a non-member");
    assert_eq!(refs(&partial.topological_order().expect("order")), vec!["A", "C"]);
    assert!(!partial.is_ancestor_of(&a, &c));
    assert!(full.is_ancestor_of(&a, &c));

    // A node-level change is seen by both graphs.
    let before_full = full.checksum();
    let before_partial = partial.checksum();
    b.add_tag("shared");
    assert_ne!(full.checksum(), before_full);
    assert_eq!(partial.checksum(), before_partial, "B is not a member");
    c.add_tag("shared");
    assert_ne!(partial.checksum(), before_partial);
}

#[test]
fn node_level_relations_are_permissive_by_default() {
    let a = Node::new("a");
    let b = Node::new("b");
    a.add_dependent(&b, Attributes::new(), false).expect("a→b");
    b.add_dependent(&a, Attributes::new(), false).expect("b→a unchecked");

    let graph = Graph::from_nodes([&a, &b]);
    assert!(matches!(graph.topological_order(), Err(GraphError::Cycle { .. })));
    assert_eq!(graph.find_cycles().len(), 1);
    assert_eq!(graph.suggest_cycle_breaks()[0].suggested_breaks.len(), 1);

    a.remove_dependency(&b).expect("break loop");
    assert!(graph.check_cycles().is_ok());
}

#[test]
fn slicing_and_paths() {
    let nodes: Vec<Node<&'static str>> = ["fetch", "parse", "lint", "build", "ship"]
        .into_iter()
        .map(Node::new)
        .collect();
    let mut graph = Graph::new();
    for (from, to) in [(0, 1), (1, 2), (1, 3), (2, 4), (3, 4)] {
        graph
            .add_edge(&nodes[from], &nodes[to], Attributes::new())
            .expect("edge");
    }

    assert_eq!(
        refs(&graph.upstream_of(&nodes[3]).nodes()),
        vec!["fetch", "parse", "build"]
    );
    assert_eq!(
        refs(&graph.subgraph_between(&nodes[1], &nodes[4]).nodes()),
        vec!["parse", "lint", "build", "ship"]
    );
    let paths: Vec<Vec<&str>> = graph
        .all_paths(&nodes[0], &nodes[4])
        .map(|p| refs(&p))
        .collect();
    assert_eq!(
        paths,
        vec![
            vec!["fetch", "parse", "lint", "ship"],
            vec!["fetch", "parse", "build", "ship"],
        ]
    );
    assert_eq!(
        refs(&graph.layered_order().expect("layers")[2]),
        vec!["lint", "build"]
    );
}

#[test]
fn neighbors_and_attributes_through_graph() {
    let a = Node::new("a");
    let b = Node::new("b");
    let mut graph = Graph::new();
    let attrs: Attributes = [("weight".to_string(), json!(3))].into_iter().collect();
    graph.add_edge(&a, &b, attrs).expect("edge");

    let downstream = graph.neighbors(&a, Direction::Downstream);
    assert_eq!(downstream.len(), 1);
    assert_eq!(downstream[0].1["weight"], json!(3));

    let removed = graph.remove_edge(&a, &b).expect("remove");
    assert_eq!(removed["weight"], json!(3));
    assert!(graph.neighbors(&a, Direction::Downstream).is_empty());
}

#[test]
fn config_from_toml_drives_graph() {
    let config = GraphConfig::from_toml_str("max_paths = 1\ndiscover_on_build = true").expect("config");
    let (_full, [a, _b, c]) = chain();
    let graph = Graph::from_nodes_with_config([&a], config);
    assert_eq!(graph.len(), 3, "discovered on build");
    assert_eq!(graph.all_paths(&a, &c).count(), 1);
}

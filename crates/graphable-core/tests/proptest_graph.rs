use graphable_core::{Attributes, GraphError, GraphSnapshot};
use proptest::prelude::*;

use generators::*;

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(256))]

    // Ordering

    #[test]
    fn topological_order_respects_every_edge(spec in arb_dag(24)) {
        let nodes = spec.nodes();
        let graph = spec.build_in_order(&nodes, &spec.insertion_order);

        let order = graph.topological_order().expect("acyclic");
        prop_assert_eq!(order.len(), graph.len());

        let mut position = vec![usize::MAX; spec.size];
        for (pos, node) in order.iter().enumerate() {
            position[*node.reference()] = pos;
        }
        for &(from, to) in &spec.edges {
            prop_assert!(position[from] < position[to], "{} must precede {}", from, to);
        }

        // Cached result is identical.
        prop_assert_eq!(order, graph.topological_order().expect("cached"));
    }

    #[test]
    fn layers_concatenate_to_topological_order(spec in arb_dag(24)) {
        let nodes = spec.nodes();
        let graph = spec.build_in_order(&nodes, &spec.insertion_order);

        let layers = graph.layered_order().expect("acyclic");
        let flattened: Vec<_> = layers.iter().flatten().cloned().collect();
        prop_assert_eq!(flattened, graph.topological_order().expect("acyclic"));

        for (depth, layer) in layers.iter().enumerate().skip(1) {
            for node in layer {
                // Every node beyond layer 0 has a dependency in the layer just before it.
                let has_parent_in_previous = node
                    .dependencies()
                    .iter()
                    .any(|dep| layers[depth - 1].contains(dep));
                prop_assert!(has_parent_in_previous);
            }
        }
    }

    // Cycle rejection

    #[test]
    fn rejected_cycle_leaves_graph_unchanged(spec in arb_dag(16)) {
        prop_assume!(!spec.edges.is_empty());
        let nodes = spec.nodes();
        let mut graph = spec.build(&nodes);
        let before = graph.checksum();
        let edge_count = graph.edge_count();

        for &(from, to) in &spec.edges {
            let err = graph
                .add_edge(&nodes[to], &nodes[from], Attributes::new())
                .expect_err("rejected");
            let is_cycle = matches!(err, GraphError::Cycle { .. });
            prop_assert!(is_cycle);
        }

        prop_assert_eq!(graph.checksum(), before);
        prop_assert_eq!(graph.edge_count(), edge_count);
    }

    // Reduction

    #[test]
    fn transitive_reduction_preserves_reachability(spec in arb_dag(16)) {
        let nodes = spec.nodes();
        let graph = spec.build(&nodes);
        let reduced = graph.transitive_reduction().expect("acyclic");

        prop_assert!(reduced.edge_count() <= graph.edge_count());
        prop_assert_eq!(reachability(&reduced), reachability(&graph));

        // Reducing again removes nothing.
        let twice = reduced.transitive_reduction().expect("acyclic");
        prop_assert_eq!(twice.edge_count(), reduced.edge_count());
    }

    #[test]
    fn closure_materializes_reachability(spec in arb_dag(12)) {
        let nodes = spec.nodes();
        let graph = spec.build(&nodes);
        let closed = graph.transitive_closure();

        let expected: usize = reachability(&graph).iter().map(|(_, reached)| reached.len()).sum();
        prop_assert_eq!(closed.edge_count(), expected);
        prop_assert_eq!(reachability(&closed), reachability(&graph));
    }

    // Checksum

    #[test]
    fn checksum_ignores_insertion_order(spec in arb_dag(24)) {
        let natural = spec.build(&spec.nodes());
        let shuffled = spec.build_in_order(&spec.nodes(), &spec.insertion_order);
        prop_assert_eq!(natural.checksum(), shuffled.checksum());
        prop_assert!(natural.is_equal_to(&shuffled));
    }

    #[test]
    fn checksum_survives_serialization(spec in arb_dag(24)) {
        let nodes = spec.nodes();
        let graph = spec.build_in_order(&nodes, &spec.insertion_order);

        let json = serde_json::to_string(&GraphSnapshot::capture(&graph)).expect("serialize");
        let snapshot: GraphSnapshot<usize> = serde_json::from_str(&json).expect("deserialize");
        let restored = snapshot.restore_verified().expect("checksum matches");
        prop_assert!(graph.diff(&restored).is_empty());
    }

    // Discover

    #[test]
    fn discover_is_idempotent(spec in arb_dag(24), seed in 0usize..24) {
        let nodes = spec.nodes();
        let _full = spec.build(&nodes);
        let start = &nodes[seed % spec.size];

        let mut graph = graphable_core::Graph::from_nodes([start]);
        graph.discover();
        let once: Vec<usize> = graph.iter().map(|n| *n.reference()).collect();
        prop_assert_eq!(graph.discover(), 0);
        let twice: Vec<usize> = graph.iter().map(|n| *n.reference()).collect();
        prop_assert_eq!(once, twice);
    }

    // Critical path

    #[test]
    fn critical_path_spans_project_duration(spec in arb_dag(20)) {
        let nodes = spec.nodes();
        let graph = spec.build(&nodes);
        let report = graph.cpm_analysis().expect("acyclic");

        for (_, timing) in report.iter() {
            prop_assert!(timing.slack >= -1e-9);
        }

        let path = graph.critical_path().expect("acyclic");
        prop_assert!(!path.is_empty());
        let total: f64 = path.iter().map(|n| n.duration().unwrap_or(0.0)).sum();
        prop_assert!((total - report.project_duration()).abs() < 1e-9);
        for pair in path.windows(2) {
            prop_assert!(pair[1].depends_on(&pair[0]));
        }
    }
}

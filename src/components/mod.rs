pub mod feature_graph;

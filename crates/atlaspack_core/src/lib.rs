pub mod asset_graph;
pub mod hash;
pub mod types;

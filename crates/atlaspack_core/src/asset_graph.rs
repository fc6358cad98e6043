use std::collections::HashMap;
use std::sync::Arc;

use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;

use crate::types::Asset;
use crate::types::Dependency;

#[derive(Clone, Debug, PartialEq)]
pub enum AssetGraphNode {
  Root,
  Asset(Arc<Asset>),
  Dependency(Arc<Dependency>),
}

pub type NodeId = usize;

/// The finished graph of assets and the dependencies between them
///
/// Edges run root -> entry dependency, asset -> dependency and dependency -> resolved asset.
/// Bundling only reads from this graph.
#[derive(Clone, Debug)]
pub struct AssetGraph {
  pub graph: StableDiGraph<NodeId, ()>,
  nodes: Vec<AssetGraphNode>,
  content_key_to_node_id: HashMap<String, NodeId>,
  node_id_to_node_index: HashMap<NodeId, NodeIndex>,
  root_node_id: NodeId,
}

impl Default for AssetGraph {
  fn default() -> Self {
    Self::new()
  }
}

impl AssetGraph {
  pub fn new() -> Self {
    let mut graph = StableDiGraph::new();

    let mut node_id_to_node_index = HashMap::new();
    let nodes = vec![AssetGraphNode::Root];
    let root_node_id = 0;

    node_id_to_node_index.insert(root_node_id, graph.add_node(root_node_id));

    AssetGraph {
      graph,
      content_key_to_node_id: HashMap::new(),
      node_id_to_node_index,
      nodes,
      root_node_id,
    }
  }

  pub fn nodes(&self) -> impl Iterator<Item = &AssetGraphNode> {
    self.nodes.iter()
  }

  pub fn root_node(&self) -> NodeId {
    self.root_node_id
  }

  pub fn get_node(&self, idx: &NodeId) -> Option<&AssetGraphNode> {
    self.nodes.get(*idx)
  }

  pub fn get_node_id_by_content_key(&self, content_key: &str) -> Option<&NodeId> {
    self.content_key_to_node_id.get(content_key)
  }

  fn add_node(&mut self, content_key: String, node: AssetGraphNode) -> NodeId {
    if let Some(existing_node_id) = self.content_key_to_node_id.get(&content_key) {
      self.nodes[*existing_node_id] = node;
      return *existing_node_id;
    }

    let node_id = self.nodes.len();
    self.nodes.push(node);
    self.content_key_to_node_id.insert(content_key, node_id);

    let node_index = self.graph.add_node(node_id);
    self.node_id_to_node_index.insert(node_id, node_index);

    node_id
  }

  pub fn add_asset(&mut self, asset: Arc<Asset>) -> NodeId {
    self.add_node(asset.id.clone(), AssetGraphNode::Asset(asset))
  }

  pub fn get_asset_node(&self, idx: &NodeId) -> Option<&Arc<Asset>> {
    let AssetGraphNode::Asset(asset) = self.get_node(idx)? else {
      return None;
    };
    Some(asset)
  }

  pub fn add_dependency(&mut self, dependency: Dependency) -> NodeId {
    self.add_node(
      dependency.id(),
      AssetGraphNode::Dependency(Arc::new(dependency)),
    )
  }

  pub fn get_dependency_node(&self, idx: &NodeId) -> Option<&Arc<Dependency>> {
    let AssetGraphNode::Dependency(dependency) = self.get_node(idx)? else {
      return None;
    };
    Some(dependency)
  }

  /// Adds a dependency and connects it to the root node
  pub fn add_entry_dependency(&mut self, dependency: Dependency) -> NodeId {
    let root_node_id = self.root_node_id;
    let dependency_idx = self.add_dependency(dependency);
    self.add_edge(&root_node_id, &dependency_idx);
    dependency_idx
  }

  pub fn has_edge(&self, from_idx: &NodeId, to_idx: &NodeId) -> bool {
    self.graph.contains_edge(
      self.node_id_to_node_index[from_idx],
      self.node_id_to_node_index[to_idx],
    )
  }

  pub fn add_edge(&mut self, from_idx: &NodeId, to_idx: &NodeId) {
    if self.has_edge(from_idx, to_idx) {
      return;
    }

    self.graph.add_edge(
      self.node_id_to_node_index[from_idx],
      self.node_id_to_node_index[to_idx],
      (),
    );
  }

  fn outgoing(&self, node_id: &NodeId) -> Vec<NodeId> {
    let Some(node_index) = self.node_id_to_node_index.get(node_id) else {
      return Vec::new();
    };

    let mut neighbors: Vec<NodeId> = self
      .graph
      .edges_directed(*node_index, Direction::Outgoing)
      .filter_map(|edge| self.graph.node_weight(edge.target()).copied())
      .collect();

    // petgraph walks edges newest first
    neighbors.reverse();
    neighbors
  }

  /// Dependencies declared by an asset, in declaration order
  pub fn get_outgoing_dependencies(&self, asset_node_id: &NodeId) -> Vec<NodeId> {
    self.outgoing(asset_node_id)
  }

  /// The asset a dependency resolved to, if any
  pub fn resolve_dependency_asset(&self, dep_node_id: &NodeId) -> Option<NodeId> {
    self
      .outgoing(dep_node_id)
      .into_iter()
      .find(|node_id| self.get_asset_node(node_id).is_some())
  }

  pub fn entry_dependencies(&self) -> Vec<NodeId> {
    self.outgoing(&self.root_node_id)
  }

  pub fn get_assets(&self) -> impl Iterator<Item = (NodeId, &Arc<Asset>)> {
    self
      .nodes
      .iter()
      .enumerate()
      .filter_map(|(node_id, node)| match node {
        AssetGraphNode::Asset(asset) => Some((node_id, asset)),
        _ => None,
      })
  }

  pub fn get_dependencies(&self) -> impl Iterator<Item = (NodeId, &Arc<Dependency>)> {
    self
      .nodes
      .iter()
      .enumerate()
      .filter_map(|(node_id, node)| match node {
        AssetGraphNode::Dependency(dependency) => Some((node_id, dependency)),
        _ => None,
      })
  }

  pub fn asset_count(&self) -> usize {
    self.get_assets().count()
  }
}

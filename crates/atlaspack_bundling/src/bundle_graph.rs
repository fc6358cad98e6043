use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use atlaspack_core::types::{AssetId, Environment, FileType, MaybeBundleBehavior, Target};
use indexmap::IndexMap;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;

use crate::identity::manual_bundle_id;
use crate::ideal_graph::types::DecisionLog;

pub type NodeId = usize;

const ROOT_CONTENT_KEY: &str = "@@root";

/// Edge types in the bundle graph
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize)]
#[repr(u8)]
pub enum BundleGraphEdgeType {
  #[default]
  Null = 1,
  /// Bundle group -> bundle it loads, and root -> entry bundle group
  Bundle = 3,
  /// Bundle -> bundle it needs loaded alongside it
  References = 4,
  /// Bundle -> bundle group it loads on demand
  Async = 5,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BundleKind {
  /// Packages the assets of one bundle root
  Root,
  /// Generated to hold assets needed by several roots
  Shared,
  /// Declared by the user in `manualSharedBundles`
  Manual,
}

/// A file the bundler will write
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
  pub id: String,
  pub name: String,
  #[serde(rename = "type")]
  pub bundle_type: FileType,
  pub env: Arc<Environment>,
  pub target: Target,
  pub kind: BundleKind,

  /// Sorted ids of every asset written into this bundle
  pub asset_ids: Vec<AssetId>,

  /// Assets this bundle is the entry point for
  pub entry_asset_ids: Vec<AssetId>,
  pub main_entry_id: Option<AssetId>,
  pub needs_stable_name: bool,
  pub bundle_behavior: MaybeBundleBehavior,
  pub is_splittable: bool,

  /// Name of the manual shared bundle declaration this bundle came from
  pub manual_shared_bundle: Option<String>,

  /// Sum of the sizes of the bundle's assets
  pub size: u64,
}

impl Bundle {
  pub fn is_inline(&self) -> bool {
    self.bundle_behavior.is_some_and(|b| b.is_inline())
  }
}

/// A set of bundles that load together
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleGroup {
  pub id: String,
  pub entry_asset_id: AssetId,
  pub target: Target,
}

#[derive(Clone, Debug, PartialEq)]
#[allow(clippy::large_enum_variant)]
pub enum BundleGraphNode {
  Root,
  BundleGroup(BundleGroup),
  Bundle(Bundle),
}

/// The bundler's output: bundles, the groups that load them and how they reference each other
#[derive(Clone, Debug)]
pub struct BundleGraph {
  pub graph: StableDiGraph<NodeId, BundleGraphEdgeType>,
  nodes: Vec<BundleGraphNode>,
  node_id_to_node_index: HashMap<NodeId, NodeIndex>,
  content_key_to_node_id: IndexMap<String, NodeId>,
  root_node_id: NodeId,

  /// Why bundling made the choices it made
  pub decisions: DecisionLog,
}

impl Default for BundleGraph {
  fn default() -> Self {
    Self::new()
  }
}

impl BundleGraph {
  pub fn new() -> Self {
    let mut graph = StableDiGraph::new();
    let mut node_id_to_node_index = HashMap::new();
    let mut content_key_to_node_id = IndexMap::new();
    let root_node_id = 0;

    node_id_to_node_index.insert(root_node_id, graph.add_node(root_node_id));
    content_key_to_node_id.insert(ROOT_CONTENT_KEY.to_string(), root_node_id);

    Self {
      graph,
      nodes: vec![BundleGraphNode::Root],
      node_id_to_node_index,
      content_key_to_node_id,
      root_node_id,
      decisions: DecisionLog::default(),
    }
  }

  pub fn nodes(&self) -> impl Iterator<Item = &BundleGraphNode> {
    self.nodes.iter()
  }

  pub fn root_node(&self) -> NodeId {
    self.root_node_id
  }

  pub fn get_node(&self, idx: &NodeId) -> Option<&BundleGraphNode> {
    self.nodes.get(*idx)
  }

  pub fn get_node_id_by_content_key(&self, content_key: &str) -> Option<&NodeId> {
    self.content_key_to_node_id.get(content_key)
  }

  fn add_node(&mut self, content_key: String, node: BundleGraphNode) -> NodeId {
    let node_id = self.nodes.len();
    self.nodes.push(node);
    self.content_key_to_node_id.insert(content_key, node_id);

    let node_index = self.graph.add_node(node_id);
    self.node_id_to_node_index.insert(node_id, node_index);

    node_id
  }

  /// Adds a bundle group, or returns the existing group with the same id
  pub fn add_bundle_group(&mut self, group: BundleGroup) -> NodeId {
    if let Some(node_id) = self.content_key_to_node_id.get(&group.id) {
      return *node_id;
    }

    self.add_node(group.id.clone(), BundleGraphNode::BundleGroup(group))
  }

  /// Adds a bundle, merging it into an existing bundle with the same id
  ///
  /// Merging keeps the first main entry and unions entry assets, so identical bundles requested by
  /// several roots are written once.
  pub fn add_bundle(&mut self, bundle: Bundle) -> anyhow::Result<NodeId> {
    let Some(node_id) = self.content_key_to_node_id.get(&bundle.id).copied() else {
      return Ok(self.add_node(bundle.id.clone(), BundleGraphNode::Bundle(bundle)));
    };

    let Some(BundleGraphNode::Bundle(existing)) = self.nodes.get_mut(node_id) else {
      anyhow::bail!("bundle id {} is already used by another node", bundle.id);
    };

    anyhow::ensure!(
      existing.asset_ids == bundle.asset_ids,
      "bundles with id {} have different contents",
      bundle.id
    );

    for entry in bundle.entry_asset_ids {
      if !existing.entry_asset_ids.contains(&entry) {
        existing.entry_asset_ids.push(entry);
      }
    }
    existing.entry_asset_ids.sort();

    if existing.main_entry_id.is_none() {
      existing.main_entry_id = bundle.main_entry_id;
    }
    existing.needs_stable_name |= bundle.needs_stable_name;

    Ok(node_id)
  }

  pub fn has_edge(&self, from: &NodeId, to: &NodeId, edge_type: BundleGraphEdgeType) -> bool {
    self
      .graph
      .edges_connecting(
        self.node_id_to_node_index[from],
        self.node_id_to_node_index[to],
      )
      .any(|edge| *edge.weight() == edge_type)
  }

  pub fn add_edge(&mut self, from: &NodeId, to: &NodeId, edge_type: BundleGraphEdgeType) {
    if from == to || self.has_edge(from, to, edge_type) {
      return;
    }

    self.graph.add_edge(
      self.node_id_to_node_index[from],
      self.node_id_to_node_index[to],
      edge_type,
    );
  }

  /// Neighbours along edges of one type, in insertion order
  fn neighbors(
    &self,
    node_id: &NodeId,
    direction: Direction,
    edge_type: BundleGraphEdgeType,
  ) -> Vec<NodeId> {
    let Some(node_index) = self.node_id_to_node_index.get(node_id) else {
      return Vec::new();
    };

    let mut neighbors: Vec<NodeId> = self
      .graph
      .edges_directed(*node_index, direction)
      .filter(|edge| *edge.weight() == edge_type)
      .filter_map(|edge| {
        let other = match direction {
          Direction::Outgoing => edge.target(),
          Direction::Incoming => edge.source(),
        };
        self.graph.node_weight(other).copied()
      })
      .collect();

    // petgraph walks edges newest first
    neighbors.reverse();
    neighbors
  }

  fn bundle_node(&self, node_id: &NodeId) -> Option<&Bundle> {
    match self.nodes.get(*node_id)? {
      BundleGraphNode::Bundle(bundle) => Some(bundle),
      _ => None,
    }
  }

  fn bundle_group_node(&self, node_id: &NodeId) -> Option<&BundleGroup> {
    match self.nodes.get(*node_id)? {
      BundleGraphNode::BundleGroup(group) => Some(group),
      _ => None,
    }
  }

  pub fn bundles(&self) -> impl Iterator<Item = &Bundle> {
    self.nodes.iter().filter_map(|node| match node {
      BundleGraphNode::Bundle(bundle) => Some(bundle),
      _ => None,
    })
  }

  pub fn bundle_groups(&self) -> impl Iterator<Item = &BundleGroup> {
    self.nodes.iter().filter_map(|node| match node {
      BundleGraphNode::BundleGroup(group) => Some(group),
      _ => None,
    })
  }

  pub fn get_bundle(&self, bundle_id: &str) -> Option<&Bundle> {
    self
      .content_key_to_node_id
      .get(bundle_id)
      .and_then(|node_id| self.bundle_node(node_id))
  }

  pub fn get_bundle_group(&self, group_id: &str) -> Option<&BundleGroup> {
    self
      .content_key_to_node_id
      .get(group_id)
      .and_then(|node_id| self.bundle_group_node(node_id))
  }

  /// Bundle groups loaded when the application starts
  pub fn entry_bundle_groups(&self) -> Vec<&BundleGroup> {
    self
      .neighbors(&self.root_node_id, Direction::Outgoing, BundleGraphEdgeType::Bundle)
      .iter()
      .filter_map(|node_id| self.bundle_group_node(node_id))
      .collect()
  }

  /// Bundles a group loads, in load order
  ///
  /// Inline bundles are written into another bundle rather than requested, so they are skipped
  /// unless `include_inline` is set.
  pub fn bundles_in_group(&self, group_id: &str, include_inline: bool) -> Vec<&Bundle> {
    let Some(node_id) = self.content_key_to_node_id.get(group_id) else {
      return Vec::new();
    };

    self
      .neighbors(node_id, Direction::Outgoing, BundleGraphEdgeType::Bundle)
      .iter()
      .filter_map(|node_id| self.bundle_node(node_id))
      .filter(|bundle| include_inline || !bundle.is_inline())
      .collect()
  }

  pub fn bundle_groups_containing(&self, bundle_id: &str) -> Vec<&BundleGroup> {
    let Some(node_id) = self.content_key_to_node_id.get(bundle_id) else {
      return Vec::new();
    };

    self
      .neighbors(node_id, Direction::Incoming, BundleGraphEdgeType::Bundle)
      .iter()
      .filter_map(|node_id| self.bundle_group_node(node_id))
      .collect()
  }

  /// Bundles that must be loaded alongside `bundle_id`
  pub fn referenced_bundles(&self, bundle_id: &str) -> Vec<&Bundle> {
    let Some(node_id) = self.content_key_to_node_id.get(bundle_id) else {
      return Vec::new();
    };

    self
      .neighbors(node_id, Direction::Outgoing, BundleGraphEdgeType::References)
      .iter()
      .filter_map(|node_id| self.bundle_node(node_id))
      .collect()
  }

  /// Bundle groups `bundle_id` loads on demand
  pub fn async_bundle_groups(&self, bundle_id: &str) -> Vec<&BundleGroup> {
    let Some(node_id) = self.content_key_to_node_id.get(bundle_id) else {
      return Vec::new();
    };

    self
      .neighbors(node_id, Direction::Outgoing, BundleGraphEdgeType::Async)
      .iter()
      .filter_map(|node_id| self.bundle_group_node(node_id))
      .collect()
  }

  pub fn bundles_containing_asset(&self, asset_id: &str) -> Vec<&Bundle> {
    self
      .bundles()
      .filter(|bundle| bundle.asset_ids.binary_search_by(|id| id.as_str().cmp(asset_id)).is_ok())
      .collect()
  }

  /// Id the manual shared bundle `name` of `file_type` has, or would have, in `dist_dir`
  pub fn resolve_bundle_id(&self, name: &str, file_type: &FileType, dist_dir: &Path) -> String {
    manual_bundle_id(name, file_type, dist_dir)
  }
}

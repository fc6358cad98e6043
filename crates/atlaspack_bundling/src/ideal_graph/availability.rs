use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::Context;
use fixedbitset::FixedBitSet;
use petgraph::algo::{kosaraju_scc, toposort};
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use tracing::{debug, instrument};

use super::graph_index::GraphIndex;
use super::reachability::ReachabilityIndex;
use super::types::{AssetKey, DecisionKind, DecisionLog, IdealGraph};

/// Roots that have to package each asset, after removing what is already loaded
pub type Consumers = BTreeMap<AssetKey, BTreeSet<AssetKey>>;

/// Computes, for every root, the assets guaranteed to be loaded whenever it loads
///
/// Availability flows along the bundle group graph: a group sees the intersection, over every
/// group that can load it, of what that parent had available plus what the parent itself loads.
/// Entry, isolated, inline and environment roots start from nothing.
pub struct AvailabilityResolver<'a> {
  index: &'a GraphIndex,
  ideal: &'a IdealGraph,
  reachability: &'a ReachabilityIndex,
}

impl<'a> AvailabilityResolver<'a> {
  pub fn new(
    index: &'a GraphIndex,
    ideal: &'a IdealGraph,
    reachability: &'a ReachabilityIndex,
  ) -> Self {
    Self {
      index,
      ideal,
      reachability,
    }
  }

  /// Drops assets a root can rely on from its list of assets to package
  ///
  /// A root always keeps its own asset.
  #[instrument(level = "debug", skip_all)]
  pub fn consumers(&self, decisions: &mut DecisionLog) -> anyhow::Result<Consumers> {
    let available = self.root_availability()?;

    for (root, bits) in &available {
      decisions.push(
        "availability",
        DecisionKind::AvailabilityComputed {
          root_asset_id: self.index.id_for(*root).to_string(),
          available_assets_len: bits.count_ones(..),
        },
      );
    }

    let mut consumers = Consumers::new();
    let mut dropped = 0;

    for (asset, roots) in self.reachability.assets() {
      let needed: BTreeSet<AssetKey> = roots
        .iter()
        .copied()
        .filter(|root| {
          *root == asset
            || !available
              .get(root)
              .is_some_and(|bits| bits.contains(asset.0 as usize))
        })
        .collect();

      dropped += roots.len() - needed.len();

      // Mutual reuse can leave two roots each relying on the other for an asset
      let needed = if needed.is_empty() {
        roots.clone()
      } else {
        needed
      };

      consumers.insert(asset, needed);
    }

    debug!(
      assets = consumers.len(),
      dropped,
      "ideal graph: computed consumers"
    );

    Ok(consumers)
  }

  fn root_availability(&self) -> anyhow::Result<BTreeMap<AssetKey, FixedBitSet>> {
    let groups = self.group_availability()?;
    let empty = self.index.assets.bitset();

    let group_available = |root: AssetKey| -> FixedBitSet {
      intersect_all(
        self
          .ideal
          .own_groups
          .get(&root)
          .into_iter()
          .flatten()
          .map(|group| groups.get(group).cloned().unwrap_or_else(|| empty.clone())),
      )
      .unwrap_or_else(|| empty.clone())
    };

    let mut available = BTreeMap::new();
    for root in self.ideal.roots.values() {
      if root.triggers.starts_empty() || root.is_single_file() {
        available.insert(root.asset, empty.clone());
        continue;
      }

      let mut base = if root.triggers.creates_group() {
        group_available(root.asset)
      } else {
        let parents = self
          .ideal
          .bundle_edges
          .iter()
          .filter(|edge| edge.to == root.asset && !edge.triggers.creates_group())
          .map(|edge| {
            let mut offered = group_available(edge.from);
            self.union_reached(&mut offered, edge.from);
            offered
          });

        intersect_all(parents).unwrap_or_else(|| empty.clone())
      };

      // A reused root can load from any of its reusers' groups, including through reuse chains
      for reuser in self.ideal.reusers_closure(root.asset) {
        base.intersect_with(&group_available(reuser));
      }

      for reused in self.ideal.reused_closure(root.asset) {
        self.union_reached(&mut base, reused);
      }

      available.insert(root.asset, base);
    }

    Ok(available)
  }

  /// Availability at the start of each bundle group
  fn group_availability(&self) -> anyhow::Result<HashMap<AssetKey, FixedBitSet>> {
    let mut graph: StableDiGraph<AssetKey, ()> = StableDiGraph::new();
    let mut node_by_group: HashMap<AssetKey, NodeIndex> = HashMap::new();

    for group in self.ideal.group_roots() {
      node_by_group.insert(group, graph.add_node(group));
    }

    let mut loaded: HashMap<AssetKey, FixedBitSet> = node_by_group
      .keys()
      .map(|group| (*group, self.index.assets.bitset()))
      .collect();

    for root in self.ideal.roots.keys() {
      for group in self.ideal.all_groups(*root) {
        if let Some(bits) = loaded.get_mut(&group) {
          self.union_reached(bits, *root);
        }
      }
    }

    for edge in &self.ideal.bundle_edges {
      if !edge.triggers.creates_group() {
        continue;
      }

      let Some(child) = self.ideal.roots.get(&edge.to) else {
        continue;
      };
      if child.triggers.starts_empty() {
        continue;
      }

      let child_node = *node_by_group
        .get(&edge.to)
        .context("group-creating edge into a root without a group")?;

      for parent in self.ideal.all_groups(edge.from) {
        if parent == edge.to {
          continue;
        }
        if let Some(parent_node) = node_by_group.get(&parent) {
          graph.update_edge(*parent_node, child_node, ());
        }
      }
    }

    // Fast path: the group graph is usually acyclic
    if let Ok(order) = toposort(&graph, None) {
      let availability = self.group_availability_dag(&graph, &loaded, order)?;
      debug!(
        groups = availability.len(),
        "ideal graph: computed availability (dag)"
      );
      return Ok(availability);
    }

    debug!("ideal graph: bundle groups have cycles; computing availability via SCC condensation");
    let availability = self.group_availability_scc(&graph, &loaded)?;
    debug!(
      groups = availability.len(),
      "ideal graph: computed availability (scc)"
    );
    Ok(availability)
  }

  fn group_availability_dag(
    &self,
    graph: &StableDiGraph<AssetKey, ()>,
    loaded: &HashMap<AssetKey, FixedBitSet>,
    order: Vec<NodeIndex>,
  ) -> anyhow::Result<HashMap<AssetKey, FixedBitSet>> {
    let mut availability: HashMap<AssetKey, FixedBitSet> = HashMap::new();

    for node in order {
      let group = *graph.node_weight(node).context("group node missing")?;

      let mut offered = Vec::new();
      for parent in graph.neighbors_directed(node, Direction::Incoming) {
        let parent_group = *graph.node_weight(parent).context("group node missing")?;
        let mut bits = availability
          .get(&parent_group)
          .cloned()
          .context("parent group visited out of order")?;
        bits.union_with(&loaded[&parent_group]);
        offered.push(bits);
      }

      let bits = intersect_all(offered).unwrap_or_else(|| self.index.assets.bitset());
      availability.insert(group, bits);
    }

    Ok(availability)
  }

  fn group_availability_scc(
    &self,
    graph: &StableDiGraph<AssetKey, ()>,
    loaded: &HashMap<AssetKey, FixedBitSet>,
  ) -> anyhow::Result<HashMap<AssetKey, FixedBitSet>> {
    let sccs: Vec<Vec<NodeIndex>> = kosaraju_scc(graph);

    let mut scc_of: HashMap<NodeIndex, usize> = HashMap::new();
    for (i, scc) in sccs.iter().enumerate() {
      for &node in scc {
        scc_of.insert(node, i);
      }
    }

    let mut scc_graph: StableDiGraph<usize, ()> = StableDiGraph::new();
    let scc_nodes: Vec<NodeIndex> = (0..sccs.len()).map(|i| scc_graph.add_node(i)).collect();

    for edge in graph.edge_references() {
      let from = scc_of[&edge.source()];
      let to = scc_of[&edge.target()];
      if from != to {
        scc_graph.update_edge(scc_nodes[from], scc_nodes[to], ());
      }
    }

    let Ok(scc_order) = toposort(&scc_graph, None) else {
      anyhow::bail!("SCC condensation graph unexpectedly cyclic");
    };

    // What each SCC offers its children: its availability plus everything its groups load
    let mut offered_by_scc: Vec<FixedBitSet> = vec![self.index.assets.bitset(); sccs.len()];
    let mut availability: HashMap<AssetKey, FixedBitSet> = HashMap::new();

    for scc_node in scc_order {
      let scc_idx = *scc_graph
        .node_weight(scc_node)
        .context("SCC node missing")?;

      let parents = scc_graph
        .neighbors_directed(scc_node, Direction::Incoming)
        .filter_map(|parent| scc_graph.node_weight(parent))
        .map(|parent| offered_by_scc[*parent].clone());

      let bits = intersect_all(parents).unwrap_or_else(|| self.index.assets.bitset());

      let mut offered = bits.clone();
      for &node in &sccs[scc_idx] {
        let group = *graph.node_weight(node).context("group node missing")?;
        offered.union_with(&loaded[&group]);
        availability.insert(group, bits.clone());
      }

      offered_by_scc[scc_idx] = offered;
    }

    Ok(availability)
  }

  fn union_reached(&self, bits: &mut FixedBitSet, root: AssetKey) {
    for asset in self.reachability.reached_by(root) {
      bits.insert(asset.0 as usize);
    }
  }
}

fn intersect_all(sets: impl IntoIterator<Item = FixedBitSet>) -> Option<FixedBitSet> {
  sets.into_iter().reduce(|mut acc, bits| {
    acc.intersect_with(&bits);
    acc
  })
}

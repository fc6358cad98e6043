use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, instrument};

use super::bundle_roots::dependency_triggers;
use super::graph_index::GraphIndex;
use super::types::{AssetKey, BundleEdge, BundleRoot, DecisionKind, DecisionLog};

/// Which roots reach which assets without crossing into another bundle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReachabilityIndex {
  by_asset: BTreeMap<AssetKey, BTreeSet<AssetKey>>,
  by_root: BTreeMap<AssetKey, BTreeSet<AssetKey>>,
}

impl ReachabilityIndex {
  fn insert(&mut self, root: AssetKey, asset: AssetKey) {
    self.by_asset.entry(asset).or_default().insert(root);
    self.by_root.entry(root).or_default().insert(asset);
  }

  /// Roots whose walk reaches `asset`
  pub fn roots_reaching(&self, asset: AssetKey) -> impl Iterator<Item = AssetKey> + '_ {
    self
      .by_asset
      .get(&asset)
      .into_iter()
      .flat_map(|roots| roots.iter().copied())
  }

  /// Assets reached by walking from `root`, including the root asset itself
  pub fn reached_by(&self, root: AssetKey) -> impl Iterator<Item = AssetKey> + '_ {
    self
      .by_root
      .get(&root)
      .into_iter()
      .flat_map(|assets| assets.iter().copied())
  }

  pub fn reaches(&self, root: AssetKey, asset: AssetKey) -> bool {
    self
      .by_root
      .get(&root)
      .is_some_and(|assets| assets.contains(&asset))
  }

  /// Every reached asset with the roots that reach it, in key order
  pub fn assets(&self) -> impl Iterator<Item = (AssetKey, &BTreeSet<AssetKey>)> {
    self.by_asset.iter().map(|(asset, roots)| (*asset, roots))
  }

  pub fn asset_count(&self) -> usize {
    self.by_asset.len()
  }
}

/// The unrefined partition of a target into one bundle per root
#[derive(Debug, Default, Clone)]
pub struct NaiveBundles {
  /// Dependencies that load another root, sorted by source root, target root and dependency id
  pub bundle_edges: Vec<BundleEdge>,

  /// `(root, reused root)` pairs where a synchronous import lands on another root
  pub reused: BTreeSet<(AssetKey, AssetKey)>,

  pub reachability: ReachabilityIndex,
}

/// Walks each root's subgraph, stopping at other roots
///
/// A walk does not enter a dependency that starts a bundle; it records a [`BundleEdge`] instead.
/// A synchronous import of a root that can be reused records a reuse pair and is not entered
/// either. Under single file output every dependency is followed.
pub struct NaiveBundler<'a> {
  index: &'a GraphIndex,
}

impl<'a> NaiveBundler<'a> {
  pub fn new(index: &'a GraphIndex) -> Self {
    Self { index }
  }

  #[instrument(level = "debug", skip_all)]
  pub fn bundle(
    &self,
    roots: &BTreeMap<AssetKey, BundleRoot>,
    decisions: &mut DecisionLog,
  ) -> NaiveBundles {
    let mut naive = NaiveBundles::default();

    for root in roots.values() {
      self.walk(root, roots, &mut naive);
    }

    naive.bundle_edges.sort_by(|a, b| {
      (a.from, a.to, &a.dependency_id).cmp(&(b.from, b.to, &b.dependency_id))
    });
    naive.bundle_edges.dedup();

    for (reuser, reused) in &naive.reused {
      decisions.push(
        "reachability",
        DecisionKind::BundleReused {
          asset_id: self.index.id_for(*reused).to_string(),
          reused_by_asset_id: self.index.id_for(*reuser).to_string(),
        },
      );
    }

    debug!(
      roots = roots.len(),
      reached_assets = naive.reachability.asset_count(),
      bundle_edges = naive.bundle_edges.len(),
      reused = naive.reused.len(),
      "ideal graph: walked bundle roots"
    );

    naive
  }

  fn walk(
    &self,
    root: &BundleRoot,
    roots: &BTreeMap<AssetKey, BundleRoot>,
    naive: &mut NaiveBundles,
  ) {
    let mut visited = self.index.assets.bitset();
    let mut stack = vec![root.asset];

    while let Some(asset) = stack.pop() {
      if visited.put(asset.0 as usize) {
        continue;
      }

      naive.reachability.insert(root.asset, asset);

      for (dependency, resolved) in self.index.dependencies(asset) {
        let Some(to) = *resolved else {
          continue;
        };

        if root.is_single_file() {
          stack.push(to);
          continue;
        }

        let triggers = dependency_triggers(self.index, asset, dependency, to);
        if !triggers.is_empty() {
          if to != root.asset {
            naive.bundle_edges.push(BundleEdge {
              from: root.asset,
              to,
              source: asset,
              dependency_id: dependency.id.clone(),
              triggers,
            });
          }
          continue;
        }

        if to != root.asset && roots.get(&to).is_some_and(|target| target.is_reusable()) {
          naive.reused.insert((root.asset, to));
          continue;
        }

        stack.push(to);
      }
    }
  }
}

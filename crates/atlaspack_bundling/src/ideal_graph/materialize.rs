use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::Context;
use atlaspack_core::types::{BundleBehavior, Environment, FileType, MaybeBundleBehavior};
use tracing::{debug, instrument};

use super::graph_index::GraphIndex;
use super::types::{AssetKey, BundleRoot, IdealGraph, RootTriggers};
use crate::bundle_graph::{
  Bundle, BundleGraph, BundleGraphEdgeType, BundleGroup, BundleKind, NodeId,
};
use crate::config::ResolvedBundlerConfig;
use crate::identity;

/// Writes the ideal graph of one target into the bundle graph
pub struct BundleGraphWriter<'a> {
  index: &'a GraphIndex,
  config: &'a ResolvedBundlerConfig,
  ideal: &'a IdealGraph,

  /// `(root, bucket type)` -> bundle node
  root_bundles: BTreeMap<(AssetKey, FileType), (String, NodeId)>,

  /// Node of every live shared bundle and manual bundle, with the roots that load it
  referenced: Vec<(String, NodeId, FileType, BTreeSet<AssetKey>)>,
  groups: BTreeMap<AssetKey, NodeId>,
}

impl<'a> BundleGraphWriter<'a> {
  pub fn new(
    index: &'a GraphIndex,
    config: &'a ResolvedBundlerConfig,
    ideal: &'a IdealGraph,
  ) -> Self {
    Self {
      index,
      config,
      ideal,
      root_bundles: BTreeMap::new(),
      referenced: Vec::new(),
      groups: BTreeMap::new(),
    }
  }

  #[instrument(level = "debug", skip_all)]
  pub fn write(mut self, bundle_graph: &mut BundleGraph) -> anyhow::Result<()> {
    self.add_root_bundles(bundle_graph)?;
    self.add_shared_bundles(bundle_graph)?;
    self.add_manual_bundles(bundle_graph)?;
    self.add_bundle_groups(bundle_graph)?;
    self.add_references(bundle_graph)?;

    debug!(
      root_bundles = self.root_bundles.len(),
      referenced_bundles = self.referenced.len(),
      bundle_groups = self.groups.len(),
      "ideal graph: wrote bundle graph"
    );

    Ok(())
  }

  fn add_root_bundles(&mut self, bundle_graph: &mut BundleGraph) -> anyhow::Result<()> {
    let ideal = self.ideal;
    let dist_dir = &ideal.target.dist_dir;

    for root in ideal.roots.values() {
      let Some(buckets) = ideal.placements.get(&root.asset) else {
        continue;
      };

      let main_type = ideal.bucket_type(root.asset, &root.file_type);
      let asset = self.index.asset(root.asset);
      let stem = match (&root.chunk_name, self.config.support_webpack_chunk_name) {
        (Some(chunk_name), true) => chunk_name.clone(),
        _ => asset.file_stem(),
      };

      for (file_type, assets) in buckets {
        if assets.is_empty() {
          continue;
        }

        let asset_ids = self.asset_ids(assets);
        let id = identity::bundle_id(
          &asset_ids.iter().map(String::as_str).collect::<Vec<_>>(),
          file_type,
          dist_dir,
        );

        let is_main = *file_type == main_type;
        let needs_stable_name = is_main && root.needs_stable_name;
        let name = if needs_stable_name {
          identity::stable_name(&stem, file_type)
        } else {
          identity::hashed_name(&stem, &id, file_type)
        };

        let node_id = bundle_graph.add_bundle(Bundle {
          id: id.clone(),
          name,
          bundle_type: file_type.clone(),
          env: root.env.clone(),
          target: ideal.target.clone(),
          kind: BundleKind::Root,
          entry_asset_ids: if is_main {
            vec![root.asset_id.clone()]
          } else {
            Vec::new()
          },
          main_entry_id: is_main.then(|| root.asset_id.clone()),
          needs_stable_name,
          bundle_behavior: bundle_behavior(root),
          is_splittable: root.is_splittable,
          manual_shared_bundle: None,
          size: self.size(assets),
          asset_ids,
        })?;

        self
          .root_bundles
          .insert((root.asset, file_type.clone()), (id, node_id));
      }
    }

    Ok(())
  }

  fn add_shared_bundles(&mut self, bundle_graph: &mut BundleGraph) -> anyhow::Result<()> {
    let ideal = self.ideal;

    for (_, shared) in ideal.live_shared_bundles() {
      anyhow::ensure!(
        shared.consumers.len() >= 2,
        "shared bundle of {} assets has {} consumers",
        shared.assets.len(),
        shared.consumers.len()
      );

      let asset_ids = self.asset_ids(&shared.assets);
      let id = identity::bundle_id(
        &asset_ids.iter().map(String::as_str).collect::<Vec<_>>(),
        &shared.file_type,
        &ideal.target.dist_dir,
      );

      let node_id = bundle_graph.add_bundle(Bundle {
        id: id.clone(),
        name: identity::shared_name(&id, &shared.file_type),
        bundle_type: shared.file_type.clone(),
        env: self.consumer_env(&shared.consumers, &shared.assets)?,
        target: ideal.target.clone(),
        kind: BundleKind::Shared,
        entry_asset_ids: Vec::new(),
        main_entry_id: None,
        needs_stable_name: false,
        bundle_behavior: None,
        is_splittable: true,
        manual_shared_bundle: None,
        size: shared.size,
        asset_ids,
      })?;

      self.referenced.push((
        id,
        node_id,
        shared.file_type.clone(),
        shared.consumers.clone(),
      ));
    }

    Ok(())
  }

  fn add_manual_bundles(&mut self, bundle_graph: &mut BundleGraph) -> anyhow::Result<()> {
    let ideal = self.ideal;

    for (key, manual) in &ideal.manual_bundles {
      let qualified_name = key.qualified_name();
      let id = identity::manual_bundle_id(
        &qualified_name,
        &key.file_type,
        &ideal.target.dist_dir,
      );

      let node_id = bundle_graph.add_bundle(Bundle {
        id: id.clone(),
        name: identity::hashed_name(&qualified_name, &id, &key.file_type),
        bundle_type: key.file_type.clone(),
        env: self.consumer_env(&manual.consumers, &manual.assets)?,
        target: ideal.target.clone(),
        kind: BundleKind::Manual,
        entry_asset_ids: Vec::new(),
        main_entry_id: None,
        needs_stable_name: false,
        bundle_behavior: None,
        is_splittable: true,
        manual_shared_bundle: Some(key.name.clone()),
        size: self.size(&manual.assets),
        asset_ids: self.asset_ids(&manual.assets),
      })?;

      self.referenced.push((
        id,
        node_id,
        key.file_type.clone(),
        manual.consumers.clone(),
      ));
    }

    Ok(())
  }

  /// Adds a group per group-creating root and the bundles each group loads
  ///
  /// Within a group, bundles the members reference come first in id order, then the members' own
  /// bundles in id order, then the bundle holding the group's entry asset.
  fn add_bundle_groups(&mut self, bundle_graph: &mut BundleGraph) -> anyhow::Result<()> {
    let ideal = self.ideal;
    let root_node = bundle_graph.root_node();

    for group in ideal.group_roots() {
      let root = ideal
        .roots
        .get(&group)
        .context("group root missing from roots")?;

      let group_id = format!("bundle_group:{}{}", ideal.target.name, root.asset_id);
      let group_node = bundle_graph.add_bundle_group(BundleGroup {
        id: group_id.clone(),
        entry_asset_id: root.asset_id.clone(),
        target: ideal.target.clone(),
      });
      self.groups.insert(group, group_node);

      if root.triggers.contains(RootTriggers::ENTRY) {
        bundle_graph.add_edge(&root_node, &group_node, BundleGraphEdgeType::Bundle);
      }

      let (own, reused) = ideal.group_members(group);
      let members: BTreeSet<AssetKey> = own.union(&reused).copied().collect();

      let mut referenced: Vec<(&str, NodeId)> = self
        .referenced
        .iter()
        .filter(|(_, _, _, consumers)| !consumers.is_disjoint(&members))
        .map(|(id, node_id, _, _)| (id.as_str(), *node_id))
        .collect();
      referenced.extend(self.bundles_of(&reused));
      referenced.sort();

      let main = self.main_bundle(group);
      let mut own_bundles: Vec<(&str, NodeId)> = self
        .bundles_of(&own)
        .filter(|(_, node_id)| Some(*node_id) != main)
        .collect();
      own_bundles.sort();

      for (_, node_id) in referenced.into_iter().chain(own_bundles) {
        bundle_graph.add_edge(&group_node, &node_id, BundleGraphEdgeType::Bundle);
      }
      if let Some(main) = main {
        bundle_graph.add_edge(&group_node, &main, BundleGraphEdgeType::Bundle);
      }

      let entry_bundles = bundle_graph
        .bundles_in_group(&group_id, true)
        .into_iter()
        .filter(|bundle| bundle.entry_asset_ids.contains(&root.asset_id))
        .count();

      anyhow::ensure!(
        entry_bundles == 1,
        "bundle group for {} has {} bundles containing its entry",
        root.asset_id,
        entry_bundles
      );
    }

    Ok(())
  }

  fn add_references(&self, bundle_graph: &mut BundleGraph) -> anyhow::Result<()> {
    for (_, node_id, file_type, consumers) in &self.referenced {
      for consumer in consumers {
        if let Some(from) = self.source_bundle(*consumer, file_type) {
          bundle_graph.add_edge(&from, node_id, BundleGraphEdgeType::References);
        }
      }
    }

    for (reuser, reused) in &self.ideal.reused {
      let Some(reused_root) = self.ideal.roots.get(reused) else {
        continue;
      };
      let Some(from) = self.source_bundle(*reuser, &reused_root.file_type) else {
        continue;
      };

      for (_, to) in self.bundles_of(&BTreeSet::from([*reused])) {
        bundle_graph.add_edge(&from, &to, BundleGraphEdgeType::References);
      }
    }

    for edge in &self.ideal.bundle_edges {
      let source_type = &self.index.asset(edge.source).file_type;
      let Some(from) = self.source_bundle(edge.from, source_type) else {
        continue;
      };

      if edge.triggers.creates_group() {
        if let Some(group) = self.groups.get(&edge.to) {
          bundle_graph.add_edge(&from, group, BundleGraphEdgeType::Async);
        }
      } else if let Some(to) = self.main_bundle(edge.to) {
        bundle_graph.add_edge(&from, &to, BundleGraphEdgeType::References);
      }
    }

    Ok(())
  }

  fn bundles_of<'s>(
    &'s self,
    roots: &'s BTreeSet<AssetKey>,
  ) -> impl Iterator<Item = (&'s str, NodeId)> + 's {
    self
      .root_bundles
      .iter()
      .filter(move |((root, _), _)| roots.contains(root))
      .map(|(_, (id, node_id))| (id.as_str(), *node_id))
  }

  fn main_bundle(&self, root: AssetKey) -> Option<NodeId> {
    let file_type = &self.ideal.roots.get(&root)?.file_type;
    self.bucket_bundle(root, file_type)
  }

  fn bucket_bundle(&self, root: AssetKey, file_type: &FileType) -> Option<NodeId> {
    let bucket = self.ideal.bucket_type(root, file_type);
    self
      .root_bundles
      .get(&(root, bucket))
      .map(|(_, node_id)| *node_id)
  }

  /// The bundle of `root` that loads something of `file_type`, falling back to its main bundle
  fn source_bundle(&self, root: AssetKey, file_type: &FileType) -> Option<NodeId> {
    self
      .bucket_bundle(root, file_type)
      .or_else(|| self.main_bundle(root))
  }

  fn consumer_env(
    &self,
    consumers: &BTreeSet<AssetKey>,
    assets: &BTreeSet<AssetKey>,
  ) -> anyhow::Result<Arc<Environment>> {
    consumers
      .iter()
      .find_map(|consumer| self.ideal.roots.get(consumer).map(|root| root.env.clone()))
      .or_else(|| {
        assets
          .iter()
          .next()
          .map(|asset| self.index.asset(*asset).env.clone())
      })
      .context("bundle has neither consumers nor assets")
  }

  fn asset_ids(&self, assets: &BTreeSet<AssetKey>) -> Vec<String> {
    assets
      .iter()
      .map(|asset| self.index.id_for(*asset).to_string())
      .collect()
  }

  fn size(&self, assets: &BTreeSet<AssetKey>) -> u64 {
    assets.iter().map(|asset| self.index.size(*asset)).sum()
  }
}

fn bundle_behavior(root: &BundleRoot) -> MaybeBundleBehavior {
  let isolated = root.triggers.contains(RootTriggers::ISOLATED);

  match (root.is_inline(), isolated) {
    (true, true) => Some(BundleBehavior::InlineIsolated),
    (true, false) => Some(BundleBehavior::Inline),
    (false, true) => Some(BundleBehavior::Isolated),
    (false, false) => None,
  }
}

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Context;
use atlaspack_core::asset_graph::AssetGraph;
use atlaspack_core::types::{Asset, Dependency, Target};
use fixedbitset::FixedBitSet;
use tracing::{debug, instrument};

use super::types::AssetKey;

#[derive(Debug, Default)]
pub struct AssetKeyInterner {
  by_id: HashMap<String, AssetKey>,
  ids: Vec<String>,
}

impl AssetKeyInterner {
  fn from_asset_graph(asset_graph: &AssetGraph) -> anyhow::Result<Self> {
    let mut ids: Vec<String> = asset_graph
      .get_assets()
      .map(|(_, asset)| asset.id.clone())
      .collect();
    ids.sort();
    ids.dedup();

    let mut by_id = HashMap::with_capacity(ids.len());
    for (i, id) in ids.iter().enumerate() {
      let key = AssetKey(u32::try_from(i).context("too many assets to key")?);
      by_id.insert(id.clone(), key);
    }

    Ok(Self { by_id, ids })
  }

  pub fn key_for(&self, asset_id: &str) -> Option<AssetKey> {
    self.by_id.get(asset_id).copied()
  }

  pub fn id_for(&self, key: AssetKey) -> &str {
    &self.ids[key.0 as usize]
  }

  pub fn len(&self) -> usize {
    self.ids.len()
  }

  pub fn is_empty(&self) -> bool {
    self.ids.is_empty()
  }

  pub fn bitset(&self) -> FixedBitSet {
    FixedBitSet::with_capacity(self.len())
  }
}

/// An entry dependency and the asset it resolved to
#[derive(Debug, Clone)]
pub struct Entry {
  pub dependency: Arc<Dependency>,
  pub asset: AssetKey,
  pub target: Target,
}

/// Keyed, read-only adjacency over the asset graph
///
/// Built once per bundling pass so the phases never have to go back to node ids.
#[derive(Debug, Default)]
pub struct GraphIndex {
  pub assets: AssetKeyInterner,
  asset_nodes: Vec<Arc<Asset>>,
  env_ids: Vec<String>,
  dependencies: Vec<Vec<(Arc<Dependency>, Option<AssetKey>)>>,
  dependency_count: usize,
}

impl GraphIndex {
  #[instrument(level = "debug", skip_all)]
  pub fn from_asset_graph(asset_graph: &AssetGraph) -> anyhow::Result<Self> {
    let assets = AssetKeyInterner::from_asset_graph(asset_graph)?;

    let mut asset_nodes: Vec<Option<Arc<Asset>>> = vec![None; assets.len()];
    let mut dependencies = vec![Vec::new(); assets.len()];
    let mut dependency_count = 0;

    for (node_id, asset) in asset_graph.get_assets() {
      let key = assets
        .key_for(&asset.id)
        .context("asset missing from interner")?;

      asset_nodes[key.0 as usize] = Some(asset.clone());

      for dep_node_id in asset_graph.get_outgoing_dependencies(&node_id) {
        let Some(dependency) = asset_graph.get_dependency_node(&dep_node_id) else {
          continue;
        };

        let resolved = asset_graph
          .resolve_dependency_asset(&dep_node_id)
          .and_then(|asset_node_id| asset_graph.get_asset_node(&asset_node_id))
          .and_then(|asset| assets.key_for(&asset.id));

        dependencies[key.0 as usize].push((dependency.clone(), resolved));
        dependency_count += 1;
      }
    }

    let asset_nodes = asset_nodes
      .into_iter()
      .enumerate()
      .map(|(i, asset)| asset.with_context(|| format!("asset {} was not indexed", i)))
      .collect::<anyhow::Result<Vec<_>>>()?;

    let env_ids = asset_nodes.iter().map(|asset| asset.env.id()).collect();

    debug!(
      assets = assets.len(),
      dependencies = dependency_count,
      "ideal graph: indexed asset graph"
    );

    Ok(GraphIndex {
      assets,
      asset_nodes,
      env_ids,
      dependencies,
      dependency_count,
    })
  }

  pub fn asset(&self, key: AssetKey) -> &Arc<Asset> {
    &self.asset_nodes[key.0 as usize]
  }

  pub fn id_for(&self, key: AssetKey) -> &str {
    self.assets.id_for(key)
  }

  pub fn env_id(&self, key: AssetKey) -> &str {
    &self.env_ids[key.0 as usize]
  }

  /// Dependencies of an asset in declaration order, with the asset each resolved to
  pub fn dependencies(&self, key: AssetKey) -> &[(Arc<Dependency>, Option<AssetKey>)] {
    &self.dependencies[key.0 as usize]
  }

  pub fn dependency_count(&self) -> usize {
    self.dependency_count
  }

  pub fn size(&self, key: AssetKey) -> u64 {
    self.asset(key).size()
  }

  /// Entry dependencies grouped by target name
  ///
  /// Fails when there are no entries, or when an entry did not resolve to an asset.
  #[instrument(level = "debug", skip_all)]
  pub fn entries_by_target(
    &self,
    asset_graph: &AssetGraph,
  ) -> anyhow::Result<BTreeMap<String, Vec<Entry>>> {
    let mut entry_dependencies: Vec<(usize, &Arc<Dependency>)> = asset_graph
      .get_dependencies()
      .filter(|(_, dep)| dep.is_entry)
      .collect();
    entry_dependencies.sort_by(|(_, a), (_, b)| a.id.cmp(&b.id));

    anyhow::ensure!(
      !entry_dependencies.is_empty(),
      "asset graph had no entry dependencies"
    );

    let mut by_target: BTreeMap<String, Vec<Entry>> = BTreeMap::new();
    for (dep_node_id, dependency) in entry_dependencies {
      let asset = asset_graph
        .resolve_dependency_asset(&dep_node_id)
        .and_then(|asset_node_id| asset_graph.get_asset_node(&asset_node_id))
        .and_then(|asset| self.assets.key_for(&asset.id))
        .with_context(|| {
          format!(
            "entry dependency {} did not resolve to an asset",
            dependency.specifier
          )
        })?;

      let target = dependency.target.as_deref().cloned().unwrap_or_default();
      by_target
        .entry(target.name.clone())
        .or_default()
        .push(Entry {
          dependency: dependency.clone(),
          asset,
          target,
        });
    }

    debug!(
      targets = by_target.len(),
      entries = by_target.values().map(Vec::len).sum::<usize>(),
      "ideal graph: extracted entries"
    );
    Ok(by_target)
  }
}

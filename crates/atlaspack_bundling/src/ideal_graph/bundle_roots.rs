use std::collections::BTreeMap;

use atlaspack_core::types::{Dependency, Priority};
use tracing::{debug, instrument};

use super::graph_index::{Entry, GraphIndex};
use super::types::{AssetKey, BundleRoot, DecisionKind, DecisionLog, RootTriggers};

/// Why following `dependency` from `from` into `to` would start a new bundle
///
/// Empty when the dependency keeps `to` in the same bundle as `from`. A change of file type alone
/// never starts a bundle; the asset is packaged into a typed sibling of the importing root instead.
pub fn dependency_triggers(
  index: &GraphIndex,
  from: AssetKey,
  dependency: &Dependency,
  to: AssetKey,
) -> RootTriggers {
  if index.asset(from).env.unstable_single_file_output {
    return RootTriggers::empty();
  }

  let target = index.asset(to);
  let mut triggers = match dependency.priority {
    Priority::Sync => RootTriggers::empty(),
    Priority::Parallel => RootTriggers::PARALLEL,
    Priority::Lazy => RootTriggers::LAZY,
    Priority::Conditional => RootTriggers::CONDITIONAL,
  };

  if dependency.is_isolated() || target.bundle_behavior.is_some_and(|b| b.is_isolated()) {
    triggers |= RootTriggers::ISOLATED;
  }

  if dependency.is_inline() || target.bundle_behavior.is_some_and(|b| b.is_inline()) {
    triggers |= RootTriggers::INLINE;
  }

  if index.env_id(from) != index.env_id(to) {
    triggers |= RootTriggers::ENVIRONMENT;
  }

  triggers
}

/// Finds every asset that has to begin a bundle
///
/// Walks all dependencies reachable from the entries of one target. A root reached through several
/// dependencies merges their triggers; naming hints come from the dependency with the lowest id so
/// the result does not depend on traversal order.
pub struct BundleRootCollector<'a> {
  index: &'a GraphIndex,
}

struct Boundary {
  to: AssetKey,
  from: AssetKey,
  dependency_id: String,
  priority: Priority,
  triggers: RootTriggers,
}

impl<'a> BundleRootCollector<'a> {
  pub fn new(index: &'a GraphIndex) -> Self {
    Self { index }
  }

  #[instrument(level = "debug", skip_all)]
  pub fn collect(
    &self,
    entries: &[Entry],
    decisions: &mut DecisionLog,
  ) -> BTreeMap<AssetKey, BundleRoot> {
    let mut roots: BTreeMap<AssetKey, BundleRoot> = BTreeMap::new();
    let mut naming: BTreeMap<AssetKey, (String, Option<String>)> = BTreeMap::new();

    for entry in entries {
      self.add_root(&mut roots, entry.asset, RootTriggers::ENTRY);
      Self::record_naming(
        &mut naming,
        &mut roots,
        entry.asset,
        &entry.dependency,
      );
    }

    let mut boundaries = Vec::new();
    let mut visited = self.index.assets.bitset();
    let mut stack: Vec<AssetKey> = entries.iter().map(|entry| entry.asset).collect();

    while let Some(asset) = stack.pop() {
      if visited.put(asset.0 as usize) {
        continue;
      }

      for (dependency, resolved) in self.index.dependencies(asset) {
        let Some(to) = *resolved else {
          continue;
        };

        let triggers = dependency_triggers(self.index, asset, dependency, to);
        if !triggers.is_empty() {
          self.add_root(&mut roots, to, triggers);
          Self::record_naming(&mut naming, &mut roots, to, dependency);

          boundaries.push(Boundary {
            to,
            from: asset,
            dependency_id: dependency.id.clone(),
            priority: dependency.priority,
            triggers,
          });
        }

        stack.push(to);
      }
    }

    for (key, (_, chunk_name)) in naming {
      if let Some(root) = roots.get_mut(&key) {
        root.chunk_name = chunk_name;
      }
    }

    boundaries.sort_by(|a, b| {
      (a.to, &a.dependency_id).cmp(&(b.to, &b.dependency_id))
    });

    for boundary in boundaries {
      decisions.push(
        "roots",
        DecisionKind::BoundaryCreated {
          asset_id: self.index.id_for(boundary.to).to_string(),
          from_asset_id: self.index.id_for(boundary.from).to_string(),
          dependency_id: boundary.dependency_id,
          priority: boundary.priority,
          triggers: boundary.triggers,
        },
      );
    }

    for root in roots.values() {
      decisions.push(
        "roots",
        DecisionKind::BundleRootCreated {
          asset_id: root.asset_id.clone(),
          triggers: root.triggers,
        },
      );
    }

    debug!(
      roots = roots.len(),
      visited = visited.count_ones(..),
      "ideal graph: collected bundle roots"
    );

    roots
  }

  fn add_root(
    &self,
    roots: &mut BTreeMap<AssetKey, BundleRoot>,
    key: AssetKey,
    triggers: RootTriggers,
  ) {
    let asset = self.index.asset(key);
    roots
      .entry(key)
      .and_modify(|root| root.triggers |= triggers)
      .or_insert_with(|| BundleRoot {
        asset: key,
        asset_id: asset.id.clone(),
        env: asset.env.clone(),
        file_type: asset.file_type.clone(),
        triggers,
        needs_stable_name: false,
        chunk_name: None,
        is_splittable: asset.is_bundle_splittable,
      });
  }

  /// Keeps the naming hints of the lowest creating dependency id
  fn record_naming(
    naming: &mut BTreeMap<AssetKey, (String, Option<String>)>,
    roots: &mut BTreeMap<AssetKey, BundleRoot>,
    key: AssetKey,
    dependency: &Dependency,
  ) {
    if dependency.needs_stable_name {
      if let Some(root) = roots.get_mut(&key) {
        root.needs_stable_name = true;
      }
    }

    let replace = naming
      .get(&key)
      .map_or(true, |(dependency_id, _)| dependency.id < *dependency_id);

    if replace {
      naming.insert(
        key,
        (
          dependency.id.clone(),
          dependency.chunk_name_magic_comment.clone(),
        ),
      );
    }
  }
}

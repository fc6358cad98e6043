use std::collections::BTreeSet;

use atlaspack_core::hash::hash_u64;
use atlaspack_core::types::Priority;
use fixedbitset::FixedBitSet;
use tracing::{debug, instrument};

use super::availability::Consumers;
use super::graph_index::GraphIndex;
use super::types::{AssetKey, DecisionKind, DecisionLog, IdealGraph, ManualBundleKey, RootTriggers};
use crate::config::{ManualSharedBundle, ResolvedBundlerConfig, resolve_from};

/// Moves assets matched by user-declared bundles out of the roots that need them
///
/// Runs before automatic sharing and wins over it. Declarations are applied in order and an asset
/// is only ever claimed by the first one that matches it. Single file, inline and isolated roots
/// keep their own copy of a matched asset.
pub struct ManualSharedBundleExtractor<'a> {
  index: &'a GraphIndex,
  config: &'a ResolvedBundlerConfig,
}

impl<'a> ManualSharedBundleExtractor<'a> {
  pub fn new(index: &'a GraphIndex, config: &'a ResolvedBundlerConfig) -> Self {
    Self { index, config }
  }

  /// Returns the assets claimed by a manual bundle
  #[instrument(level = "debug", skip_all)]
  pub fn extract(
    &self,
    ideal: &mut IdealGraph,
    consumers: &mut Consumers,
    decisions: &mut DecisionLog,
  ) -> FixedBitSet {
    let mut claimed = self.index.assets.bitset();

    for manual in &self.config.manual_shared_bundles {
      let subgraph = manual.root.as_ref().map(|root| self.sync_subgraph(root));

      for (asset, roots) in consumers.iter_mut() {
        if claimed.contains(asset.0 as usize) || !self.matches(ideal, manual, *asset) {
          continue;
        }

        if subgraph
          .as_ref()
          .is_some_and(|subgraph| !subgraph.contains(asset.0 as usize))
        {
          continue;
        }

        let extracted: BTreeSet<AssetKey> = roots
          .iter()
          .copied()
          .filter(|root| {
            ideal.roots.get(root).is_some_and(|root| {
              !root.is_single_file()
                && !root
                  .triggers
                  .intersects(RootTriggers::INLINE | RootTriggers::ISOLATED)
            })
          })
          .collect();

        if extracted.is_empty() {
          continue;
        }

        let source = self.index.asset(*asset);
        let key = ManualBundleKey {
          name: manual.name.clone(),
          file_type: source.file_type.clone(),
          partition: (hash_u64(&source.id) % manual.split as u64) as usize,
          split: manual.split,
        };

        let bundle = ideal.manual_bundles.entry(key).or_default();
        bundle.assets.insert(*asset);
        bundle.consumers.extend(extracted.iter().copied());

        roots.retain(|root| !extracted.contains(root));
        claimed.insert(asset.0 as usize);
      }
    }

    for (key, bundle) in &ideal.manual_bundles {
      decisions.push(
        "manual",
        DecisionKind::ManualBundleCreated {
          name: key.name.clone(),
          file_type: key.file_type.clone(),
          partition: key.partition,
          assets_len: bundle.assets.len(),
        },
      );
    }

    debug!(
      bundles = ideal.manual_bundles.len(),
      claimed = claimed.count_ones(..),
      "ideal graph: extracted manual shared bundles"
    );

    claimed
  }

  fn matches(&self, ideal: &IdealGraph, manual: &ManualSharedBundle, asset: AssetKey) -> bool {
    let source = self.index.asset(asset);

    !ideal.roots.contains_key(&asset)
      && source.is_bundle_splittable
      && manual.matches_type(&source.file_type)
      && manual.matches_path(&self.config.project_root, &source.file_path)
  }

  /// Assets reachable from `root` through synchronous dependencies only
  fn sync_subgraph(&self, root: &std::path::Path) -> FixedBitSet {
    let mut visited = self.index.assets.bitset();

    let mut stack: Vec<AssetKey> = (0..self.index.assets.len())
      .map(|i| AssetKey(i as u32))
      .filter(|key| {
        resolve_from(&self.config.project_root, &self.index.asset(*key).file_path) == root
      })
      .collect();

    while let Some(asset) = stack.pop() {
      if visited.put(asset.0 as usize) {
        continue;
      }

      for (dependency, resolved) in self.index.dependencies(asset) {
        if dependency.priority != Priority::Sync {
          continue;
        }
        if let Some(to) = resolved {
          stack.push(*to);
        }
      }
    }

    visited
  }
}

#[cfg(test)]
mod tests {
  use atlaspack_core::types::FileType;
  use atlaspack_test_fixtures::AssetGraphFixture;
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::ideal_graph::test_utils::{Phase, ideal_graph_with};

  fn manual(name: &str, assets: &[&str]) -> ManualSharedBundle {
    ManualSharedBundle {
      name: name.to_string(),
      assets: assets.iter().map(|glob| format!("/app/{}", glob)).collect(),
      split: 1,
      ..ManualSharedBundle::default()
    }
  }

  fn config(manual_shared_bundles: Vec<ManualSharedBundle>) -> ResolvedBundlerConfig {
    ResolvedBundlerConfig {
      project_root: std::path::PathBuf::from("/app"),
      manual_shared_bundles,
      ..ResolvedBundlerConfig::default()
    }
  }

  #[test]
  fn extracts_matching_assets_per_type() {
    let fixture = AssetGraphFixture::new()
      .entry("index.js")
      .sync("index.js", "vendor-a.js")
      .sync("index.js", "vendor-b.css")
      .sync("index.js", "app.js");

    let built = ideal_graph_with(
      &fixture,
      &config(vec![manual("vendor", &["vendor*.*"])]),
      Phase::Manual,
    );

    let keys: Vec<(String, FileType)> = built
      .ideal
      .manual_bundles
      .keys()
      .map(|key| (key.qualified_name(), key.file_type.clone()))
      .collect();
    assert_eq!(
      keys,
      vec![
        (String::from("vendor"), FileType::Css),
        (String::from("vendor"), FileType::Js)
      ]
    );

    assert!(built.consumer_paths(&fixture, "vendor-a.js").is_empty());
    assert_eq!(built.consumer_paths(&fixture, "app.js"), vec!["index.js"]);
  }

  #[test]
  fn first_declaration_claims_an_asset() {
    let fixture = AssetGraphFixture::new()
      .entry("index.js")
      .sync("index.js", "lib.js");

    let built = ideal_graph_with(
      &fixture,
      &config(vec![manual("first", &["lib.js"]), manual("second", &["*.js"])]),
      Phase::Manual,
    );

    let names: Vec<String> = built
      .ideal
      .manual_bundles
      .keys()
      .map(|key| key.name.clone())
      .collect();
    assert_eq!(names, vec![String::from("first")]);
  }

  #[test]
  fn roots_and_unsplittable_assets_are_never_extracted() {
    let fixture = AssetGraphFixture::new()
      .entry("index.js")
      .sync("index.js", "pinned.js")
      .not_splittable("pinned.js")
      .lazy("index.js", "lazy.js");

    let built = ideal_graph_with(
      &fixture,
      &config(vec![manual("all", &["*.js"])]),
      Phase::Manual,
    );

    assert!(built.ideal.manual_bundles.is_empty());
    assert_eq!(built.consumer_paths(&fixture, "pinned.js"), vec!["index.js"]);
  }

  #[test]
  fn root_option_limits_matching_to_its_sync_subgraph() {
    let fixture = AssetGraphFixture::new()
      .entry("index.js")
      .sync("index.js", "ui/button.js")
      .lazy("index.js", "admin.js")
      .sync("admin.js", "ui/table.js");

    let mut ui = manual("ui", &["ui/*.js"]);
    ui.root = Some(std::path::PathBuf::from("/app/index.js"));

    let built = ideal_graph_with(&fixture, &config(vec![ui]), Phase::Manual);

    let bundle = built.ideal.manual_bundles.values().next().unwrap();
    assert_eq!(
      bundle.assets,
      BTreeSet::from([built.key(&fixture, "ui/button.js")])
    );
    assert_eq!(
      built.consumer_paths(&fixture, "ui/table.js"),
      vec!["admin.js"]
    );
  }

  #[test]
  fn inline_consumers_keep_their_copy() {
    let fixture = AssetGraphFixture::new()
      .entry("index.js")
      .sync("index.js", "lib.js")
      .dependency("index.js", "inline.js", |builder| {
        builder.bundle_behavior(atlaspack_core::types::BundleBehavior::Inline)
      })
      .sync("inline.js", "lib.js");

    let built = ideal_graph_with(
      &fixture,
      &config(vec![manual("lib", &["lib.js"])]),
      Phase::Manual,
    );

    let bundle = built.ideal.manual_bundles.values().next().unwrap();
    assert_eq!(
      bundle.consumers,
      BTreeSet::from([built.key(&fixture, "index.js")])
    );
    assert_eq!(built.consumer_paths(&fixture, "lib.js"), vec!["inline.js"]);
  }

  #[test]
  fn split_spreads_assets_over_stable_partitions() {
    let mut fixture = AssetGraphFixture::new().entry("index.js");
    for i in 0..12 {
      fixture = fixture.sync("index.js", &format!("vendor/{}.js", i));
    }

    let mut vendor = manual("vendor", &["vendor/*.js"]);
    vendor.split = 3;

    let built = ideal_graph_with(&fixture, &config(vec![vendor.clone()]), Phase::Manual);
    let again = ideal_graph_with(&fixture, &config(vec![vendor]), Phase::Manual);

    assert_eq!(built.ideal.manual_bundles, again.ideal.manual_bundles);
    for (key, bundle) in &built.ideal.manual_bundles {
      assert!(key.partition < 3);
      for asset in &bundle.assets {
        let id = built.index.id_for(*asset);
        assert_eq!((hash_u64(id) % 3) as usize, key.partition);
      }
    }

    let total: usize = built
      .ideal
      .manual_bundles
      .values()
      .map(|bundle| bundle.assets.len())
      .sum();
    assert_eq!(total, 12);
  }
}

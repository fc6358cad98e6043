use atlaspack_test_fixtures::AssetGraphFixture;

use super::availability::{AvailabilityResolver, Consumers};
use super::bundle_groups::assign_bundle_groups;
use super::bundle_roots::BundleRootCollector;
use super::graph_index::GraphIndex;
use super::manual_shared::ManualSharedBundleExtractor;
use super::parallel_limit::ParallelRequestLimiter;
use super::reachability::NaiveBundler;
use super::shared::AutomaticSharedBundler;
use super::types::{AssetKey, DecisionLog, IdealGraph};
use crate::config::ResolvedBundlerConfig;

/// Last pipeline step to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Phase {
  Groups,
  Availability,
  Manual,
  Shared,
  Limit,
}

pub(crate) struct Built {
  pub index: GraphIndex,
  pub ideal: IdealGraph,
  pub consumers: Consumers,
  pub decisions: DecisionLog,
}

impl Built {
  pub fn key(&self, fixture: &AssetGraphFixture, path: &str) -> AssetKey {
    let asset_id = fixture.asset_id(path);
    self
      .index
      .assets
      .key_for(&asset_id)
      .unwrap_or_else(|| panic!("{} was not indexed", path))
  }

  fn path(&self, fixture: &AssetGraphFixture, key: AssetKey) -> String {
    fixture
      .path_for(self.index.id_for(key))
      .unwrap_or_default()
      .to_string()
  }

  /// Roots that still package `path` themselves
  pub fn consumer_paths(&self, fixture: &AssetGraphFixture, path: &str) -> Vec<String> {
    let mut paths: Vec<String> = self
      .consumers
      .get(&self.key(fixture, path))
      .into_iter()
      .flatten()
      .map(|root| self.path(fixture, *root))
      .collect();
    paths.sort();
    paths
  }

  /// Everything placed into the bundles of the root at `root_path`
  pub fn placed_paths(&self, fixture: &AssetGraphFixture, root_path: &str) -> Vec<String> {
    let mut paths: Vec<String> = self
      .ideal
      .placements
      .get(&self.key(fixture, root_path))
      .into_iter()
      .flat_map(|buckets| buckets.values().flatten())
      .map(|asset| self.path(fixture, *asset))
      .collect();
    paths.sort();
    paths.dedup();
    paths
  }
}

pub(crate) fn ideal_graph_until(fixture: &AssetGraphFixture, phase: Phase) -> Built {
  let config = ResolvedBundlerConfig {
    project_root: fixture.project_root.clone(),
    ..ResolvedBundlerConfig::default()
  };

  ideal_graph_with(fixture, &config, phase)
}

pub(crate) fn ideal_graph_with(
  fixture: &AssetGraphFixture,
  config: &ResolvedBundlerConfig,
  phase: Phase,
) -> Built {
  let index = GraphIndex::from_asset_graph(fixture.graph()).unwrap();
  let entries = index
    .entries_by_target(fixture.graph())
    .unwrap()
    .into_values()
    .next()
    .unwrap();

  let mut decisions = DecisionLog::default();
  let roots = BundleRootCollector::new(&index).collect(&entries, &mut decisions);
  let naive = NaiveBundler::new(&index).bundle(&roots, &mut decisions);

  let mut ideal = IdealGraph {
    roots,
    bundle_edges: naive.bundle_edges,
    reused: naive.reused,
    ..IdealGraph::new(entries[0].target.clone())
  };
  assign_bundle_groups(&mut ideal);

  let mut consumers = Consumers::default();
  if phase >= Phase::Availability {
    consumers = AvailabilityResolver::new(&index, &ideal, &naive.reachability)
      .consumers(&mut decisions)
      .unwrap();
  }

  if phase >= Phase::Manual {
    let claimed =
      ManualSharedBundleExtractor::new(&index, config).extract(&mut ideal, &mut consumers, &mut decisions);

    if phase >= Phase::Shared {
      AutomaticSharedBundler::new(&index, config).bundle(
        &mut ideal,
        &consumers,
        &claimed,
        &mut decisions,
      );
    }
  }

  if phase >= Phase::Limit {
    ParallelRequestLimiter::new(&index, config).limit(&mut ideal, &mut decisions);
  }

  Built {
    index,
    ideal,
    consumers,
    decisions,
  }
}

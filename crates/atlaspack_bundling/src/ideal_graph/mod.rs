//! "Ideal graph" bundling algorithm.
//!
//! Bundling runs once per target as a sequence of explicit steps, each with its own module:
//!
//! 1. [`bundle_roots`]: find the assets that start a bundle
//! 2. [`reachability`]: walk sync dependencies from every root
//! 3. [`bundle_groups`]: work out which groups each root is loaded in
//! 4. [`availability`]: drop assets a root can rely on being loaded already
//! 5. [`manual_shared`]: move assets into configured manual bundles
//! 6. [`shared`]: extract automatic shared bundles and place everything else
//! 7. [`parallel_limit`]: cap the number of bundles loaded per group
//!
//! The result is an [`IdealGraph`] per target, which [`materialize`] writes into a
//! [`crate::bundle_graph::BundleGraph`].

pub mod availability;
pub mod bundle_groups;
pub mod bundle_roots;
pub mod graph_index;
pub mod manual_shared;
pub mod materialize;
pub mod parallel_limit;
pub mod reachability;
pub mod shared;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

use anyhow::Context;
use atlaspack_core::asset_graph::AssetGraph;
use tracing::{debug, instrument};

use self::availability::AvailabilityResolver;
use self::bundle_groups::assign_bundle_groups;
use self::bundle_roots::BundleRootCollector;
use self::graph_index::{Entry, GraphIndex};
use self::manual_shared::ManualSharedBundleExtractor;
use self::parallel_limit::ParallelRequestLimiter;
use self::reachability::NaiveBundler;
use self::shared::AutomaticSharedBundler;
use self::types::{DecisionLog, IdealGraph};
use crate::config::ResolvedBundlerConfig;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IdealGraphBuildStats {
  pub assets: usize,
  pub dependencies: usize,
  pub targets: usize,
  pub bundle_roots: usize,
  pub shared_bundles: usize,
  pub manual_bundles: usize,
}

/// Output of [`IdealGraphBuilder::build`]
#[derive(Debug)]
pub struct IdealGraphBuild {
  pub index: GraphIndex,

  /// One graph per target, ordered by target name
  pub graphs: Vec<IdealGraph>,

  pub decisions: DecisionLog,
  pub stats: IdealGraphBuildStats,
}

pub struct IdealGraphBuilder<'a> {
  config: &'a ResolvedBundlerConfig,
}

impl<'a> IdealGraphBuilder<'a> {
  pub fn new(config: &'a ResolvedBundlerConfig) -> Self {
    Self { config }
  }

  #[instrument(level = "debug", skip_all)]
  pub fn build(&self, asset_graph: &AssetGraph) -> anyhow::Result<IdealGraphBuild> {
    let index = GraphIndex::from_asset_graph(asset_graph)?;
    let entries_by_target = index.entries_by_target(asset_graph)?;

    let mut stats = IdealGraphBuildStats {
      assets: index.assets.len(),
      dependencies: index.dependency_count(),
      targets: entries_by_target.len(),
      ..IdealGraphBuildStats::default()
    };

    debug!(
      assets = stats.assets,
      dependencies = stats.dependencies,
      targets = stats.targets,
      "ideal graph: input stats"
    );

    let mut decisions = DecisionLog::default();
    let mut graphs = Vec::with_capacity(entries_by_target.len());

    for (target_name, entries) in &entries_by_target {
      let ideal = self
        .build_target(&index, entries, &mut decisions)
        .with_context(|| format!("building ideal graph for target {}", target_name))?;

      stats.bundle_roots += ideal.roots.len();
      stats.shared_bundles += ideal.live_shared_bundles().count();
      stats.manual_bundles += ideal.manual_bundles.len();
      graphs.push(ideal);
    }

    debug!(
      bundle_roots = stats.bundle_roots,
      shared_bundles = stats.shared_bundles,
      manual_bundles = stats.manual_bundles,
      decisions = decisions.len(),
      "ideal graph: built"
    );

    Ok(IdealGraphBuild {
      index,
      graphs,
      decisions,
      stats,
    })
  }

  /// Runs every step for the entries of a single target
  pub fn build_target(
    &self,
    index: &GraphIndex,
    entries: &[Entry],
    decisions: &mut DecisionLog,
  ) -> anyhow::Result<IdealGraph> {
    let target = entries
      .first()
      .map(|entry| entry.target.clone())
      .context("target has no entries")?;

    let roots = BundleRootCollector::new(index).collect(entries, decisions);
    let naive = NaiveBundler::new(index).bundle(&roots, decisions);

    let mut ideal = IdealGraph {
      roots,
      bundle_edges: naive.bundle_edges,
      reused: naive.reused,
      ..IdealGraph::new(target)
    };
    assign_bundle_groups(&mut ideal);

    let mut consumers =
      AvailabilityResolver::new(index, &ideal, &naive.reachability).consumers(decisions)?;

    let claimed =
      ManualSharedBundleExtractor::new(index, self.config).extract(&mut ideal, &mut consumers, decisions);
    AutomaticSharedBundler::new(index, self.config).bundle(
      &mut ideal,
      &consumers,
      &claimed,
      decisions,
    );
    ParallelRequestLimiter::new(index, self.config).limit(&mut ideal, decisions);

    Ok(ideal)
  }
}

use atlaspack_core::asset_graph::AssetGraph;
use tracing::{info, instrument};

use crate::bundle_graph::BundleGraph;
use crate::config::ResolvedBundlerConfig;
use crate::ideal_graph::materialize::BundleGraphWriter;
use crate::ideal_graph::IdealGraphBuilder;

pub mod bundle_graph;
pub mod config;
pub mod ideal_graph;
pub mod identity;

/// Bundler algorithms take an asset graph and assign assets to bundles.
///
/// Implementations are expected to mutate the provided `BundleGraph` to:
/// - create bundle and bundle group nodes
/// - connect groups to their bundles, bundles to the bundles they reference, and bundles to the
///   groups they load asynchronously
pub trait Bundler {
  fn bundle(&self, asset_graph: &AssetGraph, bundle_graph: &mut BundleGraph)
    -> anyhow::Result<()>;
}

/// The default bundling strategy
///
/// Splits code at async, parallel and type boundaries, extracts assets used by several bundles
/// into shared bundles and keeps the number of bundles loaded at once within the configured limit.
#[derive(Debug, Default)]
pub struct DefaultBundler {
  pub config: ResolvedBundlerConfig,
}

impl DefaultBundler {
  pub fn new(config: ResolvedBundlerConfig) -> Self {
    Self { config }
  }
}

impl Bundler for DefaultBundler {
  #[instrument(level = "info", skip_all)]
  fn bundle(
    &self,
    asset_graph: &AssetGraph,
    bundle_graph: &mut BundleGraph,
  ) -> anyhow::Result<()> {
    let build = IdealGraphBuilder::new(&self.config).build(asset_graph)?;

    for ideal in &build.graphs {
      BundleGraphWriter::new(&build.index, &self.config, ideal).write(bundle_graph)?;
    }

    bundle_graph.decisions.append(build.decisions);

    info!(
      assets = build.stats.assets,
      targets = build.stats.targets,
      bundle_roots = build.stats.bundle_roots,
      shared_bundles = build.stats.shared_bundles,
      manual_bundles = build.stats.manual_bundles,
      bundles = bundle_graph.bundles().count(),
      "bundled asset graph"
    );

    Ok(())
  }
}

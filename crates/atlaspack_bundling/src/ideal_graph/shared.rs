use std::collections::{BTreeMap, BTreeSet};

use atlaspack_core::types::FileType;
use fixedbitset::FixedBitSet;
use tracing::{debug, instrument};

use super::availability::Consumers;
use super::graph_index::GraphIndex;
use super::types::{AssetKey, DecisionKind, DecisionLog, DissolveReason, IdealGraph, SharedBundle};
use crate::config::ResolvedBundlerConfig;

/// Places every asset into the bundles of the roots that need it, sharing where worthwhile
///
/// Assets needed by enough splittable roots are grouped by the exact set of roots and their type.
/// A group too small to be worth a request is dissolved back into its roots.
pub struct AutomaticSharedBundler<'a> {
  index: &'a GraphIndex,
  config: &'a ResolvedBundlerConfig,
}

impl<'a> AutomaticSharedBundler<'a> {
  pub fn new(index: &'a GraphIndex, config: &'a ResolvedBundlerConfig) -> Self {
    Self { index, config }
  }

  #[instrument(level = "debug", skip_all)]
  pub fn bundle(
    &self,
    ideal: &mut IdealGraph,
    consumers: &Consumers,
    claimed: &FixedBitSet,
    decisions: &mut DecisionLog,
  ) {
    let threshold = self.config.shared_threshold();
    let mut provisional: BTreeMap<(Vec<AssetKey>, FileType), BTreeSet<AssetKey>> =
      BTreeMap::new();
    let mut duplicated = 0;

    for (asset, roots) in consumers {
      let source = self.index.asset(*asset);

      let (direct, candidates): (Vec<AssetKey>, Vec<AssetKey>) =
        roots.iter().copied().partition(|root| {
          ideal
            .roots
            .get(root)
            .map_or(true, |root| root.is_entry_like())
        });

      let shareable = !self.config.disable_shared_bundles
        && !claimed.contains(asset.0 as usize)
        && !ideal.roots.contains_key(asset)
        && source.is_bundle_splittable
        && candidates.len() >= threshold;

      if !shareable {
        if roots.len() > 1 {
          duplicated += 1;
        }
        for root in roots {
          place(ideal, *root, &source.file_type, *asset);
        }
        continue;
      }

      for root in direct {
        place(ideal, root, &source.file_type, *asset);
      }

      provisional
        .entry((candidates, source.file_type.clone()))
        .or_default()
        .insert(*asset);
    }

    for ((roots, file_type), assets) in provisional {
      let size: u64 = assets.iter().map(|asset| self.index.size(*asset)).sum();
      let source_root_ids = roots
        .iter()
        .map(|root| self.index.id_for(*root).to_string())
        .collect();

      if size < self.config.min_bundle_size {
        for root in &roots {
          for asset in &assets {
            place(ideal, *root, &file_type, *asset);
          }
        }

        decisions.push(
          "shared",
          DecisionKind::SharedBundleDissolved {
            file_type,
            source_root_ids,
            reason: DissolveReason::BelowMinBundleSize,
          },
        );
        continue;
      }

      decisions.push(
        "shared",
        DecisionKind::SharedBundleCreated {
          file_type: file_type.clone(),
          source_root_ids,
          assets_len: assets.len(),
          size,
        },
      );

      ideal.shared_bundles.push(SharedBundle {
        file_type,
        assets,
        consumers: roots.into_iter().collect(),
        size,
        alive: true,
      });
    }

    debug!(
      shared_bundles = ideal.shared_bundles.len(),
      duplicated,
      "ideal graph: placed assets"
    );
  }
}

/// Adds an asset to the bucket `root` packages assets of `file_type` into
pub(super) fn place(ideal: &mut IdealGraph, root: AssetKey, file_type: &FileType, asset: AssetKey) {
  let bucket = ideal.bucket_type(root, file_type);
  ideal.place(root, bucket, asset);
}

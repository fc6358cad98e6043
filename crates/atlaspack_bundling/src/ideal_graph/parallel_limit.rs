use std::collections::BTreeSet;

use tracing::{debug, instrument, trace};

use super::bundle_groups::assign_bundle_groups;
use super::graph_index::GraphIndex;
use super::shared::place;
use super::types::{
  AssetKey, BundleEdge, DecisionKind, DecisionLog, DissolveReason, IdealGraph, RemovedBundle,
  SharedBundleIdx,
};
use crate::config::ResolvedBundlerConfig;
use crate::identity::bundle_id;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Candidate {
  Shared(SharedBundleIdx),
  Reused(AssetKey),
}

#[derive(Debug, Clone)]
struct Removal {
  candidate: Candidate,
  size: u64,
  bundle_id: String,

  /// Members of the group the removal applies to
  consumers: BTreeSet<AssetKey>,
}

/// Caps the number of bundles a single bundle group loads
///
/// While a group loads more than `max_parallel_requests` bundles, the smallest shared or reused
/// bundle is copied back into the group's roots that load it. Only bundles whose assets have a
/// bundle of the same type to go to are candidates. Manual bundles count towards the limit but are
/// never removed.
pub struct ParallelRequestLimiter<'a> {
  index: &'a GraphIndex,
  config: &'a ResolvedBundlerConfig,
}

impl<'a> ParallelRequestLimiter<'a> {
  pub fn new(index: &'a GraphIndex, config: &'a ResolvedBundlerConfig) -> Self {
    Self { index, config }
  }

  #[instrument(level = "debug", skip_all)]
  pub fn limit(&self, ideal: &mut IdealGraph, decisions: &mut DecisionLog) {
    if self.config.disable_shared_bundles {
      return;
    }

    let groups: Vec<AssetKey> = ideal.group_roots().collect();
    let mut removed = 0;

    // Removing a reused root can add shared bundles to another group, so revisit until stable
    loop {
      let mut changed = false;

      for group in &groups {
        while self.request_count(ideal, *group) > self.config.max_parallel_requests {
          let Some(removal) = self.next_removal(ideal, *group) else {
            debug!(
              group = self.index.id_for(*group),
              "ideal graph: group exceeds max parallel requests with nothing left to remove"
            );
            break;
          };

          self.apply(ideal, *group, &removal, decisions);
          self.prune(ideal, decisions);

          removed += 1;
          changed = true;
        }
      }

      if !changed {
        break;
      }
    }

    debug!(
      groups = groups.len(),
      removed,
      max_parallel_requests = self.config.max_parallel_requests,
      "ideal graph: limited parallel requests"
    );
  }

  /// Number of separately loaded bundles in a group
  fn request_count(&self, ideal: &IdealGraph, group: AssetKey) -> usize {
    let (own, reused) = ideal.group_members(group);
    let members: BTreeSet<AssetKey> = own.union(&reused).copied().collect();

    let root_bundles: usize = members
      .iter()
      .filter(|member| ideal.roots.get(member).is_some_and(|root| !root.is_inline()))
      .map(|member| {
        ideal
          .placements
          .get(member)
          .map_or(0, |buckets| buckets.values().filter(|a| !a.is_empty()).count())
      })
      .sum();

    let shared = ideal
      .live_shared_bundles()
      .filter(|(_, bundle)| !bundle.consumers.is_disjoint(&members))
      .count();

    let manual = ideal
      .manual_bundles
      .values()
      .filter(|bundle| !bundle.consumers.is_disjoint(&members))
      .count();

    root_bundles + shared + manual
  }

  fn next_removal(&self, ideal: &IdealGraph, group: AssetKey) -> Option<Removal> {
    let (own, reused) = ideal.group_members(group);
    let members: BTreeSet<AssetKey> = own.union(&reused).copied().collect();
    let dist_dir = &ideal.target.dist_dir;

    let mut candidates = Vec::new();

    for (idx, bundle) in ideal.live_shared_bundles() {
      let consumers: BTreeSet<AssetKey> =
        bundle.consumers.intersection(&members).copied().collect();

      if consumers.is_empty() {
        continue;
      }

      let has_target = consumers.iter().all(|consumer| {
        ideal.has_bucket(*consumer, &ideal.bucket_type(*consumer, &bundle.file_type))
      });
      if !has_target {
        continue;
      }

      let asset_ids: Vec<&str> = bundle
        .assets
        .iter()
        .map(|asset| self.index.id_for(*asset))
        .collect();

      candidates.push(Removal {
        candidate: Candidate::Shared(idx),
        size: bundle.size,
        bundle_id: bundle_id(&asset_ids, &bundle.file_type, dist_dir),
        consumers,
      });
    }

    for reused_root in &reused {
      let Some(root) = ideal.roots.get(reused_root) else {
        continue;
      };
      if root.is_inline() {
        continue;
      }

      let reusers: BTreeSet<AssetKey> = ideal
        .reusers_of(*reused_root)
        .filter(|reuser| own.contains(reuser))
        .collect();

      let Some(buckets) = ideal.placements.get(reused_root) else {
        continue;
      };

      let has_target = reusers.iter().all(|reuser| {
        buckets
          .keys()
          .all(|file_type| ideal.has_bucket(*reuser, &ideal.bucket_type(*reuser, file_type)))
      });
      if reusers.is_empty() || !has_target {
        continue;
      }

      let size = buckets
        .values()
        .flatten()
        .map(|asset| self.index.size(*asset))
        .sum();

      let main_assets: Vec<&str> = buckets
        .get(&root.file_type)
        .into_iter()
        .flatten()
        .map(|asset| self.index.id_for(*asset))
        .collect();

      candidates.push(Removal {
        candidate: Candidate::Reused(*reused_root),
        size,
        bundle_id: bundle_id(&main_assets, &root.file_type, dist_dir),
        consumers: reusers,
      });
    }

    candidates
      .into_iter()
      .min_by(|a, b| (a.size, &a.bundle_id).cmp(&(b.size, &b.bundle_id)))
  }

  fn apply(
    &self,
    ideal: &mut IdealGraph,
    group: AssetKey,
    removal: &Removal,
    decisions: &mut DecisionLog,
  ) {
    let removed = match &removal.candidate {
      Candidate::Shared(idx) => {
        let bundle = ideal.shared_bundles[*idx].clone();

        for consumer in &removal.consumers {
          for asset in &bundle.assets {
            place(ideal, *consumer, &bundle.file_type, *asset);
          }
          ideal.shared_bundles[*idx].consumers.remove(consumer);
        }

        RemovedBundle::Shared {
          bundle_id: removal.bundle_id.clone(),
        }
      }
      Candidate::Reused(reused_root) => {
        let buckets = ideal
          .placements
          .get(reused_root)
          .cloned()
          .unwrap_or_default();

        let nested: Vec<AssetKey> = ideal.reused_by(*reused_root).collect();
        let outgoing: Vec<BundleEdge> = ideal
          .bundle_edges
          .iter()
          .filter(|edge| edge.from == *reused_root)
          .cloned()
          .collect();

        for reuser in &removal.consumers {
          ideal.reused.remove(&(*reuser, *reused_root));

          for (file_type, assets) in &buckets {
            for asset in assets {
              place(ideal, *reuser, file_type, *asset);
            }
          }

          // The reuser now packages the reused root's code, so it loads whatever that code loads
          for edge in &outgoing {
            if edge.to == *reuser {
              continue;
            }

            let edge = BundleEdge {
              from: *reuser,
              ..edge.clone()
            };
            if !ideal.bundle_edges.contains(&edge) {
              ideal.bundle_edges.push(edge);
            }
          }

          for nested_root in &nested {
            if nested_root != reuser {
              ideal.reused.insert((*reuser, *nested_root));
            }
          }

          let entry_like = ideal
            .roots
            .get(reuser)
            .is_some_and(|root| root.is_entry_like());

          for bundle in ideal.shared_bundles.iter_mut().filter(|b| b.alive) {
            if bundle.consumers.contains(reused_root) && !entry_like {
              bundle.consumers.insert(*reuser);
            }
          }

          // Entry-like roots never load shared bundles, so they take the assets directly
          if entry_like {
            let inherited: Vec<_> = ideal
              .live_shared_bundles()
              .filter(|(_, bundle)| bundle.consumers.contains(reused_root))
              .flat_map(|(_, bundle)| {
                bundle
                  .assets
                  .iter()
                  .map(|asset| (bundle.file_type.clone(), *asset))
                  .collect::<Vec<_>>()
              })
              .collect();

            for (file_type, asset) in inherited {
              place(ideal, *reuser, &file_type, asset);
            }
          }

          for bundle in ideal.manual_bundles.values_mut() {
            if bundle.consumers.contains(reused_root) {
              bundle.consumers.insert(*reuser);
            }
          }
        }

        // Parallel and inline roots of the reused root now also load in the reuser's groups
        assign_bundle_groups(ideal);

        RemovedBundle::Reused {
          root_asset_id: self.index.id_for(*reused_root).to_string(),
        }
      }
    };

    trace!(
      group = self.index.id_for(group),
      bundle_id = %removal.bundle_id,
      size = removal.size,
      "ideal graph: removed bundle from group"
    );

    decisions.push(
      "limit",
      DecisionKind::BundleRemovedFromGroup {
        group_root_id: self.index.id_for(group).to_string(),
        removed,
        size: removal.size,
      },
    );
  }

  /// Dissolves shared bundles left with fewer than two consumers
  fn prune(&self, ideal: &mut IdealGraph, decisions: &mut DecisionLog) {
    for idx in 0..ideal.shared_bundles.len() {
      let bundle = &ideal.shared_bundles[idx];
      if !bundle.alive || bundle.consumers.len() >= 2 {
        continue;
      }

      let bundle = bundle.clone();
      ideal.shared_bundles[idx].alive = false;

      for consumer in &bundle.consumers {
        for asset in &bundle.assets {
          place(ideal, *consumer, &bundle.file_type, *asset);
        }
      }

      decisions.push(
        "limit",
        DecisionKind::SharedBundleDissolved {
          file_type: bundle.file_type.clone(),
          source_root_ids: bundle
            .consumers
            .iter()
            .map(|consumer| self.index.id_for(*consumer).to_string())
            .collect(),
          reason: DissolveReason::SingleConsumer,
        },
      );
    }
  }
}

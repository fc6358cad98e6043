use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use atlaspack_core::types::{AssetId, Environment, FileType, Priority, Target};
use bitflags::bitflags;

/// Compact, ordered key for an asset within a bundling pass.
///
/// Keys are assigned over the sorted list of asset ids, so ordering by key is ordering by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetKey(pub u32);

bitflags! {
  /// Why an asset became a bundle root
  ///
  /// A root reached through several dependencies carries the union of their triggers.
  #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
  pub struct RootTriggers: u8 {
    const ENTRY = 1 << 0;
    const LAZY = 1 << 1;
    const CONDITIONAL = 1 << 2;
    const PARALLEL = 1 << 3;
    const ISOLATED = 1 << 4;
    const INLINE = 1 << 5;
    const ENVIRONMENT = 1 << 6;
  }
}

impl RootTriggers {
  /// Whether a root reached this way loads in a bundle group of its own
  ///
  /// Inline bundles are always written into their parent, so an inline trigger keeps the root in
  /// the parent's groups unless it is also loaded some other way.
  pub fn creates_group(&self) -> bool {
    if self.intersects(Self::ENTRY | Self::LAZY | Self::CONDITIONAL | Self::ENVIRONMENT) {
      return true;
    }

    self.contains(Self::ISOLATED) && !self.contains(Self::INLINE)
  }

  /// Roots that start from nothing loaded: they never rely on what a parent already has
  pub fn starts_empty(&self) -> bool {
    self.intersects(Self::ENTRY | Self::ISOLATED | Self::INLINE | Self::ENVIRONMENT)
  }
}

/// An asset that begins a new loading unit, packaged for its environment
#[derive(Debug, Clone, PartialEq)]
pub struct BundleRoot {
  pub asset: AssetKey,
  pub asset_id: AssetId,
  pub env: Arc<Environment>,
  pub file_type: FileType,
  pub triggers: RootTriggers,

  /// Set for entries and for roots created by a dependency that needs a stable name
  pub needs_stable_name: bool,

  /// `webpackChunkName` of the first creating dependency that declared one
  pub chunk_name: Option<String>,

  /// Mirrors the root asset's `is_bundle_splittable`
  pub is_splittable: bool,
}

impl BundleRoot {
  pub fn is_single_file(&self) -> bool {
    self.env.unstable_single_file_output
  }

  /// Entry-like roots receive every asset they reach and never load automatic shared bundles
  pub fn is_entry_like(&self) -> bool {
    self
      .triggers
      .intersects(RootTriggers::ENTRY | RootTriggers::ISOLATED | RootTriggers::INLINE)
      || self.needs_stable_name
      || !self.is_splittable
      || self.is_single_file()
  }

  pub fn is_inline(&self) -> bool {
    self.triggers.contains(RootTriggers::INLINE) && !self.triggers.creates_group()
  }

  /// Whether a synchronous import of this root may load its bundle instead of copying it
  pub fn is_reusable(&self) -> bool {
    !self
      .triggers
      .intersects(RootTriggers::ENTRY | RootTriggers::ISOLATED | RootTriggers::INLINE)
  }
}

/// A dependency that crosses from one root's subgraph into another root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEdge {
  pub from: AssetKey,
  pub to: AssetKey,

  /// The asset that declared the dependency
  pub source: AssetKey,
  pub dependency_id: String,
  pub triggers: RootTriggers,
}

/// Identifies a manual shared bundle within a pass
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManualBundleKey {
  pub name: String,
  pub file_type: FileType,
  pub partition: usize,

  /// The configured number of partitions
  pub split: usize,
}

impl ManualBundleKey {
  /// The name used for identity and display, including the partition when split
  pub fn qualified_name(&self) -> String {
    if self.split > 1 {
      format!("{}-{}", self.name, self.partition)
    } else {
      self.name.clone()
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualBundle {
  pub assets: BTreeSet<AssetKey>,

  /// Roots whose subgraph had an asset extracted into this bundle
  pub consumers: BTreeSet<AssetKey>,
}

/// A generated bundle holding assets needed by several roots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedBundle {
  pub file_type: FileType,
  pub assets: BTreeSet<AssetKey>,
  pub consumers: BTreeSet<AssetKey>,
  pub size: u64,
  pub alive: bool,
}

pub type SharedBundleIdx = usize;

/// Placement of assets into bundles for one target
///
/// This is the result of the pipeline before it is written into a bundle graph.
#[derive(Debug, Clone, Default)]
pub struct IdealGraph {
  pub target: Target,

  pub roots: BTreeMap<AssetKey, BundleRoot>,

  /// Dependencies that load another root
  pub bundle_edges: Vec<BundleEdge>,

  /// `(root, reused root)`: the first root loads the second root's bundles rather than copying them
  pub reused: BTreeSet<(AssetKey, AssetKey)>,

  /// Root -> bundle group roots it belongs to, not counting reuse
  pub own_groups: BTreeMap<AssetKey, BTreeSet<AssetKey>>,

  /// Root -> assets it has to package, per output type
  pub placements: BTreeMap<AssetKey, BTreeMap<FileType, BTreeSet<AssetKey>>>,

  pub manual_bundles: BTreeMap<ManualBundleKey, ManualBundle>,

  pub shared_bundles: Vec<SharedBundle>,
}

impl IdealGraph {
  pub fn new(target: Target) -> Self {
    IdealGraph {
      target,
      ..IdealGraph::default()
    }
  }

  pub fn place(&mut self, root: AssetKey, file_type: FileType, asset: AssetKey) {
    self
      .placements
      .entry(root)
      .or_default()
      .entry(file_type)
      .or_default()
      .insert(asset);
  }

  /// The type a root packages an asset of `file_type` as
  ///
  /// Single file output collapses every type into the root's own bundle.
  pub fn bucket_type(&self, root: AssetKey, file_type: &FileType) -> FileType {
    match self.roots.get(&root) {
      Some(root) if root.is_single_file() => root.file_type.clone(),
      _ => file_type.clone(),
    }
  }

  pub fn has_bucket(&self, root: AssetKey, file_type: &FileType) -> bool {
    self
      .placements
      .get(&root)
      .is_some_and(|buckets| buckets.get(file_type).is_some_and(|a| !a.is_empty()))
  }

  /// Roots reused by `root`
  pub fn reused_by(&self, root: AssetKey) -> impl Iterator<Item = AssetKey> + '_ {
    self
      .reused
      .range((root, AssetKey(0))..=(root, AssetKey(u32::MAX)))
      .map(|(_, reused)| *reused)
  }

  /// Roots that reuse `root`
  pub fn reusers_of(&self, root: AssetKey) -> impl Iterator<Item = AssetKey> + '_ {
    self
      .reused
      .iter()
      .filter(move |(_, reused)| *reused == root)
      .map(|(reuser, _)| *reuser)
  }

  /// Roots `root` loads through reuse, following reused roots that reuse others in turn
  pub fn reused_closure(&self, root: AssetKey) -> BTreeSet<AssetKey> {
    self.reuse_closure(root, |key| self.reused_by(key).collect())
  }

  /// Roots that load `root` through reuse, directly or through a chain of reused roots
  pub fn reusers_closure(&self, root: AssetKey) -> BTreeSet<AssetKey> {
    self.reuse_closure(root, |key| self.reusers_of(key).collect())
  }

  fn reuse_closure(
    &self,
    root: AssetKey,
    next: impl Fn(AssetKey) -> Vec<AssetKey>,
  ) -> BTreeSet<AssetKey> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![root];

    while let Some(key) = stack.pop() {
      for other in next(key) {
        if other != root && seen.insert(other) {
          stack.push(other);
        }
      }
    }

    seen
  }

  /// Roots whose bundles are loaded by the bundle group of `group_root`
  ///
  /// Returns the own members and the roots only present through reuse separately.
  pub fn group_members(&self, group_root: AssetKey) -> (BTreeSet<AssetKey>, BTreeSet<AssetKey>) {
    let own: BTreeSet<AssetKey> = self
      .own_groups
      .iter()
      .filter(|(_, groups)| groups.contains(&group_root))
      .map(|(root, _)| *root)
      .collect();

    let reused = own
      .iter()
      .flat_map(|root| self.reused_closure(*root))
      .filter(|root| !own.contains(root))
      .collect();

    (own, reused)
  }

  /// Every bundle group a root's bundles load in, through membership or reuse
  pub fn all_groups(&self, root: AssetKey) -> BTreeSet<AssetKey> {
    let mut groups = self.own_groups.get(&root).cloned().unwrap_or_default();
    for reuser in self.reusers_closure(root) {
      if let Some(reuser_groups) = self.own_groups.get(&reuser) {
        groups.extend(reuser_groups.iter().copied());
      }
    }
    groups
  }

  pub fn group_roots(&self) -> impl Iterator<Item = AssetKey> + '_ {
    self
      .roots
      .values()
      .filter(|root| root.triggers.creates_group())
      .map(|root| root.asset)
  }

  pub fn live_shared_bundles(&self) -> impl Iterator<Item = (SharedBundleIdx, &SharedBundle)> {
    self
      .shared_bundles
      .iter()
      .enumerate()
      .filter(|(_, bundle)| bundle.alive)
  }
}

/// Typed decision event.
///
/// This is intended for debugging/visualization and should not be used for correctness.
///
/// To extend: add new variants. Each phase of the pipeline records why it made a particular
/// choice here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionKind {
  // roots
  BundleRootCreated {
    asset_id: AssetId,
    triggers: RootTriggers,
  },
  BoundaryCreated {
    asset_id: AssetId,
    from_asset_id: AssetId,
    dependency_id: String,
    priority: Priority,
    triggers: RootTriggers,
  },

  // reachability
  BundleReused {
    asset_id: AssetId,
    reused_by_asset_id: AssetId,
  },

  // availability
  AvailabilityComputed {
    root_asset_id: AssetId,
    available_assets_len: usize,
  },

  // manual
  ManualBundleCreated {
    name: String,
    file_type: FileType,
    partition: usize,
    assets_len: usize,
  },

  // shared
  SharedBundleCreated {
    file_type: FileType,
    source_root_ids: Vec<AssetId>,
    assets_len: usize,
    size: u64,
  },
  SharedBundleDissolved {
    file_type: FileType,
    source_root_ids: Vec<AssetId>,
    reason: DissolveReason,
  },

  // limit
  BundleRemovedFromGroup {
    group_root_id: AssetId,
    removed: RemovedBundle,
    size: u64,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DissolveReason {
  BelowMinBundleSize,
  SingleConsumer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovedBundle {
  Shared { bundle_id: String },
  Reused { root_asset_id: AssetId },
}

/// Single decision event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
  /// Monotonically increasing sequence number assigned by the logger.
  pub seq: u64,

  /// Phase name (free-form).
  pub phase: &'static str,

  pub kind: DecisionKind,
}

/// A collection of decisions captured during a bundling pass.
///
/// This is intended for debugging/visualization and should not be used for correctness.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DecisionLog {
  next_seq: u64,
  pub decisions: Vec<Decision>,
}

impl DecisionLog {
  pub fn push(&mut self, phase: &'static str, kind: DecisionKind) {
    let seq = self.next_seq;
    self.next_seq += 1;

    self.decisions.push(Decision { seq, phase, kind });
  }

  pub fn is_empty(&self) -> bool {
    self.decisions.is_empty()
  }

  pub fn len(&self) -> usize {
    self.decisions.len()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Decision> {
    self.decisions.iter()
  }

  /// Appends another log, renumbering its decisions
  pub fn append(&mut self, other: DecisionLog) {
    for decision in other.decisions {
      self.push(decision.phase, decision.kind);
    }
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn group_creating_triggers() {
    assert!(RootTriggers::LAZY.creates_group());
    assert!(RootTriggers::ISOLATED.creates_group());
    assert!((RootTriggers::PARALLEL | RootTriggers::ENVIRONMENT).creates_group());
    assert!(!RootTriggers::PARALLEL.creates_group());
    assert!(!RootTriggers::INLINE.creates_group());
    assert!(!(RootTriggers::INLINE | RootTriggers::ISOLATED).creates_group());
  }

  #[test]
  fn decisions_are_sequential_after_append() {
    let mut log = DecisionLog::default();
    log.push(
      "roots",
      DecisionKind::BundleRootCreated {
        asset_id: String::from("a"),
        triggers: RootTriggers::ENTRY,
      },
    );

    let mut other = DecisionLog::default();
    other.push(
      "roots",
      DecisionKind::BundleRootCreated {
        asset_id: String::from("b"),
        triggers: RootTriggers::LAZY,
      },
    );
    log.append(other);

    let seqs: Vec<u64> = log.iter().map(|d| d.seq).collect();
    assert_eq!(seqs, vec![0, 1]);
  }

  #[test]
  fn manual_bundle_names_include_partition_when_split() {
    let key = ManualBundleKey {
      name: String::from("vendor"),
      file_type: FileType::Js,
      partition: 2,
      split: 3,
    };
    assert_eq!(key.qualified_name(), String::from("vendor-2"));

    let single = ManualBundleKey { split: 1, partition: 0, ..key };
    assert_eq!(single.qualified_name(), String::from("vendor"));
  }
}

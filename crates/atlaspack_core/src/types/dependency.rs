use std::hash::Hash;
use std::hash::Hasher;
use std::path::PathBuf;
use std::sync::Arc;

use derive_builder::Builder;
use serde_repr::Deserialize_repr;
use serde_repr::Serialize_repr;

use crate::hash::IdentifierHasher;

use super::asset::AssetId;
use super::bundle::BundleBehavior;
use super::environment::Environment;
use super::target::Target;

/// Stable id of a dependency, derived from everything that distinguishes it from its siblings
pub fn create_dependency_id(
  source_asset_id: Option<&AssetId>,
  specifier: &str,
  environment_id: &str,
  target: Option<&Target>,
  specifier_type: &SpecifierType,
  bundle_behavior: &Option<BundleBehavior>,
  priority: &Priority,
) -> String {
  let mut hasher = IdentifierHasher::new();

  source_asset_id.hash(&mut hasher);
  specifier.hash(&mut hasher);
  environment_id.hash(&mut hasher);
  target.hash(&mut hasher);
  specifier_type.hash(&mut hasher);
  bundle_behavior.hash(&mut hasher);
  priority.hash(&mut hasher);

  format!("{:016x}", hasher.finish())
}

/// An edge from an asset to the asset it imports
///
/// Always built through [`DependencyBuilder::build`] so the id matches the content.
#[derive(Hash, PartialEq, Clone, Debug, Default, Builder)]
#[builder(build_fn(skip), pattern = "owned", setter(strip_option))]
#[non_exhaustive]
pub struct Dependency {
  #[builder(setter(skip))]
  pub id: String,

  /// What the importing asset wrote, e.g. `./page.js`
  pub specifier: String,
  pub specifier_type: SpecifierType,

  /// When the imported asset has to be loaded
  pub priority: Priority,

  /// Overrides how the imported asset's bundle is packaged
  pub bundle_behavior: Option<BundleBehavior>,

  /// Environment the imported asset runs in
  pub env: Arc<Environment>,

  pub source_asset_id: Option<AssetId>,
  pub source_path: Option<PathBuf>,

  /// Set on entry dependencies only
  pub target: Option<Box<Target>>,

  pub is_entry: bool,
  pub is_optional: bool,

  /// The bundle created for this dependency keeps its name when its contents change
  pub needs_stable_name: bool,

  /// Value of a `webpackChunkName` magic comment on the import
  pub chunk_name_magic_comment: Option<String>,
}

impl DependencyBuilder {
  pub fn build(self) -> Dependency {
    let specifier = self.specifier.expect("specifier is required");
    let env = self.env.expect("env is required");
    let specifier_type = self.specifier_type.unwrap_or_default();
    let priority = self.priority.unwrap_or_default();
    let source_asset_id = self.source_asset_id.flatten();
    let target = self.target.flatten();
    let bundle_behavior = self.bundle_behavior.flatten();

    let id = create_dependency_id(
      source_asset_id.as_ref(),
      &specifier,
      &env.id(),
      target.as_deref(),
      &specifier_type,
      &bundle_behavior,
      &priority,
    );

    Dependency {
      id,
      specifier,
      specifier_type,
      priority,
      bundle_behavior,
      env,
      source_asset_id,
      source_path: self.source_path.flatten(),
      target,
      is_entry: self.is_entry.unwrap_or_default(),
      is_optional: self.is_optional.unwrap_or_default(),
      needs_stable_name: self.needs_stable_name.unwrap_or_default(),
      chunk_name_magic_comment: self.chunk_name_magic_comment.flatten(),
    }
  }
}

impl Dependency {
  pub fn id(&self) -> String {
    self.id.clone()
  }

  /// The dependency a target starts from
  pub fn entry(entry: String, target: Target) -> Dependency {
    DependencyBuilder::default()
      .env(target.env.clone())
      .is_entry(true)
      .needs_stable_name(true)
      .specifier(entry)
      .specifier_type(SpecifierType::Url)
      .target(Box::new(target))
      .build()
  }

  pub fn is_isolated(&self) -> bool {
    self.bundle_behavior.is_some_and(|b| b.is_isolated())
  }

  pub fn is_inline(&self) -> bool {
    self.bundle_behavior.is_some_and(|b| b.is_inline())
  }
}

#[derive(
  Clone, Copy, Debug, Default, Deserialize_repr, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize_repr,
)]
#[repr(u32)]
pub enum Priority {
  /// Packaged with the importer, or loaded alongside it
  #[default]
  Sync = 0,
  /// Loaded at the same time as the importer, in a bundle of its own
  Parallel = 1,
  /// Loaded on demand
  Lazy = 2,
  /// Loaded on demand when a runtime condition holds
  Conditional = 3,
}

#[derive(Clone, Copy, Debug, Default, Deserialize_repr, Eq, Hash, PartialEq, Serialize_repr)]
#[repr(u8)]
pub enum SpecifierType {
  #[default]
  Esm = 0,
  CommonJS = 1,
  Url = 2,
  Custom = 3,
}

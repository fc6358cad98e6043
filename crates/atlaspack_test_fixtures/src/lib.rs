use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use atlaspack_core::asset_graph::AssetGraph;
use atlaspack_core::asset_graph::NodeId;
use atlaspack_core::types::Asset;
use atlaspack_core::types::AssetId;
use atlaspack_core::types::BundleBehavior;
use atlaspack_core::types::Dependency;
use atlaspack_core::types::DependencyBuilder;
use atlaspack_core::types::Environment;
use atlaspack_core::types::Priority;
use atlaspack_core::types::Target;

// Re-export indoc for convenience in tests
pub use indoc::indoc;

/// Size given to assets that are created implicitly by a dependency
pub const DEFAULT_ASSET_SIZE: u32 = 1000;

/// Builds asset graphs the way the transform stage would hand them to the bundler
///
/// Assets are addressed by their path relative to the project root. Adding a dependency to a path
/// that has not been declared creates the asset with [`DEFAULT_ASSET_SIZE`].
///
/// ```
/// use atlaspack_test_fixtures::AssetGraphFixture;
///
/// let fixture = AssetGraphFixture::new()
///   .entry("index.js")
///   .sync("index.js", "a.js")
///   .lazy("index.js", "b.js");
///
/// assert_eq!(fixture.graph().asset_count(), 3);
/// ```
#[derive(Clone, Debug)]
pub struct AssetGraphFixture {
  pub project_root: PathBuf,
  pub target: Target,
  graph: AssetGraph,
  assets: HashMap<String, (NodeId, Arc<Asset>)>,
}

impl Default for AssetGraphFixture {
  fn default() -> Self {
    Self::new()
  }
}

impl AssetGraphFixture {
  pub fn new() -> Self {
    Self::with_project_root(PathBuf::from("/app"))
  }

  pub fn with_project_root(project_root: PathBuf) -> Self {
    Self {
      project_root,
      target: Target::default(),
      graph: AssetGraph::new(),
      assets: HashMap::new(),
    }
  }

  /// Sets the target used by entries added afterwards
  pub fn with_target(mut self, target: Target) -> Self {
    self.target = target;
    self
  }

  pub fn graph(&self) -> &AssetGraph {
    &self.graph
  }

  pub fn into_graph(self) -> AssetGraph {
    self.graph
  }

  /// Declares an asset in the target's environment
  pub fn asset(self, path: &str, size: u32) -> Self {
    let env = self.target.env.clone();
    self.asset_in(path, size, env)
  }

  /// Declares an asset in a specific environment
  pub fn asset_in(mut self, path: &str, size: u32, env: Arc<Environment>) -> Self {
    self.add_asset(path, size, env);
    self
  }

  /// Changes an already declared asset
  ///
  /// The closure must not change anything the asset id is derived from.
  pub fn configure_asset(mut self, path: &str, configure: impl FnOnce(&mut Asset)) -> Self {
    let (_, asset) = self.ensure_asset(path);
    let mut asset = (*asset).clone();
    configure(&mut asset);

    let asset = Arc::new(asset);
    let node_id = self.graph.add_asset(asset.clone());
    self.assets.insert(path.to_string(), (node_id, asset));
    self
  }

  pub fn bundle_behavior(self, path: &str, behavior: BundleBehavior) -> Self {
    self.configure_asset(path, |asset| asset.bundle_behavior = Some(behavior))
  }

  pub fn not_splittable(self, path: &str) -> Self {
    self.configure_asset(path, |asset| asset.is_bundle_splittable = false)
  }

  /// Adds an entry dependency for the current target
  pub fn entry(mut self, path: &str) -> Self {
    let target = self.target.clone();
    let (asset_node, _) = self.ensure_asset(path);

    let dependency = Dependency::entry(path.to_string(), target);
    let dependency_node = self.graph.add_entry_dependency(dependency);
    self.graph.add_edge(&dependency_node, &asset_node);
    self
  }

  /// Adds an entry dependency that does not resolve to any asset
  pub fn unresolved_entry(mut self, path: &str) -> Self {
    let dependency = Dependency::entry(path.to_string(), self.target.clone());
    self.graph.add_entry_dependency(dependency);
    self
  }

  pub fn sync(self, from: &str, to: &str) -> Self {
    self.dependency(from, to, |builder| builder.priority(Priority::Sync))
  }

  pub fn lazy(self, from: &str, to: &str) -> Self {
    self.dependency(from, to, |builder| builder.priority(Priority::Lazy))
  }

  pub fn parallel(self, from: &str, to: &str) -> Self {
    self.dependency(from, to, |builder| builder.priority(Priority::Parallel))
  }

  pub fn conditional(self, from: &str, to: &str) -> Self {
    self.dependency(from, to, |builder| builder.priority(Priority::Conditional))
  }

  /// Adds a dependency from `from` to `to`, letting the caller set anything beyond the defaults
  pub fn dependency(
    mut self,
    from: &str,
    to: &str,
    configure: impl FnOnce(DependencyBuilder) -> DependencyBuilder,
  ) -> Self {
    let (from_node, from_asset) = self.ensure_asset(from);
    let (to_node, _) = self.ensure_asset(to);

    let builder = DependencyBuilder::default()
      .specifier(format!("./{}", to))
      .env(from_asset.env.clone())
      .source_asset_id(from_asset.id.clone())
      .source_path(from_asset.file_path.clone());

    let dependency_node = self.graph.add_dependency(configure(builder).build());
    self.graph.add_edge(&from_node, &dependency_node);
    self.graph.add_edge(&dependency_node, &to_node);
    self
  }

  /// Adds a dependency that the resolver could not resolve
  pub fn unresolved(mut self, from: &str, specifier: &str) -> Self {
    let (from_node, from_asset) = self.ensure_asset(from);

    let dependency = DependencyBuilder::default()
      .specifier(specifier.to_string())
      .env(from_asset.env.clone())
      .source_asset_id(from_asset.id.clone())
      .is_optional(true)
      .build();

    let dependency_node = self.graph.add_dependency(dependency);
    self.graph.add_edge(&from_node, &dependency_node);
    self
  }

  pub fn asset_id(&self, path: &str) -> AssetId {
    self
      .assets
      .get(path)
      .map(|(_, asset)| asset.id.clone())
      .unwrap_or_else(|| panic!("no asset declared for {}", path))
  }

  pub fn get_asset(&self, path: &str) -> Arc<Asset> {
    self
      .assets
      .get(path)
      .map(|(_, asset)| asset.clone())
      .unwrap_or_else(|| panic!("no asset declared for {}", path))
  }

  /// Sorted ids of the given paths, handy for comparing bundle contents
  pub fn asset_ids(&self, paths: &[&str]) -> Vec<AssetId> {
    let mut ids: Vec<AssetId> = paths.iter().map(|path| self.asset_id(path)).collect();
    ids.sort();
    ids
  }

  /// Finds the path an asset id was declared under
  pub fn path_for(&self, asset_id: &str) -> Option<&str> {
    self
      .assets
      .iter()
      .find(|(_, (_, asset))| asset.id == asset_id)
      .map(|(path, _)| path.as_str())
  }

  fn add_asset(&mut self, path: &str, size: u32, env: Arc<Environment>) -> (NodeId, Arc<Asset>) {
    let asset = Arc::new(Asset::new(self.project_root.join(path), env, size));
    let node_id = self.graph.add_asset(asset.clone());
    self
      .assets
      .insert(path.to_string(), (node_id, asset.clone()));
    (node_id, asset)
  }

  fn ensure_asset(&mut self, path: &str) -> (NodeId, Arc<Asset>) {
    if let Some((node_id, asset)) = self.assets.get(path) {
      return (*node_id, asset.clone());
    }

    let env = self.target.env.clone();
    self.add_asset(path, DEFAULT_ASSET_SIZE, env)
  }
}

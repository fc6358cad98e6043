use std::hash::Hash;
use std::hash::Hasher;

use serde::Deserialize;
use serde::Serialize;

use crate::hash::IdentifierHasher;

/// The environment the built code will run in
///
/// Two assets can only be placed in the same bundle when their environments
/// have the same id.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
  /// The environment the output should run in
  pub context: EnvironmentContext,

  /// The engines supported by the environment
  pub engines: Engines,

  /// Whether this is a library build
  pub is_library: bool,

  /// Determines what type of module to output
  pub output_format: OutputFormat,

  /// Determines whether scope hoisting should be enabled
  pub should_scope_hoist: bool,

  /// Determines whether the output should be optimised
  pub should_optimize: bool,

  /// Forces everything reachable from an entry of this environment into one bundle
  #[serde(rename = "unstableSingleFileOutput")]
  pub unstable_single_file_output: bool,
}

impl Environment {
  pub fn id(&self) -> String {
    let mut hasher = IdentifierHasher::new();
    self.context.hash(&mut hasher);
    self.engines.hash(&mut hasher);
    self.is_library.hash(&mut hasher);
    self.output_format.hash(&mut hasher);
    self.should_scope_hoist.hash(&mut hasher);
    self.should_optimize.hash(&mut hasher);
    self.unstable_single_file_output.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
  }
}

/// The environment the output should run in
///
/// This informs Atlaspack what environment-specific APIs are available.
///
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvironmentContext {
  #[default]
  Browser,
  ElectronMain,
  ElectronRenderer,
  Node,
  ServiceWorker,
  WebWorker,
  Worklet,
}

impl EnvironmentContext {
  pub fn is_node(&self) -> bool {
    use EnvironmentContext::*;
    matches!(self, Node | ElectronMain | ElectronRenderer)
  }

  pub fn is_browser(&self) -> bool {
    use EnvironmentContext::*;
    matches!(
      self,
      Browser | WebWorker | ServiceWorker | Worklet | ElectronRenderer
    )
  }

  pub fn is_worker(&self) -> bool {
    use EnvironmentContext::*;
    matches!(self, WebWorker | ServiceWorker)
  }
}

/// The module format bundles are emitted in
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
  #[default]
  Global,
  Commonjs,
  Esmodule,
}

/// Engine constraints, as declared by the `engines` field of a target
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Engines {
  pub browsers: Option<String>,
  pub electron: Option<String>,
  pub node: Option<String>,
}

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use super::environment::Environment;

/// A target represents how and where source code is compiled
///
/// For example, a "modern" target would output code that can run on the latest browsers while a
/// "legacy" target generates code compatible with older browsers.
///
#[derive(PartialEq, Eq, Clone, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
  /// The output folder for compiled bundles
  pub dist_dir: PathBuf,

  /// The output filename of the entry
  pub dist_entry: Option<PathBuf>,

  /// The environment the code will run in
  pub env: Arc<Environment>,

  /// The name of the target
  pub name: String,

  /// The URL bundles will be loaded with at runtime
  pub public_url: String,
}

impl Default for Target {
  fn default() -> Self {
    Self {
      dist_dir: PathBuf::from("dist"),
      dist_entry: None,
      env: Arc::new(Environment::default()),
      name: String::from("default"),
      public_url: String::from("/"),
    }
  }
}

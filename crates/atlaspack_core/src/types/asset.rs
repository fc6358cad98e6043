use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use super::bundle::MaybeBundleBehavior;
use super::environment::Environment;
use super::file_type::FileType;

pub type AssetId = String;

#[derive(Debug)]
pub struct CreateAssetIdParams<'a> {
  pub environment_id: &'a str,
  /// All paths should be normalized to a project relative string to generate a consistent hash.
  pub file_path: &'a str,
  pub file_type: &'a FileType,
  pub pipeline: Option<&'a str>,
  pub query: Option<&'a str>,
  pub unique_key: Option<&'a str>,
}

pub fn create_asset_id(params: CreateAssetIdParams) -> String {
  tracing::trace!(?params, "Creating asset id");

  let CreateAssetIdParams {
    environment_id,
    file_path,
    file_type,
    pipeline,
    query,
    unique_key,
  } = params;

  let mut hasher = crate::hash::IdentifierHasher::default();

  environment_id.hash(&mut hasher);
  file_path.hash(&mut hasher);
  pipeline.hash(&mut hasher);
  query.hash(&mut hasher);
  file_type.hash(&mut hasher);
  unique_key.hash(&mut hasher);

  format!("{:016x}", hasher.finish())
}

/// Statistics about an asset, populated by the transform stage
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetStats {
  /// Size of the transformed output in bytes
  pub size: u32,
  pub time: u32,
}

/// An asset is a file or part of a file that may represent any data type including source code, binary data, etc.
///
/// Assets are immutable once the transform stage has produced them. The bundler only reads them.
#[derive(PartialEq, Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Asset {
  /// The main identify hash for the asset. It is consistent for the entire
  /// build and between builds.
  pub id: AssetId,

  /// Controls which bundle the asset is placed into
  pub bundle_behavior: MaybeBundleBehavior,

  /// The environment of the asset
  pub env: Arc<Environment>,

  /// The file path to the asset
  pub file_path: PathBuf,

  /// The file type of the asset, which may change during transformation
  #[serde(rename = "type")]
  pub file_type: FileType,

  /// Statistics about the asset
  pub stats: AssetStats,

  /// A unique key that identifies an asset when a transformer returns several
  pub unique_key: Option<String>,

  /// Whether this asset can be omitted if none of its exports are being used
  pub side_effects: bool,

  /// Whether the bundler may move this asset out of the bundle that reaches it
  ///
  /// Transformers set this to false for assets that must stay with their importer, which vetoes
  /// extraction into shared and manual bundles.
  pub is_bundle_splittable: bool,

  /// Whether this asset is part of the project, and not an external dependency
  pub is_source: bool,
}

impl Default for Asset {
  fn default() -> Self {
    Self {
      id: AssetId::default(),
      bundle_behavior: None,
      env: Arc::new(Environment::default()),
      file_path: PathBuf::default(),
      file_type: FileType::default(),
      stats: AssetStats::default(),
      unique_key: None,
      side_effects: true,
      is_bundle_splittable: true,
      is_source: true,
    }
  }
}

impl Asset {
  /// Creates an asset with an id derived from its path, type and environment
  pub fn new(file_path: impl Into<PathBuf>, env: Arc<Environment>, size: u32) -> Self {
    let file_path = file_path.into();
    let file_type = file_path
      .extension()
      .map(|ext| FileType::from_extension(&ext.to_string_lossy()))
      .unwrap_or_default();

    let id = create_asset_id(CreateAssetIdParams {
      environment_id: &env.id(),
      file_path: &file_path.to_string_lossy(),
      file_type: &file_type,
      pipeline: None,
      query: None,
      unique_key: None,
    });

    Self {
      id,
      env,
      file_path,
      file_type,
      stats: AssetStats { size, time: 0 },
      ..Asset::default()
    }
  }

  pub fn file_path(&self) -> &Path {
    &self.file_path
  }

  /// The file name without its extension, used when naming bundles
  pub fn file_stem(&self) -> String {
    self
      .file_path
      .file_stem()
      .map(|stem| stem.to_string_lossy().into_owned())
      .unwrap_or_else(|| self.id.clone())
  }

  pub fn size(&self) -> u64 {
    u64::from(self.stats.size)
  }
}

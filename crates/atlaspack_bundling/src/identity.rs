//! Stable ids and file names for bundles
//!
//! Ids only depend on what a bundle contains and where it is written, never on the order the
//! bundler happened to visit the graph in.

use std::path::Path;

use atlaspack_core::hash::hash_string;
use atlaspack_core::types::FileType;

/// Id of a root or shared bundle, derived from its sorted asset ids
///
/// `asset_ids` must already be sorted.
pub fn bundle_id(asset_ids: &[&str], file_type: &FileType, dist_dir: &Path) -> String {
  hash_string(format!(
    "{}{}{}",
    asset_ids.concat(),
    file_type.extension(),
    dist_dir.display()
  ))
}

/// Id of a manual shared bundle, derived from its name so it survives content changes
///
/// `name` includes the partition suffix for split bundles.
pub fn manual_bundle_id(name: &str, file_type: &FileType, dist_dir: &Path) -> String {
  hash_string(format!(
    "{}{}{}",
    name,
    file_type.extension(),
    dist_dir.display()
  ))
}

/// Short content hash placed in the names of bundles that do not need a stable name
pub fn name_hash(bundle_id: &str) -> &str {
  &bundle_id[..bundle_id.len().min(8)]
}

pub fn stable_name(stem: &str, file_type: &FileType) -> String {
  format!("{}.{}", stem, file_type.extension())
}

pub fn hashed_name(stem: &str, bundle_id: &str, file_type: &FileType) -> String {
  format!("{}.{}.{}", stem, name_hash(bundle_id), file_type.extension())
}

pub fn shared_name(bundle_id: &str, file_type: &FileType) -> String {
  format!("{}.{}", name_hash(bundle_id), file_type.extension())
}

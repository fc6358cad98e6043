use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use atlaspack_core::types::{
  BuildMode, CodeFrame, CodeHighlight, Diagnostic, Diagnostics, FeatureFlags, FileType, Location,
};
use serde::Deserialize;
use serde_repr::Deserialize_repr;
use tracing::debug;

/// The package.json key the bundler reads its configuration from
pub const CONFIG_KEY: &str = "@atlaspack/bundler-default";

const SUPPORT_WEBPACK_CHUNK_NAME: &str = "supportWebpackChunkName";

#[derive(Clone, Copy, Debug, Default, Deserialize_repr, Eq, PartialEq)]
#[repr(u8)]
pub enum HttpVersion {
  Http1 = 1,
  #[default]
  Http2 = 2,
}

impl HttpVersion {
  fn default_min_bundle_size(&self) -> u64 {
    match self {
      HttpVersion::Http1 => 30000,
      HttpVersion::Http2 => 20000,
    }
  }

  fn default_max_parallel_requests(&self) -> usize {
    match self {
      HttpVersion::Http1 => 6,
      HttpVersion::Http2 => 25,
    }
  }
}

/// A user-declared bundle, as written in package.json
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManualSharedBundleConfig {
  pub name: String,

  /// Restricts matching to the synchronous subgraph of this file
  pub root: Option<PathBuf>,

  /// Globs relative to the project root
  pub assets: Vec<String>,

  /// Only assets of these types are matched
  pub types: Option<Vec<FileType>>,

  /// Number of partitions to spread matching assets over
  pub split: Option<usize>,
}

/// Options that can appear at the top level or inside a mode overlay
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundlerOptions {
  pub http: Option<HttpVersion>,
  pub min_bundles: Option<usize>,
  pub min_bundle_size: Option<u64>,
  pub max_parallel_requests: Option<usize>,
  pub disable_shared_bundles: Option<bool>,
  pub manual_shared_bundles: Option<Vec<ManualSharedBundleConfig>>,
  #[serde(rename = "unstable_manualSharedBundles")]
  pub unstable_manual_shared_bundles: Option<Vec<ManualSharedBundleConfig>>,
}

impl BundlerOptions {
  fn merge(self, overlay: BundlerOptions) -> BundlerOptions {
    BundlerOptions {
      http: overlay.http.or(self.http),
      min_bundles: overlay.min_bundles.or(self.min_bundles),
      min_bundle_size: overlay.min_bundle_size.or(self.min_bundle_size),
      max_parallel_requests: overlay.max_parallel_requests.or(self.max_parallel_requests),
      disable_shared_bundles: overlay.disable_shared_bundles.or(self.disable_shared_bundles),
      manual_shared_bundles: overlay.manual_shared_bundles.or(self.manual_shared_bundles),
      unstable_manual_shared_bundles: overlay
        .unstable_manual_shared_bundles
        .or(self.unstable_manual_shared_bundles),
    }
  }
}

/// Where a configuration was loaded from, used to point diagnostics at it
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConfigSource {
  pub file_path: PathBuf,
  pub contents: String,
}

/// Raw bundler configuration, before mode overlays and defaults are applied
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundlerConfig {
  #[serde(flatten)]
  pub options: BundlerOptions,
  pub production: Option<BundlerOptions>,
  pub development: Option<BundlerOptions>,

  #[serde(skip)]
  pub source: Option<ConfigSource>,
}

/// A manual shared bundle with globs resolved against the project root
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ManualSharedBundle {
  pub name: String,
  pub root: Option<PathBuf>,
  pub assets: Vec<String>,
  pub types: Option<Vec<FileType>>,
  pub split: usize,
}

impl ManualSharedBundle {
  pub fn matches_type(&self, file_type: &FileType) -> bool {
    self
      .types
      .as_ref()
      .map_or(true, |types| types.contains(file_type))
  }

  pub fn matches_path(&self, project_root: &Path, file_path: &Path) -> bool {
    let file_path = resolve_from(project_root, file_path);
    let file_path = file_path.to_string_lossy();

    self
      .assets
      .iter()
      .any(|glob| glob_match::glob_match(glob, &file_path))
  }
}

/// The configuration bundling runs with
///
/// Produced once per build by [`BundlerConfig::resolve`]; the algorithm never looks at raw config.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedBundlerConfig {
  pub project_root: PathBuf,
  pub min_bundles: usize,
  pub min_bundle_size: u64,
  pub max_parallel_requests: usize,
  pub disable_shared_bundles: bool,
  pub manual_shared_bundles: Vec<ManualSharedBundle>,
  pub support_webpack_chunk_name: bool,
}

impl Default for ResolvedBundlerConfig {
  fn default() -> Self {
    let http = HttpVersion::default();

    ResolvedBundlerConfig {
      project_root: PathBuf::from("/"),
      min_bundles: 1,
      min_bundle_size: http.default_min_bundle_size(),
      max_parallel_requests: http.default_max_parallel_requests(),
      disable_shared_bundles: false,
      manual_shared_bundles: Vec::new(),
      support_webpack_chunk_name: false,
    }
  }
}

impl ResolvedBundlerConfig {
  /// Minimum number of roots that must need an asset before it is shared
  pub fn shared_threshold(&self) -> usize {
    self.min_bundles.max(2)
  }
}

impl BundlerConfig {
  /// Reads the bundler configuration from the contents of a package.json
  ///
  /// A missing key yields the default configuration.
  pub fn from_package_json(file_path: &Path, contents: &str) -> anyhow::Result<BundlerConfig> {
    let package_json: serde_json::Value = serde_json::from_str(contents)
      .with_context(|| format!("failed to parse {}", file_path.display()))?;

    let mut config = match package_json.get(CONFIG_KEY) {
      None => BundlerConfig::default(),
      Some(value) => serde_json::from_value(value.clone())
        .with_context(|| format!("invalid \"{}\" in {}", CONFIG_KEY, file_path.display()))?,
    };

    config.source = Some(ConfigSource {
      file_path: file_path.to_path_buf(),
      contents: contents.to_string(),
    });

    Ok(config)
  }

  /// Applies the overlay for `mode` and fills in defaults
  ///
  /// Options that have no effect are reported as warnings rather than errors.
  pub fn resolve(
    &self,
    mode: &BuildMode,
    project_root: &Path,
    feature_flags: &FeatureFlags,
  ) -> (ResolvedBundlerConfig, Diagnostics) {
    let overlay = match mode {
      BuildMode::Production => self.production.clone(),
      BuildMode::Development => self.development.clone(),
      BuildMode::Other(_) => None,
    };

    let options = match overlay {
      Some(overlay) => self.options.clone().merge(overlay),
      None => self.options.clone(),
    };

    let http = options.http.unwrap_or_default();
    let disable_shared_bundles = options.disable_shared_bundles.unwrap_or(false);

    let mut diagnostics = Diagnostics::default();
    if disable_shared_bundles {
      let ignored = [
        ("minBundles", options.min_bundles.map(|v| v.to_string())),
        ("minBundleSize", options.min_bundle_size.map(|v| v.to_string())),
        (
          "maxParallelRequests",
          options.max_parallel_requests.map(|v| v.to_string()),
        ),
      ];

      for (option, value) in ignored {
        if let Some(value) = value {
          diagnostics.push(self.ignored_option_warning(option, &value));
        }
      }
    }

    let manual_shared_bundles = options
      .manual_shared_bundles
      .or(options.unstable_manual_shared_bundles)
      .unwrap_or_default()
      .into_iter()
      .map(|manual| ManualSharedBundle {
        name: manual.name,
        root: manual.root.map(|root| resolve_from(project_root, &root)),
        assets: manual
          .assets
          .iter()
          .map(|glob| {
            resolve_from(project_root, Path::new(glob))
              .to_string_lossy()
              .into_owned()
          })
          .collect(),
        types: manual.types,
        split: manual.split.unwrap_or(1).max(1),
      })
      .collect::<Vec<_>>();

    let resolved = ResolvedBundlerConfig {
      project_root: project_root.to_path_buf(),
      min_bundles: options.min_bundles.unwrap_or(1),
      min_bundle_size: options
        .min_bundle_size
        .unwrap_or_else(|| http.default_min_bundle_size()),
      max_parallel_requests: options
        .max_parallel_requests
        .unwrap_or_else(|| http.default_max_parallel_requests()),
      disable_shared_bundles,
      manual_shared_bundles,
      support_webpack_chunk_name: feature_flags.bool_enabled(SUPPORT_WEBPACK_CHUNK_NAME),
    };

    debug!(
      mode = %mode,
      min_bundles = resolved.min_bundles,
      min_bundle_size = resolved.min_bundle_size,
      max_parallel_requests = resolved.max_parallel_requests,
      disable_shared_bundles = resolved.disable_shared_bundles,
      manual_shared_bundles = resolved.manual_shared_bundles.len(),
      warnings = diagnostics.len(),
      "resolved bundler config"
    );

    (resolved, diagnostics)
  }

  fn ignored_option_warning(&self, option: &str, value: &str) -> Diagnostic {
    let code_frames = self.source.as_ref().map(|source| {
      let code_highlights = locate_key(&source.contents, option)
        .map(|(start, end)| {
          vec![CodeHighlight {
            start,
            end,
            message: Some(String::from("This option has no effect")),
          }]
        })
        .unwrap_or_default();

      vec![CodeFrame {
        code: Some(source.contents.clone()),
        file_path: Some(source.file_path.clone()),
        code_highlights,
      }]
    });

    Diagnostic {
      message: format!(
        "The value of \"{}\" set for {} will not be used as shared bundles have been disabled",
        value, option
      ),
      origin: Some(String::from(CONFIG_KEY)),
      code_frames,
      ..Diagnostic::default()
    }
  }
}

/// Finds the quoted key in JSON source, returning one-based start and end positions
fn locate_key(contents: &str, key: &str) -> Option<(Location, Location)> {
  let needle = format!("\"{}\"", key);
  let offset = contents.find(&needle)?;

  let before = &contents[..offset];
  let line = before.matches('\n').count() + 1;
  let column = offset - before.rfind('\n').map_or(0, |i| i + 1) + 1;

  Some((
    Location { line, column },
    Location {
      line,
      column: column + needle.len() - 1,
    },
  ))
}

/// Joins `path` onto `root` and removes `.` and `..` segments without touching the file system
pub(crate) fn resolve_from(root: &Path, path: &Path) -> PathBuf {
  let mut result: Vec<Component<'_>> = if path.is_absolute() {
    vec![]
  } else {
    root.components().collect()
  };

  for component in path.components() {
    match component {
      Component::Prefix(prefix) => {
        result = vec![Component::Prefix(prefix)];
      }
      Component::RootDir => {
        result.push(Component::RootDir);
      }
      Component::CurDir => {}
      Component::ParentDir => {
        if !matches!(result.last(), Some(Component::RootDir) | None) {
          result.pop();
        }
      }
      Component::Normal(segment) => {
        result.push(Component::Normal(segment));
      }
    }
  }

  PathBuf::from_iter(result)
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  fn package_json(config: &str) -> String {
    format!(
      "{{\n  \"name\": \"app\",\n  \"{}\": {}\n}}",
      CONFIG_KEY, config
    )
  }

  fn resolve(config: &str, mode: BuildMode) -> (ResolvedBundlerConfig, Diagnostics) {
    BundlerConfig::from_package_json(Path::new("/app/package.json"), &package_json(config))
      .unwrap()
      .resolve(&mode, Path::new("/app"), &FeatureFlags::default())
  }

  #[test]
  fn defaults_to_http2() {
    let (config, diagnostics) = resolve("{}", BuildMode::Development);

    assert_eq!(config.min_bundles, 1);
    assert_eq!(config.min_bundle_size, 20000);
    assert_eq!(config.max_parallel_requests, 25);
    assert_eq!(config.shared_threshold(), 2);
    assert!(!config.disable_shared_bundles);
    assert!(diagnostics.is_empty());
  }

  #[test]
  fn http1_changes_defaults() {
    let (config, _) = resolve(r#"{ "http": 1 }"#, BuildMode::Development);

    assert_eq!(config.min_bundle_size, 30000);
    assert_eq!(config.max_parallel_requests, 6);
  }

  #[test]
  fn rejects_unknown_http_versions() {
    let error = BundlerConfig::from_package_json(
      Path::new("/app/package.json"),
      &package_json(r#"{ "http": 3 }"#),
    )
    .unwrap_err();

    assert!(error.to_string().contains(CONFIG_KEY));
  }

  #[test]
  fn missing_key_uses_defaults() {
    let config =
      BundlerConfig::from_package_json(Path::new("/app/package.json"), r#"{ "name": "app" }"#)
        .unwrap();

    assert_eq!(config.options, BundlerOptions::default());
  }

  #[test]
  fn applies_the_overlay_for_the_build_mode() {
    let config = r#"{
      "minBundleSize": 100,
      "production": { "minBundleSize": 5000, "maxParallelRequests": 3 },
      "development": { "minBundles": 4 }
    }"#;

    let (production, _) = resolve(config, BuildMode::Production);
    assert_eq!(production.min_bundle_size, 5000);
    assert_eq!(production.max_parallel_requests, 3);
    assert_eq!(production.min_bundles, 1);

    let (development, _) = resolve(config, BuildMode::Development);
    assert_eq!(development.min_bundle_size, 100);
    assert_eq!(development.max_parallel_requests, 25);
    assert_eq!(development.min_bundles, 4);
  }

  #[test]
  fn warns_once_per_option_ignored_by_disabled_shared_bundles() {
    let (config, diagnostics) = resolve(
      r#"{
    "disableSharedBundles": true,
    "minBundles": 2,
    "minBundleSize": 200,
    "maxParallelRequests": 5
  }"#,
      BuildMode::Development,
    );

    assert!(config.disable_shared_bundles);

    let messages: Vec<&str> = diagnostics.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(
      messages,
      vec![
        "The value of \"2\" set for minBundles will not be used as shared bundles have been disabled",
        "The value of \"200\" set for minBundleSize will not be used as shared bundles have been disabled",
        "The value of \"5\" set for maxParallelRequests will not be used as shared bundles have been disabled",
      ]
    );

    let first = &diagnostics.as_ref()[0];
    assert_eq!(first.origin.as_deref(), Some(CONFIG_KEY));

    let frame = &first.code_frames.as_ref().unwrap()[0];
    assert_eq!(frame.file_path, Some(PathBuf::from("/app/package.json")));
    assert_eq!(
      frame.code_highlights[0].start,
      Location { line: 5, column: 5 }
    );
  }

  #[test]
  fn warns_without_a_code_frame_when_there_is_no_source() {
    let config = BundlerConfig {
      options: BundlerOptions {
        disable_shared_bundles: Some(true),
        min_bundles: Some(3),
        ..BundlerOptions::default()
      },
      ..BundlerConfig::default()
    };

    let (_, diagnostics) = config.resolve(
      &BuildMode::Production,
      Path::new("/app"),
      &FeatureFlags::default(),
    );

    assert_eq!(
      diagnostics.into_inner(),
      vec![Diagnostic {
        message: String::from(
          "The value of \"3\" set for minBundles will not be used as shared bundles have been disabled"
        ),
        origin: Some(String::from(CONFIG_KEY)),
        ..Diagnostic::default()
      }]
    );
  }

  #[test]
  fn does_not_warn_for_options_that_are_not_set() {
    let (_, diagnostics) = resolve(
      r#"{ "disableSharedBundles": true, "minBundleSize": 200 }"#,
      BuildMode::Development,
    );

    assert_eq!(diagnostics.len(), 1);
  }

  #[test]
  fn resolves_manual_bundle_globs_against_the_project_root() {
    let (config, _) = resolve(
      r#"{
        "manualSharedBundles": [
          { "name": "vendor", "assets": ["vendor*.*", "../shared/**/*.js"], "split": 3 },
          { "name": "ui", "root": "src/index.js", "assets": ["src/ui/**"], "types": ["css"] }
        ]
      }"#,
      BuildMode::Development,
    );

    let vendor = &config.manual_shared_bundles[0];
    assert_eq!(
      vendor.assets,
      vec![
        String::from("/app/vendor*.*"),
        String::from("/shared/**/*.js")
      ]
    );
    assert_eq!(vendor.split, 3);
    assert!(vendor.matches_path(Path::new("/app"), Path::new("/app/vendor.js")));
    assert!(vendor.matches_path(Path::new("/app"), Path::new("../shared/lib/a.js")));
    assert!(!vendor.matches_path(Path::new("/app"), Path::new("/app/src/vendor.js")));

    let ui = &config.manual_shared_bundles[1];
    assert_eq!(ui.root, Some(PathBuf::from("/app/src/index.js")));
    assert_eq!(ui.split, 1);
    assert!(ui.matches_type(&FileType::Css));
    assert!(!ui.matches_type(&FileType::Js));
  }

  #[test]
  fn accepts_the_legacy_manual_bundle_key() {
    let (config, _) = resolve(
      r#"{ "unstable_manualSharedBundles": [{ "name": "legacy", "assets": ["**/*.js"] }] }"#,
      BuildMode::Development,
    );

    assert_eq!(config.manual_shared_bundles.len(), 1);
    assert_eq!(config.manual_shared_bundles[0].name, String::from("legacy"));
  }

  #[test]
  fn reads_feature_flags() {
    let (config, _) = BundlerConfig::default().resolve(
      &BuildMode::Development,
      Path::new("/app"),
      &FeatureFlags::default().with_bool(SUPPORT_WEBPACK_CHUNK_NAME, true),
    );

    assert!(config.support_webpack_chunk_name);
  }

  #[test]
  fn normalises_parent_segments() {
    assert_eq!(
      resolve_from(Path::new("/a/b"), Path::new("../c/./d")),
      PathBuf::from("/a/c/d")
    );
    assert_eq!(
      resolve_from(Path::new("/a"), Path::new("/x/../y")),
      PathBuf::from("/y")
    );
  }
}

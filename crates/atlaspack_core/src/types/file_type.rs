use std::fmt::Display;
use std::hash::Hash;

use serde::Deserialize;
use serde::Serialize;

/// Represents a file type by its extension
///
/// Bundles are typed: every asset in a bundle shares the bundle's file type.
/// Defaults to `FileType::Js` for convenience.
#[derive(Default, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileType {
  Css,
  Html,
  #[default]
  Js,
  Json,
  Png,
  Svg,
  Wasm,
  Other(String),
}

impl Serialize for FileType {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    self.extension().serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for FileType {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    let ext: String = Deserialize::deserialize(deserializer)?;
    Ok(Self::from_extension(&ext))
  }
}

impl Display for FileType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.extension())
  }
}

impl FileType {
  pub fn extension(&self) -> &str {
    match self {
      FileType::Css => "css",
      FileType::Html => "html",
      FileType::Js => "js",
      FileType::Json => "json",
      FileType::Png => "png",
      FileType::Svg => "svg",
      FileType::Wasm => "wasm",
      FileType::Other(s) => s.as_str(),
    }
  }

  /// Source extensions that compile to the same output type collapse to one variant
  pub fn from_extension(ext: &str) -> Self {
    match ext {
      "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx" => FileType::Js,
      "css" => FileType::Css,
      "html" | "htm" => FileType::Html,
      "json" => FileType::Json,
      "png" => FileType::Png,
      "svg" => FileType::Svg,
      "wasm" => FileType::Wasm,
      ext => FileType::Other(ext.to_string()),
    }
  }
}

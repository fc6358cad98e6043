use std::fmt::Display;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;

#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
  #[default]
  Development,
  Production,
  Other(String),
}

impl Display for BuildMode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      BuildMode::Development => write!(f, "development"),
      BuildMode::Production => write!(f, "production"),
      BuildMode::Other(mode) => write!(f, "{}", mode.to_lowercase()),
    }
  }
}

impl<'de> Deserialize<'de> for BuildMode {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    let s = String::deserialize(deserializer)?;

    Ok(match s.as_str() {
      "development" => BuildMode::Development,
      "production" => BuildMode::Production,
      other => BuildMode::Other(other.to_string()),
    })
  }
}

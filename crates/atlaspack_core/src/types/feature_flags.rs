use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureFlagValue {
  String(String),
  Bool(bool),
}

/// Feature flags are resolved once per build and passed down explicitly
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureFlags(pub BTreeMap<String, FeatureFlagValue>);

impl FeatureFlags {
  pub fn bool_enabled(&self, name: &str) -> bool {
    matches!(self.0.get(name), Some(FeatureFlagValue::Bool(true)))
  }

  pub fn with_bool(mut self, name: &str, value: bool) -> Self {
    self
      .0
      .insert(name.to_string(), FeatureFlagValue::Bool(value));
    self
  }
}

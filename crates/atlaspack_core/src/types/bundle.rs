use serde::Deserialize;
use serde::Serialize;

/// Controls how a dependency's target is packaged relative to its parent
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleBehavior {
  /// The bundle is inlined into its parent bundle rather than loaded separately
  Inline,
  /// The bundle does not share any assets with its parents
  Isolated,
  /// The bundle is inlined and does not share any assets with its parents
  InlineIsolated,
}

impl BundleBehavior {
  pub fn is_inline(&self) -> bool {
    matches!(self, BundleBehavior::Inline | BundleBehavior::InlineIsolated)
  }

  pub fn is_isolated(&self) -> bool {
    matches!(
      self,
      BundleBehavior::Isolated | BundleBehavior::InlineIsolated
    )
  }
}

pub type MaybeBundleBehavior = Option<BundleBehavior>;

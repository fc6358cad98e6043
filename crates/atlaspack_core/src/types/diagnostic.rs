use std::fmt::Display;
use std::fmt::Formatter;
use std::path::PathBuf;

use derive_builder::Builder;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// A one-based line and column position
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Location {
  pub line: usize,
  pub column: usize,
}

/// Represents a snippet of code to highlight
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CodeHighlight {
  /// The start location to highlight
  pub start: Location,

  /// The end location to highlight
  pub end: Location,

  /// An optional message to display around the source-code range
  pub message: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeFrame {
  /// Source-code of the file at the time of the diagnostic
  pub code: Option<String>,

  /// Path to the source file if applicable
  pub file_path: Option<PathBuf>,

  /// List of source-code highlight messages
  pub code_highlights: Vec<CodeHighlight>,
}

/// This is a user facing diagnostic for Atlaspack.
///
/// Usually but not always this is linked to a source-code location.
#[derive(Builder, Clone, Debug, Default, Deserialize, Eq, Error, PartialEq, Serialize)]
#[builder(default, pattern = "owned", setter(into, strip_option))]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
  /// A summary user-facing message
  pub message: String,

  /// Indicates where this diagnostic was emitted from
  pub origin: Option<String>,

  /// Name of the diagnostic (optional)
  pub name: Option<String>,

  /// A list of files with source-code highlights
  pub code_frames: Option<Vec<CodeFrame>>,

  /// Hints for the user
  pub hints: Option<Vec<String>>,

  /// URL for the user to refer to documentation
  #[serde(rename = "documentationURL")]
  pub documentation_url: Option<String>,
}

impl Display for Diagnostic {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.message)
  }
}

impl Diagnostic {
  pub fn name_matches<N: AsRef<str>>(&self, name: N) -> bool {
    self.name.as_ref().is_some_and(|n| n == name.as_ref())
  }
}

/// Diagnostics aggregated over a build phase
#[derive(Clone, Debug, Default, Deserialize, Eq, Error, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
  pub fn as_ref(&self) -> &Vec<Diagnostic> {
    &self.0
  }

  pub fn push(&mut self, diagnostic: Diagnostic) {
    self.0.push(diagnostic);
  }

  pub fn extend(&mut self, other: Diagnostics) {
    self.0.extend(other.0);
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
    self.0.iter()
  }

  pub fn into_inner(self) -> Vec<Diagnostic> {
    self.0
  }
}

impl Display for Diagnostics {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let mut output = String::new();
    for diagnostic in &self.0 {
      output += &format!("{}\n", diagnostic);
    }
    write!(f, "{}", output)
  }
}

impl Serialize for Diagnostics {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    self.0.serialize(serializer)
  }
}

impl From<Vec<Diagnostic>> for Diagnostics {
  fn from(diagnostics: Vec<Diagnostic>) -> Self {
    Diagnostics(diagnostics)
  }
}

impl From<Diagnostic> for Diagnostics {
  fn from(diagnostic: Diagnostic) -> Self {
    Diagnostics(vec![diagnostic])
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn builds_diagnostics_with_optional_fields() {
    let diagnostic = DiagnosticBuilder::default()
      .message("Something happened")
      .origin("@atlaspack/bundler-default")
      .hints(vec![String::from("Try something else")])
      .build()
      .unwrap();

    assert_eq!(diagnostic.to_string(), String::from("Something happened"));
    assert_eq!(
      diagnostic.origin.as_deref(),
      Some("@atlaspack/bundler-default")
    );
    assert_eq!(diagnostic.code_frames, None);
  }

  #[test]
  fn displays_every_diagnostic_on_its_own_line() {
    let diagnostics = Diagnostics::from(vec![
      Diagnostic {
        message: String::from("first"),
        ..Diagnostic::default()
      },
      Diagnostic {
        message: String::from("second"),
        ..Diagnostic::default()
      },
    ]);

    assert_eq!(diagnostics.to_string(), String::from("first\nsecond\n"));
  }
}

//! Builder configuration.

use crate::target::Target;
use serde::{Deserialize, Serialize};

/// Number of spaces an indent level represents by default.
pub const DEFAULT_INDENT_WIDTH: usize = 2;

/// Configuration of a [`ProgramBuilder`](crate::ProgramBuilder).
///
/// The target fixes which code generator and which capability set apply to every program the builder compiles.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
  /// Shading language to generate.
  pub target: Target,

  /// Number of spaces per indentation level in the generated sources.
  pub indent_width: usize,
}

impl BuilderConfig {
  pub fn new(target: Target) -> Self {
    Self {
      target,
      ..Self::default()
    }
  }
}

impl Default for BuilderConfig {
  fn default() -> Self {
    Self {
      target: Target::WebGPU,
      indent_width: DEFAULT_INDENT_WIDTH,
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn deserialize_partial_config() {
    let config: BuilderConfig = serde_json::from_str(r#"{ "target": "webgl2" }"#).unwrap();
    assert_eq!(config.target, Target::WebGL2);
    assert_eq!(config.indent_width, DEFAULT_INDENT_WIDTH);
  }
}

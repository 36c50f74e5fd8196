//! Shader stages and stage visibility masks.

use serde::{Deserialize, Serialize};
use std::{fmt, ops::BitOr};

/// A programmable pipeline stage.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderStage {
  Vertex,
  Fragment,
  Compute,
}

impl ShaderStage {
  /// Visibility mask containing only this stage.
  pub const fn mask(self) -> StageMask {
    match self {
      ShaderStage::Vertex => StageMask::VERTEX,
      ShaderStage::Fragment => StageMask::FRAGMENT,
      ShaderStage::Compute => StageMask::COMPUTE,
    }
  }
}

impl fmt::Display for ShaderStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ShaderStage::Vertex => f.write_str("vertex"),
      ShaderStage::Fragment => f.write_str("fragment"),
      ShaderStage::Compute => f.write_str("compute"),
    }
  }
}

/// Set of stages a resource is visible from.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct StageMask(u32);

impl StageMask {
  pub const NONE: Self = StageMask(0);
  pub const VERTEX: Self = StageMask(1);
  pub const FRAGMENT: Self = StageMask(2);
  pub const COMPUTE: Self = StageMask(4);

  pub const fn bits(self) -> u32 {
    self.0
  }

  pub const fn contains(self, other: Self) -> bool {
    self.0 & other.0 == other.0
  }

  pub const fn is_empty(self) -> bool {
    self.0 == 0
  }

  /// Short name used when naming merged uniform blocks.
  pub(crate) fn partition_name(self) -> &'static str {
    if self.contains(StageMask::COMPUTE) {
      "cs"
    } else if self.contains(StageMask::VERTEX | StageMask::FRAGMENT) {
      "vsfs"
    } else if self.contains(StageMask::VERTEX) {
      "vs"
    } else {
      "fs"
    }
  }
}

impl BitOr for StageMask {
  type Output = Self;

  fn bitor(self, rhs: Self) -> Self {
    StageMask(self.0 | rhs.0)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn partition_names() {
    assert_eq!(StageMask::VERTEX.partition_name(), "vs");
    assert_eq!(StageMask::FRAGMENT.partition_name(), "fs");
    assert_eq!((StageMask::VERTEX | StageMask::FRAGMENT).partition_name(), "vsfs");
    assert_eq!(StageMask::COMPUTE.partition_name(), "cs");
  }

  #[test]
  fn mask_contains() {
    let both = ShaderStage::Vertex.mask() | ShaderStage::Fragment.mask();
    assert!(both.contains(StageMask::VERTEX));
    assert!(!StageMask::VERTEX.contains(both));
    assert!(StageMask::NONE.is_empty());
    assert_eq!(both.bits(), 3);
  }
}

//! Errors raised while building or rendering a shader program.

use crate::target::Target;
use std::fmt;
use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T, E = ShaderError> = std::result::Result<T, E>;

/// Error raised by any builder operation.
///
/// Errors are raised where they are detected, i.e. while the authoring callbacks build the program. The top-level
/// [`ProgramBuilder::build_render`](crate::ProgramBuilder::build_render) and
/// [`ProgramBuilder::build_compute`](crate::ProgramBuilder::build_compute) entry points turn them into a logged,
/// retrievable message.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ShaderError {
  /// Wrong argument count or argument type passed to a type constructor or a built-in.
  #[error("parameter error: {0}")]
  Parameter(String),

  /// Incompatible assignment or cast, illegal swizzle, unknown struct member, out-of-bounds index…
  #[error("type error: {0}")]
  Type(String),

  /// Construct not supported by the active target.
  #[error("{feature} is not supported when targeting {target}")]
  Capability { feature: String, target: Target },

  /// Redeclaration, declaration in the wrong scope, conflicting `return` types.
  #[error("declaration error: {0}")]
  Declaration(String),

  /// Broken invariant, such as referencing a function that was never registered.
  #[error("internal error: {0}")]
  Internal(String),

  /// A writer failed to format the generated source.
  #[error("cannot format shader source")]
  Format(#[from] fmt::Error),
}

impl ShaderError {
  pub(crate) fn parameter(msg: impl Into<String>) -> Self {
    ShaderError::Parameter(msg.into())
  }

  pub(crate) fn type_error(msg: impl Into<String>) -> Self {
    ShaderError::Type(msg.into())
  }

  pub(crate) fn capability(feature: impl Into<String>, target: Target) -> Self {
    ShaderError::Capability {
      feature: feature.into(),
      target,
    }
  }

  pub(crate) fn declaration(msg: impl Into<String>) -> Self {
    ShaderError::Declaration(msg.into())
  }

  pub(crate) fn internal(msg: impl Into<String>) -> Self {
    ShaderError::Internal(msg.into())
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn capability_message_names_target() {
    let err = ShaderError::capability("pointer types", Target::WebGL);
    let msg = err.to_string();
    assert!(msg.contains("pointer types"), "missing feature in: {msg}");
    assert!(msg.contains("WebGL"), "missing target in: {msg}");
  }

  #[test]
  fn error_is_send_sync() {
    fn assert_send_sync<T: Send + Sync + std::error::Error>() {}
    assert_send_sync::<ShaderError>();
  }
}

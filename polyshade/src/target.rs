//! Compilation targets and the capability table attached to each of them.

use crate::error::{Result, ShaderError};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Shading language a program is compiled to.
///
/// - [`Target::WebGL`] generates GLSL ES 1.00.
/// - [`Target::WebGL2`] generates GLSL ES 3.00.
/// - [`Target::WebGPU`] generates WGSL.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
  WebGL,
  WebGL2,
  WebGPU,
}

impl Target {
  /// Whether the target renders GLSL (either version).
  pub const fn is_glsl(self) -> bool {
    !matches!(self, Target::WebGPU)
  }

  /// Whether the target supports `feature`.
  pub fn supports(self, feature: Feature) -> bool {
    use Feature::*;

    match feature {
      UnsignedInt | NonSquareMatrix | BitwiseOps | TextureLoad | TextureDimensions | MatrixFunctions
      | RoundTrunc | ArrayConstructor | ArrayTexture | Texture3D | IntegerTexture | VertexIndex
      | IntegerAttributes | IntegerVaryings => self != Target::WebGL,

      Float16 | Pointer | StorageBuffer | Workgroup | Compute | ExplicitSampler | RuntimeArray
      | NestedArray | CubeArrayTexture | MultisampledTexture | DepthTextureLoad => self == Target::WebGPU,

      PointSize => self != Target::WebGPU,
    }
  }

  /// Fail with a capability error if `feature` is not supported.
  pub fn require(self, feature: Feature) -> Result<()> {
    if self.supports(feature) {
      Ok(())
    } else {
      Err(ShaderError::capability(feature.description(), self))
    }
  }
}

impl fmt::Display for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Target::WebGL => f.write_str("WebGL"),
      Target::WebGL2 => f.write_str("WebGL2"),
      Target::WebGPU => f.write_str("WebGPU"),
    }
  }
}

impl FromStr for Target {
  type Err = ShaderError;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_ascii_lowercase().as_str() {
      "webgl" | "webgl1" => Ok(Target::WebGL),
      "webgl2" => Ok(Target::WebGL2),
      "webgpu" => Ok(Target::WebGPU),
      _ => Err(ShaderError::parameter(format!("unknown target `{}`", s))),
    }
  }
}

/// Constructs that are not available on every target.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Feature {
  UnsignedInt,
  NonSquareMatrix,
  Float16,
  Pointer,
  StorageBuffer,
  Workgroup,
  Compute,
  ExplicitSampler,
  RuntimeArray,
  NestedArray,
  BitwiseOps,
  TextureLoad,
  TextureDimensions,
  DepthTextureLoad,
  MatrixFunctions,
  RoundTrunc,
  ArrayConstructor,
  ArrayTexture,
  Texture3D,
  IntegerTexture,
  CubeArrayTexture,
  MultisampledTexture,
  VertexIndex,
  PointSize,
  IntegerAttributes,
  IntegerVaryings,
}

impl Feature {
  pub const fn description(self) -> &'static str {
    match self {
      Feature::UnsignedInt => "unsigned 32-bit integer types",
      Feature::NonSquareMatrix => "non-square matrix types",
      Feature::Float16 => "16-bit floating point types",
      Feature::Pointer => "pointer types",
      Feature::StorageBuffer => "storage buffers",
      Feature::Workgroup => "workgroup variables",
      Feature::Compute => "compute shaders",
      Feature::ExplicitSampler => "explicit sampler objects",
      Feature::RuntimeArray => "runtime-sized arrays",
      Feature::NestedArray => "arrays of arrays",
      Feature::BitwiseOps => "bitwise operators",
      Feature::TextureLoad => "texel fetches",
      Feature::TextureDimensions => "texture dimension queries",
      Feature::DepthTextureLoad => "texel fetches from depth textures",
      Feature::MatrixFunctions => "matrix transpose and determinant",
      Feature::RoundTrunc => "round and trunc",
      Feature::ArrayConstructor => "array constructors",
      Feature::ArrayTexture => "array textures",
      Feature::Texture3D => "3D textures",
      Feature::IntegerTexture => "integer textures",
      Feature::CubeArrayTexture => "cube array textures",
      Feature::MultisampledTexture => "multisampled textures",
      Feature::VertexIndex => "vertex and instance index built-ins",
      Feature::PointSize => "the point size built-in",
      Feature::IntegerAttributes => "integer vertex attributes",
      Feature::IntegerVaryings => "integer stage outputs",
    }
  }
}

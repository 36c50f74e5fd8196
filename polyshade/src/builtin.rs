//! Stage built-in variables.

use crate::{
  ast::NodeKind,
  error::{Result, ShaderError},
  expr::Expr,
  program::ProgramBuilder,
  stage::ShaderStage,
  target::{Feature, Target},
  types::{PrimitiveType, ScalarKind},
};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum BuiltinVar {
  VertexIndex,
  InstanceIndex,
  Position,
  PointSize,
  FragCoord,
  FrontFacing,
  FragDepth,
  GlobalInvocationId,
  LocalInvocationId,
  LocalInvocationIndex,
  WorkgroupId,
  NumWorkgroups,
}

impl BuiltinVar {
  pub const fn stage(self) -> ShaderStage {
    match self {
      BuiltinVar::VertexIndex | BuiltinVar::InstanceIndex | BuiltinVar::Position | BuiltinVar::PointSize => {
        ShaderStage::Vertex
      }

      BuiltinVar::FragCoord | BuiltinVar::FrontFacing | BuiltinVar::FragDepth => ShaderStage::Fragment,

      _ => ShaderStage::Compute,
    }
  }

  /// Whether the built-in is written by the stage rather than read.
  pub const fn is_output(self) -> bool {
    matches!(
      self,
      BuiltinVar::Position | BuiltinVar::PointSize | BuiltinVar::FragDepth
    )
  }

  pub(crate) fn prim(self, target: Target) -> PrimitiveType {
    let index = if target == Target::WebGPU {
      ScalarKind::U32
    } else {
      ScalarKind::I32
    };

    match self {
      BuiltinVar::VertexIndex | BuiltinVar::InstanceIndex | BuiltinVar::LocalInvocationIndex => {
        PrimitiveType::scalar(index)
      }
      BuiltinVar::Position | BuiltinVar::FragCoord => PrimitiveType::vector(ScalarKind::F32, 4),
      BuiltinVar::PointSize | BuiltinVar::FragDepth => PrimitiveType::scalar(ScalarKind::F32),
      BuiltinVar::FrontFacing => PrimitiveType::scalar(ScalarKind::Bool),
      _ => PrimitiveType::vector(ScalarKind::U32, 3),
    }
  }

  pub(crate) fn glsl_name(self, target: Target) -> &'static str {
    match self {
      BuiltinVar::VertexIndex => "gl_VertexID",
      BuiltinVar::InstanceIndex => "gl_InstanceID",
      BuiltinVar::Position => "gl_Position",
      BuiltinVar::PointSize => "gl_PointSize",
      BuiltinVar::FragCoord => "gl_FragCoord",
      BuiltinVar::FrontFacing => "gl_FrontFacing",
      BuiltinVar::FragDepth if target == Target::WebGL => "gl_FragDepthEXT",
      BuiltinVar::FragDepth => "gl_FragDepth",
      BuiltinVar::GlobalInvocationId => "gl_GlobalInvocationID",
      BuiltinVar::LocalInvocationId => "gl_LocalInvocationID",
      BuiltinVar::LocalInvocationIndex => "gl_LocalInvocationIndex",
      BuiltinVar::WorkgroupId => "gl_WorkGroupID",
      BuiltinVar::NumWorkgroups => "gl_NumWorkGroups",
    }
  }

  /// Name of the WGSL `@builtin` attribute.
  pub(crate) fn wgsl_name(self) -> &'static str {
    match self {
      BuiltinVar::VertexIndex => "vertex_index",
      BuiltinVar::InstanceIndex => "instance_index",
      BuiltinVar::Position | BuiltinVar::FragCoord => "position",
      BuiltinVar::PointSize => "point_size",
      BuiltinVar::FrontFacing => "front_facing",
      BuiltinVar::FragDepth => "frag_depth",
      BuiltinVar::GlobalInvocationId => "global_invocation_id",
      BuiltinVar::LocalInvocationId => "local_invocation_id",
      BuiltinVar::LocalInvocationIndex => "local_invocation_index",
      BuiltinVar::WorkgroupId => "workgroup_id",
      BuiltinVar::NumWorkgroups => "num_workgroups",
    }
  }

  /// Name of the member holding the built-in in the WGSL stage structs.
  pub(crate) fn member_name(self) -> String {
    match self {
      BuiltinVar::FragCoord => "builtin_frag_coord".to_owned(),
      _ => format!("builtin_{}", self.wgsl_name()),
    }
  }
}

impl ProgramBuilder {
  /// Access a built-in variable of the stage being built.
  ///
  /// Repeated accesses yield the same expression.
  pub fn builtin(&mut self, var: BuiltinVar) -> Result<Expr> {
    let target = self.target();
    let state = self.stage_state()?;

    if var.stage() != state.stage {
      return Err(ShaderError::declaration(format!(
        "built-in {:?} is not available in the {} stage",
        var, state.stage
      )));
    }

    if let Some(expr) = state.builtins.get(&var) {
      return Ok(*expr);
    }

    match var {
      BuiltinVar::VertexIndex | BuiltinVar::InstanceIndex => target.require(Feature::VertexIndex)?,
      BuiltinVar::PointSize => target.require(Feature::PointSize)?,
      _ => (),
    }

    let ty = self.types.prim(var.prim(target));
    let expr = self.push_node(ty, NodeKind::Builtin(var));
    let state = self.stage_state_mut()?;

    if var == BuiltinVar::FragDepth && target == Target::WebGL {
      state.extensions.insert("GL_EXT_frag_depth");
    }

    state.builtins.insert(var, expr);
    log::trace!("using built-in {:?} in the {} stage", var, state.stage);

    Ok(expr)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn index_types_follow_target() {
    assert_eq!(
      BuiltinVar::VertexIndex.prim(Target::WebGPU),
      PrimitiveType::scalar(ScalarKind::U32)
    );
    assert_eq!(
      BuiltinVar::VertexIndex.prim(Target::WebGL2),
      PrimitiveType::scalar(ScalarKind::I32)
    );
  }

  #[test]
  fn member_names() {
    assert_eq!(BuiltinVar::Position.member_name(), "builtin_position");
    assert_eq!(BuiltinVar::FragCoord.member_name(), "builtin_frag_coord");
    assert_eq!(BuiltinVar::FragDepth.glsl_name(Target::WebGL), "gl_FragDepthEXT");
  }
}

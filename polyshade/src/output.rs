//! Stage outputs.

use crate::{
  ast::VarKind,
  error::{Result, ShaderError},
  expr::Expr,
  program::ProgramBuilder,
  stage::ShaderStage,
  target::{Feature, Target},
  types::{PrimitiveType, ScalarKind, TypeDesc},
};

impl ProgramBuilder {
  /// Declare an output of the current stage.
  ///
  /// Outputs are numbered in declaration order. Vertex outputs become the inputs of the fragment stage, under the
  /// same name; fragment outputs are the color attachments.
  pub fn output(&mut self, name: &str, ty: &TypeDesc) -> Result<Expr> {
    let stage = self.stage_state()?.stage;

    if stage == ShaderStage::Compute {
      return Err(ShaderError::declaration("compute shaders have no outputs"));
    }

    self.require_global_scope("outputs")?;

    let ty = self.ty(ty)?;
    let p = match self.types.primitive(ty) {
      Some(p) if !p.is_matrix() && p.scalar != ScalarKind::Bool => p,
      _ => {
        return Err(ShaderError::type_error(format!(
          "output `{}` cannot have type {}",
          name,
          self.types.display(ty)
        )))
      }
    };

    if p.scalar.is_integer() {
      self.target().require(Feature::IntegerVaryings)?;
    }

    let location = self.stage_state()?.outputs.len() as u32;

    if stage == ShaderStage::Fragment && self.target() == Target::WebGL {
      if p != PrimitiveType::vector(ScalarKind::F32, 4) {
        return Err(ShaderError::type_error(format!(
          "WebGL fragment outputs must be vec4<f32>, `{}` is {}",
          name, p
        )));
      }

      if location == 1 {
        self.stage_state_mut()?.extensions.insert("GL_EXT_draw_buffers");
      }
    }

    let (var, expr) = self.new_var(name, ty, VarKind::Output { location })?;
    self.stage_state_mut()?.outputs.push(var);
    log::trace!("{} output `{}` at location {}", stage, name, location);

    Ok(expr)
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::config::BuilderConfig;

  #[test]
  fn outputs_link_to_fragment_inputs() {
    let mut pb = ProgramBuilder::new(BuilderConfig::new(Target::WebGL2));
    let result = pb.try_build_render(
      "link",
      |pb| {
        let uv = pb.output("uv", &TypeDesc::vec2())?;
        let n = pb.output("n", &TypeDesc::vec3())?;
        pb.main(|pb| {
          let zero = pb.vec2((0., 0.))?;
          pb.assign(uv, zero)?;
          let z = pb.vec3((0., 0., 1.))?;
          pb.assign(n, z)
        })
      },
      |pb| {
        let uv = pb.get("uv")?;
        let n = pb.get("n")?;
        assert_eq!(pb.types.display(uv.ty()), "vec2<f32>");
        assert_eq!(pb.types.display(n.ty()), "vec3<f32>");

        let color = pb.output("color", &TypeDesc::vec4())?;
        pb.main(|pb| {
          let c = pb.vec4((n, 1.))?;
          pb.assign(color, c)
        })
      },
    );

    assert!(result.is_ok());
  }

  #[test]
  fn webgl_fragment_outputs() {
    let mut pb = ProgramBuilder::new(BuilderConfig::new(Target::WebGL));
    let err = pb.try_build_render(
      "gl1",
      |pb| pb.main(|_| Ok(())),
      |pb| {
        pb.output("color", &TypeDesc::vec3())?;
        pb.main(|_| Ok(()))
      },
    );

    assert!(matches!(err, Err(ShaderError::Type(_))));
  }

  #[test]
  fn compute_has_no_outputs() {
    let mut pb = ProgramBuilder::new(BuilderConfig::new(Target::WebGPU));
    let err = pb.try_build_compute("c", |pb| {
      pb.output("o", &TypeDesc::f32())?;
      pb.main(|_| Ok(()))
    });

    assert!(matches!(err, Err(ShaderError::Declaration(_))));
  }
}

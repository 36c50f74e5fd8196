//! Vertex attributes.

use crate::{
  ast::VarKind,
  error::{Result, ShaderError},
  expr::Expr,
  program::ProgramBuilder,
  stage::ShaderStage,
  target::Feature,
  types::{ScalarKind, TypeDesc},
};
use serde::Serialize;

/// Meaning of a vertex attribute; fixes its location.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexSemantic {
  Position,
  Normal,
  Diffuse,
  Tangent,
  TexCoord0,
  TexCoord1,
  TexCoord2,
  TexCoord3,
  TexCoord4,
  TexCoord5,
  TexCoord6,
  TexCoord7,
  BlendIndices,
  BlendWeights,
}

impl VertexSemantic {
  pub const fn location(self) -> u32 {
    match self {
      VertexSemantic::Position => 0,
      VertexSemantic::Normal => 1,
      VertexSemantic::Diffuse => 2,
      VertexSemantic::Tangent => 3,
      VertexSemantic::TexCoord0 => 4,
      VertexSemantic::TexCoord1 => 5,
      VertexSemantic::TexCoord2 => 6,
      VertexSemantic::TexCoord3 => 7,
      VertexSemantic::TexCoord4 => 8,
      VertexSemantic::TexCoord5 => 9,
      VertexSemantic::TexCoord6 => 10,
      VertexSemantic::TexCoord7 => 11,
      VertexSemantic::BlendIndices => 12,
      VertexSemantic::BlendWeights => 13,
    }
  }
}

/// A vertex attribute declared by a render program.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct VertexAttribute {
  pub name: String,
  pub semantic: VertexSemantic,
  pub location: u32,

  /// Shader type of the attribute, e.g. `vec3<f32>`.
  pub format: String,
}

impl ProgramBuilder {
  /// Declare a vertex attribute.
  pub fn vertex_input(&mut self, name: &str, ty: &TypeDesc, semantic: VertexSemantic) -> Result<Expr> {
    if self.stage_state()?.stage != ShaderStage::Vertex {
      return Err(ShaderError::declaration(format!(
        "vertex attribute `{}` declared outside of the vertex stage",
        name
      )));
    }

    self.require_global_scope("vertex attributes")?;

    let ty = self.ty(ty)?;
    match self.types.primitive(ty) {
      Some(p) if !p.is_matrix() && p.scalar != ScalarKind::Bool => {
        if p.scalar.is_integer() {
          self.target().require(Feature::IntegerAttributes)?;
        }
      }

      _ => {
        return Err(ShaderError::type_error(format!(
          "vertex attribute `{}` cannot have type {}",
          name,
          self.types.display(ty)
        )))
      }
    }

    let location = semantic.location();
    let taken = self.stage_state()?.inputs.iter().any(|&v| {
      matches!(self.var(v).kind, VarKind::Input { location: l, .. } if l == location)
    });

    if taken {
      return Err(ShaderError::declaration(format!(
        "semantic {:?} is already bound to another attribute",
        semantic
      )));
    }

    let (var, expr) = self.new_var(
      name,
      ty,
      VarKind::Input {
        location,
        semantic: Some(semantic),
      },
    )?;
    self.stage_state_mut()?.inputs.push(var);
    log::trace!("vertex attribute `{}` at location {}", name, location);

    Ok(expr)
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{config::BuilderConfig, target::Target};

  fn vertex(target: Target, f: impl FnOnce(&mut ProgramBuilder) -> Result<()>) -> Result<()> {
    let mut pb = ProgramBuilder::new(BuilderConfig::new(target));
    pb.try_build_render("test", f, |pb| pb.main(|_| Ok(()))).map(|_| ())
  }

  #[test]
  fn semantic_locations() {
    assert_eq!(VertexSemantic::TexCoord3.location(), 7);
    assert_eq!(VertexSemantic::BlendWeights.location(), 13);
    assert_eq!(serde_json::to_string(&VertexSemantic::TexCoord0).unwrap(), "\"tex_coord0\"");
  }

  #[test]
  fn duplicate_semantic() {
    let err = vertex(Target::WebGL2, |pb| {
      pb.vertex_input("a", &TypeDesc::vec3(), VertexSemantic::Normal)?;
      pb.vertex_input("b", &TypeDesc::vec3(), VertexSemantic::Normal)?;
      pb.main(|_| Ok(()))
    });

    assert!(matches!(err, Err(ShaderError::Declaration(_))));
  }

  #[test]
  fn attribute_types() {
    let err = vertex(Target::WebGL, |pb| {
      pb.vertex_input("ids", &TypeDesc::vec(ScalarKind::I32, 4), VertexSemantic::BlendIndices)?;
      pb.main(|_| Ok(()))
    });
    assert!(matches!(err, Err(ShaderError::Capability { .. })));

    let err = vertex(Target::WebGPU, |pb| {
      pb.vertex_input("flag", &TypeDesc::bool(), VertexSemantic::Diffuse)?;
      pb.main(|_| Ok(()))
    });
    assert!(matches!(err, Err(ShaderError::Type(_))));
  }

  #[test]
  fn fragment_cannot_declare_attributes() {
    let mut pb = ProgramBuilder::new(BuilderConfig::new(Target::WebGPU));
    let err = pb.try_build_render(
      "test",
      |pb| pb.main(|_| Ok(())),
      |pb| {
        pb.vertex_input("p", &TypeDesc::vec3(), VertexSemantic::Position)?;
        pb.main(|_| Ok(()))
      },
    );

    assert!(matches!(err, Err(ShaderError::Declaration(_))));
  }
}

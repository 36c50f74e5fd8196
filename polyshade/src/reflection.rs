//! Reflection tags and declaration metadata of expressions.

use crate::{
  ast::{NodeKind, VarKind},
  error::{Result, ShaderError},
  expr::Expr,
  input::VertexSemantic,
  program::ProgramBuilder,
  types::TextureSampleType,
};
use indexmap::IndexMap;

/// Tags of a stage, by path.
#[derive(Debug, Default)]
pub(crate) struct Reflection {
  tags: IndexMap<String, Expr>,
}

/// How the variable behind an expression was declared.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeclKind {
  /// Not a global declaration: a literal, a local, a computed value…
  None,
  Uniform,
  Storage,
  Workgroup,
  StageInput,
  StageOutput,
}

/// Declaration metadata of an expression.
#[derive(Clone, Debug, PartialEq)]
pub struct ExprInfo {
  pub decl: DeclKind,

  /// Bind group of uniforms, textures, samplers and storage buffers.
  pub group: Option<u32>,

  pub semantic: Option<VertexSemantic>,
  pub sample_type: Option<TextureSampleType>,

  /// Reflection tags pointing at the expression.
  pub tags: Vec<String>,
}

impl ProgramBuilder {
  /// Tag `expr` with `path`, replacing any expression previously tagged with it in the current stage.
  ///
  /// ```
  /// # use polyshade::{BuilderConfig, ProgramBuilder, Target, TypeDesc};
  /// # let mut pb = ProgramBuilder::new(BuilderConfig::new(Target::WebGPU));
  /// # pb.try_build_compute("doc", |pb| pb.main(|pb| {
  /// let p = pb.declare_var("world_pos", &TypeDesc::vec3())?;
  /// pb.tag(p, "world.position")?;
  /// assert_eq!(pb.tagged("world.position"), Some(p));
  /// # Ok(()) })).unwrap();
  /// ```
  pub fn tag(&mut self, expr: Expr, path: &str) -> Result<()> {
    if path.is_empty() {
      return Err(ShaderError::parameter("reflection paths cannot be empty"));
    }

    let previous = self.stage_state_mut()?.reflection.tags.insert(path.to_owned(), expr);
    if previous.is_some() {
      log::debug!("reflection tag `{}` moved to a new expression", path);
    }

    Ok(())
  }

  /// Expression tagged with `path` in the current stage.
  pub fn tagged(&self, path: &str) -> Option<Expr> {
    self.stage.as_ref()?.reflection.tags.get(path).copied()
  }

  /// Paths `expr` is tagged with in the current stage, in tagging order.
  pub fn tags_of(&self, expr: Expr) -> Vec<String> {
    self.stage.as_ref().map_or_else(Vec::new, |state| {
      state
        .reflection
        .tags
        .iter()
        .filter(|(_, e)| **e == expr)
        .map(|(path, _)| path.clone())
        .collect()
    })
  }

  pub fn expr_info(&self, expr: Expr) -> ExprInfo {
    let var = match self.node(expr.node).kind {
      NodeKind::Var(v) => Some(self.var(v)),
      _ => None,
    };

    let decl = match var.map(|v| v.kind) {
      Some(VarKind::Uniform { .. } | VarKind::Texture { .. } | VarKind::Sampler { .. }) => DeclKind::Uniform,
      Some(VarKind::Storage { .. }) => DeclKind::Storage,
      Some(VarKind::Workgroup) => DeclKind::Workgroup,
      Some(VarKind::Input { .. }) => DeclKind::StageInput,
      Some(VarKind::Output { .. }) => DeclKind::StageOutput,
      _ => DeclKind::None,
    };

    ExprInfo {
      decl,
      group: var.and_then(|v| v.kind.group()),
      semantic: var.and_then(|v| match v.kind {
        VarKind::Input { semantic, .. } => semantic,
        _ => None,
      }),
      sample_type: self.types.texture(expr.ty).map(|t| t.sample_type),
      tags: self.tags_of(expr),
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    config::BuilderConfig,
    stage::ShaderStage,
    target::Target,
    types::{TextureType, TextureViewDimension, TypeDesc},
  };

  #[test]
  fn tags_are_per_stage() {
    let mut pb = ProgramBuilder::new(BuilderConfig::new(Target::WebGPU));
    let result = pb.try_build_render(
      "tags",
      |pb| {
        let n = pb.output("normal", &TypeDesc::vec3())?;
        pb.tag(n, "surface.normal")?;
        pb.tag(n, "normal")?;
        assert_eq!(pb.tags_of(n), ["surface.normal", "normal"]);
        pb.main(|_| Ok(()))
      },
      |pb| {
        assert_eq!(pb.tagged("surface.normal"), None);
        pb.main(|_| Ok(()))
      },
    );

    assert!(result.is_ok());
  }

  #[test]
  fn declaration_info() {
    let mut pb = ProgramBuilder::new(BuilderConfig::new(Target::WebGL2));
    pb.in_test_stage(ShaderStage::Fragment, |pb| {
      let t = pb.uniform_texture("t", TextureType::new(TextureViewDimension::D2, TextureSampleType::Uint), 3)?;
      let info = pb.expr_info(t);
      assert_eq!(info.decl, DeclKind::Uniform);
      assert_eq!(info.group, Some(3));
      assert_eq!(info.sample_type, Some(TextureSampleType::Uint));

      let one = pb.lit(1.)?;
      assert_eq!(pb.expr_info(one).decl, DeclKind::None);
      Ok(())
    })
    .unwrap();
  }
}

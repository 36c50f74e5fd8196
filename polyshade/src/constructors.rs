//! Type constructors.

use crate::{
  ast::NodeKind,
  error::{Result, ShaderError},
  expr::{Expr, IntoArgs, Value},
  program::ProgramBuilder,
  target::Feature,
  types::{PrimitiveType, ScalarKind, TypeDesc, TypeHandle, TypeKind},
};

macro_rules! make_vec_ctors {
  ($($(#[$doc:meta])* $name:ident => $q:ident, $n:expr);* $(;)?) => {
    impl ProgramBuilder {
      $(
        $(#[$doc])*
        pub fn $name(&mut self, args: impl IntoArgs) -> Result<Expr> {
          self.construct(&TypeDesc::vec(ScalarKind::$q, $n), args)
        }
      )*
    }
  };
}

make_vec_ctors! {
  /// Build a `vec2<f32>` from scalars and vectors, e.g. `pb.vec2((x, 0.))`.
  vec2 => F32, 2;
  vec3 => F32, 3;
  /// Build a `vec4<f32>`, e.g. `pb.vec4((position, 1.))` with `position` a `vec3<f32>`.
  vec4 => F32, 4;
  ivec2 => I32, 2;
  ivec3 => I32, 3;
  ivec4 => I32, 4;
  uvec2 => U32, 2;
  uvec3 => U32, 3;
  uvec4 => U32, 4;
  bvec2 => Bool, 2;
  bvec3 => Bool, 3;
  bvec4 => Bool, 4;
}

impl ProgramBuilder {
  /// Build a square `f32` matrix of dimension 2 from columns or scalars.
  pub fn mat2(&mut self, args: impl IntoArgs) -> Result<Expr> {
    self.construct(&TypeDesc::mat(2, 2), args)
  }

  pub fn mat3(&mut self, args: impl IntoArgs) -> Result<Expr> {
    self.construct(&TypeDesc::mat(3, 3), args)
  }

  pub fn mat4(&mut self, args: impl IntoArgs) -> Result<Expr> {
    self.construct(&TypeDesc::mat(4, 4), args)
  }

  /// Build a value of type `ty`.
  ///
  /// - Scalars and vectors take either nothing (zero), a single scalar (splat), a single value of the same shape
  ///   (conversion), or scalars and vectors whose components add up to the size of the vector.
  /// - Matrices take nothing, one column vector per column, or one scalar per component (column-major).
  /// - Arrays and structs take one value per element or member.
  pub fn construct(&mut self, ty: &TypeDesc, args: impl IntoArgs) -> Result<Expr> {
    let args = args.into_args();
    let ty = self.ty(ty)?;

    let nodes = match self.types.kind(ty).clone() {
      TypeKind::Primitive(p) if p.is_matrix() => self.matrix_args(p, args)?,
      TypeKind::Primitive(p) => self.vector_args(p, args)?,

      TypeKind::Array { element, len } if len > 0 => {
        self.target().require(Feature::ArrayConstructor)?;
        let elements = vec![element; len as usize];
        self.member_args(ty, &elements, args)?
      }

      TypeKind::Struct(s) => {
        let members: Vec<TypeHandle> = s.members.iter().map(|m| m.ty).collect();
        self.member_args(ty, &members, args)?
      }

      _ => {
        return Err(ShaderError::parameter(format!(
          "{} has no constructor",
          self.types.display(ty)
        )))
      }
    };

    Ok(self.push_node(ty, NodeKind::Construct { args: nodes }))
  }

  fn ctor_error(&self, p: PrimitiveType, args: &[Value]) -> ShaderError {
    ShaderError::parameter(format!(
      "cannot construct {} from ({})",
      p,
      self.describe_values(args)
    ))
  }

  /// Lower a literal constructor argument as a `scalar`.
  fn ctor_arg(&mut self, value: Value, scalar: ScalarKind, p: PrimitiveType, all: &[Value]) -> Result<Expr> {
    if value.is_literal() && !value.fits(scalar) {
      return Err(self.ctor_error(p, all));
    }

    self.lower(value, Some(scalar))
  }

  fn vector_args(&mut self, p: PrimitiveType, args: Vec<Value>) -> Result<Vec<crate::ast::NodeId>> {
    if args.is_empty() {
      return Ok(Vec::new());
    }

    if let [Value::Expr(e)] = args[..] {
      let accepted = match self.types.primitive(e.ty) {
        // conversion between component types
        Some(q) if !q.is_matrix() && q.rows == p.rows => true,
        // splat
        Some(q) if q.is_scalar() => q.scalar == p.scalar,
        _ => false,
      };

      if !accepted {
        return Err(self.ctor_error(p, &args));
      }

      return Ok(vec![e.node]);
    }

    if let [literal] = args[..] {
      let e = self.ctor_arg(literal, p.scalar, p, &args)?;
      return Ok(vec![e.node]);
    }

    let mut nodes = Vec::with_capacity(args.len());
    let mut components = 0;

    for &arg in &args {
      let e = self.ctor_arg(arg, p.scalar, p, &args)?;

      match self.types.primitive(e.ty) {
        Some(q) if !q.is_matrix() && q.scalar == p.scalar => components += q.components(),
        _ => return Err(self.ctor_error(p, &args)),
      }

      nodes.push(e.node);
    }

    if components != p.components() {
      return Err(self.ctor_error(p, &args));
    }

    Ok(nodes)
  }

  fn matrix_args(&mut self, p: PrimitiveType, args: Vec<Value>) -> Result<Vec<crate::ast::NodeId>> {
    let column = PrimitiveType::vector(p.scalar, p.rows);
    let mut nodes = Vec::with_capacity(args.len());

    if args.len() == p.cols as usize {
      for &arg in &args {
        let e = self.ctor_arg(arg, p.scalar, p, &args)?;

        if self.types.primitive(e.ty) != Some(column) {
          return Err(self.ctor_error(p, &args));
        }

        nodes.push(e.node);
      }
    } else if args.len() == p.components() as usize {
      for &arg in &args {
        let e = self.ctor_arg(arg, p.scalar, p, &args)?;

        if self.types.primitive(e.ty) != Some(PrimitiveType::scalar(p.scalar)) {
          return Err(self.ctor_error(p, &args));
        }

        nodes.push(e.node);
      }
    } else if !args.is_empty() {
      return Err(self.ctor_error(p, &args));
    }

    Ok(nodes)
  }

  fn member_args(
    &mut self,
    ty: TypeHandle,
    members: &[TypeHandle],
    args: Vec<Value>,
  ) -> Result<Vec<crate::ast::NodeId>> {
    if members.len() != args.len() {
      return Err(ShaderError::parameter(format!(
        "{} takes {} value(s), got {}",
        self.types.display(ty),
        members.len(),
        args.len()
      )));
    }

    let what = self.types.display(ty);
    members
      .iter()
      .zip(args)
      .map(|(&m, arg)| {
        if !self.value_matches(&arg, m) {
          return Err(ShaderError::parameter(format!(
            "{} expects {}, got {}",
            what,
            self.types.display(m),
            self.describe_value(&arg)
          )));
        }

        self.coerce(arg, m, &what).map(|e| e.node)
      })
      .collect()
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{config::BuilderConfig, target::Target, types::LayoutPolicy};

  fn in_main(target: Target, f: impl FnOnce(&mut ProgramBuilder) -> Result<()>) -> Result<()> {
    ProgramBuilder::new(BuilderConfig::new(target)).in_test_main(f)
  }

  #[test]
  fn vector_component_counts() {
    in_main(Target::WebGPU, |pb| {
      let v3 = pb.vec3((1., 2., 3.))?;
      assert!(pb.vec4((v3, 1.)).is_ok());
      assert!(pb.vec4((1.,)).is_ok());
      assert!(pb.vec4(()).is_ok());
      assert!(matches!(pb.vec4((v3,)), Err(ShaderError::Parameter(_))));
      assert!(matches!(pb.vec4((v3, 1., 2.)), Err(ShaderError::Parameter(_))));
      assert!(matches!(pb.ivec2((1.5, 2)), Err(ShaderError::Parameter(_))));
      Ok(())
    })
    .unwrap();
  }

  #[test]
  fn conversions() {
    in_main(Target::WebGPU, |pb| {
      let i = pb.ivec3((1, 2, 3))?;
      let f = pb.vec3((i,))?;
      assert_eq!(pb.types.display(f.ty()), "vec3<f32>");
      Ok(())
    })
    .unwrap();
  }

  #[test]
  fn matrices() {
    in_main(Target::WebGPU, |pb| {
      let c = pb.vec2((1., 0.))?;
      assert!(pb.mat2((c, c)).is_ok());
      assert!(pb.mat2((1., 0., 0., 1.)).is_ok());
      assert!(pb.mat2((c,)).is_err());
      Ok(())
    })
    .unwrap();
  }

  #[test]
  fn structs_and_arrays() {
    in_main(Target::WebGL2, |pb| {
      let light = TypeDesc::structure(
        Some("Light"),
        LayoutPolicy::Packed,
        [("color", TypeDesc::vec3()), ("power", TypeDesc::f32())].map(|(n, t)| (n.to_owned(), t)),
      );
      let color = pb.vec3((1., 1., 1.))?;
      assert!(pb.construct(&light, (color, 2.)).is_ok());
      assert!(matches!(pb.construct(&light, (2., color)), Err(ShaderError::Parameter(_))));
      assert!(pb.construct(&TypeDesc::array(TypeDesc::f32(), 2), (1., 2.)).is_ok());
      Ok(())
    })
    .unwrap();

    let err = in_main(Target::WebGL, |pb| {
      pb.construct(&TypeDesc::array(TypeDesc::f32(), 2), (1., 2.))?;
      Ok(())
    });
    assert!(matches!(err, Err(ShaderError::Capability { .. })));
  }
}

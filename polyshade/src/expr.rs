//! Expressions.

use crate::{
  ast::{Access, BinaryOp, Literal, NodeKind, UnaryOp, VarKind},
  error::{Result, ShaderError},
  program::ProgramBuilder,
  swizzle::Swizzle,
  target::Feature,
  types::{AddressSpace, PrimitiveType, ScalarKind, TypeDesc, TypeHandle, TypeKind},
};

/// Expression representation.
///
/// An expression is anything that carries a typed value: a literal, a variable, the sum of two expressions, a function
/// call, a struct member, a swizzle… Expressions are cheap handles into the program being built by a
/// [`ProgramBuilder`]; they are only meaningful for the builder that created them, until it is reset.
///
/// Accessing the same member, swizzle or constant index of the same expression twice yields the very same expression.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Expr {
  pub(crate) node: crate::ast::NodeId,
  pub(crate) ty: TypeHandle,
}

impl Expr {
  /// Type of the expression.
  pub fn ty(&self) -> TypeHandle {
    self.ty
  }
}

/// An operand: either an expression or a host literal.
///
/// Literals are typed by context. Next to a typed operand, they take its component type; on their own, booleans are
/// `bool`, integers are `i32` (or `u32` when they don't fit) and floats are `f32`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
  Bool(bool),
  Int(i64),
  Float(f64),
  Expr(Expr),
}

impl Value {
  /// Whether the value can stand for a scalar of type `scalar`.
  pub(crate) fn fits(&self, scalar: ScalarKind) -> bool {
    match (*self, scalar) {
      (Value::Bool(_), ScalarKind::Bool) => true,
      (Value::Int(i), ScalarKind::I32) => i32::try_from(i).is_ok(),
      (Value::Int(i), ScalarKind::U32) => u32::try_from(i).is_ok(),
      (Value::Int(i), ScalarKind::F32) => exact_integer(i, 24, u64::MAX),
      (Value::Int(i), ScalarKind::F16) => exact_integer(i, 11, 65504),
      (Value::Float(f), ScalarKind::F32) => f.is_finite() && f.abs() <= f32::MAX as f64,
      (Value::Float(f), ScalarKind::F16) => f.is_finite() && f.abs() <= 65504.,
      _ => false,
    }
  }

  pub(crate) fn is_literal(&self) -> bool {
    !matches!(self, Value::Expr(_))
  }
}

/// Whether `i` is exactly representable by a float with a `mantissa` bit significand and a magnitude up to `max`.
fn exact_integer(i: i64, mantissa: u32, max: u64) -> bool {
  let magnitude = i.unsigned_abs();
  magnitude == 0 || (magnitude <= max && magnitude >> magnitude.trailing_zeros() < 1 << mantissa)
}

macro_rules! impl_From_Value {
  ($t:ty, $q:ident, $as:ty) => {
    impl From<$t> for Value {
      fn from(a: $t) -> Self {
        Value::$q(a as $as)
      }
    }
  };
}

impl_From_Value!(i32, Int, i64);
impl_From_Value!(u32, Int, i64);
impl_From_Value!(i64, Int, i64);
impl_From_Value!(f32, Float, f64);
impl_From_Value!(f64, Float, f64);

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Value::Bool(b)
  }
}

impl From<Expr> for Value {
  fn from(e: Expr) -> Self {
    Value::Expr(e)
  }
}

impl From<&Expr> for Value {
  fn from(e: &Expr) -> Self {
    Value::Expr(*e)
  }
}

/// Argument lists.
///
/// Implemented for `()`, tuples of up to eight operands, arrays of operands and vectors of [`Value`].
pub trait IntoArgs {
  fn into_args(self) -> Vec<Value>;
}

impl IntoArgs for () {
  fn into_args(self) -> Vec<Value> {
    Vec::new()
  }
}

impl IntoArgs for Vec<Value> {
  fn into_args(self) -> Vec<Value> {
    self
  }
}

impl IntoArgs for &[Value] {
  fn into_args(self) -> Vec<Value> {
    self.to_vec()
  }
}

impl<T, const N: usize> IntoArgs for [T; N]
where
  T: Into<Value>,
{
  fn into_args(self) -> Vec<Value> {
    self.into_iter().map(Into::into).collect()
  }
}

macro_rules! impl_IntoArgs_tuple {
  ($($t:ident),+) => {
    impl<$($t),+> IntoArgs for ($($t,)+)
    where
      $($t: Into<Value>),+
    {
      #[allow(non_snake_case)]
      fn into_args(self) -> Vec<Value> {
        let ($($t,)+) = self;
        vec![$($t.into()),+]
      }
    }
  };
}

impl_IntoArgs_tuple!(A);
impl_IntoArgs_tuple!(A, B);
impl_IntoArgs_tuple!(A, B, C);
impl_IntoArgs_tuple!(A, B, C, D);
impl_IntoArgs_tuple!(A, B, C, D, E);
impl_IntoArgs_tuple!(A, B, C, D, E, F);
impl_IntoArgs_tuple!(A, B, C, D, E, F, G);
impl_IntoArgs_tuple!(A, B, C, D, E, F, G, H);

macro_rules! impl_binop {
  ($($(#[$doc:meta])* $name:ident => $op:ident),* $(,)?) => {
    impl ProgramBuilder {
      $(
        $(#[$doc])*
        pub fn $name(&mut self, lhs: impl Into<Value>, rhs: impl Into<Value>) -> Result<Expr> {
          self.binary(BinaryOp::$op, lhs, rhs)
        }
      )*
    }
  };
}

impl_binop! {
  add => Add,
  sub => Sub,
  /// Component-wise product, or linear algebra product when a matrix is involved.
  mul => Mul,
  div => Div,
  /// Remainder. On WebGL, integer remainders are emulated with floating point arithmetic.
  rem => Rem,
  /// Logical and, on `bool` scalars.
  and => And,
  /// Logical or, on `bool` scalars.
  or => Or,
  bit_and => BitAnd,
  bit_or => BitOr,
  bit_xor => BitXor,
  shl => Shl,
  shr => Shr,
  /// Equality; component-wise on vectors, yielding a vector of `bool`.
  eq => Eq,
  ne => Ne,
  lt => Lt,
  le => Le,
  gt => Gt,
  ge => Ge,
}

impl ProgramBuilder {
  /// Turn a value into an expression, typing literals on their own.
  pub fn lit(&mut self, value: impl Into<Value>) -> Result<Expr> {
    self.lower(value.into(), None)
  }

  /// Turn a value into an expression, typing literals as `hint` if given.
  pub(crate) fn lower(&mut self, value: Value, hint: Option<ScalarKind>) -> Result<Expr> {
    let out_of_range =
      |i: i64, kind: &str| ShaderError::type_error(format!("integer literal {} does not fit in {}", i, kind));

    let lit = match (value, hint) {
      (Value::Expr(e), _) => return Ok(e),

      (Value::Bool(b), None | Some(ScalarKind::Bool)) => Literal::Bool(b),

      (Value::Int(i), None) => match (i32::try_from(i), u32::try_from(i)) {
        (Ok(v), _) => Literal::I32(v),
        (_, Ok(v)) => Literal::U32(v),
        _ => return Err(out_of_range(i, "i32 or u32")),
      },

      (Value::Int(i), Some(ScalarKind::I32)) => Literal::I32(i32::try_from(i).map_err(|_| out_of_range(i, "i32"))?),
      (Value::Int(i), Some(ScalarKind::U32)) => Literal::U32(u32::try_from(i).map_err(|_| out_of_range(i, "u32"))?),
      (v @ Value::Int(i), Some(ScalarKind::F32)) if v.fits(ScalarKind::F32) => Literal::F32(i as f32),
      (v @ Value::Int(i), Some(ScalarKind::F16)) if v.fits(ScalarKind::F16) => Literal::F16(i as f32),
      (Value::Int(i), Some(kind @ (ScalarKind::F32 | ScalarKind::F16))) => {
        return Err(ShaderError::type_error(format!(
          "integer literal {} is not exactly representable as {}",
          i,
          kind.name()
        )));
      }

      (v @ Value::Float(f), None | Some(ScalarKind::F32)) if v.fits(ScalarKind::F32) => Literal::F32(f as f32),
      (v @ Value::Float(f), Some(ScalarKind::F16)) if v.fits(ScalarKind::F16) => Literal::F16(f as f32),

      (Value::Float(f), None | Some(ScalarKind::F32 | ScalarKind::F16)) => {
        return Err(ShaderError::type_error(format!(
          "float literal {} is not representable",
          f
        )));
      }

      (v, Some(kind)) => {
        return Err(ShaderError::type_error(format!(
          "{} cannot be used as {}",
          self.describe_value(&v),
          kind.name()
        )));
      }
    };

    self.literal(lit)
  }

  pub(crate) fn literal(&mut self, lit: Literal) -> Result<Expr> {
    let scalar = match lit {
      Literal::Bool(_) => ScalarKind::Bool,
      Literal::I32(_) => ScalarKind::I32,
      Literal::U32(_) => {
        self.target().require(Feature::UnsignedInt)?;
        ScalarKind::U32
      }
      Literal::F32(_) => ScalarKind::F32,
      Literal::F16(_) => {
        self.target().require(Feature::Float16)?;
        ScalarKind::F16
      }
    };

    let ty = self.types.scalar(scalar);
    Ok(self.push_node(ty, NodeKind::Literal(lit)))
  }

  /// Lower `value` typing literals as `hint` if they fit, on their own otherwise.
  pub(crate) fn lower_hinted(&mut self, value: Value, hint: Option<ScalarKind>) -> Result<Expr> {
    match hint {
      Some(kind) if value.fits(kind) => self.lower(value, Some(kind)),
      _ => self.lower(value, None),
    }
  }

  /// Lower `value` where an operand of type `ty` is expected, failing if the types differ.
  pub(crate) fn coerce(&mut self, value: Value, ty: TypeHandle, what: &str) -> Result<Expr> {
    let hint = self.scalar_hint(ty);
    let expr = self.lower_hinted(value, hint)?;

    if expr.ty != ty {
      return Err(ShaderError::type_error(format!(
        "{} expects {}, got {}",
        what,
        self.types.display(ty),
        self.types.display(expr.ty)
      )));
    }

    Ok(expr)
  }

  /// Whether `value` is acceptable where an operand of type `ty` is expected.
  pub(crate) fn value_matches(&self, value: &Value, ty: TypeHandle) -> bool {
    match value {
      Value::Expr(e) => e.ty == ty,
      literal => self
        .types
        .primitive(ty)
        .map_or(false, |p| p.is_scalar() && literal.fits(p.scalar) && self.scalar_supported(p.scalar)),
    }
  }

  fn scalar_supported(&self, scalar: ScalarKind) -> bool {
    match scalar {
      ScalarKind::U32 => self.target().supports(Feature::UnsignedInt),
      ScalarKind::F16 => self.target().supports(Feature::Float16),
      _ => true,
    }
  }

  /// Component type of a scalar or vector type.
  pub(crate) fn scalar_hint(&self, ty: TypeHandle) -> Option<ScalarKind> {
    self.types.primitive(ty).map(|p| p.scalar)
  }

  pub(crate) fn describe_value(&self, value: &Value) -> String {
    match value {
      Value::Bool(_) => "bool literal".to_owned(),
      Value::Int(i) => format!("integer literal {}", i),
      Value::Float(f) => format!("float literal {}", f),
      Value::Expr(e) => self.types.display(e.ty),
    }
  }

  pub(crate) fn describe_values(&self, values: &[Value]) -> String {
    values
      .iter()
      .map(|v| self.describe_value(v))
      .collect::<Vec<_>>()
      .join(", ")
  }

  /// Lower two operands, typing a literal after the other operand.
  pub(crate) fn lower_pair(&mut self, lhs: Value, rhs: Value) -> Result<(Expr, Expr)> {
    match (lhs, rhs) {
      (Value::Expr(lhs), rhs) => {
        let rhs = self.lower_hinted(rhs, self.scalar_hint(lhs.ty))?;
        Ok((lhs, rhs))
      }

      (lhs, Value::Expr(rhs)) => {
        let lhs = self.lower_hinted(lhs, self.scalar_hint(rhs.ty))?;
        Ok((lhs, rhs))
      }

      (lhs, rhs) => {
        let hint = if matches!(lhs, Value::Float(_)) || matches!(rhs, Value::Float(_)) {
          Some(ScalarKind::F32)
        } else {
          None
        };

        let lhs = self.lower_hinted(lhs, hint)?;
        let rhs = self.lower_hinted(rhs, self.scalar_hint(lhs.ty))?;
        Ok((lhs, rhs))
      }
    }
  }

  fn operand(&self, e: Expr, op: &str) -> Result<PrimitiveType> {
    self.types.primitive(e.ty).ok_or_else(|| {
      ShaderError::type_error(format!(
        "`{}` expects scalar, vector or matrix operands, got {}",
        op,
        self.types.display(e.ty)
      ))
    })
  }

  /// Apply a binary operator.
  pub fn binary(&mut self, op: BinaryOp, lhs: impl Into<Value>, rhs: impl Into<Value>) -> Result<Expr> {
    if op.is_bitwise() {
      self.target().require(Feature::BitwiseOps)?;
    }

    let (lhs, rhs) = self.lower_pair(lhs.into(), rhs.into())?;
    let ty = self.binary_type(op, lhs, rhs)?;

    Ok(self.push_node(
      ty,
      NodeKind::Binary {
        op,
        lhs: lhs.node,
        rhs: rhs.node,
      },
    ))
  }

  pub(crate) fn binary_type(&mut self, op: BinaryOp, lhs: Expr, rhs: Expr) -> Result<TypeHandle> {
    let l = self.operand(lhs, op.symbol())?;
    let r = self.operand(rhs, op.symbol())?;
    let mismatch = || {
      ShaderError::type_error(format!(
        "cannot apply `{}` to {} and {}",
        op.symbol(),
        l,
        r
      ))
    };

    let result = match op {
      BinaryOp::And | BinaryOp::Or => {
        if l != r || !l.is_scalar() || l.scalar != ScalarKind::Bool {
          return Err(mismatch());
        }

        l
      }

      BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
        let ordering = !matches!(op, BinaryOp::Eq | BinaryOp::Ne);

        if l != r || l.is_matrix() || (ordering && l.scalar == ScalarKind::Bool) {
          return Err(mismatch());
        }

        l.with_scalar(ScalarKind::Bool)
      }

      BinaryOp::Shl | BinaryOp::Shr => {
        if !l.scalar.is_integer() || !r.scalar.is_integer() || l.rows != r.rows || l.is_matrix() || r.is_matrix() {
          return Err(mismatch());
        }

        l
      }

      _ => {
        if l.scalar != r.scalar || l.scalar == ScalarKind::Bool {
          return Err(mismatch());
        }

        if op.is_bitwise() && !l.scalar.is_integer() {
          return Err(mismatch());
        }

        match (l.is_matrix(), r.is_matrix()) {
          (true, true) if op == BinaryOp::Mul => {
            if l.cols != r.rows {
              return Err(mismatch());
            }

            PrimitiveType::matrix(l.scalar, r.cols, l.rows)
          }

          (true, false) if op == BinaryOp::Mul && r.is_vector() => {
            if l.cols != r.rows {
              return Err(mismatch());
            }

            PrimitiveType::vector(l.scalar, l.rows)
          }

          (false, true) if op == BinaryOp::Mul && l.is_vector() => {
            if l.rows != r.rows {
              return Err(mismatch());
            }

            PrimitiveType::vector(l.scalar, r.cols)
          }

          (true, false) | (false, true) if op == BinaryOp::Mul && (l.is_scalar() || r.is_scalar()) => {
            if l.is_matrix() {
              l
            } else {
              r
            }
          }

          (true, _) | (_, true) if !matches!(op, BinaryOp::Add | BinaryOp::Sub) || l != r => {
            return Err(mismatch());
          }

          _ if l == r => l,
          _ if l.is_scalar() && r.is_vector() => r,
          _ if l.is_vector() && r.is_scalar() => l,
          _ => return Err(mismatch()),
        }
      }
    };

    Ok(self.types.prim(result))
  }

  /// Apply a unary operator.
  pub fn unary(&mut self, op: UnaryOp, operand: impl Into<Value>) -> Result<Expr> {
    if op == UnaryOp::BitNot {
      self.target().require(Feature::BitwiseOps)?;
    }

    let hint = match op {
      UnaryOp::Not => Some(ScalarKind::Bool),
      _ => None,
    };
    let e = self.lower(operand.into(), hint)?;
    let p = self.operand(e, "unary operator")?;

    let valid = match op {
      UnaryOp::Neg => !p.is_matrix() && matches!(p.scalar, ScalarKind::I32 | ScalarKind::F32 | ScalarKind::F16),
      UnaryOp::Not => !p.is_matrix() && p.scalar == ScalarKind::Bool,
      UnaryOp::BitNot => !p.is_matrix() && p.scalar.is_integer(),
    };

    if !valid {
      return Err(ShaderError::type_error(format!(
        "cannot apply {:?} to {}",
        op, p
      )));
    }

    Ok(self.push_node(e.ty, NodeKind::Unary { op, operand: e.node }))
  }

  pub fn neg(&mut self, operand: impl Into<Value>) -> Result<Expr> {
    self.unary(UnaryOp::Neg, operand)
  }

  pub fn not(&mut self, operand: impl Into<Value>) -> Result<Expr> {
    self.unary(UnaryOp::Not, operand)
  }

  pub fn bit_not(&mut self, operand: impl Into<Value>) -> Result<Expr> {
    self.unary(UnaryOp::BitNot, operand)
  }

  /// Convert a scalar or vector to another component type, keeping its shape.
  pub fn cast(&mut self, value: impl Into<Value>, scalar: ScalarKind) -> Result<Expr> {
    let e = self.lower(value.into(), None)?;
    let p = self.operand(e, "cast")?;

    if p.is_matrix() {
      return Err(ShaderError::type_error(format!("cannot cast {} to {}", p, scalar.name())));
    }

    let ty = self.ty(&TypeDesc::Primitive(p.with_scalar(scalar)))?;
    Ok(self.push_node(ty, NodeKind::Construct { args: vec![e.node] }))
  }

  fn access(&mut self, base: Expr, access: Access, ty: TypeHandle, kind: NodeKind) -> Expr {
    if let Some(e) = self.access_cache.get(&(base.node, access)) {
      return *e;
    }

    let e = self.push_node(ty, kind);
    self.access_cache.insert((base.node, access), e);
    e
  }

  /// Access the member `name` of a struct expression.
  pub fn member(&mut self, base: Expr, name: &str) -> Result<Expr> {
    let s = self.types.struct_type(base.ty).ok_or_else(|| {
      ShaderError::type_error(format!(
        "cannot access member `{}` of non-struct type {}",
        name,
        self.types.display(base.ty)
      ))
    })?;

    let (index, ty) = s
      .members
      .iter()
      .enumerate()
      .find(|(_, m)| m.name == name)
      .map(|(i, m)| (i as u32, m.ty))
      .ok_or_else(|| ShaderError::type_error(format!("struct `{}` has no member `{}`", s.name, name)))?;

    Ok(self.access(
      base,
      Access::Member(index),
      ty,
      NodeKind::Member { base: base.node, index },
    ))
  }

  /// Swizzle a vector expression, e.g. `"xy"` or `"bgr"`.
  pub fn swizzle(&mut self, base: Expr, mask: &str) -> Result<Expr> {
    let p = match self.types.primitive(base.ty) {
      Some(p) if p.is_vector() => p,
      _ => {
        return Err(ShaderError::type_error(format!(
          "cannot swizzle non-vector type {}",
          self.types.display(base.ty)
        )))
      }
    };

    let swizzle = Swizzle::parse(mask, p.rows)?;
    let ty = self.types.prim(PrimitiveType::vector(p.scalar, swizzle.len()));

    Ok(self.access(
      base,
      Access::Swizzle(swizzle),
      ty,
      NodeKind::Swizzle {
        base: base.node,
        swizzle,
      },
    ))
  }

  /// Index an array, a matrix (yielding a column) or a vector (yielding a component).
  ///
  /// Integer literals are checked against the bounds of sized arrays, matrices and vectors; dynamic indices must be
  /// `i32` or `u32` scalars.
  pub fn at(&mut self, base: Expr, index: impl Into<Value>) -> Result<Expr> {
    let (elem, bound) = match self.types.kind(base.ty).clone() {
      TypeKind::Array { element, len } => (element, (len > 0).then_some(len)),
      TypeKind::Primitive(p) if !p.is_scalar() => {
        let bound = if p.is_matrix() { p.cols } else { p.rows };
        let elem = p.element();
        (self.types.prim(elem), Some(bound as u32))
      }
      _ => {
        return Err(ShaderError::type_error(format!(
          "cannot index into {}",
          self.types.display(base.ty)
        )))
      }
    };

    match index.into() {
      Value::Int(i) => {
        let index = u32::try_from(i)
          .ok()
          .filter(|i| bound.map_or(true, |b| *i < b))
          .ok_or_else(|| {
            ShaderError::type_error(format!(
              "index {} is out of bounds for {}",
              i,
              self.types.display(base.ty)
            ))
          })?;

        if let Some(e) = self.access_cache.get(&(base.node, Access::Index(index))) {
          return Ok(*e);
        }

        let lit = match i32::try_from(index) {
          Ok(i) => Literal::I32(i),
          Err(_) => Literal::U32(index),
        };
        let index_node = self.literal(lit)?.node;

        Ok(self.access(
          base,
          Access::Index(index),
          elem,
          NodeKind::Index {
            base: base.node,
            index: index_node,
          },
        ))
      }

      Value::Expr(index) => {
        match self.types.primitive(index.ty) {
          Some(p) if p.is_scalar() && p.scalar.is_integer() => (),
          _ => {
            return Err(ShaderError::type_error(format!(
              "indices must be i32 or u32 scalars, got {}",
              self.types.display(index.ty)
            )))
          }
        }

        Ok(self.push_node(
          elem,
          NodeKind::Index {
            base: base.node,
            index: index.node,
          },
        ))
      }

      other => Err(ShaderError::type_error(format!(
        "indices must be integers, got {}",
        self.describe_value(&other)
      ))),
    }
  }

  /// Take the address of a variable, or of a part of one.
  pub fn address_of(&mut self, place: Expr) -> Result<Expr> {
    self.target().require(Feature::Pointer)?;

    let var = self.root_var(place.node).ok_or_else(|| {
      ShaderError::type_error("only variables, or members and elements of variables, have an address")
    })?;

    let space = match self.var(var).kind {
      VarKind::Local => AddressSpace::Function,
      VarKind::Workgroup => AddressSpace::Workgroup,
      VarKind::Storage { read_only: false, .. } => AddressSpace::Storage,
      kind => {
        return Err(ShaderError::type_error(format!(
          "cannot take the address of `{}` ({:?})",
          self.var(var).name,
          kind
        )))
      }
    };

    let ty = self.types.pointer(place.ty, space)?;
    Ok(self.push_node(ty, NodeKind::AddressOf(place.node)))
  }

  /// Read or write through a pointer.
  pub fn deref(&mut self, pointer: Expr) -> Result<Expr> {
    let pointee = match self.types.kind(pointer.ty) {
      TypeKind::Pointer { pointee, .. } => *pointee,
      _ => {
        return Err(ShaderError::type_error(format!(
          "cannot dereference non-pointer type {}",
          self.types.display(pointer.ty)
        )))
      }
    };

    Ok(self.push_node(pointee, NodeKind::Deref(pointer.node)))
  }
}

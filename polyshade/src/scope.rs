//! Lexical scopes, variables and control flow.

use crate::{
  ast::{Block, NodeId, NodeKind, Stmt, VarId, VarKind, Variable},
  builtin::BuiltinVar,
  error::{Result, ShaderError},
  expr::{Expr, Value},
  program::ProgramBuilder,
  stage::ShaderStage,
  target::Target,
  types::{check_identifier, ScalarKind, TypeDesc, TypeHandle, TypeKind},
};
use std::collections::HashMap;

/// Kind of a lexical scope.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ScopeKind {
  Global,

  Function {
    name: String,
    main: bool,

    /// Fixed by the first `return` met, if any.
    return_ty: Option<TypeHandle>,
  },

  If,
  ElseIf,
  Else,
  For,
  While,
  DoWhile,
  Block,
}

impl ScopeKind {
  fn is_loop(&self) -> bool {
    matches!(self, ScopeKind::For | ScopeKind::While | ScopeKind::DoWhile)
  }
}

/// A scope: its symbols and the statements emitted in it.
#[derive(Debug)]
pub(crate) struct ScopeFrame {
  pub kind: ScopeKind,
  pub symbols: HashMap<String, Expr>,
  pub body: Block,
}

impl ScopeFrame {
  pub(crate) fn new(kind: ScopeKind) -> Self {
    ScopeFrame {
      kind,
      symbols: HashMap::new(),
      body: Vec::new(),
    }
  }
}

/// Shape of an assignment target.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum LValue {
  Variable,
  Member,
  Component,
  Column,
  Swizzle,
  Pointee,
}

/// Chain of `else if` / `else` branches following an `if`.
///
/// Returned by [`ProgramBuilder::if_`]; dropping it simply ends the conditional.
pub struct IfChain<'a> {
  builder: &'a mut ProgramBuilder,
}

impl<'a> IfChain<'a> {
  /// Add an `else if` branch.
  pub fn else_if<F>(self, cond: impl Into<Value>, body: F) -> Result<Self>
  where
    F: FnOnce(&mut ProgramBuilder) -> Result<()>,
  {
    let cond = self.builder.condition(cond.into())?;
    let block = self.builder.with_scope(ScopeKind::ElseIf, body)?;

    match self.builder.last_stmt_mut()? {
      Some(Stmt::If {
        branches,
        otherwise: None,
      }) => branches.push((cond, block)),
      _ => return Err(ShaderError::internal("`else if` does not follow an `if`")),
    }

    Ok(self)
  }

  /// Add the final `else` branch.
  pub fn else_<F>(self, body: F) -> Result<()>
  where
    F: FnOnce(&mut ProgramBuilder) -> Result<()>,
  {
    let block = self.builder.with_scope(ScopeKind::Else, body)?;

    match self.builder.last_stmt_mut()? {
      Some(Stmt::If { otherwise, .. }) if otherwise.is_none() => *otherwise = Some(block),
      _ => return Err(ShaderError::internal("`else` does not follow an `if`")),
    }

    Ok(())
  }
}

impl ProgramBuilder {
  pub(crate) fn scopes(&self) -> Result<&[ScopeFrame]> {
    Ok(&self.stage_state()?.scopes)
  }

  fn current_frame_mut(&mut self) -> Result<&mut ScopeFrame> {
    self
      .stage_state_mut()?
      .scopes
      .last_mut()
      .ok_or_else(|| ShaderError::internal("empty scope stack"))
  }

  pub(crate) fn in_global_scope(&self) -> Result<bool> {
    Ok(self.scopes()?.len() == 1)
  }

  pub(crate) fn require_global_scope(&self, what: &str) -> Result<()> {
    if self.in_global_scope()? {
      Ok(())
    } else {
      Err(ShaderError::declaration(format!("{} must be declared at global scope", what)))
    }
  }

  fn require_function_scope(&self, what: &str) -> Result<()> {
    if self.in_global_scope()? {
      Err(ShaderError::declaration(format!("{} must appear inside a function", what)))
    } else {
      Ok(())
    }
  }

  fn last_stmt_mut(&mut self) -> Result<Option<&mut Stmt>> {
    Ok(self.current_frame_mut()?.body.last_mut())
  }

  /// Bind `name` to `expr` in the innermost scope.
  pub(crate) fn declare_symbol(&mut self, name: &str, expr: Expr) -> Result<()> {
    let frame = self.current_frame_mut()?;

    if frame.symbols.contains_key(name) {
      return Err(ShaderError::declaration(format!(
        "`{}` is already declared in this scope",
        name
      )));
    }

    frame.symbols.insert(name.to_owned(), expr);
    Ok(())
  }

  /// Create a variable and bind its name in the innermost scope.
  pub(crate) fn new_var(&mut self, name: &str, ty: TypeHandle, kind: VarKind) -> Result<(VarId, Expr)> {
    check_identifier(name)?;

    let stage = self.stage_state()?.stage;
    let var = self.push_var(Variable {
      name: name.to_owned(),
      ty,
      kind,
      stage,
      init: None,
    });
    let expr = self.push_node(ty, NodeKind::Var(var));
    self.declare_symbol(name, expr)?;

    Ok((var, expr))
  }

  /// Append a statement to the innermost scope.
  pub(crate) fn emit(&mut self, stmt: Stmt) -> Result<()> {
    self.require_function_scope("statements")?;
    self.current_frame_mut()?.body.push(stmt);
    Ok(())
  }

  /// Run `body` in a new scope of kind `kind`, returning the statements it emitted.
  pub(crate) fn with_scope<F>(&mut self, kind: ScopeKind, body: F) -> Result<Block>
  where
    F: FnOnce(&mut Self) -> Result<()>,
  {
    self.stage_state_mut()?.scopes.push(ScopeFrame::new(kind));
    let result = body(self);
    let frame = self.pop_scope()?;

    result.map(|_| frame.body)
  }

  pub(crate) fn pop_scope(&mut self) -> Result<ScopeFrame> {
    let scopes = &mut self.stage_state_mut()?.scopes;

    if scopes.len() <= 1 {
      return Err(ShaderError::internal("cannot leave the global scope"));
    }

    scopes
      .pop()
      .ok_or_else(|| ShaderError::internal("empty scope stack"))
  }

  /// Look a name up, from the innermost scope outwards.
  pub fn lookup(&self, name: &str) -> Option<Expr> {
    let state = self.stage.as_ref()?;
    state
      .scopes
      .iter()
      .rev()
      .find_map(|frame| frame.symbols.get(name).copied())
  }

  /// Look a name up, failing if it is not declared.
  pub fn get(&self, name: &str) -> Result<Expr> {
    self
      .lookup(name)
      .ok_or_else(|| ShaderError::declaration(format!("`{}` is not declared", name)))
  }

  pub(crate) fn condition(&mut self, cond: Value) -> Result<NodeId> {
    let cond = self.lower(cond, Some(ScalarKind::Bool))?;

    match self.types.primitive(cond.ty) {
      Some(p) if p.is_scalar() && p.scalar == ScalarKind::Bool => Ok(cond.node),
      _ => Err(ShaderError::type_error(format!(
        "conditions must be bool, got {}",
        self.types.display(cond.ty)
      ))),
    }
  }

  /// Declare a local variable initialized with `init`; its type is the type of `init`.
  ///
  /// ```
  /// # use polyshade::{BuilderConfig, ProgramBuilder, Target};
  /// # let mut pb = ProgramBuilder::new(BuilderConfig::new(Target::WebGPU));
  /// # pb.try_build_compute("doc", |pb| pb.main(|pb| {
  /// let v = pb.declare_local("v", 3.1415)?; // f32
  /// let q = pb.mul(v, 2)?;
  /// let q = pb.declare_local("q", q)?;
  /// # Ok(()) })).unwrap();
  /// ```
  pub fn declare_local(&mut self, name: &str, init: impl Into<Value>) -> Result<Expr> {
    self.require_function_scope("local variables")?;

    let init = self.lower(init.into(), None)?;
    self.require_storable(init.ty, name)?;

    let (var, expr) = self.new_var(name, init.ty, VarKind::Local)?;
    self.emit(Stmt::Declare {
      var,
      init: Some(init.node),
    })?;

    Ok(expr)
  }

  /// Declare an uninitialized local variable of type `ty`.
  pub fn declare_var(&mut self, name: &str, ty: &TypeDesc) -> Result<Expr> {
    self.require_function_scope("local variables")?;

    let ty = self.ty(ty)?;
    self.require_storable(ty, name)?;

    let (var, expr) = self.new_var(name, ty, VarKind::Local)?;
    self.emit(Stmt::Declare { var, init: None })?;

    Ok(expr)
  }

  fn require_storable(&self, ty: TypeHandle, name: &str) -> Result<()> {
    match self.types.kind(ty) {
      TypeKind::Primitive(_) | TypeKind::Struct(_) => Ok(()),
      TypeKind::Array { len, .. } if *len > 0 => Ok(()),
      _ => Err(ShaderError::type_error(format!(
        "variable `{}` cannot have type {}",
        name,
        self.types.display(ty)
      ))),
    }
  }

  /// Assign `value` to the variable `name`, declaring it first if it doesn't exist.
  pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<Expr> {
    match self.lookup(name) {
      Some(target) => {
        self.assign(target, value)?;
        Ok(target)
      }

      None => self.declare_local(name, value),
    }
  }

  /// Variable an access path is rooted at.
  pub(crate) fn root_var(&self, mut node: NodeId) -> Option<VarId> {
    loop {
      match self.node(node).kind {
        NodeKind::Var(v) => return Some(v),
        NodeKind::Member { base, .. } | NodeKind::Swizzle { base, .. } | NodeKind::Index { base, .. } => node = base,
        _ => return None,
      }
    }
  }

  /// Check that `node` can be written to.
  fn lvalue(&self, node: NodeId) -> Result<LValue> {
    match &self.node(node).kind {
      NodeKind::Var(v) => {
        let var = self.var(*v);

        match var.kind {
          VarKind::Local | VarKind::Workgroup | VarKind::Output { .. } | VarKind::Storage { read_only: false, .. } => {
            Ok(LValue::Variable)
          }

          VarKind::Param => Err(ShaderError::declaration(format!(
            "parameter `{}` is read-only",
            var.name
          ))),

          kind => Err(ShaderError::type_error(format!(
            "`{}` ({:?}) cannot be assigned to",
            var.name, kind
          ))),
        }
      }

      NodeKind::Builtin(b) if b.is_output() => Ok(LValue::Variable),

      NodeKind::Member { base, .. } => self.lvalue(*base).map(|_| LValue::Member),

      NodeKind::Index { base, .. } => {
        self.lvalue(*base)?;

        let column = self
          .types
          .primitive(self.node(*base).ty)
          .map_or(false, |p| p.is_matrix());

        Ok(if column { LValue::Column } else { LValue::Component })
      }

      NodeKind::Swizzle { base, swizzle } => {
        if !swizzle.is_unique() {
          return Err(ShaderError::type_error(format!(
            "cannot assign through swizzle `{}` selecting a component twice",
            swizzle
          )));
        }

        if self.target() == Target::WebGPU && swizzle.len() > 1 {
          return Err(ShaderError::type_error(format!(
            "WGSL cannot assign through the multi-component swizzle `{}`",
            swizzle
          )));
        }

        self.lvalue(*base).map(|_| LValue::Swizzle)
      }

      NodeKind::Deref(_) => Ok(LValue::Pointee),

      _ => Err(ShaderError::type_error("expression cannot be assigned to")),
    }
  }

  /// Assign `value` to `target`, which must be a writable variable, member, element, column or swizzle.
  pub fn assign(&mut self, target: Expr, value: impl Into<Value>) -> Result<()> {
    let lvalue = self.lvalue(target.node)?;
    let value = self.coerce(value.into(), target.ty, "assignment")?;
    log::trace!("assigning to {:?} target", lvalue);

    self.emit(Stmt::Assign {
      target: target.node,
      op: None,
      value: value.node,
    })
  }

  /// Compound assignment, e.g. `target += value`.
  pub fn assign_op(&mut self, target: Expr, op: crate::ast::BinaryOp, value: impl Into<Value>) -> Result<()> {
    if op.is_comparison() || matches!(op, crate::ast::BinaryOp::And | crate::ast::BinaryOp::Or) {
      return Err(ShaderError::parameter(format!(
        "`{}` has no compound assignment form",
        op.symbol()
      )));
    }

    self.lvalue(target.node)?;

    let value = self.lower_hinted(value.into(), self.scalar_hint(target.ty))?;
    let result = self.binary_type(op, target, value)?;

    if result != target.ty {
      return Err(ShaderError::type_error(format!(
        "`{}=` would change the type of its target from {} to {}",
        op.symbol(),
        self.types.display(target.ty),
        self.types.display(result)
      )));
    }

    self.emit(Stmt::Assign {
      target: target.node,
      op: Some(op),
      value: value.node,
    })
  }

  /// Write a built-in output such as [`BuiltinVar::Position`].
  pub fn set_builtin(&mut self, var: BuiltinVar, value: impl Into<Value>) -> Result<()> {
    let target = self.builtin(var)?;
    self.assign(target, value)
  }

  /// Evaluate an expression for its side effects.
  pub fn eval(&mut self, e: Expr) -> Result<()> {
    self.emit(Stmt::Eval(e.node))
  }

  /// Conditional statement.
  ///
  /// `body` is run in a new scope. Chain [`IfChain::else_if`] and [`IfChain::else_`] on the result to add branches.
  ///
  /// ```
  /// # use polyshade::{BuilderConfig, ProgramBuilder, Target};
  /// # let mut pb = ProgramBuilder::new(BuilderConfig::new(Target::WebGPU));
  /// # pb.try_build_compute("doc", |pb| pb.main(|pb| {
  /// let x = pb.declare_local("x", 1.)?;
  /// let negative = pb.lt(x, 0.)?;
  /// let small = pb.lt(x, 1.)?;
  ///
  /// pb.if_(negative, |pb| pb.assign(x, 0.))?
  ///   .else_if(small, |pb| pb.assign(x, 0.5))?
  ///   .else_(|pb| pb.assign(x, 1.))?;
  /// # Ok(()) })).unwrap();
  /// ```
  pub fn if_<F>(&mut self, cond: impl Into<Value>, body: F) -> Result<IfChain<'_>>
  where
    F: FnOnce(&mut Self) -> Result<()>,
  {
    self.require_function_scope("`if`")?;

    let cond = self.condition(cond.into())?;
    let block = self.with_scope(ScopeKind::If, body)?;
    self.emit(Stmt::If {
      branches: vec![(cond, block)],
      otherwise: None,
    })?;

    Ok(IfChain { builder: self })
  }

  /// Counted loop: `counter` goes from `start` (inclusive) to `end` (exclusive) by steps of one.
  ///
  /// Bounds must be `i32` or `u32`; the counter is declared in the loop scope and handed to `body`.
  pub fn for_range<F>(&mut self, counter: &str, start: impl Into<Value>, end: impl Into<Value>, body: F) -> Result<()>
  where
    F: FnOnce(&mut Self, Expr) -> Result<()>,
  {
    self.require_function_scope("`for`")?;

    let (start, end) = self.lower_pair(start.into(), end.into())?;
    match (self.types.primitive(start.ty), self.types.primitive(end.ty)) {
      (Some(s), Some(e)) if s == e && s.is_scalar() && s.scalar.is_integer() => (),
      _ => {
        return Err(ShaderError::type_error(format!(
          "loop bounds must both be i32 or u32, got {} and {}",
          self.types.display(start.ty),
          self.types.display(end.ty)
        )))
      }
    }

    self.stage_state_mut()?.scopes.push(ScopeFrame::new(ScopeKind::For));
    let result = self
      .new_var(counter, start.ty, VarKind::Local)
      .and_then(|(var, expr)| body(self, expr).map(|_| var));
    let frame = self.pop_scope()?;
    let var = result?;

    self.emit(Stmt::For {
      counter: var,
      start: start.node,
      end: end.node,
      body: frame.body,
    })
  }

  /// `while` loop; `cond` is evaluated in the enclosing scope.
  pub fn while_<F>(&mut self, cond: impl Into<Value>, body: F) -> Result<()>
  where
    F: FnOnce(&mut Self) -> Result<()>,
  {
    self.require_function_scope("`while`")?;

    let cond = self.condition(cond.into())?;
    let body = self.with_scope(ScopeKind::While, body)?;
    self.emit(Stmt::While { cond, body })
  }

  /// `do … while` loop; `cond` is built after the body, in the enclosing scope.
  pub fn do_while<F, C, V>(&mut self, body: F, cond: C) -> Result<()>
  where
    F: FnOnce(&mut Self) -> Result<()>,
    C: FnOnce(&mut Self) -> Result<V>,
    V: Into<Value>,
  {
    self.require_function_scope("`do while`")?;

    let body = self.with_scope(ScopeKind::DoWhile, body)?;
    let cond = cond(self)?;
    let cond = self.condition(cond.into())?;
    self.emit(Stmt::DoWhile { body, cond })
  }

  /// Nested block scope.
  pub fn scope<F>(&mut self, body: F) -> Result<()>
  where
    F: FnOnce(&mut Self) -> Result<()>,
  {
    self.require_function_scope("blocks")?;

    let block = self.with_scope(ScopeKind::Block, body)?;
    self.emit(Stmt::Block(block))
  }

  fn in_loop(&self) -> Result<bool> {
    for frame in self.scopes()?.iter().rev() {
      if frame.kind.is_loop() {
        return Ok(true);
      }

      if matches!(frame.kind, ScopeKind::Function { .. }) {
        break;
      }
    }

    Ok(false)
  }

  pub fn break_(&mut self) -> Result<()> {
    if !self.in_loop()? {
      return Err(ShaderError::declaration("`break` outside of a loop"));
    }

    self.emit(Stmt::Break)
  }

  pub fn continue_(&mut self) -> Result<()> {
    if !self.in_loop()? {
      return Err(ShaderError::declaration("`continue` outside of a loop"));
    }

    self.emit(Stmt::Continue)
  }

  /// Discard the current fragment.
  pub fn discard(&mut self) -> Result<()> {
    if self.stage_state()?.stage != ShaderStage::Fragment {
      return Err(ShaderError::declaration("`discard` is only available in fragment shaders"));
    }

    self.emit(Stmt::Discard)
  }
}

#[cfg(test)]
mod test {
  use crate::{
    config::BuilderConfig, error::ShaderError, program::ProgramBuilder, target::Target, types::TypeDesc,
  };

  fn builder(target: Target) -> ProgramBuilder {
    ProgramBuilder::new(BuilderConfig::new(target))
  }

  #[test]
  fn redeclaration_in_same_scope() {
    let err = builder(Target::WebGPU).in_test_main(|pb| {
      pb.declare_local("x", 1)?;
      pb.declare_local("x", 2)?;
      Ok(())
    });

    assert!(matches!(err, Err(ShaderError::Declaration(_))));
  }

  #[test]
  fn shadowing_in_nested_scope() {
    let result = builder(Target::WebGPU).in_test_main(|pb| {
      let outer = pb.declare_local("x", 1)?;
      pb.scope(|pb| {
        let inner = pb.declare_local("x", 2.)?;
        assert_ne!(pb.get("x")?, outer);
        assert_eq!(pb.get("x")?, inner);
        Ok(())
      })?;
      assert_eq!(pb.get("x")?, outer);
      Ok(())
    });

    assert!(result.is_ok());
  }

  #[test]
  fn break_outside_loop() {
    let err = builder(Target::WebGPU).in_test_main(|pb| pb.break_());
    assert!(matches!(err, Err(ShaderError::Declaration(_))));

    let ok = builder(Target::WebGPU).in_test_main(|pb| {
      pb.for_range("i", 0, 4, |pb, i| {
        let three = pb.eq(i, 3)?;
        pb.if_(three, |pb| pb.break_())?;
        Ok(())
      })
    });
    assert!(ok.is_ok());
  }

  #[test]
  fn wgsl_rejects_multi_component_swizzle_writes() {
    let body = |pb: &mut ProgramBuilder| {
      let v = pb.declare_var("v", &TypeDesc::vec4())?;
      let xy = pb.swizzle(v, "xy")?;
      let value = pb.vec2((1., 2.))?;
      pb.assign(xy, value)
    };

    assert!(matches!(
      builder(Target::WebGPU).in_test_main(body),
      Err(ShaderError::Type(_))
    ));
    assert!(builder(Target::WebGL2).in_test_main(body).is_ok());
  }

  #[test]
  fn assignment_type_mismatch() {
    let err = builder(Target::WebGPU).in_test_main(|pb| {
      let v = pb.declare_var("v", &TypeDesc::vec3())?;
      pb.assign(v, 1.)
    });

    assert!(matches!(err, Err(ShaderError::Type(_))));
  }

  #[test]
  fn locals_need_function_scope() {
    let mut pb = builder(Target::WebGPU);
    let err = pb.try_build_compute("c", |pb| {
      pb.declare_local("x", 1)?;
      pb.main(|_| Ok(()))
    });

    assert!(matches!(err, Err(ShaderError::Declaration(_))));
  }
}

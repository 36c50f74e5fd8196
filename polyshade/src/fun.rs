//! User functions, overloads and the stage entry point.

use crate::{
  ast::{Block, FunId, NodeKind, Stmt, VarId, VarKind},
  error::{Result, ShaderError},
  expr::{Expr, IntoArgs, Value},
  program::ProgramBuilder,
  scope::ScopeKind,
  types::{check_identifier, TypeDesc, TypeHandle, TypeKind},
};

/// A user function of a stage.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Function {
  pub name: String,
  pub params: Vec<VarId>,
  pub param_types: Vec<TypeHandle>,
  pub return_ty: TypeHandle,
  pub body: Block,

  /// Rank among the functions sharing the same name.
  pub overload: usize,
}

/// Whether every path through `block` ends with a `return`.
fn always_returns(block: &[Stmt]) -> bool {
  match block.last() {
    Some(Stmt::Return(_)) => true,
    Some(Stmt::Block(inner)) => always_returns(inner),
    Some(Stmt::If {
      branches,
      otherwise: Some(otherwise),
    }) => branches.iter().all(|(_, b)| always_returns(b)) && always_returns(otherwise),
    _ => false,
  }
}

impl ProgramBuilder {
  /// Define a function.
  ///
  /// `params` lists the name and type of each parameter; `body` receives the parameters as expressions. The return
  /// type is the type of the first value returned, or `void` if the function never returns a value. Several
  /// functions can share a name as long as their parameter types differ; calls pick the first that accepts the
  /// arguments.
  ///
  /// ```
  /// # use polyshade::{BuilderConfig, ProgramBuilder, Target, TypeDesc};
  /// # let mut pb = ProgramBuilder::new(BuilderConfig::new(Target::WebGPU));
  /// # pb.try_build_compute("doc", |pb| {
  /// pb.func("square", &[("a", TypeDesc::f32())], |pb, args| {
  ///   let sq = pb.mul(args[0], args[0])?;
  ///   pb.return_(sq)
  /// })?;
  ///
  /// pb.main(|pb| {
  ///   let nine = pb.call("square", (3.,))?;
  ///   pb.declare_local("nine", nine)?;
  ///   Ok(())
  /// })
  /// # }).unwrap();
  /// ```
  pub fn func<F>(&mut self, name: &str, params: &[(&str, TypeDesc)], body: F) -> Result<FunId>
  where
    F: FnOnce(&mut Self, &[Expr]) -> Result<()>,
  {
    check_identifier(name)?;
    self.require_global_scope("functions")?;

    if name == "main" {
      return Err(ShaderError::declaration("`main` is defined with `ProgramBuilder::main`"));
    }

    // name of the user entry point in WGSL
    if name == "stage_main" {
      return Err(ShaderError::declaration("`stage_main` is a reserved function name"));
    }

    let mut param_types = Vec::with_capacity(params.len());
    for (param, desc) in params {
      let ty = self.ty(desc)?;

      match self.types.kind(ty) {
        TypeKind::Primitive(_) | TypeKind::Struct(_) | TypeKind::Pointer { .. } => (),
        TypeKind::Array { len, .. } if *len > 0 => (),
        _ => {
          return Err(ShaderError::type_error(format!(
            "parameter `{}` of `{}` cannot have type {}",
            param,
            name,
            self.types.display(ty)
          )))
        }
      }

      param_types.push(ty);
    }

    let overloads = self.stage_state()?.fn_index.get(name).cloned().unwrap_or_default();
    for &id in &overloads {
      if self.function(id)?.param_types == param_types {
        return Err(ShaderError::declaration(format!(
          "function `{}` is already defined with the same parameters",
          name
        )));
      }
    }

    self.stage_state_mut()?.scopes.push(crate::scope::ScopeFrame::new(ScopeKind::Function {
      name: name.to_owned(),
      main: false,
      return_ty: None,
    }));

    let result = self.function_body(params, &param_types, body);
    let frame = self.pop_scope()?;
    let (param_vars, args) = result?;

    let return_ty = match frame.kind {
      ScopeKind::Function {
        return_ty: Some(ty), ..
      } => ty,
      _ => self.types.void(),
    };

    if !self.types.is_void(return_ty) && !always_returns(&frame.body) {
      return Err(ShaderError::declaration(format!(
        "function `{}` does not return a value on every path",
        name
      )));
    }

    let state = self.stage_state_mut()?;
    let id = FunId(state.functions.len() as u32);
    state.functions.push(Function {
      name: name.to_owned(),
      params: param_vars,
      param_types,
      return_ty,
      body: frame.body,
      overload: overloads.len(),
    });
    state.fn_index.entry(name.to_owned()).or_default().push(id);

    log::trace!("defined function `{}` with {} parameter(s)", name, args.len());
    Ok(id)
  }

  fn function_body<F>(
    &mut self,
    params: &[(&str, TypeDesc)],
    param_types: &[TypeHandle],
    body: F,
  ) -> Result<(Vec<VarId>, Vec<Expr>)>
  where
    F: FnOnce(&mut Self, &[Expr]) -> Result<()>,
  {
    let mut vars = Vec::with_capacity(params.len());
    let mut args = Vec::with_capacity(params.len());

    for ((name, _), &ty) in params.iter().zip(param_types) {
      let (var, expr) = self.new_var(name, ty, VarKind::Param)?;
      vars.push(var);
      args.push(expr);
    }

    body(self, &args)?;
    Ok((vars, args))
  }

  pub(crate) fn function(&self, id: FunId) -> Result<&Function> {
    self
      .stage_state()?
      .functions
      .get(id.0 as usize)
      .ok_or_else(|| ShaderError::internal(format!("function #{} is not defined", id.0)))
  }

  /// Define the entry point of the stage being built.
  pub fn main<F>(&mut self, body: F) -> Result<()>
  where
    F: FnOnce(&mut Self) -> Result<()>,
  {
    self.require_global_scope("`main`")?;

    if self.stage_state()?.main.is_some() {
      return Err(ShaderError::declaration("`main` is already defined for this stage"));
    }

    let block = self.with_scope(
      ScopeKind::Function {
        name: "main".to_owned(),
        main: true,
        return_ty: None,
      },
      body,
    )?;

    self.stage_state_mut()?.main = Some(block);
    Ok(())
  }

  /// Call a user function.
  ///
  /// Calls to functions returning `void` are emitted as statements right away.
  pub fn call(&mut self, name: &str, args: impl IntoArgs) -> Result<Expr> {
    let args = args.into_args();
    let overloads = self
      .stage_state()?
      .fn_index
      .get(name)
      .cloned()
      .ok_or_else(|| ShaderError::internal(format!("function `{}` is not defined", name)))?;

    let mut chosen = None;
    for id in overloads {
      let fun = self.function(id)?;

      if fun.param_types.len() == args.len()
        && args
          .iter()
          .zip(&fun.param_types)
          .all(|(arg, &ty)| self.value_matches(arg, ty))
      {
        chosen = Some((id, fun.param_types.clone(), fun.return_ty));
        break;
      }
    }

    let (id, param_types, return_ty) = chosen.ok_or_else(|| {
      ShaderError::type_error(format!(
        "no overload of `{}` accepts ({})",
        name,
        self.describe_values(&args)
      ))
    })?;

    let mut nodes = Vec::with_capacity(args.len());
    for (arg, ty) in args.into_iter().zip(param_types) {
      nodes.push(self.coerce(arg, ty, name)?.node);
    }

    let e = self.push_node(return_ty, NodeKind::Call { fun: id, args: nodes });

    if self.types.is_void(return_ty) {
      self.emit(Stmt::Eval(e.node))?;
    }

    Ok(e)
  }

  fn enclosing_function_mut(&mut self) -> Result<&mut ScopeKind> {
    self
      .stage_state_mut()?
      .scopes
      .iter_mut()
      .rev()
      .map(|frame| &mut frame.kind)
      .find(|kind| matches!(kind, ScopeKind::Function { .. }))
      .ok_or_else(|| ShaderError::declaration("`return` outside of a function"))
  }

  /// Return a value from the current function.
  ///
  /// The first `return` fixes the return type of the function; later ones must return values of the same type.
  pub fn return_(&mut self, value: impl Into<Value>) -> Result<()> {
    let expected = match self.enclosing_function_mut()? {
      ScopeKind::Function { main: true, .. } => {
        return Err(ShaderError::declaration("`main` cannot return a value"));
      }
      ScopeKind::Function { return_ty, .. } => *return_ty,
      _ => None,
    };

    let value = value.into();
    let e = match expected {
      Some(ty) => self.coerce(value, ty, "return").map_err(|_| {
        ShaderError::declaration(format!(
          "return of {} conflicts with the return type {} fixed by an earlier return",
          self.describe_value(&value),
          self.types.display(ty)
        ))
      })?,
      None => self.lower(value, None)?,
    };

    match self.types.kind(e.ty) {
      TypeKind::Primitive(_) | TypeKind::Struct(_) => (),
      TypeKind::Array { len, .. } if *len > 0 => (),
      _ => {
        return Err(ShaderError::type_error(format!(
          "functions cannot return {}",
          self.types.display(e.ty)
        )))
      }
    }

    if let ScopeKind::Function { return_ty, .. } = self.enclosing_function_mut()? {
      *return_ty = Some(e.ty);
    }

    self.emit(Stmt::Return(Some(e.node)))
  }

  /// Return from a `void` function.
  pub fn return_void(&mut self) -> Result<()> {
    let void = self.types.void();

    if let ScopeKind::Function { return_ty, .. } = self.enclosing_function_mut()? {
      match return_ty {
        Some(ty) if *ty != void => {
          return Err(ShaderError::declaration(
            "empty return in a function that returns a value",
          ))
        }
        _ => *return_ty = Some(void),
      }
    }

    self.emit(Stmt::Return(None))
  }
}

#[cfg(test)]
mod test {
  use crate::{
    config::BuilderConfig, error::ShaderError, program::ProgramBuilder, target::Target, types::TypeDesc,
  };

  fn compute(
    target: Target,
    f: impl FnOnce(&mut ProgramBuilder) -> crate::error::Result<()>,
  ) -> crate::error::Result<()> {
    let mut pb = ProgramBuilder::new(BuilderConfig::new(target));
    pb.try_build_compute("test", f).map(|_| ())
  }

  #[test]
  fn overloads_resolve_in_order() {
    let result = compute(Target::WebGPU, |pb| {
      pb.func("twice", &[("a", TypeDesc::i32())], |pb, a| {
        let r = pb.mul(a[0], 2)?;
        pb.return_(r)
      })?;
      pb.func("twice", &[("a", TypeDesc::f32())], |pb, a| {
        let r = pb.mul(a[0], 2.)?;
        pb.return_(r)
      })?;

      pb.main(|pb| {
        let i = pb.call("twice", (3,))?;
        let f = pb.call("twice", (1.5,))?;
        assert_eq!(pb.types.display(i.ty()), "i32");
        assert_eq!(pb.types.display(f.ty()), "f32");
        assert!(matches!(pb.call("twice", (true,)), Err(ShaderError::Type(_))));
        Ok(())
      })
    });

    assert!(result.is_ok());
  }

  #[test]
  fn duplicate_signature() {
    let err = compute(Target::WebGPU, |pb| {
      pb.func("f", &[("a", TypeDesc::i32())], |pb, _| pb.return_(1))?;
      pb.func("f", &[("b", TypeDesc::i32())], |pb, _| pb.return_(2))?;
      pb.main(|_| Ok(()))
    });

    assert!(matches!(err, Err(ShaderError::Declaration(_))));
  }

  #[test]
  fn conflicting_returns() {
    let err = compute(Target::WebGPU, |pb| {
      pb.func("f", &[("a", TypeDesc::bool())], |pb, a| {
        pb.if_(a[0], |pb| pb.return_(1))?;
        pb.return_(1.5)
      })?;
      pb.main(|_| Ok(()))
    });

    assert!(matches!(err, Err(ShaderError::Declaration(_))));
  }

  #[test]
  fn missing_return_path() {
    let err = compute(Target::WebGPU, |pb| {
      pb.func("f", &[("a", TypeDesc::bool())], |pb, a| {
        pb.if_(a[0], |pb| pb.return_(1))?;
        Ok(())
      })?;
      pb.main(|_| Ok(()))
    });

    assert!(matches!(err, Err(ShaderError::Declaration(_))));
  }

  #[test]
  fn undefined_function() {
    let err = compute(Target::WebGPU, |pb| pb.main(|pb| pb.call("nope", ()).map(|_| ())));
    assert!(matches!(err, Err(ShaderError::Internal(_))));
  }

  #[test]
  fn parameters_are_read_only() {
    let err = compute(Target::WebGPU, |pb| {
      pb.func("f", &[("a", TypeDesc::i32())], |pb, a| pb.assign(a[0], 2))?;
      pb.main(|_| Ok(()))
    });

    assert!(matches!(err, Err(ShaderError::Declaration(_))));
  }
}

//! Source writers.
//!
//! A stage is rendered in a single pass once the binding plan is known. Both writers share the struct declaration
//! order computed here: a struct is always declared after the structs it contains.

mod glsl;
mod wgsl;

use crate::{
  ast::{visit_block, visit_node, FunId, Node, NodeId, VarId, Variable},
  error::{Result, ShaderError},
  fun::Function,
  program::StageState,
  target::Target,
  types::{TypeHandle, TypeKind, TypeRegistry},
  uniform::{BindingPlan, ResourceKind, UniformRecord},
};
use indexmap::IndexSet;

/// Everything a writer needs to render one stage.
pub(crate) struct WriteContext<'a> {
  pub target: Target,
  pub stage: &'a StageState,
  pub types: &'a TypeRegistry,
  pub nodes: &'a [Node],
  pub vars: &'a [Variable],
  pub plan: &'a BindingPlan,
  pub indent_width: usize,
}

impl<'a> WriteContext<'a> {
  fn node(&self, id: NodeId) -> &'a Node {
    &self.nodes[id.0 as usize]
  }

  fn var(&self, id: VarId) -> &'a Variable {
    &self.vars[id.0 as usize]
  }

  fn indent(&self, level: usize) -> String {
    " ".repeat(level * self.indent_width)
  }

  fn function(&self, id: FunId) -> Result<&'a Function> {
    self
      .stage
      .functions
      .get(id.0 as usize)
      .ok_or_else(|| ShaderError::internal(format!("function #{} is not defined", id.0)))
  }

  /// Name of a function in the generated source.
  ///
  /// WGSL has no overloading: overloaded functions get their rank appended.
  fn function_name(&self, id: FunId) -> Result<String> {
    let fun = self.function(id)?;
    let overloaded = self.stage.fn_index.get(&fun.name).map_or(false, |ids| ids.len() > 1);

    if overloaded && self.target == Target::WebGPU {
      Ok(format!("{}_{}", fun.name, fun.overload))
    } else {
      Ok(fun.name.clone())
    }
  }

  /// Binding record of a uniform, texture, sampler or storage declaration.
  fn record(&self, var: VarId) -> Result<&'a UniformRecord> {
    self
      .plan
      .record_of(var)
      .ok_or_else(|| ShaderError::internal(format!("`{}` was not assigned a binding", self.var(var).name)))
  }

  /// Variables declared by the stage, in declaration order.
  fn stage_vars(&self) -> impl Iterator<Item = &'a Variable> + '_ {
    self.vars.iter().filter(move |v| v.stage == self.stage.stage)
  }

  /// Every function body of the stage, `main` last.
  fn bodies(&self) -> impl Iterator<Item = &'a [crate::ast::Stmt]> + '_ {
    self
      .stage
      .functions
      .iter()
      .map(|f| f.body.as_slice())
      .chain(self.stage.main.as_deref())
  }
}

/// Render a stage, returning its source and the struct types it declares.
pub(crate) fn write_stage(ctx: &WriteContext) -> Result<(String, Vec<TypeHandle>)> {
  let structs = struct_declarations(ctx);
  let mut source = String::new();

  match ctx.target {
    Target::WebGPU => wgsl::write_stage(&mut source, ctx, &structs)?,
    Target::WebGL | Target::WebGL2 => glsl::write_stage(&mut source, ctx, &structs)?,
  }

  log::debug!(
    "rendered {} stage for {} ({} struct(s), {} bytes)",
    ctx.stage.stage,
    ctx.target,
    structs.len(),
    source.len()
  );

  Ok((source, structs))
}

/// Struct types used by a stage, each one after the structs it depends on.
fn struct_declarations(ctx: &WriteContext) -> Vec<TypeHandle> {
  let mut found = IndexSet::new();

  for var in ctx.stage_vars() {
    add_struct(ctx.types, var.ty, &mut found);
  }

  for fun in &ctx.stage.functions {
    add_struct(ctx.types, fun.return_ty, &mut found);
  }

  let mut nodes = Vec::new();
  for body in ctx.bodies() {
    visit_block(ctx.nodes, body, &mut |id| nodes.push(id));
  }

  for &c in &ctx.stage.constants {
    if let Some(init) = ctx.var(c).init {
      visit_node(ctx.nodes, init, &mut |id| nodes.push(id));
    }
  }

  for id in nodes {
    add_struct(ctx.types, ctx.node(id).ty, &mut found);
  }

  // GLSL ES 3.00 declares blocks inline
  if ctx.target != Target::WebGL2 {
    for record in ctx.plan.visible_from(ctx.stage.stage) {
      if let ResourceKind::UniformBlock(ty) = record.kind {
        add_struct(ctx.types, ty, &mut found);
      }
    }
  }

  found.into_iter().collect()
}

fn add_struct(types: &TypeRegistry, ty: TypeHandle, found: &mut IndexSet<TypeHandle>) {
  match types.kind(ty) {
    TypeKind::Struct(s) => {
      if found.contains(&ty) {
        return;
      }

      for member in &s.members {
        add_struct(types, member.ty, found);
      }

      found.insert(ty);
    }

    TypeKind::Array { element, .. } => add_struct(types, *element, found),
    TypeKind::Pointer { pointee, .. } => add_struct(types, *pointee, found),
    _ => (),
  }
}

/// Float literal readable by both GLSL ES and WGSL.
fn float_literal(x: f32) -> String {
  if x.fract() == 0. && x.abs() < 1e16 {
    format!("{:.1}", x)
  } else {
    format!("{:?}", x)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn float_literals() {
    assert_eq!(float_literal(1.), "1.0");
    assert_eq!(float_literal(-3.), "-3.0");
    assert_eq!(float_literal(0.25), "0.25");
    assert_eq!(float_literal(1e20), "1e20");
  }
}

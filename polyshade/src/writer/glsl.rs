//! GLSL ES writers: 1.00 for WebGL, 3.00 for WebGL2.

use super::{float_literal, WriteContext};
use crate::{
  ast::{BinaryOp, Literal, NodeId, NodeKind, Stmt, UnaryOp, VarId, VarKind},
  error::{Result, ShaderError},
  stage::ShaderStage,
  stdlib::Intrinsic,
  target::Target,
  types::{PrimitiveType, ScalarKind, TextureSampleType, TextureType, TextureViewDimension, TypeHandle, TypeKind},
  uniform::ResourceKind,
};
use std::{collections::BTreeSet, fmt::Write as _};

pub(super) fn write_stage(f: &mut String, ctx: &WriteContext, structs: &[TypeHandle]) -> Result<()> {
  write_header(f, ctx)?;

  for &ty in structs {
    write_struct(f, ctx, ty)?;
  }

  write_constants(f, ctx)?;
  write_inputs(f, ctx)?;
  write_outputs(f, ctx)?;
  write_uniforms(f, ctx)?;

  for fun in &ctx.stage.functions {
    // just for aesthetics
    f.write_str("\n")?;

    let ret = if ctx.types.is_void(fun.return_ty) {
      "void".to_owned()
    } else {
      type_name(ctx, fun.return_ty)?
    };

    let params = fun
      .params
      .iter()
      .map(|&p| declaration(ctx, ctx.var(p).ty, &ctx.var(p).name))
      .collect::<Result<Vec<_>>>()?;

    writeln!(f, "{} {}({}) {{", ret, fun.name, params.join(", "))?;
    write_block(f, ctx, &fun.body, 1)?;
    f.write_str("}\n")?;
  }

  let main = ctx
    .stage
    .main
    .as_ref()
    .ok_or_else(|| ShaderError::internal("rendering a stage without main"))?;

  f.write_str("\nvoid main() {\n")?;
  write_block(f, ctx, main, 1)?;
  f.write_str("}\n")?;

  Ok(())
}

fn write_header(f: &mut String, ctx: &WriteContext) -> Result<()> {
  if ctx.target == Target::WebGL2 {
    f.write_str("#version 300 es\n")?;
  }

  for ext in &ctx.stage.extensions {
    writeln!(f, "#extension {} : enable", ext)?;
  }

  f.write_str("precision highp float;\nprecision highp int;\n")?;

  // sampler types without a default precision
  if ctx.target == Target::WebGL2 {
    let samplers = ctx
      .plan
      .visible_from(ctx.stage.stage)
      .filter_map(|r| match r.kind {
        ResourceKind::Texture(t) => Some(sampler_type(ctx.target, t)),
        _ => None,
      })
      .collect::<Result<BTreeSet<_>>>()?;

    for sampler in samplers {
      if sampler != "sampler2D" && sampler != "samplerCube" {
        writeln!(f, "precision highp {};", sampler)?;
      }
    }
  }

  f.write_str("\n")?;
  Ok(())
}

fn write_struct(f: &mut String, ctx: &WriteContext, ty: TypeHandle) -> Result<()> {
  let s = ctx
    .types
    .struct_type(ty)
    .ok_or_else(|| ShaderError::internal("declaring a non-struct type as a struct"))?;

  writeln!(f, "struct {} {{", s.name)?;
  for member in &s.members {
    writeln!(f, "{}{};", ctx.indent(1), declaration(ctx, member.ty, &member.name)?)?;
  }
  f.write_str("};\n\n")?;

  Ok(())
}

fn write_constants(f: &mut String, ctx: &WriteContext) -> Result<()> {
  for &c in &ctx.stage.constants {
    let var = ctx.var(c);
    let init = var
      .init
      .ok_or_else(|| ShaderError::internal(format!("constant `{}` has no value", var.name)))?;

    writeln!(
      f,
      "const {} = {};",
      declaration(ctx, var.ty, &var.name)?,
      expr(ctx, init)?
    )?;
  }

  Ok(())
}

fn is_integer(ctx: &WriteContext, ty: TypeHandle) -> bool {
  ctx.types.primitive(ty).map_or(false, |p| p.scalar.is_integer())
}

fn write_inputs(f: &mut String, ctx: &WriteContext) -> Result<()> {
  for &v in &ctx.stage.inputs {
    let var = ctx.var(v);
    let decl = declaration(ctx, var.ty, &var.name)?;
    let location = match var.kind {
      VarKind::Input { location, .. } => location,
      _ => return Err(ShaderError::internal(format!("`{}` is not an input", var.name))),
    };

    match (ctx.target, ctx.stage.stage) {
      (Target::WebGL, ShaderStage::Vertex) => writeln!(f, "attribute {};", decl)?,
      (Target::WebGL, _) => writeln!(f, "varying {};", decl)?,
      (_, ShaderStage::Vertex) => writeln!(f, "layout(location = {}) in {};", location, decl)?,
      _ if is_integer(ctx, var.ty) => writeln!(f, "flat in {};", decl)?,
      _ => writeln!(f, "in {};", decl)?,
    }
  }

  Ok(())
}

fn write_outputs(f: &mut String, ctx: &WriteContext) -> Result<()> {
  for &v in &ctx.stage.outputs {
    let var = ctx.var(v);
    let decl = declaration(ctx, var.ty, &var.name)?;
    let location = match var.kind {
      VarKind::Output { location } => location,
      _ => return Err(ShaderError::internal(format!("`{}` is not an output", var.name))),
    };

    match (ctx.target, ctx.stage.stage) {
      (Target::WebGL, ShaderStage::Vertex) => writeln!(f, "varying {};", decl)?,
      // gl_FragColor and gl_FragData
      (Target::WebGL, _) => (),
      (_, ShaderStage::Vertex) if is_integer(ctx, var.ty) => writeln!(f, "flat out {};", decl)?,
      (_, ShaderStage::Vertex) => writeln!(f, "out {};", decl)?,
      _ => writeln!(f, "layout(location = {}) out {};", location, decl)?,
    }
  }

  Ok(())
}

fn write_uniforms(f: &mut String, ctx: &WriteContext) -> Result<()> {
  for record in ctx.plan.visible_from(ctx.stage.stage) {
    match record.kind {
      ResourceKind::UniformBlock(ty) => {
        let s = ctx
          .types
          .struct_type(ty)
          .ok_or_else(|| ShaderError::internal(format!("block `{}` is not a struct", record.name)))?;

        if ctx.target == Target::WebGL2 {
          writeln!(f, "layout(std140) uniform {} {{", s.name)?;
          for member in &s.members {
            writeln!(f, "{}{};", ctx.indent(1), declaration(ctx, member.ty, &member.name)?)?;
          }
          writeln!(f, "}} {};", record.name)?;
        } else {
          writeln!(f, "uniform {} {};", s.name, record.name)?;
        }
      }

      ResourceKind::Texture(t) => writeln!(f, "uniform {} {};", sampler_type(ctx.target, t)?, record.name)?,

      _ => {
        return Err(ShaderError::internal(format!(
          "`{}` cannot be declared in GLSL ES",
          record.name
        )))
      }
    }
  }

  Ok(())
}

fn prim_name(p: PrimitiveType) -> String {
  if p.is_matrix() {
    if p.cols == p.rows {
      format!("mat{}", p.cols)
    } else {
      format!("mat{}x{}", p.cols, p.rows)
    }
  } else if p.is_vector() {
    let prefix = match p.scalar {
      ScalarKind::Bool => "b",
      ScalarKind::I32 => "i",
      ScalarKind::U32 => "u",
      ScalarKind::F32 | ScalarKind::F16 => "",
    };

    format!("{}vec{}", prefix, p.rows)
  } else {
    match p.scalar {
      ScalarKind::Bool => "bool",
      ScalarKind::I32 => "int",
      ScalarKind::U32 => "uint",
      ScalarKind::F32 | ScalarKind::F16 => "float",
    }
    .to_owned()
  }
}

fn type_name(ctx: &WriteContext, ty: TypeHandle) -> Result<String> {
  match ctx.types.kind(ty) {
    TypeKind::Void => Ok("void".to_owned()),
    TypeKind::Primitive(p) => Ok(prim_name(*p)),
    TypeKind::Struct(s) => Ok(s.name.clone()),
    TypeKind::Array { element, len } if *len > 0 => Ok(format!("{}[{}]", type_name(ctx, *element)?, len)),
    TypeKind::Texture(t) => sampler_type(ctx.target, *t).map(str::to_owned),
    _ => Err(ShaderError::internal(format!(
      "{} has no GLSL ES spelling",
      ctx.types.display(ty)
    ))),
  }
}

/// `T name`, with array dimensions after the name.
fn declaration(ctx: &WriteContext, ty: TypeHandle, name: &str) -> Result<String> {
  match ctx.types.kind(ty) {
    TypeKind::Array { element, len } if *len > 0 => Ok(format!("{} {}[{}]", type_name(ctx, *element)?, name, len)),
    _ => Ok(format!("{} {}", type_name(ctx, ty)?, name)),
  }
}

fn sampler_type(target: Target, t: TextureType) -> Result<&'static str> {
  use TextureSampleType::*;
  use TextureViewDimension::*;

  let name = match (target, t.dimension, t.sample_type) {
    // depth textures are regular samplers on WebGL
    (Target::WebGL, D2, _) => "sampler2D",
    (Target::WebGL, Cube, _) => "samplerCube",

    (_, D2, Depth) => "sampler2DShadow",
    (_, D2Array, Depth) => "sampler2DArrayShadow",
    (_, Cube, Depth) => "samplerCubeShadow",
    (_, D2, Sint) => "isampler2D",
    (_, D2, Uint) => "usampler2D",
    (_, D2, _) => "sampler2D",
    (_, D2Array, Sint) => "isampler2DArray",
    (_, D2Array, Uint) => "usampler2DArray",
    (_, D2Array, _) => "sampler2DArray",
    (_, Cube, Sint) => "isamplerCube",
    (_, Cube, Uint) => "usamplerCube",
    (_, Cube, _) => "samplerCube",
    (_, D3, Sint) => "isampler3D",
    (_, D3, Uint) => "usampler3D",
    (_, D3, _) => "sampler3D",

    (_, CubeArray, _) => {
      return Err(ShaderError::internal("cube array textures have no GLSL ES spelling"));
    }
  };

  Ok(name)
}

fn write_block(f: &mut String, ctx: &WriteContext, block: &[Stmt], level: usize) -> Result<()> {
  for stmt in block {
    f.write_str(&ctx.indent(level))?;

    match stmt {
      Stmt::Declare { var, init } => {
        let var = ctx.var(*var);
        f.write_str(&declaration(ctx, var.ty, &var.name)?)?;

        if let Some(init) = init {
          write!(f, " = {}", expr(ctx, *init)?)?;
        }

        f.write_str(";\n")?;
      }

      Stmt::Assign { target, op, value } => {
        let t = expr(ctx, *target)?;
        let v = expr(ctx, *value)?;

        match op {
          None => writeln!(f, "{} = {};", t, v)?,

          // no compound form
          Some(op @ (BinaryOp::Rem | BinaryOp::And | BinaryOp::Or)) => {
            let node = ctx.node(*target);
            let rhs = ctx.node(*value);
            writeln!(f, "{} = {};", t, binary(ctx, *op, &t, node.ty, &v, rhs.ty, node.ty)?)?;
          }

          Some(op) => writeln!(f, "{} {}= {};", t, op.symbol(), v)?,
        }
      }

      Stmt::Eval(node) => writeln!(f, "{};", expr(ctx, *node)?)?,

      Stmt::If { branches, otherwise } => {
        for (i, (cond, body)) in branches.iter().enumerate() {
          if i > 0 {
            f.write_str(" else ")?;
          }

          writeln!(f, "if ({}) {{", expr(ctx, *cond)?)?;
          write_block(f, ctx, body, level + 1)?;
          write!(f, "{}}}", ctx.indent(level))?;
        }

        if let Some(body) = otherwise {
          f.write_str(" else {\n")?;
          write_block(f, ctx, body, level + 1)?;
          write!(f, "{}}}", ctx.indent(level))?;
        }

        f.write_str("\n")?;
      }

      Stmt::For {
        counter,
        start,
        end,
        body,
      } => {
        let var = ctx.var(*counter);
        writeln!(
          f,
          "for ({} = {}; {} < {}; {}++) {{",
          declaration(ctx, var.ty, &var.name)?,
          expr(ctx, *start)?,
          var.name,
          expr(ctx, *end)?,
          var.name
        )?;
        write_block(f, ctx, body, level + 1)?;
        writeln!(f, "{}}}", ctx.indent(level))?;
      }

      Stmt::While { cond, body } => {
        writeln!(f, "while ({}) {{", expr(ctx, *cond)?)?;
        write_block(f, ctx, body, level + 1)?;
        writeln!(f, "{}}}", ctx.indent(level))?;
      }

      Stmt::DoWhile { body, cond } => {
        f.write_str("do {\n")?;
        write_block(f, ctx, body, level + 1)?;
        writeln!(f, "{}}} while ({});", ctx.indent(level), expr(ctx, *cond)?)?;
      }

      Stmt::Block(body) => {
        f.write_str("{\n")?;
        write_block(f, ctx, body, level + 1)?;
        writeln!(f, "{}}}", ctx.indent(level))?;
      }

      Stmt::Return(Some(node)) => writeln!(f, "return {};", expr(ctx, *node)?)?,
      Stmt::Return(None) => f.write_str("return;\n")?,
      Stmt::Break => f.write_str("break;\n")?,
      Stmt::Continue => f.write_str("continue;\n")?,
      Stmt::Discard => f.write_str("discard;\n")?,
    }
  }

  Ok(())
}

fn expr(ctx: &WriteContext, id: NodeId) -> Result<String> {
  let mut s = String::new();
  write_expr(&mut s, ctx, id)?;
  Ok(s)
}

fn write_expr(f: &mut String, ctx: &WriteContext, id: NodeId) -> Result<()> {
  let node = ctx.node(id);

  match &node.kind {
    NodeKind::Literal(lit) => write_literal(f, *lit)?,
    NodeKind::Var(v) => write_var(f, ctx, *v)?,
    NodeKind::Builtin(b) => f.write_str(b.glsl_name(ctx.target))?,

    NodeKind::Member { base, index } => {
      let base_ty = ctx.node(*base).ty;
      let member = ctx
        .types
        .struct_type(base_ty)
        .and_then(|s| s.members.get(*index as usize))
        .ok_or_else(|| ShaderError::internal("member access on a non-struct"))?;

      write!(f, "{}.{}", expr(ctx, *base)?, member.name)?;
    }

    NodeKind::Swizzle { base, swizzle } => write!(f, "{}.{}", expr(ctx, *base)?, swizzle)?,
    NodeKind::Index { base, index } => write!(f, "{}[{}]", expr(ctx, *base)?, expr(ctx, *index)?)?,

    NodeKind::Unary { op, operand } => {
      let e = expr(ctx, *operand)?;
      let vector = ctx.types.primitive(node.ty).map_or(false, |p| p.is_vector());

      match op {
        UnaryOp::Neg => write!(f, "-({})", e)?,
        UnaryOp::Not if vector => write!(f, "not({})", e)?,
        UnaryOp::Not => write!(f, "!({})", e)?,
        UnaryOp::BitNot => write!(f, "~({})", e)?,
      }
    }

    NodeKind::Binary { op, lhs, rhs } => {
      let (l, r) = (ctx.node(*lhs), ctx.node(*rhs));
      let rendered = binary(ctx, *op, &expr(ctx, *lhs)?, l.ty, &expr(ctx, *rhs)?, r.ty, node.ty)?;
      f.write_str(&rendered)?;
    }

    NodeKind::Construct { args } if args.is_empty() => {
      let p = ctx
        .types
        .primitive(node.ty)
        .ok_or_else(|| ShaderError::internal("zero value of a non-primitive type"))?;

      let zero = match p.scalar {
        ScalarKind::Bool => "false",
        ScalarKind::I32 => "0",
        ScalarKind::U32 => "0u",
        ScalarKind::F32 | ScalarKind::F16 => "0.0",
      };

      if p.is_scalar() {
        f.write_str(zero)?;
      } else {
        write!(f, "{}({})", prim_name(p), zero)?;
      }
    }

    NodeKind::Construct { args } => write!(f, "{}({})", type_name(ctx, node.ty)?, args_list(ctx, args)?)?,

    NodeKind::Call { fun, args } => write!(f, "{}({})", ctx.function_name(*fun)?, args_list(ctx, args)?)?,

    NodeKind::Intrinsic { fun, args } if fun.is_texture() => write_texture_call(f, ctx, *fun, args)?,
    NodeKind::Intrinsic { fun, args } => write!(f, "{}({})", fun.glsl_name(), args_list(ctx, args)?)?,

    NodeKind::AddressOf(_) | NodeKind::Deref(_) => {
      return Err(ShaderError::internal("pointers have no GLSL ES spelling"));
    }
  }

  Ok(())
}

fn args_list(ctx: &WriteContext, args: &[NodeId]) -> Result<String> {
  Ok(args.iter().map(|&a| expr(ctx, a)).collect::<Result<Vec<_>>>()?.join(", "))
}

fn write_literal(f: &mut String, lit: Literal) -> Result<()> {
  match lit {
    Literal::Bool(b) => write!(f, "{}", b)?,
    // 2147483648 overflows before being negated
    Literal::I32(i32::MIN) => f.write_str("(-2147483647 - 1)")?,
    Literal::I32(i) => write!(f, "{}", i)?,
    Literal::U32(u) => write!(f, "{}u", u)?,
    Literal::F32(x) | Literal::F16(x) => f.write_str(&float_literal(x))?,
  }

  Ok(())
}

fn write_var(f: &mut String, ctx: &WriteContext, v: VarId) -> Result<()> {
  let var = ctx.var(v);

  match var.kind {
    VarKind::Uniform { .. } => write!(f, "{}.{}", ctx.record(v)?.name, var.name)?,

    VarKind::Output { location } if ctx.target == Target::WebGL && ctx.stage.stage == ShaderStage::Fragment => {
      if ctx.stage.outputs.len() == 1 {
        f.write_str("gl_FragColor")?;
      } else {
        write!(f, "gl_FragData[{}]", location)?;
      }
    }

    _ => f.write_str(&var.name)?,
  }

  Ok(())
}

/// Same shape as `p`, with float components.
fn float_shape(p: PrimitiveType) -> String {
  prim_name(p.with_scalar(ScalarKind::F32))
}

fn binary(
  ctx: &WriteContext,
  op: BinaryOp,
  l: &str,
  l_ty: TypeHandle,
  r: &str,
  r_ty: TypeHandle,
  ty: TypeHandle,
) -> Result<String> {
  let (lp, rp) = match (ctx.types.primitive(l_ty), ctx.types.primitive(r_ty)) {
    (Some(lp), Some(rp)) => (lp, rp),
    _ => return Err(ShaderError::internal("binary operator on non-primitive operands")),
  };

  if op.is_comparison() && lp.is_vector() {
    let name = match op {
      BinaryOp::Eq => "equal",
      BinaryOp::Ne => "notEqual",
      BinaryOp::Lt => "lessThan",
      BinaryOp::Le => "lessThanEqual",
      BinaryOp::Gt => "greaterThan",
      _ => "greaterThanEqual",
    };

    return Ok(format!("{}({}, {})", name, l, r));
  }

  if op == BinaryOp::Rem {
    if lp.scalar.is_float() {
      return Ok(format!("mod({}, {})", l, r));
    }

    // no integer remainder in GLSL ES 1.00
    if ctx.target == Target::WebGL {
      let result = ctx
        .types
        .primitive(ty)
        .ok_or_else(|| ShaderError::internal("remainder of non-primitive type"))?;

      return Ok(format!(
        "{}(mod({}({}), {}({})))",
        prim_name(result),
        float_shape(lp),
        l,
        float_shape(rp),
        r
      ));
    }
  }

  Ok(format!("({} {} {})", l, op.symbol(), r))
}

fn write_texture_call(f: &mut String, ctx: &WriteContext, fun: Intrinsic, args: &[NodeId]) -> Result<()> {
  let (texture, rest) = args
    .split_first()
    .ok_or_else(|| ShaderError::internal("texture built-in without a texture"))?;

  let t = ctx
    .types
    .texture(ctx.node(*texture).ty)
    .ok_or_else(|| ShaderError::internal("texture built-in on a non-texture"))?;

  let tex = expr(ctx, *texture)?;
  let rest = rest.iter().map(|&a| expr(ctx, a)).collect::<Result<Vec<_>>>()?;
  let unsupported = || ShaderError::internal(format!("{:?} on {:?} has no {} spelling", fun, t, ctx.target));

  if ctx.target == Target::WebGL {
    let base = if t.dimension == TextureViewDimension::Cube {
      "textureCube"
    } else {
      "texture2D"
    };

    match (fun, rest.as_slice()) {
      (Intrinsic::TextureSample, [c]) => write!(f, "{}({}, {})", base, tex, c)?,

      (Intrinsic::TextureSampleLevel, [c, level]) => {
        let suffix = if ctx.stage.stage == ShaderStage::Fragment {
          "LodEXT"
        } else {
          "Lod"
        };

        write!(f, "{}{}({}, {}, {})", base, suffix, tex, c, level)?;
      }

      // depth textures are plain textures on WebGL
      (Intrinsic::TextureSampleCompare, [c, depth_ref]) => {
        write!(f, "step({}, {}({}, {}).r)", depth_ref, base, tex, c)?
      }

      _ => return Err(unsupported()),
    }

    return Ok(());
  }

  let layered = |c: &str, layer: &str| format!("vec{}({}, float({}))", t.coord_components() + 1, c, layer);

  match (fun, rest.as_slice()) {
    (Intrinsic::TextureSample, [c]) => write!(f, "texture({}, {})", tex, c)?,
    (Intrinsic::TextureSample, [c, layer]) => write!(f, "texture({}, {})", tex, layered(c.as_str(), layer.as_str()))?,

    (Intrinsic::TextureSampleLevel, [c, level]) => write!(f, "textureLod({}, {}, {})", tex, c, level)?,
    (Intrinsic::TextureSampleLevel, [c, layer, level]) => {
      write!(f, "textureLod({}, {}, {})", tex, layered(c.as_str(), layer.as_str()), level)?
    }

    // the reference is the last coordinate of shadow lookups
    (Intrinsic::TextureSampleCompare, [c, depth_ref]) => {
      write!(f, "texture({}, vec{}({}, {}))", tex, t.coord_components() + 1, c, depth_ref)?
    }
    (Intrinsic::TextureSampleCompare, [c, layer, depth_ref]) => {
      write!(f, "texture({}, vec4({}, float({}), {}))", tex, c, layer, depth_ref)?
    }

    (Intrinsic::TextureLoad, [c, level]) => write!(f, "texelFetch({}, {}, {})", tex, c, level)?,
    (Intrinsic::TextureLoad, [c, layer, level]) => {
      write!(f, "texelFetch({}, ivec3({}, {}), {})", tex, c, layer, level)?
    }

    (Intrinsic::TextureDimensions, rest) => {
      let level = rest.first().map_or("0", String::as_str);
      let swizzle = if t.is_array() { ".xy" } else { "" };
      write!(f, "textureSize({}, {}){}", tex, level, swizzle)?
    }

    _ => return Err(unsupported()),
  }

  Ok(())
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn primitive_names() {
    assert_eq!(prim_name(PrimitiveType::scalar(ScalarKind::U32)), "uint");
    assert_eq!(prim_name(PrimitiveType::vector(ScalarKind::Bool, 3)), "bvec3");
    assert_eq!(prim_name(PrimitiveType::matrix(ScalarKind::F32, 4, 4)), "mat4");
    assert_eq!(prim_name(PrimitiveType::matrix(ScalarKind::F32, 2, 3)), "mat2x3");
  }

  #[test]
  fn depth_samplers_per_target() {
    let depth = TextureType::new(TextureViewDimension::D2, TextureSampleType::Depth);
    assert_eq!(sampler_type(Target::WebGL, depth).unwrap(), "sampler2D");
    assert_eq!(sampler_type(Target::WebGL2, depth).unwrap(), "sampler2DShadow");

    let cube_array = TextureType::new(TextureViewDimension::CubeArray, TextureSampleType::Float);
    assert!(sampler_type(Target::WebGL2, cube_array).is_err());
  }
}

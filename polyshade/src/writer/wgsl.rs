//! WGSL writer.
//!
//! Stage inputs and outputs are gathered in per-stage structs. The user `main` becomes `stage_main`, operating on
//! private copies of those structs; the actual entry point copies them in and out.

use super::{float_literal, WriteContext};
use crate::{
  ast::{BinaryOp, FunId, Literal, NodeId, NodeKind, Stmt, UnaryOp, VarId, VarKind},
  builtin::BuiltinVar,
  error::{Result, ShaderError},
  stage::ShaderStage,
  stdlib::Intrinsic,
  types::{
    layout::{matrix_stride_align, vector_size_align},
    AddressSpace, LayoutPolicy, PrimitiveType, SamplerKind, ScalarKind, TextureSampleType, TextureType,
    TextureViewDimension, TypeHandle, TypeKind,
  },
  uniform::ResourceKind,
};
use indexmap::IndexSet;
use std::fmt::Write as _;

/// Member of a stage input or output struct.
struct IoMember {
  attribute: String,
  name: String,
  ty: String,
}

pub(super) fn write_stage(f: &mut String, ctx: &WriteContext, structs: &[TypeHandle]) -> Result<()> {
  if ctx.types.contains_scalar(ScalarKind::F16) {
    f.write_str("enable f16;\n\n")?;
  }

  for p in padded_primitives(ctx, structs) {
    write_padded_primitive(f, ctx, p)?;
  }

  for &ty in structs {
    write_struct(f, ctx, ty)?;
  }

  let (input_name, output_name) = match ctx.stage.stage {
    ShaderStage::Vertex => ("VertexInput", "VertexOutput"),
    ShaderStage::Fragment => ("FragmentInput", "FragmentOutput"),
    ShaderStage::Compute => ("ComputeInput", "ComputeOutput"),
  };

  let inputs = input_members(ctx)?;
  let outputs = output_members(ctx)?;
  write_io_struct(f, input_name, &inputs)?;
  write_io_struct(f, output_name, &outputs)?;

  for &c in &ctx.stage.constants {
    let var = ctx.var(c);
    let init = var
      .init
      .ok_or_else(|| ShaderError::internal(format!("constant `{}` has no value", var.name)))?;

    writeln!(f, "const {}: {} = {};", var.name, type_name(ctx, var.ty)?, expr(ctx, init)?)?;
  }

  write_resources(f, ctx)?;

  if !inputs.is_empty() {
    writeln!(f, "var<private> stage_in: {};", input_name)?;
  }

  if !outputs.is_empty() {
    writeln!(f, "var<private> stage_out: {};", output_name)?;
  }

  for (id, fun) in ctx.stage.functions.iter().enumerate() {
    f.write_str("\n")?;

    let params = fun
      .params
      .iter()
      .map(|&p| Ok(format!("{}: {}", ctx.var(p).name, type_name(ctx, ctx.var(p).ty)?)))
      .collect::<Result<Vec<_>>>()?;

    let name = ctx.function_name(FunId(id as u32))?;
    write!(f, "fn {}({})", name, params.join(", "))?;

    if !ctx.types.is_void(fun.return_ty) {
      write!(f, " -> {}", type_name(ctx, fun.return_ty)?)?;
    }

    f.write_str(" {\n")?;
    write_block(f, ctx, &fun.body, 1)?;
    f.write_str("}\n")?;
  }

  let main = ctx
    .stage
    .main
    .as_ref()
    .ok_or_else(|| ShaderError::internal("rendering a stage without main"))?;

  f.write_str("\nfn stage_main() {\n")?;
  write_block(f, ctx, main, 1)?;
  f.write_str("}\n\n")?;

  write_entry_point(f, ctx, (input_name, &inputs), (output_name, &outputs))
}

fn write_struct(f: &mut String, ctx: &WriteContext, ty: TypeHandle) -> Result<()> {
  let s = ctx
    .types
    .struct_type(ty)
    .ok_or_else(|| ShaderError::internal("declaring a non-struct type as a struct"))?;

  writeln!(f, "struct {} {{", s.name)?;
  for (i, (member, &offset)) in s.members.iter().zip(&s.layout.offsets).enumerate() {
    if s.policy == LayoutPolicy::Packed {
      writeln!(f, "{}{}: {},", ctx.indent(1), member.name, type_name(ctx, member.ty)?)?;
      continue;
    }

    let (size, align) = ctx.types.size_align(member.ty, LayoutPolicy::Std140)?;
    let natural_align = ctx.types.size_align(member.ty, LayoutPolicy::Packed)?.1;
    let mut attributes = String::new();

    // the first member carries the 16 byte alignment of the whole struct
    if (align == 16 || i == 0) && natural_align < 16 {
      attributes.push_str("@align(16) ");
    }

    // the last member carries the tail padding
    let last = i + 1 == s.members.len();
    if last && !ctx.types.is_runtime_sized(member.ty) && s.layout.size - offset != size {
      write!(attributes, "@size({}) ", s.layout.size - offset)?;
    }

    writeln!(
      f,
      "{}{}{}: {},",
      ctx.indent(1),
      attributes,
      member.name,
      std140_type_name(ctx, member.ty)?
    )?;
  }
  f.write_str("}\n\n")?;

  Ok(())
}

/// Whether `p`, as an element of a std140 array, needs padding to reach a 16 byte stride.
fn padded_element(p: PrimitiveType) -> bool {
  let (size, align) = vector_size_align(p);
  !p.is_matrix() && (size + align - 1) / align * align % 16 != 0
}

/// Whether the columns of matrix `p` need padding to reach a 16 byte stride.
fn padded_matrix(p: PrimitiveType) -> bool {
  p.is_matrix() && matrix_stride_align(p, LayoutPolicy::Packed).0 % 16 != 0
}

/// Whether a std140 value of type `ty` is spelled with padding wrappers.
fn std140_padded(ctx: &WriteContext, ty: TypeHandle) -> bool {
  match ctx.types.kind(ty) {
    TypeKind::Primitive(p) => padded_matrix(*p),
    TypeKind::Array { element, .. } => match ctx.types.kind(*element) {
      TypeKind::Primitive(p) if !p.is_matrix() => padded_element(*p),
      _ => std140_padded(ctx, *element),
    },
    _ => false,
  }
}

fn padded_name(p: PrimitiveType) -> String {
  format!("Std140_{}", prim_name(p).replace('<', "_").replace('>', ""))
}

/// Primitives wrapped by the std140 structs of the stage, in first use order.
fn padded_primitives(ctx: &WriteContext, structs: &[TypeHandle]) -> IndexSet<PrimitiveType> {
  fn visit(ctx: &WriteContext, ty: TypeHandle, found: &mut IndexSet<PrimitiveType>) {
    let padded = match ctx.types.kind(ty) {
      TypeKind::Primitive(p) if padded_matrix(*p) => *p,

      TypeKind::Array { element, .. } => match ctx.types.kind(*element) {
        TypeKind::Primitive(p) if !p.is_matrix() && padded_element(*p) => *p,
        _ => return visit(ctx, *element, found),
      },

      _ => return,
    };

    found.insert(padded);
  }

  let mut found = IndexSet::new();
  for s in structs.iter().filter_map(|&ty| ctx.types.struct_type(ty)) {
    if s.policy == LayoutPolicy::Std140 {
      for member in &s.members {
        visit(ctx, member.ty, &mut found);
      }
    }
  }

  found
}

/// Scalars and vectors are padded to 16 bytes; matrices get one padded member per column.
fn write_padded_primitive(f: &mut String, ctx: &WriteContext, p: PrimitiveType) -> Result<()> {
  writeln!(f, "struct {} {{", padded_name(p))?;

  if p.is_matrix() {
    let column = prim_name(p.element());
    for c in 0..p.cols {
      writeln!(f, "{}@size(16) c{}: {},", ctx.indent(1), c, column)?;
    }
  } else {
    writeln!(f, "{}@size(16) v: {},", ctx.indent(1), prim_name(p))?;
  }

  f.write_str("}\n\n")?;
  Ok(())
}

/// Spelling of `ty` as a member of a std140 struct.
fn std140_type_name(ctx: &WriteContext, ty: TypeHandle) -> Result<String> {
  match ctx.types.kind(ty) {
    TypeKind::Primitive(p) if padded_matrix(*p) => Ok(padded_name(*p)),

    TypeKind::Array { element, len } => {
      let element = match ctx.types.kind(*element) {
        TypeKind::Primitive(p) if !p.is_matrix() && padded_element(*p) => padded_name(*p),
        _ => std140_type_name(ctx, *element)?,
      };

      match *len {
        0 => Ok(format!("array<{}>", element)),
        len => Ok(format!("array<{}, {}>", element, len)),
      }
    }

    _ => type_name(ctx, ty),
  }
}

/// Whether `id` designates a value stored under std140 rules: a uniform, a member of a std140 struct, or an element
/// of a padded std140 value.
fn std140_place(ctx: &WriteContext, id: NodeId) -> bool {
  match &ctx.node(id).kind {
    NodeKind::Var(v) => matches!(ctx.var(*v).kind, VarKind::Uniform { .. }),

    NodeKind::Member { base, .. } => ctx
      .types
      .struct_type(ctx.node(*base).ty)
      .map_or(false, |s| s.policy == LayoutPolicy::Std140),

    NodeKind::Index { base, .. } => padded_place(ctx, *base),
    _ => false,
  }
}

/// Whether `id` renders with padding wrappers, and must be converted before being used as a value.
fn padded_place(ctx: &WriteContext, id: NodeId) -> bool {
  std140_place(ctx, id) && std140_padded(ctx, ctx.node(id).ty)
}

/// Rebuild a plain value of type `ty` from its padded spelling `place`.
fn std140_load(ctx: &WriteContext, ty: TypeHandle, place: &str) -> Result<String> {
  match ctx.types.kind(ty) {
    TypeKind::Primitive(p) if padded_matrix(*p) => {
      let columns = (0..p.cols).map(|c| format!("{}.c{}", place, c)).collect::<Vec<_>>();
      Ok(format!("{}({})", prim_name(*p), columns.join(", ")))
    }

    TypeKind::Array { len: 0, .. } => Err(ShaderError::type_error(
      "runtime-sized arrays padded under std140 can only be indexed",
    )),

    TypeKind::Array { element, len } => {
      let items = (0..*len)
        .map(|k| {
          let item = format!("{}[{}]", place, k);

          match ctx.types.kind(*element) {
            TypeKind::Primitive(p) if !p.is_matrix() => Ok(format!("{}.v", item)),
            _ => std140_load(ctx, *element, &item),
          }
        })
        .collect::<Result<Vec<_>>>()?;

      Ok(format!("{}({})", type_name(ctx, ty)?, items.join(", ")))
    }

    _ => Ok(place.to_owned()),
  }
}

/// Pad a plain value of type `ty` so that it can be stored under std140 rules.
fn std140_store(ctx: &WriteContext, ty: TypeHandle, value: &str) -> Result<String> {
  match ctx.types.kind(ty) {
    TypeKind::Primitive(p) if padded_matrix(*p) => {
      let columns = (0..p.cols).map(|c| format!("{}[{}]", value, c)).collect::<Vec<_>>();
      Ok(format!("{}({})", padded_name(*p), columns.join(", ")))
    }

    TypeKind::Array { len: 0, .. } => Err(ShaderError::type_error(
      "runtime-sized arrays padded under std140 can only be indexed",
    )),

    TypeKind::Array { element, len } => {
      let items = (0..*len)
        .map(|k| {
          let item = format!("{}[{}]", value, k);

          match ctx.types.kind(*element) {
            TypeKind::Primitive(p) if !p.is_matrix() => Ok(format!("{}({})", padded_name(*p), item)),
            _ => std140_store(ctx, *element, &item),
          }
        })
        .collect::<Result<Vec<_>>>()?;

      Ok(format!("{}({})", std140_type_name(ctx, ty)?, items.join(", ")))
    }

    _ => Ok(value.to_owned()),
  }
}

fn literal_index(ctx: &WriteContext, id: NodeId) -> Option<u32> {
  match ctx.node(id).kind {
    NodeKind::Literal(Literal::I32(i)) => u32::try_from(i).ok(),
    NodeKind::Literal(Literal::U32(u)) => Some(u),
    _ => None,
  }
}

fn builtin_member(ctx: &WriteContext, b: BuiltinVar) -> IoMember {
  IoMember {
    attribute: format!("@builtin({})", b.wgsl_name()),
    name: b.member_name(),
    ty: prim_name(b.prim(ctx.target)),
  }
}

/// `inter_stage` members are interpolated; integer ones must be flat.
fn location_member(
  ctx: &WriteContext,
  location: u32,
  name: &str,
  ty: TypeHandle,
  inter_stage: bool,
) -> Result<IoMember> {
  let flat = ctx.types.primitive(ty).map_or(false, |p| p.scalar.is_integer());
  let interpolation = if flat && inter_stage { " @interpolate(flat)" } else { "" };

  Ok(IoMember {
    attribute: format!("@location({}){}", location, interpolation),
    name: name.to_owned(),
    ty: type_name(ctx, ty)?,
  })
}

fn input_members(ctx: &WriteContext) -> Result<Vec<IoMember>> {
  let mut members = Vec::new();

  for &v in &ctx.stage.inputs {
    let var = ctx.var(v);
    let location = match var.kind {
      VarKind::Input { location, .. } => location,
      _ => return Err(ShaderError::internal(format!("`{}` is not an input", var.name))),
    };

    let inter_stage = ctx.stage.stage == ShaderStage::Fragment;
    members.push(location_member(ctx, location, &var.name, var.ty, inter_stage)?);
  }

  for &b in ctx.stage.builtins.keys() {
    if !b.is_output() {
      members.push(builtin_member(ctx, b));
    }
  }

  Ok(members)
}

fn output_members(ctx: &WriteContext) -> Result<Vec<IoMember>> {
  let mut members = Vec::new();

  // the clip position is mandatory, even when never written
  if ctx.stage.stage == ShaderStage::Vertex {
    members.push(builtin_member(ctx, BuiltinVar::Position));
  }

  for &v in &ctx.stage.outputs {
    let var = ctx.var(v);
    let location = match var.kind {
      VarKind::Output { location } => location,
      _ => return Err(ShaderError::internal(format!("`{}` is not an output", var.name))),
    };

    let inter_stage = ctx.stage.stage == ShaderStage::Vertex;
    members.push(location_member(ctx, location, &var.name, var.ty, inter_stage)?);
  }

  for &b in ctx.stage.builtins.keys() {
    if b.is_output() && b != BuiltinVar::Position {
      members.push(builtin_member(ctx, b));
    }
  }

  Ok(members)
}

fn write_io_struct(f: &mut String, name: &str, members: &[IoMember]) -> Result<()> {
  if members.is_empty() {
    return Ok(());
  }

  writeln!(f, "struct {} {{", name)?;
  for m in members {
    writeln!(f, "  {} {}: {},", m.attribute, m.name, m.ty)?;
  }
  f.write_str("}\n\n")?;

  Ok(())
}

fn write_resources(f: &mut String, ctx: &WriteContext) -> Result<()> {
  for record in ctx.plan.visible_from(ctx.stage.stage) {
    write!(f, "@group({}) @binding({}) ", record.group, record.binding)?;

    match record.kind {
      ResourceKind::UniformBlock(ty) => writeln!(f, "var<uniform> {}: {};", record.name, type_name(ctx, ty)?)?,

      ResourceKind::StorageBuffer { ty, read_only } => {
        let access = if read_only { "read" } else { "read_write" };
        writeln!(f, "var<storage, {}> {}: {};", access, record.name, type_name(ctx, ty)?)?;
      }

      ResourceKind::Texture(t) => writeln!(f, "var {}: {};", record.name, texture_name(t))?,
      ResourceKind::Sampler(kind) => writeln!(f, "var {}: {};", record.name, sampler_name(kind))?,
    }
  }

  for &v in &ctx.stage.resources {
    let var = ctx.var(v);
    if var.kind == VarKind::Workgroup {
      writeln!(f, "var<workgroup> {}: {};", var.name, type_name(ctx, var.ty)?)?;
    }
  }

  Ok(())
}

fn write_entry_point(
  f: &mut String,
  ctx: &WriteContext,
  (input_name, inputs): (&str, &[IoMember]),
  (output_name, outputs): (&str, &[IoMember]),
) -> Result<()> {
  match ctx.stage.stage {
    ShaderStage::Vertex => f.write_str("@vertex\n")?,
    ShaderStage::Fragment => f.write_str("@fragment\n")?,
    ShaderStage::Compute => {
      let [x, y, z] = ctx.stage.workgroup_size;
      writeln!(f, "@compute @workgroup_size({}, {}, {})", x, y, z)?;
    }
  }

  f.write_str("fn main(")?;
  if !inputs.is_empty() {
    write!(f, "input: {}", input_name)?;
  }
  f.write_str(")")?;

  if !outputs.is_empty() {
    write!(f, " -> {}", output_name)?;
  }

  f.write_str(" {\n")?;

  if !inputs.is_empty() {
    f.write_str("  stage_in = input;\n")?;
  }

  f.write_str("  stage_main();\n")?;

  if !outputs.is_empty() {
    f.write_str("  return stage_out;\n")?;
  }

  f.write_str("}\n")?;
  Ok(())
}

fn prim_name(p: PrimitiveType) -> String {
  if p.is_matrix() {
    format!("mat{}x{}<{}>", p.cols, p.rows, p.scalar.name())
  } else if p.is_vector() {
    format!("vec{}<{}>", p.rows, p.scalar.name())
  } else {
    p.scalar.name().to_owned()
  }
}

fn texture_name(t: TextureType) -> String {
  use TextureSampleType::*;
  use TextureViewDimension::*;

  if t.is_depth() {
    let dim = match (t.dimension, t.multisampled) {
      (D2, true) => "multisampled_2d",
      (D2, false) => "2d",
      (D2Array, _) => "2d_array",
      (Cube, _) => "cube",
      (CubeArray, _) => "cube_array",
      (D3, _) => "3d",
    };

    return format!("texture_depth_{}", dim);
  }

  let dim = match (t.dimension, t.multisampled) {
    (D2, true) => "multisampled_2d",
    (D2, false) => "2d",
    (D2Array, _) => "2d_array",
    (Cube, _) => "cube",
    (CubeArray, _) => "cube_array",
    (D3, _) => "3d",
  };

  let scalar = match t.sample_type {
    Sint => "i32",
    Uint => "u32",
    Float | UnfilterableFloat | Depth => "f32",
  };

  format!("texture_{}<{}>", dim, scalar)
}

fn sampler_name(kind: SamplerKind) -> &'static str {
  match kind {
    SamplerKind::Comparison => "sampler_comparison",
    SamplerKind::Filtering | SamplerKind::NonFiltering => "sampler",
  }
}

fn type_name(ctx: &WriteContext, ty: TypeHandle) -> Result<String> {
  let name = match ctx.types.kind(ty) {
    TypeKind::Void => return Err(ShaderError::internal("void has no WGSL spelling")),
    TypeKind::Primitive(p) => prim_name(*p),
    TypeKind::Array { element, len: 0 } => format!("array<{}>", type_name(ctx, *element)?),
    TypeKind::Array { element, len } => format!("array<{}, {}>", type_name(ctx, *element)?, len),
    TypeKind::Struct(s) => s.name.clone(),

    TypeKind::Pointer {
      pointee,
      space: space @ AddressSpace::Storage,
    } => format!("ptr<{}, {}, read_write>", space.name(), type_name(ctx, *pointee)?),

    TypeKind::Pointer { pointee, space } => format!("ptr<{}, {}>", space.name(), type_name(ctx, *pointee)?),
    TypeKind::Texture(t) => texture_name(*t),
    TypeKind::Sampler(kind) => sampler_name(*kind).to_owned(),
  };

  Ok(name)
}

fn write_block(f: &mut String, ctx: &WriteContext, block: &[Stmt], level: usize) -> Result<()> {
  for stmt in block {
    f.write_str(&ctx.indent(level))?;

    match stmt {
      Stmt::Declare { var, init } => {
        let var = ctx.var(*var);
        write!(f, "var {}: {}", var.name, type_name(ctx, var.ty)?)?;

        if let Some(init) = init {
          write!(f, " = {}", expr(ctx, *init)?)?;
        }

        f.write_str(";\n")?;
      }

      Stmt::Assign { target, op, value } if padded_place(ctx, *target) => {
        let ty = ctx.node(*target).ty;
        let t = place(ctx, *target)?;
        let v = expr(ctx, *value)?;
        let v = match op {
          None => v,
          Some(op) => format!("({} {} {})", std140_load(ctx, ty, &t)?, op.symbol(), v),
        };

        writeln!(f, "{} = {};", t, std140_store(ctx, ty, &v)?)?;
      }

      Stmt::Assign { target, op, value } => {
        let t = expr(ctx, *target)?;
        let v = expr(ctx, *value)?;

        match op {
          None => writeln!(f, "{} = {};", t, v)?,

          Some(op @ (BinaryOp::And | BinaryOp::Or)) => writeln!(f, "{} = ({} {} {});", t, t, op.symbol(), v)?,

          Some(op @ (BinaryOp::Shl | BinaryOp::Shr)) => {
            writeln!(f, "{} {}= {};", t, op.symbol(), shift_amount(ctx, *value, v)?)?
          }

          Some(op) => writeln!(f, "{} {}= {};", t, op.symbol(), v)?,
        }
      }

      Stmt::Eval(node) => {
        let e = expr(ctx, *node)?;

        if ctx.types.is_void(ctx.node(*node).ty) {
          writeln!(f, "{};", e)?;
        } else {
          writeln!(f, "_ = {};", e)?;
        }
      }

      Stmt::If { branches, otherwise } => {
        for (i, (cond, body)) in branches.iter().enumerate() {
          if i > 0 {
            f.write_str(" else ")?;
          }

          writeln!(f, "if {} {{", expr(ctx, *cond)?)?;
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
          "for (var {}: {} = {}; ({} < {}); {}++) {{",
          var.name,
          type_name(ctx, var.ty)?,
          expr(ctx, *start)?,
          var.name,
          expr(ctx, *end)?,
          var.name
        )?;
        write_block(f, ctx, body, level + 1)?;
        writeln!(f, "{}}}", ctx.indent(level))?;
      }

      Stmt::While { cond, body } => {
        writeln!(f, "while {} {{", expr(ctx, *cond)?)?;
        write_block(f, ctx, body, level + 1)?;
        writeln!(f, "{}}}", ctx.indent(level))?;
      }

      Stmt::DoWhile { body, cond } => {
        f.write_str("loop {\n")?;
        write_block(f, ctx, body, level + 1)?;

        let inner = ctx.indent(level + 1);
        writeln!(f, "{}continuing {{", inner)?;
        writeln!(f, "{}{}break if !({});", inner, ctx.indent(1), expr(ctx, *cond)?)?;
        writeln!(f, "{}}}", inner)?;
        writeln!(f, "{}}}", ctx.indent(level))?;
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
  let rendered = place(ctx, id)?;

  if padded_place(ctx, id) {
    std140_load(ctx, ctx.node(id).ty, &rendered)
  } else {
    Ok(rendered)
  }
}

/// Render `id` as is, keeping the padded spelling of std140 values.
fn place(ctx: &WriteContext, id: NodeId) -> Result<String> {
  let mut s = String::new();
  write_expr(&mut s, ctx, id)?;
  Ok(s)
}

fn write_expr(f: &mut String, ctx: &WriteContext, id: NodeId) -> Result<()> {
  let node = ctx.node(id);

  match &node.kind {
    NodeKind::Literal(lit) => write_literal(f, *lit)?,
    NodeKind::Var(v) => write_var(f, ctx, *v)?,

    NodeKind::Builtin(b) => {
      let io = if b.is_output() { "stage_out" } else { "stage_in" };
      write!(f, "{}.{}", io, b.member_name())?;
    }

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
    NodeKind::Index { base, index } if padded_place(ctx, *base) => {
      let base_ty = ctx.node(*base).ty;
      let padded = place(ctx, *base)?;
      let i = expr(ctx, *index)?;

      match ctx.types.kind(base_ty) {
        TypeKind::Primitive(_) => match literal_index(ctx, *index) {
          Some(column) => write!(f, "{}.c{}", padded, column)?,
          None => write!(f, "{}[{}]", std140_load(ctx, base_ty, &padded)?, i)?,
        },

        TypeKind::Array { element, .. } => match ctx.types.kind(*element) {
          TypeKind::Primitive(p) if !p.is_matrix() => write!(f, "{}[{}].v", padded, i)?,
          _ => write!(f, "{}[{}]", padded, i)?,
        },

        _ => return Err(ShaderError::internal("indexing a value that is neither an array nor a matrix")),
      }
    }

    NodeKind::Index { base, index } => write!(f, "{}[{}]", expr(ctx, *base)?, expr(ctx, *index)?)?,

    NodeKind::Unary { op, operand } => {
      let e = expr(ctx, *operand)?;

      match op {
        UnaryOp::Neg => write!(f, "-({})", e)?,
        UnaryOp::Not => write!(f, "!({})", e)?,
        UnaryOp::BitNot => write!(f, "~({})", e)?,
      }
    }

    NodeKind::Binary { op, lhs, rhs } => {
      let l = expr(ctx, *lhs)?;
      let r = expr(ctx, *rhs)?;

      match op {
        BinaryOp::Shl | BinaryOp::Shr => write!(f, "({} {} {})", l, op.symbol(), shift_amount(ctx, *rhs, r)?)?,
        _ => write!(f, "({} {} {})", l, op.symbol(), r)?,
      }
    }

    NodeKind::Construct { args } => match ctx.types.struct_type(node.ty) {
      Some(s) if s.policy == LayoutPolicy::Std140 => {
        let args = args
          .iter()
          .zip(&s.members)
          .map(|(&arg, member)| {
            let value = expr(ctx, arg)?;

            if std140_padded(ctx, member.ty) {
              std140_store(ctx, member.ty, &value)
            } else {
              Ok(value)
            }
          })
          .collect::<Result<Vec<_>>>()?;

        write!(f, "{}({})", s.name, args.join(", "))?
      }

      _ => write!(f, "{}({})", type_name(ctx, node.ty)?, args_list(ctx, args)?)?,
    },

    NodeKind::Call { fun, args } => write!(f, "{}({})", ctx.function_name(*fun)?, args_list(ctx, args)?)?,

    NodeKind::Intrinsic { fun, args } if fun.is_texture() => write_texture_call(f, ctx, *fun, args)?,

    NodeKind::Intrinsic {
      fun: Intrinsic::Mod,
      args,
    } => match args.as_slice() {
      [x, y] => {
        let (x, y) = (expr(ctx, *x)?, expr(ctx, *y)?);
        write!(f, "({} - {} * floor({} / {}))", x, y, x, y)?;
      }

      _ => return Err(ShaderError::internal("mod takes two arguments")),
    },

    NodeKind::Intrinsic { fun, args } => write!(f, "{}({})", fun.wgsl_name(), args_list(ctx, args)?)?,

    NodeKind::AddressOf(inner) if padded_place(ctx, *inner) => {
      return Err(ShaderError::type_error(
        "cannot take the address of an array or matrix padded under std140",
      ))
    }

    NodeKind::AddressOf(inner) => write!(f, "&{}", expr(ctx, *inner)?)?,
    NodeKind::Deref(inner) => write!(f, "(*{})", expr(ctx, *inner)?)?,
  }

  Ok(())
}

fn args_list(ctx: &WriteContext, args: &[NodeId]) -> Result<String> {
  Ok(args.iter().map(|&a| expr(ctx, a)).collect::<Result<Vec<_>>>()?.join(", "))
}

/// Shift amounts are unsigned in WGSL.
fn shift_amount(ctx: &WriteContext, rhs: NodeId, rendered: String) -> Result<String> {
  match ctx.types.primitive(ctx.node(rhs).ty) {
    Some(p) if p.scalar == ScalarKind::I32 => {
      Ok(format!("{}({})", prim_name(p.with_scalar(ScalarKind::U32)), rendered))
    }
    _ => Ok(rendered),
  }
}

fn write_literal(f: &mut String, lit: Literal) -> Result<()> {
  match lit {
    Literal::Bool(b) => write!(f, "{}", b)?,
    // 2147483648i is out of range
    Literal::I32(i32::MIN) => f.write_str("i32(-2147483648)")?,
    Literal::I32(i) => write!(f, "{}i", i)?,
    Literal::U32(u) => write!(f, "{}u", u)?,
    Literal::F32(x) => f.write_str(&float_literal(x))?,
    Literal::F16(x) => write!(f, "{}h", float_literal(x))?,
  }

  Ok(())
}

fn write_var(f: &mut String, ctx: &WriteContext, v: VarId) -> Result<()> {
  let var = ctx.var(v);

  match var.kind {
    VarKind::Uniform { .. } => write!(f, "{}.{}", ctx.record(v)?.name, var.name)?,
    VarKind::Input { .. } => write!(f, "stage_in.{}", var.name)?,
    VarKind::Output { .. } => write!(f, "stage_out.{}", var.name)?,
    VarKind::Texture { .. } | VarKind::Sampler { .. } | VarKind::Storage { .. } => {
      f.write_str(&ctx.record(v)?.name)?
    }
    _ => f.write_str(&var.name)?,
  }

  Ok(())
}

fn write_texture_call(f: &mut String, ctx: &WriteContext, fun: Intrinsic, args: &[NodeId]) -> Result<()> {
  let (texture, rest) = args
    .split_first()
    .ok_or_else(|| ShaderError::internal("texture built-in without a texture"))?;

  let tex = expr(ctx, *texture)?;
  let rest = rest.iter().map(|&a| expr(ctx, a)).collect::<Result<Vec<_>>>()?;

  if matches!(fun, Intrinsic::TextureLoad | Intrinsic::TextureDimensions) {
    let mut all = vec![tex];
    all.extend(rest);
    write!(f, "{}({})", fun.wgsl_name(), all.join(", "))?;
    return Ok(());
  }

  let var = match ctx.node(*texture).kind {
    NodeKind::Var(v) => v,
    _ => return Err(ShaderError::internal("sampling a texture that is not a declaration")),
  };

  let sampler = ctx
    .plan
    .sampler_of(var)
    .ok_or_else(|| ShaderError::internal(format!("texture `{}` has no sampler", ctx.var(var).name)))?;

  let mut all = vec![tex, sampler.name.clone()];
  all.extend(rest);

  // implicit derivatives only exist in fragment shaders
  let fragment = ctx.stage.stage == ShaderStage::Fragment;
  let name = match fun {
    Intrinsic::TextureSample if fragment => "textureSample",
    Intrinsic::TextureSample => {
      all.push("0.0".to_owned());
      "textureSampleLevel"
    }
    Intrinsic::TextureSampleCompare if fragment => "textureSampleCompare",
    Intrinsic::TextureSampleCompare => "textureSampleCompareLevel",
    other => other.wgsl_name(),
  };

  write!(f, "{}({})", name, all.join(", "))?;
  Ok(())
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn texture_names() {
    let t = TextureType::new(TextureViewDimension::D2Array, TextureSampleType::Uint);
    assert_eq!(texture_name(t), "texture_2d_array<u32>");

    let depth = TextureType::new(TextureViewDimension::Cube, TextureSampleType::Depth);
    assert_eq!(texture_name(depth), "texture_depth_cube");

    let ms = TextureType::new(TextureViewDimension::D2, TextureSampleType::Float).multisampled();
    assert_eq!(texture_name(ms), "texture_multisampled_2d<f32>");
  }

  #[test]
  fn primitive_names() {
    assert_eq!(prim_name(PrimitiveType::matrix(ScalarKind::F32, 4, 3)), "mat4x3<f32>");
    assert_eq!(prim_name(PrimitiveType::vector(ScalarKind::I32, 2)), "vec2<i32>");
    assert_eq!(prim_name(PrimitiveType::scalar(ScalarKind::F16)), "f16");
  }

  #[test]
  fn literals() {
    let mut s = String::new();
    write_literal(&mut s, Literal::I32(-3)).unwrap();
    s.push(' ');
    write_literal(&mut s, Literal::I32(i32::MIN)).unwrap();
    s.push(' ');
    write_literal(&mut s, Literal::F16(0.5)).unwrap();
    assert_eq!(s, "-3i i32(-2147483648) 0.5h");
  }
}

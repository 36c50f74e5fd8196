//! Uniforms, textures, samplers and storage buffers, and their binding plan.
//!
//! Bindings are resolved in two phases once every stage is built:
//!
//! 1. Collect: resources are gathered by name across stages, each one tagged with the mask of the stages declaring
//!    it. The same name declared differently by two stages is an error.
//! 2. Resolve: plain uniforms are merged into one `std140` block per stage mask and group; then each group hands out
//!    dense binding indices, in first-registration order, to blocks, textures, samplers and storage buffers. On
//!    WebGPU, every texture is followed by an implicit sampler.

use crate::{
  ast::{NodeId, NodeKind, VarId, VarKind, Variable},
  bindings::{
    BindGroupLayout, BindGroupLayoutEntry, BindingResource, BufferBindingLayout, BufferBindingType, BufferLayout,
    BufferMember, SamplerBindingLayout, TextureBindingLayout,
  },
  error::{Result, ShaderError},
  expr::{Expr, Value},
  program::{ProgramBuilder, StageState},
  stage::{ShaderStage, StageMask},
  target::{Feature, Target},
  types::{
    LayoutPolicy, SamplerKind, StructMember, TextureSampleType, TextureType, TypeDesc, TypeHandle, TypeKind,
    TypeRegistry,
  },
};
use indexmap::IndexMap;
use std::collections::HashMap;

impl ProgramBuilder {
  /// Declare a uniform in bind group `group`.
  ///
  /// Plain uniforms are merged into uniform blocks; texture and sampler types are forwarded to
  /// [`uniform_texture`](ProgramBuilder::uniform_texture) and [`uniform_sampler`](ProgramBuilder::uniform_sampler).
  pub fn uniform(&mut self, name: &str, ty: &TypeDesc, group: u32) -> Result<Expr> {
    match ty {
      TypeDesc::Texture(t) => return self.uniform_texture(name, *t, group),
      TypeDesc::Sampler(kind) => return self.uniform_sampler(name, *kind, group),
      _ => (),
    }

    self.require_global_scope("uniforms")?;

    // uniforms end up in std140 blocks
    let ty = self.ty(ty)?;
    let ty = self.types.std140(ty)?;
    match self.types.kind(ty) {
      TypeKind::Primitive(_) | TypeKind::Struct(_) => (),
      TypeKind::Array { len, .. } if *len > 0 => (),
      _ => {
        return Err(ShaderError::type_error(format!(
          "uniform `{}` cannot have type {}",
          name,
          self.types.display(ty)
        )))
      }
    }

    self.declare_resource(name, ty, VarKind::Uniform { group })
  }

  /// Declare a texture in bind group `group`.
  pub fn uniform_texture(&mut self, name: &str, texture: TextureType, group: u32) -> Result<Expr> {
    self.require_global_scope("textures")?;

    let ty = self.ty(&TypeDesc::Texture(texture))?;

    if texture.is_depth() && self.target() == Target::WebGL {
      log::warn!(
        "depth texture `{}` is declared as a regular sampler on WebGL; comparisons are emulated",
        name
      );
    }

    self.declare_resource(name, ty, VarKind::Texture { group })
  }

  /// Declare an explicit sampler in bind group `group`.
  pub fn uniform_sampler(&mut self, name: &str, kind: SamplerKind, group: u32) -> Result<Expr> {
    self.target().require(Feature::ExplicitSampler)?;
    self.require_global_scope("samplers")?;

    let ty = self.ty(&TypeDesc::Sampler(kind))?;
    self.declare_resource(name, ty, VarKind::Sampler { group })
  }

  /// Declare a storage buffer in bind group `group`.
  pub fn storage(&mut self, name: &str, ty: &TypeDesc, group: u32, read_only: bool) -> Result<Expr> {
    self.target().require(Feature::StorageBuffer)?;
    self.require_global_scope("storage buffers")?;

    let ty = self.ty(ty)?;
    if !matches!(
      self.types.kind(ty),
      TypeKind::Primitive(_) | TypeKind::Struct(_) | TypeKind::Array { .. }
    ) {
      return Err(ShaderError::type_error(format!(
        "storage buffer `{}` cannot have type {}",
        name,
        self.types.display(ty)
      )));
    }

    self.declare_resource(name, ty, VarKind::Storage { group, read_only })
  }

  /// Declare a variable shared by the invocations of a compute workgroup.
  pub fn workgroup(&mut self, name: &str, ty: &TypeDesc) -> Result<Expr> {
    self.target().require(Feature::Workgroup)?;

    if self.stage_state()?.stage != ShaderStage::Compute {
      return Err(ShaderError::declaration("workgroup variables only exist in compute shaders"));
    }

    self.require_global_scope("workgroup variables")?;

    let ty = self.ty(ty)?;
    let sized = match self.types.kind(ty) {
      TypeKind::Primitive(_) | TypeKind::Struct(_) => true,
      TypeKind::Array { len, .. } => *len > 0,
      _ => false,
    };

    if !sized {
      return Err(ShaderError::type_error(format!(
        "workgroup variable `{}` cannot have type {}",
        name,
        self.types.display(ty)
      )));
    }

    self.declare_resource(name, ty, VarKind::Workgroup)
  }

  fn declare_resource(&mut self, name: &str, ty: TypeHandle, kind: VarKind) -> Result<Expr> {
    let (var, expr) = self.new_var(name, ty, kind)?;
    self.stage_state_mut()?.resources.push(var);
    log::trace!("declared resource `{}` ({:?})", name, kind);

    Ok(expr)
  }

  /// Declare a global constant.
  ///
  /// The value must only involve literals, constructors, operators and other constants.
  pub fn constant(&mut self, name: &str, value: impl Into<Value>) -> Result<Expr> {
    self.require_global_scope("constants")?;

    let value = self.lower(value.into(), None)?;
    if !self.is_const_expr(value.node) {
      return Err(ShaderError::declaration(format!(
        "the value of constant `{}` is not a constant expression",
        name
      )));
    }

    let (var, expr) = self.new_var(name, value.ty, VarKind::Constant)?;
    self.vars[var.0 as usize].init = Some(value.node);
    self.stage_state_mut()?.constants.push(var);

    Ok(expr)
  }

  fn is_const_expr(&self, node: NodeId) -> bool {
    match &self.node(node).kind {
      NodeKind::Literal(_) => true,
      NodeKind::Var(v) => self.var(*v).kind == VarKind::Constant,
      NodeKind::Member { base, .. } | NodeKind::Swizzle { base, .. } => self.is_const_expr(*base),
      NodeKind::Index { base, index } => self.is_const_expr(*base) && self.is_const_expr(*index),
      NodeKind::Unary { operand, .. } => self.is_const_expr(*operand),
      NodeKind::Binary { lhs, rhs, .. } => self.is_const_expr(*lhs) && self.is_const_expr(*rhs),
      NodeKind::Construct { args } => args.iter().all(|a| self.is_const_expr(*a)),
      _ => false,
    }
  }

  /// Set the workgroup size of the compute stage; defaults to `(1, 1, 1)`.
  pub fn workgroup_size(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
    let state = self.stage_state_mut()?;

    if state.stage != ShaderStage::Compute {
      return Err(ShaderError::declaration("only compute shaders have a workgroup size"));
    }

    if x == 0 || y == 0 || z == 0 {
      return Err(ShaderError::parameter(format!(
        "workgroup size ({}, {}, {}) has a null dimension",
        x, y, z
      )));
    }

    state.workgroup_size = [x, y, z];
    Ok(())
  }
}

/// Kind of a bound resource.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum ResourceKind {
  UniformBlock(TypeHandle),
  StorageBuffer { ty: TypeHandle, read_only: bool },
  Texture(TextureType),
  Sampler(SamplerKind),
}

/// A resource with its final binding.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct UniformRecord {
  pub name: String,
  pub group: u32,
  pub binding: u32,
  pub visibility: StageMask,
  pub kind: ResourceKind,

  /// Declarations, from every stage, bound to this record; for blocks, the declarations of its members.
  pub members: Vec<VarId>,

  /// Sampler added to pair with a texture.
  pub implicit: bool,
}

/// A resource as gathered from the stages.
#[derive(Debug)]
struct Collected {
  ty: TypeHandle,
  kind: VarKind,
  visibility: StageMask,
  vars: Vec<VarId>,
}

/// Final bindings of a program.
#[derive(Debug, Default)]
pub(crate) struct BindingPlan {
  records: Vec<UniformRecord>,

  /// Record each declaration is bound to.
  by_var: HashMap<VarId, usize>,

  /// Implicit sampler of each texture declaration.
  samplers: HashMap<VarId, usize>,
}

impl BindingPlan {
  pub fn records(&self) -> &[UniformRecord] {
    &self.records
  }

  pub fn record_of(&self, var: VarId) -> Option<&UniformRecord> {
    self.by_var.get(&var).map(|&i| &self.records[i])
  }

  /// Implicit sampler paired with a texture declaration.
  pub fn sampler_of(&self, texture: VarId) -> Option<&UniformRecord> {
    self.samplers.get(&texture).map(|&i| &self.records[i])
  }

  /// Records visible from `stage`, in group then binding order.
  pub fn visible_from(&self, stage: ShaderStage) -> impl Iterator<Item = &UniformRecord> {
    let mut records: Vec<_> = self
      .records
      .iter()
      .filter(move |r| r.visibility.contains(stage.mask()))
      .collect();
    records.sort_by_key(|r| (r.group, r.binding));
    records.into_iter()
  }

  pub fn implicit_samplers(&self) -> Vec<String> {
    self
      .records
      .iter()
      .filter(|r| r.implicit)
      .map(|r| r.name.clone())
      .collect()
  }

  /// One layout per group, from group 0 to the highest group used.
  pub fn layouts(&self, types: &TypeRegistry, label: &str) -> Result<Vec<BindGroupLayout>> {
    let groups = self.records.iter().map(|r| r.group + 1).max().unwrap_or(0);

    (0..groups)
      .map(|group| {
        let mut entries = self
          .records
          .iter()
          .filter(|r| r.group == group)
          .map(|r| {
            Ok(BindGroupLayoutEntry {
              binding: r.binding,
              name: r.name.clone(),
              visibility: r.visibility,
              resource: resource_layout(types, r.kind)?,
            })
          })
          .collect::<Result<Vec<_>>>()?;
        entries.sort_by_key(|e| e.binding);

        Ok(BindGroupLayout {
          label: format!("{}.group{}", label, group),
          group,
          entries,
        })
      })
      .collect()
  }
}

fn resource_layout(types: &TypeRegistry, kind: ResourceKind) -> Result<BindingResource> {
  let resource = match kind {
    ResourceKind::UniformBlock(ty) => BindingResource::Buffer(buffer_layout(types, ty, BufferBindingType::Uniform)?),

    ResourceKind::StorageBuffer { ty, read_only } => {
      let binding_ty = if read_only {
        BufferBindingType::ReadOnlyStorage
      } else {
        BufferBindingType::Storage
      };

      BindingResource::Buffer(buffer_layout(types, ty, binding_ty)?)
    }

    ResourceKind::Texture(t) => BindingResource::Texture(TextureBindingLayout {
      sample_type: t.sample_type,
      view_dimension: t.dimension,
      multisampled: t.multisampled,
    }),

    ResourceKind::Sampler(kind) => BindingResource::Sampler(SamplerBindingLayout { kind }),
  };

  Ok(resource)
}

fn buffer_layout(types: &TypeRegistry, ty: TypeHandle, binding_ty: BufferBindingType) -> Result<BufferBindingLayout> {
  let (byte_size, members) = match types.struct_type(ty) {
    Some(s) => {
      let members = s
        .members
        .iter()
        .zip(&s.layout.offsets)
        .map(|(m, &offset)| {
          Ok(BufferMember {
            name: m.name.clone(),
            offset,
            byte_size: types.size_align(m.ty, s.policy)?.0,
            ty: types.display(m.ty),
          })
        })
        .collect::<Result<Vec<_>>>()?;

      (s.layout.size, members)
    }

    None => {
      let policy = match binding_ty {
        BufferBindingType::Uniform => LayoutPolicy::Std140,
        _ => LayoutPolicy::Packed,
      };

      (types.size_align(ty, policy)?.0, Vec::new())
    }
  };

  let min_binding_size = if types.is_runtime_sized(ty) { 0 } else { byte_size };

  Ok(BufferBindingLayout {
    ty: binding_ty,
    min_binding_size,
    layout: BufferLayout { byte_size, members },
  })
}

/// Sampler paired with a texture on WebGPU.
fn implicit_sampler_kind(t: TextureType) -> SamplerKind {
  match t.sample_type {
    TextureSampleType::Depth => SamplerKind::Comparison,
    TextureSampleType::Float => SamplerKind::Filtering,
    _ => SamplerKind::NonFiltering,
  }
}

/// Collect the resources of every stage and assign their bindings.
pub(crate) fn plan_bindings(
  types: &mut TypeRegistry,
  vars: &[Variable],
  stages: &[StageState],
  target: Target,
) -> Result<BindingPlan> {
  let collected = collect(types, vars, stages)?;
  resolve(types, vars, collected, target)
}

fn collect(types: &TypeRegistry, vars: &[Variable], stages: &[StageState]) -> Result<IndexMap<String, Collected>> {
  let mut collected: IndexMap<String, Collected> = IndexMap::new();

  for state in stages {
    for &v in &state.resources {
      let var = &vars[v.0 as usize];

      if var.kind == VarKind::Workgroup {
        continue;
      }

      match collected.get_mut(&var.name) {
        Some(c) => {
          if c.ty != var.ty || c.kind != var.kind {
            return Err(ShaderError::declaration(format!(
              "`{}` is declared as {} ({:?}) and as {} ({:?})",
              var.name,
              types.display(c.ty),
              c.kind,
              types.display(var.ty),
              var.kind
            )));
          }

          c.visibility = c.visibility | state.stage.mask();
          c.vars.push(v);
        }

        None => {
          collected.insert(
            var.name.clone(),
            Collected {
              ty: var.ty,
              kind: var.kind,
              visibility: state.stage.mask(),
              vars: vec![v],
            },
          );
        }
      }
    }
  }

  Ok(collected)
}

fn resolve(
  types: &mut TypeRegistry,
  vars: &[Variable],
  collected: IndexMap<String, Collected>,
  target: Target,
) -> Result<BindingPlan> {
  // uniform block partitions, keyed by visibility and group, in first-registration order
  let mut partitions: IndexMap<(u32, u32), Vec<&Collected>> = IndexMap::new();
  for c in collected.values() {
    if let VarKind::Uniform { group } = c.kind {
      partitions.entry((c.visibility.bits(), group)).or_default().push(c);
    }
  }

  let mut plan = BindingPlan::default();
  let mut next_binding: HashMap<u32, u32> = HashMap::new();
  let mut emitted_blocks: HashMap<(u32, u32), usize> = HashMap::new();

  let mut push = |plan: &mut BindingPlan, name: String, group: u32, visibility, kind, members: Vec<VarId>, implicit| {
    let counter = next_binding.entry(group).or_insert(0);
    let binding = *counter;
    *counter += 1;

    log::trace!("binding `{}` to group {} binding {}", name, group, binding);

    let index = plan.records.len();
    plan.records.push(UniformRecord {
      name,
      group,
      binding,
      visibility,
      kind,
      members,
      implicit,
    });

    index
  };

  for (name, c) in &collected {
    let kind = match c.kind {
      VarKind::Uniform { group } => {
        let key = (c.visibility.bits(), group);
        if emitted_blocks.contains_key(&key) {
          continue;
        }

        let part = c.visibility.partition_name();
        let members = partitions.get(&key).map(Vec::as_slice).unwrap_or_default();
        let struct_members = members
          .iter()
          .map(|m| StructMember {
            name: vars[m.vars[0].0 as usize].name.clone(),
            ty: m.ty,
          })
          .collect();
        let block = types.structure(
          Some(&format!("UBlock_{}_{}", part, group)),
          LayoutPolicy::Std140,
          struct_members,
        )?;

        let member_vars = members.iter().flat_map(|m| m.vars.iter().copied()).collect::<Vec<_>>();
        let index = push(
          &mut plan,
          format!("ublock_{}_{}", part, group),
          group,
          c.visibility,
          ResourceKind::UniformBlock(block),
          member_vars.clone(),
          false,
        );

        for v in member_vars {
          plan.by_var.insert(v, index);
        }

        emitted_blocks.insert(key, index);
        continue;
      }

      VarKind::Texture { group } => (group, ResourceKind::Texture(types.texture(c.ty).ok_or_else(|| {
        ShaderError::internal(format!("texture `{}` does not have a texture type", name))
      })?)),

      VarKind::Sampler { group } => match types.kind(c.ty) {
        TypeKind::Sampler(kind) => (group, ResourceKind::Sampler(*kind)),
        _ => return Err(ShaderError::internal(format!("sampler `{}` does not have a sampler type", name))),
      },

      VarKind::Storage { group, read_only } => (group, ResourceKind::StorageBuffer { ty: c.ty, read_only }),

      other => {
        return Err(ShaderError::internal(format!(
          "`{}` ({:?}) is not a bindable resource",
          name, other
        )))
      }
    };

    let (group, kind) = kind;
    let index = push(&mut plan, name.clone(), group, c.visibility, kind, c.vars.clone(), false);
    for &v in &c.vars {
      plan.by_var.insert(v, index);
    }

    if let (ResourceKind::Texture(t), Target::WebGPU) = (kind, target) {
      let sampler_name = format!("{}_sampler", name);

      if collected.contains_key(&sampler_name) {
        return Err(ShaderError::declaration(format!(
          "`{}` clashes with the sampler generated for texture `{}`",
          sampler_name, name
        )));
      }

      let sampler = push(
        &mut plan,
        sampler_name,
        group,
        c.visibility,
        ResourceKind::Sampler(implicit_sampler_kind(t)),
        Vec::new(),
        true,
      );

      for &v in &c.vars {
        plan.samplers.insert(v, sampler);
      }
    }
  }

  log::debug!(
    "planned {} binding(s), {} merged uniform block(s)",
    plan.records.len(),
    emitted_blocks.len()
  );

  Ok(plan)
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{config::BuilderConfig, program::RenderProgram};

  fn render(
    target: Target,
    vertex: impl FnOnce(&mut ProgramBuilder) -> Result<()>,
    fragment: impl FnOnce(&mut ProgramBuilder) -> Result<()>,
  ) -> Result<RenderProgram> {
    ProgramBuilder::new(BuilderConfig::new(target)).try_build_render("test", vertex, fragment)
  }

  #[test]
  fn merge_by_stage_mask() {
    let program = render(
      Target::WebGPU,
      |pb| {
        let mvp = pb.uniform("mvp", &TypeDesc::mat(4, 4), 0)?;
        let time = pb.uniform("time", &TypeDesc::f32(), 0)?;
        pb.main(|pb| {
          let t = pb.mul(mvp, time)?;
          pb.eval(t)
        })
      },
      |pb| {
        pb.uniform("time", &TypeDesc::f32(), 0)?;
        pb.uniform("tint", &TypeDesc::vec4(), 0)?;
        pb.main(|_| Ok(()))
      },
    )
    .unwrap();

    let group = &program.bind_group_layouts[0];
    let names: Vec<_> = group.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["ublock_vs_0", "ublock_vsfs_0", "ublock_fs_0"]);
    assert_eq!(group.entries[1].visibility, StageMask::VERTEX | StageMask::FRAGMENT);

    match &group.entries[1].resource {
      BindingResource::Buffer(b) => {
        assert_eq!(b.layout.members.len(), 1);
        assert_eq!(b.layout.members[0].name, "time");
        assert_eq!(b.layout.byte_size, 16);
      }
      other => panic!("unexpected resource {:?}", other),
    }
  }

  #[test]
  fn conflicting_redeclaration() {
    let err = render(
      Target::WebGL2,
      |pb| {
        pb.uniform("scale", &TypeDesc::f32(), 0)?;
        pb.main(|_| Ok(()))
      },
      |pb| {
        pb.uniform("scale", &TypeDesc::vec2(), 0)?;
        pb.main(|_| Ok(()))
      },
    );

    assert!(matches!(err, Err(ShaderError::Declaration(_))));
  }

  #[test]
  fn dense_groups_and_implicit_samplers() {
    let program = render(
      Target::WebGPU,
      |pb| pb.main(|_| Ok(())),
      |pb| {
        let shadow = TextureType::new(crate::types::TextureViewDimension::D2, TextureSampleType::Depth);
        pb.uniform_texture("shadow", shadow, 2)?;
        pb.uniform("bias", &TypeDesc::f32(), 2)?;
        pb.main(|_| Ok(()))
      },
    )
    .unwrap();

    assert_eq!(program.bind_group_layouts.len(), 3);
    assert!(program.bind_group_layouts[0].entries.is_empty());
    assert!(program.bind_group_layouts[1].entries.is_empty());

    let group = &program.bind_group_layouts[2];
    let bindings: Vec<_> = group.entries.iter().map(|e| (e.binding, e.name.as_str())).collect();
    assert_eq!(bindings, [(0, "shadow"), (1, "shadow_sampler"), (2, "ublock_fs_2")]);
    assert_eq!(
      group.entries[1].resource,
      BindingResource::Sampler(SamplerBindingLayout {
        kind: SamplerKind::Comparison
      })
    );
    assert_eq!(program.implicit_samplers, ["shadow_sampler"]);
  }

  #[test]
  fn constants_must_be_constant() {
    let mut pb = ProgramBuilder::new(BuilderConfig::new(Target::WebGPU));
    let result = pb.try_build_compute("c", |pb| {
      let two = pb.constant("TWO", 2.)?;
      let four = pb.mul(two, two)?;
      pb.constant("FOUR", four)?;

      let t = pb.uniform("t", &TypeDesc::f32(), 0)?;
      assert!(matches!(pb.constant("T", t), Err(ShaderError::Declaration(_))));
      pb.main(|_| Ok(()))
    });

    assert!(result.is_ok());
  }

  #[test]
  fn workgroup_size_checks() {
    let mut pb = ProgramBuilder::new(BuilderConfig::new(Target::WebGPU));
    let program = pb
      .try_build_compute("c", |pb| {
        assert!(pb.workgroup_size(0, 1, 1).is_err());
        pb.workgroup_size(8, 8, 1)?;
        pb.main(|_| Ok(()))
      })
      .unwrap();

    assert_eq!(program.workgroup_size, [8, 8, 1]);
  }
}

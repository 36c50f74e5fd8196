//! Program builder and compiled programs.

use crate::{
  ast::{Access, Block, Node, NodeId, NodeKind, VarId, VarKind, Variable},
  bindings::BindGroupLayout,
  builtin::BuiltinVar,
  config::BuilderConfig,
  error::{Result, ShaderError},
  expr::Expr,
  fun::Function,
  input::VertexAttribute,
  reflection::Reflection,
  scope::{ScopeFrame, ScopeKind},
  stage::ShaderStage,
  target::{Feature, Target},
  types::{TextureType, TextureViewDimension, TypeDesc, TypeHandle, TypeRegistry},
  uniform,
  writer::{self, WriteContext},
};
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum BuildState {
  Idle,
  Building,
  Done,
}

/// Everything declared while building one stage.
#[derive(Debug)]
pub(crate) struct StageState {
  pub stage: ShaderStage,
  pub scopes: Vec<ScopeFrame>,
  pub functions: Vec<Function>,
  pub fn_index: HashMap<String, Vec<crate::ast::FunId>>,
  pub main: Option<Block>,
  pub constants: Vec<VarId>,
  pub inputs: Vec<VarId>,
  pub outputs: Vec<VarId>,

  /// Uniforms, textures, samplers, storage buffers and workgroup variables, in declaration order.
  pub resources: Vec<VarId>,

  pub builtins: IndexMap<BuiltinVar, Expr>,

  /// GLSL ES 1.00 extensions to enable.
  pub extensions: BTreeSet<&'static str>,

  pub reflection: Reflection,
  pub workgroup_size: [u32; 3],
}

impl StageState {
  fn new(stage: ShaderStage) -> Self {
    StageState {
      stage,
      scopes: vec![ScopeFrame::new(ScopeKind::Global)],
      functions: Vec::new(),
      fn_index: HashMap::new(),
      main: None,
      constants: Vec::new(),
      inputs: Vec::new(),
      outputs: Vec::new(),
      resources: Vec::new(),
      builtins: IndexMap::new(),
      extensions: BTreeSet::new(),
      reflection: Reflection::default(),
      workgroup_size: [1, 1, 1],
    }
  }
}

/// Generated source of one stage.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StageOutput {
  pub stage: ShaderStage,
  pub source: String,

  /// Names of the struct types declared by the source, in declaration order.
  pub struct_types: Vec<String>,
}

/// A compiled vertex + fragment program.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderProgram {
  pub label: String,
  pub target: Target,
  pub vertex: StageOutput,
  pub fragment: StageOutput,

  /// One layout per group, from group 0 to the highest group used.
  pub bind_group_layouts: Vec<BindGroupLayout>,

  pub vertex_attributes: Vec<VertexAttribute>,

  /// Samplers added to pair with textures on WebGPU.
  pub implicit_samplers: Vec<String>,
}

/// A compiled compute program.
#[derive(Clone, Debug, PartialEq)]
pub struct ComputeProgram {
  pub label: String,
  pub target: Target,
  pub compute: StageOutput,
  pub bind_group_layouts: Vec<BindGroupLayout>,
  pub implicit_samplers: Vec<String>,
  pub workgroup_size: [u32; 3],
}

/// Shader program builder.
///
/// A builder compiles programs for the target set in its [`BuilderConfig`]. Each stage is authored by a callback
/// receiving the builder; the callback declares inputs, outputs, uniforms and functions, and must define the `main`
/// function of the stage.
///
/// A builder compiles one program at a time and must be [reset](ProgramBuilder::reset) between two compilations. It
/// is not reentrant: starting a compilation from an authoring callback fails.
///
/// ```
/// use polyshade::{BuilderConfig, ProgramBuilder, Target, TypeDesc, VertexSemantic};
///
/// let mut pb = ProgramBuilder::new(BuilderConfig::new(Target::WebGL2));
/// let program = pb.build_render(
///   "flat",
///   |pb| {
///     let position = pb.vertex_input("position", &TypeDesc::vec3(), VertexSemantic::Position)?;
///     pb.main(|pb| {
///       let clip = pb.vec4((position, 1.))?;
///       pb.set_builtin(polyshade::BuiltinVar::Position, clip)
///     })
///   },
///   |pb| {
///     let color = pb.output("color", &TypeDesc::vec4())?;
///     pb.main(|pb| {
///       let red = pb.vec4((1., 0., 0., 1.))?;
///       pb.assign(color, red)
///     })
///   },
/// );
///
/// assert!(program.is_some());
/// ```
#[derive(Debug)]
pub struct ProgramBuilder {
  config: BuilderConfig,
  pub(crate) types: TypeRegistry,
  pub(crate) nodes: Vec<Node>,
  pub(crate) vars: Vec<Variable>,
  pub(crate) access_cache: HashMap<(NodeId, Access), Expr>,
  pub(crate) stage: Option<StageState>,
  pub(crate) finished: Vec<StageState>,
  state: BuildState,
  last_error: Option<String>,
}

impl ProgramBuilder {
  pub fn new(config: BuilderConfig) -> Self {
    ProgramBuilder {
      config,
      types: TypeRegistry::new(),
      nodes: Vec::new(),
      vars: Vec::new(),
      access_cache: HashMap::new(),
      stage: None,
      finished: Vec::new(),
      state: BuildState::Idle,
      last_error: None,
    }
  }

  pub fn config(&self) -> &BuilderConfig {
    &self.config
  }

  pub fn target(&self) -> Target {
    self.config.target
  }

  pub fn types(&self) -> &TypeRegistry {
    &self.types
  }

  /// Stage being authored, if any.
  pub fn current_stage(&self) -> Option<ShaderStage> {
    self.stage.as_ref().map(|s| s.stage)
  }

  /// Message of the last failed build, if the last build failed.
  pub fn last_error(&self) -> Option<&str> {
    self.last_error.as_deref()
  }

  /// Intern a type, checking that the target supports it.
  pub fn ty(&mut self, desc: &TypeDesc) -> Result<TypeHandle> {
    self.check_type(desc)?;
    self.types.intern(desc)
  }

  fn check_type(&self, desc: &TypeDesc) -> Result<()> {
    let target = self.target();

    match desc {
      TypeDesc::Void | TypeDesc::Sampler(_) => Ok(()),

      TypeDesc::Primitive(p) => {
        match p.scalar {
          crate::types::ScalarKind::U32 => target.require(Feature::UnsignedInt)?,
          crate::types::ScalarKind::F16 => target.require(Feature::Float16)?,
          _ => (),
        }

        if p.is_matrix() && p.cols != p.rows {
          target.require(Feature::NonSquareMatrix)?;
        }

        Ok(())
      }

      TypeDesc::Array { element, len } => {
        if *len == 0 {
          target.require(Feature::RuntimeArray)?;
        }

        if matches!(**element, TypeDesc::Array { .. }) {
          target.require(Feature::NestedArray)?;
        }

        self.check_type(element)
      }

      TypeDesc::Struct(s) => s.members.iter().try_for_each(|(_, ty)| self.check_type(ty)),

      TypeDesc::Pointer { pointee, .. } => {
        target.require(Feature::Pointer)?;
        self.check_type(pointee)
      }

      TypeDesc::Texture(t) => check_texture(target, *t),
    }
  }

  pub(crate) fn stage_state(&self) -> Result<&StageState> {
    self
      .stage
      .as_ref()
      .ok_or_else(|| ShaderError::internal("no shader stage is being built"))
  }

  pub(crate) fn stage_state_mut(&mut self) -> Result<&mut StageState> {
    self
      .stage
      .as_mut()
      .ok_or_else(|| ShaderError::internal("no shader stage is being built"))
  }

  pub(crate) fn push_node(&mut self, ty: TypeHandle, kind: NodeKind) -> Expr {
    let node = NodeId(self.nodes.len() as u32);
    self.nodes.push(Node { ty, kind });
    Expr { node, ty }
  }

  pub(crate) fn node(&self, id: NodeId) -> &Node {
    &self.nodes[id.0 as usize]
  }

  pub(crate) fn push_var(&mut self, var: Variable) -> VarId {
    let id = VarId(self.vars.len() as u32);
    self.vars.push(var);
    id
  }

  pub(crate) fn var(&self, id: VarId) -> &Variable {
    &self.vars[id.0 as usize]
  }

  /// Variable an expression directly names, if any.
  pub(crate) fn var_of(&self, e: Expr) -> Option<VarId> {
    match self.node(e.node).kind {
      NodeKind::Var(v) => Some(v),
      _ => None,
    }
  }

  /// Discard everything accumulated by the previous compilation.
  ///
  /// Expressions and type handles obtained before the reset must not be used afterwards.
  pub fn reset(&mut self) {
    self.types.clear();
    self.nodes.clear();
    self.vars.clear();
    self.access_cache.clear();
    self.stage = None;
    self.finished.clear();
    self.state = BuildState::Idle;

    log::trace!("builder reset");
  }

  fn begin(&mut self, label: &str) -> Result<()> {
    match self.state {
      BuildState::Building => Err(ShaderError::internal(
        "a program is already being built; builders are not reentrant",
      )),

      BuildState::Done => Err(ShaderError::internal(
        "the builder must be reset before compiling another program",
      )),

      BuildState::Idle => {
        self.state = BuildState::Building;
        log::debug!("building program '{}' for {}", label, self.target());
        Ok(())
      }
    }
  }

  fn finish(&mut self) {
    self.stage = None;
    self.state = BuildState::Done;
  }

  fn report<T>(&mut self, label: &str, result: Result<T>) -> Option<T> {
    match result {
      Ok(program) => {
        self.last_error = None;
        Some(program)
      }

      Err(err) => {
        let msg = format!("cannot build program '{}' for {}: {}", label, self.target(), err);
        log::error!("{}", msg);
        self.last_error = Some(msg);
        None
      }
    }
  }

  /// Compile a vertex + fragment program.
  ///
  /// On failure, the error is logged and kept as [`last_error`](ProgramBuilder::last_error), and `None` is returned.
  pub fn build_render<V, F>(&mut self, label: &str, vertex: V, fragment: F) -> Option<RenderProgram>
  where
    V: FnOnce(&mut Self) -> Result<()>,
    F: FnOnce(&mut Self) -> Result<()>,
  {
    let result = self.try_build_render(label, vertex, fragment);
    self.report(label, result)
  }

  /// Compile a vertex + fragment program, returning the error on failure.
  pub fn try_build_render<V, F>(&mut self, label: &str, vertex: V, fragment: F) -> Result<RenderProgram>
  where
    V: FnOnce(&mut Self) -> Result<()>,
    F: FnOnce(&mut Self) -> Result<()>,
  {
    self.begin(label)?;
    let result = self.compile_render(label, vertex, fragment);
    self.finish();
    result
  }

  fn compile_render<V, F>(&mut self, label: &str, vertex: V, fragment: F) -> Result<RenderProgram>
  where
    V: FnOnce(&mut Self) -> Result<()>,
    F: FnOnce(&mut Self) -> Result<()>,
  {
    self.run_stage(ShaderStage::Vertex, vertex)?;
    self.run_stage(ShaderStage::Fragment, fragment)?;

    let plan = uniform::plan_bindings(&mut self.types, &self.vars, &self.finished, self.config.target)?;
    let vertex = self.render(0, &plan)?;
    let fragment = self.render(1, &plan)?;

    let vertex_attributes = self.finished[0]
      .inputs
      .iter()
      .filter_map(|&v| {
        let var = self.var(v);
        match var.kind {
          VarKind::Input {
            location,
            semantic: Some(semantic),
          } => Some(VertexAttribute {
            name: var.name.clone(),
            semantic,
            location,
            format: self.types.display(var.ty),
          }),
          _ => None,
        }
      })
      .collect();

    let program = RenderProgram {
      label: label.to_owned(),
      target: self.target(),
      vertex,
      fragment,
      bind_group_layouts: plan.layouts(&self.types, label)?,
      vertex_attributes,
      implicit_samplers: plan.implicit_samplers(),
    };

    log::info!(
      "built program '{}' for {} with {} bind group(s)",
      label,
      program.target,
      program.bind_group_layouts.len()
    );

    Ok(program)
  }

  /// Compile a compute program.
  ///
  /// On failure, the error is logged and kept as [`last_error`](ProgramBuilder::last_error), and `None` is returned.
  pub fn build_compute<C>(&mut self, label: &str, compute: C) -> Option<ComputeProgram>
  where
    C: FnOnce(&mut Self) -> Result<()>,
  {
    let result = self.try_build_compute(label, compute);
    self.report(label, result)
  }

  /// Compile a compute program, returning the error on failure.
  pub fn try_build_compute<C>(&mut self, label: &str, compute: C) -> Result<ComputeProgram>
  where
    C: FnOnce(&mut Self) -> Result<()>,
  {
    self.begin(label)?;
    let result = self.compile_compute(label, compute);
    self.finish();
    result
  }

  fn compile_compute<C>(&mut self, label: &str, compute: C) -> Result<ComputeProgram>
  where
    C: FnOnce(&mut Self) -> Result<()>,
  {
    self.target().require(Feature::Compute)?;
    self.run_stage(ShaderStage::Compute, compute)?;

    let plan = uniform::plan_bindings(&mut self.types, &self.vars, &self.finished, self.config.target)?;
    let compute = self.render(0, &plan)?;

    let program = ComputeProgram {
      label: label.to_owned(),
      target: self.target(),
      compute,
      bind_group_layouts: plan.layouts(&self.types, label)?,
      implicit_samplers: plan.implicit_samplers(),
      workgroup_size: self.finished[0].workgroup_size,
    };

    log::info!(
      "built compute program '{}' with {} bind group(s)",
      label,
      program.bind_group_layouts.len()
    );

    Ok(program)
  }

  fn run_stage<F>(&mut self, stage: ShaderStage, body: F) -> Result<()>
  where
    F: FnOnce(&mut Self) -> Result<()>,
  {
    log::debug!("building {} stage", stage);
    self.stage = Some(StageState::new(stage));

    if stage == ShaderStage::Fragment {
      self.seed_fragment_inputs()?;
    }

    body(self)?;

    let state = self
      .stage
      .take()
      .ok_or_else(|| ShaderError::internal("stage state vanished while building"))?;

    if state.scopes.len() != 1 {
      return Err(ShaderError::internal(format!(
        "{} scope(s) left open at the end of the {} stage",
        state.scopes.len() - 1,
        stage
      )));
    }

    if state.main.is_none() {
      return Err(ShaderError::declaration(format!(
        "the {} stage has no main function",
        stage
      )));
    }

    self.finished.push(state);
    Ok(())
  }

  /// Declare the outputs of the vertex stage as inputs of the fragment stage.
  fn seed_fragment_inputs(&mut self) -> Result<()> {
    let outputs = self
      .finished
      .first()
      .map(|s| s.outputs.clone())
      .unwrap_or_default();

    for out in outputs {
      let (name, ty, location) = match self.var(out) {
        Variable {
          name,
          ty,
          kind: VarKind::Output { location },
          ..
        } => (name.clone(), *ty, *location),
        _ => return Err(ShaderError::internal("vertex output is not an output variable")),
      };

      let (var, _) = self.new_var(&name, ty, VarKind::Input { location, semantic: None })?;
      self.stage_state_mut()?.inputs.push(var);
    }

    Ok(())
  }

  fn render(&self, index: usize, plan: &uniform::BindingPlan) -> Result<StageOutput> {
    let state = self
      .finished
      .get(index)
      .ok_or_else(|| ShaderError::internal("rendering a stage that was not built"))?;

    let ctx = WriteContext {
      target: self.target(),
      stage: state,
      types: &self.types,
      nodes: &self.nodes,
      vars: &self.vars,
      plan,
      indent_width: self.config.indent_width,
    };

    let (source, struct_types) = writer::write_stage(&ctx)?;
    log::trace!("{} stage source:\n{}", state.stage, source);

    Ok(StageOutput {
      stage: state.stage,
      source,
      struct_types: struct_types
        .into_iter()
        .filter_map(|ty| self.types.struct_type(ty).map(|s| s.name.clone()))
        .collect(),
    })
  }
}

fn check_texture(target: Target, t: TextureType) -> Result<()> {
  match t.dimension {
    TextureViewDimension::D2Array => target.require(Feature::ArrayTexture)?,
    TextureViewDimension::D3 => target.require(Feature::Texture3D)?,
    TextureViewDimension::CubeArray => target.require(Feature::CubeArrayTexture)?,
    _ => (),
  }

  if t.multisampled {
    target.require(Feature::MultisampledTexture)?;
  }

  if t.sample_type.is_integer() {
    target.require(Feature::IntegerTexture)?;
  }

  Ok(())
}

#[cfg(test)]
impl ProgramBuilder {
  /// Run `f` inside the main function of a bare fragment stage.
  pub(crate) fn in_test_main(&mut self, f: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
    self.stage = Some(StageState::new(ShaderStage::Fragment));
    self.main(f)
  }

  /// Run `f` at the global scope of a bare stage.
  pub(crate) fn in_test_stage(&mut self, stage: ShaderStage, f: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
    self.stage = Some(StageState::new(stage));
    f(self)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn capabilities_apply_to_types() {
    let mut pb = ProgramBuilder::new(BuilderConfig::new(Target::WebGL));
    assert!(matches!(pb.ty(&TypeDesc::u32()), Err(ShaderError::Capability { .. })));
    assert!(matches!(pb.ty(&TypeDesc::mat(2, 3)), Err(ShaderError::Capability { .. })));
    assert!(pb.ty(&TypeDesc::mat(3, 3)).is_ok());

    let mut pb = ProgramBuilder::new(BuilderConfig::new(Target::WebGL2));
    assert!(pb.ty(&TypeDesc::array(TypeDesc::array(TypeDesc::f32(), 2), 2)).is_err());
    assert!(pb.ty(&TypeDesc::runtime_array(TypeDesc::f32())).is_err());

    let mut pb = ProgramBuilder::new(BuilderConfig::new(Target::WebGPU));
    assert!(pb.ty(&TypeDesc::runtime_array(TypeDesc::f32())).is_ok());
  }

  #[test]
  fn reset_is_required_between_builds() {
    let mut pb = ProgramBuilder::new(BuilderConfig::new(Target::WebGPU));
    let first = pb.try_build_compute("noop", |pb| pb.main(|_| Ok(())));
    assert!(first.is_ok());

    let second = pb.try_build_compute("noop", |pb| pb.main(|_| Ok(())));
    assert!(matches!(second, Err(ShaderError::Internal(_))));

    pb.reset();
    assert!(pb.try_build_compute("noop", |pb| pb.main(|_| Ok(()))).is_ok());
  }

  #[test]
  fn builder_is_not_reentrant() {
    let mut pb = ProgramBuilder::new(BuilderConfig::new(Target::WebGPU));
    let result = pb.try_build_compute("outer", |pb| {
      let inner = pb.try_build_compute("inner", |pb| pb.main(|_| Ok(())));
      assert!(matches!(inner, Err(ShaderError::Internal(_))));
      pb.main(|_| Ok(()))
    });

    assert!(result.is_ok());
  }

  #[test]
  fn missing_main_is_reported() {
    let mut pb = ProgramBuilder::new(BuilderConfig::new(Target::WebGPU));
    let program = pb.build_compute("empty", |_| Ok(()));

    assert!(program.is_none());
    assert!(pb.last_error().unwrap().contains("no main function"));
  }
}

//! Shader types.
//!
//! Types are requested through [`TypeDesc`], a plain description of their shape, and interned into a [`TypeRegistry`]
//! which hands back a [`TypeHandle`]. Two structurally identical descriptions always yield the same handle, so handle
//! equality is type equality.

mod host;
pub(crate) mod layout;

pub use host::{Matrix, ToPrimType, ToType, M22, M23, M24, M32, M33, M34, M42, M43, M44, V2, V3, V4};
pub use layout::StructLayout;

use crate::error::{Result, ShaderError};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};

/// Scalar component type.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
  Bool,
  I32,
  U32,
  F32,
  F16,
}

impl ScalarKind {
  pub const fn is_integer(self) -> bool {
    matches!(self, ScalarKind::I32 | ScalarKind::U32)
  }

  pub const fn is_float(self) -> bool {
    matches!(self, ScalarKind::F32 | ScalarKind::F16)
  }

  pub const fn is_numeric(self) -> bool {
    !matches!(self, ScalarKind::Bool)
  }

  /// Size in bytes of a component once stored in a buffer.
  pub const fn byte_size(self) -> u32 {
    match self {
      ScalarKind::F16 => 2,
      _ => 4,
    }
  }

  pub const fn name(self) -> &'static str {
    match self {
      ScalarKind::Bool => "bool",
      ScalarKind::I32 => "i32",
      ScalarKind::U32 => "u32",
      ScalarKind::F32 => "f32",
      ScalarKind::F16 => "f16",
    }
  }
}

/// Scalar, vector or matrix type.
///
/// Vectors have `cols == 1` and `rows` components. Matrices are column-major: `cols` columns of `rows` components.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveType {
  pub scalar: ScalarKind,
  pub rows: u8,
  pub cols: u8,
}

impl PrimitiveType {
  pub const fn scalar(scalar: ScalarKind) -> Self {
    PrimitiveType {
      scalar,
      rows: 1,
      cols: 1,
    }
  }

  pub const fn vector(scalar: ScalarKind, n: u8) -> Self {
    PrimitiveType {
      scalar,
      rows: n,
      cols: 1,
    }
  }

  pub const fn matrix(scalar: ScalarKind, cols: u8, rows: u8) -> Self {
    PrimitiveType { scalar, rows, cols }
  }

  pub const fn is_scalar(self) -> bool {
    self.rows == 1 && self.cols == 1
  }

  pub const fn is_vector(self) -> bool {
    self.cols == 1 && self.rows > 1
  }

  pub const fn is_matrix(self) -> bool {
    self.cols > 1
  }

  pub const fn components(self) -> u8 {
    self.rows * self.cols
  }

  /// Type obtained by indexing: the column of a matrix, the component of a vector.
  pub const fn element(self) -> Self {
    if self.is_matrix() {
      PrimitiveType::vector(self.scalar, self.rows)
    } else {
      PrimitiveType::scalar(self.scalar)
    }
  }

  /// Same shape, different component type.
  pub const fn with_scalar(self, scalar: ScalarKind) -> Self {
    PrimitiveType { scalar, ..self }
  }

  fn validate(self) -> Result<()> {
    if self.is_matrix() {
      if !(2..=4).contains(&self.cols) || !(2..=4).contains(&self.rows) {
        return Err(ShaderError::parameter(format!(
          "matrices must have between 2 and 4 columns and rows, got {}x{}",
          self.cols, self.rows
        )));
      }

      if !self.scalar.is_float() {
        return Err(ShaderError::parameter(format!(
          "matrices must have floating point components, got {}",
          self.scalar.name()
        )));
      }
    } else if self.cols != 1 || !(1..=4).contains(&self.rows) {
      return Err(ShaderError::parameter(format!(
        "vectors must have between 2 and 4 components, got {}",
        self.rows
      )));
    }

    Ok(())
  }
}

impl fmt::Display for PrimitiveType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_matrix() {
      write!(f, "mat{}x{}<{}>", self.cols, self.rows, self.scalar.name())
    } else if self.is_vector() {
      write!(f, "vec{}<{}>", self.rows, self.scalar.name())
    } else {
      f.write_str(self.scalar.name())
    }
  }
}

/// Dimensionality of a texture view.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum TextureViewDimension {
  #[serde(rename = "2d")]
  D2,
  #[serde(rename = "2d-array")]
  D2Array,
  #[serde(rename = "cube")]
  Cube,
  #[serde(rename = "cube-array")]
  CubeArray,
  #[serde(rename = "3d")]
  D3,
}

/// What a texture yields once sampled.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextureSampleType {
  Float,
  UnfilterableFloat,
  Depth,
  Sint,
  Uint,
}

impl TextureSampleType {
  /// Component type of the sampled value.
  pub const fn scalar(self) -> ScalarKind {
    match self {
      TextureSampleType::Sint => ScalarKind::I32,
      TextureSampleType::Uint => ScalarKind::U32,
      _ => ScalarKind::F32,
    }
  }

  pub const fn is_integer(self) -> bool {
    matches!(self, TextureSampleType::Sint | TextureSampleType::Uint)
  }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct TextureType {
  pub dimension: TextureViewDimension,
  pub sample_type: TextureSampleType,
  pub multisampled: bool,
}

impl TextureType {
  pub const fn new(dimension: TextureViewDimension, sample_type: TextureSampleType) -> Self {
    TextureType {
      dimension,
      sample_type,
      multisampled: false,
    }
  }

  pub const fn multisampled(self) -> Self {
    TextureType {
      multisampled: true,
      ..self
    }
  }

  pub const fn is_depth(self) -> bool {
    matches!(self.sample_type, TextureSampleType::Depth)
  }

  pub const fn is_array(self) -> bool {
    matches!(
      self.dimension,
      TextureViewDimension::D2Array | TextureViewDimension::CubeArray
    )
  }

  /// Number of components of the sampling coordinates, array layer excluded.
  pub const fn coord_components(self) -> u8 {
    match self.dimension {
      TextureViewDimension::D2 | TextureViewDimension::D2Array => 2,
      _ => 3,
    }
  }

  /// Number of components returned by a dimension query.
  pub const fn size_components(self) -> u8 {
    match self.dimension {
      TextureViewDimension::D3 => 3,
      _ => 2,
    }
  }

  fn validate(self) -> Result<()> {
    if self.multisampled && self.dimension != TextureViewDimension::D2 {
      return Err(ShaderError::parameter("only 2D textures can be multisampled"));
    }

    if self.is_depth() && self.dimension == TextureViewDimension::D3 {
      return Err(ShaderError::parameter("3D textures cannot hold depth"));
    }

    Ok(())
  }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplerKind {
  Filtering,
  NonFiltering,
  Comparison,
}

/// Address space a pointer points into.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressSpace {
  Function,
  Private,
  Workgroup,
  Uniform,
  Storage,
}

impl AddressSpace {
  pub const fn name(self) -> &'static str {
    match self {
      AddressSpace::Function => "function",
      AddressSpace::Private => "private",
      AddressSpace::Workgroup => "workgroup",
      AddressSpace::Uniform => "uniform",
      AddressSpace::Storage => "storage",
    }
  }
}

/// Memory layout rules applied to a struct.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutPolicy {
  /// Natural WGSL layout, as used by storage buffers: members are laid out back to back, each with its natural
  /// alignment (vectors of three or four components align to four components).
  Packed,

  /// Uniform block rules: on top of the natural alignment, arrays, matrix columns and structs align to 16 bytes and
  /// array strides are rounded up to 16 bytes. Nested structs are std140 too.
  Std140,
}

impl LayoutPolicy {
  fn name(self) -> &'static str {
    match self {
      LayoutPolicy::Packed => "packed",
      LayoutPolicy::Std140 => "std140",
    }
  }
}

/// Shape of a type, as requested by the user.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum TypeDesc {
  Void,
  Primitive(PrimitiveType),

  /// Array of `len` elements. A length of `0` requests a runtime-sized array.
  Array {
    element: Box<TypeDesc>,
    len: u32,
  },

  Struct(StructDesc),

  Pointer {
    pointee: Box<TypeDesc>,
    space: AddressSpace,
  },

  Texture(TextureType),
  Sampler(SamplerKind),
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct StructDesc {
  /// Name to declare the struct with; a name is generated if absent.
  pub name: Option<String>,
  pub layout: LayoutPolicy,
  pub members: Vec<(String, TypeDesc)>,
}

impl TypeDesc {
  pub const fn scalar(kind: ScalarKind) -> Self {
    TypeDesc::Primitive(PrimitiveType::scalar(kind))
  }

  pub const fn bool() -> Self {
    Self::scalar(ScalarKind::Bool)
  }

  pub const fn i32() -> Self {
    Self::scalar(ScalarKind::I32)
  }

  pub const fn u32() -> Self {
    Self::scalar(ScalarKind::U32)
  }

  pub const fn f32() -> Self {
    Self::scalar(ScalarKind::F32)
  }

  pub const fn f16() -> Self {
    Self::scalar(ScalarKind::F16)
  }

  pub const fn vec(kind: ScalarKind, n: u8) -> Self {
    TypeDesc::Primitive(PrimitiveType::vector(kind, n))
  }

  pub const fn vec2() -> Self {
    Self::vec(ScalarKind::F32, 2)
  }

  pub const fn vec3() -> Self {
    Self::vec(ScalarKind::F32, 3)
  }

  pub const fn vec4() -> Self {
    Self::vec(ScalarKind::F32, 4)
  }

  /// `f32` matrix with `cols` columns of `rows` components.
  pub const fn mat(cols: u8, rows: u8) -> Self {
    TypeDesc::Primitive(PrimitiveType::matrix(ScalarKind::F32, cols, rows))
  }

  pub fn array(element: TypeDesc, len: u32) -> Self {
    TypeDesc::Array {
      element: Box::new(element),
      len,
    }
  }

  pub fn runtime_array(element: TypeDesc) -> Self {
    Self::array(element, 0)
  }

  pub fn structure<N>(name: Option<&str>, layout: LayoutPolicy, members: N) -> Self
  where
    N: IntoIterator,
    N::Item: Into<(String, TypeDesc)>,
  {
    TypeDesc::Struct(StructDesc {
      name: name.map(str::to_owned),
      layout,
      members: members.into_iter().map(Into::into).collect(),
    })
  }

  pub fn pointer(pointee: TypeDesc, space: AddressSpace) -> Self {
    TypeDesc::Pointer {
      pointee: Box::new(pointee),
      space,
    }
  }

  pub const fn texture(dimension: TextureViewDimension, sample_type: TextureSampleType) -> Self {
    TypeDesc::Texture(TextureType::new(dimension, sample_type))
  }

  pub const fn texture_2d() -> Self {
    Self::texture(TextureViewDimension::D2, TextureSampleType::Float)
  }

  pub const fn texture_cube() -> Self {
    Self::texture(TextureViewDimension::Cube, TextureSampleType::Float)
  }

  pub const fn depth_2d() -> Self {
    Self::texture(TextureViewDimension::D2, TextureSampleType::Depth)
  }

  pub const fn sampler(kind: SamplerKind) -> Self {
    TypeDesc::Sampler(kind)
  }
}

impl From<PrimitiveType> for TypeDesc {
  fn from(p: PrimitiveType) -> Self {
    TypeDesc::Primitive(p)
  }
}

impl From<TextureType> for TypeDesc {
  fn from(t: TextureType) -> Self {
    TypeDesc::Texture(t)
  }
}

/// Opaque identity of an interned type.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TypeHandle(u32);

impl TypeHandle {
  pub(crate) fn index(self) -> usize {
    self.0 as usize
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructMember {
  pub name: String,
  pub ty: TypeHandle,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructType {
  pub name: String,
  pub policy: LayoutPolicy,
  pub members: Vec<StructMember>,
  pub layout: StructLayout,
}

/// Interned form of a type.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeKind {
  Void,
  Primitive(PrimitiveType),
  Array { element: TypeHandle, len: u32 },
  Struct(StructType),
  Pointer { pointee: TypeHandle, space: AddressSpace },
  Texture(TextureType),
  Sampler(SamplerKind),
}

impl TypeKind {
  /// Whether values of this type can live in variables and buffers.
  fn is_storable(&self) -> bool {
    matches!(
      self,
      TypeKind::Primitive(_) | TypeKind::Array { .. } | TypeKind::Struct(_)
    )
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeInfo {
  key: String,
  kind: TypeKind,
}

impl TypeInfo {
  /// Canonical key; equal keys mean structurally equal types.
  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn kind(&self) -> &TypeKind {
    &self.kind
  }
}

/// Structural type interner.
#[derive(Debug, Default)]
pub struct TypeRegistry {
  types: Vec<TypeInfo>,
  by_key: HashMap<String, TypeHandle>,
  struct_names: HashMap<String, TypeHandle>,
  next_anonymous: u32,
}

impl TypeRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.types.len()
  }

  pub fn is_empty(&self) -> bool {
    self.types.is_empty()
  }

  pub(crate) fn clear(&mut self) {
    *self = Self::default();
  }

  pub fn get(&self, ty: TypeHandle) -> &TypeInfo {
    &self.types[ty.index()]
  }

  pub fn kind(&self, ty: TypeHandle) -> &TypeKind {
    &self.get(ty).kind
  }

  pub fn primitive(&self, ty: TypeHandle) -> Option<PrimitiveType> {
    match self.kind(ty) {
      TypeKind::Primitive(p) => Some(*p),
      _ => None,
    }
  }

  pub fn struct_type(&self, ty: TypeHandle) -> Option<&StructType> {
    match self.kind(ty) {
      TypeKind::Struct(s) => Some(s),
      _ => None,
    }
  }

  pub fn texture(&self, ty: TypeHandle) -> Option<TextureType> {
    match self.kind(ty) {
      TypeKind::Texture(t) => Some(*t),
      _ => None,
    }
  }

  pub fn is_void(&self, ty: TypeHandle) -> bool {
    matches!(self.kind(ty), TypeKind::Void)
  }

  /// Whether any interned type has `kind` components.
  pub(crate) fn contains_scalar(&self, kind: ScalarKind) -> bool {
    self.types.iter().any(|info| match &info.kind {
      TypeKind::Primitive(p) => p.scalar == kind,
      _ => false,
    })
  }

  /// Struct type declared with `name`, if any.
  pub fn struct_by_name(&self, name: &str) -> Option<TypeHandle> {
    self.struct_names.get(name).copied()
  }

  /// Human readable name, used in diagnostics.
  pub fn display(&self, ty: TypeHandle) -> String {
    match self.kind(ty) {
      TypeKind::Void => "void".to_owned(),
      TypeKind::Primitive(p) => p.to_string(),
      TypeKind::Array { element, len: 0 } => format!("array<{}>", self.display(*element)),
      TypeKind::Array { element, len } => format!("array<{}, {}>", self.display(*element), len),
      TypeKind::Struct(s) => s.name.clone(),
      TypeKind::Pointer { pointee, space } => format!("ptr<{}, {}>", space.name(), self.display(*pointee)),
      _ => self.get(ty).key.clone(),
    }
  }

  /// Intern a type description, interning its sub-types first.
  pub fn intern(&mut self, desc: &TypeDesc) -> Result<TypeHandle> {
    match desc {
      TypeDesc::Void => Ok(self.insert(TypeKind::Void)),

      TypeDesc::Primitive(p) => {
        p.validate()?;
        Ok(self.insert(TypeKind::Primitive(*p)))
      }

      TypeDesc::Array { element, len } => {
        let element = self.intern(element)?;
        self.array(element, *len)
      }

      TypeDesc::Struct(s) => {
        let members = s
          .members
          .iter()
          .map(|(name, ty)| {
            Ok(StructMember {
              name: name.clone(),
              ty: self.intern(ty)?,
            })
          })
          .collect::<Result<Vec<_>>>()?;

        self.structure(s.name.as_deref(), s.layout, members)
      }

      TypeDesc::Pointer { pointee, space } => {
        let pointee = self.intern(pointee)?;
        self.pointer(pointee, *space)
      }

      TypeDesc::Texture(t) => {
        t.validate()?;
        Ok(self.insert(TypeKind::Texture(*t)))
      }

      TypeDesc::Sampler(kind) => Ok(self.insert(TypeKind::Sampler(*kind))),
    }
  }

  pub(crate) fn void(&mut self) -> TypeHandle {
    self.insert(TypeKind::Void)
  }

  pub(crate) fn prim(&mut self, p: PrimitiveType) -> TypeHandle {
    self.insert(TypeKind::Primitive(p))
  }

  pub(crate) fn scalar(&mut self, kind: ScalarKind) -> TypeHandle {
    self.prim(PrimitiveType::scalar(kind))
  }

  pub(crate) fn array(&mut self, element: TypeHandle, len: u32) -> Result<TypeHandle> {
    match self.kind(element) {
      TypeKind::Array { len: 0, .. } => {
        return Err(ShaderError::type_error("runtime-sized arrays cannot be array elements"));
      }

      kind if !kind.is_storable() => {
        return Err(ShaderError::type_error(format!(
          "`{}` cannot be an array element",
          self.display(element)
        )));
      }

      TypeKind::Struct(s) if self.has_runtime_tail(s) => {
        return Err(ShaderError::type_error(format!(
          "struct `{}` ends with a runtime-sized array and cannot be an array element",
          s.name
        )));
      }

      _ => (),
    }

    let (size, align) = self.size_align(element, LayoutPolicy::Packed)?;
    if layout::round_up(size, align).and_then(|stride| stride.checked_mul(len)).is_none() {
      return Err(ShaderError::type_error(format!(
        "array<{}, {}> does not fit in a 32-bit address space",
        self.display(element),
        len
      )));
    }

    Ok(self.insert(TypeKind::Array { element, len }))
  }

  /// Type equivalent to `ty` in which every struct uses the std140 layout.
  ///
  /// Packed structs are replaced by a std140 copy named `<name>_std140`.
  pub(crate) fn std140(&mut self, ty: TypeHandle) -> Result<TypeHandle> {
    match self.kind(ty).clone() {
      TypeKind::Array { element, len } => {
        let element = self.std140(element)?;
        self.array(element, len)
      }

      TypeKind::Struct(s) if s.policy == LayoutPolicy::Packed => {
        self.structure(Some(&format!("{}_std140", s.name)), LayoutPolicy::Std140, s.members)
      }

      _ => Ok(ty),
    }
  }

  pub(crate) fn pointer(&mut self, pointee: TypeHandle, space: AddressSpace) -> Result<TypeHandle> {
    if !self.kind(pointee).is_storable() {
      return Err(ShaderError::type_error(format!(
        "cannot point to a value of type `{}`",
        self.display(pointee)
      )));
    }

    Ok(self.insert(TypeKind::Pointer { pointee, space }))
  }

  pub(crate) fn structure(
    &mut self,
    name: Option<&str>,
    policy: LayoutPolicy,
    members: Vec<StructMember>,
  ) -> Result<TypeHandle> {
    if let Some(name) = name {
      check_identifier(name)?;
    }

    if members.is_empty() {
      return Err(ShaderError::declaration("structs must have at least one member"));
    }

    // std140 structs only nest std140 structs
    let members = match policy {
      LayoutPolicy::Std140 => members
        .into_iter()
        .map(|m| {
          Ok(StructMember {
            ty: self.std140(m.ty)?,
            name: m.name,
          })
        })
        .collect::<Result<Vec<_>>>()?,
      LayoutPolicy::Packed => members,
    };

    for (i, member) in members.iter().enumerate() {
      check_identifier(&member.name)?;

      if members[..i].iter().any(|m| m.name == member.name) {
        return Err(ShaderError::declaration(format!(
          "duplicate struct member `{}`",
          member.name
        )));
      }

      let kind = self.kind(member.ty);
      if !kind.is_storable() {
        return Err(ShaderError::declaration(format!(
          "struct member `{}` cannot have type `{}`",
          member.name,
          self.display(member.ty)
        )));
      }

      let last = i + 1 == members.len();
      let runtime = match kind {
        TypeKind::Array { len: 0, .. } => true,
        TypeKind::Struct(s) => self.has_runtime_tail(s),
        _ => false,
      };

      if runtime && !last {
        return Err(ShaderError::declaration(format!(
          "runtime-sized member `{}` must be the last member of its struct",
          member.name
        )));
      }
    }

    let key = format!(
      "struct<{}>{{{}}}",
      policy.name(),
      members
        .iter()
        .map(|m| format!("{}:{};", m.name, self.get(m.ty).key))
        .collect::<String>()
    );

    if let Some(&existing) = self.by_key.get(&key) {
      return Ok(existing);
    }

    let name = match name {
      Some(name) => {
        if self.struct_names.contains_key(name) {
          return Err(ShaderError::declaration(format!(
            "struct `{}` is already declared with different members",
            name
          )));
        }

        name.to_owned()
      }

      None => loop {
        let candidate = format!("Struct{}", self.next_anonymous);
        self.next_anonymous += 1;

        if !self.struct_names.contains_key(&candidate) {
          break candidate;
        }
      },
    };

    let layout = self.struct_layout(&members, policy)?;
    let handle = self.push(
      key,
      TypeKind::Struct(StructType {
        name: name.clone(),
        policy,
        members,
        layout,
      }),
    );
    self.struct_names.insert(name, handle);

    Ok(handle)
  }

  /// Whether `ty` is a runtime-sized array or a struct ending with one.
  pub fn is_runtime_sized(&self, ty: TypeHandle) -> bool {
    match self.kind(ty) {
      TypeKind::Array { len: 0, .. } => true,
      TypeKind::Struct(s) => self.has_runtime_tail(s),
      _ => false,
    }
  }

  fn has_runtime_tail(&self, s: &StructType) -> bool {
    s.members.last().map_or(false, |m| match self.kind(m.ty) {
      TypeKind::Array { len: 0, .. } => true,
      TypeKind::Struct(inner) => self.has_runtime_tail(inner),
      _ => false,
    })
  }

  fn insert(&mut self, kind: TypeKind) -> TypeHandle {
    let key = match &kind {
      TypeKind::Void => "void".to_owned(),
      TypeKind::Primitive(p) => p.to_string(),
      TypeKind::Array { element, len } => format!("array<{},{}>", self.get(*element).key, len),
      TypeKind::Struct(s) => format!("struct:{}", s.name),
      TypeKind::Pointer { pointee, space } => format!("ptr<{},{}>", space.name(), self.get(*pointee).key),
      TypeKind::Texture(t) => format!(
        "texture<{:?},{:?},{}>",
        t.dimension, t.sample_type, t.multisampled
      ),
      TypeKind::Sampler(kind) => format!("sampler<{:?}>", kind),
    };

    match self.by_key.get(&key) {
      Some(&handle) => handle,
      None => self.push(key, kind),
    }
  }

  fn push(&mut self, key: String, kind: TypeKind) -> TypeHandle {
    let handle = TypeHandle(self.types.len() as u32);
    log::trace!("interning type {} as {:?}", key, handle);

    self.by_key.insert(key.clone(), handle);
    self.types.push(TypeInfo { key, kind });
    handle
  }
}

/// Check that `name` can be used as an identifier in every target language.
pub(crate) fn check_identifier(name: &str) -> Result<()> {
  let mut chars = name.chars();
  let valid = chars
    .next()
    .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    && !name.starts_with("gl_")
    && !name.starts_with("__");

  if valid {
    Ok(())
  } else {
    Err(ShaderError::parameter(format!("`{}` is not a valid identifier", name)))
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn light(name: &str) -> TypeDesc {
    TypeDesc::structure(
      Some(name),
      LayoutPolicy::Std140,
      vec![
        ("color".to_owned(), TypeDesc::vec3()),
        ("intensity".to_owned(), TypeDesc::f32()),
      ],
    )
  }

  #[test]
  fn structural_identity() {
    let mut reg = TypeRegistry::new();
    let a = reg.intern(&TypeDesc::array(TypeDesc::vec4(), 4)).unwrap();
    let b = reg.intern(&TypeDesc::array(TypeDesc::vec4(), 4)).unwrap();
    let c = reg.intern(&TypeDesc::array(TypeDesc::vec4(), 3)).unwrap();

    assert_eq!(a, b);
    assert_ne!(a, c);
  }

  #[test]
  fn same_struct_twice_is_one_type() {
    let mut reg = TypeRegistry::new();
    let a = reg.intern(&light("Light")).unwrap();
    let b = reg.intern(&light("Light")).unwrap();

    assert_eq!(a, b);
    assert_eq!(reg.struct_type(a).unwrap().name, "Light");
  }

  #[test]
  fn structure_wins_over_name() {
    let mut reg = TypeRegistry::new();
    let a = reg.intern(&light("Light")).unwrap();
    let b = reg.intern(&light("Lamp")).unwrap();

    assert_eq!(a, b);
  }

  #[test]
  fn name_clash_with_different_members() {
    let mut reg = TypeRegistry::new();
    reg.intern(&light("Light")).unwrap();

    let other = TypeDesc::structure(
      Some("Light"),
      LayoutPolicy::Std140,
      vec![("radius".to_owned(), TypeDesc::f32())],
    );

    assert!(matches!(reg.intern(&other), Err(ShaderError::Declaration(_))));
  }

  #[test]
  fn std140_structs_nest_std140_structs() {
    let mut reg = TypeRegistry::new();
    let inner = TypeDesc::structure(
      Some("Inner"),
      LayoutPolicy::Packed,
      vec![("weights".to_owned(), TypeDesc::array(TypeDesc::f32(), 2))],
    );
    let packed = reg.intern(&inner).unwrap();

    let outer = TypeDesc::structure(
      Some("Outer"),
      LayoutPolicy::Std140,
      vec![("inner".to_owned(), inner), ("b".to_owned(), TypeDesc::f32())],
    );
    let outer = reg.intern(&outer).unwrap();
    let outer = reg.struct_type(outer).unwrap();
    let member = outer.members[0].ty;
    assert_eq!(outer.layout.offsets, vec![0, 32]);

    let promoted = reg.struct_type(member).unwrap();
    assert_ne!(member, packed);
    assert_eq!(promoted.name, "Inner_std140");
    assert_eq!(promoted.policy, LayoutPolicy::Std140);
    assert_eq!(promoted.layout.size, 32);

    // already std140
    assert_eq!(reg.std140(member).unwrap(), member);
  }

  #[test]
  fn anonymous_structs_get_names() {
    let mut reg = TypeRegistry::new();
    let desc = TypeDesc::structure(None, LayoutPolicy::Packed, vec![("x".to_owned(), TypeDesc::i32())]);
    let ty = reg.intern(&desc).unwrap();

    assert_eq!(reg.struct_type(ty).unwrap().name, "Struct0");
  }

  #[test]
  fn runtime_array_must_be_last() {
    let mut reg = TypeRegistry::new();
    let desc = TypeDesc::structure(
      Some("Particles"),
      LayoutPolicy::Packed,
      vec![
        ("items".to_owned(), TypeDesc::runtime_array(TypeDesc::vec4())),
        ("count".to_owned(), TypeDesc::u32()),
      ],
    );

    assert!(matches!(reg.intern(&desc), Err(ShaderError::Declaration(_))));
  }

  #[test]
  fn invalid_primitives() {
    let mut reg = TypeRegistry::new();
    assert!(reg.intern(&TypeDesc::vec(ScalarKind::F32, 5)).is_err());
    assert!(reg
      .intern(&TypeDesc::Primitive(PrimitiveType::matrix(ScalarKind::I32, 2, 2)))
      .is_err());
  }

  #[test]
  fn identifiers() {
    assert!(check_identifier("albedo_2").is_ok());
    assert!(check_identifier("2albedo").is_err());
    assert!(check_identifier("gl_Position").is_err());
    assert!(check_identifier("").is_err());
  }
}

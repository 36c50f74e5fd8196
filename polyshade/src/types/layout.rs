//! Memory layout of host-shareable types.
//!
//! `Packed` is the natural WGSL layout, the one storage buffers use. `Std140` is the uniform block layout shared by
//! GLSL ES 3.00 and WGSL uniform buffers. Structs are always laid out with their own policy, even when nested.

use super::{LayoutPolicy, PrimitiveType, StructMember, TypeHandle, TypeKind, TypeRegistry};
use crate::error::{Result, ShaderError};
use serde::Serialize;

/// Byte offsets of the members of a struct, along with its alignment and size.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct StructLayout {
  pub offsets: Vec<u32>,
  pub alignment: u32,
  pub size: u32,
}

/// Round `value` up to a multiple of `align`; `None` on overflow.
pub(crate) fn round_up(value: u32, align: u32) -> Option<u32> {
  if align == 0 {
    return Some(value);
  }

  value.checked_add(align - 1).map(|v| v / align * align)
}

fn too_large(what: impl std::fmt::Display) -> ShaderError {
  ShaderError::type_error(format!("{} does not fit in a 32-bit address space", what))
}

/// Natural size and alignment of a scalar or vector.
pub(crate) fn vector_size_align(p: PrimitiveType) -> (u32, u32) {
  let component = p.scalar.byte_size();
  let align = match p.rows {
    1 => component,
    2 => 2 * component,
    _ => 4 * component,
  };

  (p.rows as u32 * component, align)
}

/// Distance between two columns of a matrix, and the alignment of the matrix.
pub(crate) fn matrix_stride_align(p: PrimitiveType, policy: LayoutPolicy) -> (u32, u32) {
  let (size, align) = vector_size_align(p.element());

  match policy {
    LayoutPolicy::Packed => ((size + align - 1) / align * align, align),
    LayoutPolicy::Std140 => ((size + 15) / 16 * 16, 16),
  }
}

impl TypeRegistry {
  /// Size and alignment of `ty` under `policy`.
  ///
  /// Runtime-sized arrays have a size of zero. Fails when the size overflows 32 bits.
  pub fn size_align(&self, ty: TypeHandle, policy: LayoutPolicy) -> Result<(u32, u32)> {
    match self.kind(ty) {
      TypeKind::Primitive(p) if p.is_matrix() => {
        let (stride, align) = matrix_stride_align(*p, policy);
        Ok((p.cols as u32 * stride, align))
      }

      TypeKind::Primitive(p) => Ok(vector_size_align(*p)),

      TypeKind::Array { element, len } => {
        let (size, align) = self.size_align(*element, policy)?;
        let (stride, align) = match policy {
          LayoutPolicy::Packed => (round_up(size, align), align),
          LayoutPolicy::Std140 => (round_up(size, align).and_then(|s| round_up(s, 16)), align.max(16)),
        };

        let size = stride
          .and_then(|stride| stride.checked_mul(*len))
          .ok_or_else(|| too_large(format!("`{}`", self.display(ty))))?;

        Ok((size, align))
      }

      TypeKind::Struct(s) => Ok((s.layout.size, s.layout.alignment)),

      _ => Ok((0, 1)),
    }
  }

  /// Lay out struct members one after the other, each at the next offset satisfying its alignment.
  pub(crate) fn struct_layout(&self, members: &[StructMember], policy: LayoutPolicy) -> Result<StructLayout> {
    let mut offsets = Vec::with_capacity(members.len());
    let mut offset = 0u32;
    let mut alignment = 1;

    for member in members {
      let (size, align) = self.size_align(member.ty, policy)?;
      let start = round_up(offset, align).ok_or_else(|| too_large(format!("member `{}`", member.name)))?;
      offsets.push(start);
      offset = start
        .checked_add(size)
        .ok_or_else(|| too_large(format!("member `{}`", member.name)))?;
      alignment = alignment.max(align);
    }

    if policy == LayoutPolicy::Std140 {
      alignment = alignment.max(16);
    }

    let size = round_up(offset, alignment).ok_or_else(|| too_large("struct"))?;

    Ok(StructLayout {
      offsets,
      alignment,
      size,
    })
  }
}

#[cfg(test)]
mod test {
  use crate::{
    error::ShaderError,
    types::{LayoutPolicy, TypeDesc, TypeRegistry},
  };

  fn layout_of(members: Vec<(&str, TypeDesc)>, policy: LayoutPolicy) -> (Vec<u32>, u32, u32) {
    let mut reg = TypeRegistry::new();
    let desc = TypeDesc::structure(
      None,
      policy,
      members.into_iter().map(|(n, t)| (n.to_owned(), t)),
    );
    let ty = reg.intern(&desc).unwrap();
    let layout = &reg.struct_type(ty).unwrap().layout;

    (layout.offsets.clone(), layout.alignment, layout.size)
  }

  #[test]
  fn std140_vec3_then_float() {
    let (offsets, align, size) = layout_of(
      vec![("dir", TypeDesc::vec3()), ("power", TypeDesc::f32())],
      LayoutPolicy::Std140,
    );

    assert_eq!(offsets, vec![0, 12]);
    assert_eq!(align, 16);
    assert_eq!(size, 16);
  }

  #[test]
  fn std140_float_then_vec3() {
    let (offsets, _, size) = layout_of(
      vec![("power", TypeDesc::f32()), ("dir", TypeDesc::vec3())],
      LayoutPolicy::Std140,
    );

    assert_eq!(offsets, vec![0, 16]);
    assert_eq!(size, 32);
  }

  #[test]
  fn std140_arrays_and_matrices() {
    let (offsets, _, size) = layout_of(
      vec![
        ("weights", TypeDesc::array(TypeDesc::f32(), 3)),
        ("model", TypeDesc::mat(4, 4)),
        ("normal", TypeDesc::mat(3, 3)),
        ("uv", TypeDesc::vec2()),
      ],
      LayoutPolicy::Std140,
    );

    // float[3] has a 16 byte stride; mat3 has three 16 byte columns
    assert_eq!(offsets, vec![0, 48, 112, 160]);
    assert_eq!(size, 176);
  }

  #[test]
  fn packed_follows_natural_alignment() {
    let (offsets, align, size) = layout_of(
      vec![
        ("power", TypeDesc::f32()),
        ("dir", TypeDesc::vec3()),
        ("weights", TypeDesc::array(TypeDesc::f32(), 3)),
      ],
      LayoutPolicy::Packed,
    );

    assert_eq!(offsets, vec![0, 16, 28]);
    assert_eq!(align, 16);
    assert_eq!(size, 48);
  }

  #[test]
  fn packed_vectors_after_scalars() {
    let (offsets, _, size) = layout_of(
      vec![
        ("count", TypeDesc::u32()),
        ("uv", TypeDesc::vec2()),
        ("v", TypeDesc::vec4()),
        ("normal", TypeDesc::mat(3, 3)),
      ],
      LayoutPolicy::Packed,
    );

    assert_eq!(offsets, vec![0, 8, 16, 32]);
    assert_eq!(size, 80);
  }

  #[test]
  fn nested_structs_keep_their_layout() {
    let mut reg = TypeRegistry::new();
    let inner = TypeDesc::structure(Some("Inner"), LayoutPolicy::Std140, vec![("a".to_owned(), TypeDesc::f32())]);
    let outer = TypeDesc::structure(
      Some("Outer"),
      LayoutPolicy::Packed,
      vec![("inner".to_owned(), inner), ("b".to_owned(), TypeDesc::f32())],
    );

    let ty = reg.intern(&outer).unwrap();
    let layout = &reg.struct_type(ty).unwrap().layout;
    assert_eq!(layout.offsets, vec![0, 16]);
    assert_eq!(layout.size, 32);
  }

  #[test]
  fn oversized_arrays() {
    let mut reg = TypeRegistry::new();
    let huge = TypeDesc::array(TypeDesc::vec4(), u32::MAX);

    assert!(matches!(reg.intern(&huge), Err(ShaderError::Type(_))));

    // fits when packed, not under std140
    let floats = reg.intern(&TypeDesc::array(TypeDesc::f32(), 1 << 29)).unwrap();
    assert_eq!(reg.size_align(floats, LayoutPolicy::Packed).unwrap(), (1 << 31, 4));
    assert!(reg.size_align(floats, LayoutPolicy::Std140).is_err());

    let desc = TypeDesc::structure(
      None,
      LayoutPolicy::Std140,
      vec![("floats".to_owned(), TypeDesc::array(TypeDesc::f32(), 1 << 29))],
    );
    assert!(matches!(reg.intern(&desc), Err(ShaderError::Type(_))));
  }
}

//! Mapping from host (Rust) types to shader types.

use super::{PrimitiveType, ScalarKind, TypeDesc};

macro_rules! make_vn {
  ($t:ident, $dim:expr) => {
    /// Scalar vectors.
    ///
    /// Scalar vectors come into three flavors, based on the dimension used:
    ///
    /// - Two dimensions (2D): [`V2<T>`].
    /// - Three dimensions (3D): [`V3<T>`].
    /// - Four dimensions (4D): [`V4<T>`].
    ///
    /// Each type implements the [`From`] trait for sized array, so that host-side data can be laid out the same way
    /// the shader sees it.
    #[derive(Clone, Copy, Debug, PartialEq)]
    #[repr(transparent)]
    pub struct $t<T>(pub [T; $dim]);

    impl<T> From<[T; $dim]> for $t<T> {
      fn from(a: [T; $dim]) -> Self {
        Self(a)
      }
    }
  };
}

make_vn!(V2, 2);
make_vn!(V3, 3);
make_vn!(V4, 4);

/// Matrix wrapper.
///
/// This type represents a matrix of a given dimension, deduced from the wrapped type. Matrices are column-major:
/// `Matrix<[[f32; R]; C]>` has `C` columns of `R` rows.
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(transparent)]
pub struct Matrix<T>(pub T);

impl<T, const R: usize, const C: usize> From<[[T; R]; C]> for Matrix<[[T; R]; C]> {
  fn from(a: [[T; R]; C]) -> Self {
    Matrix(a)
  }
}

/// Class of host types mapping to a scalar, vector or matrix shader type.
pub trait ToPrimType {
  /// Mapped primitive type.
  const PRIM_TYPE: PrimitiveType;
}

macro_rules! impl_ToPrimType {
  ($t:ty, $q:ident, $d:expr) => {
    impl ToPrimType for $t {
      const PRIM_TYPE: PrimitiveType = PrimitiveType::vector(ScalarKind::$q, $d);
    }
  };
}

impl_ToPrimType!(i32, I32, 1);
impl_ToPrimType!(u32, U32, 1);
impl_ToPrimType!(f32, F32, 1);
impl_ToPrimType!(bool, Bool, 1);
impl_ToPrimType!(V2<i32>, I32, 2);
impl_ToPrimType!(V2<u32>, U32, 2);
impl_ToPrimType!(V2<f32>, F32, 2);
impl_ToPrimType!(V2<bool>, Bool, 2);
impl_ToPrimType!(V3<i32>, I32, 3);
impl_ToPrimType!(V3<u32>, U32, 3);
impl_ToPrimType!(V3<f32>, F32, 3);
impl_ToPrimType!(V3<bool>, Bool, 3);
impl_ToPrimType!(V4<i32>, I32, 4);
impl_ToPrimType!(V4<u32>, U32, 4);
impl_ToPrimType!(V4<f32>, F32, 4);
impl_ToPrimType!(V4<bool>, Bool, 4);

macro_rules! make_mat_ty {
  ($t:ident, $c:expr, $r:expr) => {
    pub type $t = Matrix<[[f32; $r]; $c]>;

    impl ToPrimType for Matrix<[[f32; $r]; $c]> {
      const PRIM_TYPE: PrimitiveType = PrimitiveType::matrix(ScalarKind::F32, $c, $r);
    }
  };
}

make_mat_ty!(M22, 2, 2);
make_mat_ty!(M23, 2, 3);
make_mat_ty!(M24, 2, 4);
make_mat_ty!(M32, 3, 2);
make_mat_ty!(M33, 3, 3);
make_mat_ty!(M34, 3, 4);
make_mat_ty!(M42, 4, 2);
make_mat_ty!(M43, 4, 3);
make_mat_ty!(M44, 4, 4);

/// Represent a host type as a shader type.
///
/// Any type implementing [`ToPrimType`] automatically implements [`ToType`]; so do fixed-size arrays of [`ToType`]
/// types. Structs get an implementation through `#[derive(ShaderStruct)]`.
pub trait ToType {
  fn ty() -> TypeDesc;
}

impl<T> ToType for T
where
  T: ToPrimType,
{
  fn ty() -> TypeDesc {
    TypeDesc::Primitive(T::PRIM_TYPE)
  }
}

impl<T, const N: usize> ToType for [T; N]
where
  T: ToType,
{
  fn ty() -> TypeDesc {
    TypeDesc::array(T::ty(), N as u32)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn host_types() {
    assert_eq!(f32::ty(), TypeDesc::f32());
    assert_eq!(<V3<f32>>::ty(), TypeDesc::vec3());
    assert_eq!(M34::ty(), TypeDesc::mat(3, 4));
    assert_eq!(<[V4<f32>; 8]>::ty(), TypeDesc::array(TypeDesc::vec4(), 8));
  }
}

use polyshade::{
  swizzle::Swizzle, BuilderConfig, LayoutPolicy, ProgramBuilder, ScalarKind, Target, TypeDesc, TypeRegistry,
};
use proptest::prelude::*;

const POSITION: [char; 4] = ['x', 'y', 'z', 'w'];
const COLOR: [char; 4] = ['r', 'g', 'b', 'a'];

/// Vector size and a mask written with a single letter set, within that size.
fn legal_mask() -> impl Strategy<Value = (u8, String)> {
  (2u8..=4).prop_flat_map(|n| {
    let letters = prop::collection::vec(0..n as usize, 1..=n as usize);
    (Just(n), any::<bool>(), letters).prop_map(|(n, color, indices)| {
      let set = if color { COLOR } else { POSITION };
      (n, indices.into_iter().map(|i| set[i]).collect())
    })
  })
}

/// Vector size and a mask mixing both letter sets.
fn mixed_mask() -> impl Strategy<Value = (u8, String)> {
  (2u8..=4).prop_flat_map(|n| {
    let letters = prop::collection::vec(0..n as usize, 2..=n as usize);
    (Just(n), letters).prop_map(|(n, indices)| {
      let last = indices.len() - 1;
      let mask = indices
        .iter()
        .enumerate()
        .map(|(k, &i)| if k == last { COLOR[i] } else { POSITION[i] })
        .collect();
      (n, mask)
    })
  })
}

/// Vector size and a mask with more letters than components.
fn long_mask() -> impl Strategy<Value = (u8, String)> {
  (2u8..=4).prop_flat_map(|n| {
    let letters = prop::collection::vec(0..n as usize, n as usize + 1..=5);
    (Just(n), letters).prop_map(|(n, indices)| (n, indices.into_iter().map(|i| POSITION[i]).collect()))
  })
}

fn swizzle_in_program(n: u8, mask: &str) -> polyshade::Result<()> {
  let mut pb = ProgramBuilder::new(BuilderConfig::new(Target::WebGPU));
  pb.try_build_compute("swizzle", |pb| {
    pb.main(|pb| {
      let v = pb.declare_var("v", &TypeDesc::vec(ScalarKind::F32, n))?;
      let s = pb.swizzle(v, mask)?;
      pb.declare_local("s", s)?;
      Ok(())
    })
  })
  .map(|_| ())
}

fn member_type() -> impl Strategy<Value = TypeDesc> {
  prop_oneof![
    Just(TypeDesc::f32()),
    Just(TypeDesc::i32()),
    Just(TypeDesc::vec2()),
    Just(TypeDesc::vec3()),
    Just(TypeDesc::vec4()),
    Just(TypeDesc::mat(4, 4)),
    Just(TypeDesc::array(TypeDesc::f32(), 3)),
  ]
}

fn members() -> impl Strategy<Value = Vec<(String, TypeDesc)>> {
  prop::collection::vec(member_type(), 1..6)
    .prop_map(|tys| tys.into_iter().enumerate().map(|(i, ty)| (format!("m{}", i), ty)).collect())
}

proptest! {
  #[test]
  fn legal_swizzles_succeed((n, mask) in legal_mask()) {
    let sw = Swizzle::parse(&mask, n).unwrap();
    prop_assert_eq!(sw.len() as usize, mask.len());
    prop_assert_eq!(sw.to_string(), mask.clone());
    prop_assert!(swizzle_in_program(n, &mask).is_ok());
  }

  #[test]
  fn mixed_swizzles_fail((n, mask) in mixed_mask()) {
    prop_assert!(Swizzle::parse(&mask, n).is_err());
    prop_assert!(swizzle_in_program(n, &mask).is_err());
  }

  #[test]
  fn long_swizzles_fail((n, mask) in long_mask()) {
    prop_assert!(Swizzle::parse(&mask, n).is_err());
  }

  #[test]
  fn structs_are_identified_by_shape(members in members(), std140 in any::<bool>()) {
    let layout = if std140 { LayoutPolicy::Std140 } else { LayoutPolicy::Packed };
    let mut types = TypeRegistry::new();

    let named = types.intern(&TypeDesc::structure(Some("Named"), layout, members.clone())).unwrap();
    let anonymous = types.intern(&TypeDesc::structure(None, layout, members.clone())).unwrap();
    prop_assert_eq!(named, anonymous);
    prop_assert_eq!(types.get(named).key(), types.get(anonymous).key());

    let mut longer = members.clone();
    longer.push(("extra".to_owned(), TypeDesc::f32()));
    let other = types.intern(&TypeDesc::structure(None, layout, longer)).unwrap();
    prop_assert_ne!(named, other);
  }
}

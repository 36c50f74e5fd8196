#![cfg(feature = "edsl")]

use polyshade::{
  types::{M44, V3, V4},
  BuilderConfig, LayoutPolicy, ProgramBuilder, ShaderStruct, StructDesc, Target, ToType, TypeDesc,
};

#[allow(dead_code)]
#[derive(ShaderStruct)]
#[shader(std140)]
struct Camera {
  view_proj: M44,
  eye: V3<f32>,
  r#near: f32,
}

#[allow(dead_code)]
#[derive(ShaderStruct)]
#[shader(name = "PointLight")]
struct Light {
  position: V4<f32>,
  color: V3<f32>,
  radius: f32,
}

#[allow(dead_code)]
#[derive(ShaderStruct)]
struct Scene {
  lights: [Light; 4],
  count: u32,
}

#[test]
fn derived_descriptions() {
  assert_eq!(
    Camera::ty(),
    TypeDesc::Struct(StructDesc {
      name: Some("Camera".to_owned()),
      layout: LayoutPolicy::Std140,
      members: vec![
        ("view_proj".to_owned(), TypeDesc::mat(4, 4)),
        ("eye".to_owned(), TypeDesc::vec3()),
        ("near".to_owned(), TypeDesc::f32()),
      ],
    })
  );

  match Light::ty() {
    TypeDesc::Struct(s) => {
      assert_eq!(s.name.as_deref(), Some("PointLight"));
      assert_eq!(s.layout, LayoutPolicy::Packed);
    }
    other => panic!("expected a struct, got {:?}", other),
  }
}

#[test]
fn derived_structs_in_programs() {
  let mut pb = ProgramBuilder::new(BuilderConfig::new(Target::WebGPU));
  let program = pb
    .try_build_render(
      "derived",
      |pb| {
        let camera = pb.uniform("camera", &Camera::ty(), 0)?;
        pb.main(|pb| {
          let eye = pb.member(camera, "eye")?;
          pb.declare_local("eye", eye)?;
          Ok(())
        })
      },
      |pb| {
        pb.storage("scene", &Scene::ty(), 1, true)?;
        pb.main(|_| Ok(()))
      },
    )
    .unwrap();

  assert!(program.vertex.source.contains("struct Camera {"));
  assert!(program.vertex.source.contains("var eye: vec3<f32> = ublock_vs_0.camera.eye;"));

  let fs = &program.fragment.source;
  let light = fs.find("struct PointLight {").unwrap();
  let scene = fs.find("struct Scene {").unwrap();
  assert!(light < scene);
  assert!(fs.contains("lights: array<PointLight, 4>,"));
  assert!(fs.contains("@group(1) @binding(0) var<storage, read> scene: Scene;"));
}

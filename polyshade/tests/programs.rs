use polyshade::{
  BindGroupLayout, BindingResource, BufferBindingLayout, BuilderConfig, BuiltinVar, LayoutPolicy, ProgramBuilder,
  RenderProgram, Result, ScalarKind, ShaderError, StageMask, Target, TextureSampleType, TextureType,
  TextureViewDimension, TypeDesc, VertexSemantic,
};

fn builder(target: Target) -> ProgramBuilder {
  ProgramBuilder::new(BuilderConfig::new(target))
}

fn count(haystack: &str, needle: &str) -> usize {
  haystack.matches(needle).count()
}

/// Position + uv pass-through, sampling a texture in the fragment stage.
fn textured(pb: &mut ProgramBuilder) -> Result<RenderProgram> {
  pb.try_build_render(
    "textured",
    |pb| {
      let position = pb.vertex_input("position", &TypeDesc::vec3(), VertexSemantic::Position)?;
      let uv_in = pb.vertex_input("uv_in", &TypeDesc::vec2(), VertexSemantic::TexCoord0)?;
      let mvp = pb.uniform("mvp", &TypeDesc::mat(4, 4), 0)?;
      let uv = pb.output("uv", &TypeDesc::vec2())?;

      pb.main(|pb| {
        let p = pb.vec4((position, 1.))?;
        let clip = pb.mul(mvp, p)?;
        pb.set_builtin(BuiltinVar::Position, clip)?;
        pb.assign(uv, uv_in)
      })
    },
    |pb| {
      let albedo = pb.uniform_texture(
        "albedo",
        TextureType::new(TextureViewDimension::D2, TextureSampleType::Float),
        0,
      )?;
      let color = pb.output("color", &TypeDesc::vec4())?;

      pb.main(|pb| {
        let uv = pb.get("uv")?;
        let texel = pb.texture_sample(albedo, uv)?;
        pb.assign(color, texel)
      })
    },
  )
}

#[test]
fn output_and_texture_program() {
  let mut pb = builder(Target::WebGPU);
  let program = pb
    .try_build_render(
      "scenario",
      |pb| {
        let color = pb.output("color", &TypeDesc::vec4())?;
        pb.main(|pb| {
          let c = pb.vec4((1., 0., 0., 1.))?;
          pb.assign(color, c)
        })
      },
      |pb| {
        let tex = pb.uniform_texture(
          "albedo",
          TextureType::new(TextureViewDimension::D2, TextureSampleType::Float),
          0,
        )?;
        let out = pb.output("frag", &TypeDesc::vec4())?;
        pb.main(|pb| {
          let color = pb.get("color")?;
          let uv = pb.swizzle(color, "xy")?;
          let texel = pb.texture_sample(tex, uv)?;
          pb.assign(out, texel)
        })
      },
    )
    .unwrap();

  assert!(!program.vertex.source.is_empty());
  assert!(!program.fragment.source.is_empty());
  assert!(program.vertex_attributes.is_empty());

  assert_eq!(program.bind_group_layouts.len(), 1);
  let group = &program.bind_group_layouts[0];
  assert_eq!(group.entries.len(), 2);
  assert!(matches!(group.entries[0].resource, BindingResource::Texture(_)));
  assert!(matches!(group.entries[1].resource, BindingResource::Sampler(_)));
  assert_eq!(group.entries[1].name, "albedo_sampler");
  assert_eq!(program.implicit_samplers, ["albedo_sampler"]);

  let fs = &program.fragment.source;
  assert!(fs.contains("@group(0) @binding(0) var albedo: texture_2d<f32>;"));
  assert!(fs.contains("@group(0) @binding(1) var albedo_sampler: sampler;"));
  assert!(fs.contains("textureSample(albedo, albedo_sampler, stage_in.color.xy)"));
  assert!(fs.contains("@fragment\nfn main(input: FragmentInput) -> FragmentOutput {"));

  let vs = &program.vertex.source;
  assert!(vs.contains("@builtin(position) builtin_position: vec4<f32>,"));
  assert!(vs.contains("@location(0) color: vec4<f32>,"));
  assert!(vs.contains("@vertex\nfn main() -> VertexOutput {"));
}

#[test]
fn same_struct_in_both_stages() {
  let light = TypeDesc::structure(
    Some("Light"),
    LayoutPolicy::Std140,
    vec![("dir".to_owned(), TypeDesc::vec3()), ("power".to_owned(), TypeDesc::f32())],
  );

  for target in [Target::WebGL, Target::WebGL2, Target::WebGPU] {
    let mut vertex_ty = None;
    let mut fragment_ty = None;

    let mut pb = builder(target);
    let program = pb
      .try_build_render(
        "lights",
        |pb| {
          vertex_ty = Some(pb.ty(&light)?);
          pb.uniform("light", &light, 0)?;
          pb.main(|_| Ok(()))
        },
        |pb| {
          fragment_ty = Some(pb.ty(&light)?);
          pb.uniform("light", &light, 0)?;
          pb.main(|_| Ok(()))
        },
      )
      .unwrap();

    assert_eq!(vertex_ty, fragment_ty);
    for stage in [&program.vertex, &program.fragment] {
      assert_eq!(stage.struct_types.iter().filter(|n| *n == "Light").count(), 1);
      assert_eq!(count(&stage.source, "struct Light {"), 1);
    }
  }
}

#[test]
fn struct_identity_ignores_names() {
  let mut pb = builder(Target::WebGPU);
  let members = || vec![("a".to_owned(), TypeDesc::f32()), ("b".to_owned(), TypeDesc::vec2())];

  let first = pb.ty(&TypeDesc::structure(Some("First"), LayoutPolicy::Packed, members())).unwrap();
  let second = pb.ty(&TypeDesc::structure(Some("Second"), LayoutPolicy::Packed, members())).unwrap();
  let std140 = pb.ty(&TypeDesc::structure(None, LayoutPolicy::Std140, members())).unwrap();

  assert_eq!(first, second);
  assert_ne!(first, std140);
}

#[test]
fn compiles_are_idempotent() {
  for target in [Target::WebGL, Target::WebGL2, Target::WebGPU] {
    let mut pb = builder(target);
    let first = textured(&mut pb).unwrap();

    pb.reset();
    let second = textured(&mut pb).unwrap();
    let third = textured(&mut builder(target)).unwrap();

    assert_eq!(first, second);
    assert_eq!(first, third);
  }
}

#[test]
fn uniforms_merge_by_visibility() {
  let program = builder(Target::WebGPU)
    .try_build_render(
      "merge",
      |pb| {
        let mvp = pb.uniform("mvp", &TypeDesc::mat(4, 4), 0)?;
        let time = pb.uniform("time", &TypeDesc::f32(), 0)?;
        pb.main(|pb| {
          let scaled = pb.mul(mvp, time)?;
          pb.eval(scaled)
        })
      },
      |pb| {
        let time = pb.uniform("time", &TypeDesc::f32(), 0)?;
        let tint = pb.uniform("tint", &TypeDesc::vec4(), 0)?;
        let color = pb.output("color", &TypeDesc::vec4())?;
        pb.main(|pb| {
          let c = pb.mul(tint, time)?;
          pb.assign(color, c)
        })
      },
    )
    .unwrap();

  let group = &program.bind_group_layouts[0];
  let names: Vec<_> = group.entries.iter().map(|e| e.name.as_str()).collect();
  assert_eq!(names, ["ublock_vs_0", "ublock_vsfs_0", "ublock_fs_0"]);
  assert_eq!(group.entries[1].visibility, StageMask::VERTEX | StageMask::FRAGMENT);

  let vs = &program.vertex.source;
  assert!(vs.contains("var<uniform> ublock_vs_0: UBlock_vs_0;"));
  assert!(vs.contains("var<uniform> ublock_vsfs_0: UBlock_vsfs_0;"));
  assert!(!vs.contains("ublock_fs_0"));
  assert!(vs.contains("(ublock_vs_0.mvp * ublock_vsfs_0.time)"));

  let fs = &program.fragment.source;
  assert_eq!(count(fs, "time: f32,"), 1);
  assert!(!fs.contains("mvp"));
  assert!(fs.contains("stage_out.color = (ublock_fs_0.tint * ublock_vsfs_0.time);"));
}

#[test]
fn uniform_blocks_per_glsl_version() {
  let program = textured(&mut builder(Target::WebGL2)).unwrap();
  let vs = &program.vertex.source;
  assert!(vs.starts_with("#version 300 es\n"));
  assert!(vs.contains("layout(std140) uniform UBlock_vs_0 {\n  mat4 mvp;\n} ublock_vs_0;"));
  assert!(vs.contains("layout(location = 0) in vec3 position;"));
  assert!(vs.contains("out vec2 uv;"));
  assert!(vs.contains("gl_Position = (ublock_vs_0.mvp * vec4(position, 1.0));"));

  let fs = &program.fragment.source;
  assert!(fs.contains("uniform sampler2D albedo;"));
  assert!(fs.contains("layout(location = 0) out vec4 color;"));
  assert!(fs.contains("color = texture(albedo, uv);"));

  let program = textured(&mut builder(Target::WebGL)).unwrap();
  let vs = &program.vertex.source;
  assert!(!vs.contains("#version"));
  assert!(vs.contains("struct UBlock_vs_0 {\n  mat4 mvp;\n};"));
  assert!(vs.contains("uniform UBlock_vs_0 ublock_vs_0;"));
  assert!(vs.contains("attribute vec3 position;"));
  assert!(vs.contains("varying vec2 uv;"));

  let fs = &program.fragment.source;
  assert!(fs.contains("varying vec2 uv;"));
  assert!(fs.contains("gl_FragColor = texture2D(albedo, uv);"));
}

#[test]
fn vertex_attributes_are_reported() {
  let program = textured(&mut builder(Target::WebGPU)).unwrap();
  let attributes: Vec<_> = program
    .vertex_attributes
    .iter()
    .map(|a| (a.name.as_str(), a.semantic, a.location))
    .collect();

  assert_eq!(
    attributes,
    [
      ("position", VertexSemantic::Position, 0),
      ("uv_in", VertexSemantic::TexCoord0, VertexSemantic::TexCoord0.location())
    ]
  );

  assert!(program.vertex.source.contains("fn main(input: VertexInput) -> VertexOutput {"));
  assert!(program.vertex.source.contains("stage_in = input;"));
}

#[test]
fn bindings_are_dense_per_group() {
  let float_2d = TextureType::new(TextureViewDimension::D2, TextureSampleType::Float);

  let program = builder(Target::WebGPU)
    .try_build_render(
      "dense",
      |pb| {
        pb.uniform("a", &TypeDesc::f32(), 2)?;
        pb.uniform_texture("height", float_2d, 2)?;
        pb.main(|_| Ok(()))
      },
      |pb| {
        pb.uniform_texture("diffuse", float_2d, 0)?;
        pb.uniform("b", &TypeDesc::vec4(), 2)?;
        pb.uniform_texture("normal", float_2d, 2)?;
        pb.main(|_| Ok(()))
      },
    )
    .unwrap();

  assert_eq!(program.bind_group_layouts.len(), 3);

  for (g, layout) in program.bind_group_layouts.iter().enumerate() {
    assert_eq!(layout.group, g as u32);
    assert_eq!(layout.label, format!("dense.group{}", g));

    let bindings: Vec<_> = layout.entries.iter().map(|e| e.binding).collect();
    let expected: Vec<_> = (0..layout.entries.len() as u32).collect();
    assert_eq!(bindings, expected);
  }

  assert!(program.bind_group_layouts[1].entries.is_empty());

  let names: Vec<_> = program.bind_group_layouts[2].entries.iter().map(|e| e.name.as_str()).collect();
  assert_eq!(
    names,
    ["ublock_vs_2", "height", "height_sampler", "ublock_fs_2", "normal", "normal_sampler"]
  );
}

#[test]
fn layouts_serialize() {
  let program = textured(&mut builder(Target::WebGPU)).unwrap();
  let json = serde_json::to_value(&program.bind_group_layouts).unwrap();

  assert_eq!(json[0]["label"], "textured.group0");
  assert_eq!(json[0]["entries"][0]["name"], "ublock_vs_0");
  assert_eq!(json[0]["entries"][0]["resource"]["buffer"]["layout"]["byte_size"], 64);
}

#[test]
fn capability_gating() {
  let gated = [
    TypeDesc::vec(ScalarKind::U32, 2),
    TypeDesc::mat(2, 3),
    TypeDesc::pointer(TypeDesc::f32(), polyshade::AddressSpace::Function),
  ];

  for desc in &gated {
    let mut webgl = builder(Target::WebGL);
    assert!(matches!(
      webgl.ty(desc),
      Err(ShaderError::Capability {
        target: Target::WebGL,
        ..
      })
    ));

    let mut webgpu = builder(Target::WebGPU);
    assert!(webgpu.ty(desc).is_ok());
  }
}

#[test]
fn storage_outside_webgpu() {
  let mut pb = builder(Target::WebGL2);
  let program = pb.build_render(
    "storage",
    |pb| {
      pb.storage("particles", &TypeDesc::runtime_array(TypeDesc::vec4()), 0, true)?;
      pb.main(|_| Ok(()))
    },
    |pb| pb.main(|_| Ok(())),
  );

  assert!(program.is_none());
  let msg = pb.last_error().unwrap();
  assert!(msg.contains("storage"));
  assert!(msg.contains("WebGL2"));
}

#[test]
fn failed_build_is_recoverable() {
  let mut pb = builder(Target::WebGPU);
  let failed = pb.build_render(
    "broken",
    |pb| {
      pb.main(|pb| {
        let v = pb.vec3((1., 2., 3.))?;
        pb.swizzle(v, "xg")?;
        Ok(())
      })
    },
    |pb| pb.main(|_| Ok(())),
  );

  assert!(failed.is_none());
  assert!(pb.last_error().is_some());

  pb.reset();
  assert!(textured(&mut pb).is_ok());
}

#[test]
fn wgsl_overloads_are_mangled() {
  let program = builder(Target::WebGPU)
    .try_build_compute("overloads", |pb| {
      pb.func("scale", &[("x", TypeDesc::f32())], |pb, args| {
        let r = pb.mul(args[0], 2.)?;
        pb.return_(r)
      })?;

      pb.func("scale", &[("x", TypeDesc::vec2())], |pb, args| {
        let r = pb.mul(args[0], 2.)?;
        pb.return_(r)
      })?;

      pb.main(|pb| {
        let v = pb.vec2((1., 2.))?;
        let s = pb.call("scale", (v,))?;
        pb.declare_local("s", s)?;
        Ok(())
      })
    })
    .unwrap();

  let cs = &program.compute.source;
  assert!(cs.contains("fn scale_0(x: f32) -> f32 {"));
  assert!(cs.contains("fn scale_1(x: vec2<f32>) -> vec2<f32> {"));
  assert!(cs.contains("var s: vec2<f32> = scale_1(vec2<f32>(1.0, 2.0));"));
  assert!(cs.contains("@compute @workgroup_size(1, 1, 1)\nfn main() {"));

  let program = builder(Target::WebGL2)
    .try_build_render(
      "overloads",
      |pb| pb.main(|_| Ok(())),
      |pb| {
        pb.func("scale", &[("x", TypeDesc::f32())], |pb, args| pb.return_(args[0]))?;
        pb.func("scale", &[("x", TypeDesc::vec2())], |pb, args| pb.return_(args[0]))?;
        pb.main(|pb| {
          pb.call("scale", (1.,))?;
          Ok(())
        })
      },
    )
    .unwrap();

  assert_eq!(count(&program.fragment.source, "float scale(float x) {"), 1);
  assert_eq!(count(&program.fragment.source, "vec2 scale(vec2 x) {"), 1);
}

#[test]
fn webgl_integer_remainder() {
  let program = builder(Target::WebGL)
    .try_build_render(
      "rem",
      |pb| pb.main(|_| Ok(())),
      |pb| {
        let color = pb.output("color", &TypeDesc::vec4())?;
        pb.main(|pb| {
          let i = pb.declare_local("i", 7)?;
          let r = pb.rem(i, 3)?;
          pb.declare_local("r", r)?;
          let c = pb.vec4((1., 1., 1., 1.))?;
          pb.assign(color, c)
        })
      },
    )
    .unwrap();

  let fs = &program.fragment.source;
  assert!(fs.contains("precision highp float;"));
  assert!(fs.contains("int i = 7;"));
  assert!(fs.contains("int r = int(mod(float(i), float(3)));"));
  assert!(fs.contains("gl_FragColor = vec4(1.0, 1.0, 1.0, 1.0);"));
}

#[test]
fn control_flow_rendering() {
  let build = |target| {
    builder(target)
      .try_build_render(
        "loops",
        |pb| pb.main(|_| Ok(())),
        |pb| {
          pb.main(|pb| {
            let acc = pb.declare_local("acc", 0.)?;

            pb.for_range("i", 0, 4, |pb, i| {
              let f = pb.cast(i, ScalarKind::F32)?;
              pb.assign_op(acc, polyshade::BinaryOp::Add, f)
            })?;

            pb.do_while(
              |pb| pb.assign_op(acc, polyshade::BinaryOp::Mul, 0.5),
              |pb| pb.gt(acc, 1.),
            )?;

            let big = pb.gt(acc, 10.)?;
            pb.if_(big, |pb| pb.discard())?;
            Ok(())
          })
        },
      )
      .unwrap()
  };

  let glsl = build(Target::WebGL2).fragment.source;
  assert!(glsl.contains("for (int i = 0; i < 4; i++) {"));
  assert!(glsl.contains("acc += float(i);"));
  assert!(glsl.contains("do {"));
  assert!(glsl.contains("} while ((acc > 1.0));"));
  assert!(glsl.contains("if ((acc > 10.0)) {"));
  assert!(glsl.contains("discard;"));

  let wgsl = build(Target::WebGPU).fragment.source;
  assert!(wgsl.contains("for (var i: i32 = 0i; (i < 4i); i++) {"));
  assert!(wgsl.contains("acc += f32(i);"));
  assert!(wgsl.contains("loop {"));
  assert!(wgsl.contains("continuing {"));
  assert!(wgsl.contains("break if !((acc > 1.0));"));
  assert!(wgsl.contains("if (acc > 10.0) {"));
  assert!(wgsl.contains("fn main() {"));
}

fn buffer(layouts: &[BindGroupLayout], group: usize, name: &str) -> BufferBindingLayout {
  match &layouts[group].entry(name).unwrap().resource {
    BindingResource::Buffer(b) => b.clone(),
    other => panic!("`{}` is not a buffer: {:?}", name, other),
  }
}

fn offsets(b: &BufferBindingLayout) -> Vec<(&str, u32)> {
  b.layout.members.iter().map(|m| (m.name.as_str(), m.offset)).collect()
}

#[test]
fn std140_blocks_match_wgsl() {
  let inner = TypeDesc::structure(Some("Inner"), LayoutPolicy::Std140, vec![("a".to_owned(), TypeDesc::f32())]);

  let mut pb = builder(Target::WebGPU);
  let program = pb
    .try_build_render(
      "padded",
      |pb| {
        let weights = pb.uniform("weights", &TypeDesc::array(TypeDesc::f32(), 4), 0)?;
        pb.uniform("after", &TypeDesc::f32(), 0)?;
        pb.uniform("inner", &inner, 0)?;
        pb.uniform("b", &TypeDesc::f32(), 0)?;
        let rot = pb.uniform("rot", &TypeDesc::mat(2, 2), 0)?;

        pb.main(|pb| {
          let w = pb.at(weights, 2)?;
          pb.declare_local("w", w)?;
          pb.declare_local("copy", weights)?;
          pb.declare_local("m", rot)?;
          let column = pb.at(rot, 1)?;
          pb.declare_local("column", column)?;
          Ok(())
        })
      },
      |pb| pb.main(|_| Ok(())),
    )
    .unwrap();

  let vs = &program.vertex.source;
  assert!(vs.contains("struct Std140_f32 {\n  @size(16) v: f32,\n}"));
  assert!(vs.contains("struct Std140_mat2x2_f32 {\n  @size(16) c0: vec2<f32>,\n  @size(16) c1: vec2<f32>,\n}"));
  assert!(vs.contains("struct Inner {\n  @align(16) @size(16) a: f32,\n}"));
  assert!(vs.contains(
    "struct UBlock_vs_0 {\n  @align(16) weights: array<Std140_f32, 4>,\n  after: f32,\n  inner: Inner,\n  b: f32,\n  \
     @align(16) rot: Std140_mat2x2_f32,\n}"
  ));

  assert!(vs.contains("var w: f32 = ublock_vs_0.weights[2i].v;"));
  assert!(vs.contains(
    "var copy: array<f32, 4> = array<f32, 4>(ublock_vs_0.weights[0].v, ublock_vs_0.weights[1].v, \
     ublock_vs_0.weights[2].v, ublock_vs_0.weights[3].v);"
  ));
  assert!(vs.contains("var m: mat2x2<f32> = mat2x2<f32>(ublock_vs_0.rot.c0, ublock_vs_0.rot.c1);"));
  assert!(vs.contains("var column: vec2<f32> = ublock_vs_0.rot.c1;"));

  // the same offsets as the WGSL declaration above
  let block = buffer(&program.bind_group_layouts, 0, "ublock_vs_0");
  assert_eq!(
    offsets(&block),
    [("weights", 0), ("after", 64), ("inner", 80), ("b", 96), ("rot", 112)]
  );
  assert_eq!(block.layout.byte_size, 144);
  assert_eq!(block.min_binding_size, 144);
}

#[test]
fn packed_structs_in_uniform_blocks() {
  let light = TypeDesc::structure(
    Some("Light"),
    LayoutPolicy::Packed,
    vec![("color".to_owned(), TypeDesc::vec3()), ("power".to_owned(), TypeDesc::f32())],
  );

  let mut pb = builder(Target::WebGPU);
  let program = pb
    .try_build_render(
      "lights",
      |pb| {
        pb.uniform("light", &light, 0)?;
        pb.storage("lights", &TypeDesc::runtime_array(light.clone()), 1, true)?;
        pb.main(|_| Ok(()))
      },
      |pb| pb.main(|_| Ok(())),
    )
    .unwrap();

  let vs = &program.vertex.source;
  assert!(vs.contains("struct Light {\n  color: vec3<f32>,\n  power: f32,\n}"));
  assert!(vs.contains("struct Light_std140 {\n  color: vec3<f32>,\n  power: f32,\n}"));
  assert!(vs.contains("struct UBlock_vs_0 {\n  light: Light_std140,\n}"));
  assert!(vs.contains("var<storage, read> lights: array<Light>;"));
}

#[test]
fn storage_layouts_match_wgsl() {
  let header = TypeDesc::structure(
    Some("Header"),
    LayoutPolicy::Packed,
    vec![("count".to_owned(), TypeDesc::u32()), ("v".to_owned(), TypeDesc::vec4())],
  );
  let particles = TypeDesc::structure(
    Some("Particles"),
    LayoutPolicy::Packed,
    vec![
      ("count".to_owned(), TypeDesc::u32()),
      ("items".to_owned(), TypeDesc::runtime_array(TypeDesc::vec4())),
    ],
  );

  let mut pb = builder(Target::WebGPU);
  let program = pb
    .try_build_compute("storage", |pb| {
      pb.storage("header", &header, 0, false)?;
      pb.storage("particles", &particles, 0, true)?;
      pb.main(|_| Ok(()))
    })
    .unwrap();

  let cs = &program.compute.source;
  assert!(cs.contains("struct Header {\n  count: u32,\n  v: vec4<f32>,\n}"));
  assert!(cs.contains("struct Particles {\n  count: u32,\n  items: array<vec4<f32>>,\n}"));

  let header = buffer(&program.bind_group_layouts, 0, "header");
  assert_eq!(offsets(&header), [("count", 0), ("v", 16)]);
  assert_eq!(header.layout.byte_size, 32);
  assert_eq!(header.min_binding_size, 32);

  let particles = buffer(&program.bind_group_layouts, 0, "particles");
  assert_eq!(offsets(&particles), [("count", 0), ("items", 16)]);
  assert_eq!(particles.layout.byte_size, 16);
  assert_eq!(particles.min_binding_size, 0);
}

#[test]
fn oversized_buffers() {
  let build = |ty: TypeDesc| {
    builder(Target::WebGPU).try_build_render(
      "huge",
      |pb| {
        pb.uniform("huge", &ty, 0)?;
        pb.main(|_| Ok(()))
      },
      |pb| pb.main(|_| Ok(())),
    )
  };

  assert!(matches!(
    build(TypeDesc::array(TypeDesc::vec4(), u32::MAX)),
    Err(ShaderError::Type(_))
  ));

  // 2 GiB of floats, 8 GiB once padded to std140
  assert!(matches!(
    build(TypeDesc::array(TypeDesc::f32(), 1 << 29)),
    Err(ShaderError::Type(_))
  ));
}

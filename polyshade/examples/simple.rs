//! Build a small lit and textured program and print the generated sources.
//!
//! The target is read from the first argument (`webgl`, `webgl2` or `webgpu`) and defaults to WebGPU.

use polyshade::{
  types::{M44, V3, V4},
  BuilderConfig, BuiltinVar, ProgramBuilder, ShaderStruct, Target, TextureSampleType, TextureType,
  TextureViewDimension, ToType, TypeDesc, VertexSemantic,
};

#[allow(dead_code)]
#[derive(ShaderStruct)]
#[shader(std140)]
struct Light {
  direction: V3<f32>,
  color: V4<f32>,
}

#[allow(dead_code)]
#[derive(ShaderStruct)]
#[shader(std140)]
struct Transform {
  model: M44,
  view_proj: M44,
}

fn main() {
  let target = match std::env::args().nth(1).map(|arg| arg.parse::<Target>()) {
    Some(Ok(target)) => target,
    Some(Err(e)) => {
      eprintln!("{}", e);
      std::process::exit(1);
    }
    None => Target::WebGPU,
  };

  let mut pb = ProgramBuilder::new(BuilderConfig::new(target));
  let program = pb.try_build_render(
    "lit",
    |pb| {
      let position = pb.vertex_input("position", &TypeDesc::vec3(), VertexSemantic::Position)?;
      let normal = pb.vertex_input("normal", &TypeDesc::vec3(), VertexSemantic::Normal)?;
      let uv_in = pb.vertex_input("uv_in", &TypeDesc::vec2(), VertexSemantic::TexCoord0)?;
      let transform = pb.uniform("transform", &Transform::ty(), 0)?;

      let world_normal = pb.output("world_normal", &TypeDesc::vec3())?;
      let uv = pb.output("uv", &TypeDesc::vec2())?;

      pb.main(|pb| {
        let model = pb.member(transform, "model")?;
        let view_proj = pb.member(transform, "view_proj")?;

        let p = pb.vec4((position, 1.))?;
        let world = pb.mul(model, p)?;
        let clip = pb.mul(view_proj, world)?;
        pb.set_builtin(BuiltinVar::Position, clip)?;

        let n = pb.vec4((normal, 0.))?;
        let n = pb.mul(model, n)?;
        let n = pb.swizzle(n, "xyz")?;
        pb.assign(world_normal, n)?;
        pb.assign(uv, uv_in)
      })
    },
    |pb| {
      let light = pb.uniform("light", &Light::ty(), 0)?;
      let albedo = pb.uniform_texture(
        "albedo",
        TextureType::new(TextureViewDimension::D2, TextureSampleType::Float),
        1,
      )?;
      let frag = pb.output("frag", &TypeDesc::vec4())?;

      pb.func("lambert", &[("n", TypeDesc::vec3()), ("l", TypeDesc::vec3())], |pb, args| {
        let n = pb.normalize(args[0])?;
        let l = pb.neg(args[1])?;
        let d = pb.dot(n, l)?;
        let d = pb.max(d, 0.)?;
        pb.return_(d)
      })?;

      pb.main(|pb| {
        let n = pb.get("world_normal")?;
        let uv = pb.get("uv")?;
        let direction = pb.member(light, "direction")?;
        let color = pb.member(light, "color")?;

        let diffuse = pb.call("lambert", (n, direction))?;
        let texel = pb.texture_sample(albedo, uv)?;
        let lit = pb.mul(texel, color)?;
        let lit = pb.mul(lit, diffuse)?;
        pb.assign(frag, lit)
      })
    },
  );

  match program {
    Ok(program) => {
      println!("// vertex shader ({})\n{}", program.target, program.vertex.source);
      println!("// fragment shader ({})\n{}", program.target, program.fragment.source);

      for layout in &program.bind_group_layouts {
        println!("// {}", layout.label);
        for entry in &layout.entries {
          println!("//   binding {}: {}", entry.binding, entry.name);
        }
      }
    }

    Err(e) => {
      eprintln!("cannot build the program: {}", e);
      std::process::exit(1);
    }
  }
}

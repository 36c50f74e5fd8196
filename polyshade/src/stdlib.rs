//! Built-in functions.

use crate::{
  ast::{NodeKind, VarKind},
  error::{Result, ShaderError},
  expr::{Expr, IntoArgs, Value},
  program::ProgramBuilder,
  stage::ShaderStage,
  target::{Feature, Target},
  types::{PrimitiveType, ScalarKind, TextureSampleType, TextureType, TextureViewDimension},
};
use std::ops::RangeInclusive;

/// Built-in functions.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Intrinsic {
  Radians,
  Degrees,
  Sin,
  Cos,
  Tan,
  Asin,
  Acos,
  Atan,
  Atan2,
  Pow,
  Exp,
  Exp2,
  Log,
  Log2,
  Sqrt,
  InverseSqrt,
  Abs,
  Sign,
  Floor,
  Ceil,
  Fract,
  Trunc,
  Round,
  Min,
  Max,
  Clamp,
  Mix,
  Step,
  Smoothstep,
  Mod,
  Length,
  Distance,
  Dot,
  Cross,
  Normalize,
  Reflect,
  Refract,
  FaceForward,
  Transpose,
  Determinant,
  All,
  Any,
  Dpdx,
  Dpdy,
  Fwidth,
  TextureSample,
  TextureSampleLevel,
  TextureSampleCompare,
  TextureLoad,
  TextureDimensions,
}

/// Concrete signature: parameter types and return type.
type Signature = (Vec<PrimitiveType>, PrimitiveType);

const FLOATS: [ScalarKind; 2] = [ScalarKind::F32, ScalarKind::F16];

fn gen_type(kind: ScalarKind, n: u8) -> PrimitiveType {
  PrimitiveType::vector(kind, n)
}

fn scalar(kind: ScalarKind) -> PrimitiveType {
  PrimitiveType::scalar(kind)
}

impl Intrinsic {
  pub const fn is_texture(self) -> bool {
    matches!(
      self,
      Intrinsic::TextureSample
        | Intrinsic::TextureSampleLevel
        | Intrinsic::TextureSampleCompare
        | Intrinsic::TextureLoad
        | Intrinsic::TextureDimensions
    )
  }

  const fn is_derivative(self) -> bool {
    matches!(self, Intrinsic::Dpdx | Intrinsic::Dpdy | Intrinsic::Fwidth)
  }

  /// Overloads of a math built-in, in resolution order.
  fn signatures(self, target: Target) -> Vec<Signature> {
    let mut sigs = Vec::new();
    let ints: &[ScalarKind] = if target == Target::WebGL {
      &[]
    } else {
      &[ScalarKind::I32, ScalarKind::U32]
    };

    // genType expansion over the given component types and dimensions
    let mut each = |kinds: &[ScalarKind], dims: RangeInclusive<u8>, f: &dyn Fn(ScalarKind, u8) -> Signature| {
      for &k in kinds {
        for n in dims.clone() {
          sigs.push(f(k, n));
        }
      }
    };

    // `arity` parameters of the returned type
    let same = |arity: usize| move |k: ScalarKind, n: u8| (vec![gen_type(k, n); arity], gen_type(k, n));

    match self {
      Intrinsic::Radians
      | Intrinsic::Degrees
      | Intrinsic::Sin
      | Intrinsic::Cos
      | Intrinsic::Tan
      | Intrinsic::Asin
      | Intrinsic::Acos
      | Intrinsic::Atan
      | Intrinsic::Exp
      | Intrinsic::Exp2
      | Intrinsic::Log
      | Intrinsic::Log2
      | Intrinsic::Sqrt
      | Intrinsic::InverseSqrt
      | Intrinsic::Floor
      | Intrinsic::Ceil
      | Intrinsic::Fract
      | Intrinsic::Trunc
      | Intrinsic::Round
      | Intrinsic::Dpdx
      | Intrinsic::Dpdy
      | Intrinsic::Fwidth => each(&FLOATS, 1..=4, &same(1)),

      Intrinsic::Abs | Intrinsic::Sign => {
        each(&FLOATS, 1..=4, &same(1));
        // signed integers only
        each(&ints[..ints.len().min(1)], 1..=4, &same(1));
      }

      Intrinsic::Atan2 | Intrinsic::Pow | Intrinsic::Step => each(&FLOATS, 1..=4, &same(2)),

      Intrinsic::Mod => {
        each(&FLOATS, 1..=4, &same(2));
        each(&FLOATS, 2..=4, &|k, n| (vec![gen_type(k, n), scalar(k)], gen_type(k, n)));
      }

      Intrinsic::Min | Intrinsic::Max => {
        each(&FLOATS, 1..=4, &same(2));
        each(ints, 1..=4, &same(2));
      }

      Intrinsic::Clamp => {
        each(&FLOATS, 1..=4, &same(3));
        each(ints, 1..=4, &same(3));
      }

      Intrinsic::Mix => {
        each(&FLOATS, 1..=4, &same(3));
        each(&FLOATS, 2..=4, &|k, n| (vec![gen_type(k, n), gen_type(k, n), scalar(k)], gen_type(k, n)));
      }

      Intrinsic::Smoothstep => each(&FLOATS, 1..=4, &same(3)),
      Intrinsic::FaceForward => each(&FLOATS, 2..=4, &same(3)),
      Intrinsic::Length => each(&FLOATS, 1..=4, &|k, n| (vec![gen_type(k, n)], scalar(k))),
      Intrinsic::Distance => each(&FLOATS, 1..=4, &|k, n| (vec![gen_type(k, n); 2], scalar(k))),
      Intrinsic::Dot => each(&FLOATS, 2..=4, &|k, n| (vec![gen_type(k, n); 2], scalar(k))),
      Intrinsic::Cross => each(&FLOATS, 3..=3, &same(2)),
      Intrinsic::Normalize => each(&FLOATS, 2..=4, &same(1)),
      Intrinsic::Reflect => each(&FLOATS, 2..=4, &same(2)),
      Intrinsic::Refract => {
        each(&FLOATS, 2..=4, &|k, n| (vec![gen_type(k, n), gen_type(k, n), scalar(k)], gen_type(k, n)))
      }

      Intrinsic::Transpose => {
        for &k in &FLOATS {
          for c in 2..=4 {
            for r in 2..=4 {
              sigs.push((vec![PrimitiveType::matrix(k, c, r)], PrimitiveType::matrix(k, r, c)));
            }
          }
        }
      }

      Intrinsic::Determinant => each(&FLOATS, 2..=4, &|k, n| (vec![PrimitiveType::matrix(k, n, n)], scalar(k))),
      Intrinsic::All | Intrinsic::Any => each(&[ScalarKind::Bool], 2..=4, &|k, n| (vec![gen_type(k, n)], scalar(k))),

      Intrinsic::TextureSample
      | Intrinsic::TextureSampleLevel
      | Intrinsic::TextureSampleCompare
      | Intrinsic::TextureLoad
      | Intrinsic::TextureDimensions => (),
    }

    sigs
  }

  pub(crate) const fn glsl_name(self) -> &'static str {
    match self {
      Intrinsic::Radians => "radians",
      Intrinsic::Degrees => "degrees",
      Intrinsic::Sin => "sin",
      Intrinsic::Cos => "cos",
      Intrinsic::Tan => "tan",
      Intrinsic::Asin => "asin",
      Intrinsic::Acos => "acos",
      Intrinsic::Atan | Intrinsic::Atan2 => "atan",
      Intrinsic::Pow => "pow",
      Intrinsic::Exp => "exp",
      Intrinsic::Exp2 => "exp2",
      Intrinsic::Log => "log",
      Intrinsic::Log2 => "log2",
      Intrinsic::Sqrt => "sqrt",
      Intrinsic::InverseSqrt => "inversesqrt",
      Intrinsic::Abs => "abs",
      Intrinsic::Sign => "sign",
      Intrinsic::Floor => "floor",
      Intrinsic::Ceil => "ceil",
      Intrinsic::Fract => "fract",
      Intrinsic::Trunc => "trunc",
      Intrinsic::Round => "round",
      Intrinsic::Min => "min",
      Intrinsic::Max => "max",
      Intrinsic::Clamp => "clamp",
      Intrinsic::Mix => "mix",
      Intrinsic::Step => "step",
      Intrinsic::Smoothstep => "smoothstep",
      Intrinsic::Mod => "mod",
      Intrinsic::Length => "length",
      Intrinsic::Distance => "distance",
      Intrinsic::Dot => "dot",
      Intrinsic::Cross => "cross",
      Intrinsic::Normalize => "normalize",
      Intrinsic::Reflect => "reflect",
      Intrinsic::Refract => "refract",
      Intrinsic::FaceForward => "faceforward",
      Intrinsic::Transpose => "transpose",
      Intrinsic::Determinant => "determinant",
      Intrinsic::All => "all",
      Intrinsic::Any => "any",
      Intrinsic::Dpdx => "dFdx",
      Intrinsic::Dpdy => "dFdy",
      Intrinsic::Fwidth => "fwidth",
      Intrinsic::TextureSample => "texture",
      Intrinsic::TextureSampleLevel => "textureLod",
      Intrinsic::TextureSampleCompare => "texture",
      Intrinsic::TextureLoad => "texelFetch",
      Intrinsic::TextureDimensions => "textureSize",
    }
  }

  pub(crate) const fn wgsl_name(self) -> &'static str {
    match self {
      Intrinsic::Atan2 => "atan2",
      Intrinsic::InverseSqrt => "inverseSqrt",
      Intrinsic::FaceForward => "faceForward",
      Intrinsic::Dpdx => "dpdx",
      Intrinsic::Dpdy => "dpdy",
      Intrinsic::TextureSample => "textureSample",
      Intrinsic::TextureSampleLevel => "textureSampleLevel",
      Intrinsic::TextureSampleCompare => "textureSampleCompare",
      Intrinsic::TextureLoad => "textureLoad",
      Intrinsic::TextureDimensions => "textureDimensions",
      other => other.glsl_name(),
    }
  }
}

macro_rules! intrinsic_methods {
  ($($(#[$doc:meta])* $name:ident => $i:ident($($arg:ident),+));* $(;)?) => {
    impl ProgramBuilder {
      $(
        $(#[$doc])*
        pub fn $name(&mut self, $($arg: impl Into<Value>),+) -> Result<Expr> {
          self.intrinsic(Intrinsic::$i, vec![$($arg.into()),+])
        }
      )*
    }
  };
}

intrinsic_methods! {
  radians => Radians(x);
  degrees => Degrees(x);
  sin => Sin(x);
  cos => Cos(x);
  tan => Tan(x);
  asin => Asin(x);
  acos => Acos(x);
  atan => Atan(x);
  /// Arc tangent of `y / x`, using the signs of both to pick the quadrant.
  atan2 => Atan2(y, x);
  pow => Pow(x, y);
  exp => Exp(x);
  exp2 => Exp2(x);
  log => Log(x);
  log2 => Log2(x);
  sqrt => Sqrt(x);
  inverse_sqrt => InverseSqrt(x);
  abs => Abs(x);
  sign => Sign(x);
  floor => Floor(x);
  ceil => Ceil(x);
  fract => Fract(x);
  trunc => Trunc(x);
  round => Round(x);
  min => Min(x, y);
  max => Max(x, y);
  clamp => Clamp(x, low, high);
  mix => Mix(x, y, a);
  step => Step(edge, x);
  smoothstep => Smoothstep(low, high, x);
  /// Floored modulo, `x - y * floor(x / y)`.
  mod_ => Mod(x, y);
  length => Length(x);
  distance => Distance(a, b);
  dot => Dot(a, b);
  cross => Cross(a, b);
  normalize => Normalize(x);
  reflect => Reflect(incident, normal);
  refract => Refract(incident, normal, eta);
  face_forward => FaceForward(normal, incident, reference);
  transpose => Transpose(m);
  determinant => Determinant(m);
  all => All(x);
  any => Any(x);
  /// Partial derivative along the window `x` axis. Fragment stage only.
  dpdx => Dpdx(x);
  dpdy => Dpdy(x);
  fwidth => Fwidth(x);
}

/// Whether a literal or expression can be passed where a `p` is expected.
fn prim_matches(pb: &ProgramBuilder, value: &Value, p: PrimitiveType) -> bool {
  match value {
    Value::Expr(e) => pb.types.primitive(e.ty) == Some(p),
    literal => p.is_scalar() && literal.fits(p.scalar),
  }
}

impl ProgramBuilder {
  /// Call a built-in function.
  ///
  /// Math built-ins pick the first overload accepting the arguments. Texture built-ins take the texture variable
  /// first, then the coordinates, the array layer for array textures, and the level, sample index or depth reference
  /// their kind expects.
  pub fn intrinsic(&mut self, fun: Intrinsic, args: impl IntoArgs) -> Result<Expr> {
    let args = args.into_args();
    let target = self.target();
    let stage = self.stage_state()?.stage;

    match fun {
      Intrinsic::Trunc | Intrinsic::Round => target.require(Feature::RoundTrunc)?,
      Intrinsic::Transpose | Intrinsic::Determinant => target.require(Feature::MatrixFunctions)?,
      _ => (),
    }

    if fun.is_derivative() {
      if stage != ShaderStage::Fragment {
        return Err(ShaderError::declaration(format!(
          "{:?} is only available in fragment shaders",
          fun
        )));
      }

      if target == Target::WebGL {
        self.stage_state_mut()?.extensions.insert("GL_OES_standard_derivatives");
      }
    }

    if fun.is_texture() {
      return self.texture_intrinsic(fun, args);
    }

    let (params, ret) = fun
      .signatures(target)
      .into_iter()
      .find(|(params, _)| params.len() == args.len() && args.iter().zip(params).all(|(a, &p)| prim_matches(self, a, p)))
      .ok_or_else(|| {
        ShaderError::type_error(format!(
          "no overload of {:?} accepts ({})",
          fun,
          self.describe_values(&args)
        ))
      })?;

    let mut nodes = Vec::with_capacity(args.len());
    for (arg, p) in args.into_iter().zip(params) {
      nodes.push(self.lower(arg, Some(p.scalar))?.node);
    }

    let ty = self.types.prim(ret);
    Ok(self.push_node(ty, NodeKind::Intrinsic { fun, args: nodes }))
  }

  /// Texture type of a texture variable.
  fn texture_arg(&self, fun: Intrinsic, value: Option<&Value>) -> Result<(Expr, TextureType)> {
    let texture = match value {
      Some(Value::Expr(e)) => {
        let is_texture_var = self
          .var_of(*e)
          .map_or(false, |v| matches!(self.var(v).kind, VarKind::Texture { .. }));

        self.types.texture(e.ty).filter(|_| is_texture_var).map(|t| (*e, t))
      }
      _ => None,
    };

    texture.ok_or_else(|| ShaderError::parameter(format!("{:?} expects a texture variable first", fun)))
  }

  fn texture_intrinsic(&mut self, fun: Intrinsic, args: Vec<Value>) -> Result<Expr> {
    let target = self.target();
    let stage = self.stage_state()?.stage;
    let (texture, t) = self.texture_arg(fun, args.first())?;
    let name = self.var_of(texture).map(|v| self.var(v).name.clone()).unwrap_or_default();

    let cannot = |what: &str| ShaderError::type_error(format!("cannot {} texture `{}` ({:?})", what, name, t));

    let sampled = !t.sample_type.is_integer() && !t.multisampled;
    let coords = PrimitiveType::vector(ScalarKind::F32, t.coord_components());

    // parameter list after the texture
    let (mut params, ret) = match fun {
      Intrinsic::TextureSample => {
        if !sampled || t.is_depth() {
          return Err(cannot("sample"));
        }

        (vec![coords], PrimitiveType::vector(ScalarKind::F32, 4))
      }

      Intrinsic::TextureSampleLevel => {
        if !sampled || t.is_depth() {
          return Err(cannot("sample"));
        }

        if target == Target::WebGL && stage == ShaderStage::Fragment {
          self.stage_state_mut()?.extensions.insert("GL_EXT_shader_texture_lod");
        }

        (vec![coords, scalar(ScalarKind::F32)], PrimitiveType::vector(ScalarKind::F32, 4))
      }

      Intrinsic::TextureSampleCompare => {
        if !t.is_depth() || t.multisampled {
          return Err(cannot("compare-sample"));
        }

        if target == Target::WebGL {
          log::warn!(
            "depth comparison on `{}` is emulated with a regular texture lookup on WebGL",
            name
          );
        }

        (vec![coords, scalar(ScalarKind::F32)], scalar(ScalarKind::F32))
      }

      Intrinsic::TextureLoad => {
        target.require(Feature::TextureLoad)?;

        if matches!(t.dimension, TextureViewDimension::Cube | TextureViewDimension::CubeArray) {
          return Err(cannot("load from"));
        }

        if t.is_depth() {
          target.require(Feature::DepthTextureLoad)?;
        }

        let texel = match t.sample_type {
          TextureSampleType::Depth => scalar(ScalarKind::F32),
          other => PrimitiveType::vector(other.scalar(), 4),
        };

        (
          vec![PrimitiveType::vector(ScalarKind::I32, t.coord_components()), scalar(ScalarKind::I32)],
          texel,
        )
      }

      Intrinsic::TextureDimensions => {
        target.require(Feature::TextureDimensions)?;

        let index = if target == Target::WebGPU { ScalarKind::U32 } else { ScalarKind::I32 };
        let params = if args.len() > 1 { vec![scalar(ScalarKind::I32)] } else { Vec::new() };
        (params, PrimitiveType::vector(index, t.size_components()))
      }

      _ => return Err(ShaderError::internal(format!("{:?} is not a texture built-in", fun))),
    };

    if t.is_array() && fun != Intrinsic::TextureDimensions {
      params.insert(1, scalar(ScalarKind::I32));
    }

    let rest = &args[1..];
    if rest.len() != params.len() || !rest.iter().zip(&params).all(|(a, &p)| prim_matches(self, a, p)) {
      return Err(ShaderError::parameter(format!(
        "{:?} on {:?} expects ({}), got ({})",
        fun,
        t,
        params.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
        self.describe_values(rest)
      )));
    }

    let mut nodes = vec![texture.node];
    for (&arg, p) in rest.iter().zip(params) {
      nodes.push(self.lower(arg, Some(p.scalar))?.node);
    }

    let ty = self.types.prim(ret);
    Ok(self.push_node(ty, NodeKind::Intrinsic { fun, args: nodes }))
  }

  /// Sample a texture with implicit level of detail.
  pub fn texture_sample(&mut self, texture: Expr, coords: impl Into<Value>) -> Result<Expr> {
    self.intrinsic(Intrinsic::TextureSample, (texture, coords))
  }

  pub fn texture_sample_level(
    &mut self,
    texture: Expr,
    coords: impl Into<Value>,
    level: impl Into<Value>,
  ) -> Result<Expr> {
    self.intrinsic(Intrinsic::TextureSampleLevel, (texture, coords, level))
  }

  /// Compare `depth_ref` against a depth texture, yielding the fraction of passing samples.
  pub fn texture_sample_compare(
    &mut self,
    texture: Expr,
    coords: impl Into<Value>,
    depth_ref: impl Into<Value>,
  ) -> Result<Expr> {
    self.intrinsic(Intrinsic::TextureSampleCompare, (texture, coords, depth_ref))
  }

  /// Fetch a single texel, without sampling.
  pub fn texture_load(&mut self, texture: Expr, coords: impl Into<Value>, level: impl Into<Value>) -> Result<Expr> {
    self.intrinsic(Intrinsic::TextureLoad, (texture, coords, level))
  }

  pub fn texture_dimensions(&mut self, texture: Expr) -> Result<Expr> {
    self.intrinsic(Intrinsic::TextureDimensions, (texture,))
  }
}

//! Polyshade, a shader-construction EDSL targeting the web graphics APIs.
//!
//! This crate provides an [EDSL] to build shader programs from Rust code and compile them, at runtime, to one of three
//! shading languages:
//!
//! - [GLSL ES 1.00], for WebGL.
//! - [GLSL ES 3.00], for WebGL2.
//! - [WGSL], for WebGPU.
//!
//! The same authoring code produces the three languages. Target differences are either lowered by the writers (WGSL has
//! no function overloading, GLSL ES 1.00 has no integer remainder, etc.) or reported as capability errors when a
//! feature simply does not exist on the target.
//!
//! # Building a program
//!
//! Everything goes through a [`ProgramBuilder`]. A builder is created for a given [`Target`] and compiles render
//! programs (a vertex and a fragment stage) or compute programs. Each stage is authored in a callback receiving the
//! builder: the callback declares the stage inputs, outputs and uniforms, defines functions, and must define `main`.
//!
//! ```
//! use polyshade::{BuilderConfig, BuiltinVar, ProgramBuilder, Target, TypeDesc, VertexSemantic};
//!
//! let mut pb = ProgramBuilder::new(BuilderConfig::new(Target::WebGPU));
//! let program = pb
//!   .try_build_render(
//!     "tinted",
//!     |pb| {
//!       let position = pb.vertex_input("position", &TypeDesc::vec3(), VertexSemantic::Position)?;
//!       let mvp = pb.uniform("mvp", &TypeDesc::mat(4, 4), 0)?;
//!       pb.main(|pb| {
//!         let p = pb.vec4((position, 1.))?;
//!         let clip = pb.mul(mvp, p)?;
//!         pb.set_builtin(BuiltinVar::Position, clip)
//!       })
//!     },
//!     |pb| {
//!       let tint = pb.uniform("tint", &TypeDesc::vec4(), 0)?;
//!       let color = pb.output("color", &TypeDesc::vec4())?;
//!       pb.main(|pb| pb.assign(color, tint))
//!     },
//!   )
//!   .unwrap();
//!
//! assert!(program.vertex.source.contains("@vertex"));
//! assert_eq!(program.bind_group_layouts.len(), 1);
//! ```
//!
//! # Expressions and types
//!
//! Expressions are opaque [`Expr`] handles. Operations taking operands accept anything convertible into a [`Value`]:
//! expressions, Rust literals and tuples of those. Literals adapt to the other operand when the conversion is exact.
//!
//! Types are described with [`TypeDesc`] and interned structurally into a [`TypeRegistry`]: two equal descriptions
//! always intern to the same [`TypeHandle`]. Struct types can be derived from Rust structs with
//! `#[derive(ShaderStruct)]` (enabled by the `edsl` feature), and get both a std140 and a packed layout.
//!
//! # Bindings
//!
//! Loose uniforms are merged into one uniform block per stage visibility and group. Every group then gets dense binding
//! indices, reported as [`BindGroupLayout`]s in the compiled program. On WebGPU, each texture gets an implicit sampler
//! declared right after it.
//!
//! [EDSL]: https://en.wikipedia.org/wiki/Domain-specific_language#External_and_Embedded_Domain_Specific_Languages
//! [GLSL ES 1.00]: https://registry.khronos.org/OpenGL/specs/es/2.0/GLSL_ES_Specification_1.00.pdf
//! [GLSL ES 3.00]: https://registry.khronos.org/OpenGL/specs/es/3.0/GLSL_ES_Specification_3.00.pdf
//! [WGSL]: https://www.w3.org/TR/WGSL/

mod ast;
pub mod bindings;
pub mod builtin;
pub mod config;
mod constructors;
pub mod error;
pub mod expr;
mod fun;
pub mod input;
mod output;
pub mod program;
pub mod reflection;
mod scope;
pub mod stage;
pub mod stdlib;
pub mod swizzle;
pub mod target;
pub mod types;
mod uniform;
mod writer;

pub use ast::{BinaryOp, FunId, UnaryOp};
pub use bindings::{
  BindGroupLayout, BindGroupLayoutEntry, BindingResource, BufferBindingLayout, BufferBindingType, BufferLayout,
  BufferMember, SamplerBindingLayout, TextureBindingLayout,
};
pub use builtin::BuiltinVar;
pub use config::BuilderConfig;
pub use error::{Result, ShaderError};
pub use expr::{Expr, IntoArgs, Value};
pub use input::{VertexAttribute, VertexSemantic};
pub use program::{ComputeProgram, ProgramBuilder, RenderProgram, StageOutput};
pub use reflection::{DeclKind, ExprInfo};
pub use scope::IfChain;
pub use stage::{ShaderStage, StageMask};
pub use stdlib::Intrinsic;
pub use target::{Feature, Target};
pub use types::{
  AddressSpace, LayoutPolicy, PrimitiveType, SamplerKind, ScalarKind, StructDesc, TextureSampleType, TextureType,
  TextureViewDimension, ToType, TypeDesc, TypeHandle, TypeRegistry,
};

#[cfg(feature = "edsl")]
pub use polyshade_edsl::ShaderStruct;

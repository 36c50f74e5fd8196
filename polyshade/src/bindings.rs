//! Bind group layouts of compiled programs.
//!
//! These records describe the resources a program expects, in a target-agnostic way, so that the pipeline layer can
//! create matching bind group layouts and bind groups.

use crate::{
  stage::StageMask,
  types::{SamplerKind, TextureSampleType, TextureViewDimension},
};
use serde::Serialize;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BindGroupLayout {
  pub label: String,
  pub group: u32,

  /// Entries ordered by binding index.
  pub entries: Vec<BindGroupLayoutEntry>,
}

impl BindGroupLayout {
  pub fn entry(&self, name: &str) -> Option<&BindGroupLayoutEntry> {
    self.entries.iter().find(|e| e.name == name)
  }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BindGroupLayoutEntry {
  pub binding: u32,

  /// Name of the resource in the generated sources.
  pub name: String,

  pub visibility: StageMask,
  pub resource: BindingResource,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingResource {
  Buffer(BufferBindingLayout),
  Texture(TextureBindingLayout),
  Sampler(SamplerBindingLayout),
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BufferBindingType {
  Uniform,
  Storage,
  ReadOnlyStorage,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BufferBindingLayout {
  #[serde(rename = "type")]
  pub ty: BufferBindingType,

  /// Smallest buffer size accepted by the binding; zero when the buffer ends with a runtime-sized array.
  pub min_binding_size: u32,

  pub layout: BufferLayout,
}

/// Byte layout of a buffer.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BufferLayout {
  pub byte_size: u32,
  pub members: Vec<BufferMember>,
}

impl BufferLayout {
  pub fn member(&self, name: &str) -> Option<&BufferMember> {
    self.members.iter().find(|m| m.name == name)
  }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BufferMember {
  pub name: String,
  pub offset: u32,
  pub byte_size: u32,

  /// Shader type of the member, e.g. `mat4x4<f32>`.
  #[serde(rename = "type")]
  pub ty: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct TextureBindingLayout {
  pub sample_type: TextureSampleType,
  pub view_dimension: TextureViewDimension,
  pub multisampled: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct SamplerBindingLayout {
  #[serde(rename = "type")]
  pub kind: SamplerKind,
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn serialize_entry() {
    let layout = BindGroupLayout {
      label: "blit.group0".to_owned(),
      group: 0,
      entries: vec![
        BindGroupLayoutEntry {
          binding: 0,
          name: "source".to_owned(),
          visibility: StageMask::FRAGMENT,
          resource: BindingResource::Texture(TextureBindingLayout {
            sample_type: TextureSampleType::Float,
            view_dimension: TextureViewDimension::D2,
            multisampled: false,
          }),
        },
        BindGroupLayoutEntry {
          binding: 1,
          name: "source_sampler".to_owned(),
          visibility: StageMask::FRAGMENT,
          resource: BindingResource::Sampler(SamplerBindingLayout {
            kind: SamplerKind::Filtering,
          }),
        },
      ],
    };

    let json = serde_json::to_value(&layout).unwrap();
    assert_eq!(json["entries"][0]["resource"]["texture"]["view_dimension"], "2d");
    assert_eq!(json["entries"][1]["resource"]["sampler"]["type"], "filtering");
    assert_eq!(json["entries"][1]["visibility"], 2);
    assert!(layout.entry("source_sampler").is_some());
  }
}

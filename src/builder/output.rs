//! Finished build artifacts handed to the renderer.

use crate::builder::bindings::BindGroupDescriptor;
use crate::builder::declarations::{NodeAttribute, NodeVar, NodeVarying};
use crate::types::TargetLanguage;

/// Everything one build produces: per-stage program text plus the binding
/// and vertex-layout metadata the renderer needs to allocate resources.
#[derive(Debug)]
pub struct BuildOutput {
    pub language: TargetLanguage,
    pub vertex: Option<String>,
    pub fragment: Option<String>,
    pub compute: Option<String>,
    /// Combined single-module text for targets that support it (WGSL);
    /// `None` for per-stage-program targets (GLSL).
    pub module: Option<String>,
    /// Bind groups in canonical index order.
    pub bind_groups: Vec<BindGroupDescriptor>,
    /// Vertex inputs in location order.
    pub attributes: Vec<NodeAttribute>,
    /// Interpolated values in location order (shared by both raster
    /// stages).
    pub varyings: Vec<NodeVarying>,
    /// Variables materialized for multiply-referenced nodes, mapping
    /// generated names back to graph nodes (debugging/reflection).
    pub vars: Vec<NodeVar>,
}

impl BuildOutput {
    /// A stable structural signature over the interface parts of the
    /// output; two builds with equal signatures are pipeline-compatible.
    pub fn pipeline_signature(&self) -> u64 {
        use xxhash_rust::xxh3::Xxh3;
        let mut h = Xxh3::new();
        h.update(self.language.as_str().as_bytes());
        for attr in &self.attributes {
            h.update(attr.name.as_bytes());
            h.update(&[attr.ty as u8]);
            h.update(&attr.location.to_le_bytes());
        }
        for varying in &self.varyings {
            h.update(varying.name.as_bytes());
            h.update(&[varying.ty as u8]);
            h.update(&varying.location.to_le_bytes());
        }
        for group in &self.bind_groups {
            h.update(group.group.as_bytes());
            h.update(&group.index.to_le_bytes());
            for binding in &group.bindings {
                h.update(binding.name.as_bytes());
                h.update(&binding.binding.to_le_bytes());
                h.update(&[binding.kind as u8]);
            }
        }
        h.digest()
    }
}

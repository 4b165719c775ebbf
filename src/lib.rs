//! Node-graph shader compiler: authored material graphs compile into
//! WGSL or GLSL programs plus the binding metadata a renderer needs to
//! feed them.

pub mod adapter;
pub mod builder;
pub mod dsl;
pub mod error;
pub mod graph;
pub mod types;
pub mod validation;

pub use adapter::{GlslAdapter, LanguageAdapter, WgslAdapter};
pub use builder::output::BuildOutput;
pub use builder::{GeometryLayout, NodeBuilder};
pub use error::{BuildError, CompileError};
pub use graph::{MaterialGraph, Node, NodeHandle, NodeRegistry};
pub use types::{Capabilities, ShaderStage, TargetLanguage, UpdateCadence, ValueType};

/// Build a material graph for one target language with default adapter
/// wiring.
pub fn compile(
    graph: MaterialGraph,
    geometry: GeometryLayout,
    caps: Capabilities,
    language: TargetLanguage,
) -> Result<BuildOutput, BuildError> {
    let adapter: Box<dyn LanguageAdapter> = match language {
        TargetLanguage::Wgsl => WgslAdapter::new(),
        TargetLanguage::Glsl => GlslAdapter::new(),
    };
    NodeBuilder::new(graph, geometry, caps, adapter).build()
}

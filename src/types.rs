//! Core type vocabulary shared by the graph, the builder and the adapters.

use serde::{Deserialize, Serialize};

/// GPU pipeline phase being generated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        }
    }
}

/// Compiler phase, distinct from the GPU pipeline stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuildStage {
    Setup,
    Analyze,
    Generate,
}

impl BuildStage {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildStage::Setup => "setup",
            BuildStage::Analyze => "analyze",
            BuildStage::Generate => "generate",
        }
    }
}

/// How often a node's host-side data must be refreshed.
///
/// `Render` fires once per render pass over a scene, `Frame` once per frame,
/// `Object` once per rendered object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateCadence {
    #[default]
    None,
    Frame,
    Render,
    Object,
}

/// Output language targeted by an adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetLanguage {
    Wgsl,
    Glsl,
}

impl TargetLanguage {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetLanguage::Wgsl => "WGSL",
            TargetLanguage::Glsl => "GLSL",
        }
    }
}

/// Built-in pipeline inputs an adapter must know how to spell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuiltinValue {
    VertexIndex,
    InstanceIndex,
    FrontFacing,
    FragCoord,
}

/// Scalar family of a value type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Float,
    Int,
    Uint,
    Bool,
}

/// Backend-agnostic value type for shader expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Float,
    Int,
    Uint,
    Bool,
    Vec2,
    Vec3,
    Vec4,
    IVec2,
    IVec3,
    IVec4,
    UVec2,
    UVec3,
    UVec4,
    BVec2,
    BVec3,
    BVec4,
    Mat2,
    Mat3,
    Mat4,
    Texture2D,
    Sampler,
}

impl ValueType {
    pub fn scalar_kind(self) -> Option<ScalarKind> {
        use ValueType::*;
        match self {
            Float | Vec2 | Vec3 | Vec4 | Mat2 | Mat3 | Mat4 => Some(ScalarKind::Float),
            Int | IVec2 | IVec3 | IVec4 => Some(ScalarKind::Int),
            Uint | UVec2 | UVec3 | UVec4 => Some(ScalarKind::Uint),
            Bool | BVec2 | BVec3 | BVec4 => Some(ScalarKind::Bool),
            Texture2D | Sampler => None,
        }
    }

    /// Number of scalar components (columns x rows for matrices).
    pub fn components(self) -> u32 {
        use ValueType::*;
        match self {
            Float | Int | Uint | Bool => 1,
            Vec2 | IVec2 | UVec2 | BVec2 => 2,
            Vec3 | IVec3 | UVec3 | BVec3 => 3,
            Vec4 | IVec4 | UVec4 | BVec4 => 4,
            Mat2 => 4,
            Mat3 => 9,
            Mat4 => 16,
            Texture2D | Sampler => 0,
        }
    }

    /// Vector width, 1 for scalars, None for matrices and references.
    pub fn vector_len(self) -> Option<u32> {
        use ValueType::*;
        match self {
            Float | Int | Uint | Bool => Some(1),
            Vec2 | IVec2 | UVec2 | BVec2 => Some(2),
            Vec3 | IVec3 | UVec3 | BVec3 => Some(3),
            Vec4 | IVec4 | UVec4 | BVec4 => Some(4),
            _ => None,
        }
    }

    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            ValueType::Float | ValueType::Int | ValueType::Uint | ValueType::Bool
        )
    }

    pub fn is_vector(self) -> bool {
        use ValueType::*;
        matches!(
            self,
            Vec2 | Vec3 | Vec4 | IVec2 | IVec3 | IVec4 | UVec2 | UVec3 | UVec4 | BVec2 | BVec3
                | BVec4
        )
    }

    pub fn is_matrix(self) -> bool {
        matches!(self, ValueType::Mat2 | ValueType::Mat3 | ValueType::Mat4)
    }

    /// Opaque GPU resource handles, never materializable into variables.
    pub fn is_reference(self) -> bool {
        matches!(self, ValueType::Texture2D | ValueType::Sampler)
    }

    /// The vector (or scalar) type with the given scalar kind and width.
    pub fn vector_of(kind: ScalarKind, len: u32) -> Option<ValueType> {
        use ValueType::*;
        Some(match (kind, len) {
            (ScalarKind::Float, 1) => Float,
            (ScalarKind::Float, 2) => Vec2,
            (ScalarKind::Float, 3) => Vec3,
            (ScalarKind::Float, 4) => Vec4,
            (ScalarKind::Int, 1) => Int,
            (ScalarKind::Int, 2) => IVec2,
            (ScalarKind::Int, 3) => IVec3,
            (ScalarKind::Int, 4) => IVec4,
            (ScalarKind::Uint, 1) => Uint,
            (ScalarKind::Uint, 2) => UVec2,
            (ScalarKind::Uint, 3) => UVec3,
            (ScalarKind::Uint, 4) => UVec4,
            (ScalarKind::Bool, 1) => Bool,
            (ScalarKind::Bool, 2) => BVec2,
            (ScalarKind::Bool, 3) => BVec3,
            (ScalarKind::Bool, 4) => BVec4,
            _ => return None,
        })
    }

    /// std140-ish byte size used for the uniform-buffer overflow check.
    pub fn size_bytes(self) -> u64 {
        use ValueType::*;
        match self {
            Float | Int | Uint | Bool => 4,
            Vec2 | IVec2 | UVec2 | BVec2 => 8,
            Vec3 | IVec3 | UVec3 | BVec3 => 12,
            Vec4 | IVec4 | UVec4 | BVec4 => 16,
            Mat2 => 32,
            Mat3 => 48,
            Mat4 => 64,
            Texture2D | Sampler => 0,
        }
    }

    /// std140-ish alignment used for the uniform-buffer overflow check.
    pub fn align_bytes(self) -> u64 {
        use ValueType::*;
        match self {
            Float | Int | Uint | Bool => 4,
            Vec2 | IVec2 | UVec2 | BVec2 => 8,
            Vec3 | IVec3 | UVec3 | BVec3 | Vec4 | IVec4 | UVec4 | BVec4 => 16,
            Mat2 | Mat3 | Mat4 => 16,
            Texture2D | Sampler => 1,
        }
    }
}

/// Renderer capability snapshot consumed read-only by one build.
#[derive(Clone, Copy, Debug)]
pub struct Capabilities {
    /// Maximum byte size of a single uniform buffer binding.
    pub max_uniform_buffer_size: u64,
    /// Whether float textures can be sampled with hardware filtering.
    pub filterable_float_textures: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            max_uniform_buffer_size: 64 * 1024,
            filterable_float_textures: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_of_round_trips_scalar_kind_and_len() {
        for &ty in &[
            ValueType::Float,
            ValueType::Vec3,
            ValueType::IVec2,
            ValueType::UVec4,
            ValueType::BVec3,
        ] {
            let kind = ty.scalar_kind().unwrap();
            let len = ty.vector_len().unwrap();
            assert_eq!(ValueType::vector_of(kind, len), Some(ty));
        }
    }

    #[test]
    fn reference_types_have_no_scalar_kind() {
        assert!(ValueType::Texture2D.is_reference());
        assert!(ValueType::Texture2D.scalar_kind().is_none());
        assert!(ValueType::Sampler.is_reference());
    }

    #[test]
    fn std140_vec3_aligns_to_16() {
        assert_eq!(ValueType::Vec3.size_bytes(), 12);
        assert_eq!(ValueType::Vec3.align_bytes(), 16);
    }
}

//! Generated declaration records and host-supplied uniform values.

use crate::graph::node::NodeId;
use crate::graph::stack::ScopeId;
use crate::types::{ShaderStage, ValueType};

/// A function-scope variable materialized for a multiply-referenced node.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeVar {
    /// Originating node; `None` for synthesized outputs (conditional
    /// results assigned per branch).
    pub node: Option<NodeId>,
    pub name: String,
    pub ty: ValueType,
    pub stage: ShaderStage,
    /// The scope the declaration was emitted in (root = function preamble).
    pub scope: ScopeId,
}

/// A vertex→fragment varying backed by a node flowed in the vertex stage.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeVarying {
    /// Originating node; `None` for varyings auto-created behind a
    /// fragment-stage attribute read.
    pub node: Option<NodeId>,
    pub name: String,
    pub ty: ValueType,
    pub location: u32,
}

/// A vertex input attribute referenced by the graph.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeAttribute {
    /// First node that referenced the attribute from the vertex stage.
    pub node: Option<NodeId>,
    /// Authored geometry attribute name.
    pub name: String,
    pub ty: ValueType,
    pub location: u32,
}

/// An injected helper-function declaration (premultiply, manual bilinear,
/// ...), emitted once per stage regardless of how many sites requested it.
#[derive(Clone, Debug)]
pub struct NodeCode {
    /// Originating node, when the helper was requested by one.
    pub node: Option<NodeId>,
    /// Deduplication key, also the helper's function name.
    pub name: String,
    pub code: String,
}

/// Host-side value behind a uniform node. The compiler only reads the
/// *type*; values are for the renderer's upload path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Uint(u32),
    Bool(bool),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat2([f32; 4]),
    Mat3([f32; 9]),
    Mat4([f32; 16]),
}

impl UniformValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            UniformValue::Float(_) => ValueType::Float,
            UniformValue::Int(_) => ValueType::Int,
            UniformValue::Uint(_) => ValueType::Uint,
            UniformValue::Bool(_) => ValueType::Bool,
            UniformValue::Vec2(_) => ValueType::Vec2,
            UniformValue::Vec3(_) => ValueType::Vec3,
            UniformValue::Vec4(_) => ValueType::Vec4,
            UniformValue::Mat2(_) => ValueType::Mat2,
            UniformValue::Mat3(_) => ValueType::Mat3,
            UniformValue::Mat4(_) => ValueType::Mat4,
        }
    }

    /// Flattened component list, in column-major order for matrices.
    pub fn components(&self) -> Vec<f32> {
        match *self {
            UniformValue::Float(v) => vec![v],
            UniformValue::Int(v) => vec![v as f32],
            UniformValue::Uint(v) => vec![v as f32],
            UniformValue::Bool(v) => vec![if v { 1.0 } else { 0.0 }],
            UniformValue::Vec2(v) => v.to_vec(),
            UniformValue::Vec3(v) => v.to_vec(),
            UniformValue::Vec4(v) => v.to_vec(),
            UniformValue::Mat2(v) => v.to_vec(),
            UniformValue::Mat3(v) => v.to_vec(),
            UniformValue::Mat4(v) => v.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_value_types_match_component_counts() {
        let cases = [
            (UniformValue::Float(1.0), ValueType::Float),
            (UniformValue::Vec3([0.0; 3]), ValueType::Vec3),
            (UniformValue::Mat4([0.0; 16]), ValueType::Mat4),
        ];
        for (value, ty) in cases {
            assert_eq!(value.value_type(), ty);
            assert_eq!(value.components().len() as u32, ty.components());
        }
    }
}

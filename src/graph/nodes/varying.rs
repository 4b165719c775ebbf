//! Vertex→fragment interpolation.

use std::rc::Rc;

use xxhash_rust::xxh3::Xxh3;

use crate::builder::NodeBuilder;
use crate::error::CompileError;
use crate::graph::node::{Node, NodeChildren, NodeHandle, NodeIdent};
use crate::types::{ShaderStage, ValueType};

/// Forces its child to be computed in the vertex stage and interpolated.
/// Read from the vertex stage it is a plain pass-through.
pub struct VaryingNode {
    ident: NodeIdent,
    child: NodeHandle,
}

impl VaryingNode {
    pub fn new(child: NodeHandle) -> NodeHandle {
        Rc::new(Self {
            ident: NodeIdent::new(),
            child,
        })
    }
}

impl Node for VaryingNode {
    fn ident(&self) -> &NodeIdent {
        &self.ident
    }

    fn node_type(&self) -> &'static str {
        "Varying"
    }

    fn children(&self) -> NodeChildren {
        let mut c = NodeChildren::new();
        c.push(self.child.clone());
        c
    }

    // The child lives in the vertex stage's scope tree; fragment-side
    // widening must not reach into it.
    fn crosses_stage_boundary(&self) -> bool {
        true
    }

    fn resolve_type(
        &self,
        builder: &NodeBuilder,
        expected: Option<ValueType>,
    ) -> Result<ValueType, CompileError> {
        builder.node_type_of(&self.child, expected)
    }

    fn analyze(&self, builder: &mut NodeBuilder) -> Result<(), CompileError> {
        match builder.current_stage() {
            ShaderStage::Fragment => builder.analyze_in_vertex_root(&self.child),
            _ => builder.analyze_child(&self.child),
        }
    }

    fn generate(
        &self,
        builder: &mut NodeBuilder,
        expected: Option<ValueType>,
    ) -> Result<String, CompileError> {
        let ty = self.resolve_type(builder, expected)?;
        match builder.current_stage() {
            ShaderStage::Vertex => builder.flow_child(&self.child, Some(ty)),
            ShaderStage::Fragment => {
                builder.get_varying_from_node(self.ident.id(), &self.child, ty)
            }
            ShaderStage::Compute => Err(CompileError::Description(
                "varying referenced in compute stage".to_string(),
            )),
        }
    }

    fn prefers_inline(&self) -> bool {
        true
    }

    fn hash_structure(&self, _hasher: &mut Xxh3) {}
}

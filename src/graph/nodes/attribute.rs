//! Pipeline inputs: geometry attributes and built-in values.

use std::rc::Rc;

use xxhash_rust::xxh3::Xxh3;

use crate::builder::NodeBuilder;
use crate::error::CompileError;
use crate::graph::node::{Node, NodeHandle, NodeIdent};
use crate::types::{BuiltinValue, ValueType};

/// Reads a geometry attribute. In the fragment stage the value arrives
/// through an automatically created varying.
pub struct AttributeNode {
    ident: NodeIdent,
    name: String,
}

impl AttributeNode {
    pub fn new(name: &str) -> NodeHandle {
        Rc::new(Self {
            ident: NodeIdent::new(),
            name: name.to_string(),
        })
    }
}

impl Node for AttributeNode {
    fn ident(&self) -> &NodeIdent {
        &self.ident
    }

    fn node_type(&self) -> &'static str {
        "Attribute"
    }

    fn resolve_type(
        &self,
        builder: &NodeBuilder,
        _expected: Option<ValueType>,
    ) -> Result<ValueType, CompileError> {
        builder
            .geometry()
            .attribute_type(&self.name)
            .ok_or_else(|| CompileError::TypeResolution {
                node_type: "Attribute".to_string(),
                node_id: self.ident.id(),
                detail: format!("geometry has no attribute `{}`", self.name),
            })
    }

    fn generate(
        &self,
        builder: &mut NodeBuilder,
        _expected: Option<ValueType>,
    ) -> Result<String, CompileError> {
        let ty = self.resolve_type(builder, None)?;
        builder.get_attribute(self.ident.id(), &self.name, ty)
    }

    fn prefers_inline(&self) -> bool {
        true
    }

    fn hash_structure(&self, hasher: &mut Xxh3) {
        hasher.update(self.name.as_bytes());
    }
}

/// Reads a pipeline built-in (vertex index, frag coord, ...).
pub struct BuiltinNode {
    ident: NodeIdent,
    builtin: BuiltinValue,
}

impl BuiltinNode {
    pub fn new(builtin: BuiltinValue) -> NodeHandle {
        Rc::new(Self {
            ident: NodeIdent::new(),
            builtin,
        })
    }
}

impl Node for BuiltinNode {
    fn ident(&self) -> &NodeIdent {
        &self.ident
    }

    fn node_type(&self) -> &'static str {
        "Builtin"
    }

    fn resolve_type(
        &self,
        _builder: &NodeBuilder,
        _expected: Option<ValueType>,
    ) -> Result<ValueType, CompileError> {
        Ok(match self.builtin {
            BuiltinValue::VertexIndex | BuiltinValue::InstanceIndex => ValueType::Uint,
            BuiltinValue::FrontFacing => ValueType::Bool,
            BuiltinValue::FragCoord => ValueType::Vec4,
        })
    }

    fn generate(
        &self,
        builder: &mut NodeBuilder,
        _expected: Option<ValueType>,
    ) -> Result<String, CompileError> {
        builder.get_builtin(self.builtin)
    }

    fn prefers_inline(&self) -> bool {
        true
    }

    fn hash_structure(&self, hasher: &mut Xxh3) {
        hasher.update(&[self.builtin as u8]);
    }
}

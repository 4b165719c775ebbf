//! Texture sampling.

use std::rc::Rc;

use xxhash_rust::xxh3::Xxh3;

use crate::builder::NodeBuilder;
use crate::error::CompileError;
use crate::graph::node::{Node, NodeChildren, NodeHandle, NodeIdent};
use crate::types::ValueType;

/// Samples a bound 2D texture at a UV coordinate. UV-origin flipping and
/// the unfilterable-texture fallback both live in the adapter's sampling
/// strategy.
pub struct TextureSampleNode {
    ident: NodeIdent,
    uv: NodeHandle,
    filterable: bool,
    group: String,
}

impl TextureSampleNode {
    pub fn new(uv: NodeHandle) -> NodeHandle {
        Self::with_options(uv, true, "object")
    }

    pub fn with_options(uv: NodeHandle, filterable: bool, group: &str) -> NodeHandle {
        Rc::new(Self {
            ident: NodeIdent::new(),
            uv,
            filterable,
            group: group.to_string(),
        })
    }
}

impl Node for TextureSampleNode {
    fn ident(&self) -> &NodeIdent {
        &self.ident
    }

    fn node_type(&self) -> &'static str {
        "TextureSample"
    }

    fn children(&self) -> NodeChildren {
        let mut c = NodeChildren::new();
        c.push(self.uv.clone());
        c
    }

    fn resolve_type(
        &self,
        _builder: &NodeBuilder,
        _expected: Option<ValueType>,
    ) -> Result<ValueType, CompileError> {
        Ok(ValueType::Vec4)
    }

    fn generate(
        &self,
        builder: &mut NodeBuilder,
        _expected: Option<ValueType>,
    ) -> Result<String, CompileError> {
        let uv = builder.flow_child(&self.uv, Some(ValueType::Vec2))?;
        let filterable = self.filterable && builder.capabilities().filterable_float_textures;
        builder.emit_texture_sample(self.ident.id(), filterable, &self.group, &uv)
    }

    fn hash_structure(&self, hasher: &mut Xxh3) {
        hasher.update(&[self.filterable as u8]);
        hasher.update(self.group.as_bytes());
    }
}

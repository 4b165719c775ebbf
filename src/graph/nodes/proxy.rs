//! Indirection nodes: late-bound references and cache scoping.

use std::cell::RefCell;
use std::rc::Rc;

use xxhash_rust::xxh3::Xxh3;

use crate::builder::NodeBuilder;
use crate::error::CompileError;
use crate::graph::node::{Node, NodeChildren, NodeHandle, NodeIdent};
use crate::types::ValueType;

/// A late-bound pointer to another node, re-targetable after wiring.
/// The generation guard rejects any cycle formed through one of these.
pub struct ReferenceNode {
    ident: NodeIdent,
    target: RefCell<Option<NodeHandle>>,
}

impl ReferenceNode {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            ident: NodeIdent::new(),
            target: RefCell::new(None),
        })
    }

    pub fn set_target(&self, target: NodeHandle) {
        *self.target.borrow_mut() = Some(target);
    }

    fn target(&self) -> Result<NodeHandle, CompileError> {
        self.target
            .borrow()
            .clone()
            .ok_or_else(|| CompileError::Description("unbound reference node".to_string()))
    }
}

impl Node for ReferenceNode {
    fn ident(&self) -> &NodeIdent {
        &self.ident
    }

    fn node_type(&self) -> &'static str {
        "Reference"
    }

    fn children(&self) -> NodeChildren {
        self.target.borrow().iter().cloned().collect()
    }

    fn resolve_type(
        &self,
        builder: &NodeBuilder,
        expected: Option<ValueType>,
    ) -> Result<ValueType, CompileError> {
        builder.node_type_of(&self.target()?, expected)
    }

    fn generate(
        &self,
        builder: &mut NodeBuilder,
        expected: Option<ValueType>,
    ) -> Result<String, CompileError> {
        builder.flow_child(&self.target()?, expected)
    }

    fn prefers_inline(&self) -> bool {
        true
    }

    fn hash_structure(&self, _hasher: &mut Xxh3) {}
}

/// Wraps a subgraph in a nested memoization cache. Inheriting keeps the
/// parent's snippets visible; detaching forces the subgraph to regenerate
/// even for nodes already generated outside it.
pub struct CacheScopeNode {
    ident: NodeIdent,
    child: NodeHandle,
    inherit: bool,
}

impl CacheScopeNode {
    pub fn new(child: NodeHandle, inherit: bool) -> NodeHandle {
        Rc::new(Self {
            ident: NodeIdent::new(),
            child,
            inherit,
        })
    }
}

impl Node for CacheScopeNode {
    fn ident(&self) -> &NodeIdent {
        &self.ident
    }

    fn node_type(&self) -> &'static str {
        "CacheScope"
    }

    fn children(&self) -> NodeChildren {
        let mut c = NodeChildren::new();
        c.push(self.child.clone());
        c
    }

    fn resolve_type(
        &self,
        builder: &NodeBuilder,
        expected: Option<ValueType>,
    ) -> Result<ValueType, CompileError> {
        builder.node_type_of(&self.child, expected)
    }

    fn generate(
        &self,
        builder: &mut NodeBuilder,
        expected: Option<ValueType>,
    ) -> Result<String, CompileError> {
        builder.push_cache(self.inherit);
        let result = builder.flow_child(&self.child, expected);
        builder.pop_cache();
        result
    }

    fn prefers_inline(&self) -> bool {
        true
    }

    fn hash_structure(&self, hasher: &mut Xxh3) {
        hasher.update(&[self.inherit as u8]);
    }
}

//! The `Node` trait: the atomic unit of the shader-authoring graph.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;
use uuid::Uuid;
use xxhash_rust::xxh3::Xxh3;

use crate::builder::NodeBuilder;
use crate::error::CompileError;
use crate::graph::stack::ScopeId;
use crate::types::{UpdateCadence, ValueType};

/// Monotonically increasing node identity, unique per process.
pub type NodeId = u64;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Shared, immutable handle to an authored node. A graph is a DAG of these;
/// the same handle may feed several consumers.
pub type NodeHandle = Rc<dyn Node>;

/// Child list returned by [`Node::children`]. Small inline capacity since
/// most nodes have at most a few inputs.
pub type NodeChildren = SmallVec<[NodeHandle; 4]>;

/// Host-side data handed to `update` callbacks.
#[derive(Clone, Copy, Debug, Default)]
pub struct UpdateContext {
    pub frame_id: u64,
    pub time_seconds: f32,
    pub object_index: u32,
}

/// Identity and lazily-computed structural cache key. Every concrete node
/// kind embeds one and returns it from [`Node::ident`].
#[derive(Debug)]
pub struct NodeIdent {
    id: NodeId,
    uuid: Uuid,
    cache_key: Cell<Option<u64>>,
    hashing: Cell<bool>,
}

impl NodeIdent {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            uuid: Uuid::new_v4(),
            cache_key: Cell::new(None),
            hashing: Cell::new(false),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

/// Atomic graph unit. Implementations describe *what* to compute; the
/// builder walks them through setup → analyze → generate and owns all
/// per-build mutable state, so a node authored once can be reused across
/// any number of builder instances.
pub trait Node: 'static {
    /// Identity record embedded in the concrete type.
    fn ident(&self) -> &NodeIdent;

    /// Stable type tag, also used by the registry and error messages.
    fn node_type(&self) -> &'static str;

    /// How often host-side data behind this node must be refreshed.
    fn update_cadence(&self) -> UpdateCadence {
        UpdateCadence::None
    }

    /// Direct children, in a fixed order (used for traversal and for the
    /// structural cache key).
    fn children(&self) -> NodeChildren {
        NodeChildren::new()
    }

    /// Resolve the output type. `expected` is the type wanted by the
    /// consumer, which context-dependent nodes may adopt.
    fn resolve_type(
        &self,
        builder: &NodeBuilder,
        expected: Option<ValueType>,
    ) -> Result<ValueType, CompileError>;

    /// Runs once per (node, builder) before any analyze/generate. May return
    /// a substitute subgraph that replaces this node for the rest of the
    /// build. Must be idempotent; the builder memoizes the result.
    fn setup(&self, _builder: &mut NodeBuilder) -> Result<Option<NodeHandle>, CompileError> {
        Ok(None)
    }

    /// Usage-counting pass. The default recurses into `children()`; nodes
    /// that open scopes or cross shader stages override this to mirror
    /// their generate-time traversal.
    fn analyze(&self, builder: &mut NodeBuilder) -> Result<(), CompileError> {
        for child in self.children() {
            builder.analyze_child(&child)?;
        }
        Ok(())
    }

    /// Emit code and return the expression for this node's value, in the
    /// target language of the builder's adapter. Multiply-referenced nodes
    /// are materialized by the builder; `generate` itself always produces
    /// the full inline expression.
    fn generate(
        &self,
        builder: &mut NodeBuilder,
        output: Option<ValueType>,
    ) -> Result<String, CompileError>;

    /// Scope-widening pass run after analyze: children of a node generated
    /// in `self_scope` will be referenced from there, so their recorded
    /// scopes must widen accordingly. Nodes that generate children inside
    /// scopes of their own (conditionals) override this to keep branch
    /// subtrees in their branch scopes.
    fn propagate_scopes(&self, builder: &mut NodeBuilder, self_scope: ScopeId) {
        for child in self.children() {
            builder.widen_child(&child, self_scope);
        }
    }

    /// Trivial expressions (literals, plain identifiers) that should never
    /// be hoisted into a named variable even when referenced repeatedly.
    fn prefers_inline(&self) -> bool {
        false
    }

    /// True for nodes whose children are generated in a different shader
    /// stage than the node itself (varyings). Scope propagation stops at
    /// such boundaries.
    fn crosses_stage_boundary(&self) -> bool {
        false
    }

    /// Refresh callbacks, driven by the renderer via
    /// [`NodeBuilder::update_nodes`] according to `update_cadence`.
    fn update_before(&self, _ctx: &UpdateContext) {}
    fn update(&self, _ctx: &UpdateContext) {}
    fn update_after(&self, _ctx: &UpdateContext) {}

    /// Feed the node's own parameters (not its children) into the
    /// structural hash. Children are mixed in by
    /// [`structural_cache_key`].
    fn hash_structure(&self, hasher: &mut Xxh3);
}

/// Structural hash over a subgraph: node type tags and parameters plus all
/// child cache keys, independent of node identity and authored values that
/// do not change the generated code shape.
///
/// Memoized in the node's [`NodeIdent`]; pass `force` to recompute after
/// structural edits (e.g. a re-pointed reference node).
pub fn structural_cache_key(node: &dyn Node, force: bool) -> u64 {
    if !force {
        if let Some(key) = node.ident().cache_key.get() {
            return key;
        }
    }
    // Cyclic graphs (re-pointed reference nodes) get a per-node sentinel
    // at the back-edge; the cycle itself is rejected later by the
    // generation guard.
    if node.ident().hashing.replace(true) {
        return node.ident().id();
    }
    let mut hasher = Xxh3::new();
    hasher.update(node.node_type().as_bytes());
    node.hash_structure(&mut hasher);
    for child in node.children() {
        hasher.update(&structural_cache_key(child.as_ref(), force).to_le_bytes());
    }
    let key = hasher.digest();
    node.ident().hashing.set(false);
    node.ident().cache_key.set(Some(key));
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::nodes::input::ConstantNode;
    use crate::graph::nodes::math::{Operator, OperatorNode};

    #[test]
    fn idents_are_unique_and_monotonic() {
        let a = NodeIdent::new();
        let b = NodeIdent::new();
        assert!(b.id() > a.id());
        assert_ne!(a.uuid(), b.uuid());
    }

    #[test]
    fn structurally_identical_graphs_share_cache_keys() {
        let g1 = OperatorNode::new(
            Operator::Add,
            ConstantNode::float(1.0),
            ConstantNode::float(2.0),
        );
        let g2 = OperatorNode::new(
            Operator::Add,
            ConstantNode::float(1.0),
            ConstantNode::float(2.0),
        );
        assert_eq!(
            structural_cache_key(g1.as_ref(), false),
            structural_cache_key(g2.as_ref(), false)
        );

        let g3 = OperatorNode::new(
            Operator::Mul,
            ConstantNode::float(1.0),
            ConstantNode::float(2.0),
        );
        assert_ne!(
            structural_cache_key(g1.as_ref(), false),
            structural_cache_key(g3.as_ref(), false)
        );
    }
}

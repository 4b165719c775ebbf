//! Node graph: the `Node` trait, scope/cache/guard machinery and the
//! concrete node kinds shipped with the crate.

pub mod cache;
pub mod chain;
pub mod node;
pub mod nodes;
pub mod registry;
pub mod stack;

pub use cache::{CacheId, NodeCacheSet};
pub use chain::FlowChain;
pub use node::{structural_cache_key, Node, NodeHandle, NodeId, NodeIdent, UpdateContext};
pub use registry::NodeRegistry;
pub use stack::{ScopeId, ScopeTree};

/// Root nodes of an authored material, one per shader stage.
///
/// The vertex root must produce a clip-space `Vec4` position; when absent a
/// plain `position` attribute passthrough is synthesized. The fragment root
/// produces the output color (`Vec4`).
#[derive(Clone, Default)]
pub struct MaterialGraph {
    pub vertex: Option<NodeHandle>,
    pub fragment: Option<NodeHandle>,
    pub compute: Option<NodeHandle>,
}

impl MaterialGraph {
    pub fn with_fragment(root: NodeHandle) -> Self {
        Self {
            fragment: Some(root),
            ..Self::default()
        }
    }
}

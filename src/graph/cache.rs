//! Per-scope memoization of generated snippets.

use rustc_hash::FxHashMap;

use crate::graph::node::NodeId;
use crate::types::{ShaderStage, ValueType};

/// Index of a cache scope inside a [`NodeCacheSet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheId(pub(crate) u32);

/// The memoized artifact for one (node, stage, cache) lookup: the expression
/// later references resolve to (a variable name once materialized, otherwise
/// the inline expression) and its resolved type.
#[derive(Clone, Debug)]
pub struct FlowSnippet {
    pub expr: String,
    pub ty: ValueType,
}

struct CacheScope {
    parent: Option<CacheId>,
    entries: FxHashMap<(NodeId, ShaderStage), FlowSnippet>,
}

/// Nested node caches owned by one builder. A child scope may either
/// inherit from its parent (lookups fall through) or fork detached, forcing
/// the subgraph to re-generate.
///
/// Lookup fall-through follows the `parent` chain (broken for detached
/// scopes); push/pop tracks the enclosing scope separately, so popping a
/// detached scope still returns to whatever was active at push time.
pub struct NodeCacheSet {
    scopes: Vec<CacheScope>,
    stack: Vec<CacheId>,
}

impl NodeCacheSet {
    pub fn new() -> Self {
        Self {
            scopes: vec![CacheScope {
                parent: None,
                entries: FxHashMap::default(),
            }],
            stack: vec![CacheId(0)],
        }
    }

    pub fn root(&self) -> CacheId {
        CacheId(0)
    }

    pub fn active(&self) -> CacheId {
        self.stack.last().copied().unwrap_or(CacheId(0))
    }

    /// Open a nested scope. `inherit` keeps parent entries visible.
    pub fn push(&mut self, inherit: bool) -> CacheId {
        let parent = inherit.then_some(self.active());
        let id = CacheId(self.scopes.len() as u32);
        self.scopes.push(CacheScope {
            parent,
            entries: FxHashMap::default(),
        });
        self.stack.push(id);
        id
    }

    /// Close the active scope, returning to the scope that was active when
    /// it was pushed.
    pub fn pop(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    pub fn get(&self, node: NodeId, stage: ShaderStage) -> Option<&FlowSnippet> {
        let mut cursor = Some(self.active());
        while let Some(id) = cursor {
            let scope = &self.scopes[id.0 as usize];
            if let Some(snippet) = scope.entries.get(&(node, stage)) {
                return Some(snippet);
            }
            cursor = scope.parent;
        }
        None
    }

    pub fn insert(&mut self, node: NodeId, stage: ShaderStage, snippet: FlowSnippet) {
        let active = self.active();
        self.scopes[active.0 as usize]
            .entries
            .insert((node, stage), snippet);
    }
}

impl Default for NodeCacheSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(expr: &str) -> FlowSnippet {
        FlowSnippet {
            expr: expr.into(),
            ty: ValueType::Float,
        }
    }

    #[test]
    fn inherited_scope_sees_parent_entries() {
        let mut caches = NodeCacheSet::new();
        caches.insert(1, ShaderStage::Fragment, snippet("v0"));

        caches.push(true);
        assert_eq!(caches.get(1, ShaderStage::Fragment).unwrap().expr, "v0");
        caches.pop();
    }

    #[test]
    fn detached_scope_hides_parent_entries() {
        let mut caches = NodeCacheSet::new();
        caches.insert(1, ShaderStage::Fragment, snippet("v0"));

        caches.push(false);
        assert!(caches.get(1, ShaderStage::Fragment).is_none());
        caches.insert(1, ShaderStage::Fragment, snippet("v1"));
        assert_eq!(caches.get(1, ShaderStage::Fragment).unwrap().expr, "v1");
        caches.pop();

        // Parent entry untouched.
        assert_eq!(caches.get(1, ShaderStage::Fragment).unwrap().expr, "v0");
    }

    #[test]
    fn popping_a_detached_scope_returns_to_the_enclosing_scope() {
        let mut caches = NodeCacheSet::new();
        let outer = caches.push(true);
        caches.push(false);
        caches.pop();
        assert_eq!(caches.active(), outer);

        // Entries inserted after the pop land in the outer scope, not the
        // root, and disappear with it.
        caches.insert(1, ShaderStage::Fragment, snippet("v0"));
        caches.pop();
        assert_eq!(caches.active(), caches.root());
        assert!(caches.get(1, ShaderStage::Fragment).is_none());
    }

    #[test]
    fn stages_do_not_alias() {
        let mut caches = NodeCacheSet::new();
        caches.insert(1, ShaderStage::Vertex, snippet("v0"));
        assert!(caches.get(1, ShaderStage::Fragment).is_none());
    }
}

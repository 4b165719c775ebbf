//! Scope tree for scope-aware variable placement.
//!
//! Every shader stage builds one [`ScopeTree`]. The root scope is the entry
//! function body; conditional nodes open nested scopes. The analyze pass
//! records, per node, the lowest common ancestor of all its reference sites;
//! the generate pass then declares a multiply-used node's variable local to
//! that scope instead of unconditionally hoisting it to the function
//! preamble.

/// Index of a scope inside its stage's [`ScopeTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(pub(crate) u32);

/// One nested statement block: ordered statement lines plus child scopes.
#[derive(Debug)]
pub struct StackNode {
    parent: Option<ScopeId>,
    depth: u32,
    /// Whether the block executes conditionally.
    pub conditional: bool,
    lines: Vec<String>,
    children: Vec<ScopeId>,
    /// Generate-pass replay cursor over `children`.
    next_child: usize,
}

/// All scopes of one shader stage.
///
/// The tree is allocated during the analyze pass. The generate pass replays
/// the identical traversal and re-enters the already-allocated scopes via a
/// per-scope child cursor, so analyze-recorded scope ids stay meaningful.
#[derive(Debug)]
pub struct ScopeTree {
    scopes: Vec<StackNode>,
    active: Vec<ScopeId>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self {
            scopes: vec![StackNode {
                parent: None,
                depth: 0,
                conditional: false,
                lines: Vec::new(),
                children: Vec::new(),
                next_child: 0,
            }],
            active: vec![ScopeId(0)],
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn current(&self) -> ScopeId {
        *self.active.last().expect("root scope always active")
    }

    /// Open a child scope of the current scope (analyze pass).
    pub fn push_new(&mut self, conditional: bool) -> ScopeId {
        let parent = self.current();
        let id = ScopeId(self.scopes.len() as u32);
        let depth = self.scopes[parent.0 as usize].depth + 1;
        self.scopes.push(StackNode {
            parent: Some(parent),
            depth,
            conditional,
            lines: Vec::new(),
            children: Vec::new(),
            next_child: 0,
        });
        self.scopes[parent.0 as usize].children.push(id);
        self.active.push(id);
        id
    }

    /// Re-enter the next recorded child of the current scope (generate
    /// pass). Falls back to allocating when the traversal opens a scope the
    /// analyze pass never saw.
    pub fn push_replay(&mut self, conditional: bool) -> ScopeId {
        let parent = self.current();
        let cursor = self.scopes[parent.0 as usize].next_child;
        if let Some(&id) = self.scopes[parent.0 as usize].children.get(cursor) {
            self.scopes[parent.0 as usize].next_child = cursor + 1;
            self.active.push(id);
            id
        } else {
            self.push_new(conditional)
        }
    }

    /// Re-enter an already-allocated scope without touching the child
    /// cursor (used when a hoisted declaration is emitted into an ancestor
    /// scope). Pair with `pop`.
    pub fn enter(&mut self, scope: ScopeId) {
        self.active.push(scope);
    }

    /// Close the current scope. The root scope is never popped.
    pub fn pop(&mut self) {
        if self.active.len() > 1 {
            self.active.pop();
        }
    }

    pub fn push_line(&mut self, scope: ScopeId, line: impl Into<String>) {
        self.scopes[scope.0 as usize].lines.push(line.into());
    }

    pub fn push_line_current(&mut self, line: impl Into<String>) {
        let scope = self.current();
        self.push_line(scope, line);
    }

    /// Drain the statement lines of a scope (used when a conditional node
    /// wraps its branch scope into an `if` block).
    pub fn take_lines(&mut self, scope: ScopeId) -> Vec<String> {
        std::mem::take(&mut self.scopes[scope.0 as usize].lines)
    }

    pub fn lines(&self, scope: ScopeId) -> &[String] {
        &self.scopes[scope.0 as usize].lines
    }

    pub fn is_root(&self, scope: ScopeId) -> bool {
        scope == self.root()
    }

    /// Lowest common ancestor of two scopes.
    pub fn lca(&self, a: ScopeId, b: ScopeId) -> ScopeId {
        let (mut a, mut b) = (a, b);
        while self.scopes[a.0 as usize].depth > self.scopes[b.0 as usize].depth {
            a = self.scopes[a.0 as usize].parent.expect("deeper scope has parent");
        }
        while self.scopes[b.0 as usize].depth > self.scopes[a.0 as usize].depth {
            b = self.scopes[b.0 as usize].parent.expect("deeper scope has parent");
        }
        while a != b {
            a = self.scopes[a.0 as usize].parent.expect("non-root scope has parent");
            b = self.scopes[b.0 as usize].parent.expect("non-root scope has parent");
        }
        a
    }
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lca_of_sibling_branches_is_their_parent() {
        let mut tree = ScopeTree::new();
        let then_scope = tree.push_new(true);
        tree.pop();
        let else_scope = tree.push_new(true);
        tree.pop();

        assert_eq!(tree.lca(then_scope, else_scope), tree.root());
        assert_eq!(tree.lca(then_scope, then_scope), then_scope);
        assert_eq!(tree.lca(then_scope, tree.root()), tree.root());
    }

    #[test]
    fn replay_reenters_recorded_scopes_in_order() {
        let mut tree = ScopeTree::new();
        let a = tree.push_new(true);
        tree.pop();
        let b = tree.push_new(true);
        tree.pop();

        assert_eq!(tree.push_replay(true), a);
        tree.pop();
        assert_eq!(tree.push_replay(true), b);
        tree.pop();
    }

    #[test]
    fn take_lines_drains_in_emission_order() {
        let mut tree = ScopeTree::new();
        let scope = tree.push_new(false);
        tree.push_line_current("let a = 1.0;");
        tree.push_line_current("let b = a;");
        tree.pop();
        assert_eq!(tree.take_lines(scope), vec!["let a = 1.0;", "let b = a;"]);
        assert!(tree.lines(scope).is_empty());
    }
}

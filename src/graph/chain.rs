//! Recursion guard for the code-generation driver.

use crate::error::CompileError;
use crate::graph::node::NodeId;

/// Explicit "currently generating" call stack. Re-entering a node that is
/// already on the stack means the authored graph is cyclic; the guard fails
/// fast instead of recursing until overflow.
#[derive(Debug, Default)]
pub struct FlowChain {
    stack: Vec<NodeId>,
}

impl FlowChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a node. Errors with [`CompileError::Graph`] on re-entry.
    pub fn push(&mut self, node_id: NodeId, node_type: &str) -> Result<(), CompileError> {
        if self.stack.contains(&node_id) {
            return Err(CompileError::Graph {
                node_type: node_type.to_string(),
                node_id,
            });
        }
        self.stack.push(node_id);
        Ok(())
    }

    /// Leave the most recently entered node. Callers must pair every
    /// successful `push` with exactly one `pop`.
    pub fn pop(&mut self) {
        self.stack.pop();
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reentry_is_a_graph_error() {
        let mut chain = FlowChain::new();
        chain.push(1, "Add").unwrap();
        chain.push(2, "Mul").unwrap();
        let err = chain.push(1, "Add").unwrap_err();
        assert!(matches!(err, CompileError::Graph { node_id: 1, .. }));
    }

    #[test]
    fn pop_allows_revisiting() {
        let mut chain = FlowChain::new();
        chain.push(1, "Add").unwrap();
        chain.pop();
        chain.push(1, "Add").unwrap();
        assert_eq!(chain.depth(), 1);
    }
}

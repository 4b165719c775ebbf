//! Value-producing conditional.

use std::rc::Rc;

use xxhash_rust::xxh3::Xxh3;

use crate::builder::NodeBuilder;
use crate::error::CompileError;
use crate::graph::node::{Node, NodeChildren, NodeHandle, NodeIdent};
use crate::graph::stack::ScopeId;
use crate::types::ValueType;

/// `cond ? then : else` expressed as a branch: an uninitialized output
/// variable assigned inside each arm, so branch-only subexpressions stay
/// inside the branch they belong to.
pub struct CondNode {
    ident: NodeIdent,
    cond: NodeHandle,
    then_branch: NodeHandle,
    else_branch: Option<NodeHandle>,
}

impl CondNode {
    pub fn new(
        cond: NodeHandle,
        then_branch: NodeHandle,
        else_branch: Option<NodeHandle>,
    ) -> NodeHandle {
        Rc::new(Self {
            ident: NodeIdent::new(),
            cond,
            then_branch,
            else_branch,
        })
    }
}

impl Node for CondNode {
    fn ident(&self) -> &NodeIdent {
        &self.ident
    }

    fn node_type(&self) -> &'static str {
        "Cond"
    }

    fn children(&self) -> NodeChildren {
        let mut c = NodeChildren::new();
        c.push(self.cond.clone());
        c.push(self.then_branch.clone());
        if let Some(else_branch) = &self.else_branch {
            c.push(else_branch.clone());
        }
        c
    }

    fn resolve_type(
        &self,
        builder: &NodeBuilder,
        expected: Option<ValueType>,
    ) -> Result<ValueType, CompileError> {
        let then_ty = builder.node_type_of(&self.then_branch, expected)?;
        if let Some(else_branch) = &self.else_branch {
            let else_ty = builder.node_type_of(else_branch, expected)?;
            if else_ty != then_ty {
                return Err(CompileError::TypeMismatch {
                    left: then_ty,
                    right: else_ty,
                    detail: "conditional branches disagree".to_string(),
                });
            }
        }
        Ok(then_ty)
    }

    /// Opens one analysis scope per branch so reference counting records
    /// branch-local usage at the branch scope, not the surrounding one.
    fn analyze(&self, builder: &mut NodeBuilder) -> Result<(), CompileError> {
        builder.analyze_child(&self.cond)?;
        let then_scope = builder.push_scope(true);
        builder.analyze_child(&self.then_branch)?;
        builder.pop_scope();
        let else_scope = match &self.else_branch {
            Some(else_branch) => {
                let scope = builder.push_scope(true);
                builder.analyze_child(else_branch)?;
                builder.pop_scope();
                Some(scope)
            }
            None => None,
        };
        builder.record_branch_scopes(self.ident.id(), then_scope, else_scope);
        Ok(())
    }

    /// Keeps branch subtrees scoped to their branch during widening; only
    /// the condition widens to the conditional's own scope.
    fn propagate_scopes(&self, builder: &mut NodeBuilder, self_scope: ScopeId) {
        builder.widen_child(&self.cond, self_scope);
        match builder.branch_scopes_of(self.ident.id()) {
            Some((then_scope, else_scope)) => {
                builder.widen_child(&self.then_branch, then_scope);
                if let (Some(else_branch), Some(else_scope)) = (&self.else_branch, else_scope) {
                    builder.widen_child(else_branch, else_scope);
                }
            }
            None => {
                builder.widen_child(&self.then_branch, self_scope);
                if let Some(else_branch) = &self.else_branch {
                    builder.widen_child(else_branch, self_scope);
                }
            }
        }
    }

    fn generate(
        &self,
        builder: &mut NodeBuilder,
        expected: Option<ValueType>,
    ) -> Result<String, CompileError> {
        let ty = self.resolve_type(builder, expected)?;
        let cond = builder.flow_child(&self.cond, Some(ValueType::Bool))?;
        let out = builder.declare_out_var(ty)?;

        builder.push_scope(true);
        let then_expr = builder.flow_child(&self.then_branch, Some(ty))?;
        let line = builder.adapter().assignment(&out, &then_expr);
        builder.push_line(line);
        let then_lines = builder.take_current_scope_lines();
        builder.pop_scope();

        let else_lines = match &self.else_branch {
            Some(else_branch) => {
                builder.push_scope(true);
                let else_expr = builder.flow_child(else_branch, Some(ty))?;
                let line = builder.adapter().assignment(&out, &else_expr);
                builder.push_line(line);
                let lines = builder.take_current_scope_lines();
                builder.pop_scope();
                lines
            }
            None => Vec::new(),
        };

        builder.push_conditional(&cond, then_lines, else_lines);
        Ok(out)
    }

    // Already emits through its output variable; hoisting would wrap the
    // whole branch a second time.
    fn prefers_inline(&self) -> bool {
        true
    }

    fn hash_structure(&self, hasher: &mut Xxh3) {
        hasher.update(&[self.else_branch.is_some() as u8]);
    }
}

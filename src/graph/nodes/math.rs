//! Arithmetic, comparison and intrinsic math nodes.

use std::rc::Rc;

use xxhash_rust::xxh3::Xxh3;

use crate::builder::NodeBuilder;
use crate::error::CompileError;
use crate::graph::node::{Node, NodeChildren, NodeHandle, NodeIdent};
use crate::types::{ScalarKind, ValueType};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Less => "<",
            Operator::LessEqual => "<=",
            Operator::Greater => ">",
            Operator::GreaterEqual => ">=",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Less
                | Operator::LessEqual
                | Operator::Greater
                | Operator::GreaterEqual
                | Operator::Equal
                | Operator::NotEqual
        )
    }
}

/// Common operand type two binary operands promote to: equal types stay,
/// a scalar splats against a vector, int promotes to float, and matrices
/// multiply vectors of matching width.
pub fn coerce_for_binary(left: ValueType, right: ValueType) -> Result<ValueType, CompileError> {
    if left == right {
        return Ok(left);
    }
    let mismatch = |detail: &str| CompileError::TypeMismatch {
        left,
        right,
        detail: detail.to_string(),
    };

    // Matrix * vector keeps both operand types as-is.
    if left.is_matrix() || right.is_matrix() {
        return Err(mismatch("matrix operands must use MatMul"));
    }

    let kind = match (left.scalar_kind(), right.scalar_kind()) {
        (Some(ScalarKind::Float), Some(ScalarKind::Int | ScalarKind::Uint))
        | (Some(ScalarKind::Int | ScalarKind::Uint), Some(ScalarKind::Float)) => ScalarKind::Float,
        (Some(x), Some(y)) if x == y => x,
        _ => return Err(mismatch("no common promotion")),
    };
    let (Some(lw), Some(rw)) = (left.vector_len(), right.vector_len()) else {
        return Err(mismatch("no common promotion"));
    };
    // A width-1 operand splats to the other side's width.
    if lw != rw && lw.min(rw) != 1 {
        return Err(mismatch("vector widths differ"));
    }
    ValueType::vector_of(kind, lw.max(rw)).ok_or_else(|| mismatch("no common promotion"))
}

/// Infix binary operation over two coerced operands.
pub struct OperatorNode {
    ident: NodeIdent,
    op: Operator,
    left: NodeHandle,
    right: NodeHandle,
}

impl OperatorNode {
    pub fn new(op: Operator, left: NodeHandle, right: NodeHandle) -> NodeHandle {
        Rc::new(Self {
            ident: NodeIdent::new(),
            op,
            left,
            right,
        })
    }
}

impl Node for OperatorNode {
    fn ident(&self) -> &NodeIdent {
        &self.ident
    }

    fn node_type(&self) -> &'static str {
        "Operator"
    }

    fn children(&self) -> NodeChildren {
        let mut c = NodeChildren::new();
        c.push(self.left.clone());
        c.push(self.right.clone());
        c
    }

    fn resolve_type(
        &self,
        builder: &NodeBuilder,
        expected: Option<ValueType>,
    ) -> Result<ValueType, CompileError> {
        let l = builder.node_type_of(&self.left, expected)?;
        let r = builder.node_type_of(&self.right, expected)?;
        let operand = coerce_for_binary(l, r)?;
        if self.op.is_comparison() {
            Ok(operand
                .vector_len()
                .and_then(|n| ValueType::vector_of(ScalarKind::Bool, n))
                .unwrap_or(ValueType::Bool))
        } else {
            Ok(operand)
        }
    }

    fn generate(
        &self,
        builder: &mut NodeBuilder,
        _expected: Option<ValueType>,
    ) -> Result<String, CompileError> {
        let l = builder.node_type_of(&self.left, None)?;
        let r = builder.node_type_of(&self.right, None)?;
        let operand = coerce_for_binary(l, r)?;
        let left = builder.flow_child(&self.left, Some(operand))?;
        let right = builder.flow_child(&self.right, Some(operand))?;
        Ok(format!("({left} {} {right})", self.op.symbol()))
    }

    fn hash_structure(&self, hasher: &mut Xxh3) {
        hasher.update(&[self.op as u8]);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MathFunction {
    Sin,
    Cos,
    Sqrt,
    Abs,
    Floor,
    Fract,
    Pow,
    Min,
    Max,
    Clamp,
    Mix,
    Dot,
    Cross,
    Normalize,
    Length,
    Saturate,
}

impl MathFunction {
    pub fn name(&self) -> &'static str {
        match self {
            MathFunction::Sin => "sin",
            MathFunction::Cos => "cos",
            MathFunction::Sqrt => "sqrt",
            MathFunction::Abs => "abs",
            MathFunction::Floor => "floor",
            MathFunction::Fract => "fract",
            MathFunction::Pow => "pow",
            MathFunction::Min => "min",
            MathFunction::Max => "max",
            MathFunction::Clamp => "clamp",
            MathFunction::Mix => "mix",
            MathFunction::Dot => "dot",
            MathFunction::Cross => "cross",
            MathFunction::Normalize => "normalize",
            MathFunction::Length => "length",
            MathFunction::Saturate => "saturate",
        }
    }

    pub fn arg_count(&self) -> usize {
        match self {
            MathFunction::Pow | MathFunction::Min | MathFunction::Max | MathFunction::Dot
            | MathFunction::Cross => 2,
            MathFunction::Clamp | MathFunction::Mix => 3,
            _ => 1,
        }
    }
}

/// Intrinsic math call; spelling differences (e.g. `saturate`) are the
/// adapter's problem.
pub struct MathNode {
    ident: NodeIdent,
    func: MathFunction,
    args: Vec<NodeHandle>,
}

impl MathNode {
    pub fn new(func: MathFunction, args: Vec<NodeHandle>) -> Result<NodeHandle, CompileError> {
        if args.len() != func.arg_count() {
            return Err(CompileError::Description(format!(
                "`{}` takes {} argument(s), got {}",
                func.name(),
                func.arg_count(),
                args.len()
            )));
        }
        Ok(Rc::new(Self {
            ident: NodeIdent::new(),
            func,
            args,
        }))
    }

    /// Infallible constructor for the single-argument intrinsics.
    pub fn unary(func: MathFunction, arg: NodeHandle) -> NodeHandle {
        debug_assert_eq!(func.arg_count(), 1, "`{}` is not unary", func.name());
        Rc::new(Self {
            ident: NodeIdent::new(),
            func,
            args: vec![arg],
        })
    }
}

impl Node for MathNode {
    fn ident(&self) -> &NodeIdent {
        &self.ident
    }

    fn node_type(&self) -> &'static str {
        "Math"
    }

    fn children(&self) -> NodeChildren {
        self.args.iter().cloned().collect()
    }

    fn resolve_type(
        &self,
        builder: &NodeBuilder,
        expected: Option<ValueType>,
    ) -> Result<ValueType, CompileError> {
        match self.func {
            MathFunction::Dot | MathFunction::Length => Ok(ValueType::Float),
            MathFunction::Cross => Ok(ValueType::Vec3),
            _ => builder.node_type_of(&self.args[0], expected),
        }
    }

    fn generate(
        &self,
        builder: &mut NodeBuilder,
        expected: Option<ValueType>,
    ) -> Result<String, CompileError> {
        let arg_ty = match self.func {
            MathFunction::Cross => Some(ValueType::Vec3),
            MathFunction::Dot | MathFunction::Length => None,
            _ => Some(self.resolve_type(builder, expected)?),
        };
        let mut rendered = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            rendered.push(builder.flow_child(arg, arg_ty)?);
        }
        builder.adapter().math_call(self.func.name(), &rendered)
    }

    fn hash_structure(&self, hasher: &mut Xxh3) {
        hasher.update(&[self.func as u8]);
    }
}

/// Packs scalar/vector parts into a wider vector.
pub struct JoinNode {
    ident: NodeIdent,
    parts: Vec<NodeHandle>,
}

impl JoinNode {
    pub fn new(parts: Vec<NodeHandle>) -> NodeHandle {
        Rc::new(Self {
            ident: NodeIdent::new(),
            parts,
        })
    }
}

impl Node for JoinNode {
    fn ident(&self) -> &NodeIdent {
        &self.ident
    }

    fn node_type(&self) -> &'static str {
        "Join"
    }

    fn children(&self) -> NodeChildren {
        self.parts.iter().cloned().collect()
    }

    fn resolve_type(
        &self,
        builder: &NodeBuilder,
        _expected: Option<ValueType>,
    ) -> Result<ValueType, CompileError> {
        let mut total = 0;
        for part in &self.parts {
            total += builder.node_type_of(part, None)?.components();
        }
        match total {
            1 => Ok(ValueType::Float),
            2 => Ok(ValueType::Vec2),
            3 => Ok(ValueType::Vec3),
            4 => Ok(ValueType::Vec4),
            n => Err(CompileError::TypeResolution {
                node_type: "Join".to_string(),
                node_id: self.ident.id(),
                detail: format!("{n} components do not fit a vector"),
            }),
        }
    }

    fn generate(
        &self,
        builder: &mut NodeBuilder,
        _expected: Option<ValueType>,
    ) -> Result<String, CompileError> {
        let ty = self.resolve_type(builder, None)?;
        let mut args = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            args.push(builder.flow_child(part, None)?);
        }
        builder.adapter().construct(ty, &args)
    }

    fn hash_structure(&self, hasher: &mut Xxh3) {
        hasher.update(&(self.parts.len() as u32).to_le_bytes());
    }
}

/// Component selection (`.xyz`, `.x`, ...).
pub struct SwizzleNode {
    ident: NodeIdent,
    child: NodeHandle,
    pattern: String,
}

impl SwizzleNode {
    pub fn new(child: NodeHandle, pattern: &str) -> Result<NodeHandle, CompileError> {
        if pattern.is_empty()
            || pattern.len() > 4
            || !pattern.chars().all(|c| matches!(c, 'x' | 'y' | 'z' | 'w'))
        {
            return Err(CompileError::Description(format!(
                "invalid swizzle pattern `{pattern}`"
            )));
        }
        Ok(Rc::new(Self {
            ident: NodeIdent::new(),
            child,
            pattern: pattern.to_string(),
        }))
    }
}

impl Node for SwizzleNode {
    fn ident(&self) -> &NodeIdent {
        &self.ident
    }

    fn node_type(&self) -> &'static str {
        "Swizzle"
    }

    fn children(&self) -> NodeChildren {
        let mut c = NodeChildren::new();
        c.push(self.child.clone());
        c
    }

    fn resolve_type(
        &self,
        builder: &NodeBuilder,
        _expected: Option<ValueType>,
    ) -> Result<ValueType, CompileError> {
        let src = builder.node_type_of(&self.child, None)?;
        let kind = src.scalar_kind().ok_or_else(|| CompileError::TypeResolution {
            node_type: "Swizzle".to_string(),
            node_id: self.ident.id(),
            detail: format!("cannot swizzle `{src:?}`"),
        })?;
        let width = src.components() as usize;
        let highest = self
            .pattern
            .chars()
            .map(|c| match c {
                'x' => 1,
                'y' => 2,
                'z' => 3,
                _ => 4,
            })
            .max()
            .unwrap_or(1);
        if highest > width {
            return Err(CompileError::TypeResolution {
                node_type: "Swizzle".to_string(),
                node_id: self.ident.id(),
                detail: format!("`{}` does not fit a {width}-component value", self.pattern),
            });
        }
        Ok(match self.pattern.len() as u32 {
            1 => match kind {
                ScalarKind::Float => ValueType::Float,
                ScalarKind::Int => ValueType::Int,
                ScalarKind::Uint => ValueType::Uint,
                ScalarKind::Bool => ValueType::Bool,
            },
            n => ValueType::vector_of(kind, n).unwrap_or(ValueType::Vec4),
        })
    }

    fn generate(
        &self,
        builder: &mut NodeBuilder,
        _expected: Option<ValueType>,
    ) -> Result<String, CompileError> {
        let expr = builder.flow_child(&self.child, None)?;
        Ok(format!("{expr}.{}", self.pattern))
    }

    fn prefers_inline(&self) -> bool {
        true
    }

    fn hash_structure(&self, hasher: &mut Xxh3) {
        hasher.update(self.pattern.as_bytes());
    }
}

/// Explicit type conversion (splat, widen, narrow, cast).
pub struct ConvertNode {
    ident: NodeIdent,
    child: NodeHandle,
    to: ValueType,
}

impl ConvertNode {
    pub fn new(child: NodeHandle, to: ValueType) -> NodeHandle {
        Rc::new(Self {
            ident: NodeIdent::new(),
            child,
            to,
        })
    }
}

impl Node for ConvertNode {
    fn ident(&self) -> &NodeIdent {
        &self.ident
    }

    fn node_type(&self) -> &'static str {
        "Convert"
    }

    fn children(&self) -> NodeChildren {
        let mut c = NodeChildren::new();
        c.push(self.child.clone());
        c
    }

    fn resolve_type(
        &self,
        _builder: &NodeBuilder,
        _expected: Option<ValueType>,
    ) -> Result<ValueType, CompileError> {
        Ok(self.to)
    }

    fn generate(
        &self,
        builder: &mut NodeBuilder,
        _expected: Option<ValueType>,
    ) -> Result<String, CompileError> {
        let from = builder.node_type_of(&self.child, None)?;
        let expr = builder.flow_child(&self.child, None)?;
        if from == self.to {
            return Ok(expr);
        }
        builder.adapter().convert(&expr, from, self.to)
    }

    fn hash_structure(&self, hasher: &mut Xxh3) {
        hasher.update(&[self.to as u8]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_types_pass_through() {
        assert_eq!(
            coerce_for_binary(ValueType::Vec3, ValueType::Vec3).unwrap(),
            ValueType::Vec3
        );
    }

    #[test]
    fn scalar_splats_against_vector() {
        assert_eq!(
            coerce_for_binary(ValueType::Float, ValueType::Vec4).unwrap(),
            ValueType::Vec4
        );
        assert_eq!(
            coerce_for_binary(ValueType::Vec2, ValueType::Float).unwrap(),
            ValueType::Vec2
        );
    }

    #[test]
    fn splat_and_kind_promotion_combine() {
        assert_eq!(
            coerce_for_binary(ValueType::Int, ValueType::Vec3).unwrap(),
            ValueType::Vec3
        );
    }

    #[test]
    #[should_panic(expected = "not unary")]
    fn unary_rejects_multi_argument_functions() {
        let x = crate::graph::nodes::input::ConstantNode::float(1.0);
        let _ = MathNode::unary(MathFunction::Pow, x);
    }

    #[test]
    fn int_promotes_to_float() {
        assert_eq!(
            coerce_for_binary(ValueType::Int, ValueType::Float).unwrap(),
            ValueType::Float
        );
    }

    #[test]
    fn mismatched_widths_fail() {
        let err = coerce_for_binary(ValueType::Vec2, ValueType::Vec3).unwrap_err();
        assert!(matches!(err, CompileError::TypeMismatch { .. }));
    }

    #[test]
    fn invalid_swizzle_patterns_are_rejected() {
        let base = crate::graph::nodes::input::ConstantNode::vec3(0.0, 0.0, 0.0);
        assert!(SwizzleNode::new(base.clone(), "xq").is_err());
        assert!(SwizzleNode::new(base.clone(), "").is_err());
        assert!(SwizzleNode::new(base, "xyzwx").is_err());
    }
}

//! Concrete node kinds shipped with the crate.

pub mod attribute;
pub mod control;
pub mod input;
pub mod math;
pub mod proxy;
pub mod texture;
pub mod varying;

pub use attribute::{AttributeNode, BuiltinNode};
pub use control::CondNode;
pub use input::{ConstantNode, TimeNode, UniformNode};
pub use math::{
    ConvertNode, JoinNode, MathFunction, MathNode, Operator, OperatorNode, SwizzleNode,
};
pub use proxy::{CacheScopeNode, ReferenceNode};
pub use texture::TextureSampleNode;
pub use varying::VaryingNode;

//! Value sources: inline constants and host-updatable uniforms.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use xxhash_rust::xxh3::Xxh3;

use crate::adapter::fmt_f32;
use crate::builder::declarations::UniformValue;
use crate::builder::NodeBuilder;
use crate::error::CompileError;
use crate::graph::node::{Node, NodeHandle, NodeIdent, UpdateContext};
use crate::types::{UpdateCadence, ValueType};

/// A literal baked straight into the generated source.
pub struct ConstantNode {
    ident: NodeIdent,
    value: UniformValue,
}

impl ConstantNode {
    pub fn new(value: UniformValue) -> NodeHandle {
        Rc::new(Self {
            ident: NodeIdent::new(),
            value,
        })
    }

    pub fn float(v: f32) -> NodeHandle {
        Self::new(UniformValue::Float(v))
    }

    pub fn vec2(x: f32, y: f32) -> NodeHandle {
        Self::new(UniformValue::Vec2([x, y]))
    }

    pub fn vec3(x: f32, y: f32, z: f32) -> NodeHandle {
        Self::new(UniformValue::Vec3([x, y, z]))
    }

    pub fn vec4(x: f32, y: f32, z: f32, w: f32) -> NodeHandle {
        Self::new(UniformValue::Vec4([x, y, z, w]))
    }

    /// RGB color with implicit full alpha.
    pub fn color(r: f32, g: f32, b: f32) -> NodeHandle {
        Self::vec4(r, g, b, 1.0)
    }
}

impl Node for ConstantNode {
    fn ident(&self) -> &NodeIdent {
        &self.ident
    }

    fn node_type(&self) -> &'static str {
        "Constant"
    }

    fn resolve_type(
        &self,
        _builder: &NodeBuilder,
        _expected: Option<ValueType>,
    ) -> Result<ValueType, CompileError> {
        Ok(self.value.value_type())
    }

    fn generate(
        &self,
        builder: &mut NodeBuilder,
        _expected: Option<ValueType>,
    ) -> Result<String, CompileError> {
        match self.value {
            UniformValue::Float(v) => Ok(fmt_f32(v)),
            UniformValue::Int(v) => Ok(v.to_string()),
            UniformValue::Uint(v) => Ok(format!("{v}u")),
            UniformValue::Bool(v) => Ok(v.to_string()),
            _ => {
                let args: Vec<String> =
                    self.value.components().iter().map(|&c| fmt_f32(c)).collect();
                builder.adapter().construct(self.value.value_type(), &args)
            }
        }
    }

    // Literals stay inline no matter how many sites reference them.
    fn prefers_inline(&self) -> bool {
        true
    }

    fn hash_structure(&self, hasher: &mut Xxh3) {
        hasher.update(&[self.value.value_type() as u8]);
        for c in self.value.components() {
            hasher.update(&c.to_bits().to_le_bytes());
        }
    }
}

/// A host-supplied value routed through the cadence bind group named after
/// its update frequency.
pub struct UniformNode {
    ident: NodeIdent,
    name: String,
    value: RefCell<UniformValue>,
    cadence: UpdateCadence,
    group: String,
}

fn cadence_group(cadence: UpdateCadence) -> &'static str {
    match cadence {
        UpdateCadence::Frame => "frame",
        UpdateCadence::Render => "render",
        UpdateCadence::None | UpdateCadence::Object => "object",
    }
}

impl UniformNode {
    pub fn new(name: &str, value: UniformValue, cadence: UpdateCadence) -> Rc<Self> {
        Rc::new(Self {
            ident: NodeIdent::new(),
            name: name.to_string(),
            value: RefCell::new(value),
            cadence,
            group: cadence_group(cadence).to_string(),
        })
    }

    pub fn set_value(&self, value: UniformValue) {
        *self.value.borrow_mut() = value;
    }

    pub fn value(&self) -> UniformValue {
        *self.value.borrow()
    }
}

impl Node for UniformNode {
    fn ident(&self) -> &NodeIdent {
        &self.ident
    }

    fn node_type(&self) -> &'static str {
        "Uniform"
    }

    fn update_cadence(&self) -> UpdateCadence {
        self.cadence
    }

    fn resolve_type(
        &self,
        _builder: &NodeBuilder,
        _expected: Option<ValueType>,
    ) -> Result<ValueType, CompileError> {
        Ok(self.value.borrow().value_type())
    }

    fn generate(
        &self,
        builder: &mut NodeBuilder,
        _expected: Option<ValueType>,
    ) -> Result<String, CompileError> {
        let ty = self.value.borrow().value_type();
        Ok(builder.get_uniform_from_node(
            self.ident.id(),
            Some(&self.name),
            ty,
            &self.group,
        ))
    }

    fn prefers_inline(&self) -> bool {
        true
    }

    fn hash_structure(&self, hasher: &mut Xxh3) {
        // The held value is upload data, not code shape.
        hasher.update(self.name.as_bytes());
        hasher.update(self.group.as_bytes());
        hasher.update(&[self.value.borrow().value_type() as u8]);
    }
}

/// Seconds-since-start, refreshed once per frame.
pub struct TimeNode {
    ident: NodeIdent,
    seconds: Cell<f32>,
}

impl TimeNode {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            ident: NodeIdent::new(),
            seconds: Cell::new(0.0),
        })
    }

    pub fn seconds(&self) -> f32 {
        self.seconds.get()
    }
}

impl Node for TimeNode {
    fn ident(&self) -> &NodeIdent {
        &self.ident
    }

    fn node_type(&self) -> &'static str {
        "Time"
    }

    fn update_cadence(&self) -> UpdateCadence {
        UpdateCadence::Frame
    }

    fn update(&self, ctx: &UpdateContext) {
        self.seconds.set(ctx.time_seconds);
    }

    fn resolve_type(
        &self,
        _builder: &NodeBuilder,
        _expected: Option<ValueType>,
    ) -> Result<ValueType, CompileError> {
        Ok(ValueType::Float)
    }

    fn generate(
        &self,
        builder: &mut NodeBuilder,
        _expected: Option<ValueType>,
    ) -> Result<String, CompileError> {
        Ok(builder.get_uniform_from_node(
            self.ident.id(),
            Some("time"),
            ValueType::Float,
            "frame",
        ))
    }

    fn prefers_inline(&self) -> bool {
        true
    }

    fn hash_structure(&self, _hasher: &mut Xxh3) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_updates_from_frame_context() {
        let time = TimeNode::new();
        time.update(&UpdateContext {
            frame_id: 3,
            time_seconds: 1.5,
            object_index: 0,
        });
        assert_eq!(time.seconds(), 1.5);
        assert_eq!(time.update_cadence(), UpdateCadence::Frame);
    }

    #[test]
    fn uniform_value_swaps_without_changing_shape() {
        let u = UniformNode::new("tint", UniformValue::Vec3([1.0, 0.0, 0.0]), UpdateCadence::Render);
        let mut h1 = Xxh3::new();
        u.hash_structure(&mut h1);
        u.set_value(UniformValue::Vec3([0.0, 1.0, 0.0]));
        let mut h2 = Xxh3::new();
        u.hash_structure(&mut h2);
        assert_eq!(h1.digest(), h2.digest());
    }
}

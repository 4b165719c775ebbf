//! Explicit node-kind registry: maps description type tags to factories.
//! Passed into graph loading; nothing here is process-global.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::builder::declarations::UniformValue;
use crate::error::CompileError;
use crate::graph::node::NodeHandle;
use crate::graph::nodes::{
    AttributeNode, BuiltinNode, CacheScopeNode, CondNode, ConstantNode, ConvertNode, JoinNode,
    MathFunction, MathNode, Operator, OperatorNode, SwizzleNode, TextureSampleNode, TimeNode,
    UniformNode, VaryingNode,
};
use crate::types::{BuiltinValue, UpdateCadence, ValueType};

pub type NodeFactory =
    Box<dyn Fn(&Value, Vec<NodeHandle>) -> Result<NodeHandle, CompileError>>;

pub struct NodeRegistry {
    factories: FxHashMap<String, NodeFactory>,
}

impl NodeRegistry {
    pub fn empty() -> Self {
        Self {
            factories: FxHashMap::default(),
        }
    }

    /// Registry preloaded with every node kind shipped with the crate.
    pub fn with_builtins() -> Self {
        let mut reg = Self::empty();

        reg.register("Float", |params, _| {
            Ok(ConstantNode::float(param_f32(params, "value")?))
        });
        reg.register("Vector2", |params, _| {
            let v = param_floats::<2>(params, "value")?;
            Ok(ConstantNode::vec2(v[0], v[1]))
        });
        reg.register("Vector3", |params, _| {
            let v = param_floats::<3>(params, "value")?;
            Ok(ConstantNode::vec3(v[0], v[1], v[2]))
        });
        reg.register("Vector4", |params, _| {
            let v = param_floats::<4>(params, "value")?;
            Ok(ConstantNode::vec4(v[0], v[1], v[2], v[3]))
        });
        reg.register("Color", |params, _| {
            let v = param_floats::<3>(params, "value")?;
            Ok(ConstantNode::color(v[0], v[1], v[2]))
        });
        reg.register("Uniform", |params, _| {
            let name = param_str(params, "name")?;
            let value = parse_uniform_value(params)?;
            let cadence = parse_cadence(params)?;
            Ok(UniformNode::new(&name, value, cadence) as NodeHandle)
        });
        reg.register("Time", |_, _| Ok(TimeNode::new() as NodeHandle));
        reg.register("Attribute", |params, _| {
            Ok(AttributeNode::new(&param_str(params, "name")?))
        });
        reg.register("Builtin", |params, _| {
            let builtin = match param_str(params, "value")?.as_str() {
                "vertex_index" => BuiltinValue::VertexIndex,
                "instance_index" => BuiltinValue::InstanceIndex,
                "front_facing" => BuiltinValue::FrontFacing,
                "frag_coord" => BuiltinValue::FragCoord,
                other => {
                    return Err(CompileError::Description(format!(
                        "unknown builtin `{other}`"
                    )))
                }
            };
            Ok(BuiltinNode::new(builtin))
        });

        for (tag, op) in [
            ("Add", Operator::Add),
            ("Subtract", Operator::Sub),
            ("Multiply", Operator::Mul),
            ("Divide", Operator::Div),
            ("Less", Operator::Less),
            ("LessEqual", Operator::LessEqual),
            ("Greater", Operator::Greater),
            ("GreaterEqual", Operator::GreaterEqual),
            ("Equal", Operator::Equal),
            ("NotEqual", Operator::NotEqual),
        ] {
            reg.register(tag, move |_, children| {
                let [left, right] = take_children::<2>(tag, children)?;
                Ok(OperatorNode::new(op, left, right))
            });
        }

        for (tag, func) in [
            ("Sin", MathFunction::Sin),
            ("Cos", MathFunction::Cos),
            ("Sqrt", MathFunction::Sqrt),
            ("Abs", MathFunction::Abs),
            ("Floor", MathFunction::Floor),
            ("Fract", MathFunction::Fract),
            ("Power", MathFunction::Pow),
            ("Min", MathFunction::Min),
            ("Max", MathFunction::Max),
            ("Clamp", MathFunction::Clamp),
            ("Mix", MathFunction::Mix),
            ("DotProduct", MathFunction::Dot),
            ("CrossProduct", MathFunction::Cross),
            ("Normalize", MathFunction::Normalize),
            ("Length", MathFunction::Length),
            ("Saturate", MathFunction::Saturate),
        ] {
            reg.register(tag, move |_, children| MathNode::new(func, children));
        }

        reg.register("Join", |_, children| {
            if children.is_empty() {
                return Err(CompileError::Description(
                    "`Join` needs at least one input".to_string(),
                ));
            }
            Ok(JoinNode::new(children))
        });
        reg.register("Swizzle", |params, children| {
            let [child] = take_children::<1>("Swizzle", children)?;
            SwizzleNode::new(child, &param_str(params, "pattern")?)
        });
        reg.register("Convert", |params, children| {
            let [child] = take_children::<1>("Convert", children)?;
            let to = parse_value_type(&param_str(params, "to")?)?;
            Ok(ConvertNode::new(child, to))
        });
        reg.register("Cond", |_, children| {
            match children.len() {
                2 => {
                    let [cond, then_branch] = take_children::<2>("Cond", children)?;
                    Ok(CondNode::new(cond, then_branch, None))
                }
                3 => {
                    let [cond, then_branch, else_branch] = take_children::<3>("Cond", children)?;
                    Ok(CondNode::new(cond, then_branch, Some(else_branch)))
                }
                n => Err(CompileError::Description(format!(
                    "`Cond` takes 2 or 3 inputs, got {n}"
                ))),
            }
        });
        reg.register("Varying", |_, children| {
            let [child] = take_children::<1>("Varying", children)?;
            Ok(VaryingNode::new(child))
        });
        reg.register("TextureSample", |params, children| {
            let [uv] = take_children::<1>("TextureSample", children)?;
            let filterable = params
                .get("filterable")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            let group = params
                .get("group")
                .and_then(Value::as_str)
                .unwrap_or("object");
            Ok(TextureSampleNode::with_options(uv, filterable, group))
        });
        reg.register("CacheScope", |params, children| {
            let [child] = take_children::<1>("CacheScope", children)?;
            let inherit = params
                .get("inherit")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            Ok(CacheScopeNode::new(child, inherit))
        });

        reg
    }

    pub fn register(
        &mut self,
        kind: &str,
        factory: impl Fn(&Value, Vec<NodeHandle>) -> Result<NodeHandle, CompileError> + 'static,
    ) {
        self.factories.insert(kind.to_string(), Box::new(factory));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn create(
        &self,
        kind: &str,
        params: &Value,
        children: Vec<NodeHandle>,
    ) -> Result<NodeHandle, CompileError> {
        let factory = self.factories.get(kind).ok_or_else(|| {
            CompileError::Description(format!("unknown node type `{kind}`"))
        })?;
        factory(params, children)
    }
}

fn take_children<const N: usize>(
    tag: &str,
    children: Vec<NodeHandle>,
) -> Result<[NodeHandle; N], CompileError> {
    let got = children.len();
    children.try_into().map_err(|_| {
        CompileError::Description(format!("`{tag}` takes {N} input(s), got {got}"))
    })
}

fn param_f32(params: &Value, key: &str) -> Result<f32, CompileError> {
    params
        .get(key)
        .and_then(Value::as_f64)
        .map(|v| v as f32)
        .ok_or_else(|| CompileError::Description(format!("missing numeric param `{key}`")))
}

fn param_floats<const N: usize>(params: &Value, key: &str) -> Result<[f32; N], CompileError> {
    let arr = params
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| CompileError::Description(format!("missing array param `{key}`")))?;
    if arr.len() != N {
        return Err(CompileError::Description(format!(
            "param `{key}` needs {N} components, got {}",
            arr.len()
        )));
    }
    let mut out = [0.0; N];
    for (slot, item) in out.iter_mut().zip(arr) {
        *slot = item.as_f64().ok_or_else(|| {
            CompileError::Description(format!("param `{key}` has a non-numeric component"))
        })? as f32;
    }
    Ok(out)
}

fn param_str(params: &Value, key: &str) -> Result<String, CompileError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CompileError::Description(format!("missing string param `{key}`")))
}

fn parse_value_type(name: &str) -> Result<ValueType, CompileError> {
    Ok(match name {
        "float" => ValueType::Float,
        "int" => ValueType::Int,
        "uint" => ValueType::Uint,
        "bool" => ValueType::Bool,
        "vec2" => ValueType::Vec2,
        "vec3" => ValueType::Vec3,
        "vec4" => ValueType::Vec4,
        other => {
            return Err(CompileError::Description(format!(
                "unknown value type `{other}`"
            )))
        }
    })
}

fn parse_cadence(params: &Value) -> Result<UpdateCadence, CompileError> {
    match params.get("cadence").and_then(Value::as_str) {
        None => Ok(UpdateCadence::Object),
        Some("frame") => Ok(UpdateCadence::Frame),
        Some("render") => Ok(UpdateCadence::Render),
        Some("object") => Ok(UpdateCadence::Object),
        Some("none") => Ok(UpdateCadence::None),
        Some(other) => Err(CompileError::Description(format!(
            "unknown update cadence `{other}`"
        ))),
    }
}

fn parse_uniform_value(params: &Value) -> Result<UniformValue, CompileError> {
    let ty = param_str(params, "type")?;
    Ok(match ty.as_str() {
        "float" => UniformValue::Float(param_f32(params, "value")?),
        "vec2" => UniformValue::Vec2(param_floats::<2>(params, "value")?),
        "vec3" => UniformValue::Vec3(param_floats::<3>(params, "value")?),
        "vec4" => UniformValue::Vec4(param_floats::<4>(params, "value")?),
        "mat4" => UniformValue::Mat4(param_floats::<16>(params, "value")?),
        other => {
            return Err(CompileError::Description(format!(
                "unsupported uniform type `{other}`"
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtin_registry_creates_constants() {
        let reg = NodeRegistry::with_builtins();
        let node = reg
            .create("Float", &json!({ "value": 2.5 }), Vec::new())
            .unwrap();
        assert_eq!(node.node_type(), "Constant");
    }

    #[test]
    fn unknown_kind_is_a_description_error() {
        let reg = NodeRegistry::with_builtins();
        let Err(err) = reg.create("Nope", &json!({}), Vec::new()) else {
            panic!("unknown kind must not create");
        };
        assert!(matches!(err, CompileError::Description(_)));
    }

    #[test]
    fn arity_is_checked() {
        let reg = NodeRegistry::with_builtins();
        let Err(err) = reg.create("Add", &json!({}), Vec::new()) else {
            panic!("missing inputs must not create");
        };
        assert!(err.to_string().contains("2 input"));
    }
}

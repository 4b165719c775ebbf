//! Language adapter contract: everything that depends on target-language
//! syntax lives behind this trait, so the orchestrator stays language-
//! agnostic and a third backend plugs in without touching it.

pub mod glsl;
pub mod wgsl;

pub use glsl::GlslAdapter;
pub use wgsl::WgslAdapter;

use crate::builder::bindings::BindGroupLayout;
use crate::builder::declarations::{NodeAttribute, NodeCode, NodeVarying};
use crate::error::CompileError;
use crate::graph::node::NodeId;
use crate::types::{BuiltinValue, Capabilities, ShaderStage, TargetLanguage, ValueType};

/// Everything an adapter needs to render one stage's program text.
#[derive(Debug, Default)]
pub struct ProgramSections {
    pub attributes: Vec<NodeAttribute>,
    pub varyings: Vec<NodeVarying>,
    /// Bind groups visible in this stage, in canonical index order.
    pub groups: Vec<BindGroupLayout>,
    /// Injected helper function declarations, in first-use order.
    pub helpers: Vec<String>,
    /// Root-scope statement lines of the entry function body.
    pub body: Vec<String>,
    /// The stage's result expression (clip position / output color).
    pub result: Option<String>,
    /// Built-in inputs referenced by the body, in canonical order.
    pub builtins: Vec<BuiltinValue>,
}

/// Inputs for generating one texture-sampling expression.
#[derive(Debug)]
pub struct TextureSampleContext<'a> {
    pub node: NodeId,
    pub texture: &'a str,
    pub sampler: &'a str,
    pub uv: &'a str,
    pub stage: ShaderStage,
    /// Whether the sampled texture supports hardware filtering.
    pub filterable: bool,
    pub caps: &'a Capabilities,
}

/// Deduplicated, ordered registry of helper function declarations
/// (premultiply, manual bilinear filtering, ...). Injection is keyed so a
/// helper used by many sample sites is declared exactly once.
#[derive(Debug, Default)]
pub struct HelperRegistry {
    entries: Vec<NodeCode>,
}

impl HelperRegistry {
    pub fn insert_with(&mut self, key: &str, node: Option<NodeId>, decl: impl FnOnce() -> String) {
        if !self.contains(key) {
            self.entries.push(NodeCode {
                node,
                name: key.to_string(),
                code: decl(),
            });
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|entry| entry.name == key)
    }

    pub fn decls(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.code.as_str())
    }
}

/// Strategy contract implemented per target language.
pub trait LanguageAdapter {
    fn language(&self) -> TargetLanguage;

    /// Target spelling of a value type. Errors with
    /// [`CompileError::UnsupportedFeature`] when inexpressible.
    fn type_name(&self, ty: ValueType) -> Result<String, CompileError>;

    /// Whether sample coordinates must be flipped vertically: true for
    /// targets whose native texture convention is bottom-left origin,
    /// relative to the graph's top-left-origin UV space.
    fn is_flip_y(&self) -> bool;

    /// Whether textures and samplers bind as separate resources (WGSL) or
    /// as combined image-samplers (GLSL). Drives bind-group layout.
    fn separate_samplers(&self) -> bool;

    /// Spelling of a built-in input, or an error when the builtin does not
    /// exist in the given stage.
    fn builtin_access(&self, builtin: BuiltinValue, stage: ShaderStage)
        -> Result<String, CompileError>;

    /// Expression reading one uniform out of its group.
    fn uniform_access(&self, group: &str, name: &str) -> String;

    /// Lvalue for writing a varying in the vertex stage.
    fn varying_store(&self, name: &str) -> String;

    /// Expression reading a varying (vertex re-read or fragment input).
    fn varying_load(&self, stage: ShaderStage, name: &str) -> String;

    /// Expression reading a vertex attribute.
    fn attribute_access(&self, name: &str) -> String;

    /// Single-assignment variable declaration with initializer.
    fn var_declaration(
        &self,
        name: &str,
        ty: ValueType,
        init: &str,
    ) -> Result<String, CompileError>;

    /// Mutable variable declaration without initializer (conditional
    /// outputs assigned per branch).
    fn var_declaration_uninit(&self, name: &str, ty: ValueType) -> Result<String, CompileError>;

    fn assignment(&self, target: &str, value: &str) -> String {
        format!("{target} = {value};")
    }

    /// Constructor expression, e.g. `vec3f(a, b, c)`.
    fn construct(&self, ty: ValueType, args: &[String]) -> Result<String, CompileError> {
        Ok(format!("{}({})", self.type_name(ty)?, args.join(", ")))
    }

    /// Convert `expr` from one type to another (splat, cast, truncate).
    fn convert(
        &self,
        expr: &str,
        from: ValueType,
        to: ValueType,
    ) -> Result<String, CompileError>;

    /// Target spelling of a math intrinsic call.
    fn math_call(&self, func: &str, args: &[String]) -> Result<String, CompileError>;

    /// Generate a texture-sampling expression, injecting helper functions
    /// (e.g. a manual bilinear expansion for unfilterable textures) into
    /// `helpers` as needed.
    fn texture_sample(
        &self,
        ctx: &TextureSampleContext,
        helpers: &mut HelperRegistry,
    ) -> Result<String, CompileError>;

    /// Statement writing `value` to a storage texture at `coord`. Errors
    /// with [`CompileError::UnsupportedFeature`] on targets without
    /// storage-image writes.
    fn texture_store(
        &self,
        texture: &str,
        coord: &str,
        value: &str,
        stage: ShaderStage,
    ) -> Result<String, CompileError>;

    /// Render a conditional block. Both targets share C-like syntax.
    fn if_block(
        &self,
        cond: &str,
        then_lines: &[String],
        else_lines: &[String],
    ) -> Vec<String> {
        let mut out = Vec::new();
        out.push(format!("if ({cond}) {{"));
        for line in then_lines {
            out.push(format!("    {line}"));
        }
        if else_lines.is_empty() {
            out.push("}".to_string());
        } else {
            out.push("} else {".to_string());
            for line in else_lines {
                out.push(format!("    {line}"));
            }
            out.push("}".to_string());
        }
        out
    }

    /// Assemble the final program text for one stage.
    fn assemble_stage(
        &self,
        stage: ShaderStage,
        sections: &ProgramSections,
    ) -> Result<String, CompileError>;

    /// Assemble one combined module containing all emitted entry points,
    /// for targets whose module model allows it (WGSL). `None` for
    /// per-stage-program targets.
    fn assemble_module(
        &self,
        _stages: &[(ShaderStage, &ProgramSections)],
    ) -> Result<Option<String>, CompileError> {
        Ok(None)
    }
}

/// Format an `f32` as a shader literal: shortest round-trip decimal form,
/// with a decimal point forced so it parses as a float in both targets.
pub fn fmt_f32(v: f32) -> String {
    if !v.is_finite() {
        return "0.0".to_string();
    }
    let s = format!("{v}");
    if s.contains('.') || s.contains('e') {
        s
    } else {
        format!("{s}.0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_f32_keeps_a_decimal_point() {
        assert_eq!(fmt_f32(1.0), "1.0");
        assert_eq!(fmt_f32(0.5), "0.5");
        assert_eq!(fmt_f32(-2.25), "-2.25");
        assert_eq!(fmt_f32(f32::NAN), "0.0");
    }

    #[test]
    fn fmt_f32_is_shortest_round_trip_not_padded() {
        // 0.2 has no exact binary form; the literal must still read back.
        assert_eq!(fmt_f32(0.2), "0.2");
        assert_eq!(fmt_f32(0.4), "0.4");
        assert_eq!(fmt_f32(0.6), "0.6");
        assert_eq!(fmt_f32(100000.0), "100000.0");
    }

    #[test]
    fn helper_registry_deduplicates_by_key() {
        let mut helpers = HelperRegistry::default();
        let mut calls = 0;
        helpers.insert_with("premultiply", None, || {
            calls += 1;
            "fn premultiply() {}".into()
        });
        helpers.insert_with("premultiply", None, || {
            calls += 1;
            "other".into()
        });
        assert_eq!(calls, 1);
        assert_eq!(helpers.decls().count(), 1);
    }
}

//! Vulkan-flavored GLSL (`#version 450`) backend.

use crate::adapter::{HelperRegistry, LanguageAdapter, ProgramSections, TextureSampleContext};
use crate::error::CompileError;
use crate::types::{BuiltinValue, ShaderStage, TargetLanguage, ValueType};

pub struct GlslAdapter;

impl GlslAdapter {
    pub fn new() -> Box<dyn LanguageAdapter> {
        Box::new(Self)
    }
}

fn unsupported(feature: impl Into<String>) -> CompileError {
    CompileError::UnsupportedFeature {
        language: TargetLanguage::Glsl,
        feature: feature.into(),
    }
}

const BILINEAR_HELPER: &str = r#"vec4 sg_bilinear(sampler2D t, vec2 uv) {
    vec2 dims = vec2(textureSize(t, 0));
    ivec2 limit = ivec2(dims) - ivec2(1);
    vec2 coords = uv * dims - 0.5;
    vec2 base = floor(coords);
    vec2 f = coords - base;
    ivec2 i = ivec2(base);
    vec4 c00 = texelFetch(t, clamp(i, ivec2(0), limit), 0);
    vec4 c10 = texelFetch(t, clamp(i + ivec2(1, 0), ivec2(0), limit), 0);
    vec4 c01 = texelFetch(t, clamp(i + ivec2(0, 1), ivec2(0), limit), 0);
    vec4 c11 = texelFetch(t, clamp(i + ivec2(1, 1), ivec2(0), limit), 0);
    return mix(mix(c00, c10, f.x), mix(c01, c11, f.x), f.y);
}"#;

impl LanguageAdapter for GlslAdapter {
    fn language(&self) -> TargetLanguage {
        TargetLanguage::Glsl
    }

    fn type_name(&self, ty: ValueType) -> Result<String, CompileError> {
        Ok(match ty {
            ValueType::Float => "float",
            ValueType::Int => "int",
            ValueType::Uint => "uint",
            ValueType::Bool => "bool",
            ValueType::Vec2 => "vec2",
            ValueType::Vec3 => "vec3",
            ValueType::Vec4 => "vec4",
            ValueType::IVec2 => "ivec2",
            ValueType::IVec3 => "ivec3",
            ValueType::IVec4 => "ivec4",
            ValueType::UVec2 => "uvec2",
            ValueType::UVec3 => "uvec3",
            ValueType::UVec4 => "uvec4",
            ValueType::BVec2 => "bvec2",
            ValueType::BVec3 => "bvec3",
            ValueType::BVec4 => "bvec4",
            ValueType::Mat2 => "mat2",
            ValueType::Mat3 => "mat3",
            ValueType::Mat4 => "mat4",
            ValueType::Texture2D | ValueType::Sampler => {
                return Err(unsupported(format!("`{ty:?}` as a value type")))
            }
        }
        .to_string())
    }

    // GL textures store rows bottom-up relative to the graph's UV space.
    fn is_flip_y(&self) -> bool {
        true
    }

    fn separate_samplers(&self) -> bool {
        false
    }

    fn builtin_access(
        &self,
        builtin: BuiltinValue,
        stage: ShaderStage,
    ) -> Result<String, CompileError> {
        let access = match (builtin, stage) {
            (BuiltinValue::VertexIndex, ShaderStage::Vertex) => "uint(gl_VertexIndex)",
            (BuiltinValue::InstanceIndex, ShaderStage::Vertex) => "uint(gl_InstanceIndex)",
            (BuiltinValue::FrontFacing, ShaderStage::Fragment) => "gl_FrontFacing",
            (BuiltinValue::FragCoord, ShaderStage::Fragment) => "gl_FragCoord",
            _ => {
                return Err(CompileError::Description(format!(
                    "built-in `{builtin:?}` is not available in the {} stage",
                    stage.as_str()
                )))
            }
        };
        Ok(access.to_string())
    }

    fn uniform_access(&self, group: &str, name: &str) -> String {
        format!("u_{group}.{name}")
    }

    // GLSL varyings are free-standing in/out globals.
    fn varying_store(&self, name: &str) -> String {
        name.to_string()
    }

    fn varying_load(&self, _stage: ShaderStage, name: &str) -> String {
        name.to_string()
    }

    fn attribute_access(&self, name: &str) -> String {
        name.to_string()
    }

    fn var_declaration(
        &self,
        name: &str,
        ty: ValueType,
        init: &str,
    ) -> Result<String, CompileError> {
        Ok(format!("{} {name} = {init};", self.type_name(ty)?))
    }

    fn var_declaration_uninit(&self, name: &str, ty: ValueType) -> Result<String, CompileError> {
        Ok(format!("{} {name};", self.type_name(ty)?))
    }

    fn convert(
        &self,
        expr: &str,
        from: ValueType,
        to: ValueType,
    ) -> Result<String, CompileError> {
        if from == to {
            return Ok(expr.to_string());
        }
        if from.is_matrix() || to.is_matrix() {
            return Err(unsupported(format!(
                "conversion from `{from:?}` to `{to:?}`"
            )));
        }
        let target = self.type_name(to)?;

        if from.is_scalar() {
            return Ok(format!("{target}({expr})"));
        }

        let from_len = from.vector_len().unwrap_or(1);
        match to.vector_len() {
            None => Ok(format!("{target}({expr}.x)")),
            Some(to_len) if to_len <= from_len => {
                let pattern = &"xyzw"[..to_len as usize];
                if from.scalar_kind() == to.scalar_kind() {
                    Ok(format!("{expr}.{pattern}"))
                } else {
                    Ok(format!("{target}({expr}.{pattern})"))
                }
            }
            Some(to_len) => {
                let mut args = vec![expr.to_string()];
                for slot in from_len..to_len {
                    args.push(if to_len == 4 && slot == 3 {
                        "1.0".to_string()
                    } else {
                        "0.0".to_string()
                    });
                }
                Ok(format!("{target}({})", args.join(", ")))
            }
        }
    }

    fn math_call(&self, func: &str, args: &[String]) -> Result<String, CompileError> {
        // GLSL has no saturate; rewrite to a clamped range.
        if func == "saturate" {
            let x = args.first().map(String::as_str).unwrap_or("0.0");
            return Ok(format!("clamp({x}, 0.0, 1.0)"));
        }
        Ok(format!("{func}({})", args.join(", ")))
    }

    fn texture_sample(
        &self,
        ctx: &TextureSampleContext,
        helpers: &mut HelperRegistry,
    ) -> Result<String, CompileError> {
        let uv = format!("vec2({0}.x, 1.0 - {0}.y)", ctx.uv);
        if !ctx.filterable {
            helpers.insert_with("sg_bilinear", Some(ctx.node), || {
                BILINEAR_HELPER.to_string()
            });
            return Ok(format!("sg_bilinear({}, {uv})", ctx.texture));
        }
        match ctx.stage {
            ShaderStage::Fragment => Ok(format!("texture({}, {uv})", ctx.texture)),
            _ => Ok(format!("textureLod({}, {uv}, 0.0)", ctx.texture)),
        }
    }

    // Textures bind as combined sampler2D here; there is no image to
    // write through.
    fn texture_store(
        &self,
        _texture: &str,
        _coord: &str,
        _value: &str,
        _stage: ShaderStage,
    ) -> Result<String, CompileError> {
        Err(unsupported("storage texture writes"))
    }

    fn assemble_stage(
        &self,
        stage: ShaderStage,
        sections: &ProgramSections,
    ) -> Result<String, CompileError> {
        let mut out = String::from("#version 450\n\n");

        match stage {
            ShaderStage::Vertex => {
                for attr in &sections.attributes {
                    out.push_str(&format!(
                        "layout(location = {}) in {} {};\n",
                        attr.location,
                        self.type_name(attr.ty)?,
                        attr.name
                    ));
                }
                for varying in &sections.varyings {
                    out.push_str(&format!(
                        "layout(location = {}) out {} {};\n",
                        varying.location,
                        self.type_name(varying.ty)?,
                        varying.name
                    ));
                }
            }
            ShaderStage::Fragment => {
                for varying in &sections.varyings {
                    out.push_str(&format!(
                        "layout(location = {}) in {} {};\n",
                        varying.location,
                        self.type_name(varying.ty)?,
                        varying.name
                    ));
                }
                out.push_str("layout(location = 0) out vec4 frag_color;\n");
            }
            ShaderStage::Compute => {
                out.push_str("layout(local_size_x = 64) in;\n");
            }
        }

        // naga's GLSL frontend takes `set` on interface blocks but not on
        // sampler globals, so samplers get flat program-wide bindings,
        // skipping binding 0 when the set-0 block occupies it; the
        // authoritative per-group slots live in the bind-group descriptors.
        let set0_has_block = sections
            .groups
            .iter()
            .any(|g| g.index == 0 && !g.members.is_empty());
        let mut sampler_slot = if set0_has_block { 1u32 } else { 0 };
        for group in &sections.groups {
            if !group.members.is_empty() {
                out.push_str(&format!(
                    "layout(std140, set = {}, binding = 0) uniform Uniforms_{} {{\n",
                    group.index, group.name
                ));
                for member in &group.members {
                    out.push_str(&format!(
                        "    {} {};\n",
                        self.type_name(member.ty)?,
                        member.name
                    ));
                }
                out.push_str(&format!("}} u_{};\n", group.name));
            }
            for tex in &group.textures {
                out.push_str(&format!(
                    "layout(binding = {}) uniform sampler2D {};\n",
                    sampler_slot, tex.texture_name
                ));
                sampler_slot += 1;
            }
        }

        for helper in &sections.helpers {
            out.push_str(helper);
            out.push('\n');
        }

        out.push_str("\nvoid main() {\n");
        for line in &sections.body {
            out.push_str("    ");
            out.push_str(line);
            out.push('\n');
        }
        match stage {
            ShaderStage::Vertex => {
                if let Some(result) = &sections.result {
                    out.push_str(&format!("    gl_Position = {result};\n"));
                }
            }
            ShaderStage::Fragment => {
                if let Some(result) = &sections.result {
                    out.push_str(&format!("    frag_color = {result};\n"));
                } else {
                    out.push_str("    frag_color = vec4(0.0, 0.0, 0.0, 1.0);\n");
                }
            }
            ShaderStage::Compute => {
                if let Some(result) = &sections.result {
                    out.push_str(&format!("    {result};\n"));
                }
            }
        }
        out.push_str("}\n");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturate_rewrites_to_clamp() {
        let a = GlslAdapter;
        assert_eq!(
            a.math_call("saturate", &["x".to_string()]).unwrap(),
            "clamp(x, 0.0, 1.0)"
        );
        assert_eq!(
            a.math_call("sin", &["x".to_string()]).unwrap(),
            "sin(x)"
        );
    }

    #[test]
    fn uv_space_is_flipped_for_gl_textures() {
        let a = GlslAdapter;
        let mut helpers = HelperRegistry::default();
        let expr = a
            .texture_sample(
                &TextureSampleContext {
                    node: 1,
                    texture: "tex0",
                    sampler: "smp0",
                    uv: "uv",
                    stage: ShaderStage::Fragment,
                    filterable: true,
                    caps: &crate::types::Capabilities::default(),
                },
                &mut helpers,
            )
            .unwrap();
        assert_eq!(expr, "texture(tex0, vec2(uv.x, 1.0 - uv.y))");
        assert!(a.is_flip_y());
    }

    #[test]
    fn combined_samplers_declare_one_binding_per_texture() {
        let a = GlslAdapter;
        assert!(!a.separate_samplers());
    }

    #[test]
    fn sampler_globals_carry_no_set_qualifier() {
        use crate::builder::bindings::{BindGroupLayout, StageMask, TextureBinding, UniformMember};

        let a = GlslAdapter;
        let sections = ProgramSections {
            groups: vec![BindGroupLayout {
                name: "object".to_string(),
                index: 0,
                members: vec![UniformMember {
                    name: "tint0".to_string(),
                    ty: ValueType::Vec4,
                    offset: 0,
                    node: 1,
                    visibility: StageMask::FRAGMENT,
                }],
                buffer_size: 16,
                textures: vec![TextureBinding {
                    texture_name: "tex0".to_string(),
                    sampler_name: "smp0".to_string(),
                    filterable: true,
                    node: 2,
                    visibility: StageMask::FRAGMENT,
                }],
                visibility: StageMask::FRAGMENT,
            }],
            ..ProgramSections::default()
        };
        let source = a.assemble_stage(ShaderStage::Fragment, &sections).unwrap();
        assert!(source.contains("layout(binding = 1) uniform sampler2D tex0;"), "{source}");
        assert!(source.contains("layout(std140, set = 0, binding = 0) uniform Uniforms_object"));
    }

    #[test]
    fn storage_writes_are_unsupported() {
        let a = GlslAdapter;
        let err = a
            .texture_store("tex0", "coord", "value", ShaderStage::Compute)
            .unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedFeature { .. }));
    }
}

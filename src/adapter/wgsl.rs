//! WGSL backend.

use crate::adapter::{HelperRegistry, LanguageAdapter, ProgramSections, TextureSampleContext};
use crate::builder::bindings::BindGroupLayout;
use crate::error::CompileError;
use crate::types::{BuiltinValue, ShaderStage, TargetLanguage, ValueType};

pub struct WgslAdapter;

impl WgslAdapter {
    pub fn new() -> Box<dyn LanguageAdapter> {
        Box::new(Self)
    }
}

fn unsupported(feature: impl Into<String>) -> CompileError {
    CompileError::UnsupportedFeature {
        language: TargetLanguage::Wgsl,
        feature: feature.into(),
    }
}

/// Entry-function parameter and spelling for one built-in, per stage.
fn builtin_param(builtin: BuiltinValue, stage: ShaderStage) -> Option<(&'static str, &'static str)> {
    match (builtin, stage) {
        (BuiltinValue::VertexIndex, ShaderStage::Vertex) => {
            Some(("@builtin(vertex_index) vertex_index: u32", "vertex_index"))
        }
        (BuiltinValue::InstanceIndex, ShaderStage::Vertex) => Some((
            "@builtin(instance_index) instance_index: u32",
            "instance_index",
        )),
        (BuiltinValue::FrontFacing, ShaderStage::Fragment) => {
            Some(("@builtin(front_facing) front_facing: bool", "front_facing"))
        }
        // Already flows in as the interpolated position member.
        (BuiltinValue::FragCoord, ShaderStage::Fragment) => Some(("", "in.position")),
        _ => None,
    }
}

fn emit_group_decls(out: &mut String, group: &BindGroupLayout) -> Result<(), CompileError> {
    let mut slot = 0u32;
    if !group.members.is_empty() {
        out.push_str(&format!("struct Uniforms_{} {{\n", group.name));
        for member in &group.members {
            out.push_str(&format!(
                "    {}: {},\n",
                member.name,
                WgslAdapter.type_name(member.ty)?
            ));
        }
        out.push_str("}\n");
        out.push_str(&format!(
            "@group({}) @binding(0) var<uniform> u_{}: Uniforms_{};\n",
            group.index, group.name, group.name
        ));
        slot = 1;
    }
    for tex in &group.textures {
        out.push_str(&format!(
            "@group({}) @binding({}) var {}: texture_2d<f32>;\n",
            group.index, slot, tex.texture_name
        ));
        out.push_str(&format!(
            "@group({}) @binding({}) var {}: sampler;\n",
            group.index,
            slot + 1,
            tex.sampler_name
        ));
        slot += 2;
    }
    Ok(())
}

fn emit_varyings_struct(out: &mut String, sections: &ProgramSections) -> Result<(), CompileError> {
    out.push_str("struct Varyings {\n");
    out.push_str("    @builtin(position) position: vec4f,\n");
    for varying in &sections.varyings {
        out.push_str(&format!(
            "    @location({}) {}: {},\n",
            varying.location,
            varying.name,
            WgslAdapter.type_name(varying.ty)?
        ));
    }
    out.push_str("}\n");
    Ok(())
}

fn emit_stage_body(out: &mut String, stage: ShaderStage, sections: &ProgramSections) {
    for line in &sections.body {
        out.push_str("    ");
        out.push_str(line);
        out.push('\n');
    }
    match stage {
        ShaderStage::Vertex => {
            if let Some(result) = &sections.result {
                out.push_str(&format!("    varyings.position = {result};\n"));
            }
            out.push_str("    return varyings;\n");
        }
        ShaderStage::Fragment => {
            if let Some(result) = &sections.result {
                out.push_str(&format!("    return {result};\n"));
            } else {
                out.push_str("    return vec4f(0.0, 0.0, 0.0, 1.0);\n");
            }
        }
        ShaderStage::Compute => {
            if let Some(result) = &sections.result {
                out.push_str(&format!("    _ = {result};\n"));
            }
        }
    }
}

fn entry_signature(stage: ShaderStage, sections: &ProgramSections) -> String {
    let mut params: Vec<String> = Vec::new();
    match stage {
        ShaderStage::Vertex => {
            if !sections.attributes.is_empty() {
                params.push("in: VertexInput".to_string());
            }
        }
        ShaderStage::Fragment => params.push("in: Varyings".to_string()),
        ShaderStage::Compute => {
            params.push("@builtin(global_invocation_id) global_id: vec3u".to_string())
        }
    }
    for builtin in &sections.builtins {
        if let Some((param, _)) = builtin_param(*builtin, stage) {
            if !param.is_empty() {
                params.push(param.to_string());
            }
        }
    }
    match stage {
        ShaderStage::Vertex => format!("fn vs_main({}) -> Varyings {{", params.join(", ")),
        ShaderStage::Fragment => format!(
            "fn fs_main({}) -> @location(0) vec4f {{",
            params.join(", ")
        ),
        ShaderStage::Compute => {
            format!("@workgroup_size(64)\nfn cs_main({}) {{", params.join(", "))
        }
    }
}

fn stage_attribute(stage: ShaderStage) -> &'static str {
    match stage {
        ShaderStage::Vertex => "@vertex",
        ShaderStage::Fragment => "@fragment",
        ShaderStage::Compute => "@compute",
    }
}

fn emit_entry(out: &mut String, stage: ShaderStage, sections: &ProgramSections) {
    out.push_str(stage_attribute(stage));
    out.push('\n');
    out.push_str(&entry_signature(stage, sections));
    out.push('\n');
    if stage == ShaderStage::Vertex {
        out.push_str("    var varyings: Varyings;\n");
    }
    emit_stage_body(out, stage, sections);
    out.push_str("}\n");
}

fn emit_shared_decls(
    out: &mut String,
    stage: ShaderStage,
    sections: &ProgramSections,
) -> Result<(), CompileError> {
    if stage == ShaderStage::Vertex && !sections.attributes.is_empty() {
        out.push_str("struct VertexInput {\n");
        for attr in &sections.attributes {
            out.push_str(&format!(
                "    @location({}) {}: {},\n",
                attr.location,
                attr.name,
                WgslAdapter.type_name(attr.ty)?
            ));
        }
        out.push_str("}\n");
    }
    if stage != ShaderStage::Compute {
        emit_varyings_struct(out, sections)?;
    }
    for group in &sections.groups {
        emit_group_decls(out, group)?;
    }
    for helper in &sections.helpers {
        out.push_str(helper);
        out.push('\n');
    }
    Ok(())
}

const BILINEAR_HELPER: &str = r#"fn sg_bilinear(t: texture_2d<f32>, uv: vec2f) -> vec4f {
    let dims = vec2f(textureDimensions(t, 0));
    let limit = vec2i(dims) - vec2i(1);
    let coords = uv * dims - 0.5;
    let base = floor(coords);
    let f = coords - base;
    let i = vec2i(base);
    let c00 = textureLoad(t, clamp(i, vec2i(0), limit), 0);
    let c10 = textureLoad(t, clamp(i + vec2i(1, 0), vec2i(0), limit), 0);
    let c01 = textureLoad(t, clamp(i + vec2i(0, 1), vec2i(0), limit), 0);
    let c11 = textureLoad(t, clamp(i + vec2i(1, 1), vec2i(0), limit), 0);
    return mix(mix(c00, c10, f.x), mix(c01, c11, f.x), f.y);
}"#;

impl LanguageAdapter for WgslAdapter {
    fn language(&self) -> TargetLanguage {
        TargetLanguage::Wgsl
    }

    fn type_name(&self, ty: ValueType) -> Result<String, CompileError> {
        Ok(match ty {
            ValueType::Float => "f32",
            ValueType::Int => "i32",
            ValueType::Uint => "u32",
            ValueType::Bool => "bool",
            ValueType::Vec2 => "vec2f",
            ValueType::Vec3 => "vec3f",
            ValueType::Vec4 => "vec4f",
            ValueType::IVec2 => "vec2i",
            ValueType::IVec3 => "vec3i",
            ValueType::IVec4 => "vec4i",
            ValueType::UVec2 => "vec2u",
            ValueType::UVec3 => "vec3u",
            ValueType::UVec4 => "vec4u",
            ValueType::BVec2 => "vec2<bool>",
            ValueType::BVec3 => "vec3<bool>",
            ValueType::BVec4 => "vec4<bool>",
            ValueType::Mat2 => "mat2x2f",
            ValueType::Mat3 => "mat3x3f",
            ValueType::Mat4 => "mat4x4f",
            ValueType::Texture2D | ValueType::Sampler => {
                return Err(unsupported(format!("`{ty:?}` as a value type")))
            }
        }
        .to_string())
    }

    fn is_flip_y(&self) -> bool {
        false
    }

    fn separate_samplers(&self) -> bool {
        true
    }

    fn builtin_access(
        &self,
        builtin: BuiltinValue,
        stage: ShaderStage,
    ) -> Result<String, CompileError> {
        builtin_param(builtin, stage)
            .map(|(_, access)| access.to_string())
            .ok_or_else(|| {
                CompileError::Description(format!(
                    "built-in `{builtin:?}` is not available in the {} stage",
                    stage.as_str()
                ))
            })
    }

    fn uniform_access(&self, group: &str, name: &str) -> String {
        format!("u_{group}.{name}")
    }

    fn varying_store(&self, name: &str) -> String {
        format!("varyings.{name}")
    }

    fn varying_load(&self, stage: ShaderStage, name: &str) -> String {
        match stage {
            ShaderStage::Vertex => format!("varyings.{name}"),
            _ => format!("in.{name}"),
        }
    }

    fn attribute_access(&self, name: &str) -> String {
        format!("in.{name}")
    }

    fn var_declaration(
        &self,
        name: &str,
        ty: ValueType,
        init: &str,
    ) -> Result<String, CompileError> {
        Ok(format!("let {name}: {} = {init};", self.type_name(ty)?))
    }

    fn var_declaration_uninit(&self, name: &str, ty: ValueType) -> Result<String, CompileError> {
        Ok(format!("var {name}: {};", self.type_name(ty)?))
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

        // Scalar → vector splats; scalar → scalar casts.
        if from.is_scalar() {
            return Ok(format!("{target}({expr})"));
        }

        let from_len = from.vector_len().unwrap_or(1);
        match to.vector_len() {
            // Vector → scalar truncates to the first component.
            None => Ok(format!("{target}({expr}.x)")),
            Some(to_len) if to_len <= from_len => {
                let pattern = &"xyzw"[..to_len as usize];
                if from.scalar_kind() == to.scalar_kind() {
                    Ok(format!("{expr}.{pattern}"))
                } else {
                    Ok(format!("{target}({expr}.{pattern})"))
                }
            }
            // Widening pads zeros, with one in the last slot of a vec4 so
            // colors and positions extend the way authors expect.
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
        Ok(format!("{func}({})", args.join(", ")))
    }

    fn texture_sample(
        &self,
        ctx: &TextureSampleContext,
        helpers: &mut HelperRegistry,
    ) -> Result<String, CompileError> {
        let uv = ctx.uv;
        if !ctx.filterable {
            helpers.insert_with("sg_bilinear", Some(ctx.node), || {
                BILINEAR_HELPER.to_string()
            });
            return Ok(format!("sg_bilinear({}, {uv})", ctx.texture));
        }
        match ctx.stage {
            // Implicit derivatives only exist in the fragment stage.
            ShaderStage::Fragment => Ok(format!(
                "textureSample({}, {}, {uv})",
                ctx.texture, ctx.sampler
            )),
            _ => Ok(format!(
                "textureSampleLevel({}, {}, {uv}, 0.0)",
                ctx.texture, ctx.sampler
            )),
        }
    }

    fn texture_store(
        &self,
        texture: &str,
        coord: &str,
        value: &str,
        stage: ShaderStage,
    ) -> Result<String, CompileError> {
        if stage == ShaderStage::Vertex {
            return Err(CompileError::Description(
                "storage texture writes are not available in the vertex stage".to_string(),
            ));
        }
        Ok(format!("textureStore({texture}, {coord}, {value});"))
    }

    fn assemble_stage(
        &self,
        stage: ShaderStage,
        sections: &ProgramSections,
    ) -> Result<String, CompileError> {
        let mut out = String::new();
        emit_shared_decls(&mut out, stage, sections)?;
        emit_entry(&mut out, stage, sections);
        Ok(out)
    }

    /// One module holding every entry point, sharing struct and binding
    /// declarations.
    fn assemble_module(
        &self,
        stages: &[(ShaderStage, &ProgramSections)],
    ) -> Result<Option<String>, CompileError> {
        let mut out = String::new();
        let mut declared_varyings = false;
        let mut declared_groups: Vec<u32> = Vec::new();
        let mut declared_helpers: Vec<&str> = Vec::new();

        for (stage, sections) in stages {
            if *stage == ShaderStage::Vertex && !sections.attributes.is_empty() {
                out.push_str("struct VertexInput {\n");
                for attr in &sections.attributes {
                    out.push_str(&format!(
                        "    @location({}) {}: {},\n",
                        attr.location,
                        attr.name,
                        self.type_name(attr.ty)?
                    ));
                }
                out.push_str("}\n");
            }
            if *stage != ShaderStage::Compute && !declared_varyings {
                emit_varyings_struct(&mut out, sections)?;
                declared_varyings = true;
            }
            for group in &sections.groups {
                if !declared_groups.contains(&group.index) {
                    emit_group_decls(&mut out, group)?;
                    declared_groups.push(group.index);
                }
            }
            for helper in &sections.helpers {
                if !declared_helpers.contains(&helper.as_str()) {
                    out.push_str(helper);
                    out.push('\n');
                    declared_helpers.push(helper);
                }
            }
        }
        for (stage, sections) in stages {
            emit_entry(&mut out, *stage, sections);
        }
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_widening_pads_one_in_the_last_slot() {
        let a = WgslAdapter;
        assert_eq!(
            a.convert("c", ValueType::Vec3, ValueType::Vec4).unwrap(),
            "vec4f(c, 1.0)"
        );
        assert_eq!(
            a.convert("c", ValueType::Vec2, ValueType::Vec4).unwrap(),
            "vec4f(c, 0.0, 1.0)"
        );
        assert_eq!(
            a.convert("c", ValueType::Vec2, ValueType::Vec3).unwrap(),
            "vec3f(c, 0.0)"
        );
    }

    #[test]
    fn scalar_splats_and_narrowing_swizzles() {
        let a = WgslAdapter;
        assert_eq!(
            a.convert("s", ValueType::Float, ValueType::Vec3).unwrap(),
            "vec3f(s)"
        );
        assert_eq!(
            a.convert("v", ValueType::Vec4, ValueType::Vec2).unwrap(),
            "v.xy"
        );
        assert_eq!(
            a.convert("v", ValueType::Vec3, ValueType::Float).unwrap(),
            "f32(v.x)"
        );
    }

    #[test]
    fn fragcoord_is_rejected_in_the_vertex_stage() {
        let a = WgslAdapter;
        assert!(a
            .builtin_access(BuiltinValue::FragCoord, ShaderStage::Vertex)
            .is_err());
        assert_eq!(
            a.builtin_access(BuiltinValue::FragCoord, ShaderStage::Fragment)
                .unwrap(),
            "in.position"
        );
    }

    #[test]
    fn unfilterable_sampling_goes_through_the_bilinear_helper() {
        let a = WgslAdapter;
        let mut helpers = HelperRegistry::default();
        let expr = a
            .texture_sample(
                &TextureSampleContext {
                    node: 1,
                    texture: "tex0",
                    sampler: "smp0",
                    uv: "uv",
                    stage: ShaderStage::Fragment,
                    filterable: false,
                    caps: &crate::types::Capabilities::default(),
                },
                &mut helpers,
            )
            .unwrap();
        assert!(expr.starts_with("sg_bilinear(tex0"), "{expr}");
        assert!(helpers.contains("sg_bilinear"));
    }

    #[test]
    fn storage_writes_emit_texture_store_outside_the_vertex_stage() {
        let a = WgslAdapter;
        assert_eq!(
            a.texture_store("out_tex", "coord", "value", ShaderStage::Compute)
                .unwrap(),
            "textureStore(out_tex, coord, value);"
        );
        assert!(a
            .texture_store("out_tex", "coord", "value", ShaderStage::Vertex)
            .is_err());
    }
}

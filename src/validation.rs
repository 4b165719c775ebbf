//! Shader validation through naga's frontends.

use crate::error::CompileError;
use crate::types::ShaderStage;

/// Parse and validate WGSL, returning the naga module on success.
pub fn validate_wgsl(source: &str) -> Result<naga::Module, CompileError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| {
        CompileError::Description(format!(
            "generated invalid WGSL:\n{}",
            with_source_context(source, &e.to_string())
        ))
    })?;
    run_validator(&module, source)?;
    Ok(module)
}

/// Parse and validate one GLSL stage program.
pub fn validate_glsl(source: &str, stage: ShaderStage) -> Result<naga::Module, CompileError> {
    let naga_stage = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
        ShaderStage::Compute => naga::ShaderStage::Compute,
    };
    let options = naga::front::glsl::Options {
        stage: naga_stage,
        defines: Default::default(),
    };
    let module = naga::front::glsl::Frontend::default()
        .parse(&options, source)
        .map_err(|e| {
            CompileError::Description(format!(
                "generated invalid GLSL:\n{}",
                with_source_context(source, &format!("{e:?}"))
            ))
        })?;
    run_validator(&module, source)?;
    Ok(module)
}

fn run_validator(module: &naga::Module, source: &str) -> Result<(), CompileError> {
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(module)
    .map_err(|e| {
        CompileError::Description(format!(
            "generated shader failed validation:\n{}",
            with_source_context(source, &format!("{e:?}"))
        ))
    })?;
    Ok(())
}

/// Error text followed by the full line-numbered source, so a failure in a
/// generated program is diagnosable without re-running the build.
fn with_source_context(source: &str, error: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("  {error}\n"));
    out.push_str("---\n");
    for (line_num, line) in source.lines().enumerate() {
        out.push_str(&format!("{:4} | {line}\n", line_num + 1));
    }
    out.push_str("---\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_wgsl_parses() {
        let source = r#"
@vertex
fn vs_main(@location(0) position: vec3f) -> @builtin(position) vec4f {
    return vec4f(position, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4f {
    return vec4f(1.0, 0.0, 0.0, 1.0);
}
"#;
        assert!(validate_wgsl(source).is_ok());
    }

    #[test]
    fn invalid_wgsl_reports_line_numbers() {
        let err = validate_wgsl("fn broken() -> { return 1.0; }").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("   1 |"), "{msg}");
    }

    #[test]
    fn valid_glsl_fragment_parses() {
        let source = r#"#version 450

layout(location = 0) out vec4 frag_color;

void main() {
    frag_color = vec4(1.0, 0.0, 0.0, 1.0);
}
"#;
        assert!(validate_glsl(source, ShaderStage::Fragment).is_ok());
    }

    #[test]
    fn type_errors_fail_validation() {
        let source = r#"
@fragment
fn fs_main() -> @location(0) vec4f {
    let x: vec4f = 1.0;
    return x;
}
"#;
        assert!(validate_wgsl(source).is_err());
    }
}

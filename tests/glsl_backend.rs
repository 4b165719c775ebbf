use shadegraph::graph::nodes::{
    AttributeNode, ConstantNode, JoinNode, MathFunction, MathNode, TextureSampleNode, TimeNode,
    VaryingNode,
};
use shadegraph::graph::{MaterialGraph, NodeHandle};
use shadegraph::validation::validate_glsl;
use shadegraph::{compile, Capabilities, GeometryLayout, ShaderStage, TargetLanguage};

fn compile_glsl(graph: MaterialGraph) -> shadegraph::BuildOutput {
    compile(
        graph,
        GeometryLayout::default(),
        Capabilities::default(),
        TargetLanguage::Glsl,
    )
    .unwrap()
}

#[test]
fn glsl_emits_per_stage_programs_not_a_module() {
    let out = compile_glsl(MaterialGraph::with_fragment(ConstantNode::color(
        0.2, 0.4, 0.6,
    )));
    assert!(out.module.is_none());

    let vertex = out.vertex.as_deref().unwrap();
    let fragment = out.fragment.as_deref().unwrap();
    validate_glsl(vertex, ShaderStage::Vertex).expect("vertex program should validate");
    validate_glsl(fragment, ShaderStage::Fragment).expect("fragment program should validate");

    assert!(vertex.starts_with("#version 450"), "{vertex}");
    assert!(vertex.contains("gl_Position = "), "{vertex}");
    assert!(fragment.contains("frag_color = vec4(0.2, 0.4, 0.6, 1.0);"), "{fragment}");
}

#[test]
fn glsl_textures_bind_as_combined_samplers_with_flipped_uv() {
    let uv = AttributeNode::new("uv");
    let out = compile_glsl(MaterialGraph::with_fragment(TextureSampleNode::new(uv)));

    let fragment = out.fragment.as_deref().unwrap();
    validate_glsl(fragment, ShaderStage::Fragment).unwrap();

    assert!(fragment.contains("uniform sampler2D tex0;"), "{fragment}");
    assert!(fragment.contains("1.0 - "), "flip-Y applies to GL sampling:\n{fragment}");

    // One combined binding per texture, no separate sampler slot.
    let group = &out.bind_groups[0];
    assert_eq!(group.bindings.len(), 1);
}

#[test]
fn glsl_saturate_becomes_clamp() {
    let root = JoinNode::new(vec![
        MathNode::unary(
            MathFunction::Saturate,
            MathNode::unary(MathFunction::Sin, TimeNode::new() as NodeHandle),
        ),
        ConstantNode::float(0.0),
        ConstantNode::float(0.0),
        ConstantNode::float(1.0),
    ]);
    let out = compile_glsl(MaterialGraph::with_fragment(root));

    let fragment = out.fragment.as_deref().unwrap();
    validate_glsl(fragment, ShaderStage::Fragment).unwrap();
    assert!(fragment.contains("clamp(sin("), "{fragment}");
    assert!(!fragment.contains("saturate("), "{fragment}");
}

#[test]
fn glsl_uniform_blocks_are_std140_with_canonical_sets() {
    let root = JoinNode::new(vec![
        MathNode::unary(MathFunction::Sin, TimeNode::new() as NodeHandle),
        ConstantNode::float(0.0),
        ConstantNode::float(0.0),
        ConstantNode::float(1.0),
    ]);
    let out = compile_glsl(MaterialGraph::with_fragment(root));

    let fragment = out.fragment.as_deref().unwrap();
    validate_glsl(fragment, ShaderStage::Fragment).unwrap();
    assert!(
        fragment.contains("layout(std140, set = 0, binding = 0) uniform Uniforms_frame"),
        "{fragment}"
    );
    assert!(fragment.contains("u_frame.time0"), "{fragment}");
}

#[test]
fn glsl_varyings_are_location_matched_globals() {
    let normal = VaryingNode::new(AttributeNode::new("normal"));
    let out = compile_glsl(MaterialGraph::with_fragment(JoinNode::new(vec![
        normal,
        ConstantNode::float(1.0),
    ])));

    let vertex = out.vertex.as_deref().unwrap();
    let fragment = out.fragment.as_deref().unwrap();
    validate_glsl(vertex, ShaderStage::Vertex).unwrap();
    validate_glsl(fragment, ShaderStage::Fragment).unwrap();

    let name = &out.varyings[0].name;
    let location = out.varyings[0].location;
    assert!(
        vertex.contains(&format!("layout(location = {location}) out vec3 {name};")),
        "{vertex}"
    );
    assert!(
        fragment.contains(&format!("layout(location = {location}) in vec3 {name};")),
        "{fragment}"
    );
}

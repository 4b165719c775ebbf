use std::cell::RefCell;
use std::rc::Rc;

use shadegraph::graph::nodes::{
    AttributeNode, ConstantNode, JoinNode, MathFunction, MathNode, OperatorNode, Operator,
    SwizzleNode, TextureSampleNode, TimeNode,
};
use shadegraph::graph::{MaterialGraph, NodeHandle, NodeIdent};
use shadegraph::types::BuildStage;
use shadegraph::{
    compile, Capabilities, CompileError, GeometryLayout, Node, NodeBuilder, ShaderStage,
    TargetLanguage, ValueType,
};

fn sample_graph() -> MaterialGraph {
    let uv = AttributeNode::new("uv");
    let sample = TextureSampleNode::new(uv);
    let tinted = OperatorNode::new(
        Operator::Mul,
        sample,
        JoinNode::new(vec![
            MathNode::unary(MathFunction::Sin, TimeNode::new() as NodeHandle),
            ConstantNode::float(1.0),
            ConstantNode::float(1.0),
            ConstantNode::float(1.0),
        ]),
    );
    MaterialGraph::with_fragment(tinted)
}

#[test]
fn rebuilding_the_same_graph_is_byte_identical() {
    let graph = sample_graph();
    let build = |graph: MaterialGraph| {
        compile(
            graph,
            GeometryLayout::default(),
            Capabilities::default(),
            TargetLanguage::Wgsl,
        )
        .unwrap()
    };
    let first = build(graph.clone());
    let second = build(graph);

    assert_eq!(first.module, second.module);
    assert_eq!(first.vertex, second.vertex);
    assert_eq!(first.fragment, second.fragment);
    assert_eq!(first.pipeline_signature(), second.pipeline_signature());
}

#[test]
fn structurally_identical_graphs_emit_identical_text() {
    let build = |graph: MaterialGraph| {
        compile(
            graph,
            GeometryLayout::default(),
            Capabilities::default(),
            TargetLanguage::Wgsl,
        )
        .unwrap()
    };
    // Fresh node instances with fresh identities, same shape.
    let first = build(sample_graph());
    let second = build(sample_graph());
    assert_eq!(first.module, second.module);
    assert_eq!(first.pipeline_signature(), second.pipeline_signature());
}

/// Records every build hook it sees, to pin the pass ordering contract.
struct ProbeNode {
    ident: NodeIdent,
    events: Rc<RefCell<Vec<(BuildStage, ShaderStage)>>>,
}

impl ProbeNode {
    fn new(events: Rc<RefCell<Vec<(BuildStage, ShaderStage)>>>) -> Rc<Self> {
        Rc::new(Self {
            ident: NodeIdent::new(),
            events,
        })
    }
}

impl Node for ProbeNode {
    fn ident(&self) -> &NodeIdent {
        &self.ident
    }

    fn node_type(&self) -> &'static str {
        "Probe"
    }

    fn resolve_type(
        &self,
        _builder: &NodeBuilder,
        _expected: Option<ValueType>,
    ) -> Result<ValueType, CompileError> {
        Ok(ValueType::Vec4)
    }

    fn setup(&self, builder: &mut NodeBuilder) -> Result<Option<NodeHandle>, CompileError> {
        self.events
            .borrow_mut()
            .push((builder.current_build_stage(), builder.current_stage()));
        Ok(None)
    }

    fn analyze(&self, builder: &mut NodeBuilder) -> Result<(), CompileError> {
        self.events
            .borrow_mut()
            .push((builder.current_build_stage(), builder.current_stage()));
        Ok(())
    }

    fn generate(
        &self,
        builder: &mut NodeBuilder,
        _expected: Option<ValueType>,
    ) -> Result<String, CompileError> {
        self.events
            .borrow_mut()
            .push((builder.current_build_stage(), builder.current_stage()));
        let args: Vec<String> = ["0.0", "0.0", "0.0", "1.0"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        builder.adapter().construct(ValueType::Vec4, &args)
    }

    fn hash_structure(&self, _hasher: &mut xxhash_rust::xxh3::Xxh3) {}
}

#[test]
fn all_setups_run_before_any_generate_across_stages() {
    let events = Rc::new(RefCell::new(Vec::new()));
    let graph = MaterialGraph {
        vertex: Some(ProbeNode::new(events.clone()) as NodeHandle),
        fragment: Some(ProbeNode::new(events.clone()) as NodeHandle),
        compute: None,
    };
    compile(
        graph,
        GeometryLayout::default(),
        Capabilities::default(),
        TargetLanguage::Wgsl,
    )
    .unwrap();

    let events = events.borrow();
    assert_eq!(
        *events,
        vec![
            (BuildStage::Setup, ShaderStage::Vertex),
            (BuildStage::Setup, ShaderStage::Fragment),
            (BuildStage::Analyze, ShaderStage::Vertex),
            (BuildStage::Analyze, ShaderStage::Fragment),
            (BuildStage::Generate, ShaderStage::Vertex),
            (BuildStage::Generate, ShaderStage::Fragment),
        ]
    );
}

#[test]
fn branch_local_values_stay_inside_their_branch() {
    use shadegraph::graph::nodes::CondNode;

    let cond = OperatorNode::new(
        Operator::Less,
        TimeNode::new() as NodeHandle,
        ConstantNode::float(1.0),
    );
    // `sin(time)` is referenced twice, both inside the then-branch.
    let s = MathNode::unary(MathFunction::Sin, TimeNode::new() as NodeHandle);
    let branch_value = OperatorNode::new(Operator::Add, s.clone(), s);
    let picked = CondNode::new(
        cond,
        branch_value,
        Some(ConstantNode::float(0.0)),
    );
    let root = JoinNode::new(vec![
        picked,
        ConstantNode::float(0.0),
        ConstantNode::float(0.0),
        ConstantNode::float(1.0),
    ]);
    let out = compile(
        MaterialGraph::with_fragment(root),
        GeometryLayout::default(),
        Capabilities::default(),
        TargetLanguage::Wgsl,
    )
    .unwrap();

    let module = out.module.as_deref().unwrap();
    shadegraph::validation::validate_wgsl(module).unwrap();

    assert_eq!(module.matches("sin(").count(), 1, "{module}");
    let if_pos = module.find("if (").expect("conditional emitted");
    let sin_pos = module.find("sin(").unwrap();
    assert!(
        sin_pos > if_pos,
        "branch-local declaration must sit inside the branch:\n{module}"
    );
}

#[test]
fn values_shared_across_branches_hoist_above_the_conditional() {
    use shadegraph::graph::nodes::CondNode;

    let cond = OperatorNode::new(
        Operator::Less,
        TimeNode::new() as NodeHandle,
        ConstantNode::float(1.0),
    );
    let shared = MathNode::unary(MathFunction::Sin, TimeNode::new() as NodeHandle);
    let then_branch = OperatorNode::new(Operator::Add, shared.clone(), ConstantNode::float(1.0));
    let else_branch = OperatorNode::new(Operator::Mul, shared, ConstantNode::float(2.0));
    let picked = CondNode::new(cond, then_branch, Some(else_branch));
    let root = JoinNode::new(vec![
        picked,
        ConstantNode::float(0.0),
        ConstantNode::float(0.0),
        ConstantNode::float(1.0),
    ]);
    let out = compile(
        MaterialGraph::with_fragment(root),
        GeometryLayout::default(),
        Capabilities::default(),
        TargetLanguage::Wgsl,
    )
    .unwrap();

    let module = out.module.as_deref().unwrap();
    shadegraph::validation::validate_wgsl(module).unwrap();

    assert_eq!(module.matches("sin(").count(), 1, "{module}");
    let if_pos = module.find("if (").unwrap();
    let sin_pos = module.find("sin(").unwrap();
    assert!(
        sin_pos < if_pos,
        "value used by both branches must hoist above the conditional:\n{module}"
    );
}

#[test]
fn swizzle_of_shared_value_reads_the_hoisted_name() {
    let base = JoinNode::new(vec![
        MathNode::unary(MathFunction::Sin, TimeNode::new() as NodeHandle),
        ConstantNode::float(0.5),
        ConstantNode::float(0.25),
    ]);
    let x = SwizzleNode::new(base.clone(), "x").unwrap();
    let yz = SwizzleNode::new(base, "yz").unwrap();
    let root = JoinNode::new(vec![x, yz, ConstantNode::float(1.0)]);
    let out = compile(
        MaterialGraph::with_fragment(root),
        GeometryLayout::default(),
        Capabilities::default(),
        TargetLanguage::Wgsl,
    )
    .unwrap();

    let module = out.module.as_deref().unwrap();
    shadegraph::validation::validate_wgsl(module).unwrap();
    // The vec3 builds once; both swizzles read the variable.
    assert_eq!(module.matches("vec3f(sin(").count(), 1, "{module}");
    assert!(module.contains("v0.x"), "{module}");
    assert!(module.contains("v0.yz"), "{module}");
}

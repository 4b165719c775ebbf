//! The generic orchestrator: drives the three-stage build across shader
//! stages, owns every compiler-state registry, and delegates all
//! language-specific decisions to the injected [`LanguageAdapter`].

pub mod bindings;
pub mod declarations;
pub mod output;

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::collections::BTreeSet;

use crate::adapter::{HelperRegistry, LanguageAdapter, ProgramSections, TextureSampleContext};
use crate::builder::bindings::BindingTable;
use crate::builder::declarations::{NodeAttribute, NodeVar, NodeVarying};
use crate::builder::output::BuildOutput;
use crate::error::{BuildError, CompileError};
use crate::graph::cache::{FlowSnippet, NodeCacheSet};
use crate::graph::chain::FlowChain;
use crate::graph::node::{structural_cache_key, NodeHandle, NodeId, UpdateContext};
use crate::graph::nodes::attribute::AttributeNode;
use crate::graph::nodes::input::ConstantNode;
use crate::graph::nodes::math::JoinNode;
use crate::graph::stack::{ScopeId, ScopeTree};
use crate::graph::MaterialGraph;
use crate::types::{
    BuildStage, BuiltinValue, Capabilities, ShaderStage, UpdateCadence, ValueType,
};

/// Declared vertex attributes of the geometry the material is built for.
#[derive(Clone, Debug)]
pub struct GeometryLayout {
    attributes: Vec<(String, ValueType)>,
}

impl GeometryLayout {
    pub fn new() -> Self {
        Self {
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, ty: ValueType) -> Self {
        self.attributes.push((name.to_string(), ty));
        self
    }

    pub fn attribute_type(&self, name: &str) -> Option<ValueType> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, ty)| ty)
    }
}

impl Default for GeometryLayout {
    /// The conventional mesh layout: position, normal, uv.
    fn default() -> Self {
        Self::new()
            .with_attribute("position", ValueType::Vec3)
            .with_attribute("normal", ValueType::Vec3)
            .with_attribute("uv", ValueType::Vec2)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Usage {
    count: u32,
    scope: Option<ScopeId>,
}

/// Per-shader-stage mutable compiler state.
struct StageState {
    scopes: ScopeTree,
    vars: Vec<NodeVar>,
    helpers: HelperRegistry,
    builtins: BTreeSet<BuiltinValue>,
    result: Option<String>,
}

impl StageState {
    fn new() -> Self {
        Self {
            scopes: ScopeTree::new(),
            vars: Vec::new(),
            helpers: HelperRegistry::default(),
            builtins: BTreeSet::new(),
            result: None,
        }
    }
}

fn stage_index(stage: ShaderStage) -> usize {
    match stage {
        ShaderStage::Vertex => 0,
        ShaderStage::Fragment => 1,
        ShaderStage::Compute => 2,
    }
}

/// One builder instance drives exactly one `build()` for one render-object
/// shader variant, then is discarded. Nodes stay immutable; everything
/// mutable lives here, keyed by node identity.
pub struct NodeBuilder {
    graph: MaterialGraph,
    geometry: GeometryLayout,
    caps: Capabilities,
    adapter: Box<dyn LanguageAdapter>,

    // Node registration.
    nodes: Vec<NodeHandle>,
    node_ids: FxHashSet<NodeId>,
    nodes_by_hash: FxHashMap<u64, NodeHandle>,
    update_lists: [Vec<NodeHandle>; 3],

    // Build-stage state.
    setup_outputs: FxHashMap<NodeId, Option<NodeHandle>>,
    resolving: RefCell<FxHashSet<NodeId>>,
    usage: FxHashMap<(NodeId, ShaderStage), Usage>,
    branch_scopes: FxHashMap<(NodeId, ShaderStage), (ScopeId, Option<ScopeId>)>,
    widen_visited: FxHashMap<NodeId, ScopeId>,
    caches: NodeCacheSet,
    chain: FlowChain,
    stages: [StageState; 3],

    // Declaration registries.
    bindings: BindingTable,
    attributes: Vec<NodeAttribute>,
    varyings: Vec<NodeVarying>,
    varying_by_node: FxHashMap<NodeId, usize>,
    attribute_varyings: FxHashMap<String, usize>,

    // Collision-free naming.
    var_count: u32,
    uniform_count: u32,
    varying_count: u32,
    texture_count: u32,

    current_stage: ShaderStage,
    current_build_stage: BuildStage,
}

impl NodeBuilder {
    pub fn new(
        graph: MaterialGraph,
        geometry: GeometryLayout,
        caps: Capabilities,
        adapter: Box<dyn LanguageAdapter>,
    ) -> Self {
        Self {
            graph,
            geometry,
            caps,
            adapter,
            nodes: Vec::new(),
            node_ids: FxHashSet::default(),
            nodes_by_hash: FxHashMap::default(),
            update_lists: [Vec::new(), Vec::new(), Vec::new()],
            setup_outputs: FxHashMap::default(),
            resolving: RefCell::new(FxHashSet::default()),
            usage: FxHashMap::default(),
            branch_scopes: FxHashMap::default(),
            widen_visited: FxHashMap::default(),
            caches: NodeCacheSet::new(),
            chain: FlowChain::new(),
            stages: [StageState::new(), StageState::new(), StageState::new()],
            bindings: BindingTable::default(),
            attributes: Vec::new(),
            varyings: Vec::new(),
            varying_by_node: FxHashMap::default(),
            attribute_varyings: FxHashMap::default(),
            var_count: 0,
            uniform_count: 0,
            varying_count: 0,
            texture_count: 0,
            current_stage: ShaderStage::Vertex,
            current_build_stage: BuildStage::Setup,
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn geometry(&self) -> &GeometryLayout {
        &self.geometry
    }

    pub fn adapter(&self) -> &dyn LanguageAdapter {
        self.adapter.as_ref()
    }

    pub fn current_stage(&self) -> ShaderStage {
        self.current_stage
    }

    pub fn current_build_stage(&self) -> BuildStage {
        self.current_build_stage
    }

    // ---- build orchestration -------------------------------------------

    /// Run the full three-stage build: setup → analyze → generate, each
    /// over every required shader stage in a fixed order, then assemble
    /// the per-stage programs and binding metadata.
    pub fn build(mut self) -> Result<BuildOutput, BuildError> {
        let roots = self
            .stage_roots()
            .map_err(|e| BuildError::new(ShaderStage::Vertex, BuildStage::Setup, e))?;

        for build_stage in [BuildStage::Setup, BuildStage::Analyze, BuildStage::Generate] {
            self.current_build_stage = build_stage;
            for (stage, root) in &roots {
                self.current_stage = *stage;
                debug!("{} pass, {} stage", build_stage.as_str(), stage.as_str());
                let result = match build_stage {
                    BuildStage::Setup => self.setup_child(root),
                    BuildStage::Analyze => self.analyze_child(root),
                    BuildStage::Generate => self.generate_stage_root(*stage, root),
                };
                result.map_err(|e| BuildError::new(*stage, build_stage, e))?;
            }
            if build_stage == BuildStage::Analyze {
                self.propagate_all_scopes(&roots);
            }
        }

        self.finish(&roots)
    }

    /// Roots per required shader stage, synthesizing the default
    /// position-passthrough vertex program when only a fragment root is
    /// authored.
    fn stage_roots(&self) -> Result<Vec<(ShaderStage, NodeHandle)>, CompileError> {
        let mut roots: Vec<(ShaderStage, NodeHandle)> = Vec::new();
        if self.graph.vertex.is_some() || self.graph.fragment.is_some() {
            let vertex = match &self.graph.vertex {
                Some(root) => root.clone(),
                None => JoinNode::new(vec![
                    AttributeNode::new("position"),
                    ConstantNode::float(1.0),
                ]),
            };
            roots.push((ShaderStage::Vertex, vertex));
            if let Some(fragment) = &self.graph.fragment {
                roots.push((ShaderStage::Fragment, fragment.clone()));
            }
        }
        if let Some(compute) = &self.graph.compute {
            roots.push((ShaderStage::Compute, compute.clone()));
        }
        if roots.is_empty() {
            return Err(CompileError::Description(
                "material graph has no root nodes".to_string(),
            ));
        }
        Ok(roots)
    }

    fn stage_expected(stage: ShaderStage) -> Option<ValueType> {
        match stage {
            ShaderStage::Vertex => Some(ValueType::Vec4),
            ShaderStage::Fragment => Some(ValueType::Vec4),
            ShaderStage::Compute => None,
        }
    }

    fn generate_stage_root(
        &mut self,
        stage: ShaderStage,
        root: &NodeHandle,
    ) -> Result<(), CompileError> {
        let expr = self.flow_child(root, Self::stage_expected(stage))?;
        self.stages[stage_index(stage)].result = Some(expr);
        Ok(())
    }

    // ---- setup ----------------------------------------------------------

    /// Idempotent node registration by identity; also files the node into
    /// an update-cadence list when it defines an update behavior.
    pub fn add_node(&mut self, node: &NodeHandle) {
        let id = node.ident().id();
        if !self.node_ids.insert(id) {
            return;
        }
        self.nodes.push(node.clone());
        let hash = structural_cache_key(node.as_ref(), false);
        self.nodes_by_hash.entry(hash).or_insert_with(|| node.clone());
        match node.update_cadence() {
            UpdateCadence::None => {}
            UpdateCadence::Frame => self.update_lists[0].push(node.clone()),
            UpdateCadence::Render => self.update_lists[1].push(node.clone()),
            UpdateCadence::Object => self.update_lists[2].push(node.clone()),
        }
    }

    /// First node registered with a given structural hash; structurally
    /// identical subgraphs can share one setup expansion through this.
    pub fn get_node_by_hash(&self, hash: u64) -> Option<&NodeHandle> {
        self.nodes_by_hash.get(&hash)
    }

    /// Run setup once per (node, builder), memoizing the substitute
    /// subgraph if the node expands into one.
    pub fn setup_child(&mut self, node: &NodeHandle) -> Result<(), CompileError> {
        let id = node.ident().id();
        if self.setup_outputs.contains_key(&id) {
            return Ok(());
        }
        self.add_node(node);
        // Mark visited before recursion so cyclic graphs terminate here and
        // fail in the generate guard instead of overflowing the stack.
        self.setup_outputs.insert(id, None);
        for child in node.children() {
            self.setup_child(&child)?;
        }
        if let Some(substitute) = node.setup(self)? {
            self.setup_child(&substitute)?;
            self.setup_outputs.insert(id, Some(substitute));
        }
        Ok(())
    }

    /// Resolve a node through its setup substitution, if any.
    fn effective(&self, node: &NodeHandle) -> NodeHandle {
        let mut current = node.clone();
        loop {
            match self.setup_outputs.get(&current.ident().id()) {
                Some(Some(substitute)) => current = substitute.clone(),
                _ => return current,
            }
        }
    }

    /// Output type of a child node as the current build sees it. Cyclic
    /// graphs are caught here, since type resolution recurses ahead of the
    /// generation guard.
    pub fn node_type_of(
        &self,
        node: &NodeHandle,
        expected: Option<ValueType>,
    ) -> Result<ValueType, CompileError> {
        let node = self.effective(node);
        let id = node.ident().id();
        if !self.resolving.borrow_mut().insert(id) {
            return Err(CompileError::Graph {
                node_type: node.node_type().to_string(),
                node_id: id,
            });
        }
        let result = node.resolve_type(self, expected);
        self.resolving.borrow_mut().remove(&id);
        result
    }

    // ---- analyze --------------------------------------------------------

    /// Count one reference to `node` at the current scope; recurse on
    /// first sight.
    pub fn analyze_child(&mut self, node: &NodeHandle) -> Result<(), CompileError> {
        let node = self.effective(node);
        let id = node.ident().id();
        let stage = self.current_stage;
        let scope = self.stages[stage_index(stage)].scopes.current();

        let prev = self.usage.get(&(id, stage)).copied().unwrap_or_default();
        let merged = match prev.scope {
            None => scope,
            Some(p) => self.stages[stage_index(stage)].scopes.lca(p, scope),
        };
        self.usage.insert(
            (id, stage),
            Usage {
                count: prev.count + 1,
                scope: Some(merged),
            },
        );

        if prev.count == 0 {
            node.analyze(self)?;
        }
        Ok(())
    }

    /// Count a usage of `node` in the vertex stage at root scope, on
    /// behalf of a fragment-side stage-crossing reference.
    pub fn analyze_in_vertex_root(&mut self, node: &NodeHandle) -> Result<(), CompileError> {
        let saved = self.current_stage;
        self.current_stage = ShaderStage::Vertex;
        let result = self.analyze_child(node);
        self.current_stage = saved;
        result
    }

    /// Record the branch scopes a conditional opened during analyze so the
    /// widening pass can keep branch subtrees local.
    pub fn record_branch_scopes(
        &mut self,
        node: NodeId,
        then_scope: ScopeId,
        else_scope: Option<ScopeId>,
    ) {
        self.branch_scopes
            .insert((node, self.current_stage), (then_scope, else_scope));
    }

    pub fn branch_scopes_of(&self, node: NodeId) -> Option<(ScopeId, Option<ScopeId>)> {
        self.branch_scopes
            .get(&(node, self.current_stage))
            .copied()
    }

    fn propagate_all_scopes(&mut self, roots: &[(ShaderStage, NodeHandle)]) {
        for (stage, root) in roots {
            self.current_stage = *stage;
            self.widen_visited.clear();
            let root_scope = self.stages[stage_index(*stage)].scopes.root();
            self.widen_child(root, root_scope);
        }
    }

    /// Widen a node's recorded scope to cover a generation site, then
    /// propagate to the scope its own children will be generated in.
    pub fn widen_child(&mut self, node: &NodeHandle, gen_scope: ScopeId) {
        let node = self.effective(node);
        let id = node.ident().id();
        let stage = self.current_stage;
        let Some(entry) = self.usage.get(&(id, stage)).copied() else {
            return;
        };
        let widened = match entry.scope {
            None => gen_scope,
            Some(prev) => self.stages[stage_index(stage)].scopes.lca(prev, gen_scope),
        };
        if let Some(entry) = self.usage.get_mut(&(id, stage)) {
            entry.scope = Some(widened);
        }

        // A single-use node is generated inline at its reference site; a
        // multiply-used node at its own (widened) scope.
        let self_scope = if entry.count > 1 { widened } else { gen_scope };
        if self.widen_visited.get(&id) == Some(&self_scope) {
            return;
        }
        self.widen_visited.insert(id, self_scope);
        if node.crosses_stage_boundary() {
            return;
        }
        node.propagate_scopes(self, self_scope);
    }

    // ---- generate: flow driver -----------------------------------------

    /// Generate a child node's expression, memoized by (node, shader
    /// stage, active cache). Multiply-referenced nodes materialize into a
    /// named variable exactly once; later references get the name.
    pub fn flow_child_raw(
        &mut self,
        node: &NodeHandle,
        expected: Option<ValueType>,
    ) -> Result<FlowSnippet, CompileError> {
        let node = self.effective(node);
        let id = node.ident().id();
        let stage = self.current_stage;

        if let Some(snippet) = self.caches.get(id, stage) {
            return Ok(snippet.clone());
        }

        self.chain.push(id, node.node_type())?;
        let result = self.flow_uncached(&node, expected);
        self.chain.pop();
        let snippet = result?;
        self.caches.insert(id, stage, snippet.clone());
        Ok(snippet)
    }

    /// Like [`flow_child_raw`], but converts the result to `expected` when
    /// the resolved type differs.
    ///
    /// [`flow_child_raw`]: NodeBuilder::flow_child_raw
    pub fn flow_child(
        &mut self,
        node: &NodeHandle,
        expected: Option<ValueType>,
    ) -> Result<String, CompileError> {
        let snippet = self.flow_child_raw(node, expected)?;
        match expected {
            Some(want) if want != snippet.ty => {
                self.adapter.convert(&snippet.expr, snippet.ty, want)
            }
            _ => Ok(snippet.expr),
        }
    }

    fn flow_uncached(
        &mut self,
        node: &NodeHandle,
        expected: Option<ValueType>,
    ) -> Result<FlowSnippet, CompileError> {
        let ty = node.resolve_type(self, expected)?;
        let id = node.ident().id();
        let stage = self.current_stage;
        let usage = self.usage.get(&(id, stage)).copied().unwrap_or(Usage {
            count: 1,
            scope: None,
        });

        let materialize = usage.count > 1 && !ty.is_reference() && !node.prefers_inline();
        if !materialize {
            let expr = node.generate(self, Some(ty))?;
            return Ok(FlowSnippet { expr, ty });
        }

        // Hoist to the lowest common ancestor of every reference site: the
        // declaration stays local to a conditional block when all uses are
        // inside it, and lands in the function root otherwise.
        let target_scope = usage
            .scope
            .unwrap_or_else(|| self.stages[stage_index(stage)].scopes.root());
        self.stages[stage_index(stage)].scopes.enter(target_scope);
        let generated = node.generate(self, Some(ty));
        self.stages[stage_index(stage)].scopes.pop();
        let expr = generated?;

        let name = self.next_var_name();
        let line = self.adapter.var_declaration(&name, ty, &expr)?;
        self.stages[stage_index(stage)]
            .scopes
            .push_line(target_scope, line);
        self.stages[stage_index(stage)].vars.push(NodeVar {
            node: Some(id),
            name: name.clone(),
            ty,
            stage,
            scope: target_scope,
        });
        Ok(FlowSnippet { expr: name, ty })
    }

    // ---- scopes ---------------------------------------------------------

    /// Open a nested statement scope (allocating during analyze, replaying
    /// during generate).
    pub fn push_scope(&mut self, conditional: bool) -> ScopeId {
        let build_stage = self.current_build_stage;
        let state = &mut self.stages[stage_index(self.current_stage)];
        match build_stage {
            BuildStage::Analyze => state.scopes.push_new(conditional),
            _ => state.scopes.push_replay(conditional),
        }
    }

    pub fn pop_scope(&mut self) {
        self.stages[stage_index(self.current_stage)].scopes.pop();
    }

    pub fn current_scope(&self) -> ScopeId {
        self.stages[stage_index(self.current_stage)].scopes.current()
    }

    /// Append a statement line to the current scope of the current stage.
    pub fn push_line(&mut self, line: impl Into<String>) {
        self.stages[stage_index(self.current_stage)]
            .scopes
            .push_line_current(line);
    }

    /// Drain the current scope's statement lines (a conditional wraps its
    /// branch lines into an `if` block).
    pub fn take_current_scope_lines(&mut self) -> Vec<String> {
        let state = &mut self.stages[stage_index(self.current_stage)];
        let scope = state.scopes.current();
        state.scopes.take_lines(scope)
    }

    /// Declare a fresh mutable variable in the current scope and return
    /// its name (conditional outputs assigned per branch).
    pub fn declare_out_var(&mut self, ty: ValueType) -> Result<String, CompileError> {
        let name = self.next_var_name();
        let line = self.adapter.var_declaration_uninit(&name, ty)?;
        let stage = self.current_stage;
        let scope = self.stages[stage_index(stage)].scopes.current();
        self.stages[stage_index(stage)].scopes.push_line_current(line);
        self.stages[stage_index(stage)].vars.push(NodeVar {
            node: None,
            name: name.clone(),
            ty,
            stage,
            scope,
        });
        Ok(name)
    }

    /// Render an if/else block in the adapter's syntax and append it to
    /// the current scope.
    pub fn push_conditional(&mut self, cond: &str, then_lines: Vec<String>, else_lines: Vec<String>) {
        let lines = self.adapter.if_block(cond, &then_lines, &else_lines);
        for line in lines {
            self.push_line(line);
        }
    }

    // ---- caches ---------------------------------------------------------

    /// Open a nested flow cache: `inherit` keeps the parent's memoized
    /// snippets visible, detaching forces the subgraph to re-generate.
    pub fn push_cache(&mut self, inherit: bool) {
        self.caches.push(inherit);
    }

    pub fn pop_cache(&mut self) {
        self.caches.pop();
    }

    // ---- declaration factories -----------------------------------------

    /// Get-or-create the uniform declaration for a node and return the
    /// expression reading it. Re-registration from another stage widens
    /// visibility and reuses the name.
    pub fn get_uniform_from_node(
        &mut self,
        node: NodeId,
        hint: Option<&str>,
        ty: ValueType,
        group: &str,
    ) -> String {
        if self.bindings.uniform_name(group, node).is_none() {
            let name = self.next_uniform_name(hint);
            self.bindings
                .add_uniform(group, node, &name, ty, self.current_stage);
        } else {
            // Name ignored on re-registration; only visibility widens.
            self.bindings
                .add_uniform(group, node, "", ty, self.current_stage);
        }
        let name = self
            .bindings
            .uniform_name(group, node)
            .expect("uniform registered above")
            .to_string();
        self.adapter.uniform_access(group, &name)
    }

    /// Get-or-create a texture binding (plus sampler for separate-sampler
    /// targets); returns the generated (texture, sampler) names.
    pub fn get_texture_from_node(
        &mut self,
        node: NodeId,
        filterable: bool,
        group: &str,
    ) -> (String, String) {
        if self.bindings.texture_names(group, node).is_none() {
            let index = self.texture_count;
            self.texture_count += 1;
            let tex = format!("tex{index}");
            let samp = format!("smp{index}");
            self.bindings
                .add_texture(group, node, &tex, &samp, filterable, self.current_stage);
        } else {
            self.bindings
                .add_texture(group, node, "", "", filterable, self.current_stage);
        }
        let (tex, samp) = self
            .bindings
            .texture_names(group, node)
            .expect("texture registered above");
        (tex.to_string(), samp.to_string())
    }

    /// Reference a geometry attribute from the current stage. In the
    /// vertex stage this registers a vertex input; in the fragment stage
    /// the value is routed through an automatically created varying.
    pub fn get_attribute(
        &mut self,
        node: NodeId,
        name: &str,
        ty: ValueType,
    ) -> Result<String, CompileError> {
        match self.current_stage {
            ShaderStage::Vertex => Ok(self.register_vertex_attribute(Some(node), name, ty)),
            ShaderStage::Fragment => self.get_attribute_varying(node, name, ty),
            ShaderStage::Compute => Err(CompileError::Description(format!(
                "vertex attribute `{name}` referenced in compute stage"
            ))),
        }
    }

    fn register_vertex_attribute(
        &mut self,
        node: Option<NodeId>,
        name: &str,
        ty: ValueType,
    ) -> String {
        if !self.attributes.iter().any(|a| a.name == name) {
            let location = self.attributes.len() as u32;
            self.attributes.push(NodeAttribute {
                node,
                name: name.to_string(),
                ty,
                location,
            });
        }
        self.adapter.attribute_access(name)
    }

    fn get_attribute_varying(
        &mut self,
        node: NodeId,
        name: &str,
        ty: ValueType,
    ) -> Result<String, CompileError> {
        if let Some(&idx) = self.attribute_varyings.get(name) {
            let varying_name = self.varyings[idx].name.clone();
            return Ok(self.adapter.varying_load(self.current_stage, &varying_name));
        }
        let varying_name = self.next_varying_name();
        let location = self.varyings.len() as u32;
        self.varyings.push(NodeVarying {
            node: None,
            name: varying_name.clone(),
            ty,
            location,
        });
        self.attribute_varyings
            .insert(name.to_string(), self.varyings.len() - 1);

        // Feed the varying from the vertex stage.
        let saved = self.current_stage;
        self.current_stage = ShaderStage::Vertex;
        let attr_expr = self.register_vertex_attribute(Some(node), name, ty);
        let store = self.adapter.varying_store(&varying_name);
        let line = self.adapter.assignment(&store, &attr_expr);
        let root = self.stages[stage_index(ShaderStage::Vertex)].scopes.root();
        self.stages[stage_index(ShaderStage::Vertex)]
            .scopes
            .push_line(root, line);
        self.current_stage = saved;

        Ok(self.adapter.varying_load(self.current_stage, &varying_name))
    }

    /// Get-or-create the varying fed by `child`, flowing the child in the
    /// vertex stage on first sight, and return the expression reading it
    /// from the current stage.
    pub fn get_varying_from_node(
        &mut self,
        node: NodeId,
        child: &NodeHandle,
        ty: ValueType,
    ) -> Result<String, CompileError> {
        if let Some(&idx) = self.varying_by_node.get(&node) {
            let name = self.varyings[idx].name.clone();
            return Ok(self.adapter.varying_load(self.current_stage, &name));
        }
        let name = self.next_varying_name();
        let location = self.varyings.len() as u32;
        self.varyings.push(NodeVarying {
            node: Some(node),
            name: name.clone(),
            ty,
            location,
        });
        self.varying_by_node.insert(node, self.varyings.len() - 1);

        let saved = self.current_stage;
        self.current_stage = ShaderStage::Vertex;
        let result = self.flow_child(child, Some(ty));
        if let Ok(expr) = &result {
            let store = self.adapter.varying_store(&name);
            let line = self.adapter.assignment(&store, expr);
            let root = self.stages[stage_index(ShaderStage::Vertex)].scopes.root();
            self.stages[stage_index(ShaderStage::Vertex)]
                .scopes
                .push_line(root, line);
        }
        self.current_stage = saved;
        result?;

        Ok(self.adapter.varying_load(self.current_stage, &name))
    }

    /// Reference a built-in pipeline input from the current stage.
    pub fn get_builtin(&mut self, builtin: BuiltinValue) -> Result<String, CompileError> {
        let expr = self.adapter.builtin_access(builtin, self.current_stage)?;
        self.stages[stage_index(self.current_stage)]
            .builtins
            .insert(builtin);
        Ok(expr)
    }

    /// Generate a texture-sampling expression through the adapter's
    /// sampling strategy, injecting helpers into the current stage.
    pub fn emit_texture_sample(
        &mut self,
        node: NodeId,
        filterable: bool,
        group: &str,
        uv_expr: &str,
    ) -> Result<String, CompileError> {
        let (texture, sampler) = self.get_texture_from_node(node, filterable, group);
        let stage = self.current_stage;
        let mut helpers =
            std::mem::take(&mut self.stages[stage_index(stage)].helpers);
        let ctx = TextureSampleContext {
            node,
            texture: &texture,
            sampler: &sampler,
            uv: uv_expr,
            stage,
            filterable,
            caps: &self.caps,
        };
        let result = self.adapter.texture_sample(&ctx, &mut helpers);
        self.stages[stage_index(stage)].helpers = helpers;
        result
    }

    /// Inject a named helper-function declaration once per stage.
    pub fn add_helper(&mut self, key: &str, node: Option<NodeId>, decl: impl FnOnce() -> String) {
        self.stages[stage_index(self.current_stage)]
            .helpers
            .insert_with(key, node, decl);
    }

    fn next_var_name(&mut self) -> String {
        let n = self.var_count;
        self.var_count += 1;
        format!("v{n}")
    }

    fn next_uniform_name(&mut self, hint: Option<&str>) -> String {
        let base = hint
            .map(sanitize_identifier)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "u".to_string());
        let n = self.uniform_count;
        self.uniform_count += 1;
        format!("{base}{n}")
    }

    fn next_varying_name(&mut self) -> String {
        let n = self.varying_count;
        self.varying_count += 1;
        format!("vy{n}")
    }

    // ---- updates --------------------------------------------------------

    /// Nodes filed for a cadence, in registration order.
    pub fn nodes_for_cadence(&self, cadence: UpdateCadence) -> &[NodeHandle] {
        match cadence {
            UpdateCadence::None => &[],
            UpdateCadence::Frame => &self.update_lists[0],
            UpdateCadence::Render => &self.update_lists[1],
            UpdateCadence::Object => &self.update_lists[2],
        }
    }

    /// Drive the update hooks of every node filed for `cadence`.
    pub fn update_nodes(&self, cadence: UpdateCadence, ctx: &UpdateContext) {
        for node in self.nodes_for_cadence(cadence) {
            node.update_before(ctx);
            node.update(ctx);
            node.update_after(ctx);
        }
    }

    // ---- assembly -------------------------------------------------------

    fn finish(mut self, roots: &[(ShaderStage, NodeHandle)]) -> Result<BuildOutput, BuildError> {
        let wrap =
            |stage: ShaderStage, e: CompileError| BuildError::new(stage, BuildStage::Generate, e);

        let layouts = self
            .bindings
            .finalize(&self.caps)
            .map_err(|e| wrap(roots[0].0, e))?;

        let mut sections: Vec<(ShaderStage, ProgramSections)> = Vec::new();
        for (stage, _) in roots {
            let state = &mut self.stages[stage_index(*stage)];
            let root_scope = state.scopes.root();
            let body = state.scopes.take_lines(root_scope);
            sections.push((
                *stage,
                ProgramSections {
                    attributes: if *stage == ShaderStage::Vertex {
                        self.attributes.clone()
                    } else {
                        Vec::new()
                    },
                    varyings: if *stage == ShaderStage::Compute {
                        Vec::new()
                    } else {
                        self.varyings.clone()
                    },
                    groups: layouts
                        .iter()
                        .filter(|g| g.visible_in(*stage))
                        .cloned()
                        .collect(),
                    helpers: state.helpers.decls().map(str::to_string).collect(),
                    body,
                    result: state.result.take(),
                    builtins: state.builtins.iter().copied().collect(),
                },
            ));
        }

        let mut vertex = None;
        let mut fragment = None;
        let mut compute = None;
        for (stage, section) in &sections {
            let text = self
                .adapter
                .assemble_stage(*stage, section)
                .map_err(|e| wrap(*stage, e))?;
            match stage {
                ShaderStage::Vertex => vertex = Some(text),
                ShaderStage::Fragment => fragment = Some(text),
                ShaderStage::Compute => compute = Some(text),
            }
        }
        let module = self
            .adapter
            .assemble_module(
                &sections
                    .iter()
                    .map(|(stage, section)| (*stage, section))
                    .collect::<Vec<_>>(),
            )
            .map_err(|e| wrap(roots[0].0, e))?;

        debug!(
            "build finished: {} nodes, {} bind groups, {} varyings",
            self.nodes.len(),
            layouts.len(),
            self.varyings.len()
        );

        let vars: Vec<NodeVar> = self
            .stages
            .iter_mut()
            .flat_map(|state| state.vars.drain(..))
            .collect();

        Ok(BuildOutput {
            language: self.adapter.language(),
            vertex,
            fragment,
            compute,
            module,
            bind_groups: bindings::describe_bind_groups(
                &layouts,
                self.adapter.separate_samplers(),
            ),
            attributes: self.attributes,
            varyings: self.varyings,
            vars,
        })
    }
}

fn sanitize_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, c) in raw.chars().enumerate() {
        if c.is_ascii_alphabetic() || c == '_' || (i > 0 && c.is_ascii_digit()) {
            out.push(c.to_ascii_lowercase());
        } else {
            out.push('_');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_identifiers_valid() {
        assert_eq!(sanitize_identifier("Time"), "time");
        assert_eq!(sanitize_identifier("base color"), "base_color");
        assert_eq!(sanitize_identifier("2x"), "_x");
    }

    #[test]
    fn default_geometry_has_standard_attributes() {
        let geo = GeometryLayout::default();
        assert_eq!(geo.attribute_type("position"), Some(ValueType::Vec3));
        assert_eq!(geo.attribute_type("uv"), Some(ValueType::Vec2));
        assert_eq!(geo.attribute_type("tangent"), None);
    }
}

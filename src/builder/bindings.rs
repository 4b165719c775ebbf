//! Bind-group bookkeeping: uniform members, texture bindings, canonical
//! group-index assignment and the uniform-buffer overflow check.

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::error::CompileError;
use crate::graph::node::NodeId;
use crate::types::{Capabilities, ShaderStage, ValueType};

bitflags! {
    /// Which pipeline stages can see a binding.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct StageMask: u8 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
    }
}

impl From<ShaderStage> for StageMask {
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => StageMask::VERTEX,
            ShaderStage::Fragment => StageMask::FRAGMENT,
            ShaderStage::Compute => StageMask::COMPUTE,
        }
    }
}

/// One scalar/vector/matrix member of a group's backing uniform buffer.
#[derive(Clone, Debug)]
pub struct UniformMember {
    pub name: String,
    pub ty: ValueType,
    /// std140-ish byte offset inside the buffer.
    pub offset: u64,
    pub node: NodeId,
    pub visibility: StageMask,
}

/// A texture plus (for separate-sampler targets) its sampler.
#[derive(Clone, Debug)]
pub struct TextureBinding {
    pub texture_name: String,
    pub sampler_name: String,
    pub filterable: bool,
    pub node: NodeId,
    pub visibility: StageMask,
}

/// One logical bind group after finalization.
#[derive(Clone, Debug)]
pub struct BindGroupLayout {
    pub name: String,
    /// Stable group index shared by every stage that references the group.
    pub index: u32,
    pub members: Vec<UniformMember>,
    /// Packed byte size of the backing buffer (0 when no members).
    pub buffer_size: u64,
    pub textures: Vec<TextureBinding>,
    /// Union of member visibilities; the buffer binds with this mask.
    pub visibility: StageMask,
}

impl BindGroupLayout {
    pub fn visible_in(&self, stage: ShaderStage) -> bool {
        self.visibility.intersects(StageMask::from(stage))
    }
}

/// Resource kind of one binding slot, for the renderer's allocation layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingResourceKind {
    UniformBuffer,
    Texture2D,
    Sampler,
    /// Combined image-sampler (GLSL-style targets).
    CombinedTextureSampler,
}

/// One slot of the ordered bind-group descriptor list handed to the
/// renderer.
#[derive(Clone, Debug)]
pub struct BindingDescriptor {
    pub name: String,
    pub binding: u32,
    pub kind: BindingResourceKind,
    pub visibility: StageMask,
}

#[derive(Clone, Debug)]
pub struct BindGroupDescriptor {
    pub group: String,
    pub index: u32,
    pub bindings: Vec<BindingDescriptor>,
}

#[derive(Default)]
struct PendingGroup {
    members: Vec<UniformMember>,
    member_by_node: FxHashMap<NodeId, usize>,
    textures: Vec<TextureBinding>,
    texture_by_node: FxHashMap<NodeId, usize>,
}

/// Accumulates uniform/texture registrations during generation and produces
/// the finalized, deterministically ordered group layouts.
#[derive(Default)]
pub struct BindingTable {
    groups: FxHashMap<String, PendingGroup>,
}

impl BindingTable {
    /// Register (or re-reference) a uniform member. Re-registration from
    /// another stage widens the visibility mask only.
    pub fn add_uniform(
        &mut self,
        group: &str,
        node: NodeId,
        name: &str,
        ty: ValueType,
        stage: ShaderStage,
    ) {
        let pending = self.groups.entry(group.to_string()).or_default();
        if let Some(&idx) = pending.member_by_node.get(&node) {
            pending.members[idx].visibility |= StageMask::from(stage);
            return;
        }
        let idx = pending.members.len();
        pending.members.push(UniformMember {
            name: name.to_string(),
            ty,
            offset: 0, // assigned at finalize
            node,
            visibility: StageMask::from(stage),
        });
        pending.member_by_node.insert(node, idx);
    }

    /// Register (or re-reference) a texture binding.
    pub fn add_texture(
        &mut self,
        group: &str,
        node: NodeId,
        texture_name: &str,
        sampler_name: &str,
        filterable: bool,
        stage: ShaderStage,
    ) {
        let pending = self.groups.entry(group.to_string()).or_default();
        if let Some(&idx) = pending.texture_by_node.get(&node) {
            pending.textures[idx].visibility |= StageMask::from(stage);
            return;
        }
        let idx = pending.textures.len();
        pending.textures.push(TextureBinding {
            texture_name: texture_name.to_string(),
            sampler_name: sampler_name.to_string(),
            filterable,
            node,
            visibility: StageMask::from(stage),
        });
        pending.texture_by_node.insert(node, idx);
    }

    pub fn uniform_name(&self, group: &str, node: NodeId) -> Option<&str> {
        let pending = self.groups.get(group)?;
        let &idx = pending.member_by_node.get(&node)?;
        Some(&pending.members[idx].name)
    }

    pub fn texture_names(&self, group: &str, node: NodeId) -> Option<(&str, &str)> {
        let pending = self.groups.get(group)?;
        let &idx = pending.texture_by_node.get(&node)?;
        let tex = &pending.textures[idx];
        Some((&tex.texture_name, &tex.sampler_name))
    }

    /// Assign group indices and member offsets, check buffer limits, and
    /// return the layouts in index order.
    ///
    /// Group indices follow a canonical order (cadence groups first, then
    /// lexicographic), so structurally equivalent graphs produce the same
    /// group → index assignment regardless of traversal order, and pipeline
    /// layouts can be cache-reused across rebuilds.
    pub fn finalize(&self, caps: &Capabilities) -> Result<Vec<BindGroupLayout>, CompileError> {
        let mut names: Vec<&String> = self.groups.keys().collect();
        names.sort_by_key(|name| (canonical_group_rank(name), name.as_str()));

        let mut layouts = Vec::with_capacity(names.len());
        for (index, name) in names.into_iter().enumerate() {
            let pending = &self.groups[name];

            let mut offset = 0u64;
            let mut members = Vec::with_capacity(pending.members.len());
            let mut visibility = StageMask::empty();
            for member in &pending.members {
                let align = member.ty.align_bytes();
                offset = offset.div_ceil(align) * align;
                members.push(UniformMember {
                    offset,
                    ..member.clone()
                });
                offset += member.ty.size_bytes();
                visibility |= member.visibility;
            }
            let buffer_size = if members.is_empty() {
                0
            } else {
                offset.div_ceil(16) * 16
            };

            if buffer_size > caps.max_uniform_buffer_size {
                return Err(CompileError::BindingOverflow {
                    group: name.clone(),
                    size: buffer_size,
                    limit: caps.max_uniform_buffer_size,
                });
            }

            for tex in &pending.textures {
                visibility |= tex.visibility;
            }

            layouts.push(BindGroupLayout {
                name: name.clone(),
                index: index as u32,
                members,
                buffer_size,
                textures: pending.textures.clone(),
                visibility,
            });
        }
        Ok(layouts)
    }
}

/// Cadence-scoped groups come first, in update-frequency order; authored
/// group names follow lexicographically.
fn canonical_group_rank(name: &str) -> u32 {
    match name {
        "frame" => 0,
        "render" => 1,
        "object" => 2,
        _ => 3,
    }
}

/// Derive renderer-facing descriptors from the finalized layouts.
/// `separate_samplers` mirrors the adapter's sampling strategy.
pub fn describe_bind_groups(
    layouts: &[BindGroupLayout],
    separate_samplers: bool,
) -> Vec<BindGroupDescriptor> {
    layouts
        .iter()
        .map(|layout| {
            let mut bindings = Vec::new();
            let mut slot = 0u32;
            if !layout.members.is_empty() {
                bindings.push(BindingDescriptor {
                    name: format!("{}_uniforms", layout.name),
                    binding: slot,
                    kind: BindingResourceKind::UniformBuffer,
                    visibility: layout.visibility,
                });
                slot += 1;
            }
            for tex in &layout.textures {
                if separate_samplers {
                    bindings.push(BindingDescriptor {
                        name: tex.texture_name.clone(),
                        binding: slot,
                        kind: BindingResourceKind::Texture2D,
                        visibility: tex.visibility,
                    });
                    bindings.push(BindingDescriptor {
                        name: tex.sampler_name.clone(),
                        binding: slot + 1,
                        kind: BindingResourceKind::Sampler,
                        visibility: tex.visibility,
                    });
                    slot += 2;
                } else {
                    bindings.push(BindingDescriptor {
                        name: tex.texture_name.clone(),
                        binding: slot,
                        kind: BindingResourceKind::CombinedTextureSampler,
                        visibility: tex.visibility,
                    });
                    slot += 1;
                }
            }
            BindGroupDescriptor {
                group: layout.name.clone(),
                index: layout.index,
                bindings,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_indices_are_canonical_not_insertion_ordered() {
        let caps = Capabilities::default();

        let mut a = BindingTable::default();
        a.add_uniform("object", 1, "u0", ValueType::Vec4, ShaderStage::Fragment);
        a.add_uniform("frame", 2, "u1", ValueType::Float, ShaderStage::Fragment);

        let mut b = BindingTable::default();
        b.add_uniform("frame", 2, "u1", ValueType::Float, ShaderStage::Fragment);
        b.add_uniform("object", 1, "u0", ValueType::Vec4, ShaderStage::Fragment);

        let la = a.finalize(&caps).unwrap();
        let lb = b.finalize(&caps).unwrap();
        let index_of = |layouts: &[BindGroupLayout], name: &str| {
            layouts.iter().find(|l| l.name == name).unwrap().index
        };
        assert_eq!(index_of(&la, "frame"), index_of(&lb, "frame"));
        assert_eq!(index_of(&la, "object"), index_of(&lb, "object"));
        assert_eq!(index_of(&la, "frame"), 0);
    }

    #[test]
    fn std140_offsets_respect_alignment() {
        let caps = Capabilities::default();
        let mut table = BindingTable::default();
        table.add_uniform("frame", 1, "a", ValueType::Float, ShaderStage::Fragment);
        table.add_uniform("frame", 2, "b", ValueType::Vec3, ShaderStage::Fragment);
        table.add_uniform("frame", 3, "c", ValueType::Float, ShaderStage::Fragment);

        let layout = &table.finalize(&caps).unwrap()[0];
        assert_eq!(layout.members[0].offset, 0);
        assert_eq!(layout.members[1].offset, 16); // vec3 aligns to 16
        assert_eq!(layout.members[2].offset, 28); // packs after the vec3
        assert_eq!(layout.buffer_size, 32);
    }

    #[test]
    fn overflow_reports_group_and_sizes() {
        let caps = Capabilities {
            max_uniform_buffer_size: 32,
            ..Capabilities::default()
        };
        let mut table = BindingTable::default();
        for i in 0..4 {
            table.add_uniform("object", i, &format!("u{i}"), ValueType::Mat4, ShaderStage::Vertex);
        }
        let err = table.finalize(&caps).unwrap_err();
        assert!(matches!(err, CompileError::BindingOverflow { ref group, .. } if group == "object"));
    }

    #[test]
    fn cross_stage_registration_unions_visibility() {
        let caps = Capabilities::default();
        let mut table = BindingTable::default();
        table.add_uniform("frame", 1, "u0", ValueType::Float, ShaderStage::Vertex);
        table.add_uniform("frame", 1, "u0", ValueType::Float, ShaderStage::Fragment);

        let layout = &table.finalize(&caps).unwrap()[0];
        assert_eq!(layout.members.len(), 1);
        assert_eq!(
            layout.members[0].visibility,
            StageMask::VERTEX | StageMask::FRAGMENT
        );
    }

    #[test]
    fn combined_sampler_strategy_halves_texture_slots() {
        let caps = Capabilities::default();
        let mut table = BindingTable::default();
        table.add_texture("object", 1, "tex0", "smp0", true, ShaderStage::Fragment);
        table.add_texture("object", 2, "tex1", "smp1", true, ShaderStage::Fragment);
        let layouts = table.finalize(&caps).unwrap();

        let separate = describe_bind_groups(&layouts, true);
        assert_eq!(separate[0].bindings.len(), 4);
        let combined = describe_bind_groups(&layouts, false);
        assert_eq!(combined[0].bindings.len(), 2);
        assert_eq!(
            combined[0].bindings[1].kind,
            BindingResourceKind::CombinedTextureSampler
        );
    }
}

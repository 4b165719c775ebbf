use proptest::prelude::*;

use shadegraph::builder::bindings::{describe_bind_groups, BindingTable};
use shadegraph::{Capabilities, ShaderStage, ValueType};

#[derive(Clone, Debug)]
enum Registration {
    Uniform {
        group: &'static str,
        node: u64,
        name: &'static str,
        ty: ValueType,
    },
    Texture {
        group: &'static str,
        node: u64,
        texture: &'static str,
        sampler: &'static str,
    },
}

fn registrations() -> Vec<Registration> {
    use Registration::*;
    vec![
        Uniform { group: "frame", node: 1, name: "time0", ty: ValueType::Float },
        Uniform { group: "render", node: 2, name: "resolution0", ty: ValueType::Vec2 },
        Uniform { group: "object", node: 3, name: "tint0", ty: ValueType::Vec4 },
        Uniform { group: "object", node: 4, name: "roughness0", ty: ValueType::Float },
        Uniform { group: "lighting", node: 5, name: "sun0", ty: ValueType::Vec3 },
        Texture { group: "object", node: 6, texture: "tex0", sampler: "smp0" },
        Texture { group: "lighting", node: 7, texture: "tex1", sampler: "smp1" },
    ]
}

fn build_table(order: &[Registration]) -> BindingTable {
    let mut table = BindingTable::default();
    for reg in order {
        match reg {
            Registration::Uniform { group, node, name, ty } => {
                table.add_uniform(group, *node, name, *ty, ShaderStage::Fragment);
            }
            Registration::Texture { group, node, texture, sampler } => {
                table.add_texture(group, *node, texture, sampler, true, ShaderStage::Fragment);
            }
        }
    }
    table
}

proptest! {
    /// Group indices, member offsets and descriptor slots must not depend on
    /// the traversal order that discovered the bindings.
    #[test]
    fn layouts_are_insertion_order_independent(
        order in Just(registrations()).prop_shuffle()
    ) {
        let caps = Capabilities::default();
        let baseline = build_table(&registrations()).finalize(&caps).unwrap();
        let shuffled = build_table(&order).finalize(&caps).unwrap();

        prop_assert_eq!(baseline.len(), shuffled.len());
        for (a, b) in baseline.iter().zip(&shuffled) {
            prop_assert_eq!(&a.name, &b.name);
            prop_assert_eq!(a.index, b.index);
            prop_assert_eq!(a.buffer_size, b.buffer_size);
            for (ma, mb) in a.members.iter().zip(&b.members) {
                prop_assert_eq!(ma.offset, mb.offset);
            }
        }

        let da = describe_bind_groups(&baseline, true);
        let db = describe_bind_groups(&shuffled, true);
        for (ga, gb) in da.iter().zip(&db) {
            prop_assert_eq!(ga.index, gb.index);
            for (sa, sb) in ga.bindings.iter().zip(&gb.bindings) {
                prop_assert_eq!(&sa.name, &sb.name);
                prop_assert_eq!(sa.binding, sb.binding);
                prop_assert_eq!(sa.kind, sb.kind);
            }
        }
    }
}

#[test]
fn cadence_groups_rank_ahead_of_authored_groups() {
    let caps = Capabilities::default();
    let layouts = build_table(&registrations()).finalize(&caps).unwrap();
    let names: Vec<&str> = layouts.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["frame", "render", "object", "lighting"]);
    for (i, group) in layouts.iter().enumerate() {
        assert_eq!(group.index, i as u32);
    }
}

#[test]
fn uniform_buffer_only_occupies_slot_zero_when_members_exist() {
    let caps = Capabilities::default();
    let mut table = BindingTable::default();
    table.add_texture("object", 1, "tex0", "smp0", true, ShaderStage::Fragment);
    let layouts = table.finalize(&caps).unwrap();

    let groups = describe_bind_groups(&layouts, true);
    // No uniform members: the texture takes slot 0 directly.
    assert_eq!(groups[0].bindings[0].binding, 0);
    assert_eq!(groups[0].bindings[0].name, "tex0");
    assert_eq!(groups[0].bindings[1].name, "smp0");
}

use std::mem::align_of;
use std::sync::Once;

use bytemuck::{Pod, Zeroable};

use archon_ecs::engine::archetype::{Archetype, RecordLayout};
use archon_ecs::engine::component::{
    component_id_of, freeze_components, register_component, Component,
};
use archon_ecs::engine::types::{
    ArchetypeKey, AFFECTIVE_NONE, CHUNK_RECORDS, RECORD_ALIGN, RECORD_HEADER_SIZE,
};

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Tiny(u8);

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Wide(u64);

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Pair {
    x: f32,
    y: f32,
}

impl Component for Tiny {}
impl Component for Wide {}
impl Component for Pair {}

static INIT: Once = Once::new();

fn init_registry() {
    INIT.call_once(|| {
        register_component::<Tiny>().unwrap();
        register_component::<Wide>().unwrap();
        register_component::<Pair>().unwrap();
        freeze_components().unwrap();
    });
}

fn full_key() -> ArchetypeKey {
    ArchetypeKey::from_entries([
        (component_id_of::<Tiny>().unwrap(), AFFECTIVE_NONE),
        (component_id_of::<Wide>().unwrap(), AFFECTIVE_NONE),
        (component_id_of::<Pair>().unwrap(), AFFECTIVE_NONE),
    ])
}

#[test]
fn record_header_is_sixteen_bytes() {
    assert_eq!(RECORD_HEADER_SIZE, 16);
    assert_eq!(RECORD_ALIGN, 8);
}

#[test]
fn layout_places_components_after_header_at_aligned_offsets() {
    init_registry();

    let layout = RecordLayout::for_key(&full_key()).unwrap();

    let tiny = layout.slot_of(component_id_of::<Tiny>().unwrap()).unwrap();
    let wide = layout.slot_of(component_id_of::<Wide>().unwrap()).unwrap();
    let pair = layout.slot_of(component_id_of::<Pair>().unwrap()).unwrap();

    // Every slot lives past the header and is aligned for its type.
    for (slot, align) in [
        (tiny, align_of::<Tiny>()),
        (wide, align_of::<Wide>()),
        (pair, align_of::<Pair>()),
    ] {
        assert!(slot.offset >= RECORD_HEADER_SIZE);
        assert_eq!(slot.offset % align, 0, "misaligned slot {:?}", slot);
    }

    // Slots never overlap: canonical order, strictly increasing offsets.
    let slots = layout.slots();
    for window in slots.windows(2) {
        assert!(window[0].offset + window[0].size <= window[1].offset);
    }

    assert_eq!(layout.record_size() % RECORD_ALIGN, 0);
    assert!(layout.record_size() >= RECORD_HEADER_SIZE);
}

#[test]
fn release_zeroes_record_and_recycles_the_slot() {
    init_registry();

    let mut archetype = Archetype::new(0, full_key()).unwrap();
    let wide_id = component_id_of::<Wide>().unwrap();

    let (chunk, row) = archetype.take_record();
    archetype.occupy_record(chunk, row, 42).unwrap();
    archetype
        .component_bytes_mut(chunk, row, wide_id)
        .unwrap()
        .copy_from_slice(bytemuck::bytes_of(&Wide(0xDEAD_BEEF)));

    assert_eq!(archetype.chunk(chunk).unwrap().entity_bits(row), Some(42));
    assert_eq!(archetype.live(), 1);

    archetype.release_record(chunk, row).unwrap();
    assert_eq!(archetype.live(), 0);

    // The free-list hands the same slot back, fully zeroed.
    let (chunk2, row2) = archetype.take_record();
    assert_eq!((chunk2, row2), (chunk, row));
    assert_eq!(archetype.chunk(chunk2).unwrap().entity_bits(row2), None);
    assert!(archetype
        .component_bytes(chunk2, row2, wide_id)
        .unwrap()
        .iter()
        .all(|&b| b == 0));
}

#[test]
fn take_record_crosses_chunk_boundary() {
    init_registry();

    let key = ArchetypeKey::from_entries([(component_id_of::<Wide>().unwrap(), AFFECTIVE_NONE)]);
    let mut archetype = Archetype::new(1, key).unwrap();

    for i in 0..CHUNK_RECORDS {
        let (chunk, row) = archetype.take_record();
        assert_eq!(chunk, 0);
        assert_eq!(row as usize, i);
    }

    // One past capacity forces a second chunk.
    let (chunk, row) = archetype.take_record();
    assert_eq!(chunk, 1);
    assert_eq!(row, 0);
    assert_eq!(archetype.chunk_count(), 2);
}

#[test]
fn archetype_key_is_order_independent_and_deduplicates() {
    init_registry();

    let tiny = component_id_of::<Tiny>().unwrap();
    let wide = component_id_of::<Wide>().unwrap();

    let forward = ArchetypeKey::from_entries([(tiny, AFFECTIVE_NONE), (wide, AFFECTIVE_NONE)]);
    let backward = ArchetypeKey::from_entries([(wide, AFFECTIVE_NONE), (tiny, AFFECTIVE_NONE)]);
    assert_eq!(forward, backward);

    // Duplicate IDs keep the last supplied affective hash.
    let dup = ArchetypeKey::from_entries([(tiny, 7), (tiny, 9)]);
    assert_eq!(dup.affective_of(tiny), Some(9));
    assert_eq!(dup.entries().len(), 1);
}

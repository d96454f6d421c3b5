use rcimmix::{
    AllocationError, CollectionMode, ObjectReference, RCImmix, RCImmixBuilder, TypeDescriptor,
};

/// Exactly one line.
static LINE_SIZED: TypeDescriptor = TypeDescriptor::with_payload(1, 224);
const OBJECTS_PER_BLOCK: usize = 128;

fn heap(blocks: usize) -> Box<RCImmix> {
    let mut builder = RCImmixBuilder::new_no_env_vars();
    builder.options.heap_size = blocks << 15;
    builder.options.threads = 2;
    builder.build().unwrap()
}

#[test]
fn evacuation_keeps_references_and_contents() {
    let mut h = heap(16);
    assert_eq!(LINE_SIZED.object_size(), 256);
    let all: Vec<ObjectReference> = (0..OBJECTS_PER_BLOCK)
        .map(|_| h.allocate(&LINE_SIZED).unwrap())
        .collect();
    let kept: Vec<ObjectReference> = all.iter().step_by(40).copied().collect();
    for (i, o) in kept.iter().enumerate() {
        h.add_root(*o).unwrap();
        h.payload_mut(*o).unwrap().fill(i as u8 + 1);
    }
    for pair in kept.windows(2) {
        h.write_reference(pair[0], 0, Some(pair[1])).unwrap();
    }
    h.collect(0, 1);
    assert_eq!(h.heap_stats().live_objects, kept.len());
    assert_eq!(h.heap_stats().reusable_blocks, 1);

    let before: Vec<_> = kept.iter().map(|o| h.object_address(*o).unwrap()).collect();
    h.collect(CollectionMode::EVACUATE.bits(), 2);
    let stats = h.last_collection_stats().unwrap().clone();
    assert!(stats.defragmented);
    assert_eq!(stats.evacuation_candidates, 1);
    assert_eq!(stats.objects_evacuated, kept.len());
    assert_eq!(stats.evacuation_failures, 0);
    assert_eq!(stats.blocks_released, 1);

    for (i, o) in kept.iter().enumerate() {
        assert!(h.is_live(*o));
        assert_ne!(h.object_address(*o).unwrap(), before[i]);
        assert!(h.payload(*o).unwrap().iter().all(|b| *b == i as u8 + 1));
        assert_eq!(h.type_descriptor(*o).unwrap(), &LINE_SIZED);
    }
    for pair in kept.windows(2) {
        assert_eq!(h.read_reference(pair[0], 0), Ok(Some(pair[1])));
    }
    h.verify_reference_counts().unwrap();
}

#[test]
fn defrag_stress_evacuates_every_collection() {
    let mut builder = RCImmixBuilder::new_no_env_vars();
    builder.options.heap_size = 32 << 15;
    assert!(builder.set_option("defrag_stress", "true"));
    let mut h = builder.build().unwrap();

    let root = h.allocate(&LINE_SIZED).unwrap();
    h.add_root(root).unwrap();
    for _ in 0..OBJECTS_PER_BLOCK * 2 {
        h.allocate(&LINE_SIZED).unwrap();
    }
    h.collect(0, 0);
    for _ in 0..4 {
        let before = h.object_address(root).unwrap();
        h.collect(0, 0);
        let stats = h.last_collection_stats().unwrap();
        assert!(stats.defragmented);
        assert_eq!(stats.objects_evacuated, 1);
        assert_ne!(h.object_address(root).unwrap(), before);
    }
    assert_eq!(h.heap_stats().live_objects, 1);
}

#[test]
fn out_of_memory_after_an_emergency_collection() {
    let mut h = heap(2);
    let mut rooted = vec![];
    let err = loop {
        match h.allocate(&LINE_SIZED) {
            Ok(o) => {
                h.add_root(o).unwrap();
                rooted.push(o);
            }
            Err(e) => break e,
        }
    };
    assert_eq!(err, AllocationError::OutOfMemory);
    assert_eq!(rooted.len(), 2 * OBJECTS_PER_BLOCK);
    let stats = h.last_collection_stats().unwrap();
    assert!(stats.emergency);
    h.verify_reference_counts().unwrap();

    // Release half of the objects and allocation works again.
    for o in rooted.drain(..OBJECTS_PER_BLOCK) {
        assert!(h.remove_root(o));
    }
    h.collect(0, 0);
    assert_eq!(h.heap_stats().live_objects, OBJECTS_PER_BLOCK);
    assert!(h.allocate(&LINE_SIZED).is_ok());
    assert!(rooted.iter().all(|o| h.is_live(*o)));
}

#[test]
fn emergency_collection_keeps_unrooted_new_objects() {
    let mut h = heap(2);
    let mut fresh = vec![];
    for _ in 0..OBJECTS_PER_BLOCK {
        let o = h.allocate(&LINE_SIZED).unwrap();
        h.add_root(o).unwrap();
    }
    // The second block fills up with objects the mutator still holds but has not rooted.
    for _ in 0..OBJECTS_PER_BLOCK {
        fresh.push(h.allocate(&LINE_SIZED).unwrap());
    }
    assert_eq!(h.allocate(&LINE_SIZED), Err(AllocationError::OutOfMemory));
    assert!(fresh.iter().all(|o| h.is_live(*o)));

    // They die at the next regular collection.
    h.collect(0, 0);
    assert!(fresh.iter().all(|o| !h.is_live(*o)));
    assert!(h.allocate(&LINE_SIZED).is_ok());
}

#[test]
fn objects_larger_than_a_block_are_rejected() {
    static HUGE: TypeDescriptor = TypeDescriptor::with_payload(0, 40 * 1024);
    let mut h = heap(4);
    assert!(matches!(
        h.allocate(&HUGE),
        Err(AllocationError::ObjectTooLarge { .. })
    ));
    assert_eq!(h.heap_stats().collections, 0);
}

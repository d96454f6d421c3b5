use rcimmix::memory_manager;
use rcimmix::{AccessError, RCImmix, RCImmixBuilder, TypeDescriptor};

static PAIR: TypeDescriptor = TypeDescriptor::with_payload(2, 0);
static LEAF: TypeDescriptor = TypeDescriptor::with_payload(0, 8);

static SHAPES: [TypeDescriptor; 5] = [
    TypeDescriptor::with_payload(0, 8),
    TypeDescriptor::with_payload(1, 8),
    TypeDescriptor::with_payload(2, 0),
    TypeDescriptor::with_payload(3, 5),
    TypeDescriptor::with_payload(4, 16),
];

fn heap(blocks: usize) -> Box<RCImmix> {
    let mut builder = RCImmixBuilder::new_no_env_vars();
    assert!(builder.set_option("heap_size", &(blocks << 15).to_string()));
    memory_manager::create_with_builder(&builder).unwrap()
}

#[test]
fn composite_object_scenario() {
    let mut h = heap(16);
    let c = memory_manager::allocate(&mut h, &PAIR).unwrap();
    memory_manager::add_root(&mut h, c).unwrap();
    let a = memory_manager::allocate(&mut h, &LEAF).unwrap();
    let b = memory_manager::allocate(&mut h, &LEAF).unwrap();
    memory_manager::write_reference(&mut h, c, 0, Some(a)).unwrap();
    memory_manager::write_reference(&mut h, c, 1, Some(b)).unwrap();
    memory_manager::write_barrier(&mut h, c);
    memory_manager::collect(&mut h, 0, 0);

    for o in [a, b, c] {
        assert!(h.is_live(o));
        assert_eq!(h.reference_count(o), Ok(1));
    }
    h.verify_reference_counts().unwrap();

    let d = memory_manager::allocate(&mut h, &LEAF).unwrap();
    let e = memory_manager::allocate(&mut h, &LEAF).unwrap();
    memory_manager::write_reference(&mut h, c, 0, Some(d)).unwrap();
    memory_manager::write_reference(&mut h, c, 1, Some(e)).unwrap();
    memory_manager::write_barrier(&mut h, c);
    memory_manager::collect(&mut h, 0, 0);

    assert!(!h.is_live(a));
    assert!(!h.is_live(b));
    for o in [c, d, e] {
        assert!(h.is_live(o));
    }
    assert_eq!(memory_manager::read_reference(&h, c, 0), Ok(Some(d)));
    assert_eq!(memory_manager::read_reference(&h, c, 1), Ok(Some(e)));
    assert_eq!(h.heap_stats().live_objects, 3);
    h.verify_reference_counts().unwrap();
    memory_manager::destroy(h);
}

#[test]
fn objects_expose_exactly_their_slots() {
    let mut h = heap(4);
    for (k, shape) in SHAPES.iter().enumerate() {
        let o = h.allocate(shape).unwrap();
        for slot in 0..k {
            assert_eq!(h.read_reference(o, slot), Ok(None));
            h.write_reference(o, slot, Some(o)).unwrap();
            assert_eq!(h.read_reference(o, slot), Ok(Some(o)));
        }
        assert_eq!(
            h.write_reference(o, k, None),
            Err(AccessError::SlotOutOfBounds { slot: k, count: k })
        );
        assert_eq!(
            h.read_reference(o, k),
            Err(AccessError::SlotOutOfBounds { slot: k, count: k })
        );
    }
}

#[test]
fn reclaimed_memory_is_reused() {
    let mut h = heap(4);
    let garbage = h.allocate(&LEAF).unwrap();
    let addr = h.object_address(garbage).unwrap();
    h.collect(0, 1);
    assert!(!h.is_live(garbage));
    assert_eq!(h.last_collection_stats().unwrap().blocks_released, 1);

    let fresh = h.allocate(&PAIR).unwrap();
    assert_eq!(h.object_address(fresh), Ok(addr));
    assert_ne!(fresh, garbage);
    assert_eq!(h.object_address(garbage), Err(AccessError::DeadObject));
}

#[test]
fn reachable_objects_do_not_change() {
    let mut h = heap(64);
    let root = h.allocate(&PAIR).unwrap();
    h.add_root(root).unwrap();
    let mid = h.allocate(&PAIR).unwrap();
    let leaf = h.allocate(&LEAF).unwrap();
    h.write_reference(root, 0, Some(mid)).unwrap();
    h.write_reference(mid, 1, Some(leaf)).unwrap();
    h.payload_mut(leaf).unwrap().copy_from_slice(b"rcimmix!");

    let addresses: Vec<_> = [root, mid, leaf]
        .iter()
        .map(|o| h.object_address(*o).unwrap())
        .collect();
    for _ in 0..5 {
        h.collect(0, 0);
        let now: Vec<_> = [root, mid, leaf]
            .iter()
            .map(|o| h.object_address(*o).unwrap())
            .collect();
        assert_eq!(now, addresses);
        assert_eq!(h.read_reference(root, 0), Ok(Some(mid)));
        assert_eq!(h.read_reference(root, 1), Ok(None));
        assert_eq!(h.read_reference(mid, 1), Ok(Some(leaf)));
        assert_eq!(h.payload(leaf).unwrap(), b"rcimmix!");
        h.verify_reference_counts().unwrap();
    }
}

#[test]
fn dropping_the_last_reference_reclaims_a_chain() {
    let mut h = heap(16);
    let root = h.allocate(&PAIR).unwrap();
    h.add_root(root).unwrap();
    let mut chain = vec![];
    let mut prev = root;
    for _ in 0..100 {
        let next = h.allocate(&PAIR).unwrap();
        h.write_reference(prev, 0, Some(next)).unwrap();
        chain.push(next);
        prev = next;
    }
    h.collect(0, 0);
    assert_eq!(h.heap_stats().live_objects, 101);

    h.write_reference(root, 0, None).unwrap();
    h.write_barrier(root);
    h.collect(0, 0);
    assert!(chain.iter().all(|o| !h.is_live(*o)));
    assert_eq!(h.heap_stats().live_objects, 1);
    assert_eq!(h.last_collection_stats().unwrap().objects_reclaimed, 100);
}

#[test]
fn roots_are_counted_per_registration() {
    let mut h = heap(4);
    let o = h.allocate(&LEAF).unwrap();
    h.add_root(o).unwrap();
    h.add_root(o).unwrap();
    h.collect(0, 0);
    assert_eq!(h.reference_count(o), Ok(2));
    assert!(h.remove_root(o));
    h.collect(0, 0);
    assert_eq!(h.reference_count(o), Ok(1));
    assert!(h.remove_root(o));
    assert!(!h.remove_root(o));
    h.collect(0, 0);
    assert!(!h.is_live(o));
}

#[test]
fn handles_are_independent() {
    let mut first = heap(8);
    let mut second = heap(8);
    let kept = second.allocate(&LEAF).unwrap();
    second.add_root(kept).unwrap();
    let lost = first.allocate(&LEAF).unwrap();
    first.collect(0, 0);
    assert!(!first.is_live(lost));
    assert!(second.is_live(kept));
    assert_eq!(second.heap_stats().collections, 0);
    memory_manager::destroy(first);

    let third = heap(8);
    let stats = third.heap_stats();
    assert_eq!(stats.live_objects, 0);
    assert_eq!(stats.collections, 0);
    assert_eq!(stats.free_blocks, 8);
    assert!(third.last_collection_stats().is_none());
    assert!(second.is_live(kept));
}

#[test]
fn references_do_not_cross_handles() {
    let mut a = heap(8);
    let mut b = heap(8);
    let ra = a.allocate(&PAIR).unwrap();
    let rb = b.allocate(&PAIR).unwrap();
    // Both heaps handed out their first table entry.
    assert!(!b.is_live(ra));
    assert!(!a.is_live(rb));
    assert_eq!(b.reference_count(ra), Err(AccessError::DeadObject));
    assert_eq!(b.read_reference(ra, 0), Err(AccessError::DeadObject));
    assert_eq!(b.write_reference(ra, 0, None), Err(AccessError::DeadObject));
    assert_eq!(
        b.write_reference(rb, 0, Some(ra)),
        Err(AccessError::DeadObject)
    );
    assert_eq!(b.add_root(ra), Err(AccessError::DeadObject));
    assert!(!b.remove_root(ra));
    b.write_barrier(ra);

    assert_eq!(b.read_reference(rb, 0), Ok(None));
    assert_eq!(b.reference_count(rb), Ok(1));
    assert_eq!(a.reference_count(ra), Ok(1));
}

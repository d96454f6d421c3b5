use rcimmix::{CollectionMode, RCImmix, RCImmixBuilder, TypeDescriptor};

static NODE: TypeDescriptor = TypeDescriptor::with_payload(2, 0);

fn heap(cycle_collect_threshold: usize) -> Box<RCImmix> {
    let mut builder = RCImmixBuilder::new_no_env_vars();
    builder.options.heap_size = 16 << 15;
    builder.options.cycle_collect_threshold = cycle_collect_threshold;
    builder.build().unwrap()
}

#[test]
fn unreachable_cycle_is_reclaimed() {
    let mut h = heap(1);
    let a = h.allocate(&NODE).unwrap();
    let b = h.allocate(&NODE).unwrap();
    h.write_reference(a, 0, Some(b)).unwrap();
    h.write_reference(b, 0, Some(a)).unwrap();
    h.collect(0, 0);
    assert!(!h.is_live(a));
    assert!(!h.is_live(b));
    let stats = h.last_collection_stats().unwrap();
    assert!(stats.cycle_collected);
    assert_eq!(stats.objects_reclaimed, 0);
    assert_eq!(stats.cycle_objects_reclaimed, 2);
}

#[test]
fn rooted_cycle_survives_until_unrooted() {
    let mut h = heap(1);
    let a = h.allocate(&NODE).unwrap();
    let b = h.allocate(&NODE).unwrap();
    let tail = h.allocate(&NODE).unwrap();
    h.add_root(a).unwrap();
    h.write_reference(a, 0, Some(b)).unwrap();
    h.write_reference(b, 0, Some(a)).unwrap();
    h.write_reference(b, 1, Some(tail)).unwrap();
    for _ in 0..3 {
        h.collect(0, 0);
        assert!(h.is_live(a) && h.is_live(b) && h.is_live(tail));
        assert_eq!(h.reference_count(a), Ok(2));
        assert_eq!(h.reference_count(b), Ok(1));
        assert_eq!(h.reference_count(tail), Ok(1));
        h.verify_reference_counts().unwrap();
    }

    assert!(h.remove_root(a));
    h.collect(0, 0);
    assert!(!h.is_live(a));
    assert!(!h.is_live(b));
    assert!(!h.is_live(tail));
    assert_eq!(h.heap_stats().live_objects, 0);
}

#[test]
fn cycle_hanging_off_a_live_object_is_kept() {
    let mut h = heap(1);
    let holder = h.allocate(&NODE).unwrap();
    h.add_root(holder).unwrap();
    let a = h.allocate(&NODE).unwrap();
    let b = h.allocate(&NODE).unwrap();
    h.write_reference(a, 0, Some(b)).unwrap();
    h.write_reference(b, 0, Some(a)).unwrap();
    h.write_reference(holder, 0, Some(a)).unwrap();
    h.collect(0, 0);
    assert!(h.is_live(a) && h.is_live(b));

    h.write_reference(holder, 0, None).unwrap();
    h.write_barrier(holder);
    h.collect(0, 0);
    assert!(!h.is_live(a) && !h.is_live(b));
    assert!(h.is_live(holder));
    h.verify_reference_counts().unwrap();
}

#[test]
fn cycle_collection_can_be_deferred_to_an_explicit_request() {
    let mut h = heap(0);
    let a = h.allocate(&NODE).unwrap();
    let b = h.allocate(&NODE).unwrap();
    let c = h.allocate(&NODE).unwrap();
    h.write_reference(a, 0, Some(b)).unwrap();
    h.write_reference(b, 0, Some(c)).unwrap();
    h.write_reference(c, 0, Some(a)).unwrap();
    h.collect(0, 0);
    assert!(h.is_live(a) && h.is_live(b) && h.is_live(c));
    assert!(!h.last_collection_stats().unwrap().cycle_collected);

    h.collect(CollectionMode::CYCLE_COLLECT.bits(), 0);
    assert!(!h.is_live(a) && !h.is_live(b) && !h.is_live(c));
    assert_eq!(
        h.last_collection_stats().unwrap().cycle_objects_reclaimed,
        3
    );
}

#[test]
fn self_loop_is_reclaimed() {
    let mut h = heap(1);
    let a = h.allocate(&NODE).unwrap();
    h.write_reference(a, 0, Some(a)).unwrap();
    h.write_reference(a, 1, Some(a)).unwrap();
    h.collect(0, 0);
    assert!(!h.is_live(a));
}

#[test]
fn idle_collection_does_not_trace() {
    let mut h = heap(1);
    let head = h.allocate(&NODE).unwrap();
    h.add_root(head).unwrap();
    h.add_root(head).unwrap();
    let mut tail = head;
    for _ in 0..1000 {
        let next = h.allocate(&NODE).unwrap();
        h.write_reference(tail, 0, Some(next)).unwrap();
        tail = next;
    }
    h.collect(0, 0);
    assert_eq!(h.heap_stats().live_objects, 1001);

    for _ in 0..3 {
        h.collect(0, 0);
        let stats = h.last_collection_stats().unwrap();
        assert!(!stats.cycle_collected);
        assert_eq!(stats.increments, 0);
        assert_eq!(stats.decrements, 0);
    }
    assert_eq!(h.reference_count(head), Ok(2));

    // Dropping one of two registrations is a single decrement.
    assert!(h.remove_root(head));
    h.collect(0, 0);
    let stats = h.last_collection_stats().unwrap();
    assert_eq!(stats.decrements, 1);
    assert_eq!(stats.increments, 0);
    assert_eq!(h.reference_count(head), Ok(1));
    assert_eq!(h.heap_stats().live_objects, 1001);
    h.verify_reference_counts().unwrap();
}

//! Random mutation of an object graph, checking after every collection that everything reachable
//! is alive and every count matches the heap.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rcimmix::{CollectionMode, ObjectReference, RCImmix, RCImmixBuilder, TypeDescriptor};
use std::collections::HashSet;

static SHAPES: [TypeDescriptor; 4] = [
    TypeDescriptor::with_payload(1, 0),
    TypeDescriptor::with_payload(2, 8),
    TypeDescriptor::with_payload(3, 40),
    TypeDescriptor::with_payload(4, 300),
];

fn reachable(h: &RCImmix, roots: &[ObjectReference]) -> Vec<ObjectReference> {
    let mut seen: HashSet<ObjectReference> = HashSet::new();
    let mut stack: Vec<ObjectReference> = roots.to_vec();
    let mut order = vec![];
    while let Some(o) = stack.pop() {
        if !seen.insert(o) {
            continue;
        }
        assert!(h.is_live(o), "{:?} is reachable but dead", o);
        order.push(o);
        let slots = h.type_descriptor(o).unwrap().reference_field_count();
        for slot in 0..slots {
            if let Some(child) = h.read_reference(o, slot).unwrap() {
                stack.push(child);
            }
        }
    }
    order
}

fn run(seed: u64, heap_blocks: usize, steps: usize) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut builder = RCImmixBuilder::new_no_env_vars();
    builder.options.heap_size = heap_blocks << 15;
    builder.options.threads = 4;
    builder.options.parallel_sweep_min_blocks = 4;
    let mut h = builder.build().unwrap();

    let mut roots: Vec<ObjectReference> = vec![];
    // Objects the mutator may touch: everything reachable at the last check, plus new objects.
    let mut known: Vec<ObjectReference> = vec![];

    for step in 0..steps {
        match rng.random_range(0..10) {
            0..=3 => {
                let shape = &SHAPES[rng.random_range(0..SHAPES.len())];
                let collections = h.heap_stats().collections;
                let o = h.allocate(shape).unwrap();
                if h.heap_stats().collections != collections {
                    // An emergency collection may have reclaimed unreachable objects we knew.
                    known = reachable(&h, &roots);
                }
                if roots.is_empty() || rng.random_bool(0.2) {
                    h.add_root(o).unwrap();
                    roots.push(o);
                }
                if !known.is_empty() {
                    let holder = known[rng.random_range(0..known.len())];
                    let slots = h.type_descriptor(holder).unwrap().reference_field_count();
                    h.write_reference(holder, rng.random_range(0..slots), Some(o))
                        .unwrap();
                    h.write_barrier(holder);
                }
                known.push(o);
            }
            4..=6 if !known.is_empty() => {
                let holder = known[rng.random_range(0..known.len())];
                let value = if rng.random_bool(0.3) {
                    None
                } else {
                    Some(known[rng.random_range(0..known.len())])
                };
                let slots = h.type_descriptor(holder).unwrap().reference_field_count();
                h.write_reference(holder, rng.random_range(0..slots), value)
                    .unwrap();
                // Sometimes rely on the collector forgiving a missing barrier.
                if rng.random_bool(0.9) {
                    h.write_barrier(holder);
                }
            }
            7 if roots.len() > 1 => {
                let i = rng.random_range(0..roots.len());
                let r = roots.swap_remove(i);
                assert!(h.remove_root(r));
            }
            _ => {}
        }

        if step % 97 == 96 {
            let mode = rng.random_range(0..4u32);
            let workers = rng.random_range(0..5u32);
            h.collect(mode, workers);
            h.verify_reference_counts()
                .unwrap_or_else(|e| panic!("seed {} step {}: {}", seed, step, e));
            known = reachable(&h, &roots);
        }
    }

    for r in roots.drain(..) {
        assert!(h.remove_root(r));
    }
    h.collect(
        (CollectionMode::CYCLE_COLLECT | CollectionMode::EVACUATE).bits(),
        0,
    );
    assert_eq!(h.heap_stats().live_objects, 0);
}

#[test]
fn random_graphs() {
    for seed in 0..8 {
        run(seed, 256, 3000);
    }
}

#[test]
fn random_graphs_in_a_tight_heap() {
    run(42, 24, 3000);
}

//! Concurrency tests for the value verbs.
//!
//! These exercise the lock protocol across real threads: writers
//! blocking readers, readers blocking writers, deletion stickiness,
//! and stale-descriptor detection.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use rand::Rng;

use opal_common::types::Generation;
use opal_common::StoreConfig;
use opal_storage::slab::{
    BlockAllocator, BlockPool, PutStatus, ReadView, SyncRecycleAllocator, ThreadContext, ValueOps,
    ValueSerializer, ValueStatus, WriteView,
};

/// Serializes three u32s at offsets 0, 4, 8.
struct TripleSerializer;

impl ValueSerializer<[u32; 3]> for TripleSerializer {
    fn serialized_size(&self, _value: &[u32; 3]) -> usize {
        12
    }

    fn serialize(&self, value: &[u32; 3], target: &mut WriteView<'_>) {
        for (i, v) in value.iter().enumerate() {
            target.put_u32(i * 4, *v);
        }
    }

    fn deserialize(&self, source: &ReadView<'_>) -> [u32; 3] {
        [source.get_u32(0), source.get_u32(4), source.get_u32(8)]
    }
}

struct Fixture {
    pool: Arc<BlockPool>,
    ops: Arc<ValueOps>,
    ctx: ThreadContext,
}

/// Builds a 128-byte store with one 12-byte value slice, the setup
/// every scenario in this file starts from.
fn fixture() -> Fixture {
    let pool = Arc::new(BlockPool::new(StoreConfig::new(128).with_max_blocks(1)).unwrap());
    let values = Arc::new(SyncRecycleAllocator::new(Arc::clone(&pool)));
    let ops = Arc::new(ValueOps::new(Arc::clone(&values)));

    let mut ctx = ThreadContext::new();
    values.allocate(&mut ctx.value, 12, true).unwrap();

    Fixture { pool, ops, ctx }
}

fn write_triple(ops: &ValueOps, fixture_slice: &opal_storage::slab::Slice, values: [u32; 3]) {
    assert!(ops
        .put(fixture_slice, &values, &TripleSerializer)
        .unwrap()
        .is_done());
}

#[test]
fn transform_sums_three_ints() {
    let Fixture { ops, ctx, .. } = fixture();
    write_triple(&ops, &ctx.value, [10, 20, 30]);

    let result = ops
        .read(&ctx.value, |view| {
            view.get_u32(0) + view.get_u32(4) + view.get_u32(8)
        })
        .unwrap();
    assert_eq!(result.status, ValueStatus::Done);
    assert_eq!(result.value, Some(60));
}

#[test]
fn transform_out_of_bounds_leaves_header_free() {
    let Fixture { pool, ops, ctx } = fixture();

    for offset in [12usize, usize::MAX - 2] {
        let ops = Arc::clone(&ops);
        let slice = ctx.value.duplicate();
        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _ = ops.read(&slice, |view| view.get_u32(offset));
        }));
        assert!(panicked.is_err(), "offset {offset} must panic");
    }

    // The unwinds released their read acquisitions: a writer can lock.
    assert!(ctx.value.lock_write(&pool).unwrap().is_done());
    ctx.value.unlock_write(&pool).unwrap();
}

#[test]
fn write_locked_slice_blocks_transform() {
    let Fixture { pool, ops, ctx } = fixture();
    let expected: u32 = rand::thread_rng().gen();
    write_triple(&ops, &ctx.value, [0, expected, 0]);

    assert!(ctx.value.lock_write(&pool).unwrap().is_done());

    let barrier = Arc::new(Barrier::new(2));
    let transformer = {
        let ops = Arc::clone(&ops);
        let slice = ctx.value.duplicate();
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            let result = ops.read(&slice, |view| view.get_u32(4)).unwrap();
            assert_eq!(result.status, ValueStatus::Done);
            assert_eq!(result.value, Some(expected));
        })
    };

    barrier.wait();
    // The transformer spins against WRITE for the whole hold time.
    thread::sleep(Duration::from_secs(2));
    assert!(!transformer.is_finished());

    ctx.value.unlock_write(&pool).unwrap();
    transformer.join().unwrap();
}

#[test]
fn delete_is_sticky_within_generation() {
    let Fixture { ops, ctx, .. } = fixture();
    write_triple(&ops, &ctx.value, [1, 2, 3]);

    assert_eq!(ops.delete(&ctx.value).unwrap(), ValueStatus::Done);

    let transform = ops.read(&ctx.value, |view| view.get_u32(0)).unwrap();
    assert_eq!(transform.status, ValueStatus::Deleted);
    assert_eq!(
        ops.put(&ctx.value, &[9, 9, 9], &TripleSerializer).unwrap(),
        PutStatus::Deleted
    );
    assert_eq!(
        ops.compute(&ctx.value, |view| view.put_u32(0, 1)).unwrap(),
        ValueStatus::Deleted
    );
    assert_eq!(ops.delete(&ctx.value).unwrap(), ValueStatus::Deleted);
}

#[test]
fn generation_mismatch_yields_retry() {
    let Fixture { ops, mut ctx, .. } = fixture();
    write_triple(&ops, &ctx.value, [1, 2, 3]);

    ctx.value.associate_allocation(Generation::new(2));

    let transform = ops.read(&ctx.value, |view| view.get_u32(0)).unwrap();
    assert_eq!(transform.status, ValueStatus::Retry);
    assert_eq!(
        ops.put(&ctx.value, &[9, 9, 9], &TripleSerializer).unwrap(),
        PutStatus::Retry
    );
    assert_eq!(
        ops.compute(&ctx.value, |view| view.put_u32(0, 1)).unwrap(),
        ValueStatus::Retry
    );
}

#[test]
fn reader_blocks_writer() {
    let Fixture { pool, ops, ctx } = fixture();
    write_triple(&ops, &ctx.value, [1, 2, 3]);

    let mut rng = rand::thread_rng();
    let new_values: [u32; 3] = [rng.gen(), rng.gen(), rng.gen()];

    assert!(ctx.value.lock_read(&pool).unwrap().is_done());

    let barrier = Arc::new(Barrier::new(2));
    let putter = {
        let ops = Arc::clone(&ops);
        let slice = ctx.value.duplicate();
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            assert!(ops.put(&slice, &new_values, &TripleSerializer).unwrap().is_done());
        })
    };

    barrier.wait();
    thread::sleep(Duration::from_secs(2));

    // While we hold READ, the putter cannot have written.
    let observed = ops
        .read(&ctx.value, |view| {
            [view.get_u32(0), view.get_u32(4), view.get_u32(8)]
        })
        .unwrap();
    assert_eq!(observed.value, Some([1, 2, 3]));

    ctx.value.unlock_read(&pool).unwrap();
    putter.join().unwrap();

    let after = ops
        .read(&ctx.value, |view| {
            [view.get_u32(0), view.get_u32(4), view.get_u32(8)]
        })
        .unwrap();
    assert_eq!(after.value, Some(new_values));
}

#[test]
fn concurrent_transforms_observe_one_snapshot() {
    let Fixture { ops, ctx, .. } = fixture();
    write_triple(&ops, &ctx.value, [10, 14, 18]);

    let parties = 4;
    let barrier = Arc::new(Barrier::new(parties));
    let mut handles = vec![];
    for _ in 0..parties {
        let ops = Arc::clone(&ops);
        let slice = ctx.value.duplicate();
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            let index = rand::thread_rng().gen_range(0..3) * 4;
            let result = ops.read(&slice, |view| view.get_u32(index)).unwrap();
            assert_eq!(result.status, ValueStatus::Done);
            assert_eq!(result.value, Some(10 + index as u32));
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn logical_delete_without_lock_is_sticky() {
    let Fixture { pool, ops, ctx } = fixture();

    assert!(ctx.value.logical_delete(&pool).unwrap().is_done());

    let transform = ops.read(&ctx.value, |view| view.get_u32(0)).unwrap();
    assert_eq!(transform.status, ValueStatus::Deleted);
    // Idempotent through the raw protocol as well.
    assert_eq!(
        ctx.value.logical_delete(&pool).unwrap(),
        ValueStatus::Deleted
    );
}

#[test]
fn put_too_large_reports_required_size() {
    let Fixture { ops, ctx, .. } = fixture();

    struct Oversize;
    impl ValueSerializer<u64> for Oversize {
        fn serialized_size(&self, _value: &u64) -> usize {
            64
        }
        fn serialize(&self, _value: &u64, _target: &mut WriteView<'_>) {
            unreachable!("serialize must not run when the value does not fit");
        }
        fn deserialize(&self, source: &ReadView<'_>) -> u64 {
            source.get_u64(0)
        }
    }

    assert_eq!(
        ops.put(&ctx.value, &7u64, &Oversize).unwrap(),
        PutStatus::NeedsRelocation { required: 64 }
    );

    // The slice is terminally moved: the caller must re-publish.
    let transform = ops.read(&ctx.value, |view| view.get_u32(0)).unwrap();
    assert_eq!(transform.status, ValueStatus::Retry);
}

use arena_hashset::{make_pool_allocator, Allocator, Block, StackAllocator, SystemAllocator, UniqueBlock};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;

const OPS: usize = 10_000;

fn bench_stack_bump(c: &mut Criterion) {
    let owner = UniqueBlock::<SystemAllocator>::new(OPS * 64).expect("bench block");
    c.bench_function("alloc::stack_bump_10k", |b| {
        b.iter(|| {
            let mut a = unsafe { StackAllocator::new(owner.get()) };
            for i in 0..OPS {
                black_box(a.alloc(1 + i % 48).unwrap());
            }
        })
    });
}

fn bench_pool_churn(c: &mut Criterion) {
    let mut sys = SystemAllocator::new();
    let (block, mut pool) = make_pool_allocator(&mut sys, 32, 32, OPS).expect("bench pool");
    c.bench_function("alloc::pool_churn_10k", |b| {
        b.iter(|| {
            let blocks: Vec<Block> = (0..OPS).map(|_| pool.alloc(32).unwrap()).collect();
            for blk in blocks.into_iter().rev() {
                unsafe { pool.free(blk) };
            }
        })
    });
    drop(pool);
    unsafe { sys.free(block) };
}

fn bench_system_churn(c: &mut Criterion) {
    let mut sys = SystemAllocator::new();
    c.bench_function("alloc::system_churn_10k", |b| {
        b.iter(|| {
            let blocks: Vec<Block> = (0..OPS).map(|_| sys.alloc(32).unwrap()).collect();
            for blk in blocks {
                unsafe { sys.free(blk) };
            }
        })
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(20)
        .measurement_time(Duration::from_secs(3))
        .warm_up_time(Duration::from_secs(1))
}

criterion_group! {
    name = benches;
    config = bench_config();
    targets = bench_stack_bump, bench_pool_churn, bench_system_churn
}
criterion_main!(benches);

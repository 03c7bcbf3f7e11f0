//! Operation-set throughput on the functional engine.
//!
//! Ops: stream load, indirect gather, indirect RMW, range loop
//! Tile sizes: 1K, 4K, 16K elements
//! Report: element throughput per issued operation

use criterion::{
    black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use maa_kernels::{
    AluOp, Maa, MaaConfig, Mask, RangeLoop, Region, StreamBounds,
};

const TILE_SIZES: &[usize] = &[1024, 4096, 16384];

fn size_label(n: usize) -> String {
    match n {
        1024 => "1K".into(),
        4096 => "4K".into(),
        16384 => "16K".into(),
        _ => format!("{n}"),
    }
}

fn harness(tile_size: usize) -> Maa {
    Maa::new(MaaConfig {
        tile_size,
        ..MaaConfig::default()
    })
    .unwrap()
}

fn bench_stream_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_load");
    for &n in TILE_SIZES {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size_label(n)), &n, |b, &n| {
            let maa = harness(n);
            let mut ctx = maa.context();
            let data = Region::from_slice(&(0..n as i32).collect::<Vec<_>>());
            let bounds = StreamBounds {
                min: ctx.new_reg(0),
                max: ctx.new_reg(n as i32),
                stride: ctx.new_reg(1),
            };
            let t = ctx.new_tile::<i32>();
            b.iter(|| {
                ctx.stream_load(&data, bounds, t, Mask::NONE);
                ctx.wait_ready(t);
                black_box(ctx.tile(t)[0]);
            });
        });
    }
    group.finish();
}

fn bench_indirect_gather(c: &mut Criterion) {
    let mut group = c.benchmark_group("indirect_load");
    for &n in TILE_SIZES {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size_label(n)), &n, |b, &n| {
            let maa = harness(n);
            let mut ctx = maa.context();
            let mut rng = StdRng::seed_from_u64(7);
            let data = Region::from_slice(&(0..n as i32).collect::<Vec<_>>());
            let idx = ctx.new_tile::<i32>();
            for lane in ctx.tile_mut(idx).iter_mut() {
                *lane = rng.gen_range(0..n as i32);
            }
            ctx.set_tile_size(idx, n);
            let t = ctx.new_tile::<i32>();
            b.iter(|| {
                ctx.indirect_load(&data, idx, t, Mask::NONE);
                ctx.wait_ready(t);
                black_box(ctx.tile(t)[0]);
            });
        });
    }
    group.finish();
}

fn bench_indirect_rmw(c: &mut Criterion) {
    let mut group = c.benchmark_group("indirect_rmw_add");
    for &n in TILE_SIZES {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size_label(n)), &n, |b, &n| {
            let maa = harness(n);
            let mut ctx = maa.context();
            let mut rng = StdRng::seed_from_u64(7);
            let hist = Region::from_elem(0i32, 1024);
            let idx = ctx.new_tile::<i32>();
            for lane in ctx.tile_mut(idx).iter_mut() {
                *lane = rng.gen_range(0..1024);
            }
            ctx.set_tile_size(idx, n);
            let one = ctx.new_reg(1i32);
            b.iter(|| {
                ctx.indirect_rmw_scalar(&hist, idx, one, AluOp::Add, Mask::NONE, None);
                black_box(hist.get(0));
            });
        });
    }
    group.finish();
}

fn bench_range_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_loop");
    for &n in TILE_SIZES {
        // 64 rows of n/64 inner iterations, n pairs total.
        let rows = 64usize;
        let row_len = (n / rows) as i32;
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size_label(n)), &n, |b, _| {
            let maa = harness(n);
            let mut ctx = maa.context();
            let lo = ctx.new_tile::<i32>();
            let hi = ctx.new_tile::<i32>();
            for (r, lane) in ctx.tile_mut(lo).iter_mut().enumerate().take(rows) {
                *lane = r as i32 * row_len;
            }
            ctx.set_tile_size(lo, rows);
            for (r, lane) in ctx.tile_mut(hi).iter_mut().enumerate().take(rows) {
                *lane = (r as i32 + 1) * row_len;
            }
            ctx.set_tile_size(hi, rows);
            let stride = ctx.new_reg(1i32);
            let outer = ctx.new_tile::<i32>();
            let inner = ctx.new_tile::<i32>();
            let mut rl = RangeLoop::new(&mut ctx, lo, hi, stride, outer, inner, Mask::NONE);
            b.iter(|| {
                rl.rewind(&mut ctx);
                while rl.next_batch(&mut ctx).is_some() {}
                black_box(ctx.tile(inner).len());
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_stream_load,
    bench_indirect_gather,
    bench_indirect_rmw,
    bench_range_loop
);
criterion_main!(benches);

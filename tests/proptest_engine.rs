//! Property tests pinning the engine to straightforward scalar models and
//! pinning the magic loopback to the functional engine.

use maa_kernels::{
    AluOp, BackendKind, Maa, MaaConfig, MaaContext, Mask, RangeLoop, Region, StreamBounds,
    Tile, TileElem,
};
use proptest::prelude::*;

const TILE: usize = 16;

fn harness(backend: BackendKind) -> Maa {
    Maa::new(MaaConfig {
        tile_size: TILE,
        backend,
        ..MaaConfig::default()
    })
    .unwrap()
}

fn fill<T: TileElem>(ctx: &mut MaaContext, vals: &[T]) -> Tile<T> {
    let t = ctx.new_tile::<T>();
    ctx.tile_mut(t)[..vals.len()].copy_from_slice(vals);
    ctx.set_tile_size(t, vals.len());
    t
}

proptest! {
    #[test]
    fn stream_load_matches_a_scalar_gather(
        data in prop::collection::vec(-1000i32..1000, 1..64),
        stride in 1i32..5,
        lo_seed in 0usize..64,
        hi_seed in 0usize..65,
    ) {
        let len = data.len();
        let min = (lo_seed % len) as i32;
        let max = (hi_seed % (len + 1)) as i32;

        let mut expect = Vec::new();
        let mut i = min;
        while i < max && expect.len() < TILE {
            expect.push(data[i as usize]);
            i += stride;
        }

        let maa = harness(BackendKind::Functional);
        let mut ctx = maa.context();
        let region = Region::from_slice(&data);
        let bounds = StreamBounds {
            min: ctx.new_reg(min),
            max: ctx.new_reg(max),
            stride: ctx.new_reg(stride),
        };
        let t = ctx.new_tile::<i32>();
        ctx.stream_load(&region, bounds, t, Mask::NONE);
        ctx.wait_ready(t);
        prop_assert_eq!(ctx.tile(t), expect.as_slice());
    }

    #[test]
    fn rmw_add_matches_serial_accumulation(
        pairs in prop::collection::vec((0usize..8, -100i32..100), 1..TILE),
    ) {
        let mut serial = vec![0i32; 8];
        for &(slot, v) in &pairs {
            serial[slot] += v;
        }

        let maa = harness(BackendKind::Functional);
        let mut ctx = maa.context();
        let hist = Region::from_elem(0i32, 8);
        let idx: Vec<i32> = pairs.iter().map(|&(slot, _)| slot as i32).collect();
        let vals: Vec<i32> = pairs.iter().map(|&(_, v)| v).collect();
        let idx = fill(&mut ctx, &idx);
        let vals = fill(&mut ctx, &vals);
        ctx.indirect_rmw(&hist, idx, vals, AluOp::Add, Mask::NONE, None);
        prop_assert_eq!(hist.to_vec(), serial);
    }

    #[test]
    fn range_loop_enumerates_every_pair_in_order(
        rows in prop::collection::vec((0i32..12, 0i32..12), 1..5),
    ) {
        let lo: Vec<i32> = rows.iter().map(|&(a, b)| a.min(b)).collect();
        let hi: Vec<i32> = rows.iter().map(|&(a, b)| a.max(b)).collect();
        let mut expect = Vec::new();
        for (r, (&l, &h)) in lo.iter().zip(&hi).enumerate() {
            for j in l..h {
                expect.push((r as i32, j));
            }
        }

        // A small tile forces the cursor to resume mid-row.
        let maa = Maa::new(MaaConfig {
            tile_size: 4,
            ..MaaConfig::default()
        }).unwrap();
        let mut ctx = maa.context();
        let lo = fill(&mut ctx, &lo);
        let hi = fill(&mut ctx, &hi);
        let stride = ctx.new_reg(1i32);
        let outer = ctx.new_tile::<i32>();
        let inner = ctx.new_tile::<i32>();
        let mut rl = RangeLoop::new(&mut ctx, lo, hi, stride, outer, inner, Mask::NONE);

        let mut got = Vec::new();
        while let Some(n) = rl.next_batch(&mut ctx) {
            prop_assert!(n <= 4);
            let o = ctx.tile(outer).to_vec();
            let i = ctx.tile(inner).to_vec();
            got.extend(o.into_iter().zip(i));
        }
        prop_assert_eq!(got, expect);
    }

    #[test]
    fn loopback_matches_functional_on_an_indirect_gather(
        data in prop::collection::vec(-1000i32..1000, 1..32),
        idx_seed in prop::collection::vec(0usize..32, 1..TILE),
    ) {
        let idx: Vec<i32> = idx_seed.iter().map(|&i| (i % data.len()) as i32).collect();

        let run = |backend: BackendKind| -> Vec<i32> {
            let maa = harness(backend);
            let mut ctx = maa.context();
            let region = Region::from_slice(&data);
            maa.register_region(&region).unwrap();
            let idx = fill(&mut ctx, &idx);
            let t = ctx.new_tile::<i32>();
            ctx.indirect_load(&region, idx, t, Mask::NONE);
            ctx.wait_ready(t);
            ctx.tile(t).to_vec()
        };
        prop_assert_eq!(run(BackendKind::Functional), run(BackendKind::MagicLoopback));
    }
}

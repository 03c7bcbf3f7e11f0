//! Cross-worker atomicity: several workers hammer the same region with
//! read-modify-write and store-with-dump operations; per-element atomicity
//! must make the combined result equal to the serial one.

use std::collections::HashSet;

use maa_kernels::{AluOp, Maa, MaaConfig, Mask, Region};

const WORKERS: usize = 4;
const LANES: usize = 16;
const SLOTS: usize = 8;

#[test]
fn overlapping_rmw_sums_match_serial() {
    let maa = Maa::new(MaaConfig {
        tile_size: LANES,
        max_workers: WORKERS,
        ..MaaConfig::default()
    })
    .unwrap();
    let hist = Region::from_elem(0i32, SLOTS);

    std::thread::scope(|s| {
        for w in 0..WORKERS {
            let maa = &maa;
            let hist = &hist;
            s.spawn(move || {
                let mut ctx = maa.context();
                let idx = ctx.new_tile::<i32>();
                let lanes = ctx.tile_mut(idx);
                for (k, lane) in lanes.iter_mut().enumerate().take(LANES) {
                    *lane = ((w + k) % SLOTS) as i32;
                }
                ctx.set_tile_size(idx, LANES);
                let one = ctx.new_reg(1i32);
                ctx.indirect_rmw_scalar(hist, idx, one, AluOp::Add, Mask::NONE, None);
            });
        }
    });

    // Each worker touches every slot LANES / SLOTS times.
    let expected = (WORKERS * LANES / SLOTS) as i32;
    assert_eq!(hist.to_vec(), vec![expected; SLOTS]);
}

#[test]
fn store_with_dump_claims_each_slot_exactly_once() {
    let maa = Maa::new(MaaConfig {
        tile_size: SLOTS,
        max_workers: WORKERS,
        ..MaaConfig::default()
    })
    .unwrap();
    // -1 marks an unclaimed slot. Every worker tries to claim every slot
    // with its own id; the dump tile tells it which claims won.
    let owners = Region::from_elem(-1i32, SLOTS);

    let won: Vec<Vec<usize>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..WORKERS)
            .map(|w| {
                let maa = &maa;
                let owners = &owners;
                s.spawn(move || {
                    let mut ctx = maa.context();
                    let idx = ctx.new_tile::<i32>();
                    for (k, lane) in ctx.tile_mut(idx).iter_mut().enumerate() {
                        *lane = k as i32;
                    }
                    ctx.set_tile_size(idx, SLOTS);
                    let me = ctx.new_reg(w as i32);
                    let dump = ctx.new_tile::<i32>();
                    ctx.indirect_store_scalar(owners, idx, me, Mask::NONE, Some(dump));
                    ctx.wait_ready(dump);
                    ctx.tile(dump)
                        .iter()
                        .enumerate()
                        .filter(|&(_, &prev)| prev == -1)
                        .map(|(slot, _)| slot)
                        .collect()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Exactly one winner per slot.
    let mut seen = HashSet::new();
    for slots in &won {
        for &slot in slots {
            assert!(seen.insert(slot), "slot {slot} was claimed twice");
        }
    }
    assert_eq!(seen.len(), SLOTS);
}

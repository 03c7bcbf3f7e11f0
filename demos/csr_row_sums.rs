//! CSR row sums through the accelerator operation set.
//!
//! Walks a sparse matrix with the range loop, gathers values with indirect
//! loads, and accumulates per-row totals with atomic read-modify-write.
//!
//! Run with `cargo run --example csr_row_sums`.

use maa_kernels::{roi, AluOp, Maa, MaaConfig, Mask, RangeLoop, Region};

fn main() {
    env_logger::init();

    // 4x4 sparse matrix in CSR form; row 2 is empty.
    let row_ptr = [0i32, 2, 5, 5, 7];
    let val = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
    let rows = row_ptr.len() - 1;

    let maa = Maa::new(MaaConfig {
        tile_size: 4,
        ..MaaConfig::default()
    })
    .expect("config is valid");
    let mut ctx = maa.context();

    let val_region = Region::from_slice(&val);
    let y = Region::from_elem(0.0f32, rows);

    let lo = ctx.new_tile::<i32>();
    ctx.tile_mut(lo)[..rows].copy_from_slice(&row_ptr[..rows]);
    ctx.set_tile_size(lo, rows);
    let hi = ctx.new_tile::<i32>();
    ctx.tile_mut(hi)[..rows].copy_from_slice(&row_ptr[1..]);
    ctx.set_tile_size(hi, rows);

    let stride = ctx.new_reg(1i32);
    let outer = ctx.new_tile::<i32>();
    let inner = ctx.new_tile::<i32>();
    let vals = ctx.new_tile::<f32>();
    let mut rl = RangeLoop::new(&mut ctx, lo, hi, stride, outer, inner, Mask::NONE);

    roi::begin();
    while let Some(n) = rl.next_batch(&mut ctx) {
        log::info!("batch of {n} nonzeros");
        ctx.indirect_load(&val_region, inner, vals, Mask::NONE);
        ctx.wait_ready(vals);
        ctx.indirect_rmw(&y, outer, vals, AluOp::Add, Mask::NONE, None);
    }
    roi::end();

    for (r, total) in y.to_vec().into_iter().enumerate() {
        println!("row {r}: {total}");
    }
}

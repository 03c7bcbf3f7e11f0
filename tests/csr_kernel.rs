//! End-to-end CSR kernel: range-loop traversal feeding indirect gathers and
//! atomic accumulation, batched through a deliberately small tile so the
//! cursor has to resume mid-row.

use maa_kernels::{AluOp, Maa, MaaConfig, Mask, RangeLoop, Region};

/// y[r] = sum of val[k] for k in row_ptr[r]..row_ptr[r+1].
fn row_sums_serial(row_ptr: &[i32], val: &[f32]) -> Vec<f32> {
    let rows = row_ptr.len() - 1;
    let mut y = vec![0.0f32; rows];
    for r in 0..rows {
        for k in row_ptr[r]..row_ptr[r + 1] {
            y[r] += val[k as usize];
        }
    }
    y
}

#[test]
fn csr_row_sums_match_the_serial_kernel() {
    let row_ptr = [0i32, 2, 5, 5, 7];
    let val = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
    let rows = row_ptr.len() - 1;

    let maa = Maa::new(MaaConfig {
        tile_size: 4,
        ..MaaConfig::default()
    })
    .unwrap();
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

    let mut batches = 0;
    while rl.next_batch(&mut ctx).is_some() {
        ctx.indirect_load(&val_region, inner, vals, Mask::NONE);
        ctx.wait_ready(vals);
        ctx.indirect_rmw(&y, outer, vals, AluOp::Add, Mask::NONE, None);
        batches += 1;
    }

    assert!(batches > 1, "tile size 4 should force multiple batches");
    assert_eq!(y.to_vec(), row_sums_serial(&row_ptr, &val));
}

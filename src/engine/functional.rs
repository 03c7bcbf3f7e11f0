//! In-process functional interpreter.
//!
//! This is the reference semantics of the operation set: every lane result
//! here defines the value every other backend must produce. Execution is
//! synchronous at issue; the readiness protocol is enforced one layer up on
//! the worker context.

use crate::engine::{EngineState, Op, SrcOperand};
use crate::region::RegionInner;
use crate::scratchpad::{RegFile, Scratchpad};
use crate::types::{AluOp, CmpOp, ElemType, Mask, TileElem};

pub(crate) fn execute(op: &Op<'_>, state: &mut EngineState<'_>) {
    let spd = &mut *state.spd;
    let regs = &mut *state.regs;
    match *op {
        Op::StreamLoad {
            data,
            elem,
            min,
            max,
            stride,
            dst,
            mask,
        } => {
            check_region(data, elem);
            let (min, max, stride) = stream_bounds(regs, min, max, stride);
            let cap = spd.tile_size();
            let mut lane = 0usize;
            let mut i = min;
            while i < max && lane < cap {
                if lane_on(spd, regs, &mask, lane) {
                    spd.set_word(dst, lane, data.load(i as usize));
                }
                i += stride;
                lane += 1;
            }
            spd.set_size(dst, lane);
        }

        Op::StreamStore {
            data,
            elem,
            min,
            max,
            stride,
            src,
            mask,
        } => {
            check_region(data, elem);
            let (min, max, stride) = stream_bounds(regs, min, max, stride);
            let cap = spd.tile_size();
            let mut lane = 0usize;
            let mut i = min;
            while i < max && lane < cap {
                if lane_on(spd, regs, &mask, lane) {
                    data.store(i as usize, spd.word(src, lane));
                }
                i += stride;
                lane += 1;
            }
        }

        Op::IndirectLoad {
            data,
            elem,
            idx,
            dst,
            mask,
        } => {
            check_region(data, elem);
            let n = spd.size(idx);
            for lane in 0..n {
                if lane_on(spd, regs, &mask, lane) {
                    let ix = index_at(spd, idx, lane);
                    spd.set_word(dst, lane, data.load(ix));
                }
            }
            spd.set_size(dst, n);
        }

        Op::IndirectStore {
            data,
            elem,
            idx,
            src,
            mask,
            dump,
        } => {
            check_region(data, elem);
            let n = spd.size(idx);
            for lane in 0..n {
                if lane_on(spd, regs, &mask, lane) {
                    let ix = index_at(spd, idx, lane);
                    let bits = src_bits(spd, regs, src, lane);
                    match dump {
                        // Exchange, so the dump lane is an exact-once
                        // snapshot even under cross-thread contention.
                        Some(d) => {
                            let prev = data.swap(ix, bits);
                            spd.set_word(d, lane, prev);
                        }
                        None => data.store(ix, bits),
                    }
                }
            }
            if let Some(d) = dump {
                spd.set_size(d, n);
            }
        }

        Op::IndirectRmw {
            data,
            elem,
            idx,
            src,
            op,
            mask,
            dump,
        } => {
            check_region(data, elem);
            assert!(
                op.is_rmw(),
                "ALU op {op:?} is not a valid read-modify-write operation"
            );
            let n = spd.size(idx);
            if let SrcOperand::Tile(t) = src {
                assert_eq!(
                    spd.size(t),
                    n,
                    "rmw source tile and index tile lane counts differ"
                );
            }
            if let Some(cond) = mask.cond_tile() {
                assert_eq!(
                    spd.size(cond),
                    n,
                    "rmw condition tile and index tile lane counts differ"
                );
            }
            for lane in 0..n {
                if lane_on(spd, regs, &mask, lane) {
                    let ix = index_at(spd, idx, lane);
                    let rhs = src_bits(spd, regs, src, lane);
                    let prev = data.rmw(ix, |old| alu_bits(elem, old, rhs, op));
                    if let Some(d) = dump {
                        spd.set_word(d, lane, prev);
                    }
                }
            }
            if let Some(d) = dump {
                spd.set_size(d, n);
            }
        }

        Op::AluScalar {
            elem,
            src,
            rhs,
            dst,
            op,
            mask,
        } => {
            let n = spd.size(src);
            let rhs = regs.bits(rhs);
            for lane in 0..n {
                if lane_on(spd, regs, &mask, lane) {
                    let out = alu_bits(elem, spd.word(src, lane), rhs, op);
                    spd.set_word(dst, lane, out);
                }
            }
            spd.set_size(dst, n);
        }

        Op::AluVector {
            elem,
            src1,
            src2,
            dst,
            op,
            mask,
        } => {
            let n = spd.size(src1);
            for lane in 0..n {
                if lane_on(spd, regs, &mask, lane) {
                    let out = alu_bits(elem, spd.word(src1, lane), spd.word(src2, lane), op);
                    spd.set_word(dst, lane, out);
                }
            }
            spd.set_size(dst, n);
        }

        Op::CmpScalar {
            elem,
            src,
            rhs,
            dst,
            op,
            mask,
        } => {
            let n = spd.size(src);
            let rhs = regs.bits(rhs);
            for lane in 0..n {
                if lane_on(spd, regs, &mask, lane) {
                    let hit = cmp_bits(elem, spd.word(src, lane), rhs, op);
                    spd.set_word(dst, lane, hit as u32);
                }
            }
            spd.set_size(dst, n);
        }

        Op::CmpVector {
            elem,
            src1,
            src2,
            dst,
            op,
            mask,
        } => {
            let n = spd.size(src1);
            for lane in 0..n {
                if lane_on(spd, regs, &mask, lane) {
                    let hit = cmp_bits(elem, spd.word(src1, lane), spd.word(src2, lane), op);
                    spd.set_word(dst, lane, hit as u32);
                }
            }
            spd.set_size(dst, n);
        }

        Op::AluReduce {
            elem,
            src,
            dst_reg,
            op,
            mask,
        } => {
            let n = spd.size(src);
            let mut acc = reduce_identity_bits(elem, op);
            for lane in 0..n {
                if lane_on(spd, regs, &mask, lane) {
                    acc = alu_bits(elem, spd.word(src, lane), acc, op);
                }
            }
            regs.set_bits(dst_reg, acc);
        }

        Op::RangeLoop {
            last_i,
            last_j,
            lo,
            hi,
            stride,
            dst_outer,
            dst_inner,
            mask,
        } => {
            let lo_n = spd.size(lo);
            assert_eq!(
                spd.size(hi),
                lo_n,
                "range loop bound tiles have different lane counts"
            );
            let stride = regs.get_i32(stride);
            assert!(stride > 0, "range loop stride must be positive");
            let cap = spd.tile_size();
            let mut i = regs.get_i32(last_i);
            let mut j = regs.get_i32(last_j);
            assert!(i >= 0 && j >= -1, "range loop cursor was not reset");
            let mut emitted = 0usize;
            while (i as usize) < lo_n && emitted < cap {
                if lane_on(spd, regs, &mask, i as usize) {
                    if j == -1 {
                        j = spd.word(lo, i as usize) as i32;
                    }
                    let row_end = spd.word(hi, i as usize) as i32;
                    while j < row_end && emitted < cap {
                        spd.set_word(dst_outer, emitted, i as u32);
                        spd.set_word(dst_inner, emitted, j as u32);
                        j += stride;
                        emitted += 1;
                    }
                    if j >= row_end {
                        // Row drained; the next call starts a fresh row.
                        j = -1;
                    } else {
                        // Tile full mid-row; resume at (i, j).
                        break;
                    }
                }
                i += 1;
            }
            regs.set_i32(last_i, i);
            regs.set_i32(last_j, j);
            spd.set_size(dst_outer, emitted);
            spd.set_size(dst_inner, emitted);
        }
    }
}

fn check_region(data: &RegionInner, elem: ElemType) {
    assert_eq!(
        data.elem(),
        elem,
        "element type tag mismatch between operation and region"
    );
}

fn stream_bounds(regs: &RegFile, min: u16, max: u16, stride: u16) -> (i32, i32, i32) {
    let min = regs.get_i32(min);
    let max = regs.get_i32(max);
    let stride = regs.get_i32(stride);
    assert!(stride > 0, "stream stride must be positive");
    if min < max {
        assert!(min >= 0, "stream lower bound {min} is negative");
    }
    (min, max, stride)
}

#[inline(always)]
fn lane_on(spd: &Scratchpad, regs: &RegFile, mask: &Mask, lane: usize) -> bool {
    match mask.cond {
        None => true,
        Some(c) => cmp_bits(c.elem, spd.word(c.tile, lane), regs.bits(c.reg), c.op),
    }
}

#[inline(always)]
fn src_bits(spd: &Scratchpad, regs: &RegFile, src: SrcOperand, lane: usize) -> u32 {
    match src {
        SrcOperand::Tile(t) => spd.word(t, lane),
        SrcOperand::Reg(r) => regs.bits(r),
    }
}

fn index_at(spd: &Scratchpad, idx: u16, lane: usize) -> usize {
    let ix = spd.word(idx, lane) as i32;
    assert!(ix >= 0, "negative index {ix} at lane {lane} of index tile");
    ix as usize
}

/// Lane-level ALU with the element tag dispatched once per word.
#[inline(always)]
pub(crate) fn alu_bits(elem: ElemType, a: u32, b: u32, op: AluOp) -> u32 {
    match elem {
        ElemType::Int32 => i32::from_bits(a).alu(i32::from_bits(b), op).to_bits(),
        ElemType::Float32 => f32::from_bits(a).alu(f32::from_bits(b), op).to_bits(),
    }
}

#[inline(always)]
pub(crate) fn cmp_bits(elem: ElemType, a: u32, b: u32, op: CmpOp) -> bool {
    match elem {
        ElemType::Int32 => i32::from_bits(a).cmp(i32::from_bits(b), op),
        ElemType::Float32 => f32::from_bits(a).cmp(f32::from_bits(b), op),
    }
}

fn reduce_identity_bits(elem: ElemType, op: AluOp) -> u32 {
    match elem {
        ElemType::Int32 => i32::reduce_identity(op).to_bits(),
        ElemType::Float32 => f32::reduce_identity(op).to_bits(),
    }
}

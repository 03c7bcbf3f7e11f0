//! Batched driver over the range-loop operation.
//!
//! [`RangeLoop`] owns the cursor registers and the issue/wait cadence, so a
//! kernel can walk a ragged index space (CSR rows, adjacency lists) one tile
//! of `(outer, inner)` pairs at a time without touching cursor state by hand.

use crate::context::MaaContext;
use crate::types::{Mask, RangeCursor, Reg, Tile};

/// Resumable flattening of per-`i` ranges `lo[i]..hi[i]` into tile-sized
/// batches of `(outer, inner)` index pairs.
pub struct RangeLoop {
    cursor: RangeCursor,
    lo: Tile<i32>,
    hi: Tile<i32>,
    stride: Reg<i32>,
    dst_outer: Tile<i32>,
    dst_inner: Tile<i32>,
    mask: Mask,
    done: bool,
}

impl RangeLoop {
    /// Set up a traversal over `lo`/`hi`, emitting into `dst_outer` and
    /// `dst_inner`. Allocates two cursor registers from `ctx`.
    pub fn new(
        ctx: &mut MaaContext,
        lo: Tile<i32>,
        hi: Tile<i32>,
        stride: Reg<i32>,
        dst_outer: Tile<i32>,
        dst_inner: Tile<i32>,
        mask: Mask,
    ) -> Self {
        let cursor = ctx.new_cursor();
        Self {
            cursor,
            lo,
            hi,
            stride,
            dst_outer,
            dst_inner,
            mask,
            done: false,
        }
    }

    /// Issue the next batch and wait for its destination tiles. Returns the
    /// number of pairs emitted, or `None` once the index space is exhausted.
    pub fn next_batch(&mut self, ctx: &mut MaaContext) -> Option<usize> {
        if self.done {
            return None;
        }
        ctx.range_loop(
            self.cursor,
            self.lo,
            self.hi,
            self.stride,
            self.dst_outer,
            self.dst_inner,
            self.mask,
        );
        ctx.wait_ready(self.dst_outer);
        ctx.wait_ready(self.dst_inner);
        let n = ctx.tile_size(self.dst_outer);
        if n == 0 {
            self.done = true;
            None
        } else {
            Some(n)
        }
    }

    /// Rewind the cursor for a fresh pass over the same bounds.
    pub fn rewind(&mut self, ctx: &mut MaaContext) {
        ctx.reset_cursor(self.cursor);
        self.done = false;
    }

    /// Destination tile of flattened outer indices.
    pub fn outer(&self) -> Tile<i32> {
        self.dst_outer
    }

    /// Destination tile of flattened inner indices.
    pub fn inner(&self) -> Tile<i32> {
        self.dst_inner
    }
}

//! Engine root and per-worker contexts.
//!
//! [`Maa`] owns the engine-wide configuration and the region table; each OS
//! worker thread takes one [`MaaContext`] at parallel-region entry and keeps
//! it for the whole run. A context owns its private tile and register files,
//! so workers never contend on scratchpad state; the only sharing is through
//! registered [`Region`]s, whose cells are element-wise atomic.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::engine::{BackendKind, EngineImpl, EngineState, MagicPort, Op, SrcOperand};
use crate::error::{MaaError, MaaResult};
use crate::region::{Region, RegionId, RegionRegistry};
use crate::scratchpad::{RegFile, Scratchpad};
use crate::types::{
    AluOp, CmpOp, Mask, RangeCursor, Reg, StreamBounds, Tile, TileElem,
};

/// Engine-wide configuration, validated once at setup.
#[derive(Debug, Clone)]
pub struct MaaConfig {
    /// Execution backend for every worker context.
    pub backend: BackendKind,
    /// Tile capacity in elements; must be a power of two.
    pub tile_size: usize,
    /// Scratchpad tiles available to each worker.
    pub tiles_per_worker: usize,
    /// Scalar registers available to each worker.
    pub regs_per_worker: usize,
    /// Accelerator port slices, i.e. the worker-context budget.
    pub max_workers: usize,
    /// Capacity of the registered-region table.
    pub num_regions: usize,
}

impl Default for MaaConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            tile_size: 16384,
            tiles_per_worker: 8,
            regs_per_worker: 8,
            max_workers: 4,
            num_regions: 256,
        }
    }
}

impl MaaConfig {
    const MIN_TILE_SIZE: usize = 4;
    const MAX_TILE_SIZE: usize = 32768;

    fn validate(&self) -> MaaResult<()> {
        if !self.tile_size.is_power_of_two() {
            return Err(MaaError::TileSizeNotPowerOfTwo(self.tile_size));
        }
        if self.tile_size < Self::MIN_TILE_SIZE || self.tile_size > Self::MAX_TILE_SIZE {
            return Err(MaaError::TileSizeOutOfRange {
                got: self.tile_size,
                min: Self::MIN_TILE_SIZE,
                max: Self::MAX_TILE_SIZE,
            });
        }
        if self.tiles_per_worker == 0 || self.tiles_per_worker > 256 {
            return Err(MaaError::InvalidConfig(format!(
                "tiles_per_worker {} out of range 1..=256",
                self.tiles_per_worker
            )));
        }
        if self.regs_per_worker == 0 || self.regs_per_worker > 256 {
            return Err(MaaError::InvalidConfig(format!(
                "regs_per_worker {} out of range 1..=256",
                self.regs_per_worker
            )));
        }
        if self.max_workers == 0 {
            return Err(MaaError::InvalidConfig("max_workers is zero".into()));
        }
        if self.num_regions == 0 || self.num_regions > 256 {
            return Err(MaaError::InvalidConfig(format!(
                "num_regions {} out of range 1..=256",
                self.num_regions
            )));
        }
        Ok(())
    }
}

/// Engine root: configuration, backend selection, and the region table.
pub struct Maa {
    config: MaaConfig,
    regions: Arc<RegionRegistry>,
    workers_handed: AtomicUsize,
}

impl Maa {
    /// Engine-wide setup; call once before any tile or register allocation.
    pub fn new(config: MaaConfig) -> MaaResult<Self> {
        config.validate()?;
        log::debug!(
            "maa init: backend {:?}, tile size {}, {} tiles / {} regs per worker",
            config.backend,
            config.tile_size,
            config.tiles_per_worker,
            config.regs_per_worker
        );
        let regions = Arc::new(RegionRegistry::new(config.num_regions));
        Ok(Self {
            config,
            regions,
            workers_handed: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &MaaConfig {
        &self.config
    }

    /// Hand a worker its private context. Fatal past the worker budget:
    /// there is one accelerator port slice per worker, fixed at setup.
    pub fn context(&self) -> MaaContext {
        self.build_context(EngineImpl::new(self.config.backend))
    }

    /// Like [`Maa::context`], but issuing through a caller-supplied
    /// simulator port instead of the configured backend.
    pub fn context_with_port(&self, port: Box<dyn MagicPort>) -> MaaContext {
        self.build_context(EngineImpl::with_port(port))
    }

    fn build_context(&self, engine: EngineImpl) -> MaaContext {
        let worker = self.workers_handed.fetch_add(1, Ordering::Relaxed);
        assert!(
            worker < self.config.max_workers,
            "worker context budget exhausted ({} accelerator port slices)",
            self.config.max_workers
        );
        MaaContext {
            spd: Scratchpad::new(self.config.tile_size, self.config.tiles_per_worker),
            regs: RegFile::new(self.config.regs_per_worker),
            engine,
            regions: Arc::clone(&self.regions),
            worker,
        }
    }

    /// Declare a backing array visible to the accelerator. Idempotent per
    /// region; required before issuing against it through a simulator
    /// backend, advisory for the functional one.
    pub fn register_region<T: TileElem>(&self, region: &Region<T>) -> MaaResult<RegionId> {
        self.regions.register(region.inner_arc())
    }

    /// Drop every registration, e.g. between kernel phases.
    pub fn clear_regions(&self) {
        self.regions.clear();
    }
}

/// One worker's private view of the accelerator: tile file, register file,
/// and an engine instance.
///
/// All operations are asynchronous at the protocol level: they return
/// immediately and leave their destination tiles pending until
/// [`MaaContext::wait_ready`]. Several operations may be in flight into
/// *different* tiles; re-issuing into a pending tile, or reading one, is a
/// fatal protocol violation.
pub struct MaaContext {
    spd: Scratchpad,
    regs: RegFile,
    engine: EngineImpl,
    regions: Arc<RegionRegistry>,
    worker: usize,
}

impl MaaContext {
    pub fn worker_id(&self) -> usize {
        self.worker
    }

    /// Tile capacity in elements.
    pub fn tile_capacity(&self) -> usize {
        self.spd.tile_size()
    }

    // ---- allocation (setup phase) ----

    /// Allocate a fresh tile bound to `T`. Fatal once the per-worker budget
    /// is spent; allocate at parallel-region entry, not in the hot loop.
    pub fn new_tile<T: TileElem>(&mut self) -> Tile<T> {
        Tile::new(self.spd.alloc(T::ELEM))
    }

    /// Allocate a fresh scalar register holding `init`.
    pub fn new_reg<T: TileElem>(&mut self, init: T) -> Reg<T> {
        Reg::new(self.regs.alloc(T::ELEM, init.to_bits()))
    }

    /// Allocate a range-loop cursor, reset to the fresh position.
    pub fn new_cursor(&mut self) -> RangeCursor {
        RangeCursor {
            i: self.new_reg(0),
            j: self.new_reg(-1),
        }
    }

    // ---- registers ----

    /// Write an immediate scalar into a register. The one always-synchronous
    /// primitive.
    pub fn set_reg<T: TileElem>(&mut self, reg: Reg<T>, value: T) {
        self.check_reg(reg);
        self.regs.set_bits(reg.id, value.to_bits());
    }

    /// Read a register back.
    pub fn reg<T: TileElem>(&self, reg: Reg<T>) -> T {
        self.check_reg(reg);
        T::from_bits(self.regs.bits(reg.id))
    }

    /// Rewind a cursor to `(0, -1)` for a fresh flattening.
    pub fn reset_cursor(&mut self, cursor: RangeCursor) {
        self.set_reg(cursor.i, 0);
        self.set_reg(cursor.j, -1);
    }

    // ---- tile readback / CPU-side production ----

    /// Logical element count written by the most recent producer.
    pub fn tile_size<T: TileElem>(&self, tile: Tile<T>) -> usize {
        self.check_tile(tile);
        self.spd.assert_ready(tile.id, "size query");
        self.spd.size(tile.id)
    }

    /// Read view of the tile's logical run.
    pub fn tile<T: TileElem>(&self, tile: Tile<T>) -> &[T] {
        self.check_tile(tile);
        self.spd.assert_ready(tile.id, "read");
        let n = self.spd.size(tile.id);
        let words = &self.spd.words(tile.id)[..n];
        // SAFETY: TileElem is sealed to i32 and f32, which have u32's size
        // and alignment, and every bit pattern is a valid value of either.
        unsafe { std::slice::from_raw_parts(words.as_ptr() as *const T, words.len()) }
    }

    /// Full-capacity write view, for CPU-side tile production (index tiles,
    /// leftover iterations). Pair with [`MaaContext::set_tile_size`].
    pub fn tile_mut<T: TileElem>(&mut self, tile: Tile<T>) -> &mut [T] {
        self.check_tile(tile);
        self.spd.assert_ready(tile.id, "write");
        let words = self.spd.words_mut(tile.id);
        // SAFETY: as in `tile`; the view covers exactly this tile's words.
        unsafe { std::slice::from_raw_parts_mut(words.as_mut_ptr() as *mut T, words.len()) }
    }

    /// Set the logical size after producing lanes through
    /// [`MaaContext::tile_mut`].
    pub fn set_tile_size<T: TileElem>(&mut self, tile: Tile<T>, size: usize) {
        self.check_tile(tile);
        self.spd.assert_ready(tile.id, "resize");
        assert!(
            size <= self.spd.tile_size(),
            "logical size {size} exceeds tile capacity {}",
            self.spd.tile_size()
        );
        self.spd.set_size(tile.id, size);
    }

    /// Block until the pending producer of `tile` completes. Waiting on an
    /// already-ready tile is a no-op.
    pub fn wait_ready<T: TileElem>(&mut self, tile: Tile<T>) {
        self.check_tile(tile);
        if !self.spd.is_ready(tile.id) {
            let mut state = EngineState {
                spd: &mut self.spd,
                regs: &mut self.regs,
                regions: &self.regions,
            };
            self.engine.wait(tile.id, &mut state);
            self.spd.set_ready(tile.id, true);
        }
    }

    // ---- memory-access operations ----

    /// Gather `data[min + k*stride]` for `k = 0..` into `dst`, truncated at
    /// tile capacity.
    pub fn stream_load<T: TileElem>(
        &mut self,
        data: &Region<T>,
        bounds: StreamBounds,
        dst: Tile<T>,
        mask: Mask,
    ) {
        self.check_sources(&[], &mask);
        let op = Op::StreamLoad {
            data: data.inner(),
            elem: T::ELEM,
            min: bounds.min.id,
            max: bounds.max.id,
            stride: bounds.stride.id,
            dst: dst.id,
            mask,
        };
        self.issue(op, &[dst.id]);
    }

    /// Scatter `src` lanes back over a strided window of `data`.
    pub fn stream_store<T: TileElem>(
        &mut self,
        data: &Region<T>,
        bounds: StreamBounds,
        src: Tile<T>,
        mask: Mask,
    ) {
        self.check_sources(&[src.id], &mask);
        let op = Op::StreamStore {
            data: data.inner(),
            elem: T::ELEM,
            min: bounds.min.id,
            max: bounds.max.id,
            stride: bounds.stride.id,
            src: src.id,
            mask,
        };
        self.issue(op, &[]);
    }

    /// Gather `data[idx[k]]` into `dst`.
    pub fn indirect_load<T: TileElem>(
        &mut self,
        data: &Region<T>,
        idx: Tile<i32>,
        dst: Tile<T>,
        mask: Mask,
    ) {
        self.check_sources(&[idx.id], &mask);
        let op = Op::IndirectLoad {
            data: data.inner(),
            elem: T::ELEM,
            idx: idx.id,
            dst: dst.id,
            mask,
        };
        self.issue(op, &[dst.id]);
    }

    /// Scatter `src[k]` to `data[idx[k]]`. With `dump`, each touched element
    /// is an atomic exchange and `dump[k]` receives the pre-store value.
    pub fn indirect_store<T: TileElem>(
        &mut self,
        data: &Region<T>,
        idx: Tile<i32>,
        src: Tile<T>,
        mask: Mask,
        dump: Option<Tile<T>>,
    ) {
        self.check_sources(&[idx.id, src.id], &mask);
        let op = Op::IndirectStore {
            data: data.inner(),
            elem: T::ELEM,
            idx: idx.id,
            src: SrcOperand::Tile(src.id),
            mask,
            dump: dump.map(|d| d.id),
        };
        self.issue(op, &dump_dsts(dump));
    }

    /// Broadcast one register value to every selected `data[idx[k]]`; the
    /// claim primitive when paired with `dump`.
    pub fn indirect_store_scalar<T: TileElem>(
        &mut self,
        data: &Region<T>,
        idx: Tile<i32>,
        src: Reg<T>,
        mask: Mask,
        dump: Option<Tile<T>>,
    ) {
        self.check_sources(&[idx.id], &mask);
        self.check_reg(src);
        let op = Op::IndirectStore {
            data: data.inner(),
            elem: T::ELEM,
            idx: idx.id,
            src: SrcOperand::Reg(src.id),
            mask,
            dump: dump.map(|d| d.id),
        };
        self.issue(op, &dump_dsts(dump));
    }

    /// Atomically apply `data[idx[k]] = data[idx[k]] op src[k]` per lane.
    /// Only the associative `Add`..`Max` subset is legal.
    pub fn indirect_rmw<T: TileElem>(
        &mut self,
        data: &Region<T>,
        idx: Tile<i32>,
        src: Tile<T>,
        op: AluOp,
        mask: Mask,
        dump: Option<Tile<T>>,
    ) {
        self.check_sources(&[idx.id, src.id], &mask);
        let op = Op::IndirectRmw {
            data: data.inner(),
            elem: T::ELEM,
            idx: idx.id,
            src: SrcOperand::Tile(src.id),
            op,
            mask,
            dump: dump.map(|d| d.id),
        };
        self.issue(op, &dump_dsts(dump));
    }

    /// Read-modify-write with one register broadcast to every lane.
    pub fn indirect_rmw_scalar<T: TileElem>(
        &mut self,
        data: &Region<T>,
        idx: Tile<i32>,
        src: Reg<T>,
        op: AluOp,
        mask: Mask,
        dump: Option<Tile<T>>,
    ) {
        self.check_sources(&[idx.id], &mask);
        self.check_reg(src);
        let op = Op::IndirectRmw {
            data: data.inner(),
            elem: T::ELEM,
            idx: idx.id,
            src: SrcOperand::Reg(src.id),
            op,
            mask,
            dump: dump.map(|d| d.id),
        };
        self.issue(op, &dump_dsts(dump));
    }

    /// Elementwise `dst[k] = src[k] op rhs`.
    pub fn alu_scalar<T: TileElem>(
        &mut self,
        src: Tile<T>,
        rhs: Reg<T>,
        dst: Tile<T>,
        op: AluOp,
        mask: Mask,
    ) {
        self.check_sources(&[src.id], &mask);
        self.check_reg(rhs);
        let op = Op::AluScalar {
            elem: T::ELEM,
            src: src.id,
            rhs: rhs.id,
            dst: dst.id,
            op,
            mask,
        };
        self.issue(op, &[dst.id]);
    }

    /// Elementwise `dst[k] = src1[k] op src2[k]`.
    pub fn alu_vector<T: TileElem>(
        &mut self,
        src1: Tile<T>,
        src2: Tile<T>,
        dst: Tile<T>,
        op: AluOp,
        mask: Mask,
    ) {
        self.check_sources(&[src1.id, src2.id], &mask);
        let op = Op::AluVector {
            elem: T::ELEM,
            src1: src1.id,
            src2: src2.id,
            dst: dst.id,
            op,
            mask,
        };
        self.issue(op, &[dst.id]);
    }

    /// Elementwise comparison against a register, producing a 0/1 condition
    /// tile for later masked operations.
    pub fn compare_scalar<T: TileElem>(
        &mut self,
        src: Tile<T>,
        rhs: Reg<T>,
        dst: Tile<i32>,
        op: CmpOp,
        mask: Mask,
    ) {
        self.check_sources(&[src.id], &mask);
        self.check_reg(rhs);
        let op = Op::CmpScalar {
            elem: T::ELEM,
            src: src.id,
            rhs: rhs.id,
            dst: dst.id,
            op,
            mask,
        };
        self.issue(op, &[dst.id]);
    }

    /// Lane-wise comparison of two tiles into a 0/1 condition tile.
    pub fn compare_vector<T: TileElem>(
        &mut self,
        src1: Tile<T>,
        src2: Tile<T>,
        dst: Tile<i32>,
        op: CmpOp,
        mask: Mask,
    ) {
        self.check_sources(&[src1.id, src2.id], &mask);
        let op = Op::CmpVector {
            elem: T::ELEM,
            src1: src1.id,
            src2: src2.id,
            dst: dst.id,
            op,
            mask,
        };
        self.issue(op, &[dst.id]);
    }

    /// Masked fold of `src` into a register, seeded with the op's identity.
    pub fn alu_reduce<T: TileElem>(&mut self, src: Tile<T>, dst: Reg<T>, op: AluOp, mask: Mask) {
        self.check_sources(&[src.id], &mask);
        self.check_reg(dst);
        let op = Op::AluReduce {
            elem: T::ELEM,
            src: src.id,
            dst_reg: dst.id,
            op,
            mask,
        };
        self.issue(op, &[]);
    }

    /// Emit up to one tile of flattened `(outer, inner)` pairs from the
    /// ragged ranges `lo[i]..hi[i]`, resuming at `cursor`. A zero logical
    /// size on the destination tiles signals exhaustion. `mask` predicates
    /// the outer index.
    #[allow(clippy::too_many_arguments)]
    pub fn range_loop(
        &mut self,
        cursor: RangeCursor,
        lo: Tile<i32>,
        hi: Tile<i32>,
        stride: Reg<i32>,
        dst_outer: Tile<i32>,
        dst_inner: Tile<i32>,
        mask: Mask,
    ) {
        self.check_sources(&[lo.id, hi.id], &mask);
        self.check_reg(stride);
        self.check_reg(cursor.i);
        self.check_reg(cursor.j);
        let op = Op::RangeLoop {
            last_i: cursor.i.id,
            last_j: cursor.j.id,
            lo: lo.id,
            hi: hi.id,
            stride: stride.id,
            dst_outer: dst_outer.id,
            dst_inner: dst_inner.id,
            mask,
        };
        self.issue(op, &[dst_outer.id, dst_inner.id]);
    }

    // ---- internals ----

    /// Common issue path: destinations must have no producer in flight;
    /// after execution they are pending until waited on.
    fn issue(&mut self, op: Op<'_>, dsts: &[u16]) {
        for &d in dsts {
            self.spd.assert_ready(d, "destination");
        }
        let mut state = EngineState {
            spd: &mut self.spd,
            regs: &mut self.regs,
            regions: &self.regions,
        };
        self.engine.execute(&op, &mut state);
        for &d in dsts {
            self.spd.set_ready(d, false);
        }
    }

    fn check_sources(&self, tiles: &[u16], mask: &Mask) {
        for &t in tiles {
            self.spd.assert_ready(t, "source");
        }
        if let Some(cond) = mask.cond_tile() {
            self.spd.assert_ready(cond, "condition");
        }
    }

    fn check_tile<T: TileElem>(&self, tile: Tile<T>) {
        assert_eq!(
            self.spd.elem(tile.id),
            T::ELEM,
            "tile handle type tag does not match the allocated tile"
        );
    }

    fn check_reg<T: TileElem>(&self, reg: Reg<T>) {
        assert_eq!(
            self.regs.elem(reg.id),
            T::ELEM,
            "register handle type tag does not match the allocated register"
        );
    }
}

fn dump_dsts<T>(dump: Option<Tile<T>>) -> Vec<u16> {
    dump.map(|d| vec![d.id]).unwrap_or_default()
}

//! Per-worker tile and register files.
//!
//! Tiles are fixed-capacity runs of 32-bit words with a logical size and a
//! readiness flag; registers are single 32-bit words. Both are allocated
//! once per worker during setup and never freed. All accessors take raw ids;
//! the typed handles live on the context surface.

use crate::types::ElemType;

/// Tile file: flat word storage plus per-tile size, readiness, and type tag.
pub struct Scratchpad {
    words: Vec<u32>,
    sizes: Vec<u16>,
    ready: Vec<bool>,
    elems: Vec<ElemType>,
    tile_size: usize,
    budget: usize,
}

impl Scratchpad {
    pub(crate) fn new(tile_size: usize, budget: usize) -> Self {
        Self {
            words: Vec::new(),
            sizes: Vec::new(),
            ready: Vec::new(),
            elems: Vec::new(),
            tile_size,
            budget,
        }
    }

    /// Capacity of every tile, in elements.
    pub(crate) fn tile_size(&self) -> usize {
        self.tile_size
    }

    /// Allocate a fresh tile. Fatal once the worker's tile budget is spent;
    /// allocation belongs in the setup phase, not the hot loop.
    pub(crate) fn alloc(&mut self, elem: ElemType) -> u16 {
        let id = self.elems.len();
        assert!(
            id < self.budget,
            "scratchpad tile budget exhausted ({} tiles per worker)",
            self.budget
        );
        self.words.resize(self.words.len() + self.tile_size, 0);
        self.sizes.push(0);
        self.ready.push(true);
        self.elems.push(elem);
        id as u16
    }

    pub(crate) fn elem(&self, id: u16) -> ElemType {
        self.elems[id as usize]
    }

    pub(crate) fn size(&self, id: u16) -> usize {
        self.sizes[id as usize] as usize
    }

    pub(crate) fn set_size(&mut self, id: u16, size: usize) {
        debug_assert!(size <= self.tile_size);
        self.sizes[id as usize] = size as u16;
    }

    pub(crate) fn is_ready(&self, id: u16) -> bool {
        self.ready[id as usize]
    }

    pub(crate) fn set_ready(&mut self, id: u16, ready: bool) {
        self.ready[id as usize] = ready;
    }

    /// Panic unless `id` is safe to read: its pending producer (if any) has
    /// been waited on.
    pub(crate) fn assert_ready(&self, id: u16, what: &str) {
        assert!(
            self.is_ready(id),
            "tile {id} used as {what} while a producer is in flight; call wait_ready first"
        );
    }

    #[inline(always)]
    pub(crate) fn word(&self, id: u16, lane: usize) -> u32 {
        debug_assert!(lane < self.tile_size);
        self.words[id as usize * self.tile_size + lane]
    }

    #[inline(always)]
    pub(crate) fn set_word(&mut self, id: u16, lane: usize, bits: u32) {
        debug_assert!(lane < self.tile_size);
        self.words[id as usize * self.tile_size + lane] = bits;
    }

    pub(crate) fn words(&self, id: u16) -> &[u32] {
        let base = id as usize * self.tile_size;
        &self.words[base..base + self.tile_size]
    }

    pub(crate) fn words_mut(&mut self, id: u16) -> &mut [u32] {
        let base = id as usize * self.tile_size;
        &mut self.words[base..base + self.tile_size]
    }
}

/// Register file: single-word scalars with a type tag fixed at allocation.
pub struct RegFile {
    words: Vec<u32>,
    elems: Vec<ElemType>,
    budget: usize,
}

impl RegFile {
    pub(crate) fn new(budget: usize) -> Self {
        Self {
            words: Vec::new(),
            elems: Vec::new(),
            budget,
        }
    }

    /// Allocate a fresh register. Fatal once the worker's budget is spent.
    pub(crate) fn alloc(&mut self, elem: ElemType, bits: u32) -> u16 {
        let id = self.words.len();
        assert!(
            id < self.budget,
            "scalar register budget exhausted ({} registers per worker)",
            self.budget
        );
        self.words.push(bits);
        self.elems.push(elem);
        id as u16
    }

    pub(crate) fn elem(&self, id: u16) -> ElemType {
        self.elems[id as usize]
    }

    #[inline(always)]
    pub(crate) fn bits(&self, id: u16) -> u32 {
        self.words[id as usize]
    }

    #[inline(always)]
    pub(crate) fn set_bits(&mut self, id: u16, bits: u32) {
        self.words[id as usize] = bits;
    }

    /// Convenience readback for the i32 control registers (bounds, strides,
    /// range-loop cursors).
    #[inline(always)]
    pub(crate) fn get_i32(&self, id: u16) -> i32 {
        self.bits(id) as i32
    }

    #[inline(always)]
    pub(crate) fn set_i32(&mut self, id: u16, value: i32) {
        self.set_bits(id, value as u32);
    }
}

//! maa-kernels: benchmarking harness for a memory-centric accelerator.
//!
//! The accelerator moves data between plain arrays ([`Region`]s) and an
//! on-chip scratchpad of fixed-size tiles through an asynchronous operation
//! set: strided streams, indirect gathers and scatters, atomic
//! read-modify-write, tile ALU work, and a resumable range-loop that
//! flattens ragged index spaces. This crate provides:
//! - **Interchangeable Backends**: a functional reference engine, a magic
//!   instruction loopback, and a feature-gated gem5 port, all behind one
//!   issue path
//! - **Checked Completion Protocol**: destination tiles stay pending until
//!   [`MaaContext::wait_ready`]; misuse is a fatal error, not silence
//! - **Typed Handles**: tiles and registers carry their element type, so
//!   operand mismatches fail at compile time where possible
//!
//! # Quick Start
//!
//! ```
//! use maa_kernels::{Maa, MaaConfig, Mask, Region, StreamBounds};
//!
//! let maa = Maa::new(MaaConfig { tile_size: 16, ..MaaConfig::default() }).unwrap();
//! let mut ctx = maa.context();
//!
//! let data = Region::from_slice(&[1i32, 2, 3, 4, 5, 6, 7, 8]);
//! let bounds = StreamBounds {
//!     min: ctx.new_reg(0),
//!     max: ctx.new_reg(8),
//!     stride: ctx.new_reg(2),
//! };
//! let t = ctx.new_tile::<i32>();
//! ctx.stream_load(&data, bounds, t, Mask::NONE);
//! ctx.wait_ready(t);
//! assert_eq!(ctx.tile(t), &[1, 3, 5, 7]);
//! ```

pub mod context;
pub mod engine;
pub mod error;
pub mod range_loop;
pub mod region;
pub mod roi;
pub mod types;

mod scratchpad;

pub use context::{Maa, MaaConfig, MaaContext};
pub use engine::{BackendKind, LoopbackPort, MagicPacket, MagicPort};
pub use error::{MaaError, MaaResult};
pub use range_loop::RangeLoop;
pub use region::{Region, RegionId};
pub use types::{
    AluOp, CmpOp, ElemType, Mask, RangeCursor, Reg, StreamBounds, Tile, TileElem,
};

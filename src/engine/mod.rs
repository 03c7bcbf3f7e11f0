//! Operation descriptors and the interchangeable execution backends.
//!
//! Every call on a worker context lowers to one operation descriptor and is
//! handed to the worker's engine. Backends are selected at setup time and
//! dispatched through a plain enum:
//! - the functional engine interprets descriptors in-process; it is the
//!   reference semantics every other backend must reproduce bit for bit.
//! - the magic engine encodes descriptors into fixed instruction packets and
//!   forwards them to a [`MagicPort`] (a simulator, or the in-crate
//!   [`LoopbackPort`] which decodes and re-runs the functional interpreter).

pub(crate) mod functional;
pub mod magic;

pub use magic::{LoopbackPort, MagicPacket, MagicPort};

use crate::region::{RegionInner, RegionRegistry};
use crate::scratchpad::{RegFile, Scratchpad};
use crate::types::{AluOp, CmpOp, ElemType, Mask};

/// Execution backend selector, fixed when the engine root is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// In-process functional emulation (the reference path).
    #[default]
    Functional,
    /// Magic-instruction encoding looped back into the functional
    /// interpreter; exercises the simulator wire format in-process.
    MagicLoopback,
    /// Magic-instruction encoding forwarded to the gem5 co-simulation
    /// callout. Execution happens outside this process.
    #[cfg(feature = "m5ops")]
    MagicGem5,
}

/// Array-source operand of a scatter or read-modify-write: a full tile of
/// lane values, or one register broadcast to every selected lane.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SrcOperand {
    Tile(u16),
    Reg(u16),
}

/// One asynchronous request against the tile/register store.
///
/// Tile and register operands are raw ids; `elem` is the element-type tag
/// resolved statically at the typed call site.
pub(crate) enum Op<'a> {
    StreamLoad {
        data: &'a RegionInner,
        elem: ElemType,
        min: u16,
        max: u16,
        stride: u16,
        dst: u16,
        mask: Mask,
    },
    StreamStore {
        data: &'a RegionInner,
        elem: ElemType,
        min: u16,
        max: u16,
        stride: u16,
        src: u16,
        mask: Mask,
    },
    IndirectLoad {
        data: &'a RegionInner,
        elem: ElemType,
        idx: u16,
        dst: u16,
        mask: Mask,
    },
    IndirectStore {
        data: &'a RegionInner,
        elem: ElemType,
        idx: u16,
        src: SrcOperand,
        mask: Mask,
        dump: Option<u16>,
    },
    IndirectRmw {
        data: &'a RegionInner,
        elem: ElemType,
        idx: u16,
        src: SrcOperand,
        op: AluOp,
        mask: Mask,
        dump: Option<u16>,
    },
    AluScalar {
        elem: ElemType,
        src: u16,
        rhs: u16,
        dst: u16,
        op: AluOp,
        mask: Mask,
    },
    AluVector {
        elem: ElemType,
        src1: u16,
        src2: u16,
        dst: u16,
        op: AluOp,
        mask: Mask,
    },
    CmpScalar {
        elem: ElemType,
        src: u16,
        rhs: u16,
        dst: u16,
        op: CmpOp,
        mask: Mask,
    },
    CmpVector {
        elem: ElemType,
        src1: u16,
        src2: u16,
        dst: u16,
        op: CmpOp,
        mask: Mask,
    },
    AluReduce {
        elem: ElemType,
        src: u16,
        dst_reg: u16,
        op: AluOp,
        mask: Mask,
    },
    RangeLoop {
        last_i: u16,
        last_j: u16,
        lo: u16,
        hi: u16,
        stride: u16,
        dst_outer: u16,
        dst_inner: u16,
        mask: Mask,
    },
}

/// The mutable scratchpad state an engine executes against, plus the region
/// table needed to resolve encoded array operands.
pub struct EngineState<'a> {
    pub(crate) spd: &'a mut Scratchpad,
    pub(crate) regs: &'a mut RegFile,
    pub(crate) regions: &'a RegionRegistry,
}

/// Backend instance owned by one worker context. Enum dispatch keeps the
/// issue path monomorphic and free of virtual calls for the default backend.
pub(crate) enum EngineImpl {
    Functional,
    Magic(MagicEngine),
}

impl EngineImpl {
    pub(crate) fn new(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Functional => EngineImpl::Functional,
            BackendKind::MagicLoopback => {
                EngineImpl::Magic(MagicEngine::new(Box::new(LoopbackPort)))
            }
            #[cfg(feature = "m5ops")]
            BackendKind::MagicGem5 => {
                EngineImpl::Magic(MagicEngine::new(Box::new(magic::Gem5Port)))
            }
        }
    }

    pub(crate) fn with_port(port: Box<dyn MagicPort>) -> Self {
        EngineImpl::Magic(MagicEngine::new(port))
    }

    pub(crate) fn execute(&mut self, op: &Op<'_>, state: &mut EngineState<'_>) {
        match self {
            EngineImpl::Functional => functional::execute(op, state),
            EngineImpl::Magic(m) => m.execute(op, state),
        }
    }

    /// Complete the pending producer of `tile`. The in-process backends
    /// execute at issue, so only an external port has work left to do here.
    pub(crate) fn wait(&mut self, tile: u16, state: &mut EngineState<'_>) {
        if let EngineImpl::Magic(m) = self {
            m.port.wait_ready(tile, state);
        }
    }
}

/// Magic-instruction backend: encodes ops and forwards them to a port.
pub(crate) struct MagicEngine {
    port: Box<dyn MagicPort>,
}

impl MagicEngine {
    fn new(port: Box<dyn MagicPort>) -> Self {
        Self { port }
    }

    fn execute(&mut self, op: &Op<'_>, state: &mut EngineState<'_>) {
        let packet = match magic::encode(op, state.regions) {
            Ok(p) => p,
            Err(err) => panic!("cannot issue through the magic backend: {err}"),
        };
        self.port.issue(&packet, state);
    }
}

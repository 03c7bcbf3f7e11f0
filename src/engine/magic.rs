//! Magic-instruction wire format and ports.
//!
//! Simulator backends consume the operation set as fixed little instruction
//! packets rather than interpreted descriptors: one opcode byte followed by
//! operand bytes in a canonical per-opcode order, padded into at most four
//! 64-bit words. Array operands travel as registered [`RegionId`]s, which is
//! why region registration is mandatory on this path.
//!
//! Two ports are provided: [`LoopbackPort`] decodes packets back into
//! descriptors and runs the functional interpreter (the lightweight
//! simulator stand-in, and the proof that the encoded path is observably
//! identical to the functional one), and `Gem5Port` (feature `m5ops`)
//! forwards raw words to the full-system co-simulation callout.

use crate::engine::{functional, EngineState, Op, SrcOperand};
use crate::error::MaaError;
use crate::region::{RegionId, RegionRegistry};
use crate::types::{AluOp, CmpOp, ElemType, Mask, MaskCond};

const PACKET_BYTES: usize = 32;

/// One encoded operation, at most four 64-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicPacket {
    bytes: [u8; PACKET_BYTES],
    len: u8,
}

impl MagicPacket {
    /// Packet payload as little-endian words, for ports that hand the
    /// encoding to an instruction-level interface.
    pub fn words(&self) -> [u64; 4] {
        let mut words = [0u64; 4];
        for (i, chunk) in self.bytes.chunks_exact(8).enumerate() {
            words[i] = u64::from_le_bytes(chunk.try_into().unwrap());
        }
        words
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

/// Issue-side seam for simulator backends.
///
/// A port owns the co-simulation channel for one worker's accelerator slice.
pub trait MagicPort: Send {
    /// Hand one encoded operation to the executing collaborator.
    fn issue(&mut self, packet: &MagicPacket, state: &mut EngineState<'_>);

    /// Block until the producer of `tile` has completed. In-process ports
    /// execute at issue time, so the default is a no-op.
    fn wait_ready(&mut self, _tile: u16, _state: &mut EngineState<'_>) {}
}

/// Decodes packets and re-runs the functional interpreter in-process.
pub struct LoopbackPort;

impl MagicPort for LoopbackPort {
    fn issue(&mut self, packet: &MagicPacket, state: &mut EngineState<'_>) {
        decode_and_execute(packet, state);
    }
}

/// Forwards encoded operations to the gem5 m5 callout.
#[cfg(feature = "m5ops")]
pub struct Gem5Port;

#[cfg(feature = "m5ops")]
extern "C" {
    fn m5_maa_issue(words: *const u64, len: u64);
    fn m5_maa_wait_ready(tile: u16);
}

#[cfg(feature = "m5ops")]
impl MagicPort for Gem5Port {
    fn issue(&mut self, packet: &MagicPacket, _state: &mut EngineState<'_>) {
        let words = packet.words();
        unsafe { m5_maa_issue(words.as_ptr(), words.len() as u64) };
    }

    fn wait_ready(&mut self, tile: u16, _state: &mut EngineState<'_>) {
        unsafe { m5_maa_wait_ready(tile) };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opcode {
    StreamLoad,
    StreamStore,
    IndirectLoad,
    IndirectStore,
    IndirectRmw,
    AluScalar,
    AluVector,
    CmpScalar,
    CmpVector,
    AluReduce,
    RangeLoop,
}

impl Opcode {
    const fn as_u8(self) -> u8 {
        match self {
            Opcode::StreamLoad => 0,
            Opcode::StreamStore => 1,
            Opcode::IndirectLoad => 2,
            Opcode::IndirectStore => 3,
            Opcode::IndirectRmw => 4,
            Opcode::AluScalar => 5,
            Opcode::AluVector => 6,
            Opcode::CmpScalar => 7,
            Opcode::CmpVector => 8,
            Opcode::AluReduce => 9,
            Opcode::RangeLoop => 10,
        }
    }

    const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Opcode::StreamLoad),
            1 => Some(Opcode::StreamStore),
            2 => Some(Opcode::IndirectLoad),
            3 => Some(Opcode::IndirectStore),
            4 => Some(Opcode::IndirectRmw),
            5 => Some(Opcode::AluScalar),
            6 => Some(Opcode::AluVector),
            7 => Some(Opcode::CmpScalar),
            8 => Some(Opcode::CmpVector),
            9 => Some(Opcode::AluReduce),
            10 => Some(Opcode::RangeLoop),
            _ => None,
        }
    }
}

struct Enc {
    bytes: [u8; PACKET_BYTES],
    pos: usize,
}

impl Enc {
    fn new(opcode: Opcode) -> Self {
        let mut e = Enc {
            bytes: [0; PACKET_BYTES],
            pos: 0,
        };
        e.put(opcode.as_u8());
        e
    }

    fn put(&mut self, byte: u8) {
        self.bytes[self.pos] = byte;
        self.pos += 1;
    }

    fn put_id(&mut self, id: u16) {
        debug_assert!(id < 256, "operand id {id} does not fit the encoding");
        self.put(id as u8);
    }

    fn put_mask(&mut self, mask: &Mask) {
        match mask.cond {
            None => self.put(0),
            Some(c) => {
                self.put(1);
                self.put_id(c.tile);
                self.put(c.elem.as_u8());
                self.put(c.op.as_u8());
                self.put_id(c.reg);
            }
        }
    }

    fn put_dump(&mut self, dump: Option<u16>) {
        match dump {
            None => self.put(0),
            Some(d) => {
                self.put(1);
                self.put_id(d);
            }
        }
    }

    fn put_src(&mut self, src: SrcOperand) {
        match src {
            SrcOperand::Tile(t) => {
                self.put(0);
                self.put_id(t);
            }
            SrcOperand::Reg(r) => {
                self.put(1);
                self.put_id(r);
            }
        }
    }

    fn finish(self) -> MagicPacket {
        MagicPacket {
            bytes: self.bytes,
            len: self.pos as u8,
        }
    }
}

struct Dec<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Dec<'a> {
    fn new(packet: &'a MagicPacket) -> Self {
        Dec {
            bytes: packet.as_bytes(),
            pos: 0,
        }
    }

    fn take(&mut self) -> Result<u8, MaaError> {
        let b = self
            .bytes
            .get(self.pos)
            .copied()
            .ok_or(MaaError::MalformedPacket("packet truncated"))?;
        self.pos += 1;
        Ok(b)
    }

    fn id(&mut self) -> Result<u16, MaaError> {
        Ok(self.take()? as u16)
    }

    fn elem(&mut self) -> Result<ElemType, MaaError> {
        ElemType::from_u8(self.take()?).ok_or(MaaError::MalformedPacket("bad element tag"))
    }

    fn alu_op(&mut self) -> Result<AluOp, MaaError> {
        AluOp::from_u8(self.take()?).ok_or(MaaError::MalformedPacket("bad ALU op"))
    }

    fn cmp_op(&mut self) -> Result<CmpOp, MaaError> {
        CmpOp::from_u8(self.take()?).ok_or(MaaError::MalformedPacket("bad compare op"))
    }

    fn mask(&mut self) -> Result<Mask, MaaError> {
        if self.take()? == 0 {
            return Ok(Mask::NONE);
        }
        let tile = self.id()?;
        let elem = self.elem()?;
        let op = self.cmp_op()?;
        let reg = self.id()?;
        Ok(Mask {
            cond: Some(MaskCond {
                tile,
                elem,
                op,
                reg,
            }),
        })
    }

    fn dump(&mut self) -> Result<Option<u16>, MaaError> {
        if self.take()? == 0 {
            Ok(None)
        } else {
            Ok(Some(self.id()?))
        }
    }

    fn src(&mut self) -> Result<SrcOperand, MaaError> {
        if self.take()? == 0 {
            Ok(SrcOperand::Tile(self.id()?))
        } else {
            Ok(SrcOperand::Reg(self.id()?))
        }
    }
}

/// Encode one descriptor. Array operands must already be registered.
pub(crate) fn encode(op: &Op<'_>, regions: &RegionRegistry) -> Result<MagicPacket, MaaError> {
    let region_of = |data: &crate::region::RegionInner| {
        regions.find(data).ok_or(MaaError::UnregisteredRegion)
    };
    let packet = match *op {
        Op::StreamLoad {
            data,
            elem,
            min,
            max,
            stride,
            dst,
            mask,
        } => {
            let mut e = Enc::new(Opcode::StreamLoad);
            e.put(region_of(data)?.0);
            e.put(elem.as_u8());
            e.put_id(min);
            e.put_id(max);
            e.put_id(stride);
            e.put_id(dst);
            e.put_mask(&mask);
            e.finish()
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
            let mut e = Enc::new(Opcode::StreamStore);
            e.put(region_of(data)?.0);
            e.put(elem.as_u8());
            e.put_id(min);
            e.put_id(max);
            e.put_id(stride);
            e.put_id(src);
            e.put_mask(&mask);
            e.finish()
        }
        Op::IndirectLoad {
            data,
            elem,
            idx,
            dst,
            mask,
        } => {
            let mut e = Enc::new(Opcode::IndirectLoad);
            e.put(region_of(data)?.0);
            e.put(elem.as_u8());
            e.put_id(idx);
            e.put_id(dst);
            e.put_mask(&mask);
            e.finish()
        }
        Op::IndirectStore {
            data,
            elem,
            idx,
            src,
            mask,
            dump,
        } => {
            let mut e = Enc::new(Opcode::IndirectStore);
            e.put(region_of(data)?.0);
            e.put(elem.as_u8());
            e.put_id(idx);
            e.put_src(src);
            e.put_dump(dump);
            e.put_mask(&mask);
            e.finish()
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
            let mut e = Enc::new(Opcode::IndirectRmw);
            e.put(region_of(data)?.0);
            e.put(elem.as_u8());
            e.put_id(idx);
            e.put_src(src);
            e.put(op.as_u8());
            e.put_dump(dump);
            e.put_mask(&mask);
            e.finish()
        }
        Op::AluScalar {
            elem,
            src,
            rhs,
            dst,
            op,
            mask,
        } => {
            let mut e = Enc::new(Opcode::AluScalar);
            e.put(elem.as_u8());
            e.put_id(src);
            e.put_id(rhs);
            e.put_id(dst);
            e.put(op.as_u8());
            e.put_mask(&mask);
            e.finish()
        }
        Op::AluVector {
            elem,
            src1,
            src2,
            dst,
            op,
            mask,
        } => {
            let mut e = Enc::new(Opcode::AluVector);
            e.put(elem.as_u8());
            e.put_id(src1);
            e.put_id(src2);
            e.put_id(dst);
            e.put(op.as_u8());
            e.put_mask(&mask);
            e.finish()
        }
        Op::CmpScalar {
            elem,
            src,
            rhs,
            dst,
            op,
            mask,
        } => {
            let mut e = Enc::new(Opcode::CmpScalar);
            e.put(elem.as_u8());
            e.put_id(src);
            e.put_id(rhs);
            e.put_id(dst);
            e.put(op.as_u8());
            e.put_mask(&mask);
            e.finish()
        }
        Op::CmpVector {
            elem,
            src1,
            src2,
            dst,
            op,
            mask,
        } => {
            let mut e = Enc::new(Opcode::CmpVector);
            e.put(elem.as_u8());
            e.put_id(src1);
            e.put_id(src2);
            e.put_id(dst);
            e.put(op.as_u8());
            e.put_mask(&mask);
            e.finish()
        }
        Op::AluReduce {
            elem,
            src,
            dst_reg,
            op,
            mask,
        } => {
            let mut e = Enc::new(Opcode::AluReduce);
            e.put(elem.as_u8());
            e.put_id(src);
            e.put_id(dst_reg);
            e.put(op.as_u8());
            e.put_mask(&mask);
            e.finish()
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
            let mut e = Enc::new(Opcode::RangeLoop);
            e.put_id(last_i);
            e.put_id(last_j);
            e.put_id(lo);
            e.put_id(hi);
            e.put_id(stride);
            e.put_id(dst_outer);
            e.put_id(dst_inner);
            e.put_mask(&mask);
            e.finish()
        }
    };
    Ok(packet)
}

/// Decode one packet and run it through the functional interpreter.
///
/// Malformed packets are a fatal condition: the only producer of packets in
/// this process is [`encode`], so corruption means a protocol bug.
pub(crate) fn decode_and_execute(packet: &MagicPacket, state: &mut EngineState<'_>) {
    if let Err(err) = try_decode_and_execute(packet, state) {
        panic!("magic packet rejected: {err}");
    }
}

fn try_decode_and_execute(
    packet: &MagicPacket,
    state: &mut EngineState<'_>,
) -> Result<(), MaaError> {
    let mut d = Dec::new(packet);
    let opcode =
        Opcode::from_u8(d.take()?).ok_or(MaaError::MalformedPacket("unknown opcode"))?;

    // Region-addressed opcodes resolve their array first so the borrow of
    // the registry entry outlives the rebuilt descriptor.
    let region = match opcode {
        Opcode::StreamLoad
        | Opcode::StreamStore
        | Opcode::IndirectLoad
        | Opcode::IndirectStore
        | Opcode::IndirectRmw => {
            let id = RegionId(d.take()?);
            Some(
                state
                    .regions
                    .lookup(id)
                    .ok_or(MaaError::UnregisteredRegion)?,
            )
        }
        _ => None,
    };

    let op = match opcode {
        Opcode::StreamLoad => Op::StreamLoad {
            data: region.as_deref().unwrap(),
            elem: d.elem()?,
            min: d.id()?,
            max: d.id()?,
            stride: d.id()?,
            dst: d.id()?,
            mask: d.mask()?,
        },
        Opcode::StreamStore => Op::StreamStore {
            data: region.as_deref().unwrap(),
            elem: d.elem()?,
            min: d.id()?,
            max: d.id()?,
            stride: d.id()?,
            src: d.id()?,
            mask: d.mask()?,
        },
        Opcode::IndirectLoad => Op::IndirectLoad {
            data: region.as_deref().unwrap(),
            elem: d.elem()?,
            idx: d.id()?,
            dst: d.id()?,
            mask: d.mask()?,
        },
        Opcode::IndirectStore => Op::IndirectStore {
            data: region.as_deref().unwrap(),
            elem: d.elem()?,
            idx: d.id()?,
            src: d.src()?,
            dump: d.dump()?,
            mask: d.mask()?,
        },
        Opcode::IndirectRmw => Op::IndirectRmw {
            data: region.as_deref().unwrap(),
            elem: d.elem()?,
            idx: d.id()?,
            src: d.src()?,
            op: d.alu_op()?,
            dump: d.dump()?,
            mask: d.mask()?,
        },
        Opcode::AluScalar => Op::AluScalar {
            elem: d.elem()?,
            src: d.id()?,
            rhs: d.id()?,
            dst: d.id()?,
            op: d.alu_op()?,
            mask: d.mask()?,
        },
        Opcode::AluVector => Op::AluVector {
            elem: d.elem()?,
            src1: d.id()?,
            src2: d.id()?,
            dst: d.id()?,
            op: d.alu_op()?,
            mask: d.mask()?,
        },
        Opcode::CmpScalar => Op::CmpScalar {
            elem: d.elem()?,
            src: d.id()?,
            rhs: d.id()?,
            dst: d.id()?,
            op: d.cmp_op()?,
            mask: d.mask()?,
        },
        Opcode::CmpVector => Op::CmpVector {
            elem: d.elem()?,
            src1: d.id()?,
            src2: d.id()?,
            dst: d.id()?,
            op: d.cmp_op()?,
            mask: d.mask()?,
        },
        Opcode::AluReduce => Op::AluReduce {
            elem: d.elem()?,
            src: d.id()?,
            dst_reg: d.id()?,
            op: d.alu_op()?,
            mask: d.mask()?,
        },
        Opcode::RangeLoop => Op::RangeLoop {
            last_i: d.id()?,
            last_j: d.id()?,
            lo: d.id()?,
            hi: d.id()?,
            stride: d.id()?,
            dst_outer: d.id()?,
            dst_inner: d.id()?,
            mask: d.mask()?,
        },
    };
    functional::execute(&op, state);
    Ok(())
}

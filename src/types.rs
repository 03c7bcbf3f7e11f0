//! Shared types for the tile/register scratchpad and the operation set.

use std::marker::PhantomData;

/// Element type identifier for const-time operand dispatch.
///
/// Every tile, register, and region is bound to one of these at creation,
/// and every operation carries the tag so the engine can decode its operands
/// without runtime type inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemType {
    Int32,
    Float32,
}

impl ElemType {
    /// Convert to u8 for the magic instruction encoding (zero-cost).
    #[inline(always)]
    pub const fn as_u8(self) -> u8 {
        match self {
            ElemType::Int32 => 0,
            ElemType::Float32 => 1,
        }
    }

    /// Convert from u8 when decoding a magic instruction packet.
    #[inline(always)]
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(ElemType::Int32),
            1 => Some(ElemType::Float32),
            _ => None,
        }
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for i32 {}
    impl Sealed for f32 {}
}

/// Trait for scratchpad-compatible 32-bit element types.
///
/// Implemented for `i32` and `f32`, and sealed: tiles, registers, and
/// regions store raw 32-bit words, and the context's slice views rely on
/// every implementor having exactly `u32`'s size and alignment.
/// `to_bits`/`from_bits` define the (lossless) lane codec. Zero-cost via
/// monomorphization.
pub trait TileElem: sealed::Sealed + Copy + Default + PartialOrd + Send + Sync + 'static {
    /// Compile-time type tag attached to every issued operation.
    const ELEM: ElemType;

    fn to_bits(self) -> u32;
    fn from_bits(bits: u32) -> Self;

    /// Evaluate a binary ALU operation. Bitwise and shift operations on
    /// float lanes are a fatal type error.
    fn alu(self, rhs: Self, op: AluOp) -> Self;

    /// Evaluate a comparison, producing a 0/1 condition lane.
    fn cmp(self, rhs: Self, op: CmpOp) -> bool;

    /// Identity value for a masked reduction with `op`.
    fn reduce_identity(op: AluOp) -> Self;
}

impl TileElem for i32 {
    const ELEM: ElemType = ElemType::Int32;

    #[inline(always)]
    fn to_bits(self) -> u32 {
        self as u32
    }
    #[inline(always)]
    fn from_bits(bits: u32) -> Self {
        bits as i32
    }

    #[inline(always)]
    fn alu(self, rhs: Self, op: AluOp) -> Self {
        match op {
            AluOp::Add => self.wrapping_add(rhs),
            AluOp::Sub => self.wrapping_sub(rhs),
            AluOp::Mul => self.wrapping_mul(rhs),
            AluOp::Div => self / rhs,
            AluOp::Min => self.min(rhs),
            AluOp::Max => self.max(rhs),
            AluOp::And => self & rhs,
            AluOp::Or => self | rhs,
            AluOp::Xor => self ^ rhs,
            AluOp::Shl => self.wrapping_shl(rhs as u32),
            AluOp::Shr => self.wrapping_shr(rhs as u32),
        }
    }

    #[inline(always)]
    fn cmp(self, rhs: Self, op: CmpOp) -> bool {
        cmp_ord(self, rhs, op)
    }

    #[inline(always)]
    fn reduce_identity(op: AluOp) -> Self {
        match op {
            AluOp::Add | AluOp::Sub | AluOp::Or | AluOp::Xor => 0,
            AluOp::Mul | AluOp::Div => 1,
            AluOp::Min => i32::MAX,
            AluOp::Max => i32::MIN,
            AluOp::And => -1,
            AluOp::Shl | AluOp::Shr => panic!("shift is not a reduction operation"),
        }
    }
}

impl TileElem for f32 {
    const ELEM: ElemType = ElemType::Float32;

    #[inline(always)]
    fn to_bits(self) -> u32 {
        self.to_bits()
    }
    #[inline(always)]
    fn from_bits(bits: u32) -> Self {
        f32::from_bits(bits)
    }

    #[inline(always)]
    fn alu(self, rhs: Self, op: AluOp) -> Self {
        match op {
            AluOp::Add => self + rhs,
            AluOp::Sub => self - rhs,
            AluOp::Mul => self * rhs,
            AluOp::Div => self / rhs,
            AluOp::Min => self.min(rhs),
            AluOp::Max => self.max(rhs),
            AluOp::And | AluOp::Or | AluOp::Xor | AluOp::Shl | AluOp::Shr => {
                panic!("bitwise ALU op {op:?} is unsupported for float lanes")
            }
        }
    }

    #[inline(always)]
    fn cmp(self, rhs: Self, op: CmpOp) -> bool {
        cmp_ord(self, rhs, op)
    }

    #[inline(always)]
    fn reduce_identity(op: AluOp) -> Self {
        match op {
            AluOp::Add | AluOp::Sub => 0.0,
            AluOp::Mul | AluOp::Div => 1.0,
            AluOp::Min => f32::MAX,
            AluOp::Max => f32::MIN,
            _ => panic!("reduce op {op:?} is unsupported for float lanes"),
        }
    }
}

#[inline(always)]
fn cmp_ord<T: PartialOrd>(a: T, b: T, op: CmpOp) -> bool {
    match op {
        CmpOp::Gt => a > b,
        CmpOp::Gte => a >= b,
        CmpOp::Lt => a < b,
        CmpOp::Lte => a <= b,
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
    }
}

/// Binary ALU operations over tile lanes.
///
/// `And`/`Or`/`Xor`/`Shl`/`Shr` are integer-only; read-modify-write accepts
/// only `Add`..`Max` (the associative subset the engine applies atomically).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl AluOp {
    /// True for the associative subset accepted by indirect read-modify-write.
    #[inline(always)]
    pub const fn is_rmw(self) -> bool {
        matches!(
            self,
            AluOp::Add | AluOp::Sub | AluOp::Mul | AluOp::Div | AluOp::Min | AluOp::Max
        )
    }

    #[inline(always)]
    pub const fn as_u8(self) -> u8 {
        match self {
            AluOp::Add => 0,
            AluOp::Sub => 1,
            AluOp::Mul => 2,
            AluOp::Div => 3,
            AluOp::Min => 4,
            AluOp::Max => 5,
            AluOp::And => 6,
            AluOp::Or => 7,
            AluOp::Xor => 8,
            AluOp::Shl => 9,
            AluOp::Shr => 10,
        }
    }

    #[inline(always)]
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(AluOp::Add),
            1 => Some(AluOp::Sub),
            2 => Some(AluOp::Mul),
            3 => Some(AluOp::Div),
            4 => Some(AluOp::Min),
            5 => Some(AluOp::Max),
            6 => Some(AluOp::And),
            7 => Some(AluOp::Or),
            8 => Some(AluOp::Xor),
            9 => Some(AluOp::Shl),
            10 => Some(AluOp::Shr),
            _ => None,
        }
    }
}

/// Lane comparison operations; results are dense 0/1 `i32` condition tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
}

impl CmpOp {
    #[inline(always)]
    pub const fn as_u8(self) -> u8 {
        match self {
            CmpOp::Gt => 0,
            CmpOp::Gte => 1,
            CmpOp::Lt => 2,
            CmpOp::Lte => 3,
            CmpOp::Eq => 4,
            CmpOp::Ne => 5,
        }
    }

    #[inline(always)]
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(CmpOp::Gt),
            1 => Some(CmpOp::Gte),
            2 => Some(CmpOp::Lt),
            3 => Some(CmpOp::Lte),
            4 => Some(CmpOp::Eq),
            5 => Some(CmpOp::Ne),
            _ => None,
        }
    }
}

/// Handle to a scratchpad tile bound to element type `T`.
///
/// Handles are plain indices into the owning worker context; they are `Copy`
/// and carry the element type so operand tags resolve statically.
pub struct Tile<T> {
    pub(crate) id: u16,
    _elem: PhantomData<fn() -> T>,
}

impl<T> Tile<T> {
    #[inline(always)]
    pub(crate) fn new(id: u16) -> Self {
        Self {
            id,
            _elem: PhantomData,
        }
    }
}

impl<T> Clone for Tile<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Tile<T> {}

impl<T> std::fmt::Debug for Tile<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tile({})", self.id)
    }
}

/// Handle to a scalar register bound to element type `T`.
pub struct Reg<T> {
    pub(crate) id: u16,
    _elem: PhantomData<fn() -> T>,
}

impl<T> Reg<T> {
    #[inline(always)]
    pub(crate) fn new(id: u16) -> Self {
        Self {
            id,
            _elem: PhantomData,
        }
    }
}

impl<T> Clone for Reg<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Reg<T> {}

impl<T> std::fmt::Debug for Reg<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Reg({})", self.id)
    }
}

/// The `min`/`max`/`stride` register trio driving stream loads and stores.
#[derive(Debug, Clone, Copy)]
pub struct StreamBounds {
    pub min: Reg<i32>,
    pub max: Reg<i32>,
    pub stride: Reg<i32>,
}

/// Lane predicate for masked operations.
///
/// Either all lanes participate, or only lanes `k` where
/// `cond[k] cmp threshold` holds. Masked-off lanes keep their slot in the
/// destination (in-place masking); the logical size still counts every
/// scanned lane.
#[derive(Debug, Clone, Copy)]
pub struct Mask {
    pub(crate) cond: Option<MaskCond>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct MaskCond {
    pub(crate) tile: u16,
    pub(crate) elem: ElemType,
    pub(crate) op: CmpOp,
    pub(crate) reg: u16,
}

impl Mask {
    /// All lanes participate.
    pub const NONE: Mask = Mask { cond: None };

    /// Only lanes where `cond[k] op threshold` holds participate.
    pub fn lanes<C: TileElem>(cond: Tile<C>, op: CmpOp, threshold: Reg<C>) -> Mask {
        Mask {
            cond: Some(MaskCond {
                tile: cond.id,
                elem: C::ELEM,
                op,
                reg: threshold.id,
            }),
        }
    }

    #[inline(always)]
    pub(crate) fn cond_tile(&self) -> Option<u16> {
        self.cond.map(|c| c.tile)
    }
}

/// Resumption point of an in-progress range-loop flattening.
///
/// `i` holds the next outer slot, `j` the next inner index or `-1` for
/// "start of the next row". Reset to `(0, -1)` before a fresh traversal and
/// never reuse across unrelated bound tiles without resetting.
#[derive(Debug, Clone, Copy)]
pub struct RangeCursor {
    pub i: Reg<i32>,
    pub j: Reg<i32>,
}

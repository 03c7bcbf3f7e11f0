//! Setup-time error surface.
//!
//! Only configuration and region registration are recoverable. Contract
//! violations in the hot path (capacity exhaustion at allocation, type-tag
//! mismatches, readiness violations) abort with a panic, since they are
//! programmer errors in benchmark code, not runtime conditions.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaaError {
    #[error("tile size {0} is not a power of two")]
    TileSizeNotPowerOfTwo(usize),
    #[error("tile size {got} out of supported range {min}..={max}")]
    TileSizeOutOfRange { got: usize, min: usize, max: usize },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("region table full ({capacity} slots)")]
    RegionTableFull { capacity: usize },
    #[error("region is not registered with the engine")]
    UnregisteredRegion,
    #[error("malformed magic packet: {0}")]
    MalformedPacket(&'static str),
}

pub type MaaResult<T> = Result<T, MaaError>;

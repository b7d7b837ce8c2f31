//! Continuation capability
//!
//! The only boundary the jump machinery needs beyond plain calls: a host that
//! can unwind the whole active stack down to the driving loop, serializing
//! frames into a capture buffer, and later rebuild the stack from that buffer.
//!
//! ```text
//!   Normal --begin_unwind--> Unwinding --end_unwind--> Normal
//!   Normal --begin_rewind--> Rewinding --end_rewind--> Normal
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::jump::ContextId;

pub mod asyncify;
pub mod recording;

pub use asyncify::Asyncify;
pub use recording::{HostCall, RecordingHost};

/* ===================== Buffer References ===================== */

/// Which of a jump context's two buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferSide {
    /// Unwound into by capture, rewound from (twice) by the driving loop
    Capture,
    /// Unwound into by transfer, never rewound from
    Transfer,
}

/// Names one capture buffer when talking to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferRef {
    pub context: ContextId,
    pub side: BufferSide,
}

impl BufferRef {
    pub fn capture(context: ContextId) -> Self {
        Self {
            context,
            side: BufferSide::Capture,
        }
    }

    pub fn transfer(context: ContextId) -> Self {
        Self {
            context,
            side: BufferSide::Transfer,
        }
    }
}

impl fmt::Display for BufferRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self.side {
            BufferSide::Capture => "capture",
            BufferSide::Transfer => "transfer",
        };
        write!(f, "{}/{}", self.context, side)
    }
}

/* ===================== Host State ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Normal,
    Unwinding(BufferRef),
    Rewinding(BufferRef),
}

impl HostState {
    pub fn is_rewinding(&self) -> bool {
        matches!(self, HostState::Rewinding(_))
    }

    pub fn is_unwinding(&self) -> bool {
        matches!(self, HostState::Unwinding(_))
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostState::Normal => write!(f, "normal"),
            HostState::Unwinding(buf) => write!(f, "unwinding into {}", buf),
            HostState::Rewinding(buf) => write!(f, "rewinding from {}", buf),
        }
    }
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("host cannot {op} while {state}")]
    InvalidTransition { op: &'static str, state: HostState },
}

/* ===================== Capability ===================== */

/// The four operations of the unwind/rewind capability
pub trait ContinuationHost {
    /// Start unwinding the whole stack into `buf`
    fn begin_unwind(&mut self, buf: BufferRef) -> Result<(), HostError>;

    /// Acknowledge that the unwind reached the driving loop
    fn end_unwind(&mut self) -> Result<(), HostError>;

    /// Start rebuilding the stack from `buf`
    fn begin_rewind(&mut self, buf: BufferRef) -> Result<(), HostError>;

    /// Acknowledge that the rewind reached its resumption point
    fn end_rewind(&mut self) -> Result<(), HostError>;

    fn state(&self) -> HostState;
}

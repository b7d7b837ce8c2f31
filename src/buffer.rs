//! Capture buffers
//!
//! A capture buffer is the unit the host unwinds into and rewinds from. It is
//! a fixed byte region plus three cursors:
//!
//! - `top`: current top of the used part of the region
//! - `end`: fixed end of the region
//! - `unwound`: value of `top` when an unwind into this buffer completed
//!
//! Frames are stored as a stack. Each frame is a JSON payload followed by a
//! 4-byte little-endian length trailer, so the frame ending at `top` can always
//! be located and popped. Popping moves `top` back but never erases bytes,
//! which is what lets the same snapshot be rewound more than once.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::trace;

/// Size of every capture buffer region in bytes
pub const CAPTURE_BUFFER_SIZE: usize = 1000;

const LEN_TRAILER: usize = std::mem::size_of::<u32>();

/* ===================== Errors ===================== */

#[derive(Debug, Error)]
pub enum BufferError {
    /// A frame does not fit between `top` and `end`
    #[error("capture buffer overflow: frame needs {needed} bytes, {available} available")]
    Overflow { needed: usize, available: usize },

    /// A pop was requested with no frame left below `top`
    #[error("capture buffer underflow: no frame below offset {top}")]
    Underflow { top: usize },

    #[error("corrupt frame in capture buffer: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/* ===================== Capture Buffer ===================== */

#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    top: usize,
    end: usize,
    unwound: usize,
    region: Box<[u8; CAPTURE_BUFFER_SIZE]>,
}

impl CaptureBuffer {
    /// Create an empty buffer. All cursors start at zero, so nothing fits until
    /// [`CaptureBuffer::init`] is called.
    pub fn new() -> Self {
        Self {
            top: 0,
            end: 0,
            unwound: 0,
            region: Box::new([0; CAPTURE_BUFFER_SIZE]),
        }
    }

    /// Prepare the buffer for an unwind
    pub fn init(&mut self) {
        self.top = 0;
        self.end = CAPTURE_BUFFER_SIZE;
    }

    /// Remember where the completed unwind left `top`
    pub fn note_unwound(&mut self) {
        self.unwound = self.top;
    }

    /// Move `top` back to the noted unwind position so the snapshot can be
    /// rewound again
    pub fn rewind_cursor(&mut self) {
        self.top = self.unwound;
    }

    pub fn top(&self) -> usize {
        self.top
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn unwound(&self) -> usize {
        self.unwound
    }

    /// Bytes still free between `top` and `end`
    pub fn remaining(&self) -> usize {
        self.end.saturating_sub(self.top)
    }

    /* ===================== Host Side ===================== */

    /// Serialize one frame at `top` and advance past it.
    ///
    /// Called while the host is unwinding into this buffer. Nothing is written
    /// when the frame does not fit.
    pub fn push_frame<T: Serialize>(&mut self, frame: &T) -> Result<(), BufferError> {
        let payload = serde_json::to_vec(frame)?;
        let needed = payload.len() + LEN_TRAILER;
        let available = self.remaining();
        let len = u32::try_from(payload.len())
            .map_err(|_| BufferError::Overflow { needed, available })?;
        if needed > available {
            return Err(BufferError::Overflow { needed, available });
        }

        let start = self.top;
        self.region[start..start + payload.len()].copy_from_slice(&payload);
        self.region[start + payload.len()..start + needed].copy_from_slice(&len.to_le_bytes());
        self.top += needed;

        trace!(bytes = needed, top = self.top, "pushed frame");
        Ok(())
    }

    /// Read the frame ending at `top` and move `top` before it.
    ///
    /// Called while the host is rewinding from this buffer.
    pub fn pop_frame<T: DeserializeOwned>(&mut self) -> Result<T, BufferError> {
        if self.top < LEN_TRAILER {
            return Err(BufferError::Underflow { top: self.top });
        }

        let mut len_bytes = [0u8; LEN_TRAILER];
        len_bytes.copy_from_slice(&self.region[self.top - LEN_TRAILER..self.top]);
        let len = u32::from_le_bytes(len_bytes) as usize;

        let Some(start) = (self.top - LEN_TRAILER).checked_sub(len) else {
            return Err(BufferError::Underflow { top: self.top });
        };

        let frame = serde_json::from_slice(&self.region[start..start + len])?;
        self.top = start;

        trace!(bytes = len + LEN_TRAILER, top = self.top, "popped frame");
        Ok(frame)
    }
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self::new()
    }
}

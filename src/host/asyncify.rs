//! Simulated Asyncify host
//!
//! Tracks which direction the stack is moving and which buffer is involved.
//! The frames themselves are moved by the instrumented interpreter, which asks
//! this host for its state after every call and on every function entry.

use tracing::debug;

use super::{BufferRef, ContinuationHost, HostError, HostState};

#[derive(Debug)]
pub struct Asyncify {
    state: HostState,
}

impl Asyncify {
    pub fn new() -> Self {
        Self {
            state: HostState::Normal,
        }
    }

    fn invalid(&self, op: &'static str) -> HostError {
        HostError::InvalidTransition {
            op,
            state: self.state,
        }
    }
}

impl Default for Asyncify {
    fn default() -> Self {
        Self::new()
    }
}

impl ContinuationHost for Asyncify {
    fn begin_unwind(&mut self, buf: BufferRef) -> Result<(), HostError> {
        if self.state != HostState::Normal {
            return Err(self.invalid("begin unwind"));
        }
        debug!(buffer = %buf, "start unwind");
        self.state = HostState::Unwinding(buf);
        Ok(())
    }

    fn end_unwind(&mut self) -> Result<(), HostError> {
        if !self.state.is_unwinding() {
            return Err(self.invalid("end unwind"));
        }
        debug!("stop unwind");
        self.state = HostState::Normal;
        Ok(())
    }

    fn begin_rewind(&mut self, buf: BufferRef) -> Result<(), HostError> {
        if self.state != HostState::Normal {
            return Err(self.invalid("begin rewind"));
        }
        debug!(buffer = %buf, "start rewind");
        self.state = HostState::Rewinding(buf);
        Ok(())
    }

    fn end_rewind(&mut self) -> Result<(), HostError> {
        if !self.state.is_rewinding() {
            return Err(self.invalid("end rewind"));
        }
        debug!("stop rewind");
        self.state = HostState::Normal;
        Ok(())
    }

    fn state(&self) -> HostState {
        self.state
    }
}

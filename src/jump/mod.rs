//! # Jump contexts
//!
//! A jump context models one outstanding setjmp/longjmp pairing on top of the
//! whole-stack unwind/rewind capability in [`crate::host`].
//!
//! ## Protocol
//!
//! The capture buffer is unwound into once and rewound from twice:
//!
//! 1. `capture` on a fresh context registers it as active and unwinds the
//!    stack into the capture buffer. The driving loop notes the unwound
//!    position and rewinds straight back, so `capture` is re-entered and
//!    returns 0 ("setjmp just returned").
//! 2. `transfer` stores the value and unwinds the stack into the transfer
//!    buffer. The driving loop resets the capture buffer cursor and rewinds
//!    it again, so `capture` is re-entered a second time and returns the
//!    transferred value.
//!
//! Only control location and the carried value survive a transfer. Locals
//! mutated after the capture are replayed from the capture-time snapshot.
//!
//! At most one context may be in flight; [`ActiveContext`] names it.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::buffer::CaptureBuffer;
use crate::host::{BufferRef, BufferSide, ContinuationHost, HostError};


/* ===================== Identifiers ===================== */

/// Index of a jump context in [`Contexts`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(pub usize);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "jmp#{}", self.0)
    }
}

/* ===================== Errors ===================== */

#[derive(Debug, Error)]
pub enum JumpError {
    /// A capture was started while another context is still in flight
    #[error("cannot capture {requested}: {active} is already in flight")]
    Busy {
        requested: ContextId,
        active: ContextId,
    },

    /// Transfer to a context with no live captured point
    #[error("transfer to {0} without a matching capture")]
    NotCaptured(ContextId),

    #[error("unknown jump context {0}")]
    Unknown(ContextId),

    #[error(transparent)]
    Host(#[from] HostError),
}

/* ===================== State ===================== */

/// How far a context has progressed through its capture/transfer cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Never captured, or the previous cycle finished
    Fresh,
    /// The capture unwound the stack; the next rewind returns 0
    Unwound,
    /// The capture returned 0; the next rewind returns the carried value
    Resumed,
}

/// Which operation started the unwind the driving loop is looking at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnwindReason {
    Capture,
    Transfer,
}

/// Result of a capture call
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// The stack is unwinding; the caller must unwind its own frame
    Unwinding,
    /// The capture point was resumed with this value
    Returned(i32),
}

/// Proof that a transfer started an unwind the caller has to propagate
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unwinding;

/* ===================== Active-Context Register ===================== */

/// Names the single jump context currently being unwound or rewound
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveContext(Option<ContextId>);

impl ActiveContext {
    pub fn new() -> Self {
        Self(None)
    }

    pub fn current(&self) -> Option<ContextId> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn set(&mut self, id: ContextId) {
        self.0 = Some(id);
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }
}

/* ===================== Jump Context ===================== */

#[derive(Debug, Clone)]
pub struct JumpContext {
    pub capture_buf: CaptureBuffer,
    pub transfer_buf: CaptureBuffer,
    carried_value: i32,
    phase: Phase,
    unwind_reason: Option<UnwindReason>,
}

impl JumpContext {
    pub fn new() -> Self {
        Self {
            capture_buf: CaptureBuffer::new(),
            transfer_buf: CaptureBuffer::new(),
            carried_value: 0,
            phase: Phase::Fresh,
            unwind_reason: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn unwind_reason(&self) -> Option<UnwindReason> {
        self.unwind_reason
    }

    pub fn carried_value(&self) -> i32 {
        self.carried_value
    }

    /// Return to `Fresh`, dropping any captured point
    pub fn reset(&mut self) {
        self.carried_value = 0;
        self.phase = Phase::Fresh;
        self.unwind_reason = None;
    }

    pub fn buffer_mut(&mut self, side: BufferSide) -> &mut CaptureBuffer {
        match side {
            BufferSide::Capture => &mut self.capture_buf,
            BufferSide::Transfer => &mut self.transfer_buf,
        }
    }

    /// setjmp: capture the current execution point.
    ///
    /// On a fresh context this starts an unwind and returns
    /// [`Capture::Unwinding`]; the real return happens when the driving loop
    /// rewinds back here.
    pub fn capture<H: ContinuationHost>(
        &mut self,
        id: ContextId,
        host: &mut H,
        active: &mut ActiveContext,
    ) -> Result<Capture, JumpError> {
        if self.phase == Phase::Resumed && !host.state().is_rewinding() {
            // Captured again before any transfer: the old point is dropped.
            debug!(context = %id, "recapture replaces pending capture point");
            self.reset();
            if active.current() == Some(id) {
                active.clear();
            }
        }

        match self.phase {
            Phase::Fresh => {
                if let Some(other) = active.current() {
                    if other != id {
                        return Err(JumpError::Busy {
                            requested: id,
                            active: other,
                        });
                    }
                }

                self.capture_buf.init();
                host.begin_unwind(BufferRef::capture(id))?;
                active.set(id);
                self.unwind_reason = Some(UnwindReason::Capture);
                self.phase = Phase::Unwound;

                debug!(context = %id, "capture unwinding");
                Ok(Capture::Unwinding)
            }

            Phase::Unwound => {
                host.end_rewind()?;
                self.phase = Phase::Resumed;

                debug!(context = %id, "capture returned 0");
                Ok(Capture::Returned(0))
            }

            Phase::Resumed => {
                host.end_rewind()?;
                active.clear();
                let value = self.carried_value;
                self.reset();

                debug!(context = %id, value, "capture returned from transfer");
                Ok(Capture::Returned(value))
            }
        }
    }

    /// longjmp: resume the captured point of this context with `value`.
    ///
    /// The context must be the active one and its capture must already have
    /// returned 0.
    pub fn transfer<H: ContinuationHost>(
        &mut self,
        id: ContextId,
        value: i32,
        host: &mut H,
        active: &ActiveContext,
    ) -> Result<Unwinding, JumpError> {
        if active.current() != Some(id) || self.phase != Phase::Resumed {
            return Err(JumpError::NotCaptured(id));
        }

        self.transfer_buf.init();
        host.begin_unwind(BufferRef::transfer(id))?;
        self.carried_value = value;
        self.unwind_reason = Some(UnwindReason::Transfer);

        debug!(context = %id, value, "transfer unwinding");
        Ok(Unwinding)
    }
}

impl Default for JumpContext {
    fn default() -> Self {
        Self::new()
    }
}

/* ===================== Context Arena ===================== */

/// All jump contexts a program declared
#[derive(Debug, Clone, Default)]
pub struct Contexts {
    slots: Vec<JumpContext>,
}

impl Contexts {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn with_count(count: usize) -> Self {
        Self {
            slots: (0..count).map(|_| JumpContext::new()).collect(),
        }
    }

    pub fn declare(&mut self) -> ContextId {
        self.slots.push(JumpContext::new());
        ContextId(self.slots.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, id: ContextId) -> Result<&JumpContext, JumpError> {
        self.slots.get(id.0).ok_or(JumpError::Unknown(id))
    }

    pub fn get_mut(&mut self, id: ContextId) -> Result<&mut JumpContext, JumpError> {
        self.slots.get_mut(id.0).ok_or(JumpError::Unknown(id))
    }

    pub fn buffer_mut(&mut self, buf: BufferRef) -> Result<&mut CaptureBuffer, JumpError> {
        Ok(self.get_mut(buf.context)?.buffer_mut(buf.side))
    }
}

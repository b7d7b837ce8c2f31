//! # Runtime - the driving loop
//!
//! The driving loop sits below the user program. Every capture and transfer
//! unwinds the entire stack back to it; it then decides whether the program
//! is done or which buffer to rewind.
//!
//! ## Loop
//!
//! 1. Enter the program (first call, or a resume while the host is rewinding)
//! 2. No active context: the program ran to the end, stop
//! 3. Acknowledge the unwind
//! 4. Capture unwind: note the capture buffer position.
//!    Transfer unwind: move the capture buffer cursor back to that position.
//! 5. Rewind from the capture buffer and loop
//!
//! The transfer buffer is unwound into but never rewound from.

use thiserror::Error;
use tracing::{debug, info};

use crate::buffer::BufferError;
use crate::host::{BufferRef, ContinuationHost, HostError, HostState};
use crate::jump::{
    ActiveContext, Capture, ContextId, Contexts, JumpError, UnwindReason, Unwinding,
};

#[cfg(test)]
mod tests;

/* ===================== Errors ===================== */

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Jump(#[from] JumpError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// The program unwound to the loop with no context in flight
    #[error("stack unwound with no active jump context")]
    UnwindWithoutContext,

    /// A context unwound without recording why
    #[error("{0} unwound without an unwind reason")]
    MissingUnwindReason(ContextId),

    /// A rewound frame belongs to a different function than the one entered
    #[error("rewind restored a frame of function {found} while entering function {expected}")]
    FrameMismatch { expected: usize, found: usize },

    #[error("invalid bytecode: {0}")]
    InvalidCode(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("value {0} does not fit a jump value")]
    ValueOutOfRange(i64),

    /// Script calls nested deeper than the configured limit
    #[error("call depth exceeded the limit of {0}")]
    CallDepthExceeded(usize),

    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/* ===================== Machine ===================== */

/// Everything the jump machinery shares across one run: the host, the
/// declared contexts and the active-context register.
#[derive(Debug)]
pub struct Machine<H> {
    pub host: H,
    pub contexts: Contexts,
    pub active: ActiveContext,
}

impl<H: ContinuationHost> Machine<H> {
    pub fn new(host: H, contexts: Contexts) -> Self {
        Self {
            host,
            contexts,
            active: ActiveContext::new(),
        }
    }

    /// setjmp on context `id`
    pub fn capture(&mut self, id: ContextId) -> Result<Capture, JumpError> {
        let Machine {
            host,
            contexts,
            active,
        } = self;
        contexts.get_mut(id)?.capture(id, host, active)
    }

    /// longjmp to context `id` with `value`
    pub fn transfer(&mut self, id: ContextId, value: i32) -> Result<Unwinding, JumpError> {
        let Machine {
            host,
            contexts,
            active,
        } = self;
        contexts.get_mut(id)?.transfer(id, value, host, active)
    }

    /// Push a frame into the buffer the host is currently unwinding into
    pub fn save_frame<T: serde::Serialize>(&mut self, frame: &T) -> RuntimeResult<()> {
        match self.host.state() {
            HostState::Unwinding(buf) => {
                self.contexts.buffer_mut(buf)?.push_frame(frame)?;
                Ok(())
            }
            state => Err(HostError::InvalidTransition {
                op: "save a frame",
                state,
            }
            .into()),
        }
    }

    /// Pop a frame from the buffer the host is currently rewinding from
    pub fn restore_frame<T: serde::de::DeserializeOwned>(&mut self) -> RuntimeResult<T> {
        match self.host.state() {
            HostState::Rewinding(buf) => Ok(self.contexts.buffer_mut(buf)?.pop_frame()?),
            state => Err(HostError::InvalidTransition {
                op: "restore a frame",
                state,
            }
            .into()),
        }
    }
}

/* ===================== Program ===================== */

/// How a call into the program came back to the driving loop
#[derive(Debug, Clone, PartialEq)]
pub enum Exit<T> {
    /// The entry point returned normally
    Completed(T),
    /// The stack unwound down to the loop
    Unwound,
}

/// A user program the driving loop can enter and re-enter
pub trait Program<H: ContinuationHost> {
    type Output;

    /// Call the entry point. While the host is rewinding this must rebuild the
    /// stack from the rewind buffer instead of starting over.
    fn enter(&mut self, machine: &mut Machine<H>) -> RuntimeResult<Exit<Self::Output>>;
}

/// Final state of a run
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    /// What the entry point returned
    pub value: T,
    /// Number of rewinds the loop issued
    pub rewinds: usize,
    /// Whether the program ended with a capture that was never transferred to
    pub abandoned: Option<ContextId>,
}

/* ===================== Driving Loop ===================== */

/// Run `program` to completion, rewinding captured points as needed
pub fn run<H, P>(machine: &mut Machine<H>, program: &mut P) -> RuntimeResult<Outcome<P::Output>>
where
    H: ContinuationHost,
    P: Program<H>,
{
    let mut rewinds = 0;

    loop {
        let exit = program.enter(machine)?;

        let Some(id) = machine.active.current() else {
            return match exit {
                Exit::Completed(value) => {
                    info!(rewinds, "program finished");
                    Ok(Outcome {
                        value,
                        rewinds,
                        abandoned: None,
                    })
                }
                Exit::Unwound => Err(RuntimeError::UnwindWithoutContext),
            };
        };

        if let Exit::Completed(value) = exit {
            // Returned normally with a capture still pending
            info!(context = %id, "program finished with an untransferred capture");
            machine.active.clear();
            machine.contexts.get_mut(id)?.reset();
            return Ok(Outcome {
                value,
                rewinds,
                abandoned: Some(id),
            });
        }

        machine.host.end_unwind()?;

        let ctx = machine.contexts.get_mut(id)?;
        match ctx.unwind_reason() {
            Some(UnwindReason::Capture) => {
                debug!(context = %id, "capture unwound, noting resumption point");
                ctx.capture_buf.note_unwound();
            }
            Some(UnwindReason::Transfer) => {
                debug!(context = %id, "transfer unwound, replaying capture point");
                ctx.capture_buf.rewind_cursor();
            }
            None => return Err(RuntimeError::MissingUnwindReason(id)),
        }

        machine.host.begin_rewind(BufferRef::capture(id))?;
        rewinds += 1;
    }
}

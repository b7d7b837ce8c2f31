pub mod buffer;
pub mod cli;
pub mod config;
pub mod console;
pub mod host;
pub mod jump;
pub mod runtime;
pub mod script;

// Re-export the jump machinery
pub use buffer::{CaptureBuffer, CAPTURE_BUFFER_SIZE};
pub use host::{Asyncify, ContinuationHost, HostState, RecordingHost};
pub use jump::{ContextId, Contexts, JumpContext, JumpError};
pub use runtime::{run, Exit, Machine, Outcome, Program, RuntimeError};

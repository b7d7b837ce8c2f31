//! Host decorator that logs every capability call

use tracing::info;

use super::{BufferRef, ContinuationHost, HostError, HostState};

/// One call made against the continuation capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCall {
    BeginUnwind(BufferRef),
    EndUnwind,
    BeginRewind(BufferRef),
    EndRewind,
}

/// Wraps a host and keeps the ordered list of calls made through it.
///
/// Calls are recorded before being forwarded, so rejected calls show up too.
#[derive(Debug)]
pub struct RecordingHost<H> {
    inner: H,
    calls: Vec<HostCall>,
    echo: bool,
}

impl<H: ContinuationHost> RecordingHost<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            calls: Vec::new(),
            echo: false,
        }
    }

    /// Also emit an `info` event for each call as it happens
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn calls(&self) -> &[HostCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<HostCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn into_inner(self) -> H {
        self.inner
    }

    fn record(&mut self, call: HostCall) {
        if self.echo {
            info!(?call, "host call");
        }
        self.calls.push(call);
    }
}

impl<H: ContinuationHost> ContinuationHost for RecordingHost<H> {
    fn begin_unwind(&mut self, buf: BufferRef) -> Result<(), HostError> {
        self.record(HostCall::BeginUnwind(buf));
        self.inner.begin_unwind(buf)
    }

    fn end_unwind(&mut self) -> Result<(), HostError> {
        self.record(HostCall::EndUnwind);
        self.inner.end_unwind()
    }

    fn begin_rewind(&mut self, buf: BufferRef) -> Result<(), HostError> {
        self.record(HostCall::BeginRewind(buf));
        self.inner.begin_rewind(buf)
    }

    fn end_rewind(&mut self) -> Result<(), HostError> {
        self.record(HostCall::EndRewind);
        self.inner.end_rewind()
    }

    fn state(&self) -> HostState {
        self.inner.state()
    }
}

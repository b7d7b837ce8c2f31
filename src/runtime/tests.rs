//! Driving loop tests
//!
//! The programs here are instrumented by hand: each function checks the host
//! state on entry and after every call, the same way the script interpreter
//! does, so the loop can be exercised without a parser or bytecode.

use serde::{Deserialize, Serialize};

use super::*;
use crate::host::{Asyncify, HostCall, HostState, RecordingHost};
use crate::jump::Phase;

type TestHost = RecordingHost<Asyncify>;

fn machine(contexts: usize) -> Machine<TestHost> {
    Machine::new(RecordingHost::new(Asyncify::new()), Contexts::with_count(contexts))
}

/* ===================== setjmp / longjmp scenario ===================== */

/// Call sites a frame of `user_program` can be suspended at
#[derive(Debug, Serialize, Deserialize, PartialEq)]
enum MainSite {
    Setjmp,
    Inner,
}

#[derive(Debug, Serialize, Deserialize)]
struct InnerFrame;

struct Scenario {
    env: ContextId,
    out: Vec<&'static str>,
}

impl Scenario {
    fn inner(&mut self, m: &mut Machine<TestHost>) -> RuntimeResult<Exit<()>> {
        if m.host.state().is_rewinding() {
            let InnerFrame = m.restore_frame()?;
        }
        self.out.push("call longjmp");
        let _unwinding = m.transfer(self.env, 1)?;
        m.save_frame(&InnerFrame)?;
        Ok(Exit::Unwound)
    }
}

impl Program<TestHost> for Scenario {
    type Output = ();

    fn enter(&mut self, m: &mut Machine<TestHost>) -> RuntimeResult<Exit<()>> {
        let site = if m.host.state().is_rewinding() {
            Some(m.restore_frame::<MainSite>()?)
        } else {
            self.out.push("start");
            None
        };

        let returned = match site {
            None | Some(MainSite::Setjmp) => match m.capture(self.env)? {
                Capture::Unwinding => {
                    m.save_frame(&MainSite::Setjmp)?;
                    return Ok(Exit::Unwound);
                }
                Capture::Returned(v) => v,
            },
            Some(MainSite::Inner) => 0,
        };

        if returned == 0 {
            if site != Some(MainSite::Inner) {
                self.out.push("call inner");
            }
            if let Exit::Unwound = self.inner(m)? {
                m.save_frame(&MainSite::Inner)?;
                return Ok(Exit::Unwound);
            }
        } else {
            self.out.push("back from longjmp");
        }

        self.out.push("end");
        Ok(Exit::Completed(()))
    }
}

#[test]
fn test_scenario_output_order() {
    let mut m = machine(1);
    let mut program = Scenario {
        env: ContextId(0),
        out: Vec::new(),
    };

    let outcome = run(&mut m, &mut program).unwrap();

    assert_eq!(
        program.out,
        vec!["start", "call inner", "call longjmp", "back from longjmp", "end"]
    );
    assert_eq!(outcome.rewinds, 2);
    assert_eq!(outcome.abandoned, None);
    assert!(m.active.is_empty());
    assert_eq!(m.host.state(), HostState::Normal);
}

#[test]
fn test_scenario_host_calls() {
    let mut m = machine(1);
    let mut program = Scenario {
        env: ContextId(0),
        out: Vec::new(),
    };
    run(&mut m, &mut program).unwrap();

    let capture = BufferRef::capture(ContextId(0));
    let transfer = BufferRef::transfer(ContextId(0));
    assert_eq!(
        m.host.calls(),
        &[
            HostCall::BeginUnwind(capture),
            HostCall::EndUnwind,
            HostCall::BeginRewind(capture),
            HostCall::EndRewind,
            HostCall::BeginUnwind(transfer),
            HostCall::EndUnwind,
            HostCall::BeginRewind(capture),
            HostCall::EndRewind,
        ]
    );
}

#[test]
fn test_scenario_buffers() {
    let mut m = machine(1);
    let mut program = Scenario {
        env: ContextId(0),
        out: Vec::new(),
    };
    run(&mut m, &mut program).unwrap();

    let ctx = m.contexts.get(ContextId(0)).unwrap();
    // One frame captured, replayed twice, fully drained by the last rewind
    assert!(ctx.capture_buf.unwound() > 0);
    assert_eq!(ctx.capture_buf.top(), 0);
    // Two frames unwound into the transfer side and never read back
    assert!(ctx.transfer_buf.top() > ctx.capture_buf.unwound());
    assert_eq!(ctx.phase(), Phase::Fresh);
}

/* ===================== Termination ===================== */

struct Plain;

impl Program<TestHost> for Plain {
    type Output = i64;

    fn enter(&mut self, _m: &mut Machine<TestHost>) -> RuntimeResult<Exit<i64>> {
        Ok(Exit::Completed(7))
    }
}

#[test]
fn test_program_without_jumps_runs_once() {
    let mut m = machine(0);
    let outcome = run(&mut m, &mut Plain).unwrap();

    assert_eq!(outcome.value, 7);
    assert_eq!(outcome.rewinds, 0);
    assert!(m.host.calls().is_empty());
}

/// Captures once and returns without ever transferring
struct CaptureOnly {
    env: ContextId,
    entries: usize,
}

impl Program<TestHost> for CaptureOnly {
    type Output = i32;

    fn enter(&mut self, m: &mut Machine<TestHost>) -> RuntimeResult<Exit<i32>> {
        self.entries += 1;
        if m.host.state().is_rewinding() {
            let () = m.restore_frame()?;
        }
        match m.capture(self.env)? {
            Capture::Unwinding => {
                m.save_frame(&())?;
                Ok(Exit::Unwound)
            }
            Capture::Returned(v) => Ok(Exit::Completed(v)),
        }
    }
}

#[test]
fn test_untransferred_capture_is_abandoned() {
    let mut m = machine(1);
    let mut program = CaptureOnly {
        env: ContextId(0),
        entries: 0,
    };

    let outcome = run(&mut m, &mut program).unwrap();

    assert_eq!(outcome.value, 0);
    assert_eq!(outcome.rewinds, 1);
    assert_eq!(outcome.abandoned, Some(ContextId(0)));
    assert_eq!(program.entries, 2);
    assert!(m.active.is_empty());
    assert_eq!(m.contexts.get(ContextId(0)).unwrap().phase(), Phase::Fresh);
}

/// Claims to have unwound without anything in flight
struct Liar;

impl Program<TestHost> for Liar {
    type Output = ();

    fn enter(&mut self, _m: &mut Machine<TestHost>) -> RuntimeResult<Exit<()>> {
        Ok(Exit::Unwound)
    }
}

#[test]
fn test_unwind_without_context_is_an_error() {
    let mut m = machine(0);
    let err = run(&mut m, &mut Liar).unwrap_err();
    assert!(matches!(err, RuntimeError::UnwindWithoutContext));
}

/* ===================== Single-shot ===================== */

/// Transfers back to the same capture point a second time
struct Twice {
    env: ContextId,
    seen: Vec<i32>,
}

impl Program<TestHost> for Twice {
    type Output = ();

    fn enter(&mut self, m: &mut Machine<TestHost>) -> RuntimeResult<Exit<()>> {
        if m.host.state().is_rewinding() {
            let () = m.restore_frame()?;
        }
        let v = match m.capture(self.env)? {
            Capture::Unwinding => {
                m.save_frame(&())?;
                return Ok(Exit::Unwound);
            }
            Capture::Returned(v) => v,
        };
        self.seen.push(v);
        if v < 2 {
            let _unwinding = m.transfer(self.env, v + 1)?;
            m.save_frame(&())?;
            return Ok(Exit::Unwound);
        }
        Ok(Exit::Completed(()))
    }
}

#[test]
fn test_captured_point_is_single_shot() {
    let mut m = machine(1);
    let mut program = Twice {
        env: ContextId(0),
        seen: Vec::new(),
    };

    let err = run(&mut m, &mut program).unwrap_err();

    assert_eq!(program.seen, vec![0, 1]);
    assert!(matches!(
        err,
        RuntimeError::Jump(JumpError::NotCaptured(ContextId(0)))
    ));
}

#[test]
fn test_save_frame_requires_unwinding_host() {
    let mut m = machine(1);
    let err = m.save_frame(&1u8).unwrap_err();
    assert!(matches!(err, RuntimeError::Host(_)));

    let err = m.restore_frame::<u8>().unwrap_err();
    assert!(matches!(err, RuntimeError::Host(_)));
}

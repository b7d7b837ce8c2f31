//! Bytecode interpreter instrumented for whole-stack unwind/rewind
//!
//! Every script function call is a real call of [`Interpreter::call`], so the
//! script's call stack is the interpreter's Rust call stack. The host only
//! says which way the stack is moving; the interpreter moves the frames:
//!
//! - After a call returns [`Flow::Unwound`], the caller pushes its own frame
//!   into the buffer being unwound into and returns `Flow::Unwound` as well.
//!   The saved pc still points at the call.
//! - On entry while the host is rewinding, a function pops its frame instead
//!   of starting fresh and re-issues the call at the saved pc. The innermost
//!   re-issued call is the `setjmp` that ends the rewind.
//!
//! Frames hold locals as they were when the frame was saved, so a transfer
//! back to a capture point sees capture-time locals.

use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::trace;

use super::ast::BinaryOp;
use super::bytecode::{Builtin, Callee, FuncId, Module, Op, Val};
use crate::console::Console;
use crate::host::ContinuationHost;
use crate::jump::Capture;
use crate::runtime::{Machine, RuntimeError, RuntimeResult};

/// What a suspended function activation looks like in a capture buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub func: FuncId,
    pub pc: usize,
    pub locals: Vec<Val>,
    pub stack: Vec<Val>,
}

/// How a call came back to its caller
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Return(Val),
    /// The stack is unwinding to the driving loop
    Unwound,
}

/// Script calls nest this deep before a run is aborted
pub const DEFAULT_MAX_CALL_DEPTH: usize = 512;

pub struct Interpreter<'a, W> {
    module: &'a Module,
    console: &'a mut Console<W>,
    depth: usize,
    max_depth: usize,
}

impl<'a, W: Write> Interpreter<'a, W> {
    pub fn new(module: &'a Module, console: &'a mut Console<W>) -> Self {
        Self {
            module,
            console,
            depth: 0,
            max_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Call a script function, or resume it while the host is rewinding
    pub fn call<H: ContinuationHost>(
        &mut self,
        machine: &mut Machine<H>,
        func: FuncId,
        args: Vec<Val>,
    ) -> RuntimeResult<Flow> {
        // Each script call nests a native call
        if self.depth >= self.max_depth {
            return Err(RuntimeError::CallDepthExceeded(self.max_depth));
        }

        self.depth += 1;
        let flow = self.execute(machine, func, args);
        self.depth -= 1;
        flow
    }

    fn execute<H: ContinuationHost>(
        &mut self,
        machine: &mut Machine<H>,
        func: FuncId,
        args: Vec<Val>,
    ) -> RuntimeResult<Flow> {
        let module = self.module;
        let function = module
            .function(func)
            .ok_or_else(|| RuntimeError::InvalidCode(format!("no function {}", func.0)))?;

        let mut frame = if machine.host.state().is_rewinding() {
            let frame: Frame = machine.restore_frame()?;
            if frame.func != func {
                return Err(RuntimeError::FrameMismatch {
                    expected: func.0,
                    found: frame.func.0,
                });
            }
            trace!(function = %function.name, pc = frame.pc, "resumed frame");
            frame
        } else {
            let mut locals = args;
            locals.resize(function.locals, Val::Unit);
            Frame {
                func,
                pc: 0,
                locals,
                stack: Vec::new(),
            }
        };

        loop {
            let op = function.code.get(frame.pc).ok_or_else(|| {
                RuntimeError::InvalidCode(format!(
                    "{} ran off the end at {}",
                    function.name, frame.pc
                ))
            })?;
            frame.pc += 1;

            match op {
                Op::Unit => frame.stack.push(Val::Unit),
                Op::Int(n) => frame.stack.push(Val::Int(*n)),
                Op::Str(s) => frame.stack.push(Val::Str(s.clone())),
                Op::Buf(id) => frame.stack.push(Val::Buf(*id)),

                Op::Load(slot) => {
                    let val = frame.locals.get(*slot).cloned().ok_or_else(|| bad_slot(*slot))?;
                    frame.stack.push(val);
                }
                Op::Store(slot) => {
                    let val = pop(&mut frame)?;
                    *frame.locals.get_mut(*slot).ok_or_else(|| bad_slot(*slot))? = val;
                }

                Op::Pop => {
                    pop(&mut frame)?;
                }
                Op::Dup => {
                    let top = frame.stack.last().cloned().ok_or_else(underflow)?;
                    frame.stack.push(top);
                }

                Op::Not => {
                    let val = pop(&mut frame)?;
                    frame.stack.push(Val::Int(!val.is_truthy() as i64));
                }
                Op::Neg => {
                    let n = expect_int(pop(&mut frame)?, "-")?;
                    frame.stack.push(Val::Int(n.wrapping_neg()));
                }
                Op::Binary(op) => {
                    let right = pop(&mut frame)?;
                    let left = pop(&mut frame)?;
                    frame.stack.push(binary(*op, left, right)?);
                }

                Op::Jump(target) => frame.pc = *target,
                Op::JumpIfFalse(target) => {
                    if !pop(&mut frame)?.is_truthy() {
                        frame.pc = *target;
                    }
                }
                Op::JumpIfTrue(target) => {
                    if pop(&mut frame)?.is_truthy() {
                        frame.pc = *target;
                    }
                }

                Op::Call { callee, argc } => {
                    let base = frame.stack.len().checked_sub(*argc).ok_or_else(underflow)?;
                    let args = frame.stack[base..].to_vec();

                    let flow = match callee {
                        Callee::Func(id) => self.call(machine, *id, args)?,
                        Callee::Builtin(builtin) => self.builtin(machine, *builtin, args)?,
                    };

                    match flow {
                        Flow::Return(val) => {
                            frame.stack.truncate(base);
                            frame.stack.push(val);
                        }
                        Flow::Unwound => {
                            // Resume by issuing this call again
                            frame.pc -= 1;
                            machine.save_frame(&frame)?;
                            trace!(function = %function.name, pc = frame.pc, "unwound frame");
                            return Ok(Flow::Unwound);
                        }
                    }
                }

                Op::Return => return Ok(Flow::Return(pop(&mut frame)?)),
            }
        }
    }

    fn builtin<H: ContinuationHost>(
        &mut self,
        machine: &mut Machine<H>,
        builtin: Builtin,
        args: Vec<Val>,
    ) -> RuntimeResult<Flow> {
        let mut args = args.into_iter();
        let mut arg = || {
            args.next().ok_or_else(|| {
                RuntimeError::InvalidCode(format!("missing argument to {}", builtin.name()))
            })
        };

        match builtin {
            Builtin::Puts => {
                self.console.puts(arg()?.to_string().as_bytes())?;
                Ok(Flow::Return(Val::Unit))
            }

            Builtin::Print => {
                self.console.print(arg()?.to_string().as_bytes())?;
                Ok(Flow::Return(Val::Unit))
            }

            Builtin::Setjmp => {
                let id = expect_buf(arg()?, "setjmp")?;
                match machine.capture(id)? {
                    Capture::Unwinding => Ok(Flow::Unwound),
                    Capture::Returned(value) => Ok(Flow::Return(Val::Int(value as i64))),
                }
            }

            Builtin::Longjmp => {
                let id = expect_buf(arg()?, "longjmp")?;
                let value = expect_int(arg()?, "longjmp")?;
                let value = i32::try_from(value).map_err(|_| RuntimeError::ValueOutOfRange(value))?;
                let _unwinding = machine.transfer(id, value)?;
                Ok(Flow::Unwound)
            }
        }
    }
}

/* ===================== Helpers ===================== */

fn pop(frame: &mut Frame) -> RuntimeResult<Val> {
    frame.stack.pop().ok_or_else(underflow)
}

fn underflow() -> RuntimeError {
    RuntimeError::InvalidCode("operand stack underflow".to_string())
}

fn bad_slot(slot: usize) -> RuntimeError {
    RuntimeError::InvalidCode(format!("no local slot {}", slot))
}

fn expect_int(val: Val, context: &str) -> RuntimeResult<i64> {
    match val {
        Val::Int(n) => Ok(n),
        other => Err(RuntimeError::Type(format!(
            "{} expects an int, got {}",
            context,
            other.type_name()
        ))),
    }
}

fn expect_buf(val: Val, context: &str) -> RuntimeResult<crate::jump::ContextId> {
    match val {
        Val::Buf(id) => Ok(id),
        other => Err(RuntimeError::Type(format!(
            "{} expects a jmp_buf, got {}",
            context,
            other.type_name()
        ))),
    }
}

fn binary(op: BinaryOp, left: Val, right: Val) -> RuntimeResult<Val> {
    let truth = |b: bool| Val::Int(b as i64);

    match (op, left, right) {
        (BinaryOp::Eq, l, r) => Ok(truth(l == r)),
        (BinaryOp::Ne, l, r) => Ok(truth(l != r)),
        (BinaryOp::Add, Val::Str(l), r) => Ok(Val::Str(format!("{}{}", l, r))),
        (BinaryOp::Add, l @ Val::Int(_), Val::Str(r)) => Ok(Val::Str(format!("{}{}", l, r))),
        (op, Val::Int(l), Val::Int(r)) => match op {
            BinaryOp::Add => Ok(Val::Int(l.wrapping_add(r))),
            BinaryOp::Sub => Ok(Val::Int(l.wrapping_sub(r))),
            BinaryOp::Mul => Ok(Val::Int(l.wrapping_mul(r))),
            BinaryOp::Div if r == 0 => Err(RuntimeError::DivisionByZero),
            BinaryOp::Div => Ok(Val::Int(l.wrapping_div(r))),
            BinaryOp::Rem if r == 0 => Err(RuntimeError::DivisionByZero),
            BinaryOp::Rem => Ok(Val::Int(l.wrapping_rem(r))),
            BinaryOp::Lt => Ok(truth(l < r)),
            BinaryOp::Le => Ok(truth(l <= r)),
            BinaryOp::Gt => Ok(truth(l > r)),
            BinaryOp::Ge => Ok(truth(l >= r)),
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::And | BinaryOp::Or => {
                let msg = format!("{} is not a binary op", op.symbol());
                Err(RuntimeError::InvalidCode(msg))
            }
        },
        (op, l, r) => Err(RuntimeError::Type(format!(
            "cannot apply {} to {} and {}",
            op.symbol(),
            l.type_name(),
            r.type_name()
        ))),
    }
}

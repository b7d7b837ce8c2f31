//! # Jump scripts
//!
//! A small C-like language for writing programs that use `setjmp` and
//! `longjmp`, run under the driving loop.
//!
//! ```text
//! jmp_buf env;
//!
//! fn main() {
//!     if (!setjmp(env)) {
//!         longjmp(env, 1);
//!     } else {
//!         puts("jumped");
//!     }
//! }
//! ```
//!
//! Source is parsed with PEST into an AST, compiled to per-function bytecode
//! and executed by an interpreter that cooperates with the host to unwind and
//! rewind its call stack.

use std::io::Write;
use thiserror::Error;

use crate::console::Console;
use crate::host::ContinuationHost;
use crate::jump::Contexts;
use crate::runtime::{self, Exit, Machine, Outcome, Program, RuntimeError, RuntimeResult};

pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod interpreter;
pub mod parser;

#[cfg(test)]
mod tests;

pub use bytecode::{FuncId, Module, Val};
pub use compiler::{compile, CompileError};
pub use interpreter::{Flow, Frame, Interpreter, DEFAULT_MAX_CALL_DEPTH};
pub use parser::{parse_script, ParseError};

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Parse and compile a script
pub fn load(source: &str) -> Result<Module, ScriptError> {
    let def = parse_script(source)?;
    Ok(compile(&def)?)
}

/* ===================== Program ===================== */

/// A compiled script bound to its entry function and output
pub struct ScriptProgram<W> {
    module: Module,
    entry: FuncId,
    console: Console<W>,
    max_call_depth: usize,
}

impl<W: Write> ScriptProgram<W> {
    pub fn new(module: Module, entry: &str, out: W) -> Result<Self, CompileError> {
        let entry = compiler::entry_point(&module, entry)?;
        Ok(Self {
            module,
            entry,
            console: Console::new(out),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        })
    }

    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }

    /// One fresh jump context per declared `jmp_buf`
    pub fn contexts(&self) -> Contexts {
        Contexts::with_count(self.module.jmp_bufs.len())
    }

    pub fn into_output(self) -> W {
        self.console.into_inner()
    }
}

impl<H: ContinuationHost, W: Write> Program<H> for ScriptProgram<W> {
    type Output = Val;

    fn enter(&mut self, machine: &mut Machine<H>) -> RuntimeResult<Exit<Val>> {
        let mut interpreter =
            Interpreter::new(&self.module, &mut self.console).with_max_depth(self.max_call_depth);
        let exit = match interpreter.call(machine, self.entry, Vec::new())? {
            Flow::Return(val) => Exit::Completed(val),
            Flow::Unwound => Exit::Unwound,
        };
        self.console.flush()?;
        Ok(exit)
    }
}

/* ===================== Running ===================== */

/// Everything left over after a script ran
#[derive(Debug)]
pub struct ScriptRun<H, W> {
    pub outcome: Outcome<Val>,
    pub machine: Machine<H>,
    pub output: W,
}

/// Compile `source` and run its `entry` function to completion on `host`
pub fn run_source<H, W>(
    source: &str,
    entry: &str,
    host: H,
    out: W,
) -> Result<ScriptRun<H, W>, ScriptError>
where
    H: ContinuationHost,
    W: Write,
{
    let module = load(source)?;
    let program = ScriptProgram::new(module, entry, out)?;
    Ok(run_program(program, host)?)
}

/// Run an already compiled program to completion on `host`
pub fn run_program<H, W>(mut program: ScriptProgram<W>, host: H) -> RuntimeResult<ScriptRun<H, W>>
where
    H: ContinuationHost,
    W: Write,
{
    let mut machine = Machine::new(host, program.contexts());

    let outcome = runtime::run(&mut machine, &mut program)?;

    Ok(ScriptRun {
        outcome,
        machine,
        output: program.into_output(),
    })
}

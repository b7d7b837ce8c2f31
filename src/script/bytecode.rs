//! Compiled form of a script
//!
//! Each function is a flat list of stack-machine ops. Calls are explicit ops,
//! which gives every suspension point a program counter: a frame saved while
//! a call unwinds records the pc of that call and is resumed by issuing the
//! same call again.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

use super::ast::BinaryOp;
use crate::jump::ContextId;

/* ===================== Values ===================== */

/// Runtime value type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Val {
    Unit,
    Int(i64),
    Str(String),
    /// A declared `jmp_buf`
    Buf(ContextId),
}

impl Val {
    /// Check if value is truthy (for conditionals)
    pub fn is_truthy(&self) -> bool {
        match self {
            Val::Unit => false,
            Val::Int(n) => *n != 0,
            Val::Str(s) => !s.is_empty(),
            Val::Buf(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Unit => "unit",
            Val::Int(_) => "int",
            Val::Str(_) => "string",
            Val::Buf(_) => "jmp_buf",
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Unit => Ok(()),
            Val::Int(n) => write!(f, "{}", n),
            Val::Str(s) => write!(f, "{}", s),
            Val::Buf(id) => write!(f, "{}", id),
        }
    }
}

/* ===================== Calls ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuncId(pub usize);

/// Functions provided by the runtime rather than the script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Builtin {
    /// Write a value and a newline
    Puts,
    /// Write a value
    Print,
    Setjmp,
    Longjmp,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "puts" => Some(Builtin::Puts),
            "print" => Some(Builtin::Print),
            "setjmp" => Some(Builtin::Setjmp),
            "longjmp" => Some(Builtin::Longjmp),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Puts => "puts",
            Builtin::Print => "print",
            Builtin::Setjmp => "setjmp",
            Builtin::Longjmp => "longjmp",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Builtin::Puts | Builtin::Print | Builtin::Setjmp => 1,
            Builtin::Longjmp => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Callee {
    Func(FuncId),
    Builtin(Builtin),
}

/* ===================== Ops ===================== */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    Unit,
    Int(i64),
    Str(String),
    Buf(ContextId),
    Load(usize),
    Store(usize),
    Pop,
    Dup,
    Not,
    Neg,
    Binary(BinaryOp),
    Jump(usize),
    /// Pop the condition, jump when falsy
    JumpIfFalse(usize),
    /// Pop the condition, jump when truthy
    JumpIfTrue(usize),
    /// Arguments stay on the stack until the callee returns
    Call { callee: Callee, argc: usize },
    Return,
}

/* ===================== Module ===================== */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub arity: usize,
    /// Slots for parameters and every `let` in the body
    pub locals: usize,
    pub code: Vec<Op>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Module {
    pub functions: Vec<Function>,
    /// `jmp_buf` names, indexed by [`ContextId`]
    pub jmp_bufs: Vec<String>,
}

impl Module {
    pub fn function(&self, id: FuncId) -> Option<&Function> {
        self.functions.get(id.0)
    }

    pub fn find(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(FuncId)
    }

    /// Human-readable listing of every function
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        for (i, name) in self.jmp_bufs.iter().enumerate() {
            let _ = writeln!(out, "jmp_buf {} ; {}", name, ContextId(i));
        }
        for function in &self.functions {
            let _ = writeln!(
                out,
                "\nfn {}/{} (locals: {})",
                function.name, function.arity, function.locals
            );
            for (pc, op) in function.code.iter().enumerate() {
                let _ = writeln!(out, "  {:4}  {}", pc, self.describe(op));
            }
        }
        out
    }

    fn describe(&self, op: &Op) -> String {
        match op {
            Op::Str(s) => format!("str {:?}", s),
            Op::Buf(id) => {
                let name = self.jmp_bufs.get(id.0).map(String::as_str).unwrap_or("?");
                format!("buf {}", name)
            }
            Op::Binary(op) => format!("binary {}", op.symbol()),
            Op::Call {
                callee: Callee::Func(id),
                argc,
            } => {
                let name = self.function(*id).map(|f| f.name.as_str()).unwrap_or("?");
                format!("call {} ({} args)", name, argc)
            }
            Op::Call {
                callee: Callee::Builtin(b),
                argc,
            } => format!("call builtin {} ({} args)", b.name(), argc),
            other => format!("{:?}", other).to_lowercase(),
        }
    }
}

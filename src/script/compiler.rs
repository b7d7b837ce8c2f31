//! Lowers the AST into per-function bytecode
//!
//! Names are resolved here: locals to slots, `jmp_buf` globals to context
//! ids, calls to user functions or builtins.

use std::collections::HashMap;
use thiserror::Error;

use super::ast::{BinaryOp, Expr, FunctionDef, ScriptDef, Span, Stmt, UnaryOp};
use super::bytecode::{Builtin, Callee, FuncId, Function, Module, Op};
use crate::jump::ContextId;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{span}: unknown variable `{name}`")]
    UnknownVariable { name: String, span: Span },

    #[error("{span}: unknown function `{name}`")]
    UnknownFunction { name: String, span: Span },

    #[error("{span}: `{name}` takes {expected} argument(s), {found} given")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },

    #[error("{span}: `{name}` is already defined")]
    Duplicate { name: String, span: Span },

    #[error("{span}: cannot assign to jmp_buf `{name}`")]
    AssignToJmpBuf { name: String, span: Span },

    #[error("entry function `{0}` not found")]
    MissingEntry(String),

    #[error("entry function `{name}` must take no arguments, takes {arity}")]
    EntryArity { name: String, arity: usize },
}

pub type CompileResult<T> = Result<T, CompileError>;

/* ===================== Public API ===================== */

pub fn compile(script: &ScriptDef) -> CompileResult<Module> {
    let mut globals = Globals::default();

    for decl in &script.jmp_bufs {
        if globals.bufs.contains_key(&decl.name) {
            return Err(CompileError::Duplicate {
                name: decl.name.clone(),
                span: decl.span,
            });
        }
        let id = ContextId(globals.bufs.len());
        globals.bufs.insert(decl.name.clone(), id);
    }

    for (i, function) in script.functions.iter().enumerate() {
        let taken = globals.funcs.contains_key(&function.name)
            || globals.bufs.contains_key(&function.name)
            || Builtin::from_name(&function.name).is_some();
        if taken {
            return Err(CompileError::Duplicate {
                name: function.name.clone(),
                span: function.span,
            });
        }
        globals
            .funcs
            .insert(function.name.clone(), (FuncId(i), function.params.len()));
    }

    let functions = script
        .functions
        .iter()
        .map(|f| FnCompiler::new(&globals).compile(f))
        .collect::<CompileResult<Vec<_>>>()?;

    Ok(Module {
        functions,
        jmp_bufs: script.jmp_bufs.iter().map(|d| d.name.clone()).collect(),
    })
}

/// Look up an entry point the driving loop can call with no arguments
pub fn entry_point(module: &Module, name: &str) -> CompileResult<FuncId> {
    let id = module
        .find(name)
        .ok_or_else(|| CompileError::MissingEntry(name.to_string()))?;
    let arity = module.functions[id.0].arity;
    if arity != 0 {
        return Err(CompileError::EntryArity {
            name: name.to_string(),
            arity,
        });
    }
    Ok(id)
}

/* ===================== Compiler State ===================== */

#[derive(Debug, Default)]
struct Globals {
    bufs: HashMap<String, ContextId>,
    funcs: HashMap<String, (FuncId, usize)>,
}

struct FnCompiler<'g> {
    globals: &'g Globals,
    /// Innermost scope last
    scopes: Vec<HashMap<String, usize>>,
    slots: usize,
    code: Vec<Op>,
}

impl<'g> FnCompiler<'g> {
    fn new(globals: &'g Globals) -> Self {
        Self {
            globals,
            scopes: vec![HashMap::new()],
            slots: 0,
            code: Vec::new(),
        }
    }

    fn compile(mut self, def: &FunctionDef) -> CompileResult<Function> {
        for param in &def.params {
            if self.scopes[0].contains_key(param) {
                return Err(CompileError::Duplicate {
                    name: param.clone(),
                    span: def.span,
                });
            }
            self.declare(param);
        }

        self.block(&def.body)?;

        // Falling off the end returns unit
        self.code.push(Op::Unit);
        self.code.push(Op::Return);

        Ok(Function {
            name: def.name.clone(),
            arity: def.params.len(),
            locals: self.slots,
            code: self.code,
        })
    }

    fn declare(&mut self, name: &str) -> usize {
        let slot = self.slots;
        self.slots += 1;
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), slot);
        }
        slot
    }

    fn resolve_local(&self, name: &str) -> Option<usize> {
        self.scopes.iter().rev().find_map(|s| s.get(name).copied())
    }

    /// Current end of code, as a jump target
    fn here(&self) -> usize {
        self.code.len()
    }

    /// Emit a jump with a placeholder target, returning its index
    fn emit_jump(&mut self, op: fn(usize) -> Op) -> usize {
        self.code.push(op(usize::MAX));
        self.code.len() - 1
    }

    fn patch(&mut self, at: usize, target: usize) {
        let patched = match &self.code[at] {
            Op::Jump(_) => Op::Jump(target),
            Op::JumpIfFalse(_) => Op::JumpIfFalse(target),
            Op::JumpIfTrue(_) => Op::JumpIfTrue(target),
            other => other.clone(),
        };
        self.code[at] = patched;
    }

    /* ===================== Statements ===================== */

    fn block(&mut self, body: &[Stmt]) -> CompileResult<()> {
        self.scopes.push(HashMap::new());
        let result = body.iter().try_for_each(|stmt| self.stmt(stmt));
        self.scopes.pop();
        result
    }

    fn stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Let { name, init, .. } => {
                self.expr(init)?;
                let slot = self.declare(name);
                self.code.push(Op::Store(slot));
            }

            Stmt::Assign { name, value, span } => {
                let Some(slot) = self.resolve_local(name) else {
                    if self.globals.bufs.contains_key(name) {
                        return Err(CompileError::AssignToJmpBuf {
                            name: name.clone(),
                            span: *span,
                        });
                    }
                    return Err(CompileError::UnknownVariable {
                        name: name.clone(),
                        span: *span,
                    });
                };
                self.expr(value)?;
                self.code.push(Op::Store(slot));
            }

            Stmt::If {
                test,
                then_body,
                else_body,
            } => {
                self.expr(test)?;
                let to_else = self.emit_jump(Op::JumpIfFalse);
                self.block(then_body)?;
                match else_body {
                    Some(else_body) => {
                        let to_end = self.emit_jump(Op::Jump);
                        let else_start = self.here();
                        self.patch(to_else, else_start);
                        self.block(else_body)?;
                        let end = self.here();
                        self.patch(to_end, end);
                    }
                    None => {
                        let end = self.here();
                        self.patch(to_else, end);
                    }
                }
            }

            Stmt::While { test, body } => {
                let start = self.here();
                self.expr(test)?;
                let to_end = self.emit_jump(Op::JumpIfFalse);
                self.block(body)?;
                self.code.push(Op::Jump(start));
                let end = self.here();
                self.patch(to_end, end);
            }

            Stmt::Return { value } => {
                match value {
                    Some(value) => self.expr(value)?,
                    None => self.code.push(Op::Unit),
                }
                self.code.push(Op::Return);
            }

            Stmt::Expr { expr } => {
                self.expr(expr)?;
                self.code.push(Op::Pop);
            }
        }
        Ok(())
    }

    /* ===================== Expressions ===================== */

    fn expr(&mut self, expr: &Expr) -> CompileResult<()> {
        match expr {
            Expr::Int { v } => self.code.push(Op::Int(*v)),

            Expr::Str { v } => self.code.push(Op::Str(v.clone())),

            Expr::Ident { name, span } => {
                if let Some(slot) = self.resolve_local(name) {
                    self.code.push(Op::Load(slot));
                } else if let Some(id) = self.globals.bufs.get(name) {
                    self.code.push(Op::Buf(*id));
                } else {
                    return Err(CompileError::UnknownVariable {
                        name: name.clone(),
                        span: *span,
                    });
                }
            }

            Expr::Call { callee, args, span } => {
                let (target, expected) = if let Some((id, arity)) = self.globals.funcs.get(callee) {
                    (Callee::Func(*id), *arity)
                } else if let Some(builtin) = Builtin::from_name(callee) {
                    (Callee::Builtin(builtin), builtin.arity())
                } else {
                    return Err(CompileError::UnknownFunction {
                        name: callee.clone(),
                        span: *span,
                    });
                };

                if args.len() != expected {
                    return Err(CompileError::Arity {
                        name: callee.clone(),
                        expected,
                        found: args.len(),
                        span: *span,
                    });
                }

                for arg in args {
                    self.expr(arg)?;
                }
                self.code.push(Op::Call {
                    callee: target,
                    argc: args.len(),
                });
            }

            Expr::Unary { op, operand } => {
                self.expr(operand)?;
                self.code.push(match op {
                    UnaryOp::Not => Op::Not,
                    UnaryOp::Neg => Op::Neg,
                });
            }

            // Short-circuit: the result is whichever operand decided it
            Expr::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                left,
                right,
            } => {
                self.expr(left)?;
                self.code.push(Op::Dup);
                let to_end = match op {
                    BinaryOp::And => self.emit_jump(Op::JumpIfFalse),
                    _ => self.emit_jump(Op::JumpIfTrue),
                };
                self.code.push(Op::Pop);
                self.expr(right)?;
                let end = self.here();
                self.patch(to_end, end);
            }

            Expr::Binary { op, left, right } => {
                self.expr(left)?;
                self.expr(right)?;
                self.code.push(Op::Binary(*op));
            }
        }
        Ok(())
    }
}

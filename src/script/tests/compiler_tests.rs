//! Compiler tests - name resolution and code shape

use crate::jump::ContextId;
use crate::script::ast::BinaryOp;
use crate::script::bytecode::{Builtin, Callee, FuncId, Op};
use crate::script::compiler::{entry_point, CompileError};
use crate::script::{load, Module, ScriptError};

fn compile_err(source: &str) -> CompileError {
    match load(source) {
        Err(ScriptError::Compile(err)) => err,
        Err(other) => panic!("Expected compile error, got {:?}", other),
        Ok(module) => panic!("Expected compile error, got {:?}", module),
    }
}

fn module(source: &str) -> Module {
    load(source).expect("Script should compile")
}

#[test]
fn test_setjmp_call_shape() {
    let module = module(
        r#"
        jmp_buf env;
        fn main() {
            if (!setjmp(env)) { puts("zero"); }
        }
        "#,
    );

    let main = &module.functions[0];
    assert_eq!(
        main.code,
        vec![
            Op::Buf(ContextId(0)),
            Op::Call {
                callee: Callee::Builtin(Builtin::Setjmp),
                argc: 1
            },
            Op::Not,
            Op::JumpIfFalse(7),
            Op::Str("zero".to_string()),
            Op::Call {
                callee: Callee::Builtin(Builtin::Puts),
                argc: 1
            },
            Op::Pop,
            Op::Unit,
            Op::Return,
        ]
    );
}

#[test]
fn test_short_circuit_shape() {
    let module = module("fn main() { return 0 && 1; }");

    assert_eq!(
        module.functions[0].code[..5],
        [
            Op::Int(0),
            Op::Dup,
            Op::JumpIfFalse(5),
            Op::Pop,
            Op::Int(1),
        ]
    );
    assert_eq!(module.functions[0].code[5], Op::Return);
}

#[test]
fn test_locals_get_slots() {
    let module = module(
        r#"
        fn f(a, b) {
            let c = a + b;
            if (c) { let d = 1; }
            return c;
        }
        "#,
    );

    let f = &module.functions[0];
    assert_eq!(f.arity, 2);
    assert_eq!(f.locals, 4);
    assert_eq!(
        f.code[..4],
        [Op::Load(0), Op::Load(1), Op::Binary(BinaryOp::Add), Op::Store(2)]
    );
}

#[test]
fn test_user_calls_resolve_to_functions() {
    let module = module(
        r#"
        fn main() { helper(1); }
        fn helper(x) { return x; }
        "#,
    );

    assert!(module.functions[0].code.contains(&Op::Call {
        callee: Callee::Func(FuncId(1)),
        argc: 1
    }));
}

#[test]
fn test_while_jumps_back_to_condition() {
    let module = module(
        r#"
        fn main() {
            let i = 0;
            while (i < 3) { i = i + 1; }
        }
        "#,
    );

    let code = &module.functions[0].code;
    // let i = 0 is two ops; the loop condition starts at 2
    assert!(code.contains(&Op::Jump(2)));
    let exit = code
        .iter()
        .find_map(|op| match op {
            Op::JumpIfFalse(target) => Some(*target),
            _ => None,
        })
        .expect("Loop should have an exit jump");
    assert_eq!(code[exit], Op::Unit);
    assert_eq!(code[exit - 1], Op::Jump(2));
}

#[test]
fn test_unknown_variable() {
    let err = compile_err("fn main() { puts(nope); }");
    assert!(matches!(err, CompileError::UnknownVariable { name, .. } if name == "nope"));
}

#[test]
fn test_block_scoped_let() {
    let err = compile_err("fn main() { if (1) { let y = 1; } puts(y); }");
    assert!(matches!(err, CompileError::UnknownVariable { name, .. } if name == "y"));
}

#[test]
fn test_unknown_function() {
    let err = compile_err("fn main() { launch(); }");
    assert!(matches!(err, CompileError::UnknownFunction { name, .. } if name == "launch"));
}

#[test]
fn test_arity_mismatch() {
    let err = compile_err("jmp_buf env; fn main() { longjmp(env); }");
    assert!(matches!(
        err,
        CompileError::Arity {
            expected: 2,
            found: 1,
            ..
        }
    ));

    let err = compile_err("fn f(a) {} fn main() { f(1, 2); }");
    assert!(matches!(err, CompileError::Arity { name, .. } if name == "f"));
}

#[test]
fn test_duplicates_rejected() {
    let err = compile_err("fn f() {} fn f() {}");
    assert!(matches!(err, CompileError::Duplicate { name, .. } if name == "f"));

    let err = compile_err("jmp_buf env; jmp_buf env;");
    assert!(matches!(err, CompileError::Duplicate { name, .. } if name == "env"));

    let err = compile_err("fn puts(x) {}");
    assert!(matches!(err, CompileError::Duplicate { name, .. } if name == "puts"));

    let err = compile_err("fn f(a, a) {}");
    assert!(matches!(err, CompileError::Duplicate { name, .. } if name == "a"));
}

#[test]
fn test_cannot_assign_jmp_buf() {
    let err = compile_err("jmp_buf env; fn main() { env = 1; }");
    assert!(matches!(err, CompileError::AssignToJmpBuf { name, .. } if name == "env"));
}

#[test]
fn test_entry_point_lookup() {
    let module = module("fn main() {} fn takes(x) {}");

    assert_eq!(entry_point(&module, "main").unwrap(), FuncId(0));
    assert!(matches!(
        entry_point(&module, "start"),
        Err(CompileError::MissingEntry(name)) if name == "start"
    ));
    assert!(matches!(
        entry_point(&module, "takes"),
        Err(CompileError::EntryArity { arity: 1, .. })
    ));
}

#[test]
fn test_disassembly_names_things() {
    let module = module(
        r#"
        jmp_buf env;
        fn main() { setjmp(env); }
        "#,
    );

    let listing = module.disassemble();
    assert!(listing.contains("jmp_buf env"));
    assert!(listing.contains("fn main/0"));
    assert!(listing.contains("buf env"));
    assert!(listing.contains("call builtin setjmp (1 args)"));
}

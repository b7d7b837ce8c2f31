//! Tests for the script front end and interpreter

mod compiler_tests;

use crate::host::{Asyncify, RecordingHost};
use crate::script::{run_source, ScriptError, ScriptRun};

pub type TestHost = RecordingHost<Asyncify>;

/// Run `source` from `main`, collecting everything it prints
pub fn run_script(source: &str) -> Result<ScriptRun<TestHost, Vec<u8>>, ScriptError> {
    run_source(source, "main", RecordingHost::new(Asyncify::new()), Vec::new())
}

/// Run `source` and return its output, panicking on any error
pub fn output_of(source: &str) -> String {
    let run = run_script(source).expect("Script should run");
    String::from_utf8(run.output).expect("Output should be UTF-8")
}

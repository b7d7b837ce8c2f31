//! rewind CLI
//!
//! Runs, checks and disassembles jump scripts. Program output goes to stdout,
//! logs go to stderr.

use rewind_core::cli;

fn main() {
    dotenvy::dotenv().ok();

    if let Err(e) = cli::run_cli() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

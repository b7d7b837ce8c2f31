use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::host::{Asyncify, RecordingHost};
use crate::script::{self, ScriptProgram, Val};

#[derive(Parser)]
#[command(name = "rewind")]
#[command(about = "Run setjmp/longjmp scripts on an unwind/rewind host", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides ./rewind.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a script through the driving loop
    Run {
        /// Script file
        file: PathBuf,

        /// Function to start from (default: main)
        #[arg(short = 'e', long = "entry")]
        entry: Option<String>,

        /// Log every host unwind/rewind call
        #[arg(long)]
        trace: bool,
    },

    /// Parse and compile a script without running it
    Check {
        /// Script file
        file: PathBuf,
    },

    /// Print the compiled bytecode of a script
    Disasm {
        /// Script file
        file: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

/// Run the CLI by parsing process arguments
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli)
}

/// Run the CLI with provided arguments
pub fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli)
}

fn run_cli_with_args(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    init_logging(&config);

    match cli.command {
        Commands::Run { file, .. } => {
            let source = read_script(&file)?;
            let module = script::load(&source)
                .with_context(|| format!("Failed to compile {}", file.display()))?;
            let program = ScriptProgram::new(module, &config.entry, std::io::stdout().lock())
                .with_context(|| format!("Failed to run {}", file.display()))?
                .with_max_call_depth(config.max_call_depth);
            let host = RecordingHost::new(Asyncify::new()).echo(config.trace_host);

            let run = script::run_program(program, host)
                .with_context(|| format!("Failed to run {}", file.display()))?;

            tracing::info!(
                rewinds = run.outcome.rewinds,
                host_calls = run.machine.host.calls().len(),
                "run complete"
            );
            if let Some(id) = run.outcome.abandoned {
                tracing::debug!(context = %id, "capture was never jumped to");
            }
            if run.outcome.value != Val::Unit {
                tracing::info!(value = %run.outcome.value, "entry returned");
            }
        }

        Commands::Check { file } => {
            let source = read_script(&file)?;
            let module = script::load(&source)
                .with_context(|| format!("Failed to compile {}", file.display()))?;

            println!(
                "✓ {}: {} function(s), {} jmp_buf(s)",
                file.display(),
                module.functions.len(),
                module.jmp_bufs.len()
            );
            for name in &module.jmp_bufs {
                println!("  jmp_buf {}", name);
            }
            for function in &module.functions {
                println!("  fn {}/{}", function.name, function.arity);
            }
        }

        Commands::Disasm { file } => {
            let source = read_script(&file)?;
            let module = script::load(&source)
                .with_context(|| format!("Failed to compile {}", file.display()))?;
            print!("{}", module.disassemble());
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Layer the `run` flags over file and environment settings. A flag that is
/// not given leaves the configured value alone.
fn load_config(cli: &Cli) -> Result<Config> {
    let (entry, trace) = match &cli.command {
        Commands::Run { entry, trace, .. } => (entry.clone(), trace.then_some(true)),
        _ => (None, None),
    };

    Config::builder()
        .config_path(cli.config.clone())
        .entry(entry)
        .trace_host(trace)
        .with_env()
        .build()
        .context("Failed to load configuration")
}

fn read_script(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Install the stderr subscriber. `RUST_LOG` wins over the configured filter.
fn init_logging(config: &Config) {
    let mut filter = config.log_filter.clone();
    if config.trace_host {
        filter.push_str(",rewind_core::host=info");
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "rewind", "--config", "alt.toml", "run", "demo.jmp", "--entry", "start", "--trace",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
        match cli.command {
            Commands::Run { file, entry, trace } => {
                assert_eq!(file, PathBuf::from("demo.jmp"));
                assert_eq!(entry.as_deref(), Some("start"));
                assert!(trace);
            }
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_config_flag_is_global() {
        let cli = Cli::try_parse_from(["rewind", "config", "--config", "alt.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::Config));
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
    }

    #[test]
    fn test_file_is_required() {
        assert!(Cli::try_parse_from(["rewind", "disasm"]).is_err());
    }

    fn demo(name: &str) -> String {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("demos")
            .join(name)
            .display()
            .to_string()
    }

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("rewind")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    fn write_temp(name: &str, contents: &str) -> String {
        let path = std::env::temp_dir().join(format!("{}-{}", std::process::id(), name));
        std::fs::write(&path, contents).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_check_and_disasm_demo() {
        let path = demo("longjmp.jmp");
        run_cli_from_args(args(&["check", &path])).unwrap();
        run_cli_from_args(args(&["disasm", &path])).unwrap();
    }

    #[test]
    fn test_run_demo() {
        run_cli_from_args(args(&["run", &demo("longjmp.jmp"), "--entry", "main"])).unwrap();
    }

    #[test]
    fn test_print_config() {
        run_cli_from_args(args(&["config"])).unwrap();
    }

    #[test]
    fn test_missing_script_is_reported() {
        for command in ["run", "check", "disasm"] {
            let err = run_cli_from_args(args(&[command, "/nonexistent/script.jmp"])).unwrap_err();
            assert!(
                format!("{:#}", err).contains("Failed to read /nonexistent/script.jmp"),
                "{}: {:#}",
                command,
                err
            );
        }
    }

    #[test]
    fn test_run_reports_unknown_entry() {
        let err = run_cli_from_args(args(&["run", &demo("longjmp.jmp"), "--entry", "start"]))
            .unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("Failed to run"), "{}", message);
        assert!(message.contains("`start` not found"), "{}", message);
    }

    #[test]
    fn test_run_enforces_configured_call_depth() {
        let script = write_temp(
            "rewind-cli-depth.jmp",
            "fn f(n) { if (n == 0) { return 0; } return f(n - 1); } fn main() { f(50); }",
        );
        let config = write_temp("rewind-cli-depth.toml", "max_call_depth = 10\n");

        let result = run_cli_from_args(args(&[
            "--config",
            &config,
            "run",
            &script,
            "--entry",
            "main",
        ]));
        std::fs::remove_file(&script).ok();
        std::fs::remove_file(&config).ok();

        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("call depth exceeded"), "{}", message);
    }

    #[test]
    fn test_trace_flag_merges_with_config() {
        let path = write_temp("rewind-cli-trace.toml", "trace_host = true\n");

        let from_file = Cli::try_parse_from(args(&["--config", &path, "run", "x.jmp"])).unwrap();
        let flag_only = Cli::try_parse_from(args(&["run", "x.jmp", "--trace"])).unwrap();
        let check = Cli::try_parse_from(args(&["--config", &path, "check", "x.jmp"])).unwrap();

        // An absent --trace does not switch tracing off
        let from_file = load_config(&from_file).unwrap();
        let flag_only = load_config(&flag_only).unwrap();
        let check = load_config(&check).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(from_file.trace_host);
        assert!(flag_only.trace_host);
        assert!(check.trace_host);
    }
}

//! Binary entry point for the tugsplit CLI.
//!
//! ```bash
//! # One file per class, shared functions in functions.py
//! tugsplit -i big_module.py -o output
//!
//! # Grouped split with a docstring report, checked by a real interpreter
//! tugsplit -i big_module.py --config groups.json --doc --import-check interpreter
//! ```
//!
//! The JSON response goes to stdout, logs to stderr.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use tugsplit::cli::{run_split, SplitRequest};
use tugsplit::error::OutputErrorCode;
use tugsplit::output::{emit_response, ErrorResponse};
use tugsplit::ImportCheckMode;

/// Split a large Python module into a package of smaller modules.
#[derive(Parser, Debug)]
#[command(name = "tugsplit", version, about)]
struct Cli {
    /// Python file to split.
    #[arg(short, long)]
    input: PathBuf,

    /// Directory receiving the package and the interface module.
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// JSON grouping config; one file per class when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also write DOCS.md from the module's docstrings.
    #[arg(long)]
    doc: bool,

    /// How emitted modules are import-checked.
    #[arg(long, value_enum, default_value = "static")]
    import_check: ImportCheck,

    /// Python interpreter for `--import-check interpreter`.
    #[arg(long)]
    python: Option<PathBuf>,

    /// Timeout for the interpreter import check, in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Do not create `<input>.backup`.
    #[arg(long)]
    no_backup: bool,

    /// Log level for tracing output.
    #[arg(long, value_enum, default_value = "warn")]
    log_level: LogLevel,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ImportCheck {
    /// Resolve imports by reading the emitted sources.
    Static,
    /// Import every module with a Python interpreter.
    Interpreter,
}

impl From<ImportCheck> for ImportCheckMode {
    fn from(check: ImportCheck) -> Self {
        match check {
            ImportCheck::Static => ImportCheckMode::Static,
            ImportCheck::Interpreter => ImportCheckMode::Interpreter,
        }
    }
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl Cli {
    fn into_request(self) -> SplitRequest {
        SplitRequest {
            input: self.input,
            output: self.output,
            config: self.config,
            doc: self.doc,
            import_check: self.import_check.into(),
            python: self.python,
            timeout: self.timeout_secs.map(Duration::from_secs),
            backup: !self.no_backup,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level);

    let mut stdout = io::stdout();
    let code = match run_split(&cli.into_request()) {
        Ok(response) => {
            let _ = emit_response(&response, &mut stdout);
            response.exit_code()
        }
        Err(err) => {
            // Errors go to stdout as JSON too; stderr only carries logs.
            let _ = emit_response(&ErrorResponse::new(&err), &mut stdout);
            OutputErrorCode::from(&err).code()
        }
    };
    let _ = stdout.flush();
    ExitCode::from(code)
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

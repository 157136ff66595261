//! Hook binary.
//!
//! Exit codes: 0 allow, 2 block (report on stderr), 1 malformed input.

use std::io::Read;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use toolguard::hook::{BlockResponse, HookEnvelope, PostToolReport};
use toolguard::safety::lint;
use toolguard::sandbox::{AllowlistPolicy, sandbox_validate};
use toolguard::{Action, GuardConfig, GuardError, GuardrailEngine};

const EXIT_ALLOW: u8 = 0;
const EXIT_INPUT_ERROR: u8 = 1;
const EXIT_BLOCK: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "toolguard", version, about = "Guardrails for agent tool calls")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true, env = "TOOLGUARD_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a tool call before it runs (envelope JSON on stdin)
    PreTool,

    /// Review a tool call after it ran (envelope JSON on stdin)
    PostTool,

    /// Validate source code read from stdin against the sandbox policy
    CheckCode,

    /// Scan a shell command for dangerous patterns
    Scan {
        /// The command line to scan
        command: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli.command) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(EXIT_INPUT_ERROR)
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(command: Command) -> anyhow::Result<u8> {
    match command {
        Command::PreTool => pre_tool(),
        Command::PostTool => post_tool(),
        Command::CheckCode => check_code(),
        Command::Scan { command } => scan(&command),
    }
}

fn read_stdin() -> anyhow::Result<String> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    Ok(input)
}

fn pre_tool() -> anyhow::Result<u8> {
    let envelope = match HookEnvelope::parse(&read_stdin()?) {
        Ok(envelope) => envelope,
        Err(err) => {
            eprintln!("Error: {}", err);
            return Ok(EXIT_INPUT_ERROR);
        }
    };

    let action = match envelope.action() {
        Ok(Some(action)) => action,
        Ok(None) => return Ok(EXIT_ALLOW),
        Err(err @ GuardError::InvalidInput(_)) => {
            eprintln!("Error: {}", err);
            return Ok(EXIT_INPUT_ERROR);
        }
        Err(err) => return Err(err.into()),
    };

    let config = GuardConfig::from_env()?;
    let engine = GuardrailEngine::new(&config);
    let decision = engine.evaluate(&action);

    if decision.is_blocked() {
        eprintln!("{}", decision.render());
        Ok(EXIT_BLOCK)
    } else {
        Ok(EXIT_ALLOW)
    }
}

fn post_tool() -> anyhow::Result<u8> {
    let envelope = match HookEnvelope::parse(&read_stdin()?) {
        Ok(envelope) => envelope,
        Err(err) => {
            eprintln!("Error: {}", err);
            return Ok(EXIT_INPUT_ERROR);
        }
    };
    let config = GuardConfig::from_env()?;

    match envelope.post_tool_review(config.max_output_warnings) {
        PostToolReport::Skipped => {}
        PostToolReport::Score(score) => println!("{}", score.summary()),
        PostToolReport::Lint { issues, block: true } => {
            let response = BlockResponse::new(lint::format_feedback(&issues));
            println!("{}", serde_json::to_string(&response)?);
        }
        PostToolReport::Lint { issues, block: false } => {
            if issues.is_empty() {
                println!("{}", lint::format_feedback(&issues));
            } else {
                println!(
                    "Output validation completed with minor issues:\n{}",
                    lint::format_feedback(&issues)
                );
            }
        }
    }
    Ok(EXIT_ALLOW)
}

fn check_code() -> anyhow::Result<u8> {
    let source = read_stdin()?;
    match sandbox_validate(&source, &AllowlistPolicy::default()) {
        Ok(()) => Ok(EXIT_ALLOW),
        Err(err) => {
            eprintln!("Error: {}", err);
            Ok(EXIT_BLOCK)
        }
    }
}

fn scan(command: &str) -> anyhow::Result<u8> {
    let engine = GuardrailEngine::new(&GuardConfig::default());
    let decision = engine.evaluate(&Action::ShellCommand(command.to_string()));
    if decision.is_blocked() {
        eprintln!("{}", decision.render());
        return Ok(EXIT_BLOCK);
    }
    println!("No dangerous patterns found.");
    Ok(EXIT_ALLOW)
}

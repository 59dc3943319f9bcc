use anyhow::{Context, Result};
use argh::FromArgs;
use nix::unistd::dup2;
use std::os::fd::AsRawFd;
use std::process::ExitCode;
use tracing::Level;
use tsh::{Interpreter, USAGE, signals};

#[derive(FromArgs)]
/// A tiny job-control shell.
struct Args {
    #[argh(switch, short = 'h')]
    /// print this message
    usage: bool,

    #[argh(switch, short = 'v')]
    /// print additional diagnostic information
    verbose: bool,

    #[argh(switch, short = 'p')]
    /// do not emit a command prompt
    no_prompt: bool,
}

fn parse_args() -> Option<Args> {
    let argv: Vec<String> = std::env::args().collect();
    let rest: Vec<&str> = argv.iter().skip(1).map(String::as_str).collect();
    let args = Args::from_args(&["shell"], &rest).ok()?;
    if args.usage { None } else { Some(args) }
}

fn run(args: &Args) -> Result<()> {
    // Both streams reach whoever drives the shell through one pipe.
    dup2(std::io::stdout().as_raw_fd(), std::io::stderr().as_raw_fd())
        .context("dup2 error")?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::WARN
        })
        .without_time()
        .with_target(false)
        .init();

    signals::install_handlers().context("Signal error")?;

    Interpreter::default().repl(!args.no_prompt)
}

fn main() -> ExitCode {
    let Some(args) = parse_args() else {
        print!("{USAGE}");
        return ExitCode::FAILURE;
    };

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            println!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

#![forbid(unsafe_code)]

//! `command-conduit-ctl` — controller-side CLI companion for `command-conduit`.
//!
//! Performs one command round trip over the pipe pair and mirrors the
//! sandbox result: stdout and stderr are passed through, and the process
//! exits with the command's return code, so the caller can treat it like a
//! local shell invocation.

use std::io::Write as _;
use std::path::PathBuf;

use clap::Parser;

use command_conduit::client::CommandClient;
use command_conduit::ConduitConfig;

#[derive(Debug, Parser)]
#[command(
    name = "command-conduit-ctl",
    about = "Send one shell command to the sandbox command server",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file; built-in defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the command/response pipes.
    #[arg(long)]
    pipe_dir: Option<PathBuf>,

    /// Working directory for this command on the sandbox side.
    #[arg(short = 'd', long)]
    working_dir: Option<PathBuf>,

    /// Round-trip timeout in seconds (must be at least 1).
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_seconds: Option<u64>,

    /// Shell command to execute (remaining words are joined with spaces).
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() {
    let args = Cli::parse();

    let mut config = match &args.config {
        Some(path) => match ConduitConfig::load_from_path(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("Error: {err}");
                std::process::exit(1);
            }
        },
        None => ConduitConfig::default(),
    };
    if let Some(dir) = args.pipe_dir {
        config.pipe_dir = dir;
    }
    if let Some(secs) = args.timeout_seconds {
        config.call_timeout_seconds = secs;
    }

    let command = args.command.join(" ");
    let client = CommandClient::from_config(&config);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to build runtime: {err}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(client.call(&command, args.working_dir.as_deref())) {
        Ok(result) => {
            print!("{}", result.stdout);
            eprint!("{}", result.stderr);
            if let Some(err) = &result.error {
                eprintln!();
                eprintln!("Error: {err}");
            }
            // exit() skips the buffered-writer destructors.
            let _ = std::io::stdout().flush();
            let _ = std::io::stderr().flush();
            std::process::exit(result.returncode);
        }
        Err(err) => {
            eprintln!("Failed to reach command server: {err}");
            eprintln!("Is command-conduit running with pipes under '{}'?", config.pipe_dir.display());
            std::process::exit(1);
        }
    }
}

//! boxsh - per-user sandboxed login shell
//!
//! Makes sure the user's container is running, attaches the current
//! terminal (or a `-c` command) to a shell inside it, and cleans up any
//! processes the session leaves behind.

use clap::Parser;
use tracing::{debug, info};

use boxsh::config::ShellConfig;
use boxsh::logging::init_logging;
use boxsh::session::Invocation;
use boxsh::{Shell, ShellError};

/// Exit code for configuration problems, same as ShellError::Config
const EXIT_CONFIG: i32 = 78;

/// boxsh - drop into your own sandboxed container
#[derive(Parser)]
#[command(name = "boxsh")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Login shell running each user inside their own container", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Run command inside the container instead of a login shell
    #[arg(short = 'c', value_name = "COMMAND")]
    command: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = run(cli).await;
    // Exit here: a stdin reader may still be parked on a blocking thread
    std::process::exit(code);
}

async fn run(cli: Cli) -> i32 {
    let config = match ShellConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("boxsh: could not load config: {:#}", e);
            return EXIT_CONFIG;
        }
    };

    if let Err(e) = init_logging(&config.log_level, config.log_file.as_deref(), cli.debug) {
        eprintln!("boxsh: could not initialize logging: {:#}", e);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting boxsh");
    debug!(config = ?config, "Config dump");

    let invocation = Invocation::from_process(cli.command);

    let shell = match Shell::connect(config).await {
        Ok(shell) => shell,
        Err(e) => return report(e),
    };

    match shell.run(&invocation).await {
        Ok(()) => 0,
        Err(e) => report(e),
    }
}

fn report(err: ShellError) -> i32 {
    eprintln!("boxsh: {}", err);
    debug!(error = ?err, "Exiting with error");
    err.exit_code()
}

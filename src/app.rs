//! Application orchestration and command routing.

use crate::commands;
use crate::logging;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::process;

/// A terminal microphone recorder with live waveform display and monitoring effects
#[derive(Parser)]
#[command(name = "micmon")]
#[command(version)]
#[command(
    long_about = "A terminal microphone recorder with live waveform display and monitoring effects.\n\nDEFAULT COMMAND:\n    If no command is specified, 'record' is used by default.\n\nKEYS:\n    Up/Down     choose the input device (while idle)\n    r / Enter   start recording\n    s / Space   stop recording\n    q / Esc     quit\n\nSIGNALS:\n    SIGUSR1 toggles recording, e.g. `pkill -USR1 micmon`"
)]
#[command(
    after_help = "CONFIGURATION:\n    Config file:        ~/.config/micmon/micmon.toml\n    Logs:               ~/.local/state/micmon/micmon.log.*"
)]
struct Cli {
    /// Input device to preselect: "default", an index or a name (record default command)
    #[arg(short, long, value_name = "DEVICE", global = true)]
    device: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record with live visualization and monitoring (default)
    #[command(visible_alias = "r")]
    Record,

    /// Open configuration file in your preferred editor
    ///
    /// Uses the $EDITOR environment variable or falls back to nano/vi.
    #[command(visible_alias = "c")]
    Config,

    /// List available audio devices
    ///
    /// Shows device IDs and names for the [audio] device setting.
    #[command(name = "list-devices")]
    ListDevices,

    /// Show the last 50 lines of the most recent log file
    Logs,

    /// Generate shell completion script
    ///
    /// Examples:
    ///   micmon completions bash > micmon.bash
    ///   micmon completions zsh > _micmon
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Runs the application based on command-line arguments.
///
/// # Errors
/// - If logging initialization fails
/// - If first-run setup fails
/// - If command execution fails
pub async fn run() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Commands that need neither logging nor config
    match &cli.command {
        Some(Commands::Completions { shell }) => {
            generate(*shell, &mut Cli::command(), "micmon", &mut io::stdout());
            return Ok(());
        }
        Some(Commands::ListDevices) => return exit_on_error(commands::handle_list_devices()),
        Some(Commands::Logs) => return exit_on_error(commands::handle_logs()),
        _ => {}
    }

    logging::init_logging()?;

    if crate::setup::run_setup()? {
        tracing::info!("First run: default configuration created");
    }

    match cli.command {
        None | Some(Commands::Record) => commands::handle_record(cli.device).await?,
        Some(Commands::Config) => commands::handle_config()?,
        Some(Commands::Completions { .. }) | Some(Commands::ListDevices) | Some(Commands::Logs) => {
            unreachable!("These commands are handled earlier")
        }
    }

    Ok(())
}

fn exit_on_error(result: anyhow::Result<()>) -> anyhow::Result<()> {
    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
    Ok(())
}

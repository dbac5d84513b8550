mod commands;
mod helpers;

use clap::Parser;
use eventgen_core::domain::EventError;

pub fn run_from_env() -> i32 {
    let args = std::env::args().skip(1).collect::<Vec<_>>();

    match run(args) {
        Ok(code) => code,
        Err(error) => {
            let event_error = error.as_event_error();
            eprintln!("{}", event_error.diagnostic_line());
            if let Some(summary_line) = event_error.fatal_exit_line() {
                eprintln!("{}", summary_line);
            }
            event_error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args = args.into_iter().map(Into::into).collect::<Vec<String>>();
    let expanded = helpers::expand_arg_files(args)?;
    let full_args = std::iter::once("run-events".to_string())
        .chain(expanded)
        .collect::<Vec<_>>();
    parse_and_dispatch(full_args)
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => dispatch_parsed(cli.command),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(
    name = "run-events",
    about = "Run heavy-ion collision events and accumulate binary results"
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Generate and run events, appending one record per completed event
    Run(commands::RunArgs),
    /// Resume the event stored in a checkpoint file
    Checkpoint {
        /// Checkpoint written by an earlier run
        #[arg(value_name = "PATH")]
        path: std::path::PathBuf,
    },
    /// Print the results record layout
    Layout,
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Run(args) => commands::run_events_command(args),
        CliCommand::Checkpoint { path } => commands::resume_command(&path),
        CliCommand::Layout => commands::layout_command(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Run(EventError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    fn as_event_error(&self) -> EventError {
        match self {
            Self::Usage(message) => EventError::input_validation("INPUT.CLI_USAGE", message.clone()),
            Self::Run(error) => error.clone(),
            Self::Internal(error) => EventError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}

impl From<EventError> for CliError {
    fn from(error: EventError) -> Self {
        Self::Run(error)
    }
}

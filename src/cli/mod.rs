pub mod input;
pub mod output;
pub mod query;

use anyhow::Result;
use clap::{Parser, Subcommand};
use query::{process_aggregate_command, process_filter_command, AggregateCommand, FilterCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::{args::HostOptions, start_daemon},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX, HOST_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Tabtally", version, long_about = None)]
#[command(about = "Tracks time spent on browser tabs", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(
        about = "Run the host directly in current console, reading messages from stdin. Used for debugging"
    )]
    Serve {
        #[command(flatten)]
        options: HostOptions,
    },
    #[command(about = "Print recorded sessions as tab separated values")]
    Filter {
        #[command(flatten)]
        command: FilterCommand,
    },
    #[command(about = "Print total time spent per site as tab separated values")]
    Aggregate {
        #[command(flatten)]
        command: AggregateCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };

    match args.commands {
        Commands::Serve { options } => {
            let dir = options
                .dir
                .clone()
                .map_or_else(create_application_default_path, Ok)?;
            let handle = enable_logging(HOST_PREFIX, &dir, logging_level, args.log)?;
            // An explicit --log pins the level.
            let handle = logging_level.is_none().then_some(handle);
            start_daemon(dir, options, handle).await
        }
        Commands::Filter { command } => {
            let dir = command.range.application_dir()?;
            enable_logging(CLI_PREFIX, &dir, logging_level, args.log)?;
            process_filter_command(dir, command).await
        }
        Commands::Aggregate { command } => {
            let dir = command.range.application_dir()?;
            enable_logging(CLI_PREFIX, &dir, logging_level, args.log)?;
            process_aggregate_command(dir, command).await
        }
    }
}

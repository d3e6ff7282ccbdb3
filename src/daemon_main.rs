use anyhow::Result;
use clap::Parser;
use tabtally::{
    daemon::{args::HostArgs, start_daemon},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, HOST_PREFIX},
        runtime::single_thread_runtime,
    },
};

fn main() -> Result<()> {
    let args = HostArgs::parse();
    let app_dir = args
        .options
        .dir
        .clone()
        .map_or_else(create_application_default_path, Ok)?;
    let handle = enable_logging(HOST_PREFIX, &app_dir, args.log, args.log_console)?;
    // An explicit --log-filter pins the level.
    let handle = args.log.is_none().then_some(handle);
    single_thread_runtime()?.block_on(start_daemon(app_dir, args.options, handle))?;
    Ok(())
}

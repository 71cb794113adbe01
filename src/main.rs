use anyhow::Result;
use clap::{Parser, Subcommand};
use std::ffi::OsString;

mod args;
mod config;
mod env;
mod http;
mod imports;
mod logging;
mod login;
mod ui;
mod utils;

use crate::args::{BaseArgs, CLIArgs};

const DEFAULT_DEV_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-dev");
const CLI_VERSION: &str = match option_env!("VIP_VERSION_STRING") {
    Some(version) => version,
    None => DEFAULT_DEV_VERSION,
};

#[derive(Debug, Parser)]
#[command(name = "vip", about = "WordPress VIP command line tools", version = CLI_VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Follow SQL and media imports
    Import(CLIArgs<imports::ImportArgs>),
}

impl Commands {
    fn base(&self) -> &BaseArgs {
        match self {
            Commands::Import(cmd) => &cmd.base,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let argv: Vec<OsString> = std::env::args_os().collect();
    env::bootstrap_from_args(&argv)?;
    let cli = Cli::parse_from(argv);

    logging::init(logging::LogConfig {
        verbose: cli.command.base().verbose,
    });

    match cli.command {
        Commands::Import(cmd) => imports::run(cmd.base, cmd.args).await?,
    }

    Ok(())
}

mod cli;
mod commodities;
mod db;
mod error;
mod fmt;
mod matcher;
mod models;
mod parse;
mod settings;
mod tui;
mod wizard;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{AccountsCommands, Cli, Commands};

fn main() {
    let filter = EnvFilter::try_from_env("PENNY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Accounts { command } => match command {
            AccountsCommands::Add {
                name,
                account_type,
                currency,
                institution,
                last_four,
            } => cli::accounts::add(
                &name,
                &account_type,
                currency.as_deref(),
                institution.as_deref(),
                last_four.as_deref(),
            ),
            AccountsCommands::List => cli::accounts::list(),
        },
        Commands::Import { file, account } => {
            cli::import::run(file.as_deref(), account.as_deref())
        }
        Commands::Currencies => cli::currencies::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

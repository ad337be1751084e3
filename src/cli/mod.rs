pub mod accounts;
pub mod currencies;
pub mod import;
pub mod import_wizard;
pub mod init;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "penny",
    about = "CSV statement import and currency tools for small-business bookkeeping."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up Penny: choose a data directory and initialize the database.
    Init {
        /// Path for Penny data (default: ~/Documents/penny)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Manage accounts.
    Accounts {
        #[command(subcommand)]
        command: AccountsCommands,
    },
    /// Import a CSV statement through the interactive preview wizard.
    Import {
        /// Path to the CSV file to import (prompted for when omitted)
        file: Option<String>,
        /// Account name to import into (prompted for when omitted)
        #[arg(long)]
        account: Option<String>,
    },
    /// List the known ISO currencies.
    Currencies,
}

#[derive(Subcommand)]
pub enum AccountsCommands {
    /// Add a new account.
    Add {
        /// Account name, e.g. 'BofA Checking'
        name: String,
        /// Account type: checking, credit_card, line_of_credit
        #[arg(long = "type")]
        account_type: String,
        /// ISO currency code (default: the configured default currency)
        #[arg(long)]
        currency: Option<String>,
        /// Institution name
        #[arg(long)]
        institution: Option<String>,
        /// Last 4 digits of account number
        #[arg(long = "last-four")]
        last_four: Option<String>,
    },
    /// List all accounts.
    List,
}

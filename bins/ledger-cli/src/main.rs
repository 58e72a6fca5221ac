//! Operator CLI entry point — parses arguments and delegates to
//! `ledger_node::cli::run`, which speaks to a running `ledgerd` over HTTP.

use clap::Parser;
use ledger_node::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(error) = ledger_node::cli::run(cli).await {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

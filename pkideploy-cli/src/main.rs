//! pkideploy - PKI subsystem installer and uninstaller
//!
//! `pkideploy spawn -s CA -f ca.cfg` lays out and configures a subsystem;
//! `pkideploy destroy -s CA -i pki-tomcat` removes it again.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Spawn(args) => commands::spawn::execute(args, &cli.global).await,
        Commands::Destroy(args) => commands::destroy::execute(args, &cli.global).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

use clap::Parser;

use citer::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli::init_logging();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => citer::backend::start_lsp().await,
        Command::Scope {
            document,
            workspace,
        } => cli::run_scope(&document, workspace.as_deref()),
        Command::Parse { file, json } => cli::run_parse(&file, json),
    }
}

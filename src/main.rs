use clap::Parser;
use tigalign::{
    cli::{init_verbose, Cli, Command, FULL_VERSION},
    commands::{align, consensus, overlap},
    utils::{handle_error_and_exit, Result},
};

fn runner() -> Result<()> {
    let cli = Cli::parse();
    init_verbose(&cli);
    let subcommand_name = match cli.command {
        Command::Align(_) => "align",
        Command::Overlap(_) => "overlap",
        Command::Consensus(_) => "consensus",
    };

    log::info!(
        "Running {}-{} [{}]",
        env!("CARGO_PKG_NAME"),
        *FULL_VERSION,
        subcommand_name
    );
    match cli.command {
        Command::Align(args) => align::align(args)?,
        Command::Overlap(args) => overlap::overlap(args)?,
        Command::Consensus(args) => consensus::consensus(args)?,
    }
    log::info!("{} end", env!("CARGO_PKG_NAME"));
    Ok(())
}

fn main() {
    if let Err(e) = runner() {
        handle_error_and_exit(e);
    }
}

use clap::{Parser, Subcommand};
use umi_consensus::{ConsensusArgs, consensus_process};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Consensus(ConsensusArgs),
}

fn main() -> std::process::ExitCode {
    let args = Cli::parse();

    let result = match args.command {
        Commands::Consensus(cmd_args) => consensus_process(&cmd_args),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        return std::process::ExitCode::FAILURE;
    }

    std::process::ExitCode::SUCCESS
}

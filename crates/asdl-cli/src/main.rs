use clap::{Parser, Subcommand};

mod check;
mod graph;
mod netlist;

#[derive(Parser)]
#[command(name = "asdl")]
#[command(about = "Compile ASDL analog topology sources to netlists", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an entry file and write the backend netlist
    #[command(alias = "n")]
    Netlist(netlist::NetlistArgs),

    /// Compile and report diagnostics without writing output
    #[command(alias = "c")]
    Check(check::CheckArgs),

    /// Print the atomized design graph as JSON
    Graph(graph::GraphArgs),
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Netlist(args) => netlist::execute(args),
        Commands::Check(args) => check::execute(args),
        Commands::Graph(args) => graph::execute(args),
    }
}

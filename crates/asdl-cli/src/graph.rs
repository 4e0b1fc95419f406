use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use asdl_lang::{
    diagnostics_to_json, dump_graph, render_diagnostic, split_root_list, CompileOptions,
    ENV_ROOTS,
};

#[derive(Args, Debug)]
#[command(about = "Print the atomized design graph as JSON")]
pub struct GraphArgs {
    /// The entry .asdl file.
    #[arg(value_name = "ENTRY", value_hint = clap::ValueHint::FilePath)]
    pub entry: PathBuf,

    /// Additional library roots, highest precedence first; repeatable.
    #[arg(short = 'I', value_name = "DIR", action = clap::ArgAction::Append)]
    pub roots: Vec<PathBuf>,

    /// Print diagnostics as JSON too, instead of rendered reports.
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: GraphArgs) -> Result<()> {
    let env_roots = std::env::var_os(ENV_ROOTS)
        .map(|value| split_root_list(&value))
        .unwrap_or_default();
    let options = CompileOptions {
        roots: args.roots.clone(),
        env_roots,
        ..CompileOptions::default()
    };

    let result = dump_graph(&args.entry, &options);

    if args.json {
        eprintln!("{}", diagnostics_to_json(&result.diagnostics));
    } else {
        for diag in &result.diagnostics {
            render_diagnostic(diag);
        }
    }

    match result.output {
        Some(json) if !result.has_errors() => {
            println!("{json}");
            Ok(())
        }
        _ => std::process::exit(1),
    }
}

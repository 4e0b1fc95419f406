use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use asdl_lang::{
    compile, diagnostics_to_json, load_backend_registry, render_diagnostic, split_root_list,
    CompileOptions, DEFAULT_BACKEND, ENV_ROOTS,
};

#[derive(Args, Debug)]
#[command(about = "Compile and report diagnostics without writing output")]
pub struct CheckArgs {
    /// The entry .asdl file.
    #[arg(value_name = "ENTRY", value_hint = clap::ValueHint::FilePath)]
    pub entry: PathBuf,

    /// Backend whose templates the check runs against.
    #[arg(long, default_value = DEFAULT_BACKEND)]
    pub backend: String,

    /// Additional library roots, highest precedence first; repeatable.
    #[arg(short = 'I', value_name = "DIR", action = clap::ArgAction::Append)]
    pub roots: Vec<PathBuf>,

    /// Backend registry file (otherwise ASDL_BACKENDS, then built-ins).
    #[arg(long = "backends", value_name = "FILE")]
    pub backends: Option<PathBuf>,

    /// Print diagnostics as JSON on stdout instead of rendered reports.
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: CheckArgs) -> Result<()> {
    let registry = load_backend_registry(args.backends.as_deref())?;
    let env_roots = std::env::var_os(ENV_ROOTS)
        .map(|value| split_root_list(&value))
        .unwrap_or_default();

    let options = CompileOptions {
        roots: args.roots.clone(),
        env_roots,
        backend: args.backend.clone(),
        registry,
        ..CompileOptions::default()
    };

    let result = compile(&args.entry, &options);

    if args.json {
        println!("{}", diagnostics_to_json(&result.diagnostics));
    } else {
        for diag in &result.diagnostics {
            render_diagnostic(diag);
        }
    }

    if result.has_errors() || result.output.is_none() {
        std::process::exit(1);
    }
    eprintln!("ok");
    Ok(())
}

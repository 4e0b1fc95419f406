use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use log::debug;

use asdl_lang::{
    compile, diagnostics_to_json, load_backend_registry, render_diagnostic, split_root_list,
    CompileOptions, DEFAULT_BACKEND, ENV_ROOTS,
};

#[derive(Args, Debug)]
#[command(about = "Compile an entry file and write the backend netlist")]
pub struct NetlistArgs {
    /// The entry .asdl file.
    #[arg(value_name = "ENTRY", value_hint = clap::ValueHint::FilePath)]
    pub entry: PathBuf,

    /// Output path; defaults to the entry basename with the backend's
    /// extension, next to the entry.
    #[arg(short = 'o', long = "output", value_name = "OUT")]
    pub output: Option<PathBuf>,

    /// Backend to emit for.
    #[arg(long, default_value = DEFAULT_BACKEND)]
    pub backend: String,

    /// Run the verification passes (default).
    #[arg(long, overrides_with = "no_verify")]
    pub verify: bool,

    /// Skip the verification passes.
    #[arg(long = "no-verify")]
    pub no_verify: bool,

    /// Emit the top module as a .subckt (pass `false` to comment the
    /// wrapper lines instead).
    #[arg(
        long = "top-as-subckt",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub top_as_subckt: Option<bool>,

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

pub fn execute(args: NetlistArgs) -> Result<()> {
    debug!("compiling {}", args.entry.display());

    let registry = load_backend_registry(args.backends.as_deref())?;
    let env_roots = std::env::var_os(ENV_ROOTS)
        .map(|value| split_root_list(&value))
        .unwrap_or_default();

    let options = CompileOptions {
        roots: args.roots.clone(),
        env_roots,
        backend: args.backend.clone(),
        registry,
        verify: args.verify || !args.no_verify,
        top_as_subckt: args.top_as_subckt,
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

    match result.output {
        Some(output) if !result.has_errors() => {
            let out_path = args.output.clone().unwrap_or_else(|| {
                let stem = args
                    .entry
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "netlist".to_string());
                let dir = args.entry.parent().unwrap_or_else(|| std::path::Path::new("."));
                dir.join(format!("{stem}{}", output.extension))
            });
            std::fs::write(&out_path, &output.netlist)
                .with_context(|| format!("cannot write {}", out_path.display()))?;
            eprintln!("wrote {}", out_path.display());
            Ok(())
        }
        _ => {
            // Error diagnostics already went to the user.
            std::process::exit(1);
        }
    }
}

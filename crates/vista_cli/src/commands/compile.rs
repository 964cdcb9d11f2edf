//! Compile command - Precompile every Blade view.

use anyhow::{Context, Result};
use clap::Args;
use tracing::{debug, info};
use vista_views::EngineKind;
use walkdir::WalkDir;

use super::Cli;

#[derive(Args)]
pub struct CompileArgs {
    /// Stop at the first view that fails to compile
    #[arg(long)]
    fail_fast: bool,
}

pub fn execute(cli: &Cli, args: &CompileArgs) -> Result<()> {
    let service = cli.service()?;
    let factory = service.factory();
    let compiler = service.compiler();

    let mut compiled = 0;
    let mut failed = Vec::new();

    for root in service.view_paths() {
        if !root.is_dir() {
            debug!("Skipping missing view path {:?}", root);
            continue;
        }
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if !matches!(factory.engine_from_path(entry.path()), Ok(EngineKind::Blade)) {
                continue;
            }

            match compiler.compile(entry.path()) {
                Ok(_) => compiled += 1,
                Err(e) if args.fail_fast => return Err(e.into()),
                Err(e) => {
                    eprintln!("   {}", e);
                    failed.push(e);
                }
            }
        }
    }

    info!("Compiled {} view(s) into {:?}", compiled, service.cache_path());
    if !cli.quiet {
        println!("Compiled {} view(s), {} failed", compiled, failed.len());
    }

    match failed.into_iter().next() {
        Some(first) => Err(first).context("Some views failed to compile"),
        None => Ok(()),
    }
}

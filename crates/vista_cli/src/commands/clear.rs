//! Clear command - Delete compiled views.

use anyhow::Result;
use clap::Args;

use super::Cli;

#[derive(Args)]
pub struct ClearArgs {}

pub fn execute(cli: &Cli, _args: &ClearArgs) -> Result<()> {
    let service = cli.service()?;
    let removed = service.compiler().clear()?;

    if !cli.quiet {
        println!("Removed {} compiled view(s)", removed);
    }
    Ok(())
}

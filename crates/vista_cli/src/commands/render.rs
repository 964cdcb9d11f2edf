//! Render command - Render one view to stdout.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;
use tracing::info;

use super::Cli;

#[derive(Args)]
pub struct RenderArgs {
    /// View name, such as `emails.welcome` or `mail::welcome`
    view: String,

    /// View data as a JSON object
    #[arg(short, long, conflicts_with = "data_file")]
    data: Option<String>,

    /// File containing view data as a JSON object
    #[arg(long)]
    data_file: Option<PathBuf>,
}

pub fn execute(cli: &Cli, args: &RenderArgs) -> Result<()> {
    let data = read_data(args)?;
    let service = cli.service()?;

    info!("Rendering view: {}", args.view);
    let output = service.render(&args.view, &data)?;
    print!("{}", output);
    Ok(())
}

fn read_data(args: &RenderArgs) -> Result<Value> {
    let text = match (&args.data, &args.data_file) {
        (Some(data), _) => data.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read data file {}", path.display()))?,
        (None, None) => return Ok(Value::Null),
    };
    Ok(serde_json::from_str(&text)?)
}

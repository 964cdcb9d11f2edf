//! CLI command definitions.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use vista::{ViewConfig, ViewService};

pub mod clear;
pub mod compile;
pub mod render;

/// vista - render Blade-style views from the command line
#[derive(Parser)]
#[command(name = "vista")]
#[command(version, about = "vista - render Blade-style views from the command line")]
#[command(long_about = r#"
vista renders Blade-style templates outside of any web framework.

COMMANDS:
  render   → Render a view to stdout
  compile  → Precompile every Blade view into the cache
  clear    → Delete every compiled view from the cache

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - View not found
  4 - Template compile error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directories to search for views, first match wins
    #[arg(long = "views", global = true, env = "VISTA_VIEWS", value_delimiter = ',')]
    pub views: Vec<PathBuf>,

    /// Directory for compiled views
    #[arg(long, global = true, env = "VISTA_CACHE")]
    pub cache: Option<PathBuf>,

    /// YAML, TOML or JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render a view to stdout
    Render(render::RenderArgs),

    /// Precompile every Blade view
    Compile(compile::CompileArgs),

    /// Delete compiled views
    Clear(clear::ClearArgs),
}

impl Cli {
    /// Effective configuration: the config file, overridden by flags.
    pub fn view_config(&self) -> Result<ViewConfig> {
        let mut config = match &self.config {
            Some(path) => ViewConfig::from_file(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?,
            None => ViewConfig::new(Vec::new(), PathBuf::from(".vista/cache")),
        };

        if !self.views.is_empty() {
            config.view_paths = self.views.clone();
        }
        if let Some(cache) = &self.cache {
            config.cache_path = cache.clone();
        }
        if config.view_paths.is_empty() {
            config.view_paths.push(PathBuf::from("views"));
        }
        Ok(config)
    }

    pub fn service(&self) -> Result<ViewService> {
        Ok(ViewService::from_config(&self.view_config()?))
    }
}

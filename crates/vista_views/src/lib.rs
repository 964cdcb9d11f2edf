//! # vista_views
//!
//! Blade-style views for vista.
//!
//! - **Compiler**: turns template sources into cached node trees
//! - **Engines**: raw file pass-through and compiled Blade evaluation
//! - **Finder**: maps dotted view names to files across several directories
//! - **Factory**: creates views, shares data, runs composers and creators
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vista_core::{Dispatcher, Filesystem, LocalFilesystem};
//! use vista_views::{BladeCompiler, EngineResolver, Factory, FileViewFinder};
//!
//! let files: Arc<dyn Filesystem> = Arc::new(LocalFilesystem);
//! let compiler = Arc::new(BladeCompiler::new(files.clone(), "cache/views"));
//! let engines = Arc::new(EngineResolver::new(files.clone(), compiler));
//! let finder = Arc::new(FileViewFinder::new(files, vec!["views".into()]));
//! let factory = Arc::new(Factory::new(engines, finder, Arc::new(Dispatcher::new())));
//!
//! let html = factory
//!     .make("index", serde_json::json!({ "user": { "name": "Sebastian" } }), ())
//!     .unwrap()
//!     .render()
//!     .unwrap();
//! ```

pub mod compiler;
pub mod engines;
pub mod eval;
pub mod factory;
pub mod finder;
pub mod view;

pub use compiler::{BladeCompiler, CompiledTemplate, COMPILED_EXTENSION};
pub use engines::{CompilerEngine, Engine, EngineKind, EngineResolver, FileEngine, DEFAULT_EXTENSIONS};
pub use eval::{escape_html, RenderEnv};
pub use factory::{Factory, ViewEvents};
pub use finder::{normalize_name, FileViewFinder, HINT_DELIMITER};
pub use view::View;

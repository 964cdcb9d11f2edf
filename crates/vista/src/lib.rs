//! # vista
//!
//! Blade-style views without a framework. [`ViewService`] wires a
//! filesystem, an event dispatcher, the template compiler, the engine
//! resolver, the view finder and the view factory together.

pub mod config;
pub mod container;
pub mod service;

pub use config::{ExtensionConfig, ViewConfig};
pub use container::{Container, Singleton};
pub use service::{ViewPaths, ViewService, ViewServiceBuilder};

pub use vista_core::{ViewData, ViewError, ViewResult};
pub use vista_views::{EngineKind, Factory, View, ViewEvents};

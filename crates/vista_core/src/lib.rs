//! # vista_core
//!
//! Shared building blocks for the vista view layer.
//!
//! - **Errors**: the [`ViewError`] taxonomy every crate reports through
//! - **Filesystem**: the [`Filesystem`] abstraction templates are read from
//!   and compiled artifacts are written to
//! - **Events**: a small named-event [`Dispatcher`] with wildcard listeners
//! - **Data**: the [`ViewData`] mapping bound to a view for one render

pub mod data;
pub mod error;
pub mod events;
pub mod filesystem;

pub use data::{kind_of, merge, to_view_data, ViewData};
pub use error::{ViewError, ViewResult};
pub use events::{Dispatcher, Listener};
pub use filesystem::{Filesystem, LocalFilesystem};

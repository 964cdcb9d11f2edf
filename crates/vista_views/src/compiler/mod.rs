//! Blade-style template compiler.
//!
//! Source files are compiled into a [`CompiledTemplate`] and persisted as
//! JSON under the cache directory, one artifact per source file. An artifact
//! is reused until its source is modified again.

mod expr;
mod lexer;
mod parser;
pub mod template;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info};
use vista_core::{Filesystem, ViewError, ViewResult};

use lexer::Lexer;
pub use template::{BinaryOp, Branch, CompiledTemplate, Expr, Node, Segment, FORMAT_VERSION};

/// Extension of compiled artifacts in the cache directory.
pub const COMPILED_EXTENSION: &str = "json";

/// A parse failure before the source path is known.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("line {line}: {message}")]
pub(crate) struct SyntaxError {
    pub line: usize,
    pub message: String,
}

/// Compiles template sources into cached artifacts.
pub struct BladeCompiler {
    files: Arc<dyn Filesystem>,
    cache_path: PathBuf,
    cache: bool,
    lexer: Lexer,
}

impl BladeCompiler {
    /// Create a compiler writing artifacts under `cache_path`.
    pub fn new(files: Arc<dyn Filesystem>, cache_path: impl Into<PathBuf>) -> Self {
        Self {
            files,
            cache_path: cache_path.into(),
            cache: true,
            lexer: Lexer::new(),
        }
    }

    /// Whether fresh artifacts are reused. When disabled every render recompiles.
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn caches(&self) -> bool {
        self.cache
    }

    pub fn files(&self) -> &Arc<dyn Filesystem> {
        &self.files
    }

    /// Artifact location for `source`: the SHA-256 of its path.
    pub fn compiled_path(&self, source: &Path) -> PathBuf {
        let digest = Sha256::digest(source.to_string_lossy().as_bytes());
        self.cache_path
            .join(format!("{}.{}", hex::encode(digest), COMPILED_EXTENSION))
    }

    /// Whether `source` needs compiling before it can be rendered.
    ///
    /// An artifact is stale when it is missing or when the source was
    /// modified at or after the moment the artifact was written.
    pub fn is_expired(&self, source: &Path) -> ViewResult<bool> {
        if !self.cache {
            return Ok(true);
        }

        let compiled = self.compiled_path(source);
        if !self.files.exists(&compiled) {
            return Ok(true);
        }

        let source_time = self.files.last_modified(source)?;
        let compiled_time = self.files.last_modified(&compiled)?;
        Ok(source_time >= compiled_time)
    }

    /// Compile `source` and write its artifact, returning the artifact path.
    pub fn compile(&self, source: &Path) -> ViewResult<PathBuf> {
        let contents = self.files.get(source)?;
        let template = self.compile_string(&contents, source)?;

        self.ensure_cache_directory()?;
        let compiled = self.compiled_path(source);
        let json = serde_json::to_string(&template)?;
        self.files.put(&compiled, &json).map_err(|e| {
            ViewError::Configuration(format!(
                "cache path {} is not writable: {}",
                self.cache_path.display(),
                e
            ))
        })?;

        info!("Compiled {:?} -> {:?}", source, compiled);
        Ok(compiled)
    }

    /// Compile template text without touching the cache.
    ///
    /// `source` is only used to label the result and any error.
    pub fn compile_string(&self, contents: &str, source: &Path) -> ViewResult<CompiledTemplate> {
        let nodes = self
            .lexer
            .tokenize(contents)
            .and_then(parser::parse)
            .map_err(|e| ViewError::Compile {
                path: source.to_path_buf(),
                line: e.line,
                message: e.message,
            })?;
        Ok(CompiledTemplate::new(source, nodes))
    }

    /// Read a compiled artifact back.
    pub fn load(&self, compiled: &Path) -> ViewResult<CompiledTemplate> {
        debug!("Loading compiled template {:?}", compiled);
        let json = self.files.get(compiled)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Delete every compiled artifact, returning how many were removed.
    pub fn clear(&self) -> ViewResult<usize> {
        if !self.files.is_directory(&self.cache_path) {
            return Ok(0);
        }

        let mut removed = 0;
        for path in self.files.files(&self.cache_path)? {
            if path.extension().is_some_and(|e| e == COMPILED_EXTENSION) {
                self.files.delete(&path)?;
                removed += 1;
            }
        }
        info!("Cleared {} compiled view(s) from {:?}", removed, self.cache_path);
        Ok(removed)
    }

    fn ensure_cache_directory(&self) -> ViewResult<()> {
        if self.files.is_directory(&self.cache_path) {
            return Ok(());
        }
        if self.files.exists(&self.cache_path) {
            return Err(ViewError::Configuration(format!(
                "cache path {} is not a directory",
                self.cache_path.display()
            )));
        }
        self.files.ensure_directory(&self.cache_path).map_err(|e| {
            ViewError::Configuration(format!(
                "cannot create cache path {}: {}",
                self.cache_path.display(),
                e
            ))
        })
    }
}

impl std::fmt::Debug for BladeCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BladeCompiler")
            .field("cache_path", &self.cache_path)
            .field("cache", &self.cache)
            .finish()
    }
}

//! Rendering engines and the resolver that hands them out.
//!
//! The set of engines is closed: raw files are passed through untouched and
//! Blade templates go through the compiler.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vista_core::{Filesystem, ViewData, ViewError, ViewResult};

use crate::compiler::{BladeCompiler, CompiledTemplate};
use crate::eval::{render_template, RenderEnv};

/// Extensions understood out of the box, in lookup order.
pub const DEFAULT_EXTENSIONS: &[(&str, EngineKind)] = &[
    ("blade.html", EngineKind::Blade),
    ("html", EngineKind::File),
    ("css", EngineKind::File),
];

/// Which engine renders a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Source is returned verbatim.
    File,
    /// Source is compiled as a Blade template.
    Blade,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Blade => "blade",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = ViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "blade" => Ok(Self::Blade),
            other => Err(ViewError::Configuration(format!("Engine [{}] not found.", other))),
        }
    }
}

/// Returns template sources as they are.
pub struct FileEngine {
    files: Arc<dyn Filesystem>,
}

impl FileEngine {
    pub fn new(files: Arc<dyn Filesystem>) -> Self {
        Self { files }
    }

    pub fn get(&self, path: &Path) -> ViewResult<String> {
        self.files.get(path)
    }
}

/// Compiles Blade sources on demand and evaluates the compiled artifacts.
pub struct CompilerEngine {
    compiler: Arc<BladeCompiler>,
    /// Loaded artifacts keyed by artifact path, with the artifact's mtime.
    loaded: RwLock<HashMap<PathBuf, (SystemTime, Arc<CompiledTemplate>)>>,
}

impl CompilerEngine {
    pub fn new(compiler: Arc<BladeCompiler>) -> Self {
        Self {
            compiler,
            loaded: RwLock::new(HashMap::new()),
        }
    }

    pub fn compiler(&self) -> &Arc<BladeCompiler> {
        &self.compiler
    }

    pub fn get(
        &self,
        view: &str,
        path: &Path,
        data: &ViewData,
        env: &mut RenderEnv,
    ) -> ViewResult<String> {
        let template = self.template(path)?;
        render_template(&template, view, data, env)
    }

    /// The compiled form of `path`, compiling first when the artifact is stale.
    pub fn template(&self, path: &Path) -> ViewResult<Arc<CompiledTemplate>> {
        let recompiled = self.compiler.is_expired(path)?;
        if recompiled {
            self.compiler.compile(path)?;
        }

        // A rewritten artifact can keep its old mtime on coarse filesystems.
        let compiled = self.compiler.compiled_path(path);
        if !recompiled {
            let modified = self.compiler.files().last_modified(&compiled)?;
            if let Some((at, template)) = self.loaded.read().get(&compiled) {
                if *at == modified {
                    debug!("Using loaded template for {:?}", path);
                    return Ok(template.clone());
                }
            }
        }

        let template = match self.compiler.load(&compiled) {
            Ok(template) if template.is_current() => template,
            Ok(_) | Err(ViewError::Json(_)) => {
                warn!("Discarding unreadable compiled view {:?}", compiled);
                self.compiler.compile(path)?;
                self.compiler.load(&compiled)?
            }
            Err(e) => return Err(e),
        };

        let modified = self.compiler.files().last_modified(&compiled)?;
        let template = Arc::new(template);
        self.loaded
            .write()
            .insert(compiled, (modified, template.clone()));
        Ok(template)
    }

    /// Drop every loaded artifact from memory.
    pub fn forget_loaded(&self) {
        self.loaded.write().clear();
    }
}

/// A rendering engine.
pub enum Engine {
    File(FileEngine),
    Compiler(CompilerEngine),
}

impl Engine {
    pub fn kind(&self) -> EngineKind {
        match self {
            Self::File(_) => EngineKind::File,
            Self::Compiler(_) => EngineKind::Blade,
        }
    }

    /// Render the source at `path` for the view called `view`.
    pub fn get(
        &self,
        view: &str,
        path: &Path,
        data: &ViewData,
        env: &mut RenderEnv,
    ) -> ViewResult<String> {
        match self {
            Self::File(engine) => engine.get(path),
            Self::Compiler(engine) => engine.get(view, path, data, env),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Engine({})", self.kind())
    }
}

/// Hands out engines, constructing each at most once.
pub struct EngineResolver {
    files: Arc<dyn Filesystem>,
    compiler: Arc<BladeCompiler>,
    file: OnceLock<Engine>,
    blade: OnceLock<Engine>,
}

impl EngineResolver {
    pub fn new(files: Arc<dyn Filesystem>, compiler: Arc<BladeCompiler>) -> Self {
        Self {
            files,
            compiler,
            file: OnceLock::new(),
            blade: OnceLock::new(),
        }
    }

    pub fn resolve(&self, kind: EngineKind) -> &Engine {
        match kind {
            EngineKind::File => self.file.get_or_init(|| {
                debug!("Resolving file engine");
                Engine::File(FileEngine::new(self.files.clone()))
            }),
            EngineKind::Blade => self.blade.get_or_init(|| {
                debug!("Resolving blade engine");
                Engine::Compiler(CompilerEngine::new(self.compiler.clone()))
            }),
        }
    }

    /// Resolve an engine by its registered name (`"file"` or `"blade"`).
    pub fn resolve_name(&self, name: &str) -> ViewResult<&Engine> {
        Ok(self.resolve(name.parse()?))
    }

    pub fn compiler(&self) -> &Arc<BladeCompiler> {
        &self.compiler
    }
}

impl std::fmt::Debug for EngineResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineResolver")
            .field("file", &self.file.get().is_some())
            .field("blade", &self.blade.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vista_core::LocalFilesystem;

    fn resolver() -> EngineResolver {
        let files: Arc<dyn Filesystem> = Arc::new(LocalFilesystem);
        let compiler = Arc::new(BladeCompiler::new(files.clone(), "/tmp/vista-cache"));
        EngineResolver::new(files, compiler)
    }

    #[test]
    fn test_resolve_by_kind_and_name() {
        let resolver = resolver();
        assert!(matches!(resolver.resolve(EngineKind::File), Engine::File(_)));
        assert!(matches!(resolver.resolve(EngineKind::Blade), Engine::Compiler(_)));
        assert_eq!(resolver.resolve_name("blade").unwrap().kind(), EngineKind::Blade);
        assert!(matches!(
            resolver.resolve_name("php"),
            Err(ViewError::Configuration(_))
        ));
    }

    #[test]
    fn test_engines_are_constructed_once() {
        let resolver = resolver();
        let first = resolver.resolve(EngineKind::Blade) as *const Engine;
        let second = resolver.resolve(EngineKind::Blade) as *const Engine;
        assert_eq!(first, second);
    }

    #[test]
    fn test_engine_kind_names() {
        assert_eq!(EngineKind::Blade.to_string(), "blade");
        assert_eq!("FILE".parse::<EngineKind>().unwrap(), EngineKind::File);
        assert_eq!(serde_json::to_string(&EngineKind::File).unwrap(), "\"file\"");
    }
}

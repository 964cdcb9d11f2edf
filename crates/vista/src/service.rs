//! The view service facade.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};
use vista_core::{Filesystem, LocalFilesystem, ViewResult};
use vista_views::{
    BladeCompiler, EngineKind, EngineResolver, Factory, FileViewFinder, View, ViewEvents,
};

use crate::config::ViewConfig;
use crate::container::Container;

/// One or more directories to search for views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewPaths(Vec<PathBuf>);

impl ViewPaths {
    pub fn as_slice(&self) -> &[PathBuf] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<PathBuf> {
        self.0
    }
}

impl From<&str> for ViewPaths {
    fn from(path: &str) -> Self {
        Self(vec![path.into()])
    }
}

impl From<String> for ViewPaths {
    fn from(path: String) -> Self {
        Self(vec![path.into()])
    }
}

impl From<&Path> for ViewPaths {
    fn from(path: &Path) -> Self {
        Self(vec![path.to_path_buf()])
    }
}

impl From<PathBuf> for ViewPaths {
    fn from(path: PathBuf) -> Self {
        Self(vec![path])
    }
}

impl<T: Into<PathBuf>> From<Vec<T>> for ViewPaths {
    fn from(paths: Vec<T>) -> Self {
        Self(paths.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<PathBuf>, const N: usize> From<[T; N]> for ViewPaths {
    fn from(paths: [T; N]) -> Self {
        Self(paths.into_iter().map(Into::into).collect())
    }
}

/// Builder for [`ViewService`] with injected collaborators.
pub struct ViewServiceBuilder {
    view_paths: ViewPaths,
    cache_path: PathBuf,
    container: Option<Arc<Container>>,
    events: Option<Arc<ViewEvents>>,
    files: Option<Arc<dyn Filesystem>>,
    cache: bool,
    extensions: Vec<(String, EngineKind)>,
    namespaces: Vec<(String, Vec<PathBuf>)>,
}

impl ViewServiceBuilder {
    /// Share `container` with other services.
    pub fn container(mut self, container: Arc<Container>) -> Self {
        self.container = Some(container);
        self
    }

    /// Use `events` instead of a new dispatcher.
    pub fn events(mut self, events: Arc<ViewEvents>) -> Self {
        self.events = Some(events);
        self
    }

    /// Use `files` instead of the local filesystem.
    pub fn filesystem(mut self, files: Arc<dyn Filesystem>) -> Self {
        self.files = Some(files);
        self
    }

    /// Recompile every template on every render when `false`.
    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    pub fn extension(mut self, extension: impl Into<String>, engine: EngineKind) -> Self {
        self.extensions.push((extension.into(), engine));
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>, paths: Vec<PathBuf>) -> Self {
        self.namespaces.push((namespace.into(), paths));
        self
    }

    /// Bind the collaborators, replacing the compiler, engines, finder and
    /// factory of a shared container. Nothing touches the disk until the
    /// first render.
    pub fn build(self) -> ViewService {
        let container = self.container.unwrap_or_default();

        match self.files {
            Some(files) => container.files.set(files),
            None => {
                container.files.set_if_absent(Arc::new(LocalFilesystem::new()));
            }
        }
        match self.events {
            Some(events) => container.events.set(events),
            None => {
                container.events.set_if_absent(Arc::new(ViewEvents::new()));
            }
        }
        container.forget_views();

        info!(
            "View service configured: {} view path(s), cache at {:?}",
            self.view_paths.0.len(),
            self.cache_path
        );

        let service = ViewService {
            view_paths: self.view_paths.into_inner(),
            cache_path: self.cache_path,
            container,
            cache: self.cache,
            extensions: self.extensions,
            namespaces: self.namespaces,
        };
        // The most recently built service owns the path-dependent bindings
        // of a shared container.
        service.factory();
        service
    }
}

/// Standalone Blade-style views.
///
/// Holds the view paths and cache path and resolves the collaborators
/// from its [`Container`] on first use.
///
/// ```rust,no_run
/// use vista::ViewService;
/// use serde_json::json;
///
/// let views = ViewService::new(["views"], "cache/views");
/// let html = views.render("index", json!({ "user": { "name": "Sebastian" } })).unwrap();
///
/// views.factory().share("user", json!({ "name": "Martin" })).unwrap();
/// let html = views.render("index", ()).unwrap();
/// ```
pub struct ViewService {
    view_paths: Vec<PathBuf>,
    cache_path: PathBuf,
    container: Arc<Container>,
    cache: bool,
    extensions: Vec<(String, EngineKind)>,
    namespaces: Vec<(String, Vec<PathBuf>)>,
}

impl ViewService {
    /// Service with its own container, dispatcher and local filesystem.
    pub fn new(view_paths: impl Into<ViewPaths>, cache_path: impl Into<PathBuf>) -> Self {
        Self::builder(view_paths, cache_path).build()
    }

    pub fn builder(
        view_paths: impl Into<ViewPaths>,
        cache_path: impl Into<PathBuf>,
    ) -> ViewServiceBuilder {
        ViewServiceBuilder {
            view_paths: view_paths.into(),
            cache_path: cache_path.into(),
            container: None,
            events: None,
            files: None,
            cache: true,
            extensions: Vec::new(),
            namespaces: Vec::new(),
        }
    }

    pub fn from_config(config: &ViewConfig) -> Self {
        let mut builder = Self::builder(config.view_paths.clone(), config.cache_path.clone())
            .cache(config.cache);
        for extension in &config.extensions {
            builder = builder.extension(extension.extension.clone(), extension.engine);
        }
        for (namespace, paths) in &config.namespaces {
            builder = builder.namespace(namespace.clone(), paths.clone());
        }
        builder.build()
    }

    /// The view factory. Every call returns the same instance.
    pub fn factory(&self) -> Arc<Factory> {
        self.container.factory.get_or_init(|| {
            debug!("Binding view.factory");
            let factory = Factory::new(self.engine_resolver(), self.finder(), self.events());
            for (extension, engine) in &self.extensions {
                factory.add_extension(extension.clone(), *engine);
            }
            for (namespace, paths) in &self.namespaces {
                factory.add_namespace(namespace.clone(), paths.clone());
            }
            Arc::new(factory)
        })
    }

    /// A lazy view; nothing is compiled until it renders.
    pub fn view(
        &self,
        name: &str,
        data: impl Serialize,
        merge_data: impl Serialize,
    ) -> ViewResult<View> {
        self.factory().make(name, data, merge_data)
    }

    /// Render `name` with `data` to a string.
    pub fn render(&self, name: &str, data: impl Serialize) -> ViewResult<String> {
        self.view(name, data, ())?.render()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.factory().exists(name)
    }

    pub fn files(&self) -> Arc<dyn Filesystem> {
        self.container.files.get_or_init(|| {
            debug!("Binding files");
            let files: Arc<dyn Filesystem> = Arc::new(LocalFilesystem::new());
            files
        })
    }

    pub fn events(&self) -> Arc<ViewEvents> {
        self.container.events.get_or_init(|| {
            debug!("Binding events");
            Arc::new(ViewEvents::new())
        })
    }

    pub fn compiler(&self) -> Arc<BladeCompiler> {
        self.container.compiler.get_or_init(|| {
            debug!("Binding compiler");
            Arc::new(BladeCompiler::new(self.files(), self.cache_path.clone()).with_cache(self.cache))
        })
    }

    pub fn engine_resolver(&self) -> Arc<EngineResolver> {
        self.container.engine_resolver.get_or_init(|| {
            debug!("Binding engine.resolver");
            Arc::new(EngineResolver::new(self.files(), self.compiler()))
        })
    }

    pub fn finder(&self) -> Arc<FileViewFinder> {
        self.container.finder.get_or_init(|| {
            debug!("Binding view.finder");
            Arc::new(FileViewFinder::new(self.files(), self.view_paths.clone()))
        })
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn view_paths(&self) -> &[PathBuf] {
        &self.view_paths
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }
}

impl std::fmt::Debug for ViewService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewService")
            .field("view_paths", &self.view_paths)
            .field("cache_path", &self.cache_path)
            .field("cache", &self.cache)
            .field("container", &self.container)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_paths_from_one_or_many() {
        assert_eq!(ViewPaths::from("views").as_slice(), &[PathBuf::from("views")]);
        assert_eq!(
            ViewPaths::from(["a", "b"]).into_inner(),
            vec![PathBuf::from("a"), PathBuf::from("b")]
        );
        assert_eq!(ViewPaths::from(vec![PathBuf::from("c")]).as_slice().len(), 1);
    }

    #[test]
    fn test_construction_binds_every_slot() {
        let service = ViewService::new("views", "cache");
        assert_eq!(
            service.container().bound(),
            vec![
                "files",
                "events",
                "compiler",
                "engine.resolver",
                "view.finder",
                "view.factory"
            ]
        );
    }

    #[test]
    fn test_rebuilding_on_a_container_replaces_view_bindings() {
        let container = Arc::new(Container::new());
        let first = ViewService::builder("a", "cache")
            .container(container.clone())
            .build();
        let factory = first.factory();

        let second = ViewService::builder("b", "cache")
            .container(container.clone())
            .build();
        assert!(!Arc::ptr_eq(&factory, &second.factory()));
        assert!(Arc::ptr_eq(&first.factory(), &second.factory()));
        assert_eq!(second.finder().paths(), vec![PathBuf::from("b")]);
    }

    #[test]
    fn test_supplied_events_are_used() {
        let events = Arc::new(ViewEvents::new());
        let service = ViewService::builder("views", "cache")
            .events(events.clone())
            .build();

        assert!(Arc::ptr_eq(&service.events(), &events));
        assert!(Arc::ptr_eq(service.factory().dispatcher(), &events));
    }

    #[test]
    fn test_from_config_applies_settings() {
        let config = ViewConfig::new(vec!["views".into()], "cache")
            .with_cache(false)
            .with_extension("txt", EngineKind::File)
            .with_namespace("mail", vec!["mail".into()]);

        let service = ViewService::from_config(&config);
        let factory = service.factory();
        assert!(!service.compiler().caches());
        assert_eq!(factory.finder().extensions()[0], "txt");
        assert!(factory.finder().hints().contains_key("mail"));
        assert_eq!(service.cache_path(), Path::new("cache"));
    }
}

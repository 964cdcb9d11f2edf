//! The view factory: creates views, holds shared data and view callbacks.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use vista_core::{merge, to_view_data, Dispatcher, ViewData, ViewError, ViewResult};

use crate::engines::{EngineKind, EngineResolver, DEFAULT_EXTENSIONS};
use crate::finder::{normalize_name, FileViewFinder};
use crate::view::View;

/// Event dispatcher carrying views, used for composers and creators.
pub type ViewEvents = Dispatcher<View>;

/// Builds views and owns everything shared between them.
pub struct Factory {
    engines: Arc<EngineResolver>,
    finder: Arc<FileViewFinder>,
    events: Arc<ViewEvents>,
    shared: RwLock<ViewData>,
    /// Extension to engine mapping; the longest matching extension wins.
    extensions: RwLock<Vec<(String, EngineKind)>>,
}

impl Factory {
    pub fn new(
        engines: Arc<EngineResolver>,
        finder: Arc<FileViewFinder>,
        events: Arc<ViewEvents>,
    ) -> Self {
        Self {
            engines,
            finder,
            events,
            shared: RwLock::new(ViewData::new()),
            extensions: RwLock::new(
                DEFAULT_EXTENSIONS
                    .iter()
                    .map(|(e, k)| (e.to_string(), *k))
                    .collect(),
            ),
        }
    }

    /// Create a view. Keys in `data` override keys in `merge_data`.
    ///
    /// The returned view is lazy: nothing is compiled or evaluated until
    /// [`View::render`] is called.
    pub fn make(
        self: &Arc<Self>,
        name: &str,
        data: impl Serialize,
        merge_data: impl Serialize,
    ) -> ViewResult<View> {
        self.make_view(name, to_view_data(&data)?, to_view_data(&merge_data)?)
    }

    /// [`Factory::make`] for data that is already a [`ViewData`].
    pub fn make_view(
        self: &Arc<Self>,
        name: &str,
        data: ViewData,
        merge_data: ViewData,
    ) -> ViewResult<View> {
        let name = normalize_name(name);
        let path = self.finder.find(&name)?;
        let engine = self.engine_from_path(&path)?;
        Ok(self.view_instance(name, path.as_path(), engine, merge(&merge_data, &data)))
    }

    /// Create a view for a template file outside the view paths.
    pub fn file(
        self: &Arc<Self>,
        path: impl AsRef<Path>,
        data: impl Serialize,
        merge_data: impl Serialize,
    ) -> ViewResult<View> {
        let path = path.as_ref();
        if !self.finder.files().exists(path) {
            return Err(ViewError::NotFound(path.display().to_string()));
        }
        let engine = self.engine_from_path(path)?;
        let data = merge(&to_view_data(&merge_data)?, &to_view_data(&data)?);
        Ok(self.view_instance(path.display().to_string(), path, engine, data))
    }

    /// Create the first of `names` that exists.
    pub fn first(
        self: &Arc<Self>,
        names: &[&str],
        data: impl Serialize,
        merge_data: impl Serialize,
    ) -> ViewResult<View> {
        let name = names
            .iter()
            .find(|name| self.exists(name))
            .ok_or_else(|| ViewError::NotFound(names.join(", ")))?;
        self.make(name, data, merge_data)
    }

    /// Whether a view called `name` exists.
    pub fn exists(&self, name: &str) -> bool {
        self.finder.exists(name)
    }

    fn view_instance(
        self: &Arc<Self>,
        name: String,
        path: &Path,
        engine: EngineKind,
        data: ViewData,
    ) -> View {
        let mut view = View::new(self.clone(), name, path.to_path_buf(), engine, data);
        self.call_creator(&mut view);
        view
    }

    /// Engine for `path`, by its longest registered extension.
    pub fn engine_from_path(&self, path: &Path) -> ViewResult<EngineKind> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.extensions
            .read()
            .iter()
            .filter(|(extension, _)| file_name.ends_with(&format!(".{}", extension)))
            .max_by_key(|(extension, _)| extension.len())
            .map(|(_, kind)| *kind)
            .ok_or_else(|| {
                ViewError::Configuration(format!(
                    "Unrecognized extension in file: {}",
                    path.display()
                ))
            })
    }

    /// Map files ending in `.{extension}` to `kind`.
    pub fn add_extension(&self, extension: impl Into<String>, kind: EngineKind) {
        let extension = extension.into();
        debug!("Registering extension {} -> {}", extension, kind);
        self.finder.add_extension(extension.clone());

        let mut extensions = self.extensions.write();
        extensions.retain(|(e, _)| *e != extension);
        extensions.insert(0, (extension, kind));
    }

    /// Make `value` available to every view as `key`.
    pub fn share(&self, key: impl Into<String>, value: impl Serialize) -> ViewResult<()> {
        let key = key.into();
        let value = serde_json::to_value(value)?;
        debug!("Sharing view data: {}", key);
        self.shared.write().insert(key, value);
        Ok(())
    }

    /// Share every entry of a mapping.
    pub fn share_data(&self, data: impl Serialize) -> ViewResult<()> {
        let data = to_view_data(&data)?;
        self.shared.write().extend(data);
        Ok(())
    }

    pub fn shared(&self) -> ViewData {
        self.shared.read().clone()
    }

    pub fn get_shared(&self, key: &str) -> Option<Value> {
        self.shared.read().get(key).cloned()
    }

    /// Run `callback` each time `view` is about to render.
    ///
    /// `view` may be a wildcard such as `admin.*`.
    pub fn composer<F>(&self, view: &str, callback: F)
    where
        F: Fn(&mut View) + Send + Sync + 'static,
    {
        self.composers(&[view], callback);
    }

    /// Register one composer for several views.
    pub fn composers<F>(&self, views: &[&str], callback: F)
    where
        F: Fn(&mut View) + Send + Sync + 'static,
    {
        self.add_view_event(views, "composing", callback);
    }

    /// Run `callback` each time `view` is created.
    pub fn creator<F>(&self, view: &str, callback: F)
    where
        F: Fn(&mut View) + Send + Sync + 'static,
    {
        self.creators(&[view], callback);
    }

    /// Register one creator for several views.
    pub fn creators<F>(&self, views: &[&str], callback: F)
    where
        F: Fn(&mut View) + Send + Sync + 'static,
    {
        self.add_view_event(views, "creating", callback);
    }

    fn add_view_event<F>(&self, views: &[&str], prefix: &str, callback: F)
    where
        F: Fn(&mut View) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        for view in views {
            let callback = callback.clone();
            self.events.listen(
                format!("{}: {}", prefix, normalize_name(view)),
                move |_: &str, view: &mut View| (*callback)(view),
            );
        }
    }

    /// Fire the composers registered for `view`.
    pub fn call_composer(&self, view: &mut View) {
        let event = format!("composing: {}", view.name());
        self.events.dispatch(&event, view);
    }

    /// Fire the creators registered for `view`.
    pub fn call_creator(&self, view: &mut View) {
        let event = format!("creating: {}", view.name());
        self.events.dispatch(&event, view);
    }

    /// Shared data overlaid with the view's own data.
    pub fn gather_data(&self, view: &View) -> ViewData {
        merge(&self.shared.read(), view.data())
    }

    /// Append a directory to the view paths.
    pub fn add_location(&self, path: impl Into<std::path::PathBuf>) {
        self.finder.add_location(path);
    }

    /// Search `path` before the other view paths.
    pub fn prepend_location(&self, path: impl Into<std::path::PathBuf>) {
        self.finder.prepend_location(path);
    }

    /// Register directories for `namespace::view` names.
    pub fn add_namespace(&self, namespace: impl Into<String>, paths: Vec<std::path::PathBuf>) {
        self.finder.add_namespace(namespace, paths);
    }

    /// Replace the directories for `namespace`.
    pub fn replace_namespace(&self, namespace: impl Into<String>, paths: Vec<std::path::PathBuf>) {
        self.finder.replace_namespace(namespace, paths);
    }

    pub fn flush_finder_cache(&self) {
        self.finder.flush();
    }

    pub fn engine_resolver(&self) -> &Arc<EngineResolver> {
        &self.engines
    }

    pub fn finder(&self) -> &Arc<FileViewFinder> {
        &self.finder
    }

    pub fn dispatcher(&self) -> &Arc<ViewEvents> {
        &self.events
    }
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("finder", &self.finder)
            .field("shared", &self.shared.read().keys().collect::<Vec<_>>())
            .field("extensions", &*self.extensions.read())
            .finish()
    }
}

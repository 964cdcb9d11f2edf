//! Typed singleton bindings shared by the facade's collaborators.

use std::sync::Arc;

use parking_lot::Mutex;
use vista_core::Filesystem;
use vista_views::{BladeCompiler, EngineResolver, Factory, FileViewFinder, ViewEvents};

/// A slot holding at most one instance of `T`.
///
/// The lock is held while the instance is built, so concurrent callers
/// of [`Singleton::get_or_init`] construct it at most once.
pub struct Singleton<T: ?Sized> {
    cell: Mutex<Option<Arc<T>>>,
}

impl<T: ?Sized> Default for Singleton<T> {
    fn default() -> Self {
        Self {
            cell: Mutex::new(None),
        }
    }
}

impl<T: ?Sized> Singleton<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bound instance, building it with `init` if the slot is empty.
    pub fn get_or_init(&self, init: impl FnOnce() -> Arc<T>) -> Arc<T> {
        let mut cell = self.cell.lock();
        cell.get_or_insert_with(init).clone()
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.cell.lock().clone()
    }

    /// Bind `instance`, replacing whatever was bound.
    pub fn set(&self, instance: Arc<T>) {
        *self.cell.lock() = Some(instance);
    }

    /// Bind `instance` unless the slot is already filled. Returns whether it was bound.
    pub fn set_if_absent(&self, instance: Arc<T>) -> bool {
        let mut cell = self.cell.lock();
        if cell.is_some() {
            return false;
        }
        *cell = Some(instance);
        true
    }

    /// Drop the bound instance so the next resolve builds a new one.
    pub fn forget(&self) -> Option<Arc<T>> {
        self.cell.lock().take()
    }

    pub fn is_bound(&self) -> bool {
        self.cell.lock().is_some()
    }
}

/// The six bindings a view service resolves.
///
/// Wrap it in an `Arc` and hand it to several services to share
/// the filesystem and event dispatcher between them.
#[derive(Default)]
pub struct Container {
    pub files: Singleton<dyn Filesystem>,
    pub events: Singleton<ViewEvents>,
    pub compiler: Singleton<BladeCompiler>,
    pub engine_resolver: Singleton<EngineResolver>,
    pub finder: Singleton<FileViewFinder>,
    pub factory: Singleton<Factory>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the bound slots, in resolution order.
    pub fn bound(&self) -> Vec<&'static str> {
        [
            ("files", self.files.is_bound()),
            ("events", self.events.is_bound()),
            ("compiler", self.compiler.is_bound()),
            ("engine.resolver", self.engine_resolver.is_bound()),
            ("view.finder", self.finder.is_bound()),
            ("view.factory", self.factory.is_bound()),
        ]
        .into_iter()
        .filter_map(|(name, bound)| bound.then_some(name))
        .collect()
    }

    /// Drop the bindings that depend on view and cache paths.
    pub(crate) fn forget_views(&self) {
        self.compiler.forget();
        self.engine_resolver.forget();
        self.finder.forget();
        self.factory.forget();
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("bound", &self.bound())
            .finish()
    }
}

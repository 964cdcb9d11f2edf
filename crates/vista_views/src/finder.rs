//! Resolves logical view names to template files.
//!
//! A view name is a dotted path relative to one of the configured view
//! directories: `admin.users.index` is looked up as
//! `admin/users/index.<extension>`. Names of the form `mail::welcome` are
//! looked up only in the directories registered for the `mail` namespace.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};
use vista_core::{Filesystem, ViewError, ViewResult};
use walkdir::WalkDir;

use crate::engines::DEFAULT_EXTENSIONS;

/// Separates a namespace from the view name.
pub const HINT_DELIMITER: &str = "::";

struct FinderState {
    paths: Vec<PathBuf>,
    extensions: Vec<String>,
    hints: HashMap<String, Vec<PathBuf>>,
    /// Names already resolved, until the next `flush`.
    views: HashMap<String, PathBuf>,
}

/// File-based view finder.
pub struct FileViewFinder {
    files: Arc<dyn Filesystem>,
    state: RwLock<FinderState>,
}

impl FileViewFinder {
    /// Create a finder searching `paths` in order.
    pub fn new(files: Arc<dyn Filesystem>, paths: Vec<PathBuf>) -> Self {
        Self {
            files,
            state: RwLock::new(FinderState {
                paths,
                extensions: DEFAULT_EXTENSIONS.iter().map(|(e, _)| e.to_string()).collect(),
                hints: HashMap::new(),
                views: HashMap::new(),
            }),
        }
    }

    /// Path of the template for `name`.
    pub fn find(&self, name: &str) -> ViewResult<PathBuf> {
        let name = normalize_name(name);
        if let Some(path) = self.state.read().views.get(&name) {
            return Ok(path.clone());
        }

        let path = match name.split_once(HINT_DELIMITER) {
            Some((namespace, view)) => self.find_namespaced(namespace, view)?,
            None => {
                let paths = self.state.read().paths.clone();
                self.find_in_paths(&name, &paths)?
            }
        };

        debug!("Resolved view {} -> {:?}", name, path);
        self.state.write().views.insert(name, path.clone());
        Ok(path)
    }

    /// Whether `name` resolves to a template.
    pub fn exists(&self, name: &str) -> bool {
        self.find(name).is_ok()
    }

    fn find_namespaced(&self, namespace: &str, view: &str) -> ViewResult<PathBuf> {
        if namespace.is_empty() || view.is_empty() || view.contains(HINT_DELIMITER) {
            return Err(ViewError::InvalidName(format!(
                "View [{}{}{}] has an invalid name.",
                namespace, HINT_DELIMITER, view
            )));
        }

        let paths = self
            .state
            .read()
            .hints
            .get(namespace)
            .cloned()
            .ok_or_else(|| {
                ViewError::InvalidName(format!("No hint path defined for [{}].", namespace))
            })?;

        self.find_in_paths(view, &paths).map_err(|e| match e {
            ViewError::NotFound(_) => {
                ViewError::NotFound(format!("{}{}{}", namespace, HINT_DELIMITER, view))
            }
            other => other,
        })
    }

    fn find_in_paths(&self, name: &str, paths: &[PathBuf]) -> ViewResult<PathBuf> {
        let relative = relative_path(name)?;
        let extensions = self.state.read().extensions.clone();

        for dir in paths {
            for extension in &extensions {
                let candidate = dir.join(format!("{}.{}", relative, extension));
                if self.files.exists(&candidate) && !self.files.is_directory(&candidate) {
                    return Ok(candidate);
                }
            }
        }

        if !paths.is_empty() && !paths.iter().any(|p| self.files.is_directory(p)) {
            warn!("None of the view paths exist: {:?}", paths);
            return Err(ViewError::Configuration(format!(
                "no readable view directory among {:?}",
                paths
            )));
        }

        Err(ViewError::NotFound(name.to_string()))
    }

    /// Every view under the configured paths, as `(name, path)` pairs.
    ///
    /// A name present in several directories is listed once, with the file
    /// `find` resolves it to.
    pub fn views(&self) -> Vec<(String, PathBuf)> {
        let (paths, extensions) = {
            let state = self.state.read();
            (state.paths.clone(), state.extensions.clone())
        };

        let mut names = Vec::new();
        for dir in &paths {
            for entry in WalkDir::new(dir)
                .min_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let Ok(relative) = entry.path().strip_prefix(dir) else {
                    continue;
                };
                let relative = relative.to_string_lossy().replace('\\', "/");
                for extension in &extensions {
                    if let Some(stem) = relative.strip_suffix(&format!(".{}", extension)) {
                        names.push(stem.replace('/', "."));
                    }
                }
            }
        }
        names.sort();
        names.dedup();

        names
            .into_iter()
            .filter_map(|name| {
                let path = self.find_in_paths(&name, &paths).ok()?;
                Some((name, path))
            })
            .collect()
    }

    /// Append a directory to search.
    pub fn add_location(&self, path: impl Into<PathBuf>) {
        self.state.write().paths.push(path.into());
    }

    /// Search `path` before every other directory.
    pub fn prepend_location(&self, path: impl Into<PathBuf>) {
        self.state.write().paths.insert(0, path.into());
    }

    /// Add directories for `namespace`, after any already registered.
    pub fn add_namespace(&self, namespace: impl Into<String>, paths: Vec<PathBuf>) {
        self.state
            .write()
            .hints
            .entry(namespace.into())
            .or_default()
            .extend(paths);
    }

    /// Add directories for `namespace`, before any already registered.
    pub fn prepend_namespace(&self, namespace: impl Into<String>, paths: Vec<PathBuf>) {
        let mut state = self.state.write();
        let existing = state.hints.entry(namespace.into()).or_default();
        let mut merged = paths;
        merged.append(existing);
        *existing = merged;
    }

    /// Replace the directories for `namespace`, forgetting resolved names.
    pub fn replace_namespace(&self, namespace: impl Into<String>, paths: Vec<PathBuf>) {
        let namespace = namespace.into();
        let prefix = format!("{}{}", namespace, HINT_DELIMITER);
        let mut state = self.state.write();
        state.views.retain(|name, _| !name.starts_with(&prefix));
        state.hints.insert(namespace, paths);
    }

    /// Register an extension, taking precedence over existing ones.
    pub fn add_extension(&self, extension: impl Into<String>) {
        let extension = extension.into();
        let mut state = self.state.write();
        state.extensions.retain(|e| *e != extension);
        state.extensions.insert(0, extension);
    }

    /// Forget resolved names so the next lookup hits the filesystem again.
    pub fn flush(&self) {
        self.state.write().views.clear();
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.state.read().paths.clone()
    }

    pub fn extensions(&self) -> Vec<String> {
        self.state.read().extensions.clone()
    }

    pub fn hints(&self) -> HashMap<String, Vec<PathBuf>> {
        self.state.read().hints.clone()
    }

    pub fn files(&self) -> &Arc<dyn Filesystem> {
        &self.files
    }
}

impl std::fmt::Debug for FileViewFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("FileViewFinder")
            .field("paths", &state.paths)
            .field("extensions", &state.extensions)
            .field("hints", &state.hints)
            .finish()
    }
}

/// `admin/users` and `admin.users` name the same view.
pub fn normalize_name(name: &str) -> String {
    let name = name.trim();
    match name.split_once(HINT_DELIMITER) {
        Some((namespace, view)) => {
            format!("{}{}{}", namespace, HINT_DELIMITER, view.replace('/', "."))
        }
        None => name.replace('/', "."),
    }
}

/// Relative file path (without extension) for a dotted view name.
fn relative_path(name: &str) -> ViewResult<String> {
    let invalid = || ViewError::InvalidName(format!("View [{}] has an invalid name.", name));

    if name.is_empty() || name.split('.').any(str::is_empty) {
        return Err(invalid());
    }
    let relative = name.replace('.', "/");
    let escapes_root = Path::new(&relative)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes_root {
        return Err(invalid());
    }
    Ok(relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use vista_core::LocalFilesystem;

    fn write(dir: &Path, relative: &str) -> PathBuf {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, relative).unwrap();
        path
    }

    fn finder(paths: Vec<PathBuf>) -> FileViewFinder {
        FileViewFinder::new(Arc::new(LocalFilesystem), paths)
    }

    #[test]
    fn test_find_dotted_names() {
        let temp = tempdir().unwrap();
        let expected = write(temp.path(), "admin/users/index.blade.html");
        let finder = finder(vec![temp.path().to_path_buf()]);

        assert_eq!(finder.find("admin.users.index").unwrap(), expected);
        assert_eq!(finder.find("admin/users/index").unwrap(), expected);
    }

    #[test]
    fn test_first_path_and_extension_win() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        write(second.path(), "page.blade.html");
        let html = write(first.path(), "page.html");
        let blade = write(first.path(), "page.blade.html");

        let finder = finder(vec![first.path().to_path_buf(), second.path().to_path_buf()]);
        assert_eq!(finder.find("page").unwrap(), blade);

        finder.add_extension("html");
        finder.flush();
        assert_eq!(finder.find("page").unwrap(), html);
    }

    #[test]
    fn test_missing_view_is_not_found() {
        let temp = tempdir().unwrap();
        let finder = finder(vec![temp.path().to_path_buf()]);
        assert!(matches!(finder.find("missing"), Err(ViewError::NotFound(n)) if n == "missing"));
        assert!(!finder.exists("missing"));
    }

    #[test]
    fn test_unreadable_paths_are_a_configuration_error() {
        let temp = tempdir().unwrap();
        let finder = finder(vec![temp.path().join("does-not-exist")]);
        assert!(matches!(finder.find("index"), Err(ViewError::Configuration(_))));
    }

    #[test]
    fn test_invalid_names() {
        let temp = tempdir().unwrap();
        let finder = finder(vec![temp.path().to_path_buf()]);
        for name in ["", "..secret", "a..b", "/etc/passwd", "::x", "mail::"] {
            assert!(
                matches!(finder.find(name), Err(ViewError::InvalidName(_))),
                "{name} should be invalid"
            );
        }
    }

    #[test]
    fn test_namespaces() {
        let app = tempdir().unwrap();
        let vendor = tempdir().unwrap();
        let override_dir = tempdir().unwrap();
        let vendor_view = write(vendor.path(), "welcome.blade.html");
        let overridden = write(override_dir.path(), "welcome.blade.html");

        let finder = finder(vec![app.path().to_path_buf()]);
        assert!(matches!(finder.find("mail::welcome"), Err(ViewError::InvalidName(_))));

        finder.add_namespace("mail", vec![vendor.path().to_path_buf()]);
        assert_eq!(finder.find("mail::welcome").unwrap(), vendor_view);
        assert!(matches!(finder.find("mail::missing"), Err(ViewError::NotFound(n)) if n == "mail::missing"));

        finder.replace_namespace("mail", vec![override_dir.path().to_path_buf()]);
        assert_eq!(finder.find("mail::welcome").unwrap(), overridden);

        finder.prepend_namespace("mail", vec![vendor.path().to_path_buf()]);
        finder.flush();
        assert_eq!(finder.find("mail::welcome").unwrap(), vendor_view);
    }

    #[test]
    fn test_locations() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        let in_b = write(b.path(), "only.html");
        let finder = finder(vec![a.path().to_path_buf()]);

        assert!(!finder.exists("only"));
        finder.add_location(b.path());
        assert_eq!(finder.find("only").unwrap(), in_b);

        finder.prepend_location(b.path().join("nested"));
        assert_eq!(finder.paths()[0], b.path().join("nested"));
    }

    #[test]
    fn test_views_lists_every_template_once() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        write(first.path(), "index.blade.html");
        write(first.path(), "partials/nav.blade.html");
        write(second.path(), "index.blade.html");
        write(second.path(), "style.css");
        write(second.path(), "notes.txt");

        let finder = finder(vec![first.path().to_path_buf(), second.path().to_path_buf()]);
        let names: Vec<String> = finder.views().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["index", "partials.nav", "style"]);

        let views = finder.views();
        let index = views.iter().find(|(n, _)| n == "index").unwrap();
        assert!(index.1.starts_with(first.path()));
    }
}

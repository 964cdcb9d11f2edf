//! View service configuration, loadable from YAML, TOML or JSON.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use vista_core::{ViewError, ViewResult};
use vista_views::EngineKind;

/// An extra file extension and the engine that renders it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionConfig {
    pub extension: String,
    pub engine: EngineKind,
}

/// Everything needed to build a [`crate::ViewService`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Directories searched for views, first match wins
    pub view_paths: Vec<PathBuf>,
    /// Directory for compiled templates
    pub cache_path: PathBuf,
    /// Reuse compiled templates while they are fresh
    #[serde(default = "default_cache")]
    pub cache: bool,
    /// Extensions registered on top of the defaults, in order
    #[serde(default)]
    pub extensions: Vec<ExtensionConfig>,
    /// `namespace::view` directories
    #[serde(default)]
    pub namespaces: BTreeMap<String, Vec<PathBuf>>,
}

fn default_cache() -> bool {
    true
}

impl ViewConfig {
    pub fn new(view_paths: Vec<PathBuf>, cache_path: impl Into<PathBuf>) -> Self {
        Self {
            view_paths,
            cache_path: cache_path.into(),
            cache: true,
            extensions: Vec::new(),
            namespaces: BTreeMap::new(),
        }
    }

    /// Load a configuration file, picking the format from its extension.
    pub fn from_file(path: impl AsRef<Path>) -> ViewResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        debug!("Loading view configuration from {:?}", path);

        let mut config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            _ => {
                return Err(ViewError::Configuration(format!(
                    "Unsupported configuration format: {}",
                    path.display()
                )))
            }
        };

        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Make relative directories relative to `base` instead of the working directory.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.view_paths.iter_mut().for_each(resolve);
        resolve(&mut self.cache_path);
        self.namespaces
            .values_mut()
            .flat_map(|paths| paths.iter_mut())
            .for_each(resolve);
    }

    pub fn with_view_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.view_paths.push(path.into());
        self
    }

    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>, engine: EngineKind) -> Self {
        self.extensions.push(ExtensionConfig {
            extension: extension.into(),
            engine,
        });
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>, paths: Vec<PathBuf>) -> Self {
        self.namespaces.insert(namespace.into(), paths);
        self
    }
}

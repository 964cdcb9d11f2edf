//! A view: a template plus the data bound to it for one render.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use vista_core::{to_view_data, ViewData, ViewResult};

use crate::engines::EngineKind;
use crate::eval::RenderEnv;
use crate::factory::Factory;

/// Lazy handle to a resolved template.
pub struct View {
    factory: Arc<Factory>,
    name: String,
    path: PathBuf,
    engine: EngineKind,
    data: ViewData,
}

impl View {
    pub(crate) fn new(
        factory: Arc<Factory>,
        name: String,
        path: PathBuf,
        engine: EngineKind,
        data: ViewData,
    ) -> Self {
        Self {
            factory,
            name,
            path,
            engine,
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn engine(&self) -> EngineKind {
        self.engine
    }

    pub fn factory(&self) -> &Arc<Factory> {
        &self.factory
    }

    /// Data bound to this view, not including shared data.
    pub fn data(&self) -> &ViewData {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Bind `value` as `key`.
    pub fn with(&mut self, key: impl Into<String>, value: impl Serialize) -> ViewResult<&mut Self> {
        let value = serde_json::to_value(value)?;
        Ok(self.insert(key, value))
    }

    /// Bind every entry of a mapping.
    pub fn with_data(&mut self, data: impl Serialize) -> ViewResult<&mut Self> {
        self.data.extend(to_view_data(&data)?);
        Ok(self)
    }

    /// Bind an already converted value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Evaluate the view to a string.
    pub fn render(&mut self) -> ViewResult<String> {
        let mut env = RenderEnv::new(self.factory.clone());
        self.render_in(&mut env)
    }

    /// Render as part of an enclosing render (includes and layouts).
    pub(crate) fn render_in(&mut self, env: &mut RenderEnv) -> ViewResult<String> {
        env.enter(&self.name)?;
        let result = self.render_contents(env);
        env.leave();
        result
    }

    fn render_contents(&mut self, env: &mut RenderEnv) -> ViewResult<String> {
        let factory = self.factory.clone();
        factory.call_composer(self);

        let data = factory.gather_data(self);
        debug!("Rendering view {} with the {} engine", self.name, self.engine);
        factory
            .engine_resolver()
            .resolve(self.engine)
            .get(&self.name, &self.path, &data, env)
    }
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("engine", &self.engine)
            .field("data", &self.data)
            .finish()
    }
}

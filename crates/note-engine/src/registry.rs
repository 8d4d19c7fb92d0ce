//! Explicit map from store root to its shared engine.
//!
//! The registry is owned by whoever composes the application and passed
//! around by reference. There is no process-wide instance.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::EngineConfig;
use crate::engine::NoteEngine;
use crate::fs::FileSystem;
use crate::native_fs::NativeFs;

/// Engine shared between callers working on the same root
pub type SharedEngine<F> = Arc<Mutex<NoteEngine<F>>>;

type EngineFactory<F> = Box<dyn Fn(&Path) -> NoteEngine<F> + Send + Sync>;

pub struct EngineRegistry<F: FileSystem> {
    engines: HashMap<PathBuf, SharedEngine<F>>,
    factory: EngineFactory<F>,
}

impl<F: FileSystem> EngineRegistry<F> {
    /// Create a registry that builds engines with `factory`.
    pub fn new(factory: impl Fn(&Path) -> NoteEngine<F> + Send + Sync + 'static) -> Self {
        Self {
            engines: HashMap::new(),
            factory: Box::new(factory),
        }
    }

    /// The engine for `root`, created (but not initialized) on first use.
    pub fn get_or_create(&mut self, root: &Path) -> SharedEngine<F> {
        if let Some(engine) = self.engines.get(root) {
            return engine.clone();
        }
        tracing::debug!("Creating engine for {}", root.display());
        let engine = Arc::new(Mutex::new((self.factory)(root)));
        self.engines.insert(root.to_path_buf(), engine.clone());
        engine
    }

    /// Build a fresh engine for `root`, dropping the registry's hold on any
    /// previous one. Callers still holding the old engine keep it.
    pub fn replace(&mut self, root: &Path) -> SharedEngine<F> {
        tracing::debug!("Replacing engine for {}", root.display());
        let engine = Arc::new(Mutex::new((self.factory)(root)));
        self.engines.insert(root.to_path_buf(), engine.clone());
        engine
    }

    pub fn get(&self, root: &Path) -> Option<SharedEngine<F>> {
        self.engines.get(root).cloned()
    }

    pub fn remove(&mut self, root: &Path) -> Option<SharedEngine<F>> {
        self.engines.remove(root)
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

impl EngineRegistry<NativeFs> {
    /// Registry of engines over real directories.
    pub fn native(config: EngineConfig) -> Self {
        Self::new(move |root| {
            NoteEngine::with_config(NativeFs::new(root.to_path_buf()), config.clone())
        })
    }
}

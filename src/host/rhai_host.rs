use std::fs;
use std::path::{Path, PathBuf};

use rhai::{Dynamic, Engine, Scope};

use super::{HostAdapter, ABORT_FLAG_NAME};
use crate::engine::AbortSignal;
use crate::error::{LoadError, SaveError, ScriptError};

#[derive(Debug, Clone, Default)]
pub struct RhaiHostConfig {
    /// Upper bound on operations per script run; 0 means unlimited.
    pub max_operations: u64,
}

struct LoadedScene {
    path: PathBuf,
    doc: Dynamic,
}

/// Host backed by an embedded Rhai engine, with JSON documents as scenes.
///
/// The loaded scene is bound into each script as the mutable map `scene`, its path as the
/// constant `scene_path`. Scripts poll `abort_requested()` to honor cancellation.
pub struct RhaiHost {
    engine: Engine,
    current: Option<LoadedScene>,
}

impl RhaiHost {
    pub fn new(cfg: RhaiHostConfig) -> Self {
        let mut engine = Engine::new();
        if cfg.max_operations > 0 {
            engine.set_max_operations(cfg.max_operations);
        }
        engine.on_print(|text| tracing::info!(target: "scene_batch::script", "{text}"));
        engine.register_fn("log", |message: &str| {
            tracing::info!(target: "scene_batch::script", "{message}")
        });
        Self {
            engine,
            current: None,
        }
    }

    /// Path of the currently loaded scene, if any.
    pub fn loaded_scene(&self) -> Option<&Path> {
        self.current.as_ref().map(|s| s.path.as_path())
    }
}

impl HostAdapter for RhaiHost {
    fn load_scene(&mut self, path: &Path) -> Result<(), LoadError> {
        self.current = None;
        if !path.is_file() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }
        let bytes = fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let invalid = |reason: String| LoadError::Invalid {
            path: path.to_path_buf(),
            reason,
        };
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| invalid(e.to_string()))?;
        if !value.is_object() {
            return Err(invalid("top level must be a JSON object".into()));
        }
        let doc = rhai::serde::to_dynamic(&value).map_err(|e| invalid(e.to_string()))?;
        tracing::debug!(scene = %path.display(), "scene loaded");
        self.current = Some(LoadedScene {
            path: path.to_path_buf(),
            doc,
        });
        Ok(())
    }

    fn execute_script(&mut self, path: &Path, abort: &AbortSignal) -> Result<(), ScriptError> {
        if !path.is_file() {
            return Err(ScriptError::NotFound(path.to_path_buf()));
        }
        let source = fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let ast = self
            .engine
            .compile(source)
            .map_err(|e| ScriptError::Syntax {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let flag = abort.clone();
        self.engine
            .register_fn(ABORT_FLAG_NAME, move || flag.is_requested());

        let mut scope = Scope::new();
        if let Some(scene) = &self.current {
            scope.push("scene", scene.doc.clone());
            scope.push_constant("scene_path", scene.path.display().to_string());
        }

        self.engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|e| ScriptError::Runtime {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        // Scripts mutate (or replace) `scene` in place; keep whatever they left behind.
        if let Some(scene) = self.current.as_mut() {
            if let Some(doc) = scope.get_value::<Dynamic>("scene") {
                scene.doc = doc;
            }
        }
        Ok(())
    }

    fn save_scene(&mut self, path: &Path) -> Result<(), SaveError> {
        let scene = self.current.as_ref().ok_or(SaveError::NoSceneLoaded)?;
        let encode = |reason: String| SaveError::Encode {
            path: path.to_path_buf(),
            reason,
        };
        let value: serde_json::Value =
            rhai::serde::from_dynamic(&scene.doc).map_err(|e| encode(e.to_string()))?;
        let json = serde_json::to_string_pretty(&value).map_err(|e| encode(e.to_string()))?;
        fs::write(path, json).map_err(|source| SaveError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(scene = %path.display(), "scene saved");
        Ok(())
    }
}

//! Model loading. Models arrive asynchronously through a [`ModelSlot`],
//! which the stage polls (and listens to) until geometry shows up.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info};
use parking_lot::RwLock;
use thiserror::Error;

use crate::node::{SceneNode, Transform};
use crate::obj::{load_obj_from_str, MeshData};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read model {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse model {name}: {message}")]
    Parse { name: String, message: String },
}

#[derive(Debug, Clone, Default)]
pub enum SlotState {
    #[default]
    Pending,
    Attached(Arc<SceneNode>),
    Failed(String),
}

#[derive(Debug, Default)]
struct SlotInner {
    state: RwLock<SlotState>,
    completed: AtomicBool,
}

/// Shared handle to a model that may still be loading.
///
/// Cloning shares the slot. The loader side calls [`ModelSlot::attach`]
/// for a placeholder node and [`ModelSlot::complete`] once geometry is
/// available; the latter also raises a one-shot completion signal.
#[derive(Debug, Clone, Default)]
pub struct ModelSlot {
    inner: Arc<SlotInner>,
}

impl ModelSlot {
    pub fn pending() -> Self {
        Self::default()
    }

    /// A slot whose model is already complete.
    pub fn ready(node: SceneNode) -> Self {
        let slot = Self::pending();
        slot.complete(node);
        slot
    }

    /// Publishes a node that may not carry geometry yet.
    pub fn attach(&self, node: SceneNode) {
        *self.inner.state.write() = SlotState::Attached(Arc::new(node));
    }

    /// Publishes the finished node and raises the completion signal.
    pub fn complete(&self, node: SceneNode) {
        self.attach(node);
        self.inner.completed.store(true, Ordering::Release);
    }

    pub fn fail(&self, message: impl Into<String>) {
        *self.inner.state.write() = SlotState::Failed(message.into());
    }

    pub fn state(&self) -> SlotState {
        self.inner.state.read().clone()
    }

    pub fn node(&self) -> Option<Arc<SceneNode>> {
        match &*self.inner.state.read() {
            SlotState::Attached(node) => Some(Arc::clone(node)),
            _ => None,
        }
    }

    /// Consumes the completion signal, returning whether it was raised.
    pub fn take_completed(&self) -> bool {
        self.inner.completed.swap(false, Ordering::AcqRel)
    }
}

/// Wraps a mesh in a named root node placed by `transform`.
pub fn model_node(name: &str, mesh: MeshData, transform: Transform) -> SceneNode {
    SceneNode::group(name)
        .with_transform(transform)
        .with_child(SceneNode::with_mesh(format!("{name}-mesh"), Arc::new(mesh)))
}

/// Parses an OBJ document into a placed model node.
pub fn model_from_obj(name: &str, obj: &str, transform: Transform) -> Result<SceneNode, LoadError> {
    let mesh = load_obj_from_str(obj).map_err(|err| LoadError::Parse {
        name: name.to_string(),
        message: format!("{err:#}"),
    })?;
    Ok(model_node(name, mesh, transform))
}

pub fn load_model_file(path: &Path, transform: Transform) -> Result<SceneNode, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    model_from_obj(&model_name(path), &text, transform)
}

/// Loads `path` on a worker thread.
///
/// The returned slot immediately holds an empty placeholder node, so
/// pollers see "node present, no geometry" until the worker finishes.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_model_load(path: PathBuf, transform: Transform) -> ModelSlot {
    let slot = ModelSlot::pending();
    slot.attach(SceneNode::group(model_name(&path)).with_transform(transform));
    let worker_slot = slot.clone();
    let spawned = std::thread::Builder::new()
        .name("model-loader".into())
        .spawn(move || match load_model_file(&path, transform) {
            Ok(node) => {
                info!("loaded model {}", path.display());
                worker_slot.complete(node);
            }
            Err(err) => {
                error!("{err}");
                worker_slot.fail(err.to_string());
            }
        });
    if let Err(err) = spawned {
        error!("failed to start model loader: {err}");
        slot.fail(err.to_string());
    }
    slot
}

fn model_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use glam::Vec3;

    use super::*;
    use crate::bounds::compute_bounds;

    const TRIANGLE: &str = "v 0 0 0\nv 2 0 0\nv 0 2 0\nf 1 2 3\n";

    #[test]
    fn slot_signals_completion_once() {
        let slot = ModelSlot::pending();
        assert!(slot.node().is_none());
        slot.attach(SceneNode::group("island"));
        assert!(slot.node().is_some());
        assert!(!slot.take_completed());

        slot.complete(model_from_obj("island", TRIANGLE, Transform::default()).unwrap());
        assert!(slot.take_completed());
        assert!(!slot.take_completed());
    }

    #[test]
    fn model_node_applies_transform() {
        let node = model_from_obj(
            "island",
            TRIANGLE,
            Transform::from_translation(Vec3::new(0.0, -1.0, 0.0)),
        )
        .unwrap();
        let bounds = compute_bounds(&node).unwrap();
        assert_eq!(bounds.min, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn parse_errors_name_the_model() {
        let err = model_from_obj("broken", "f 1 2 3\n", Transform::default()).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_model_file(Path::new("/definitely/not/here.obj"), Transform::default())
            .unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn worker_completes_slot() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TRIANGLE.as_bytes()).unwrap();
        let slot = spawn_model_load(file.path().to_path_buf(), Transform::default());
        for _ in 0..500 {
            if slot.take_completed() {
                let node = slot.node().unwrap();
                assert!(compute_bounds(&node).is_some());
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        panic!("model never finished loading");
    }
}

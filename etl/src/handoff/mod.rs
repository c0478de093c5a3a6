//! Step hand-off store.
//!
//! When the stages run as separate processes, each one pushes its output as
//! a JSON document and the next one pulls it. Documents live at
//! `<dir>/<task_id>/<key>.json` and are overwritten on every push.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{HandoffError, HandoffResult};

/// Directory-backed key/value store for step payloads.
#[derive(Debug, Clone)]
pub struct HandoffStore {
    dir: PathBuf,
}

impl HandoffStore {
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, task_id: &str, key: &str) -> PathBuf {
        self.dir.join(task_id).join(format!("{}.json", key))
    }

    /// Store `value` under `(task_id, key)`, replacing any previous payload.
    pub fn push<T: Serialize>(&self, task_id: &str, key: &str, value: &T) -> HandoffResult<PathBuf> {
        let path = self.path(task_id, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write then rename so a reader never sees half a payload.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(value)?)?;
        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    /// Read the payload stored under `(task_id, key)`.
    pub fn pull<T: DeserializeOwned>(&self, task_id: &str, key: &str) -> HandoffResult<T> {
        let path = self.path(task_id, key);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HandoffError::Missing {
                    task_id: task_id.to_string(),
                    key: key.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&content)?)
    }

    pub fn contains(&self, task_id: &str, key: &str) -> bool {
        self.path(task_id, key).exists()
    }
}

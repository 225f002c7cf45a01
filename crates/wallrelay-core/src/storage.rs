//! Durable JSON documents on the local filesystem.
//!
//! Writes go to a sibling temp file which is then renamed over the target, so a crash
//! mid-write leaves either the old or the new document, never a torn one.

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::{errors::Error, Result};

#[derive(Clone, Debug)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document, or `T::default()` if the file does not exist or is empty.
    pub async fn load<T>(&self) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let txt = match tokio::fs::read_to_string(&self.path).await {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(store_err(&self.path, "read", e)),
        };
        if txt.trim().is_empty() {
            return Ok(T::default());
        }
        serde_json::from_str(&txt).map_err(|e| store_err(&self.path, "parse", e))
    }

    pub async fn save<T>(&self, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        let txt = serde_json::to_string_pretty(value)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| store_err(parent, "create dir", e))?;
            }
        }

        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, txt)
            .await
            .map_err(|e| store_err(&tmp, "write", e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| store_err(&self.path, "rename", e))?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn store_err(path: &Path, op: &str, e: impl std::fmt::Display) -> Error {
    Error::Store(format!("{op} {}: {e}", path.display()))
}

//! Atomic JSON persistence for the file-backed stores.
//!
//! Writes go to a temporary sibling file first and are published with a
//! rename. `StagedWrite` splits the two halves so the learning phase
//! can stage the experience log and the strategy records together and
//! only rename once both serialized cleanly.

use anyhow::Result;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use evoo_core::error::EvooError;

fn store_error(path: &Path, source: std::io::Error) -> anyhow::Error {
    EvooError::Store {
        path: path.display().to_string(),
        source,
    }
    .into()
}

/// Serialize `value` to `path` atomically (temp file + rename).
/// Creating the parent directory is idempotent.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    stage_json(path, value)?.commit()
}

/// Stage a serialized value next to its destination without publishing
/// it. Dropping an uncommitted stage removes the temporary file.
pub fn stage_json<T: Serialize>(path: &Path, value: &T) -> Result<StagedWrite> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| store_error(parent, e))?;
        }
    }

    let tmp = tmp_path(path);
    let body = serde_json::to_vec_pretty(value).map_err(EvooError::from)?;
    fs::write(&tmp, body).map_err(|e| store_error(&tmp, e))?;

    Ok(StagedWrite {
        tmp,
        dest: path.to_path_buf(),
        committed: false,
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    name.push_str(&format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

#[derive(Debug)]
pub struct StagedWrite {
    tmp: PathBuf,
    dest: PathBuf,
    committed: bool,
}

impl StagedWrite {
    /// Publish the staged content. The rename is the commit point.
    pub fn commit(mut self) -> Result<()> {
        fs::rename(&self.tmp, &self.dest).map_err(|e| store_error(&self.dest, e))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("data.json");
        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();
        let body = fs::read_to_string(&path).unwrap();
        let back: Vec<i32> = serde_json::from_str(&body).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
        // Idempotent directory creation: write again
        write_json_atomic(&path, &vec![4]).unwrap();
    }

    #[test]
    fn test_uncommitted_stage_leaves_no_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        {
            let _staged = stage_json(&path, &"pending").unwrap();
        }
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_staged_pair_commits_together() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");
        let stage_a = stage_json(&a, &1).unwrap();
        let stage_b = stage_json(&b, &2).unwrap();
        assert!(!a.exists() && !b.exists());
        stage_a.commit().unwrap();
        stage_b.commit().unwrap();
        assert!(a.exists() && b.exists());
    }
}

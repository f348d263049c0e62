//! Flat filesystem store for uploaded videos and their result documents.
//!
//! Files live in one directory keyed by a server-generated UUID: the video
//! as `{id}.{ext}` and the processing result as `{id}_result.json`. The
//! filesystem provides the only durability and consistency guarantees.

use std::fs;
use std::path::PathBuf;

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;

const RESULT_SUFFIX: &str = "_result.json";

/// One stored upload together with its result document.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub file_id: String,
    pub video_file: Option<String>,
    pub result: Value,
}

/// Directory-backed store; all methods are synchronous and expected to run
/// on blocking worker threads.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    /// Opens the store, creating the directory when missing.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, AppError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| {
            AppError::internal(format!(
                "failed to create upload directory {:?}: {err}",
                root
            ))
        })?;
        Ok(Self { root })
    }

    /// Saves uploaded video bytes under `{id}.{extension}`.
    ///
    /// Returns the stored filename.
    pub fn save_video(&self, id: &Uuid, extension: &str, bytes: &[u8]) -> Result<String, AppError> {
        let filename = format!("{id}.{extension}");
        self.write_atomic(&filename, bytes)?;
        Ok(filename)
    }

    /// Saves the result document under `{id}_result.json`.
    pub fn save_result(&self, id: &Uuid, result: &Value) -> Result<(), AppError> {
        let bytes = serde_json::to_vec_pretty(result)
            .map_err(|err| AppError::internal(format!("failed to encode result: {err}")))?;
        self.write_atomic(&format!("{id}{RESULT_SUFFIX}"), &bytes)
    }

    /// Loads the result document for an id, `None` when absent.
    pub fn load_result(&self, id: &Uuid) -> Result<Option<Value>, AppError> {
        let path = self.root.join(format!("{id}{RESULT_SUFFIX}"));
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&path)
            .map_err(|err| AppError::internal(format!("failed to read {:?}: {err}", path)))?;
        let value = serde_json::from_slice(&bytes)
            .map_err(|err| AppError::internal(format!("corrupt result document {:?}: {err}", path)))?;
        Ok(Some(value))
    }

    /// Reads back the stored video for an id as `(bytes, extension)`.
    pub fn read_video(&self, id: &Uuid) -> Result<Option<(Vec<u8>, String)>, AppError> {
        let Some((path, extension)) = self.find_video(id)? else {
            return Ok(None);
        };
        let bytes = fs::read(&path)
            .map_err(|err| AppError::internal(format!("failed to read {:?}: {err}", path)))?;
        Ok(Some((bytes, extension)))
    }

    /// Enumerates every stored result with its matching video filename.
    ///
    /// Unreadable result documents are skipped with a warning, matching the
    /// best-effort contract of the listing endpoint.
    pub fn list(&self) -> Result<Vec<StoredEntry>, AppError> {
        let mut entries = Vec::new();
        for name in self.entry_names()? {
            let Some(file_id) = name.strip_suffix(RESULT_SUFFIX) else {
                continue;
            };
            let path = self.root.join(&name);
            let result = match fs::read(&path)
                .map_err(|err| err.to_string())
                .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|err| err.to_string()))
            {
                Ok(value) => value,
                Err(err) => {
                    warn!(file = %name, error = %err, "skipping unreadable result document");
                    continue;
                }
            };

            let video_prefix = format!("{file_id}.");
            let video_file = self
                .entry_names()?
                .into_iter()
                .find(|candidate| {
                    candidate.starts_with(&video_prefix) && !candidate.ends_with(RESULT_SUFFIX)
                });

            entries.push(StoredEntry {
                file_id: file_id.to_string(),
                video_file,
                result,
            });
        }
        entries.sort_by(|a, b| a.file_id.cmp(&b.file_id));
        Ok(entries)
    }

    /// Deletes every file stored under an id and returns the deleted names.
    pub fn delete(&self, id: &Uuid) -> Result<Vec<String>, AppError> {
        let id = id.to_string();
        let mut deleted = Vec::new();
        for name in self.entry_names()? {
            if !name.starts_with(&id) {
                continue;
            }
            let path = self.root.join(&name);
            match fs::remove_file(&path) {
                Ok(()) => deleted.push(name),
                Err(err) => warn!(file = %name, error = %err, "failed to delete stored file"),
            }
        }
        Ok(deleted)
    }

    fn find_video(&self, id: &Uuid) -> Result<Option<(PathBuf, String)>, AppError> {
        let prefix = format!("{id}.");
        for name in self.entry_names()? {
            if name.starts_with(&prefix) && !name.ends_with(RESULT_SUFFIX) {
                let extension = name
                    .rsplit_once('.')
                    .map(|(_, ext)| ext.to_string())
                    .unwrap_or_default();
                return Ok(Some((self.root.join(name), extension)));
            }
        }
        Ok(None)
    }

    fn entry_names(&self) -> Result<Vec<String>, AppError> {
        let read_dir = fs::read_dir(&self.root).map_err(|err| {
            AppError::internal(format!(
                "failed to read upload directory {:?}: {err}",
                self.root
            ))
        })?;
        let mut names = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|err| {
                AppError::internal(format!("failed to enumerate uploads: {err}"))
            })?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    // Temp-file-and-rename so readers never observe a partial write.
    fn write_atomic(&self, filename: &str, bytes: &[u8]) -> Result<(), AppError> {
        let target = self.root.join(filename);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                AppError::internal(format!("failed to create {:?}: {err}", parent))
            })?;
        }
        let tmp = target.with_extension("part");
        fs::write(&tmp, bytes)
            .map_err(|err| AppError::internal(format!("failed to write {:?}: {err}", tmp)))?;
        fs::rename(&tmp, &target).map_err(|err| {
            AppError::internal(format!(
                "failed to move {:?} into place at {:?}: {err}",
                tmp, target
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, UploadStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = UploadStore::open(dir.path()).expect("store");
        (dir, store)
    }

    #[test]
    fn save_and_read_video_roundtrip() {
        let (_dir, store) = store();
        let id = Uuid::new_v4();

        let filename = store.save_video(&id, "mp4", b"movie-bytes").expect("save");
        assert_eq!(filename, format!("{id}.mp4"));

        let (bytes, extension) = store.read_video(&id).expect("read").expect("present");
        assert_eq!(bytes, b"movie-bytes");
        assert_eq!(extension, "mp4");
    }

    #[test]
    fn read_missing_video_is_none() {
        let (_dir, store) = store();
        assert!(store.read_video(&Uuid::new_v4()).expect("read").is_none());
    }

    #[test]
    fn result_roundtrip_and_listing() {
        let (_dir, store) = store();
        let id = Uuid::new_v4();

        store.save_video(&id, "webm", b"x").expect("save video");
        store
            .save_result(&id, &json!({"success": true, "file_id": id.to_string()}))
            .expect("save result");

        let loaded = store.load_result(&id).expect("load").expect("present");
        assert_eq!(loaded["success"], true);

        let entries = store.list().expect("list");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file_id, id.to_string());
        assert_eq!(entries[0].video_file.as_deref(), Some(&*format!("{id}.webm")));
    }

    #[test]
    fn delete_removes_video_and_result() {
        let (_dir, store) = store();
        let id = Uuid::new_v4();

        store.save_video(&id, "mkv", b"x").expect("save video");
        store.save_result(&id, &json!({"ok": 1})).expect("save result");

        let mut deleted = store.delete(&id).expect("delete");
        deleted.sort();
        assert_eq!(
            deleted,
            vec![format!("{id}.mkv"), format!("{id}_result.json")]
        );
        assert!(store.read_video(&id).expect("read").is_none());
        assert!(store.load_result(&id).expect("load").is_none());
    }

    #[test]
    fn delete_unknown_id_reports_nothing() {
        let (_dir, store) = store();
        assert!(store.delete(&Uuid::new_v4()).expect("delete").is_empty());
    }
}

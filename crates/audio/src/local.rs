// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local-disk tier: atomic temp-file-then-rename writes under a configured
//! root, rejecting any key that would escape it.

use relay_core::ports::AudioStoreError;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// The local filesystem tier of the audio store.
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `key` to a path under `root`, rejecting traversal outside it.
    fn resolve(&self, key: &str) -> Result<PathBuf, AudioStoreError> {
        if key.is_empty() {
            return Err(AudioStoreError::InvalidKey(key.to_string()));
        }
        let joined = self.root.join(key);
        let mut depth: i64 = 0;
        for component in Path::new(key).components() {
            use std::path::Component;
            match component {
                Component::Normal(_) => depth += 1,
                Component::CurDir => {}
                Component::ParentDir => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(AudioStoreError::InvalidKey(key.to_string()));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(AudioStoreError::InvalidKey(key.to_string()));
                }
            }
        }
        Ok(joined)
    }

    pub fn local_path(&self, key: &str) -> Option<PathBuf> {
        self.resolve(key).ok()
    }

    pub async fn exists(&self, key: &str) -> bool {
        match self.resolve(key) {
            Ok(path) => tokio::fs::metadata(path).await.is_ok(),
            Err(_) => false,
        }
    }

    pub async fn save(&self, key: &str, bytes: &[u8]) -> Result<(), AudioStoreError> {
        let path = self.resolve(key)?;
        let dir = path.parent().ok_or_else(|| AudioStoreError::InvalidKey(key.to_string()))?;
        tokio::fs::create_dir_all(dir).await.map_err(|e| AudioStoreError::Io(e.to_string()))?;

        let tmp_path = dir.join(format!(".{}.tmp-{}", path.file_name().and_then(|n| n.to_str()).unwrap_or("obj"), nanoid::nanoid!(8)));
        let mut file = tokio::fs::File::create(&tmp_path).await.map_err(|e| AudioStoreError::Io(e.to_string()))?;
        file.write_all(bytes).await.map_err(|e| AudioStoreError::Io(e.to_string()))?;
        file.sync_all().await.map_err(|e| AudioStoreError::Io(e.to_string()))?;
        drop(file);

        tokio::fs::rename(&tmp_path, &path).await.map_err(|e| AudioStoreError::Io(e.to_string()))?;
        Ok(())
    }

    pub async fn open(&self, key: &str) -> Result<Option<Vec<u8>>, AudioStoreError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AudioStoreError::Io(e.to_string())),
        }
    }

    pub async fn remove(&self, key: &str) -> Result<(), AudioStoreError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AudioStoreError::Io(e.to_string())),
        }
    }

    /// Every key currently on disk under `root`, with its size and
    /// modification time, for the cache pruner.
    pub async fn list(&self) -> Result<Vec<LocalObject>, AudioStoreError> {
        let mut out = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(AudioStoreError::Io(e.to_string())),
            };
            while let Some(entry) = entries.next_entry().await.map_err(|e| AudioStoreError::Io(e.to_string()))? {
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(|e| AudioStoreError::Io(e.to_string()))?;
                if file_type.is_dir() {
                    stack.push(path);
                    continue;
                }
                let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                if file_name.starts_with('.') {
                    continue;
                }
                let metadata = entry.metadata().await.map_err(|e| AudioStoreError::Io(e.to_string()))?;
                let Ok(key) = path.strip_prefix(&self.root).map(|p| p.to_string_lossy().to_string()) else {
                    continue;
                };
                let modified_ms = metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0);
                out.push(LocalObject { key, size_bytes: metadata.len(), modified_ms });
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Clone)]
pub struct LocalObject {
    pub key: String,
    pub size_bytes: u64,
    pub modified_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_open_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        backend.save("calls/1.wav", b"hello").await.unwrap();
        assert_eq!(backend.open("calls/1.wav").await.unwrap(), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        assert_eq!(backend.open("nope.wav").await.unwrap(), None);
    }

    #[tokio::test]
    async fn path_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        let err = backend.save("../../etc/passwd", b"x").await.unwrap_err();
        assert!(matches!(err, AudioStoreError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn absolute_path_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        let err = backend.save("/etc/passwd", b"x").await.unwrap_err();
        assert!(matches!(err, AudioStoreError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn list_finds_saved_objects() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        backend.save("a/b.wav", b"123").await.unwrap();
        let objects = backend.list().await.unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].key, format!("a{}b.wav", std::path::MAIN_SEPARATOR));
        assert_eq!(objects[0].size_bytes, 3);
    }
}

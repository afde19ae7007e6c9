use super::StorageEngine;
use crate::error::{PersistError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;

const VALUE_EXT: &str = "json";
const TEMP_EXT: &str = "json.tmp";

/// File-backed storage engine
///
/// Each key lives in its own file under `root`. Writes go to a temp file
/// which is fsynced and renamed over the old value, so a crash mid-write
/// leaves the previous value readable.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fails unless `root` is absent or a directory
    pub async fn check_root(&self) -> Result<()> {
        match fs::metadata(&self.root).await {
            Ok(meta) if !meta.is_dir() => Err(PersistError::Storage(format!(
                "{:?} is not a directory",
                self.root
            ))),
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.{}", escape_key(key), VALUE_EXT))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.{}", escape_key(key), TEMP_EXT))
    }

    /// Keys currently stored, sorted
    pub async fn keys(&self) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(stem) = name.strip_suffix(&format!(".{}", VALUE_EXT)) {
                if let Some(key) = unescape_key(stem) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl StorageEngine for FileStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.value_path(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.root).await?;

        let temp = self.temp_path(key);
        let mut file = File::create(&temp).await?;
        file.write_all(value.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp, self.value_path(key)).await?;
        debug!("Stored {} bytes at {:?}", value.len(), self.value_path(key));

        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.value_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let owned = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| {
                    n.ends_with(&format!(".{}", VALUE_EXT)) || n.ends_with(&format!(".{}", TEMP_EXT))
                });

            if owned && entry.file_type().await?.is_file() {
                fs::remove_file(&path).await?;
            }
        }

        Ok(())
    }
}

/// Map a key to a file-name-safe string (`%XX` for anything but `[A-Za-z0-9_-]`)
fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn unescape_key(escaped: &str) -> Option<String> {
    let bytes = escaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = escaped.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out).ok()
}

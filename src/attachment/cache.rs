//! 附件缓存 - 每条通知一个本地媒体文件
//!
//! 写入流程：同目录临时文件 -> 写完 flush -> rename 到最终路径，
//! 因此半写的文件永远不会以附件的名字出现。

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::NamedTempFile;
use tracing::{debug, warn};
use uuid::Uuid;

/// 缓存文件（成功附加后归渲染端所有，本模块不再删除）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    id: Uuid,
    path: PathBuf,
    extension: String,
    len: u64,
}

impl CacheEntry {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

/// 附件缓存目录
#[derive(Debug, Clone)]
pub struct AttachmentCache {
    dir: PathBuf,
}

impl AttachmentCache {
    /// 使用指定目录（不存在则创建）
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 原子写入一个新条目，每次调用生成新的 id
    pub fn store(&self, bytes: &[u8], extension: &str) -> io::Result<CacheEntry> {
        let id = Uuid::new_v4();
        let path = self.dir.join(format!("{}.{}", id, extension));

        // 目录可能被系统清理过
        fs::create_dir_all(&self.dir)?;

        if path.exists() {
            fs::remove_file(&path)?;
        }

        let mut temp = NamedTempFile::new_in(&self.dir)?;
        temp.write_all(bytes)?;
        temp.flush()?;
        temp.persist(&path).map_err(|e| e.error)?;

        debug!(path = %path.display(), bytes = bytes.len(), "Attachment cached");

        Ok(CacheEntry {
            id,
            path,
            extension: extension.to_string(),
            len: bytes.len() as u64,
        })
    }

    /// 删除条目（未交给渲染端的文件）
    pub fn remove(&self, entry: &CacheEntry) -> io::Result<()> {
        match fs::remove_file(&entry.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// 清理超过 `max_age` 的文件，返回删除数量
    pub fn sweep(&self, max_age: Duration) -> io::Result<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let now = SystemTime::now();
        let mut removed = 0;

        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let metadata = match entry.metadata() {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to sweep cached attachment"),
            }
        }

        if removed > 0 {
            debug!(removed, dir = %self.dir.display(), "Swept stale attachments");
        }
        Ok(removed)
    }
}

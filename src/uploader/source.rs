// 分片数据源
//
// 上传会话只通过 ChunkSource 读取字节范围，不关心数据来自磁盘还是内存

use anyhow::Context;
use async_trait::async_trait;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 可按字节范围读取的文件引用
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// 读取 [range.start, range.end) 的数据
    async fn read_range(&self, range: Range<u64>) -> io::Result<Vec<u8>>;
}

/// 本地文件数据源
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 打开本地文件，返回数据源、文件名和文件大小
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<(Self, String, u64)> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("无法读取文件信息: {:?}", path))?;

        if !metadata.is_file() {
            anyhow::bail!("不是普通文件: {:?}", path);
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_string())
            .with_context(|| format!("无法获取文件名: {:?}", path))?;

        Ok((Self { path }, file_name, metadata.len()))
    }
}

#[async_trait]
impl ChunkSource for FileSource {
    async fn read_range(&self, range: Range<u64>) -> io::Result<Vec<u8>> {
        let path = self.path.clone();
        let size = (range.end - range.start) as usize;

        tokio::task::spawn_blocking(move || {
            let mut file = std::fs::File::open(&path)?;
            file.seek(SeekFrom::Start(range.start))?;

            let mut buffer = vec![0u8; size];
            file.read_exact(&mut buffer)?;

            Ok(buffer)
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }
}

/// 内存数据源
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Arc<[u8]>,
}

impl MemorySource {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl ChunkSource for MemorySource {
    async fn read_range(&self, range: Range<u64>) -> io::Result<Vec<u8>> {
        let start = range.start as usize;
        let end = range.end as usize;
        self.data
            .get(start..end)
            .map(|slice| slice.to_vec())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("范围越界: {}..{}, 数据长度={}", start, end, self.data.len()),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_file_source_reads_range() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"0123456789abcdef").unwrap();

        let (source, _name, size) = FileSource::open(file.path()).await.unwrap();
        assert_eq!(size, 16);
        assert_eq!(source.read_range(4..10).await.unwrap(), b"456789");
        assert_eq!(source.read_range(10..16).await.unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_file_source_short_read_fails() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"short").unwrap();

        let source = FileSource::new(file.path());
        assert!(source.read_range(0..100).await.is_err());
    }

    #[tokio::test]
    async fn test_open_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileSource::open(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_source() {
        let source = MemorySource::new(b"hello world".to_vec());
        assert_eq!(source.len(), 11);
        assert_eq!(source.read_range(6..11).await.unwrap(), b"world");
        assert!(source.read_range(6..20).await.is_err());
    }
}

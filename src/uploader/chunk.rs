// 上传分片规划
//
// 分片规则：
// - 分片 i 的字节范围为 [i * chunk_size, min((i + 1) * chunk_size, file_size))
// - 所有分片无间隙、无重叠地覆盖整个文件
// - 空文件没有分片

use crate::uploader::error::SessionError;
use std::ops::Range;
use tracing::debug;

/// 默认上传分片大小: 1MB
pub const DEFAULT_UPLOAD_CHUNK_SIZE: u64 = 1024 * 1024;

/// 分片字节范围
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRange {
    /// 分片索引（从 0 开始）
    pub index: usize,
    /// 字节范围
    pub range: Range<u64>,
}

impl ChunkRange {
    /// 分片大小
    pub fn size(&self) -> u64 {
        self.range.end - self.range.start
    }

    pub fn start(&self) -> u64 {
        self.range.start
    }

    pub fn end(&self) -> u64 {
        self.range.end
    }
}

/// 分片规划器
///
/// 纯函数集合，不持有任何状态
pub struct ChunkPlanner;

impl ChunkPlanner {
    /// 计算分片总数：ceil(file_size / chunk_size)
    pub fn plan(file_size: u64, chunk_size: u64) -> Result<usize, SessionError> {
        check_chunk_size(chunk_size)?;
        Ok(file_size.div_ceil(chunk_size) as usize)
    }

    /// 计算指定分片的字节范围
    ///
    /// # 参数
    /// * `index` - 分片索引，必须小于分片总数
    /// * `file_size` - 文件大小
    /// * `chunk_size` - 分片大小
    pub fn range_for(index: usize, file_size: u64, chunk_size: u64) -> Result<ChunkRange, SessionError> {
        let total_chunks = Self::plan(file_size, chunk_size)?;
        if index >= total_chunks {
            return Err(SessionError::InvalidConfiguration(format!(
                "分片索引越界: index={}, total_chunks={}",
                index, total_chunks
            )));
        }

        // index < total_chunks，start 必然小于 file_size
        let start = index as u64 * chunk_size;
        let end = start + chunk_size.min(file_size - start);

        debug!(
            "分片 #{}: bytes={}-{}, 大小={} bytes",
            index,
            start,
            end - 1,
            end - start
        );

        Ok(ChunkRange {
            index,
            range: start..end,
        })
    }

    /// 按顺序列出所有分片
    pub fn ranges(file_size: u64, chunk_size: u64) -> Result<Vec<ChunkRange>, SessionError> {
        check_chunk_size(chunk_size)?;

        let mut chunks = Vec::new();
        let mut offset = 0u64;
        let mut index = 0;

        while offset < file_size {
            let end = offset + chunk_size.min(file_size - offset);
            chunks.push(ChunkRange {
                index,
                range: offset..end,
            });
            offset = end;
            index += 1;
        }

        Ok(chunks)
    }
}

fn check_chunk_size(chunk_size: u64) -> Result<(), SessionError> {
    if chunk_size == 0 {
        return Err(SessionError::InvalidConfiguration(
            "分片大小必须大于 0".to_string(),
        ));
    }
    Ok(())
}

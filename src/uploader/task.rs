// 上传任务定义

use crate::uploader::chunk::ChunkPlanner;
use crate::uploader::error::SessionError;
use serde::{Deserialize, Serialize};

/// 上传会话状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UploadSessionStatus {
    /// 尚未发送任何分片
    Idle,
    /// 上传中
    Uploading,
    /// 已完成
    Completed,
    /// 已取消
    Cancelled,
    /// 失败
    Failed,
}

impl UploadSessionStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadSessionStatus::Completed
                | UploadSessionStatus::Cancelled
                | UploadSessionStatus::Failed
        )
    }
}

impl From<&SessionError> for UploadSessionStatus {
    fn from(error: &SessionError) -> Self {
        if error.is_cancelled() {
            UploadSessionStatus::Cancelled
        } else {
            UploadSessionStatus::Failed
        }
    }
}

/// 进度事件
///
/// 每个分片上传成功后发出一次，索引严格递增
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// 刚完成的分片索引
    pub current_chunk_index: usize,
    /// 完成百分比：ceil((index + 1) * 100 / total_chunks)
    pub percent_complete: u8,
}

impl ProgressEvent {
    pub fn new(current_chunk_index: usize, total_chunks: usize) -> Self {
        Self {
            current_chunk_index,
            percent_complete: percent_complete(current_chunk_index, total_chunks),
        }
    }
}

/// 计算完成百分比（整数向上取整，避免浮点误差）
pub fn percent_complete(index: usize, total_chunks: usize) -> u8 {
    if total_chunks == 0 {
        return 100;
    }
    let done = (index as u64 + 1).min(total_chunks as u64);
    let total = total_chunks as u64;
    ((done * 100).div_ceil(total)) as u8
}

/// 上传任务
///
/// 分片总数始终由 file_size / chunk_size 推导，不单独存储。
/// 字段只能经 `UploadTask::new` 校验后写入，外部通过只读访问器查看
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTask {
    /// 服务端使用的文件名
    file_name: String,
    /// 文件大小
    file_size: u64,
    /// 分片大小
    chunk_size: u64,
    /// 下一个待上传的分片索引
    current_chunk_index: usize,
    /// 任务状态
    status: UploadSessionStatus,
    /// 开始时间 (Unix timestamp)
    started_at: Option<i64>,
    /// 结束时间 (Unix timestamp)
    finished_at: Option<i64>,
    /// 错误信息
    error: Option<String>,
}

impl UploadTask {
    /// 创建新的上传任务
    ///
    /// # 参数
    /// * `start_index` - 起始分片索引（续传时为之前已成功的分片数）
    pub fn new(
        file_name: String,
        file_size: u64,
        chunk_size: u64,
        start_index: usize,
    ) -> Result<Self, SessionError> {
        let total_chunks = ChunkPlanner::plan(file_size, chunk_size)?;
        if start_index > total_chunks {
            return Err(SessionError::InvalidConfiguration(format!(
                "起始分片索引越界: start_index={}, total_chunks={}",
                start_index, total_chunks
            )));
        }

        Ok(Self {
            file_name,
            file_size,
            chunk_size,
            current_chunk_index: start_index,
            status: UploadSessionStatus::Idle,
            started_at: None,
            finished_at: None,
            error: None,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// 下一个待上传的分片索引，也是续传时应使用的起始索引
    pub fn current_chunk_index(&self) -> usize {
        self.current_chunk_index
    }

    pub fn status(&self) -> UploadSessionStatus {
        self.status
    }

    pub fn started_at(&self) -> Option<i64> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<i64> {
        self.finished_at
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// 分片总数
    pub fn total_chunks(&self) -> usize {
        // chunk_size 已在构造时校验
        self.file_size.div_ceil(self.chunk_size) as usize
    }

    /// 剩余分片数
    pub fn remaining_chunks(&self) -> usize {
        self.total_chunks().saturating_sub(self.current_chunk_index)
    }

    /// 标记为上传中
    pub fn mark_uploading(&mut self) {
        self.status = UploadSessionStatus::Uploading;
        if self.started_at.is_none() {
            self.started_at = Some(chrono::Utc::now().timestamp());
        }
    }

    /// 分片上传成功后推进索引
    pub fn advance(&mut self) {
        if self.current_chunk_index < self.total_chunks() {
            self.current_chunk_index += 1;
        }
    }

    /// 标记为已完成
    pub fn mark_completed(&mut self) {
        self.status = UploadSessionStatus::Completed;
        self.finished_at = Some(chrono::Utc::now().timestamp());
    }

    /// 标记为已取消
    pub fn mark_cancelled(&mut self) {
        self.status = UploadSessionStatus::Cancelled;
        self.finished_at = Some(chrono::Utc::now().timestamp());
    }

    /// 标记为失败
    pub fn mark_failed(&mut self, error: String) {
        self.status = UploadSessionStatus::Failed;
        self.finished_at = Some(chrono::Utc::now().timestamp());
        self.error = Some(error);
    }
}

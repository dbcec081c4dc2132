// 上传会话
//
// 状态机：Idle -> Uploading -> {Completed | Cancelled | Failed}
//
// 上传流程（严格串行）：
// 1. 按索引递增计算分片范围并读取数据
// 2. 发送分片，等待服务端响应后才处理下一个分片
// 3. 成功后发出进度事件
// 4. 非最后一个分片时等待固定间隔（可被取消）
//
// 取消令牌在每个挂起点检查；已被服务端接收的分片不会回滚

use crate::config::UploadConfig;
use crate::uploader::chunk::ChunkPlanner;
use crate::uploader::error::SessionError;
use crate::uploader::source::ChunkSource;
use crate::uploader::task::{ProgressEvent, UploadSessionStatus, UploadTask};
use crate::uploader::transport::ChunkTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 进度回调
pub type ProgressCallback = Box<dyn FnMut(ProgressEvent) + Send>;

/// 上传完成信号，携带合并请求所需的信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// 文件名
    pub file_name: String,
    /// 分片总数
    pub total_chunks: usize,
    /// 本次会话实际发送的分片数
    pub uploaded_chunks: usize,
}

/// 上传会话
///
/// 负责单个文件的一次上传尝试，终态后不可复用
pub struct UploadSession<T> {
    /// 上传任务
    task: UploadTask,
    /// 文件数据源
    source: Arc<dyn ChunkSource>,
    /// 分片传输
    transport: T,
    /// 取消令牌（调用方持有）
    cancel: CancellationToken,
    /// 分片间隔
    chunk_delay: Duration,
    /// 进度回调
    on_progress: Option<ProgressCallback>,
}

impl<T: ChunkTransport> UploadSession<T> {
    /// 创建上传会话
    ///
    /// # 参数
    /// * `task` - 上传任务（含起始分片索引）
    /// * `source` - 文件数据源，会话结束前调用方不得修改文件
    /// * `transport` - 分片传输
    /// * `cancel` - 取消令牌
    /// * `config` - 上传配置（分片间隔）
    pub fn new(
        task: UploadTask,
        source: Arc<dyn ChunkSource>,
        transport: T,
        cancel: CancellationToken,
        config: &UploadConfig,
    ) -> Self {
        Self {
            task,
            source,
            transport,
            cancel,
            chunk_delay: Duration::from_millis(config.chunk_delay_ms),
            on_progress: None,
        }
    }

    /// 设置进度回调
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(ProgressEvent) + Send + 'static,
    {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// 当前状态
    pub fn status(&self) -> UploadSessionStatus {
        self.task.status()
    }

    /// 上传任务快照
    pub fn task(&self) -> &UploadTask {
        &self.task
    }

    /// 执行上传，直到完成、取消或失败
    pub async fn run(&mut self) -> Result<UploadOutcome, SessionError> {
        if self.task.status() != UploadSessionStatus::Idle {
            return Err(SessionError::InvalidConfiguration(format!(
                "会话已处于 {:?} 状态，不可重复运行",
                self.task.status()
            )));
        }

        info!(
            "开始上传: file={}, size={}, chunk_size={}, total_chunks={}, start_index={}",
            self.task.file_name(),
            self.task.file_size(),
            self.task.chunk_size(),
            self.task.total_chunks(),
            self.task.current_chunk_index()
        );

        self.task.mark_uploading();
        let result = self.upload_chunks().await;

        match &result {
            Ok(outcome) => {
                self.task.mark_completed();
                info!(
                    "✓ 上传完成: file={}, 本次发送 {} 个分片, 共 {} 个分片",
                    outcome.file_name, outcome.uploaded_chunks, outcome.total_chunks
                );
            }
            Err(SessionError::Cancelled) => {
                self.task.mark_cancelled();
                warn!(
                    "上传已取消: file={}, 已完成分片数={}",
                    self.task.file_name(), self.task.current_chunk_index()
                );
            }
            Err(e) => {
                self.task.mark_failed(e.to_string());
                error!("上传失败: file={}, 错误: {}", self.task.file_name(), e);
            }
        }

        result
    }

    async fn upload_chunks(&mut self) -> Result<UploadOutcome, SessionError> {
        let total_chunks = self.task.total_chunks();
        let start_index = self.task.current_chunk_index();

        for index in start_index..total_chunks {
            if self.cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }

            let chunk = ChunkPlanner::range_for(index, self.task.file_size(), self.task.chunk_size())?;
            let data = self
                .source
                .read_range(chunk.range.clone())
                .await
                .map_err(|source| SessionError::Read {
                    chunk_index: index,
                    source,
                })?;

            self.transport
                .send(data, self.task.file_name(), index, &self.cancel)
                .await
                .map_err(|e| SessionError::from_transport(index, e))?;

            self.task.advance();

            // 传输期间触发的取消：分片已被接收，但不再发出进度
            if self.cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }

            let event = ProgressEvent::new(index, total_chunks);
            info!(
                "[分片#{}] ✓ 上传成功 ({}/{}, {}%)",
                index,
                index + 1,
                total_chunks,
                event.percent_complete
            );
            if let Some(callback) = self.on_progress.as_mut() {
                callback(event);
            }

            if index + 1 == total_chunks {
                break;
            }

            if !self.chunk_delay.is_zero() {
                debug!("等待 {}ms 后发送下一个分片", self.chunk_delay.as_millis());
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(SessionError::Cancelled),
                    _ = tokio::time::sleep(self.chunk_delay) => {}
                }
            }
        }

        Ok(UploadOutcome {
            file_name: self.task.file_name().to_string(),
            total_chunks,
            uploaded_chunks: self.task.current_chunk_index() - start_index,
        })
    }
}

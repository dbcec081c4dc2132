// 分片传输
//
// 一次调用 = 一次 HTTP 请求，不做任何重试
// 取消令牌由调用方持有，传输层只观察不拥有

use crate::config::UploadConfig;
use crate::protocol::{ApiMessage, CHUNK_FIELD, QUERY_CHUNK_INDEX, QUERY_FILE_NAME};
use crate::uploader::error::TransportError;
use async_trait::async_trait;
use reqwest::multipart;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// 分片传输接口
#[async_trait]
pub trait ChunkTransport: Send + Sync {
    /// 发送一个分片
    ///
    /// # 参数
    /// * `chunk` - 分片数据
    /// * `file_name` - 目标文件名
    /// * `chunk_index` - 分片索引
    /// * `cancel` - 取消令牌，调用前或调用中触发都返回 `TransportError::Cancelled`
    async fn send(
        &self,
        chunk: Vec<u8>,
        file_name: &str,
        chunk_index: usize,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: ChunkTransport + ?Sized> ChunkTransport for Arc<T> {
    async fn send(
        &self,
        chunk: Vec<u8>,
        file_name: &str,
        chunk_index: usize,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        (**self).send(chunk, file_name, chunk_index, cancel).await
    }
}

/// 根据上传配置创建 HTTP 客户端
pub fn build_http_client(config: &UploadConfig) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
}

/// 基于 HTTP multipart 的分片传输
#[derive(Debug, Clone)]
pub struct HttpChunkTransport {
    client: Client,
    endpoint: String,
}

impl HttpChunkTransport {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// 使用配置中的上传地址创建
    pub fn from_config(client: Client, config: &UploadConfig) -> Self {
        Self::new(client, config.upload_endpoint.clone())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChunkTransport for HttpChunkTransport {
    async fn send(
        &self,
        chunk: Vec<u8>,
        file_name: &str,
        chunk_index: usize,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        debug!(
            "发送分片: file={}, chunk={}, size={}, endpoint={}",
            file_name,
            chunk_index,
            chunk.len(),
            self.endpoint
        );

        let part = multipart::Part::bytes(chunk)
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let form = multipart::Form::new().part(CHUNK_FIELD, part);

        let chunk_index_value = chunk_index.to_string();
        let request = self
            .client
            .post(&self.endpoint)
            .query(&[
                (QUERY_FILE_NAME, file_name),
                (QUERY_CHUNK_INDEX, chunk_index_value.as_str()),
            ])
            .multipart(form)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            result = request => result.map_err(|e| TransportError::Network(e.to_string()))?,
        };

        let status = response.status();
        if status.is_success() {
            debug!("分片已接收: file={}, chunk={}, status={}", file_name, chunk_index, status);
            return Ok(());
        }

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            text = response.text() => text.unwrap_or_else(|e| {
                debug!("读取拒绝响应体失败: file={}, chunk={}, 错误: {}", file_name, chunk_index, e);
                String::new()
            }),
        };
        let message = ApiMessage::message_from_body(&body);

        error!(
            "服务器拒绝分片: file={}, chunk={}, status={}, message={}",
            file_name, chunk_index, status, message
        );

        Err(TransportError::ServerRejected {
            status: status.as_u16(),
            message,
        })
    }
}

// 合并请求
//
// 所有分片被服务端接收后，请求服务端按索引顺序拼接成最终文件。
// 分片是否齐全由服务端校验，客户端只声明分片总数

use crate::config::UploadConfig;
use crate::protocol::{ApiMessage, MergeRequest};
use crate::uploader::error::MergeError;
use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// 合并请求接口
#[async_trait]
pub trait MergeRequester: Send + Sync {
    /// 请求服务端合并 `file_name` 的 `total_chunks` 个分片
    async fn merge(
        &self,
        file_name: &str,
        total_chunks: usize,
        cancel: &CancellationToken,
    ) -> Result<(), MergeError>;
}

/// 基于 HTTP JSON 的合并请求
#[derive(Debug, Clone)]
pub struct HttpMergeRequester {
    client: Client,
    endpoint: String,
}

impl HttpMergeRequester {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn from_config(client: Client, config: &UploadConfig) -> Self {
        Self::new(client, config.merge_endpoint.clone())
    }
}

#[async_trait]
impl MergeRequester for HttpMergeRequester {
    async fn merge(
        &self,
        file_name: &str,
        total_chunks: usize,
        cancel: &CancellationToken,
    ) -> Result<(), MergeError> {
        if cancel.is_cancelled() {
            return Err(MergeError::Cancelled);
        }

        info!("请求合并分片: file={}, total_chunks={}", file_name, total_chunks);

        let payload = MergeRequest {
            file_name: file_name.to_string(),
            total_chunk: total_chunks,
        };
        let request = self.client.post(&self.endpoint).json(&payload).send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MergeError::Cancelled),
            result = request => result.map_err(|e| MergeError::Network(e.to_string()))?,
        };

        let status = response.status();
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MergeError::Cancelled),
            text = response.text() => text.map_err(|e| MergeError::Network(e.to_string()))?,
        };

        if !status.is_success() {
            let message = ApiMessage::message_from_body(&body);
            error!(
                "服务器拒绝合并: file={}, status={}, message={}",
                file_name, status, message
            );
            return Err(MergeError::ServerRejected {
                status: status.as_u16(),
                message,
            });
        }

        info!("✓ 合并完成: {}", file_name);
        Ok(())
    }
}

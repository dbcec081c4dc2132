// 上传错误类型
//
// 传输层、合并请求和上传会话各自返回独立的错误类型，
// 调用方可以区分 取消 / 网络错误 / 服务器拒绝 / 配置错误

use std::io;
use thiserror::Error;

/// 分片传输错误
#[derive(Debug, Error)]
pub enum TransportError {
    /// 取消令牌已触发
    #[error("上传已取消")]
    Cancelled,

    /// 网络错误（连接失败、超时、读取响应失败等）
    #[error("网络错误: {0}")]
    Network(String),

    /// 服务器返回非 2xx 状态码
    #[error("服务器拒绝分片: status={status}, message={message}")]
    ServerRejected { status: u16, message: String },
}

impl TransportError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }

    /// 服务器返回的状态码（仅 ServerRejected 有值）
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::ServerRejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// 合并请求错误
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("合并已取消")]
    Cancelled,

    #[error("网络错误: {0}")]
    Network(String),

    #[error("服务器拒绝合并: status={status}, message={message}")]
    ServerRejected { status: u16, message: String },
}

impl MergeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MergeError::Cancelled)
    }
}

/// 上传会话错误
///
/// `Cancelled` 对应会话终态 Cancelled，其余变体对应终态 Failed
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("上传已取消")]
    Cancelled,

    /// 分片传输失败（不含取消）
    #[error("分片 #{chunk_index} 上传失败: {source}")]
    Transport {
        chunk_index: usize,
        #[source]
        source: TransportError,
    },

    /// 读取本地分片数据失败
    #[error("读取分片 #{chunk_index} 失败: {source}")]
    Read {
        chunk_index: usize,
        #[source]
        source: io::Error,
    },

    /// 参数非法（分片大小为 0、起始索引越界等）
    #[error("配置无效: {0}")]
    InvalidConfiguration(String),
}

impl SessionError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SessionError::Cancelled)
    }

    /// 失败发生在哪个分片
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            SessionError::Transport { chunk_index, .. } | SessionError::Read { chunk_index, .. } => {
                Some(*chunk_index)
            }
            _ => None,
        }
    }

    /// 把传输错误归类到会话错误，取消保持为取消
    pub(crate) fn from_transport(chunk_index: usize, error: TransportError) -> Self {
        match error {
            TransportError::Cancelled => SessionError::Cancelled,
            source => SessionError::Transport {
                chunk_index,
                source,
            },
        }
    }
}

// 客户端与分片服务之间的线上格式

use serde::{Deserialize, Serialize};

/// multipart 表单中分片数据的字段名
pub const CHUNK_FIELD: &str = "chunk";

/// 上传接口查询参数：文件名
pub const QUERY_FILE_NAME: &str = "fileName";

/// 上传接口查询参数：分片索引
pub const QUERY_CHUNK_INDEX: &str = "chunkIndex";

/// 合并请求体
///
/// 分片数字段在线上名为 `totalChunk`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeRequest {
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "totalChunk")]
    pub total_chunk: usize,
}

/// 服务端统一响应体 `{status, message}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiMessage {
    pub status: u16,
    pub message: String,
}

impl ApiMessage {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 从响应体提取错误信息，非 JSON 时原样返回
    pub fn message_from_body(body: &str) -> String {
        match serde_json::from_str::<ApiMessage>(body) {
            Ok(msg) => msg.message,
            Err(_) => body.trim().to_string(),
        }
    }
}

// Chunked Upload Library
// 分片上传客户端与接收服务核心库

// 配置管理模块
pub mod config;

// 日志模块
pub mod logging;

// 线上协议（字段名、请求/响应体）
pub mod protocol;

// 分片接收服务模块
pub mod server;

// 上传引擎模块
pub mod uploader;

// 导出常用类型
pub use config::{AppConfig, LogConfig, ServerConfig, UploadConfig};
pub use server::AppState;
pub use uploader::{
    ChunkPlanner, ChunkSource, ChunkTransport, FileSource, HttpChunkTransport,
    HttpMergeRequester, MergeRequester, ProgressEvent, SessionError, UploadSession,
    UploadSessionStatus, UploadTask,
};

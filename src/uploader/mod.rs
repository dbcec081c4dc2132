// 上传引擎模块
//
// 单文件分片上传：
// - 分片规划（ChunkPlanner）
// - 串行分片传输（ChunkTransport），支持取消
// - 上传会话状态机（UploadSession），逐片上报进度
// - 合并请求（MergeRequester）
// - 可插拔的重试策略（RetryingTransport）

pub mod chunk;
pub mod error;
pub mod merge;
pub mod retry;
pub mod session;
pub mod source;
pub mod task;
pub mod transport;

pub use chunk::{ChunkPlanner, ChunkRange, DEFAULT_UPLOAD_CHUNK_SIZE};
pub use error::{MergeError, SessionError, TransportError};
pub use merge::{HttpMergeRequester, MergeRequester};
pub use retry::{is_retriable, ExponentialBackoff, NoRetry, RetryPolicy, RetryingTransport};
pub use session::{ProgressCallback, UploadOutcome, UploadSession};
pub use source::{ChunkSource, FileSource, MemorySource};
pub use task::{percent_complete, ProgressEvent, UploadSessionStatus, UploadTask};
pub use transport::{build_http_client, ChunkTransport, HttpChunkTransport};

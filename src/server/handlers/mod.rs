// API处理器模块

pub mod merge;
pub mod upload;

pub use merge::{merge_chunks, merge_parts};
pub use upload::{upload_chunk, UploadQuery};

// 分片上传 API 处理器

use crate::protocol::{ApiMessage, CHUNK_FIELD};
use crate::server::error::{ApiError, ApiResult};
use crate::server::state::AppState;
use axum::{
    extract::{
        multipart::{Field, MultipartRejection},
        Multipart, Query, State,
    },
    Json,
};
use serde::Deserialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

/// 查询参数：fileName / chunkIndex
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadQuery {
    pub file_name: Option<String>,
    pub chunk_index: Option<String>,
}

/// 接收一个分片
///
/// POST /upload?fileName=xxx&chunkIndex=N
pub async fn upload_chunk(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<ApiMessage>> {
    let mut multipart = multipart.map_err(|e| {
        warn!("分片请求不是合法的 multipart: {}", e);
        ApiError::bad_request("failed to get file from request")
    })?;

    let chunk_index: usize = query
        .chunk_index
        .as_deref()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| ApiError::bad_request("invalid chunk index"))?;
    let file_name = query.file_name.unwrap_or_default();
    let part_path = state.part_path(&file_name, chunk_index)?;

    // 只处理 chunk 字段，其余字段忽略
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::bad_request("failed to get file from request"))?
    {
        if field.name() != Some(CHUNK_FIELD) {
            continue;
        }

        let written = match write_field(&mut field, &part_path).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(e);
            }
        };

        info!(
            "接收分片: file={}, chunk={}, size={} bytes",
            file_name, chunk_index, written
        );
        return Ok(Json(ApiMessage::new(200, "Chunk uploaded successfully")));
    }

    Err(ApiError::bad_request("failed to get file from request"))
}

/// 把 multipart 字段流式写入分片临时文件，返回写入字节数
async fn write_field(field: &mut Field<'_>, part_path: &Path) -> ApiResult<u64> {
    let mut output = tokio::fs::File::create(part_path).await.map_err(|e| {
        error!("创建分片临时文件失败: {:?}, 错误: {}", part_path, e);
        ApiError::internal("failed to create temporary file")
    })?;

    let mut written = 0u64;
    while let Some(bytes) = field.chunk().await.map_err(|e| {
        error!("读取分片数据失败: {:?}, 错误: {}", part_path, e);
        ApiError::bad_request("failed to get file from request")
    })? {
        output.write_all(&bytes).await.map_err(|e| {
            error!("写入分片失败: {:?}, 错误: {}", part_path, e);
            ApiError::internal("failed to write chunk to temporary file")
        })?;
        written += bytes.len() as u64;
    }

    output.flush().await.map_err(|e| {
        error!("刷新分片文件失败: {:?}, 错误: {}", part_path, e);
        ApiError::internal("failed to write chunk to temporary file")
    })?;

    debug!("分片已写入: {:?}, {} bytes", part_path, written);
    Ok(written)
}

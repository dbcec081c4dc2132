// 分片合并 API 处理器

use crate::protocol::{ApiMessage, MergeRequest};
use crate::server::error::{ApiError, ApiResult};
use crate::server::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

/// 合并分片
///
/// POST /merge-chunks  body: {"fileName": "...", "totalChunk": N}
pub async fn merge_chunks(
    State(state): State<AppState>,
    payload: Result<Json<MergeRequest>, JsonRejection>,
) -> ApiResult<Json<ApiMessage>> {
    let Json(request) = payload.map_err(|e| {
        warn!("合并请求体无效: {}", e);
        ApiError::bad_request("invalid request body")
    })?;

    let size = merge_parts(&state, &request.file_name, request.total_chunk).await?;

    info!(
        "✓ 合并完成: file={}, chunks={}, size={} bytes",
        request.file_name, request.total_chunk, size
    );

    Ok(Json(ApiMessage::new(200, "Chunks merged successfully")))
}

/// 按索引顺序把分片拼接为最终文件，成功后删除分片
///
/// 任一分片缺失时不产生输出文件
pub async fn merge_parts(state: &AppState, file_name: &str, total_chunks: usize) -> ApiResult<u64> {
    let output_path = state.output_path(file_name)?;

    // total_chunks 来自客户端，不能据此预分配
    let mut parts = Vec::new();
    for index in 0..total_chunks {
        let part = state.part_path(file_name, index)?;
        if !fs::try_exists(&part).await.unwrap_or(false) {
            return Err(ApiError::bad_request(format!("chunk {} does not exist", index)));
        }
        parts.push(part);
    }

    let size = match concat_parts(&parts, &output_path).await {
        Ok(size) => size,
        Err(e) => {
            let _ = fs::remove_file(&output_path).await;
            return Err(e);
        }
    };

    // 只清理本文件的分片
    for part in &parts {
        if let Err(e) = fs::remove_file(part).await {
            warn!("删除分片临时文件失败: {:?}, 错误: {}", part, e);
        }
    }

    Ok(size)
}

async fn concat_parts(parts: &[PathBuf], output_path: &Path) -> ApiResult<u64> {
    let mut output = fs::File::create(output_path).await.map_err(|e| {
        error!("创建输出文件失败: {:?}, 错误: {}", output_path, e);
        ApiError::internal("failed to create output file")
    })?;

    let mut size = 0u64;
    for (index, part) in parts.iter().enumerate() {
        let mut input = fs::File::open(part).await.map_err(|e| {
            error!("打开分片失败: {:?}, 错误: {}", part, e);
            ApiError::internal("failed to open chunk file")
        })?;

        size += tokio::io::copy(&mut input, &mut output).await.map_err(|e| {
            error!("写入分片 #{} 失败: {}", index, e);
            ApiError::internal(format!("failed to write chunk {} to output file", index))
        })?;
    }

    output.flush().await.map_err(|e| {
        error!("刷新输出文件失败: {:?}, 错误: {}", output_path, e);
        ApiError::internal("failed to write output file")
    })?;

    Ok(size)
}

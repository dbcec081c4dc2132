use anyhow::Context;
use chunked_upload::{
    config::{LogConfig, DEFAULT_CONFIG_PATH},
    logging,
    uploader::{
        build_http_client, ExponentialBackoff, FileSource, HttpChunkTransport,
        HttpMergeRequester, MergeRequester, RetryingTransport, UploadSession, UploadTask,
    },
    AppConfig,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 分片上传客户端
#[derive(Debug, Parser)]
#[command(name = "chunk-upload", version, about = "按固定大小分片顺序上传文件")]
struct Args {
    /// 要上传的文件
    file: PathBuf,

    /// 配置文件路径
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// 分片大小（字节），覆盖配置文件
    #[arg(long)]
    chunk_size: Option<u64>,

    /// 起始分片索引（续传）
    #[arg(long, default_value_t = 0)]
    start_index: usize,

    /// 服务端使用的文件名，默认取本地文件名
    #[arg(long)]
    name: Option<String>,

    /// 上传完成后不发送合并请求
    #[arg(long)]
    no_merge: bool,
}

async fn load_log_config(path: &str) -> LogConfig {
    let Ok(content) = tokio::fs::read_to_string(path).await else {
        return LogConfig::default();
    };

    toml::from_str::<toml::Value>(&content)
        .ok()
        .and_then(|config| config.get("log").cloned())
        .and_then(|table| table.try_into::<LogConfig>().ok())
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_config = load_log_config(&args.config).await;
    let _log_guard = logging::init_logging(&log_config);

    let mut config = AppConfig::load_or_default(&args.config).await;
    if let Some(chunk_size) = args.chunk_size {
        config.upload.chunk_size = chunk_size;
    }
    config
        .upload
        .validate()
        .map_err(|e| anyhow::anyhow!("上传配置无效: {}", e))?;
    let upload_config = config.upload;

    let (source, local_name, file_size) = FileSource::open(&args.file).await?;
    let file_name = args.name.unwrap_or(local_name);

    let task = UploadTask::new(
        file_name.clone(),
        file_size,
        upload_config.chunk_size,
        args.start_index,
    )?;
    let total_chunks = task.total_chunks();

    info!(
        "开始上传: file={}, size={} bytes, chunk_size={}, chunks={}, start_index={}",
        file_name, file_size, upload_config.chunk_size, total_chunks, args.start_index
    );

    let client = build_http_client(&upload_config).context("创建 HTTP 客户端失败")?;
    let transport = RetryingTransport::new(
        HttpChunkTransport::from_config(client.clone(), &upload_config),
        ExponentialBackoff::from_config(&upload_config),
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("收到 Ctrl+C，取消上传...");
                cancel.cancel();
            }
        });
    }

    let mut session = UploadSession::new(
        task,
        Arc::new(source),
        transport,
        cancel.clone(),
        &upload_config,
    )
    .on_progress(move |event| {
        info!(
            "分片 #{}/{} 上传完成, 进度 {}%",
            event.current_chunk_index + 1,
            total_chunks,
            event.percent_complete
        );
    });

    let outcome = match session.run().await {
        Ok(outcome) => outcome,
        Err(e) if e.is_cancelled() => {
            let resume_from = session.task().current_chunk_index();
            warn!("上传已取消，可使用 --start-index {} 续传", resume_from);
            return Err(e.into());
        }
        Err(e) => {
            if let Some(index) = e.chunk_index() {
                warn!("上传失败于分片 #{}，可使用 --start-index {} 续传", index, index);
            }
            return Err(e.into());
        }
    };

    info!(
        "✓ 分片上传完成: file={}, 本次上传 {} 个分片",
        outcome.file_name, outcome.uploaded_chunks
    );

    if args.no_merge {
        info!("已跳过合并请求");
        return Ok(());
    }

    let merger = HttpMergeRequester::from_config(client, &upload_config);
    merger
        .merge(&outcome.file_name, outcome.total_chunks, &cancel)
        .await?;

    info!("✓ 文件合并完成: {}", outcome.file_name);
    Ok(())
}

use chunked_upload::{config::LogConfig, config::DEFAULT_CONFIG_PATH, logging, server, AppConfig};
use clap::Parser;
use tracing::info;

/// 分片接收服务
#[derive(Debug, Parser)]
#[command(name = "chunk-server", version, about = "接收分片上传并合并为完整文件")]
struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,
}

/// 加载日志配置
///
/// 日志系统要先于完整配置初始化，失败时返回默认配置
async fn load_log_config(path: &str) -> LogConfig {
    if let Ok(content) = tokio::fs::read_to_string(path).await {
        if let Ok(config) = toml::from_str::<toml::Value>(&content) {
            if let Some(log_table) = config.get("log") {
                if let Ok(log_config) = log_table.clone().try_into::<LogConfig>() {
                    return log_config;
                }
            }
        }
    }

    LogConfig::default()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_config = load_log_config(&args.config).await;
    let _log_guard = logging::init_logging(&log_config);

    info!("chunk-server v{} 启动中...", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load_or_default(&args.config).await;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("监听 Ctrl+C 失败: {}", e);
            std::future::pending::<()>().await;
        }
        info!("收到 Ctrl+C，开始优雅关闭...");
    };

    if let Err(e) = server::serve(&config.server, shutdown).await {
        tracing::error!("服务器错误: {:#}", e);
        return Err(e);
    }

    info!("服务已安全退出");
    Ok(())
}

// 分片服务状态

use crate::config::ServerConfig;
use crate::server::error::ApiError;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 服务全局状态
#[derive(Debug, Clone)]
pub struct AppState {
    /// 合并后文件的保存目录
    pub upload_dir: Arc<PathBuf>,
    /// 分片临时目录
    pub temp_dir: Arc<PathBuf>,
}

impl AppState {
    /// 创建服务状态，确保目录存在
    pub async fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&config.upload_dir)
            .await
            .with_context(|| format!("创建上传目录失败: {:?}", config.upload_dir))?;
        tokio::fs::create_dir_all(&config.temp_dir)
            .await
            .with_context(|| format!("创建临时目录失败: {:?}", config.temp_dir))?;

        Ok(Self {
            upload_dir: Arc::new(config.upload_dir.clone()),
            temp_dir: Arc::new(config.temp_dir.clone()),
        })
    }

    /// 分片临时文件路径：<temp_dir>/<file_name>.part<index>
    pub fn part_path(&self, file_name: &str, index: usize) -> Result<PathBuf, ApiError> {
        validate_file_name(file_name)?;
        Ok(self.temp_dir.join(format!("{}.part{}", file_name, index)))
    }

    /// 合并后文件路径：<upload_dir>/<file_name>
    pub fn output_path(&self, file_name: &str) -> Result<PathBuf, ApiError> {
        validate_file_name(file_name)?;
        Ok(self.upload_dir.join(file_name))
    }
}

/// 文件名只能是单个路径分量
fn validate_file_name(file_name: &str) -> Result<(), ApiError> {
    let is_single_component = !file_name.is_empty()
        && file_name != "."
        && file_name != ".."
        && !file_name.contains(['/', '\\', '\0'])
        && Path::new(file_name).file_name().is_some();

    if is_single_component {
        Ok(())
    } else {
        Err(ApiError::bad_request("invalid file name"))
    }
}

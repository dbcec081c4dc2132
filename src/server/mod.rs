// 分片接收服务模块
//
// POST /upload        接收单个分片，写入 <temp_dir>/<fileName>.part<N>
// POST /merge-chunks  按索引顺序合并分片到 <upload_dir>/<fileName>
// GET  /health        健康检查

pub mod error;
pub mod handlers;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use crate::config::ServerConfig;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::future::Future;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// 健康检查响应
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    service: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
    })
}

/// 构建路由
///
/// # 参数
/// * `state` - 服务状态
/// * `max_body_bytes` - 单个请求体上限
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    // 浏览器客户端跨域上传
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    Router::new()
        .route("/upload", post(handlers::upload_chunk))
        .route("/merge-chunks", post(handlers::merge_chunks))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
        .layer(middleware)
}

/// 启动服务，直到 `shutdown` 完成
pub async fn serve<F>(config: &ServerConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = AppState::new(config).await?;
    let app = build_router(state, config.max_chunk_bytes);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("服务器启动在: http://{}", addr);
    info!("分片上传: POST http://{}/upload", addr);
    info!("分片合并: POST http://{}/merge-chunks", addr);
    info!(
        "上传目录: {:?}, 临时目录: {:?}",
        config.upload_dir, config.temp_dir
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::net::SocketAddr;
    use tempfile::TempDir;

    /// 绑定随机端口的测试服务
    pub struct TestServer {
        pub addr: SocketAddr,
        pub state: AppState,
        _dir: TempDir,
    }

    impl TestServer {
        pub async fn start() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = ServerConfig {
                upload_dir: dir.path().join("uploads"),
                temp_dir: dir.path().join("temp"),
                ..ServerConfig::default()
            };
            let state = AppState::new(&config).await.unwrap();
            let app = build_router(state.clone(), config.max_chunk_bytes);

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            Self {
                addr,
                state,
                _dir: dir,
            }
        }

        pub fn url(&self, path: &str) -> String {
            format!("http://{}{}", self.addr, path)
        }
    }

    /// 接受连接、读取请求但从不响应的服务，用于覆盖请求进行中的取消
    pub struct StalledServer {
        pub addr: SocketAddr,
    }

    impl StalledServer {
        pub async fn start() -> Self {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                while let Ok((mut socket, _)) = listener.accept().await {
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 8192];
                        // 持有连接直到对端关闭
                        while let Ok(n) = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await {
                            if n == 0 {
                                break;
                            }
                        }
                    });
                }
            });
            Self { addr }
        }

        pub fn url(&self, path: &str) -> String {
            format!("http://{}{}", self.addr, path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::TestServer;
    use crate::protocol::ApiMessage;
    use reqwest::multipart;
    use serde_json::json;

    async fn post_chunk(
        server: &TestServer,
        query: &[(&str, &str)],
        field: &str,
        data: &'static [u8],
    ) -> reqwest::Response {
        let form = multipart::Form::new().part(field.to_string(), multipart::Part::bytes(data));
        reqwest::Client::new()
            .post(server.url("/upload"))
            .query(query)
            .multipart(form)
            .send()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let server = TestServer::start().await;
        let body: serde_json::Value = reqwest::get(server.url("/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_upload_writes_part() {
        let server = TestServer::start().await;
        let resp = post_chunk(
            &server,
            &[("fileName", "a.txt"), ("chunkIndex", "2")],
            "chunk",
            b"payload",
        )
        .await;

        assert_eq!(resp.status(), 200);
        let part = server.state.temp_dir.join("a.txt.part2");
        assert_eq!(std::fs::read(part).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_upload_invalid_chunk_index() {
        let server = TestServer::start().await;
        let resp = post_chunk(
            &server,
            &[("fileName", "a.txt"), ("chunkIndex", "abc")],
            "chunk",
            b"x",
        )
        .await;

        assert_eq!(resp.status(), 400);
        let body: ApiMessage = resp.json().await.unwrap();
        assert_eq!(body, ApiMessage::new(400, "invalid chunk index"));
    }

    #[tokio::test]
    async fn test_upload_missing_chunk_field() {
        let server = TestServer::start().await;
        let resp = post_chunk(
            &server,
            &[("fileName", "a.txt"), ("chunkIndex", "0")],
            "other",
            b"x",
        )
        .await;

        assert_eq!(resp.status(), 400);
        let body: ApiMessage = resp.json().await.unwrap();
        assert_eq!(body.message, "failed to get file from request");
    }

    #[tokio::test]
    async fn test_merge_in_index_order_and_cleanup() {
        let server = TestServer::start().await;
        // 乱序上传
        for (index, data) in [("2", &b"cc"[..]), ("0", &b"aa"[..]), ("1", &b"bb"[..])] {
            let resp = post_chunk(&server, &[("fileName", "f.bin"), ("chunkIndex", index)], "chunk", data).await;
            assert_eq!(resp.status(), 200);
        }
        // 另一个文件的分片不受影响
        post_chunk(&server, &[("fileName", "other.bin"), ("chunkIndex", "0")], "chunk", b"zz").await;

        let resp = reqwest::Client::new()
            .post(server.url("/merge-chunks"))
            .json(&json!({"fileName": "f.bin", "totalChunk": 3}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let merged = server.state.upload_dir.join("f.bin");
        assert_eq!(std::fs::read(merged).unwrap(), b"aabbcc");
        assert!(!server.state.temp_dir.join("f.bin.part0").exists());
        assert!(server.state.temp_dir.join("other.bin.part0").exists());
    }

    #[tokio::test]
    async fn test_merge_missing_chunk_leaves_no_output() {
        let server = TestServer::start().await;
        post_chunk(&server, &[("fileName", "f.bin"), ("chunkIndex", "0")], "chunk", b"aa").await;

        let resp = reqwest::Client::new()
            .post(server.url("/merge-chunks"))
            .json(&json!({"fileName": "f.bin", "totalChunk": 2}))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 400);
        let body: ApiMessage = resp.json().await.unwrap();
        assert_eq!(body.message, "chunk 1 does not exist");
        assert!(!server.state.upload_dir.join("f.bin").exists());
        assert!(server.state.temp_dir.join("f.bin.part0").exists());
    }

    #[tokio::test]
    async fn test_upload_non_multipart_body_is_json_error() {
        let server = TestServer::start().await;
        let resp = reqwest::Client::new()
            .post(server.url("/upload"))
            .query(&[("fileName", "a.txt"), ("chunkIndex", "0")])
            .header("Content-Type", "text/plain")
            .body("raw bytes")
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 400);
        let body: ApiMessage = resp.json().await.unwrap();
        assert_eq!(body, ApiMessage::new(400, "failed to get file from request"));
        assert!(!server.state.temp_dir.join("a.txt.part0").exists());
    }

    #[tokio::test]
    async fn test_merge_huge_total_chunk_is_rejected_without_abort() {
        let server = TestServer::start().await;
        let client = reqwest::Client::new();
        let resp = client
            .post(server.url("/merge-chunks"))
            .json(&json!({"fileName": "f.bin", "totalChunk": 1u64 << 50}))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 400);
        let body: ApiMessage = resp.json().await.unwrap();
        assert_eq!(body.message, "chunk 0 does not exist");

        // 服务仍然可用
        let health = client.get(server.url("/health")).send().await.unwrap();
        assert_eq!(health.status(), 200);
    }

    #[tokio::test]
    async fn test_merge_invalid_body() {
        let server = TestServer::start().await;
        let resp = reqwest::Client::new()
            .post(server.url("/merge-chunks"))
            .header("Content-Type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 400);
        let body: ApiMessage = resp.json().await.unwrap();
        assert_eq!(body.message, "invalid request body");
    }

    #[tokio::test]
    async fn test_merge_zero_chunks_creates_empty_file() {
        let server = TestServer::start().await;
        let resp = reqwest::Client::new()
            .post(server.url("/merge-chunks"))
            .json(&json!({"fileName": "empty.txt", "totalChunk": 0}))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        let merged = server.state.upload_dir.join("empty.txt");
        assert_eq!(std::fs::metadata(merged).unwrap().len(), 0);
    }
}

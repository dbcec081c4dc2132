// 分片重试策略
//
// ChunkTransport 本身不重试，需要容错的调用方用 RetryingTransport 包装。
// 退避延迟序列（默认参数）：
// - attempt=0: 100ms
// - attempt=1: 200ms
// - attempt=2: 400ms
// - 最大: 5000ms

use crate::config::UploadConfig;
use crate::uploader::error::TransportError;
use crate::uploader::transport::ChunkTransport;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// 错误是否值得重试
///
/// 网络错误、5xx 和 429 可重试；取消和其余 4xx 不可重试
pub fn is_retriable(error: &TransportError) -> bool {
    match error {
        TransportError::Cancelled => false,
        TransportError::Network(_) => true,
        TransportError::ServerRejected { status, .. } => *status >= 500 || *status == 429,
    }
}

/// 重试策略
pub trait RetryPolicy: Send + Sync {
    /// 第 `attempt` 次失败（从 0 开始）后等待多久再试，`None` 表示放弃
    fn next_delay(&self, attempt: u32, error: &TransportError) -> Option<Duration>;
}

/// 不重试
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn next_delay(&self, _attempt: u32, _error: &TransportError) -> Option<Duration> {
        None
    }
}

/// 指数退避
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// 最大重试次数
    pub max_retries: u32,
    /// 初始退避延迟
    pub initial: Duration,
    /// 最大退避延迟
    pub max: Duration,
}

impl ExponentialBackoff {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial: Duration::from_millis(config.retry_initial_backoff_ms),
            max: Duration::from_millis(config.retry_max_backoff_ms),
        }
    }

    /// 计算第 `attempt` 次重试前的延迟
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32, error: &TransportError) -> Option<Duration> {
        if attempt >= self.max_retries || !is_retriable(error) {
            return None;
        }
        Some(self.delay_for(attempt))
    }
}

/// 带重试的分片传输包装
pub struct RetryingTransport<T, P> {
    inner: T,
    policy: P,
}

impl<T, P> RetryingTransport<T, P> {
    pub fn new(inner: T, policy: P) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<T, P> ChunkTransport for RetryingTransport<T, P>
where
    T: ChunkTransport,
    P: RetryPolicy,
{
    async fn send(
        &self,
        chunk: Vec<u8>,
        file_name: &str,
        chunk_index: usize,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        let mut attempt = 0u32;

        loop {
            let error = match self
                .inner
                .send(chunk.clone(), file_name, chunk_index, cancel)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            let delay = match self.policy.next_delay(attempt, &error) {
                Some(delay) => delay,
                None => {
                    if attempt > 0 {
                        error!(
                            "[分片#{}] 上传失败，已重试 {} 次: {}",
                            chunk_index, attempt, error
                        );
                    }
                    return Err(error);
                }
            };

            warn!(
                "[分片#{}] 上传失败，等待 {}ms 后重试 ({}): {}",
                chunk_index,
                delay.as_millis(),
                attempt + 1,
                error
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn backoff(max_retries: u32) -> ExponentialBackoff {
        ExponentialBackoff {
            max_retries,
            initial: Duration::from_millis(100),
            max: Duration::from_millis(5000),
        }
    }

    /// 按预设结果依次返回的传输
    struct ScriptedTransport {
        results: Mutex<Vec<Result<(), TransportError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(mut results: Vec<Result<(), TransportError>>) -> Self {
            results.reverse();
            Self {
                results: Mutex::new(results),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChunkTransport for ScriptedTransport {
        async fn send(
            &self,
            _chunk: Vec<u8>,
            _file_name: &str,
            _chunk_index: usize,
            _cancel: &CancellationToken,
        ) -> Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results.lock().unwrap().pop().unwrap_or(Ok(()))
        }
    }

    fn rejected(status: u16) -> TransportError {
        TransportError::ServerRejected {
            status,
            message: String::new(),
        }
    }

    #[test]
    fn test_backoff_delay_sequence() {
        let policy = backoff(10);
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(10), Duration::from_millis(5000)); // 超过最大值
        assert_eq!(policy.delay_for(40), Duration::from_millis(5000));
    }

    #[test]
    fn test_retriable_classification() {
        assert!(is_retriable(&TransportError::Network("reset".to_string())));
        assert!(is_retriable(&rejected(500)));
        assert!(is_retriable(&rejected(503)));
        assert!(is_retriable(&rejected(429)));

        assert!(!is_retriable(&TransportError::Cancelled));
        assert!(!is_retriable(&rejected(400)));
        assert!(!is_retriable(&rejected(404)));
    }

    #[test]
    fn test_no_retry_policy() {
        assert_eq!(
            NoRetry.next_delay(0, &TransportError::Network("x".to_string())),
            None
        );
    }

    #[test]
    fn test_backoff_respects_max_retries() {
        let policy = backoff(2);
        let err = TransportError::Network("x".to_string());
        assert!(policy.next_delay(0, &err).is_some());
        assert!(policy.next_delay(1, &err).is_some());
        assert!(policy.next_delay(2, &err).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrying_transport_recovers() {
        let inner = ScriptedTransport::new(vec![
            Err(TransportError::Network("reset".to_string())),
            Err(rejected(502)),
            Ok(()),
        ]);
        let transport = RetryingTransport::new(inner, backoff(3));

        transport
            .send(vec![1, 2, 3], "a.bin", 0, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(transport.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrying_transport_gives_up_on_client_error() {
        let inner = ScriptedTransport::new(vec![Err(rejected(400)), Ok(())]);
        let transport = RetryingTransport::new(inner, backoff(3));

        let err = transport
            .send(vec![1], "a.bin", 0, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(transport.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrying_transport_exhausts_retries() {
        let inner = ScriptedTransport::new(vec![
            Err(rejected(500)),
            Err(rejected(500)),
            Err(rejected(500)),
        ]);
        let transport = RetryingTransport::new(inner, backoff(2));

        let err = transport
            .send(vec![1], "a.bin", 0, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(transport.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let inner = ScriptedTransport::new(vec![Err(TransportError::Network("x".to_string()))]);
        let policy = ExponentialBackoff {
            max_retries: 3,
            initial: Duration::from_secs(3600),
            max: Duration::from_secs(3600),
        };
        let transport = RetryingTransport::new(inner, policy);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = transport.send(vec![1], "a.bin", 0, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(transport.inner.calls.load(Ordering::SeqCst), 1);
    }
}

//! Result Forwarding Module
//!
//! Best-effort delivery of control results to the downstream results API.
//! Delivery is fire-and-forget and purely observational: success or failure
//! never affects the already-returned control decision, and there is no
//! durable queue — a result that cannot be delivered within the retry
//! budget is logged and dropped.
//!
//! Producers never perform the network call themselves: results are handed
//! to a bounded in-memory queue drained by a small worker pool (see
//! [`dispatcher`]), so ingestion never blocks on downstream latency.

mod dispatcher;

pub use dispatcher::{spawn_queue, run_forward_worker, ForwardHandle, ForwardReceiver};

use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::defaults::FORWARD_BACKOFF_BASE_MS;
use crate::config::CallbackConfig;
use crate::types::ControlResult;

/// Fixed JSON payload shape expected by the downstream results API.
#[derive(Debug, Serialize)]
struct ForwardPayload<'a> {
    line_id: &'a str,
    voltage: f64,
    speed: f64,
    filtered_ct_seconds: f64,
    timestamp: String,
}

/// HTTP client for the downstream results callback, with retry/backoff.
pub struct ResultForwarder {
    http: reqwest::Client,
    url: String,
    max_retries: u32,
    backoff_base: Duration,
}

impl ResultForwarder {
    /// Build a forwarder from callback configuration.
    pub fn new(config: &CallbackConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            url: config.url.clone(),
            max_retries: config.max_retries.max(1),
            backoff_base: Duration::from_millis(FORWARD_BACKOFF_BASE_MS),
        }
    }

    /// Override the backoff base delay. Production keeps the 1 s default;
    /// tests shrink it to keep retry scenarios fast.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Deliver one result. Returns `true` on any 2xx response.
    ///
    /// Timeouts and transport errors back off exponentially
    /// (`base × 2^(attempt−1)`) between attempts; non-2xx responses retry
    /// immediately. After `max_retries` attempts the result is dropped with
    /// an error log — never escalated, never retried later.
    pub async fn forward(&self, result: &ControlResult) -> bool {
        let payload = ForwardPayload {
            line_id: &result.line_id,
            voltage: result.voltage,
            speed: result.speed_used,
            filtered_ct_seconds: result.filtered_ct_seconds,
            timestamp: result.applied_at.to_rfc3339(),
        };

        for attempt in 1..=self.max_retries {
            match self.http.post(&self.url).json(&payload).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!(
                        line = %result.line_id,
                        status = %resp.status(),
                        attempt = attempt,
                        "Forwarded control result"
                    );
                    return true;
                }
                Ok(resp) => {
                    warn!(
                        line = %result.line_id,
                        status = %resp.status(),
                        attempt = attempt,
                        max_attempts = self.max_retries,
                        "Result callback rejected"
                    );
                }
                Err(e) => {
                    warn!(
                        line = %result.line_id,
                        error = %e,
                        attempt = attempt,
                        max_attempts = self.max_retries,
                        "Result callback transport error"
                    );
                    if attempt < self.max_retries {
                        let delay = self.backoff_base * 2u32.saturating_pow(attempt - 1);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        error!(
            line = %result.line_id,
            attempts = self.max_retries,
            "Result callback failed after all attempts — dropping result"
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ControlStatus;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn test_result() -> ControlResult {
        ControlResult {
            line_id: "LINE-01".to_string(),
            status: ControlStatus::Valid,
            speed_used: 50.0,
            voltage: 5.0,
            filtered_ct_seconds: 72.0,
            chain_stale: false,
            applied_at: Utc::now(),
        }
    }

    fn forwarder(url: &str, max_retries: u32) -> ResultForwarder {
        ResultForwarder::new(&CallbackConfig {
            url: url.to_string(),
            timeout_secs: 2,
            max_retries,
            ..CallbackConfig::default()
        })
        .with_backoff_base(Duration::from_millis(20))
    }

    /// Minimal HTTP endpoint: drops the first `failures` connections
    /// immediately (transport error on the client side), then answers 200.
    async fn flaky_endpoint(failures: usize) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    // Drop without responding — client sees a broken connection
                    drop(socket);
                    continue;
                }
                let mut buf = vec![0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            }
        });

        (format!("http://{addr}/api/simulation-results"), attempts)
    }

    #[tokio::test]
    async fn test_forward_succeeds_first_try() {
        let (url, attempts) = flaky_endpoint(0).await;
        let fwd = forwarder(&url, 3);
        assert!(fwd.forward(&test_result()).await);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_forward_retries_transport_errors_then_succeeds() {
        let (url, attempts) = flaky_endpoint(2).await;
        let fwd = forwarder(&url, 3);

        let started = std::time::Instant::now();
        assert!(fwd.forward(&test_result()).await);
        let elapsed = started.elapsed();

        // Three total attempts, with 20 ms + 40 ms backoff between them
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(elapsed >= Duration::from_millis(60), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn test_forward_gives_up_after_max_retries() {
        let (url, attempts) = flaky_endpoint(usize::MAX).await;
        let fwd = forwarder(&url, 3);
        assert!(!fwd.forward(&test_result()).await);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_forward_unreachable_endpoint_returns_false() {
        // Nothing listens here; connection refused is a transport error
        let fwd = forwarder("http://127.0.0.1:1/api/results", 2);
        assert!(!fwd.forward(&test_result()).await);
    }

    #[test]
    fn test_payload_shape() {
        let result = test_result();
        let payload = ForwardPayload {
            line_id: &result.line_id,
            voltage: result.voltage,
            speed: result.speed_used,
            filtered_ct_seconds: result.filtered_ct_seconds,
            timestamp: result.applied_at.to_rfc3339(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["line_id"], "LINE-01");
        assert!(json["voltage"].is_number());
        assert!(json["speed"].is_number());
        assert!(json["filtered_ct_seconds"].is_number());
        assert!(json["timestamp"].is_string());
    }
}

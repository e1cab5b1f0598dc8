//! Health probing for managed services.
//!
//! A probe is healthy only on HTTP 200. Connection errors, timeouts and any
//! other status all read as unhealthy; the two are not told apart.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait HealthProber: Send + Sync {
    async fn probe(&self, url: &str) -> bool;
}

/// reqwest-backed prober with a per-request timeout
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProber for HttpProber {
    async fn probe(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => true,
            Ok(resp) => {
                debug!(url, status = %resp.status(), "Health probe returned non-200");
                false
            }
            Err(e) => {
                debug!(url, error = %e, "Health probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_probe_statuses() {
        let app = Router::new()
            .route("/health", get(|| async { "ok" }))
            .route("/loading", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
            .route("/created", get(|| async { StatusCode::CREATED }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            );
        let base = serve(app).await;
        let prober = HttpProber::new(Duration::from_millis(300)).unwrap();

        assert!(prober.probe(&format!("{}/health", base)).await);
        assert!(!prober.probe(&format!("{}/loading", base)).await);
        assert!(!prober.probe(&format!("{}/created", base)).await);
        assert!(!prober.probe(&format!("{}/missing", base)).await);
        assert!(!prober.probe(&format!("{}/slow", base)).await);
    }

    #[tokio::test]
    async fn test_probe_connection_refused() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let prober = HttpProber::new(Duration::from_millis(300)).unwrap();

        assert!(!prober.probe(&format!("http://127.0.0.1:{}/health", port)).await);
        assert!(!prober.probe("not a url").await);
    }
}

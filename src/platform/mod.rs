//! External verification adapter for the App Store receipt endpoints.
//!
//! Receipts are POSTed to the production endpoint first; the 21007/21008
//! answer pair means "this receipt belongs to the other environment", which
//! triggers a single retry against sandbox. Every failure here is transient
//! from the engine's point of view: the transaction stays undecided and the
//! reconciler retries later. A failure is never a fraud signal.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

pub const PRODUCTION_URL: &str = "https://buy.itunes.apple.com/verifyReceipt";
pub const SANDBOX_URL: &str = "https://sandbox.itunes.apple.com/verifyReceipt";

/// Default per-call timeout. The request path must stay fast; anything
/// slower is handed to the reconciler.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Failures of the platform call. All variants leave the transaction
/// undecided; none of them reach the submitting client.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Offline mode is enabled; no network call was attempted
    #[error("platform verification is offline")]
    Offline,

    /// The call exceeded the per-call timeout
    #[error("platform verification timed out")]
    Timeout,

    /// Transport-level failure (DNS, TLS, connection reset)
    #[error("platform transport error: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success HTTP status
    #[error("platform returned HTTP {0}")]
    Http(u16),

    /// The endpoint answered 200 but the body was not the expected shape
    #[error("platform response malformed: {0}")]
    Malformed(String),
}

/// The platform's answer: its status code and the raw response body.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformAnswer {
    pub status: i64,
    pub body: serde_json::Value,
}

impl PlatformAnswer {
    /// The bundle id the platform recorded inside the receipt, present when
    /// `status == 0`.
    pub fn bundle_id(&self) -> Option<&str> {
        self.body.get("receipt")?.get("bid")?.as_str()
    }
}

/// Seam between the engine and the purchase platform.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PlatformVerifier: Send + Sync {
    async fn verify(&self, receipt: &str) -> Result<PlatformAnswer, PlatformError>;
}

/// Adapter configuration.
#[derive(Debug, Clone)]
pub struct AppStoreConfig {
    pub production_url: String,
    pub sandbox_url: String,
    pub timeout: Duration,
    /// Short-circuit with [`PlatformError::Offline`] before any network call.
    pub offline: bool,
}

impl Default for AppStoreConfig {
    fn default() -> Self {
        Self {
            production_url: PRODUCTION_URL.to_string(),
            sandbox_url: SANDBOX_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            offline: false,
        }
    }
}

impl AppStoreConfig {
    /// Load configuration from environment.
    pub fn from_env() -> Self {
        let timeout = std::env::var("APP_STORE_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT);

        let offline = std::env::var("APP_STORE_OFFLINE")
            .map(|s| s == "true" || s == "1")
            .unwrap_or(false);

        Self {
            timeout,
            offline,
            ..Self::default()
        }
    }
}

/// HTTP client for the App Store `verifyReceipt` endpoints.
pub struct AppStoreClient {
    http: reqwest::Client,
    config: AppStoreConfig,
}

impl AppStoreClient {
    pub fn new(config: AppStoreConfig) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PlatformError::Transport(e.to_string()))?;

        Ok(Self { http, config })
    }

    async fn post_receipt(&self, url: &str, receipt: &str) -> Result<PlatformAnswer, PlatformError> {
        let response = self
            .http
            .post(url)
            .json(&json!({ "receipt-data": receipt }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PlatformError::Timeout
                } else {
                    PlatformError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(PlatformError::Http(response.status().as_u16()));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PlatformError::Malformed(e.to_string()))?;

        let status = body
            .get("status")
            .and_then(|s| s.as_i64())
            .ok_or_else(|| PlatformError::Malformed("missing status field".to_string()))?;

        Ok(PlatformAnswer { status, body })
    }
}

#[async_trait]
impl PlatformVerifier for AppStoreClient {
    async fn verify(&self, receipt: &str) -> Result<PlatformAnswer, PlatformError> {
        if self.config.offline {
            return Err(PlatformError::Offline);
        }

        let answer = self.post_receipt(&self.config.production_url, receipt).await?;

        // 21007: sandbox receipt sent to production; 21008 the reverse.
        if matches!(answer.status, 21007 | 21008) {
            return self.post_receipt(&self.config.sandbox_url, receipt).await;
        }

        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_mode_short_circuits() {
        let client = AppStoreClient::new(AppStoreConfig {
            offline: true,
            ..AppStoreConfig::default()
        })
        .unwrap();

        match client.verify("anything").await {
            Err(PlatformError::Offline) => {}
            other => panic!("expected Offline, got {other:?}"),
        }
    }

    #[test]
    fn answer_exposes_receipt_bundle_id() {
        let answer = PlatformAnswer {
            status: 0,
            body: json!({
                "status": 0,
                "receipt": { "bid": "com.example.game", "bvrs": "1.0" }
            }),
        };
        assert_eq!(answer.bundle_id(), Some("com.example.game"));

        let failed = PlatformAnswer {
            status: 21002,
            body: json!({ "status": 21002 }),
        };
        assert_eq!(failed.bundle_id(), None);
    }

    #[test]
    fn default_config_points_at_production_first() {
        let config = AppStoreConfig::default();
        assert_eq!(config.production_url, PRODUCTION_URL);
        assert_eq!(config.sandbox_url, SANDBOX_URL);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(!config.offline);
    }

    async fn serve_stub(app: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn environment_mismatch_retries_against_sandbox() {
        use axum::extract::State;
        use axum::routing::post;
        use axum::{Json, Router};
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        #[derive(Clone, Default)]
        struct Hits {
            production: Arc<AtomicUsize>,
            sandbox: Arc<AtomicUsize>,
        }

        let hits = Hits::default();
        let app = Router::new()
            .route(
                "/production",
                post(|State(hits): State<Hits>| async move {
                    hits.production.fetch_add(1, Ordering::SeqCst);
                    // Sandbox receipt sent to production.
                    Json(json!({ "status": 21007 }))
                }),
            )
            .route(
                "/sandbox",
                post(|State(hits): State<Hits>| async move {
                    hits.sandbox.fetch_add(1, Ordering::SeqCst);
                    Json(json!({
                        "status": 0,
                        "receipt": { "bid": "com.example.game", "bvrs": "1.0" }
                    }))
                }),
            )
            .with_state(hits.clone());
        let base = serve_stub(app).await;

        let client = AppStoreClient::new(AppStoreConfig {
            production_url: format!("{base}/production"),
            sandbox_url: format!("{base}/sandbox"),
            ..AppStoreConfig::default()
        })
        .unwrap();

        let answer = client.verify("cmVjZWlwdA==").await.unwrap();
        assert_eq!(answer.status, 0);
        assert_eq!(answer.bundle_id(), Some("com.example.game"));

        // Exactly one call to each environment, production first.
        assert_eq!(hits.production.load(Ordering::SeqCst), 1);
        assert_eq!(hits.sandbox.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn conclusive_production_answer_skips_sandbox() {
        use axum::extract::State;
        use axum::routing::post;
        use axum::{Json, Router};
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let sandbox_hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/production",
                post(|| async { Json(json!({ "status": 21002 })) }),
            )
            .route(
                "/sandbox",
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(json!({ "status": 0 }))
                }),
            )
            .with_state(sandbox_hits.clone());
        let base = serve_stub(app).await;

        let client = AppStoreClient::new(AppStoreConfig {
            production_url: format!("{base}/production"),
            sandbox_url: format!("{base}/sandbox"),
            ..AppStoreConfig::default()
        })
        .unwrap();

        let answer = client.verify("cmVjZWlwdA==").await.unwrap();
        assert_eq!(answer.status, 21002);
        assert_eq!(sandbox_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn slow_endpoint_maps_to_timeout() {
        use axum::routing::post;
        use axum::{Json, Router};

        let app = Router::new().route(
            "/production",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({ "status": 0 }))
            }),
        );
        let base = serve_stub(app).await;

        let client = AppStoreClient::new(AppStoreConfig {
            production_url: format!("{base}/production"),
            timeout: Duration::from_millis(50),
            ..AppStoreConfig::default()
        })
        .unwrap();

        match client.verify("cmVjZWlwdA==").await {
            Err(PlatformError::Timeout) => {}
            other => panic!("expected Timeout, got {other:?}"),
        }
    }
}

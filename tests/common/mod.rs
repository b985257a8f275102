//! Common test utilities and fixtures for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use iap_sentry::engine::VerificationEngine;
use iap_sentry::infra::TenantStore;
use iap_sentry::platform::{PlatformAnswer, PlatformError, PlatformVerifier};
use iap_sentry::{Game, SqliteStore, Submission};

pub const TEST_BUNDLE: &str = "com.example.game";

/// One scripted platform behavior per call.
#[derive(Debug, Clone)]
pub enum PlatformScript {
    /// Status 0 with the given receipt bundle id.
    Valid { bundle_id: String },
    /// Non-zero status, no receipt body.
    Status(i64),
    Timeout,
    Offline,
}

impl PlatformScript {
    fn answer(&self) -> Result<PlatformAnswer, PlatformError> {
        match self {
            PlatformScript::Valid { bundle_id } => Ok(PlatformAnswer {
                status: 0,
                body: json!({
                    "status": 0,
                    "receipt": {
                        "bid": bundle_id,
                        "bvrs": "1.0",
                        "transaction_id": "1000000003043743",
                    }
                }),
            }),
            PlatformScript::Status(code) => Ok(PlatformAnswer {
                status: *code,
                body: json!({ "status": code }),
            }),
            PlatformScript::Timeout => Err(PlatformError::Timeout),
            PlatformScript::Offline => Err(PlatformError::Offline),
        }
    }
}

/// Deterministic stand-in for the App Store: plays back a queue of scripted
/// behaviors, then repeats the last one.
pub struct ScriptedPlatform {
    queue: Mutex<VecDeque<PlatformScript>>,
    fallback: Mutex<PlatformScript>,
    calls: AtomicUsize,
}

impl ScriptedPlatform {
    pub fn new(script: impl IntoIterator<Item = PlatformScript>) -> Self {
        let queue: VecDeque<PlatformScript> = script.into_iter().collect();
        let fallback = queue.back().cloned().unwrap_or(PlatformScript::Timeout);
        Self {
            queue: Mutex::new(queue),
            fallback: Mutex::new(fallback),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn valid(bundle_id: &str) -> Self {
        Self::new([PlatformScript::Valid {
            bundle_id: bundle_id.to_string(),
        }])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformVerifier for ScriptedPlatform {
    async fn verify(&self, _receipt: &str) -> Result<PlatformAnswer, PlatformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut queue = self.queue.lock().unwrap();
            match queue.pop_front() {
                Some(step) => {
                    if queue.is_empty() {
                        *self.fallback.lock().unwrap() = step.clone();
                    }
                    step
                }
                None => self.fallback.lock().unwrap().clone(),
            }
        };
        next.answer()
    }
}

/// In-memory store seeded with one company and one game.
pub async fn seeded_store() -> (Arc<SqliteStore>, Game) {
    let store = SqliteStore::in_memory().await.unwrap();
    let company = store.create_company("Some Company").await.unwrap();
    let game = store
        .create_game(company.id, "Some Game", "a secret")
        .await
        .unwrap();
    (Arc::new(store), game)
}

/// Engine over the shared store and the given platform script.
pub fn engine_with(store: &Arc<SqliteStore>, platform: Arc<ScriptedPlatform>) -> Arc<VerificationEngine> {
    Arc::new(VerificationEngine::new(
        store.clone(),
        store.clone(),
        platform,
    ))
}

/// A well-formed submission for the seeded game's bundle.
pub fn valid_submission() -> Submission {
    submission("06f5d6cbfd02476834906e83816662f8", &Uuid::new_v4().to_string())
}

pub fn submission(xact_id: &str, submission_uuid: &str) -> Submission {
    let raw = json!({
        "game_secret": "a secret",
        "device_id_a": "1ad75bdc85527914459b41f44f3af0ff",
        "device_id_b": "f43adc9fc7548eef59b9314ec88078f6",
        "receipt": "8f4c538fb296a31b49bd38360ce49f83==",
        "xact_id": xact_id,
        "submission_uuid": submission_uuid,
        "bundle_id": TEST_BUNDLE,
        "bundle_version": "1.0",
    });

    Submission {
        device_id_a: "1ad75bdc85527914459b41f44f3af0ff".into(),
        device_id_b: "f43adc9fc7548eef59b9314ec88078f6".into(),
        receipt: "8f4c538fb296a31b49bd38360ce49f83==".into(),
        xact_id: xact_id.into(),
        submission_uuid: submission_uuid.into(),
        bundle_id: TEST_BUNDLE.into(),
        bundle_version: "1.0".into(),
        raw,
    }
}

/// Same purchase submitted from a different physical device.
pub fn with_device(mut sub: Submission, device_id_a: &str, device_id_b: &str) -> Submission {
    sub.device_id_a = device_id_a.to_string();
    sub.device_id_b = device_id_b.to_string();
    sub.raw["device_id_a"] = json!(device_id_a);
    sub.raw["device_id_b"] = json!(device_id_b);
    sub
}

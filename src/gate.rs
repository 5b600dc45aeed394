//! Payment gate: webhook-driven token minting and one-time downloads.
//!
//! A token only comes into existence after the external gateway confirms the
//! charge, and the charge metadata must name the stored file the payer
//! actually cleaned. Redeeming consumes both the token and the file.

use crate::error::{Result, ScrubError};
use crate::store::FileStore;
use crate::verify::PaymentVerifier;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

/// Webhook event names accepted as a successful charge. The gateway's own
/// `charge.success` is an alias; verification decides either way.
const SUCCESS_EVENTS: [&str; 2] = ["payment-succeeded", "charge.success"];

pub struct PaymentGate {
    tokens: Mutex<HashMap<String, String>>,
    store: Arc<dyn FileStore>,
    verifier: Arc<dyn PaymentVerifier>,
}

impl PaymentGate {
    pub fn new(store: Arc<dyn FileStore>, verifier: Arc<dyn PaymentVerifier>) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            store,
            verifier,
        }
    }

    /// Handles one webhook delivery. On a verified success, mints a one-time
    /// token bound to the stored file named by the charge metadata and
    /// returns it. Every decline leaves both maps untouched.
    pub async fn notify(&self, event: &str, data: &Value) -> Result<String> {
        if !SUCCESS_EVENTS.contains(&event) {
            self.decline("unsupported event");
            return Err(ScrubError::BadRequest(format!(
                "unsupported webhook event '{event}'"
            )));
        }

        let reference = data
            .get("reference")
            .and_then(Value::as_str)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                self.decline("missing reference");
                ScrubError::BadRequest("webhook payload has no data.reference".to_string())
            })?;

        let charge = match self.verifier.verify(reference).await {
            Ok(charge) => charge,
            Err(e) => {
                self.decline("verification failed");
                return Err(e);
            }
        };

        let file_key = charge.file_key.ok_or_else(|| {
            self.decline("no file_key metadata");
            ScrubError::BadRequest(format!(
                "verified charge {reference} carries no file_key metadata"
            ))
        })?;

        if !self.store.contains(&file_key).await {
            self.decline("stale file_key");
            return Err(ScrubError::NotFound(format!(
                "stored file {file_key} has expired or was already downloaded"
            )));
        }

        let token = Uuid::new_v4().simple().to_string();
        self.tokens
            .lock()
            .unwrap()
            .insert(token.clone(), file_key.clone());

        metrics::counter!(crate::metrics::TOKENS_MINTED).increment(1);
        info!(reference, file_key = %file_key, "minted download token");
        Ok(token)
    }

    /// Redeems a one-time token: returns the cleaned file's bytes and
    /// deletes both the token and the file.
    ///
    /// The token is claimed (removed) under the lock before any I/O, so
    /// concurrent redeems of the same token serialize and exactly one wins.
    /// A claimed token whose backing file is gone stays consumed; it could
    /// never succeed later.
    pub async fn redeem(&self, token: &str) -> Result<Vec<u8>> {
        let file_key = self
            .tokens
            .lock()
            .unwrap()
            .remove(token)
            .ok_or_else(|| ScrubError::Forbidden("unknown or already-used download token".to_string()))?;

        let bytes = self.store.retrieve(&file_key).await?;
        self.store.delete(&file_key).await?;

        metrics::counter!(crate::metrics::TOKENS_REDEEMED).increment(1);
        info!(file_key = %file_key, "download token redeemed");
        Ok(bytes)
    }

    /// Number of outstanding (unredeemed) tokens.
    pub fn outstanding_tokens(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }

    fn decline(&self, reason: &str) {
        metrics::counter!(crate::metrics::WEBHOOKS_DECLINED).increment(1);
        warn!(reason, "webhook declined; no token minted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryFileStore;
    use crate::verify::VerifiedCharge;
    use async_trait::async_trait;
    use serde_json::json;

    struct StaticVerifier {
        file_key: Option<String>,
        fail: bool,
    }

    #[async_trait]
    impl PaymentVerifier for StaticVerifier {
        async fn verify(&self, reference: &str) -> Result<VerifiedCharge> {
            if self.fail {
                return Err(ScrubError::GatewayVerification("declined".to_string()));
            }
            Ok(VerifiedCharge {
                reference: reference.to_string(),
                file_key: self.file_key.clone(),
            })
        }
    }

    fn gate_with(store: Arc<InMemoryFileStore>, verifier: StaticVerifier) -> PaymentGate {
        PaymentGate::new(store, Arc::new(verifier))
    }

    #[tokio::test]
    async fn wrong_event_mints_nothing() {
        let store = Arc::new(InMemoryFileStore::new());
        let gate = gate_with(
            store,
            StaticVerifier { file_key: None, fail: false },
        );
        let err = gate
            .notify("invoice.created", &json!({"reference": "r1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ScrubError::BadRequest(_)));
        assert_eq!(gate.outstanding_tokens(), 0);
    }

    #[tokio::test]
    async fn failed_verification_mints_nothing() {
        let store = Arc::new(InMemoryFileStore::new());
        store.insert_raw("k1", b"data".to_vec());
        let gate = gate_with(
            store,
            StaticVerifier { file_key: Some("k1".to_string()), fail: true },
        );
        let err = gate
            .notify("payment-succeeded", &json!({"reference": "r1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ScrubError::GatewayVerification(_)));
        assert_eq!(gate.outstanding_tokens(), 0);
    }

    #[tokio::test]
    async fn token_binds_to_the_metadata_file() {
        let store = Arc::new(InMemoryFileStore::new());
        store.insert_raw("mine", b"my,data".to_vec());
        store.insert_raw("other", b"other,data".to_vec());
        let gate = gate_with(
            store,
            StaticVerifier { file_key: Some("mine".to_string()), fail: false },
        );
        let token = gate
            .notify("payment-succeeded", &json!({"reference": "r1"}))
            .await
            .unwrap();
        let bytes = gate.redeem(&token).await.unwrap();
        assert_eq!(bytes, b"my,data");
    }

    #[tokio::test]
    async fn missing_metadata_declines() {
        let store = Arc::new(InMemoryFileStore::new());
        let gate = gate_with(
            store,
            StaticVerifier { file_key: None, fail: false },
        );
        let err = gate
            .notify("payment-succeeded", &json!({"reference": "r1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ScrubError::BadRequest(_)));
    }

    #[tokio::test]
    async fn stale_file_key_declines() {
        let store = Arc::new(InMemoryFileStore::new());
        let gate = gate_with(
            store,
            StaticVerifier { file_key: Some("swept-away".to_string()), fail: false },
        );
        let err = gate
            .notify("payment-succeeded", &json!({"reference": "r1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ScrubError::NotFound(_)));
        assert_eq!(gate.outstanding_tokens(), 0);
    }

    #[tokio::test]
    async fn second_redeem_is_forbidden() {
        let store = Arc::new(InMemoryFileStore::new());
        store.insert_raw("k1", b"bytes".to_vec());
        let gate = gate_with(
            store,
            StaticVerifier { file_key: Some("k1".to_string()), fail: false },
        );
        let token = gate
            .notify("payment-succeeded", &json!({"reference": "r1"}))
            .await
            .unwrap();
        assert!(gate.redeem(&token).await.is_ok());
        let err = gate.redeem(&token).await.unwrap_err();
        assert!(matches!(err, ScrubError::Forbidden(_)));
    }
}

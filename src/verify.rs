//! Outbound payment verification port and its Paystack implementation.

use crate::error::{Result, ScrubError};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// A charge the gateway confirmed as succeeded. `file_key` is the
/// stored-file key the client attached as charge metadata when the payment
/// was initialized.
#[derive(Debug, Clone)]
pub struct VerifiedCharge {
    pub reference: String,
    pub file_key: Option<String>,
}

/// Verification port: resolves a payment reference against the external
/// gateway. Mockable in tests.
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    async fn verify(&self, reference: &str) -> Result<VerifiedCharge>;
}

/// Live verifier for Paystack's transaction-verification endpoint.
pub struct PaystackVerifier {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl PaystackVerifier {
    pub fn new(secret_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(secret_key, "https://api.paystack.co")
    }

    /// Base-url override for tests against a local stub server.
    pub fn with_base_url(secret_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(VERIFY_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }

    async fn fetch(&self, reference: &str) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let url = format!("{}/transaction/verify/{}", self.base_url, reference);
        self.client
            .get(url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
    }
}

#[async_trait]
impl PaymentVerifier for PaystackVerifier {
    async fn verify(&self, reference: &str) -> Result<VerifiedCharge> {
        // One retry on transient transport failure, then fail closed.
        let response = match self.fetch(reference).await {
            Ok(resp) => resp,
            Err(first) if first.is_timeout() || first.is_connect() => {
                warn!(reference, error = %first, "verification call failed, retrying once");
                self.fetch(reference).await.map_err(|e| {
                    ScrubError::GatewayVerification(format!("gateway unreachable: {e}"))
                })?
            }
            Err(e) => {
                return Err(ScrubError::GatewayVerification(format!(
                    "gateway unreachable: {e}"
                )))
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ScrubError::GatewayVerification(format!(
                "verification endpoint returned {status}"
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            ScrubError::GatewayVerification(format!("unreadable verification response: {e}"))
        })?;

        let ok = body.get("status").and_then(Value::as_bool).unwrap_or(false);
        let charge_status = body
            .pointer("/data/status")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !ok || charge_status != "success" {
            return Err(ScrubError::GatewayVerification(format!(
                "charge {reference} not successful (status '{charge_status}')"
            )));
        }

        let file_key = body
            .pointer("/data/metadata/file_key")
            .and_then(Value::as_str)
            .map(str::to_string);

        debug!(reference, file_key = ?file_key, "charge verified");
        Ok(VerifiedCharge {
            reference: reference.to_string(),
            file_key,
        })
    }
}

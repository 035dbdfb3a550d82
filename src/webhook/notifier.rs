use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult};
use crate::webhook::signer::{HmacSigner, SIGNATURE_HEADER, TIMESTAMP_HEADER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookKind {
    Submit,
    Settle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookStatus {
    Confirmed,
    Failed,
}

/// Transaction outcome reported to the ledger service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "contractId")]
    pub contract_id: String,
    #[serde(rename = "sig")]
    pub transaction_signature: String,
    pub kind: WebhookKind,
    pub status: WebhookStatus,
    #[serde(rename = "meta")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Signs and posts transaction outcomes to the ledger service.
///
/// Delivery is attempted exactly once; failures are logged and dropped.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: String,
    signer: HmacSigner,
}

impl WebhookNotifier {
    pub fn new(base_url: &str, signer: HmacSigner, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build webhook client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/webhooks/tx", base_url.trim_end_matches('/')),
            signer,
        })
    }

    /// Sign and send one event. A non-200 answer is logged, not retried.
    pub async fn deliver(&self, event: &WebhookEvent) -> AppResult<()> {
        let payload = serde_json::to_vec(event)?;
        let headers = self.signer.sign_now(&payload);

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(TIMESTAMP_HEADER, headers.timestamp)
            .header(SIGNATURE_HEADER, headers.signature)
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            warn!(
                contract_id = %event.contract_id,
                status = status.as_u16(),
                "Webhook returned non-200 status"
            );
        } else {
            info!(
                contract_id = %event.contract_id,
                kind = ?event.kind,
                status = ?event.status,
                "Webhook delivered"
            );
        }

        Ok(())
    }

    /// Deliver in a detached task. The handle is returned for tests only;
    /// production callers drop it.
    pub fn spawn_delivery(&self, event: WebhookEvent) -> JoinHandle<()> {
        let notifier = self.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.deliver(&event).await {
                error!(contract_id = %event.contract_id, "Failed to send webhook: {}", e);
            }
        })
    }
}

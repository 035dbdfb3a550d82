use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

use super::models::{ContractDue, DueContractsResponse};
use crate::error::{AppError, AppResult};
use crate::webhook::signer::{HmacSigner, SIGNATURE_HEADER, TIMESTAMP_HEADER};

/// Source of contracts awaiting settlement
#[async_trait]
pub trait DueContractSource: Send + Sync {
    async fn fetch_due_contracts(&self) -> AppResult<Vec<ContractDue>>;
}

/// HTTP client for the off-chain ledger service
pub struct LedgerClient {
    client: reqwest::Client,
    base_url: String,
    signer: HmacSigner,
}

impl LedgerClient {
    pub fn new(base_url: &str, signer: HmacSigner, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build ledger client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            signer,
        })
    }
}

#[async_trait]
impl DueContractSource for LedgerClient {
    /// GET /api/contracts/due, signed over an empty payload
    #[instrument(skip(self))]
    async fn fetch_due_contracts(&self) -> AppResult<Vec<ContractDue>> {
        let headers = self.signer.sign_now(b"");

        let response = self
            .client
            .get(format!("{}/api/contracts/due", self.base_url))
            .header(TIMESTAMP_HEADER, headers.timestamp)
            .header(SIGNATURE_HEADER, headers.signature)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(AppError::Ledger(format!(
                "due contracts query returned status {}",
                status.as_u16()
            )));
        }

        let body: DueContractsResponse = response.json().await?;
        debug!(count = body.contracts.len(), "Fetched due contracts");
        Ok(body.contracts)
    }
}

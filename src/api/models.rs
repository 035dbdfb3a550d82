use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use validator::{Validate, ValidationError};

use crate::execution::instructions::FundingSide;

fn validate_pubkey(value: &str) -> Result<(), ValidationError> {
    Pubkey::from_str(value.trim())
        .map(|_| ())
        .map_err(|_| {
            let mut err = ValidationError::new("pubkey");
            err.message = Some("must be a base58 public key".into());
            err
        })
}

// ========== REQUEST MODELS ==========

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InitializeContractRequest {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub contract_id: String,

    #[validate(custom = "validate_pubkey")]
    pub party_a: String,

    #[validate(custom = "validate_pubkey")]
    pub party_b: String,

    /// Asset symbol, used to pick a feed when `oracle_feed` is absent
    #[validate(length(min = 1, max = 16, message = "must be 1-16 characters"))]
    pub underlying: String,

    pub underlying_id: u8,

    /// Fixed-point strike as stored on chain
    #[validate(range(min = 1, message = "must be positive"))]
    pub strike: i64,

    /// Expiry as Unix seconds
    #[validate(range(min = 1, message = "must be positive"))]
    pub expiry: i64,

    /// USDC base units
    #[validate(range(min = 1, message = "must be positive"))]
    pub notional: u64,

    #[validate(custom = "validate_pubkey")]
    pub oracle_feed: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FundContractRequest {
    #[validate(custom = "validate_pubkey")]
    pub contract_pda: String,

    #[validate(custom = "validate_pubkey")]
    pub escrow_pda: String,

    #[validate(custom = "validate_pubkey")]
    pub payer: String,

    #[validate(custom = "validate_pubkey")]
    pub payer_token_account: String,

    pub side: FundingSide,

    #[validate(range(min = 1, message = "must be positive"))]
    pub amount: u64,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SettleContractRequest {
    #[validate(custom = "validate_pubkey")]
    pub contract_pda: String,

    #[validate(custom = "validate_pubkey")]
    pub escrow_pda: String,

    #[validate(custom = "validate_pubkey")]
    pub oracle_feed: String,

    #[validate(custom = "validate_pubkey")]
    pub long_token_account: Option<String>,

    #[validate(custom = "validate_pubkey")]
    pub short_token_account: Option<String>,

    /// Read from the oracle feed when omitted
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub settlement_price: Option<f64>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSignedRequest {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub signed_tx: String,
}

// ========== RESPONSE MODELS ==========

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeContractResponse {
    pub contract_pda: String,
    pub escrow_pda: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_sig: Option<String>,
    /// Base64 transaction for client-side signing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsigned_tx: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundContractResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_sig: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsigned_tx: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSignedResponse {
    pub tx_sig: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub time: String,
}

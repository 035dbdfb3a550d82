use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{AppError, AppResult};

/// A contract the ledger service reports as due for settlement.
///
/// Missing address fields decode as empty and fail in `from_due` for this
/// contract only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDue {
    pub id: String,
    #[serde(default)]
    pub contract_pda: String,
    #[serde(default)]
    pub escrow_pda: String,
    #[serde(default)]
    pub oracle_feed: String,
    #[serde(default, rename = "underlying")]
    pub underlying_symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_token_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_token_account: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DueContractsResponse {
    #[serde(default)]
    pub contracts: Vec<ContractDue>,
}

/// Everything needed to build and submit one settlement
#[derive(Debug, Clone)]
pub struct SettleContractParams {
    pub contract_id: String,
    pub contract_pda: Pubkey,
    pub escrow_pda: Pubkey,
    pub oracle_feed: Pubkey,
    pub long_token_account: Option<Pubkey>,
    pub short_token_account: Option<Pubkey>,
    pub settlement_price: f64,
}

impl SettleContractParams {
    /// Parse the addresses of a due contract. Fails on the first bad key.
    pub fn from_due(contract: &ContractDue, settlement_price: f64) -> AppResult<Self> {
        Ok(Self {
            contract_id: contract.id.clone(),
            contract_pda: parse_pubkey("contract PDA", &contract.contract_pda)?,
            escrow_pda: parse_pubkey("escrow PDA", &contract.escrow_pda)?,
            oracle_feed: parse_pubkey("oracle feed", &contract.oracle_feed)?,
            long_token_account: contract
                .long_token_account
                .as_deref()
                .map(|k| parse_pubkey("long token account", k))
                .transpose()?,
            short_token_account: contract
                .short_token_account
                .as_deref()
                .map(|k| parse_pubkey("short token account", k))
                .transpose()?,
            settlement_price,
        })
    }
}

/// Result of a submitted settlement; handed straight to the notifier
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementOutcome {
    pub price: f64,
    /// party -> amount in USDC base units
    pub payout: BTreeMap<String, u64>,
    #[serde(rename = "txSig", serialize_with = "serialize_display")]
    pub signature: Signature,
}

fn serialize_display<S: serde::Serializer>(
    value: &Signature,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

pub fn parse_pubkey(what: &str, value: &str) -> AppResult<Pubkey> {
    Pubkey::from_str(value.trim())
        .map_err(|_| AppError::InvalidAddress(format!("Invalid {}: {}", what, value)))
}

use axum::{
    extract::{Path, State},
    Json,
};
use solana_sdk::signature::Signature;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, instrument};

use super::models::*;
use crate::{
    error::{AppError, AppResult},
    execution::{
        confirmation::ConfirmationPoller,
        instructions::{FundContractParams, InitializeContractParams},
        solana::{SolanaClient, Submission},
    },
    ledger::models::{parse_pubkey, SettleContractParams, SettlementOutcome},
    middleware::ValidatedJson,
    oracle::FeedRegistry,
    settlement::pipeline::{confirmation_event, settlement_metadata, EventSink},
    webhook::{HmacSigner, WebhookKind},
};

#[derive(Clone)]
pub struct AppState {
    pub chain: Arc<SolanaClient>,
    pub poller: Arc<ConfirmationPoller<SolanaClient>>,
    pub events: Arc<dyn EventSink>,
    pub feeds: Arc<FeedRegistry>,
    pub signer: HmacSigner,
    /// Flips to true on shutdown; pending confirmations stop polling
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    /// Confirm in the background, then report the outcome. Nothing is
    /// awaited by the request that triggered it.
    fn confirm_and_notify(
        &self,
        contract_id: String,
        signature: Signature,
        kind: WebhookKind,
        metadata: BTreeMap<String, serde_json::Value>,
    ) {
        let poller = self.poller.clone();
        let events = self.events.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let outcome = poller.confirm(&signature, &shutdown).await;
            if let Some(event) =
                confirmation_event(&contract_id, &signature, kind, &outcome, metadata)
            {
                events.dispatch(event);
            }
        });
    }
}

fn split_submission(submission: Submission) -> (Option<String>, Option<String>) {
    match submission {
        Submission::Unsigned(tx) => (None, Some(tx)),
        Submission::Submitted(sig) => (Some(sig.to_string()), None),
    }
}

/// GET /v1/health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        time: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    })
}

/// POST /v1/contracts/initialize
#[instrument(skip_all, fields(contract_id = %request.contract_id))]
pub async fn initialize_contract(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<InitializeContractRequest>,
) -> AppResult<Json<InitializeContractResponse>> {
    let oracle_feed = match request.oracle_feed.as_deref() {
        Some(feed) => parse_pubkey("oracle feed", feed)?,
        None => state.feeds.get(&request.underlying).ok_or_else(|| {
            AppError::InvalidInput(format!(
                "no oracle feed configured for {}",
                request.underlying
            ))
        })?,
    };

    let params = InitializeContractParams {
        contract_id: request.contract_id,
        underlying_id: request.underlying_id,
        strike: request.strike,
        expiry_ts: request.expiry,
        notional: request.notional,
        party_a: parse_pubkey("partyA", &request.party_a)?,
        party_b: parse_pubkey("partyB", &request.party_b)?,
        oracle_feed,
    };

    let initialized = state.chain.initialize_contract(&params).await?;
    let (tx_sig, unsigned_tx) = split_submission(initialized.submission);

    Ok(Json(InitializeContractResponse {
        contract_pda: initialized.contract_pda.to_string(),
        escrow_pda: initialized.escrow_pda.to_string(),
        tx_sig,
        unsigned_tx,
    }))
}

/// POST /v1/contracts/:id/fund
#[instrument(skip(state, request))]
pub async fn fund_contract(
    State(state): State<AppState>,
    Path(contract_id): Path<String>,
    ValidatedJson(request): ValidatedJson<FundContractRequest>,
) -> AppResult<Json<FundContractResponse>> {
    let params = FundContractParams {
        contract_id,
        contract_pda: parse_pubkey("contractPda", &request.contract_pda)?,
        escrow_pda: parse_pubkey("escrowPda", &request.escrow_pda)?,
        payer: parse_pubkey("payer", &request.payer)?,
        payer_token_account: parse_pubkey("payerTokenAccount", &request.payer_token_account)?,
        side: request.side,
        amount: request.amount,
    };

    let (tx_sig, unsigned_tx) = split_submission(state.chain.fund_contract(&params).await?);
    Ok(Json(FundContractResponse {
        tx_sig,
        unsigned_tx,
    }))
}

/// POST /v1/contracts/:id/settle
#[instrument(skip(state, request))]
pub async fn settle_contract(
    State(state): State<AppState>,
    Path(contract_id): Path<String>,
    ValidatedJson(request): ValidatedJson<SettleContractRequest>,
) -> AppResult<Json<SettlementOutcome>> {
    let mut params = SettleContractParams {
        contract_id: contract_id.clone(),
        contract_pda: parse_pubkey("contractPda", &request.contract_pda)?,
        escrow_pda: parse_pubkey("escrowPda", &request.escrow_pda)?,
        oracle_feed: parse_pubkey("oracleFeed", &request.oracle_feed)?,
        long_token_account: request
            .long_token_account
            .as_deref()
            .map(|k| parse_pubkey("longTokenAccount", k))
            .transpose()?,
        short_token_account: request
            .short_token_account
            .as_deref()
            .map(|k| parse_pubkey("shortTokenAccount", k))
            .transpose()?,
        settlement_price: 0.0,
    };

    params.settlement_price = match request.settlement_price {
        Some(price) => price,
        None => {
            let quote = state
                .chain
                .read_oracle_price(&params.oracle_feed, chrono::Utc::now().timestamp())
                .await?;
            info!(price = quote.decoded_price, "Using oracle settlement price");
            quote.decoded_price
        }
    };

    let outcome = state.chain.settle_contract(&params).await?;
    state.confirm_and_notify(
        contract_id,
        outcome.signature,
        WebhookKind::Settle,
        settlement_metadata(&outcome),
    );

    Ok(Json(outcome))
}

/// POST /v1/contracts/:id/submit-signed
#[instrument(skip(state, request))]
pub async fn submit_signed(
    State(state): State<AppState>,
    Path(contract_id): Path<String>,
    ValidatedJson(request): ValidatedJson<SubmitSignedRequest>,
) -> AppResult<Json<SubmitSignedResponse>> {
    let signature = state
        .chain
        .submit_signed_transaction(&request.signed_tx)
        .await?;
    info!(%signature, "Signed transaction submitted");

    state.confirm_and_notify(contract_id, signature, WebhookKind::Submit, BTreeMap::new());

    Ok(Json(SubmitSignedResponse {
        tx_sig: signature.to_string(),
    }))
}

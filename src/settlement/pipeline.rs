// Expiry-driven settlement: due contracts are priced from their oracle feed,
// settled on chain, confirmed, and reported back to the ledger service.

use async_trait::async_trait;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::error::AppResult;
use crate::execution::confirmation::{
    ConfirmationOutcome, ConfirmationPolicy, ConfirmationPoller, SignatureStatusSource,
};
use crate::ledger::client::DueContractSource;
use crate::ledger::models::{ContractDue, SettleContractParams, SettlementOutcome};
use crate::oracle;
use crate::settlement::scheduler::ScheduledJobs;
use crate::webhook::{WebhookEvent, WebhookKind, WebhookNotifier, WebhookStatus};

/// Chain operations the settlement pipeline depends on
#[async_trait]
pub trait SettlementChain: SignatureStatusSource {
    async fn fetch_account_data(&self, account: &Pubkey) -> AppResult<Vec<u8>>;

    async fn settle_contract(&self, params: &SettleContractParams) -> AppResult<SettlementOutcome>;
}

/// Destination for transaction outcome events. Dispatch must not block.
pub trait EventSink: Send + Sync {
    fn dispatch(&self, event: WebhookEvent);
}

impl EventSink for WebhookNotifier {
    fn dispatch(&self, event: WebhookEvent) {
        // detached; delivery errors are logged by the task
        let _ = self.spawn_delivery(event);
    }
}

/// Map a confirmation result to the event reported to the ledger.
///
/// Returns `None` for a cancelled confirmation: the process is shutting
/// down and the outcome is unknown.
pub fn confirmation_event(
    contract_id: &str,
    signature: &Signature,
    kind: WebhookKind,
    confirmation: &ConfirmationOutcome,
    mut metadata: BTreeMap<String, serde_json::Value>,
) -> Option<WebhookEvent> {
    let status = match confirmation {
        ConfirmationOutcome::Confirmed => WebhookStatus::Confirmed,
        ConfirmationOutcome::Failed { reason } => {
            metadata.insert("reason".to_string(), reason.clone().into());
            WebhookStatus::Failed
        }
        ConfirmationOutcome::TimedOut => {
            metadata.insert("reason".to_string(), "confirmation timed out".into());
            WebhookStatus::Failed
        }
        ConfirmationOutcome::Cancelled => return None,
    };

    Some(WebhookEvent {
        contract_id: contract_id.to_string(),
        transaction_signature: signature.to_string(),
        kind,
        status,
        metadata,
    })
}

pub fn settlement_metadata(outcome: &SettlementOutcome) -> BTreeMap<String, serde_json::Value> {
    let mut metadata = BTreeMap::new();
    metadata.insert("price".to_string(), serde_json::json!(outcome.price));
    metadata.insert("payout".to_string(), serde_json::json!(outcome.payout));
    metadata
}

pub struct SettlementPipeline<C, L> {
    chain: Arc<C>,
    ledger: Arc<L>,
    poller: ConfirmationPoller<C>,
    sink: Arc<dyn EventSink>,
    cancel: watch::Receiver<bool>,
}

impl<C, L> SettlementPipeline<C, L>
where
    C: SettlementChain + 'static,
    L: DueContractSource + 'static,
{
    pub fn new(
        chain: Arc<C>,
        ledger: Arc<L>,
        sink: Arc<dyn EventSink>,
        policy: ConfirmationPolicy,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            poller: ConfirmationPoller::new(chain.clone(), policy),
            chain,
            ledger,
            sink,
            cancel,
        }
    }

    /// One expiry scan. Contracts are settled strictly in ledger order; a
    /// failure skips that contract only.
    pub async fn run_expiry_scan(&self) {
        debug!("Processing expired contracts");

        let contracts = match self.ledger.fetch_due_contracts().await {
            Ok(contracts) => contracts,
            Err(e) => {
                error!("Failed to query due contracts: {}", e);
                return;
            }
        };

        if contracts.is_empty() {
            return;
        }
        info!("🔄 Settling {} due contracts", contracts.len());

        for contract in &contracts {
            if let Err(e) = self.settle_one(contract).await {
                warn!(contract_id = %contract.id, "Settlement skipped: {}", e);
            }
        }
    }

    #[instrument(skip_all, fields(contract_id = %contract.id, underlying = %contract.underlying_symbol))]
    async fn settle_one(&self, contract: &ContractDue) -> AppResult<()> {
        let unpriced = SettleContractParams::from_due(contract, 0.0)?;

        let data = self.chain.fetch_account_data(&unpriced.oracle_feed).await?;
        let quote = oracle::decode(&data, chrono::Utc::now().timestamp())?;
        debug!(
            raw_price = quote.raw_price,
            exponent = quote.exponent,
            confidence = quote.confidence,
            status = ?quote.status,
            publish_time = quote.publish_time,
            price = %quote.price,
            "Oracle price accepted"
        );
        let params = SettleContractParams {
            settlement_price: quote.decoded_price,
            ..unpriced
        };

        let outcome = self.chain.settle_contract(&params).await?;
        info!(signature = %outcome.signature, price = outcome.price, "Settlement submitted");

        let confirmation = self.poller.confirm(&outcome.signature, &self.cancel).await;
        match confirmation_event(
            &contract.id,
            &outcome.signature,
            WebhookKind::Settle,
            &confirmation,
            settlement_metadata(&outcome),
        ) {
            Some(event) => {
                info!(status = ?event.status, "✓ Settlement resolved");
                self.sink.dispatch(event);
            }
            None => warn!("Confirmation cancelled, no webhook sent"),
        }

        Ok(())
    }
}

#[async_trait]
impl<C, L> ScheduledJobs for SettlementPipeline<C, L>
where
    C: SettlementChain + 'static,
    L: DueContractSource + 'static,
{
    async fn scan_expired(&self) {
        self.run_expiry_scan().await
    }

    // No queue exists yet: failed settlements are picked up again by the
    // next expiry scan while the ledger still reports them as due.
    async fn process_retry_queue(&self) {
        debug!("Processing retry queue");
    }

    async fn watch_funding(&self) {
        debug!("Processing funding watch");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::execution::confirmation::ChainTxStatus;
    use crate::ledger::models::DueContractsResponse;
    use crate::oracle::pyth_account::tests::encode_account;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeChain {
        feeds: HashMap<Pubkey, Vec<u8>>,
        settled: Mutex<Vec<(String, f64)>>,
    }

    #[async_trait]
    impl SignatureStatusSource for FakeChain {
        async fn signature_status(&self, _: &Signature) -> AppResult<Option<ChainTxStatus>> {
            Ok(Some(ChainTxStatus {
                err: None,
                finalized: true,
            }))
        }
    }

    #[async_trait]
    impl SettlementChain for FakeChain {
        async fn fetch_account_data(&self, account: &Pubkey) -> AppResult<Vec<u8>> {
            self.feeds
                .get(account)
                .cloned()
                .ok_or_else(|| AppError::Chain("account not found".to_string()))
        }

        async fn settle_contract(
            &self,
            params: &SettleContractParams,
        ) -> AppResult<SettlementOutcome> {
            let mut settled = self.settled.lock();
            settled.push((params.contract_id.clone(), params.settlement_price));
            Ok(SettlementOutcome {
                price: params.settlement_price,
                payout: BTreeMap::new(),
                signature: Signature::from([settled.len() as u8; 64]),
            })
        }
    }

    struct FakeLedger(AppResult<Vec<ContractDue>>);

    #[async_trait]
    impl DueContractSource for FakeLedger {
        async fn fetch_due_contracts(&self) -> AppResult<Vec<ContractDue>> {
            match &self.0 {
                Ok(contracts) => Ok(contracts.clone()),
                Err(_) => Err(AppError::Ledger("status 500".to_string())),
            }
        }
    }

    #[derive(Default)]
    struct CapturingSink(Mutex<Vec<WebhookEvent>>);

    impl EventSink for CapturingSink {
        fn dispatch(&self, event: WebhookEvent) {
            self.0.lock().push(event);
        }
    }

    fn due(id: &str, feed: &Pubkey) -> ContractDue {
        ContractDue {
            id: id.to_string(),
            contract_pda: Pubkey::new_unique().to_string(),
            escrow_pda: Pubkey::new_unique().to_string(),
            oracle_feed: feed.to_string(),
            underlying_symbol: "BTC".to_string(),
            long_token_account: Some(Pubkey::new_unique().to_string()),
            short_token_account: Some(Pubkey::new_unique().to_string()),
        }
    }

    fn pipeline(
        chain: FakeChain,
        contracts: AppResult<Vec<ContractDue>>,
    ) -> (
        SettlementPipeline<FakeChain, FakeLedger>,
        Arc<FakeChain>,
        Arc<CapturingSink>,
        watch::Sender<bool>,
    ) {
        let chain = Arc::new(chain);
        let sink = Arc::new(CapturingSink::default());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let pipeline = SettlementPipeline::new(
            chain.clone(),
            Arc::new(FakeLedger(contracts)),
            sink.clone(),
            ConfirmationPolicy {
                interval: Duration::from_millis(10),
                max_attempts: 3,
            },
            cancel_rx,
        );
        (pipeline, chain, sink, cancel_tx)
    }

    #[tokio::test]
    async fn rejected_price_skips_only_that_contract() {
        let now = chrono::Utc::now().timestamp();
        let fresh = Pubkey::new_unique();
        let stale = Pubkey::new_unique();
        let mut chain = FakeChain::default();
        chain
            .feeds
            .insert(fresh, encode_account(-8, 4_500_000_000_000, 500_000, 1, now));
        chain
            .feeds
            .insert(stale, encode_account(-8, 4_500_000_000_000, 500_000, 1, now - 120));

        let contracts = vec![due("c-stale", &stale), due("c-fresh", &fresh)];
        let (pipeline, chain, sink, _cancel) = pipeline(chain, Ok(contracts));

        pipeline.run_expiry_scan().await;

        assert_eq!(*chain.settled.lock(), vec![("c-fresh".to_string(), 45000.0)]);
        let events = sink.0.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].contract_id, "c-fresh");
        assert_eq!(events[0].kind, WebhookKind::Settle);
        assert_eq!(events[0].status, WebhookStatus::Confirmed);
        assert_eq!(events[0].metadata["price"], serde_json::json!(45000.0));
    }

    #[tokio::test]
    async fn contracts_are_settled_in_ledger_order() {
        let now = chrono::Utc::now().timestamp();
        let feed = Pubkey::new_unique();
        let mut chain = FakeChain::default();
        chain
            .feeds
            .insert(feed, encode_account(-2, 310_050, 10, 1, now));

        let contracts = vec![due("c-3", &feed), due("c-1", &feed), due("c-2", &feed)];
        let (pipeline, chain, sink, _cancel) = pipeline(chain, Ok(contracts));

        pipeline.run_expiry_scan().await;

        let order: Vec<String> = chain.settled.lock().iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(order, vec!["c-3", "c-1", "c-2"]);
        let reported: Vec<String> = sink.0.lock().iter().map(|e| e.contract_id.clone()).collect();
        assert_eq!(reported, order);
    }

    #[tokio::test]
    async fn missing_feed_and_bad_address_are_skipped() {
        let now = chrono::Utc::now().timestamp();
        let feed = Pubkey::new_unique();
        let mut chain = FakeChain::default();
        chain
            .feeds
            .insert(feed, encode_account(-8, 4_500_000_000_000, 1, 1, now));

        let mut bad = due("c-bad", &feed);
        bad.contract_pda = "nope".to_string();
        let contracts = vec![bad, due("c-nofeed", &Pubkey::new_unique()), due("c-ok", &feed)];
        let (pipeline, chain, sink, _cancel) = pipeline(chain, Ok(contracts));

        pipeline.run_expiry_scan().await;

        assert_eq!(chain.settled.lock().len(), 1);
        assert_eq!(sink.0.lock()[0].contract_id, "c-ok");
    }

    #[tokio::test]
    async fn entry_without_oracle_feed_does_not_block_the_scan() {
        let now = chrono::Utc::now().timestamp();
        let feed = Pubkey::new_unique();
        let mut chain = FakeChain::default();
        chain
            .feeds
            .insert(feed, encode_account(-8, 4_500_000_000_000, 1, 1, now));

        let valid = serde_json::to_value(due("c-ok", &feed)).unwrap();
        let mut incomplete = serde_json::to_value(due("c-bad", &feed)).unwrap();
        incomplete.as_object_mut().unwrap().remove("oracleFeed");
        let response: DueContractsResponse = serde_json::from_value(serde_json::json!({
            "contracts": [incomplete, valid]
        }))
        .unwrap();
        let (pipeline, chain, sink, _cancel) = pipeline(chain, Ok(response.contracts));

        pipeline.run_expiry_scan().await;

        assert_eq!(*chain.settled.lock(), vec![("c-ok".to_string(), 45000.0)]);
        let events = sink.0.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].contract_id, "c-ok");
    }

    #[tokio::test]
    async fn ledger_failure_settles_nothing() {
        let (pipeline, chain, sink, _cancel) =
            pipeline(FakeChain::default(), Err(AppError::Ledger(String::new())));

        pipeline.run_expiry_scan().await;

        assert!(chain.settled.lock().is_empty());
        assert!(sink.0.lock().is_empty());
    }

    #[test]
    fn confirmation_outcomes_map_to_events() {
        let sig = Signature::from([7u8; 64]);

        let failed = confirmation_event(
            "c-1",
            &sig,
            WebhookKind::Submit,
            &ConfirmationOutcome::Failed {
                reason: "custom 6001".to_string(),
            },
            BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(failed.status, WebhookStatus::Failed);
        assert_eq!(failed.metadata["reason"], "custom 6001");
        assert_eq!(failed.transaction_signature, sig.to_string());

        let timed_out = confirmation_event(
            "c-1",
            &sig,
            WebhookKind::Settle,
            &ConfirmationOutcome::TimedOut,
            BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(timed_out.status, WebhookStatus::Failed);
        assert_eq!(timed_out.metadata["reason"], "confirmation timed out");

        assert!(confirmation_event(
            "c-1",
            &sig,
            WebhookKind::Settle,
            &ConfirmationOutcome::Cancelled,
            BTreeMap::new(),
        )
        .is_none());
    }
}

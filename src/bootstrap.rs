use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{
    api::handler::AppState,
    config::Config,
    error::AppResult,
    execution::{
        confirmation::{ConfirmationPolicy, ConfirmationPoller},
        instructions::RiskExchangeInstructions,
        solana::{load_keypair, SolanaClient, SolanaSettings},
    },
    ledger::LedgerClient,
    settlement::{EventSink, Scheduler, SettlementPipeline},
    webhook::{HmacSigner, WebhookNotifier},
};

pub type SettlementScheduler = Scheduler<SettlementPipeline<SolanaClient, LedgerClient>>;

/// Everything `main` needs to serve and schedule
pub struct Components {
    pub state: AppState,
    pub scheduler: SettlementScheduler,
}

pub fn initialize(config: &Config, shutdown: watch::Receiver<bool>) -> AppResult<Components> {
    info!("Initializing application components ...");

    let signer = match config.signer_keypair_path.as_deref() {
        Some(path) => {
            let keypair = load_keypair(path)?;
            info!("✅ Settlement signer loaded");
            Some(keypair)
        }
        None => {
            warn!("⚠️  SIGNER_KEYPAIR_PATH not set - settlement and custodial mode disabled");
            None
        }
    };

    let chain = Arc::new(SolanaClient::connect(
        &config.rpc_primary,
        config.rpc_fallback.as_deref(),
        SolanaSettings {
            program_id: config.program_id,
            usdc_mint: config.usdc_mint,
            non_custodial: config.non_custodial,
        },
        signer,
        Arc::new(RiskExchangeInstructions::new(config.program_id)),
    ));
    if let Some(pubkey) = chain.signer_pubkey() {
        info!(signer = %pubkey, "Settlement signer active");
    }
    info!(
        primary = %config.rpc_primary,
        fallback = config.rpc_fallback.is_some(),
        non_custodial = config.non_custodial,
        "✅ Solana client initialized"
    );

    let hmac = HmacSigner::new(config.hmac_secret.clone());
    let notifier: Arc<dyn EventSink> = Arc::new(WebhookNotifier::new(
        &config.web_api_url,
        hmac.clone(),
        config.webhook_timeout,
    )?);
    let ledger = Arc::new(LedgerClient::new(
        &config.web_api_url,
        hmac.clone(),
        config.webhook_timeout,
    )?);

    let pipeline = Arc::new(SettlementPipeline::new(
        chain.clone(),
        ledger,
        notifier.clone(),
        ConfirmationPolicy::default(),
        shutdown.clone(),
    ));
    let scheduler = Scheduler::new(pipeline, config.schedule);

    info!(
        feeds = ?config.oracle_feeds.symbols().collect::<Vec<_>>(),
        "✅ Oracle feeds registered"
    );

    let state = AppState {
        poller: Arc::new(ConfirmationPoller::new(
            chain.clone(),
            ConfirmationPolicy::default(),
        )),
        chain,
        events: notifier,
        feeds: Arc::new(config.oracle_feeds.clone()),
        signer: hmac,
        shutdown,
    };

    Ok(Components { state, scheduler })
}

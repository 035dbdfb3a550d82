use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::Message,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};
use solana_transaction_status_client_types::{TransactionConfirmationStatus, TransactionStatus};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::error::{AppError, AppResult};
use crate::execution::confirmation::{ChainTxStatus, SignatureStatusSource};
use crate::execution::instructions::{
    ContractAccounts, FundContractParams, InitializeContractParams, InstructionBuilder,
    CONTRACT_SEED, ESCROW_SEED,
};
use crate::execution::retry::{Endpoints, ResilientRpc, RetryPolicy};
use crate::ledger::models::{SettleContractParams, SettlementOutcome};
use crate::oracle::{self, PriceQuote};
use crate::settlement::pipeline::SettlementChain;

/// Static settings for the chain client
#[derive(Debug, Clone)]
pub struct SolanaSettings {
    pub program_id: Pubkey,
    pub usdc_mint: Pubkey,
    /// Return unsigned transactions for client-side signing instead of
    /// signing initialize/fund with the server key
    pub non_custodial: bool,
}

/// How a built transaction left the adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Base64 bincode transaction awaiting the user's signature
    Unsigned(String),
    Submitted(Signature),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializedContract {
    pub contract_pda: Pubkey,
    pub escrow_pda: Pubkey,
    pub submission: Submission,
}

pub struct SolanaClient {
    rpc: ResilientRpc<Arc<RpcClient>>,
    settings: SolanaSettings,
    signer: Option<Arc<Keypair>>,
    instructions: Arc<dyn InstructionBuilder>,
}

impl SolanaClient {
    pub fn new(
        rpc: ResilientRpc<Arc<RpcClient>>,
        settings: SolanaSettings,
        signer: Option<Keypair>,
        instructions: Arc<dyn InstructionBuilder>,
    ) -> Self {
        Self {
            rpc,
            settings,
            signer: signer.map(Arc::new),
            instructions,
        }
    }

    /// Build the RPC layer over a primary and optional fallback URL
    pub fn connect(
        primary_url: &str,
        fallback_url: Option<&str>,
        settings: SolanaSettings,
        signer: Option<Keypair>,
        instructions: Arc<dyn InstructionBuilder>,
    ) -> Self {
        let endpoints = Endpoints::new(
            Arc::new(RpcClient::new(primary_url.to_string())),
            fallback_url.map(|url| Arc::new(RpcClient::new(url.to_string()))),
        );
        Self::new(
            ResilientRpc::new(endpoints, RetryPolicy::default()),
            settings,
            signer,
            instructions,
        )
    }

    pub fn signer_pubkey(&self) -> Option<Pubkey> {
        self.signer.as_ref().map(|k| k.pubkey())
    }

    fn require_signer(&self) -> AppResult<&Keypair> {
        self.signer
            .as_deref()
            .ok_or_else(|| AppError::Config("settlement signer is not configured".to_string()))
    }

    pub fn derive_contract_pda(&self, underlying_id: u8, strike: i64, expiry_ts: i64) -> Pubkey {
        derive_contract_pda(&self.settings.program_id, underlying_id, strike, expiry_ts)
    }

    pub fn derive_escrow_pda(&self, contract: &Pubkey) -> Pubkey {
        derive_escrow_pda(&self.settings.program_id, contract)
    }

    pub async fn fetch_account_data(&self, account: &Pubkey) -> AppResult<Vec<u8>> {
        let account = *account;
        let data = self
            .rpc
            .execute(move |client| async move { client.get_account_data(&account).await })
            .await?;
        Ok(data)
    }

    /// Fetch and validate an oracle price account
    pub async fn read_oracle_price(&self, feed: &Pubkey, now: i64) -> AppResult<PriceQuote> {
        let data = self.fetch_account_data(feed).await?;
        Ok(oracle::decode(&data, now)?)
    }

    async fn latest_blockhash(&self) -> AppResult<Hash> {
        let hash = self
            .rpc
            .execute(|client| async move { client.get_latest_blockhash().await })
            .await?;
        Ok(hash)
    }

    async fn send(&self, transaction: &Transaction) -> AppResult<Signature> {
        let signature = self
            .rpc
            .execute(move |client| async move { client.send_transaction(transaction).await })
            .await?;
        Ok(signature)
    }

    async fn sign_and_send(
        &self,
        instructions: &[Instruction],
        payer: &Pubkey,
        signer: &Keypair,
    ) -> AppResult<Signature> {
        let blockhash = self.latest_blockhash().await?;
        let mut transaction = Transaction::new_unsigned(Message::new(instructions, Some(payer)));
        transaction
            .try_sign(&[signer], blockhash)
            .map_err(|e| AppError::Chain(format!("failed to sign transaction: {}", e)))?;
        self.send(&transaction).await
    }

    /// Non-custodial: hand back an unsigned transaction. Custodial: sign with
    /// the server key and submit.
    async fn submit_or_handoff(
        &self,
        instructions: Vec<Instruction>,
        payer: &Pubkey,
    ) -> AppResult<Submission> {
        if self.settings.non_custodial {
            let blockhash = self.latest_blockhash().await?;
            let mut message = Message::new(&instructions, Some(payer));
            message.recent_blockhash = blockhash;
            return Ok(Submission::Unsigned(encode_unsigned(message)?));
        }

        let signer = self.require_signer()?;
        let signature = self.sign_and_send(&instructions, payer, signer).await?;
        Ok(Submission::Submitted(signature))
    }

    #[instrument(skip(self, params), fields(contract_id = %params.contract_id))]
    pub async fn initialize_contract(
        &self,
        params: &InitializeContractParams,
    ) -> AppResult<InitializedContract> {
        if !self.settings.non_custodial {
            self.require_signer()?;
        }

        let contract_pda =
            self.derive_contract_pda(params.underlying_id, params.strike, params.expiry_ts);
        let escrow_pda = self.derive_escrow_pda(&contract_pda);
        info!(%contract_pda, %escrow_pda, "Initializing contract on-chain");

        let instructions = self.instructions.initialize_contract(
            params,
            ContractAccounts {
                contract: contract_pda,
                escrow: escrow_pda,
            },
            &self.settings.usdc_mint,
        )?;
        let submission = self.submit_or_handoff(instructions, &params.party_a).await?;

        Ok(InitializedContract {
            contract_pda,
            escrow_pda,
            submission,
        })
    }

    #[instrument(skip(self, params), fields(contract_id = %params.contract_id))]
    pub async fn fund_contract(&self, params: &FundContractParams) -> AppResult<Submission> {
        if !self.settings.non_custodial {
            self.require_signer()?;
        }

        info!(payer = %params.payer, amount = params.amount, side = ?params.side, "Funding contract");
        let instructions = self.instructions.fund_contract(params)?;
        self.submit_or_handoff(instructions, &params.payer).await
    }

    /// Settlement is always signed by the server key
    #[instrument(skip(self, params), fields(contract_id = %params.contract_id))]
    pub async fn settle_contract(
        &self,
        params: &SettleContractParams,
    ) -> AppResult<SettlementOutcome> {
        let signer = self.require_signer()?;
        let payer = signer.pubkey();

        info!(settlement_price = params.settlement_price, "Settling contract");
        let instructions = self.instructions.settle_contract(params, &payer)?;
        let signature = self.sign_and_send(&instructions, &payer, signer).await?;

        Ok(SettlementOutcome {
            price: params.settlement_price,
            payout: BTreeMap::new(),
            signature,
        })
    }

    /// Submit a transaction the user signed client-side
    pub async fn submit_signed_transaction(&self, signed_tx_base64: &str) -> AppResult<Signature> {
        let transaction = decode_signed(signed_tx_base64)?;
        self.send(&transaction).await
    }
}

#[async_trait]
impl SignatureStatusSource for SolanaClient {
    async fn signature_status(&self, signature: &Signature) -> AppResult<Option<ChainTxStatus>> {
        let signature = *signature;
        let statuses = self
            .rpc
            .execute(move |client| async move {
                client.get_signature_statuses(&[signature]).await
            })
            .await?;

        Ok(statuses
            .value
            .into_iter()
            .next()
            .flatten()
            .map(chain_status))
    }
}

fn chain_status(status: TransactionStatus) -> ChainTxStatus {
    ChainTxStatus {
        finalized: status.confirmation_status == Some(TransactionConfirmationStatus::Finalized),
        err: status.err.map(|e| format!("{:?}", e)),
    }
}

#[async_trait]
impl SettlementChain for SolanaClient {
    async fn fetch_account_data(&self, account: &Pubkey) -> AppResult<Vec<u8>> {
        SolanaClient::fetch_account_data(self, account).await
    }

    async fn settle_contract(&self, params: &SettleContractParams) -> AppResult<SettlementOutcome> {
        SolanaClient::settle_contract(self, params).await
    }
}

pub fn derive_contract_pda(
    program_id: &Pubkey,
    underlying_id: u8,
    strike: i64,
    expiry_ts: i64,
) -> Pubkey {
    let (pda, _bump) = Pubkey::find_program_address(
        &[
            CONTRACT_SEED,
            &underlying_id.to_le_bytes(),
            &strike.to_le_bytes(),
            &expiry_ts.to_le_bytes(),
        ],
        program_id,
    );
    pda
}

pub fn derive_escrow_pda(program_id: &Pubkey, contract: &Pubkey) -> Pubkey {
    let (pda, _bump) = Pubkey::find_program_address(&[ESCROW_SEED, contract.as_ref()], program_id);
    pda
}

fn encode_unsigned(message: Message) -> AppResult<String> {
    let transaction = Transaction::new_unsigned(message);
    let bytes = bincode::serialize(&transaction)
        .map_err(|e| AppError::Internal(format!("failed to serialize transaction: {}", e)))?;
    Ok(STANDARD.encode(bytes))
}

fn decode_signed(signed_tx_base64: &str) -> AppResult<Transaction> {
    let bytes = STANDARD
        .decode(signed_tx_base64.trim())
        .map_err(|_| AppError::InvalidInput("signed transaction is not valid base64".to_string()))?;
    let transaction: Transaction = bincode::deserialize(&bytes).map_err(|_| {
        AppError::InvalidInput("signed transaction could not be decoded".to_string())
    })?;

    if transaction.signatures.is_empty()
        || transaction
            .signatures
            .iter()
            .any(|sig| *sig == Signature::default())
    {
        return Err(AppError::InvalidInput(
            "transaction is missing required signatures".to_string(),
        ));
    }

    Ok(transaction)
}

/// Load a keypair stored as a JSON byte array
pub fn load_keypair(path: &str) -> AppResult<Keypair> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read keypair {}: {}", path, e)))?;
    let bytes: Vec<u8> = serde_json::from_str(&raw)
        .map_err(|e| AppError::Config(format!("keypair {} is not a byte array: {}", path, e)))?;
    Keypair::try_from(bytes.as_slice())
        .map_err(|e| AppError::Config(format!("invalid keypair {}: {}", path, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::instructions::{FundingSide, RiskExchangeInstructions};

    fn client(non_custodial: bool, signer: Option<Keypair>) -> SolanaClient {
        let program_id = Pubkey::new_unique();
        SolanaClient::connect(
            "http://127.0.0.1:9",
            None,
            SolanaSettings {
                program_id,
                usdc_mint: Pubkey::new_unique(),
                non_custodial,
            },
            signer,
            Arc::new(RiskExchangeInstructions::new(program_id)),
        )
    }

    fn status(confirmation: Option<TransactionConfirmationStatus>) -> TransactionStatus {
        TransactionStatus {
            slot: 42,
            confirmations: None,
            status: Ok(()),
            err: None,
            confirmation_status: confirmation,
        }
    }

    #[test]
    fn only_finalized_status_counts_as_final() {
        assert!(chain_status(status(Some(TransactionConfirmationStatus::Finalized))).finalized);
        assert!(!chain_status(status(Some(TransactionConfirmationStatus::Confirmed))).finalized);
        assert!(!chain_status(status(Some(TransactionConfirmationStatus::Processed))).finalized);
        assert!(!chain_status(status(None)).finalized);

        let confirmed = chain_status(status(Some(TransactionConfirmationStatus::Confirmed)));
        assert_eq!(confirmed.err, None);
    }

    #[test]
    fn pdas_follow_program_seeds() {
        let program_id = Pubkey::new_unique();
        let contract = derive_contract_pda(&program_id, 1, 45_000, 1_700_000_000);
        let (expected, _) = Pubkey::find_program_address(
            &[
                b"contract",
                &[1u8],
                &45_000i64.to_le_bytes(),
                &1_700_000_000i64.to_le_bytes(),
            ],
            &program_id,
        );
        assert_eq!(contract, expected);

        // Any term changes the address
        assert_ne!(
            contract,
            derive_contract_pda(&program_id, 1, 45_001, 1_700_000_000)
        );

        let escrow = derive_escrow_pda(&program_id, &contract);
        let (expected, _) =
            Pubkey::find_program_address(&[b"escrow", contract.as_ref()], &program_id);
        assert_eq!(escrow, expected);
    }

    #[test]
    fn unsigned_handoff_decodes_to_unsigned_transaction() {
        let payer = Pubkey::new_unique();
        let ix = Instruction::new_with_bytes(Pubkey::new_unique(), &[1, 2, 3], vec![]);
        let encoded = encode_unsigned(Message::new(&[ix], Some(&payer))).unwrap();

        let bytes = STANDARD.decode(encoded).unwrap();
        let tx: Transaction = bincode::deserialize(&bytes).unwrap();
        assert_eq!(tx.message.account_keys[0], payer);
        assert_eq!(tx.signatures, vec![Signature::default()]);

        // Not acceptable as a signed submission
        assert!(matches!(
            decode_signed(&STANDARD.encode(&bytes)),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn signed_transaction_round_trips() {
        let signer = Keypair::new();
        let ix = Instruction::new_with_bytes(Pubkey::new_unique(), &[9], vec![]);
        let mut tx =
            Transaction::new_unsigned(Message::new(&[ix], Some(&signer.pubkey())));
        tx.try_sign(&[&signer], Hash::default()).unwrap();

        let encoded = STANDARD.encode(bincode::serialize(&tx).unwrap());
        let decoded = decode_signed(&encoded).unwrap();
        assert_eq!(decoded.signatures, tx.signatures);

        assert!(matches!(
            decode_signed("%%%"),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn settlement_without_signer_is_a_config_error() {
        let params = SettleContractParams {
            contract_id: "c-1".to_string(),
            contract_pda: Pubkey::new_unique(),
            escrow_pda: Pubkey::new_unique(),
            oracle_feed: Pubkey::new_unique(),
            long_token_account: Some(Pubkey::new_unique()),
            short_token_account: Some(Pubkey::new_unique()),
            settlement_price: 45000.0,
        };

        let err = client(true, None).settle_contract(&params).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[tokio::test]
    async fn custodial_funding_without_signer_is_a_config_error() {
        let params = FundContractParams {
            contract_id: "c-1".to_string(),
            contract_pda: Pubkey::new_unique(),
            escrow_pda: Pubkey::new_unique(),
            payer: Pubkey::new_unique(),
            payer_token_account: Pubkey::new_unique(),
            side: FundingSide::A,
            amount: 10,
        };

        let err = client(false, None).fund_contract(&params).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn keypair_file_must_hold_a_byte_array() {
        let dir = std::env::temp_dir();
        let good = dir.join(format!("adapter-key-{}.json", std::process::id()));
        let keypair = Keypair::new();
        std::fs::write(
            &good,
            serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap(),
        )
        .unwrap();

        let loaded = load_keypair(good.to_str().unwrap()).unwrap();
        assert_eq!(loaded.pubkey(), keypair.pubkey());
        std::fs::remove_file(&good).unwrap();

        assert!(matches!(
            load_keypair("/nonexistent/key.json"),
            Err(AppError::Config(_))
        ));
    }
}

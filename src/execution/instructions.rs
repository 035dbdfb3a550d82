use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

use crate::error::{AppError, AppResult};
use crate::ledger::models::SettleContractParams;

/// SPL token program (TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA)
pub const TOKEN_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
    6, 221, 246, 225, 215, 101, 161, 147, 217, 203, 225, 70, 206, 235, 121, 172, 28, 180, 133,
    237, 95, 91, 55, 145, 58, 140, 245, 133, 126, 255, 0, 169,
]);

pub const SYSTEM_PROGRAM_ID: Pubkey = Pubkey::new_from_array([0; 32]);

/// Rent sysvar (SysvarRent111111111111111111111111111111111)
pub const RENT_SYSVAR_ID: Pubkey = Pubkey::new_from_array([
    6, 167, 213, 23, 25, 44, 92, 81, 33, 140, 201, 76, 61, 74, 241, 127, 88, 218, 238, 8, 155,
    161, 253, 68, 227, 219, 217, 138, 0, 0, 0, 0,
]);

pub const CONTRACT_SEED: &[u8] = b"contract";
pub const ESCROW_SEED: &[u8] = b"escrow";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingSide {
    A,
    B,
}

impl FundingSide {
    fn index(self) -> u8 {
        match self {
            FundingSide::A => 0,
            FundingSide::B => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InitializeContractParams {
    pub contract_id: String,
    pub underlying_id: u8,
    /// Fixed-point strike as stored on chain
    pub strike: i64,
    pub expiry_ts: i64,
    /// USDC base units
    pub notional: u64,
    pub party_a: Pubkey,
    pub party_b: Pubkey,
    pub oracle_feed: Pubkey,
}

#[derive(Debug, Clone)]
pub struct FundContractParams {
    pub contract_id: String,
    pub contract_pda: Pubkey,
    pub escrow_pda: Pubkey,
    pub payer: Pubkey,
    pub payer_token_account: Pubkey,
    pub side: FundingSide,
    pub amount: u64,
}

/// Addresses resolved by the chain client before building
#[derive(Debug, Clone, Copy)]
pub struct ContractAccounts {
    pub contract: Pubkey,
    pub escrow: Pubkey,
}

/// Builds program instructions. The chain client wraps the result in a
/// transaction and decides whether to sign it.
pub trait InstructionBuilder: Send + Sync {
    fn initialize_contract(
        &self,
        params: &InitializeContractParams,
        accounts: ContractAccounts,
        usdc_mint: &Pubkey,
    ) -> AppResult<Vec<Instruction>>;

    fn fund_contract(&self, params: &FundContractParams) -> AppResult<Vec<Instruction>>;

    fn settle_contract(
        &self,
        params: &SettleContractParams,
        payer: &Pubkey,
    ) -> AppResult<Vec<Instruction>>;
}

/// Anchor encoding for the risk-exchange program
#[derive(Debug, Clone)]
pub struct RiskExchangeInstructions {
    program_id: Pubkey,
}

impl RiskExchangeInstructions {
    pub fn new(program_id: Pubkey) -> Self {
        Self { program_id }
    }
}

/// First 8 bytes of sha256("global:<name>")
pub fn discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("global:{}", name).as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

fn instruction_data<T: borsh::BorshSerialize>(name: &str, args: &T) -> AppResult<Vec<u8>> {
    let mut data = discriminator(name).to_vec();
    let encoded = borsh::to_vec(args)
        .map_err(|e| AppError::Internal(format!("failed to encode {} args: {}", name, e)))?;
    data.extend_from_slice(&encoded);
    Ok(data)
}

impl InstructionBuilder for RiskExchangeInstructions {
    fn initialize_contract(
        &self,
        params: &InitializeContractParams,
        accounts: ContractAccounts,
        usdc_mint: &Pubkey,
    ) -> AppResult<Vec<Instruction>> {
        let data = instruction_data(
            "initialize_contract",
            &(
                params.underlying_id,
                params.strike,
                params.expiry_ts,
                params.notional,
            ),
        )?;

        Ok(vec![Instruction {
            program_id: self.program_id,
            accounts: vec![
                AccountMeta::new(accounts.contract, false),
                AccountMeta::new(accounts.escrow, false),
                AccountMeta::new(params.party_a, true),
                AccountMeta::new_readonly(params.party_b, false),
                AccountMeta::new_readonly(params.oracle_feed, false),
                AccountMeta::new_readonly(*usdc_mint, false),
                AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
                AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
                AccountMeta::new_readonly(RENT_SYSVAR_ID, false),
            ],
            data,
        }])
    }

    fn fund_contract(&self, params: &FundContractParams) -> AppResult<Vec<Instruction>> {
        if params.amount == 0 {
            return Err(AppError::InvalidInput(
                "funding amount must be positive".to_string(),
            ));
        }

        let data = instruction_data("fund_contract", &(params.side.index(), params.amount))?;

        Ok(vec![Instruction {
            program_id: self.program_id,
            accounts: vec![
                AccountMeta::new(params.contract_pda, false),
                AccountMeta::new(params.escrow_pda, false),
                AccountMeta::new(params.payer, true),
                AccountMeta::new(params.payer_token_account, false),
                AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            ],
            data,
        }])
    }

    fn settle_contract(
        &self,
        params: &SettleContractParams,
        payer: &Pubkey,
    ) -> AppResult<Vec<Instruction>> {
        let (long, short) = match (params.long_token_account, params.short_token_account) {
            (Some(long), Some(short)) => (long, short),
            _ => {
                return Err(AppError::InvalidInput(format!(
                    "contract {} has no long/short token accounts",
                    params.contract_id
                )))
            }
        };

        Ok(vec![Instruction {
            program_id: self.program_id,
            accounts: vec![
                AccountMeta::new(params.contract_pda, false),
                AccountMeta::new(params.escrow_pda, false),
                AccountMeta::new_readonly(params.oracle_feed, false),
                AccountMeta::new(long, false),
                AccountMeta::new(short, false),
                AccountMeta::new(*payer, true),
                AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            ],
            data: discriminator("settle_contract").to_vec(),
        }])
    }
}

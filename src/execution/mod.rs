pub mod confirmation;
pub mod instructions;
pub mod retry;
pub mod solana;

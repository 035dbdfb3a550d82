use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::DecodeError;

/// Minimum size of a price account snapshot
pub const MIN_ACCOUNT_LEN: usize = 200;
/// Maximum accepted age of a published price, in seconds
pub const MAX_STALENESS_SECS: i64 = 60;
/// Maximum accepted confidence interval, in raw price units
pub const MAX_CONFIDENCE: u64 = 1_000_000;

// Fixed little-endian field offsets of the price account
const EXPONENT_OFFSET: usize = 9;
const PRICE_OFFSET: usize = 13;
const CONFIDENCE_OFFSET: usize = 21;
const STATUS_OFFSET: usize = 29;
const PUBLISH_TIME_OFFSET: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PriceStatus {
    Unknown,
    Trading,
    Halted,
    Auction,
}

impl From<u8> for PriceStatus {
    fn from(value: u8) -> Self {
        match value {
            1 => PriceStatus::Trading,
            2 => PriceStatus::Halted,
            3 => PriceStatus::Auction,
            _ => PriceStatus::Unknown,
        }
    }
}

/// A validated price read from an oracle account. Never cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceQuote {
    pub raw_price: i64,
    pub exponent: i32,
    pub confidence: u64,
    pub status: PriceStatus,
    pub publish_time: i64,
    /// Exact `raw_price * 10^exponent`
    pub price: Decimal,
    pub decoded_price: f64,
}

/// Scale a fixed-point oracle value by a power of ten without going
/// through floating point. Returns `None` when the result is not
/// representable as a `Decimal`.
pub fn scale_price(raw: i64, exponent: i32) -> Option<Decimal> {
    if exponent <= 0 {
        Decimal::try_from_i128_with_scale(raw as i128, exponent.unsigned_abs()).ok()
    } else {
        let factor = 10i128.checked_pow(exponent as u32)?;
        let scaled = (raw as i128).checked_mul(factor)?;
        Decimal::try_from_i128_with_scale(scaled, 0).ok()
    }
}

fn read_array<const N: usize>(data: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&data[offset..offset + N]);
    out
}

/// Decode and validate a price account snapshot.
///
/// Checks run in a fixed order and the first failure wins: length,
/// trading status, staleness against `now` (Unix seconds), confidence.
pub fn decode(data: &[u8], now: i64) -> Result<PriceQuote, DecodeError> {
    if data.len() < MIN_ACCOUNT_LEN {
        return Err(DecodeError::TooShort { len: data.len() });
    }

    let exponent = i32::from_le_bytes(read_array(data, EXPONENT_OFFSET));
    let raw_price = i64::from_le_bytes(read_array(data, PRICE_OFFSET));
    let confidence = u64::from_le_bytes(read_array(data, CONFIDENCE_OFFSET));
    let status_byte = data[STATUS_OFFSET];
    let publish_time = i64::from_le_bytes(read_array(data, PUBLISH_TIME_OFFSET));

    let status = PriceStatus::from(status_byte);
    if status != PriceStatus::Trading {
        return Err(DecodeError::NotTrading {
            status: status_byte,
        });
    }

    let age_seconds = now.saturating_sub(publish_time);
    if age_seconds > MAX_STALENESS_SECS {
        return Err(DecodeError::Stale { age_seconds });
    }

    if confidence > MAX_CONFIDENCE {
        return Err(DecodeError::LowConfidence { confidence });
    }

    let price = scale_price(raw_price, exponent).ok_or(DecodeError::PriceOutOfRange { exponent })?;
    let decoded_price = price
        .to_f64()
        .ok_or(DecodeError::PriceOutOfRange { exponent })?;

    Ok(PriceQuote {
        raw_price,
        exponent,
        confidence,
        status,
        publish_time,
        price,
        decoded_price,
    })
}

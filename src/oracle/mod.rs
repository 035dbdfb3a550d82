pub mod feeds;
pub mod pyth_account;

pub use feeds::FeedRegistry;
pub use pyth_account::{decode, PriceQuote};

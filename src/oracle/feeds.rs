use solana_sdk::pubkey::Pubkey;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Default mainnet feeds used when a symbol is not configured
const DEFAULT_FEEDS: &[(&str, &str)] = &[
    ("BTC", "HovQMDrbAgAYPCmHVSrezcSmkMtXSSUsLDFANExrZh2J"),
    ("ETH", "JBu1AL4obBcCMqKBBxhpWCNUt136ijcuMZLFvTP7iWdB"),
];

/// Static mapping from asset symbol to oracle feed account.
/// Built once at startup and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedRegistry {
    feeds: BTreeMap<String, Pubkey>,
}

impl FeedRegistry {
    /// Parse `SYMBOL=address` pairs separated by commas, then fill in the
    /// defaults for any symbol left unset. Symbols are case-insensitive.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut feeds = BTreeMap::new();

        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (symbol, address) = entry
                .split_once('=')
                .ok_or_else(|| format!("malformed oracle feed entry '{}'", entry))?;
            let symbol = symbol.trim().to_ascii_uppercase();
            if symbol.is_empty() {
                return Err(format!("missing symbol in oracle feed entry '{}'", entry));
            }
            let feed = Pubkey::from_str(address.trim())
                .map_err(|e| format!("invalid oracle feed for {}: {}", symbol, e))?;
            if feeds.insert(symbol.clone(), feed).is_some() {
                return Err(format!("oracle feed for {} configured twice", symbol));
            }
        }

        for (symbol, address) in DEFAULT_FEEDS {
            if !feeds.contains_key(*symbol) {
                let feed = Pubkey::from_str(address)
                    .map_err(|e| format!("invalid default feed for {}: {}", symbol, e))?;
                feeds.insert(symbol.to_string(), feed);
            }
        }

        Ok(Self { feeds })
    }

    pub fn get(&self, symbol: &str) -> Option<Pubkey> {
        self.feeds.get(&symbol.to_ascii_uppercase()).copied()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.feeds.keys().map(String::as_str)
    }
}

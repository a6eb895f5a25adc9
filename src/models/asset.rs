//! Asset Catalogue
//!
//! Fixed list of supported assets. All trading pairs are quoted in the
//! hard-coded quote currency.

use serde::Serialize;

/// The quote currency for every trading pair.
pub const QUOTE_ASSET: &str = "USDC";

/// A supported asset and its declared precision.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AssetInfo {
    pub symbol: &'static str,
    pub name: &'static str,
    pub decimals: u32,
    #[serde(rename = "type")]
    pub asset_type: &'static str,
}

/// The fixed asset catalogue.
pub const ASSETS: &[AssetInfo] = &[
    AssetInfo {
        symbol: "USDC",
        name: "USD Coin",
        decimals: 6,
        asset_type: "stablecoin",
    },
    AssetInfo {
        symbol: "USDT",
        name: "Tether USD",
        decimals: 6,
        asset_type: "stablecoin",
    },
    AssetInfo {
        symbol: "ETH",
        name: "Ethereum",
        decimals: 18,
        asset_type: "crypto",
    },
    AssetInfo {
        symbol: "BTC",
        name: "Bitcoin",
        decimals: 8,
        asset_type: "crypto",
    },
    AssetInfo {
        symbol: "DAI",
        name: "Dai Stablecoin",
        decimals: 18,
        asset_type: "stablecoin",
    },
];

/// Look up an asset by symbol.
pub fn lookup(symbol: &str) -> Option<&'static AssetInfo> {
    ASSETS.iter().find(|a| a.symbol == symbol)
}

/// Decimals of the quote currency.
pub fn quote_decimals() -> u32 {
    lookup(QUOTE_ASSET).map(|a| a.decimals).unwrap_or(6)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("ETH").unwrap().decimals, 18);
        assert_eq!(lookup("USDC").unwrap().asset_type, "stablecoin");
        assert!(lookup("DOGE").is_none());
    }

    #[test]
    fn test_quote_asset_in_catalogue() {
        assert!(lookup(QUOTE_ASSET).is_some());
        assert_eq!(quote_decimals(), 6);
    }
}

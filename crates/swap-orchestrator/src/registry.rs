use std::{
    collections::{BTreeMap, HashMap},
    str::FromStr,
};

use bigdecimal::{BigDecimal, ToPrimitive, Zero, num_bigint::BigInt};
use serde::{Deserialize, Serialize};

use crate::{
    FeeTier,
    error::{AmountError, RegistryError},
};

/// Metadata of a token that can be swapped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Ticker symbol, e.g. `ETH`
    pub symbol: String,
    pub name: String,
    /// Contract address, or the native currency placeholder address
    pub address: String,
    /// Number of decimals the token uses
    pub decimals: u32,
}

impl TokenInfo {
    /// The registry key of the token, which is also how it is referred to in
    /// the swap context.
    pub fn key(&self) -> String {
        self.symbol.to_lowercase()
    }
}

/// Read-only, closed set of tokens the orchestrator accepts. Symbols are
/// matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    tokens: HashMap<String, TokenInfo>,
}

impl TokenRegistry {
    pub fn new(tokens: impl IntoIterator<Item = TokenInfo>) -> Self {
        Self {
            tokens: tokens
                .into_iter()
                .map(|token| (token.key(), token))
                .collect(),
        }
    }

    /// The tokens commonly traded on Ethereum mainnet
    pub fn default_mainnet() -> Self {
        Self::new([
            token(
                "ETH",
                "Ether",
                "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE",
                18,
            ),
            token(
                "WETH",
                "Wrapped Ether",
                "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2",
                18,
            ),
            token(
                "USDC",
                "USD Coin",
                "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
                6,
            ),
            token(
                "DAI",
                "Dai Stablecoin",
                "0x6B175474E89094C44Da98b954EedeAC495271d0F",
                18,
            ),
            token(
                "WBTC",
                "Wrapped BTC",
                "0x2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599",
                8,
            ),
        ])
    }

    pub fn get(&self, symbol: &str) -> Option<&TokenInfo> {
        self.tokens.get(&symbol.trim().to_lowercase())
    }

    pub fn resolve(&self, symbol: &str) -> Result<&TokenInfo, RegistryError> {
        self.get(symbol)
            .ok_or_else(|| RegistryError::UnknownToken(symbol.trim().to_string()))
    }

    /// All tokens, ordered by symbol
    pub fn tokens(&self) -> Vec<&TokenInfo> {
        let mut tokens: Vec<_> = self.tokens.values().collect();
        tokens.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        tokens
    }
}

fn token(symbol: &str, name: &str, address: &str, decimals: u32) -> TokenInfo {
    TokenInfo {
        symbol: symbol.to_string(),
        name: name.to_string(),
        address: address.to_string(),
        decimals,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTierInfo {
    pub label: String,
    pub description: String,
}

/// Display information of the fee tiers
#[derive(Debug, Clone)]
pub struct FeeTierTable {
    tiers: BTreeMap<FeeTier, FeeTierInfo>,
}

impl Default for FeeTierTable {
    fn default() -> Self {
        let info = |label: &str, description: &str| FeeTierInfo {
            label: label.to_string(),
            description: description.to_string(),
        };
        Self {
            tiers: BTreeMap::from([
                (FeeTier::Low, info("0.05%", "Best for stable pairs")),
                (FeeTier::Medium, info("0.3%", "Best for most pairs")),
                (FeeTier::High, info("1%", "Best for exotic pairs")),
            ]),
        }
    }
}

impl FeeTierTable {
    pub fn new(tiers: impl IntoIterator<Item = (FeeTier, FeeTierInfo)>) -> Self {
        Self {
            tiers: tiers.into_iter().collect(),
        }
    }

    pub fn get(&self, tier: FeeTier) -> Option<&FeeTierInfo> {
        self.tiers.get(&tier)
    }
}

/// Converts a human-readable decimal amount into the smallest denomination of
/// a token with `decimals` decimals, without going through floating point.
///
/// Only plain decimals are accepted: an optional sign, digits and at most one
/// decimal point. Exponent notation is rejected before any big number
/// arithmetic runs.
pub fn parse_units(amount: &str, decimals: u32) -> Result<u128, AmountError> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(AmountError::Empty);
    }
    let (sign, unsigned) = match amount.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", amount.strip_prefix('+').unwrap_or(amount)),
    };
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !is_digits(whole) || !is_digits(fraction) {
        return Err(AmountError::NotANumber);
    }
    let normalized = format!(
        "{sign}{}.{}",
        if whole.is_empty() { "0" } else { whole },
        if fraction.is_empty() { "0" } else { fraction }
    );
    let value = BigDecimal::from_str(&normalized).map_err(|_| AmountError::NotANumber)?;
    if value <= BigDecimal::zero() {
        return Err(AmountError::NotPositive);
    }

    let significant_fraction = fraction.trim_end_matches('0').len();
    if !u32::try_from(significant_fraction).is_ok_and(|digits| digits <= decimals) {
        return Err(AmountError::TooPrecise { decimals });
    }
    // u128::MAX has 39 digits
    if whole.trim_start_matches('0').len() > 39 {
        return Err(AmountError::TooLarge);
    }

    let scaled = value * BigDecimal::new(BigInt::from(1), -i64::from(decimals));
    let truncated = scaled.with_scale(0);
    if truncated != scaled {
        return Err(AmountError::TooPrecise { decimals });
    }
    let (units, _) = truncated.into_bigint_and_exponent();
    units.to_u128().ok_or(AmountError::TooLarge)
}

/// Formats an amount in the smallest denomination as a decimal string in
/// whole units, dropping trailing zeros.
pub fn format_units(value: u128, decimals: u32) -> String {
    let Some(divisor) = 10u128.checked_pow(decimals) else {
        return value.to_string();
    };
    let whole = value.checked_div(divisor).unwrap_or_default();
    let fraction = value.checked_rem(divisor).unwrap_or_default();
    if fraction == 0 {
        return whole.to_string();
    }
    let width = usize::try_from(decimals).unwrap_or_default();
    let fraction = format!("{fraction:0width$}");
    format!("{whole}.{}", fraction.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup_is_case_insensitive() {
        let registry = TokenRegistry::default_mainnet();
        assert_eq!(registry.get("eth").unwrap().decimals, 18);
        assert_eq!(registry.get(" USDC ").unwrap().decimals, 6);
        assert_eq!(registry.resolve("Usdc").unwrap().key(), "usdc");
        assert_eq!(
            registry.resolve("doge"),
            Err(RegistryError::UnknownToken("doge".to_string()))
        );
    }

    #[test]
    fn test_registry_tokens_sorted() {
        let registry = TokenRegistry::default_mainnet();
        let symbols: Vec<_> = registry.tokens().iter().map(|t| t.symbol.clone()).collect();
        assert_eq!(symbols, vec!["DAI", "ETH", "USDC", "WBTC", "WETH"]);
    }

    #[test]
    fn test_fee_tier_table_default() {
        let table = FeeTierTable::default();
        assert_eq!(table.get(FeeTier::Medium).unwrap().label, "0.3%");
        assert!(FeeTier::ALL.iter().all(|tier| table.get(*tier).is_some()));
        assert_eq!(table.get(FeeTier::Low).unwrap().label, "0.05%");
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_units("1.5", 18), Ok(1_500_000_000_000_000_000));
        assert_eq!(parse_units("2", 6), Ok(2_000_000));
        assert_eq!(parse_units("0.000001", 6), Ok(1));
        assert_eq!(parse_units(" 10.50 ", 6), Ok(10_500_000));
        assert_eq!(parse_units(".5", 6), Ok(500_000));
        assert_eq!(parse_units("3.", 6), Ok(3_000_000));
        assert_eq!(parse_units("+2", 0), Ok(2));
        assert_eq!(parse_units("1.000000000", 6), Ok(1_000_000));
    }

    #[test]
    fn test_parse_units_rejections() {
        assert_eq!(parse_units("", 18), Err(AmountError::Empty));
        assert_eq!(parse_units("   ", 18), Err(AmountError::Empty));
        assert_eq!(parse_units("abc", 18), Err(AmountError::NotANumber));
        assert_eq!(parse_units("1.2.3", 18), Err(AmountError::NotANumber));
        assert_eq!(parse_units(".", 18), Err(AmountError::NotANumber));
        assert_eq!(parse_units("1e3", 18), Err(AmountError::NotANumber));
        assert_eq!(parse_units("--1", 18), Err(AmountError::NotANumber));
        assert_eq!(parse_units("1 000", 18), Err(AmountError::NotANumber));
        assert_eq!(parse_units("0", 18), Err(AmountError::NotPositive));
        assert_eq!(parse_units("0.000", 18), Err(AmountError::NotPositive));
        assert_eq!(parse_units("-1", 18), Err(AmountError::NotPositive));
        assert_eq!(
            parse_units("0.0000001", 6),
            Err(AmountError::TooPrecise { decimals: 6 })
        );
        assert_eq!(
            parse_units("1000000000000000000000000", 18),
            Err(AmountError::TooLarge)
        );
        assert_eq!(
            parse_units(&format!("1{}", "0".repeat(100_000)), 0),
            Err(AmountError::TooLarge)
        );
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(1_500_000, 6), "1.5");
        assert_eq!(format_units(2_000_000, 6), "2");
        assert_eq!(format_units(1, 6), "0.000001");
        assert_eq!(format_units(0, 18), "0");
        assert_eq!(format_units(42, 0), "42");
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use swap_orchestrator::{FeeTier, SwapConfig};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    pub log_filter: String,
    pub swap: SwapConfig,
    pub wallet: WalletConfig,
    pub backend: BackendConfig,
}

/// The simulated user wallet
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WalletConfig {
    /// Receives the bought tokens unless another recipient is given
    pub address: String,
    /// Starting balances in whole units, by token symbol
    pub balances: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BackendConfig {
    pub quote_delay_ms: u64,
    pub submit_delay_ms: u64,
    pub confirmation_delay_ms: u64,
    /// Adverse price movement between submission and confirmation, in basis
    /// points. Anything above the slippage tolerance makes swaps revert.
    pub price_drift_bps: u32,
    pub pools: Vec<PoolConfig>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PoolConfig {
    pub token_a: String,
    pub token_b: String,
    pub fee: FeeTier,
    /// Reserves in whole units
    pub reserve_a: String,
    pub reserve_b: String,
}

pub const DEFAULT_CONFIG: &str = r#"
log_filter: "swap_orchestrator=debug,swap_cli=debug,info"
swap:
  default_token_in: "eth"
  default_token_out: "usdc"
  default_fee: "medium"
  max_slippage_bps: 50
  quote_timeout_secs: 15
  confirmation_timeout_secs: 120
wallet:
  address: "0x8ba1f109551bD432803012645Ac136ddd64DBA72"
  balances:
    eth: "10"
    usdc: "25000"
    dai: "1000"
backend:
  quote_delay_ms: 400
  submit_delay_ms: 800
  confirmation_delay_ms: 2500
  price_drift_bps: 0
  pools:
    - token_a: "eth"
      token_b: "usdc"
      fee: "medium"
      reserve_a: "5000"
      reserve_b: "15000000"
    - token_a: "eth"
      token_b: "usdc"
      fee: "low"
      reserve_a: "800"
      reserve_b: "2400000"
    - token_a: "eth"
      token_b: "dai"
      fee: "medium"
      reserve_a: "1200"
      reserve_b: "3600000"
    - token_a: "usdc"
      token_b: "dai"
      fee: "low"
      reserve_a: "4000000"
      reserve_b: "4000000"
    - token_a: "wbtc"
      token_b: "eth"
      fee: "medium"
      reserve_a: "150"
      reserve_b: "3000"
    - token_a: "eth"
      token_b: "weth"
      fee: "low"
      reserve_a: "10000"
      reserve_b: "10000"
"#;

#[cfg(test)]
mod tests {
    use figment::{
        Figment,
        providers::{Format, Yaml},
    };

    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config: Config = Figment::new()
            .merge(Yaml::string(DEFAULT_CONFIG))
            .extract()
            .unwrap();
        assert_eq!(config.swap, swap_orchestrator::default_config());
        assert_eq!(config.backend.pools.len(), 6);
        assert_eq!(config.backend.pools[1].fee, FeeTier::Low);
        assert_eq!(config.wallet.balances["eth"], "10");
    }

    #[test]
    fn test_yaml_overrides_defaults() {
        let config: Config = Figment::new()
            .merge(Yaml::string(DEFAULT_CONFIG))
            .merge(Yaml::string("swap:\n  max_slippage_bps: 100\n"))
            .extract()
            .unwrap();
        assert_eq!(config.swap.max_slippage_bps, 100);
        assert_eq!(config.swap.default_fee, FeeTier::Medium);
    }
}

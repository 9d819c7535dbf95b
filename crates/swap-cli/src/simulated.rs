use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use bigdecimal::{ToPrimitive, num_bigint::BigUint};
use rand::RngCore;
use swap_orchestrator::{
    ConfirmationError, ConfirmationWatcher, FeeTier, QuoteError, QuoteRequest, QuoteService,
    SubmitError, SwapRequest, SwapSubmitter, TokenRegistry, parse_units,
};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

use crate::config::{BackendConfig, WalletConfig};

/// Recipient that makes the simulated wallet decline the signature request
pub const REJECTING_RECIPIENT: &str = "reject";

/// Pool fees are expressed in hundredths of a basis point
const PIPS_DENOMINATOR: u32 = 1_000_000;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct PoolKey {
    tokens: (String, String),
    fee: FeeTier,
}

impl PoolKey {
    fn new(token_a: &str, token_b: &str, fee: FeeTier) -> Self {
        let tokens = if token_a <= token_b {
            (token_a.to_string(), token_b.to_string())
        } else {
            (token_b.to_string(), token_a.to_string())
        };
        Self { tokens, fee }
    }
}

/// A constant product pool
#[derive(Clone, Debug)]
struct Pool {
    reserves: HashMap<String, u128>,
}

impl Pool {
    /// Output of selling `amount_in` of `token_in`, keeping `x * y = k` after the pool fee
    fn amount_out(&self, token_in: &str, token_out: &str, amount_in: u128, fee: FeeTier) -> u128 {
        let reserve_in = BigUint::from(self.reserves.get(token_in).copied().unwrap_or_default());
        let reserve_out = BigUint::from(self.reserves.get(token_out).copied().unwrap_or_default());
        let amount_in_after_fee = BigUint::from(amount_in)
            * BigUint::from(PIPS_DENOMINATOR.saturating_sub(fee.pips()))
            / BigUint::from(PIPS_DENOMINATOR);
        let denominator = reserve_in + &amount_in_after_fee;
        if denominator == BigUint::ZERO {
            return 0;
        }
        (reserve_out * amount_in_after_fee / denominator)
            .to_u128()
            .unwrap_or_default()
    }
}

/// Outcome of a mined transaction, `None` while it is pending
type Receipt = Option<Result<(), ConfirmationError>>;

#[derive(Default)]
struct State {
    pools: HashMap<PoolKey, Pool>,
    balances: HashMap<String, u128>,
    transactions: HashMap<String, watch::Receiver<Receipt>>,
}

impl State {
    /// Mines a submitted swap against the current pool reserves
    fn settle(
        &mut self,
        tx_hash: &str,
        request: &SwapRequest,
        price_drift_bps: u32,
    ) -> Result<(), ConfirmationError> {
        let reverted = || ConfirmationError::Reverted {
            tx_hash: tx_hash.to_string(),
        };
        let key = PoolKey::new(&request.token_in, &request.token_out, request.fee);
        let pool = self.pools.get_mut(&key).ok_or_else(reverted)?;

        let amount_out = drifted(
            pool.amount_out(
                &request.token_in,
                &request.token_out,
                request.amount_in,
                request.fee,
            ),
            price_drift_bps,
        );
        if amount_out < request.min_amount_out {
            info!(
                "Transaction {tx_hash} reverted: output {amount_out} below minimum {}",
                request.min_amount_out
            );
            return Err(reverted());
        }
        let balance_in = self.balances.get(&request.token_in).copied().unwrap_or_default();
        if balance_in < request.amount_in {
            info!("Transaction {tx_hash} reverted: insufficient {}", request.token_in);
            return Err(reverted());
        }

        let reserve_in = pool.reserves.entry(request.token_in.clone()).or_default();
        *reserve_in = reserve_in.saturating_add(request.amount_in);
        let reserve_out = pool.reserves.entry(request.token_out.clone()).or_default();
        *reserve_out = reserve_out.saturating_sub(amount_out);

        self.balances
            .insert(request.token_in.clone(), balance_in.saturating_sub(request.amount_in));
        let balance_out = self.balances.entry(request.token_out.clone()).or_default();
        *balance_out = balance_out.saturating_add(amount_out);

        info!("Transaction {tx_hash} confirmed, received {amount_out}");
        Ok(())
    }
}

/// Applies an adverse price move of `price_drift_bps`
fn drifted(amount_out: u128, price_drift_bps: u32) -> u128 {
    amount_out
        .saturating_mul(10_000u128.saturating_sub(u128::from(price_drift_bps)))
        .saturating_div(10_000)
}

/// An in-memory DEX and wallet standing in for the quote, wallet and chain
/// services.
///
/// Submitted transactions are mined by the backend itself after the
/// confirmation delay, whether or not anyone watches them.
pub struct SimulatedBackend {
    config: BackendConfig,
    state: Arc<Mutex<State>>,
}

impl SimulatedBackend {
    pub fn new(
        config: BackendConfig,
        wallet: &WalletConfig,
        registry: &TokenRegistry,
    ) -> Result<Self> {
        let units = |symbol: &str, amount: &str| -> Result<(String, u128)> {
            let token = registry.resolve(symbol)?;
            let value = parse_units(amount, token.decimals)
                .map_err(|e| anyhow!("Invalid amount {amount} of {symbol}: {e}"))?;
            Ok((token.key(), value))
        };

        let mut state = State::default();
        for pool in &config.pools {
            let (token_a, reserve_a) = units(&pool.token_a, &pool.reserve_a)?;
            let (token_b, reserve_b) = units(&pool.token_b, &pool.reserve_b)?;
            state.pools.insert(
                PoolKey::new(&token_a, &token_b, pool.fee),
                Pool {
                    reserves: HashMap::from([(token_a, reserve_a), (token_b, reserve_b)]),
                },
            );
        }
        for (symbol, amount) in &wallet.balances {
            let (token, balance) = units(symbol, amount)?;
            state.balances.insert(token, balance);
        }

        Ok(Self {
            config,
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// The simulated wallet balances, in the smallest denomination
    pub async fn balances(&self) -> HashMap<String, u128> {
        self.state.lock().await.balances.clone()
    }

    fn new_tx_hash() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        format!("0x{}", hex::encode(bytes))
    }

    /// Mines the transaction once the confirmation delay passed
    fn spawn_miner(&self, tx_hash: String, request: SwapRequest, receipt: watch::Sender<Receipt>) {
        let state = self.state.clone();
        let delay = Duration::from_millis(self.config.confirmation_delay_ms);
        let price_drift_bps = self.config.price_drift_bps;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let outcome = state
                .lock()
                .await
                .settle(&tx_hash, &request, price_drift_bps);
            receipt.send_replace(Some(outcome));
        });
    }
}

#[async_trait::async_trait]
impl QuoteService for SimulatedBackend {
    async fn quote(&self, request: &QuoteRequest) -> Result<u128, QuoteError> {
        tokio::time::sleep(Duration::from_millis(self.config.quote_delay_ms)).await;
        let state = self.state.lock().await;
        let key = PoolKey::new(&request.token_in, &request.token_out, request.fee);
        let pool = state.pools.get(&key).ok_or_else(|| {
            QuoteError::UnsupportedPair(format!(
                "{}/{} ({} fee tier)",
                request.token_in, request.token_out, request.fee
            ))
        })?;
        let amount_out = pool.amount_out(
            &request.token_in,
            &request.token_out,
            request.amount_in,
            request.fee,
        );
        if amount_out == 0 {
            return Err(QuoteError::InsufficientLiquidity {
                token_in: request.token_in.clone(),
                token_out: request.token_out.clone(),
            });
        }
        debug!("Quoted {amount_out} for {request:?}");
        Ok(amount_out)
    }
}

#[async_trait::async_trait]
impl SwapSubmitter for SimulatedBackend {
    async fn submit(&self, request: &SwapRequest) -> Result<String, SubmitError> {
        tokio::time::sleep(Duration::from_millis(self.config.submit_delay_ms)).await;
        if request.recipient == REJECTING_RECIPIENT {
            return Err(SubmitError::UserRejected);
        }
        let mut state = self.state.lock().await;
        let balance = state
            .balances
            .get(&request.token_in)
            .copied()
            .unwrap_or_default();
        if balance < request.amount_in {
            return Err(SubmitError::Execution(format!(
                "insufficient {} balance",
                request.token_in
            )));
        }

        let tx_hash = Self::new_tx_hash();
        info!("Submitted swap transaction {tx_hash}");
        let (sender, receiver) = watch::channel(None);
        state.transactions.insert(tx_hash.clone(), receiver);
        self.spawn_miner(tx_hash.clone(), request.clone(), sender);
        Ok(tx_hash)
    }
}

#[async_trait::async_trait]
impl ConfirmationWatcher for SimulatedBackend {
    async fn wait_for_confirmation(&self, tx_hash: &str) -> Result<(), ConfirmationError> {
        let mut receipt = self
            .state
            .lock()
            .await
            .transactions
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| ConfirmationError::Watcher(format!("Unknown transaction {tx_hash}")))?;
        let mined = receipt
            .wait_for(Option::is_some)
            .await
            .map_err(|e| ConfirmationError::Watcher(e.to_string()))?;
        match &*mined {
            Some(outcome) => outcome.clone(),
            None => Err(ConfirmationError::Watcher(format!(
                "Transaction {tx_hash} was dropped"
            ))),
        }
    }
}

use thiserror::Error;

/// Error type for the `SwapOrchestrator`
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SwapError {
    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The event is not accepted in the current state or context
    #[error("Event rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Error: {0}")]
    Generic(String),
}

/// Why the swap machine refused an input. A rejected input never changes the
/// state or the context.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("{event} is not accepted while {state}")]
    NotAllowed {
        event: &'static str,
        state: &'static str,
    },

    #[error("No quote available for the current inputs")]
    MissingQuote,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid value {value:?} for {field}")]
    InvalidValue { field: String, value: String },

    #[error("A recipient is required to execute a swap")]
    MissingRecipient,

    /// A submission or confirmation failure is still shown. The previous
    /// transaction may yet be mined, so it has to be reset first.
    #[error("Reset before executing again: {0}")]
    UnacknowledgedFailure(String),

    #[error("Unknown token: {0}")]
    UnknownToken(String),

    /// The completion belongs to an invocation that is no longer active
    #[error("Stale result of invocation {invocation}")]
    Stale { invocation: u64 },
}

impl From<RegistryError> for Rejection {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::UnknownToken(symbol) => Rejection::UnknownToken(symbol),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown token: {0}")]
    UnknownToken(String),
}

/// Local amount validation failures. The messages are shown next to the
/// amount field as they are.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Enter an amount")]
    Empty,

    #[error("Amount must be a number")]
    NotANumber,

    #[error("Amount must be greater than 0")]
    NotPositive,

    #[error("Amount has more than {decimals} decimal places")]
    TooPrecise { decimals: u32 },

    #[error("Amount is too large")]
    TooLarge,

    #[error("Insufficient {symbol} balance")]
    InsufficientBalance { symbol: String, balance: u128 },
}

/// Failure reported by a `QuoteService`
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuoteError {
    #[error("Insufficient liquidity for {token_in}/{token_out}")]
    InsufficientLiquidity { token_in: String, token_out: String },

    #[error("Unsupported pair: {0}")]
    UnsupportedPair(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Quote timed out after {0}s")]
    Timeout(u32),

    #[error("{0}")]
    Generic(String),
}

/// Failure reported by a `SwapSubmitter`
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The user declined the approval or the swap in their wallet. This is a
    /// silent cancellation, not a failure to surface.
    #[error("User rejected the request")]
    UserRejected,

    #[error("Token approval failed: {0}")]
    Approval(String),

    #[error("{0}")]
    Execution(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failure reported by a `ConfirmationWatcher`
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfirmationError {
    #[error("Transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },

    #[error("Timed out after {0}s waiting for the transaction to be mined")]
    Timeout(u32),

    #[error("Watcher error: {0}")]
    Watcher(String),
}

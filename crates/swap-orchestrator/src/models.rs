use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfirmationError, QuoteError, SubmitError, SwapError};

/// Default maximum slippage applied to a quote when executing a swap, in basis points (0.5%)
pub const DEFAULT_MAX_SLIPPAGE_BPS: u32 = 50;
/// Default timeout for a single quote request in seconds
pub const DEFAULT_QUOTE_TIMEOUT_SECS: u32 = 15;
/// Default timeout for waiting on a submitted transaction to be mined in seconds
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u32 = 120;

/// Liquidity pool fee tier a swap is routed through.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum FeeTier {
    /// 0.05%
    Low,
    /// 0.3%
    #[default]
    Medium,
    /// 1%
    High,
}

impl FeeTier {
    pub const ALL: [FeeTier; 3] = [FeeTier::Low, FeeTier::Medium, FeeTier::High];

    /// The pool fee in hundredths of a basis point.
    pub fn pips(self) -> u32 {
        match self {
            FeeTier::Low => 500,
            FeeTier::Medium => 3_000,
            FeeTier::High => 10_000,
        }
    }
}

impl fmt::Display for FeeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeeTier::Low => write!(f, "low"),
            FeeTier::Medium => write!(f, "medium"),
            FeeTier::High => write!(f, "high"),
        }
    }
}

impl FromStr for FeeTier {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "500" => Ok(FeeTier::Low),
            "medium" | "3000" => Ok(FeeTier::Medium),
            "high" | "10000" => Ok(FeeTier::High),
            other => Err(SwapError::InvalidInput(format!("Unknown fee tier: {other}"))),
        }
    }
}

/// The user-editable inputs of a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SwapField {
    TokenIn,
    TokenOut,
    Amount,
    Fee,
}

impl fmt::Display for SwapField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapField::TokenIn => write!(f, "tokenIn"),
            SwapField::TokenOut => write!(f, "tokenOut"),
            SwapField::Amount => write!(f, "amount"),
            SwapField::Fee => write!(f, "fee"),
        }
    }
}

impl FromStr for SwapField {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', '_'], "");
        match normalized.as_str() {
            "tokenin" | "in" => Ok(SwapField::TokenIn),
            "tokenout" | "out" => Ok(SwapField::TokenOut),
            "amount" => Ok(SwapField::Amount),
            "fee" | "feetier" => Ok(SwapField::Fee),
            _ => Err(SwapError::InvalidInput(format!("Unknown swap field: {s}"))),
        }
    }
}

/// A local validation failure attached to a single input field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: SwapField,
    pub message: String,
}

/// The asynchronous step a failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailurePhase {
    Quote,
    Submission,
    /// The transaction was sent, so gas or funds may already have been spent.
    Confirmation,
}

/// A failure of one of the asynchronous swap steps, kept on the context until
/// the user acknowledges it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapFailure {
    pub phase: FailurePhase,
    pub message: String,
}

impl fmt::Display for SwapFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.phase {
            FailurePhase::Quote => write!(f, "Failed to fetch quote: {}", self.message),
            FailurePhase::Submission => write!(f, "Swap submission failed: {}", self.message),
            FailurePhase::Confirmation => {
                write!(f, "Swap failed after submission: {}", self.message)
            }
        }
    }
}

impl From<QuoteError> for SwapFailure {
    fn from(e: QuoteError) -> Self {
        SwapFailure {
            phase: FailurePhase::Quote,
            message: e.to_string(),
        }
    }
}

impl From<SubmitError> for SwapFailure {
    fn from(e: SubmitError) -> Self {
        SwapFailure {
            phase: FailurePhase::Submission,
            message: e.to_string(),
        }
    }
}

impl From<ConfirmationError> for SwapFailure {
    fn from(e: ConfirmationError) -> Self {
        SwapFailure {
            phase: FailurePhase::Confirmation,
            message: e.to_string(),
        }
    }
}

/// The single mutable record owned by the orchestrator for one swap attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapContext {
    /// Registry symbol of the token being sold
    pub token_in: Option<String>,
    /// Registry symbol of the token being bought
    pub token_out: Option<String>,
    /// The amount as typed by the user, in whole units of `token_in`
    pub amount: String,
    pub fee: FeeTier,
    /// Expected output of the last quote, in the smallest denomination of `token_out`
    pub quote: Option<u128>,
    pub field_error: Option<FieldError>,
    pub submit_error: Option<SwapFailure>,
    /// Set whenever the inputs changed since the last quote fetch
    pub dirty: bool,
    pub tx_hash: Option<String>,
}

impl SwapContext {
    pub fn initial(token_in: Option<String>, token_out: Option<String>, fee: FeeTier) -> Self {
        Self {
            token_in,
            token_out,
            fee,
            ..Default::default()
        }
    }

    /// The one error message to show to the user. Local validation takes
    /// precedence over network failures.
    pub fn surfaced_error(&self) -> Option<String> {
        self.field_error
            .as_ref()
            .map(|e| e.message.clone())
            .or_else(|| self.submit_error.as_ref().map(ToString::to_string))
    }
}

/// Input of the quote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub token_in: String,
    pub token_out: String,
    /// The amount to sell, in the smallest denomination of `token_in`
    pub amount_in: u128,
    pub fee: FeeTier,
}

/// Input of the swap submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    pub token_in: String,
    pub token_out: String,
    pub amount_in: u128,
    pub fee: FeeTier,
    /// The account receiving the bought tokens
    pub recipient: String,
    /// The quoted output the swap was executed against
    pub expected_amount_out: u128,
    /// The least output the swap may settle for, after slippage tolerance
    pub min_amount_out: u128,
}

/// The states of a swap. Each variant only carries what that state needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SwapState {
    /// No operation outstanding
    Idle,
    LoadingQuote { request: QuoteRequest },
    Submitting { request: SwapRequest },
    AwaitingBlockchainConfirmation { tx_hash: String },
    /// Terminal until reset
    Confirmed { tx_hash: String },
}

impl SwapState {
    pub fn name(&self) -> &'static str {
        match self {
            SwapState::Idle => "idle",
            SwapState::LoadingQuote { .. } => "loadingQuote",
            SwapState::Submitting { .. } => "submitting",
            SwapState::AwaitingBlockchainConfirmation { .. } => "awaitingBlockchainConfirmation",
            SwapState::Confirmed { .. } => "confirmed",
        }
    }

    /// Whether an asynchronous operation is outstanding in this state
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SwapState::LoadingQuote { .. }
                | SwapState::Submitting { .. }
                | SwapState::AwaitingBlockchainConfirmation { .. }
        )
    }
}

impl fmt::Display for SwapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Events accepted from the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapEvent {
    /// Edit one input field
    Change { field: SwapField, value: String },
    /// Reverse the swap direction
    SwapTokens,
    /// Execute the current quote on behalf of `recipient`
    ExecuteSwap { recipient: String },
    /// Forget the current swap. Never aborts a transaction that was already sent.
    Reset,
    /// Externally known balance of `token`, in its smallest denomination
    SetBalance { token: String, amount: u128 },
}

impl SwapEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SwapEvent::Change { .. } => "CHANGE",
            SwapEvent::SwapTokens => "SWAP_TOKENS",
            SwapEvent::ExecuteSwap { .. } => "EXECUTE_SWAP",
            SwapEvent::Reset => "RESET",
            SwapEvent::SetBalance { .. } => "SET_BALANCE",
        }
    }
}

impl fmt::Display for SwapEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapEvent::Change { field, value } => write!(f, "CHANGE({field}, {value:?})"),
            SwapEvent::ExecuteSwap { recipient } => write!(f, "EXECUTE_SWAP({recipient})"),
            SwapEvent::SetBalance { token, amount } => write!(f, "SET_BALANCE({token}, {amount})"),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// What the UI renders: the current state and the full context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapSnapshot {
    pub state: SwapState,
    pub context: SwapContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapConfig {
    /// Symbol selected as the input token on start and after every reset
    pub default_token_in: Option<String>,
    /// Symbol selected as the output token on start and after every reset
    pub default_token_out: Option<String>,
    pub default_fee: FeeTier,
    /// Maximum slippage in basis points (1/100 of a percent) tolerated when
    /// executing a quote. The swap reverts if it would receive less than
    /// `quote * (1 - max_slippage_bps / 10_000)`.
    pub max_slippage_bps: u32,
    pub quote_timeout_secs: u32,
    /// Time to wait for a submitted transaction to be mined before reporting
    /// a confirmation failure. The transaction itself is not cancelled.
    pub confirmation_timeout_secs: u32,
}

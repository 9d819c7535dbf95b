use std::sync::Arc;

use crate::{
    QuoteRequest, SwapRequest,
    error::{ConfirmationError, QuoteError, SubmitError},
};

/// Estimates the output of a swap without committing anything
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait::async_trait]
pub trait QuoteService: Send + Sync {
    /// Returns the expected output in the smallest denomination of the output token
    async fn quote(&self, request: &QuoteRequest) -> Result<u128, QuoteError>;
}

/// Sends the approval (if needed) and swap transactions from the user's wallet
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait::async_trait]
pub trait SwapSubmitter: Send + Sync {
    /// Returns the hash of the submitted swap transaction.
    ///
    /// Must return [`SubmitError::UserRejected`] when the user declined to sign.
    async fn submit(&self, request: &SwapRequest) -> Result<String, SubmitError>;
}

#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait::async_trait]
pub trait ConfirmationWatcher: Send + Sync {
    /// Resolves once the transaction was mined successfully, or fails with
    /// [`ConfirmationError::Reverted`] if it was mined but reverted.
    async fn wait_for_confirmation(&self, tx_hash: &str) -> Result<(), ConfirmationError>;
}

/// The external collaborators the orchestrator dispatches effects to
#[derive(Clone)]
pub struct SwapServices {
    pub quote_service: Arc<dyn QuoteService>,
    pub swap_submitter: Arc<dyn SwapSubmitter>,
    pub confirmation_watcher: Arc<dyn ConfirmationWatcher>,
}

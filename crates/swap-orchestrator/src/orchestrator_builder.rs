use std::sync::Arc;

use tokio::runtime::Handle;

use crate::{
    SwapConfig,
    error::SwapError,
    orchestrator::SwapOrchestrator,
    registry::{FeeTierTable, TokenRegistry},
    services::{ConfirmationWatcher, QuoteService, SwapServices, SwapSubmitter},
};

/// Builder for creating `SwapOrchestrator` instances with customizable components.
#[derive(Clone)]
pub struct SwapOrchestratorBuilder {
    config: SwapConfig,
    registry: Option<Arc<TokenRegistry>>,
    fee_tiers: Option<FeeTierTable>,
    quote_service: Option<Arc<dyn QuoteService>>,
    swap_submitter: Option<Arc<dyn SwapSubmitter>>,
    confirmation_watcher: Option<Arc<dyn ConfirmationWatcher>>,
}

impl SwapOrchestratorBuilder {
    /// Creates a new `SwapOrchestratorBuilder` with the provided configuration.
    /// The mainnet token registry and the default fee tiers are used unless
    /// set otherwise.
    pub fn new(config: SwapConfig) -> Self {
        SwapOrchestratorBuilder {
            config,
            registry: None,
            fee_tiers: None,
            quote_service: None,
            swap_submitter: None,
            confirmation_watcher: None,
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: TokenRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    #[must_use]
    pub fn with_fee_tiers(mut self, fee_tiers: FeeTierTable) -> Self {
        self.fee_tiers = Some(fee_tiers);
        self
    }

    #[must_use]
    pub fn with_quote_service(mut self, quote_service: Arc<dyn QuoteService>) -> Self {
        self.quote_service = Some(quote_service);
        self
    }

    #[must_use]
    pub fn with_swap_submitter(mut self, swap_submitter: Arc<dyn SwapSubmitter>) -> Self {
        self.swap_submitter = Some(swap_submitter);
        self
    }

    #[must_use]
    pub fn with_confirmation_watcher(
        mut self,
        confirmation_watcher: Arc<dyn ConfirmationWatcher>,
    ) -> Self {
        self.confirmation_watcher = Some(confirmation_watcher);
        self
    }

    /// Sets all three services at once.
    #[must_use]
    pub fn with_services(self, services: SwapServices) -> Self {
        self.with_quote_service(services.quote_service)
            .with_swap_submitter(services.swap_submitter)
            .with_confirmation_watcher(services.confirmation_watcher)
    }

    /// Builds the `SwapOrchestrator`. Must be called within a tokio runtime,
    /// which runs the swap operations from then on.
    pub fn build(self) -> Result<SwapOrchestrator, SwapError> {
        let runtime = Handle::try_current()
            .map_err(|e| SwapError::Generic(format!("No tokio runtime: {e}")))?;
        let services = SwapServices {
            quote_service: self
                .quote_service
                .ok_or(SwapError::InvalidInput("Missing quote service".to_string()))?,
            swap_submitter: self
                .swap_submitter
                .ok_or(SwapError::InvalidInput("Missing swap submitter".to_string()))?,
            confirmation_watcher: self.confirmation_watcher.ok_or(SwapError::InvalidInput(
                "Missing confirmation watcher".to_string(),
            ))?,
        };
        if self.config.max_slippage_bps > 10_000 {
            return Err(SwapError::InvalidInput(format!(
                "Max slippage of {} bps exceeds 100%",
                self.config.max_slippage_bps
            )));
        }
        if self.config.quote_timeout_secs == 0 || self.config.confirmation_timeout_secs == 0 {
            return Err(SwapError::InvalidInput(
                "Timeouts must be at least one second".to_string(),
            ));
        }

        SwapOrchestrator::new(
            self.config,
            self.registry
                .unwrap_or_else(|| Arc::new(TokenRegistry::default_mainnet())),
            self.fee_tiers.unwrap_or_default(),
            services,
            runtime,
        )
    }
}

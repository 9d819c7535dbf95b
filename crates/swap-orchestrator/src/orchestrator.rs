use std::{
    sync::{Arc, Mutex, PoisonError, Weak},
    time::Duration,
};

use tokio::{
    runtime::Handle,
    sync::{broadcast, watch},
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    DEFAULT_CONFIRMATION_TIMEOUT_SECS, DEFAULT_MAX_SLIPPAGE_BPS, DEFAULT_QUOTE_TIMEOUT_SECS,
    FeeTier, SwapConfig, SwapEvent, SwapSnapshot,
    error::{ConfirmationError, QuoteError, Rejection, SwapError},
    events::{EventEmitter, SwapListener, SwapNotification},
    machine::{Effect, Invocation, MachineInput, OperationKind, SwapMachine},
    registry::{FeeTierTable, TokenRegistry},
    services::SwapServices,
};

/// The default configuration: sell ETH for USDC in the 0.3% pool
pub fn default_config() -> SwapConfig {
    SwapConfig {
        default_token_in: Some("eth".to_string()),
        default_token_out: Some("usdc".to_string()),
        default_fee: FeeTier::Medium,
        max_slippage_bps: DEFAULT_MAX_SLIPPAGE_BPS,
        quote_timeout_secs: DEFAULT_QUOTE_TIMEOUT_SECS,
        confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
    }
}

struct ActiveTask {
    invocation: Invocation,
    handle: JoinHandle<()>,
}

struct Inner {
    machine: Mutex<SwapMachine>,
    services: SwapServices,
    config: SwapConfig,
    registry: Arc<TokenRegistry>,
    fee_tiers: FeeTierTable,
    runtime: Handle,
    snapshot_sender: watch::Sender<SwapSnapshot>,
    event_emitter: EventEmitter,
    active_task: Mutex<Option<ActiveTask>>,
}

/// Runs a [`SwapMachine`], dispatching its effects to the swap services on
/// the tokio runtime and feeding their outcomes back.
///
/// Cloning is cheap and every clone drives the same swap.
#[derive(Clone)]
pub struct SwapOrchestrator {
    inner: Arc<Inner>,
}

impl SwapOrchestrator {
    pub(crate) fn new(
        config: SwapConfig,
        registry: Arc<TokenRegistry>,
        fee_tiers: FeeTierTable,
        services: SwapServices,
        runtime: Handle,
    ) -> Result<Self, SwapError> {
        let machine = SwapMachine::new(&config, registry.clone())?;
        let (snapshot_sender, _) = watch::channel(machine.snapshot());
        Ok(Self {
            inner: Arc::new(Inner {
                machine: Mutex::new(machine),
                services,
                config,
                registry,
                fee_tiers,
                runtime,
                snapshot_sender,
                event_emitter: EventEmitter::new(),
                active_task: Mutex::new(None),
            }),
        })
    }

    /// Applies a UI event.
    ///
    /// A rejected event leaves the swap untouched. Failures of the operations
    /// the event starts are reported through the snapshot, never here.
    pub fn send(&self, event: SwapEvent) -> Result<(), SwapError> {
        debug!("Received event {event}");
        self.inner.apply(event.into()).map_err(|e| {
            info!("Rejected event: {e}");
            SwapError::from(e)
        })
    }

    pub fn snapshot(&self) -> SwapSnapshot {
        self.inner.snapshot_sender.borrow().clone()
    }

    /// Receives the latest snapshot after every change
    pub fn subscribe(&self) -> watch::Receiver<SwapSnapshot> {
        self.inner.snapshot_sender.subscribe()
    }

    pub fn notifications(&self) -> broadcast::Receiver<SwapNotification> {
        self.inner.event_emitter.subscribe()
    }

    /// Registers a listener for notifications, returning its id
    pub async fn add_listener(&self, listener: Box<dyn SwapListener>) -> String {
        self.inner.event_emitter.add_listener(listener).await
    }

    pub async fn remove_listener(&self, id: &str) -> bool {
        self.inner.event_emitter.remove_listener(id).await
    }

    /// Waits for the first snapshot, starting with the current one, that
    /// satisfies `predicate`.
    pub async fn wait_until(
        &self,
        predicate: impl FnMut(&SwapSnapshot) -> bool,
    ) -> Result<SwapSnapshot, SwapError> {
        let mut receiver = self.subscribe();
        let snapshot = receiver
            .wait_for(predicate)
            .await
            .map_err(|e| SwapError::Generic(e.to_string()))?
            .clone();
        Ok(snapshot)
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.inner.registry
    }

    pub fn fee_tiers(&self) -> &FeeTierTable {
        &self.inner.fee_tiers
    }

    pub fn config(&self) -> &SwapConfig {
        &self.inner.config
    }
}

impl Inner {
    /// Feeds one input to the machine and carries out the resulting step.
    ///
    /// The machine lock is held until the new snapshot is published, so
    /// snapshots and notifications are observed in transition order.
    fn apply(self: &Arc<Self>, input: MachineInput) -> Result<(), Rejection> {
        let mut machine = self.machine.lock().unwrap_or_else(PoisonError::into_inner);
        let from = machine.state().name();
        let step = machine.handle(input)?;
        let snapshot = machine.snapshot();
        if from != snapshot.state.name() {
            info!("Swap state {from} -> {}", snapshot.state);
        }

        if let Some(invocation) = step.abandoned {
            self.abandon(invocation);
        }
        if let Some(effect) = step.effect {
            self.dispatch(effect);
        }
        for notification in step.notifications {
            self.event_emitter.emit(notification);
        }

        let published = snapshot.clone();
        if self.snapshot_sender.send_if_modified(|current| {
            if *current == published {
                return false;
            }
            *current = published;
            true
        }) {
            self.event_emitter
                .emit(SwapNotification::StateChanged { snapshot });
        }
        drop(machine);
        Ok(())
    }

    fn dispatch(self: &Arc<Self>, effect: Effect) {
        let invocation = effect.invocation();
        debug!("Dispatching {} invocation {}", invocation.kind, invocation.id);
        let inner: Weak<Inner> = Arc::downgrade(self);
        let services = self.services.clone();
        let timeouts = Timeouts::from(&self.config);
        let handle = self.runtime.spawn(async move {
            let input = run_effect(&services, effect, timeouts).await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            if let Err(e) = inner.apply(input) {
                debug!(
                    "Ignoring outcome of {} invocation {}: {e}",
                    invocation.kind, invocation.id
                );
            }
        });
        *self
            .active_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(ActiveTask { invocation, handle });
    }

    /// Stops waiting on an abandoned operation. A submission may already
    /// have reached the wallet, so it is left to finish and its outcome is
    /// discarded as stale.
    fn abandon(&self, invocation: Invocation) {
        let mut active_task = self
            .active_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(task) = active_task.take() else {
            return;
        };
        if task.invocation != invocation {
            return;
        }
        match invocation.kind {
            OperationKind::Submission => {
                warn!(
                    "Swap submission {} abandoned, the transaction may still be sent",
                    invocation.id
                );
            }
            OperationKind::Quote | OperationKind::Confirmation => {
                debug!("Aborting {} invocation {}", invocation.kind, invocation.id);
                task.handle.abort();
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let active_task = self
            .active_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = active_task {
            if task.invocation.kind != OperationKind::Submission {
                task.handle.abort();
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Timeouts {
    quote_secs: u32,
    confirmation_secs: u32,
}

impl From<&SwapConfig> for Timeouts {
    fn from(config: &SwapConfig) -> Self {
        Self {
            quote_secs: config.quote_timeout_secs,
            confirmation_secs: config.confirmation_timeout_secs,
        }
    }
}

/// Performs an effect and returns its outcome as the machine input that
/// resolves it. Submissions are not timed out: the user may take their time
/// to sign in the wallet.
async fn run_effect(services: &SwapServices, effect: Effect, timeouts: Timeouts) -> MachineInput {
    match effect {
        Effect::FetchQuote {
            invocation,
            request,
        } => {
            let quote = services.quote_service.quote(&request);
            let result = timeout(Duration::from_secs(timeouts.quote_secs.into()), quote)
                .await
                .unwrap_or(Err(QuoteError::Timeout(timeouts.quote_secs)));
            MachineInput::QuoteResolved { invocation, result }
        }
        Effect::Submit {
            invocation,
            request,
        } => {
            let result = services.swap_submitter.submit(&request).await;
            MachineInput::SubmitResolved { invocation, result }
        }
        Effect::WatchConfirmation {
            invocation,
            tx_hash,
        } => {
            let confirmation = services
                .confirmation_watcher
                .wait_for_confirmation(&tx_hash);
            let result = timeout(
                Duration::from_secs(timeouts.confirmation_secs.into()),
                confirmation,
            )
            .await
            .unwrap_or(Err(ConfirmationError::Timeout(timeouts.confirmation_secs)));
            MachineInput::ConfirmationResolved { invocation, result }
        }
    }
}

//! Fake swap services whose calls are held until the test answers them.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::sync::{Mutex, mpsc, oneshot};

pub use crate::services::{MockConfirmationWatcher, MockQuoteService, MockSwapSubmitter};
use crate::{
    QuoteRequest, SwapConfig, SwapRequest,
    error::{ConfirmationError, QuoteError, SubmitError, SwapError},
    orchestrator::SwapOrchestrator,
    orchestrator_builder::SwapOrchestratorBuilder,
    services::{ConfirmationWatcher, QuoteService, SwapSubmitter},
};

const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// A call waiting for its response
pub struct PendingCall<Req, Res> {
    pub request: Req,
    responder: oneshot::Sender<Res>,
}

impl<Req, Res> PendingCall<Req, Res> {
    /// Completes the call. Returns false if the caller stopped waiting, e.g.
    /// because its task was aborted.
    pub fn respond(self, response: Res) -> bool {
        self.responder.send(response).is_ok()
    }
}

/// A service that parks every call until the test responds to it
pub struct Gated<Req, Res> {
    sender: mpsc::UnboundedSender<PendingCall<Req, Res>>,
    receiver: Mutex<mpsc::UnboundedReceiver<PendingCall<Req, Res>>>,
    calls: AtomicUsize,
}

impl<Req, Res> Gated<Req, Res>
where
    Req: Send,
    Res: Send,
{
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
            calls: AtomicUsize::new(0),
        }
    }

    /// Waits for the next call. Panics if none arrives within a few seconds.
    pub async fn next_call(&self) -> PendingCall<Req, Res> {
        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(CALL_TIMEOUT, receiver.recv()).await {
            Ok(Some(call)) => call,
            _ => panic!("No call received within {CALL_TIMEOUT:?}"),
        }
    }

    /// Returns a call that was already made, without waiting
    pub async fn try_next_call(&self) -> Option<PendingCall<Req, Res>> {
        self.receiver.lock().await.try_recv().ok()
    }

    /// Number of calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn call(&self, request: Req, dropped: Res) -> Res {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (responder, response) = oneshot::channel();
        if self.sender.send(PendingCall { request, responder }).is_err() {
            return dropped;
        }
        response.await.unwrap_or(dropped)
    }
}

impl<Req, Res> Default for Gated<Req, Res>
where
    Req: Send,
    Res: Send,
{
    fn default() -> Self {
        Self::new()
    }
}

pub type GatedQuoteService = Gated<QuoteRequest, Result<u128, QuoteError>>;
pub type GatedSwapSubmitter = Gated<SwapRequest, Result<String, SubmitError>>;
pub type GatedConfirmationWatcher = Gated<String, Result<(), ConfirmationError>>;

#[async_trait::async_trait]
impl QuoteService for GatedQuoteService {
    async fn quote(&self, request: &QuoteRequest) -> Result<u128, QuoteError> {
        self.call(
            request.clone(),
            Err(QuoteError::Generic("Call dropped".to_string())),
        )
        .await
    }
}

#[async_trait::async_trait]
impl SwapSubmitter for GatedSwapSubmitter {
    async fn submit(&self, request: &SwapRequest) -> Result<String, SubmitError> {
        self.call(
            request.clone(),
            Err(SubmitError::Network("Call dropped".to_string())),
        )
        .await
    }
}

#[async_trait::async_trait]
impl ConfirmationWatcher for GatedConfirmationWatcher {
    async fn wait_for_confirmation(&self, tx_hash: &str) -> Result<(), ConfirmationError> {
        self.call(
            tx_hash.to_string(),
            Err(ConfirmationError::Watcher("Call dropped".to_string())),
        )
        .await
    }
}

/// An orchestrator wired to gated services
pub struct TestHarness {
    pub orchestrator: SwapOrchestrator,
    pub quotes: Arc<GatedQuoteService>,
    pub submitter: Arc<GatedSwapSubmitter>,
    pub watcher: Arc<GatedConfirmationWatcher>,
}

impl TestHarness {
    pub fn new(config: SwapConfig) -> Result<Self, SwapError> {
        let quotes = Arc::new(GatedQuoteService::new());
        let submitter = Arc::new(GatedSwapSubmitter::new());
        let watcher = Arc::new(GatedConfirmationWatcher::new());
        let orchestrator = SwapOrchestratorBuilder::new(config)
            .with_quote_service(quotes.clone())
            .with_swap_submitter(submitter.clone())
            .with_confirmation_watcher(watcher.clone())
            .build()?;
        Ok(Self {
            orchestrator,
            quotes,
            submitter,
            watcher,
        })
    }
}

use core::fmt;
use std::{collections::HashMap, sync::Arc};

use tracing::{debug, info, trace, warn};

use crate::{
    FailurePhase, FieldError, QuoteRequest, SwapConfig, SwapContext, SwapEvent, SwapField,
    SwapFailure, SwapRequest, SwapSnapshot, SwapState,
    error::{AmountError, ConfirmationError, QuoteError, Rejection, SubmitError, SwapError},
    events::SwapNotification,
    registry::{TokenInfo, TokenRegistry},
    validation::{validate_amount, validate_decimal},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Quote,
    Submission,
    Confirmation,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Quote => write!(f, "quote"),
            OperationKind::Submission => write!(f, "submission"),
            OperationKind::Confirmation => write!(f, "confirmation"),
        }
    }
}

/// One dispatched asynchronous operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    pub id: u64,
    pub kind: OperationKind,
}

/// An asynchronous operation the machine asks its runner to perform. The
/// outcome must be fed back tagged with the same invocation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    FetchQuote {
        invocation: u64,
        request: QuoteRequest,
    },
    Submit {
        invocation: u64,
        request: SwapRequest,
    },
    WatchConfirmation {
        invocation: u64,
        tx_hash: String,
    },
}

impl Effect {
    pub fn invocation(&self) -> Invocation {
        match self {
            Effect::FetchQuote { invocation, .. } => Invocation {
                id: *invocation,
                kind: OperationKind::Quote,
            },
            Effect::Submit { invocation, .. } => Invocation {
                id: *invocation,
                kind: OperationKind::Submission,
            },
            Effect::WatchConfirmation { invocation, .. } => Invocation {
                id: *invocation,
                kind: OperationKind::Confirmation,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineInput {
    Event(SwapEvent),
    QuoteResolved {
        invocation: u64,
        result: Result<u128, QuoteError>,
    },
    SubmitResolved {
        invocation: u64,
        result: Result<String, SubmitError>,
    },
    ConfirmationResolved {
        invocation: u64,
        result: Result<(), ConfirmationError>,
    },
}

impl From<SwapEvent> for MachineInput {
    fn from(event: SwapEvent) -> Self {
        MachineInput::Event(event)
    }
}

/// The outcome of an accepted input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Step {
    /// Operation to dispatch for the state that was just entered
    pub effect: Option<Effect>,
    /// In-flight operation whose result will now be ignored
    pub abandoned: Option<Invocation>,
    pub notifications: Vec<SwapNotification>,
}

impl Step {
    fn dispatch(effect: Effect) -> Self {
        Step {
            effect: Some(effect),
            ..Default::default()
        }
    }

    fn notify(notification: SwapNotification) -> Self {
        Step {
            notifications: vec![notification],
            ..Default::default()
        }
    }
}

/// The swap state machine.
///
/// Transitions are synchronous and free of IO: asynchronous work is returned
/// as an [`Effect`] and its completion is fed back through [`SwapMachine::handle`].
/// Inputs that are rejected leave both the state and the context untouched.
#[derive(Debug, Clone)]
pub struct SwapMachine {
    state: SwapState,
    context: SwapContext,
    initial: SwapContext,
    registry: Arc<TokenRegistry>,
    /// Known balances by token key, in the smallest denomination
    balances: HashMap<String, u128>,
    max_slippage_bps: u32,
    next_invocation: u64,
    active: Option<Invocation>,
}

impl SwapMachine {
    pub fn new(config: &SwapConfig, registry: Arc<TokenRegistry>) -> Result<Self, SwapError> {
        let default_token = |symbol: Option<&str>| -> Result<Option<String>, SwapError> {
            symbol
                .map(|symbol| registry.resolve(symbol).map(TokenInfo::key))
                .transpose()
                .map_err(SwapError::from)
        };
        let initial = SwapContext::initial(
            default_token(config.default_token_in.as_deref())?,
            default_token(config.default_token_out.as_deref())?,
            config.default_fee,
        );
        Ok(Self {
            state: SwapState::Idle,
            context: initial.clone(),
            initial,
            registry,
            balances: HashMap::new(),
            max_slippage_bps: config.max_slippage_bps,
            next_invocation: 1,
            active: None,
        })
    }

    pub fn state(&self) -> &SwapState {
        &self.state
    }

    pub fn context(&self) -> &SwapContext {
        &self.context
    }

    pub fn snapshot(&self) -> SwapSnapshot {
        SwapSnapshot {
            state: self.state.clone(),
            context: self.context.clone(),
        }
    }

    /// The operation currently outstanding, if any. There is never more than one.
    pub fn active_invocation(&self) -> Option<Invocation> {
        self.active
    }

    pub fn handle(&mut self, input: MachineInput) -> Result<Step, Rejection> {
        match input {
            MachineInput::Event(event) => self.handle_event(event),
            MachineInput::QuoteResolved { invocation, result } => {
                self.claim(invocation, OperationKind::Quote)?;
                Ok(self.on_quote_resolved(result))
            }
            MachineInput::SubmitResolved { invocation, result } => {
                self.claim(invocation, OperationKind::Submission)?;
                Ok(self.on_submit_resolved(result))
            }
            MachineInput::ConfirmationResolved { invocation, result } => {
                self.claim(invocation, OperationKind::Confirmation)?;
                Ok(self.on_confirmation_resolved(result))
            }
        }
    }

    fn handle_event(&mut self, event: SwapEvent) -> Result<Step, Rejection> {
        let name = event.name();
        match event {
            SwapEvent::Change { field, value } => {
                self.ensure_editable(name)?;
                self.apply_change(field, &value)?;
                Ok(self.after_edit())
            }
            SwapEvent::SwapTokens => {
                self.ensure_editable(name)?;
                let context = &mut self.context;
                std::mem::swap(&mut context.token_in, &mut context.token_out);
                context.dirty = true;
                context.quote = None;
                context.submit_error = None;
                self.revalidate(false);
                Ok(self.after_edit())
            }
            SwapEvent::ExecuteSwap { recipient } => self.execute(name, &recipient),
            SwapEvent::Reset => Ok(self.reset()),
            SwapEvent::SetBalance { token, amount } => self.set_balance(&token, amount),
        }
    }

    /// Takes the active invocation if `invocation` is it
    fn claim(&mut self, invocation: u64, kind: OperationKind) -> Result<(), Rejection> {
        match self.active {
            Some(active) if active.id == invocation && active.kind == kind => {
                self.active = None;
                Ok(())
            }
            _ => Err(Rejection::Stale { invocation }),
        }
    }

    fn begin(&mut self, kind: OperationKind) -> u64 {
        let id = self.next_invocation;
        self.next_invocation = self.next_invocation.saturating_add(1);
        self.active = Some(Invocation { id, kind });
        id
    }

    fn ensure_editable(&self, event: &'static str) -> Result<(), Rejection> {
        match self.state {
            SwapState::Idle | SwapState::LoadingQuote { .. } => Ok(()),
            _ => Err(Rejection::NotAllowed {
                event,
                state: self.state.name(),
            }),
        }
    }

    fn apply_change(&mut self, field: SwapField, value: &str) -> Result<(), Rejection> {
        match field {
            SwapField::TokenIn => self.context.token_in = self.token_key(value)?,
            SwapField::TokenOut => self.context.token_out = self.token_key(value)?,
            SwapField::Amount => self.context.amount = value.to_string(),
            SwapField::Fee => {
                self.context.fee = value.parse().map_err(|_| Rejection::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                })?;
            }
        }

        self.context.dirty = true;
        self.context.quote = None;
        if self
            .context
            .submit_error
            .as_ref()
            .is_some_and(|e| e.phase == FailurePhase::Quote)
        {
            self.context.submit_error = None;
        }
        self.revalidate(field == SwapField::Amount);
        Ok(())
    }

    /// An empty value deselects the token
    fn token_key(&self, value: &str) -> Result<Option<String>, Rejection> {
        if value.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(self.registry.resolve(value)?.key()))
    }

    /// Recomputes the amount field error. A missing amount is only reported
    /// once the user edited the amount.
    fn revalidate(&mut self, amount_touched: bool) {
        let showing = self.context.field_error.is_some();
        let result = match self
            .context
            .token_in
            .as_deref()
            .and_then(|key| self.registry.get(key))
        {
            Some(token) => validate_amount(
                &self.context.amount,
                token,
                self.balances.get(&token.key()).copied(),
            )
            .map(|_| ()),
            None => validate_decimal(&self.context.amount),
        };
        self.context.field_error = match result {
            Ok(()) => None,
            Err(AmountError::Empty) if !amount_touched && !showing => None,
            Err(e) => Some(FieldError {
                field: SwapField::Amount,
                message: e.to_string(),
            }),
        };
    }

    /// The quote request matching the current inputs, if they are complete and valid
    fn quote_request(&self) -> Option<QuoteRequest> {
        if self.context.field_error.is_some() {
            return None;
        }
        let token_in = self.context.token_in.as_ref()?;
        let token_out = self.context.token_out.as_ref()?;
        if token_in == token_out {
            return None;
        }
        let token = self.registry.get(token_in)?;
        let amount_in = validate_amount(
            &self.context.amount,
            token,
            self.balances.get(token_in).copied(),
        )
        .ok()?;
        Some(QuoteRequest {
            token_in: token_in.clone(),
            token_out: token_out.clone(),
            amount_in,
            fee: self.context.fee,
        })
    }

    /// Edits only dispatch from idle. While a quote is loading they are
    /// picked up once it resolves.
    fn after_edit(&mut self) -> Step {
        match self.state {
            SwapState::Idle => self.evaluate_guard(),
            _ => Step::default(),
        }
    }

    fn evaluate_guard(&mut self) -> Step {
        if !self.context.dirty {
            return Step::default();
        }
        let Some(request) = self.quote_request() else {
            trace!("Inputs incomplete, not fetching a quote");
            return Step::default();
        };
        let invocation = self.begin(OperationKind::Quote);
        debug!("Fetching quote {invocation} for {request:?}");
        self.state = SwapState::LoadingQuote {
            request: request.clone(),
        };
        Step::dispatch(Effect::FetchQuote {
            invocation,
            request,
        })
    }

    fn execute(&mut self, event: &'static str, recipient: &str) -> Result<Step, Rejection> {
        if self.state != SwapState::Idle {
            return Err(Rejection::NotAllowed {
                event,
                state: self.state.name(),
            });
        }
        if let Some(failure) = self
            .context
            .submit_error
            .as_ref()
            .filter(|e| e.phase != FailurePhase::Quote)
        {
            return Err(Rejection::UnacknowledgedFailure(failure.to_string()));
        }
        if let Some(field_error) = &self.context.field_error {
            return Err(Rejection::InvalidAmount(field_error.message.clone()));
        }
        let quote = match self.context.quote {
            Some(quote) if !self.context.dirty => quote,
            _ => return Err(Rejection::MissingQuote),
        };
        let recipient = recipient.trim();
        if recipient.is_empty() {
            return Err(Rejection::MissingRecipient);
        }
        let quoted = self.quote_request().ok_or(Rejection::MissingQuote)?;

        let request = SwapRequest {
            token_in: quoted.token_in,
            token_out: quoted.token_out,
            amount_in: quoted.amount_in,
            fee: quoted.fee,
            recipient: recipient.to_string(),
            expected_amount_out: quote,
            min_amount_out: min_amount_out(quote, self.max_slippage_bps),
        };
        let invocation = self.begin(OperationKind::Submission);
        info!(
            "Submitting swap {invocation}: {} {} -> {}, min out {}",
            request.amount_in, request.token_in, request.token_out, request.min_amount_out
        );
        self.state = SwapState::Submitting {
            request: request.clone(),
        };
        Ok(Step::dispatch(Effect::Submit {
            invocation,
            request,
        }))
    }

    fn on_quote_resolved(&mut self, result: Result<u128, QuoteError>) -> Step {
        let SwapState::LoadingQuote { request } = &self.state else {
            return Step::default();
        };
        let request = request.clone();
        self.state = SwapState::Idle;

        // The inputs moved on while the quote was loading
        if self.quote_request().as_ref() != Some(&request) {
            debug!("Discarding quote for outdated request {request:?}");
            return self.evaluate_guard();
        }

        self.context.dirty = false;
        match result {
            Ok(amount_out) => {
                debug!("Received quote {amount_out} for {request:?}");
                self.context.quote = Some(amount_out);
                self.context.submit_error = None;
                Step::notify(SwapNotification::QuoteReceived { amount_out })
            }
            Err(e) => {
                warn!("Failed to fetch quote for {request:?}: {e}");
                let failure: SwapFailure = e.into();
                self.context.quote = None;
                self.context.submit_error = Some(failure.clone());
                Step::notify(SwapNotification::SwapFailed { failure })
            }
        }
    }

    fn on_submit_resolved(&mut self, result: Result<String, SubmitError>) -> Step {
        match result {
            Ok(tx_hash) => {
                info!("Swap submitted: {tx_hash}");
                self.context.tx_hash = Some(tx_hash.clone());
                let invocation = self.begin(OperationKind::Confirmation);
                self.state = SwapState::AwaitingBlockchainConfirmation {
                    tx_hash: tx_hash.clone(),
                };
                Step {
                    effect: Some(Effect::WatchConfirmation {
                        invocation,
                        tx_hash: tx_hash.clone(),
                    }),
                    notifications: vec![SwapNotification::SwapSubmitted { tx_hash }],
                    ..Default::default()
                }
            }
            Err(SubmitError::UserRejected) => {
                info!("Swap cancelled by the user");
                self.state = SwapState::Idle;
                Step::default()
            }
            Err(e) => {
                warn!("Swap submission failed: {e}");
                let failure: SwapFailure = e.into();
                self.state = SwapState::Idle;
                self.context.submit_error = Some(failure.clone());
                Step::notify(SwapNotification::SwapFailed { failure })
            }
        }
    }

    fn on_confirmation_resolved(&mut self, result: Result<(), ConfirmationError>) -> Step {
        let SwapState::AwaitingBlockchainConfirmation { tx_hash } = &self.state else {
            return Step::default();
        };
        let tx_hash = tx_hash.clone();
        match result {
            Ok(()) => {
                info!("Swap confirmed: {tx_hash}");
                self.context = SwapContext {
                    tx_hash: Some(tx_hash.clone()),
                    ..self.initial.clone()
                };
                self.state = SwapState::Confirmed {
                    tx_hash: tx_hash.clone(),
                };
                Step::notify(SwapNotification::SwapConfirmed { tx_hash })
            }
            Err(e) => {
                warn!("Swap {tx_hash} failed after submission: {e}");
                let failure: SwapFailure = e.into();
                self.state = SwapState::Idle;
                self.context.submit_error = Some(failure.clone());
                Step::notify(SwapNotification::SwapFailed { failure })
            }
        }
    }

    fn reset(&mut self) -> Step {
        let abandoned = self.active.take();
        if let Some(invocation) = abandoned {
            info!(
                "Abandoning {} invocation {} on reset",
                invocation.kind, invocation.id
            );
        }
        self.state = SwapState::Idle;
        self.context = self.initial.clone();
        Step {
            abandoned,
            ..Default::default()
        }
    }

    /// Balances are not part of the swap context: they survive resets and are
    /// accepted in every state, but only revalidate the amount while editable.
    fn set_balance(&mut self, token: &str, amount: u128) -> Result<Step, Rejection> {
        let key = self.registry.resolve(token)?.key();
        debug!("Balance of {key} set to {amount}");
        let affects_amount = self.context.token_in.as_deref() == Some(key.as_str());
        self.balances.insert(key, amount);
        if !affects_amount || self.ensure_editable("SET_BALANCE").is_err() {
            return Ok(Step::default());
        }
        self.revalidate(false);
        Ok(self.after_edit())
    }
}

/// The least output accepted for `quote` under the given slippage tolerance
pub fn min_amount_out(quote: u128, max_slippage_bps: u32) -> u128 {
    quote
        .saturating_mul(10_000u128.saturating_sub(u128::from(max_slippage_bps)))
        .saturating_div(10_000)
}

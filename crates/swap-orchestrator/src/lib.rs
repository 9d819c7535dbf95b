mod error;
mod events;
mod logger;
mod machine;
mod models;
mod orchestrator;
mod orchestrator_builder;
mod registry;
mod services;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
mod validation;

pub use error::{
    AmountError, ConfirmationError, QuoteError, RegistryError, Rejection, SubmitError, SwapError,
};
pub use events::{EventEmitter, SwapListener, SwapNotification};
pub use logger::{LogEntry, Logger, init_logging};
pub use machine::{
    Effect, Invocation, MachineInput, OperationKind, Step, SwapMachine, min_amount_out,
};
pub use models::*;
pub use orchestrator::{SwapOrchestrator, default_config};
pub use orchestrator_builder::SwapOrchestratorBuilder;
pub use registry::{FeeTierInfo, FeeTierTable, TokenInfo, TokenRegistry, format_units, parse_units};
pub use services::{ConfirmationWatcher, QuoteService, SwapServices, SwapSubmitter};
pub use validation::{validate_amount, validate_decimal};

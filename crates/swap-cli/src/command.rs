use std::{
    borrow::Cow::{self, Owned},
    time::Duration,
};

use anyhow::{Result, anyhow};
use clap::Parser;
use rustyline::{
    Completer, Editor, Helper, Hinter, Validator, highlight::Highlighter, hint::HistoryHinter,
    history::DefaultHistory,
};
use swap_orchestrator::{
    FeeTier, SwapEvent, SwapField, SwapOrchestrator, SwapSnapshot, SwapState, format_units,
    min_amount_out, parse_units,
};

use crate::simulated::SimulatedBackend;

#[derive(Clone, Parser)]
pub enum Command {
    /// Exit the interactive shell
    #[command(hide = true)]
    Exit,

    /// Show the current swap
    State {
        /// Print the full snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Edit a swap input: `in`, `out`, `amount` or `fee`
    Set {
        field: SwapField,
        /// The new value. Leave out to clear the field.
        value: Option<String>,
    },

    /// Reverse the swap direction
    Flip,

    /// Tell the orchestrator the balance of a token, in whole units
    Balance { token: String, amount: String },

    /// Show the balances of the simulated wallet
    Wallet,

    /// Execute the current quote
    Execute {
        /// Address receiving the bought tokens. Defaults to the wallet
        /// address, `reject` simulates declining in the wallet.
        #[arg(short, long)]
        recipient: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Forget the current swap
    Reset,

    /// List the tokens that can be swapped
    Tokens,

    /// List the pool fee tiers
    Fees,

    /// Wait until no operation is outstanding
    Wait {
        /// Maximum time to wait in seconds
        #[arg(short, long, default_value = "180")]
        timeout: u64,
    },
}

#[derive(Helper, Completer, Hinter, Validator)]
pub struct CliHelper {
    #[rustyline(Hinter)]
    pub hinter: HistoryHinter,
}

impl Highlighter for CliHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Owned("\x1b[1m".to_owned() + hint + "\x1b[m")
    }
}

pub(crate) struct CommandContext<'a> {
    pub orchestrator: &'a SwapOrchestrator,
    pub backend: &'a SimulatedBackend,
    pub wallet_address: &'a str,
}

pub(crate) async fn execute_command(
    rl: &mut Editor<CliHelper, DefaultHistory>,
    command: Command,
    ctx: &CommandContext<'_>,
) -> Result<bool, anyhow::Error> {
    let orchestrator = ctx.orchestrator;
    match command {
        Command::Exit => Ok(false),
        Command::State { json } => {
            let snapshot = orchestrator.snapshot();
            if json {
                print_value(&snapshot)?;
            } else {
                println!("{}", describe_snapshot(orchestrator, &snapshot));
            }
            Ok(true)
        }
        Command::Set { field, value } => {
            orchestrator.send(SwapEvent::Change {
                field,
                value: value.unwrap_or_default(),
            })?;
            println!("{}", describe_snapshot(orchestrator, &orchestrator.snapshot()));
            Ok(true)
        }
        Command::Flip => {
            orchestrator.send(SwapEvent::SwapTokens)?;
            println!("{}", describe_snapshot(orchestrator, &orchestrator.snapshot()));
            Ok(true)
        }
        Command::Balance { token, amount } => {
            let info = orchestrator.registry().resolve(&token)?;
            let amount = parse_units(&amount, info.decimals)?;
            orchestrator.send(SwapEvent::SetBalance {
                token: info.key(),
                amount,
            })?;
            Ok(true)
        }
        Command::Wallet => {
            let balances = ctx.backend.balances().await;
            for token in orchestrator.registry().tokens() {
                if let Some(balance) = balances.get(&token.key()) {
                    println!(
                        "{:>8} {}",
                        token.symbol,
                        format_units(*balance, token.decimals)
                    );
                }
            }
            Ok(true)
        }
        Command::Execute { recipient, yes } => {
            let snapshot = orchestrator.snapshot();
            if !yes {
                if let Some(summary) = describe_execution(orchestrator, &snapshot) {
                    println!("{summary}");
                    let line = rl
                        .readline_with_initial("Do you want to continue (y/n): ", ("y", ""))?
                        .to_lowercase();
                    if line != "y" {
                        return Err(anyhow!("Swap cancelled"));
                    }
                }
            }
            let recipient = recipient.unwrap_or_else(|| ctx.wallet_address.to_string());
            orchestrator.send(SwapEvent::ExecuteSwap { recipient })?;
            Ok(true)
        }
        Command::Reset => {
            orchestrator.send(SwapEvent::Reset)?;
            println!("{}", describe_snapshot(orchestrator, &orchestrator.snapshot()));
            Ok(true)
        }
        Command::Tokens => {
            print_value(&orchestrator.registry().tokens())?;
            Ok(true)
        }
        Command::Fees => {
            for tier in FeeTier::ALL {
                match orchestrator.fee_tiers().get(tier) {
                    Some(info) => println!(
                        "{:>8} {:>6}  {}",
                        tier.to_string(),
                        info.label,
                        info.description
                    ),
                    None => println!("{:>8} {:>6}", tier.to_string(), tier.pips()),
                }
            }
            Ok(true)
        }
        Command::Wait { timeout } => {
            let snapshot = tokio::time::timeout(
                Duration::from_secs(timeout),
                orchestrator.wait_until(|snapshot| !snapshot.state.is_busy()),
            )
            .await
            .map_err(|_| anyhow!("Still {} after {timeout}s", orchestrator.snapshot().state))??;
            println!("{}", describe_snapshot(orchestrator, &snapshot));
            Ok(true)
        }
    }
}

/// Renders an amount of the token with the given registry key in whole units
fn display_amount(orchestrator: &SwapOrchestrator, token: Option<&str>, value: u128) -> String {
    match token.and_then(|t| orchestrator.registry().get(t)) {
        Some(info) => format!("{} {}", format_units(value, info.decimals), info.symbol),
        None => value.to_string(),
    }
}

fn display_token(orchestrator: &SwapOrchestrator, token: Option<&str>) -> String {
    token
        .and_then(|t| orchestrator.registry().get(t))
        .map_or_else(|| "-".to_string(), |info| info.symbol.clone())
}

pub(crate) fn describe_snapshot(orchestrator: &SwapOrchestrator, snapshot: &SwapSnapshot) -> String {
    let context = &snapshot.context;
    let token_in = context.token_in.as_deref();
    let token_out = context.token_out.as_deref();
    let mut lines = vec![
        format!("state:  {}", snapshot.state),
        format!(
            "swap:   {} {} -> {} ({} pool)",
            if context.amount.is_empty() {
                "_"
            } else {
                &context.amount
            },
            display_token(orchestrator, token_in),
            display_token(orchestrator, token_out),
            fee_label(orchestrator, context.fee),
        ),
    ];
    match (context.quote, &snapshot.state) {
        (_, SwapState::LoadingQuote { .. }) => lines.push("quote:  loading...".to_string()),
        (Some(quote), _) => lines.push(format!(
            "quote:  {}{}",
            display_amount(orchestrator, token_out, quote),
            if context.dirty { " (outdated)" } else { "" }
        )),
        (None, _) => {}
    }
    if let Some(tx_hash) = &context.tx_hash {
        lines.push(format!("tx:     {tx_hash}"));
    }
    if let Some(error) = context.surfaced_error() {
        lines.push(format!("error:  {error}"));
    }
    lines.join("\n")
}

fn describe_execution(orchestrator: &SwapOrchestrator, snapshot: &SwapSnapshot) -> Option<String> {
    let context = &snapshot.context;
    let quote = context.quote?;
    let minimum = min_amount_out(quote, orchestrator.config().max_slippage_bps);
    Some(format!(
        "Swapping {} {} for {} (at least {})",
        context.amount,
        display_token(orchestrator, context.token_in.as_deref()),
        display_amount(orchestrator, context.token_out.as_deref(), quote),
        display_amount(orchestrator, context.token_out.as_deref(), minimum),
    ))
}

fn fee_label(orchestrator: &SwapOrchestrator, fee: FeeTier) -> String {
    orchestrator
        .fee_tiers()
        .get(fee)
        .map_or_else(|| fee.to_string(), |info| info.label.clone())
}

pub(crate) fn print_value<T: serde::Serialize>(value: &T) -> Result<(), serde_json::Error> {
    let serialized = serialize(value)?;
    println!("{serialized}");
    Ok(())
}

fn serialize<T: serde::Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

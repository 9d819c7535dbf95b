mod command;
mod config;
mod simulated;

use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Result, anyhow};
use clap::Parser;
use command::{CliHelper, Command, CommandContext, describe_snapshot, execute_command};
use config::{Config, DEFAULT_CONFIG};
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use rustyline::{Editor, error::ReadlineError, hint::HistoryHinter};
use simulated::SimulatedBackend;
use swap_orchestrator::{
    SwapListener, SwapNotification, SwapOrchestrator, SwapOrchestratorBuilder, SwapServices,
    TokenRegistry, format_units,
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(version, about = "Interactive token swap against a simulated DEX", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the config file
    #[arg(short, long, default_value = "swap.yaml")]
    config: String,

    /// Path to the data directory holding logs and history
    #[arg(short, long, default_value = "./.data")]
    data_dir: String,

    /// Overrides the log filter of the config file
    #[arg(long)]
    log_filter: Option<String>,
}

fn expand_path(path: &str) -> Result<PathBuf> {
    if let Some(stripped) = path.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
        Ok(home.join(stripped))
    } else {
        Ok(PathBuf::from(path))
    }
}

fn load_config(path: &PathBuf) -> Result<Config> {
    let config = Figment::new()
        .merge(Yaml::string(DEFAULT_CONFIG))
        .merge(Yaml::file(path))
        .merge(Env::prefixed("SWAP_").split("__"))
        .extract()?;
    Ok(config)
}

/// The filter given on the command line wins over the configured one
fn log_filter(cli_filter: Option<String>, config: &Config) -> String {
    cli_filter.unwrap_or_else(|| config.log_filter.clone())
}

/// Parse a command string into a Command enum using clap
fn parse_command(input: &str) -> Result<Command> {
    if input.trim() == "exit" || input.trim() == "quit" {
        return Ok(Command::Exit);
    }

    let mut args = vec!["swap-cli".to_string()];
    match shlex::split(input) {
        Some(split_args) => args.extend(split_args),
        None => return Err(anyhow!("Failed to parse input string: {}", input)),
    }

    match Command::try_parse_from(args) {
        Ok(cmd) => Ok(cmd),
        Err(e) => Err(anyhow!("Command parsing error: {}", e)),
    }
}

/// Reports the wallet balances of the simulated backend to the orchestrator
async fn sync_balances(orchestrator: &SwapOrchestrator, backend: &SimulatedBackend) {
    for (token, amount) in backend.balances().await {
        if let Err(e) = orchestrator.send(swap_orchestrator::SwapEvent::SetBalance {
            token: token.clone(),
            amount,
        }) {
            warn!("Failed to set balance of {token}: {e}");
        }
    }
}

struct CliEventListener {
    orchestrator: SwapOrchestrator,
    backend: Arc<SimulatedBackend>,
}

impl CliEventListener {
    fn token_out_amount(&self, amount: u128) -> String {
        let snapshot = self.orchestrator.snapshot();
        snapshot
            .context
            .token_out
            .as_deref()
            .and_then(|token| self.orchestrator.registry().get(token))
            .map_or_else(
                || amount.to_string(),
                |info| format!("{} {}", format_units(amount, info.decimals), info.symbol),
            )
    }
}

#[async_trait::async_trait]
impl SwapListener for CliEventListener {
    async fn on_notification(&self, notification: SwapNotification) {
        info!(
            "Notification: {}",
            serde_json::to_string(&notification)
                .unwrap_or_else(|_| "Failed to serialize notification".to_string())
        );
        match notification {
            SwapNotification::StateChanged { .. } => {}
            SwapNotification::QuoteReceived { amount_out } => {
                println!("\nQuote: {}", self.token_out_amount(amount_out));
            }
            SwapNotification::SwapSubmitted { tx_hash } => {
                println!("\nSubmitted transaction {tx_hash}");
            }
            SwapNotification::SwapConfirmed { tx_hash } => {
                println!("\nTransaction {tx_hash} confirmed");
                sync_balances(&self.orchestrator, &self.backend).await;
            }
            SwapNotification::SwapFailed { failure } => {
                println!("\n{failure}");
            }
        }
    }
}

async fn run_interactive_mode(cli: Cli) -> Result<()> {
    let data_dir = expand_path(&cli.data_dir)?;
    fs::create_dir_all(&data_dir)?;
    let config = load_config(&expand_path(&cli.config)?)?;
    swap_orchestrator::init_logging(
        &data_dir.to_string_lossy(),
        None,
        Some(log_filter(cli.log_filter, &config)),
    )?;
    info!("Loaded config: {config:?}");

    let history_file = data_dir.join("history.txt");
    let rl = &mut Editor::new()?;
    rl.set_helper(Some(CliHelper {
        hinter: HistoryHinter {},
    }));
    if rl.load_history(&history_file).is_err() {
        info!("No history found");
    }

    let registry = TokenRegistry::default_mainnet();
    let backend = Arc::new(SimulatedBackend::new(
        config.backend.clone(),
        &config.wallet,
        &registry,
    )?);
    let orchestrator = SwapOrchestratorBuilder::new(config.swap.clone())
        .with_registry(registry)
        .with_services(SwapServices {
            quote_service: backend.clone(),
            swap_submitter: backend.clone(),
            confirmation_watcher: backend.clone(),
        })
        .build()?;
    sync_balances(&orchestrator, &backend).await;

    let listener_id = orchestrator
        .add_listener(Box::new(CliEventListener {
            orchestrator: orchestrator.clone(),
            backend: backend.clone(),
        }))
        .await;

    println!("Swap CLI Interactive Mode");
    println!("Type 'help' for available commands or 'exit' to quit");
    println!("{}", describe_snapshot(&orchestrator, &orchestrator.snapshot()));

    let ctx = CommandContext {
        orchestrator: &orchestrator,
        backend: &backend,
        wallet_address: &config.wallet.address,
    };
    loop {
        let readline = rl.readline("swap-cli> ");
        match readline {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                rl.add_history_entry(line.as_str())?;

                match parse_command(trimmed) {
                    Ok(command) => match Box::pin(execute_command(rl, command, &ctx)).await {
                        Ok(continue_loop) => {
                            if !continue_loop {
                                break;
                            }
                        }
                        Err(e) => {
                            println!("Error: {e}");
                        }
                    },
                    Err(e) => {
                        println!("{e}");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }

    orchestrator.remove_listener(&listener_id).await;
    rl.save_history(&history_file)?;

    println!("Goodbye!");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    Box::pin(run_interactive_mode(cli)).await?;
    Ok(())
}

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use rstest::*;
use swap_orchestrator::test_utils::{
    MockConfirmationWatcher, MockQuoteService, MockSwapSubmitter, TestHarness,
};
use swap_orchestrator::*;
use tracing::info;

const ETH: u128 = 1_000_000_000_000_000_000;

// ---------------------
// Fixtures
// ---------------------

#[fixture]
fn config() -> SwapConfig {
    default_config()
}

// ---------------------
// Helpers
// ---------------------

fn change(field: SwapField, value: &str) -> SwapEvent {
    SwapEvent::Change {
        field,
        value: value.to_string(),
    }
}

fn execute() -> SwapEvent {
    SwapEvent::ExecuteSwap {
        recipient: "0x00000000000000000000000000000000000000aa".to_string(),
    }
}

/// Gives spawned tasks the chance to run
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Enters `amount` and answers the resulting quote request with `amount_out`
async fn quote(harness: &TestHarness, amount: &str, amount_out: u128) -> Result<SwapSnapshot> {
    harness
        .orchestrator
        .send(change(SwapField::Amount, amount))?;
    harness.quotes.next_call().await.respond(Ok(amount_out));
    let snapshot = harness
        .orchestrator
        .wait_until(|s| s.state == SwapState::Idle)
        .await?;
    Ok(snapshot)
}

// ---------------------
// Scenarios
// ---------------------

#[rstest]
#[test_log::test(tokio::test)]
async fn test_quote_applied(config: SwapConfig) -> Result<()> {
    let harness = TestHarness::new(config)?;

    harness
        .orchestrator
        .send(change(SwapField::Amount, "1.5"))?;
    assert_eq!(harness.orchestrator.snapshot().state.name(), "loadingQuote");

    let call = harness.quotes.next_call().await;
    assert_eq!(
        call.request,
        QuoteRequest {
            token_in: "eth".to_string(),
            token_out: "usdc".to_string(),
            amount_in: 1_500_000_000_000_000_000,
            fee: FeeTier::Medium,
        }
    );
    call.respond(Ok(1_500_000));

    let snapshot = harness
        .orchestrator
        .wait_until(|s| s.state == SwapState::Idle)
        .await?;
    assert_eq!(snapshot.context.quote, Some(1_500_000));
    assert!(!snapshot.context.dirty);
    assert_eq!(snapshot.context.surfaced_error(), None);
    Ok(())
}

#[rstest]
#[test_log::test(tokio::test)]
async fn test_superseded_quote_discarded(config: SwapConfig) -> Result<()> {
    let harness = TestHarness::new(config)?;
    let mut notifications = harness.orchestrator.notifications();

    harness
        .orchestrator
        .send(change(SwapField::Amount, "1.5"))?;
    let first = harness.quotes.next_call().await;
    harness
        .orchestrator
        .send(change(SwapField::Amount, "2.0"))?;

    // Debounced: still a single outstanding quote request
    settle().await;
    assert_eq!(harness.quotes.call_count(), 1);
    assert!(harness.quotes.try_next_call().await.is_none());

    first.respond(Ok(1_500_000));
    let second = harness.quotes.next_call().await;
    assert_eq!(second.request.amount_in, 2 * ETH);
    second.respond(Ok(2_000_000));

    let snapshot = harness
        .orchestrator
        .wait_until(|s| s.state == SwapState::Idle)
        .await?;
    assert_eq!(snapshot.context.quote, Some(2_000_000));
    assert!(!snapshot.context.dirty);

    let mut quotes = Vec::new();
    while let Ok(notification) = notifications.try_recv() {
        if let SwapNotification::QuoteReceived { amount_out } = notification {
            quotes.push(amount_out);
        }
    }
    assert_eq!(quotes, vec![2_000_000]);
    Ok(())
}

#[rstest]
#[test_log::test(tokio::test)]
async fn test_zero_amount_rejected_locally(config: SwapConfig) -> Result<()> {
    let harness = TestHarness::new(config)?;

    harness
        .orchestrator
        .send(change(SwapField::Amount, "0"))?;
    settle().await;

    let snapshot = harness.orchestrator.snapshot();
    assert_eq!(snapshot.state, SwapState::Idle);
    assert_eq!(
        snapshot.context.field_error,
        Some(FieldError {
            field: SwapField::Amount,
            message: "Amount must be greater than 0".to_string(),
        })
    );
    assert_eq!(harness.quotes.call_count(), 0);
    Ok(())
}

#[rstest]
#[test_log::test(tokio::test)]
async fn test_zero_amount_never_reaches_quote_service(config: SwapConfig) -> Result<()> {
    let mut quote_service = MockQuoteService::new();
    quote_service.expect_quote().times(0);
    let orchestrator = SwapOrchestratorBuilder::new(config)
        .with_quote_service(Arc::new(quote_service))
        .with_swap_submitter(Arc::new(MockSwapSubmitter::new()))
        .with_confirmation_watcher(Arc::new(MockConfirmationWatcher::new()))
        .build()?;

    orchestrator.send(change(SwapField::Amount, "0"))?;
    orchestrator.send(change(SwapField::Fee, "high"))?;
    settle().await;

    assert!(orchestrator.snapshot().context.field_error.is_some());
    Ok(())
}

#[rstest]
#[test_log::test(tokio::test)]
async fn test_user_rejection_returns_to_idle(config: SwapConfig) -> Result<()> {
    let harness = TestHarness::new(config)?;
    let quoted = quote(&harness, "1.5", 1_500_000).await?;

    harness.orchestrator.send(execute())?;
    assert_eq!(harness.orchestrator.snapshot().state.name(), "submitting");
    harness
        .submitter
        .next_call()
        .await
        .respond(Err(SubmitError::UserRejected));

    let snapshot = harness
        .orchestrator
        .wait_until(|s| s.state == SwapState::Idle)
        .await?;
    assert_eq!(snapshot.context.submit_error, None);
    assert_eq!(snapshot.context, quoted.context);
    assert_eq!(harness.watcher.call_count(), 0);
    Ok(())
}

#[rstest]
#[test_log::test(tokio::test)]
async fn test_revert_reported_after_submission(config: SwapConfig) -> Result<()> {
    let harness = TestHarness::new(config)?;
    quote(&harness, "1.5", 1_500_000).await?;

    harness.orchestrator.send(execute())?;
    let submission = harness.submitter.next_call().await;
    assert_eq!(submission.request.min_amount_out, 1_492_500);
    submission.respond(Ok("0xabc".to_string()));

    let watch = harness.watcher.next_call().await;
    assert_eq!(watch.request, "0xabc");
    assert_eq!(
        harness.orchestrator.snapshot().state,
        SwapState::AwaitingBlockchainConfirmation {
            tx_hash: "0xabc".to_string()
        }
    );
    watch.respond(Err(ConfirmationError::Reverted {
        tx_hash: "0xabc".to_string(),
    }));

    let snapshot = harness
        .orchestrator
        .wait_until(|s| s.context.submit_error.is_some())
        .await?;
    assert_eq!(snapshot.state, SwapState::Idle);
    let failure = snapshot.context.submit_error.clone().unwrap();
    assert_eq!(failure.phase, FailurePhase::Confirmation);
    assert!(failure.message.contains("reverted"));
    Ok(())
}

#[rstest]
#[test_log::test(tokio::test)]
async fn test_happy_path_then_reset(config: SwapConfig) -> Result<()> {
    info!("=== Starting test_happy_path_then_reset ===");
    let harness = TestHarness::new(config)?;
    let initial = harness.orchestrator.snapshot();

    harness
        .orchestrator
        .send(change(SwapField::Fee, "low"))?;
    quote(&harness, "1.5", 1_500_000).await?;
    harness.orchestrator.send(execute())?;
    harness
        .submitter
        .next_call()
        .await
        .respond(Ok("0xabc".to_string()));
    harness.watcher.next_call().await.respond(Ok(()));

    let confirmed = harness
        .orchestrator
        .wait_until(|s| matches!(s.state, SwapState::Confirmed { .. }))
        .await?;
    assert_eq!(confirmed.context.tx_hash.as_deref(), Some("0xabc"));
    assert_eq!(confirmed.context.fee, FeeTier::Medium);
    assert_eq!(confirmed.context.amount, "");

    // Only reset leaves the confirmed state
    assert!(
        harness
            .orchestrator
            .send(change(SwapField::Amount, "1"))
            .is_err()
    );
    assert!(harness.orchestrator.send(SwapEvent::SwapTokens).is_err());
    assert!(harness.orchestrator.send(execute()).is_err());
    assert_eq!(harness.orchestrator.snapshot(), confirmed);

    harness.orchestrator.send(SwapEvent::Reset)?;
    assert_eq!(harness.orchestrator.snapshot(), initial);
    info!("=== Test test_happy_path_then_reset PASSED ===");
    Ok(())
}

// ---------------------
// Properties
// ---------------------

#[rstest]
#[case(&["1", "2", "3"], 2)]
#[case(&["1.5", "2", "1.5"], 1)]
#[case(&["1", "", "4"], 2)]
#[case(&["7"], 1)]
#[test_log::test(tokio::test)]
async fn test_settled_quote_matches_inputs(
    config: SwapConfig,
    #[case] amounts: &[&str],
    #[case] expected_calls: usize,
) -> Result<()> {
    let harness = TestHarness::new(config)?;
    for amount in amounts {
        harness
            .orchestrator
            .send(change(SwapField::Amount, amount))?;
    }

    // Answer every quote request with 1 USDC per ETH until nothing is loading
    while harness.orchestrator.snapshot().state.is_busy() {
        let call = harness.quotes.next_call().await;
        let request = call.request.clone();
        call.respond(Ok(request.amount_in / 1_000_000_000_000));
        harness
            .orchestrator
            .wait_until(|s| {
                !matches!(&s.state, SwapState::LoadingQuote { request: r } if *r == request)
            })
            .await?;
    }

    let snapshot = harness.orchestrator.snapshot();
    let last = amounts.last().unwrap();
    let expected = parse_units(last, 18)? / 1_000_000_000_000;
    assert_eq!(snapshot.context.quote, Some(expected));
    assert!(!snapshot.context.dirty);
    assert_eq!(harness.quotes.call_count(), expected_calls);
    Ok(())
}

#[rstest]
#[test_log::test(tokio::test)]
async fn test_reset_while_loading_ignores_late_quote(config: SwapConfig) -> Result<()> {
    let harness = TestHarness::new(config)?;
    let initial = harness.orchestrator.snapshot();

    harness
        .orchestrator
        .send(change(SwapField::Amount, "1.5"))?;
    let call = harness.quotes.next_call().await;
    harness.orchestrator.send(SwapEvent::Reset)?;
    assert_eq!(harness.orchestrator.snapshot(), initial);

    // The fetch was aborted, a late answer changes nothing
    call.respond(Ok(1_500_000));
    settle().await;
    assert_eq!(harness.orchestrator.snapshot(), initial);
    Ok(())
}

#[rstest]
#[test_log::test(tokio::test)]
async fn test_reset_while_submitting_ignores_late_hash(config: SwapConfig) -> Result<()> {
    let harness = TestHarness::new(config)?;
    let initial = harness.orchestrator.snapshot();
    quote(&harness, "1.5", 1_500_000).await?;

    harness.orchestrator.send(execute())?;
    let submission = harness.submitter.next_call().await;
    harness.orchestrator.send(SwapEvent::Reset)?;

    // The wallet call is not cancelled, its outcome is discarded
    assert!(submission.respond(Ok("0xlate".to_string())));
    settle().await;
    assert_eq!(harness.orchestrator.snapshot(), initial);
    assert_eq!(harness.watcher.call_count(), 0);
    Ok(())
}

#[rstest]
#[test_log::test(tokio::test)]
async fn test_reset_while_confirming_ignores_late_result(config: SwapConfig) -> Result<()> {
    let harness = TestHarness::new(config)?;
    let initial = harness.orchestrator.snapshot();
    let mut notifications = harness.orchestrator.notifications();
    quote(&harness, "1.5", 1_500_000).await?;

    harness.orchestrator.send(execute())?;
    harness
        .submitter
        .next_call()
        .await
        .respond(Ok("0xabc".to_string()));
    let watch = harness.watcher.next_call().await;
    assert_eq!(
        harness.orchestrator.snapshot().state.name(),
        "awaitingBlockchainConfirmation"
    );

    harness.orchestrator.send(SwapEvent::Reset)?;
    assert_eq!(harness.orchestrator.snapshot(), initial);

    // The watch was aborted, nobody receives its late answer
    settle().await;
    assert!(!watch.respond(Ok(())));
    settle().await;
    assert_eq!(harness.orchestrator.snapshot(), initial);
    while let Ok(notification) = notifications.try_recv() {
        assert!(!matches!(
            notification,
            SwapNotification::SwapConfirmed { .. } | SwapNotification::SwapFailed { .. }
        ));
    }
    Ok(())
}

#[rstest]
#[test_log::test(tokio::test)]
async fn test_revert_blocks_execute_until_reset(config: SwapConfig) -> Result<()> {
    let harness = TestHarness::new(config)?;
    quote(&harness, "1.5", 1_500_000).await?;

    harness.orchestrator.send(execute())?;
    harness
        .submitter
        .next_call()
        .await
        .respond(Ok("0xabc".to_string()));
    harness
        .watcher
        .next_call()
        .await
        .respond(Err(ConfirmationError::Timeout(120)));
    let failed = harness
        .orchestrator
        .wait_until(|s| s.context.submit_error.is_some())
        .await?;
    assert_eq!(failed.context.quote, Some(1_500_000));

    // The first transaction may still be mined, a second one is not sent
    let result = harness.orchestrator.send(execute());
    assert!(matches!(
        result,
        Err(SwapError::Rejected(Rejection::UnacknowledgedFailure(_)))
    ));
    settle().await;
    assert_eq!(harness.submitter.call_count(), 1);
    assert_eq!(harness.orchestrator.snapshot(), failed);

    harness.orchestrator.send(SwapEvent::Reset)?;
    quote(&harness, "1.5", 1_500_000).await?;
    harness.orchestrator.send(execute())?;
    harness.submitter.next_call().await;
    assert_eq!(harness.submitter.call_count(), 2);
    Ok(())
}

#[rstest]
#[test_log::test(tokio::test)]
async fn test_single_outstanding_operation(config: SwapConfig) -> Result<()> {
    let harness = TestHarness::new(config)?;
    quote(&harness, "1.5", 1_500_000).await?;
    harness.orchestrator.send(execute())?;
    let submission = harness.submitter.next_call().await;
    let before = harness.orchestrator.snapshot();

    // Inputs are frozen while the swap is in flight
    let result = harness
        .orchestrator
        .send(change(SwapField::Amount, "3"));
    assert!(matches!(
        result,
        Err(SwapError::Rejected(Rejection::NotAllowed {
            event: "CHANGE",
            state: "submitting",
        }))
    ));
    assert!(harness.orchestrator.send(SwapEvent::SwapTokens).is_err());
    assert!(harness.orchestrator.send(execute()).is_err());
    settle().await;
    assert_eq!(harness.orchestrator.snapshot(), before);
    assert_eq!(harness.quotes.call_count(), 1);
    assert_eq!(harness.submitter.call_count(), 1);

    submission.respond(Err(SubmitError::UserRejected));
    Ok(())
}

#[rstest]
#[test_log::test(tokio::test)]
async fn test_execute_rejected_while_loading(config: SwapConfig) -> Result<()> {
    let harness = TestHarness::new(config)?;
    harness
        .orchestrator
        .send(change(SwapField::Amount, "1.5"))?;

    let result = harness.orchestrator.send(execute());
    assert!(matches!(
        result,
        Err(SwapError::Rejected(Rejection::NotAllowed { .. }))
    ));
    assert_eq!(harness.submitter.call_count(), 0);
    Ok(())
}

#[rstest]
#[test_log::test(tokio::test)]
async fn test_insufficient_balance(config: SwapConfig) -> Result<()> {
    let harness = TestHarness::new(config)?;
    harness.orchestrator.send(SwapEvent::SetBalance {
        token: "ETH".to_string(),
        amount: ETH,
    })?;

    harness
        .orchestrator
        .send(change(SwapField::Amount, "2"))?;
    settle().await;
    let snapshot = harness.orchestrator.snapshot();
    assert_eq!(
        snapshot.context.surfaced_error().as_deref(),
        Some("Insufficient ETH balance")
    );
    assert_eq!(harness.quotes.call_count(), 0);

    harness
        .orchestrator
        .send(change(SwapField::Amount, "0.5"))?;
    let call = harness.quotes.next_call().await;
    assert_eq!(call.request.amount_in, ETH / 2);
    Ok(())
}

#[rstest]
#[test_log::test(tokio::test)]
async fn test_quote_failure_allows_editing(config: SwapConfig) -> Result<()> {
    let harness = TestHarness::new(config)?;
    harness
        .orchestrator
        .send(change(SwapField::TokenOut, "wbtc"))?;
    harness
        .orchestrator
        .send(change(SwapField::Amount, "10"))?;
    harness
        .quotes
        .next_call()
        .await
        .respond(Err(QuoteError::InsufficientLiquidity {
            token_in: "eth".to_string(),
            token_out: "wbtc".to_string(),
        }));

    let snapshot = harness
        .orchestrator
        .wait_until(|s| s.context.submit_error.is_some())
        .await?;
    assert_eq!(snapshot.state, SwapState::Idle);
    assert_eq!(
        snapshot.context.surfaced_error().as_deref(),
        Some("Failed to fetch quote: Insufficient liquidity for eth/wbtc")
    );

    harness
        .orchestrator
        .send(change(SwapField::Amount, "1"))?;
    assert_eq!(harness.orchestrator.snapshot().context.submit_error, None);
    harness.quotes.next_call().await.respond(Ok(3_000_000));
    let snapshot = harness
        .orchestrator
        .wait_until(|s| s.context.quote.is_some())
        .await?;
    assert_eq!(snapshot.context.quote, Some(3_000_000));
    Ok(())
}

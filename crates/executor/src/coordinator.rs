//! Single-flight update coordinator
//!
//! Owns all mutable session state. Each incoming sample is either run
//! through a full decision cycle (evaluate, submit, confirm) or, while
//! another cycle holds the in-flight guard, evaluated against the cached
//! on-chain price and parked for re-evaluation.

use alloy_primitives::Address;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use oracle_core::{
    BotConfig, ChainResult, CoreResult, PriceSample, PublishedPrice, SessionState,
    SubmissionAttempt, SubmissionFailure, ThresholdConfig, TxHash,
};
use oracle_detector::{Evaluation, ThresholdPolicy};

use crate::chain::{ChainClient, Receipt};
use crate::fees::{EscalationConfig, FeeEscalationStrategy, GiveUpReason, RetryDecision};

/// Coordinator configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Account whose nonce is used for submissions
    pub wallet: Address,
    pub threshold: ThresholdConfig,
    pub escalation: EscalationConfig,
    /// Open with the node's fee estimate instead of the configured bid
    pub use_chain_estimate: bool,
    pub reevaluate_latest: bool,
}

impl CoordinatorConfig {
    pub fn from_config(config: &BotConfig) -> CoreResult<Self> {
        Ok(Self {
            wallet: config.wallet.address,
            threshold: config.threshold,
            escalation: EscalationConfig::from_config(&config.fees, &config.execution)?,
            use_chain_estimate: config.fees.use_chain_estimate,
            reevaluate_latest: config.execution.reevaluate_latest,
        })
    }
}

/// Where the coordinator is in the update state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorPhase {
    Idle,
    Evaluating,
    Submitting { attempt: u32 },
    Confirming { attempt: u32, tx_hash: TxHash },
    /// Terminal for the current update; the guard release returns to Idle
    Failed,
}

impl fmt::Display for CoordinatorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorPhase::Idle => write!(f, "idle"),
            CoordinatorPhase::Evaluating => write!(f, "evaluating"),
            CoordinatorPhase::Submitting { attempt } => write!(f, "submitting (attempt {})", attempt),
            CoordinatorPhase::Confirming { attempt, tx_hash } => {
                write!(f, "confirming {} (attempt {})", tx_hash, attempt)
            }
            CoordinatorPhase::Failed => write!(f, "failed"),
        }
    }
}

/// How one decision cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Within threshold of the on-chain price
    NotSignificant,
    /// Another update is in flight; parked for re-evaluation
    Deferred,
    /// Another update is in flight; discarded
    Dropped,
    /// The published price could not be read
    ChainReadFailed(String),
    Confirmed {
        tx_hash: TxHash,
        block_number: u64,
        attempts: u32,
    },
    Failed {
        reason: GiveUpReason,
        failure: SubmissionFailure,
    },
}

impl CycleOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            CycleOutcome::NotSignificant => "not-significant",
            CycleOutcome::Deferred => "deferred",
            CycleOutcome::Dropped => "dropped",
            CycleOutcome::ChainReadFailed(_) => "chain-read-failed",
            CycleOutcome::Confirmed { .. } => "confirmed",
            CycleOutcome::Failed { .. } => "failed",
        }
    }

    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            CycleOutcome::Confirmed { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }
}

/// Result of one decision cycle, logged as a single structured event
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub candidate: PriceSample,
    pub evaluation: Option<Evaluation>,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    pub fn log(&self) {
        let (published, threshold, difference, decision) = match &self.evaluation {
            Some(eval) => (
                eval.published_display(),
                eval.threshold_display(),
                eval.difference_display(),
                eval.decision.name(),
            ),
            None => ("-".to_string(), "-".to_string(), "-".to_string(), "-"),
        };
        let observed = self.candidate.to_string();

        match &self.outcome {
            CycleOutcome::Confirmed {
                tx_hash,
                block_number,
                attempts,
            } => info!(
                observed = %observed,
                published = %published,
                threshold = %threshold,
                difference = %difference,
                decision,
                tx_hash = %tx_hash,
                attempts,
                block = block_number,
                "Price update confirmed"
            ),
            CycleOutcome::Failed { reason, failure } => error!(
                observed = %observed,
                published = %published,
                threshold = %threshold,
                difference = %difference,
                decision,
                attempts = failure.attempt,
                kind = %failure.kind,
                "Price update failed: {} ({})",
                reason,
                failure
            ),
            CycleOutcome::ChainReadFailed(message) => warn!(
                observed = %observed,
                "Skipping cycle, published price unavailable: {}",
                message
            ),
            outcome => info!(
                observed = %observed,
                published = %published,
                threshold = %threshold,
                difference = %difference,
                decision,
                outcome = outcome.name(),
                "Price evaluated"
            ),
        }
    }
}

/// Releases the single-flight guard on every exit path
struct InFlightGuard<'a> {
    phase: &'a RwLock<CoordinatorPhase>,
    flag: &'a AtomicBool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        *self.phase.write() = CoordinatorPhase::Idle;
        self.flag.store(false, Ordering::Release);
    }
}

/// Update coordinator
pub struct UpdateCoordinator {
    chain: Arc<dyn ChainClient>,
    config: CoordinatorConfig,
    policy: ThresholdPolicy,
    strategy: FeeEscalationStrategy,
    in_flight: AtomicBool,
    phase: RwLock<CoordinatorPhase>,
    /// Last on-chain price seen, from a read or a confirmed update
    published: RwLock<Option<PublishedPrice>>,
    /// Latest significant sample that arrived while in flight
    pending: Mutex<Option<PriceSample>>,
    session: RwLock<SessionState>,
}

impl UpdateCoordinator {
    pub fn new(chain: Arc<dyn ChainClient>, config: CoordinatorConfig) -> Self {
        Self {
            chain,
            policy: ThresholdPolicy::new(config.threshold),
            strategy: FeeEscalationStrategy::new(config.escalation.clone()),
            config,
            in_flight: AtomicBool::new(false),
            phase: RwLock::new(CoordinatorPhase::Idle),
            published: RwLock::new(None),
            pending: Mutex::new(None),
            session: RwLock::new(SessionState::default()),
        }
    }

    pub fn phase(&self) -> CoordinatorPhase {
        *self.phase.read()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    pub fn published(&self) -> Option<PublishedPrice> {
        self.published.read().clone()
    }

    /// Session counters with the current guard state
    pub fn session(&self) -> SessionState {
        let mut session = self.session.read().clone();
        session.in_flight = self.is_in_flight();
        session
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    /// Explicit re-read of the on-chain price
    pub async fn refresh_published(&self) -> ChainResult<PublishedPrice> {
        let published = self.chain.get_price().await?;
        *self.published.write() = Some(published.clone());
        Ok(published)
    }

    /// Handle one observed sample.
    ///
    /// Returns the report for `candidate`. Samples parked by concurrent
    /// callers are processed afterwards and logged on their own.
    pub async fn on_sample(&self, candidate: PriceSample) -> CycleReport {
        let report = match self.try_acquire() {
            Some(guard) => {
                let report = self.run_cycle(candidate).await;
                drop(guard);
                report
            }
            None => self.defer(candidate),
        };
        report.log();

        self.drain_pending().await;
        report
    }

    fn try_acquire(&self) -> Option<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard {
                phase: &self.phase,
                flag: &self.in_flight,
            })
    }

    /// Evaluate against the cached price without touching the chain
    fn defer(&self, candidate: PriceSample) -> CycleReport {
        let evaluation = self
            .published()
            .map(|published| self.policy.evaluate(&published, &candidate));

        let significant = evaluation.as_ref().map_or(true, Evaluation::is_significant);
        let outcome = if !significant {
            CycleOutcome::NotSignificant
        } else if self.config.reevaluate_latest {
            *self.pending.lock() = Some(candidate.clone());
            CycleOutcome::Deferred
        } else {
            CycleOutcome::Dropped
        };

        CycleReport {
            candidate,
            evaluation,
            outcome,
        }
    }

    /// Run parked samples while nobody else holds the guard
    async fn drain_pending(&self) {
        while !self.is_in_flight() {
            let next = self.pending.lock().take();
            let Some(sample) = next else {
                return;
            };

            let Some(guard) = self.try_acquire() else {
                // The new holder drains after it releases
                let mut pending = self.pending.lock();
                if pending.is_none() {
                    *pending = Some(sample);
                }
                return;
            };

            debug!("Re-evaluating deferred sample {}", sample);
            let report = self.run_cycle(sample).await;
            drop(guard);
            report.log();
        }
    }

    async fn run_cycle(&self, candidate: PriceSample) -> CycleReport {
        self.set_phase(CoordinatorPhase::Evaluating);
        self.session.write().cycles += 1;

        let published = match self.refresh_published().await {
            Ok(published) => published,
            Err(e) => {
                return CycleReport {
                    candidate,
                    evaluation: None,
                    outcome: CycleOutcome::ChainReadFailed(e.to_string()),
                }
            }
        };

        let evaluation = self.policy.evaluate(&published, &candidate);
        if !evaluation.is_significant() {
            return CycleReport {
                candidate,
                evaluation: Some(evaluation),
                outcome: CycleOutcome::NotSignificant,
            };
        }

        let outcome = self.submit(&candidate).await;
        CycleReport {
            candidate,
            evaluation: Some(evaluation),
            outcome,
        }
    }

    /// Bounded submit loop for one logical update
    async fn submit(&self, candidate: &PriceSample) -> CycleOutcome {
        let estimate = if self.config.use_chain_estimate {
            match self.chain.fee_estimate().await {
                Ok(bid) => Some(bid),
                Err(e) => {
                    warn!("Fee estimate unavailable, using configured bid: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let mut attempt = SubmissionAttempt::first(self.strategy.opening_bid(estimate));

        loop {
            match self.attempt(candidate, &mut attempt).await {
                Ok(receipt) => {
                    self.record_confirmed(candidate, &receipt);
                    return CycleOutcome::Confirmed {
                        tx_hash: receipt.tx_hash,
                        block_number: receipt.block_number,
                        attempts: attempt.attempt_number,
                    };
                }
                Err(e) => {
                    let failure = SubmissionFailure::new(
                        &e,
                        attempt.nonce,
                        attempt.fee_bid,
                        attempt.attempt_number,
                    );

                    match self.strategy.next(&attempt, failure.kind) {
                        RetryDecision::Retry(next) => {
                            warn!(
                                kind = %failure.kind,
                                nonce = ?failure.nonce,
                                fee = %failure.fee,
                                "Attempt {} failed, retrying with {}: {}",
                                failure.attempt,
                                next.fee_bid,
                                failure.message
                            );
                            attempt = next;
                        }
                        RetryDecision::GiveUp(reason) => {
                            self.set_phase(CoordinatorPhase::Failed);
                            self.session.write().transactions_failed += 1;
                            return CycleOutcome::Failed { reason, failure };
                        }
                    }
                }
            }
        }
    }

    /// One broadcast and its confirmation wait
    async fn attempt(
        &self,
        candidate: &PriceSample,
        attempt: &mut SubmissionAttempt,
    ) -> ChainResult<Receipt> {
        self.set_phase(CoordinatorPhase::Submitting {
            attempt: attempt.attempt_number,
        });

        let nonce = match attempt.nonce {
            Some(nonce) => nonce,
            None => {
                let nonce = self.chain.latest_nonce(self.config.wallet).await?;
                attempt.nonce = Some(nonce);
                nonce
            }
        };

        let handle = self
            .chain
            .submit_update(candidate, &attempt.fee_bid, nonce)
            .await?;

        info!(
            tx_hash = %handle.hash,
            nonce,
            fee = %handle.fee,
            "Submitted price update {} (attempt {})",
            candidate,
            attempt.attempt_number
        );

        self.set_phase(CoordinatorPhase::Confirming {
            attempt: attempt.attempt_number,
            tx_hash: handle.hash,
        });

        self.chain.wait_for_confirmation(&handle).await
    }

    fn record_confirmed(&self, candidate: &PriceSample, receipt: &Receipt) {
        *self.published.write() = Some(PublishedPrice::from_confirmed(candidate));

        let mut session = self.session.write();
        session.transactions_confirmed += 1;
        session.last_confirmed_at = Some(Utc::now());
        session.last_tx_hash = Some(receipt.tx_hash);
    }

    fn set_phase(&self, phase: CoordinatorPhase) {
        *self.phase.write() = phase;
    }
}

impl fmt::Debug for UpdateCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateCoordinator")
            .field("phase", &self.phase())
            .field("in_flight", &self.is_in_flight())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedChain;
    use alloy_primitives::U256;
    use oracle_core::{ChainError, FailureKind, FeeBid};
    use std::time::Duration;

    fn gwei(n: u64) -> U256 {
        U256::from(n) * U256::from(1_000_000_000u64)
    }

    fn config(max_attempts: u32) -> CoordinatorConfig {
        CoordinatorConfig {
            wallet: Address::repeat_byte(0x22),
            threshold: ThresholdConfig::new(100, 10_000),
            escalation: EscalationConfig {
                initial: FeeBid::legacy(gwei(10)),
                increment: gwei(1),
                fallback: FeeBid::legacy(gwei(20)),
                cap: gwei(100),
                max_attempts,
            },
            use_chain_estimate: false,
            reevaluate_latest: true,
        }
    }

    fn sample(value: u64) -> PriceSample {
        PriceSample::new(U256::from(value), 8)
    }

    fn underpriced() -> ChainResult<()> {
        Err(ChainError::ReplacementUnderpriced(
            "replacement transaction underpriced".to_string(),
        ))
    }

    async fn wait_for_phase(coordinator: &UpdateCoordinator, done: impl Fn(CoordinatorPhase) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done(coordinator.phase()) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("coordinator never reached the expected phase");
    }

    #[tokio::test]
    async fn test_not_significant_has_no_side_effects() {
        let chain = Arc::new(ScriptedChain::new(100_00000000, 8));
        let coordinator = UpdateCoordinator::new(chain.clone(), config(5));

        let report = coordinator.on_sample(sample(100_50000000)).await;

        assert_eq!(report.outcome, CycleOutcome::NotSignificant);
        assert!(chain.submissions().is_empty());
        assert_eq!(coordinator.phase(), CoordinatorPhase::Idle);
        assert_eq!(coordinator.session().cycles, 1);
        assert_eq!(coordinator.session().transactions_confirmed, 0);
    }

    #[tokio::test]
    async fn test_confirmed_update_round_trip() {
        let chain = Arc::new(ScriptedChain::new(100_00000000, 8));
        chain.set_nonce(7);
        let coordinator = UpdateCoordinator::new(chain.clone(), config(5));

        let report = coordinator.on_sample(sample(101_01000000)).await;

        match report.outcome {
            CycleOutcome::Confirmed {
                attempts,
                block_number,
                ..
            } => {
                assert_eq!(attempts, 1);
                assert_eq!(block_number, 107);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let published = coordinator.published().unwrap();
        assert_eq!(published.value, U256::from(101_01000000u64));
        assert_eq!(published.decimals, 8);

        let session = coordinator.session();
        assert_eq!(session.transactions_confirmed, 1);
        assert!(session.last_confirmed_at.is_some());
        assert!(session.last_tx_hash.is_some());
        assert!(!session.in_flight);

        let submissions = chain.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].nonce, 7);
        assert_eq!(submissions[0].fee, FeeBid::legacy(gwei(10)));
    }

    #[tokio::test]
    async fn test_underpriced_escalates_then_fails_at_attempt_cap() {
        let chain = Arc::new(ScriptedChain::new(100_00000000, 8));
        chain.set_nonce(3);
        chain.script_submit([underpriced(), underpriced(), underpriced(), underpriced()]);
        let coordinator = UpdateCoordinator::new(chain.clone(), config(4));

        let report = coordinator.on_sample(sample(101_01000000)).await;

        match &report.outcome {
            CycleOutcome::Failed { reason, failure } => {
                assert_eq!(*reason, GiveUpReason::AttemptsExhausted { attempts: 4 });
                assert_eq!(failure.kind, FailureKind::ReplacementUnderpriced);
                assert_eq!(failure.fee, FeeBid::legacy(gwei(13)));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let fees: Vec<_> = chain.submissions().iter().map(|s| s.fee.ceiling()).collect();
        assert_eq!(fees, vec![gwei(10), gwei(11), gwei(12), gwei(13)]);
        assert!(chain.submissions().iter().all(|s| s.nonce == 3));
        assert_eq!(chain.nonce_fetches(), 1);

        assert_eq!(coordinator.phase(), CoordinatorPhase::Idle);
        assert_eq!(coordinator.session().transactions_failed, 1);
    }

    #[tokio::test]
    async fn test_underpriced_then_confirmed() {
        let chain = Arc::new(ScriptedChain::new(100_00000000, 8));
        chain.script_submit([underpriced(), underpriced()]);
        let coordinator = UpdateCoordinator::new(chain.clone(), config(5));

        let report = coordinator.on_sample(sample(101_01000000)).await;

        assert!(matches!(
            report.outcome,
            CycleOutcome::Confirmed { attempts: 3, .. }
        ));
        assert_eq!(chain.submissions()[2].fee, FeeBid::legacy(gwei(12)));
        assert_eq!(coordinator.session().transactions_confirmed, 1);
    }

    #[tokio::test]
    async fn test_insufficient_funds_fails_without_retry() {
        let chain = Arc::new(ScriptedChain::new(100_00000000, 8));
        chain.script_submit([Err(ChainError::InsufficientFunds(
            "insufficient funds for gas * price + value".to_string(),
        ))]);
        let coordinator = UpdateCoordinator::new(chain.clone(), config(5));

        let report = coordinator.on_sample(sample(101_01000000)).await;

        match &report.outcome {
            CycleOutcome::Failed { reason, failure } => {
                assert_eq!(*reason, GiveUpReason::Fatal(FailureKind::InsufficientFunds));
                assert_eq!(failure.attempt, 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(chain.submissions().len(), 1);
        assert_eq!(coordinator.phase(), CoordinatorPhase::Idle);

        // Guard released: the next significant sample submits again
        let report = coordinator.on_sample(sample(101_01000000)).await;
        assert!(matches!(report.outcome, CycleOutcome::Confirmed { .. }));
    }

    #[tokio::test]
    async fn test_stale_nonce_is_refetched() {
        let chain = Arc::new(ScriptedChain::new(100_00000000, 8));
        chain.set_nonce(4);
        chain.script_submit([Err(ChainError::NonceStale("nonce too low".to_string()))]);
        let coordinator = UpdateCoordinator::new(chain.clone(), config(5));

        let report = coordinator.on_sample(sample(101_01000000)).await;

        assert!(matches!(
            report.outcome,
            CycleOutcome::Confirmed { attempts: 2, .. }
        ));
        assert_eq!(chain.nonce_fetches(), 2);
        let submissions = chain.submissions();
        assert_eq!(submissions[0].fee, submissions[1].fee);
    }

    #[tokio::test]
    async fn test_unsupported_fee_field_falls_back_to_legacy() {
        let chain = Arc::new(ScriptedChain::new(100_00000000, 8));
        chain.script_submit([Err(ChainError::UnsupportedFeeField(
            "transaction type not supported".to_string(),
        ))]);
        let mut config = config(5);
        config.escalation.initial = FeeBid::eip1559(gwei(30), gwei(2));
        let coordinator = UpdateCoordinator::new(chain.clone(), config);

        let report = coordinator.on_sample(sample(101_01000000)).await;

        assert!(matches!(report.outcome, CycleOutcome::Confirmed { .. }));
        assert_eq!(chain.submissions()[1].fee, FeeBid::legacy(gwei(20)));
    }

    #[tokio::test]
    async fn test_unsupported_fee_field_twice_gives_up() {
        let chain = Arc::new(ScriptedChain::new(100_00000000, 8));
        let unsupported = || {
            Err(ChainError::UnsupportedFeeField(
                "transaction type not supported".to_string(),
            ))
        };
        chain.script_submit([unsupported(), unsupported()]);
        let coordinator = UpdateCoordinator::new(chain.clone(), config(5));

        let report = coordinator.on_sample(sample(101_01000000)).await;

        assert!(matches!(
            report.outcome,
            CycleOutcome::Failed {
                reason: GiveUpReason::FallbackExhausted,
                ..
            }
        ));
        assert_eq!(chain.submissions().len(), 2);
    }

    #[tokio::test]
    async fn test_chain_read_failure_skips_cycle() {
        let chain = Arc::new(ScriptedChain::new(100_00000000, 8));
        chain.fail_price_read(ChainError::Other("connection refused".to_string()));
        let coordinator = UpdateCoordinator::new(chain.clone(), config(5));

        let report = coordinator.on_sample(sample(101_01000000)).await;

        assert!(matches!(report.outcome, CycleOutcome::ChainReadFailed(_)));
        assert!(report.evaluation.is_none());
        assert!(chain.submissions().is_empty());
        assert_eq!(coordinator.phase(), CoordinatorPhase::Idle);
    }

    #[tokio::test]
    async fn test_uninitialized_contract_is_updated() {
        let chain = Arc::new(ScriptedChain::new(0, 8));
        let coordinator = UpdateCoordinator::new(chain.clone(), config(5));

        let report = coordinator.on_sample(sample(1)).await;
        assert!(matches!(report.outcome, CycleOutcome::Confirmed { .. }));
    }

    #[tokio::test]
    async fn test_opening_bid_from_chain_estimate() {
        let chain = Arc::new(ScriptedChain::new(100_00000000, 8));
        chain.set_fee_estimate(FeeBid::legacy(gwei(250)));
        let mut config = config(5);
        config.use_chain_estimate = true;
        let coordinator = UpdateCoordinator::new(chain.clone(), config);

        coordinator.on_sample(sample(101_01000000)).await;
        assert_eq!(chain.submissions()[0].fee, FeeBid::legacy(gwei(100)));
    }

    #[tokio::test]
    async fn test_single_flight_reevaluates_latest() {
        let chain = Arc::new(ScriptedChain::new(100_00000000, 8).gated());
        let coordinator = Arc::new(UpdateCoordinator::new(chain.clone(), config(5)));

        let first = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.on_sample(sample(101_01000000)).await }
        });
        wait_for_phase(&coordinator, |phase| {
            matches!(phase, CoordinatorPhase::Confirming { .. })
        })
        .await;

        // Both arrive while the first update is in flight; the latest wins
        let second = coordinator.on_sample(sample(102_50000000)).await;
        let third = coordinator.on_sample(sample(103_00000000)).await;
        assert_eq!(second.outcome, CycleOutcome::Deferred);
        assert_eq!(third.outcome, CycleOutcome::Deferred);
        assert_eq!(chain.submissions().len(), 1);

        chain.release(2);
        let report = first.await.unwrap();
        assert!(matches!(report.outcome, CycleOutcome::Confirmed { .. }));

        assert_eq!(chain.max_active(), 1);
        let submissions = chain.submissions();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[1].value, U256::from(103_00000000u64));
        assert_eq!(coordinator.session().transactions_confirmed, 2);
        assert!(!coordinator.has_pending());
        assert_eq!(coordinator.phase(), CoordinatorPhase::Idle);
    }

    #[tokio::test]
    async fn test_single_flight_drops_without_reevaluation() {
        let chain = Arc::new(ScriptedChain::new(100_00000000, 8).gated());
        let mut config = config(5);
        config.reevaluate_latest = false;
        let coordinator = Arc::new(UpdateCoordinator::new(chain.clone(), config));

        let first = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.on_sample(sample(101_01000000)).await }
        });
        wait_for_phase(&coordinator, |phase| {
            matches!(phase, CoordinatorPhase::Confirming { .. })
        })
        .await;

        let second = coordinator.on_sample(sample(103_00000000)).await;
        assert_eq!(second.outcome, CycleOutcome::Dropped);
        assert!(coordinator.is_in_flight());

        chain.release(1);
        first.await.unwrap();

        assert_eq!(chain.submissions().len(), 1);
        assert_eq!(coordinator.phase(), CoordinatorPhase::Idle);
        assert!(!coordinator.is_in_flight());
    }

    #[tokio::test]
    async fn test_deferred_sample_within_threshold_is_not_parked() {
        let chain = Arc::new(ScriptedChain::new(100_00000000, 8).gated());
        let coordinator = Arc::new(UpdateCoordinator::new(chain.clone(), config(5)));

        let first = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.on_sample(sample(101_01000000)).await }
        });
        wait_for_phase(&coordinator, |phase| {
            matches!(phase, CoordinatorPhase::Confirming { .. })
        })
        .await;

        // Cached price is still the pre-update read
        let report = coordinator.on_sample(sample(100_10000000)).await;
        assert_eq!(report.outcome, CycleOutcome::NotSignificant);
        assert!(!coordinator.has_pending());

        chain.release(1);
        first.await.unwrap();
        assert_eq!(chain.submissions().len(), 1);
    }

    #[tokio::test]
    async fn test_unrelated_unsupported_error_is_not_retried() {
        let chain = Arc::new(ScriptedChain::new(100_00000000, 8));
        let message = "Unsupported method: eth_sendRawTransaction. See available methods";
        chain.script_submit([
            Err(ChainError::classify(message)),
            Err(ChainError::classify(message)),
        ]);
        let coordinator = UpdateCoordinator::new(chain.clone(), config(5));

        let report = coordinator.on_sample(sample(101_01000000)).await;

        match &report.outcome {
            CycleOutcome::Failed { reason, .. } => {
                assert_eq!(*reason, GiveUpReason::Fatal(FailureKind::Other));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(chain.submissions().len(), 1);
    }

    #[tokio::test]
    async fn test_aborted_cycle_releases_guard() {
        let chain = Arc::new(ScriptedChain::new(100_00000000, 8).gated());
        let coordinator = Arc::new(UpdateCoordinator::new(chain.clone(), config(5)));

        let first = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.on_sample(sample(101_01000000)).await }
        });
        wait_for_phase(&coordinator, |phase| {
            matches!(phase, CoordinatorPhase::Confirming { .. })
        })
        .await;
        assert!(coordinator.is_in_flight());

        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());

        assert_eq!(coordinator.phase(), CoordinatorPhase::Idle);
        assert!(!coordinator.is_in_flight());
        assert_eq!(coordinator.session().transactions_confirmed, 0);

        // Abandoned broadcast never confirmed; the next sample starts a fresh update
        chain.release(1);
        let report = coordinator.on_sample(sample(102_00000000)).await;
        assert!(matches!(report.outcome, CycleOutcome::Confirmed { .. }));
        assert_eq!(chain.submissions().len(), 2);
        assert_eq!(chain.published().value, U256::from(102_00000000u64));
        assert!(!coordinator.is_in_flight());
    }
}

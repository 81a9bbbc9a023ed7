//! The scheduled tick: eligibility, scoring, decision, exactly-once
//! execution, audit.

use crate::audit_writer::AuditWriter;
use crate::decision::{decide, Decision, HoldReason};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use folio_core::config::{EngineConfig, SizingConfig};
use folio_core::types::{OrderRequest, OrderSide, PortfolioContext};
use folio_core::{EngineError, ExecutionHandler, MarketDataProvider, PhaseProvider, Timeframe};
use folio_positions::{
    AuditOutcome, AuditRecord, AuditSink, FeatureSet, Position, PositionStatus, PositionStore,
};
use folio_risk::{resolve_scores, RiskScores};
use folio_trend::{bootstrap, TrendContext, TrendEngine, TrendOutput};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// How much history a bootstrap replay consumes at most.
const BOOTSTRAP_WINDOW: usize = 500;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub engine: EngineConfig,
    pub sizing: SizingConfig,
    pub dry_run: bool,
}

/// Per-tick counters, for the log line and for tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub evaluated: usize,
    pub executed: usize,
    pub held: usize,
    pub skipped_duplicate: usize,
    pub failed: usize,
    pub bootstrapped: usize,
}

pub struct Orchestrator {
    store: Arc<dyn PositionStore>,
    market: Arc<dyn MarketDataProvider>,
    phase: Arc<dyn PhaseProvider>,
    executor: Arc<dyn ExecutionHandler>,
    audit: AuditWriter,
    engine: TrendEngine,
    config: OrchestratorConfig,
    dry_run: AtomicBool,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        store: Arc<dyn PositionStore>,
        market: Arc<dyn MarketDataProvider>,
        phase: Arc<dyn PhaseProvider>,
        executor: Arc<dyn ExecutionHandler>,
        audit_sink: Arc<dyn AuditSink>,
        config: OrchestratorConfig,
    ) -> Self {
        let engine = TrendEngine::new((&config.engine).into());
        let dry_run = AtomicBool::new(config.dry_run);
        Self {
            store,
            market,
            phase,
            executor,
            audit: AuditWriter::spawn(audit_sink),
            engine,
            config,
            dry_run,
        }
    }

    /// Flips live execution on or off at runtime (the dry-run switch).
    pub fn set_dry_run(&self, dry_run: bool) {
        self.dry_run.store(dry_run, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run.load(Ordering::Relaxed)
    }

    /// Runs one tick for a timeframe.
    ///
    /// Position failures are isolated: one position's error is logged and
    /// counted, never aborting its siblings. Only a failure to obtain the
    /// portfolio context abandons the whole tick (it will be retried at the
    /// next schedule).
    ///
    /// # Errors
    ///
    /// Returns an error if the portfolio context or the position lists
    /// cannot be fetched.
    pub async fn tick(&self, timeframe: Timeframe) -> Result<TickSummary> {
        let portfolio = self
            .phase
            .current()
            .await
            .context("Failed to fetch portfolio context")?;

        let mut summary = TickSummary::default();

        for position in self.store.bootstrap_positions(timeframe).await? {
            match self.bootstrap_position(&position).await {
                Ok(()) => summary.bootstrapped += 1,
                Err(e) => {
                    error!(position = %position.key(), "Bootstrap failed: {e:#}");
                    summary.failed += 1;
                }
            }
        }

        for position in self.store.eligible_positions(timeframe).await? {
            summary.evaluated += 1;
            match self.evaluate_position(&position, &portfolio).await {
                Ok(outcome) => match outcome {
                    Evaluation::Executed => summary.executed += 1,
                    Evaluation::Held => summary.held += 1,
                    Evaluation::SkippedDuplicate => summary.skipped_duplicate += 1,
                    Evaluation::ExecutionFailed => summary.failed += 1,
                },
                Err(e) => {
                    error!(position = %position.key(), "Evaluation failed: {e:#}");
                    summary.failed += 1;
                }
            }
        }

        // Tick boundary: everything recorded above is durable before the
        // summary goes out. Individual trades never waited on this.
        self.audit.flush().await;

        info!(
            timeframe = %timeframe,
            evaluated = summary.evaluated,
            executed = summary.executed,
            held = summary.held,
            skipped = summary.skipped_duplicate,
            failed = summary.failed,
            bootstrapped = summary.bootstrapped,
            "Tick complete"
        );
        Ok(summary)
    }

    /// Converges a dormant position's state machine and promotes it once the
    /// bar threshold is reached. Never produces tradable signals.
    async fn bootstrap_position(&self, position: &Position) -> Result<()> {
        let bars = self
            .market
            .bar_count(&position.instrument, position.timeframe)
            .await?;
        let series = self
            .market
            .snapshots(&position.instrument, position.timeframe, BOOTSTRAP_WINDOW)
            .await?;

        let ctx = bootstrap::converge(&self.engine, &series, bars);
        let mut features = position.features.clone();
        features.indicators = series.last().cloned();
        features.trend_context = Some(ctx);
        features.trend_output = None;
        self.store.refresh_features(position.id, features).await?;

        let before = position.status;
        let after = self
            .store
            .record_bars_count(position.id, bars, self.config.engine.min_bars)
            .await?;
        if before != after {
            self.audit.record(status_record(position, before, after));
        }
        Ok(())
    }

    async fn evaluate_position(
        &self,
        position: &Position,
        portfolio: &PortfolioContext,
    ) -> Result<Evaluation> {
        if let Err(violation) = position.check_invariants() {
            // Fatal for this position this tick; siblings keep going.
            error!(position = %position.key(), "{}", EngineError::InvariantViolation(violation));
            return Ok(Evaluation::Held);
        }

        let now = Utc::now();
        let bars = self
            .market
            .bar_count(&position.instrument, position.timeframe)
            .await?;
        self.store
            .record_bars_count(position.id, bars, self.config.engine.min_bars)
            .await?;

        if bars < self.config.engine.min_bars {
            warn!(
                position = %position.key(),
                "{}",
                EngineError::InsufficientHistory {
                    have: bars,
                    need: self.config.engine.min_bars
                }
            );
            self.hold(position, &RiskScores { aggression: 0.0, exit_pressure: 0.0 }, None, HoldReason::InsufficientHistory);
            return Ok(Evaluation::Held);
        }

        let series = self
            .market
            .snapshots(&position.instrument, position.timeframe, 2)
            .await?;
        let Some(latest) = series.last() else {
            self.hold(position, &RiskScores { aggression: 0.0, exit_pressure: 0.0 }, None, HoldReason::MissingFeatures);
            return Ok(Evaluation::Held);
        };

        let prev_ctx = position
            .features
            .trend_context
            .clone()
            .unwrap_or_else(TrendContext::default);
        let (next_ctx, output) = self.engine.evaluate(&prev_ctx, latest, bars);

        let ttl = Duration::seconds(self.config.engine.score_ttl_secs);
        let (scores, refreshed) = resolve_scores(position, portfolio, now, ttl);

        self.store
            .refresh_features(
                position.id,
                FeatureSet {
                    version: position.features.version,
                    indicators: Some(latest.clone()),
                    trend_context: Some(next_ctx),
                    trend_output: Some(output.clone()),
                    risk: refreshed.or(position.features.risk),
                },
            )
            .await?;

        let decision = decide(position, &output, &scores, &self.config.sizing);

        if let Decision::Hold { reason } = decision {
            self.hold(position, &scores, Some(&output), reason);
            return Ok(Evaluation::Held);
        }

        if self.is_dry_run() {
            self.audit.record(decision_record(
                position,
                &decision,
                &scores,
                Some(&output),
                AuditOutcome::DryRun,
            ));
            return Ok(Evaluation::Held);
        }

        let window = Duration::seconds(self.config.engine.idempotency_window_secs);
        let claimed = self.store.try_claim_execution(position.id, now, window).await?;
        if !claimed {
            info!(
                position = %position.key(),
                "{}",
                EngineError::DuplicateExecution(position.key())
            );
            self.audit.record(decision_record(
                position,
                &decision,
                &scores,
                Some(&output),
                AuditOutcome::SkippedDuplicate,
            ));
            return Ok(Evaluation::SkippedDuplicate);
        }

        self.execute(position, &decision, &scores, &output).await
    }

    /// One attempt, synchronous, no automatic retry: a failed financial
    /// trade is recorded and left for operator attention.
    async fn execute(
        &self,
        position: &Position,
        decision: &Decision,
        scores: &RiskScores,
        output: &TrendOutput,
    ) -> Result<Evaluation> {
        let price = self.market.latest_price(&position.instrument).await?;
        let (side, quantity, notional) = match decision {
            Decision::Add { notional, .. } => {
                (OrderSide::Buy, (notional / price).round_dp(8), *notional)
            }
            Decision::Trim { quantity, .. } | Decision::Exit { quantity, .. } => {
                (OrderSide::Sell, *quantity, (quantity * price).round_dp(8))
            }
            Decision::Hold { .. } => unreachable!("hold decisions never reach execution"),
        };

        let order = OrderRequest {
            instrument: position.instrument.clone(),
            venue: position.venue.clone(),
            side,
            quantity,
            notional,
            price_hint: price,
            timestamp: Utc::now(),
        };

        match self.executor.execute_order(order).await {
            Ok(fill) => {
                let applied = self
                    .store
                    .record_execution(position.id, side, &fill)
                    .await?;
                info!(
                    position = %position.key(),
                    decision = decision.kind(),
                    quantity = %fill.quantity,
                    price = %fill.price,
                    reference = %fill.reference,
                    "Executed"
                );
                self.audit.record(decision_record(
                    position,
                    decision,
                    scores,
                    Some(output),
                    AuditOutcome::Executed {
                        reference: fill.reference.clone(),
                        price: fill.price,
                        quantity: fill.quantity,
                        notional: fill.notional,
                    },
                ));
                if let Some((from, to)) = applied.status_change {
                    self.audit.record(status_record(position, from, to));
                }
                Ok(Evaluation::Executed)
            }
            Err(e) => {
                // Position state untouched; surfaced for the operator.
                error!(position = %position.key(), "Execution failed: {e:#}");
                self.audit.record(decision_record(
                    position,
                    decision,
                    scores,
                    Some(output),
                    AuditOutcome::Failed {
                        error: format!("{e:#}"),
                    },
                ));
                Ok(Evaluation::ExecutionFailed)
            }
        }
    }

    fn hold(
        &self,
        position: &Position,
        scores: &RiskScores,
        output: Option<&TrendOutput>,
        reason: HoldReason,
    ) {
        self.audit.record(decision_record(
            position,
            &Decision::Hold { reason },
            scores,
            output,
            AuditOutcome::Held {
                reason: reason.as_str().to_string(),
            },
        ));
    }
}

fn decision_record(
    position: &Position,
    decision: &Decision,
    scores: &RiskScores,
    output: Option<&TrendOutput>,
    outcome: AuditOutcome,
) -> AuditRecord {
    let snapshot = serde_json::json!({
        "state": output.map(|o| o.state.as_str()),
        "flags": output.map(|o| o.flags),
        "scores": output.map(|o| o.scores),
        "decision": decision,
    });
    AuditRecord::new(
        position.id,
        position.instrument.clone(),
        position.venue.clone(),
        position.timeframe,
        decision.kind(),
        decision.size_fraction(),
        scores.aggression,
        scores.exit_pressure,
        snapshot,
        outcome,
    )
}

fn status_record(position: &Position, from: PositionStatus, to: PositionStatus) -> AuditRecord {
    AuditRecord::new(
        position.id,
        position.instrument.clone(),
        position.venue.clone(),
        position.timeframe,
        "status",
        0.0,
        0.0,
        0.0,
        serde_json::json!({ "from": from.as_str(), "to": to.as_str() }),
        AuditOutcome::StatusChanged { from, to },
    )
}

enum Evaluation {
    Executed,
    Held,
    SkippedDuplicate,
    ExecutionFailed,
}

// Signal Generation Pipeline
// Runs one detection cycle: fetch, reconcile, classify, score, size, emit

use super::anomaly::{AnomalyClassifier, AnomalyThresholds};
use super::confidence::{ConfidenceResult, ConfidenceRules, ConfidenceScorer};
use super::notify::Notifier;
use super::reconcile::{PriceReconciler, ReconcileFault, DEFAULT_TOLERANCE_PCT};
use super::signals::TradeSignal;
use super::sources::{MarketDataSource, NewsSource};
use super::storage::{SignalEvent, SignalStore};
use anyhow::bail;
use chrono::Utc;
use common::{Candidate, MarketSnapshot, NewsEvidence, QuoteBook};
use portfolio_risk::{ExposureViolation, RiskConfig, RiskManager, RiskPlan, RiskRejection, SizingError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration for the signal generation pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Enable/disable signal generation
    pub enabled: bool,
    /// Tracked universe; this order is the snapshot iteration order
    pub tracked_assets: Vec<String>,
    /// Green/red bucket thresholds
    pub thresholds: AnomalyThresholds,
    /// Maximum provider disagreement in percent
    pub reconcile_tolerance_pct: f64,
    /// Minimum confidence score (0-100) before a candidate is sized
    pub min_confidence: u8,
    /// Confidence rule table
    pub rules: ConfidenceRules,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tracked_assets: ["BTC", "ETH", "SOL", "BNB"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            thresholds: AnomalyThresholds::default(),
            reconcile_tolerance_pct: DEFAULT_TOLERANCE_PCT,
            min_confidence: 60,
            rules: ConfidenceRules::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tracked_assets.is_empty() {
            bail!("tracked_assets must not be empty");
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = self.tracked_assets.iter().find(|a| !seen.insert(a.as_str())) {
            bail!("tracked asset {} is listed more than once", duplicate);
        }
        if !(self.thresholds.green_pct > self.thresholds.red_pct) {
            bail!(
                "green threshold {} must be above red threshold {}",
                self.thresholds.green_pct,
                self.thresholds.red_pct
            );
        }
        if !(self.reconcile_tolerance_pct >= 0.0) {
            bail!(
                "reconcile_tolerance_pct must be non-negative, got {}",
                self.reconcile_tolerance_pct
            );
        }
        if self.min_confidence > 100 {
            bail!("min_confidence must be at most 100, got {}", self.min_confidence);
        }
        self.rules.validate()?;
        Ok(())
    }
}

/// Per-cycle account state supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct CycleContext {
    pub equity: f64,
    /// Plans still open; used for the exposure limits
    pub open_positions: Vec<RiskPlan>,
}

impl CycleContext {
    pub fn new(equity: f64) -> Self {
        Self {
            equity,
            open_positions: Vec::new(),
        }
    }
}

/// Which downstream deliveries of an emitted signal succeeded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub stored: bool,
    pub notified: bool,
}

/// A green candidate with its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub confidence: ConfidenceResult,
    pub article_count: Option<u32>,
}

/// Terminal state of a cycle; every variant is a normal, recoverable outcome
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Disabled,
    NoData { reason: String },
    NoAnomaly { green: usize, red: usize, total_assets: usize },
    BelowConfidenceThreshold { asset_id: String, score: u8, min_confidence: u8 },
    SizingFailed { asset_id: String, error: SizingError },
    ExposureLimited { asset_id: String, violation: ExposureViolation },
    Emitted { signal: Box<TradeSignal>, delivery: DeliveryReport },
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Disabled => "disabled",
            CycleOutcome::NoData { .. } => "no_data",
            CycleOutcome::NoAnomaly { .. } => "no_anomaly",
            CycleOutcome::BelowConfidenceThreshold { .. } => "below_threshold",
            CycleOutcome::SizingFailed { .. } => "sizing_failed",
            CycleOutcome::ExposureLimited { .. } => "exposure_limited",
            CycleOutcome::Emitted { .. } => "emitted",
        }
    }

    pub fn signal(&self) -> Option<&TradeSignal> {
        match self {
            CycleOutcome::Emitted { signal, .. } => Some(signal.as_ref()),
            _ => None,
        }
    }
}

/// Everything a cycle produced
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    /// Assets dropped during reconciliation, in tracked order
    pub excluded: Vec<ReconcileFault>,
    pub snapshot_size: usize,
    /// Highest-scoring candidate, when scoring ran
    pub best: Option<ScoredCandidate>,
}

/// Signal generation pipeline
pub struct SignalPipeline {
    source: Arc<dyn MarketDataSource>,
    news: Option<Arc<dyn NewsSource>>,
    store: Option<Arc<dyn SignalStore>>,
    notifier: Option<Arc<dyn Notifier>>,
    reconciler: PriceReconciler,
    classifier: AnomalyClassifier,
    scorer: ConfidenceScorer,
    risk: RiskManager,
    config: PipelineConfig,
}

impl SignalPipeline {
    /// Create a new signal pipeline
    pub fn new(mut config: PipelineConfig, risk: RiskConfig, source: Arc<dyn MarketDataSource>) -> Self {
        config.tracked_assets = dedup_assets(config.tracked_assets);
        Self {
            source,
            news: None,
            store: None,
            notifier: None,
            reconciler: PriceReconciler::new(config.reconcile_tolerance_pct),
            classifier: AnomalyClassifier::new(config.thresholds),
            scorer: ConfidenceScorer::new(config.rules.clone()),
            risk: RiskManager::with_config(risk),
            config,
        }
    }

    /// Set the news source used as scoring evidence
    pub fn with_news(mut self, news: Arc<dyn NewsSource>) -> Self {
        info!("Setting news source");
        self.news = Some(news);
        self
    }

    /// Set signal storage
    pub fn with_store(mut self, store: Arc<dyn SignalStore>) -> Self {
        info!("Setting signal storage");
        self.store = Some(store);
        self
    }

    /// Set the notifier for emitted signals
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        info!("Setting signal notifier");
        self.notifier = Some(notifier);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run a single cycle to its terminal outcome
    ///
    /// Price checks and the verdict are buffered and reach the store only once
    /// the cycle has settled; a cycle dropped part way writes nothing.
    pub async fn run_cycle(&self, ctx: &CycleContext) -> CycleReport {
        let mut trace = CycleTrace::default();
        let decision = self.decide(ctx, &mut trace).await;

        for event in &trace.events {
            self.record(event).await;
        }

        let outcome = match decision {
            Decision::Finished(outcome) => outcome,
            Decision::Emit(signal) => {
                let delivery = self.emit(&signal).await;

                info!(
                    signal_id = %signal.id,
                    asset = %signal.asset_id(),
                    score = signal.score(),
                    entry = signal.plan.entry_price,
                    stop = signal.plan.stop_price,
                    target = signal.plan.take_profit_price,
                    size = signal.plan.size,
                    "Trade signal emitted"
                );

                CycleOutcome::Emitted { signal, delivery }
            }
        };

        CycleReport {
            outcome,
            excluded: trace.excluded,
            snapshot_size: trace.snapshot_size,
            best: trace.best,
        }
    }

    /// FETCH through SIZE; returns the signal to emit or the outcome that ended the cycle
    async fn decide(&self, ctx: &CycleContext, trace: &mut CycleTrace) -> Decision {
        if !self.config.enabled {
            debug!("Pipeline is disabled, skipping cycle");
            return Decision::Finished(CycleOutcome::Disabled);
        }

        // FETCH
        let book = match self.source.fetch(&self.config.tracked_assets).await {
            Ok(book) if !book.is_empty() => book,
            Ok(_) => {
                warn!("Data source returned no quotes");
                return Decision::Finished(CycleOutcome::NoData {
                    reason: "no quotes returned".to_string(),
                });
            }
            Err(e) => {
                warn!("Market data fetch failed: {:#}", e);
                return Decision::Finished(CycleOutcome::NoData {
                    reason: e.to_string(),
                });
            }
        };

        // RECONCILE
        let snapshot = self.build_snapshot(&book, trace);
        trace.snapshot_size = snapshot.len();

        if snapshot.is_empty() {
            warn!(excluded = trace.excluded.len(), "No asset passed reconciliation");
            return Decision::Finished(CycleOutcome::NoData {
                reason: "no asset passed reconciliation".to_string(),
            });
        }

        // CLASSIFY
        let verdict = self.classifier.classify(&snapshot);
        trace.events.push(SignalEvent::Verdict(verdict.summary()));

        if !verdict.is_anomaly {
            info!(
                green = verdict.green.len(),
                red = verdict.red.len(),
                total = verdict.total_assets,
                "No anomaly in snapshot"
            );
            return Decision::Finished(CycleOutcome::NoAnomaly {
                green: verdict.green.len(),
                red: verdict.red.len(),
                total_assets: verdict.total_assets,
            });
        }

        // SCORE_CANDIDATES / SELECT_BEST
        let mut best: Option<ScoredCandidate> = None;
        for narrowed in verdict.candidates() {
            let evidence = self.lookup_news(&narrowed.candidate.asset_id).await;
            let confidence = self.scorer.score(&narrowed, evidence.as_ref());

            info!(
                asset = %narrowed.candidate.asset_id,
                score = confidence.score,
                reasons = ?confidence.reasons,
                "Candidate scored"
            );

            // strictly greater: ties keep the first candidate in snapshot order
            if best
                .as_ref()
                .map_or(true, |b| confidence.score > b.confidence.score)
            {
                best = Some(ScoredCandidate {
                    candidate: narrowed.candidate,
                    confidence,
                    article_count: evidence.map(|e| e.article_count),
                });
            }
        }

        let Some(best) = best else {
            return Decision::Finished(CycleOutcome::NoAnomaly {
                green: 0,
                red: verdict.red.len(),
                total_assets: verdict.total_assets,
            });
        };
        trace.best = Some(best.clone());

        if best.confidence.score < self.config.min_confidence {
            info!(
                asset = %best.candidate.asset_id,
                score = best.confidence.score,
                min_confidence = self.config.min_confidence,
                "Best candidate below confidence threshold"
            );
            return Decision::Finished(CycleOutcome::BelowConfidenceThreshold {
                asset_id: best.candidate.asset_id,
                score: best.confidence.score,
                min_confidence: self.config.min_confidence,
            });
        }

        // SIZE
        let plan = match self
            .risk
            .evaluate(best.candidate.price, ctx.equity, &ctx.open_positions)
        {
            Ok(plan) => plan,
            Err(RiskRejection::Sizing(error)) => {
                warn!(asset = %best.candidate.asset_id, "Sizing failed: {}", error);
                return Decision::Finished(CycleOutcome::SizingFailed {
                    asset_id: best.candidate.asset_id,
                    error,
                });
            }
            Err(RiskRejection::Exposure(violation)) => {
                warn!(asset = %best.candidate.asset_id, "Exposure limit: {}", violation);
                return Decision::Finished(CycleOutcome::ExposureLimited {
                    asset_id: best.candidate.asset_id,
                    violation,
                });
            }
        };

        Decision::Emit(Box::new(TradeSignal::new(
            best.candidate,
            best.confidence,
            plan,
            verdict.red.iter().map(|c| c.asset_id.clone()).collect(),
            best.article_count,
        )))
    }

    /// Reconcile every tracked asset present in `book`, in tracked order
    fn build_snapshot(&self, book: &QuoteBook, trace: &mut CycleTrace) -> MarketSnapshot {
        let mut snapshot = MarketSnapshot::new(Utc::now());

        for asset_id in &self.config.tracked_assets {
            let Some(readings) = book.get(asset_id) else {
                debug!(asset = %asset_id, "No readings for asset");
                continue;
            };

            let consensus = self.reconciler.reconcile(asset_id, readings);
            let entry = consensus.to_entry();
            trace.events.push(SignalEvent::PriceCheck(consensus));

            match entry {
                Ok(entry) => snapshot.insert(entry),
                Err(fault) => {
                    warn!("Excluding asset: {}", fault);
                    trace.excluded.push(fault);
                }
            }
        }

        snapshot
    }

    async fn lookup_news(&self, asset_id: &str) -> Option<NewsEvidence> {
        let news = self.news.as_ref()?;
        match news.evidence(asset_id).await {
            Ok(evidence) => evidence,
            Err(e) => {
                warn!(asset = %asset_id, "News lookup failed, scoring without it: {:#}", e);
                None
            }
        }
    }

    async fn record(&self, event: &SignalEvent) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.record(event).await {
            Ok(()) => true,
            Err(e) => {
                warn!(kind = event.kind(), "Failed to store event: {:#}", e);
                false
            }
        }
    }

    async fn emit(&self, signal: &TradeSignal) -> DeliveryReport {
        let stored = self.record(&SignalEvent::Signal(signal.clone())).await;

        let notified = match &self.notifier {
            Some(notifier) => match notifier.publish(signal).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(signal_id = %signal.id, "Failed to publish signal: {:#}", e);
                    false
                }
            },
            None => false,
        };

        DeliveryReport { stored, notified }
    }
}

/// What a cycle collected on its way to an outcome
#[derive(Default)]
struct CycleTrace {
    /// Buffered store events, in phase order
    events: Vec<SignalEvent>,
    excluded: Vec<ReconcileFault>,
    snapshot_size: usize,
    best: Option<ScoredCandidate>,
}

enum Decision {
    Finished(CycleOutcome),
    Emit(Box<TradeSignal>),
}

/// Drop repeated symbols, keeping the first occurrence
fn dedup_assets(assets: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    assets
        .into_iter()
        .filter(|asset| {
            let fresh = seen.insert(asset.clone());
            if !fresh {
                warn!(asset = %asset, "Ignoring duplicate tracked asset");
            }
            fresh
        })
        .collect()
}

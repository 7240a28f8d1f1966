// Signal Generation Framework
// Cross-checks market data, detects relative-strength anomalies and emits sized trade signals

pub mod anomaly;
pub mod confidence;
pub mod notify;
pub mod pipeline;
pub mod reconcile;
pub mod signals;
pub mod sources;
pub mod storage;

pub use anomaly::{
    classify, is_anomaly_shape, AnomalyClassifier, AnomalyThresholds, AnomalyVerdict,
    CandidateVerdict, VerdictSummary, MAX_GREEN, MIN_GREEN, MIN_RED,
};
pub use confidence::{ConfidenceResult, ConfidenceRules, ConfidenceScorer, MAX_SCORE};
pub use notify::{AlertThread, LogNotifier, Notifier};
pub use pipeline::{
    CycleContext, CycleOutcome, CycleReport, DeliveryReport, PipelineConfig, ScoredCandidate,
    SignalPipeline,
};
pub use reconcile::{
    reconcile, ConsensusResult, ConsensusStatus, PriceReconciler, ReconcileFault,
    DEFAULT_TOLERANCE_PCT,
};
pub use signals::{SignalDirection, TradeSignal};
pub use sources::{MarketDataSource, NewsSource};
pub use storage::{InMemorySignalStore, SignalEvent, SignalStore, StoreStats};

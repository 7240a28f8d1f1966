//! Shared data model for the anomaly hunter workspace
//!
//! Quotes flow in from market data providers, get reconciled into a
//! [`MarketSnapshot`], and the snapshot is what the classifier and scorer
//! read. Everything here is plain data; the decision logic lives in
//! `signal-generation` and `portfolio-risk`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A single price observation for one asset from one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub source_id: String,
    pub asset_id: String,
    pub price: f64,
    /// 24h change in percent (e.g. 2.5 = +2.5%), when the provider reports it
    pub change_24h_pct: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(source_id: impl Into<String>, asset_id: impl Into<String>, price: f64) -> Self {
        Self {
            source_id: source_id.into(),
            asset_id: asset_id.into(),
            price,
            change_24h_pct: None,
            observed_at: Utc::now(),
        }
    }

    pub fn with_change(mut self, change_24h_pct: f64) -> Self {
        self.change_24h_pct = Some(change_24h_pct);
        self
    }

    pub fn observed_at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = observed_at;
        self
    }

    /// A quote is usable for consensus only with a finite, strictly positive price
    pub fn is_valid(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

/// A provider could not quote an asset
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{source_id} failed to quote {asset_id}: {reason}")]
pub struct SourceFailure {
    pub source_id: String,
    pub asset_id: String,
    pub reason: String,
}

impl SourceFailure {
    pub fn new(
        source_id: impl Into<String>,
        asset_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            asset_id: asset_id.into(),
            reason: reason.into(),
        }
    }
}

/// One provider reading: a quote or a named failure
pub type QuoteResult = Result<Quote, SourceFailure>;

/// Readings for every asset a data source was asked about (assets may be missing)
pub type QuoteBook = HashMap<String, Vec<QuoteResult>>;

/// A consensus-validated entry of the tracked universe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEntry {
    pub asset_id: String,
    pub price: f64,
    pub change_24h_pct: f64,
}

/// The tracked universe at one instant
///
/// Entries keep insertion order; that order is the iteration order the
/// classifier buckets by and the pipeline breaks score ties with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    entries: Vec<MarketEntry>,
    pub observed_at: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn new(observed_at: DateTime<Utc>) -> Self {
        Self {
            entries: Vec::new(),
            observed_at,
        }
    }

    /// Insert an entry; a second entry for the same asset replaces the first in place
    pub fn insert(&mut self, entry: MarketEntry) {
        match self.entries.iter_mut().find(|e| e.asset_id == entry.asset_id) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, asset_id: &str) -> Option<&MarketEntry> {
        self.entries.iter().find(|e| e.asset_id == asset_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarketEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<MarketEntry> for MarketSnapshot {
    fn from_iter<I: IntoIterator<Item = MarketEntry>>(iter: I) -> Self {
        let mut snapshot = MarketSnapshot::new(Utc::now());
        for entry in iter {
            snapshot.insert(entry);
        }
        snapshot
    }
}

/// An asset placed in the green or red bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub asset_id: String,
    pub change_pct: f64,
    pub price: f64,
}

impl From<&MarketEntry> for Candidate {
    fn from(entry: &MarketEntry) -> Self {
        Self {
            asset_id: entry.asset_id.clone(),
            change_pct: entry.change_24h_pct,
            price: entry.price,
        }
    }
}

/// News volume for an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsEvidence {
    pub article_count: u32,
}

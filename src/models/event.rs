use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::item::Item;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeType {
    Increased,
    Decreased,
    Unchanged,
}

/// A stored price that moved during reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceChange {
    pub title: String,
    pub url: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub old_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub new_price: Decimal,
}

impl PriceChange {
    pub fn change_type(&self) -> ChangeType {
        match self.new_price.cmp(&self.old_price) {
            std::cmp::Ordering::Less => ChangeType::Decreased,
            std::cmp::Ordering::Greater => ChangeType::Increased,
            std::cmp::Ordering::Equal => ChangeType::Unchanged,
        }
    }

    pub fn is_decrease(&self) -> bool {
        self.change_type() == ChangeType::Decreased
    }

    /// Signed difference, negative for a drop.
    pub fn difference(&self) -> Decimal {
        self.new_price - self.old_price
    }
}

/// Outcome of reconciling one incoming item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeEvent {
    NewItem { item: Item },
    PriceChanged(PriceChange),
    Unchanged { title: String },
}

/// A source that could not be fetched to completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceFailure {
    pub source_id: String,
    pub cause: String,
    /// Items collected from earlier pages before the failure.
    pub items_collected: usize,
}

/// Totals for one run, always emitted once persistence succeeded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub new_count: usize,
    pub updated_count: usize,
    pub unchanged_count: usize,
    pub skipped_count: usize,
    pub elapsed: Duration,
    pub sources_attempted: usize,
    pub sources_failed: usize,
}

impl RunSummary {
    pub fn new(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            new_count: 0,
            updated_count: 0,
            unchanged_count: 0,
            skipped_count: 0,
            elapsed: Duration::ZERO,
            sources_attempted: 0,
            sources_failed: 0,
        }
    }

    /// Tally one reconciliation outcome.
    pub fn record(&mut self, event: &ChangeEvent) {
        match event {
            ChangeEvent::NewItem { .. } => self.new_count += 1,
            ChangeEvent::PriceChanged(_) => self.updated_count += 1,
            ChangeEvent::Unchanged { .. } => self.unchanged_count += 1,
        }
    }

    pub fn all_sources_failed(&self) -> bool {
        self.sources_attempted > 0 && self.sources_failed == self.sources_attempted
    }
}

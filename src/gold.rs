// 🥇 Gold Aggregator - monthly points per constructor
// Buckets bronze facts by first-of-month and sums the metric per entity

use crate::bronze::{violation, BronzeFact, BronzeTable, DEFAULT_SAMPLE_LIMIT};
use crate::error::{Invariant, Result};
use crate::temporal::{format_month, month_start};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{info, warn};

// ============================================================================
// GOLD ROWS
// ============================================================================

/// GoldMonthlyFact - one row per (month_start, entity_id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldMonthlyFact {
    pub month_start: NaiveDate,
    pub entity_id: i64,
    pub entity_name: Option<String>,
    /// Null bronze metrics contribute zero
    pub metric_sum: f64,
}

/// GoldTable - sparse monthly aggregate, sorted by (month_start, entity_id)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GoldTable {
    rows: Vec<GoldMonthlyFact>,
}

impl GoldTable {
    /// Validate rows read back from a layer file
    pub fn from_rows(mut rows: Vec<GoldMonthlyFact>) -> Result<Self> {
        let mut seen = HashSet::new();
        let offending: Vec<String> = rows
            .iter()
            .filter(|r| !seen.insert((r.month_start, r.entity_id)))
            .map(|r| format!("({}, {})", r.month_start, r.entity_id))
            .collect();
        violation(Invariant::UniqueMonthEntity, offending, DEFAULT_SAMPLE_LIMIT)?;

        rows.sort_by_key(|r| (r.month_start, r.entity_id));
        Ok(GoldTable { rows })
    }

    pub fn rows(&self) -> &[GoldMonthlyFact] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows for exactly this bucket key
    pub fn rows_for_month(&self, month: NaiveDate) -> impl Iterator<Item = &GoldMonthlyFact> {
        self.rows.iter().filter(move |r| r.month_start == month)
    }

    /// Distinct bucket keys, ascending
    pub fn months(&self) -> Vec<NaiveDate> {
        self.rows
            .iter()
            .map(|r| r.month_start)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Up to `limit` bucket keys closest to `month`, formatted `YYYY-MM`
    pub fn nearest_months(&self, month: NaiveDate, limit: usize) -> Vec<String> {
        let mut months = self.months();
        months.sort_by_key(|m| ((*m - month).num_days().abs(), *m));
        let mut nearest: Vec<NaiveDate> = months.into_iter().take(limit).collect();
        nearest.sort();
        nearest.into_iter().map(format_month).collect()
    }
}

// ============================================================================
// GOLD AGGREGATOR
// ============================================================================

/// Aggregation output plus the facts that could not be bucketed
#[derive(Debug, Clone, PartialEq)]
pub struct GoldReport {
    pub table: GoldTable,
    /// Bronze facts with a null event_date
    pub unbucketed: usize,
}

#[derive(Debug, Default)]
struct Bucket {
    entity_name: Option<String>,
    metric_sum: f64,
}

pub struct GoldAggregator;

impl GoldAggregator {
    pub fn new() -> Self {
        GoldAggregator
    }

    /// Sum bronze metrics per (month_start, entity_id)
    ///
    /// Facts are visited in (event_date, event_id) order, and a bucket keeps
    /// the first non-null entity_name it sees.
    pub fn aggregate(&self, bronze: &BronzeTable) -> GoldReport {
        let mut dated: Vec<(&BronzeFact, NaiveDate)> = Vec::with_capacity(bronze.len());
        let mut unbucketed = 0;
        for fact in bronze.facts() {
            match fact.event_date {
                Some(d) => dated.push((fact, d)),
                None => unbucketed += 1,
            }
        }
        dated.sort_by_key(|(f, d)| (*d, f.event_id, f.entity_id));

        let mut buckets: BTreeMap<(NaiveDate, i64), Bucket> = BTreeMap::new();
        for (fact, date) in dated {
            let bucket = buckets.entry((month_start(date), fact.entity_id)).or_default();
            bucket.metric_sum += fact.metric.unwrap_or(0.0);
            if bucket.entity_name.is_none() {
                bucket.entity_name = fact.entity_name.clone();
            }
        }

        if unbucketed > 0 {
            warn!(unbucketed, "bronze facts without event_date left out of gold");
        }

        let rows: Vec<GoldMonthlyFact> = buckets
            .into_iter()
            .map(|((month_start, entity_id), b)| GoldMonthlyFact {
                month_start,
                entity_id,
                entity_name: b.entity_name,
                metric_sum: b.metric_sum,
            })
            .collect();

        info!(rows = rows.len(), "gold aggregated");
        GoldReport {
            table: GoldTable { rows },
            unbucketed,
        }
    }
}

impl Default for GoldAggregator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

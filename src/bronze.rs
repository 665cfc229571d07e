// 🥉 Bronze Builder - one canonical fact per (race, constructor)
// results ⟕ race calendar ⟕ constructor reference, then hard invariant checks

use crate::error::{Invariant, PipelineError, Result};
use crate::loader::{DateValue, EntityNameRow, EventDateRow, RawEventRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// How many offending keys an invariant failure reports
pub const DEFAULT_SAMPLE_LIMIT: usize = 5;

// ============================================================================
// BRONZE FACT
// ============================================================================

/// BronzeFact - joined, typed row; field order is the persisted column order
///
/// `event_date` and `entity_name` are null when the left join found no
/// reference row, so data-quality gaps stay visible downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BronzeFact {
    pub event_id: i64,
    pub event_date: Option<NaiveDate>,
    pub entity_id: i64,
    pub entity_name: Option<String>,
    pub metric: Option<f64>,
}

impl BronzeFact {
    fn canonical_line(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}\n",
            self.event_id,
            self.event_date.map(|d| d.to_string()).unwrap_or_default(),
            self.entity_id,
            self.entity_name.as_deref().unwrap_or(""),
            self.metric.map(|m| m.to_string()).unwrap_or_default(),
        )
    }
}

// ============================================================================
// BRONZE TABLE
// ============================================================================

/// BronzeTable - the whole bronze layer; only constructible with invariants held
#[derive(Debug, Clone, PartialEq)]
pub struct BronzeTable {
    facts: Vec<BronzeFact>,
}

impl BronzeTable {
    /// Validate already-typed facts (e.g. read back from a layer file)
    pub fn from_facts(facts: Vec<BronzeFact>) -> Result<Self> {
        check_unique(
            facts.iter().map(|f| (f.event_id, f.entity_id)),
            DEFAULT_SAMPLE_LIMIT,
        )?;
        Ok(BronzeTable { facts })
    }

    pub fn facts(&self) -> &[BronzeFact] {
        &self.facts
    }

    pub fn into_facts(self) -> Vec<BronzeFact> {
        self.facts
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// SHA-256 over the canonical row encoding, in table order
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for fact in &self.facts {
            hasher.update(fact.canonical_line());
        }
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// BRONZE BUILDER
// ============================================================================

/// Row between the two joins and the invariant checks
#[derive(Debug, Clone)]
struct JoinedRow {
    event_id: Option<i64>,
    event_date: Option<DateValue>,
    entity_id: Option<i64>,
    entity_name: Option<String>,
    metric: Option<f64>,
}

pub struct BronzeBuilder {
    /// Max offending keys quoted in an invariant failure
    pub sample_limit: usize,
}

impl BronzeBuilder {
    pub fn new() -> Self {
        BronzeBuilder {
            sample_limit: DEFAULT_SAMPLE_LIMIT,
        }
    }

    /// Join results onto dates then names, and enforce the bronze invariants
    ///
    /// Both joins are left joins and keep every result row. A reference
    /// table with repeated keys fans rows out, which the uniqueness check
    /// then rejects.
    pub fn build(
        &self,
        results: &[RawEventRecord],
        events: &[EventDateRow],
        entities: &[EntityNameRow],
    ) -> Result<BronzeTable> {
        let joined = join_names(join_dates(results, events), entities);

        self.check_keys(&joined)?;
        check_unique(
            joined.iter().filter_map(|r| Some((r.event_id?, r.entity_id?))),
            self.sample_limit,
        )?;
        self.check_dates(&joined)?;

        let facts: Vec<BronzeFact> = joined
            .into_iter()
            .filter_map(|r| {
                Some(BronzeFact {
                    event_id: r.event_id?,
                    event_date: match r.event_date {
                        Some(DateValue::Date(d)) => Some(d),
                        _ => None,
                    },
                    entity_id: r.entity_id?,
                    entity_name: r.entity_name,
                    metric: r.metric,
                })
            })
            .collect();

        info!(rows = facts.len(), "bronze built");
        Ok(BronzeTable { facts })
    }

    fn check_keys(&self, rows: &[JoinedRow]) -> Result<()> {
        let offending: Vec<String> = rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.event_id.is_none() || r.entity_id.is_none())
            .map(|(i, r)| format!("row {}: ({}, {})", i, fmt_key(r.event_id), fmt_key(r.entity_id)))
            .collect();

        violation(Invariant::RequiredKeyPresent, offending, self.sample_limit)
    }

    fn check_dates(&self, rows: &[JoinedRow]) -> Result<()> {
        let offending: Vec<String> = rows
            .iter()
            .filter_map(|r| match &r.event_date {
                Some(DateValue::Unparsed(raw)) => Some(format!(
                    "({}, {}) date '{}'",
                    fmt_key(r.event_id),
                    fmt_key(r.entity_id),
                    raw
                )),
                _ => None,
            })
            .collect();

        violation(Invariant::EventDateIsDate, offending, self.sample_limit)
    }
}

impl Default for BronzeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn join_dates(results: &[RawEventRecord], events: &[EventDateRow]) -> Vec<JoinedRow> {
    let mut by_event: HashMap<i64, Vec<&EventDateRow>> = HashMap::new();
    for e in events {
        if let Some(id) = e.event_id {
            by_event.entry(id).or_default().push(e);
        }
    }

    let mut out = Vec::with_capacity(results.len());
    for r in results {
        let base = JoinedRow {
            event_id: r.event_id,
            event_date: None,
            entity_id: r.entity_id,
            entity_name: None,
            metric: r.metric,
        };
        match r.event_id.and_then(|id| by_event.get(&id)) {
            Some(matches) => {
                for m in matches {
                    out.push(JoinedRow {
                        event_date: m.event_date.clone(),
                        ..base.clone()
                    });
                }
            }
            None => out.push(base),
        }
    }
    out
}

fn join_names(rows: Vec<JoinedRow>, entities: &[EntityNameRow]) -> Vec<JoinedRow> {
    let mut by_entity: HashMap<i64, Vec<&EntityNameRow>> = HashMap::new();
    for e in entities {
        if let Some(id) = e.entity_id {
            by_entity.entry(id).or_default().push(e);
        }
    }

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        match row.entity_id.and_then(|id| by_entity.get(&id)) {
            Some(matches) => {
                for m in matches {
                    out.push(JoinedRow {
                        entity_name: m.entity_name.clone(),
                        ..row.clone()
                    });
                }
            }
            None => out.push(row),
        }
    }
    out
}

fn check_unique(keys: impl Iterator<Item = (i64, i64)>, sample_limit: usize) -> Result<()> {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    let mut offending = Vec::new();

    for key in keys {
        if !seen.insert(key) && reported.insert(key) {
            offending.push(format!("({}, {})", key.0, key.1));
        }
    }

    violation(Invariant::UniqueEventEntity, offending, sample_limit)
}

pub(crate) fn violation(invariant: Invariant, offending: Vec<String>, sample_limit: usize) -> Result<()> {
    if offending.is_empty() {
        return Ok(());
    }
    let total = offending.len();
    Err(PipelineError::InvariantViolation {
        invariant,
        offending_keys: offending.into_iter().take(sample_limit).collect(),
        total,
    })
}

fn fmt_key(key: Option<i64>) -> String {
    key.map(|k| k.to_string()).unwrap_or_else(|| "null".to_string())
}

// ============================================================================
// TESTS
// ============================================================================

// ✅ Data Quality Engine - post-build checks on the bronze layer
// Counts the nulls the left joins and coercions let through. Nothing here
// fails a build; the hard invariants live in the bronze builder.

use crate::bronze::BronzeTable;
use crate::loader::LoadReport;
use serde::{Deserialize, Serialize};

// ============================================================================
// SEVERITY & ISSUES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning, // Rows are present but incomplete
    Info,    // Worth knowing, usually expected in historical data
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub field: String,
    pub issue: String,
    pub recommendation: String,
}

// ============================================================================
// QUALITY REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub rows: usize,
    pub null_metric: usize,
    pub null_event_date: usize,
    pub null_entity_name: usize,
    pub issues: Vec<QualityIssue>,
}

impl QualityReport {
    pub fn summary(&self) -> String {
        format!(
            "Rows: {}, null metric: {}, null event_date: {}, null entity_name: {}",
            self.rows, self.null_metric, self.null_event_date, self.null_entity_name
        )
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Warning)
    }
}

// ============================================================================
// DATA QUALITY ENGINE
// ============================================================================

pub struct DataQualityEngine;

impl DataQualityEngine {
    pub fn new() -> Self {
        DataQualityEngine
    }

    /// Null checks over a built bronze table
    pub fn check_bronze(&self, bronze: &BronzeTable) -> QualityReport {
        let facts = bronze.facts();
        let null_metric = facts.iter().filter(|f| f.metric.is_none()).count();
        let null_event_date = facts.iter().filter(|f| f.event_date.is_none()).count();
        let null_entity_name = facts.iter().filter(|f| f.entity_name.is_none()).count();

        let mut issues = Vec::new();

        // Rule 1: unmatched races (missing from the calendar)
        if null_event_date > 0 {
            issues.push(QualityIssue {
                severity: Severity::Warning,
                field: "event_date".to_string(),
                issue: format!("{} facts have no race date and will not reach gold", null_event_date),
                recommendation: "Check races.csv covers every raceId in the results".to_string(),
            });
        }

        // Rule 2: unmatched constructors
        if null_entity_name > 0 {
            issues.push(QualityIssue {
                severity: Severity::Warning,
                field: "entity_name".to_string(),
                issue: format!("{} facts have no constructor name", null_entity_name),
                recommendation: "Check constructors.csv covers every constructorId".to_string(),
            });
        }

        // Rule 3: missing points (counted as zero in gold)
        if null_metric > 0 {
            issues.push(QualityIssue {
                severity: Severity::Info,
                field: "metric".to_string(),
                issue: format!("{} facts have no points value", null_metric),
                recommendation: "Null points are summed as zero".to_string(),
            });
        }

        QualityReport {
            rows: facts.len(),
            null_metric,
            null_event_date,
            null_entity_name,
            issues,
        }
    }

    /// Issues raised while loading raw sources (degraded schemas, coercions)
    pub fn check_loads(&self, reports: &[&LoadReport]) -> Vec<QualityIssue> {
        let mut issues = Vec::new();
        for report in reports {
            if !report.availability.missing().is_empty() {
                issues.push(QualityIssue {
                    severity: Severity::Warning,
                    field: report.availability.missing().join(", "),
                    issue: format!("{} is missing declared columns", report.source_name),
                    recommendation: "Missing columns were loaded as all-null".to_string(),
                });
            }
            for (column, count) in &report.coerced_to_null {
                issues.push(QualityIssue {
                    severity: Severity::Info,
                    field: column.to_string(),
                    issue: format!("{} malformed values in {}", count, report.source_name),
                    recommendation: "Malformed values were loaded as null".to_string(),
                });
            }
        }
        issues
    }
}

impl Default for DataQualityEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

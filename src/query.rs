// 🏁 Top-K Query - highest monthly points, deterministically ordered

use crate::error::{PipelineError, Result};
use crate::gold::{GoldMonthlyFact, GoldTable};
use crate::temporal::format_month;
use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;

/// How many nearby months a NoDataForPeriod error suggests
const SUGGESTED_MONTHS: usize = 6;

/// One ranked row of a top-K answer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntity {
    /// 1-based position in the answer
    pub rank: usize,
    pub entity_id: i64,
    pub entity_name: Option<String>,
    pub metric_sum: f64,
}

/// Ranking order: metric_sum descending, then entity_name ascending
/// (unnamed rows last), then entity_id ascending
pub fn rank_order(a: &GoldMonthlyFact, b: &GoldMonthlyFact) -> Ordering {
    b.metric_sum
        .total_cmp(&a.metric_sum)
        .then_with(|| match (&a.entity_name, &b.entity_name) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.entity_id.cmp(&b.entity_id))
}

/// The K highest-metric entities for exactly `month`
///
/// `month` must be a bucket key (first of month). An empty bucket is an
/// error, not an empty answer; fewer than `k` rows returns them all.
pub fn top_k(gold: &GoldTable, month: NaiveDate, k: usize) -> Result<Vec<RankedEntity>> {
    if k == 0 {
        return Err(PipelineError::InvalidArgument("k must be a positive integer".to_string()));
    }

    let mut rows: Vec<&GoldMonthlyFact> = gold.rows_for_month(month).collect();
    if rows.is_empty() {
        return Err(PipelineError::NoDataForPeriod {
            month: format_month(month),
            available: gold.nearest_months(month, SUGGESTED_MONTHS),
        });
    }

    rows.sort_by(|a, b| rank_order(a, b));

    Ok(rows
        .into_iter()
        .take(k)
        .enumerate()
        .map(|(i, r)| RankedEntity {
            rank: i + 1,
            entity_id: r.entity_id,
            entity_name: r.entity_name.clone(),
            metric_sum: r.metric_sum,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn row(month: NaiveDate, entity_id: i64, name: Option<&str>, metric_sum: f64) -> GoldMonthlyFact {
        GoldMonthlyFact {
            month_start: month,
            entity_id,
            entity_name: name.map(str::to_string),
            metric_sum,
        }
    }

    fn gold() -> GoldTable {
        GoldTable::from_rows(vec![
            row(d(2012, 8), 1, Some("McLaren"), 43.0),
            row(d(2012, 8), 6, Some("Ferrari"), 30.0),
            row(d(2012, 8), 9, Some("Lotus F1"), 30.0),
            row(d(2012, 8), 131, Some("Mercedes"), 12.0),
            row(d(2012, 7), 9, Some("Lotus F1"), 50.0),
        ])
        .unwrap()
    }

    fn names(ranked: &[RankedEntity]) -> Vec<&str> {
        ranked.iter().map(|r| r.entity_name.as_deref().unwrap_or("")).collect()
    }

    #[test]
    fn test_top_k_orders_by_metric() {
        let ranked = top_k(&gold(), d(2012, 8), 2).unwrap();
        assert_eq!(names(&ranked), vec!["McLaren", "Ferrari"]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn test_ties_broken_by_name_repeatably() {
        for _ in 0..5 {
            let ranked = top_k(&gold(), d(2012, 8), 3).unwrap();
            assert_eq!(names(&ranked), vec!["McLaren", "Ferrari", "Lotus F1"]);
        }
    }

    #[test]
    fn test_k_larger_than_rows_returns_available() {
        let ranked = top_k(&gold(), d(2012, 8), 10).unwrap();
        assert_eq!(ranked.len(), 4);
    }

    #[test]
    fn test_empty_month_is_no_data_for_period() {
        let err = top_k(&gold(), d(2012, 9), 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoDataForPeriod);
        assert!(err.to_string().contains("2012-09"));
        assert!(err.to_string().contains("2012-08"));
    }

    #[test]
    fn test_mid_month_date_does_not_match_bucket() {
        let mid_month = NaiveDate::from_ymd_opt(2012, 8, 15).unwrap();
        assert!(top_k(&gold(), mid_month, 3).is_err());
    }

    #[test]
    fn test_zero_k_rejected() {
        let err = top_k(&gold(), d(2012, 8), 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_unnamed_rows_rank_after_named_ties() {
        let gold = GoldTable::from_rows(vec![
            row(d(2012, 8), 2, None, 5.0),
            row(d(2012, 8), 3, Some("Williams"), 5.0),
        ])
        .unwrap();
        let ranked = top_k(&gold, d(2012, 8), 2).unwrap();
        assert_eq!(ranked[0].entity_id, 3);
        assert_eq!(ranked[1].entity_id, 2);
    }
}

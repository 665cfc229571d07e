// 📊 Top-K Report - text bars for the terminal, CSV for the reports folder

use crate::error::Result;
use crate::query::RankedEntity;
use crate::temporal::format_month;
use chrono::NaiveDate;
use csv::Writer;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Width of the longest bar
const BAR_WIDTH: usize = 40;
const UNNAMED: &str = "(unknown)";

/// `reports/top{K}_{YYYY-MM}.csv`
pub fn report_path(reports_dir: &Path, month: NaiveDate, k: usize) -> PathBuf {
    reports_dir.join(format!("top{}_{}.csv", k, format_month(month)))
}

/// Ranked rows with bars scaled to the leading entity
pub fn render(ranked: &[RankedEntity], month: NaiveDate, k: usize) -> String {
    let mut out = format!("Top {} Constructors, {}\n", k, format_month(month));

    let name_width = ranked
        .iter()
        .map(|r| r.entity_name.as_deref().unwrap_or(UNNAMED).chars().count())
        .max()
        .unwrap_or(0);
    let max = ranked.iter().map(|r| r.metric_sum).fold(0.0_f64, f64::max);

    for r in ranked {
        let bar = if max > 0.0 {
            ((r.metric_sum.max(0.0) / max) * BAR_WIDTH as f64).round() as usize
        } else {
            0
        };
        out.push_str(&format!(
            "{:>3}. {:<width$}  {:>7.1}  {}\n",
            r.rank,
            r.entity_name.as_deref().unwrap_or(UNNAMED),
            r.metric_sum,
            "█".repeat(bar),
            width = name_width
        ));
    }
    out
}

/// Write the ranked rows as CSV; returns the file written
pub fn save_csv(reports_dir: &Path, month: NaiveDate, k: usize, ranked: &[RankedEntity]) -> Result<PathBuf> {
    fs::create_dir_all(reports_dir)?;
    let path = report_path(reports_dir, month, k);

    let mut writer = Writer::from_path(&path)?;
    for r in ranked {
        writer.serialize(r)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = ranked.len(), "report saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked() -> Vec<RankedEntity> {
        vec![
            RankedEntity { rank: 1, entity_id: 1, entity_name: Some("McLaren".to_string()), metric_sum: 40.0 },
            RankedEntity { rank: 2, entity_id: 6, entity_name: None, metric_sum: 20.0 },
        ]
    }

    fn aug() -> NaiveDate {
        NaiveDate::from_ymd_opt(2012, 8, 1).unwrap()
    }

    #[test]
    fn test_render_scales_bars() {
        let text = render(&ranked(), aug(), 10);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Top 10 Constructors, 2012-08");
        assert_eq!(lines[1].matches('█').count(), BAR_WIDTH);
        assert_eq!(lines[2].matches('█').count(), BAR_WIDTH / 2);
        assert!(lines[2].contains(UNNAMED));
    }

    #[test]
    fn test_save_csv_naming() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_csv(dir.path(), aug(), 3, &ranked()).unwrap();

        assert_eq!(path.file_name().unwrap(), "top3_2012-08.csv");
        let text = fs::read_to_string(path).unwrap();
        assert!(text.starts_with("rank,entity_id,entity_name,metric_sum\n"));
        assert!(text.contains("1,1,McLaren,40.0\n"));
    }
}

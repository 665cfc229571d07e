// ⚙️ Pipeline Configuration - TOML file with defaults for every field
// Paths default to the data/ layout the build has always used.

use crate::error::{PipelineError, Result};
use crate::normalize::{ColumnRename, SchemaNormalizer};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE: &str = "race-ledger.toml";
pub const DATA_DIR_ENV: &str = "RACE_LEDGER_DATA_DIR";

/// File names of the reference exports inside `raw_dir`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawFiles {
    pub races: String,
    pub constructors: String,
    pub constructor_results: String,
}

impl Default for RawFiles {
    fn default() -> Self {
        RawFiles {
            races: "races.csv".to_string(),
            constructors: "constructors.csv".to_string(),
            constructor_results: "constructor_results.csv".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    /// Relative paths below resolve against `data_dir` when unset
    pub raw_dir: Option<PathBuf>,
    pub bronze_path: Option<PathBuf>,
    pub gold_path: Option<PathBuf>,
    pub reports_dir: PathBuf,
    pub sink_path: Option<PathBuf>,
    pub raw_files: RawFiles,
    pub null_tokens: Vec<String>,
    pub default_top_k: usize,
    /// Extra legacy → canonical renames on top of the built-in ones
    pub era_renames: Vec<ColumnRename>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            data_dir: PathBuf::from("data"),
            raw_dir: None,
            bronze_path: None,
            gold_path: None,
            reports_dir: PathBuf::from("reports"),
            sink_path: None,
            raw_files: RawFiles::default(),
            null_tokens: vec!["\\N".to_string(), String::new()],
            default_top_k: 10,
            era_renames: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&contents)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// `race-ledger.toml` in the working directory if present, else defaults,
    /// then the data-dir environment override
    pub fn discover() -> Result<Self> {
        let local = Path::new(CONFIG_FILE);
        let config = if local.exists() {
            Self::load(local)?
        } else {
            Self::default()
        };
        Ok(config.with_env_override(std::env::var(DATA_DIR_ENV).ok()))
    }

    pub fn with_env_override(mut self, data_dir: Option<String>) -> Self {
        if let Some(dir) = data_dir.filter(|d| !d.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_top_k == 0 {
            return Err(PipelineError::Config("default_top_k must be positive".to_string()));
        }
        for rename in &self.era_renames {
            if rename.legacy.trim().is_empty() || rename.canonical.trim().is_empty() {
                return Err(PipelineError::Config(
                    "era_renames entries need both legacy and canonical names".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.raw_dir.clone().unwrap_or_else(|| self.data_dir.join("raw"))
    }

    pub fn bronze_path(&self) -> PathBuf {
        self.bronze_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("bronze").join("race_constructor_points.csv"))
    }

    pub fn gold_path(&self) -> PathBuf {
        self.gold_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("gold").join("constructor_monthly.csv"))
    }

    pub fn races_path(&self) -> PathBuf {
        self.raw_dir().join(&self.raw_files.races)
    }

    pub fn constructors_path(&self) -> PathBuf {
        self.raw_dir().join(&self.raw_files.constructors)
    }

    pub fn results_path(&self) -> PathBuf {
        self.raw_dir().join(&self.raw_files.constructor_results)
    }

    /// Built-in reference-export renames plus configured ones
    pub fn normalizer(&self) -> SchemaNormalizer {
        SchemaNormalizer::reference_exports().with_renames(self.era_renames.iter().cloned())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.bronze_path(), PathBuf::from("data/bronze/race_constructor_points.csv"));
        assert_eq!(config.gold_path(), PathBuf::from("data/gold/constructor_monthly.csv"));
        assert_eq!(config.races_path(), PathBuf::from("data/raw/races.csv"));
        assert_eq!(config.default_top_k, 10);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            data_dir = "/srv/f1"
            default_top_k = 5

            [[era_renames]]
            legacy = "team"
            canonical = "entity_name"
            "#,
        )
        .unwrap();

        assert_eq!(config.default_top_k, 5);
        assert_eq!(config.results_path(), PathBuf::from("/srv/f1/raw/constructor_results.csv"));
        assert_eq!(config.null_tokens, vec!["\\N".to_string(), String::new()]);
        assert!(config.normalizer().renames().iter().any(|r| r.legacy == "team"));
    }

    #[test]
    fn test_env_override() {
        let config = PipelineConfig::default().with_env_override(Some("/tmp/elsewhere".to_string()));
        assert_eq!(config.gold_path(), PathBuf::from("/tmp/elsewhere/gold/constructor_monthly.csv"));

        let unchanged = PipelineConfig::default().with_env_override(Some("  ".to_string()));
        assert_eq!(unchanged.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_load_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        std::fs::write(&path, "default_top_k = 0\n").unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap_err().kind(), ErrorKind::InvalidInput);

        std::fs::write(&path, "no_such_field = true\n").unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap_err().kind(), ErrorKind::InvalidInput);
    }
}

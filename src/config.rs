//! TOML configuration for the `invr` binary.
//!
//! ```toml
//! [db]
//! path = "./data/inventario.sqlite"
//!
//! [import]
//! header_row = 8
//! default_date = "2000-01-01"
//! school_id = 1
//!
//! [matching]
//! token_tiebreak = "lowest-id"
//!
//! [categories]
//! default = "Intangible"
//! minor = "Menores"
//! major = "Mayores"
//!
//! [categories.ids]
//! Menores = 1
//! Mayores = 2
//! Intangible = 3
//!
//! [log]
//! level = "info"
//! ```
//!
//! Every section except `[db]` is optional.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use inventory_reconcile_core::cleanse::CategoryTable;
use inventory_reconcile_core::reconcile::ReconcileConfig;
use inventory_reconcile_core::TieBreak;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub categories: CategoriesConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    /// 1-based line holding the column headers. Everything above it is
    /// the sheet's title block.
    #[serde(default = "default_header_row")]
    pub header_row: usize,
    #[serde(default = "default_date")]
    pub default_date: String,
    #[serde(default)]
    pub school_id: Option<i64>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            header_row: default_header_row(),
            default_date: default_date(),
            school_id: None,
        }
    }
}

fn default_header_row() -> usize {
    8
}
fn default_date() -> String {
    "2000-01-01".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MatchingConfig {
    #[serde(default)]
    pub token_tiebreak: TieBreak,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CategoriesConfig {
    #[serde(default = "default_category")]
    pub default: String,
    #[serde(default = "default_minor")]
    pub minor: String,
    #[serde(default = "default_major")]
    pub major: String,
    #[serde(default = "default_category_ids")]
    pub ids: BTreeMap<String, i64>,
}

impl Default for CategoriesConfig {
    fn default() -> Self {
        Self {
            default: default_category(),
            minor: default_minor(),
            major: default_major(),
            ids: default_category_ids(),
        }
    }
}

fn default_category() -> String {
    "Intangible".to_string()
}
fn default_minor() -> String {
    "Menores".to_string()
}
fn default_major() -> String {
    "Mayores".to_string()
}
fn default_category_ids() -> BTreeMap<String, i64> {
    BTreeMap::from([
        ("Menores".to_string(), 1),
        ("Mayores".to_string(), 2),
        ("Intangible".to_string(), 3),
    ])
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl ImportConfig {
    pub fn default_date(&self) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(&self.default_date, "%Y-%m-%d").with_context(|| {
            format!(
                "import.default_date must be YYYY-MM-DD, got '{}'",
                self.default_date
            )
        })
    }
}

impl CategoriesConfig {
    pub fn table(&self) -> Result<CategoryTable> {
        CategoryTable::new(
            self.ids.iter().map(|(k, v)| (k.as_str(), *v)),
            &self.default,
            &self.minor,
            &self.major,
        )
        .map_err(|e| anyhow::anyhow!("categories: {}", e))
    }
}

impl Config {
    /// The reconciler's view of this configuration.
    pub fn reconcile(&self) -> Result<ReconcileConfig> {
        Ok(ReconcileConfig {
            categories: self.categories.table()?,
            default_date: self.import.default_date()?,
            school_id: self.import.school_id,
            tie_break: self.matching.token_tiebreak,
        })
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.import.header_row == 0 {
        anyhow::bail!("import.header_row must be >= 1");
    }

    config.import.default_date()?;

    if let Some((label, id)) = config.categories.ids.iter().find(|(_, id)| **id <= 0) {
        anyhow::bail!("categories.ids.{} must be > 0, got {}", label, id);
    }

    config.categories.table()?;

    match config.log.level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        other => anyhow::bail!(
            "Unknown log level: '{}'. Must be trace, debug, info, warn, or error.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let f = write("[db]\npath = \"./x.sqlite\"\n");
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.import.header_row, 8);
        assert_eq!(cfg.matching.token_tiebreak, TieBreak::LowestId);
        assert_eq!(cfg.log.level, "info");
        let rc = cfg.reconcile().unwrap();
        assert_eq!(rc.default_date, NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
        assert_eq!(rc.categories.default_id(), 3);
    }

    #[test]
    fn reject_tiebreak_parses() {
        let f = write(
            "[db]\npath = \"x\"\n[matching]\ntoken_tiebreak = \"reject\"\n[import]\nschool_id = 7\n",
        );
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.matching.token_tiebreak, TieBreak::Reject);
        assert_eq!(cfg.import.school_id, Some(7));
    }

    #[test]
    fn invalid_values_are_rejected() {
        for body in [
            "[db]\npath = \"x\"\n[import]\nheader_row = 0\n",
            "[db]\npath = \"x\"\n[import]\ndefault_date = \"01/01/2000\"\n",
            "[db]\npath = \"x\"\n[log]\nlevel = \"loud\"\n",
            "[db]\npath = \"x\"\n[categories]\ndefault = \"Otros\"\n",
            "[db]\npath = \"x\"\n[categories.ids]\nMenores = 0\nMayores = 2\nIntangible = 3\n",
        ] {
            let f = write(body);
            assert!(load_config(f.path()).is_err(), "accepted: {}", body);
        }
    }
}

//! Run configuration.
//!
//! Everything here has a default matching the TCGA-BRCA analyses; a JSON file
//! passed with `--config` overrides any subset of the fields.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AnalysisError, Result};

/// Days per month used to express survival time in months.
pub const DAYS_PER_MONTH: f64 = 30.44;

/// What to do with samples whose aggregate expression equals the median.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    /// `> median` High, `< median` Low, ties excluded.
    Strict,
    /// `>= median` High, `< median` Low.
    Inclusive,
}

/// Resolved column names of the input table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    /// `None` uses the first column.
    pub sample_id: Option<String>,
    pub time: String,
    pub event: String,
    pub subtype: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            sample_id: None,
            time: "OS_Time_nature2012".to_string(),
            event: "OS_event_nature2012".to_string(),
            subtype: "PAM50Call_RNAseq".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenePanel {
    pub name: String,
    pub genes: Vec<String>,
    #[serde(default = "default_tie_policy")]
    pub tie_policy: TiePolicy,
}

fn default_tie_policy() -> TiePolicy {
    TiePolicy::Strict
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub columns: ColumnMapping,
    /// Genes for the presence ("expressed if > 0") comparisons.
    pub genes: Vec<String>,
    /// Label of the complement cohort in the all-genes comparison.
    pub others_label: String,
    /// Aggregate-expression panels for the median split.
    pub panels: Vec<GenePanel>,
    /// Survival time is divided by this on load.
    pub time_divisor: f64,
    pub exclude_normal_subtype: bool,
    /// Level of the Kaplan-Meier bands and Wilson error bars.
    pub confidence_level: f64,
    /// Level of the hazard-ratio interval written to `comparisons.csv`.
    pub cox_confidence: f64,
    pub min_logrank_group_size: usize,
    pub cox_min_samples: usize,
    pub cox_min_events: usize,
    /// Sheet tried first when the input is a workbook.
    pub excel_sheet: Option<String>,
    pub output_dir: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            columns: ColumnMapping::default(),
            genes: ["PRG2", "EPX", "CLC", "IL5RA"].map(String::from).to_vec(),
            others_label: "Others".to_string(),
            panels: vec![
                GenePanel {
                    name: "IL5_IL33_IL25_TSLP".to_string(),
                    genes: ["IL5", "IL33", "IL25", "TSLP"].map(String::from).to_vec(),
                    tie_policy: TiePolicy::Strict,
                },
                GenePanel {
                    name: "IL33_IL25_TSLP".to_string(),
                    genes: ["IL33", "IL25", "TSLP"].map(String::from).to_vec(),
                    tie_policy: TiePolicy::Strict,
                },
                GenePanel {
                    name: "CCL11_CCL24_CCL26".to_string(),
                    genes: ["CCL11", "CCL24", "CCL26"].map(String::from).to_vec(),
                    tie_policy: TiePolicy::Inclusive,
                },
                GenePanel {
                    name: "CCL11_CCL26".to_string(),
                    genes: ["CCL11", "CCL26"].map(String::from).to_vec(),
                    tie_policy: TiePolicy::Inclusive,
                },
            ],
            time_divisor: DAYS_PER_MONTH,
            exclude_normal_subtype: true,
            confidence_level: 0.95,
            cox_confidence: 0.95,
            min_logrank_group_size: 2,
            cox_min_samples: 11,
            cox_min_events: 2,
            excel_sheet: Some("Dados_Sobrevida".to_string()),
            output_dir: None,
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        info!("Reading configuration from {}", path.display());
        let text = fs::read_to_string(path)?;
        let config: AnalysisConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, or the file's values when a path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_json_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.time_divisor > 0.0 && self.time_divisor.is_finite()) {
            return Err(AnalysisError::config(format!(
                "time_divisor must be positive, got {}",
                self.time_divisor
            )));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(AnalysisError::config(format!(
                "confidence_level must lie in (0, 1), got {}",
                self.confidence_level
            )));
        }
        if !(self.cox_confidence > 0.0 && self.cox_confidence < 1.0) {
            return Err(AnalysisError::config(format!(
                "cox_confidence must lie in (0, 1), got {}",
                self.cox_confidence
            )));
        }
        if self.min_logrank_group_size == 0 {
            return Err(AnalysisError::config("min_logrank_group_size must be at least 1"));
        }
        for panel in &self.panels {
            if panel.genes.is_empty() {
                return Err(AnalysisError::config(format!("panel `{}` has no genes", panel.name)));
            }
        }
        Ok(())
    }

    /// Output directory: configured value, else `cohort_results` next to the input.
    pub fn resolve_output_dir(&self, input: &Path) -> PathBuf {
        match &self.output_dir {
            Some(dir) => dir.clone(),
            None => input
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("cohort_results"),
        }
    }

    pub fn write_json(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join("config.json");
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "genes": ["CCL11", "CCL24", "CCL26"], "columns": {{ "time": "OS.time" }} }}"#
        )
        .unwrap();

        let config = AnalysisConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.genes, vec!["CCL11", "CCL24", "CCL26"]);
        assert_eq!(config.columns.time, "OS.time");
        assert_eq!(config.columns.event, "OS_event_nature2012");
        assert_eq!(config.cox_min_samples, 11);
    }

    #[test]
    fn panel_policy_defaults_to_strict() {
        let panel: GenePanel =
            serde_json::from_str(r#"{ "name": "CCL", "genes": ["CCL11", "CCL26"] }"#).unwrap();
        assert_eq!(panel.tie_policy, TiePolicy::Strict);

        let panel: GenePanel = serde_json::from_str(
            r#"{ "name": "CCL", "genes": ["CCL11"], "tie_policy": "inclusive" }"#,
        )
        .unwrap();
        assert_eq!(panel.tie_policy, TiePolicy::Inclusive);
    }

    #[test]
    fn defaults_include_inclusive_chemokine_panels() {
        let config = AnalysisConfig::default();
        let inclusive: Vec<&str> = config
            .panels
            .iter()
            .filter(|p| p.tie_policy == TiePolicy::Inclusive)
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(inclusive, vec!["CCL11_CCL24_CCL26", "CCL11_CCL26"]);
        assert_eq!(config.panels[0].tie_policy, TiePolicy::Strict);
        assert_eq!(config.cox_confidence, 0.95);
    }

    #[test]
    fn rejects_bad_confidence() {
        let config = AnalysisConfig {
            confidence_level: 1.5,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
        let config = AnalysisConfig {
            cox_confidence: 0.0,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn output_dir_defaults_next_to_input() {
        let config = AnalysisConfig::default();
        let dir = config.resolve_output_dir(Path::new("/data/brca/combined.csv"));
        assert_eq!(dir, PathBuf::from("/data/brca/cohort_results"));
    }
}

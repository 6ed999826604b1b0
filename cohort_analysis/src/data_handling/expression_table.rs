// src/data_handling/expression_table.rs
// -----------------------------------------------------------------------------
// `ExpressionTable` reads the analysed table (csv/tsv/txt/xlsx) as-is.
// `ExpressionDataset` is the typed, immutable snapshot every analysis reads:
// one `Sample` per row with expression, survival and PAM50 label resolved
// through the configured column mapping.
// -----------------------------------------------------------------------------

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::helper_functions::load_table;
use crate::models::{Cohort, Dataset, Pam50Subtype, Sample, SurvivalRecord};

// ─────────────────────────────────────────────────────────────────────────────
// Raw table
// ─────────────────────────────────────────────────────────────────────────────

pub struct ExpressionTable {
    pub path: PathBuf,
    /// Worksheet tried first for workbooks.
    pub excel_sheet: Option<String>,
}

impl Dataset for ExpressionTable {
    fn load(&self) -> PolarsResult<DataFrame> {
        load_table(&self.path, self.excel_sheet.as_deref())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ExpressionDataset {
    samples: Vec<Sample>,
    index: HashMap<String, usize>,
    genes: Vec<String>,
    missing_genes: Vec<String>,
    has_survival: bool,
    has_subtype: bool,
}

impl ExpressionDataset {
    /// Builds a snapshot from already typed samples. Duplicate ids keep the
    /// first occurrence.
    pub fn new(samples: Vec<Sample>, genes: Vec<String>, has_survival: bool, has_subtype: bool) -> Self {
        let mut index = HashMap::with_capacity(samples.len());
        let mut kept = Vec::with_capacity(samples.len());
        for sample in samples {
            if index.contains_key(&sample.id) {
                warn!("Duplicate sample id `{}`, keeping the first row", sample.id);
                continue;
            }
            index.insert(sample.id.clone(), kept.len());
            kept.push(sample);
        }

        Self {
            samples: kept,
            index,
            genes,
            missing_genes: Vec::new(),
            has_survival,
            has_subtype,
        }
    }

    /// Resolves `requested` genes and the configured survival/subtype columns
    /// against `df`.
    pub fn from_frame(df: &DataFrame, config: &AnalysisConfig, requested: &[String]) -> Result<Self> {
        let columns = &config.columns;
        let names: BTreeSet<String> = df
            .get_column_names()
            .iter()
            .map(|c| c.to_string())
            .collect();

        // 1) Sample identifiers
        let id_column = match &columns.sample_id {
            Some(name) if names.contains(name) => name.clone(),
            Some(name) => return Err(AnalysisError::missing_column(name, "sample id")),
            None => df
                .get_column_names()
                .first()
                .map(|c| c.to_string())
                .ok_or_else(|| AnalysisError::insufficient_data("input table has no columns"))?,
        };
        let ids = string_column(df, &id_column)?;

        // 2) Genes
        let mut genes = Vec::new();
        let mut missing_genes = Vec::new();
        let mut seen = BTreeSet::new();
        for gene in requested {
            if !seen.insert(gene.as_str()) {
                continue;
            }
            if names.contains(gene) {
                genes.push(gene.clone());
            } else {
                missing_genes.push(gene.clone());
            }
        }
        if !missing_genes.is_empty() {
            warn!("Genes not found in the input: {}", missing_genes.join(", "));
        }
        let gene_values: Vec<Vec<Option<f64>>> = genes
            .iter()
            .map(|g| f64_column(df, g))
            .collect::<Result<_>>()?;

        // 3) Survival
        let has_survival = names.contains(&columns.time) && names.contains(&columns.event);
        let (times, events) = if has_survival {
            (f64_column(df, &columns.time)?, f64_column(df, &columns.event)?)
        } else {
            warn!(
                "Survival columns `{}` / `{}` not found, survival comparisons will be skipped",
                columns.time, columns.event
            );
            (vec![None; df.height()], vec![None; df.height()])
        };

        // 4) Subtype
        let has_subtype = names.contains(&columns.subtype);
        let subtypes = if has_subtype {
            string_column(df, &columns.subtype)?
        } else {
            warn!("Subtype column `{}` not found", columns.subtype);
            vec![None; df.height()]
        };

        // 5) Rows → samples
        let mut unknown_labels = BTreeSet::new();
        let mut bad_events = 0usize;
        let mut samples = Vec::with_capacity(df.height());
        for row in 0..df.height() {
            let Some(id) = ids[row].clone() else {
                debug!("Row {row} has no sample id, skipped");
                continue;
            };

            let expression: BTreeMap<String, f64> = genes
                .iter()
                .zip(&gene_values)
                .filter_map(|(g, values)| values[row].map(|v| (g.clone(), v)))
                .collect();

            let survival = match (times[row], events[row]) {
                (Some(t), Some(e)) => {
                    let event = match e {
                        e if e == 0.0 => Some(false),
                        e if e == 1.0 => Some(true),
                        _ => {
                            bad_events += 1;
                            None
                        }
                    };
                    let time = t / config.time_divisor;
                    match event {
                        Some(event) if time.is_finite() && time >= 0.0 => {
                            Some(SurvivalRecord { time, event })
                        }
                        _ => None,
                    }
                }
                _ => None,
            };

            let subtype = subtypes[row].as_deref().and_then(|label| {
                let trimmed = label.trim();
                if trimmed.is_empty() {
                    return None;
                }
                match trimmed.parse::<Pam50Subtype>() {
                    Ok(st) => Some(st),
                    Err(_) => {
                        unknown_labels.insert(trimmed.to_string());
                        None
                    }
                }
            });

            samples.push(Sample {
                id,
                expression,
                survival,
                subtype,
            });
        }

        if bad_events > 0 {
            warn!("{bad_events} samples have an event code other than 0/1, survival treated as missing");
        }
        if !unknown_labels.is_empty() {
            warn!(
                "Unknown subtype labels treated as missing: {}",
                unknown_labels.into_iter().collect::<Vec<_>>().join(", ")
            );
        }

        let mut dataset = Self::new(samples, genes, has_survival, has_subtype);
        dataset.missing_genes = missing_genes;
        info!(
            "Dataset snapshot: {} samples, {} with survival, {} with subtype, {} genes",
            dataset.len(),
            dataset.samples.iter().filter(|s| s.survival.is_some()).count(),
            dataset.samples.iter().filter(|s| s.subtype.is_some()).count(),
            dataset.genes.len()
        );
        Ok(dataset)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn sample(&self, id: &str) -> Option<&Sample> {
        self.index.get(id).map(|&i| &self.samples[i])
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    pub fn missing_genes(&self) -> &[String] {
        &self.missing_genes
    }

    pub fn has_gene(&self, gene: &str) -> bool {
        self.genes.iter().any(|g| g == gene)
    }

    /// Samples of `cohort`, in cohort order.
    pub fn members<'a>(&'a self, cohort: &Cohort) -> Vec<&'a Sample> {
        cohort
            .sample_ids
            .iter()
            .filter_map(|id| self.sample(id))
            .collect()
    }

    pub fn require_survival(&self) -> Result<()> {
        if self.has_survival {
            Ok(())
        } else {
            Err(AnalysisError::missing_column("time/event", "survival"))
        }
    }

    pub fn require_subtype(&self) -> Result<()> {
        if self.has_subtype {
            Ok(())
        } else {
            Err(AnalysisError::missing_column("subtype", "PAM50 label"))
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn f64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df.column(name)?.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Sample fixture used across the crate's tests.
    pub(crate) fn sample(
        id: &str,
        expression: &[(&str, f64)],
        survival: Option<(f64, bool)>,
        subtype: Option<Pam50Subtype>,
    ) -> Sample {
        Sample {
            id: id.to_string(),
            expression: expression
                .iter()
                .map(|(g, v)| (g.to_string(), *v))
                .collect(),
            survival: survival.map(|(time, event)| SurvivalRecord { time, event }),
            subtype,
        }
    }

    fn frame() -> DataFrame {
        df![
            "sample" => &["S1", "S2", "S3", "S4"],
            "CLC" => &[Some(0.0), Some(2.5), None, Some(1.0)],
            "OS_Time_nature2012" => &[Some(304.4), Some(60.88), Some(30.44), Some(-5.0)],
            "OS_event_nature2012" => &[Some(1i64), Some(0), Some(2), Some(1)],
            "PAM50Call_RNAseq" => &[Some("LumA"), Some("basal"), Some("Claudin"), None],
        ]
        .unwrap()
    }

    #[test]
    fn resolves_columns_into_samples() {
        let config = AnalysisConfig::default();
        let requested = vec!["CLC".to_string(), "EPX".to_string()];
        let ds = ExpressionDataset::from_frame(&frame(), &config, &requested).unwrap();

        assert_eq!(ds.len(), 4);
        assert_eq!(ds.genes(), &["CLC".to_string()]);
        assert_eq!(ds.missing_genes(), &["EPX".to_string()]);

        let s1 = ds.sample("S1").unwrap();
        let surv = s1.survival.unwrap();
        approx::assert_abs_diff_eq!(surv.time, 10.0, epsilon = 1e-9);
        assert!(surv.event);
        assert_eq!(s1.subtype, Some(Pam50Subtype::LumA));

        assert_eq!(ds.sample("S2").unwrap().subtype, Some(Pam50Subtype::Basal));
        // null expression cell is absent
        assert_eq!(ds.sample("S3").unwrap().expression("CLC"), None);
    }

    #[test]
    fn invalid_survival_and_labels_become_missing() {
        let config = AnalysisConfig::default();
        let ds = ExpressionDataset::from_frame(&frame(), &config, &["CLC".to_string()]).unwrap();

        // event code 2
        assert!(ds.sample("S3").unwrap().survival.is_none());
        assert!(ds.sample("S3").unwrap().subtype.is_none());
        // negative time
        assert!(ds.sample("S4").unwrap().survival.is_none());
    }

    #[test]
    fn missing_survival_columns_are_reported() {
        let df = df!["sample" => &["A", "B"], "CLC" => &[1.0, 0.0]].unwrap();
        let ds = ExpressionDataset::from_frame(&df, &AnalysisConfig::default(), &["CLC".to_string()])
            .unwrap();
        assert!(matches!(
            ds.require_survival(),
            Err(AnalysisError::MissingColumn { .. })
        ));
        assert!(ds.require_subtype().is_err());
    }

    #[test]
    fn duplicate_ids_keep_first() {
        let ds = ExpressionDataset::new(
            vec![
                sample("A", &[("CLC", 1.0)], None, None),
                sample("A", &[("CLC", 9.0)], None, None),
            ],
            vec!["CLC".into()],
            false,
            false,
        );
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.sample("A").unwrap().expression("CLC"), Some(1.0));
    }
}

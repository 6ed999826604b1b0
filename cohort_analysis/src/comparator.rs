//! Turns cohort sets into [`Comparison`]s.
//!
//! Test failures that only concern one comparison (missing column, too few
//! samples, degenerate table, numerical trouble) become a skipped or
//! degenerate outcome here; they never abort a run.

use tracing::{info, warn};

use crate::config::AnalysisConfig;
use crate::data_handling::expression_table::ExpressionDataset;
use crate::error::{AnalysisError, Result};
use crate::models::{
    Cohort, CohortSet, CohortSummary, Comparison, Pam50Subtype, SurvivalRecord, TestKind, TestOutcome,
    TestResult,
};
use crate::stats::chi_square::{chi_square_independence, ContingencyTable};
use crate::stats::cox::{cox_univariate, CoxOptions};
use crate::stats::logrank::{log_rank, multivariate_log_rank};

pub const ALIVE_LABEL: &str = "Alive";
pub const DEAD_LABEL: &str = "Dead";

/// Maps a test result onto the outcome stored in the comparison.
pub fn outcome_from(name: &str, result: Result<TestResult>) -> TestOutcome {
    match result {
        Ok(r) => TestOutcome::Computed(r),
        Err(AnalysisError::DegenerateContingencyTable { reason }) => {
            warn!("{name}: degenerate table ({reason})");
            TestOutcome::Degenerate { reason }
        }
        Err(e) => {
            warn!("{name}: skipped ({e})");
            TestOutcome::Skipped { reason: e.to_string() }
        }
    }
}

pub fn survival_records(dataset: &ExpressionDataset, cohort: &Cohort) -> Vec<SurvivalRecord> {
    dataset
        .members(cohort)
        .into_iter()
        .filter_map(|s| s.survival)
        .collect()
}

fn survival_summary(cohort: &Cohort, records: &[SurvivalRecord]) -> CohortSummary {
    CohortSummary {
        name: cohort.name.clone(),
        n: records.len(),
        events: Some(records.iter().filter(|r| r.event).count()),
    }
}

// ─── Survival ────────────────────────────────────────────────────────────────

/// Log-rank over the cohorts of `set`: two-group for two cohorts,
/// multivariate otherwise. Cohorts are taken in label order.
pub fn compare_survival(dataset: &ExpressionDataset, set: &CohortSet, config: &AnalysisConfig) -> Comparison {
    let name = set.dimension.clone();
    let test = if set.cohorts.len() > 2 {
        TestKind::MultivariateLogRank
    } else {
        TestKind::LogRank
    };

    if let Err(e) = dataset.require_survival() {
        return Comparison::skipped(name.clone(), test, outcome_reason(&name, e));
    }

    let groups: Vec<(&Cohort, Vec<SurvivalRecord>)> = set
        .cohorts
        .iter()
        .map(|c| (c, survival_records(dataset, c)))
        .collect();
    let cohorts: Vec<CohortSummary> = groups.iter().map(|(c, r)| survival_summary(c, r)).collect();

    let result = match test {
        TestKind::LogRank if groups.len() == 2 => log_rank(&groups[0].1, &groups[1].1, config.min_logrank_group_size),
        TestKind::LogRank => Err(AnalysisError::insufficient_data(format!(
            "{} cohort(s), log-rank needs two",
            groups.len()
        ))),
        _ => {
            let non_empty: Vec<&[SurvivalRecord]> = groups
                .iter()
                .filter(|(_, r)| !r.is_empty())
                .map(|(_, r)| r.as_slice())
                .collect();
            if non_empty.len() < groups.len() {
                info!(
                    "{name}: {} empty cohort(s) dropped before the multivariate log-rank",
                    groups.len() - non_empty.len()
                );
            }
            multivariate_log_rank(&non_empty)
        }
    };

    Comparison {
        outcome: outcome_from(&name, result),
        name,
        test,
        cohorts,
        excluded_at_median: set.excluded.len(),
    }
}

// ─── Subtypes ────────────────────────────────────────────────────────────────

/// Subtype columns used for cohort × subtype tables.
pub fn subtype_columns(config: &AnalysisConfig) -> Vec<Pam50Subtype> {
    if config.exclude_normal_subtype {
        Pam50Subtype::CLINICAL.to_vec()
    } else {
        Pam50Subtype::ALL.to_vec()
    }
}

/// Cohort × PAM50 counts over samples carrying one of `subtypes`.
pub fn subtype_table(dataset: &ExpressionDataset, set: &CohortSet, subtypes: &[Pam50Subtype]) -> ContingencyTable {
    let columns: Vec<String> = subtypes
        .iter()
        .map(|s| s.label().to_string())
        .collect();
    let pairs: Vec<(&str, &str)> = set
        .cohorts
        .iter()
        .flat_map(|c| {
            dataset
                .members(c)
                .into_iter()
                .filter_map(move |s| s.subtype.map(|st| (c.name.as_str(), st.label())))
        })
        .collect();
    ContingencyTable::from_pairs(set.labels().into_iter().map(String::from).collect(), columns, pairs)
}

#[derive(Debug, Clone)]
pub struct SubtypeComparison {
    pub comparison: Comparison,
    pub table: Option<ContingencyTable>,
}

pub fn compare_subtypes(dataset: &ExpressionDataset, set: &CohortSet, config: &AnalysisConfig) -> SubtypeComparison {
    let name = format!("{} x PAM50", set.dimension);
    if let Err(e) = dataset.require_subtype() {
        return SubtypeComparison {
            comparison: Comparison::skipped(name.clone(), TestKind::ChiSquare, outcome_reason(&name, e)),
            table: None,
        };
    }

    let table = subtype_table(dataset, set, &subtype_columns(config));
    SubtypeComparison {
        comparison: table_comparison(name, &table, set.excluded.len()),
        table: Some(table),
    }
}

// ─── Vital status ────────────────────────────────────────────────────────────

/// Cohort × Alive/Dead counts over samples with survival.
pub fn status_table(dataset: &ExpressionDataset, set: &CohortSet) -> ContingencyTable {
    let pairs: Vec<(&str, &str)> = set
        .cohorts
        .iter()
        .flat_map(|c| {
            survival_records(dataset, c)
                .into_iter()
                .map(move |r| (c.name.as_str(), if r.event { DEAD_LABEL } else { ALIVE_LABEL }))
        })
        .collect();
    ContingencyTable::from_pairs(
        set.labels().into_iter().map(String::from).collect(),
        vec![ALIVE_LABEL.to_string(), DEAD_LABEL.to_string()],
        pairs,
    )
}

pub fn compare_status(dataset: &ExpressionDataset, set: &CohortSet) -> SubtypeComparison {
    let name = format!("{} x status", set.dimension);
    if let Err(e) = dataset.require_survival() {
        return SubtypeComparison {
            comparison: Comparison::skipped(name.clone(), TestKind::ChiSquare, outcome_reason(&name, e)),
            table: None,
        };
    }
    let table = status_table(dataset, set);
    SubtypeComparison {
        comparison: table_comparison(name, &table, set.excluded.len()),
        table: Some(table),
    }
}

fn table_comparison(name: String, table: &ContingencyTable, excluded: usize) -> Comparison {
    let cohorts = table
        .rows
        .iter()
        .zip(table.row_totals())
        .map(|(row, n)| CohortSummary {
            name: row.clone(),
            n: n as usize,
            events: None,
        })
        .collect();
    Comparison {
        outcome: outcome_from(&name, chi_square_independence(table)),
        name,
        test: TestKind::ChiSquare,
        cohorts,
        excluded_at_median: excluded,
    }
}

// ─── Cox ─────────────────────────────────────────────────────────────────────

pub fn cox_options(config: &AnalysisConfig) -> CoxOptions {
    CoxOptions {
        min_samples: config.cox_min_samples,
        min_events: config.cox_min_events,
        confidence: config.cox_confidence,
        ..CoxOptions::default()
    }
}

/// Cox PH of `gene` expression against survival inside one cohort. Rows
/// without survival or without a value for the gene are dropped.
pub fn cox_within_cohort(
    dataset: &ExpressionDataset,
    cohort: &Cohort,
    gene: &str,
    config: &AnalysisConfig,
) -> Comparison {
    let name = format!("{} / {gene}", cohort.name);
    if let Err(e) = dataset
        .require_survival()
        .and_then(|_| crate::classifier::validate_genes(dataset, &[gene.to_string()]))
    {
        return Comparison::skipped(name.clone(), TestKind::CoxPh, outcome_reason(&name, e));
    }

    let (x, records): (Vec<f64>, Vec<SurvivalRecord>) = dataset
        .members(cohort)
        .into_iter()
        .filter_map(|s| Some((s.expression(gene)?, s.survival?)))
        .unzip();

    let summary = survival_summary(cohort, &records);
    Comparison {
        outcome: outcome_from(&name, cox_univariate(&x, &records, &cox_options(config))),
        name,
        test: TestKind::CoxPh,
        cohorts: vec![summary],
        excluded_at_median: 0,
    }
}

fn outcome_reason(name: &str, e: AnalysisError) -> String {
    warn!("{name}: skipped ({e})");
    e.to_string()
}

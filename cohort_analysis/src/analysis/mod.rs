pub mod combinations;
pub mod median_split;
pub mod presence;
pub mod sample_types;
pub mod subtype_expression;
pub mod subtype_summary;

use std::path::Path;

use tracing::{error, warn};

use crate::comparator::{compare_subtypes, compare_survival, survival_records};
use crate::config::AnalysisConfig;
use crate::data_handling::expression_table::ExpressionDataset;
use crate::error::{AnalysisError, Result};
use crate::models::{CohortSet, Comparison, TestKind};
use crate::report::plots::{plot_kaplan_meier, plot_stacked_bars, KmSeries};
use crate::report::tables::outcome_label;
use crate::stats::chi_square::ContingencyTable;
use crate::stats::kaplan_meier::{kaplan_meier, KaplanMeierCurve};

/// File-name friendly version of a comparison name.
pub(crate) fn slug(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Comparison-local failures become a skipped comparison, anything else
/// propagates.
pub(crate) fn skip_or_fail(name: &str, test: TestKind, err: AnalysisError) -> Result<Comparison> {
    if err.is_comparison_local() {
        warn!("{name}: {err}");
        Ok(Comparison::skipped(name, test, err.to_string()))
    } else {
        Err(err)
    }
}

/// KM curves of every cohort with the log-rank result in the footer.
pub(crate) fn plot_survival(
    dataset: &ExpressionDataset,
    set: &CohortSet,
    comparison: &Comparison,
    config: &AnalysisConfig,
    path: &Path,
    title: &str,
) {
    let curves: Vec<(String, KaplanMeierCurve)> = set
        .cohorts
        .iter()
        .filter_map(|c| {
            let records = survival_records(dataset, c);
            if records.is_empty() {
                return None;
            }
            match kaplan_meier(&records, config.confidence_level) {
                Ok(curve) => {
                    let label = match curve.median_survival() {
                        Some(m) => format!("{} (n={}, median {m:.1})", c.name, records.len()),
                        None => format!("{} (n={})", c.name, records.len()),
                    };
                    Some((label, curve))
                }
                Err(e) => {
                    warn!("No Kaplan-Meier curve for {}: {e}", c.name);
                    None
                }
            }
        })
        .collect();
    if curves.is_empty() {
        warn!("{}: no survival data to plot", comparison.name);
        return;
    }

    let series: Vec<KmSeries> = curves
        .iter()
        .map(|(label, curve)| KmSeries {
            label: label.clone(),
            curve,
        })
        .collect();
    let mut footer = format!("{}: {}", comparison.test, outcome_label(&comparison.outcome));
    if !set.excluded.is_empty() {
        footer.push_str(&format!(" | {} at median excluded", set.excluded.len()));
    }

    if let Err(e) = plot_kaplan_meier(path, title, &series, &footer) {
        error!("Failed to draw {}: {e}", path.display());
    }
}

/// Row percentages of a cohort × subtype table as stacked bars.
pub(crate) fn plot_subtype_distribution(table: &ContingencyTable, comparison: &Comparison, path: &Path, title: &str) {
    let row_totals = table.row_totals();
    let segments: Vec<(String, Vec<f64>)> = table
        .columns
        .iter()
        .enumerate()
        .map(|(j, subtype)| {
            let pct = table
                .counts
                .column(j)
                .iter()
                .zip(&row_totals)
                .map(|(&c, &t)| if t == 0 { 0.0 } else { 100.0 * c as f64 / t as f64 })
                .collect();
            (subtype.clone(), pct)
        })
        .collect();
    let categories: Vec<String> = table
        .rows
        .iter()
        .zip(&row_totals)
        .map(|(r, t)| format!("{r} (n={t})"))
        .collect();
    let footer = format!("chi-square: {}", outcome_label(&comparison.outcome));

    if let Err(e) = plot_stacked_bars(path, title, &categories, &segments, "Patients (%)", Some(&footer)) {
        error!("Failed to draw {}: {e}", path.display());
    }
}

/// Log-rank and subtype chi-square for one cohort set, with figures.
pub(crate) fn survival_and_subtypes(
    dataset: &ExpressionDataset,
    set: &CohortSet,
    config: &AnalysisConfig,
    out_dir: &Path,
    stem: &str,
) -> Vec<Comparison> {
    let survival = compare_survival(dataset, set, config);
    plot_survival(
        dataset,
        set,
        &survival,
        config,
        &out_dir.join(format!("{}_km.png", slug(stem))),
        &format!("Overall survival by {}", set.dimension),
    );

    let subtypes = compare_subtypes(dataset, set, config);
    if let Some(table) = &subtypes.table {
        plot_subtype_distribution(
            table,
            &subtypes.comparison,
            &out_dir.join(format!("{}_pam50.png", slug(stem))),
            &format!("PAM50 distribution by {}", set.dimension),
        );
    }

    vec![survival, subtypes.comparison]
}

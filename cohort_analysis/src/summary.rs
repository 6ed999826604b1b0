//! Count, percentage and crosstab tables rendered into the CSV sheets.

use polars::prelude::*;

use crate::classifier::gene_expressed;
use crate::comparator::{ALIVE_LABEL, DEAD_LABEL};
use crate::data_handling::expression_table::ExpressionDataset;
use crate::models::{CohortSet, Pam50Subtype};
use crate::stats::chi_square::ContingencyTable;

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}

/// Counts of `subtypes`; percentages over every sample with a PAM50 call.
pub fn subtype_counts(dataset: &ExpressionDataset, subtypes: &[Pam50Subtype]) -> PolarsResult<DataFrame> {
    let classified = dataset.samples().iter().filter(|s| s.subtype.is_some()).count();
    let counts: Vec<u32> = subtypes
        .iter()
        .map(|st| dataset.samples().iter().filter(|s| s.subtype == Some(*st)).count() as u32)
        .collect();
    let percents: Vec<f64> = counts.iter().map(|&c| percent(c as usize, classified)).collect();
    let labels: Vec<&str> = subtypes.iter().map(|s| s.label()).collect();

    df![
        "subtype" => labels,
        "count" => counts,
        "percent" => percents,
    ]
}

/// Alive / Dead counts over samples with survival.
pub fn status_counts(dataset: &ExpressionDataset) -> PolarsResult<DataFrame> {
    let records: Vec<_> = dataset.samples().iter().filter_map(|s| s.survival).collect();
    let dead = records.iter().filter(|r| r.event).count();
    let alive = records.len() - dead;

    df![
        "status" => [ALIVE_LABEL, DEAD_LABEL],
        "count" => [alive as u32, dead as u32],
        "percent" => [percent(alive, records.len()), percent(dead, records.len())],
    ]
}

/// Size of every cohort with its share of `total` samples.
pub fn cohort_counts(set: &CohortSet, total: usize) -> PolarsResult<DataFrame> {
    let labels: Vec<&str> = set.labels();
    let counts: Vec<u32> = set.cohorts.iter().map(|c| c.len() as u32).collect();
    let percents: Vec<f64> = set.cohorts.iter().map(|c| percent(c.len(), total)).collect();

    df![
        set.dimension.as_str() => labels,
        "count" => counts,
        "percent" => percents,
    ]
}

/// Absolute counts, one column per table column plus `Total`.
pub fn crosstab_counts(table: &ContingencyTable) -> PolarsResult<DataFrame> {
    let mut columns: Vec<Column> = Vec::with_capacity(table.columns.len() + 2);
    columns.push(Column::new("group".into(), table.rows.clone()));
    for (j, name) in table.columns.iter().enumerate() {
        let values: Vec<u64> = table.counts.column(j).to_vec();
        columns.push(Column::new(name.as_str().into(), values));
    }
    columns.push(Column::new("Total".into(), table.row_totals()));
    DataFrame::new(columns)
}

/// Percentages within each table column (e.g. share of each cohort among
/// the LumA samples).
pub fn crosstab_column_percent(table: &ContingencyTable) -> PolarsResult<DataFrame> {
    let col_totals = table.column_totals();
    let mut columns: Vec<Column> = Vec::with_capacity(table.columns.len() + 1);
    columns.push(Column::new("group".into(), table.rows.clone()));
    for (j, name) in table.columns.iter().enumerate() {
        let values: Vec<f64> = table
            .counts
            .column(j)
            .iter()
            .map(|&c| percent(c as usize, col_totals[j] as usize))
            .collect();
        columns.push(Column::new(name.as_str().into(), values));
    }
    DataFrame::new(columns)
}

/// Per subtype and gene: patients expressing the gene and their share.
pub fn subtype_expression_frequency(
    dataset: &ExpressionDataset,
    subtypes: &[Pam50Subtype],
    genes: &[String],
) -> PolarsResult<DataFrame> {
    let mut subtype_col = Vec::new();
    let mut gene_col = Vec::new();
    let mut expressed_col = Vec::new();
    let mut total_col = Vec::new();
    let mut percent_col = Vec::new();

    for st in subtypes {
        let members: Vec<_> = dataset
            .samples()
            .iter()
            .filter(|s| s.subtype == Some(*st))
            .collect();
        for gene in genes {
            let expressed = members.iter().filter(|s| gene_expressed(s, gene)).count();
            subtype_col.push(st.label());
            gene_col.push(gene.as_str());
            expressed_col.push(expressed as u32);
            total_col.push(members.len() as u32);
            percent_col.push(percent(expressed, members.len()));
        }
    }

    df![
        "subtype" => subtype_col,
        "gene" => gene_col,
        "expressed" => expressed_col,
        "total" => total_col,
        "percent" => percent_col,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohorts::presence_split;
    use crate::data_handling::expression_table::tests::sample;
    use approx::assert_abs_diff_eq;
    use Pam50Subtype::*;

    fn dataset() -> ExpressionDataset {
        let samples = vec![
            sample("A", &[("CLC", 1.0)], Some((3.0, true)), Some(LumA)),
            sample("B", &[("CLC", 0.0)], Some((5.0, false)), Some(LumA)),
            sample("C", &[("CLC", 2.0)], Some((8.0, false)), Some(Basal)),
            sample("D", &[("CLC", 0.0)], None, Some(Normal)),
            sample("E", &[], Some((2.0, true)), None),
        ];
        ExpressionDataset::new(samples, vec!["CLC".into()], true, true)
    }

    #[test]
    fn subtype_percent_uses_all_classified() {
        let df = subtype_counts(&dataset(), &Pam50Subtype::CLINICAL).unwrap();
        let counts: Vec<Option<u32>> = df.column("count").unwrap().u32().unwrap().into_iter().collect();
        assert_eq!(counts, vec![Some(2), Some(0), Some(0), Some(1)]);
        let pct = df.column("percent").unwrap().f64().unwrap().get(0).unwrap();
        assert_abs_diff_eq!(pct, 50.0);
    }

    #[test]
    fn status_counts_skip_missing_survival() {
        let df = status_counts(&dataset()).unwrap();
        let counts: Vec<Option<u32>> = df.column("count").unwrap().u32().unwrap().into_iter().collect();
        assert_eq!(counts, vec![Some(2), Some(2)]);
    }

    #[test]
    fn crosstabs_have_group_column() {
        let ds = dataset();
        let set = presence_split(&ds, "CLC").unwrap();
        let table = ContingencyTable::from_pairs(
            set.labels().into_iter().map(String::from).collect(),
            vec!["LumA".into(), "Basal".into()],
            [("Expressed CLC", "LumA"), ("Expressed CLC", "Basal"), ("Not expressed CLC", "LumA")],
        );
        let counts = crosstab_counts(&table).unwrap();
        assert_eq!(counts.width(), 4);
        let pct = crosstab_column_percent(&table).unwrap();
        let luma: Vec<Option<f64>> = pct.column("LumA").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(luma, vec![Some(50.0), Some(50.0)]);

        let sizes = cohort_counts(&set, ds.len()).unwrap();
        assert_eq!(sizes.height(), 2);
    }

    #[test]
    fn expression_frequency_per_subtype() {
        let df = subtype_expression_frequency(&dataset(), &[LumA, Basal], &["CLC".to_string()]).unwrap();
        let pct: Vec<Option<f64>> = df.column("percent").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(pct, vec![Some(50.0), Some(100.0)]);
    }
}

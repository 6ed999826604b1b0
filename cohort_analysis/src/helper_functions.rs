use std::env;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::models::polars_err;

pub fn project_root() -> PathBuf {
    match env::var_os("PROJECT_ROOT") {
        Some(val) => PathBuf::from(val),
        None => {
            // Fall back to current directory if PROJECT_ROOT not set
            env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        }
    }
}

/// Relative paths are taken from the project root.
pub fn resolve_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root().join(path)
    }
}

pub fn read_csv(file_path: &Path) -> PolarsResult<DataFrame> {
    read_delimited(file_path, b',')
}

pub fn read_delimited(file_path: &Path, separator: u8) -> PolarsResult<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000))
        .map_parse_options(|mut o| {
            o.separator = separator;
            o
        })
        .try_into_reader_with_file_path(Some(file_path.to_path_buf()))?
        .finish()
}

/// Reads a delimited file trying `first` as separator, then the other of
/// tab/comma when the first attempt fails or yields a single column.
pub fn read_delimited_auto(file_path: &Path, first: u8) -> PolarsResult<DataFrame> {
    let second = if first == b'\t' { b',' } else { b'\t' };

    match read_delimited(file_path, first) {
        Ok(df) if df.width() > 1 => return Ok(df),
        Ok(_) => debug!("Only one column with separator {:?}, retrying", first as char),
        Err(e) => debug!("Reading with separator {:?} failed: {e}", first as char),
    }

    let df = read_delimited(file_path, second)?;
    if df.width() <= 1 {
        warn!(
            "{} parsed into a single column with both tab and comma separators",
            file_path.display()
        );
    }
    Ok(df)
}

fn cell_to_string(cell: &calamine::DataType) -> String {
    use calamine::DataType as Ct;
    match cell {
        Ct::String(s) => s.clone(),
        Ct::Empty => String::new(),
        Ct::Bool(b) => b.to_string(),
        Ct::Error(e) => format!("ERR({e:?})"),
        Ct::Float(n) | Ct::Duration(n) => n.to_string(),
        Ct::Int(i) => i.to_string(),
        Ct::DateTime(f) => f.to_string(),
        Ct::DateTimeIso(s) | Ct::DurationIso(s) => s.clone(),
    }
}

fn cell_to_f64(cell: &calamine::DataType) -> Option<f64> {
    use calamine::DataType as Ct;
    match cell {
        Ct::Float(n) => Some(*n),
        Ct::Int(i) => Some(*i as f64),
        _ => None,
    }
}

/// Loads one worksheet. Columns whose non-empty cells are all numeric become
/// Float64, everything else String.
pub fn read_excel(path: &Path, preferred_sheet: Option<&str>) -> PolarsResult<DataFrame> {
    use calamine::{open_workbook_auto, DataType as Ct, Reader};

    let mut wb = open_workbook_auto(path).map_err(|e| polars_err(Box::new(e)))?;

    let range = match preferred_sheet.and_then(|name| wb.worksheet_range(name)) {
        Some(Ok(range)) => range,
        _ => {
            if let Some(name) = preferred_sheet {
                warn!("Sheet '{name}' not found in {}, using the first sheet", path.display());
            }
            wb.worksheet_range_at(0)
                .ok_or_else(|| polars_err("workbook has no worksheets".into()))?
                .map_err(|e| polars_err(Box::new(e)))?
        }
    };

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| polars_err("empty sheet".into()))?
        .iter()
        .map(cell_to_string)
        .collect();
    debug!("Worksheet header = {:?}", headers);

    let mut cols: Vec<Vec<&Ct>> = vec![Vec::with_capacity(range.height()); headers.len()];
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(headers.len()) {
            cols[i].push(cell);
        }
    }

    let series: Vec<Series> = headers
        .into_iter()
        .zip(cols)
        .map(|(h, cells)| {
            let numeric = cells
                .iter()
                .all(|c| matches!(c, Ct::Empty) || cell_to_f64(c).is_some());
            if numeric {
                let values: Vec<Option<f64>> = cells.iter().map(|c| cell_to_f64(c)).collect();
                Series::new(PlSmallStr::from(h.as_str()), values)
            } else {
                let values: Vec<Option<String>> = cells
                    .iter()
                    .map(|c| match c {
                        Ct::Empty => None,
                        other => Some(cell_to_string(other)),
                    })
                    .collect();
                Series::new(PlSmallStr::from(h.as_str()), values)
            }
        })
        .collect();

    DataFrame::new(series.into_iter().map(Into::into).collect())
}

/// Strips surrounding whitespace from every header.
pub fn trim_column_names(df: &mut DataFrame) -> PolarsResult<()> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|c| c.as_str().trim().to_string())
        .collect();
    df.set_column_names(names)
}

/// Picks a reader by file extension.
pub fn load_table(path: &Path, preferred_sheet: Option<&str>) -> PolarsResult<DataFrame> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    info!("Reading data from {}", path.display());
    let mut df = match ext.as_str() {
        "xlsx" | "xls" | "xlsm" => read_excel(path, preferred_sheet)?,
        "tsv" | "txt" => read_delimited_auto(path, b'\t')?,
        "csv" => read_delimited_auto(path, b',')?,
        other => {
            return Err(PolarsError::ComputeError(
                format!("unsupported file type `.{other}` (expected csv, tsv, txt or xlsx)").into(),
            ))
        }
    };
    trim_column_names(&mut df)?;
    info!("Loaded {} rows x {} columns", df.height(), df.width());
    Ok(df)
}

pub fn dataframe_to_csv(df: &mut DataFrame, path: &Path) -> PolarsResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| polars_err(Box::new(e)))?;
    }
    let mut file = File::create(path).map_err(|e| polars_err(Box::new(e)))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(df)?;
    debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn tsv_falls_back_to_comma() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.tsv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "sample,CLC,PRG2").unwrap();
        writeln!(f, "S1,0.5,0").unwrap();
        writeln!(f, "S2,0,1.5").unwrap();

        let df = load_table(&path, None).unwrap();
        assert_eq!(df.width(), 3);
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn headers_are_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "sample , CLC ").unwrap();
        writeln!(f, "S1,1.0").unwrap();

        let df = load_table(&path, None).unwrap();
        let names: Vec<&str> = df.get_column_names().iter().map(|c| c.as_str()).collect();
        assert_eq!(names, vec!["sample", "CLC"]);
    }

    #[test]
    fn rejects_unknown_extension() {
        assert!(load_table(Path::new("data.parquet"), None).is_err());
    }

    #[test]
    fn csv_roundtrip_through_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.csv");
        let mut df = df!["group" => &["A", "B"], "n" => &[3i64, 7]].unwrap();
        dataframe_to_csv(&mut df, &path).unwrap();
        let back = read_csv(&path).unwrap();
        assert_eq!(back.height(), 2);
    }
}

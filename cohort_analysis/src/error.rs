use polars::prelude::PolarsError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Failures surfaced by cohort construction and the statistical tests.
///
/// Everything above `Polars` is recoverable at the level of a single
/// comparison: the caller turns it into a skipped or degenerate outcome and
/// moves on to the next comparison.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("column `{column}` not found ({role})")]
    MissingColumn { column: String, role: String },

    #[error("insufficient data: {reason}")]
    InsufficientData { reason: String },

    #[error("degenerate contingency table: {reason}")]
    DegenerateContingencyTable { reason: String },

    #[error("numerical issues: {message}")]
    Numerical { message: String },

    #[error("bad configuration: {message}")]
    Config { message: String },

    #[error("plotting failed: {0}")]
    Plot(String),

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl AnalysisError {
    pub fn missing_column(column: impl Into<String>, role: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
            role: role.into(),
        }
    }

    pub fn insufficient_data(reason: impl Into<String>) -> Self {
        Self::InsufficientData { reason: reason.into() }
    }

    pub fn degenerate(reason: impl Into<String>) -> Self {
        Self::DegenerateContingencyTable { reason: reason.into() }
    }

    pub fn numerical(message: impl Into<String>) -> Self {
        Self::Numerical { message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn plot(err: impl std::fmt::Display) -> Self {
        Self::Plot(err.to_string())
    }

    /// True for the kinds that only invalidate one comparison.
    pub fn is_comparison_local(&self) -> bool {
        matches!(
            self,
            Self::MissingColumn { .. }
                | Self::InsufficientData { .. }
                | Self::DegenerateContingencyTable { .. }
                | Self::Numerical { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_kinds() {
        assert!(AnalysisError::missing_column("CLC", "gene").is_comparison_local());
        assert!(AnalysisError::insufficient_data("n < 2").is_comparison_local());
        assert!(!AnalysisError::config("bad divisor").is_comparison_local());
    }

    #[test]
    fn messages_name_the_column() {
        let err = AnalysisError::missing_column("OS_Time_nature2012", "survival time");
        assert_eq!(
            err.to_string(),
            "column `OS_Time_nature2012` not found (survival time)"
        );
    }
}

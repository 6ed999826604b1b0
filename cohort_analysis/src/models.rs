use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Anything that can be materialised as one table.
pub trait Dataset {
    fn load(&self) -> PolarsResult<DataFrame>;
}

pub fn polars_err(e: Box<dyn std::error::Error>) -> PolarsError {
    PolarsError::ComputeError(format!("{e}").into())
}

// ─────────────────────────────────────────────────────────────────────────────
// Samples
// ─────────────────────────────────────────────────────────────────────────────

/// PAM50 intrinsic subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Pam50Subtype {
    LumA,
    LumB,
    Her2,
    Basal,
    Normal,
}

impl Pam50Subtype {
    pub const ALL: [Pam50Subtype; 5] = [
        Pam50Subtype::LumA,
        Pam50Subtype::LumB,
        Pam50Subtype::Her2,
        Pam50Subtype::Basal,
        Pam50Subtype::Normal,
    ];

    /// The four subtypes plotted in the clinical figures (`Normal` left out).
    pub const CLINICAL: [Pam50Subtype; 4] = [
        Pam50Subtype::LumA,
        Pam50Subtype::LumB,
        Pam50Subtype::Her2,
        Pam50Subtype::Basal,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Pam50Subtype::LumA => "LumA",
            Pam50Subtype::LumB => "LumB",
            Pam50Subtype::Her2 => "Her2",
            Pam50Subtype::Basal => "Basal",
            Pam50Subtype::Normal => "Normal",
        }
    }
}

impl fmt::Display for Pam50Subtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Pam50Subtype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Pam50Subtype::ALL
            .iter()
            .find(|st| st.label().eq_ignore_ascii_case(trimmed))
            .copied()
            .ok_or_else(|| format!("unknown PAM50 label `{trimmed}`"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SurvivalRecord {
    pub time: f64,
    pub event: bool,
}

/// One row of the analysed table. Null expression cells are simply absent
/// from `expression`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub id: String,
    pub expression: BTreeMap<String, f64>,
    pub survival: Option<SurvivalRecord>,
    pub subtype: Option<Pam50Subtype>,
}

impl Sample {
    pub fn expression(&self, gene: &str) -> Option<f64> {
        self.expression.get(gene).copied()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cohorts
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cohort {
    pub name: String,
    pub sample_ids: Vec<String>,
}

impl Cohort {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sample_ids: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sample_ids.iter().any(|s| s == id)
    }
}

/// Mutually exclusive cohorts along one stratification dimension.
/// `cohorts` is kept sorted by name.
#[derive(Debug, Clone, Serialize)]
pub struct CohortSet {
    pub dimension: String,
    pub cohorts: Vec<Cohort>,
    /// Samples left out of every cohort (strict median ties).
    pub excluded: Vec<String>,
}

impl CohortSet {
    pub fn new(dimension: impl Into<String>, mut cohorts: Vec<Cohort>, excluded: Vec<String>) -> Self {
        cohorts.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            dimension: dimension.into(),
            cohorts,
            excluded,
        }
    }

    pub fn cohort(&self, name: &str) -> Option<&Cohort> {
        self.cohorts.iter().find(|c| c.name == name)
    }

    pub fn assigned(&self) -> usize {
        self.cohorts.iter().map(Cohort::len).sum()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.cohorts.iter().map(|c| c.name.as_str()).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Comparisons
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TestKind {
    LogRank,
    MultivariateLogRank,
    ChiSquare,
    CoxPh,
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TestKind::LogRank => "log-rank",
            TestKind::MultivariateLogRank => "multivariate log-rank",
            TestKind::ChiSquare => "chi-square",
            TestKind::CoxPh => "Cox PH",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HazardRatio {
    pub ratio: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TestResult {
    pub statistic: f64,
    pub dof: usize,
    pub p_value: f64,
    pub hazard: Option<HazardRatio>,
}

/// How a comparison ended. Degenerate and skipped outcomes carry no
/// probability; rendering them is up to the report layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TestOutcome {
    Computed(TestResult),
    Degenerate { reason: String },
    Skipped { reason: String },
}

impl TestOutcome {
    pub fn p_value(&self) -> Option<f64> {
        match self {
            TestOutcome::Computed(r) => Some(r.p_value),
            _ => None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            TestOutcome::Computed(_) => "computed",
            TestOutcome::Degenerate { .. } => "degenerate",
            TestOutcome::Skipped { .. } => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortSummary {
    pub name: String,
    pub n: usize,
    pub events: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub name: String,
    pub test: TestKind,
    pub cohorts: Vec<CohortSummary>,
    pub excluded_at_median: usize,
    pub outcome: TestOutcome,
}

impl Comparison {
    pub fn skipped(name: impl Into<String>, test: TestKind, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            test,
            cohorts: Vec::new(),
            excluded_at_median: 0,
            outcome: TestOutcome::Skipped { reason: reason.into() },
        }
    }
}

//! Per-case results.

/// Outcome of one sub-check.
///
/// Sub-checks are independent: a failed one never prevents another from
/// running or being reported, and a skipped one is not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Passed,
    Failed(String),
    Skipped(String),
}

impl CheckOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, CheckOutcome::Failed(_))
    }
}

/// One named sub-check of a case ("build", "image-info", "boot", "case").
#[derive(Debug, Clone)]
pub struct SubCheck {
    pub name: &'static str,
    pub outcome: CheckOutcome,
}

/// All sub-check outcomes of one test case.
#[derive(Debug, Clone)]
pub struct CaseReport {
    pub name: String,
    pub checks: Vec<SubCheck>,
}

impl CaseReport {
    pub(crate) fn single(name: &str, check: &'static str, outcome: CheckOutcome) -> Self {
        Self {
            name: name.to_string(),
            checks: vec![SubCheck {
                name: check,
                outcome,
            }],
        }
    }

    /// Whether any sub-check failed.
    pub fn failed(&self) -> bool {
        self.checks.iter().any(|c| c.outcome.is_failure())
    }
}

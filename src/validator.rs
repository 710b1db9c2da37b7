//! Checks on resolved prompts and generated scripts.
//!
//! Validation never stops at the first problem; every finding is collected
//! into one [`ValidationReport`].

use std::fmt;

use crate::template::residual_placeholders;

/// What a report was produced for. Residual placeholders in a prompt were
/// already reported as resolution anomalies, so they do not block a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    Prompt,
    Script,
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Prompt => f.write_str("prompt"),
            Subject::Script => f.write_str("script"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    Empty,
    ResidualPlaceholder(String),
    MissingContent(String),
}

impl Finding {
    pub fn is_blocking(&self, subject: Subject) -> bool {
        !matches!(
            (self, subject),
            (Finding::ResidualPlaceholder(_), Subject::Prompt)
        )
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::Empty => f.write_str("text is empty"),
            Finding::ResidualPlaceholder(name) => {
                write!(f, "unresolved placeholder {{{name}}}")
            }
            Finding::MissingContent(term) => write!(f, "does not mention \"{term}\""),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    subject: Subject,
    findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn blocking(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(move |f| f.is_blocking(self.subject))
    }

    pub fn passed(&self) -> bool {
        self.blocking().next().is_none()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.findings.is_empty() {
            return write!(f, "{} passed", self.subject);
        }
        write!(f, "{} ", self.subject)?;
        for (i, finding) in self.findings.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{finding}")?;
        }
        Ok(())
    }
}

/// Runs every check on `text` and reports all findings.
///
/// `expectations` are matched case-insensitively as substrings.
pub fn validate(subject: Subject, text: &str, expectations: &[&str]) -> ValidationReport {
    let mut findings = Vec::new();

    if text.trim().is_empty() {
        findings.push(Finding::Empty);
    }
    for name in residual_placeholders(text) {
        findings.push(Finding::ResidualPlaceholder(name));
    }
    let lowered = text.to_lowercase();
    for term in expectations {
        if !lowered.contains(&term.to_lowercase()) {
            findings.push(Finding::MissingContent(term.to_string()));
        }
    }

    ValidationReport { subject, findings }
}

use std::fmt;

/// How serious a [`Diagnostic`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warn,
    Error,
    /// The conversion cannot produce any output.
    Critical,
}

/// A message produced while converting a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: Option<String>,
}

/// An ordered list of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "Info",
            Severity::Warn => "Warning",
            Severity::Error => "Error",
            Severity::Critical => "Critical",
        };
        f.write_str(s)
    }
}

impl Diagnostic {
    pub fn new(severity: Severity, summary: impl Into<String>) -> Self {
        Self {
            severity,
            summary: summary.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}", self.severity, self.summary)?;
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a diagnostic without detail.
    pub fn add(&mut self, severity: Severity, summary: impl Into<String>) {
        self.0.push(Diagnostic::new(severity, summary));
    }

    pub fn add_with_detail(&mut self, severity: Severity, summary: impl Into<String>, detail: impl Into<String>) {
        self.0.push(Diagnostic::new(severity, summary).with_detail(detail));
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.0.push(diag);
    }

    /// Removes every diagnostic of the given severity, keeping the order of the others.
    pub fn remove_by_severity(&mut self, severity: Severity) {
        self.0.retain(|d| d.severity != severity);
    }

    /// Returns true if there is at least one `Error` or `Critical` diagnostic.
    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity >= Severity::Error)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diag) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{diag}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostics {}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<T: IntoIterator<Item = Diagnostic>>(&mut self, iter: T) {
        self.0.extend(iter)
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{Diagnostics, Severity};

    #[test]
    fn rendering() {
        let mut diags = Diagnostics::new();
        diags.add(Severity::Info, "converted 3 scrape configs");
        diags.add_with_detail(Severity::Warn, "unsupported field", "`honor_timestamps` is ignored");
        diags.add(Severity::Critical, "invalid input");
        assert_eq!(
            diags.to_string(),
            "(Info) converted 3 scrape configs\n\
             (Warning) unsupported field: `honor_timestamps` is ignored\n\
             (Critical) invalid input"
        );
    }

    #[test]
    fn filtering() {
        let mut diags = Diagnostics::new();
        diags.add(Severity::Info, "a");
        diags.add(Severity::Warn, "b");
        diags.add(Severity::Info, "c");
        assert!(!diags.has_errors());

        diags.remove_by_severity(Severity::Info);
        let summaries: Vec<&str> = diags.iter().map(|d| d.summary.as_str()).collect();
        assert_eq!(summaries, vec!["b"]);

        diags.add(Severity::Error, "d");
        assert!(diags.has_errors());
        assert_eq!(diags.len(), 2);
    }
}

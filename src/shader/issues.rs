//! Structured compiler and linker diagnostics.
//!
//! Driver info logs are parsed line by line. Three shapes are recognized:
//!
//! ```text
//! ERROR: 0:12: 'token' : message      error with token and line
//! ERROR: 0:12: message                error with line
//! WARNING: 0:12: message              warning with line
//! ```
//!
//! Anything else that isn't blank becomes an issue with an unknown line.
//! Summary lines such as `ERROR: 2 compilation errors.  No code
//! generated.` are dropped, as is any line matching a configured benign
//! pattern.

use std::fmt;

use super::source::StageKind;

/// Stage an issue was reported for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueStage {
    /// A compiled stage.
    Stage(StageKind),
    /// The link step.
    Program,
}

impl fmt::Display for IssueStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage(stage) => fmt::Display::fmt(stage, f),
            Self::Program => f.write_str("program"),
        }
    }
}

impl From<StageKind> for IssueStage {
    fn from(stage: StageKind) -> Self {
        Self::Stage(stage)
    }
}

/// Where in the source an issue points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueLine {
    /// A line of the author's (expanded) source.
    Line(u32),
    /// The message carried no line number.
    Unknown,
    /// A line in generated preamble code.
    Generated,
}

/// Issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    /// Informational; compilation still succeeded.
    Warning,
    /// Compilation or linking failed.
    Error,
}

/// One diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Stage or link step.
    pub stage: IssueStage,
    /// Source location.
    pub line: IssueLine,
    /// Severity.
    pub severity: Severity,
    /// Message text, without the severity/location prefix.
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match self.line {
            IssueLine::Line(n) => write!(f, "{}:{n}: {severity}: {}", self.stage, self.message),
            IssueLine::Unknown => write!(f, "{}: {severity}: {}", self.stage, self.message),
            IssueLine::Generated => {
                write!(f, "{} (generated code): {severity}: {}", self.stage, self.message)
            }
        }
    }
}

/// Collector passed to compile/link calls to receive diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Issues {
    list: Vec<Issue>,
}

impl Issues {
    /// An empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one issue.
    pub fn push(&mut self, issue: Issue) {
        self.list.push(issue);
    }

    /// Append several issues.
    pub fn extend(&mut self, issues: impl IntoIterator<Item = Issue>) {
        self.list.extend(issues);
    }

    /// All issues in report order.
    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.list.iter()
    }

    /// Whether any issue is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.list.iter().any(|i| i.severity == Severity::Error)
    }

    /// Number of issues.
    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Whether no issue was reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl<'a> IntoIterator for &'a Issues {
    type Item = &'a Issue;
    type IntoIter = std::slice::Iter<'a, Issue>;

    fn into_iter(self) -> Self::IntoIter {
        self.list.iter()
    }
}

/// Parses driver logs into [`Issue`]s, dropping known-benign messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticFilter {
    benign: Vec<String>,
    generated_line_threshold: u32,
}

impl DiagnosticFilter {
    /// Filter dropping lines that contain any of `benign`.
    #[must_use]
    pub fn new(benign: Vec<String>, generated_line_threshold: u32) -> Self {
        Self {
            benign,
            generated_line_threshold,
        }
    }

    /// Whether `line` matches a benign pattern.
    #[must_use]
    pub fn is_benign(&self, line: &str) -> bool {
        self.benign.iter().any(|p| !p.is_empty() && line.contains(p.as_str()))
    }

    /// Parse a whole info log.
    #[must_use]
    pub fn parse(&self, stage: IssueStage, log: &str) -> Vec<Issue> {
        log.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !self.is_benign(line))
            .filter_map(|line| self.parse_line(stage, line))
            .collect()
    }

    fn parse_line(&self, stage: IssueStage, line: &str) -> Option<Issue> {
        let (severity, body) = if let Some(body) = line.strip_prefix("ERROR:") {
            (Severity::Error, body.trim_start())
        } else if let Some(body) = line.strip_prefix("WARNING:") {
            (Severity::Warning, body.trim_start())
        } else {
            let severity = if line.to_ascii_lowercase().contains("error") {
                Severity::Error
            } else {
                Severity::Warning
            };
            return Some(Issue {
                stage,
                line: IssueLine::Unknown,
                severity,
                message: line.to_owned(),
            });
        };

        if is_summary(body) {
            return None;
        }

        let Some((line_number, message)) = split_location(body) else {
            return Some(Issue {
                stage,
                line: IssueLine::Unknown,
                severity,
                message: body.to_owned(),
            });
        };
        let line = if line_number >= self.generated_line_threshold {
            IssueLine::Generated
        } else {
            IssueLine::Line(line_number)
        };
        Some(Issue {
            stage,
            line,
            severity,
            message: token_message(message),
        })
    }
}

/// `"2 compilation errors.  No code generated."`
fn is_summary(body: &str) -> bool {
    body.starts_with(|c: char| c.is_ascii_digit())
        && body.contains("compilation error")
}

/// Split `"0:12: rest"` into `(12, "rest")`.
fn split_location(body: &str) -> Option<(u32, &str)> {
    let (file, rest) = body.split_once(':')?;
    if file.is_empty() || !file.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (line, rest) = rest.split_once(':')?;
    let line = line.trim().parse().ok()?;
    Some((line, rest.trim_start()))
}

/// Rewrite `"'token' : message"` as `"message (near 'token')"`.
fn token_message(message: &str) -> String {
    let Some(rest) = message.strip_prefix('\'') else {
        return message.to_owned();
    };
    match rest.split_once("' :") {
        Some((token, text)) => format!("{} (near '{token}')", text.trim()),
        None => message.to_owned(),
    }
}

//! Findings produced by analyzers and the log items the engine emits.
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Tip,
    Success,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Tip => "tip",
            Self::Success => "success",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl ValidationFinding {
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn tip(message: impl Into<String>) -> Self {
        Self::new(Severity::Tip, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(Severity::Success, message)
    }

    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            snippet: None,
        }
    }

    #[must_use]
    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }
}

/// Result of one analyzer run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub findings: Vec<ValidationFinding>,
    pub success: bool,
}

impl Analysis {
    /// Success means no finding carries [`Severity::Error`]; warnings and tips
    /// are advisory.
    #[must_use]
    pub fn from_findings(findings: Vec<ValidationFinding>) -> Self {
        let success = !findings.iter().any(|f| f.severity == Severity::Error);
        Self { findings, success }
    }

    #[must_use]
    pub fn errors(&self) -> usize {
        self.count(Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    }

    /// Findings as loggable items, with snippets split into their own entry.
    #[must_use]
    pub fn to_feedback(&self) -> Vec<FeedbackItem> {
        let mut items = Vec::with_capacity(self.findings.len());
        for finding in &self.findings {
            items.push(FeedbackItem::typed(
                FeedbackKind::from(finding.severity),
                finding.message.clone(),
            ));
            if let Some(snippet) = &finding.snippet {
                items.push(FeedbackItem::Code {
                    snippet: snippet.clone(),
                });
            }
        }
        items
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Input,
    Output,
    Success,
    Error,
    Warning,
    Tip,
    Hint,
    Focus,
    System,
}

impl From<Severity> for FeedbackKind {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Error => Self::Error,
            Severity::Warning => Self::Warning,
            Severity::Tip => Self::Tip,
            Severity::Success => Self::Success,
        }
    }
}

/// One line in a module's activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedbackItem {
    PlainText { text: String },
    Typed { kind: FeedbackKind, message: String },
    Code { snippet: String },
}

impl FeedbackItem {
    pub fn text(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    pub fn typed(kind: FeedbackKind, message: impl Into<String>) -> Self {
        Self::Typed {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> Option<FeedbackKind> {
        match self {
            Self::Typed { kind, .. } => Some(*kind),
            Self::PlainText { .. } | Self::Code { .. } => None,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::PlainText { text } => text,
            Self::Typed { message, .. } => message,
            Self::Code { snippet } => snippet,
        }
    }
}

impl fmt::Display for FeedbackItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlainText { text } => f.write_str(text),
            Self::Typed { kind, message } => match kind {
                FeedbackKind::Input => write!(f, "$ {message}"),
                FeedbackKind::Focus => write!(f, "💡 Learning focus: {message}"),
                FeedbackKind::Hint => write!(f, "💡 Hint: {message}"),
                _ => f.write_str(message),
            },
            Self::Code { snippet } => write!(f, "```\n{snippet}\n```"),
        }
    }
}

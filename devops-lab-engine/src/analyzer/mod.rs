//! Validation analyzers for editor content.
//!
//! Each analyzer is a pure function of the content and the attempt number.
//! The attempt number only changes how much remediation is appended, never
//! whether the content passes.
use serde::{Deserialize, Serialize};

use crate::config::LabConfig;
use crate::editor::EditorKind;
use crate::feedback::Analysis;

pub mod dockerfile;
pub mod infrastructure;
pub mod manifest;

pub use dockerfile::DockerfileAnalyzer;
pub use infrastructure::{InfraFacts, InfrastructureAnalyzer};
pub use manifest::ManifestAnalyzer;

pub trait Analyzer {
    fn analyze(&self, content: &str, attempt: u32) -> Analysis;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ManifestScope {
    /// Deployment checks only.
    Deployment,
    /// Deployment plus Service cross references.
    #[default]
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfraTarget {
    Policy,
    Autoscaling,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "analyzer", rename_all = "snake_case")]
pub enum ValidationProfile {
    BuildFile {
        #[serde(default)]
        required_port: Option<u16>,
    },
    Manifest {
        #[serde(default)]
        scope: ManifestScope,
        #[serde(default)]
        expected_port: Option<u16>,
    },
    Infrastructure { target: InfraTarget },
}

impl ValidationProfile {
    #[must_use]
    pub const fn editor(&self) -> EditorKind {
        match self {
            Self::BuildFile { .. } => EditorKind::BuildFile,
            Self::Manifest { .. } => EditorKind::Manifest,
            Self::Infrastructure { .. } => EditorKind::Infrastructure,
        }
    }

    #[must_use]
    pub fn analyze(&self, content: &str, attempt: u32, config: &LabConfig) -> Analysis {
        let escalate_at = config.hint_escalation_attempt;
        match self {
            Self::BuildFile { required_port } => DockerfileAnalyzer {
                required_port: *required_port,
                escalate_at,
            }
            .analyze(content, attempt),
            Self::Manifest {
                scope,
                expected_port,
            } => ManifestAnalyzer {
                scope: *scope,
                expected_port: *expected_port,
                escalate_at,
            }
            .analyze(content, attempt),
            Self::Infrastructure { target } => InfrastructureAnalyzer {
                target: *target,
                policy: config.iac_policy.clone(),
                escalate_at,
            }
            .analyze(content, attempt),
        }
    }
}

/// Which editor content a step validates and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    /// File to analyze; `None` analyzes every open file together.
    #[serde(default)]
    pub file: Option<String>,
    pub profile: ValidationProfile,
}

/// Drop whole-line comments so commented-out examples cannot satisfy a check.
#[must_use]
pub fn strip_comments(content: &str, markers: &[&str]) -> String {
    content
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !markers.iter().any(|marker| trimmed.starts_with(marker))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[must_use]
pub fn has_conflict_markers(content: &str) -> bool {
    crate::constants::CONFLICT_MARKERS
        .iter()
        .any(|marker| content.contains(marker))
}

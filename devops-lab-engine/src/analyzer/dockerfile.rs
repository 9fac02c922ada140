//! Build-file checks: base image, start command, and exposed port.
use super::{Analyzer, has_conflict_markers, strip_comments};
use crate::constants::HINT_ESCALATION_ATTEMPT;
use crate::feedback::{Analysis, ValidationFinding};

const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DockerfileAnalyzer {
    /// Port that must appear in an `EXPOSE` line, when the step demands one.
    pub required_port: Option<u16>,
    pub escalate_at: u32,
}

impl Default for DockerfileAnalyzer {
    fn default() -> Self {
        Self {
            required_port: None,
            escalate_at: HINT_ESCALATION_ATTEMPT,
        }
    }
}

impl Analyzer for DockerfileAnalyzer {
    fn analyze(&self, content: &str, attempt: u32) -> Analysis {
        if has_conflict_markers(content) {
            return Analysis::from_findings(vec![ValidationFinding::error(
                "Merge conflict markers are still in the Dockerfile. Keep the correct lines and delete the markers.",
            )]);
        }

        let body = strip_comments(content, &["#"]);
        let directives: Vec<(String, &str)> = body
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                let (instruction, args) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
                (instruction.to_ascii_uppercase(), args.trim())
            })
            .collect();
        let has = |name: &str| directives.iter().any(|(instruction, _)| instruction == name);

        let mut findings = Vec::new();
        if !has("FROM") {
            findings.push(ValidationFinding::error(
                "Missing FROM instruction: every image needs a base image.",
            ));
        }
        if !has("CMD") && !has("ENTRYPOINT") {
            findings.push(ValidationFinding::error(
                "Missing CMD instruction: the container has no command to start your app.",
            ));
        }
        let exposed: Vec<u16> = directives
            .iter()
            .filter(|(instruction, _)| instruction == "EXPOSE")
            .flat_map(|(_, args)| args.split_whitespace())
            .filter_map(|token| token.split('/').next()?.parse().ok())
            .collect();
        if !has("EXPOSE") {
            findings.push(ValidationFinding::error(
                "Missing EXPOSE instruction: declare the port your app listens on.",
            ));
        } else if let Some(port) = self.required_port
            && !exposed.contains(&port)
        {
            findings.push(ValidationFinding::error(format!(
                "EXPOSE must include port {port}, the port the reviewer asked for."
            )));
        }
        if !has("WORKDIR") {
            findings.push(ValidationFinding::tip(
                "Set a WORKDIR so later COPY and RUN paths are predictable.",
            ));
        }

        let mut analysis = Analysis::from_findings(findings);
        if analysis.success {
            analysis
                .findings
                .push(ValidationFinding::success("Dockerfile looks good! ✅"));
        } else if attempt >= self.escalate_at {
            analysis.findings.push(
                ValidationFinding::tip("Still stuck? Compare with this working Dockerfile:")
                    .with_snippet(reference(self.required_port.unwrap_or(DEFAULT_PORT))),
            );
        }
        analysis
    }
}

fn reference(port: u16) -> String {
    format!(
        "FROM node:18-alpine\nWORKDIR /app\nCOPY package*.json ./\nRUN npm install\nCOPY . .\nEXPOSE {port}\nCMD [\"npm\", \"start\"]"
    )
}

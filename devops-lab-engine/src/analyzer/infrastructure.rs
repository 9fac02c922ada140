//! Terraform checks: required blocks plus region and cost policy.
use regex::Regex;
use std::sync::OnceLock;

use super::{Analyzer, InfraTarget, strip_comments};
use crate::config::IacPolicy;
use crate::constants::HINT_ESCALATION_ATTEMPT;
use crate::feedback::{Analysis, ValidationFinding};

const COMMENT_MARKERS: [&str; 2] = ["#", "//"];

const REFERENCE_POLICY: &str = r#"provider "aws" {
  region = "eu-central-1"
}

resource "aws_instance" "web" {
  ami           = var.ami_id
  instance_type = "t3.micro"
}

output "instance_id" {
  value = aws_instance.web.id
}"#;

const REFERENCE_AUTOSCALING: &str = r#"resource "aws_launch_template" "web" {
  name_prefix   = "web-"
  image_id      = var.ami_id
  instance_type = "t3.micro"
}

resource "aws_autoscaling_group" "web" {
  min_size         = 2
  max_size         = 4
  desired_capacity = 2

  launch_template {
    id      = aws_launch_template.web.id
    version = "$Latest"
  }

  tag {
    key                 = "Name"
    value               = "web"
    propagate_at_launch = true
  }
}"#;

struct Patterns {
    region: Regex,
    instance_type: Regex,
    provider: Regex,
    output: Regex,
    resource: Regex,
    launch_template: Regex,
    autoscaling_group: Regex,
    launch_template_block: Regex,
    tag_block: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            region: Regex::new(r#"region\s*=\s*"([\w-]+)""#)?,
            instance_type: Regex::new(r#"instance_type\s*=\s*"([\w.-]+)""#)?,
            provider: Regex::new(r#"provider\s+"aws""#)?,
            output: Regex::new(r#"output\s+""#)?,
            resource: Regex::new(r#"resource\s+""#)?,
            launch_template: Regex::new(r#"resource\s+"aws_launch_template"\s+""#)?,
            autoscaling_group: Regex::new(r#"resource\s+"aws_autoscaling_group"\s+""#)?,
            launch_template_block: Regex::new(r"launch_template\s*\{")?,
            tag_block: Regex::new(r"tag\s*\{")?,
        })
    }
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| match Patterns::compile() {
            Ok(patterns) => Some(patterns),
            Err(err) => {
                log::error!("terraform patterns failed to compile: {err}");
                None
            }
        })
        .as_ref()
}

/// What a Terraform workspace declares once comments are removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfraFacts {
    pub regions: Vec<String>,
    pub instance_types: Vec<String>,
    pub has_provider: bool,
    pub has_output: bool,
    pub has_resource: bool,
    pub has_launch_template: bool,
    pub has_autoscaling_group: bool,
    pub has_launch_template_block: bool,
    pub has_tag_block: bool,
}

impl InfraFacts {
    #[must_use]
    pub fn scan(content: &str) -> Self {
        let Some(patterns) = patterns() else {
            return Self::default();
        };
        let body = strip_comments(content, &COMMENT_MARKERS);
        let values = |regex: &Regex| -> Vec<String> {
            regex
                .captures_iter(&body)
                .filter_map(|caps| caps.get(1))
                .map(|group| group.as_str().to_string())
                .collect()
        };
        Self {
            regions: values(&patterns.region),
            instance_types: values(&patterns.instance_type),
            has_provider: patterns.provider.is_match(&body),
            has_output: patterns.output.is_match(&body),
            has_resource: patterns.resource.is_match(&body),
            has_launch_template: patterns.launch_template.is_match(&body),
            has_autoscaling_group: patterns.autoscaling_group.is_match(&body),
            has_launch_template_block: patterns.launch_template_block.is_match(&body),
            has_tag_block: patterns.tag_block.is_match(&body),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfrastructureAnalyzer {
    pub target: InfraTarget,
    pub policy: IacPolicy,
    pub escalate_at: u32,
}

impl InfrastructureAnalyzer {
    #[must_use]
    pub fn new(target: InfraTarget) -> Self {
        Self {
            target,
            policy: IacPolicy::default(),
            escalate_at: HINT_ESCALATION_ATTEMPT,
        }
    }

    fn policy_findings(&self, facts: &InfraFacts) -> Vec<ValidationFinding> {
        let mut findings = Vec::new();
        if !facts.has_provider {
            findings.push(ValidationFinding::error(
                "Missing provider \"aws\" block: Terraform does not know which cloud to use.",
            ));
        }
        if !facts.has_resource {
            findings.push(ValidationFinding::error(
                "No resource blocks found. Declare at least one resource.",
            ));
        }
        if facts.regions.is_empty() {
            findings.push(ValidationFinding::error("No region set on the AWS provider."));
        }
        for region in &facts.regions {
            if *region != self.policy.approved_region {
                findings.push(ValidationFinding::error(format!(
                    "Region '{region}' is not approved. Deploy to {}.",
                    self.policy.approved_region
                )));
            }
        }
        if facts.instance_types.is_empty() {
            findings.push(ValidationFinding::error("No instance_type set."));
        }
        for instance_type in &facts.instance_types {
            if !self.policy.is_cost_optimized(instance_type) {
                findings.push(ValidationFinding::error(format!(
                    "Instance type '{instance_type}' breaks the cost policy. Pick a micro or small size, or the t3 family."
                )));
            }
        }
        if !facts.has_output {
            findings.push(ValidationFinding::warning(
                "No outputs declared. Add an output so the team can find what was created.",
            ));
        }
        findings
    }

    fn autoscaling_findings(facts: &InfraFacts) -> Vec<ValidationFinding> {
        let mut findings = Vec::new();
        if !facts.has_launch_template {
            findings.push(ValidationFinding::error(
                "Missing resource \"aws_launch_template\".",
            ));
        }
        if !facts.has_autoscaling_group {
            findings.push(ValidationFinding::error(
                "Missing resource \"aws_autoscaling_group\".",
            ));
        }
        if !facts.has_launch_template_block {
            findings.push(ValidationFinding::error(
                "The autoscaling group must reference the template in a launch_template { } block.",
            ));
        }
        if !facts.has_tag_block {
            findings.push(ValidationFinding::error(
                "Add a tag { } block so instances launched by the group are identifiable.",
            ));
        }
        findings
    }
}

impl Analyzer for InfrastructureAnalyzer {
    fn analyze(&self, content: &str, attempt: u32) -> Analysis {
        let facts = InfraFacts::scan(content);
        let (findings, success_message, reference) = match self.target {
            InfraTarget::Policy => (
                self.policy_findings(&facts),
                "Terraform configuration passes policy checks. ✅",
                REFERENCE_POLICY,
            ),
            InfraTarget::Autoscaling => (
                Self::autoscaling_findings(&facts),
                "Autoscaling configuration is complete. ✅",
                REFERENCE_AUTOSCALING,
            ),
        };
        let mut analysis = Analysis::from_findings(findings);
        if analysis.success {
            analysis
                .findings
                .push(ValidationFinding::success(success_message));
        } else if attempt >= self.escalate_at {
            analysis.findings.push(
                ValidationFinding::tip("Compare your configuration with this reference:")
                    .with_snippet(reference),
            );
        }
        analysis
    }
}

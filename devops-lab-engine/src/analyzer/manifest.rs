//! Kubernetes manifest checks for a Deployment and its Service.
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use super::{Analyzer, ManifestScope};
use crate::constants::HINT_ESCALATION_ATTEMPT;
use crate::feedback::{Analysis, ValidationFinding};

const REFERENCE: &str = "apiVersion: apps/v1
kind: Deployment
metadata:
  name: web-app
spec:
  replicas: 2
  selector:
    matchLabels:
      app: web
  template:
    metadata:
      labels:
        app: web
    spec:
      containers:
        - name: web
          image: nginx:1.25
          ports:
            - containerPort: 3000
---
apiVersion: v1
kind: Service
metadata:
  name: web-service
spec:
  selector:
    app: web
  ports:
    - port: 80
      targetPort: 3000";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestAnalyzer {
    pub scope: ManifestScope,
    /// Port containers are expected to listen on; a mismatch is a warning.
    pub expected_port: Option<u16>,
    pub escalate_at: u32,
}

impl Default for ManifestAnalyzer {
    fn default() -> Self {
        Self {
            scope: ManifestScope::Full,
            expected_port: None,
            escalate_at: HINT_ESCALATION_ATTEMPT,
        }
    }
}

impl Analyzer for ManifestAnalyzer {
    fn analyze(&self, content: &str, attempt: u32) -> Analysis {
        let documents = match parse_documents(content) {
            Ok(documents) => documents,
            Err(err) => {
                let mut findings = vec![ValidationFinding::error(format!("YAML syntax error: {err}"))];
                // One attempt ahead of the reference snippet.
                if attempt.saturating_add(1) >= self.escalate_at {
                    findings.push(ValidationFinding::tip(
                        "YAML is indentation sensitive: use spaces, not tabs, and keep list items aligned.",
                    ));
                }
                return Analysis::from_findings(findings);
            }
        };

        let mut findings = Vec::new();
        let Some(deployment) = find_kind(&documents, "Deployment") else {
            findings.push(ValidationFinding::error(
                "No Deployment found. The manifest needs a document with kind: Deployment.",
            ));
            return self.finish(findings, attempt);
        };

        check_replicas(deployment, &mut findings);
        let pod_labels = mapping_at(deployment, &["spec", "template", "metadata", "labels"]);
        if pod_labels.is_none() {
            findings.push(ValidationFinding::error(
                "Pod template has no metadata.labels, so nothing can select these pods.",
            ));
        }
        check_selector(deployment, pod_labels, &mut findings);
        let container_ports = self.check_containers(deployment, &mut findings);

        if self.scope == ManifestScope::Full {
            match find_kind(&documents, "Service") {
                Some(service) => {
                    check_service(service, pod_labels, &container_ports, &mut findings);
                }
                None => findings.push(ValidationFinding::error(
                    "No Service found. Add a Service so traffic can reach the pods.",
                )),
            }
        }

        self.finish(findings, attempt)
    }
}

impl ManifestAnalyzer {
    fn check_containers(&self, deployment: &Value, findings: &mut Vec<ValidationFinding>) -> Vec<u64> {
        let containers = value_at(deployment, &["spec", "template", "spec", "containers"])
            .and_then(Value::as_sequence)
            .filter(|containers| !containers.is_empty());
        let Some(containers) = containers else {
            findings.push(ValidationFinding::error(
                "Pod template defines no containers.",
            ));
            return Vec::new();
        };

        let mut ports = Vec::new();
        for (index, container) in containers.iter().enumerate() {
            let name = container
                .get("name")
                .and_then(Value::as_str)
                .map_or_else(|| format!("#{}", index + 1), str::to_string);
            if container.get("name").is_none() {
                findings.push(ValidationFinding::warning(format!(
                    "Container {name} has no name."
                )));
            }
            if container.get("image").and_then(Value::as_str).is_none() {
                findings.push(ValidationFinding::error(format!(
                    "Container {name} has no image."
                )));
            }
            let declared: Vec<u64> = container
                .get("ports")
                .and_then(Value::as_sequence)
                .map(|entries| {
                    entries
                        .iter()
                        .filter_map(|entry| entry.get("containerPort").and_then(Value::as_u64))
                        .collect()
                })
                .unwrap_or_default();
            if declared.is_empty() {
                findings.push(ValidationFinding::warning(format!(
                    "Container {name} declares no containerPort."
                )));
            } else if let Some(expected) = self.expected_port
                && !declared.contains(&u64::from(expected))
            {
                findings.push(ValidationFinding::warning(format!(
                    "Container {name} listens on {}; the app expects containerPort {expected}.",
                    join_ports(&declared)
                )));
            }
            ports.extend(declared);
        }
        ports
    }

    fn finish(&self, findings: Vec<ValidationFinding>, attempt: u32) -> Analysis {
        let mut analysis = Analysis::from_findings(findings);
        if analysis.success {
            analysis.findings.push(ValidationFinding::success(
                "Manifest is valid: selectors, labels, and ports line up. ✅",
            ));
            return analysis;
        }
        if attempt == 1 {
            analysis.findings.push(ValidationFinding::tip(
                "Mentor tip: compare spec.selector.matchLabels with spec.template.metadata.labels key by key.",
            ));
        }
        if attempt >= self.escalate_at {
            analysis.findings.push(
                ValidationFinding::tip("Reference manifest with matching labels and ports:")
                    .with_snippet(REFERENCE),
            );
        }
        analysis
    }
}

fn parse_documents(content: &str) -> Result<Vec<Value>, serde_yaml::Error> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = Value::deserialize(document)?;
        if !value.is_null() {
            documents.push(value);
        }
    }
    Ok(documents)
}

fn find_kind<'a>(documents: &'a [Value], kind: &str) -> Option<&'a Value> {
    documents
        .iter()
        .find(|doc| doc.get("kind").and_then(Value::as_str) == Some(kind))
}

fn value_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

fn mapping_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Mapping> {
    value_at(value, path).and_then(Value::as_mapping)
}

fn check_replicas(deployment: &Value, findings: &mut Vec<ValidationFinding>) {
    match value_at(deployment, &["spec", "replicas"]) {
        None => findings.push(ValidationFinding::error(
            "Deployment is missing spec.replicas.",
        )),
        Some(value) => match value.as_i64() {
            None => findings.push(ValidationFinding::error(format!(
                "spec.replicas must be a number, found {}.",
                scalar(value)
            ))),
            Some(count) if count < 1 => findings.push(ValidationFinding::warning(
                "spec.replicas is 0, so no pods will run.",
            )),
            Some(1) => findings.push(ValidationFinding::warning(
                "A single replica has no redundancy; consider at least 2.",
            )),
            Some(_) => {}
        },
    }
}

fn check_selector(
    deployment: &Value,
    pod_labels: Option<&Mapping>,
    findings: &mut Vec<ValidationFinding>,
) {
    let Some(selector) = mapping_at(deployment, &["spec", "selector"]) else {
        findings.push(ValidationFinding::error(
            "Deployment is missing spec.selector.matchLabels.",
        ));
        return;
    };
    let Some(match_labels) = selector.get("matchLabels").and_then(Value::as_mapping) else {
        let typo = selector
            .keys()
            .filter_map(Value::as_str)
            .find(|key| looks_like_match_labels(key));
        findings.push(match typo {
            Some(key) => ValidationFinding::error(format!(
                "Found '{key}' under spec.selector. Did you mean 'matchLabels'?"
            )),
            None => ValidationFinding::error("Deployment is missing spec.selector.matchLabels."),
        });
        return;
    };
    if let Some(labels) = pod_labels {
        compare_selector("Selector", match_labels, labels, findings);
    }
}

fn looks_like_match_labels(key: &str) -> bool {
    let folded: String = key
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    folded == "matchlabels" || folded == "matchlabel"
}

/// Report each selector key that is absent from, or differs in, the labels.
fn compare_selector(
    owner: &str,
    selector: &Mapping,
    labels: &Mapping,
    findings: &mut Vec<ValidationFinding>,
) {
    for (key, wanted) in selector {
        let key = scalar(key);
        let wanted = scalar(wanted);
        match labels.get(key.as_str()) {
            None => findings.push(ValidationFinding::error(format!(
                "{owner} '{key}: {wanted}' has no matching Pod label '{key}'."
            ))),
            Some(actual) if scalar(actual) != wanted => {
                findings.push(ValidationFinding::error(format!(
                    "{owner} '{key}: {wanted}' does not match Pod label '{key}: {}'.",
                    scalar(actual)
                )));
            }
            Some(_) => {}
        }
    }
}

fn check_service(
    service: &Value,
    pod_labels: Option<&Mapping>,
    container_ports: &[u64],
    findings: &mut Vec<ValidationFinding>,
) {
    match mapping_at(service, &["spec", "selector"]) {
        None => findings.push(ValidationFinding::warning(
            "Service has no selector, so it will not route to any pods.",
        )),
        Some(selector) => {
            if let Some(labels) = pod_labels {
                compare_selector("Service selector", selector, labels, findings);
            }
        }
    }

    if container_ports.is_empty() {
        return;
    }
    let ports = value_at(service, &["spec", "ports"])
        .and_then(Value::as_sequence)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for entry in ports {
        let target = entry.get("targetPort").or_else(|| entry.get("port"));
        if let Some(port) = target.and_then(Value::as_u64)
            && !container_ports.contains(&port)
        {
            findings.push(ValidationFinding::error(format!(
                "Service targetPort {port} does not match any containerPort ({}).",
                join_ports(container_ports)
            )));
        }
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null => "null".to_string(),
        other => serde_yaml::to_string(other)
            .map(|text| text.trim().to_string())
            .unwrap_or_default(),
    }
}

fn join_ports(ports: &[u64]) -> String {
    ports
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

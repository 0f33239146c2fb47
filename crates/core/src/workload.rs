//! Workload identity as seen by the query builders.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label name used for the cluster matcher when none is configured.
pub const DEFAULT_CLUSTER_LABEL: &str = "cluster";

/// Cluster matcher added to every selector when Prometheus scrapes more than
/// one cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ClusterLabel {
    pub label: String,
    pub value: String,
}

impl ClusterLabel {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self { label: label.into(), value: value.into() }
    }

    /// Build from optional settings. An empty or missing value means "no
    /// cluster matcher"; an empty or missing label name falls back to
    /// [`DEFAULT_CLUSTER_LABEL`].
    pub fn from_settings(label: Option<&str>, value: Option<&str>) -> Option<Self> {
        let value = value.map(str::trim).filter(|v| !v.is_empty())?;
        let label = label.map(str::trim).filter(|l| !l.is_empty()).unwrap_or(DEFAULT_CLUSTER_LABEL);
        Some(Self::new(label, value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkloadError {
    #[error("workload {namespace}/{container} has no pods")]
    NoPods { namespace: String, container: String },
    #[error("workload namespace is empty")]
    EmptyNamespace,
    #[error("workload container name is empty")]
    EmptyContainer,
}

/// A workload's identity: namespace, the pods it currently owns, and the
/// container whose memory is being estimated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkloadRef {
    pub namespace: String,
    /// Pod names in the order they should appear in the pod matcher.
    pub pods: Vec<String>,
    pub container: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterLabel>,
}

impl WorkloadRef {
    pub fn new<I, S>(namespace: impl Into<String>, pods: I, container: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            namespace: namespace.into(),
            pods: pods.into_iter().map(Into::into).collect(),
            container: container.into(),
            cluster: None,
        }
    }

    pub fn with_cluster(mut self, cluster: Option<ClusterLabel>) -> Self {
        self.cluster = cluster;
        self
    }

    /// Boundary check for callers that want to reject obviously unusable
    /// workloads. The query builders never call this and render whatever
    /// they are given.
    pub fn validate(&self) -> Result<(), WorkloadError> {
        if self.namespace.is_empty() {
            return Err(WorkloadError::EmptyNamespace);
        }
        if self.container.is_empty() {
            return Err(WorkloadError::EmptyContainer);
        }
        if self.pods.is_empty() {
            return Err(WorkloadError::NoPods {
                namespace: self.namespace.clone(),
                container: self.container.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_from_settings_drops_empty_value() {
        assert_eq!(ClusterLabel::from_settings(Some("cluster"), Some("")), None);
        assert_eq!(ClusterLabel::from_settings(Some("cluster"), None), None);
        assert_eq!(ClusterLabel::from_settings(None, Some("  ")), None);
    }

    #[test]
    fn cluster_from_settings_defaults_label() {
        let c = ClusterLabel::from_settings(None, Some("eu-west")).expect("cluster");
        assert_eq!(c.label, DEFAULT_CLUSTER_LABEL);
        assert_eq!(c.value, "eu-west");
        let c = ClusterLabel::from_settings(Some("k8s_cluster"), Some("eu-west")).expect("cluster");
        assert_eq!(c.label, "k8s_cluster");
    }

    #[test]
    fn validate_rejects_empty_parts() {
        let w = WorkloadRef::new("prod", Vec::<String>::new(), "web");
        assert!(matches!(w.validate(), Err(WorkloadError::NoPods { .. })));
        let w = WorkloadRef::new("", ["a"], "web");
        assert_eq!(w.validate(), Err(WorkloadError::EmptyNamespace));
        let w = WorkloadRef::new("prod", ["a"], "");
        assert_eq!(w.validate(), Err(WorkloadError::EmptyContainer));
        assert!(WorkloadRef::new("prod", ["a", "b"], "web").validate().is_ok());
    }

    #[test]
    fn no_pods_message_names_workload() {
        let err = WorkloadRef::new("prod", Vec::<String>::new(), "web").validate().unwrap_err();
        assert_eq!(err.to_string(), "workload prod/web has no pods");
    }
}

//! krr kubehub – resolve workloads into the pod set the memory queries match

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use kube::{api::ListParams, Api, Client};
use krr_core::{ClusterLabel, WorkloadRef};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub async fn get_kube_client() -> Result<Client> {
    Client::try_default().await.context("building kube client from default config")
}

/// Controller kinds a workload can be resolved from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
    Job,
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::StatefulSet => "StatefulSet",
            WorkloadKind::DaemonSet => "DaemonSet",
            WorkloadKind::Job => "Job",
        };
        f.write_str(s)
    }
}

impl FromStr for WorkloadKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "deployment" | "deploy" | "deployments" => Ok(WorkloadKind::Deployment),
            "statefulset" | "sts" | "statefulsets" => Ok(WorkloadKind::StatefulSet),
            "daemonset" | "ds" | "daemonsets" => Ok(WorkloadKind::DaemonSet),
            "job" | "jobs" => Ok(WorkloadKind::Job),
            _ => Err(anyhow!("unsupported workload kind: {} (expect deployment, statefulset, daemonset or job)", s)),
        }
    }
}

/// Render a LabelSelector in the `labelSelector` query syntax.
/// Returns None for a selector with no requirements (would match everything).
pub fn label_selector_string(sel: &LabelSelector) -> Result<Option<String>> {
    let mut parts: Vec<String> = Vec::new();
    if let Some(labels) = sel.match_labels.as_ref() {
        // BTreeMap keeps this stable
        for (k, v) in labels.iter() {
            parts.push(format!("{}={}", k, v));
        }
    }
    for req in sel.match_expressions.iter().flatten() {
        parts.push(requirement_string(req)?);
    }
    Ok(if parts.is_empty() { None } else { Some(parts.join(",")) })
}

fn requirement_string(req: &LabelSelectorRequirement) -> Result<String> {
    let values = req.values.clone().unwrap_or_default().join(",");
    match req.operator.as_str() {
        "In" => Ok(format!("{} in ({})", req.key, values)),
        "NotIn" => Ok(format!("{} notin ({})", req.key, values)),
        "Exists" => Ok(req.key.clone()),
        "DoesNotExist" => Ok(format!("!{}", req.key)),
        op => Err(anyhow!("unsupported label selector operator {} on key {}", op, req.key)),
    }
}

/// Pick the container to estimate: the requested one if the template has
/// it, else the template's first container.
pub fn pick_container(spec: Option<&PodSpec>, requested: Option<&str>) -> Result<String> {
    let names: Vec<&str> = spec.map(|s| s.containers.iter().map(|c| c.name.as_str()).collect()).unwrap_or_default();
    match requested {
        Some(want) if names.is_empty() || names.contains(&want) => Ok(want.to_string()),
        Some(want) => Err(anyhow!("container {} not found in pod template (have: {})", want, names.join(", "))),
        None => names.first().map(|s| s.to_string()).ok_or_else(|| anyhow!("pod template has no containers")),
    }
}

async fn owner_template(client: Client, kind: WorkloadKind, namespace: &str, name: &str) -> Result<(LabelSelector, Option<PodSpec>)> {
    let ctx = || format!("fetching {} {}/{}", kind, namespace, name);
    match kind {
        WorkloadKind::Deployment => {
            let api: Api<Deployment> = Api::namespaced(client, namespace);
            let spec = api.get(name).await.with_context(ctx)?.spec.ok_or_else(|| anyhow!("{} {}/{} has no spec", kind, namespace, name))?;
            Ok((spec.selector, spec.template.spec))
        }
        WorkloadKind::StatefulSet => {
            let api: Api<StatefulSet> = Api::namespaced(client, namespace);
            let spec = api.get(name).await.with_context(ctx)?.spec.ok_or_else(|| anyhow!("{} {}/{} has no spec", kind, namespace, name))?;
            Ok((spec.selector, spec.template.spec))
        }
        WorkloadKind::DaemonSet => {
            let api: Api<DaemonSet> = Api::namespaced(client, namespace);
            let spec = api.get(name).await.with_context(ctx)?.spec.ok_or_else(|| anyhow!("{} {}/{} has no spec", kind, namespace, name))?;
            Ok((spec.selector, spec.template.spec))
        }
        WorkloadKind::Job => {
            let api: Api<Job> = Api::namespaced(client, namespace);
            let spec = api.get(name).await.with_context(ctx)?.spec.ok_or_else(|| anyhow!("{} {}/{} has no spec", kind, namespace, name))?;
            let selector = spec.selector.unwrap_or_else(|| LabelSelector {
                match_labels: Some(BTreeMap::from([("job-name".to_string(), name.to_string())])),
                ..Default::default()
            });
            Ok((selector, spec.template.spec))
        }
    }
}

/// Resolve a controller into a WorkloadRef: its label selector is used to
/// list live pods, sorted by name so the pod matcher is stable.
pub async fn resolve_workload(
    client: Client,
    kind: WorkloadKind,
    namespace: &str,
    name: &str,
    container: Option<&str>,
    cluster: Option<ClusterLabel>,
) -> Result<WorkloadRef> {
    let (selector, template) = owner_template(client.clone(), kind, namespace, name).await?;
    let container = pick_container(template.as_ref(), container)?;
    let labels = label_selector_string(&selector)?
        .ok_or_else(|| anyhow!("{} {}/{} has an empty selector", kind, namespace, name))?;
    debug!(kind = %kind, ns = %namespace, name = %name, selector = %labels, "listing workload pods");

    let pods: Api<Pod> = Api::namespaced(client, namespace);
    let list = pods
        .list(&ListParams::default().labels(&labels))
        .await
        .with_context(|| format!("listing pods for {} {}/{}", kind, namespace, name))?;
    let mut names: Vec<String> = list.items.into_iter().filter_map(|p| p.metadata.name).collect();
    names.sort();
    if names.is_empty() {
        warn!(kind = %kind, ns = %namespace, name = %name, "workload has no live pods");
    }
    info!(kind = %kind, ns = %namespace, name = %name, container = %container, pods = names.len(), "workload resolved");

    Ok(WorkloadRef::new(namespace, names, container).with_cluster(cluster))
}

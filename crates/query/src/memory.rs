//! Memory usage expressions.
//!
//! Every usage-based query wraps the expression produced by
//! [`compose_base_usage`]. Container peak usage over-counts heap a JVM has
//! committed but not used, so committed bytes are subtracted and used bytes
//! added back. Workloads without JVM metrics get `- 0 + 0`.

#![forbid(unsafe_code)]

use krr_core::{ClusterLabel, WorkloadRef};
use tracing::warn;

use crate::expr::{AggOp, BinOp, Expr, RangeFn};
use crate::selector::{selector, MetricFamily, PodPattern};

pub const CONTAINER_MAX_USAGE: &str = "container_memory_max_usage_bytes";
pub const JVM_COMMITTED: &str = "jvm_memory_committed_bytes";
pub const JVM_USED: &str = "jvm_memory_used_bytes";

/// `max(max(container peak) - sum(jvm committed) + sum(jvm used))`
pub fn compose_base_usage(
    namespace: &str,
    pods: &PodPattern,
    container: &str,
    cluster: Option<&ClusterLabel>,
) -> Expr {
    let container_sel = selector(MetricFamily::Container, namespace, pods, container, cluster);
    let jvm_sel = selector(MetricFamily::Jvm, namespace, pods, container, cluster);

    let peak = Expr::aggregate(AggOp::Max, Expr::vector(CONTAINER_MAX_USAGE, container_sel));
    let committed = Expr::aggregate(AggOp::Sum, Expr::vector(JVM_COMMITTED, jvm_sel.clone()));
    let used = Expr::aggregate(AggOp::Sum, Expr::vector(JVM_USED, jvm_sel));

    let corrected = Expr::binary(BinOp::Add, Expr::binary(BinOp::Sub, peak, committed), used);
    Expr::aggregate(AggOp::Max, corrected)
}

/// Per-request state shared by all variants: the workload, its pod pattern
/// and the base expression, computed once.
#[derive(Debug, Clone)]
pub struct QueryPlan<'a> {
    workload: &'a WorkloadRef,
    pods: PodPattern,
    base: Expr,
}

impl<'a> QueryPlan<'a> {
    pub fn new(workload: &'a WorkloadRef) -> Self {
        if workload.pods.is_empty() {
            warn!(namespace = %workload.namespace, container = %workload.container, "building memory query for workload without pods");
        }
        let pods = PodPattern::from_names(&workload.pods);
        let base = compose_base_usage(&workload.namespace, &pods, &workload.container, workload.cluster.as_ref());
        Self { workload, pods, base }
    }

    pub fn workload(&self) -> &'a WorkloadRef { self.workload }

    pub fn pods(&self) -> &PodPattern { &self.pods }

    pub fn base(&self) -> &Expr { &self.base }
}

pub fn usage(plan: &QueryPlan<'_>) -> Expr {
    plan.base().clone()
}

pub fn max_usage(plan: &QueryPlan<'_>, duration: &str, step: &str) -> Expr {
    Expr::subquery(RangeFn::MaxOverTime, plan.base().clone(), duration, step)
}

pub fn usage_samples(plan: &QueryPlan<'_>, duration: &str, step: &str) -> Expr {
    Expr::subquery(RangeFn::CountOverTime, plan.base().clone(), duration, step)
}

//! Peak memory limit of containers whose last termination was an OOM kill.
//!
//! The termination-reason series is 1 wherever present, so multiplying the
//! limit by it keeps the limit only for OOM-killed `(pod, container, job)`
//! tuples. Both sides of the join must group on exactly [`JOIN_KEYS`] or the
//! join silently yields nothing.

#![forbid(unsafe_code)]

use krr_core::ClusterLabel;

use crate::expr::{AggOp, BinOp, Expr, Matcher, RangeFn, Selector, VectorMatching};
use crate::selector::{selector, MetricFamily, PodPattern};

pub const LIMITS: &str = "kube_pod_container_resource_limits";
pub const LAST_TERMINATED_REASON: &str = "kube_pod_container_status_last_terminated_reason";
pub const OOM_KILLED: &str = "OOMKilled";

pub const JOIN_KEYS: [&str; 3] = ["pod", "container", "job"];
const REASON: &str = "reason";
const OUTER_KEYS: [&str; 3] = ["container", "pod", "job"];

fn scoped(first: Matcher, namespace: &str, pods: &PodPattern, container: &str, cluster: Option<&ClusterLabel>) -> Selector {
    let mut sel = Selector::new().with(first);
    sel.extend(selector(MetricFamily::Container, namespace, pods, container, cluster).matchers().iter().cloned());
    sel
}

/// The join, before windowing.
pub fn oom_killed_limits(namespace: &str, pods: &PodPattern, container: &str, cluster: Option<&ClusterLabel>) -> Expr {
    let limits = Expr::aggregate_by(
        AggOp::Max,
        Expr::vector(LIMITS, scoped(Matcher::equal("resource", "memory"), namespace, pods, container, cluster)),
        &JOIN_KEYS,
    );
    let reason_keys = [JOIN_KEYS[0], JOIN_KEYS[1], JOIN_KEYS[2], REASON];
    let oom = Expr::aggregate_by(
        AggOp::Max,
        Expr::vector(
            LAST_TERMINATED_REASON,
            scoped(Matcher::equal(REASON, OOM_KILLED), namespace, pods, container, cluster),
        ),
        &reason_keys,
    );
    let join = Expr::binary_matching(
        BinOp::Mul,
        limits,
        oom,
        VectorMatching::on(&JOIN_KEYS).group_left(&[REASON]),
    );
    Expr::aggregate_by(AggOp::Max, join, &OUTER_KEYS)
}

pub fn oom_killed_max(
    namespace: &str,
    pods: &PodPattern,
    container: &str,
    cluster: Option<&ClusterLabel>,
    duration: &str,
    step: &str,
) -> Expr {
    Expr::subquery(RangeFn::MaxOverTime, oom_killed_limits(namespace, pods, container, cluster), duration, step)
}

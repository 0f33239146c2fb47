//! krr query: PromQL builders for workload memory recommendations.
//!
//! A [`QueryPlan`] derives the base usage expression once per workload; each
//! [`QueryVariant`] wraps that same value (or, for OOM kills, builds its own
//! join) and [`QueryVariant::build`] is the one place mapping variants to
//! builders.

#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use krr_core::{QueryKind, WorkloadRef};
use metrics::counter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod expr;
pub mod memory;
pub mod oom;
pub mod selector;

pub use expr::Expr;
pub use memory::{compose_base_usage, QueryPlan};
pub use selector::{selector, MetricFamily, PodPattern};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum QueryVariant {
    /// Base usage, sampled over the request range.
    Usage,
    /// `max_over_time` of base usage.
    MaxUsage,
    /// `count_over_time` of base usage; measures sample density.
    UsageSamples,
    /// Peak memory limit of OOM-killed containers.
    OomKilledMax,
}

impl QueryVariant {
    pub const ALL: [QueryVariant; 4] =
        [QueryVariant::Usage, QueryVariant::MaxUsage, QueryVariant::UsageSamples, QueryVariant::OomKilledMax];

    pub fn name(self) -> &'static str {
        match self {
            QueryVariant::Usage => "usage",
            QueryVariant::MaxUsage => "max-usage",
            QueryVariant::UsageSamples => "usage-samples",
            QueryVariant::OomKilledMax => "oom-killed-max",
        }
    }

    pub fn kind(self) -> QueryKind {
        match self {
            QueryVariant::Usage => QueryKind::range(),
            QueryVariant::MaxUsage | QueryVariant::UsageSamples => QueryKind::instant(),
            // no OOM kill in the window is the common case
            QueryVariant::OomKilledMax => QueryKind::instant().quiet(),
        }
    }

    pub fn expr(self, plan: &QueryPlan<'_>, duration: &str, step: &str) -> Expr {
        match self {
            QueryVariant::Usage => memory::usage(plan),
            QueryVariant::MaxUsage => memory::max_usage(plan, duration, step),
            QueryVariant::UsageSamples => memory::usage_samples(plan, duration, step),
            QueryVariant::OomKilledMax => {
                let w = plan.workload();
                oom::oom_killed_max(&w.namespace, plan.pods(), &w.container, w.cluster.as_ref(), duration, step)
            }
        }
    }

    pub fn build(self, plan: &QueryPlan<'_>, duration: &str, step: &str) -> BuiltQuery {
        let query = self.expr(plan, duration, step).to_string();
        let w = plan.workload();
        debug!(variant = self.name(), namespace = %w.namespace, container = %w.container, pods = w.pods.len(), "built memory query");
        counter!("krr_queries_built_total", "variant" => self.name()).increment(1);
        BuiltQuery { variant: self, query, kind: self.kind() }
    }
}

impl fmt::Display for QueryVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VariantError {
    #[error("unknown query variant: {0} (expect usage, max-usage, usage-samples or oom-killed-max)")]
    Unknown(String),
}

impl FromStr for QueryVariant {
    type Err = VariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "usage" | "memory" => Ok(QueryVariant::Usage),
            "max-usage" | "max" | "max-memory" => Ok(QueryVariant::MaxUsage),
            "usage-samples" | "count" | "memory-amount" => Ok(QueryVariant::UsageSamples),
            "oom-killed-max" | "oom" | "max-oom-killed-memory" => Ok(QueryVariant::OomKilledMax),
            _ => Err(VariantError::Unknown(s.to_string())),
        }
    }
}

/// A rendered query plus how to run it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuiltQuery {
    pub variant: QueryVariant,
    pub query: String,
    pub kind: QueryKind,
}

/// Build one variant for a workload.
pub fn build_query(variant: QueryVariant, workload: &WorkloadRef, duration: &str, step: &str) -> BuiltQuery {
    variant.build(&QueryPlan::new(workload), duration, step)
}

/// Build every variant from a single plan.
pub fn build_all(workload: &WorkloadRef, duration: &str, step: &str) -> Vec<BuiltQuery> {
    let plan = QueryPlan::new(workload);
    QueryVariant::ALL.iter().map(|v| v.build(&plan, duration, step)).collect()
}

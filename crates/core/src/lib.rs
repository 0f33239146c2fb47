//! krr core types: workload references and the query descriptors handed to
//! whatever executes a query against Prometheus.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

pub mod workload;

pub use workload::{ClusterLabel, WorkloadError, WorkloadRef, DEFAULT_CLUSTER_LABEL};

pub mod prelude {
    pub use super::{ClusterLabel, ExecutionMode, QueryKind, WorkloadError, WorkloadRef};
}

/// How the backend should evaluate a query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Single evaluation at the end of the window.
    Instant,
    /// Repeated evaluation across the window at the request step.
    Range,
}

impl ExecutionMode {
    /// Prometheus HTTP API path serving this mode.
    pub fn api_path(self) -> &'static str {
        match self {
            ExecutionMode::Instant => "/api/v1/query",
            ExecutionMode::Range => "/api/v1/query_range",
        }
    }
}

/// Descriptor attached to every built query. Produced here, interpreted by
/// the executor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct QueryKind {
    pub mode: ExecutionMode,
    /// Whether an empty result should be logged as a warning.
    pub warn_on_no_data: bool,
}

impl QueryKind {
    pub const fn instant() -> Self {
        Self { mode: ExecutionMode::Instant, warn_on_no_data: true }
    }

    pub const fn range() -> Self {
        Self { mode: ExecutionMode::Range, warn_on_no_data: true }
    }

    pub const fn quiet(self) -> Self {
        Self { mode: self.mode, warn_on_no_data: false }
    }
}

impl Default for QueryKind {
    fn default() -> Self { Self::instant() }
}

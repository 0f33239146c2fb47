//! Label selectors for the two metric families the memory queries read.

#![forbid(unsafe_code)]

use std::fmt;

use krr_core::ClusterLabel;

use crate::expr::{Matcher, Selector};

pub const NAMESPACE_LABEL: &str = "namespace";

/// Label schema a metric is exported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricFamily {
    /// cAdvisor / kube-state-metrics series: `pod`, `container`.
    Container,
    /// In-process JVM series scraped from the pod: `kubernetes_pod_name`, `component`.
    Jvm,
}

impl MetricFamily {
    pub const fn pod_label(self) -> &'static str {
        match self {
            MetricFamily::Container => "pod",
            MetricFamily::Jvm => "kubernetes_pod_name",
        }
    }

    pub const fn container_label(self) -> &'static str {
        match self {
            MetricFamily::Container => "container",
            MetricFamily::Jvm => "component",
        }
    }
}

/// Regex alternation over a workload's pod names, for `=~` matching.
///
/// Names are kept in input order, duplicates dropped, and RE2
/// metacharacters escaped so a `.` in a pod name matches only itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PodPattern(String);

impl PodPattern {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen: Vec<String> = Vec::new();
        for name in names {
            let escaped = escape_regex(name.as_ref());
            if !seen.contains(&escaped) { seen.push(escaped); }
        }
        Self(seen.join("|"))
    }

    pub fn as_str(&self) -> &str { &self.0 }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl fmt::Display for PodPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Escape RE2 metacharacters. Narrower than `regex::escape`, which also
/// escapes `-` and would mangle every generated pod name.
pub fn escape_regex(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// The cluster matcher, or nothing at all.
pub fn cluster_matcher(cluster: Option<&ClusterLabel>) -> Option<Matcher> {
    cluster.map(|c| Matcher::equal(c.label.as_str(), c.value.as_str()))
}

/// Selector for one metric family: pod regex, container, namespace, then the
/// optional cluster matcher.
pub fn selector(
    family: MetricFamily,
    namespace: &str,
    pods: &PodPattern,
    container: &str,
    cluster: Option<&ClusterLabel>,
) -> Selector {
    let mut sel = Selector::new()
        .with(Matcher::regex(family.pod_label(), pods.as_str()))
        .with(Matcher::equal(family.container_label(), container))
        .with(Matcher::equal(NAMESPACE_LABEL, namespace));
    sel.extend(cluster_matcher(cluster));
    sel
}

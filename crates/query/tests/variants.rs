#![forbid(unsafe_code)]

use krr_core::{ClusterLabel, ExecutionMode, WorkloadRef};
use krr_query::{build_all, build_query, QueryPlan, QueryVariant};
use regex::Regex;

fn prod() -> WorkloadRef {
    WorkloadRef::new("prod", ["app-1", "app-2"], "web")
}

fn strip_window(q: &str) -> (String, String, String) {
    let re = Regex::new(r"(?s)^(?:max|count)_over_time\((.*)\[([^\[\]]*):([^\[\]]*)\]\)$").expect("regex");
    let caps = re.captures(q).unwrap_or_else(|| panic!("not a windowed query: {q}"));
    (caps[1].to_string(), caps[2].to_string(), caps[3].to_string())
}

#[test]
fn usage_variants_embed_identical_base() {
    let w = prod().with_cluster(ClusterLabel::from_settings(None, Some("eu-west")));
    let usage = build_query(QueryVariant::Usage, &w, "1h", "5m").query;
    let (max_base, _, _) = strip_window(&build_query(QueryVariant::MaxUsage, &w, "1h", "5m").query);
    let (count_base, _, _) = strip_window(&build_query(QueryVariant::UsageSamples, &w, "1h", "5m").query);
    assert_eq!(usage, max_base);
    assert_eq!(usage, count_base);
    assert_eq!(usage, QueryPlan::new(&w).base().to_string());
}

#[test]
fn windowed_max_scenario_without_cluster() {
    let q = build_query(QueryVariant::MaxUsage, &prod(), "1h", "5m").query;
    assert!(q.contains("pod=~\"app-1|app-2\""), "{q}");
    assert!(q.contains("container=\"web\""), "{q}");
    assert!(q.contains("namespace=\"prod\""), "{q}");
    assert!(q.ends_with("[1h:5m])"), "{q}");
    for oom in ["OOMKilled", "kube_pod_container", "group_left", "reason"] {
        assert!(!q.contains(oom), "unexpected {oom} in {q}");
    }
    // no trailing separator where the cluster matcher would go
    assert!(!q.contains(", }"), "{q}");
    assert!(!q.contains("cluster"), "{q}");
}

#[test]
fn cluster_matcher_reaches_both_families() {
    let w = prod().with_cluster(Some(ClusterLabel::new("cluster", "eu-west")));
    let q = build_query(QueryVariant::MaxUsage, &w, "1h", "5m").query;
    assert!(q.contains("{pod=~\"app-1|app-2\", container=\"web\", namespace=\"prod\", cluster=\"eu-west\"}"), "{q}");
    assert!(
        q.contains("{kubernetes_pod_name=~\"app-1|app-2\", component=\"web\", namespace=\"prod\", cluster=\"eu-west\"}"),
        "{q}"
    );
    assert_eq!(q.matches("cluster=\"eu-west\"").count(), 3);
}

#[test]
fn custom_cluster_label_name() {
    let w = prod().with_cluster(ClusterLabel::from_settings(Some("k8s_cluster"), Some("eu-west")));
    let q = build_query(QueryVariant::OomKilledMax, &w, "1h", "5m").query;
    assert_eq!(q.matches("k8s_cluster=\"eu-west\"").count(), 2);
}

#[test]
fn window_is_embedded_verbatim() {
    let w = prod();
    for (d, s) in [("1h", "5m"), ("336h", "1m30s"), ("bogus", "")] {
        for v in [QueryVariant::MaxUsage, QueryVariant::UsageSamples] {
            let (_, got_d, got_s) = strip_window(&build_query(v, &w, d, s).query);
            assert_eq!((got_d.as_str(), got_s.as_str()), (d, s));
        }
    }
}

#[test]
fn pod_disjunction_preserves_order_and_count() {
    let pods = ["web-7c9-x2", "web-7c9-a1", "web-7c9-m5"];
    let w = WorkloadRef::new("prod", pods, "web");
    let q = build_query(QueryVariant::Usage, &w, "1h", "5m").query;
    let re = Regex::new(r#"(?:pod|kubernetes_pod_name)=~"([^"]*)""#).expect("regex");
    let mut n = 0;
    for caps in re.captures_iter(&q) {
        let names: Vec<&str> = caps[1].split('|').collect();
        assert_eq!(names, pods);
        n += 1;
    }
    assert_eq!(n, 3);
}

#[test]
fn oom_scenario() {
    let built = build_query(QueryVariant::OomKilledMax, &prod(), "1h", "5m");
    let q = &built.query;
    assert!(q.contains("reason=\"OOMKilled\""), "{q}");
    assert!(q.contains("group_left(reason)"), "{q}");
    assert!(q.contains("resource=\"memory\""), "{q}");
    assert!(q.contains("pod=~\"app-1|app-2\""), "{q}");
    assert!(!q.contains("kubernetes_pod_name"), "{q}");
    assert!(!q.contains("component"), "{q}");
    assert!(!q.contains("jvm_"), "{q}");
    assert!(q.starts_with("max_over_time(") && q.ends_with("[1h:5m])"), "{q}");
    assert!(!built.kind.warn_on_no_data);
    assert_eq!(built.kind.mode, ExecutionMode::Instant);
}

#[test]
fn oom_join_groups_match() {
    let q = build_query(QueryVariant::OomKilledMax, &prod(), "1h", "5m").query;
    assert!(q.contains(") by (pod, container, job) * on(pod, container, job) group_left(reason) max("), "{q}");
    assert!(q.contains("by (pod, container, job, reason)"), "{q}");
}

#[test]
fn usage_runs_as_range_query() {
    let built = build_query(QueryVariant::Usage, &prod(), "1h", "5m");
    assert_eq!(built.kind.mode, ExecutionMode::Range);
    assert!(built.kind.warn_on_no_data);
    assert!(!built.query.contains("[1h:5m]"));
}

#[test]
fn empty_pod_list_still_renders() {
    let w = WorkloadRef::new("prod", Vec::<String>::new(), "web");
    assert!(w.validate().is_err());
    let q = build_query(QueryVariant::MaxUsage, &w, "1h", "5m").query;
    assert!(q.contains("pod=~\"\""), "{q}");
}

#[test]
fn concurrent_builds_agree() {
    let w = prod().with_cluster(Some(ClusterLabel::new("cluster", "eu-west")));
    let expected = build_all(&w, "1h", "5m");
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..8).map(|_| s.spawn(|| build_all(&w, "1h", "5m"))).collect();
        for h in handles {
            assert_eq!(h.join().expect("thread"), expected);
        }
    });
}

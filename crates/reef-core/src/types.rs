//! Core data model for the reef scheduling core.
//!
//! This module provides the fundamental types shared by the preemption,
//! retrieval, and queue-ordering crates:
//! - [`Workload`]: a scheduled or pending unit of work (a pod)
//! - [`NodeInfo`]: a snapshot of a node and the workloads bound to it
//! - [`Victims`] / [`Candidate`]: the output of a preemption dry-run
//! - [`DisruptionBudget`]: a policy limiting concurrent voluntary evictions
//! - [`CycleState`]: opaque per-cycle plugin state, cloned per parallel task

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Annotation keys carried on workloads and elastic-job records.
pub mod annotations {
    /// RFC3339 timestamp written when a workload is retracted; reused as its
    /// effective queue timestamp.
    pub const RETRACT_CHECK_VAR: &str = "retract-check-var";
    /// Scheduling-state marker; [`BACKFILLED`] enables retraction.
    pub const SCHEDULING_STATE: &str = "scheduling-state";
    /// Value of [`SCHEDULING_STATE`] marking a retraction candidate.
    pub const BACKFILLED: &str = "backfilled";
    /// Key into the throughput table (elastic jobs and backfilled workloads).
    pub const MODEL_NAME: &str = "model-name";
    /// Number of workers added to an elastic job relative to its baseline.
    pub const SCALE_OUT: &str = "scale-out";
}

/// Reference to a workload by `(namespace, name, uid)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadRef {
    /// Namespace of the workload.
    pub namespace: String,
    /// Name of the workload.
    pub name: String,
    /// Unique identifier of the workload.
    pub uid: String,
}

impl std::fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Policy controlling whether a workload may preempt others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PreemptionPolicy {
    /// The workload never displaces other workloads.
    Never,
    /// The workload may displace strictly lower-priority workloads.
    #[default]
    PreemptLowerPriority,
}

/// Resource request of a workload. Only the GPU count participates in the
/// core's fit and accounting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResourceRequest {
    /// Number of GPUs requested.
    pub gpus: u32,
    /// CPU request in millicores (1000 = 1 core).
    pub cpu_millicores: u32,
    /// Memory request in bytes.
    pub memory_bytes: u64,
}

impl ResourceRequest {
    /// Creates an empty resource request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the GPU count.
    #[must_use]
    pub const fn with_gpus(mut self, count: u32) -> Self {
        self.gpus = count;
        self
    }

    /// Sets the CPU request in millicores.
    #[must_use]
    pub const fn with_cpu(mut self, millicores: u32) -> Self {
        self.cpu_millicores = millicores;
        self
    }

    /// Sets the memory request in bytes.
    #[must_use]
    pub const fn with_memory(mut self, bytes: u64) -> Self {
        self.memory_bytes = bytes;
        self
    }
}

/// A scheduled or pending unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    /// Namespace of the workload.
    pub namespace: String,
    /// Name of the workload.
    pub name: String,
    /// Unique identifier.
    pub uid: String,
    /// Signed scheduling priority; higher runs first.
    pub priority: i32,
    /// Immutable creation timestamp.
    pub creation_timestamp: DateTime<Utc>,
    /// When the workload started running, if it has.
    pub start_time: Option<DateTime<Utc>>,
    /// Node the workload is currently nominated to run on.
    pub nominated_node: Option<String>,
    /// Name of the scheduler responsible for this workload.
    pub scheduler_name: String,
    /// Free-form annotations.
    pub annotations: BTreeMap<String, String>,
    /// Labels used by selectors.
    pub labels: BTreeMap<String, String>,
    /// Resource request.
    pub resources: ResourceRequest,
    /// Whether the workload may preempt others.
    pub preemption_policy: PreemptionPolicy,
    /// Whether a deletion is already in progress.
    pub terminating: bool,
}

impl Workload {
    /// Creates a new workload with a generated uid and the current time as
    /// its creation timestamp.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            uid: Uuid::new_v4().to_string(),
            priority: 0,
            creation_timestamp: Utc::now(),
            start_time: None,
            nominated_node: None,
            scheduler_name: "reef-scheduler".into(),
            annotations: BTreeMap::new(),
            labels: BTreeMap::new(),
            resources: ResourceRequest::new(),
            preemption_policy: PreemptionPolicy::default(),
            terminating: false,
        }
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the GPU request.
    #[must_use]
    pub const fn with_gpus(mut self, gpus: u32) -> Self {
        self.resources.gpus = gpus;
        self
    }

    /// Sets the full resource request.
    #[must_use]
    pub const fn with_resources(mut self, resources: ResourceRequest) -> Self {
        self.resources = resources;
        self
    }

    /// Sets the creation timestamp.
    #[must_use]
    pub const fn with_creation_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.creation_timestamp = at;
        self
    }

    /// Sets the start time.
    #[must_use]
    pub const fn with_start_time(mut self, at: DateTime<Utc>) -> Self {
        self.start_time = Some(at);
        self
    }

    /// Sets the nominated node.
    #[must_use]
    pub fn with_nominated_node(mut self, node: impl Into<String>) -> Self {
        self.nominated_node = Some(node.into());
        self
    }

    /// Adds an annotation.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Sets the preemption policy.
    #[must_use]
    pub const fn with_preemption_policy(mut self, policy: PreemptionPolicy) -> Self {
        self.preemption_policy = policy;
        self
    }

    /// Marks the workload as terminating.
    #[must_use]
    pub const fn terminating(mut self) -> Self {
        self.terminating = true;
        self
    }

    /// Returns a reference to this workload.
    #[must_use]
    pub fn reference(&self) -> WorkloadRef {
        WorkloadRef {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            uid: self.uid.clone(),
        }
    }

    /// The workload's effective timestamp: the parsed `retract-check-var`
    /// annotation when present and valid, else the creation timestamp.
    #[must_use]
    pub fn effective_timestamp(&self) -> DateTime<Utc> {
        self.annotations
            .get(annotations::RETRACT_CHECK_VAR)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map_or(self.creation_timestamp, |t| t.with_timezone(&Utc))
    }

    /// Whether the workload was admitted opportunistically and may be
    /// retracted.
    #[must_use]
    pub fn is_backfilled(&self) -> bool {
        self.annotations
            .get(annotations::SCHEDULING_STATE)
            .is_some_and(|state| state == annotations::BACKFILLED)
    }

    /// The workload's throughput-table key, if annotated.
    #[must_use]
    pub fn model_name(&self) -> Option<&str> {
        self.annotations.get(annotations::MODEL_NAME).map(String::as_str)
    }
}

impl std::fmt::Display for Workload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Snapshot of a node and the workloads bound to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Node name.
    pub name: String,
    /// GPU capacity of the node.
    pub gpu_capacity: u32,
    /// Workloads currently bound to the node.
    pub pods: Vec<Workload>,
}

impl NodeInfo {
    /// Creates a node snapshot with no bound workloads.
    #[must_use]
    pub fn new(name: impl Into<String>, gpu_capacity: u32) -> Self {
        Self {
            name: name.into(),
            gpu_capacity,
            pods: Vec::new(),
        }
    }

    /// Binds a workload to the node.
    #[must_use]
    pub fn with_pod(mut self, pod: Workload) -> Self {
        self.pods.push(pod);
        self
    }

    /// Deep copy for use by a parallel task. Tasks own their copy and must
    /// not alias shared snapshots.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Sum of GPU requests across bound workloads.
    #[must_use]
    pub fn allocated_gpus(&self) -> u32 {
        self.pods.iter().map(|p| p.resources.gpus).sum()
    }

    /// Capacity minus allocation; negative when the node is overcommitted.
    #[must_use]
    pub fn idle_gpus(&self) -> i64 {
        i64::from(self.gpu_capacity) - i64::from(self.allocated_gpus())
    }
}

/// Victims of a preemption candidate: the workloads to evict and the number
/// of disruption-budget violations their eviction would incur.
///
/// The pods are ordered by decreasing priority; the first element is the
/// highest-priority victim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Victims {
    /// Workloads to evict, highest priority first.
    pub pods: Vec<Workload>,
    /// Number of disruption-budget violations.
    pub num_pdb_violations: u64,
}

/// A nominated node paired with the victims whose eviction makes the
/// preemptor fit there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Target node name.
    pub name: String,
    /// Victims to evict on that node.
    pub victims: Victims,
}

impl Candidate {
    /// Creates a candidate.
    #[must_use]
    pub fn new(name: impl Into<String>, victims: Victims) -> Self {
        Self {
            name: name.into(),
            victims,
        }
    }
}

/// Policy limiting concurrent voluntary evictions for a set of workloads.
///
/// A workload matches the budget when every selector label is present on the
/// workload with the same value. Evicting more matching workloads than
/// `disruptions_allowed` counts one violation per excess eviction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisruptionBudget {
    /// Budget name.
    pub name: String,
    /// Label selector.
    pub selector: BTreeMap<String, String>,
    /// Number of voluntary evictions currently allowed.
    pub disruptions_allowed: u32,
}

impl DisruptionBudget {
    /// Creates a budget.
    #[must_use]
    pub fn new(name: impl Into<String>, disruptions_allowed: u32) -> Self {
        Self {
            name: name.into(),
            selector: BTreeMap::new(),
            disruptions_allowed,
        }
    }

    /// Adds a selector label.
    #[must_use]
    pub fn with_selector(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.selector.insert(key.into(), value.into());
        self
    }

    /// Whether the workload is covered by this budget.
    #[must_use]
    pub fn matches(&self, workload: &Workload) -> bool {
        !self.selector.is_empty()
            && self
                .selector
                .iter()
                .all(|(k, v)| workload.labels.get(k) == Some(v))
    }
}

/// Opaque per-cycle plugin state. Cloned per parallel dry-run task; tasks
/// own their copy.
#[derive(Debug, Clone, Default)]
pub struct CycleState {
    entries: BTreeMap<String, String>,
}

impl CycleState {
    /// Creates an empty cycle state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads an entry.
    #[must_use]
    pub fn read(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Writes an entry.
    pub fn write(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod workload_tests {
        use super::*;

        #[test]
        fn workload_builder() {
            let w = Workload::new("training", "job-1")
                .with_priority(50)
                .with_gpus(2)
                .with_label("team", "ml")
                .with_annotation("model-name", "resnet50");

            assert_eq!(w.namespace, "training");
            assert_eq!(w.name, "job-1");
            assert_eq!(w.priority, 50);
            assert_eq!(w.resources.gpus, 2);
            assert_eq!(w.labels.get("team"), Some(&"ml".to_string()));
            assert_eq!(w.model_name(), Some("resnet50"));
            assert!(!w.uid.is_empty());
        }

        #[test]
        fn workload_display() {
            let w = Workload::new("training", "job-1");
            assert_eq!(format!("{w}"), "training/job-1");
            assert_eq!(format!("{}", w.reference()), "training/job-1");
        }

        #[test]
        fn effective_timestamp_prefers_retraction_annotation() {
            let created = Utc::now();
            let retracted = "2024-01-01T09:58:00Z";
            let w = Workload::new("training", "job-1")
                .with_creation_timestamp(created)
                .with_annotation(annotations::RETRACT_CHECK_VAR, retracted);

            let expected = DateTime::parse_from_rfc3339(retracted)
                .map(|t| t.with_timezone(&Utc))
                .ok();
            assert_eq!(Some(w.effective_timestamp()), expected);
        }

        #[test]
        fn effective_timestamp_falls_back_on_invalid_annotation() {
            let created = Utc::now();
            let w = Workload::new("training", "job-1")
                .with_creation_timestamp(created)
                .with_annotation(annotations::RETRACT_CHECK_VAR, "not-a-timestamp");

            assert_eq!(w.effective_timestamp(), created);
        }

        #[test]
        fn backfilled_marker() {
            let plain = Workload::new("training", "job-1");
            assert!(!plain.is_backfilled());

            let backfilled = Workload::new("training", "job-2")
                .with_annotation(annotations::SCHEDULING_STATE, annotations::BACKFILLED);
            assert!(backfilled.is_backfilled());

            let other = Workload::new("training", "job-3")
                .with_annotation(annotations::SCHEDULING_STATE, "scheduled");
            assert!(!other.is_backfilled());
        }

        #[test]
        fn workload_serialization_round_trip() {
            let w = Workload::new("training", "job-1").with_priority(7);
            let json = serde_json::to_string(&w);
            assert!(json.is_ok());
            let parsed: serde_json::Result<Workload> =
                serde_json::from_str(&json.unwrap_or_default());
            assert_eq!(parsed.ok(), Some(w));
        }
    }

    mod node_info_tests {
        use super::*;

        #[test]
        fn node_gpu_accounting() {
            let node = NodeInfo::new("gpu-node-1", 8)
                .with_pod(Workload::new("training", "a").with_gpus(2))
                .with_pod(Workload::new("training", "b").with_gpus(3));

            assert_eq!(node.allocated_gpus(), 5);
            assert_eq!(node.idle_gpus(), 3);
        }

        #[test]
        fn node_overcommit_goes_negative() {
            let node =
                NodeInfo::new("gpu-node-1", 2).with_pod(Workload::new("training", "a").with_gpus(4));
            assert_eq!(node.idle_gpus(), -2);
        }

        #[test]
        fn snapshot_is_a_deep_copy() {
            let node =
                NodeInfo::new("gpu-node-1", 2).with_pod(Workload::new("training", "a").with_gpus(1));
            let mut copy = node.snapshot();
            copy.pods.clear();
            assert_eq!(node.pods.len(), 1);
        }
    }

    mod disruption_budget_tests {
        use super::*;

        #[test]
        fn budget_matches_on_all_selector_labels() {
            let budget = DisruptionBudget::new("web-pdb", 1)
                .with_selector("app", "web")
                .with_selector("tier", "frontend");

            let matching = Workload::new("default", "w-1")
                .with_label("app", "web")
                .with_label("tier", "frontend")
                .with_label("extra", "ignored");
            let partial = Workload::new("default", "w-2").with_label("app", "web");

            assert!(budget.matches(&matching));
            assert!(!budget.matches(&partial));
        }

        #[test]
        fn empty_selector_matches_nothing() {
            let budget = DisruptionBudget::new("empty", 0);
            let w = Workload::new("default", "w-1").with_label("app", "web");
            assert!(!budget.matches(&w));
        }
    }

    mod cycle_state_tests {
        use super::*;

        #[test]
        fn cycle_state_read_write_and_clone() {
            let mut state = CycleState::new();
            state.write("phase", "dry-run");

            let mut copy = state.clone();
            copy.write("phase", "prepare");

            assert_eq!(state.read("phase"), Some("dry-run"));
            assert_eq!(copy.read("phase"), Some("prepare"));
        }
    }
}

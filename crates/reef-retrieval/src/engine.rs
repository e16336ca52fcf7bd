//! The elastic-retrieval post-filter.
//!
//! Before classical preemption runs, the engine tries a cheaper way to free
//! GPUs: retract workloads that were backfilled after the preemptor arrived,
//! and revert earlier elastic scale-outs whose marginal throughput
//! contributed least. When nothing can be reclaimed but idle GPUs exist
//! elsewhere, it instead grows the elastic job that would gain the most and
//! lets the preemptor retry next cycle.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use reef_core::{
    elastic_job_name, ClusterClient, PostFilterResult, Status, Workload,
};

use crate::accountant::GpuAccountant;
use crate::elastic::{ElasticJobClient, ScaleOutAnnotationMode};
use crate::error::Result;
use crate::throughput::{ThroughputTable, MAX_WORKER_REPLICAS};

/// Configuration for the retrieval engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Namespace elastic jobs live in.
    pub namespace: String,
    /// How repeated scale-outs combine in the `scale-out` annotation.
    pub annotation_mode: ScaleOutAnnotationMode,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            namespace: "training".into(),
            annotation_mode: ScaleOutAnnotationMode::default(),
        }
    }
}

impl RetrievalConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the elastic-job namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the scale-out annotation mode.
    #[must_use]
    pub const fn with_annotation_mode(mut self, mode: ScaleOutAnnotationMode) -> Self {
        self.annotation_mode = mode;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReclaimKind {
    Retract,
    ScaleDown,
}

#[derive(Debug, Clone)]
struct ReclaimCandidate {
    kind: ReclaimKind,
    index: usize,
    gpus: i64,
    cost: f64,
}

/// GPU reclamation engine.
pub struct RetrievalEngine {
    client: Arc<dyn ClusterClient>,
    jobs: ElasticJobClient,
    accountant: GpuAccountant,
    table: ThroughputTable,
}

impl RetrievalEngine {
    /// Creates an engine over the given client.
    #[must_use]
    pub fn new(client: Arc<dyn ClusterClient>, config: RetrievalConfig) -> Self {
        let jobs = ElasticJobClient::new(Arc::clone(&client), config.namespace.clone())
            .with_annotation_mode(config.annotation_mode);
        let accountant = GpuAccountant::new(Arc::clone(&client));
        Self {
            client,
            jobs,
            accountant,
            table: ThroughputTable::builtin(),
        }
    }

    /// Replaces the throughput table.
    #[must_use]
    pub fn with_table(mut self, table: ThroughputTable) -> Self {
        self.table = table;
        self
    }

    /// The retrieval post-filter entry point.
    ///
    /// Returns `(Some(""), Success)` when reclamation freed enough GPUs
    /// (the framework reinserts the preemptor), and `Unschedulable` with
    /// reason `"Scale-Out MPIJob"` or `"Nothing can do"` otherwise.
    pub fn dynamic(&self, pod: &Workload) -> (Option<PostFilterResult>, Status) {
        let request_gpus = i64::from(pod.resources.gpus);
        let idle_gpus = match self.accountant.idle_gpus() {
            Ok(idle) => idle.max(0),
            Err(e) => {
                warn!(error = %e, "gpu accounting failed");
                return (None, Status::error(e.to_string()));
            }
        };
        let running_jobs = match self.running_elastic_jobs() {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "elastic job discovery failed");
                return (None, Status::error(e.to_string()));
            }
        };

        match self.retrieve(pod, idle_gpus, request_gpus, &running_jobs) {
            Ok(true) => {
                // Reclaimed enough; the framework requeues the preemptor
                // and the positive path places it next cycle.
                return (
                    Some(PostFilterResult::with_nominated_node("")),
                    Status::success(),
                );
            }
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "retrieval failed");
                return (None, Status::error(e.to_string()));
            }
        }

        if idle_gpus == 0 {
            return (
                Some(PostFilterResult::clearing_nomination()),
                Status::unschedulable("Nothing can do"),
            );
        }

        if self.scale_out_fallback(&running_jobs).is_some() {
            (
                Some(PostFilterResult::clearing_nomination()),
                Status::unschedulable("Scale-Out MPIJob"),
            )
        } else {
            (
                Some(PostFilterResult::clearing_nomination()),
                Status::unschedulable("Nothing can do"),
            )
        }
    }

    /// Names of elastic jobs with at least one pod on some node, in
    /// first-seen order.
    ///
    /// # Errors
    ///
    /// Returns a transient error when the node listing fails; per-node pod
    /// listing failures are logged and skipped.
    pub fn running_elastic_jobs(&self) -> Result<Vec<String>> {
        let mut jobs: Vec<String> = Vec::new();
        for node in self.client.list_nodes()? {
            let pods = match self.client.pods_on_node(&node.name) {
                Ok(pods) => pods,
                Err(e) => {
                    warn!(node = %node.name, error = %e, "pod listing failed");
                    continue;
                }
            };
            for pod in pods {
                if let Some(job) = elastic_job_name(&pod.name) {
                    if !jobs.contains(&job) {
                        jobs.push(job);
                    }
                }
            }
        }
        Ok(jobs)
    }

    /// Phases A and B: gather reclaim candidates and greedily satisfy the
    /// GPU deficit. Returns whether the deficit was covered.
    fn retrieve(
        &self,
        pod: &Workload,
        idle_gpus: i64,
        request_gpus: i64,
        running_jobs: &[String],
    ) -> Result<bool> {
        // Phase A: backfilled workloads admitted after the preemptor.
        let preemptor_timestamp = pod.effective_timestamp();
        let mut backfilled: Vec<Workload> = Vec::new();
        for node in self.client.list_nodes()? {
            let pods = match self.client.pods_on_node(&node.name) {
                Ok(pods) => pods,
                Err(e) => {
                    warn!(node = %node.name, error = %e, "pod listing failed");
                    continue;
                }
            };
            for candidate in pods {
                if candidate.is_backfilled()
                    && preemptor_timestamp < candidate.effective_timestamp()
                {
                    backfilled.push(candidate);
                }
            }
        }

        // Phase A: elastic jobs that were scaled out earlier.
        let mut scaled_out: Vec<(String, i64, i64, String)> = Vec::new();
        for name in running_jobs {
            let job = match self.jobs.get(name) {
                Ok(job) => job,
                Err(e) => {
                    warn!(job = name, error = %e, "elastic job lookup failed");
                    continue;
                }
            };
            let Some(scale_out) = job.scale_out().filter(|s| *s > 0) else {
                continue;
            };
            let replicas = match job.worker_replicas() {
                Ok(replicas) => replicas,
                Err(e) => {
                    warn!(job = name, error = %e, "replica lookup failed");
                    continue;
                }
            };
            let Some(model) = job.model_name() else {
                warn!(job = name, "elastic job carries no model name");
                continue;
            };
            scaled_out.push((name.clone(), replicas, scale_out, model));
        }

        let mut candidates: Vec<ReclaimCandidate> = Vec::new();
        for (index, workload) in backfilled.iter().enumerate() {
            let gpus = i64::from(workload.resources.gpus);
            let Some(model) = workload.model_name() else {
                warn!(pod = %workload, "backfilled workload carries no model name");
                continue;
            };
            let cost = match self.table.throughput(model, gpus) {
                Ok(cost) => cost,
                Err(e) => {
                    warn!(pod = %workload, error = %e, "throughput lookup failed");
                    continue;
                }
            };
            candidates.push(ReclaimCandidate {
                kind: ReclaimKind::Retract,
                index,
                gpus,
                cost,
            });
        }
        for (index, (name, replicas, scale_out, model)) in scaled_out.iter().enumerate() {
            let cost = match (
                self.table.throughput(model, *replicas),
                self.table.throughput(model, replicas - scale_out),
            ) {
                (Ok(with), Ok(without)) => with - without,
                (Err(e), _) | (_, Err(e)) => {
                    warn!(job = name, error = %e, "throughput lookup failed");
                    continue;
                }
            };
            candidates.push(ReclaimCandidate {
                kind: ReclaimKind::ScaleDown,
                index,
                gpus: *scale_out,
                cost,
            });
        }

        if candidates.is_empty() {
            return Ok(false);
        }

        let deficit = (request_gpus - idle_gpus).max(0);
        // Stable two-pass sort: cost ascending first, then GPUs ascending,
        // so the final order is primarily smallest GPUs with cost breaking
        // ties.
        candidates.sort_by(|a, b| a.cost.total_cmp(&b.cost));
        candidates.sort_by_key(|c| c.gpus);

        let mut supplied = 0i64;
        let mut selected: Vec<&ReclaimCandidate> = Vec::new();
        for candidate in &candidates {
            if supplied >= deficit {
                break;
            }
            supplied += candidate.gpus;
            selected.push(candidate);
        }
        if supplied < deficit {
            debug!(deficit, supplied, "reclaim candidates cannot cover the deficit");
            return Ok(false);
        }

        for candidate in selected {
            match candidate.kind {
                ReclaimKind::Retract => {
                    let Some(workload) = backfilled.get(candidate.index) else {
                        continue;
                    };
                    // Retraction is best-effort; the controller makes it
                    // idempotent.
                    if let Err(e) = self.client.retract_pod(&workload.reference(), Utc::now()) {
                        warn!(pod = %workload, error = %e, "retraction failed");
                    } else {
                        info!(pod = %workload, gpus = candidate.gpus, "retracted backfilled workload");
                    }
                }
                ReclaimKind::ScaleDown => {
                    let Some((name, ..)) = scaled_out.get(candidate.index) else {
                        continue;
                    };
                    if let Err(e) = self.jobs.scale_by(name, -candidate.gpus) {
                        warn!(job = name, error = %e, "scale-down failed");
                    } else {
                        info!(job = name, gpus = candidate.gpus, "reverted elastic scale-out");
                    }
                }
            }
        }
        Ok(true)
    }

    /// Phase C: grow the elastic job with the highest positive marginal
    /// gain by one worker. Returns the scaled job's name.
    fn scale_out_fallback(&self, running_jobs: &[String]) -> Option<String> {
        let mut best: Option<(String, f64)> = None;
        for name in running_jobs {
            let job = match self.jobs.get(name) {
                Ok(job) => job,
                Err(e) => {
                    warn!(job = name, error = %e, "elastic job lookup failed");
                    continue;
                }
            };
            // A job that was already scaled out is not grown further until
            // the scale-out is reclaimed.
            if job.annotation(reef_core::annotations::SCALE_OUT).is_some() {
                continue;
            }
            let replicas = match job.worker_replicas() {
                Ok(replicas) => replicas,
                Err(e) => {
                    warn!(job = name, error = %e, "replica lookup failed");
                    continue;
                }
            };
            if replicas + 1 > MAX_WORKER_REPLICAS {
                continue;
            }
            let Some(model) = job.model_name() else {
                continue;
            };
            let gain = match self.table.marginal(&model, replicas) {
                Ok(gain) => gain,
                Err(e) => {
                    warn!(job = name, error = %e, "marginal throughput lookup failed");
                    continue;
                }
            };
            if gain > 0.0 && best.as_ref().is_none_or(|(_, b)| gain > *b) {
                best = Some((name.clone(), gain));
            }
        }

        let (name, gain) = best?;
        info!(job = %name, gain, "scaling out elastic job");
        if let Err(e) = self.jobs.scale_by(&name, 1) {
            warn!(job = %name, error = %e, "scale-out failed");
        }
        Some(name)
    }
}

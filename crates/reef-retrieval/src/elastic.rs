//! Elastic-job records and the controller adapter.
//!
//! The elastic-job custom resource is handled as an untyped document with
//! typed accessors at the two paths the core reads and writes:
//! `spec.mpiReplicaSpecs.Worker.replicas` and `metadata.annotations`. The
//! paths live here and nowhere else.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use reef_core::{annotations, ClusterClient, CoreError};

use crate::error::{Result, RetrievalError};
use crate::throughput::{MAX_WORKER_REPLICAS, MIN_WORKER_REPLICAS};

const REPLICAS_PATH: &str = "/spec/mpiReplicaSpecs/Worker/replicas";
const ANNOTATIONS_PATH: &str = "/metadata/annotations";

/// How the `scale-out` annotation is combined on repeated scale-ups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ScaleOutAnnotationMode {
    /// Parse the annotation as a decimal integer and add to it.
    #[default]
    Add,
    /// String-append the new delta, byte-compatible with the original
    /// controller ("1" + "1" becomes "11").
    Append,
}

/// Typed view over an elastic-job document.
#[derive(Debug, Clone, PartialEq)]
pub struct ElasticJobDoc {
    value: Value,
}

impl ElasticJobDoc {
    /// Wraps a raw document.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self { value }
    }

    /// Unwraps back into the raw document.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.value
    }

    /// The job's name, when the document carries one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.value.pointer("/metadata/name").and_then(Value::as_str)
    }

    /// The configured worker replica count.
    ///
    /// # Errors
    ///
    /// Returns an error when the replicas field is missing or not an
    /// integer.
    pub fn worker_replicas(&self) -> Result<i64> {
        self.value
            .pointer(REPLICAS_PATH)
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                RetrievalError::Cluster(CoreError::InvalidDocument {
                    path: REPLICAS_PATH.to_string(),
                    reason: "missing or not an integer".to_string(),
                })
            })
    }

    /// Replaces the worker replica count.
    ///
    /// # Errors
    ///
    /// Returns an error when the surrounding spec structure is missing.
    pub fn set_worker_replicas(&mut self, replicas: i64) -> Result<()> {
        let worker = self
            .value
            .pointer_mut("/spec/mpiReplicaSpecs/Worker")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| {
                RetrievalError::Cluster(CoreError::InvalidDocument {
                    path: REPLICAS_PATH.to_string(),
                    reason: "worker replica spec missing".to_string(),
                })
            })?;
        worker.insert("replicas".to_string(), Value::from(replicas));
        Ok(())
    }

    /// All annotations on the job; empty when none are set.
    #[must_use]
    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.value
            .pointer(ANNOTATIONS_PATH)
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A single annotation value.
    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<String> {
        self.value
            .pointer(ANNOTATIONS_PATH)
            .and_then(|a| a.get(key))
            .and_then(Value::as_str)
            .map(ToString::to_string)
    }

    /// Sets an annotation, creating the annotations object when missing.
    ///
    /// # Errors
    ///
    /// Returns an error when the document has no metadata object.
    pub fn set_annotation(&mut self, key: &str, value: &str) -> Result<()> {
        let metadata = self
            .value
            .pointer_mut("/metadata")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| {
                RetrievalError::Cluster(CoreError::InvalidDocument {
                    path: ANNOTATIONS_PATH.to_string(),
                    reason: "metadata object missing".to_string(),
                })
            })?;
        let annotations = metadata
            .entry("annotations".to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        let Some(map) = annotations.as_object_mut() else {
            return Err(RetrievalError::Cluster(CoreError::InvalidDocument {
                path: ANNOTATIONS_PATH.to_string(),
                reason: "annotations is not an object".to_string(),
            }));
        };
        map.insert(key.to_string(), Value::from(value));
        Ok(())
    }

    /// Removes an annotation if present.
    pub fn remove_annotation(&mut self, key: &str) {
        if let Some(map) = self
            .value
            .pointer_mut(ANNOTATIONS_PATH)
            .and_then(Value::as_object_mut)
        {
            map.remove(key);
        }
    }

    /// The recorded scale-out worker count, parsed as a decimal integer.
    #[must_use]
    pub fn scale_out(&self) -> Option<i64> {
        self.annotation(annotations::SCALE_OUT)
            .and_then(|raw| raw.parse().ok())
    }

    /// The job's throughput-table key.
    #[must_use]
    pub fn model_name(&self) -> Option<String> {
        self.annotation(annotations::MODEL_NAME)
    }
}

/// Read-modify-write access to elastic-job records in one namespace.
pub struct ElasticJobClient {
    client: Arc<dyn ClusterClient>,
    namespace: String,
    annotation_mode: ScaleOutAnnotationMode,
}

impl ElasticJobClient {
    /// Creates an adapter for the given namespace.
    #[must_use]
    pub fn new(client: Arc<dyn ClusterClient>, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            annotation_mode: ScaleOutAnnotationMode::default(),
        }
    }

    /// Sets the scale-out annotation mode.
    #[must_use]
    pub const fn with_annotation_mode(mut self, mode: ScaleOutAnnotationMode) -> Self {
        self.annotation_mode = mode;
        self
    }

    /// The namespace this adapter operates in.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Fetches a job record.
    ///
    /// # Errors
    ///
    /// Returns an error when the job does not exist.
    pub fn get(&self, name: &str) -> Result<ElasticJobDoc> {
        let value = self.client.get_elastic_job(&self.namespace, name)?;
        Ok(ElasticJobDoc::new(value))
    }

    /// Changes a job's worker replica count by `delta` with a full-object
    /// write.
    ///
    /// The resulting count is floored at [`MIN_WORKER_REPLICAS`] and must
    /// not exceed [`MAX_WORKER_REPLICAS`]. A positive delta records itself
    /// in the `scale-out` annotation (numerically or appended, per the
    /// configured mode); a negative delta reduces the recorded scale-out in
    /// [`ScaleOutAnnotationMode::Add`] mode and leaves it untouched in
    /// `Append` mode. Returns the new replica count.
    ///
    /// # Errors
    ///
    /// Returns an error when the job does not exist, the target count is
    /// out of range, or the write conflicts.
    pub fn scale_by(&self, name: &str, delta: i64) -> Result<i64> {
        let mut job = self.get(name)?;
        let current = job.worker_replicas()?;
        let target = (current + delta).max(MIN_WORKER_REPLICAS);
        if target > MAX_WORKER_REPLICAS {
            return Err(RetrievalError::ReplicasOutOfRange {
                replicas: target,
                min: MIN_WORKER_REPLICAS,
                max: MAX_WORKER_REPLICAS,
            });
        }
        job.set_worker_replicas(target)?;

        if delta > 0 {
            let recorded = match self.annotation_mode {
                ScaleOutAnnotationMode::Add => {
                    (job.scale_out().unwrap_or(0) + delta).to_string()
                }
                ScaleOutAnnotationMode::Append => format!(
                    "{}{delta}",
                    job.annotation(annotations::SCALE_OUT).unwrap_or_default()
                ),
            };
            job.set_annotation(annotations::SCALE_OUT, &recorded)?;
        } else if delta < 0 && self.annotation_mode == ScaleOutAnnotationMode::Add {
            // Scaling down undoes recorded scale-out.
            let remaining = (job.scale_out().unwrap_or(0) + delta).max(0);
            if remaining == 0 {
                job.remove_annotation(annotations::SCALE_OUT);
            } else {
                job.set_annotation(annotations::SCALE_OUT, &remaining.to_string())?;
            }
        }

        self.client
            .update_elastic_job(&self.namespace, name, job.into_value())?;
        info!(
            namespace = %self.namespace,
            job = name,
            delta,
            replicas = target,
            "scaled elastic job"
        );
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reef_core::InMemoryCluster;

    fn job_value(replicas: i64, annotations: serde_json::Value) -> Value {
        serde_json::json!({
            "metadata": { "name": "mnist-elastic", "annotations": annotations },
            "spec": { "mpiReplicaSpecs": { "Worker": { "replicas": replicas } } }
        })
    }

    fn client_with_job(replicas: i64, annotations: serde_json::Value) -> (Arc<InMemoryCluster>, ElasticJobClient) {
        let cluster = Arc::new(InMemoryCluster::new());
        cluster.put_elastic_job("training", "mnist-elastic", job_value(replicas, annotations));
        let jobs = ElasticJobClient::new(Arc::clone(&cluster) as Arc<dyn ClusterClient>, "training");
        (cluster, jobs)
    }

    mod doc_tests {
        use super::*;

        #[test]
        fn typed_accessors() {
            let doc = ElasticJobDoc::new(job_value(
                3,
                serde_json::json!({ "model-name": "resnet50", "scale-out": "2" }),
            ));
            assert_eq!(doc.name(), Some("mnist-elastic"));
            assert_eq!(doc.worker_replicas().ok(), Some(3));
            assert_eq!(doc.model_name().as_deref(), Some("resnet50"));
            assert_eq!(doc.scale_out(), Some(2));
        }

        #[test]
        fn missing_replicas_is_an_invalid_document() {
            let doc = ElasticJobDoc::new(serde_json::json!({ "metadata": {} }));
            assert!(doc.worker_replicas().is_err());
        }

        #[test]
        fn set_annotation_creates_the_object() {
            let mut doc = ElasticJobDoc::new(serde_json::json!({
                "metadata": { "name": "j" },
                "spec": { "mpiReplicaSpecs": { "Worker": { "replicas": 1 } } }
            }));
            assert!(doc.set_annotation("scale-out", "1").is_ok());
            assert_eq!(doc.annotation("scale-out").as_deref(), Some("1"));
        }

        #[test]
        fn unparsable_scale_out_reads_as_none() {
            let doc = ElasticJobDoc::new(job_value(2, serde_json::json!({ "scale-out": "lots" })));
            assert_eq!(doc.scale_out(), None);
        }
    }

    mod scale_by_tests {
        use super::*;

        #[test]
        fn scale_up_records_the_annotation() {
            let (cluster, jobs) = client_with_job(2, serde_json::json!({}));
            assert_eq!(jobs.scale_by("mnist-elastic", 1).ok(), Some(3));

            let stored = cluster.elastic_job("training", "mnist-elastic");
            let doc = ElasticJobDoc::new(stored.unwrap_or_default());
            assert_eq!(doc.worker_replicas().ok(), Some(3));
            assert_eq!(doc.annotation(annotations::SCALE_OUT).as_deref(), Some("1"));
        }

        #[test]
        fn repeated_scale_up_adds_numerically() {
            let (cluster, jobs) = client_with_job(2, serde_json::json!({}));
            let _ = jobs.scale_by("mnist-elastic", 1);
            let _ = jobs.scale_by("mnist-elastic", 1);

            let doc = ElasticJobDoc::new(
                cluster.elastic_job("training", "mnist-elastic").unwrap_or_default(),
            );
            assert_eq!(doc.worker_replicas().ok(), Some(4));
            assert_eq!(doc.annotation(annotations::SCALE_OUT).as_deref(), Some("2"));
        }

        #[test]
        fn append_mode_preserves_the_original_behavior() {
            let cluster = Arc::new(InMemoryCluster::new());
            cluster.put_elastic_job("training", "mnist-elastic", job_value(2, serde_json::json!({})));
            let jobs = ElasticJobClient::new(
                Arc::clone(&cluster) as Arc<dyn ClusterClient>,
                "training",
            )
            .with_annotation_mode(ScaleOutAnnotationMode::Append);

            let _ = jobs.scale_by("mnist-elastic", 1);
            let _ = jobs.scale_by("mnist-elastic", 1);

            let doc = ElasticJobDoc::new(
                cluster.elastic_job("training", "mnist-elastic").unwrap_or_default(),
            );
            assert_eq!(doc.annotation(annotations::SCALE_OUT).as_deref(), Some("11"));
        }

        #[test]
        fn scale_down_reduces_the_recorded_scale_out() {
            let (cluster, jobs) =
                client_with_job(4, serde_json::json!({ "scale-out": "2" }));
            assert_eq!(jobs.scale_by("mnist-elastic", -2).ok(), Some(2));

            let doc = ElasticJobDoc::new(
                cluster.elastic_job("training", "mnist-elastic").unwrap_or_default(),
            );
            assert_eq!(doc.worker_replicas().ok(), Some(2));
            assert_eq!(doc.annotation(annotations::SCALE_OUT), None);
        }

        #[test]
        fn scale_down_floors_at_one_replica() {
            let (cluster, jobs) = client_with_job(2, serde_json::json!({}));
            assert_eq!(jobs.scale_by("mnist-elastic", -5).ok(), Some(1));

            let doc = ElasticJobDoc::new(
                cluster.elastic_job("training", "mnist-elastic").unwrap_or_default(),
            );
            assert_eq!(doc.worker_replicas().ok(), Some(1));
        }

        #[test]
        fn scale_up_past_the_bound_is_rejected() {
            let (cluster, jobs) = client_with_job(5, serde_json::json!({}));
            assert!(matches!(
                jobs.scale_by("mnist-elastic", 1),
                Err(RetrievalError::ReplicasOutOfRange { .. })
            ));
            // The stored record is untouched.
            let doc = ElasticJobDoc::new(
                cluster.elastic_job("training", "mnist-elastic").unwrap_or_default(),
            );
            assert_eq!(doc.worker_replicas().ok(), Some(5));
        }

        #[test]
        fn missing_job_is_an_error() {
            let cluster = Arc::new(InMemoryCluster::new());
            let jobs = ElasticJobClient::new(cluster, "training");
            assert!(jobs.scale_by("ghost", 1).is_err());
        }
    }
}

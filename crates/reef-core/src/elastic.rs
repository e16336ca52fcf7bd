//! Elastic-job pod naming.
//!
//! Elastic distributed-training jobs are recognized by the names of the pods
//! they own: a launcher pod `<job>-launcher` and worker pods
//! `<job>-worker-<ordinal>`, where `<job>` ends in `-elastic`. Retrieval and
//! queue ordering share this parser so they agree on what an elastic job is.

/// Extracts the owning elastic-job name from a pod name, if the pod belongs
/// to an elastic job.
///
/// ```
/// use reef_core::elastic_job_name;
///
/// assert_eq!(
///     elastic_job_name("mnist-elastic-launcher").as_deref(),
///     Some("mnist-elastic")
/// );
/// assert_eq!(
///     elastic_job_name("mnist-elastic-worker-3").as_deref(),
///     Some("mnist-elastic")
/// );
/// assert_eq!(elastic_job_name("web-frontend-7d9f"), None);
/// ```
#[must_use]
pub fn elastic_job_name(pod_name: &str) -> Option<String> {
    let parts: Vec<&str> = pod_name.split('-').collect();
    let n = parts.len();
    if n >= 2 && parts[n - 1] == "launcher" && parts[n - 2] == "elastic" {
        return Some(parts[..n - 1].join("-"));
    }
    if n >= 3 && parts[n - 2] == "worker" && parts[n - 3] == "elastic" {
        return Some(parts[..n - 2].join("-"));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launcher_pod_maps_to_job() {
        assert_eq!(
            elastic_job_name("tensorflow-mnist-elastic-launcher").as_deref(),
            Some("tensorflow-mnist-elastic")
        );
    }

    #[test]
    fn worker_pod_maps_to_job() {
        assert_eq!(
            elastic_job_name("tensorflow-mnist-elastic-worker-0").as_deref(),
            Some("tensorflow-mnist-elastic")
        );
        assert_eq!(
            elastic_job_name("tensorflow-mnist-elastic-worker-12").as_deref(),
            Some("tensorflow-mnist-elastic")
        );
    }

    #[test]
    fn non_elastic_pods_are_rejected() {
        assert_eq!(elastic_job_name("web-frontend-7d9f"), None);
        assert_eq!(elastic_job_name("batch-launcher"), None);
        assert_eq!(elastic_job_name("batch-worker-0"), None);
        assert_eq!(elastic_job_name("launcher"), None);
        assert_eq!(elastic_job_name(""), None);
    }

    #[test]
    fn launcher_and_worker_of_same_job_agree() {
        let from_launcher = elastic_job_name("mnist-elastic-launcher");
        let from_worker = elastic_job_name("mnist-elastic-worker-4");
        assert_eq!(from_launcher, from_worker);
    }
}

//! Analysis worker pool
//!
//! A fixed number of tasks share one sample queue and drive analyses through
//! the shared provider. Each sample is probed first so binaries the service
//! already knows are not resubmitted. Credential exhaustion is forwarded on
//! the fatal channel so main can bring the process down; every other failure
//! is terminal for its sample only.

use std::sync::Arc;
use std::time::Instant;

use detonation::{AnalysisError, DetonationProvider, Sample};
use tokio::sync::{Mutex, mpsc};
use tracing::{error, info, warn};

use crate::metrics;

pub fn spawn_workers(
    count: usize,
    provider: Arc<dyn DetonationProvider>,
    queue: mpsc::Receiver<Sample>,
    fatal: mpsc::Sender<AnalysisError>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let queue = Arc::new(Mutex::new(queue));
    (0..count)
        .map(|worker| {
            let provider = provider.clone();
            let queue = queue.clone();
            let fatal = fatal.clone();
            tokio::spawn(async move {
                loop {
                    let sample = { queue.lock().await.recv().await };
                    let Some(sample) = sample else { break };
                    process_sample(worker, provider.as_ref(), &sample, &fatal).await;
                }
                info!(worker, "sample queue closed, worker exiting");
            })
        })
        .collect()
}

async fn process_sample(
    worker: usize,
    provider: &dyn DetonationProvider,
    sample: &Sample,
    fatal: &mpsc::Sender<AnalysisError>,
) {
    let analysis_id = uuid::Uuid::new_v4();
    let started = Instant::now();
    info!(
        worker,
        %analysis_id,
        sha256 = %sample.sha256,
        provider = provider.name(),
        "analysis started"
    );

    let result = match provider.probe(&sample.sha256).await {
        Ok(Some(result)) => {
            info!(worker, %analysis_id, sha256 = %sample.sha256, "verdict already known, skipping submission");
            Ok(result)
        }
        Ok(None) => provider.analyze(sample).await,
        Err(e) => Err(e),
    };

    let elapsed = started.elapsed().as_secs_f64();
    match result {
        Ok(result) => {
            info!(
                worker,
                %analysis_id,
                sha256 = %sample.sha256,
                score = result.score,
                has_report = result.report.is_some(),
                "analysis finished"
            );
            metrics::record_analysis("resolved", elapsed);
        }
        Err(AnalysisError::CredentialsExhausted) => {
            error!(worker, %analysis_id, "credential pool empty, requesting shutdown");
            metrics::record_analysis("fatal", elapsed);
            let _ = fatal.send(AnalysisError::CredentialsExhausted).await;
        }
        Err(AnalysisError::Permanent { code }) => {
            warn!(
                worker,
                %analysis_id,
                sha256 = %sample.sha256,
                code,
                "sample cannot be analyzed"
            );
            metrics::record_analysis("permanent_failure", elapsed);
        }
        Err(AnalysisError::Transient { reason, retry_in }) => {
            warn!(
                worker,
                %analysis_id,
                sha256 = %sample.sha256,
                reason = %reason,
                retry_in_secs = retry_in.as_secs(),
                "analysis failed, host may re-attempt later"
            );
            metrics::record_analysis("transient_failure", elapsed);
        }
    }
}

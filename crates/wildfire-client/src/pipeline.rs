//! Serialized send-with-retry pipeline
//!
//! One logical call — including all of its credential rotations and gate
//! waits — executes at a time. The mutex over the scheduling state is the
//! execution right: the rotation cursor and the quota/throttle counters are
//! shared mutable state that must not advance under interleaved requests
//! carrying different keys. The remote service is the bottleneck anyway (one
//! quota across all callers), so serializing here costs little throughput.
//!
//! Callers must run on dedicated worker tasks: a closed quota gate can hold
//! the execution right for up to an hour.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use detonation::{AnalysisError, Result};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::keys::CredentialPool;
use crate::quota::QuotaGate;
use crate::throttle::ThrottleWindow;
use crate::transport::{PendingRequest, RawResponse, Transport};

/// Scheduling state advanced only while holding the pipeline mutex.
struct Gates {
    keys: CredentialPool,
    throttle: ThrottleWindow,
    quota: QuotaGate,
}

/// Lock-free view of the pipeline for health reporting. Reads atomics only,
/// so `/health` stays responsive while a sender sleeps out a gate wait.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSnapshot {
    pub keys_remaining: usize,
    pub requests_sent: u64,
    pub replies_received: u64,
}

pub struct RequestPipeline {
    transport: Arc<dyn Transport>,
    gates: Mutex<Gates>,
    keys_remaining: AtomicUsize,
    requests_sent: AtomicU64,
    replies_received: AtomicU64,
}

impl RequestPipeline {
    pub fn new(
        transport: Arc<dyn Transport>,
        keys: CredentialPool,
        throttle: ThrottleWindow,
        quota: QuotaGate,
    ) -> Self {
        let keys_remaining = AtomicUsize::new(keys.len());
        Self {
            transport,
            gates: Mutex::new(Gates {
                keys,
                throttle,
                quota,
            }),
            keys_remaining,
            requests_sent: AtomicU64::new(0),
            replies_received: AtomicU64::new(0),
        }
    }

    /// Send one logical request, retrying through key rotation and gate
    /// waits until the service gives a usable reply.
    ///
    /// Returns the reply for 2xx and 404 statuses — 404 is a semantic answer
    /// on the verdict path ("never seen") and is classified by the caller
    /// per path. 419 rotates the key, closing the quota gate when the
    /// rotation wraps; 401 discards the key (fatal once the pool empties);
    /// anything else is a transient failure for the caller to retry later.
    /// Network faults are transient too and are not retried here.
    pub async fn send(&self, request: &PendingRequest) -> Result<RawResponse> {
        let mut gates = self.gates.lock().await;

        loop {
            if let Some(wait) = gates.quota.admit(Instant::now()) {
                info!(
                    wait_secs = wait.as_secs(),
                    "quota gate closed, holding requests until reset"
                );
                tokio::time::sleep(wait).await;
            }

            if let Some(wait) = gates.throttle.admit(Instant::now()) {
                info!(
                    wait_secs = wait.as_secs(),
                    "too many requests in the past 60 seconds, waiting one minute"
                );
                tokio::time::sleep(wait).await;
                gates.throttle.restart(Instant::now());
            }

            let api_key = if request.wants_key() {
                Some(gates.keys.current()?.to_owned())
            } else {
                None
            };

            self.requests_sent.fetch_add(1, Ordering::Relaxed);
            let response = self.transport.execute(request, api_key.as_deref()).await?;
            self.replies_received.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(
                "wildfire_api_replies_total",
                "status" => response.status.to_string()
            )
            .increment(1);

            match response.status {
                200..=299 | 404 => return Ok(response),
                419 => {
                    if gates.keys.advance() {
                        info!("every API key is out of quota, closing the gate");
                        gates.quota.breach(Instant::now());
                    }
                }
                401 => {
                    let invalidated = gates.keys.invalidate_current();
                    self.keys_remaining
                        .store(gates.keys.len(), Ordering::Relaxed);
                    invalidated?;
                }
                status => {
                    debug!(status, path = request.path, "unexpected status from service");
                    return Err(AnalysisError::transient(format!(
                        "unexpected HTTP status {status} from {}",
                        request.path
                    )));
                }
            }
        }
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            keys_remaining: self.keys_remaining.load(Ordering::Relaxed),
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            replies_received: self.replies_received.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Payload;
    use bytes::Bytes;
    use reqwest::Method;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Transport fake replaying a fixed reply script and recording which
    /// key each attempt carried.
    struct ScriptedTransport {
        replies: std::sync::Mutex<VecDeque<Result<RawResponse>>>,
        keys_used: std::sync::Mutex<Vec<Option<String>>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<RawResponse>>) -> Arc<Self> {
            Arc::new(Self {
                replies: std::sync::Mutex::new(replies.into()),
                keys_used: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn keys_used(&self) -> Vec<Option<String>> {
            self.keys_used.lock().unwrap().clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn execute<'a>(
            &'a self,
            _request: &'a PendingRequest,
            api_key: Option<&'a str>,
        ) -> Pin<Box<dyn Future<Output = Result<RawResponse>> + Send + 'a>> {
            self.keys_used
                .lock()
                .unwrap()
                .push(api_key.map(str::to_owned));
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("reply script exhausted");
            Box::pin(async move { reply })
        }
    }

    fn status(code: u16) -> Result<RawResponse> {
        Ok(RawResponse {
            status: code,
            body: Bytes::new(),
        })
    }

    fn pipeline_with(
        transport: Arc<ScriptedTransport>,
        keys: &[&str],
        throttle: Option<u32>,
        quota: Option<u64>,
    ) -> RequestPipeline {
        RequestPipeline::new(
            transport,
            CredentialPool::from_plain(keys.iter().map(|k| k.to_string()).collect()),
            ThrottleWindow::new(throttle),
            QuotaGate::new(quota, Duration::from_secs(3600)),
        )
    }

    fn verdict_request() -> PendingRequest {
        PendingRequest::form("/verdict", vec![("hash", "aa".into())])
    }

    #[tokio::test]
    async fn success_attaches_current_key() {
        let transport = ScriptedTransport::new(vec![status(200)]);
        let pipeline = pipeline_with(transport.clone(), &["k1", "k2"], None, None);

        let reply = pipeline.send(&verdict_request()).await.unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(transport.keys_used(), vec![Some("k1".into())]);

        let snapshot = pipeline.snapshot();
        assert_eq!(snapshot.requests_sent, 1);
        assert_eq!(snapshot.replies_received, 1);
        assert_eq!(snapshot.keys_remaining, 2);
    }

    #[tokio::test]
    async fn key_quota_rejection_rotates_once_per_response() {
        let transport = ScriptedTransport::new(vec![status(419), status(200)]);
        let pipeline = pipeline_with(transport.clone(), &["k1", "k2", "k3"], None, None);

        pipeline.send(&verdict_request()).await.unwrap();
        // One rotation per 419, no key repeated within the round.
        assert_eq!(
            transport.keys_used(),
            vec![Some("k1".into()), Some("k2".into())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn full_rotation_closes_the_quota_gate() {
        let transport = ScriptedTransport::new(vec![status(419), status(419), status(200)]);
        let pipeline = pipeline_with(transport.clone(), &["k1", "k2"], None, None);

        let started = tokio::time::Instant::now();
        pipeline.send(&verdict_request()).await.unwrap();

        // Both keys rejected in one round: the gate closed and the retry
        // waited out the reset period before reusing the first key.
        assert_eq!(
            transport.keys_used(),
            vec![Some("k1".into()), Some("k2".into()), Some("k1".into())]
        );
        assert!(
            started.elapsed() >= Duration::from_secs(3590),
            "expected a quota reset wait, elapsed {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn unauthorized_discards_key_and_retries_with_next() {
        let transport = ScriptedTransport::new(vec![status(401), status(200)]);
        let pipeline = pipeline_with(transport.clone(), &["bad", "good"], None, None);

        pipeline.send(&verdict_request()).await.unwrap();
        assert_eq!(
            transport.keys_used(),
            vec![Some("bad".into()), Some("good".into())]
        );
        assert_eq!(pipeline.snapshot().keys_remaining, 1);
    }

    #[tokio::test]
    async fn unauthorized_on_last_key_is_fatal() {
        let transport = ScriptedTransport::new(vec![status(401)]);
        let pipeline = pipeline_with(transport.clone(), &["only"], None, None);

        let err = pipeline.send(&verdict_request()).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(pipeline.snapshot().keys_remaining, 0);
    }

    #[tokio::test]
    async fn unexpected_status_is_transient_and_releases_the_pipeline() {
        let transport = ScriptedTransport::new(vec![status(500), status(200)]);
        let pipeline = pipeline_with(transport.clone(), &["k1"], None, None);

        let err = pipeline.send(&verdict_request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Transient { .. }));

        // The execution right was released on the error path.
        let reply = pipeline.send(&verdict_request()).await.unwrap();
        assert_eq!(reply.status, 200);
    }

    #[tokio::test]
    async fn not_found_is_returned_to_the_caller() {
        let transport = ScriptedTransport::new(vec![status(404)]);
        let pipeline = pipeline_with(transport.clone(), &["k1"], None, None);

        let reply = pipeline.send(&verdict_request()).await.unwrap();
        assert_eq!(reply.status, 404);
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_breach_costs_a_minute() {
        let transport = ScriptedTransport::new(vec![status(200), status(200)]);
        let pipeline = pipeline_with(transport.clone(), &["k1"], Some(1), None);

        let started = tokio::time::Instant::now();
        pipeline.send(&verdict_request()).await.unwrap();
        pipeline.send(&verdict_request()).await.unwrap();

        assert!(
            started.elapsed() >= Duration::from_secs(60),
            "second send should have waited out the window, elapsed {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn get_requests_carry_no_credential() {
        let transport = ScriptedTransport::new(vec![status(200)]);
        let pipeline = pipeline_with(transport.clone(), &["k1"], None, None);

        let request = PendingRequest {
            method: Method::GET,
            path: "/status",
            payload: Payload::Form(vec![]),
        };
        pipeline.send(&request).await.unwrap();
        assert_eq!(transport.keys_used(), vec![None]);
    }

    #[tokio::test]
    async fn network_fault_propagates_and_releases_the_pipeline() {
        let transport = ScriptedTransport::new(vec![
            Err(AnalysisError::transient("connection reset")),
            status(200),
        ]);
        let pipeline = pipeline_with(transport.clone(), &["k1"], None, None);

        let err = pipeline.send(&verdict_request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Transient { .. }));
        assert!(pipeline.send(&verdict_request()).await.is_ok());

        // The fault counted a request but no reply.
        let snapshot = pipeline.snapshot();
        assert_eq!(snapshot.requests_sent, 2);
        assert_eq!(snapshot.replies_received, 1);
    }
}

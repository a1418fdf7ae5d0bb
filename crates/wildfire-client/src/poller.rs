//! Submit-then-poll workflow
//!
//! Drives one sample through Submitting → Polling → {Resolved, Exhausted} on
//! top of the request pipeline. Credential-level trouble never shows up here
//! — the pipeline absorbs rotation and invalidation — so every error at this
//! layer is about the sample itself or the service's availability.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use detonation::{AnalysisError, AnalysisResult, DetonationProvider, Result, Sample};
use tracing::{debug, info, warn};

use crate::pipeline::RequestPipeline;
use crate::transport::PendingRequest;
use crate::verdict::{self, Verdict};

pub const DEFAULT_POLL_ATTEMPTS: u32 = 20;
pub const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(30);

const SUBMIT_PATH: &str = "/submit";
const VERDICT_PATH: &str = "/verdict";
const REPORT_PATH: &str = "/report";

pub struct SubmissionPoller {
    pipeline: Arc<RequestPipeline>,
    report_dir: PathBuf,
    poll_attempts: u32,
    poll_delay: Duration,
}

/// One poll's outcome: either the service settled, or it is still working
/// (which also covers "never heard of this hash yet" right after a submit).
enum PollOutcome {
    Resolved(AnalysisResult),
    StillProcessing,
}

impl SubmissionPoller {
    pub fn new(pipeline: Arc<RequestPipeline>, report_dir: impl Into<PathBuf>) -> Self {
        Self {
            pipeline,
            report_dir: report_dir.into(),
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
            poll_delay: DEFAULT_POLL_DELAY,
        }
    }

    /// Override the poll budget (tests use short schedules).
    pub fn with_poll_schedule(mut self, attempts: u32, delay: Duration) -> Self {
        self.poll_attempts = attempts;
        self.poll_delay = delay;
        self
    }

    /// Submit a sample and poll until the service settles on a verdict.
    pub async fn analyze(&self, sample: &Sample) -> Result<AnalysisResult> {
        self.submit(sample).await?;

        for attempt in 1..=self.poll_attempts {
            // The delay precedes every poll, the first included: the service
            // needs processing time before a verdict can exist.
            tokio::time::sleep(self.poll_delay).await;
            match self.query_verdict(&sample.sha256).await? {
                PollOutcome::Resolved(result) => {
                    info!(
                        sha256 = %sample.sha256,
                        score = result.score,
                        attempt,
                        "verdict resolved"
                    );
                    return Ok(result);
                }
                PollOutcome::StillProcessing => {
                    debug!(sha256 = %sample.sha256, attempt, "verdict not ready");
                }
            }
        }

        Err(AnalysisError::Transient {
            reason: format!("no verdict after {} polls", self.poll_attempts),
            retry_in: AnalysisError::RETRY_AFTER_POLL_EXHAUSTED,
        })
    }

    /// Ask for a verdict without submitting anything. `None` means the
    /// sample has no terminal verdict yet.
    pub async fn probe(&self, sha256: &str) -> Result<Option<AnalysisResult>> {
        match self.query_verdict(sha256).await? {
            PollOutcome::Resolved(result) => Ok(Some(result)),
            PollOutcome::StillProcessing => Ok(None),
        }
    }

    async fn submit(&self, sample: &Sample) -> Result<()> {
        let request =
            PendingRequest::upload(SUBMIT_PATH, sample.file_name.clone(), sample.content.clone());
        let reply = self.pipeline.send(&request).await?;
        if reply.status == 404 {
            // 404 only means "unknown hash" on the verdict path; on submit
            // it is a real failure.
            return Err(AnalysisError::transient("submission rejected with 404"));
        }
        info!(sha256 = %sample.sha256, file = %sample.file_name, "sample submitted");
        Ok(())
    }

    async fn query_verdict(&self, sha256: &str) -> Result<PollOutcome> {
        let request = PendingRequest::form(VERDICT_PATH, vec![("hash", sha256.to_owned())]);
        let reply = self.pipeline.send(&request).await?;
        if reply.status == 404 {
            return Ok(PollOutcome::StillProcessing);
        }

        let parsed = verdict::parse_verdict(&reply.body)?;
        if parsed.sha256 != sha256 {
            return Err(AnalysisError::transient(format!(
                "verdict reply echoed hash {} for query {sha256}",
                parsed.sha256
            )));
        }

        match parsed.verdict {
            Verdict::Benign => Ok(PollOutcome::Resolved(AnalysisResult::score(
                verdict::SCORE_BENIGN,
            ))),
            Verdict::Malware => Ok(PollOutcome::Resolved(
                self.scored_with_report(sha256, verdict::SCORE_MALWARE).await,
            )),
            Verdict::Grayware => Ok(PollOutcome::Resolved(
                self.scored_with_report(sha256, verdict::SCORE_GRAYWARE)
                    .await,
            )),
            Verdict::Pending | Verdict::NotYetSeen => Ok(PollOutcome::StillProcessing),
            Verdict::ProcessingError(code) => Err(AnalysisError::Permanent { code }),
            Verdict::Unrecognized(code) => {
                warn!(code, sha256, "unrecognized verdict code, scoring benign");
                Ok(PollOutcome::Resolved(AnalysisResult::score(
                    verdict::SCORE_BENIGN,
                )))
            }
        }
    }

    /// Positive verdicts come with a report side call. Report trouble never
    /// fails the analysis — the score stands on its own.
    async fn scored_with_report(&self, sha256: &str, score: u8) -> AnalysisResult {
        match self.fetch_report(sha256).await {
            Ok(path) => AnalysisResult::with_report(score, path),
            Err(e) => {
                warn!(
                    sha256,
                    error = %e,
                    "report retrieval failed, returning score-only result"
                );
                AnalysisResult::score(score)
            }
        }
    }

    async fn fetch_report(&self, sha256: &str) -> Result<PathBuf> {
        let request = PendingRequest::form(
            REPORT_PATH,
            vec![("hash", sha256.to_owned()), ("format", "pdf".to_owned())],
        );
        let reply = self.pipeline.send(&request).await?;
        if reply.status == 404 {
            return Err(AnalysisError::transient("report not available"));
        }
        let path = self.report_dir.join(format!("{sha256}.pdf"));
        tokio::fs::write(&path, &reply.body).await.map_err(|e| {
            AnalysisError::transient(format!("writing report {} failed: {e}", path.display()))
        })?;
        debug!(sha256, path = %path.display(), "report persisted");
        Ok(path)
    }
}

impl DetonationProvider for SubmissionPoller {
    fn name(&self) -> &str {
        "wildfire"
    }

    fn analyze<'a>(
        &'a self,
        sample: &'a Sample,
    ) -> Pin<Box<dyn Future<Output = Result<AnalysisResult>> + Send + 'a>> {
        Box::pin(SubmissionPoller::analyze(self, sample))
    }

    fn probe<'a>(
        &'a self,
        sha256: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<AnalysisResult>>> + Send + 'a>> {
        Box::pin(SubmissionPoller::probe(self, sha256))
    }
}

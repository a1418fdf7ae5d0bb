//! Binary-analysis provider abstraction
//!
//! Decouples the connector daemon from the concrete detonation backend. The
//! daemon hands `Sample`s to a `DetonationProvider` and gets back risk-scored
//! `AnalysisResult`s; the wildfire-client crate supplies the production
//! implementation. The error taxonomy lives here because both sides speak it:
//! the backend produces it, the daemon decides process fate from it.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;

/// A binary sample queued for analysis.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Hex-encoded SHA-256 of `content`; the remote service's identity for
    /// this binary.
    pub sha256: String,
    /// Original file name, forwarded with the upload.
    pub file_name: String,
    pub content: Bytes,
}

/// Terminal outcome of one sample's analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    /// Risk score, 0 (clean) through 100 (malware).
    pub score: u8,
    /// Detail artifact on disk, when report retrieval succeeded.
    pub report: Option<PathBuf>,
}

impl AnalysisResult {
    pub fn score(score: u8) -> Self {
        Self {
            score,
            report: None,
        }
    }

    pub fn with_report(score: u8, report: PathBuf) -> Self {
        Self {
            score,
            report: Some(report),
        }
    }
}

/// Per-analysis errors surfaced to the daemon.
///
/// `CredentialsExhausted` is the one unrecoverable case: every configured API
/// key has been rejected, so no valid configuration remains and the process
/// must stop. `Permanent` is terminal for the sample only; `Transient`
/// invites a later re-attempt after the suggested delay.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    #[error("no valid API credentials remaining")]
    CredentialsExhausted,

    #[error("analysis failed permanently (verdict code {code})")]
    Permanent { code: i32 },

    #[error("transient analysis failure: {reason}")]
    Transient { reason: String, retry_in: Duration },
}

impl AnalysisError {
    /// Suggested delay before re-attempting after a request-level fault.
    pub const RETRY_AFTER_FAULT: Duration = Duration::from_secs(120);

    /// Suggested delay before resubmitting after the poll budget ran out.
    pub const RETRY_AFTER_POLL_EXHAUSTED: Duration = Duration::from_secs(600);

    /// Transient failure with the standard request-fault retry delay.
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
            retry_in: Self::RETRY_AFTER_FAULT,
        }
    }

    /// True when the daemon has no way to continue operating.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CredentialsExhausted)
    }
}

/// Result alias for analysis operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Abstraction over binary detonation backends.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn DetonationProvider>`).
pub trait DetonationProvider: Send + Sync {
    /// Identifier for logging and health reporting (e.g. "wildfire").
    fn name(&self) -> &str;

    /// Submit a sample and wait for its verdict.
    fn analyze<'a>(
        &'a self,
        sample: &'a Sample,
    ) -> Pin<Box<dyn Future<Output = Result<AnalysisResult>> + Send + 'a>>;

    /// Check whether the service already has a verdict for this hash,
    /// without submitting anything. `None` means no terminal verdict yet.
    fn probe<'a>(
        &'a self,
        sha256: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<AnalysisResult>>> + Send + 'a>>;
}

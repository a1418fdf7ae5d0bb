//! Resilient WildFire API client
//!
//! Everything the connector needs to talk to the detonation service without
//! falling over: API key rotation (`CredentialPool`), per-minute throttling
//! (`ThrottleWindow`), cumulative quota backoff (`QuotaGate`), the serialized
//! send-with-retry pipeline (`RequestPipeline`), and the submit→poll→verdict
//! workflow (`SubmissionPoller`, the production `DetonationProvider`).
//!
//! Request lifecycle:
//! 1. A worker hands the poller a sample.
//! 2. The poller issues submit/verdict/report calls through the one shared
//!    pipeline.
//! 3. The pipeline holds the execution right for the whole retry loop: gate
//!    waits, key rotation on 419, key disposal on 401.
//! 4. Verdict codes map onto risk scores; positive verdicts pull a report.

pub mod keys;
pub mod pipeline;
pub mod poller;
pub mod quota;
pub mod throttle;
pub mod transport;
pub mod verdict;

pub use keys::CredentialPool;
pub use pipeline::{PipelineSnapshot, RequestPipeline};
pub use poller::SubmissionPoller;
pub use quota::QuotaGate;
pub use throttle::ThrottleWindow;
pub use transport::{HttpTransport, Payload, PendingRequest, RawResponse, Transport};
pub use verdict::{Verdict, VerdictReply, parse_verdict};

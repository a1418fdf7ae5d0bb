//! Verdict reply codec
//!
//! The service answers verdict queries with a small XML envelope carrying the
//! echoed hash and an integer verdict code:
//!
//! ```xml
//! <wildfire>
//!   <get-verdict-info>
//!     <sha256>…</sha256>
//!     <verdict>1</verdict>
//!   </get-verdict-info>
//! </wildfire>
//! ```
//!
//! Code table: 0 benign, 1 malware, 2 grayware, -100 still pending,
//! -102 never seen, any other negative a processing error. Codes outside the
//! table score benign — a conservative fallback, logged, never dropped.

use detonation::{AnalysisError, Result};
use serde::Deserialize;

pub const SCORE_BENIGN: u8 = 0;
pub const SCORE_GRAYWARE: u8 = 50;
pub const SCORE_MALWARE: u8 = 100;

/// Classified verdict code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Benign,
    Malware,
    Grayware,
    /// Analysis still running.
    Pending,
    /// The service has never seen this hash.
    NotYetSeen,
    /// The service failed to analyze the sample.
    ProcessingError(i32),
    /// Code outside the documented table.
    Unrecognized(i32),
}

impl Verdict {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Benign,
            1 => Self::Malware,
            2 => Self::Grayware,
            -100 => Self::Pending,
            -102 => Self::NotYetSeen,
            c if c < 0 => Self::ProcessingError(c),
            c => Self::Unrecognized(c),
        }
    }

    /// Risk score for terminal verdicts; `None` while the service is still
    /// working or has failed.
    pub fn score(&self) -> Option<u8> {
        match self {
            Self::Benign | Self::Unrecognized(_) => Some(SCORE_BENIGN),
            Self::Malware => Some(SCORE_MALWARE),
            Self::Grayware => Some(SCORE_GRAYWARE),
            Self::Pending | Self::NotYetSeen | Self::ProcessingError(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VerdictEnvelope {
    #[serde(rename = "get-verdict-info")]
    info: VerdictInfo,
}

#[derive(Debug, Deserialize)]
struct VerdictInfo {
    sha256: String,
    verdict: i32,
}

/// Parsed verdict reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerdictReply {
    pub sha256: String,
    pub verdict: Verdict,
}

/// Parse a verdict reply body. A malformed body is a transient failure: the
/// poll can simply be repeated.
pub fn parse_verdict(body: &[u8]) -> Result<VerdictReply> {
    let text = std::str::from_utf8(body)
        .map_err(|e| AnalysisError::transient(format!("verdict reply is not UTF-8: {e}")))?;
    let envelope: VerdictEnvelope = quick_xml::de::from_str(text)
        .map_err(|e| AnalysisError::transient(format!("malformed verdict reply: {e}")))?;
    Ok(VerdictReply {
        sha256: envelope.info.sha256,
        verdict: Verdict::from_code(envelope.info.verdict),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_xml(sha256: &str, code: i32) -> String {
        format!(
            "<wildfire><get-verdict-info><sha256>{sha256}</sha256>\
             <verdict>{code}</verdict></get-verdict-info></wildfire>"
        )
    }

    #[test]
    fn code_table_is_exact() {
        assert_eq!(Verdict::from_code(0), Verdict::Benign);
        assert_eq!(Verdict::from_code(1), Verdict::Malware);
        assert_eq!(Verdict::from_code(2), Verdict::Grayware);
        assert_eq!(Verdict::from_code(-100), Verdict::Pending);
        assert_eq!(Verdict::from_code(-102), Verdict::NotYetSeen);
        assert_eq!(Verdict::from_code(-101), Verdict::ProcessingError(-101));
        assert_eq!(Verdict::from_code(-103), Verdict::ProcessingError(-103));
        assert_eq!(Verdict::from_code(7), Verdict::Unrecognized(7));
    }

    #[test]
    fn scores_map_zero_hundred_fifty() {
        assert_eq!(Verdict::Benign.score(), Some(0));
        assert_eq!(Verdict::Malware.score(), Some(100));
        assert_eq!(Verdict::Grayware.score(), Some(50));
        assert_eq!(Verdict::Unrecognized(42).score(), Some(0));
    }

    #[test]
    fn non_terminal_verdicts_have_no_score() {
        assert_eq!(Verdict::Pending.score(), None);
        assert_eq!(Verdict::NotYetSeen.score(), None);
        assert_eq!(Verdict::ProcessingError(-103).score(), None);
    }

    #[test]
    fn parses_the_envelope() {
        let body = reply_xml("aa11", 1);
        let reply = parse_verdict(body.as_bytes()).unwrap();
        assert_eq!(reply.sha256, "aa11");
        assert_eq!(reply.verdict, Verdict::Malware);
    }

    #[test]
    fn parses_negative_codes() {
        let body = reply_xml("aa11", -100);
        let reply = parse_verdict(body.as_bytes()).unwrap();
        assert_eq!(reply.verdict, Verdict::Pending);
    }

    #[test]
    fn malformed_xml_is_transient() {
        let err = parse_verdict(b"<wildfire><broken>").unwrap_err();
        assert!(matches!(err, AnalysisError::Transient { .. }));
    }

    #[test]
    fn missing_verdict_element_is_transient() {
        let body = "<wildfire><get-verdict-info><sha256>aa</sha256></get-verdict-info></wildfire>";
        let err = parse_verdict(body.as_bytes()).unwrap_err();
        assert!(matches!(err, AnalysisError::Transient { .. }));
    }

    #[test]
    fn non_utf8_body_is_transient() {
        let err = parse_verdict(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, AnalysisError::Transient { .. }));
    }
}
